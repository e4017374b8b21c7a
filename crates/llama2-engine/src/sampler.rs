// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Next-token sampling over the output logits.
//!
//! Temperature zero is greedy argmax. Any other temperature scales the
//! logits, softmaxes them, and draws either from the full distribution or
//! from the top-p nucleus, using an xorshift64* generator so a fixed seed
//! reproduces a run exactly.

use crate::alloc;
use crate::transformer;
use launcher::EngineError;

pub struct Sampler {
    vocab_size: usize,
    temperature: f32,
    top_p: f32,
    rng_state: u64,
    /// `(probability, token)` scratch for the nucleus sort.
    scratch: Vec<(f32, usize)>,
}

impl Sampler {
    /// Creates a sampler for a `vocab_size`-wide distribution.
    ///
    /// `top_p` outside `(0, 1)` disables nucleus filtering. A zero seed is
    /// remapped, the generator state must never be zero.
    pub fn new(
        vocab_size: usize,
        temperature: f32,
        top_p: f32,
        seed: u64,
    ) -> Result<Self, EngineError> {
        Ok(Self {
            vocab_size,
            temperature,
            top_p,
            rng_state: if seed == 0 { 0x9E37_79B9_7F4A_7C15 } else { seed },
            scratch: alloc::buffer(vocab_size)?,
        })
    }

    /// Draws the next token, consuming `logits` as scratch space.
    pub fn sample(&mut self, logits: &mut [f32]) -> usize {
        debug_assert_eq!(logits.len(), self.vocab_size);
        if self.temperature == 0.0 {
            return argmax(logits);
        }

        for logit in logits.iter_mut() {
            *logit /= self.temperature;
        }
        transformer::softmax(logits);

        let coin = self.random_f32();
        if self.top_p <= 0.0 || self.top_p >= 1.0 {
            sample_mult(logits, coin)
        } else {
            self.sample_top_p(logits, coin)
        }
    }

    /// Samples from the smallest set of tokens whose probabilities sum
    /// past `top_p`.
    fn sample_top_p(&mut self, probabilities: &[f32], coin: f32) -> usize {
        // Tokens below this bound cannot be part of the nucleus; skipping
        // them keeps the sort small.
        let cutoff = (1.0 - self.top_p) / (probabilities.len() - 1) as f32;
        let mut count = 0;
        for (token, &probability) in probabilities.iter().enumerate() {
            if probability >= cutoff {
                self.scratch[count] = (probability, token);
                count += 1;
            }
        }
        if count == 0 {
            return argmax(probabilities);
        }

        let candidates = &mut self.scratch[..count];
        candidates.sort_unstable_by(|a, b| b.0.total_cmp(&a.0));

        let mut cumulative = 0.0;
        let mut last = count - 1;
        for (at, &(probability, _)) in candidates.iter().enumerate() {
            cumulative += probability;
            if cumulative > self.top_p {
                last = at;
                break;
            }
        }

        let target = coin * cumulative;
        let mut cdf = 0.0;
        for &(probability, token) in &candidates[..=last] {
            cdf += probability;
            if target < cdf {
                return token;
            }
        }
        candidates[last].1
    }

    fn random_u32(&mut self) -> u32 {
        // xorshift64*
        self.rng_state ^= self.rng_state >> 12;
        self.rng_state ^= self.rng_state << 25;
        self.rng_state ^= self.rng_state >> 27;
        (self.rng_state.wrapping_mul(0x2545_F491_4F6C_DD1D) >> 32) as u32
    }

    fn random_f32(&mut self) -> f32 {
        (self.random_u32() >> 8) as f32 / 16777216.0
    }
}

impl std::fmt::Debug for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sampler")
            .field("vocab_size", &self.vocab_size)
            .field("temperature", &self.temperature)
            .field("top_p", &self.top_p)
            .finish()
    }
}

fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (token, &value) in values.iter().enumerate().skip(1) {
        if value > values[best] {
            best = token;
        }
    }
    best
}

/// CDF walk over the full distribution.
fn sample_mult(probabilities: &[f32], coin: f32) -> usize {
    let mut cdf = 0.0;
    for (token, &probability) in probabilities.iter().enumerate() {
        cdf += probability;
        if coin < cdf {
            return token;
        }
    }
    probabilities.len() - 1
}
