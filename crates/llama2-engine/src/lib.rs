// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Llama 2 inference engine.
//!
//! Runs llama2-family checkpoints (TinyStories, TinyLlama and friends) in
//! plain `f32` on the CPU. The crate plugs into the launcher's
//! [`Engine`] lifecycle:
//!
//! * `initialize` maps the checkpoint, loads the tokenizer and allocates
//!   the working buffers and sampler into [`Llama2State`],
//! * `generate` encodes the prompt, runs the transformer token by token
//!   and streams each decoded piece into the caller's sink,
//! * `deinitialize` drops whatever `initialize` managed to set up.
//!
//! Generation echoes the prompt: while prompt tokens are being fed
//! through the model, their decoded transitions stream out just like
//! sampled ones, so the caller sees `prompt + continuation` as one
//! stream.

mod alloc;
mod checkpoint;
mod sampler;
mod tokenizer;
mod transformer;

pub use alloc::buffer;
pub use checkpoint::{Checkpoint, ModelConfig, Weights, HEADER_BYTES};
pub use sampler::Sampler;
pub use tokenizer::{Tokenizer, BOS_TOKEN, EOS_TOKEN, UNK_TOKEN};
pub use transformer::{forward, matmul, rmsnorm, rmsnorm_in_place, softmax, RunBuffers};

use launcher::{Engine, EngineError, RunConfig, TokenSink};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Everything one run loads or allocates.
///
/// Starts blank; `initialize` fills the fields in order, so a failure
/// partway leaves the earlier ones set and `deinitialize` releases
/// exactly what is there.
#[derive(Default)]
pub struct Llama2State {
    checkpoint: Option<Checkpoint>,
    tokenizer: Option<Tokenizer>,
    buffers: Option<RunBuffers>,
    sampler: Option<Sampler>,
}

/// CPU inference engine for llama2-family checkpoints.
#[derive(Debug, Default)]
pub struct Llama2Engine;

impl Llama2Engine {
    pub fn new() -> Self {
        Self
    }
}

impl Engine for Llama2Engine {
    type State = Llama2State;

    fn initialize(&self, config: &RunConfig, state: &mut Llama2State) -> Result<(), EngineError> {
        let checkpoint = Checkpoint::open(&config.checkpoint_path)?;
        let model_config = *checkpoint.config();
        state.checkpoint = Some(checkpoint);

        state.tokenizer = Some(Tokenizer::load(
            &config.tokenizer_path,
            model_config.vocab_size,
        )?);
        state.buffers = Some(RunBuffers::for_config(&model_config)?);

        let seed = config.seed.unwrap_or_else(clock_seed);
        state.sampler = Some(Sampler::new(
            model_config.vocab_size,
            config.temperature,
            config.top_p,
            seed,
        )?);
        Ok(())
    }

    fn generate(
        &self,
        config: &RunConfig,
        state: &mut Llama2State,
        sink: &mut dyn TokenSink,
    ) -> Result<(), EngineError> {
        let (Some(checkpoint), Some(tokenizer), Some(buffers), Some(sampler)) = (
            state.checkpoint.as_ref(),
            state.tokenizer.as_ref(),
            state.buffers.as_mut(),
            state.sampler.as_mut(),
        ) else {
            return Err(EngineError::InvalidArgument(
                "generate called on an uninitialized engine".to_string(),
            ));
        };

        let model_config = checkpoint.config();
        let weights = checkpoint.weights();

        let prompt_tokens = tokenizer.encode(&config.prompt, true, false);
        if prompt_tokens.is_empty() {
            return Err(EngineError::InvalidArgument(
                "prompt encoded to no tokens".to_string(),
            ));
        }

        let steps = (config.steps as usize).min(model_config.seq_len);
        let mut token = prompt_tokens[0];
        let mut pos = 0;
        let mut generation_start: Option<Instant> = None;

        while pos < steps {
            transformer::forward(model_config, &weights, buffers, token as usize, pos);

            let next = if pos + 1 < prompt_tokens.len() {
                // Still forcing the prompt through the model.
                prompt_tokens[pos + 1]
            } else {
                sampler.sample(buffers.logits_mut()) as u32
            };
            pos += 1;

            if next == BOS_TOKEN || next == EOS_TOKEN {
                break;
            }

            let piece = tokenizer.decode(token, next)?;
            if !piece.is_empty() {
                sink.on_token(piece);
            }
            token = next;

            if generation_start.is_none() {
                generation_start = Some(Instant::now());
            }
        }

        if pos > 1 {
            if let Some(start) = generation_start {
                let elapsed = start.elapsed().as_secs_f64();
                if elapsed > 0.0 {
                    tracing::info!(
                        "generated {} tokens at {:.1} tok/s",
                        pos,
                        (pos - 1) as f64 / elapsed
                    );
                }
            }
        }
        Ok(())
    }

    fn deinitialize(&self, state: &mut Llama2State) {
        state.sampler = None;
        state.buffers = None;
        state.tokenizer = None;
        if state.checkpoint.take().is_some() {
            tracing::debug!("released checkpoint mapping");
        }
    }
}

/// Seed for runs that did not pin one.
fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(1)
}
