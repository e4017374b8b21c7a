// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Single-token transformer forward pass and its kernels.
//!
//! One call to [`forward`] pushes one token through every layer at one
//! position: RMSNorm, rotary-embedded grouped-query attention against the
//! key/value cache, the SwiGLU feed-forward block, and finally the output
//! classifier into the logits buffer. The caches make generation
//! incremental; past positions are never recomputed.

use crate::alloc;
use crate::checkpoint::{ModelConfig, Weights};
use launcher::EngineError;

// ── Kernels ────────────────────────────────────────────────────

/// `out = W @ x`, where `W` is row-major with `x.len()` columns and
/// `out.len()` rows.
pub fn matmul(out: &mut [f32], x: &[f32], w: &[f32]) {
    let n = x.len();
    debug_assert_eq!(w.len(), out.len() * n);
    for (value, row) in out.iter_mut().zip(w.chunks_exact(n)) {
        *value = row.iter().zip(x).map(|(a, b)| a * b).sum();
    }
}

/// Root-mean-square normalization of `x` into `out`, scaled by `weight`.
pub fn rmsnorm(out: &mut [f32], x: &[f32], weight: &[f32]) {
    let inv_rms = inverse_rms(x);
    for ((o, &v), &w) in out.iter_mut().zip(x).zip(weight) {
        *o = w * (inv_rms * v);
    }
}

/// In-place variant of [`rmsnorm`].
pub fn rmsnorm_in_place(x: &mut [f32], weight: &[f32]) {
    let inv_rms = inverse_rms(x);
    for (v, &w) in x.iter_mut().zip(weight) {
        *v = w * (inv_rms * *v);
    }
}

fn inverse_rms(x: &[f32]) -> f32 {
    let mut ss: f32 = x.iter().map(|&v| v * v).sum();
    ss /= x.len() as f32;
    ss += 1e-5;
    1.0 / ss.sqrt()
}

/// Numerically-stable in-place softmax.
pub fn softmax(x: &mut [f32]) {
    let max = x.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0;
    for v in x.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    for v in x.iter_mut() {
        *v /= sum;
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

// ── Run buffers ────────────────────────────────────────────────

/// All mutable per-run state of the forward pass.
///
/// Sized once from the model header; the generation loop reuses the same
/// buffers for every position. The key/value caches hold one row per
/// `(layer, position)` and are only ever appended to within a run.
pub struct RunBuffers {
    /// Current activation, `dim`.
    x: Vec<f32>,
    /// Post-norm activation and attention output, `dim`.
    xb: Vec<f32>,
    /// Attention projection scratch, `dim`.
    xb2: Vec<f32>,
    /// Feed-forward gate, `hidden_dim`.
    hb: Vec<f32>,
    /// Feed-forward candidate, `hidden_dim`.
    hb2: Vec<f32>,
    /// Query vector, `dim`.
    q: Vec<f32>,
    /// Attention scores, `n_heads * seq_len`.
    att: Vec<f32>,
    /// Output logits, `vocab_size`.
    logits: Vec<f32>,
    /// Cached keys, `n_layers * seq_len * kv_dim`.
    key_cache: Vec<f32>,
    /// Cached values, `n_layers * seq_len * kv_dim`.
    value_cache: Vec<f32>,
}

impl RunBuffers {
    /// Allocates every buffer the forward pass needs for `config`.
    ///
    /// Cache sizes grow with `seq_len` past anything the checkpoint body
    /// holds; a header whose caches cannot be addressed is rejected.
    pub fn for_config(config: &ModelConfig) -> Result<Self, EngineError> {
        let att = config.n_heads.checked_mul(config.seq_len);
        let kv_cache = config
            .n_layers
            .checked_mul(config.seq_len)
            .and_then(|rows| rows.checked_mul(config.kv_dim()));
        let (Some(att), Some(kv_cache)) = (att, kv_cache) else {
            return Err(EngineError::MalformedCheckpoint(
                "cache sizes implied by the header overflow".to_string(),
            ));
        };
        Ok(Self {
            x: alloc::buffer(config.dim)?,
            xb: alloc::buffer(config.dim)?,
            xb2: alloc::buffer(config.dim)?,
            hb: alloc::buffer(config.hidden_dim)?,
            hb2: alloc::buffer(config.hidden_dim)?,
            q: alloc::buffer(config.dim)?,
            att: alloc::buffer(att)?,
            logits: alloc::buffer(config.vocab_size)?,
            key_cache: alloc::buffer(kv_cache)?,
            value_cache: alloc::buffer(kv_cache)?,
        })
    }

    /// Logits produced by the most recent [`forward`] call.
    pub fn logits(&self) -> &[f32] {
        &self.logits
    }

    /// Mutable logits, for in-place sampling transforms.
    pub fn logits_mut(&mut self) -> &mut [f32] {
        &mut self.logits
    }
}

// ── Forward pass ───────────────────────────────────────────────

/// Runs `token` through the model at sequence position `pos`, leaving the
/// next-token logits in `buffers`.
///
/// `pos` must be below `config.seq_len` and positions must be visited in
/// order within a run, so the caches already hold every earlier position.
pub fn forward(
    config: &ModelConfig,
    weights: &Weights<'_>,
    buffers: &mut RunBuffers,
    token: usize,
    pos: usize,
) {
    debug_assert!(pos < config.seq_len);
    let dim = config.dim;
    let hidden = config.hidden_dim;
    let head_size = config.head_size();
    let kv_dim = config.kv_dim();
    let kv_mul = config.kv_mul();

    let RunBuffers {
        x,
        xb,
        xb2,
        hb,
        hb2,
        q,
        att,
        logits,
        key_cache,
        value_cache,
    } = buffers;

    x.copy_from_slice(&weights.token_embedding[token * dim..(token + 1) * dim]);

    for layer in 0..config.n_layers {
        rmsnorm(xb, x, &weights.rms_att[layer * dim..(layer + 1) * dim]);

        // Project straight into this position's cache rows.
        let cache_offset = layer * config.seq_len * kv_dim;
        let row = cache_offset + pos * kv_dim;
        let k_row = &mut key_cache[row..row + kv_dim];
        let v_row = &mut value_cache[row..row + kv_dim];
        matmul(q, xb, &weights.wq[layer * dim * dim..(layer + 1) * dim * dim]);
        matmul(k_row, xb, &weights.wk[layer * dim * kv_dim..(layer + 1) * dim * kv_dim]);
        matmul(v_row, xb, &weights.wv[layer * dim * kv_dim..(layer + 1) * dim * kv_dim]);

        // Rotary position embedding over query and key pairs. Only the
        // first kv_dim query lanes have a key counterpart under GQA.
        for i in (0..dim).step_by(2) {
            let head_dim = (i % head_size) as f32;
            let freq = 1.0 / 10000f32.powf(head_dim / head_size as f32);
            let (sin, cos) = (pos as f32 * freq).sin_cos();
            let (q0, q1) = (q[i], q[i + 1]);
            q[i] = q0 * cos - q1 * sin;
            q[i + 1] = q0 * sin + q1 * cos;
            if i < kv_dim {
                let (k0, k1) = (k_row[i], k_row[i + 1]);
                k_row[i] = k0 * cos - k1 * sin;
                k_row[i + 1] = k0 * sin + k1 * cos;
            }
        }

        let scale = (head_size as f32).sqrt();
        for head in 0..config.n_heads {
            let q_head = &q[head * head_size..(head + 1) * head_size];
            let att_head = &mut att[head * config.seq_len..head * config.seq_len + pos + 1];
            let kv_head = (head / kv_mul) * head_size;

            for (t, score) in att_head.iter_mut().enumerate() {
                let key = &key_cache[cache_offset + t * kv_dim + kv_head..][..head_size];
                *score = dot(q_head, key) / scale;
            }
            softmax(att_head);

            let xb_head = &mut xb[head * head_size..(head + 1) * head_size];
            xb_head.fill(0.0);
            for (t, &weight) in att_head.iter().enumerate() {
                let value = &value_cache[cache_offset + t * kv_dim + kv_head..][..head_size];
                for (acc, &v) in xb_head.iter_mut().zip(value) {
                    *acc += weight * v;
                }
            }
        }

        matmul(xb2, xb, &weights.wo[layer * dim * dim..(layer + 1) * dim * dim]);
        for (residual, &delta) in x.iter_mut().zip(xb2.iter()) {
            *residual += delta;
        }

        rmsnorm(xb, x, &weights.rms_ffn[layer * dim..(layer + 1) * dim]);
        let ffn = layer * dim * hidden;
        matmul(hb, xb, &weights.w1[ffn..ffn + dim * hidden]);
        matmul(hb2, xb, &weights.w3[ffn..ffn + dim * hidden]);

        // SwiGLU: silu(w1 x) * (w3 x)
        for (gate, &candidate) in hb.iter_mut().zip(hb2.iter()) {
            let v = *gate;
            *gate = v * (1.0 / (1.0 + (-v).exp())) * candidate;
        }

        matmul(xb, hb, &weights.w2[layer * hidden * dim..(layer + 1) * hidden * dim]);
        for (residual, &delta) in x.iter_mut().zip(xb.iter()) {
            *residual += delta;
        }
    }

    rmsnorm_in_place(x, weights.rms_final);
    matmul(logits, x, weights.wcls);
}
