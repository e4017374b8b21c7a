// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Memory-mapped model checkpoints.
//!
//! A checkpoint is a flat binary file: a seven-field `i32` header followed
//! by `f32` weight tensors in a fixed order, all little-endian.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │ dim │ hidden_dim │ n_layers │ n_heads │ n_kv_heads │ ...   │  header
//! ├────────────────────────────────────────────────────────────┤
//! │ token embeddings │ attention norms │ wq │ wk │ wv │ wo │...│  f32 body
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! A negative `vocab_size` in the header marks an unshared classifier: the
//! output projection is stored as its own tensor at the end of the file
//! instead of reusing the token embedding table. Two legacy RoPE frequency
//! tables sit between the final norm weights and that optional classifier;
//! they are skipped, never read.
//!
//! The file stays on disk: it is mapped read-only and tensors are carved
//! out as borrowed slices, so even multi-gigabyte checkpoints cost no
//! resident copy.

use launcher::EngineError;
use memmap2::Mmap;
use std::fs::File;
use std::ops::Range;
use std::path::Path;

/// Size of the checkpoint header in bytes: seven little-endian `i32`s.
pub const HEADER_BYTES: usize = 28;

// ── Header ─────────────────────────────────────────────────────

/// Transformer hyperparameters, decoded from the checkpoint header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelConfig {
    /// Embedding width.
    pub dim: usize,
    /// Feed-forward hidden width.
    pub hidden_dim: usize,
    /// Number of transformer layers.
    pub n_layers: usize,
    /// Number of query heads.
    pub n_heads: usize,
    /// Number of key/value heads (grouped-query attention when fewer than
    /// `n_heads`).
    pub n_kv_heads: usize,
    /// Vocabulary size.
    pub vocab_size: usize,
    /// Maximum sequence length the checkpoint was trained for.
    pub seq_len: usize,
    /// Whether the output classifier reuses the token embedding table.
    pub shared_classifier: bool,
}

impl ModelConfig {
    /// Width of one attention head.
    pub fn head_size(&self) -> usize {
        self.dim / self.n_heads
    }

    /// Width of one key/value position across all kv heads.
    pub fn kv_dim(&self) -> usize {
        self.dim * self.n_kv_heads / self.n_heads
    }

    /// Query heads per key/value head.
    pub fn kv_mul(&self) -> usize {
        self.n_heads / self.n_kv_heads
    }

    fn parse(header: &[u8]) -> Result<Self, EngineError> {
        let mut fields = [0i32; 7];
        for (field, chunk) in fields.iter_mut().zip(header.chunks_exact(4)) {
            *field = i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        let [dim, hidden_dim, n_layers, n_heads, n_kv_heads, raw_vocab, seq_len] = fields;

        // vocab_size doubles as the shared-classifier flag via its sign.
        let shared_classifier = raw_vocab > 0;
        let vocab_size = raw_vocab.unsigned_abs() as usize;

        let dims = [
            ("dim", dim),
            ("hidden_dim", hidden_dim),
            ("n_layers", n_layers),
            ("n_heads", n_heads),
            ("n_kv_heads", n_kv_heads),
            ("seq_len", seq_len),
        ];
        for (name, value) in dims {
            if value <= 0 {
                return Err(EngineError::MalformedCheckpoint(format!(
                    "non-positive {name} {value} in header"
                )));
            }
        }
        if vocab_size == 0 {
            return Err(EngineError::MalformedCheckpoint(
                "zero vocab_size in header".to_string(),
            ));
        }
        if dim % 2 != 0 {
            return Err(EngineError::MalformedCheckpoint(format!(
                "odd dim {dim}, rotary embedding needs paired lanes"
            )));
        }
        if dim % n_heads != 0 {
            return Err(EngineError::MalformedCheckpoint(format!(
                "dim {dim} not divisible by n_heads {n_heads}"
            )));
        }
        if n_heads % n_kv_heads != 0 {
            return Err(EngineError::MalformedCheckpoint(format!(
                "n_heads {n_heads} not divisible by n_kv_heads {n_kv_heads}"
            )));
        }

        Ok(Self {
            dim: dim as usize,
            hidden_dim: hidden_dim as usize,
            n_layers: n_layers as usize,
            n_heads: n_heads as usize,
            n_kv_heads: n_kv_heads as usize,
            vocab_size,
            seq_len: seq_len as usize,
            shared_classifier,
        })
    }

    /// Total `f32` count the file body must hold for this header, or
    /// `None` when the implied tensor sizes overflow `usize`.
    fn body_floats(&self) -> Option<usize> {
        let layers = self.n_layers;
        let kv_dim = self.dim.checked_mul(self.n_kv_heads)? / self.n_heads;
        let dim_sq = self.dim.checked_mul(self.dim)?;
        let dim_kv = self.dim.checked_mul(kv_dim)?;
        let dim_hidden = self.dim.checked_mul(self.hidden_dim)?;
        let embeddings = self.vocab_size.checked_mul(self.dim)?;

        let per_layer = [
            self.dim,   // attention norms
            dim_sq,     // wq
            dim_kv,     // wk
            dim_kv,     // wv
            dim_sq,     // wo
            self.dim,   // ffn norms
            dim_hidden, // w1
            dim_hidden, // w2
            dim_hidden, // w3
        ];
        let mut total = embeddings; // token embeddings
        for floats in per_layer {
            total = total.checked_add(layers.checked_mul(floats)?)?;
        }
        total = total.checked_add(self.dim)?; // final norm
        total = total.checked_add(self.seq_len.checked_mul(self.head_size())?)?; // legacy RoPE tables
        if !self.shared_classifier {
            total = total.checked_add(embeddings)?; // classifier
        }
        Some(total)
    }
}

// ── Tensor layout ──────────────────────────────────────────────

/// Float-index ranges of every tensor inside the mapped body.
struct TensorLayout {
    token_embedding: Range<usize>,
    rms_att: Range<usize>,
    wq: Range<usize>,
    wk: Range<usize>,
    wv: Range<usize>,
    wo: Range<usize>,
    rms_ffn: Range<usize>,
    w1: Range<usize>,
    w2: Range<usize>,
    w3: Range<usize>,
    rms_final: Range<usize>,
    wcls: Range<usize>,
}

impl TensorLayout {
    fn for_config(config: &ModelConfig) -> Self {
        let layers = config.n_layers;
        let dim = config.dim;
        let kv_dim = config.kv_dim();
        let hidden = config.hidden_dim;

        let mut cursor = 0usize;
        let mut next = |floats: usize| {
            let range = cursor..cursor + floats;
            cursor += floats;
            range
        };

        let token_embedding = next(config.vocab_size * dim);
        let rms_att = next(layers * dim);
        let wq = next(layers * dim * dim);
        let wk = next(layers * dim * kv_dim);
        let wv = next(layers * dim * kv_dim);
        let wo = next(layers * dim * dim);
        let rms_ffn = next(layers * dim);
        let w1 = next(layers * dim * hidden);
        let w2 = next(layers * hidden * dim);
        let w3 = next(layers * dim * hidden);
        let rms_final = next(dim);
        let _legacy_rope = next(config.seq_len * config.head_size());
        let wcls = if config.shared_classifier {
            token_embedding.clone()
        } else {
            next(config.vocab_size * dim)
        };

        Self {
            token_embedding,
            rms_att,
            wq,
            wk,
            wv,
            wo,
            rms_ffn,
            w1,
            w2,
            w3,
            rms_final,
            wcls,
        }
    }
}

// ── Mapped checkpoint ──────────────────────────────────────────

/// A validated, read-only mapped checkpoint.
pub struct Checkpoint {
    mmap: Mmap,
    config: ModelConfig,
    layout: TensorLayout,
}

impl Checkpoint {
    /// Maps and validates the checkpoint at `path`.
    ///
    /// The file size must match the header exactly; a short or oversized
    /// file is rejected rather than read past or silently truncated.
    pub fn open(path: &Path) -> Result<Self, EngineError> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        if mmap.len() < HEADER_BYTES {
            return Err(EngineError::MalformedCheckpoint(format!(
                "file is {} bytes, shorter than the {HEADER_BYTES}-byte header",
                mmap.len()
            )));
        }
        let config = ModelConfig::parse(&mmap[..HEADER_BYTES])?;

        let expected = config
            .body_floats()
            .and_then(|floats| floats.checked_mul(4))
            .and_then(|bytes| bytes.checked_add(HEADER_BYTES))
            .ok_or_else(|| {
                EngineError::MalformedCheckpoint(
                    "header dimensions overflow the addressable range".to_string(),
                )
            })?;
        if mmap.len() != expected {
            return Err(EngineError::MalformedCheckpoint(format!(
                "file is {} bytes, header implies {expected}",
                mmap.len()
            )));
        }

        tracing::info!(
            "mapped checkpoint {}: dim {}, {} layers, {} heads, vocab {}, seq_len {}",
            path.display(),
            config.dim,
            config.n_layers,
            config.n_heads,
            config.vocab_size,
            config.seq_len
        );

        let layout = TensorLayout::for_config(&config);
        Ok(Self {
            mmap,
            config,
            layout,
        })
    }

    /// The decoded header.
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Borrows every weight tensor out of the mapping.
    pub fn weights(&self) -> Weights<'_> {
        let floats = self.body();
        Weights {
            token_embedding: &floats[self.layout.token_embedding.clone()],
            rms_att: &floats[self.layout.rms_att.clone()],
            wq: &floats[self.layout.wq.clone()],
            wk: &floats[self.layout.wk.clone()],
            wv: &floats[self.layout.wv.clone()],
            wo: &floats[self.layout.wo.clone()],
            rms_ffn: &floats[self.layout.rms_ffn.clone()],
            w1: &floats[self.layout.w1.clone()],
            w2: &floats[self.layout.w2.clone()],
            w3: &floats[self.layout.w3.clone()],
            rms_final: &floats[self.layout.rms_final.clone()],
            wcls: &floats[self.layout.wcls.clone()],
        }
    }

    /// The mapped body viewed as `f32`s.
    ///
    /// Safe to reinterpret: the mapping is page-aligned, the 28-byte
    /// header keeps the body 4-byte aligned, and `open` proved the length
    /// is a whole number of floats.
    fn body(&self) -> &[f32] {
        let bytes = &self.mmap[HEADER_BYTES..];
        debug_assert_eq!(bytes.as_ptr() as usize % std::mem::align_of::<f32>(), 0);
        unsafe { std::slice::from_raw_parts(bytes.as_ptr() as *const f32, bytes.len() / 4) }
    }
}

impl std::fmt::Debug for Checkpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Checkpoint")
            .field("config", &self.config)
            .field("bytes", &self.mmap.len())
            .finish()
    }
}

/// Weight tensors borrowed from a [`Checkpoint`].
///
/// Per-layer matrices are concatenated along the layer axis; the forward
/// pass slices them per layer. `wcls` aliases `token_embedding` when the
/// classifier is shared.
pub struct Weights<'a> {
    pub token_embedding: &'a [f32],
    pub rms_att: &'a [f32],
    pub wq: &'a [f32],
    pub wk: &'a [f32],
    pub wv: &'a [f32],
    pub wo: &'a [f32],
    pub rms_ffn: &'a [f32],
    pub w1: &'a [f32],
    pub w2: &'a [f32],
    pub w3: &'a [f32],
    pub rms_final: &'a [f32],
    pub wcls: &'a [f32],
}
