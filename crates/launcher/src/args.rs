// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Launch arguments and the built-in default paths.
//!
//! Input arrives as a [`LaunchRequest`] carrying exactly what the caller
//! supplied. [`LaunchRequest::resolve`] validates it and substitutes the
//! fixed default paths, producing an immutable [`LaunchArgs`] that the rest
//! of the pipeline reads but never mutates.

use crate::error::LaunchError;
use std::path::PathBuf;

/// Checkpoint used when no `--checkpoint` is given.
pub const DEFAULT_CHECKPOINT_PATH: &str = "models/tinystories110M.bin";

/// Tokenizer used when no `--tokenizer_path` is given.
pub const DEFAULT_TOKENIZER_PATH: &str = "models/tokenizer.bin";

/// Raw launch input, prior to validation and default substitution.
#[derive(Debug, Clone, Default)]
pub struct LaunchRequest {
    /// Requested model name.
    pub model: String,
    /// Generation seed text.
    pub prompt: String,
    /// Path to the model weights, if the caller gave one.
    pub checkpoint_path: Option<PathBuf>,
    /// Path to the tokenizer, if the caller gave one.
    pub tokenizer_path: Option<PathBuf>,
}

impl LaunchRequest {
    /// Creates a request for `model` with the given prompt and no explicit
    /// paths.
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            checkpoint_path: None,
            tokenizer_path: None,
        }
    }

    /// Sets an explicit checkpoint path.
    pub fn with_checkpoint_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.checkpoint_path = Some(path.into());
        self
    }

    /// Sets an explicit tokenizer path.
    pub fn with_tokenizer_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.tokenizer_path = Some(path.into());
        self
    }

    /// Validates the request and resolves it into [`LaunchArgs`].
    ///
    /// `model` and `prompt` must be non-empty; a missing checkpoint or
    /// tokenizer path falls back to the built-in default. Supplied paths
    /// pass through unmodified.
    pub fn resolve(self) -> Result<LaunchArgs, LaunchError> {
        if self.model.is_empty() {
            return Err(LaunchError::InvalidArgument(
                "model must not be empty".into(),
            ));
        }
        if self.prompt.is_empty() {
            return Err(LaunchError::InvalidArgument(
                "prompt must not be empty".into(),
            ));
        }

        Ok(LaunchArgs {
            model: self.model,
            prompt: self.prompt,
            checkpoint_path: self
                .checkpoint_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CHECKPOINT_PATH)),
            tokenizer_path: self
                .tokenizer_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TOKENIZER_PATH)),
        })
    }
}

/// Validated, fully-resolved arguments for one launch.
///
/// Immutable once constructed; one value per invocation.
#[derive(Debug, Clone)]
pub struct LaunchArgs {
    /// Model name the registry dispatches on.
    pub model: String,
    /// Generation seed text, guaranteed non-empty.
    pub prompt: String,
    /// Model weights file.
    pub checkpoint_path: PathBuf,
    /// Tokenizer file.
    pub tokenizer_path: PathBuf,
}
