// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The status taxonomy shared across the launch pipeline.
//!
//! Every lifecycle step reports its outcome through these types. Failure
//! crosses component boundaries as a value, never as a panic, and the first
//! non-OK status is propagated outward unchanged. There are no retries at
//! this layer.

/// Failure categories produced by an engine behind the
/// [`Engine`](crate::Engine) trait.
///
/// These pass through the runner adapter into [`LaunchError`] verbatim;
/// nothing between the engine and the process boundary reinterprets them.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Reading the checkpoint or tokenizer from disk failed.
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    /// A working buffer could not be allocated.
    #[error("allocation of {0} bytes failed")]
    AllocationFailed(usize),

    /// Checkpoint bytes do not match the expected layout.
    #[error("malformed checkpoint: {0}")]
    MalformedCheckpoint(String),

    /// Tokenizer bytes do not match the expected layout.
    #[error("malformed tokenizer: {0}")]
    MalformedTokenizer(String),

    /// The run configuration was rejected by the engine.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Outcome of a launch, surfaced at the process boundary.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    /// Malformed or missing launch input: an empty model or prompt, or a
    /// model name no runner is registered for.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An engine failure, passed through unchanged.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl LaunchError {
    /// Diagnostic for a model name the registry does not know.
    pub(crate) fn unsupported_model(model: &str) -> Self {
        Self::InvalidArgument(format!("unsupported model: '{model}'"))
    }
}
