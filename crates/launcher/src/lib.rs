// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Model-runner dispatch and lifecycle framework.
//!
//! This crate is the model-agnostic half of the runtime: it owns argument
//! validation, runner lookup, and the run lifecycle, while the actual
//! inference engines live in their own crates and plug in through the
//! [`Engine`] trait.
//!
//! ```text
//!                 ┌──────────────────┐
//!  LaunchRequest ─▶     launch()     │
//!                 │ validate/resolve │
//!                 └────────┬─────────┘
//!                          │ exact name match
//!                 ┌────────▼─────────┐
//!                 │  RunnerRegistry  │──── unsupported model ──▶ error
//!                 └────────┬─────────┘
//!                          │
//!                 ┌────────▼─────────┐        ┌───────────────┐
//!                 │   ModelRunner    │───────▶│   TokenSink   │
//!                 │ (EngineRunner)   │ tokens │ (stdout, ...) │
//!                 └────────┬─────────┘        └───────────────┘
//!                          │ initialize / generate / deinitialize
//!                 ┌────────▼─────────┐
//!                 │      Engine      │
//!                 └──────────────────┘
//! ```
//!
//! # Lifecycle guarantee
//!
//! [`run_engine`] wraps the engine state in a [`StateGuard`] before
//! `initialize` is attempted, so `deinitialize` runs exactly once per run,
//! on success, on initialization failure, and on generation failure alike.
//! The first non-OK status wins; cleanup cannot replace it.
//!
//! # Streaming
//!
//! Token delivery is synchronous and in order: the engine hands each
//! decoded token to the [`TokenSink`] before producing the next one, and
//! tokens streamed before a mid-run failure stay delivered.

mod args;
mod engine;
mod error;
mod launch;
mod registry;
mod sink;

pub use args::{LaunchArgs, LaunchRequest, DEFAULT_CHECKPOINT_PATH, DEFAULT_TOKENIZER_PATH};
pub use engine::{
    run_engine, Engine, EngineRunner, RunConfig, StateGuard, DEFAULT_STEPS, DEFAULT_TEMPERATURE,
    DEFAULT_TOP_P,
};
pub use error::{EngineError, LaunchError};
pub use launch::launch;
pub use registry::{ModelRunner, RunnerRegistry};
pub use sink::{BufferSink, StdoutSink, TokenSink};
