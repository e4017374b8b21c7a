// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The engine lifecycle: configure → initialize → generate → deinitialize.
//!
//! ```text
//! EngineRunner::run(args, sink)
//!     │  RunConfig::from_args            (configure)
//!     ▼
//! StateGuard::new(engine)                (blank state, release armed)
//!     │  engine.initialize               (may fail; release still runs)
//!     │  engine.generate                 (streams tokens into the sink)
//!     ▼
//! guard drop → engine.deinitialize       (exactly once, on every path)
//! ```
//!
//! The guard is created *before* `initialize` is attempted, so a failed or
//! partial initialization is still deinitialized. The first non-OK status
//! from initialize/generate is the status of the whole run; cleanup cannot
//! override it.

use crate::args::LaunchArgs;
use crate::error::{EngineError, LaunchError};
use crate::registry::ModelRunner;
use crate::sink::TokenSink;
use std::path::PathBuf;

/// Sampling temperature used when none is configured.
pub const DEFAULT_TEMPERATURE: f32 = 1.0;

/// Nucleus sampling cutoff used when none is configured.
pub const DEFAULT_TOP_P: f32 = 0.9;

/// Sequence-length bound (prompt included) used when none is configured.
pub const DEFAULT_STEPS: u32 = 256;

// ── Run configuration ──────────────────────────────────────────

/// Engine-facing configuration for one run.
///
/// Derived 1:1 from [`LaunchArgs`] plus generation parameters. Owned by the
/// runner for the duration of one run and never shared across runs. The
/// token sink is not part of the configuration; it travels as an explicit
/// parameter so the configuration stays plain data.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Generation seed text.
    pub prompt: String,
    /// Model weights file.
    pub checkpoint_path: PathBuf,
    /// Tokenizer file.
    pub tokenizer_path: PathBuf,
    /// Sampling temperature; `0.0` selects greedy decoding.
    pub temperature: f32,
    /// Nucleus sampling cutoff in `(0, 1)`; values outside disable it.
    pub top_p: f32,
    /// Upper bound on the sequence length, prompt included.
    pub steps: u32,
    /// Sampler RNG seed; `None` seeds from the clock.
    pub seed: Option<u64>,
}

impl RunConfig {
    /// Builds the engine configuration for `args`, with default generation
    /// parameters.
    pub fn from_args(args: &LaunchArgs) -> Self {
        Self {
            prompt: args.prompt.clone(),
            checkpoint_path: args.checkpoint_path.clone(),
            tokenizer_path: args.tokenizer_path.clone(),
            ..Self::default()
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            checkpoint_path: PathBuf::from(crate::DEFAULT_CHECKPOINT_PATH),
            tokenizer_path: PathBuf::from(crate::DEFAULT_TOKENIZER_PATH),
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            steps: DEFAULT_STEPS,
            seed: None,
        }
    }
}

// ── Engine contract ────────────────────────────────────────────

/// A text-generation engine driven through the four-phase lifecycle.
///
/// `State` holds everything the engine loads or allocates for one run:
/// weights, tokenizer tables, working buffers. `State::default()` is the
/// blank pre-initialize state; [`Engine::deinitialize`] must accept it, and
/// any partially-filled state a failed `initialize` leaves behind, without
/// double-releasing anything.
pub trait Engine {
    /// Per-run mutable state, created blank and filled by `initialize`.
    type State: Default;

    /// Loads everything `generate` needs into `state`.
    ///
    /// On failure the partially-filled `state` is still handed to
    /// `deinitialize` by the caller; implementations do not clean up here.
    fn initialize(&self, config: &RunConfig, state: &mut Self::State)
        -> Result<(), EngineError>;

    /// Produces the token sequence for `config.prompt`.
    ///
    /// Every decoded token is pushed into `sink` synchronously, in
    /// generation order, before the next one is produced. Returns after the
    /// stopping condition (end of sequence or `config.steps`) or on the
    /// first fatal error; tokens already streamed stay delivered.
    fn generate(
        &self,
        config: &RunConfig,
        state: &mut Self::State,
        sink: &mut dyn TokenSink,
    ) -> Result<(), EngineError>;

    /// Releases `state`.
    ///
    /// Called exactly once per run after `initialize` was attempted,
    /// whatever the outcome. Must tolerate a blank or partially-filled
    /// state.
    fn deinitialize(&self, state: &mut Self::State);
}

// ── Cleanup guard ──────────────────────────────────────────────

/// Scoped ownership of an engine's run state.
///
/// The guard owns the state from before `initialize` is attempted until the
/// run ends, and calls [`Engine::deinitialize`] exactly once on drop. Early
/// returns and failures cannot skip the release.
pub struct StateGuard<'e, E: Engine> {
    engine: &'e E,
    state: E::State,
}

impl<'e, E: Engine> StateGuard<'e, E> {
    /// Arms cleanup over a fresh blank state.
    pub fn new(engine: &'e E) -> Self {
        Self {
            engine,
            state: E::State::default(),
        }
    }

    /// The guarded run state.
    pub fn state_mut(&mut self) -> &mut E::State {
        &mut self.state
    }
}

impl<E: Engine> Drop for StateGuard<'_, E> {
    fn drop(&mut self) {
        self.engine.deinitialize(&mut self.state);
    }
}

/// Drives one full lifecycle of `engine` for `config`.
///
/// Returns the first non-OK status from initialize/generate, or `Ok` if
/// both succeeded. Deinitialization runs on every exit path.
pub fn run_engine<E: Engine>(
    engine: &E,
    config: &RunConfig,
    sink: &mut dyn TokenSink,
) -> Result<(), LaunchError> {
    let mut guard = StateGuard::new(engine);
    engine.initialize(config, guard.state_mut())?;
    engine.generate(config, guard.state_mut(), sink)?;
    Ok(())
}

// ── Runner adapter ─────────────────────────────────────────────

/// Binds a model name to an [`Engine`], making it dispatchable through the
/// [`RunnerRegistry`](crate::RunnerRegistry).
pub struct EngineRunner<E> {
    name: String,
    engine: E,
}

impl<E: Engine> EngineRunner<E> {
    /// Creates a runner that dispatches `name` to `engine`.
    pub fn new(name: impl Into<String>, engine: E) -> Self {
        Self {
            name: name.into(),
            engine,
        }
    }
}

impl<E: Engine + Send + Sync> ModelRunner for EngineRunner<E> {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, args: &LaunchArgs, sink: &mut dyn TokenSink) -> Result<(), LaunchError> {
        let config = RunConfig::from_args(args);
        tracing::debug!("running '{}' against {}", self.name, config.checkpoint_path.display());
        run_engine(&self.engine, &config, sink)
    }
}

impl<E> std::fmt::Debug for EngineRunner<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRunner")
            .field("name", &self.name)
            .finish()
    }
}
