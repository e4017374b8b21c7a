// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Name-keyed dispatch to model runners.

use crate::args::LaunchArgs;
use crate::error::LaunchError;
use crate::sink::TokenSink;

/// A named entry point capable of running one model family end to end.
///
/// Implementations own the full lifecycle behind [`run`](ModelRunner::run):
/// whatever they initialize they also release, on success and on failure
/// alike, before returning.
pub trait ModelRunner: Send + Sync {
    /// The model name this runner answers to. Matching is exact and
    /// case-sensitive.
    fn name(&self) -> &str;

    /// Runs inference for `args`, streaming decoded tokens into `sink`.
    fn run(&self, args: &LaunchArgs, sink: &mut dyn TokenSink) -> Result<(), LaunchError>;
}

/// Immutable collection of runners, resolved by exact model name.
///
/// Built once at startup and never mutated afterwards. Lookup walks the
/// runners in registration order; with duplicate names the first entry
/// wins.
pub struct RunnerRegistry {
    runners: Vec<Box<dyn ModelRunner>>,
}

impl RunnerRegistry {
    /// Builds the registry from its full, final set of runners.
    pub fn new(runners: Vec<Box<dyn ModelRunner>>) -> Self {
        Self { runners }
    }

    /// Finds the runner registered under exactly `model`, if any.
    pub fn resolve(&self, model: &str) -> Option<&dyn ModelRunner> {
        self.runners
            .iter()
            .find(|runner| runner.name() == model)
            .map(|runner| runner.as_ref())
    }

    /// Registered model names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.runners.iter().map(|runner| runner.name()).collect()
    }

    /// Number of registered runners.
    pub fn len(&self) -> usize {
        self.runners.len()
    }

    /// Whether the registry holds no runners at all.
    pub fn is_empty(&self) -> bool {
        self.runners.is_empty()
    }
}

impl std::fmt::Debug for RunnerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunnerRegistry")
            .field("names", &self.names())
            .finish()
    }
}
