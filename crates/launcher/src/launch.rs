// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Top-level launch entry point: validate, resolve, dispatch.

use crate::args::LaunchRequest;
use crate::error::LaunchError;
use crate::registry::RunnerRegistry;
use crate::sink::TokenSink;

/// Validates `request`, resolves its runner, and runs inference.
///
/// Fails fast with `InvalidArgument` before any engine work starts when the
/// request is malformed or names an unregistered model. Once a runner is
/// dispatched, its status is returned unchanged.
pub fn launch(
    registry: &RunnerRegistry,
    request: LaunchRequest,
    sink: &mut dyn TokenSink,
) -> Result<(), LaunchError> {
    let args = request.resolve()?;

    let Some(runner) = registry.resolve(&args.model) else {
        tracing::error!("unsupported model: '{}'", args.model);
        return Err(LaunchError::unsupported_model(&args.model));
    };

    tracing::debug!(
        "dispatching model '{}' (checkpoint {}, tokenizer {})",
        args.model,
        args.checkpoint_path.display(),
        args.tokenizer_path.display()
    );
    runner.run(&args, sink)
}
