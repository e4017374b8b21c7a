// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `textgen` command-line entry point.
//!
//! Wires the built-in engines into a runner registry, turns flags into a
//! launch request, and streams tokens to stdout. Diagnostics go to stderr
//! so the token stream stays pipeable.

use clap::{ArgAction, CommandFactory, Parser};
use launcher::{launch, EngineRunner, LaunchRequest, RunnerRegistry, StdoutSink};
use llama2_engine::Llama2Engine;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(
    name = "textgen",
    version,
    about = "Run local language-model inference and stream the output"
)]
struct Cli {
    /// Model to run.
    #[arg(short, long, default_value = "llama2")]
    model: String,

    /// Prompt to seed generation with.
    #[arg(short, long, default_value = "")]
    prompt: String,

    /// Path to the model checkpoint.
    #[arg(short, long, default_value = "")]
    checkpoint: String,

    /// Path to the tokenizer.
    #[arg(short = 't', long = "tokenizer_path", default_value = "")]
    tokenizer_path: String,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Every engine this binary ships, keyed by model name.
fn builtin_registry() -> RunnerRegistry {
    RunnerRegistry::new(vec![Box::new(EngineRunner::new(
        "llama2",
        Llama2Engine::new(),
    ))])
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.model.is_empty() || cli.prompt.is_empty() {
        let _ = Cli::command().print_help();
        return ExitCode::FAILURE;
    }

    let mut request = LaunchRequest::new(&cli.model, &cli.prompt);
    if !cli.checkpoint.is_empty() {
        request = request.with_checkpoint_path(&cli.checkpoint);
    }
    if !cli.tokenizer_path.is_empty() {
        request = request.with_tokenizer_path(&cli.tokenizer_path);
    }

    let registry = builtin_registry();
    let mut sink = StdoutSink::new();
    match launch(&registry, request, &mut sink) {
        Ok(()) => {
            println!();
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!("failed to run inference: {err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["textgen"]).unwrap();
        assert_eq!(cli.model, "llama2");
        assert_eq!(cli.prompt, "");
        assert_eq!(cli.checkpoint, "");
        assert_eq!(cli.tokenizer_path, "");
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_short_flags() {
        let cli = Cli::try_parse_from([
            "textgen", "-m", "llama2", "-p", "Hello", "-c", "w.bin", "-t", "tok.bin", "-vv",
        ])
        .unwrap();
        assert_eq!(cli.prompt, "Hello");
        assert_eq!(cli.checkpoint, "w.bin");
        assert_eq!(cli.tokenizer_path, "tok.bin");
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_long_tokenizer_flag_uses_underscore() {
        let cli =
            Cli::try_parse_from(["textgen", "--tokenizer_path", "tok.bin"]).unwrap();
        assert_eq!(cli.tokenizer_path, "tok.bin");
    }

    #[test]
    fn test_builtin_registry_serves_llama2() {
        let registry = builtin_registry();
        assert!(registry.resolve("llama2").is_some());
        assert!(registry.resolve("gpt2").is_none());
        assert_eq!(registry.names(), ["llama2"]);
    }
}
