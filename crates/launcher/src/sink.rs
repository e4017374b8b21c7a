// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Token sinks: where generated text goes, one token at a time.
//!
//! An engine hands each decoded token to a [`TokenSink`] synchronously, in
//! generation order, before producing the next one. The sink runs on the
//! only thread driving generation, so a blocking sink stalls token
//! production. There is no backpressure channel and no return value.

use std::io::Write;

/// Receives generated tokens one at a time, in order.
pub trait TokenSink {
    /// Accepts the next token.
    fn on_token(&mut self, token: &str);
}

/// Any `FnMut(&str)` closure is a sink; captured state replaces the opaque
/// cookie of a raw callback.
impl<F: FnMut(&str)> TokenSink for F {
    fn on_token(&mut self, token: &str) {
        self(token);
    }
}

/// Writes tokens to standard output, flushing after every token so each one
/// is visible the moment it is produced.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl StdoutSink {
    /// Creates a stdout sink.
    pub fn new() -> Self {
        Self
    }
}

impl TokenSink for StdoutSink {
    fn on_token(&mut self, token: &str) {
        let mut out = std::io::stdout().lock();
        let _ = out.write_all(token.as_bytes());
        let _ = out.flush();
    }
}

/// Collects tokens in memory; used by tests and capture paths.
#[derive(Debug, Default)]
pub struct BufferSink {
    tokens: Vec<String>,
}

impl BufferSink {
    /// Creates an empty buffer sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tokens received so far, in arrival order.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// All received tokens joined into one string.
    pub fn text(&self) -> String {
        self.tokens.concat()
    }
}

impl TokenSink for BufferSink {
    fn on_token(&mut self, token: &str) {
        self.tokens.push(token.to_string());
    }
}
