// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Byte-pair tokenizer over a binary vocabulary file.
//!
//! The file starts with the maximum token length as a little-endian `i32`,
//! followed by one record per vocabulary entry: an `f32` merge score, an
//! `i32` byte length, and the piece bytes themselves. The entry count is
//! not stored in the file; it comes from the model header.
//!
//! Encoding is greedy BPE: the text is split into codepoints (with a byte
//! fallback for codepoints outside the vocabulary), then the
//! highest-scoring adjacent pair is merged until no merge applies.

use launcher::EngineError;
use std::collections::HashMap;
use std::path::Path;

/// Unknown-token id, the fallback for bytes outside the vocabulary.
pub const UNK_TOKEN: u32 = 0;

/// Beginning-of-sequence token id.
pub const BOS_TOKEN: u32 = 1;

/// End-of-sequence token id.
pub const EOS_TOKEN: u32 = 2;

/// Offset of the raw-byte fallback tokens: byte `b` encodes as `b + 3`,
/// right after the unknown/BOS/EOS ids.
const BYTE_FALLBACK_OFFSET: u32 = 3;

pub struct Tokenizer {
    vocab: Vec<String>,
    scores: Vec<f32>,
    lookup: HashMap<String, u32>,
    /// Decoded forms of `<0xXX>` pieces; empty for unprintable bytes.
    byte_pieces: Vec<String>,
    max_token_length: usize,
}

impl Tokenizer {
    /// Loads a vocabulary of exactly `vocab_size` entries from `path`.
    ///
    /// The count must cover at least the unknown/BOS/EOS control ids.
    pub fn load(path: &Path, vocab_size: usize) -> Result<Self, EngineError> {
        if vocab_size <= EOS_TOKEN as usize {
            return Err(EngineError::InvalidArgument(format!(
                "vocabulary of {vocab_size} entries cannot hold the control tokens"
            )));
        }
        let data = std::fs::read(path)?;
        let mut cursor = 0usize;

        let max_token_length = read_i32(&data, &mut cursor, "max token length")?;
        if max_token_length <= 0 {
            return Err(EngineError::MalformedTokenizer(format!(
                "non-positive max token length {max_token_length}"
            )));
        }
        let max_token_length = max_token_length as usize;

        // A record is at least nine bytes on disk; a count the file cannot
        // hold is rejected before any room is reserved for it.
        if vocab_size > (data.len() - cursor) / 9 {
            return Err(EngineError::MalformedTokenizer(format!(
                "{vocab_size} tokens cannot fit in a {} byte file",
                data.len()
            )));
        }

        let mut vocab = Vec::with_capacity(vocab_size);
        let mut scores = Vec::with_capacity(vocab_size);
        let mut lookup = HashMap::with_capacity(vocab_size);
        for id in 0..vocab_size {
            let score = f32::from_le_bytes(read_array(&data, &mut cursor, "token score")?);
            let len = read_i32(&data, &mut cursor, "token length")?;
            if len <= 0 || len as usize > max_token_length {
                return Err(EngineError::MalformedTokenizer(format!(
                    "token {id} has length {len}, outside 1..={max_token_length}"
                )));
            }
            let bytes = take(&data, &mut cursor, len as usize, "token bytes")?;
            let piece = String::from_utf8(bytes.to_vec()).map_err(|_| {
                EngineError::MalformedTokenizer(format!("token {id} is not valid UTF-8"))
            })?;

            lookup.entry(piece.clone()).or_insert(id as u32);
            vocab.push(piece);
            scores.push(score);
        }
        if cursor != data.len() {
            return Err(EngineError::MalformedTokenizer(format!(
                "{} trailing bytes after {vocab_size} tokens",
                data.len() - cursor
            )));
        }

        tracing::info!(
            "loaded tokenizer {}: {} tokens, longest {} bytes",
            path.display(),
            vocab_size,
            max_token_length
        );
        Ok(Self {
            vocab,
            scores,
            lookup,
            byte_pieces: build_byte_pieces(),
            max_token_length,
        })
    }

    /// Number of vocabulary entries.
    pub fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    /// Longest piece in the vocabulary, in bytes.
    pub fn max_token_length(&self) -> usize {
        self.max_token_length
    }

    /// Encodes `text` into token ids.
    ///
    /// Non-empty text gets the sentencepiece dummy prefix (the `" "`
    /// token) before its first codepoint. Codepoints missing from the
    /// vocabulary fall back to one raw-byte token per UTF-8 byte; bytes
    /// the vocabulary has no raw-byte entry for become the unknown token.
    pub fn encode(&self, text: &str, add_bos: bool, add_eos: bool) -> Vec<u32> {
        let mut tokens: Vec<u32> = Vec::with_capacity(text.len() + 3);
        if add_bos {
            tokens.push(BOS_TOKEN);
        }
        if !text.is_empty() {
            if let Some(&dummy_prefix) = self.lookup.get(" ") {
                tokens.push(dummy_prefix);
            }
        }

        let mut utf8 = [0u8; 4];
        for ch in text.chars() {
            let piece = ch.encode_utf8(&mut utf8);
            match self.lookup.get(piece) {
                Some(&id) => tokens.push(id),
                None => {
                    for byte in piece.bytes() {
                        let id = u32::from(byte) + BYTE_FALLBACK_OFFSET;
                        tokens.push(if (id as usize) < self.vocab.len() {
                            id
                        } else {
                            UNK_TOKEN
                        });
                    }
                }
            }
        }

        // Merge the best-scoring adjacent pair until none is left.
        loop {
            let mut best: Option<(f32, u32, usize)> = None;
            for at in 0..tokens.len().saturating_sub(1) {
                let merged = format!("{}{}", self.piece(tokens[at]), self.piece(tokens[at + 1]));
                if let Some(&id) = self.lookup.get(&merged) {
                    let score = self.scores[id as usize];
                    if best.map_or(true, |(top, _, _)| score > top) {
                        best = Some((score, id, at));
                    }
                }
            }
            let Some((_, id, at)) = best else { break };
            tokens[at] = id;
            tokens.remove(at + 1);
        }

        if add_eos {
            tokens.push(EOS_TOKEN);
        }
        tokens
    }

    /// Renders the transition from `prev_token` to `token` as text.
    ///
    /// Strips the leading space sentencepiece attaches to the first piece
    /// after BOS, and maps `<0xXX>` raw-byte pieces to their byte. The
    /// result is empty when the piece carries nothing printable; an id
    /// outside the vocabulary is rejected rather than looked up.
    pub fn decode(&self, prev_token: u32, token: u32) -> Result<&str, EngineError> {
        let mut piece = self
            .vocab
            .get(token as usize)
            .ok_or_else(|| {
                EngineError::InvalidArgument(format!(
                    "token id {token} is outside the {} entry vocabulary",
                    self.vocab.len()
                ))
            })?
            .as_str();
        if prev_token == BOS_TOKEN {
            piece = piece.strip_prefix(' ').unwrap_or(piece);
        }
        if let Some(byte) = parse_byte_piece(piece) {
            return Ok(&self.byte_pieces[byte as usize]);
        }
        Ok(piece)
    }

    fn piece(&self, token: u32) -> &str {
        self.vocab.get(token as usize).map_or("", String::as_str)
    }
}

impl std::fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokenizer")
            .field("vocab_size", &self.vocab.len())
            .field("max_token_length", &self.max_token_length)
            .finish()
    }
}

/// Parses a raw-byte piece of the form `<0xXX>`.
fn parse_byte_piece(piece: &str) -> Option<u8> {
    let hex = piece.strip_prefix("<0x")?.strip_suffix('>')?;
    if hex.len() != 2 {
        return None;
    }
    u8::from_str_radix(hex, 16).ok()
}

/// One decoded string per byte value; unprintable bytes decode to nothing.
fn build_byte_pieces() -> Vec<String> {
    (0u8..=255)
        .map(|byte| {
            if byte.is_ascii_graphic() || byte.is_ascii_whitespace() {
                String::from(byte as char)
            } else {
                String::new()
            }
        })
        .collect()
}

fn take<'d>(
    data: &'d [u8],
    cursor: &mut usize,
    len: usize,
    what: &str,
) -> Result<&'d [u8], EngineError> {
    let end = cursor
        .checked_add(len)
        .filter(|&end| end <= data.len())
        .ok_or_else(|| {
            EngineError::MalformedTokenizer(format!("unexpected end of file reading {what}"))
        })?;
    let slice = &data[*cursor..end];
    *cursor = end;
    Ok(slice)
}

fn read_array<const N: usize>(
    data: &[u8],
    cursor: &mut usize,
    what: &str,
) -> Result<[u8; N], EngineError> {
    let slice = take(data, cursor, N, what)?;
    let mut array = [0u8; N];
    array.copy_from_slice(slice);
    Ok(array)
}

fn read_i32(data: &[u8], cursor: &mut usize, what: &str) -> Result<i32, EngineError> {
    Ok(i32::from_le_bytes(read_array(data, cursor, what)?))
}
