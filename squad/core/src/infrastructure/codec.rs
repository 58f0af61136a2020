// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Wire Codec
//!
//! Reversible two-stage payload codec for the message bus: a dictionary pass
//! substitutes well-known command tokens with short markers, then a gzip pass
//! is applied only when it yields a net size reduction.
//!
//! On-wire representation: an optional `GZ:` marker followed by either the
//! (possibly dictionary-substituted) text or the compressed bytes. Two extra
//! tags keep the round-trip byte-exact for arbitrary input: `DC:` marks text
//! that went through the dictionary pass, and `RAW:` escapes text that
//! happens to begin with a reserved tag. Decode is the exact inverse of
//! encode.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use thiserror::Error;

const GZIP_TAG: &[u8] = b"GZ:";
const DICT_TAG: &str = "DC:";
const RAW_TAG: &str = "RAW:";

/// Only payloads above this size are worth a gzip attempt.
const GZIP_THRESHOLD: usize = 100;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("gzip decompression failed: {0}")]
    Gzip(#[from] std::io::Error),

    #[error("payload is not valid utf-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Dictionary + gzip payload codec.
///
/// The dictionary maps long command vocabulary to two-character markers.
/// Substitution is longest-token-first so no token is clobbered by a
/// prefix of another.
pub struct WireCodec {
    /// (long, short), sorted by descending token length.
    dictionary: Vec<(String, String)>,
}

impl WireCodec {
    pub fn new() -> Self {
        Self::with_extensions(std::iter::empty())
    }

    /// Codec with extra `(long, short)` token pairs on top of the built-in
    /// command vocabulary, e.g. squad-specific patterns learned at runtime.
    /// An extension that would make a payload ambiguous is simply never
    /// applied: the staging pass only substitutes when the result expands
    /// back to the exact input.
    pub fn with_extensions<I>(extra: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut dictionary: Vec<(String, String)> = [
            // Directives
            ("SYNCHRONIZE", "!S"),
            ("COORDINATE", "!C"),
            ("OPTIMIZE", "!O"),
            ("EXECUTE", "!X"),
            ("QUERY", "!Q"),
            ("UPDATE", "!U"),
            ("MERGE", "!M"),
            ("BROADCAST", "!B"),
            ("REFLECT", "!R"),
            ("ANALYZE", "!A"),
            // Operators
            ("IMMEDIATE", "@I"),
            ("BATCH", "@B"),
            ("ASYNC", "@A"),
            ("MIRROR", "@M"),
            ("FRACTAL", "@F"),
            ("VECTOR", "@V"),
            ("QUANTUM", "@Q"),
            ("RECURSIVE", "@R"),
            // Targets
            ("ALL_SQUADS", "#*"),
            ("ARCHITECTURE", "#A"),
            ("INTEGRATION", "#I"),
            ("PERFORMANCE", "#P"),
            ("TESTING", "#T"),
            ("SECURITY", "#S"),
            ("DOCUMENTATION", "#D"),
            // Common parameters
            ("PRIORITY_HIGH", "^H"),
            ("PRIORITY_MEDIUM", "^M"),
            ("PRIORITY_LOW", "^L"),
        ]
        .into_iter()
        .map(|(long, short)| (long.to_string(), short.to_string()))
        .collect();
        dictionary.extend(extra);
        dictionary.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Self { dictionary }
    }

    /// Encode `text` for the wire.
    pub fn encode(&self, text: &str) -> Vec<u8> {
        let staged = self.stage_text(text);

        if staged.len() > GZIP_THRESHOLD {
            if let Ok(compressed) = gzip(staged.as_bytes()) {
                if compressed.len() + GZIP_TAG.len() < staged.len() {
                    let mut out = Vec::with_capacity(GZIP_TAG.len() + compressed.len());
                    out.extend_from_slice(GZIP_TAG);
                    out.extend_from_slice(&compressed);
                    return out;
                }
            }
        }

        staged.into_bytes()
    }

    /// Exact inverse of [`encode`](Self::encode).
    pub fn decode(&self, data: &[u8]) -> Result<String, CodecError> {
        let text = if let Some(compressed) = data.strip_prefix(GZIP_TAG) {
            let mut decoder = GzDecoder::new(compressed);
            let mut buf = Vec::new();
            decoder.read_to_end(&mut buf)?;
            String::from_utf8(buf)?
        } else {
            String::from_utf8(data.to_vec())?
        };

        if let Some(substituted) = text.strip_prefix(DICT_TAG) {
            Ok(self.expand(substituted))
        } else if let Some(escaped) = text.strip_prefix(RAW_TAG) {
            Ok(escaped.to_string())
        } else {
            Ok(text)
        }
    }

    /// Compression ratio achieved on `text` (original / encoded size).
    pub fn ratio(&self, text: &str) -> f64 {
        let encoded = self.encode(text);
        if encoded.is_empty() {
            return 1.0;
        }
        text.len() as f64 / encoded.len() as f64
    }

    /// Apply the dictionary pass when it is provably reversible, tagging the
    /// result; otherwise pass the text through (escaped if it collides with a
    /// reserved tag).
    fn stage_text(&self, text: &str) -> String {
        let substituted = self.substitute(text);
        if substituted.len() < text.len() && self.expand(&substituted) == text {
            return format!("{DICT_TAG}{substituted}");
        }
        if text.starts_with(DICT_TAG)
            || text.starts_with(RAW_TAG)
            || text.as_bytes().starts_with(GZIP_TAG)
        {
            return format!("{RAW_TAG}{text}");
        }
        text.to_string()
    }

    fn substitute(&self, text: &str) -> String {
        let mut out = text.to_string();
        for (long, short) in &self.dictionary {
            out = out.replace(long.as_str(), short.as_str());
        }
        out
    }

    fn expand(&self, text: &str) -> String {
        let mut out = text.to_string();
        // Reverse order: shortest long-tokens were substituted last.
        for (long, short) in self.dictionary.iter().rev() {
            out = out.replace(short.as_str(), long.as_str());
        }
        out
    }
}

impl Default for WireCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}
