//! Shodan-compatible favicon fingerprints.
//!
//! The search engines hash the *line-wrapped* base64 text of the icon, not the
//! raw bytes: standard base64 with a `\n` after every 76 characters and after
//! the last line, then MurmurHash3 (x86, 32-bit, seed 0) reported as a signed
//! integer. Any deviation in wrapping changes the hash.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Characters per line in the wrapped base64 text.
pub const LINE_LENGTH: usize = 76;

/// Input bytes that encode to exactly one full line.
const BYTES_PER_LINE: usize = LINE_LENGTH / 4 * 3;

const SEED: u32 = 0;

/// Base64-encodes `bytes` and wraps the output at [`LINE_LENGTH`] characters,
/// terminating every line (including the last) with `\n`.
///
/// Empty input yields an empty string.
pub fn encode_wrapped(bytes: &[u8]) -> String {
    let lines = bytes.len().div_ceil(BYTES_PER_LINE);
    let mut encoded = String::with_capacity(lines * (LINE_LENGTH + 1));
    // 57 input bytes encode to exactly 76 characters with no padding, so
    // encoding chunk by chunk is the same as wrapping the whole encoding.
    for chunk in bytes.chunks(BYTES_PER_LINE) {
        STANDARD.encode_string(chunk, &mut encoded);
        encoded.push('\n');
    }
    encoded
}

/// Computes the favicon hash used by Shodan, ZoomEye and FOFA.
pub fn favicon_hash(bytes: &[u8]) -> i32 {
    let encoded = encode_wrapped(bytes);
    murmurhash3::murmurhash3_x86_32(encoded.as_bytes(), SEED) as i32
}

/// Guesses the image format from the leading magic bytes.
pub fn sniff_format(bytes: &[u8]) -> Option<String> {
    image::guess_format(bytes)
        .ok()
        .map(|format| format!("{:?}", format))
}

/// Where the hashed bytes came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "location", rename_all = "lowercase")]
pub enum Source {
    Url(String),
    File(PathBuf),
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Url(url) => f.write_str(url),
            Source::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// A computed fingerprint together with what it was computed from.
#[derive(Debug, Clone, Serialize)]
pub struct Fingerprint {
    pub hash: i32,
    pub source: Source,
    pub size: usize,
    pub format: Option<String>,
    pub computed_at: DateTime<Utc>,
}

impl Fingerprint {
    pub fn compute(source: Source, bytes: &[u8]) -> Self {
        let hash = favicon_hash(bytes);
        tracing::debug!("Hashed {} bytes from {}: {}", bytes.len(), source, hash);
        Self {
            hash,
            source,
            size: bytes.len(),
            format: sniff_format(bytes),
            computed_at: Utc::now(),
        }
    }
}
