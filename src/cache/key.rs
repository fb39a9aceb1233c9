//! Cache key derivation.
//! Key: blake3 hash of (provider | model | src_lang | tgt_lang | normalized_text),
//! hex encoded. Normalization folds inputs a human would call "the same request"
//! onto one key: NFC composition, line endings, whitespace runs, outer whitespace.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

/// Length of a hex-encoded key (256-bit digest).
pub const KEY_HEX_LEN: usize = 64;

/// Space, tab, LF, CR and form feed.
static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\n\r\x0C]+").expect("static whitespace pattern"));

/// Opaque cache key: lowercase hex of a 256-bit digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct CacheKey(String);

impl CacheKey {
    /// Parse a key previously produced by [`derive_key`].
    /// Returns None unless `hex` is exactly 64 hex digits; uppercase is folded.
    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() != KEY_HEX_LEN || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        Some(Self(hex.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix for log lines.
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl TryFrom<String> for CacheKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
            .ok_or_else(|| format!("invalid cache key (expected {KEY_HEX_LEN} hex digits): {value:?}"))
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Canonicalize source text before hashing.
///
/// The steps run in a fixed order so that every implementation produces the
/// same bytes: NFC, then CRLF/CR to LF, then whitespace runs to one space,
/// then trim.
pub fn normalize_text(text: &str) -> String {
    let composed: String = text.nfc().collect();
    let unified = composed.replace("\r\n", "\n").replace('\r', "\n");
    let collapsed = WHITESPACE_RUN.replace_all(&unified, " ");
    collapsed.trim().to_string()
}

/// Derive the cache key for one translation request.
pub fn derive_key(
    provider: &str,
    model: &str,
    source_lang: &str,
    target_lang: &str,
    text: &str,
) -> CacheKey {
    let normalized = normalize_text(text);
    let mut hasher = blake3::Hasher::new();
    hasher.update(provider.as_bytes());
    hasher.update(b"|");
    hasher.update(model.as_bytes());
    hasher.update(b"|");
    hasher.update(source_lang.as_bytes());
    hasher.update(b"|");
    hasher.update(target_lang.as_bytes());
    hasher.update(b"|");
    hasher.update(normalized.as_bytes());
    CacheKey(hasher.finalize().to_hex().to_string())
}
