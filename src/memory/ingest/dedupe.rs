//! Semantic hashing for approximate duplicate detection.
//!
//! Two messages hash the same when their ten lexicographically smallest
//! significant words match, regardless of case, punctuation, spacing, or word
//! order. Collisions between such messages are the point.

use sha2::{Digest, Sha256};

/// Words of this length or shorter are ignored.
pub const MIN_SIGNIFICANT_LEN: usize = 4;
/// Number of sorted words kept for hashing.
pub const MAX_HASH_WORDS: usize = 10;
/// Hex characters kept from the digest.
pub const HASH_LEN: usize = 16;

/// Lowercase, strip punctuation, and collapse whitespace.
#[must_use]
pub fn normalize_text(text: &str) -> String {
    let mut normalized = String::with_capacity(text.len());
    let mut prev_space = true;

    for ch in text.chars() {
        if ch.is_whitespace() {
            if !prev_space {
                normalized.push(' ');
                prev_space = true;
            }
        } else if ch.is_alphanumeric() || ch == '_' {
            for lower in ch.to_lowercase() {
                normalized.push(lower);
            }
            prev_space = false;
        }
    }

    if normalized.ends_with(' ') {
        normalized.pop();
    }
    normalized
}

/// Sorted significant words used as the hash input.
#[must_use]
pub fn significant_words(text: &str) -> Vec<String> {
    let normalized = normalize_text(text);
    let mut words: Vec<String> = normalized
        .split(' ')
        .filter(|word| word.chars().count() >= MIN_SIGNIFICANT_LEN)
        .map(str::to_string)
        .collect();
    words.sort();
    words.truncate(MAX_HASH_WORDS);
    words
}

/// Compute the 16-hex-character semantic hash of a message.
#[must_use]
pub fn semantic_hash(text: &str) -> String {
    let joined = significant_words(text).join(" ");
    let digest = Sha256::digest(joined.as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(HASH_LEN);
    hex
}

/// Leading `len` characters of a hash, used for containment lookups.
#[must_use]
pub fn hash_fragment(hash: &str, len: usize) -> &str {
    match hash.char_indices().nth(len) {
        Some((end, _)) => &hash[..end],
        None => hash,
    }
}
