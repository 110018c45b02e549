//! Content fingerprinting
//!
//! A fingerprint identifies a piece of news independently of where it was
//! republished: normalized title plus the claim's key phrases, hashed.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub title_normalized: String,
    pub key_phrases: Vec<String>,
    pub fingerprint_hash: String,
}

impl Fingerprint {
    pub fn compute(title: &str, key_phrases: &[String]) -> Self {
        let title_normalized = normalize_title(title);
        let mut phrases: Vec<String> = key_phrases.iter().map(|p| p.to_lowercase()).collect();
        phrases.sort();
        phrases.dedup();

        let mut hasher = Sha256::new();
        hasher.update(title_normalized.as_bytes());
        hasher.update(b"|");
        hasher.update(phrases.join(",").as_bytes());
        let fingerprint_hash = hex::encode(hasher.finalize());

        Self {
            title_normalized,
            key_phrases: phrases,
            fingerprint_hash,
        }
    }
}

/// Lowercase, strip punctuation, collapse whitespace, drop stopwords.
pub fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .filter(|w| !STOPWORDS.contains(w))
        .collect::<Vec<_>>()
        .join(" ")
}

const STOPWORDS: [&str; 16] = [
    "a", "an", "the", "of", "to", "in", "on", "for", "and", "or", "is", "are", "as", "at", "by",
    "with",
];

/// Deterministic dedup key for a crawled item within one source.
pub fn seen_item_key(source_id: &str, item_identity: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_id.as_bytes());
    hasher.update(b"|");
    hasher.update(item_identity.as_bytes());
    hex::encode(hasher.finalize())
}
