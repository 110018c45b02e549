//! Signal detection
//!
//! Turns crawled or injected articles into directional signals. Detection
//! is lexicon-based: a sentence mentioning directional vocabulary becomes a
//! claim, scored by term density. A repeated fingerprint for the same
//! target inside the corroboration window strengthens the existing signal
//! instead of creating a duplicate.

mod fingerprint;
#[cfg(test)]
mod tests;

pub use fingerprint::{normalize_title, seen_item_key, Fingerprint};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::Target;
use crate::config::DetectionConfig;
use crate::error::Result;
use crate::storage::{Database, Doc, DocFilter, Table};
use crate::types::{new_id, Article, Direction, Urgency};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: String,
    pub organization_slug: String,
    pub target_id: String,
    pub source_id: String,
    /// The claim sentence this signal was extracted from.
    pub content: String,
    pub direction: Direction,
    pub urgency: Urgency,
    pub confidence: f64,
    pub detected_at: DateTime<Utc>,
    pub fingerprint: Fingerprint,
    /// How many independent occurrences corroborate this signal.
    pub corroboration_count: u32,
    #[serde(default)]
    pub corroborating_source_ids: Vec<String>,
    #[serde(default)]
    pub article_id: Option<String>,
    pub is_test: bool,
    #[serde(default)]
    pub scenario_id: Option<String>,
}

impl Doc for Signal {
    const TABLE: Table = Table::Signals;

    fn id(&self) -> &str {
        &self.id
    }
    fn org(&self) -> &str {
        &self.organization_slug
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.detected_at
    }
    fn target_id(&self) -> Option<&str> {
        Some(&self.target_id)
    }
    fn scenario_id(&self) -> Option<&str> {
        self.scenario_id.as_deref()
    }
    fn doc_key(&self) -> Option<&str> {
        Some(&self.fingerprint.fingerprint_hash)
    }
    fn is_test(&self) -> bool {
        self.is_test
    }
}

/// What `detect` did with one claim.
#[derive(Debug, Clone)]
pub enum Detection {
    Created(Signal),
    Corroborated(Signal),
}

impl Detection {
    pub fn signal(&self) -> &Signal {
        match self {
            Detection::Created(s) | Detection::Corroborated(s) => s,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Detection::Created(_))
    }
}

pub struct SignalDetector {
    db: Database,
    config: DetectionConfig,
}

impl SignalDetector {
    pub fn new(db: Database, config: DetectionConfig) -> Self {
        Self { db, config }
    }

    /// Detect claims in one article and persist them as signals.
    ///
    /// Idempotent for re-crawled content: a known fingerprint within the
    /// corroboration window updates the existing signal's bookkeeping.
    pub async fn detect(&self, article: &Article, target: &Target) -> Result<Vec<Detection>> {
        let mut detections = Vec::new();
        for claim in extract_claims(&article.title, &article.body) {
            if claim.confidence < self.config.min_claim_confidence {
                continue;
            }
            let fp = Fingerprint::compute(&article.title, &claim.key_phrases);
            let window_start =
                Utc::now() - Duration::hours(self.config.corroboration_window_hours);

            let existing: Vec<Signal> = self
                .db
                .list(
                    &target.organization_slug,
                    &DocFilter::default()
                        .target(&target.id)
                        .key(&fp.fingerprint_hash)
                        .after(window_start)
                        .limit(1),
                )
                .await?;

            if let Some(mut signal) = existing.into_iter().next() {
                signal.corroboration_count += 1;
                if !signal.corroborating_source_ids.contains(&article.source_id) {
                    signal.corroborating_source_ids.push(article.source_id.clone());
                }
                self.db.put(&signal).await?;
                tracing::debug!(
                    signal_id = %signal.id,
                    count = signal.corroboration_count,
                    "corroborated existing signal"
                );
                detections.push(Detection::Corroborated(signal));
                continue;
            }

            let signal = Signal {
                id: new_id(),
                organization_slug: target.organization_slug.clone(),
                target_id: target.id.clone(),
                source_id: article.source_id.clone(),
                content: claim.sentence,
                direction: claim.direction,
                urgency: claim.urgency,
                confidence: claim.confidence,
                detected_at: Utc::now(),
                fingerprint: fp,
                corroboration_count: 0,
                corroborating_source_ids: Vec::new(),
                article_id: Some(article.id.clone()),
                is_test: target.is_test || article.is_test,
                scenario_id: article.scenario_id.clone(),
            };
            self.db.put(&signal).await?;
            tracing::debug!(
                signal_id = %signal.id,
                direction = signal.direction.as_str(),
                confidence = signal.confidence,
                "detected signal"
            );
            detections.push(Detection::Created(signal));
        }
        Ok(detections)
    }
}

/// One directional claim found in an article.
#[derive(Debug, Clone)]
pub struct Claim {
    pub sentence: String,
    pub direction: Direction,
    pub urgency: Urgency,
    pub confidence: f64,
    pub key_phrases: Vec<String>,
}

const BULLISH_TERMS: [&str; 14] = [
    "surge", "soar", "rally", "beat", "record", "upgrade", "breakout", "growth", "strong",
    "bullish", "outperform", "jump", "gain", "expand",
];

const BEARISH_TERMS: [&str; 14] = [
    "plunge", "crash", "miss", "downgrade", "lawsuit", "recall", "bearish", "weak", "decline",
    "drop", "layoff", "warning", "cut", "underperform",
];

const URGENT_TERMS: [&str; 6] = ["breaking", "just in", "halted", "immediately", "now", "alert"];

/// Lexicon-based claim extraction. The article title contributes to every
/// claim's score; each sentence with directional vocabulary yields at most
/// one claim.
pub fn extract_claims(title: &str, body: &str) -> Vec<Claim> {
    let text = format!("{}. {}", title, body);
    let title_lower = title.to_lowercase();
    let title_bullish = count_terms(&title_lower, &BULLISH_TERMS);
    let title_bearish = count_terms(&title_lower, &BEARISH_TERMS);

    let mut claims = Vec::new();
    for sentence in text.split(['.', '!', '?', '\n']) {
        let sentence = sentence.trim();
        if sentence.len() < 10 {
            continue;
        }
        let lower = sentence.to_lowercase();
        let bullish = count_terms(&lower, &BULLISH_TERMS);
        let bearish = count_terms(&lower, &BEARISH_TERMS);
        if bullish == 0 && bearish == 0 {
            continue;
        }

        let (direction, hits, phrases) = if bullish > bearish {
            (Direction::Bullish, bullish, matched_terms(&lower, &BULLISH_TERMS))
        } else if bearish > bullish {
            (Direction::Bearish, bearish, matched_terms(&lower, &BEARISH_TERMS))
        } else {
            let mut phrases = matched_terms(&lower, &BULLISH_TERMS);
            phrases.extend(matched_terms(&lower, &BEARISH_TERMS));
            (Direction::Neutral, bullish, phrases)
        };

        let title_support = match direction {
            Direction::Bullish => title_bullish,
            Direction::Bearish => title_bearish,
            Direction::Neutral => 0,
        };
        let confidence =
            (0.3 + 0.15 * hits as f64 + 0.1 * title_support as f64).min(0.95);
        let urgency = if count_terms(&lower, &URGENT_TERMS) > 0 {
            Urgency::High
        } else if hits >= 2 {
            Urgency::Medium
        } else {
            Urgency::Low
        };

        claims.push(Claim {
            sentence: sentence.to_string(),
            direction,
            urgency,
            confidence,
            key_phrases: phrases,
        });
    }
    claims
}

fn count_terms(text: &str, terms: &[&str]) -> u32 {
    terms.iter().filter(|t| text.contains(*t)).count() as u32
}

fn matched_terms(text: &str, terms: &[&str]) -> Vec<String> {
    terms
        .iter()
        .filter(|t| text.contains(*t))
        .map(|t| t.to_string())
        .collect()
}
