//! Unit tests for signal detection

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::catalog::{TargetMetadata, Target};
    use crate::config::DetectionConfig;
    use crate::storage::Database;
    use crate::types::{new_id, Article};
    use chrono::Utc;

    fn target(symbol: &str) -> Target {
        Target {
            id: new_id(),
            organization_slug: "acme".to_string(),
            universe_id: "u1".to_string(),
            symbol: symbol.to_string(),
            target_type: "stock".to_string(),
            context: None,
            is_active: true,
            is_test: symbol.starts_with("T_"),
            metadata: TargetMetadata::default(),
            created_at: Utc::now(),
        }
    }

    fn article(target: &Target, title: &str, body: &str) -> Article {
        Article {
            id: new_id(),
            organization_slug: "acme".to_string(),
            source_id: "src-1".to_string(),
            target_id: target.id.clone(),
            title: title.to_string(),
            body: body.to_string(),
            url: None,
            published_at: Utc::now(),
            is_test: target.is_test,
            scenario_id: None,
        }
    }

    #[test]
    fn normalize_title_drops_punctuation_and_stopwords() {
        assert_eq!(
            normalize_title("ACME Surges: The Stock to Watch!"),
            "acme surges stock watch"
        );
        assert_eq!(
            normalize_title("Acme surges — the stock, to watch"),
            "acme surges stock watch"
        );
    }

    #[test]
    fn fingerprint_is_stable_across_republication() {
        let a = Fingerprint::compute("ACME Surges On Record Growth!", &["surge".to_string()]);
        let b = Fingerprint::compute("acme surges on record growth", &["SURGE".to_string()]);
        assert_eq!(a.fingerprint_hash, b.fingerprint_hash);

        let c = Fingerprint::compute("ACME plunges on lawsuit", &["plunge".to_string()]);
        assert_ne!(a.fingerprint_hash, c.fingerprint_hash);
    }

    #[test]
    fn extract_claims_finds_direction_and_urgency() {
        let claims = extract_claims(
            "ACME shares surge on record earnings",
            "The company posted strong growth. Analysts issued an upgrade.",
        );
        assert!(!claims.is_empty());
        assert!(claims.iter().all(|c| c.direction == Direction::Bullish));
        assert!(claims.iter().all(|c| c.confidence > 0.3 && c.confidence <= 0.95));

        let urgent = extract_claims("Breaking: ACME stock halted after crash", "");
        assert_eq!(urgent[0].urgency, Urgency::High);
        assert_eq!(urgent[0].direction, Direction::Bearish);
    }

    #[test]
    fn extract_claims_ignores_directionless_text() {
        let claims = extract_claims(
            "ACME announces quarterly report date",
            "The company will publish its results next month.",
        );
        assert!(claims.is_empty());
    }

    #[tokio::test]
    async fn detect_persists_signals() {
        let db = Database::in_memory().await.unwrap();
        let detector = SignalDetector::new(db.clone(), DetectionConfig::default());
        let t = target("ACME");
        let a = article(&t, "ACME shares surge on record growth", "Strong quarter.");

        let detections = detector.detect(&a, &t).await.unwrap();
        assert!(!detections.is_empty());
        assert!(detections.iter().all(|d| d.is_new()));

        let stored: Vec<Signal> = db
            .list("acme", &crate::storage::DocFilter::default())
            .await
            .unwrap();
        assert_eq!(stored.len(), detections.len());
        assert!(stored.iter().all(|s| !s.is_test));
    }

    #[tokio::test]
    async fn repeated_fingerprint_corroborates_instead_of_duplicating() {
        let db = Database::in_memory().await.unwrap();
        let detector = SignalDetector::new(db.clone(), DetectionConfig::default());
        let t = target("ACME");

        let first = article(&t, "ACME surges on upgrade", "");
        let created = detector.detect(&first, &t).await.unwrap();
        assert_eq!(created.len(), 1);

        let mut repost = article(&t, "ACME surges on upgrade", "");
        repost.source_id = "src-2".to_string();
        let second = detector.detect(&repost, &t).await.unwrap();
        assert_eq!(second.len(), 1);
        assert!(!second[0].is_new());

        let signal = second[0].signal();
        assert_eq!(signal.corroboration_count, 1);
        assert!(signal
            .corroborating_source_ids
            .contains(&"src-2".to_string()));

        let stored: Vec<Signal> = db
            .list("acme", &crate::storage::DocFilter::default())
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn low_confidence_claims_are_dropped() {
        let db = Database::in_memory().await.unwrap();
        let config = DetectionConfig {
            min_claim_confidence: 0.99,
            ..DetectionConfig::default()
        };
        let detector = SignalDetector::new(db, config);
        let t = target("ACME");
        let a = article(&t, "ACME shares gain slightly", "");

        let detections = detector.detect(&a, &t).await.unwrap();
        assert!(detections.is_empty());
    }

    #[tokio::test]
    async fn test_target_marks_signal_as_test() {
        let db = Database::in_memory().await.unwrap();
        let detector = SignalDetector::new(db, DetectionConfig::default());
        let t = target("T_ACME");
        let a = article(&t, "T_ACME surges on record growth", "");

        let detections = detector.detect(&a, &t).await.unwrap();
        assert!(detections.iter().all(|d| d.signal().is_test));
    }
}
