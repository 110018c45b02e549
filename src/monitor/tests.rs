//! Unit tests for the anomaly monitor

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::detector::Fingerprint;
    use crate::error::ErrorCode;
    use crate::types::{new_id, Direction, PredictionStatus, Urgency};
    use rust_decimal::Decimal;

    fn monitor(db: Database) -> AnomalyMonitor {
        AnomalyMonitor::new(db, MonitorConfig::default())
    }

    fn signal_at(detected_at: DateTime<Utc>) -> Signal {
        Signal {
            id: new_id(),
            organization_slug: "acme".to_string(),
            target_id: "t1".to_string(),
            source_id: "src-1".to_string(),
            content: "ACME surges".to_string(),
            direction: Direction::Bullish,
            urgency: Urgency::Low,
            confidence: 0.6,
            detected_at,
            fingerprint: Fingerprint::compute(&new_id(), &[]),
            corroboration_count: 0,
            corroborating_source_ids: Vec::new(),
            article_id: None,
            is_test: false,
            scenario_id: None,
        }
    }

    fn evaluation_at(evaluated_at: DateTime<Utc>, correct: bool) -> Evaluation {
        Evaluation {
            id: new_id(),
            organization_slug: "acme".to_string(),
            prediction_id: new_id(),
            target_id: "t1".to_string(),
            direction_correct: correct,
            magnitude_score: 0.5,
            timing_score: 0.5,
            overall_score: if correct { 0.8 } else { 0.25 },
            evaluated_at,
            is_test: false,
            scenario_id: None,
        }
    }

    fn price_at(target_id: &str, price: i64, recorded_at: DateTime<Utc>) -> PricePoint {
        PricePoint {
            id: new_id(),
            organization_slug: "acme".to_string(),
            target_id: target_id.to_string(),
            price: Decimal::from(price),
            recorded_at,
            is_test: false,
            scenario_id: None,
        }
    }

    #[tokio::test]
    async fn no_baseline_means_no_alerts() {
        let db = Database::in_memory().await.unwrap();
        let m = monitor(db.clone());
        // Only current-window activity: nothing to deviate from.
        for _ in 0..5 {
            db.put(&signal_at(Utc::now())).await.unwrap();
        }
        let report = m.run("acme").await.unwrap();
        assert_eq!(report.alerts_created, 0);
    }

    #[tokio::test]
    async fn a_signal_rate_collapse_raises_one_alert() {
        let db = Database::in_memory().await.unwrap();
        let m = monitor(db.clone());
        // Steady baseline, silent current window.
        for _ in 0..14 {
            db.put(&signal_at(Utc::now() - Duration::hours(48))).await.unwrap();
        }

        let report = m.run("acme").await.unwrap();
        assert_eq!(report.alerts_created, 1);

        let alerts = m.list_alerts("acme", Some(AlertStatus::Active)).await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].metric, "signal_detection_rate");
        assert_eq!(alerts[0].severity, AlertSeverity::Critical);
        assert!((alerts[0].deviation_pct - 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn an_open_alert_absorbs_repeat_observations() {
        let db = Database::in_memory().await.unwrap();
        let m = monitor(db.clone());
        for _ in 0..14 {
            db.put(&signal_at(Utc::now() - Duration::hours(48))).await.unwrap();
        }

        assert_eq!(m.run("acme").await.unwrap().alerts_created, 1);
        assert_eq!(m.run("acme").await.unwrap().alerts_created, 0);
        let alerts = m.list_alerts("acme", Some(AlertStatus::Active)).await.unwrap();
        assert_eq!(alerts.len(), 1);
    }

    #[tokio::test]
    async fn an_accuracy_drop_raises_an_alert() {
        let db = Database::in_memory().await.unwrap();
        let m = monitor(db.clone());
        let baseline = Utc::now() - Duration::hours(48);
        for _ in 0..4 {
            db.put(&evaluation_at(baseline, true)).await.unwrap();
            db.put(&evaluation_at(Utc::now(), false)).await.unwrap();
        }

        let report = m.run("acme").await.unwrap();
        assert_eq!(report.alerts_created, 1);
        let alerts = m.list_alerts("acme", Some(AlertStatus::Active)).await.unwrap();
        assert_eq!(alerts[0].metric, "evaluation_accuracy");
    }

    #[tokio::test]
    async fn alert_lifecycle_transitions() {
        let db = Database::in_memory().await.unwrap();
        let m = monitor(db.clone());
        for _ in 0..14 {
            db.put(&signal_at(Utc::now() - Duration::hours(48))).await.unwrap();
        }
        m.run("acme").await.unwrap();
        let alert = m
            .list_alerts("acme", Some(AlertStatus::Active))
            .await
            .unwrap()
            .remove(0);

        let acked = m.acknowledge("acme", &alert.id).await.unwrap();
        assert_eq!(acked.status, AlertStatus::Acknowledged);
        assert!(acked.acknowledged_at.is_some());

        let resolved = m.resolve("acme", &alert.id).await.unwrap();
        assert_eq!(resolved.status, AlertStatus::Resolved);
        assert!(resolved.resolved_at.is_some());

        assert!(m
            .list_alerts("acme", Some(AlertStatus::Active))
            .await
            .unwrap()
            .is_empty());

        let err = m.acknowledge("acme", "").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingId);
        let err = m.resolve("acme", "missing").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn uncovered_significant_moves_are_recorded_once() {
        let db = Database::in_memory().await.unwrap();
        let m = monitor(db.clone());
        db.put(&price_at("t1", 100, Utc::now() - Duration::hours(3))).await.unwrap();
        db.put(&price_at("t1", 110, Utc::now() - Duration::hours(1))).await.unwrap();

        let report = m.run("acme").await.unwrap();
        assert_eq!(report.missed_opportunities, 1);

        let missed = m.missed_opportunities("acme").await.unwrap();
        assert_eq!(missed.len(), 1);
        assert_eq!(missed[0].target_id, "t1");
        assert!((missed[0].move_pct - 10.0).abs() < 1e-9);
        // 10% move against the default 5% threshold.
        assert!((missed[0].significance_score - 2.0).abs() < 1e-9);
        assert_eq!(missed[0].analysis_status, AnalysisStatus::Pending);

        // Same day, same target: the scan key dedups.
        let again = m.run("acme").await.unwrap();
        assert_eq!(again.missed_opportunities, 0);
    }

    #[tokio::test]
    async fn small_moves_are_not_missed_opportunities() {
        let db = Database::in_memory().await.unwrap();
        let m = monitor(db.clone());
        db.put(&price_at("t1", 100, Utc::now() - Duration::hours(3))).await.unwrap();
        db.put(&price_at("t1", 102, Utc::now() - Duration::hours(1))).await.unwrap();

        let report = m.run("acme").await.unwrap();
        assert_eq!(report.missed_opportunities, 0);
    }

    #[tokio::test]
    async fn covered_moves_are_not_missed_opportunities() {
        let db = Database::in_memory().await.unwrap();
        let m = monitor(db.clone());
        db.put(&price_at("t1", 100, Utc::now() - Duration::hours(3))).await.unwrap();
        db.put(&price_at("t1", 112, Utc::now() - Duration::hours(1))).await.unwrap();

        let now = Utc::now();
        let prediction = Prediction {
            id: new_id(),
            organization_slug: "acme".to_string(),
            universe_id: "u1".to_string(),
            target_id: "t1".to_string(),
            direction: Direction::Bullish,
            magnitude: 4.0,
            confidence: 0.8,
            combined_strength: 0.7,
            timeframe_hours: 24,
            status: PredictionStatus::Active,
            predicted_at: now - Duration::hours(6),
            expires_at: now + Duration::hours(18),
            resolved_at: None,
            outcome_value: None,
            reasoning: String::new(),
            predictor_ids: Vec::new(),
            is_test: false,
            scenario_id: None,
        };
        db.put(&prediction).await.unwrap();

        let report = m.run("acme").await.unwrap();
        assert_eq!(report.missed_opportunities, 0);
    }
}
