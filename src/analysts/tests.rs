//! Unit tests for predictor aggregation

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::catalog::{NewAnalyst, NewTarget, NewUniverse};
    use crate::detector::Fingerprint;
    use crate::types::{new_id, OrgScope, ScopeLevel};

    struct StubScorer {
        confidence: f64,
        fail_for: Option<String>,
    }

    impl StubScorer {
        fn confident(confidence: f64) -> Self {
            Self {
                confidence,
                fail_for: None,
            }
        }
    }

    #[async_trait]
    impl ScoringCapability for StubScorer {
        async fn assess(&self, ctx: &AssessmentContext) -> Result<Assessment> {
            if let Some(slug) = &self.fail_for {
                if ctx.analyst_perspective.contains(slug.as_str()) {
                    return Err(crate::error::PipelineError::Llm(
                        "assessment timed out".to_string(),
                    ));
                }
            }
            Ok(Assessment {
                direction: ctx.signal_direction,
                confidence: self.confidence,
                reasoning: "stub assessment".to_string(),
                key_factors: vec!["momentum".to_string()],
                risks: Vec::new(),
            })
        }
    }

    struct Fixture {
        db: Database,
        aggregator: PredictorAggregator,
        universe: Universe,
        target: Target,
    }

    async fn fixture(scorer: StubScorer, analyst_slugs: &[&str]) -> Fixture {
        let db = Database::in_memory().await.unwrap();
        let catalog = CatalogStore::new(db.clone());
        let scope = OrgScope::new("acme", "runner");
        let universe = catalog
            .create_universe(
                &scope,
                NewUniverse {
                    name: Some("Tech".to_string()),
                    ..NewUniverse::default()
                },
            )
            .await
            .unwrap();
        let target = catalog
            .create_target(
                "acme",
                NewTarget {
                    universe_id: Some(universe.id.clone()),
                    symbol: Some("ACME".to_string()),
                    target_type: Some("stock".to_string()),
                    ..NewTarget::default()
                },
            )
            .await
            .unwrap();
        for slug in analyst_slugs {
            catalog
                .create_analyst(
                    "acme",
                    NewAnalyst {
                        slug: Some(slug.to_string()),
                        scope_level: Some(ScopeLevel::Runner),
                        perspective: Some(format!("{} view", slug)),
                        ..NewAnalyst::default()
                    },
                )
                .await
                .unwrap();
        }
        let aggregator = PredictorAggregator::new(
            db.clone(),
            catalog,
            Arc::new(scorer),
            ReviewConfig::default(),
            AggregationConfig::default(),
            LlmConfig::default(),
        );
        Fixture {
            db,
            aggregator,
            universe,
            target,
        }
    }

    fn signal(target: &Target, direction: Direction) -> Signal {
        Signal {
            id: new_id(),
            organization_slug: "acme".to_string(),
            target_id: target.id.clone(),
            source_id: "src-1".to_string(),
            content: "ACME shares surge on record growth".to_string(),
            direction,
            urgency: Urgency::Medium,
            confidence: 0.8,
            detected_at: Utc::now(),
            fingerprint: Fingerprint::compute("acme surges", &[]),
            corroboration_count: 0,
            corroborating_source_ids: Vec::new(),
            article_id: None,
            is_test: false,
            scenario_id: None,
        }
    }

    fn predictor(direction: Direction, weight: f64, confidence: f64, strength: f64) -> Predictor {
        Predictor {
            id: new_id(),
            organization_slug: "acme".to_string(),
            target_id: "t1".to_string(),
            analyst_slug: "momentum".to_string(),
            analyst_weight: weight,
            direction,
            strength,
            confidence,
            reasoning: String::new(),
            key_factors: Vec::new(),
            risks: Vec::new(),
            signal_id: "s1".to_string(),
            tier: Tier::Silver,
            is_test: false,
            scenario_id: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn one_predictor_per_eligible_analyst() {
        let f = fixture(StubScorer::confident(0.9), &["momentum", "contrarian"]).await;
        let s = signal(&f.target, Direction::Bullish);

        let report = f
            .aggregator
            .score_signal("acme", &s, &f.target, &f.universe)
            .await
            .unwrap();

        assert_eq!(report.predictors.len(), 2);
        assert_eq!(report.queued_for_review, 0);
        assert_eq!(report.failed_assessments, 0);
        assert!(report.predictors.iter().all(|p| p.signal_id == s.id));

        let stored: Vec<Predictor> = f.db.list("acme", &DocFilter::default()).await.unwrap();
        assert_eq!(stored.len(), 2);
    }

    #[tokio::test]
    async fn medium_confidence_diverts_to_review() {
        let f = fixture(StubScorer::confident(0.5), &["momentum"]).await;
        let s = signal(&f.target, Direction::Bullish);

        let report = f
            .aggregator
            .score_signal("acme", &s, &f.target, &f.universe)
            .await
            .unwrap();

        assert!(report.predictors.is_empty());
        assert_eq!(report.queued_for_review, 1);

        let queued: Vec<ReviewQueueItem> = f.db.list("acme", &DocFilter::default()).await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].analyst_slug, "momentum");
    }

    #[tokio::test]
    async fn one_failed_assessment_does_not_sink_the_signal() {
        let scorer = StubScorer {
            confidence: 0.9,
            fail_for: Some("contrarian".to_string()),
        };
        let f = fixture(scorer, &["momentum", "contrarian"]).await;
        let s = signal(&f.target, Direction::Bullish);

        let report = f
            .aggregator
            .score_signal("acme", &s, &f.target, &f.universe)
            .await
            .unwrap();

        assert_eq!(report.predictors.len(), 1);
        assert_eq!(report.failed_assessments, 1);
        assert_eq!(report.predictors[0].analyst_slug, "momentum");
    }

    #[tokio::test]
    async fn urgency_selects_the_model_tier() {
        let f = fixture(StubScorer::confident(0.9), &["momentum"]).await;
        let mut s = signal(&f.target, Direction::Bullish);
        s.urgency = Urgency::High;

        let report = f
            .aggregator
            .score_signal("acme", &s, &f.target, &f.universe)
            .await
            .unwrap();
        assert_eq!(report.predictors[0].tier, Tier::Gold);
    }

    #[test]
    fn combine_is_a_weighted_mean() {
        let predictors = vec![
            predictor(Direction::Bullish, 1.0, 1.0, 0.8),
            predictor(Direction::Bullish, 1.0, 1.0, 0.4),
        ];
        let agg = combine(&predictors);
        assert_eq!(agg.predictor_count, 2);
        assert!((agg.combined_strength - 0.6).abs() < 1e-9);
        assert!((agg.net_direction_score - 0.6).abs() < 1e-9);

        // Higher weight pulls the mean toward its predictor.
        let skewed = vec![
            predictor(Direction::Bullish, 3.0, 1.0, 0.8),
            predictor(Direction::Bullish, 1.0, 1.0, 0.4),
        ];
        let agg = combine(&skewed);
        assert!((agg.combined_strength - 0.7).abs() < 1e-9);
    }

    #[test]
    fn bearish_predictors_pull_direction_negative() {
        let predictors = vec![
            predictor(Direction::Bullish, 1.0, 1.0, 0.5),
            predictor(Direction::Bearish, 1.0, 1.0, 0.9),
        ];
        let agg = combine(&predictors);
        assert!(agg.net_direction_score < 0.0);
        assert!(agg.combined_strength > 0.0);
    }

    #[test]
    fn combine_of_nothing_is_zero() {
        let agg = combine(&[]);
        assert_eq!(agg.predictor_count, 0);
        assert_eq!(agg.combined_strength, 0.0);
        assert_eq!(agg.net_direction_score, 0.0);
    }
}
