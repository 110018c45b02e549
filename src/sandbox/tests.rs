//! Unit tests for the test sandbox

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::analysts::{Assessment, AssessmentContext, Predictor, ScoringCapability};
    use crate::catalog::{NewAnalyst, NewTarget, NewUniverse};
    use crate::config::{
        AggregationConfig, DetectionConfig, EvaluationConfig, GenerationConfig, LlmConfig,
        ReviewConfig,
    };
    use crate::events::{ChannelSink, TracingSink};
    use crate::learning::{LearningQueueItem, SuggestedLearning};
    use crate::types::{OrgScope, ScopeLevel};
    use async_trait::async_trait;

    struct StubScorer;

    #[async_trait]
    impl ScoringCapability for StubScorer {
        async fn assess(&self, ctx: &AssessmentContext) -> Result<Assessment> {
            Ok(Assessment {
                direction: ctx.signal_direction,
                confidence: 0.9,
                reasoning: "stub".to_string(),
                key_factors: Vec::new(),
                risks: Vec::new(),
            })
        }
    }

    struct Fixture {
        db: Database,
        sandbox: Sandbox,
        target: Target,
    }

    async fn fixture() -> Fixture {
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
                    symbol: Some("T_ACME".to_string()),
                    target_type: Some("stock".to_string()),
                    ..NewTarget::default()
                },
            )
            .await
            .unwrap();
        for slug in ["momentum", "contrarian", "fundamentals"] {
            catalog
                .create_analyst(
                    "acme",
                    NewAnalyst {
                        slug: Some(slug.to_string()),
                        scope_level: Some(ScopeLevel::Runner),
                        ..NewAnalyst::default()
                    },
                )
                .await
                .unwrap();
        }

        let sandbox = sandbox_over(&db, Arc::new(TracingSink));
        Fixture {
            db,
            sandbox,
            target,
        }
    }

    fn sandbox_over(db: &Database, events: Arc<dyn EventSink>) -> Sandbox {
        let detector = Arc::new(SignalDetector::new(db.clone(), DetectionConfig::default()));
        let aggregator = Arc::new(PredictorAggregator::new(
            db.clone(),
            CatalogStore::new(db.clone()),
            Arc::new(StubScorer),
            ReviewConfig::default(),
            AggregationConfig::default(),
            LlmConfig::default(),
        ));
        let generator = Arc::new(PredictionGenerator::new(
            db.clone(),
            AggregationConfig::default(),
            GenerationConfig::default(),
        ));
        let evaluator = Arc::new(Evaluator::new(db.clone(), EvaluationConfig::default()));
        Sandbox::new(
            db.clone(),
            CatalogStore::new(db.clone()),
            detector,
            aggregator,
            generator,
            evaluator,
            events,
        )
    }

    async fn scenario(f: &Fixture) -> TestScenario {
        f.sandbox
            .create(
                "acme",
                NewScenario {
                    name: Some("earnings beat".to_string()),
                    ..NewScenario::default()
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn create_requires_a_name_and_defaults_to_all_tables() {
        let f = fixture().await;
        let err = f
            .sandbox
            .create("acme", NewScenario::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidData);

        let s = scenario(&f).await;
        assert_eq!(s.status, ScenarioStatus::Active);
        assert_eq!(s.injection_points, InjectionTable::ALL.to_vec());
        assert!(s.parent_scenario_id.is_none());
    }

    #[tokio::test]
    async fn injection_refuses_production_symbols() {
        let f = fixture().await;
        let s = scenario(&f).await;
        let err = f
            .sandbox
            .inject(
                "acme",
                &s.id,
                InjectionTable::Articles,
                vec![serde_json::json!({ "target_symbol": "ACME", "title": "x" })],
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidSymbols);
        assert_eq!(err.details().unwrap()["symbol"], serde_json::json!("ACME"));
    }

    #[tokio::test]
    async fn injected_articles_are_scenario_scoped() {
        let f = fixture().await;
        let s = scenario(&f).await;
        let injected = f
            .sandbox
            .inject(
                "acme",
                &s.id,
                InjectionTable::Articles,
                vec![
                    serde_json::json!({
                        "target_symbol": "T_ACME",
                        "title": "T_ACME shares surge on record growth",
                        "body": "Strong quarter, analysts upgrade.",
                    }),
                    serde_json::json!({
                        "target_symbol": "T_ACME",
                        "title": "T_ACME rallies after breakout",
                    }),
                ],
            )
            .await
            .unwrap();
        assert_eq!(injected, 2);

        let owned: Vec<Article> = f
            .db
            .list("acme", &DocFilter::default().scenario(&s.id))
            .await
            .unwrap();
        assert_eq!(owned.len(), 2);
        assert!(owned.iter().all(|a| a.is_test));
        assert!(owned.iter().all(|a| a.target_id == f.target.id));
    }

    #[tokio::test]
    async fn injection_is_limited_to_declared_points() {
        let f = fixture().await;
        let s = f
            .sandbox
            .create(
                "acme",
                NewScenario {
                    name: Some("articles only".to_string()),
                    injection_points: Some(vec![InjectionTable::Articles]),
                    ..NewScenario::default()
                },
            )
            .await
            .unwrap();

        let err = f
            .sandbox
            .inject(
                "acme",
                &s.id,
                InjectionTable::PriceData,
                vec![serde_json::json!({ "target_symbol": "T_ACME", "price": 101.5 })],
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidType);
        assert_eq!(
            err.details().unwrap()["allowed"],
            serde_json::json!(["articles"])
        );

        let injected = f
            .sandbox
            .inject(
                "acme",
                &s.id,
                InjectionTable::Articles,
                vec![serde_json::json!({ "target_symbol": "T_ACME", "title": "ok" })],
            )
            .await
            .unwrap();
        assert_eq!(injected, 1);
    }

    #[tokio::test]
    async fn price_rows_require_a_numeric_price() {
        let f = fixture().await;
        let s = scenario(&f).await;
        let err = f
            .sandbox
            .inject(
                "acme",
                &s.id,
                InjectionTable::PriceData,
                vec![serde_json::json!({ "target_symbol": "T_ACME" })],
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidData);
    }

    #[tokio::test]
    async fn unknown_generation_kind_names_the_allowed_set() {
        let f = fixture().await;
        let s = scenario(&f).await;
        let err = f
            .sandbox
            .generate(
                "acme",
                &s.id,
                "orderbooks",
                serde_json::json!({ "target_symbol": "T_ACME" }),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidType);
        assert_eq!(
            err.details().unwrap()["allowed"],
            serde_json::json!(["articles", "price-data"])
        );
    }

    #[tokio::test]
    async fn signal_detection_tier_only_touches_scenario_rows() {
        let f = fixture().await;
        let s = scenario(&f).await;
        f.sandbox
            .generate(
                "acme",
                &s.id,
                "articles",
                serde_json::json!({ "target_symbol": "T_ACME", "count": 2 }),
            )
            .await
            .unwrap();

        let report = f
            .sandbox
            .run_tier("acme", &s.id, PipelineTier::SignalDetection, None)
            .await
            .unwrap();
        assert_eq!(report.articles_processed, 2);
        assert!(report.signals_created > 0);
        assert!(!report.aborted);

        let signals: Vec<Signal> = f
            .db
            .list("acme", &DocFilter::default().scenario(&s.id))
            .await
            .unwrap();
        assert_eq!(signals.len() as u32, report.signals_created);
        assert!(signals.iter().all(|sig| sig.is_test));
    }

    #[tokio::test]
    async fn prediction_tier_scores_and_emits_within_the_scenario() {
        let f = fixture().await;
        let s = scenario(&f).await;
        f.sandbox
            .inject(
                "acme",
                &s.id,
                InjectionTable::Signals,
                vec![serde_json::json!({
                    "target_symbol": "T_ACME",
                    "content": "T_ACME shares surge",
                    "direction": "bullish",
                    "confidence": 0.9,
                })],
            )
            .await
            .unwrap();

        let report = f
            .sandbox
            .run_tier("acme", &s.id, PipelineTier::PredictionGeneration, None)
            .await
            .unwrap();
        // Three analysts, one signal: the default 3-predictor gate clears.
        assert_eq!(report.predictors_created, 3);
        assert_eq!(report.predictions_emitted, 1);

        let predictions: Vec<Prediction> = f
            .db
            .list("acme", &DocFilter::default().scenario(&s.id))
            .await
            .unwrap();
        assert_eq!(predictions.len(), 1);
        assert!(predictions[0].is_test);
        assert_eq!(predictions[0].direction, Direction::Bullish);
    }

    #[tokio::test]
    async fn tier_runs_report_their_lifecycle_through_the_sink() {
        let f = fixture().await;
        let (sink, mut rx) = ChannelSink::new();
        let sandbox = sandbox_over(&f.db, Arc::new(sink));
        let s = scenario(&f).await;
        sandbox
            .generate(
                "acme",
                &s.id,
                "articles",
                serde_json::json!({ "target_symbol": "T_ACME", "count": 1 }),
            )
            .await
            .unwrap();

        let report = sandbox
            .run_tier("acme", &s.id, PipelineTier::SignalDetection, None)
            .await
            .unwrap();
        assert!(!report.aborted);

        let (ctx, first) = rx.try_recv().unwrap();
        assert_eq!(ctx.organization_slug, "acme");
        assert!(matches!(
            first,
            PipelineEvent::Started { ref operation } if operation == "scenario_tier_run"
        ));
        let (_, last) = rx.try_recv().unwrap();
        assert!(matches!(
            last,
            PipelineEvent::Completed { ref operation, success: true }
                if operation == "scenario_tier_run"
        ));
    }

    #[tokio::test]
    async fn an_expired_deadline_aborts_the_run() {
        let f = fixture().await;
        let s = scenario(&f).await;
        f.sandbox
            .generate(
                "acme",
                &s.id,
                "articles",
                serde_json::json!({ "target_symbol": "T_ACME", "count": 2 }),
            )
            .await
            .unwrap();

        let report = f
            .sandbox
            .run_tier(
                "acme",
                &s.id,
                PipelineTier::SignalDetection,
                Some(Utc::now() - Duration::seconds(1)),
            )
            .await
            .unwrap();
        assert!(report.aborted);
        assert_eq!(report.articles_processed, 0);
    }

    #[tokio::test]
    async fn cleanup_deletes_owned_rows_and_is_idempotent() {
        let f = fixture().await;
        let s = scenario(&f).await;
        f.sandbox
            .generate(
                "acme",
                &s.id,
                "articles",
                serde_json::json!({ "target_symbol": "T_ACME", "count": 3 }),
            )
            .await
            .unwrap();
        f.sandbox
            .run_tier("acme", &s.id, PipelineTier::SignalDetection, None)
            .await
            .unwrap();
        // A learning suggestion born inside the scenario is swept too.
        let suggestion = LearningQueueItem::new(
            "acme",
            SuggestedLearning {
                title: "Reinforce bullish signal pattern".to_string(),
                description: "scenario run scored highly".to_string(),
                scope_level: ScopeLevel::Target,
                learning_type: "pattern_reinforcement".to_string(),
                config: serde_json::json!({}),
            },
            0.9,
            None,
            Some(s.id.clone()),
        );
        f.db.put(&suggestion).await.unwrap();

        let report = f.sandbox.cleanup("acme", &s.id).await.unwrap();
        assert!(report.total > 0);
        let surviving: Option<LearningQueueItem> =
            f.db.get("acme", &suggestion.id).await.unwrap();
        assert!(surviving.is_none());
        let archived = f.sandbox.get("acme", &s.id).await.unwrap();
        assert_eq!(archived.status, ScenarioStatus::Archived);

        let leftover: Vec<Article> = f
            .db
            .list("acme", &DocFilter::default().scenario(&s.id))
            .await
            .unwrap();
        assert!(leftover.is_empty());

        let again = f.sandbox.cleanup("acme", &s.id).await.unwrap();
        assert_eq!(again.total, 0);
    }

    #[tokio::test]
    async fn variations_perturb_one_dimension_each() {
        let f = fixture().await;
        let s = scenario(&f).await;

        let err = f
            .sandbox
            .generate_variations("acme", &s.id, Vec::new(), 2)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidData);

        let created = f
            .sandbox
            .generate_variations(
                "acme",
                &s.id,
                vec![VariationType::Direction, VariationType::Magnitude],
                2,
            )
            .await
            .unwrap();
        assert_eq!(created.len(), 4);
        assert!(created
            .iter()
            .all(|v| v.parent_scenario_id.as_deref() == Some(s.id.as_str())));
        assert!(created.iter().all(|v| v.status == ScenarioStatus::Draft));

        let flipped: Vec<_> = created
            .iter()
            .filter(|v| v.variation == Some(VariationType::Direction))
            .collect();
        assert_eq!(flipped.len(), 2);
        assert!(flipped
            .iter()
            .all(|v| v.config.base_direction == s.config.base_direction.inverted()));

        let scaled: Vec<_> = created
            .iter()
            .filter(|v| v.variation == Some(VariationType::Magnitude))
            .collect();
        assert!(scaled
            .iter()
            .all(|v| (v.config.base_magnitude - s.config.base_magnitude).abs() > f64::EPSILON));
    }
}
