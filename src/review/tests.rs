//! Unit tests for the review queue

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::catalog::{NewAnalyst, NewTarget, NewUniverse};
    use crate::detector::Fingerprint;
    use crate::types::{OrgScope, ScopeLevel, Urgency};

    struct Fixture {
        db: Database,
        queue: ReviewQueue,
        item: ReviewQueueItem,
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
                    symbol: Some("ACME".to_string()),
                    target_type: Some("stock".to_string()),
                    ..NewTarget::default()
                },
            )
            .await
            .unwrap();
        let analyst = catalog
            .create_analyst(
                "acme",
                NewAnalyst {
                    slug: Some("momentum".to_string()),
                    scope_level: Some(ScopeLevel::Runner),
                    ..NewAnalyst::default()
                },
            )
            .await
            .unwrap();

        let signal = Signal {
            id: new_id(),
            organization_slug: "acme".to_string(),
            target_id: target.id.clone(),
            source_id: "src-1".to_string(),
            content: "ACME shares surge".to_string(),
            direction: Direction::Bullish,
            urgency: Urgency::Medium,
            confidence: 0.6,
            detected_at: Utc::now(),
            fingerprint: Fingerprint::compute("acme surges", &[]),
            corroboration_count: 0,
            corroborating_source_ids: Vec::new(),
            article_id: None,
            is_test: false,
            scenario_id: None,
        };
        db.put(&signal).await.unwrap();

        let assessment = Assessment {
            direction: Direction::Bullish,
            confidence: 0.55,
            reasoning: "mixed evidence".to_string(),
            key_factors: Vec::new(),
            risks: Vec::new(),
        };
        let item = ReviewQueueItem::from_assessment(
            "acme",
            &signal,
            &target,
            &analyst,
            Tier::Silver,
            &assessment,
            0.55,
        );
        db.put(&item).await.unwrap();

        Fixture {
            db: db.clone(),
            queue: ReviewQueue::new(db, catalog),
            item,
        }
    }

    #[tokio::test]
    async fn pending_items_are_listed() {
        let f = fixture().await;
        let page = f
            .queue
            .list_pending("acme", PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.metadata.total_count, 1);
        assert_eq!(page.data[0].id, f.item.id);
    }

    #[tokio::test]
    async fn unknown_decision_is_rejected_with_allowed_list() {
        let f = fixture().await;
        let err = f
            .queue
            .respond(
                "acme",
                &f.item.id,
                ReviewResponse {
                    decision: Some("escalate".to_string()),
                    ..ReviewResponse::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidDecision);
        assert_eq!(
            err.details().unwrap()["allowed"],
            serde_json::json!(["approve", "modify", "reject"])
        );
    }

    #[tokio::test]
    async fn approve_releases_the_proposed_predictor() {
        let f = fixture().await;
        let outcome = f
            .queue
            .respond(
                "acme",
                &f.item.id,
                ReviewResponse {
                    decision: Some("approve".to_string()),
                    ..ReviewResponse::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(outcome.item.status, ReviewStatus::Approved);
        assert!(outcome.item.resolved_at.is_some());
        let predictor = outcome.predictor.unwrap();
        assert_eq!(predictor.analyst_slug, "momentum");
        assert!((predictor.strength - 0.55).abs() < 1e-9);

        let stored: Vec<Predictor> = f.db.list("acme", &DocFilter::default()).await.unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn modify_requires_a_strength_override_in_range() {
        let f = fixture().await;
        let err = f
            .queue
            .respond(
                "acme",
                &f.item.id,
                ReviewResponse {
                    decision: Some("modify".to_string()),
                    ..ReviewResponse::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidData);

        let err = f
            .queue
            .respond(
                "acme",
                &f.item.id,
                ReviewResponse {
                    decision: Some("modify".to_string()),
                    strength_override: Some(1.5),
                    ..ReviewResponse::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidData);

        let outcome = f
            .queue
            .respond(
                "acme",
                &f.item.id,
                ReviewResponse {
                    decision: Some("modify".to_string()),
                    strength_override: Some(0.85),
                    learning_note: Some("source is consistently early".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome.item.status, ReviewStatus::Modified);
        assert!((outcome.predictor.unwrap().strength - 0.85).abs() < 1e-9);
    }

    #[tokio::test]
    async fn reject_discards_the_evidence() {
        let f = fixture().await;
        let outcome = f
            .queue
            .respond(
                "acme",
                &f.item.id,
                ReviewResponse {
                    decision: Some("reject".to_string()),
                    ..ReviewResponse::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome.item.status, ReviewStatus::Rejected);
        assert!(outcome.predictor.is_none());
        let predictors: Vec<Predictor> = f.db.list("acme", &DocFilter::default()).await.unwrap();
        assert!(predictors.is_empty());
    }

    #[tokio::test]
    async fn a_resolved_item_cannot_be_responded_to_again() {
        let f = fixture().await;
        f.queue
            .respond(
                "acme",
                &f.item.id,
                ReviewResponse {
                    decision: Some("reject".to_string()),
                    ..ReviewResponse::default()
                },
            )
            .await
            .unwrap();
        let err = f
            .queue
            .respond(
                "acme",
                &f.item.id,
                ReviewResponse {
                    decision: Some("approve".to_string()),
                    ..ReviewResponse::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidData);
    }
}
