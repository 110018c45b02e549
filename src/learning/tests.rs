//! Unit tests for the learning queue

#[cfg(test)]
mod tests {
    use super::super::*;

    fn suggestion() -> SuggestedLearning {
        SuggestedLearning {
            title: "Discount single-source momentum".to_string(),
            description: "One feed keeps triggering premature bullish calls.".to_string(),
            scope_level: ScopeLevel::Target,
            learning_type: "threshold_adjustment".to_string(),
            config: serde_json::json!({ "target_id": "t1" }),
        }
    }

    async fn fixture() -> (Database, LearningQueue, LearningQueueItem) {
        let db = Database::in_memory().await.unwrap();
        let queue = LearningQueue::new(db.clone());
        let item = LearningQueueItem::new("acme", suggestion(), 0.8, None, None);
        queue.enqueue(&item).await.unwrap();
        (db, queue, item)
    }

    #[tokio::test]
    async fn approving_creates_a_test_scoped_learning() {
        let (_db, queue, item) = fixture().await;
        let outcome = queue
            .respond(
                "acme",
                &item.id,
                LearningResponse {
                    decision: Some("approved".to_string()),
                    ..LearningResponse::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(outcome.item.status, QueueStatus::Approved);
        let learning = outcome.learning.unwrap();
        assert!(learning.is_test);
        assert_eq!(learning.status, LearningStatus::Active);
        assert_eq!(learning.title, "Discount single-source momentum");
        assert_eq!(outcome.item.created_learning_id.as_deref(), Some(learning.id.as_str()));
    }

    #[tokio::test]
    async fn modifying_requires_every_final_field() {
        let (_db, queue, item) = fixture().await;
        let err = queue
            .respond(
                "acme",
                &item.id,
                LearningResponse {
                    decision: Some("modified".to_string()),
                    final_title: Some("Tightened heuristic".to_string()),
                    ..LearningResponse::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidData);

        let outcome = queue
            .respond(
                "acme",
                &item.id,
                LearningResponse {
                    decision: Some("modified".to_string()),
                    final_title: Some("Tightened heuristic".to_string()),
                    final_description: Some("Scoped to one universe.".to_string()),
                    final_scope_level: Some(ScopeLevel::Universe),
                    final_learning_type: Some("threshold_adjustment".to_string()),
                    final_config: Some(serde_json::json!({ "universe_id": "u1" })),
                },
            )
            .await
            .unwrap();
        let learning = outcome.learning.unwrap();
        assert_eq!(learning.title, "Tightened heuristic");
        assert_eq!(learning.scope_level, ScopeLevel::Universe);
        assert!(learning.is_test);
    }

    #[tokio::test]
    async fn rejecting_creates_nothing() {
        let (db, queue, item) = fixture().await;
        let outcome = queue
            .respond(
                "acme",
                &item.id,
                LearningResponse {
                    decision: Some("rejected".to_string()),
                    ..LearningResponse::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome.item.status, QueueStatus::Rejected);
        assert!(outcome.learning.is_none());

        let learnings: Vec<Learning> = db.list("acme", &DocFilter::default()).await.unwrap();
        assert!(learnings.is_empty());
    }

    #[tokio::test]
    async fn unknown_decision_names_the_allowed_set() {
        let (_db, queue, item) = fixture().await;
        let err = queue
            .respond(
                "acme",
                &item.id,
                LearningResponse {
                    decision: Some("defer".to_string()),
                    ..LearningResponse::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidDecision);
        assert_eq!(
            err.details().unwrap()["allowed"],
            serde_json::json!(["approved", "modified", "rejected"])
        );

        let err = queue
            .respond("acme", "", LearningResponse::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingId);
    }

    #[tokio::test]
    async fn a_resolved_suggestion_stays_resolved() {
        let (_db, queue, item) = fixture().await;
        queue
            .respond(
                "acme",
                &item.id,
                LearningResponse {
                    decision: Some("rejected".to_string()),
                    ..LearningResponse::default()
                },
            )
            .await
            .unwrap();
        let err = queue
            .respond(
                "acme",
                &item.id,
                LearningResponse {
                    decision: Some("approved".to_string()),
                    ..LearningResponse::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidData);
    }

    #[tokio::test]
    async fn applications_feed_the_metrics() {
        let (_db, queue, item) = fixture().await;
        let learning = queue
            .respond(
                "acme",
                &item.id,
                LearningResponse {
                    decision: Some("approved".to_string()),
                    ..LearningResponse::default()
                },
            )
            .await
            .unwrap()
            .learning
            .unwrap();

        queue.record_application("acme", &learning.id, true).await.unwrap();
        queue.record_application("acme", &learning.id, true).await.unwrap();
        let updated = queue
            .record_application("acme", &learning.id, false)
            .await
            .unwrap();
        assert_eq!(updated.metrics.times_applied, 3);
        assert_eq!(updated.metrics.times_helpful, 2);
        assert!((updated.metrics.success_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn success_rate_of_unused_learning_is_zero() {
        assert_eq!(ValidationMetrics::default().success_rate(), 0.0);
    }

    #[tokio::test]
    async fn pending_listing_excludes_resolved_items() {
        let (_db, queue, item) = fixture().await;
        let other = LearningQueueItem::new("acme", suggestion(), 0.6, None, None);
        queue.enqueue(&other).await.unwrap();
        queue
            .respond(
                "acme",
                &item.id,
                LearningResponse {
                    decision: Some("rejected".to_string()),
                    ..LearningResponse::default()
                },
            )
            .await
            .unwrap();

        let pending = queue.list_pending("acme", PageRequest::default()).await.unwrap();
        assert_eq!(pending.metadata.total_count, 1);
        assert_eq!(pending.data[0].id, other.id);
    }
}
