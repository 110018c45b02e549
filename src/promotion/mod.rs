//! Learning promotion
//!
//! Validated, backtested transition of a test learning into production,
//! with bidirectional lineage: the test learning points at its production
//! clone, the clone points back, and one history row links both.


mod backtest;

pub use backtest::{run_backtest, BacktestResult};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::PromotionConfig;
use crate::error::{ErrorCode, PipelineError, Result};
use crate::events::{EventContext, EventSink, PipelineEvent};
use crate::learning::{Learning, LearningStatus, ValidationMetrics};
use crate::storage::{Database, Doc, DocFilter, Table};
use crate::types::new_id;

/// Individual gate checks; all must hold for promotion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ValidationChecks {
    pub is_test_learning: bool,
    pub is_active: bool,
    pub not_already_promoted: bool,
    pub has_validation_metrics: bool,
    pub meets_min_applications: bool,
    pub meets_min_success_rate: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub learning_id: String,
    pub checks: ValidationChecks,
    pub is_valid: bool,
    pub metrics: ValidationMetrics,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromotionStatus {
    Promoted,
    Rejected,
}

impl PromotionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromotionStatus::Promoted => "promoted",
            PromotionStatus::Rejected => "rejected",
        }
    }
}

/// Lineage record written once per promotion or rejection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionHistory {
    pub id: String,
    pub organization_slug: String,
    pub test_learning_id: String,
    #[serde(default)]
    pub production_learning_id: Option<String>,
    pub status: PromotionStatus,
    pub promoted_by: String,
    pub promoted_at: DateTime<Utc>,
    pub validation_metrics: ValidationMetrics,
    #[serde(default)]
    pub backtest: Option<BacktestResult>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl Doc for PromotionHistory {
    const TABLE: Table = Table::PromotionHistory;

    fn id(&self) -> &str {
        &self.id
    }
    fn org(&self) -> &str {
        &self.organization_slug
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.promoted_at
    }
    fn doc_key(&self) -> Option<&str> {
        Some(&self.test_learning_id)
    }
    fn status(&self) -> Option<&str> {
        Some(self.status.as_str())
    }
}

#[derive(Debug, Serialize)]
pub struct PromotionRecord {
    pub history: PromotionHistory,
    pub production_learning: Learning,
}

pub struct PromotionEngine {
    db: Database,
    config: PromotionConfig,
    events: Arc<dyn EventSink>,
}

impl PromotionEngine {
    pub fn new(db: Database, config: PromotionConfig, events: Arc<dyn EventSink>) -> Self {
        Self { db, config, events }
    }

    async fn get_learning(&self, org: &str, id: &str) -> Result<Learning> {
        if id.is_empty() {
            return Err(PipelineError::missing_id("learning"));
        }
        self.db
            .get(org, id)
            .await?
            .ok_or_else(|| PipelineError::not_found("learning", id))
    }

    /// Run every promotion gate check without side effects.
    pub async fn validate(&self, org: &str, learning_id: &str) -> Result<ValidationReport> {
        let learning = self.get_learning(org, learning_id).await?;
        let metrics = learning.metrics;
        let checks = ValidationChecks {
            is_test_learning: learning.is_test,
            is_active: learning.status == LearningStatus::Active,
            not_already_promoted: learning.promoted_to.is_none(),
            has_validation_metrics: metrics.times_applied > 0,
            meets_min_applications: metrics.times_applied >= self.config.min_applications,
            meets_min_success_rate: metrics.times_applied > 0
                && metrics.success_rate() >= self.config.min_success_rate,
        };
        let is_valid = checks.is_test_learning
            && checks.is_active
            && checks.not_already_promoted
            && checks.has_validation_metrics
            && checks.meets_min_applications
            && checks.meets_min_success_rate;
        Ok(ValidationReport {
            learning_id: learning.id,
            checks,
            is_valid,
            metrics,
            success_rate: metrics.success_rate(),
        })
    }

    /// Replay history with and without the learning. Read-only; see
    /// [`backtest::run_backtest`] for snapshot semantics.
    pub async fn run_backtest(
        &self,
        org: &str,
        learning_id: &str,
        window_days: u32,
        deadline: Option<DateTime<Utc>>,
    ) -> Result<BacktestResult> {
        let learning = self.get_learning(org, learning_id).await?;
        let ctx = EventContext::for_org(org);
        self.events.emit(
            &ctx,
            PipelineEvent::Started {
                operation: "learning_backtest".to_string(),
            },
        );
        let result =
            backtest::run_backtest(&self.db, org, &learning, window_days, deadline).await;
        self.events.emit(
            &ctx,
            PipelineEvent::Completed {
                operation: "learning_backtest".to_string(),
                success: result.is_ok(),
            },
        );
        result
    }

    /// Promote a validated test learning into production. Policy: when
    /// `require_passing_backtest` is set, a fresh backtest over the default
    /// window must pass too.
    pub async fn promote(
        &self,
        org: &str,
        learning_id: &str,
        promoted_by: &str,
    ) -> Result<PromotionRecord> {
        let report = self.validate(org, learning_id).await?;
        if !report.is_valid {
            return Err(PipelineError::validation_with(
                ErrorCode::InvalidData,
                "learning failed promotion validation",
                serde_json::to_value(&report.checks)?,
            ));
        }
        let backtest = if self.config.require_passing_backtest {
            let result = self
                .run_backtest(
                    org,
                    learning_id,
                    self.config.default_backtest_window_days,
                    None,
                )
                .await?;
            if !result.passed {
                return Err(PipelineError::validation_with(
                    ErrorCode::InvalidData,
                    "backtest did not pass",
                    serde_json::to_value(&result)?,
                ));
            }
            Some(result)
        } else {
            None
        };

        let mut test_learning = self.get_learning(org, learning_id).await?;
        let production = Learning {
            id: new_id(),
            organization_slug: org.to_string(),
            title: test_learning.title.clone(),
            description: test_learning.description.clone(),
            scope_level: test_learning.scope_level,
            universe_id: test_learning.universe_id.clone(),
            target_id: test_learning.target_id.clone(),
            learning_type: test_learning.learning_type.clone(),
            config: test_learning.config.clone(),
            is_test: false,
            status: LearningStatus::Active,
            metrics: test_learning.metrics,
            promoted_to: None,
            promoted_from: Some(test_learning.id.clone()),
            created_at: Utc::now(),
        };
        self.db.put(&production).await?;

        test_learning.is_test = false;
        test_learning.status = LearningStatus::Promoted;
        test_learning.promoted_to = Some(production.id.clone());
        self.db.put(&test_learning).await?;

        let history = PromotionHistory {
            id: new_id(),
            organization_slug: org.to_string(),
            test_learning_id: test_learning.id.clone(),
            production_learning_id: Some(production.id.clone()),
            status: PromotionStatus::Promoted,
            promoted_by: promoted_by.to_string(),
            promoted_at: Utc::now(),
            validation_metrics: report.metrics,
            backtest,
            reason: None,
        };
        self.db.put(&history).await?;
        tracing::info!(
            test_learning = %history.test_learning_id,
            production_learning = %production.id,
            "learning promoted"
        );
        Ok(PromotionRecord {
            history,
            production_learning: production,
        })
    }

    /// Reject a promotion candidate. The reason is mandatory.
    pub async fn reject(
        &self,
        org: &str,
        learning_id: &str,
        reason: Option<&str>,
    ) -> Result<PromotionHistory> {
        let reason = match reason {
            Some(r) if !r.trim().is_empty() => r.trim().to_string(),
            _ => {
                return Err(PipelineError::validation(
                    ErrorCode::MissingReason,
                    "rejection requires a reason",
                ))
            }
        };
        let mut learning = self.get_learning(org, learning_id).await?;
        learning.status = LearningStatus::Rejected;
        self.db.put(&learning).await?;

        let history = PromotionHistory {
            id: new_id(),
            organization_slug: org.to_string(),
            test_learning_id: learning.id.clone(),
            production_learning_id: None,
            status: PromotionStatus::Rejected,
            promoted_by: String::new(),
            promoted_at: Utc::now(),
            validation_metrics: learning.metrics,
            backtest: None,
            reason: Some(reason),
        };
        self.db.put(&history).await?;
        Ok(history)
    }

    pub async fn history_for(&self, org: &str, learning_id: &str) -> Result<Vec<PromotionHistory>> {
        self.db
            .list(org, &DocFilter::default().key(learning_id))
            .await
    }
}
