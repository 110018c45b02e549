//! Learnings and the learning queue
//!
//! A learning is a reusable heuristic. AI-suggested learnings wait in the
//! queue as `pending` until a human approves, modifies, or rejects them;
//! every learning created through the queue starts test-scoped. Only the
//! promotion engine flips `is_test` to false.

#[cfg(test)]
mod tests;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, PipelineError, Result};
use crate::storage::{Database, Doc, DocFilter, Table};
use crate::types::{new_id, PageRequest, Paginated, ScopeLevel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LearningStatus {
    Active,
    Inactive,
    Promoted,
    Rejected,
}

impl LearningStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LearningStatus::Active => "active",
            LearningStatus::Inactive => "inactive",
            LearningStatus::Promoted => "promoted",
            LearningStatus::Rejected => "rejected",
        }
    }
}

/// Usage counters backing the promotion gate.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ValidationMetrics {
    pub times_applied: u32,
    pub times_helpful: u32,
}

impl ValidationMetrics {
    pub fn success_rate(&self) -> f64 {
        if self.times_applied == 0 {
            return 0.0;
        }
        self.times_helpful as f64 / self.times_applied as f64
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Learning {
    pub id: String,
    pub organization_slug: String,
    pub title: String,
    pub description: String,
    pub scope_level: ScopeLevel,
    #[serde(default)]
    pub universe_id: Option<String>,
    #[serde(default)]
    pub target_id: Option<String>,
    pub learning_type: String,
    #[serde(default)]
    pub config: serde_json::Value,
    /// Test-scoped until promoted. Never recomputed at read time.
    pub is_test: bool,
    pub status: LearningStatus,
    #[serde(default)]
    pub metrics: ValidationMetrics,
    /// Production learning this test learning was promoted into.
    #[serde(default)]
    pub promoted_to: Option<String>,
    /// Test learning a production learning originated from.
    #[serde(default)]
    pub promoted_from: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Doc for Learning {
    const TABLE: Table = Table::Learnings;

    fn id(&self) -> &str {
        &self.id
    }
    fn org(&self) -> &str {
        &self.organization_slug
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
    fn universe_id(&self) -> Option<&str> {
        self.universe_id.as_deref()
    }
    fn target_id(&self) -> Option<&str> {
        self.target_id.as_deref()
    }
    fn status(&self) -> Option<&str> {
        Some(self.status.as_str())
    }
    fn is_test(&self) -> bool {
        self.is_test
    }
}

/// The AI's proposal, kept verbatim alongside whatever the human decides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestedLearning {
    pub title: String,
    pub description: String,
    pub scope_level: ScopeLevel,
    pub learning_type: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Approved,
    Modified,
    Rejected,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Approved => "approved",
            QueueStatus::Modified => "modified",
            QueueStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningQueueItem {
    pub id: String,
    pub organization_slug: String,
    pub suggested: SuggestedLearning,
    pub ai_confidence: f64,
    pub status: QueueStatus,
    #[serde(default)]
    pub source_evaluation_id: Option<String>,
    #[serde(default)]
    pub created_learning_id: Option<String>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    /// Set for suggestions produced inside a sandbox scenario, so cleanup
    /// can sweep them with the rest of the scenario's rows.
    #[serde(default)]
    pub scenario_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Doc for LearningQueueItem {
    const TABLE: Table = Table::LearningQueue;

    fn id(&self) -> &str {
        &self.id
    }
    fn org(&self) -> &str {
        &self.organization_slug
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
    fn status(&self) -> Option<&str> {
        Some(self.status.as_str())
    }
    fn scenario_id(&self) -> Option<&str> {
        self.scenario_id.as_deref()
    }
}

impl LearningQueueItem {
    pub fn new(
        org: &str,
        suggested: SuggestedLearning,
        ai_confidence: f64,
        source_evaluation_id: Option<String>,
        scenario_id: Option<String>,
    ) -> Self {
        Self {
            id: new_id(),
            organization_slug: org.to_string(),
            suggested,
            ai_confidence,
            status: QueueStatus::Pending,
            source_evaluation_id,
            created_learning_id: None,
            resolved_at: None,
            scenario_id,
            created_at: Utc::now(),
        }
    }
}

/// Human response to a queued suggestion.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LearningResponse {
    pub decision: Option<String>,
    #[serde(default)]
    pub final_title: Option<String>,
    #[serde(default)]
    pub final_description: Option<String>,
    #[serde(default)]
    pub final_scope_level: Option<ScopeLevel>,
    #[serde(default)]
    pub final_learning_type: Option<String>,
    #[serde(default)]
    pub final_config: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct LearningOutcome {
    pub item: LearningQueueItem,
    pub learning: Option<Learning>,
}

pub struct LearningQueue {
    db: Database,
}

impl LearningQueue {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn enqueue(&self, item: &LearningQueueItem) -> Result<()> {
        self.db.put(item).await
    }

    pub async fn list_pending(
        &self,
        org: &str,
        page: PageRequest,
    ) -> Result<Paginated<LearningQueueItem>> {
        let filter = DocFilter::default().status(QueueStatus::Pending.as_str());
        let total = self.db.count::<LearningQueueItem>(org, &filter).await?;
        let data = self
            .db
            .list(
                org,
                &filter.clone().limit(page.page_size).offset(page.offset()),
            )
            .await?;
        Ok(Paginated::new(data, page, total))
    }

    /// Resolve one suggestion. Approving or modifying creates the learning
    /// with `is_test = true`, always.
    pub async fn respond(
        &self,
        org: &str,
        id: &str,
        response: LearningResponse,
    ) -> Result<LearningOutcome> {
        if id.is_empty() {
            return Err(PipelineError::missing_id("learning queue item"));
        }
        let decision = match response.decision.as_deref() {
            None | Some("") => return Err(PipelineError::invalid_data("decision is required")),
            Some("approved") => QueueStatus::Approved,
            Some("modified") => QueueStatus::Modified,
            Some("rejected") => QueueStatus::Rejected,
            Some(other) => {
                return Err(PipelineError::validation_with(
                    ErrorCode::InvalidDecision,
                    format!("unknown decision '{}'", other),
                    serde_json::json!({ "allowed": ["approved", "modified", "rejected"] }),
                ))
            }
        };

        let mut item: LearningQueueItem = self
            .db
            .get(org, id)
            .await?
            .ok_or_else(|| PipelineError::not_found("learning queue item", id))?;
        if item.status != QueueStatus::Pending {
            return Err(PipelineError::invalid_data(format!(
                "suggestion already {}",
                item.status.as_str()
            )));
        }

        let learning = match decision {
            QueueStatus::Approved => Some(self.create_learning(org, &item.suggested).await?),
            QueueStatus::Modified => {
                let suggested = SuggestedLearning {
                    title: response
                        .final_title
                        .clone()
                        .ok_or_else(|| PipelineError::invalid_data("modified requires finalTitle"))?,
                    description: response.final_description.clone().ok_or_else(|| {
                        PipelineError::invalid_data("modified requires finalDescription")
                    })?,
                    scope_level: response.final_scope_level.ok_or_else(|| {
                        PipelineError::invalid_data("modified requires finalScopeLevel")
                    })?,
                    learning_type: response.final_learning_type.clone().ok_or_else(|| {
                        PipelineError::invalid_data("modified requires finalLearningType")
                    })?,
                    config: response.final_config.clone().ok_or_else(|| {
                        PipelineError::invalid_data("modified requires finalConfig")
                    })?,
                };
                Some(self.create_learning(org, &suggested).await?)
            }
            QueueStatus::Rejected => None,
            QueueStatus::Pending => unreachable!(),
        };

        item.status = decision;
        item.created_learning_id = learning.as_ref().map(|l| l.id.clone());
        item.resolved_at = Some(Utc::now());
        self.db.put(&item).await?;
        Ok(LearningOutcome { item, learning })
    }

    async fn create_learning(&self, org: &str, suggested: &SuggestedLearning) -> Result<Learning> {
        let learning = Learning {
            id: new_id(),
            organization_slug: org.to_string(),
            title: suggested.title.clone(),
            description: suggested.description.clone(),
            scope_level: suggested.scope_level,
            universe_id: None,
            target_id: None,
            learning_type: suggested.learning_type.clone(),
            config: suggested.config.clone(),
            is_test: true,
            status: LearningStatus::Active,
            metrics: ValidationMetrics::default(),
            promoted_to: None,
            promoted_from: None,
            created_at: Utc::now(),
        };
        self.db.put(&learning).await?;
        Ok(learning)
    }

    pub async fn get_learning(&self, org: &str, id: &str) -> Result<Learning> {
        self.db
            .get(org, id)
            .await?
            .ok_or_else(|| PipelineError::not_found("learning", id))
    }

    pub async fn list_learnings(
        &self,
        org: &str,
        include_test: bool,
        page: PageRequest,
    ) -> Result<Paginated<Learning>> {
        let mut filter = DocFilter::default();
        if !include_test {
            filter = filter.test(false);
        }
        let total = self.db.count::<Learning>(org, &filter).await?;
        let data = self
            .db
            .list(
                org,
                &filter.clone().limit(page.page_size).offset(page.offset()),
            )
            .await?;
        Ok(Paginated::new(data, page, total))
    }

    /// Track one application of a learning. Feeds the promotion gate.
    pub async fn record_application(&self, org: &str, id: &str, helpful: bool) -> Result<Learning> {
        let mut learning = self.get_learning(org, id).await?;
        learning.metrics.times_applied += 1;
        if helpful {
            learning.metrics.times_helpful += 1;
        }
        self.db.put(&learning).await?;
        Ok(learning)
    }
}
