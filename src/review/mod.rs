//! Review queue: the confidence-banded human gate
//!
//! Assessments landing in the medium-confidence band wait here instead of
//! becoming predictors. A human response releases, adjusts, or discards
//! them.

#[cfg(test)]
mod tests;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysts::{build_predictor, Assessment, Predictor};
use crate::catalog::{Analyst, CatalogStore, Target};
use crate::detector::Signal;
use crate::error::{ErrorCode, PipelineError, Result};
use crate::storage::{Database, Doc, DocFilter, Table};
use crate::types::{new_id, Direction, PageRequest, Paginated, Tier};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    Approve,
    Modify,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Modified,
    Rejected,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Modified => "modified",
            ReviewStatus::Rejected => "rejected",
        }
    }
}

/// A proposed predictor held for human judgment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewQueueItem {
    pub id: String,
    pub organization_slug: String,
    pub signal_id: String,
    pub target_id: String,
    pub analyst_slug: String,
    pub analyst_weight: f64,
    pub direction: Direction,
    pub confidence: f64,
    /// Strength the predictor would have had without intervention.
    pub proposed_strength: f64,
    pub reasoning: String,
    pub tier: Tier,
    pub status: ReviewStatus,
    #[serde(default)]
    pub learning_note: Option<String>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    pub is_test: bool,
    #[serde(default)]
    pub scenario_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Doc for ReviewQueueItem {
    const TABLE: Table = Table::ReviewQueue;

    fn id(&self) -> &str {
        &self.id
    }
    fn org(&self) -> &str {
        &self.organization_slug
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
    fn target_id(&self) -> Option<&str> {
        Some(&self.target_id)
    }
    fn scenario_id(&self) -> Option<&str> {
        self.scenario_id.as_deref()
    }
    fn status(&self) -> Option<&str> {
        Some(self.status.as_str())
    }
    fn is_test(&self) -> bool {
        self.is_test
    }
}

impl ReviewQueueItem {
    pub fn from_assessment(
        org: &str,
        signal: &Signal,
        target: &Target,
        analyst: &Analyst,
        tier: Tier,
        assessment: &Assessment,
        proposed_strength: f64,
    ) -> Self {
        Self {
            id: new_id(),
            organization_slug: org.to_string(),
            signal_id: signal.id.clone(),
            target_id: target.id.clone(),
            analyst_slug: analyst.slug.clone(),
            analyst_weight: analyst.default_weight,
            direction: assessment.direction,
            confidence: assessment.confidence,
            proposed_strength,
            reasoning: assessment.reasoning.clone(),
            tier,
            status: ReviewStatus::Pending,
            learning_note: None,
            resolved_at: None,
            is_test: signal.is_test || target.is_test,
            scenario_id: signal.scenario_id.clone(),
            created_at: Utc::now(),
        }
    }
}

/// Human response payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReviewResponse {
    pub decision: Option<String>,
    #[serde(default)]
    pub strength_override: Option<f64>,
    #[serde(default)]
    pub learning_note: Option<String>,
}

/// Result of responding to one review item.
#[derive(Debug, Serialize)]
pub struct ReviewOutcome {
    pub item: ReviewQueueItem,
    pub predictor: Option<Predictor>,
}

pub struct ReviewQueue {
    db: Database,
    catalog: CatalogStore,
}

impl ReviewQueue {
    pub fn new(db: Database, catalog: CatalogStore) -> Self {
        Self { db, catalog }
    }

    pub async fn list_pending(
        &self,
        org: &str,
        page: PageRequest,
    ) -> Result<Paginated<ReviewQueueItem>> {
        let filter = DocFilter::default().status(ReviewStatus::Pending.as_str());
        let total = self.db.count::<ReviewQueueItem>(org, &filter).await?;
        let data = self
            .db
            .list(
                org,
                &filter.clone().limit(page.page_size).offset(page.offset()),
            )
            .await?;
        Ok(Paginated::new(data, page, total))
    }

    /// Resolve one pending item. `approve` releases the predictor as
    /// proposed, `modify` requires a strength override in [0,1], `reject`
    /// discards the evidence.
    pub async fn respond(
        &self,
        org: &str,
        review_id: &str,
        response: ReviewResponse,
    ) -> Result<ReviewOutcome> {
        if review_id.is_empty() {
            return Err(PipelineError::invalid_data("reviewId is required"));
        }
        let decision = match response.decision.as_deref() {
            None | Some("") => return Err(PipelineError::invalid_data("decision is required")),
            Some("approve") => ReviewDecision::Approve,
            Some("modify") => ReviewDecision::Modify,
            Some("reject") => ReviewDecision::Reject,
            Some(other) => {
                return Err(PipelineError::validation_with(
                    ErrorCode::InvalidDecision,
                    format!("unknown decision '{}'", other),
                    serde_json::json!({ "allowed": ["approve", "modify", "reject"] }),
                ))
            }
        };

        let mut item: ReviewQueueItem = self
            .db
            .get(org, review_id)
            .await?
            .ok_or_else(|| PipelineError::not_found("review item", review_id))?;
        if item.status != ReviewStatus::Pending {
            return Err(PipelineError::invalid_data(format!(
                "review item already {}",
                item.status.as_str()
            )));
        }

        let predictor = match decision {
            ReviewDecision::Approve => {
                item.status = ReviewStatus::Approved;
                Some(self.release_predictor(org, &item, item.proposed_strength).await?)
            }
            ReviewDecision::Modify => {
                let strength = response.strength_override.ok_or_else(|| {
                    PipelineError::invalid_data("modify requires strengthOverride")
                })?;
                if !(0.0..=1.0).contains(&strength) {
                    return Err(PipelineError::invalid_data(
                        "strengthOverride must be within [0,1]",
                    ));
                }
                item.status = ReviewStatus::Modified;
                item.learning_note = response.learning_note.clone();
                Some(self.release_predictor(org, &item, strength).await?)
            }
            ReviewDecision::Reject => {
                item.status = ReviewStatus::Rejected;
                None
            }
        };
        item.resolved_at = Some(Utc::now());
        self.db.put(&item).await?;
        Ok(ReviewOutcome { item, predictor })
    }

    async fn release_predictor(
        &self,
        org: &str,
        item: &ReviewQueueItem,
        strength: f64,
    ) -> Result<Predictor> {
        let signal: Signal = self
            .db
            .get(org, &item.signal_id)
            .await?
            .ok_or_else(|| PipelineError::not_found("signal", &item.signal_id))?;
        let target: Target = self.catalog.get_target(org, &item.target_id).await?;
        let analyst = self
            .catalog
            .get_analyst_by_slug(org, &item.analyst_slug)
            .await?
            .ok_or_else(|| PipelineError::not_found("analyst", &item.analyst_slug))?;
        let assessment = Assessment {
            direction: item.direction,
            confidence: item.confidence,
            reasoning: item.reasoning.clone(),
            key_factors: Vec::new(),
            risks: Vec::new(),
        };
        let predictor = build_predictor(org, &signal, &target, &analyst, item.tier, &assessment, strength);
        self.db.put(&predictor).await?;
        Ok(predictor)
    }
}
