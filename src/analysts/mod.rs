//! Predictor aggregation
//!
//! Every eligible analyst scores a signal through the external LLM
//! capability, producing one predictor each. Assessments run concurrently
//! with bounded fan-out. Medium-confidence results are diverted to the
//! review queue instead of becoming predictors directly.

mod llm;
mod recommend;
#[cfg(test)]
mod tests;

pub use llm::LlmScorer;
pub use recommend::{recommend_strategy, RankedStrategy, StrategyRecommendation};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::catalog::{Analyst, CatalogStore, Target, Universe};
use crate::config::{AggregationConfig, LlmConfig, ReviewConfig, TierModel};
use crate::detector::Signal;
use crate::error::Result;
use crate::review::ReviewQueueItem;
use crate::storage::{Database, Doc, DocFilter, Table};
use crate::types::{new_id, Direction, Tier, Urgency};

/// What the external scoring capability returns for one analyst/signal pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assessment {
    pub direction: Direction,
    pub confidence: f64,
    pub reasoning: String,
    #[serde(default)]
    pub key_factors: Vec<String>,
    #[serde(default)]
    pub risks: Vec<String>,
}

/// Everything the scorer needs to form a judgment.
#[derive(Debug, Clone)]
pub struct AssessmentContext {
    pub target_symbol: String,
    pub target_context: Option<String>,
    pub signal_content: String,
    pub signal_direction: Direction,
    pub analyst_perspective: String,
    pub tier_instructions: String,
    pub tier_model: TierModel,
}

/// External LLM scoring capability. The pipeline consumes this; it never
/// implements provider selection or billing.
#[async_trait]
pub trait ScoringCapability: Send + Sync {
    async fn assess(&self, ctx: &AssessmentContext) -> Result<Assessment>;
}

/// One analyst's scored judgment on a signal. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Predictor {
    pub id: String,
    pub organization_slug: String,
    pub target_id: String,
    pub analyst_slug: String,
    /// Analyst weight captured at creation time, so later edits to the
    /// analyst do not rewrite history.
    pub analyst_weight: f64,
    pub direction: Direction,
    pub strength: f64,
    pub confidence: f64,
    pub reasoning: String,
    #[serde(default)]
    pub key_factors: Vec<String>,
    #[serde(default)]
    pub risks: Vec<String>,
    pub signal_id: String,
    pub tier: Tier,
    pub is_test: bool,
    #[serde(default)]
    pub scenario_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Doc for Predictor {
    const TABLE: Table = Table::Predictors;

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
    fn doc_key(&self) -> Option<&str> {
        Some(&self.analyst_slug)
    }
    fn is_test(&self) -> bool {
        self.is_test
    }
}

/// Outcome of scoring one signal across analysts.
#[derive(Debug, Default)]
pub struct ScoreReport {
    pub predictors: Vec<Predictor>,
    pub queued_for_review: u32,
    pub failed_assessments: u32,
}

/// Aggregate evidence for one target inside an open window.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Aggregate {
    pub predictor_count: u32,
    pub combined_strength: f64,
    pub net_direction_score: f64,
}

pub struct PredictorAggregator {
    db: Database,
    catalog: CatalogStore,
    scorer: Arc<dyn ScoringCapability>,
    review: ReviewConfig,
    aggregation: AggregationConfig,
    llm: LlmConfig,
}

impl PredictorAggregator {
    pub fn new(
        db: Database,
        catalog: CatalogStore,
        scorer: Arc<dyn ScoringCapability>,
        review: ReviewConfig,
        aggregation: AggregationConfig,
        llm: LlmConfig,
    ) -> Self {
        Self {
            db,
            catalog,
            scorer,
            review,
            aggregation,
            llm,
        }
    }

    /// Tier selection: urgent signals justify the expensive model.
    fn tier_for(signal: &Signal) -> Tier {
        match signal.urgency {
            Urgency::High => Tier::Gold,
            Urgency::Medium => Tier::Silver,
            Urgency::Low => Tier::Bronze,
        }
    }

    fn tier_model(&self, universe: &Universe, tier: Tier) -> TierModel {
        universe
            .llm_config
            .tier_model(tier)
            .cloned()
            .unwrap_or_else(|| self.llm.tier_model(tier).clone())
    }

    /// Score one signal with every eligible analyst. Assessments run
    /// concurrently, bounded by `llm.max_concurrency`. A failed assessment
    /// costs that analyst's predictor, never the whole signal.
    pub async fn score_signal(
        &self,
        org: &str,
        signal: &Signal,
        target: &Target,
        universe: &Universe,
    ) -> Result<ScoreReport> {
        let analysts = self.catalog.analysts_for_target(org, target).await?;
        let tier = Self::tier_for(signal);
        let tier_model = self.tier_model(universe, tier);

        let assessments = stream::iter(analysts.into_iter().map(|analyst| {
            let ctx = AssessmentContext {
                target_symbol: target.symbol.clone(),
                target_context: target.context.clone(),
                signal_content: signal.content.clone(),
                signal_direction: signal.direction,
                analyst_perspective: analyst.perspective.clone(),
                tier_instructions: analyst.tier_instructions.for_tier(tier).to_string(),
                tier_model: tier_model.clone(),
            };
            let scorer = Arc::clone(&self.scorer);
            async move {
                let result = scorer.assess(&ctx).await;
                (analyst, result)
            }
        }))
        .buffer_unordered(self.llm.max_concurrency.max(1))
        .collect::<Vec<(Analyst, Result<Assessment>)>>()
        .await;

        let mut report = ScoreReport::default();
        for (analyst, result) in assessments {
            let assessment = match result {
                Ok(a) => a,
                Err(e) => {
                    tracing::warn!(analyst = %analyst.slug, "assessment failed: {}", e);
                    report.failed_assessments += 1;
                    continue;
                }
            };
            let strength = assessment.confidence.clamp(0.0, 1.0);

            if self.review.needs_review(assessment.confidence) {
                let item = ReviewQueueItem::from_assessment(
                    org, signal, target, &analyst, tier, &assessment, strength,
                );
                self.db.put(&item).await?;
                report.queued_for_review += 1;
                continue;
            }

            let predictor = build_predictor(org, signal, target, &analyst, tier, &assessment, strength);
            self.db.put(&predictor).await?;
            report.predictors.push(predictor);
        }
        Ok(report)
    }

    /// Weight-normalized aggregate over the open window:
    /// `w = analyst_weight × confidence`, strength averaged by `w`.
    /// Bearish predictors pull `net_direction_score` negative.
    pub async fn aggregate(
        &self,
        org: &str,
        target_id: &str,
        window_start: DateTime<Utc>,
        is_test: bool,
        scenario_id: Option<&str>,
    ) -> Result<Aggregate> {
        let mut filter = DocFilter::default()
            .target(target_id)
            .test(is_test)
            .after(window_start);
        if let Some(scenario) = scenario_id {
            filter = filter.scenario(scenario);
        }
        let predictors: Vec<Predictor> = self.db.list(org, &filter).await?;
        Ok(combine(&predictors))
    }

    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::hours(self.aggregation.window_hours)
    }
}

pub fn build_predictor(
    org: &str,
    signal: &Signal,
    target: &Target,
    analyst: &Analyst,
    tier: Tier,
    assessment: &Assessment,
    strength: f64,
) -> Predictor {
    Predictor {
        id: new_id(),
        organization_slug: org.to_string(),
        target_id: target.id.clone(),
        analyst_slug: analyst.slug.clone(),
        analyst_weight: analyst.default_weight,
        direction: assessment.direction,
        strength: strength.clamp(0.0, 1.0),
        confidence: assessment.confidence.clamp(0.0, 1.0),
        reasoning: assessment.reasoning.clone(),
        key_factors: assessment.key_factors.clone(),
        risks: assessment.risks.clone(),
        signal_id: signal.id.clone(),
        tier,
        is_test: signal.is_test || target.is_test,
        scenario_id: signal.scenario_id.clone(),
        created_at: Utc::now(),
    }
}

/// Weighted-mean combination. Chosen over Bayesian updating for
/// explainability; thresholds only ever observe the combined value.
pub fn combine(predictors: &[Predictor]) -> Aggregate {
    let mut total_weight = 0.0;
    let mut weighted_strength = 0.0;
    let mut net_direction = 0.0;
    for p in predictors {
        let w = p.analyst_weight * p.confidence;
        total_weight += w;
        weighted_strength += w * p.strength;
        net_direction += match p.direction {
            Direction::Bullish => w * p.strength,
            Direction::Bearish => -(w * p.strength),
            Direction::Neutral => 0.0,
        };
    }
    if total_weight == 0.0 {
        return Aggregate::default();
    }
    Aggregate {
        predictor_count: predictors.len() as u32,
        combined_strength: weighted_strength / total_weight,
        net_direction_score: net_direction / total_weight,
    }
}
