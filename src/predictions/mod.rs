//! Prediction generation and lifecycle
//!
//! Per-target state machine: idle → evidence-accumulating →
//! prediction-emitted → resolved | expired. A prediction is emitted only
//! when predictor count and combined strength clear the universe
//! thresholds inside one evaluation window, and at most one active
//! prediction exists per target — new evidence attaches to the open
//! prediction's lineage instead of spawning a second one.


use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::analysts::{combine, Predictor};
use crate::catalog::{Target, Universe};
use crate::config::{AggregationConfig, GenerationConfig};
use crate::detector::Signal;
use crate::error::{ErrorCode, PipelineError, Result};
use crate::storage::{Database, Doc, DocFilter, Table};
use crate::types::{new_id, Article, Direction, PredictionStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub organization_slug: String,
    pub universe_id: String,
    pub target_id: String,
    pub direction: Direction,
    /// Expected move, percent.
    pub magnitude: f64,
    pub confidence: f64,
    pub combined_strength: f64,
    pub timeframe_hours: i64,
    pub status: PredictionStatus,
    pub predicted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    /// Observed move, percent. Present once resolved.
    #[serde(default)]
    pub outcome_value: Option<f64>,
    pub reasoning: String,
    /// Contributing predictors, including evidence attached after emission.
    pub predictor_ids: Vec<String>,
    pub is_test: bool,
    #[serde(default)]
    pub scenario_id: Option<String>,
}

impl Doc for Prediction {
    const TABLE: Table = Table::Predictions;

    fn id(&self) -> &str {
        &self.id
    }
    fn org(&self) -> &str {
        &self.organization_slug
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.predicted_at
    }
    fn universe_id(&self) -> Option<&str> {
        Some(&self.universe_id)
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

/// Fully-assembled lineage for one prediction.
#[derive(Debug, Serialize)]
pub struct DeepDive {
    pub prediction: Prediction,
    pub predictors: Vec<PredictorLineage>,
    pub stats: DeepDiveStats,
}

#[derive(Debug, Serialize)]
pub struct PredictorLineage {
    pub predictor: Predictor,
    pub signal: Option<Signal>,
    pub article: Option<Article>,
}

#[derive(Debug, Serialize)]
pub struct DeepDiveStats {
    pub predictor_count: u32,
    pub signal_count: u32,
    pub analyst_count: u32,
    pub average_confidence: f64,
}

pub struct PredictionGenerator {
    db: Database,
    aggregation: AggregationConfig,
    generation: GenerationConfig,
}

impl PredictionGenerator {
    pub fn new(db: Database, aggregation: AggregationConfig, generation: GenerationConfig) -> Self {
        Self {
            db,
            aggregation,
            generation,
        }
    }

    async fn active_prediction(
        &self,
        org: &str,
        target_id: &str,
        is_test: bool,
        scenario_id: Option<&str>,
    ) -> Result<Option<Prediction>> {
        let mut filter = DocFilter::default()
            .target(target_id)
            .status(PredictionStatus::Active.as_str())
            .test(is_test);
        if let Some(scenario) = scenario_id {
            filter = filter.scenario(scenario);
        }
        let found: Vec<Prediction> = self.db.list(org, &filter).await?;
        Ok(found.into_iter().next())
    }

    /// Predictors in the open window that are not already part of any
    /// prediction's lineage. Emitting consumes evidence, which is what
    /// resets the window.
    async fn unconsumed_predictors(
        &self,
        org: &str,
        target_id: &str,
        is_test: bool,
        scenario_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Predictor>> {
        let window_start = now - Duration::hours(self.aggregation.window_hours);
        let mut filter = DocFilter::default()
            .target(target_id)
            .test(is_test)
            .after(window_start);
        if let Some(scenario) = scenario_id {
            filter = filter.scenario(scenario);
        }
        let predictors: Vec<Predictor> = self.db.list(org, &filter).await?;

        let predictions: Vec<Prediction> = self
            .db
            .list(org, &DocFilter::default().target(target_id).test(is_test))
            .await?;
        let consumed: HashSet<&str> = predictions
            .iter()
            .flat_map(|p| p.predictor_ids.iter().map(|s| s.as_str()))
            .collect();

        Ok(predictors
            .into_iter()
            .filter(|p| !consumed.contains(p.id.as_str()))
            .collect())
    }

    /// Run the emission gate for one target. Returns the new prediction if
    /// both thresholds held simultaneously; attaches stray evidence to an
    /// already-active prediction otherwise.
    ///
    /// Callers serialize per `(org, target)`; this method assumes no
    /// concurrent invocation for the same target.
    pub async fn try_emit(
        &self,
        org: &str,
        target: &Target,
        universe: &Universe,
        scenario_id: Option<&str>,
    ) -> Result<Option<Prediction>> {
        if !target.is_active || !universe.is_active {
            return Ok(None);
        }
        let now = Utc::now();
        let fresh = self
            .unconsumed_predictors(org, &target.id, target.is_test, scenario_id, now)
            .await?;

        if let Some(mut active) = self
            .active_prediction(org, &target.id, target.is_test, scenario_id)
            .await?
        {
            // Single-active invariant: accumulate lineage, emit nothing.
            let mut changed = false;
            for p in &fresh {
                if !active.predictor_ids.contains(&p.id) {
                    active.predictor_ids.push(p.id.clone());
                    changed = true;
                }
            }
            if changed {
                self.db.put(&active).await?;
                tracing::debug!(prediction_id = %active.id, "attached evidence to active prediction");
            }
            return Ok(None);
        }

        if fresh.is_empty() {
            return Ok(None);
        }
        let aggregate = combine(&fresh);
        let thresholds = &universe.thresholds;
        if aggregate.predictor_count < thresholds.min_predictors
            || aggregate.combined_strength < thresholds.min_combined_strength
        {
            return Ok(None);
        }

        let direction = if aggregate.net_direction_score > f64::EPSILON {
            Direction::Bullish
        } else if aggregate.net_direction_score < -f64::EPSILON {
            Direction::Bearish
        } else {
            Direction::Neutral
        };
        let confidence = fresh.iter().map(|p| p.confidence).sum::<f64>() / fresh.len() as f64;
        let timeframe = self.generation.timeframe_hours;
        let prediction = Prediction {
            id: new_id(),
            organization_slug: org.to_string(),
            universe_id: target.universe_id.clone(),
            target_id: target.id.clone(),
            direction,
            magnitude: aggregate.combined_strength * self.generation.magnitude_scale,
            confidence,
            combined_strength: aggregate.combined_strength,
            timeframe_hours: timeframe,
            status: PredictionStatus::Active,
            predicted_at: now,
            expires_at: now + Duration::hours(timeframe),
            resolved_at: None,
            outcome_value: None,
            reasoning: format!(
                "{} of {} predictors aligned {} with combined strength {:.2}",
                fresh.iter().filter(|p| p.direction == direction).count(),
                aggregate.predictor_count,
                direction.as_str(),
                aggregate.combined_strength,
            ),
            predictor_ids: fresh.iter().map(|p| p.id.clone()).collect(),
            is_test: target.is_test,
            scenario_id: scenario_id.map(|s| s.to_string()),
        };
        self.db.put(&prediction).await?;
        tracing::info!(
            prediction_id = %prediction.id,
            target = %target.symbol,
            direction = direction.as_str(),
            strength = aggregate.combined_strength,
            "prediction emitted"
        );
        Ok(Some(prediction))
    }

    /// Expire every active prediction past its deadline. Idempotent.
    pub async fn expire_due(&self, org: &str) -> Result<u32> {
        let actives: Vec<Prediction> = self
            .db
            .list(
                org,
                &DocFilter::default().status(PredictionStatus::Active.as_str()),
            )
            .await?;
        let now = Utc::now();
        let mut expired = 0;
        for mut prediction in actives {
            if now > prediction.expires_at {
                prediction.status = PredictionStatus::Expired;
                self.db.put(&prediction).await?;
                expired += 1;
            }
        }
        Ok(expired)
    }

    /// Supply an observed outcome (percent move) for an active prediction.
    pub async fn resolve(&self, org: &str, id: &str, outcome_value: f64) -> Result<Prediction> {
        let mut prediction: Prediction = self
            .db
            .get(org, id)
            .await?
            .ok_or_else(|| PipelineError::not_found("prediction", id))?;
        if prediction.status != PredictionStatus::Active {
            return Err(PipelineError::validation(
                ErrorCode::InvalidData,
                format!("prediction is {}, not active", prediction.status.as_str()),
            ));
        }
        prediction.status = PredictionStatus::Resolved;
        prediction.resolved_at = Some(Utc::now());
        prediction.outcome_value = Some(outcome_value);
        self.db.put(&prediction).await?;
        Ok(prediction)
    }

    pub async fn get(&self, org: &str, id: &str) -> Result<Prediction> {
        self.db
            .get(org, id)
            .await?
            .ok_or_else(|| PipelineError::not_found("prediction", id))
    }

    /// Assemble the full lineage graph: prediction → predictors → signals
    /// → fingerprints → source articles, plus summary stats.
    pub async fn deep_dive(&self, org: &str, id: &str) -> Result<DeepDive> {
        if id.is_empty() {
            return Err(PipelineError::missing_id("prediction"));
        }
        let prediction = self.get(org, id).await?;

        let mut predictors = Vec::new();
        let mut signal_ids = HashSet::new();
        let mut analyst_slugs = HashSet::new();
        let mut confidence_sum = 0.0;
        for predictor_id in &prediction.predictor_ids {
            let Some(predictor) = self.db.get::<Predictor>(org, predictor_id).await? else {
                continue;
            };
            let signal: Option<Signal> = self.db.get(org, &predictor.signal_id).await?;
            let article = match signal.as_ref().and_then(|s| s.article_id.as_deref()) {
                Some(article_id) => self.db.get::<Article>(org, article_id).await?,
                None => None,
            };
            signal_ids.insert(predictor.signal_id.clone());
            analyst_slugs.insert(predictor.analyst_slug.clone());
            confidence_sum += predictor.confidence;
            predictors.push(PredictorLineage {
                predictor,
                signal,
                article,
            });
        }

        let predictor_count = predictors.len() as u32;
        let average_confidence = if predictor_count > 0 {
            confidence_sum / predictor_count as f64
        } else {
            0.0
        };
        Ok(DeepDive {
            prediction,
            stats: DeepDiveStats {
                predictor_count,
                signal_count: signal_ids.len() as u32,
                analyst_count: analyst_slugs.len() as u32,
                average_confidence,
            },
            predictors,
        })
    }
}
