//! Outcome evaluation
//!
//! Scores every resolved prediction exactly once against its observed
//! outcome, and turns notable results into learning suggestions for the
//! human queue.


use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::EvaluationConfig;
use crate::error::Result;
use crate::learning::{LearningQueueItem, SuggestedLearning};
use crate::predictions::Prediction;
use crate::storage::{Database, Doc, DocFilter, Table};
use crate::types::{new_id, Direction, PredictionStatus, ScopeLevel};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub id: String,
    pub organization_slug: String,
    pub prediction_id: String,
    pub target_id: String,
    pub direction_correct: bool,
    pub magnitude_score: f64,
    pub timing_score: f64,
    pub overall_score: f64,
    pub evaluated_at: DateTime<Utc>,
    pub is_test: bool,
    #[serde(default)]
    pub scenario_id: Option<String>,
}

impl Doc for Evaluation {
    const TABLE: Table = Table::Evaluations;

    fn id(&self) -> &str {
        &self.id
    }
    fn org(&self) -> &str {
        &self.organization_slug
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.evaluated_at
    }
    fn target_id(&self) -> Option<&str> {
        Some(&self.target_id)
    }
    fn scenario_id(&self) -> Option<&str> {
        self.scenario_id.as_deref()
    }
    /// One evaluation per prediction; the key makes the check cheap.
    fn doc_key(&self) -> Option<&str> {
        Some(&self.prediction_id)
    }
    fn is_test(&self) -> bool {
        self.is_test
    }
}

#[derive(Debug, Default, Serialize)]
pub struct EvaluationReport {
    pub evaluated: u32,
    pub suggestions_created: u32,
}

pub struct Evaluator {
    db: Database,
    config: EvaluationConfig,
}

impl Evaluator {
    pub fn new(db: Database, config: EvaluationConfig) -> Self {
        Self { db, config }
    }

    /// Evaluate all resolved-but-unevaluated predictions. Idempotent: a
    /// prediction with an existing evaluation is skipped.
    pub async fn evaluate_resolved(
        &self,
        org: &str,
        scenario_id: Option<&str>,
    ) -> Result<EvaluationReport> {
        let mut filter = DocFilter::default().status(PredictionStatus::Resolved.as_str());
        if let Some(scenario) = scenario_id {
            filter = filter.scenario(scenario);
        }
        let resolved: Vec<Prediction> = self.db.list(org, &filter).await?;

        let mut report = EvaluationReport::default();
        for prediction in resolved {
            let existing: Vec<Evaluation> = self
                .db
                .list(org, &DocFilter::default().key(&prediction.id).limit(1))
                .await?;
            if !existing.is_empty() {
                continue;
            }
            let evaluation = self.evaluate_one(org, &prediction);
            self.db.put(&evaluation).await?;
            report.evaluated += 1;

            if let Some(suggestion) = self.suggest_learning(&prediction, &evaluation) {
                let item = LearningQueueItem::new(
                    org,
                    suggestion,
                    evaluation.overall_score.max(1.0 - evaluation.overall_score),
                    Some(evaluation.id.clone()),
                    prediction.scenario_id.clone(),
                );
                self.db.put(&item).await?;
                report.suggestions_created += 1;
            }
        }
        Ok(report)
    }

    /// Score one resolved prediction. Outcome and magnitude are percent
    /// moves; all scores land in [0,1].
    pub fn evaluate_one(&self, org: &str, prediction: &Prediction) -> Evaluation {
        let outcome = prediction.outcome_value.unwrap_or(0.0);
        let direction_correct = match prediction.direction {
            Direction::Bullish => outcome > self.config.neutral_band_pct,
            Direction::Bearish => outcome < -self.config.neutral_band_pct,
            Direction::Neutral => outcome.abs() <= self.config.neutral_band_pct,
        };

        let predicted = prediction.magnitude.abs();
        let actual = outcome.abs();
        let magnitude_score = if predicted.max(actual) < f64::EPSILON {
            1.0
        } else {
            (1.0 - (predicted - actual).abs() / predicted.max(actual)).clamp(0.0, 1.0)
        };

        // Earlier resolution inside the window scores better; resolving at
        // the deadline still earns half credit.
        let timing_score = match prediction.resolved_at {
            Some(resolved_at) => {
                let window_secs = (prediction.expires_at - prediction.predicted_at)
                    .num_seconds()
                    .max(1) as f64;
                let used_secs = (resolved_at - prediction.predicted_at)
                    .num_seconds()
                    .clamp(0, i64::MAX) as f64;
                (1.0 - 0.5 * (used_secs / window_secs).min(1.0)).clamp(0.0, 1.0)
            }
            None => 0.0,
        };

        let overall_score = 0.5 * (direction_correct as u8 as f64)
            + 0.3 * magnitude_score
            + 0.2 * timing_score;

        Evaluation {
            id: new_id(),
            organization_slug: org.to_string(),
            prediction_id: prediction.id.clone(),
            target_id: prediction.target_id.clone(),
            direction_correct,
            magnitude_score,
            timing_score,
            overall_score,
            evaluated_at: Utc::now(),
            is_test: prediction.is_test,
            scenario_id: prediction.scenario_id.clone(),
        }
    }

    /// Notably bad or notably good outcomes become learning suggestions.
    fn suggest_learning(
        &self,
        prediction: &Prediction,
        evaluation: &Evaluation,
    ) -> Option<SuggestedLearning> {
        if evaluation.overall_score < self.config.suggest_learning_below {
            Some(SuggestedLearning {
                title: format!(
                    "Discount weak {} consensus for this target",
                    prediction.direction.as_str()
                ),
                description: format!(
                    "Prediction {} scored {:.2}: direction {}, magnitude off by {:.0}%. \
                     Consider raising thresholds or down-weighting the contributing analysts.",
                    prediction.id,
                    evaluation.overall_score,
                    if evaluation.direction_correct { "correct" } else { "wrong" },
                    (1.0 - evaluation.magnitude_score) * 100.0,
                ),
                scope_level: ScopeLevel::Target,
                learning_type: "threshold_adjustment".to_string(),
                config: serde_json::json!({
                    "target_id": prediction.target_id,
                    "direction": prediction.direction,
                    "observed_score": evaluation.overall_score,
                }),
            })
        } else if evaluation.overall_score > self.config.suggest_learning_above {
            Some(SuggestedLearning {
                title: format!(
                    "Reinforce {} signal pattern for this target",
                    prediction.direction.as_str()
                ),
                description: format!(
                    "Prediction {} scored {:.2}; the contributing analyst mix was reliable. \
                     Consider lowering the emission gate for similar evidence.",
                    prediction.id, evaluation.overall_score,
                ),
                scope_level: ScopeLevel::Target,
                learning_type: "pattern_reinforcement".to_string(),
                config: serde_json::json!({
                    "target_id": prediction.target_id,
                    "direction": prediction.direction,
                    "observed_score": evaluation.overall_score,
                }),
            })
        } else {
            None
        }
    }

    /// Share of evaluations with the direction called correctly.
    pub async fn accuracy(
        &self,
        org: &str,
        since: Option<DateTime<Utc>>,
        is_test: bool,
    ) -> Result<Option<f64>> {
        let mut filter = DocFilter::default().test(is_test);
        if let Some(since) = since {
            filter = filter.after(since);
        }
        let evaluations: Vec<Evaluation> = self.db.list(org, &filter).await?;
        if evaluations.is_empty() {
            return Ok(None);
        }
        let correct = evaluations.iter().filter(|e| e.direction_correct).count();
        Ok(Some(correct as f64 / evaluations.len() as f64))
    }
}
