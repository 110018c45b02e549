//! Backtesting a learning against prediction history
//!
//! Replays the evaluation window twice: as it happened, and as it would
//! have happened with the learning suppressing the predictions it targets.
//! Read-heavy and lock-free: history is read once up front, and concurrent
//! writes landing mid-replay are simply not part of this snapshot.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::evaluator::Evaluation;
use crate::learning::Learning;
use crate::predictions::Prediction;
use crate::storage::{Database, DocFilter};

/// Minimum joint sample for a meaningful verdict.
const MIN_SAMPLE: usize = 5;
/// Significance bar for `passed`.
const MIN_SIGNIFICANCE: f64 = 0.7;
/// Strength floor a threshold-adjustment learning would have enforced when
/// its config does not carry one.
const DEFAULT_STRENGTH_FLOOR: f64 = 0.5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub learning_id: String,
    pub window_days: u32,
    pub sample_size: u32,
    pub baseline_accuracy: f64,
    pub with_learning_accuracy: f64,
    pub accuracy_lift: f64,
    pub false_positive_delta: f64,
    /// 1 - p for a two-proportion z-test of the accuracy difference.
    pub statistical_significance: f64,
    pub passed: bool,
    /// True when the deadline cut the replay short; numbers cover the
    /// portion replayed so far.
    pub aborted: bool,
}

pub async fn run_backtest(
    db: &Database,
    org: &str,
    learning: &Learning,
    window_days: u32,
    deadline: Option<DateTime<Utc>>,
) -> Result<BacktestResult> {
    let since = Utc::now() - Duration::days(window_days as i64);
    let evaluations: Vec<Evaluation> = db.list(org, &DocFilter::default().after(since)).await?;

    let mut baseline = Tally::default();
    let mut with_learning = Tally::default();
    let mut aborted = false;

    for evaluation in &evaluations {
        if let Some(deadline) = deadline {
            if Utc::now() >= deadline {
                aborted = true;
                break;
            }
        }
        let Some(prediction) = db.get::<Prediction>(org, &evaluation.prediction_id).await? else {
            continue;
        };
        baseline.add(evaluation);
        if !suppressed_by(learning, &prediction) {
            with_learning.add(evaluation);
        }
    }

    let baseline_accuracy = baseline.accuracy();
    let with_learning_accuracy = with_learning.accuracy();
    let accuracy_lift = with_learning_accuracy - baseline_accuracy;
    let false_positive_delta = with_learning.fp_rate() - baseline.fp_rate();
    let statistical_significance = significance(
        baseline_accuracy,
        baseline.total,
        with_learning_accuracy,
        with_learning.total,
    );
    let passed = !aborted
        && baseline.total >= MIN_SAMPLE
        && accuracy_lift > 0.0
        && statistical_significance >= MIN_SIGNIFICANCE;

    Ok(BacktestResult {
        learning_id: learning.id.clone(),
        window_days,
        sample_size: baseline.total as u32,
        baseline_accuracy,
        with_learning_accuracy,
        accuracy_lift,
        false_positive_delta,
        statistical_significance,
        passed,
        aborted,
    })
}

/// Would this learning have kept the prediction from being emitted?
fn suppressed_by(learning: &Learning, prediction: &Prediction) -> bool {
    if let Some(target_id) = learning.config.get("target_id").and_then(|v| v.as_str()) {
        if target_id != prediction.target_id {
            return false;
        }
    }
    match learning.learning_type.as_str() {
        "threshold_adjustment" => {
            let floor = learning
                .config
                .get("strength_floor")
                .and_then(|v| v.as_f64())
                .unwrap_or(DEFAULT_STRENGTH_FLOOR);
            prediction.combined_strength < floor
        }
        // Reinforcement learnings never suppress; they only widen future
        // emission, which a replay over emitted history cannot observe.
        _ => false,
    }
}

#[derive(Default)]
struct Tally {
    total: usize,
    correct: usize,
    false_positives: usize,
}

impl Tally {
    fn add(&mut self, evaluation: &Evaluation) {
        self.total += 1;
        if evaluation.direction_correct {
            self.correct += 1;
        } else {
            self.false_positives += 1;
        }
    }

    fn accuracy(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.correct as f64 / self.total as f64
    }

    fn fp_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.false_positives as f64 / self.total as f64
    }
}

/// Two-proportion z-test mapped to `1 - p` (two-sided).
fn significance(p1: f64, n1: usize, p2: f64, n2: usize) -> f64 {
    if n1 == 0 || n2 == 0 {
        return 0.0;
    }
    let (n1f, n2f) = (n1 as f64, n2 as f64);
    let pooled = (p1 * n1f + p2 * n2f) / (n1f + n2f);
    let se = (pooled * (1.0 - pooled) * (1.0 / n1f + 1.0 / n2f)).sqrt();
    if se < f64::EPSILON {
        return 0.0;
    }
    let z = ((p2 - p1) / se).abs();
    // Normal CDF via Abramowitz-Stegun erf approximation.
    let p_two_sided = 2.0 * (1.0 - normal_cdf(z));
    (1.0 - p_two_sided).clamp(0.0, 1.0)
}

fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}

fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + 0.3275911 * x);
    let y = 1.0
        - (((((1.061405429 * t - 1.453152027) * t) + 1.421413741) * t - 0.284496736) * t
            + 0.254829592)
            * t
            * (-x * x).exp();
    sign * y
}

#[cfg(test)]
mod backtest_math_tests {
    use super::*;

    #[test]
    fn erf_matches_known_values() {
        assert!((erf(0.0)).abs() < 1e-9);
        assert!((erf(1.0) - 0.8427).abs() < 1e-3);
        assert!((erf(-1.0) + 0.8427).abs() < 1e-3);
    }

    #[test]
    fn significance_grows_with_separation() {
        let weak = significance(0.5, 20, 0.55, 20);
        let strong = significance(0.5, 200, 0.8, 200);
        assert!(strong > weak);
        assert!(strong > 0.9);
    }

    #[test]
    fn significance_zero_on_empty_samples() {
        assert_eq!(significance(0.5, 0, 0.9, 10), 0.0);
    }
}
