//! Strategy recommendation
//!
//! Ranks the org's strategies for a universe from its recent predictor
//! history: volume says how much evidence typically accumulates, strength
//! volatility says how trustworthy that evidence is.

use chrono::{Duration, Utc};
use serde::Serialize;

use std::collections::HashSet;

use super::Predictor;
use crate::catalog::{CatalogStore, RiskLevel, Strategy, Target, Universe};
use crate::error::{PipelineError, Result};
use crate::storage::DocFilter;

const HISTORY_DAYS: i64 = 30;

#[derive(Debug, Clone, Serialize)]
pub struct RankedStrategy {
    pub strategy: Strategy,
    pub score: f64,
    pub reasoning: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StrategyRecommendation {
    pub recommended: Strategy,
    pub alternatives: Vec<RankedStrategy>,
    pub predictor_volume: u32,
    pub strength_volatility: f64,
}

pub async fn recommend_strategy(
    catalog: &CatalogStore,
    org: &str,
    universe: &Universe,
) -> Result<StrategyRecommendation> {
    let since = Utc::now() - Duration::days(HISTORY_DAYS);
    let targets: Vec<Target> = catalog
        .db()
        .list(org, &DocFilter::default().universe(&universe.id))
        .await?;
    let target_ids: HashSet<&str> = targets.iter().map(|t| t.id.as_str()).collect();
    let predictors: Vec<Predictor> = catalog
        .db()
        .list(org, &DocFilter::default().test(false).after(since))
        .await?
        .into_iter()
        .filter(|p: &Predictor| target_ids.contains(p.target_id.as_str()))
        .collect();
    let volume = predictors.len() as u32;
    let volatility = strength_volatility(&predictors);

    let strategies = catalog.list_strategies(org).await?;
    if strategies.is_empty() {
        return Err(PipelineError::not_found("strategy", "no strategies defined"));
    }

    let mut ranked: Vec<RankedStrategy> = strategies
        .into_iter()
        .map(|s| {
            let (score, reasoning) = score_strategy(&s, volume, volatility, universe);
            RankedStrategy {
                strategy: s,
                score,
                reasoning,
            }
        })
        .collect();
    ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let recommended = ranked.remove(0);
    Ok(StrategyRecommendation {
        recommended: recommended.strategy,
        alternatives: ranked,
        predictor_volume: volume,
        strength_volatility: volatility,
    })
}

fn strength_volatility(predictors: &[Predictor]) -> f64 {
    if predictors.len() < 2 {
        return 0.0;
    }
    let n = predictors.len() as f64;
    let mean = predictors.iter().map(|p| p.strength).sum::<f64>() / n;
    let var = predictors
        .iter()
        .map(|p| (p.strength - mean).powi(2))
        .sum::<f64>()
        / (n - 1.0);
    var.sqrt()
}

/// Higher volume supports lower thresholds; higher volatility demands
/// caution. Scores land in roughly [0, 1].
fn score_strategy(
    strategy: &Strategy,
    volume: u32,
    volatility: f64,
    universe: &Universe,
) -> (f64, String) {
    let volume_factor = (volume as f64 / 50.0).min(1.0);
    let stability = 1.0 - volatility.min(0.5) * 2.0;

    let fit = match strategy.risk_level {
        RiskLevel::Aggressive => 0.5 * volume_factor + 0.5 * stability,
        RiskLevel::Balanced => 0.6 + 0.2 * volume_factor - 0.2 * (1.0 - stability),
        RiskLevel::Conservative => 0.5 * (1.0 - volume_factor) + 0.5 * (1.0 - stability),
    };
    let reasoning = format!(
        "{} predictors over {} days (volatility {:.2}) for universe '{}': {}",
        volume,
        HISTORY_DAYS,
        volatility,
        universe.name,
        match strategy.risk_level {
            RiskLevel::Aggressive => "enough steady evidence for lower gates",
            RiskLevel::Balanced => "default fit for mixed evidence",
            RiskLevel::Conservative => "thin or noisy evidence favors higher gates",
        }
    );
    (fit.clamp(0.0, 1.0), reasoning)
}
