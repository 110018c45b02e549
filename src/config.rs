//! Configuration loading and defaults
//!
//! Layered: serde defaults, then `foresight.toml`, then `FORESIGHT__*`
//! environment variables. Every section deserializes from an empty TOML
//! table so a bare install runs on defaults.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::Tier;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub review: ReviewConfig,
    #[serde(default)]
    pub promotion: PromotionConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

impl Config {
    /// Load from `path` (optional) and environment.
    pub fn load(path: &str) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("FORESIGHT").separator("__"))
            .build()?;
        Ok(cfg.try_deserialize()?)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_url")]
    pub url: String,
}

fn default_db_url() -> String {
    "sqlite://foresight.db?mode=rwc".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_db_url(),
        }
    }
}

/// Provider/model pair for one LLM tier.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TierModel {
    pub provider: String,
    pub model: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Fallback tier table used when a universe does not override it.
    #[serde(default = "default_gold")]
    pub gold: TierModel,
    #[serde(default = "default_silver")]
    pub silver: TierModel,
    #[serde(default = "default_bronze")]
    pub bronze: TierModel,
    /// Max concurrent assessment calls per signal.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

fn default_gold() -> TierModel {
    TierModel {
        provider: "openai".to_string(),
        model: "gpt-4o".to_string(),
    }
}

fn default_silver() -> TierModel {
    TierModel {
        provider: "openai".to_string(),
        model: "gpt-4o-mini".to_string(),
    }
}

fn default_bronze() -> TierModel {
    TierModel {
        provider: "deepseek".to_string(),
        model: "deepseek-chat".to_string(),
    }
}

fn default_max_concurrency() -> usize {
    4
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: None,
            gold: default_gold(),
            silver: default_silver(),
            bronze: default_bronze(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

impl LlmConfig {
    pub fn tier_model(&self, tier: Tier) -> &TierModel {
        match tier {
            Tier::Gold => &self.gold,
            Tier::Silver => &self.silver,
            Tier::Bronze => &self.bronze,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    /// Seconds between scheduling passes in `run` mode.
    #[serde(default = "default_tick_secs")]
    pub tick_interval_secs: u64,
    /// Max items accepted from one fetch.
    #[serde(default = "default_max_items")]
    pub max_items_per_fetch: usize,
}

fn default_tick_secs() -> u64 {
    60
}

fn default_max_items() -> usize {
    50
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_secs(),
            max_items_per_fetch: default_max_items(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DetectionConfig {
    /// Window within which a repeated fingerprint corroborates instead of
    /// creating a new signal.
    #[serde(default = "default_corroboration_hours")]
    pub corroboration_window_hours: i64,
    /// Claims scoring below this are dropped before any analyst sees them.
    #[serde(default = "default_min_claim_confidence")]
    pub min_claim_confidence: f64,
}

fn default_corroboration_hours() -> i64 {
    48
}

fn default_min_claim_confidence() -> f64 {
    0.15
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            corroboration_window_hours: default_corroboration_hours(),
            min_claim_confidence: default_min_claim_confidence(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AggregationConfig {
    /// Evaluation window over which predictors accumulate toward emission.
    #[serde(default = "default_window_hours")]
    pub window_hours: i64,
}

fn default_window_hours() -> i64 {
    24
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            window_hours: default_window_hours(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerationConfig {
    /// Hours a prediction stays open before expiring.
    #[serde(default = "default_timeframe_hours")]
    pub timeframe_hours: i64,
    /// Expected percent move at combined strength 1.0.
    #[serde(default = "default_magnitude_scale")]
    pub magnitude_scale: f64,
}

fn default_timeframe_hours() -> i64 {
    24
}

fn default_magnitude_scale() -> f64 {
    5.0
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            timeframe_hours: default_timeframe_hours(),
            magnitude_scale: default_magnitude_scale(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EvaluationConfig {
    /// |outcome| below this counts as a neutral move.
    #[serde(default = "default_neutral_band")]
    pub neutral_band_pct: f64,
    /// Overall score below this triggers a corrective learning suggestion.
    #[serde(default = "default_suggest_below")]
    pub suggest_learning_below: f64,
    /// Overall score above this triggers a reinforcing learning suggestion.
    #[serde(default = "default_suggest_above")]
    pub suggest_learning_above: f64,
}

fn default_neutral_band() -> f64 {
    0.5
}

fn default_suggest_below() -> f64 {
    0.35
}

fn default_suggest_above() -> f64 {
    0.85
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            neutral_band_pct: default_neutral_band(),
            suggest_learning_below: default_suggest_below(),
            suggest_learning_above: default_suggest_above(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReviewConfig {
    /// Inclusive confidence band routed to human review.
    #[serde(default = "default_band_low")]
    pub band_low: f64,
    #[serde(default = "default_band_high")]
    pub band_high: f64,
}

fn default_band_low() -> f64 {
    0.4
}

fn default_band_high() -> f64 {
    0.7
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            band_low: default_band_low(),
            band_high: default_band_high(),
        }
    }
}

impl ReviewConfig {
    pub fn needs_review(&self, confidence: f64) -> bool {
        confidence >= self.band_low && confidence <= self.band_high
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PromotionConfig {
    #[serde(default = "default_min_applications")]
    pub min_applications: u32,
    #[serde(default = "default_min_success_rate")]
    pub min_success_rate: f64,
    /// Policy flag: when true, `promote` demands a passing backtest in
    /// addition to passing validation.
    #[serde(default = "default_require_backtest")]
    pub require_passing_backtest: bool,
    #[serde(default = "default_backtest_window_days")]
    pub default_backtest_window_days: u32,
}

fn default_min_applications() -> u32 {
    10
}

fn default_min_success_rate() -> f64 {
    0.8
}

fn default_require_backtest() -> bool {
    false
}

fn default_backtest_window_days() -> u32 {
    30
}

impl Default for PromotionConfig {
    fn default() -> Self {
        Self {
            min_applications: default_min_applications(),
            min_success_rate: default_min_success_rate(),
            require_passing_backtest: default_require_backtest(),
            default_backtest_window_days: default_backtest_window_days(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitorConfig {
    /// Hours of history forming the rolling baseline.
    #[serde(default = "default_baseline_hours")]
    pub baseline_window_hours: i64,
    /// Hours of history forming the current-rate window.
    #[serde(default = "default_current_hours")]
    pub current_window_hours: i64,
    /// Percent deviation from baseline that raises a warning alert.
    #[serde(default = "default_warning_pct")]
    pub warning_deviation_pct: f64,
    /// Percent deviation that raises a critical alert.
    #[serde(default = "default_critical_pct")]
    pub critical_deviation_pct: f64,
    /// Price move (percent) considered significant when scanning for
    /// missed opportunities.
    #[serde(default = "default_significant_move")]
    pub significant_move_pct: f64,
}

fn default_baseline_hours() -> i64 {
    24 * 7
}

fn default_current_hours() -> i64 {
    24
}

fn default_warning_pct() -> f64 {
    30.0
}

fn default_critical_pct() -> f64 {
    60.0
}

fn default_significant_move() -> f64 {
    5.0
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            baseline_window_hours: default_baseline_hours(),
            current_window_hours: default_current_hours(),
            warning_deviation_pct: default_warning_pct(),
            critical_deviation_pct: default_critical_pct(),
            significant_move_pct: default_significant_move(),
        }
    }
}
