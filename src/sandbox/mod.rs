//! Test sandbox
//!
//! Scenarios own injected and generated rows, isolated from production by
//! the `is_test` boundary and a `scenario_id` on every owned row. A tier
//! run executes exactly one pipeline stage against only that scenario's
//! data; cleanup deletes everything the scenario owns and is safe to
//! retry.

#[cfg(test)]
mod tests;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::analysts::PredictorAggregator;
use crate::catalog::{CatalogStore, Target};
use crate::detector::SignalDetector;
use crate::error::{ErrorCode, PipelineError, Result};
use crate::evaluator::Evaluator;
use crate::events::{EventContext, EventSink, PipelineEvent};
use crate::predictions::{Prediction, PredictionGenerator};
use crate::detector::Signal;
use crate::storage::{Database, Doc, DocFilter, Table};
use crate::types::{
    is_test_symbol, new_id, Article, Direction, InjectionTable, PipelineTier, PredictionStatus,
    ScenarioStatus, Urgency, VariationType,
};

/// Base shape for generated scenario data; variations perturb one field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    #[serde(default = "default_direction")]
    pub base_direction: Direction,
    #[serde(default = "default_confidence")]
    pub base_confidence: f64,
    /// Percent move injected price series imply.
    #[serde(default = "default_magnitude")]
    pub base_magnitude: f64,
    /// Shift applied to generated timestamps.
    #[serde(default)]
    pub timing_offset_hours: i64,
}

fn default_direction() -> Direction {
    Direction::Bullish
}

fn default_confidence() -> f64 {
    0.8
}

fn default_magnitude() -> f64 {
    3.0
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            base_direction: default_direction(),
            base_confidence: default_confidence(),
            base_magnitude: default_magnitude(),
            timing_offset_hours: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestScenario {
    pub id: String,
    pub organization_slug: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: ScenarioStatus,
    pub injection_points: Vec<InjectionTable>,
    #[serde(default)]
    pub config: ScenarioConfig,
    /// Source scenario for a derived variation.
    #[serde(default)]
    pub parent_scenario_id: Option<String>,
    #[serde(default)]
    pub variation: Option<VariationType>,
    pub created_at: DateTime<Utc>,
}

impl Doc for TestScenario {
    const TABLE: Table = Table::Scenarios;

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
        Some(match self.status {
            ScenarioStatus::Draft => "draft",
            ScenarioStatus::Active => "active",
            ScenarioStatus::Archived => "archived",
        })
    }
    fn is_test(&self) -> bool {
        true
    }
}

/// A price observation; test rows carry their owning scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricePoint {
    pub id: String,
    pub organization_slug: String,
    pub target_id: String,
    pub price: Decimal,
    pub recorded_at: DateTime<Utc>,
    pub is_test: bool,
    #[serde(default)]
    pub scenario_id: Option<String>,
}

impl Doc for PricePoint {
    const TABLE: Table = Table::PriceData;

    fn id(&self) -> &str {
        &self.id
    }
    fn org(&self) -> &str {
        &self.organization_slug
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }
    fn target_id(&self) -> Option<&str> {
        Some(&self.target_id)
    }
    fn scenario_id(&self) -> Option<&str> {
        self.scenario_id.as_deref()
    }
    fn is_test(&self) -> bool {
        self.is_test
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewScenario {
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub injection_points: Option<Vec<InjectionTable>>,
    #[serde(default)]
    pub config: Option<ScenarioConfig>,
}

/// Counts returned by one tier run.
#[derive(Debug, Default, Serialize)]
pub struct TierRunReport {
    pub tier: Option<PipelineTier>,
    pub articles_processed: u32,
    pub signals_created: u32,
    pub signals_corroborated: u32,
    pub predictors_created: u32,
    pub queued_for_review: u32,
    pub predictions_emitted: u32,
    pub evaluations_created: u32,
    pub aborted: bool,
}

#[derive(Debug, Default, Serialize)]
pub struct CleanupReport {
    pub deleted: HashMap<String, u64>,
    pub total: u64,
}

pub struct Sandbox {
    db: Database,
    catalog: CatalogStore,
    detector: Arc<SignalDetector>,
    aggregator: Arc<PredictorAggregator>,
    generator: Arc<PredictionGenerator>,
    evaluator: Arc<Evaluator>,
    events: Arc<dyn EventSink>,
}

impl Sandbox {
    pub fn new(
        db: Database,
        catalog: CatalogStore,
        detector: Arc<SignalDetector>,
        aggregator: Arc<PredictorAggregator>,
        generator: Arc<PredictionGenerator>,
        evaluator: Arc<Evaluator>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            db,
            catalog,
            detector,
            aggregator,
            generator,
            evaluator,
            events,
        }
    }

    pub async fn create(&self, org: &str, input: NewScenario) -> Result<TestScenario> {
        let name = input
            .name
            .filter(|n| !n.is_empty())
            .ok_or_else(|| PipelineError::invalid_data("scenario name is required"))?;
        let scenario = TestScenario {
            id: new_id(),
            organization_slug: org.to_string(),
            name,
            description: input.description,
            status: ScenarioStatus::Active,
            injection_points: input
                .injection_points
                .unwrap_or_else(|| InjectionTable::ALL.to_vec()),
            config: input.config.unwrap_or_default(),
            parent_scenario_id: None,
            variation: None,
            created_at: Utc::now(),
        };
        self.db.put(&scenario).await?;
        Ok(scenario)
    }

    pub async fn get(&self, org: &str, id: &str) -> Result<TestScenario> {
        if id.is_empty() {
            return Err(PipelineError::missing_id("scenario"));
        }
        self.db
            .get(org, id)
            .await?
            .ok_or_else(|| PipelineError::not_found("scenario", id))
    }

    pub async fn list(&self, org: &str) -> Result<Vec<TestScenario>> {
        self.db.list(org, &DocFilter::default()).await
    }

    /// Resolve an injected row's target, enforcing the `T_` convention.
    async fn resolve_test_target(&self, org: &str, row: &serde_json::Value) -> Result<Target> {
        let symbol = row
            .get("target_symbol")
            .and_then(|v| v.as_str())
            .ok_or_else(|| PipelineError::invalid_data("rows require target_symbol"))?;
        if !is_test_symbol(symbol) {
            return Err(PipelineError::validation_with(
                ErrorCode::InvalidSymbols,
                format!("test injections require T_-prefixed symbols, got '{}'", symbol),
                serde_json::json!({ "symbol": symbol }),
            ));
        }
        let found: Vec<Target> = self
            .db
            .list(org, &DocFilter::default().key(symbol).limit(1))
            .await?;
        found
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::not_found("target", symbol))
    }

    /// Inject raw rows into one table, scoped to the scenario.
    pub async fn inject(
        &self,
        org: &str,
        scenario_id: &str,
        table: InjectionTable,
        rows: Vec<serde_json::Value>,
    ) -> Result<u32> {
        let scenario = self.get(org, scenario_id).await?;
        if !scenario.injection_points.contains(&table) {
            return Err(PipelineError::validation_with(
                ErrorCode::InvalidType,
                format!(
                    "scenario '{}' does not declare {:?} as an injection point",
                    scenario.name, table
                ),
                serde_json::json!({ "allowed": scenario.injection_points }),
            ));
        }
        let mut injected = 0;
        for row in rows {
            let target = self.resolve_test_target(org, &row).await?;
            match table {
                InjectionTable::Articles => {
                    let article = Article {
                        id: new_id(),
                        organization_slug: org.to_string(),
                        source_id: row
                            .get("source_id")
                            .and_then(|v| v.as_str())
                            .unwrap_or("injected")
                            .to_string(),
                        target_id: target.id.clone(),
                        title: row
                            .get("title")
                            .and_then(|v| v.as_str())
                            .unwrap_or("Injected article")
                            .to_string(),
                        body: row
                            .get("body")
                            .and_then(|v| v.as_str())
                            .unwrap_or_default()
                            .to_string(),
                        url: None,
                        published_at: Utc::now(),
                        is_test: true,
                        scenario_id: Some(scenario.id.clone()),
                    };
                    self.db.put(&article).await?;
                }
                InjectionTable::PriceData => {
                    let price = row.get("price").and_then(|v| v.as_f64()).ok_or_else(|| {
                        PipelineError::invalid_data("price-data rows require a numeric price")
                    })?;
                    let point = PricePoint {
                        id: new_id(),
                        organization_slug: org.to_string(),
                        target_id: target.id.clone(),
                        price: Decimal::from_f64(price)
                            .ok_or_else(|| PipelineError::invalid_data("price is not finite"))?,
                        recorded_at: Utc::now(),
                        is_test: true,
                        scenario_id: Some(scenario.id.clone()),
                    };
                    self.db.put(&point).await?;
                }
                InjectionTable::Signals => {
                    let signal = signal_from_row(org, &scenario, &target, &row)?;
                    self.db.put(&signal).await?;
                }
                InjectionTable::Predictions => {
                    let prediction = prediction_from_row(org, &scenario, &target, &row)?;
                    self.db.put(&prediction).await?;
                }
            }
            injected += 1;
        }
        Ok(injected)
    }

    /// Generate synthetic rows from the scenario config.
    pub async fn generate(
        &self,
        org: &str,
        scenario_id: &str,
        kind: &str,
        config: serde_json::Value,
    ) -> Result<u32> {
        let scenario = self.get(org, scenario_id).await?;
        let count = config.get("count").and_then(|v| v.as_u64()).unwrap_or(3) as u32;
        let target = self.resolve_test_target(org, &config).await?;

        match kind {
            "articles" => {
                let direction = scenario.config.base_direction;
                for i in 0..count {
                    let article = Article {
                        id: new_id(),
                        organization_slug: org.to_string(),
                        source_id: "generated".to_string(),
                        target_id: target.id.clone(),
                        title: generated_headline(&target.symbol, direction, i),
                        body: generated_body(&target.symbol, direction),
                        url: None,
                        published_at: Utc::now()
                            + Duration::hours(scenario.config.timing_offset_hours),
                        is_test: true,
                        scenario_id: Some(scenario.id.clone()),
                    };
                    self.db.put(&article).await?;
                }
            }
            "price-data" => {
                let mut rng = rand::rng();
                let base = 100.0;
                let drift = scenario.config.base_magnitude / 100.0
                    * match scenario.config.base_direction {
                        Direction::Bullish => 1.0,
                        Direction::Bearish => -1.0,
                        Direction::Neutral => 0.0,
                    };
                for i in 0..count {
                    let progress = (i + 1) as f64 / count as f64;
                    let noise: f64 = rng.random_range(-0.002..0.002);
                    let price = base * (1.0 + drift * progress + noise);
                    let point = PricePoint {
                        id: new_id(),
                        organization_slug: org.to_string(),
                        target_id: target.id.clone(),
                        price: Decimal::from_f64(price)
                            .unwrap_or_else(|| Decimal::from(100)),
                        recorded_at: Utc::now()
                            + Duration::hours(scenario.config.timing_offset_hours)
                            + Duration::minutes(i as i64 * 5),
                        is_test: true,
                        scenario_id: Some(scenario.id.clone()),
                    };
                    self.db.put(&point).await?;
                }
            }
            other => {
                return Err(PipelineError::validation_with(
                    ErrorCode::InvalidType,
                    format!("unknown generation type '{}'", other),
                    serde_json::json!({ "allowed": ["articles", "price-data"] }),
                ))
            }
        }
        Ok(count)
    }

    /// Execute exactly one pipeline stage against this scenario's rows.
    pub async fn run_tier(
        &self,
        org: &str,
        scenario_id: &str,
        tier: PipelineTier,
        deadline: Option<DateTime<Utc>>,
    ) -> Result<TierRunReport> {
        let scenario = self.get(org, scenario_id).await?;
        let ctx = EventContext::for_org(org);
        self.events.emit(
            &ctx,
            PipelineEvent::Started {
                operation: "scenario_tier_run".to_string(),
            },
        );
        let mut report = TierRunReport {
            tier: Some(tier),
            ..TierRunReport::default()
        };
        let past_deadline =
            |report: &mut TierRunReport| -> bool {
                if let Some(d) = deadline {
                    if Utc::now() >= d {
                        report.aborted = true;
                        return true;
                    }
                }
                false
            };

        match tier {
            PipelineTier::SignalDetection => {
                let articles: Vec<Article> = self
                    .db
                    .list(org, &DocFilter::default().scenario(&scenario.id))
                    .await?;
                for article in articles {
                    if past_deadline(&mut report) {
                        break;
                    }
                    let target = self.catalog.get_target(org, &article.target_id).await?;
                    for detection in self.detector.detect(&article, &target).await? {
                        if detection.is_new() {
                            report.signals_created += 1;
                        } else {
                            report.signals_corroborated += 1;
                        }
                    }
                    report.articles_processed += 1;
                }
            }
            PipelineTier::PredictionGeneration => {
                let signals: Vec<Signal> = self
                    .db
                    .list(org, &DocFilter::default().scenario(&scenario.id))
                    .await?;
                let mut touched_targets: Vec<String> = Vec::new();
                for signal in &signals {
                    if past_deadline(&mut report) {
                        break;
                    }
                    let target = self.catalog.get_target(org, &signal.target_id).await?;
                    let universe = self.catalog.get_universe(org, &target.universe_id).await?;
                    let scored = self
                        .aggregator
                        .score_signal(org, signal, &target, &universe)
                        .await?;
                    report.predictors_created += scored.predictors.len() as u32;
                    report.queued_for_review += scored.queued_for_review;
                    if !touched_targets.contains(&target.id) {
                        touched_targets.push(target.id.clone());
                    }
                }
                for target_id in touched_targets {
                    if past_deadline(&mut report) {
                        break;
                    }
                    let target = self.catalog.get_target(org, &target_id).await?;
                    let universe = self.catalog.get_universe(org, &target.universe_id).await?;
                    if self
                        .generator
                        .try_emit(org, &target, &universe, Some(&scenario.id))
                        .await?
                        .is_some()
                    {
                        report.predictions_emitted += 1;
                    }
                }
            }
            PipelineTier::Evaluation => {
                let result = self.evaluator.evaluate_resolved(org, Some(&scenario.id)).await?;
                report.evaluations_created = result.evaluated;
            }
        }
        self.events.emit(
            &ctx,
            PipelineEvent::Completed {
                operation: "scenario_tier_run".to_string(),
                success: !report.aborted,
            },
        );
        Ok(report)
    }

    /// Delete every row the scenario owns, across all injection points.
    /// Idempotent: re-running deletes nothing and still succeeds.
    pub async fn cleanup(&self, org: &str, scenario_id: &str) -> Result<CleanupReport> {
        let scenario = self.get(org, scenario_id).await?;
        let owned_tables = [
            Table::Articles,
            Table::Signals,
            Table::Predictors,
            Table::Predictions,
            Table::Evaluations,
            Table::PriceData,
            Table::ReviewQueue,
            Table::LearningQueue,
        ];
        let mut report = CleanupReport::default();
        for table in owned_tables {
            let deleted = self
                .db
                .delete_where(table, org, &DocFilter::default().scenario(&scenario.id))
                .await?;
            report.total += deleted;
            report.deleted.insert(table.name().to_string(), deleted);
        }
        let mut scenario = scenario;
        scenario.status = ScenarioStatus::Archived;
        self.db.put(&scenario).await?;
        Ok(report)
    }

    /// Derive sibling scenarios, each perturbing one dimension of the
    /// source config. Every variation is independently cleanable.
    pub async fn generate_variations(
        &self,
        org: &str,
        source_scenario_id: &str,
        variation_types: Vec<VariationType>,
        variations_per_type: u32,
    ) -> Result<Vec<TestScenario>> {
        if variation_types.is_empty() {
            return Err(PipelineError::invalid_data("variationTypes is required"));
        }
        let source = self.get(org, source_scenario_id).await?;
        let mut rng = rand::rng();
        let mut created = Vec::new();
        for variation in variation_types {
            for i in 0..variations_per_type {
                let mut config = source.config.clone();
                match variation {
                    VariationType::Timing => {
                        config.timing_offset_hours += rng.random_range(-12..=12);
                    }
                    VariationType::Confidence => {
                        let delta: f64 = rng.random_range(-0.25..0.25);
                        config.base_confidence = (config.base_confidence + delta).clamp(0.05, 1.0);
                    }
                    VariationType::Magnitude => {
                        let factor: f64 = rng.random_range(0.5..2.0);
                        config.base_magnitude *= factor;
                    }
                    VariationType::Direction => {
                        config.base_direction = config.base_direction.inverted();
                    }
                }
                let scenario = TestScenario {
                    id: new_id(),
                    organization_slug: org.to_string(),
                    name: format!("{} [{:?} v{}]", source.name, variation, i + 1),
                    description: source.description.clone(),
                    status: ScenarioStatus::Draft,
                    injection_points: source.injection_points.clone(),
                    config,
                    parent_scenario_id: Some(source.id.clone()),
                    variation: Some(variation),
                    created_at: Utc::now(),
                };
                self.db.put(&scenario).await?;
                created.push(scenario);
            }
        }
        Ok(created)
    }
}

fn signal_from_row(
    org: &str,
    scenario: &TestScenario,
    target: &Target,
    row: &serde_json::Value,
) -> Result<Signal> {
    use crate::detector::Fingerprint;
    let content = row
        .get("content")
        .and_then(|v| v.as_str())
        .unwrap_or("injected signal")
        .to_string();
    let direction = match row.get("direction").and_then(|v| v.as_str()) {
        Some("bearish") => Direction::Bearish,
        Some("neutral") => Direction::Neutral,
        _ => Direction::Bullish,
    };
    let confidence = row
        .get("confidence")
        .and_then(|v| v.as_f64())
        .unwrap_or(scenario.config.base_confidence)
        .clamp(0.0, 1.0);
    Ok(Signal {
        id: new_id(),
        organization_slug: org.to_string(),
        target_id: target.id.clone(),
        source_id: "injected".to_string(),
        fingerprint: Fingerprint::compute(&content, &[]),
        content,
        direction,
        urgency: Urgency::Medium,
        confidence,
        detected_at: Utc::now(),
        corroboration_count: 0,
        corroborating_source_ids: Vec::new(),
        article_id: None,
        is_test: true,
        scenario_id: Some(scenario.id.clone()),
    })
}

fn prediction_from_row(
    org: &str,
    scenario: &TestScenario,
    target: &Target,
    row: &serde_json::Value,
) -> Result<Prediction> {
    let direction = match row.get("direction").and_then(|v| v.as_str()) {
        Some("bearish") => Direction::Bearish,
        Some("neutral") => Direction::Neutral,
        _ => Direction::Bullish,
    };
    let now = Utc::now();
    Ok(Prediction {
        id: new_id(),
        organization_slug: org.to_string(),
        universe_id: target.universe_id.clone(),
        target_id: target.id.clone(),
        direction,
        magnitude: row
            .get("magnitude")
            .and_then(|v| v.as_f64())
            .unwrap_or(scenario.config.base_magnitude),
        confidence: scenario.config.base_confidence,
        combined_strength: scenario.config.base_confidence,
        timeframe_hours: 24,
        status: PredictionStatus::Active,
        predicted_at: now,
        expires_at: now + Duration::hours(24),
        resolved_at: None,
        outcome_value: None,
        reasoning: "injected prediction".to_string(),
        predictor_ids: Vec::new(),
        is_test: true,
        scenario_id: Some(scenario.id.clone()),
    })
}

fn generated_headline(symbol: &str, direction: Direction, i: u32) -> String {
    match direction {
        Direction::Bullish => format!("{} shares surge on record growth ({})", symbol, i + 1),
        Direction::Bearish => format!("{} shares plunge after earnings miss ({})", symbol, i + 1),
        Direction::Neutral => format!("{} trades sideways in quiet session ({})", symbol, i + 1),
    }
}

fn generated_body(symbol: &str, direction: Direction) -> String {
    match direction {
        Direction::Bullish => format!(
            "{} posted strong results, beating estimates. Analysts upgrade the stock as growth expands.",
            symbol
        ),
        Direction::Bearish => format!(
            "{} warned of weak demand and announced layoffs. A downgrade followed the decline.",
            symbol
        ),
        Direction::Neutral => format!("{} reported results in line with expectations.", symbol),
    }
}
