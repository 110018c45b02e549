//! Command surface
//!
//! Every operation is addressed as `entity.action` and parsed into a
//! closed [`ApiCall`] before any handler runs; an unknown pair fails with
//! `UNSUPPORTED_ACTION` and the supported action list, so the surface
//! cannot grow by accident. Handlers return `Result`; the dispatcher folds
//! every error, including infrastructure failures, into one response
//! envelope.


use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::catalog::{
    AnalystUpdate, NewAnalyst, NewSource, NewTarget, NewUniverse, SourceUpdate, TargetUpdate,
    UniverseUpdate,
};
use crate::error::{ErrorCode, PipelineError, Result};
use crate::learning::LearningResponse;
use crate::pipeline::Pipeline;
use crate::predictions::Prediction;
use crate::review::ReviewResponse;
use crate::sandbox::NewScenario;
use crate::storage::DocFilter;
use crate::types::{AlertStatus, OrgScope, PageRequest, Paginated, PipelineTier, VariationType};

#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Uniform response envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl ApiResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(e: &PipelineError) -> Self {
        let message = match e {
            PipelineError::Validation { message, .. } => message.clone(),
            // Infrastructure detail stays in the logs, not the response.
            other => {
                tracing::error!("handler failed: {}", other);
                "internal error".to_string()
            }
        };
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: e.code().as_str(),
                message,
                details: e.details(),
            }),
        }
    }
}

/// The closed set of operations this surface exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiCall {
    UniverseCreate,
    UniverseGet,
    UniverseList,
    UniverseUpdate,
    UniverseDelete,
    UniverseRecommendStrategy,
    TargetCreate,
    TargetGet,
    TargetList,
    TargetUpdate,
    TargetDelete,
    SourceCreate,
    SourceGet,
    SourceList,
    SourceUpdate,
    SourceDelete,
    AnalystCreate,
    AnalystGet,
    AnalystList,
    AnalystUpdate,
    AnalystDelete,
    StrategyList,
    PredictionGet,
    PredictionList,
    PredictionResolve,
    PredictionDeepDive,
    ReviewList,
    ReviewRespond,
    LearningQueueList,
    LearningRespond,
    LearningList,
    LearningGet,
    LearningRecordApplication,
    PromotionValidate,
    PromotionBacktest,
    PromotionPromote,
    PromotionReject,
    PromotionHistory,
    ScenarioCreate,
    ScenarioGet,
    ScenarioList,
    ScenarioInject,
    ScenarioGenerate,
    ScenarioRunTier,
    ScenarioCleanup,
    ScenarioGenerateVariations,
    AlertList,
    AlertAcknowledge,
    AlertResolve,
    MonitorRun,
    MonitorMissedOpportunities,
    PipelineRunCycle,
    PipelineCrawl,
}

const UNIVERSE_ACTIONS: &[&str] = &[
    "create",
    "get",
    "list",
    "update",
    "delete",
    "recommend-strategy",
];
const TARGET_ACTIONS: &[&str] = &["create", "get", "list", "update", "delete"];
const SOURCE_ACTIONS: &[&str] = &["create", "get", "list", "update", "delete"];
const ANALYST_ACTIONS: &[&str] = &["create", "get", "list", "update", "delete"];
const STRATEGY_ACTIONS: &[&str] = &["list"];
const PREDICTION_ACTIONS: &[&str] = &["get", "list", "resolve", "deep-dive"];
const REVIEW_ACTIONS: &[&str] = &["list", "respond"];
const LEARNING_ACTIONS: &[&str] = &["queue", "respond", "list", "get", "record-application"];
const PROMOTION_ACTIONS: &[&str] = &["validate", "backtest", "promote", "reject", "history"];
const SCENARIO_ACTIONS: &[&str] = &[
    "create",
    "get",
    "list",
    "inject",
    "generate",
    "run-tier",
    "cleanup",
    "generate-variations",
];
const ALERT_ACTIONS: &[&str] = &["list", "acknowledge", "resolve"];
const MONITOR_ACTIONS: &[&str] = &["run", "missed-opportunities"];
const PIPELINE_ACTIONS: &[&str] = &["run-cycle", "crawl"];

fn unsupported(method: &str, supported: &[&str]) -> PipelineError {
    PipelineError::validation_with(
        ErrorCode::UnsupportedAction,
        format!("unsupported action '{}'", method),
        json!({ "supported": supported }),
    )
}

impl ApiCall {
    pub fn parse(method: &str) -> Result<Self> {
        let Some((entity, action)) = method.split_once('.') else {
            return Err(unsupported(
                method,
                &[
                    "universe", "target", "source", "analyst", "strategy", "prediction", "review",
                    "learning", "promotion", "scenario", "alert", "monitor", "pipeline",
                ],
            ));
        };
        let call = match entity {
            "universe" => match action {
                "create" => ApiCall::UniverseCreate,
                "get" => ApiCall::UniverseGet,
                "list" => ApiCall::UniverseList,
                "update" => ApiCall::UniverseUpdate,
                "delete" => ApiCall::UniverseDelete,
                "recommend-strategy" => ApiCall::UniverseRecommendStrategy,
                _ => return Err(unsupported(method, UNIVERSE_ACTIONS)),
            },
            "target" => match action {
                "create" => ApiCall::TargetCreate,
                "get" => ApiCall::TargetGet,
                "list" => ApiCall::TargetList,
                "update" => ApiCall::TargetUpdate,
                "delete" => ApiCall::TargetDelete,
                _ => return Err(unsupported(method, TARGET_ACTIONS)),
            },
            "source" => match action {
                "create" => ApiCall::SourceCreate,
                "get" => ApiCall::SourceGet,
                "list" => ApiCall::SourceList,
                "update" => ApiCall::SourceUpdate,
                "delete" => ApiCall::SourceDelete,
                _ => return Err(unsupported(method, SOURCE_ACTIONS)),
            },
            "analyst" => match action {
                "create" => ApiCall::AnalystCreate,
                "get" => ApiCall::AnalystGet,
                "list" => ApiCall::AnalystList,
                "update" => ApiCall::AnalystUpdate,
                "delete" => ApiCall::AnalystDelete,
                _ => return Err(unsupported(method, ANALYST_ACTIONS)),
            },
            "strategy" => match action {
                "list" => ApiCall::StrategyList,
                _ => return Err(unsupported(method, STRATEGY_ACTIONS)),
            },
            "prediction" => match action {
                "get" => ApiCall::PredictionGet,
                "list" => ApiCall::PredictionList,
                "resolve" => ApiCall::PredictionResolve,
                "deep-dive" => ApiCall::PredictionDeepDive,
                _ => return Err(unsupported(method, PREDICTION_ACTIONS)),
            },
            "review" => match action {
                "list" => ApiCall::ReviewList,
                "respond" => ApiCall::ReviewRespond,
                _ => return Err(unsupported(method, REVIEW_ACTIONS)),
            },
            "learning" => match action {
                "queue" => ApiCall::LearningQueueList,
                "respond" => ApiCall::LearningRespond,
                "list" => ApiCall::LearningList,
                "get" => ApiCall::LearningGet,
                "record-application" => ApiCall::LearningRecordApplication,
                _ => return Err(unsupported(method, LEARNING_ACTIONS)),
            },
            "promotion" => match action {
                "validate" => ApiCall::PromotionValidate,
                "backtest" => ApiCall::PromotionBacktest,
                "promote" => ApiCall::PromotionPromote,
                "reject" => ApiCall::PromotionReject,
                "history" => ApiCall::PromotionHistory,
                _ => return Err(unsupported(method, PROMOTION_ACTIONS)),
            },
            "scenario" => match action {
                "create" => ApiCall::ScenarioCreate,
                "get" => ApiCall::ScenarioGet,
                "list" => ApiCall::ScenarioList,
                "inject" => ApiCall::ScenarioInject,
                "generate" => ApiCall::ScenarioGenerate,
                "run-tier" => ApiCall::ScenarioRunTier,
                "cleanup" => ApiCall::ScenarioCleanup,
                "generate-variations" => ApiCall::ScenarioGenerateVariations,
                _ => return Err(unsupported(method, SCENARIO_ACTIONS)),
            },
            "alert" => match action {
                "list" => ApiCall::AlertList,
                "acknowledge" => ApiCall::AlertAcknowledge,
                "resolve" => ApiCall::AlertResolve,
                _ => return Err(unsupported(method, ALERT_ACTIONS)),
            },
            "monitor" => match action {
                "run" => ApiCall::MonitorRun,
                "missed-opportunities" => ApiCall::MonitorMissedOpportunities,
                _ => return Err(unsupported(method, MONITOR_ACTIONS)),
            },
            "pipeline" => match action {
                "run-cycle" => ApiCall::PipelineRunCycle,
                "crawl" => ApiCall::PipelineCrawl,
                _ => return Err(unsupported(method, PIPELINE_ACTIONS)),
            },
            _ => return Err(unsupported(method, &[])),
        };
        Ok(call)
    }
}

fn decode<T: DeserializeOwned>(payload: &Value) -> Result<T> {
    serde_json::from_value(payload.clone())
        .map_err(|e| PipelineError::invalid_data(format!("invalid payload: {}", e)))
}

fn str_field(payload: &Value, key: &str) -> Option<String> {
    payload
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

fn require_id(payload: &Value, key: &str, what: &str) -> Result<String> {
    str_field(payload, key).ok_or_else(|| PipelineError::missing_id(what))
}

fn page(payload: &Value) -> PageRequest {
    decode(payload).unwrap_or_default()
}

fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

pub struct Api {
    pipeline: Arc<Pipeline>,
}

impl Api {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }

    /// Parse, dispatch, and fold the result into the response envelope.
    pub async fn handle(&self, scope: &OrgScope, method: &str, payload: Value) -> ApiResponse {
        let call = match ApiCall::parse(method) {
            Ok(call) => call,
            Err(e) => return ApiResponse::err(&e),
        };
        match self.dispatch(scope, call, &payload).await {
            Ok(data) => ApiResponse::ok(data),
            Err(e) => ApiResponse::err(&e),
        }
    }

    async fn dispatch(&self, scope: &OrgScope, call: ApiCall, payload: &Value) -> Result<Value> {
        let org = scope.organization_slug.as_str();
        let p = &self.pipeline;
        match call {
            ApiCall::UniverseCreate => {
                to_value(&p.catalog().create_universe(scope, decode(payload)?).await?)
            }
            ApiCall::UniverseGet => {
                let id = require_id(payload, "id", "universe")?;
                to_value(&p.catalog().get_universe(org, &id).await?)
            }
            ApiCall::UniverseList => {
                to_value(&p.catalog().list_universes(org, page(payload)).await?)
            }
            ApiCall::UniverseUpdate => {
                let id = require_id(payload, "id", "universe")?;
                let update: UniverseUpdate = decode(payload)?;
                to_value(&p.catalog().update_universe(org, &id, update).await?)
            }
            ApiCall::UniverseDelete => {
                let id = require_id(payload, "id", "universe")?;
                p.catalog().delete_universe(org, &id).await?;
                Ok(json!({ "deleted": id }))
            }
            ApiCall::UniverseRecommendStrategy => {
                let id = require_id(payload, "universe_id", "universe")?;
                let universe = p.catalog().get_universe(org, &id).await?;
                to_value(
                    &crate::analysts::recommend_strategy(p.catalog(), org, &universe).await?,
                )
            }

            ApiCall::TargetCreate => {
                let input: NewTarget = decode(payload)?;
                to_value(&p.catalog().create_target(org, input).await?)
            }
            ApiCall::TargetGet => {
                let id = require_id(payload, "id", "target")?;
                to_value(&p.catalog().get_target(org, &id).await?)
            }
            ApiCall::TargetList => {
                let universe_id = str_field(payload, "universe_id");
                // Filtering is opt-in: an unfiltered list shows
                // deactivated targets too.
                let active_only = payload
                    .get("active_only")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                to_value(
                    &p.catalog()
                        .list_targets(org, universe_id.as_deref(), active_only, page(payload))
                        .await?,
                )
            }
            ApiCall::TargetUpdate => {
                let id = require_id(payload, "id", "target")?;
                let update: TargetUpdate = decode(payload)?;
                to_value(&p.catalog().update_target(org, &id, update).await?)
            }
            ApiCall::TargetDelete => {
                let id = require_id(payload, "id", "target")?;
                p.catalog().delete_target(org, &id).await?;
                Ok(json!({ "deleted": id }))
            }

            ApiCall::SourceCreate => {
                let input: NewSource = decode(payload)?;
                to_value(&p.catalog().create_source(org, input).await?)
            }
            ApiCall::SourceGet => {
                let id = require_id(payload, "id", "source")?;
                to_value(&p.catalog().get_source(org, &id).await?)
            }
            ApiCall::SourceList => to_value(&p.catalog().list_sources(org, page(payload)).await?),
            ApiCall::SourceUpdate => {
                let id = require_id(payload, "id", "source")?;
                let update: SourceUpdate = decode(payload)?;
                to_value(&p.catalog().update_source(org, &id, update).await?)
            }
            ApiCall::SourceDelete => {
                let id = require_id(payload, "id", "source")?;
                p.catalog().delete_source(org, &id).await?;
                Ok(json!({ "deleted": id }))
            }

            ApiCall::AnalystCreate => {
                let input: NewAnalyst = decode(payload)?;
                to_value(&p.catalog().create_analyst(org, input).await?)
            }
            ApiCall::AnalystGet => {
                let id = require_id(payload, "id", "analyst")?;
                to_value(&p.catalog().get_analyst(org, &id).await?)
            }
            ApiCall::AnalystList => to_value(&p.catalog().list_analysts(org, page(payload)).await?),
            ApiCall::AnalystUpdate => {
                let id = require_id(payload, "id", "analyst")?;
                let update: AnalystUpdate = decode(payload)?;
                to_value(&p.catalog().update_analyst(org, &id, update).await?)
            }
            ApiCall::AnalystDelete => {
                let id = require_id(payload, "id", "analyst")?;
                p.catalog().delete_analyst(org, &id).await?;
                Ok(json!({ "deleted": id }))
            }

            ApiCall::StrategyList => to_value(&p.catalog().list_strategies(org).await?),

            ApiCall::PredictionGet => {
                let id = require_id(payload, "id", "prediction")?;
                to_value(&p.generator().get(org, &id).await?)
            }
            ApiCall::PredictionList => {
                let mut filter = DocFilter::default();
                if let Some(status) = str_field(payload, "status") {
                    filter = filter.status(status);
                }
                if let Some(target_id) = str_field(payload, "target_id") {
                    filter = filter.target(target_id);
                }
                let page = page(payload);
                let total = p.db().count::<Prediction>(org, &filter).await?;
                let data: Vec<Prediction> = p
                    .db()
                    .list(
                        org,
                        &filter.clone().limit(page.page_size).offset(page.offset()),
                    )
                    .await?;
                to_value(&Paginated::new(data, page, total))
            }
            ApiCall::PredictionResolve => {
                let id = require_id(payload, "id", "prediction")?;
                let outcome = payload
                    .get("outcome_value")
                    .and_then(|v| v.as_f64())
                    .ok_or_else(|| {
                        PipelineError::invalid_data("outcome_value is required")
                    })?;
                to_value(&p.generator().resolve(org, &id, outcome).await?)
            }
            ApiCall::PredictionDeepDive => {
                let id = str_field(payload, "id").unwrap_or_default();
                to_value(&p.generator().deep_dive(org, &id).await?)
            }

            ApiCall::ReviewList => to_value(&p.review().list_pending(org, page(payload)).await?),
            ApiCall::ReviewRespond => {
                let id = str_field(payload, "review_id").unwrap_or_default();
                let response: ReviewResponse = decode(payload)?;
                to_value(&p.review().respond(org, &id, response).await?)
            }

            ApiCall::LearningQueueList => {
                to_value(&p.learning().list_pending(org, page(payload)).await?)
            }
            ApiCall::LearningRespond => {
                let id = str_field(payload, "queue_id").unwrap_or_default();
                let response: LearningResponse = decode(payload)?;
                to_value(&p.learning().respond(org, &id, response).await?)
            }
            ApiCall::LearningList => {
                let include_test = payload
                    .get("include_test")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                to_value(
                    &p.learning()
                        .list_learnings(org, include_test, page(payload))
                        .await?,
                )
            }
            ApiCall::LearningGet => {
                let id = require_id(payload, "id", "learning")?;
                to_value(&p.learning().get_learning(org, &id).await?)
            }
            ApiCall::LearningRecordApplication => {
                let id = require_id(payload, "id", "learning")?;
                let helpful = payload
                    .get("helpful")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                to_value(&p.learning().record_application(org, &id, helpful).await?)
            }

            ApiCall::PromotionValidate => {
                let id = str_field(payload, "learning_id").unwrap_or_default();
                to_value(&p.promotion().validate(org, &id).await?)
            }
            ApiCall::PromotionBacktest => {
                let id = str_field(payload, "learning_id").unwrap_or_default();
                let window_days = payload
                    .get("window_days")
                    .and_then(|v| v.as_u64())
                    .map(|d| d as u32)
                    .unwrap_or(p.config().promotion.default_backtest_window_days);
                let deadline = payload
                    .get("deadline")
                    .cloned()
                    .map(|v| decode(&v))
                    .transpose()?;
                to_value(
                    &p.promotion()
                        .run_backtest(org, &id, window_days, deadline)
                        .await?,
                )
            }
            ApiCall::PromotionPromote => {
                let id = str_field(payload, "learning_id").unwrap_or_default();
                let promoted_by = str_field(payload, "promoted_by").unwrap_or_default();
                to_value(&p.promotion().promote(org, &id, &promoted_by).await?)
            }
            ApiCall::PromotionReject => {
                let id = str_field(payload, "learning_id").unwrap_or_default();
                let reason = str_field(payload, "reason");
                to_value(&p.promotion().reject(org, &id, reason.as_deref()).await?)
            }
            ApiCall::PromotionHistory => {
                let id = require_id(payload, "learning_id", "learning")?;
                to_value(&p.promotion().history_for(org, &id).await?)
            }

            ApiCall::ScenarioCreate => {
                let input: NewScenario = decode(payload)?;
                to_value(&p.sandbox().create(org, input).await?)
            }
            ApiCall::ScenarioGet => {
                let id = require_id(payload, "id", "scenario")?;
                to_value(&p.sandbox().get(org, &id).await?)
            }
            ApiCall::ScenarioList => to_value(&p.sandbox().list(org).await?),
            ApiCall::ScenarioInject => {
                let id = str_field(payload, "scenario_id").unwrap_or_default();
                let table = parse_injection_table(payload)?;
                let rows = payload
                    .get("rows")
                    .and_then(|v| v.as_array())
                    .cloned()
                    .unwrap_or_default();
                let injected = p.sandbox().inject(org, &id, table, rows).await?;
                Ok(json!({ "injected": injected }))
            }
            ApiCall::ScenarioGenerate => {
                let id = str_field(payload, "scenario_id").unwrap_or_default();
                let kind = str_field(payload, "data_type").unwrap_or_default();
                let config = payload.get("config").cloned().unwrap_or(json!({}));
                let generated = p.sandbox().generate(org, &id, &kind, config).await?;
                Ok(json!({ "generated": generated }))
            }
            ApiCall::ScenarioRunTier => {
                let id = str_field(payload, "scenario_id").unwrap_or_default();
                let tier = parse_tier(payload)?;
                let deadline = payload
                    .get("deadline")
                    .cloned()
                    .map(|v| decode(&v))
                    .transpose()?;
                to_value(&p.sandbox().run_tier(org, &id, tier, deadline).await?)
            }
            ApiCall::ScenarioCleanup => {
                let id = str_field(payload, "scenario_id").unwrap_or_default();
                to_value(&p.sandbox().cleanup(org, &id).await?)
            }
            ApiCall::ScenarioGenerateVariations => {
                let id = str_field(payload, "scenario_id").unwrap_or_default();
                let types: Vec<VariationType> = payload
                    .get("variation_types")
                    .cloned()
                    .map(|v| decode(&v))
                    .transpose()?
                    .unwrap_or_default();
                let per_type = payload
                    .get("variations_per_type")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(1) as u32;
                to_value(
                    &p.sandbox()
                        .generate_variations(org, &id, types, per_type)
                        .await?,
                )
            }

            ApiCall::AlertList => {
                let status: Option<AlertStatus> = payload
                    .get("status")
                    .cloned()
                    .map(|v| decode(&v))
                    .transpose()?;
                to_value(&p.monitor().list_alerts(org, status).await?)
            }
            ApiCall::AlertAcknowledge => {
                let id = str_field(payload, "id").unwrap_or_default();
                to_value(&p.monitor().acknowledge(org, &id).await?)
            }
            ApiCall::AlertResolve => {
                let id = str_field(payload, "id").unwrap_or_default();
                to_value(&p.monitor().resolve(org, &id).await?)
            }
            ApiCall::MonitorRun => to_value(&p.monitor().run(org).await?),
            ApiCall::MonitorMissedOpportunities => {
                to_value(&p.monitor().missed_opportunities(org).await?)
            }

            ApiCall::PipelineRunCycle => to_value(&p.run_cycle(org).await?),
            ApiCall::PipelineCrawl => to_value(&p.scheduler().tick(org).await?),
        }
    }
}

fn parse_injection_table(payload: &Value) -> Result<crate::types::InjectionTable> {
    let table = payload.get("table").cloned().unwrap_or(Value::Null);
    serde_json::from_value(table).map_err(|_| {
        PipelineError::validation_with(
            ErrorCode::InvalidType,
            "unknown injection table",
            json!({ "allowed": ["articles", "price-data", "signals", "predictions"] }),
        )
    })
}

fn parse_tier(payload: &Value) -> Result<PipelineTier> {
    let tier = payload.get("tier").cloned().unwrap_or(Value::Null);
    serde_json::from_value(tier).map_err(|_| {
        PipelineError::validation_with(
            ErrorCode::InvalidTier,
            "unknown pipeline tier",
            json!({ "allowed": ["signal-detection", "prediction-generation", "evaluation"] }),
        )
    })
}

/// Small helper for tests and the CLI.
#[derive(Debug, Deserialize)]
pub struct RawCommand {
    pub method: String,
    #[serde(default)]
    pub payload: Value,
}
