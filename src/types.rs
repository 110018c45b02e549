//! Shared vocabulary for the prediction pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Directional stance of a signal, predictor or prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Bullish,
    Bearish,
    Neutral,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Bullish => "bullish",
            Direction::Bearish => "bearish",
            Direction::Neutral => "neutral",
        }
    }

    /// Flip bullish/bearish; neutral stays neutral.
    pub fn inverted(&self) -> Direction {
        match self {
            Direction::Bullish => Direction::Bearish,
            Direction::Bearish => Direction::Bullish,
            Direction::Neutral => Direction::Neutral,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

/// Visibility scope for sources, analysts and learnings.
///
/// A target inherits everything scoped above it: runner-wide, then
/// domain, then universe, then its own target-scoped records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeLevel {
    Runner,
    Domain,
    Universe,
    Target,
}

impl ScopeLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeLevel::Runner => "runner",
            ScopeLevel::Domain => "domain",
            ScopeLevel::Universe => "universe",
            ScopeLevel::Target => "target",
        }
    }
}

/// LLM quality tier. Each universe maps tiers to a provider/model pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Gold,
    Silver,
    Bronze,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionStatus {
    Active,
    Resolved,
    Expired,
}

impl PredictionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredictionStatus::Active => "active",
            PredictionStatus::Resolved => "resolved",
            PredictionStatus::Expired => "expired",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioStatus {
    Draft,
    Active,
    Archived,
}

/// Tables a test scenario may inject rows into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InjectionTable {
    Signals,
    Predictions,
    Articles,
    PriceData,
}

impl InjectionTable {
    pub const ALL: [InjectionTable; 4] = [
        InjectionTable::Signals,
        InjectionTable::Predictions,
        InjectionTable::Articles,
        InjectionTable::PriceData,
    ];
}

/// One isolated pipeline stage runnable against a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineTier {
    SignalDetection,
    PredictionGeneration,
    Evaluation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariationType {
    Timing,
    Confidence,
    Magnitude,
    Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Resolved => "resolved",
        }
    }
}

/// Tenant identity carried by every request and persisted on every row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrgScope {
    pub organization_slug: String,
    pub agent_slug: String,
}

impl OrgScope {
    pub fn new(organization_slug: impl Into<String>, agent_slug: impl Into<String>) -> Self {
        Self {
            organization_slug: organization_slug.into(),
            agent_slug: agent_slug.into(),
        }
    }
}

/// Pagination request. Pages are 1-based.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PageRequest {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    50
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 50,
        }
    }
}

impl PageRequest {
    pub fn offset(&self) -> u32 {
        self.page.saturating_sub(1) * self.page_size
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageMetadata {
    pub page: u32,
    pub page_size: u32,
    pub total_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub metadata: PageMetadata,
}

impl<T> Paginated<T> {
    pub fn new(data: Vec<T>, request: PageRequest, total_count: u64) -> Self {
        Self {
            data,
            metadata: PageMetadata {
                page: request.page,
                page_size: request.page_size,
                total_count,
            },
        }
    }
}

/// Fresh entity id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Prefix that marks a target symbol as a test mirror.
pub const TEST_SYMBOL_PREFIX: &str = "T_";

/// Whether a symbol names a test mirror. The persisted `is_test` flag is
/// set from this exactly once, at write time.
pub fn is_test_symbol(symbol: &str) -> bool {
    symbol.starts_with(TEST_SYMBOL_PREFIX)
}

/// Allowed crawl cadences in minutes.
pub const CRAWL_FREQUENCIES: [u32; 5] = [5, 10, 15, 30, 60];

/// A piece of content handed from the crawler to the signal detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub organization_slug: String,
    pub source_id: String,
    pub target_id: String,
    pub title: String,
    pub body: String,
    pub url: Option<String>,
    pub published_at: DateTime<Utc>,
    pub is_test: bool,
    #[serde(default)]
    pub scenario_id: Option<String>,
}

impl crate::storage::Doc for Article {
    const TABLE: crate::storage::Table = crate::storage::Table::Articles;

    fn id(&self) -> &str {
        &self.id
    }
    fn org(&self) -> &str {
        &self.organization_slug
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.published_at
    }
    fn target_id(&self) -> Option<&str> {
        Some(&self.target_id)
    }
    fn scenario_id(&self) -> Option<&str> {
        self.scenario_id.as_deref()
    }
    fn doc_key(&self) -> Option<&str> {
        Some(&self.source_id)
    }
    fn is_test(&self) -> bool {
        self.is_test
    }
}
