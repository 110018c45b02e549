//! Catalog store
//!
//! CRUD for the configuration entities: universes, targets, sources,
//! analysts and strategies. All writes are validated here; the `is_test`
//! flag on targets is derived from the `T_` symbol prefix exactly once, at
//! write time, and persisted.


mod seed;

pub use seed::{seed_system_analysts, seed_system_strategies};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::TierModel;
use crate::error::{ErrorCode, PipelineError, Result};
use crate::storage::{Database, Doc, DocFilter, Table};
use crate::types::{
    is_test_symbol, new_id, OrgScope, PageRequest, Paginated, ScopeLevel, Tier,
    CRAWL_FREQUENCIES,
};

/// Emission gate for a universe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Thresholds {
    pub min_predictors: u32,
    pub min_combined_strength: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_predictors: 3,
            min_combined_strength: 0.6,
        }
    }
}

/// Per-universe tier table. Missing tiers fall back to the global config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UniverseLlmConfig {
    pub gold: Option<TierModel>,
    pub silver: Option<TierModel>,
    pub bronze: Option<TierModel>,
}

impl UniverseLlmConfig {
    pub fn tier_model(&self, tier: Tier) -> Option<&TierModel> {
        match tier {
            Tier::Gold => self.gold.as_ref(),
            Tier::Silver => self.silver.as_ref(),
            Tier::Bronze => self.bronze.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub notify_predictions: bool,
    #[serde(default)]
    pub notify_alerts: bool,
    #[serde(default)]
    pub channel: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Universe {
    pub id: String,
    pub organization_slug: String,
    pub agent_slug: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub llm_config: UniverseLlmConfig,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub notification_config: NotificationConfig,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Doc for Universe {
    const TABLE: Table = Table::Universes;

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
        Some(if self.is_active { "active" } else { "inactive" })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetMetadata {
    /// Real symbol a `T_` test mirror shadows.
    #[serde(default)]
    pub mirrors: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub id: String,
    pub organization_slug: String,
    pub universe_id: String,
    pub symbol: String,
    pub target_type: String,
    #[serde(default)]
    pub context: Option<String>,
    pub is_active: bool,
    /// Derived from the symbol prefix at write time, never recomputed on
    /// the read path.
    pub is_test: bool,
    #[serde(default)]
    pub metadata: TargetMetadata,
    pub created_at: DateTime<Utc>,
}

impl Doc for Target {
    const TABLE: Table = Table::Targets;

    fn id(&self) -> &str {
        &self.id
    }
    fn org(&self) -> &str {
        &self.organization_slug
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
    fn universe_id(&self) -> Option<&str> {
        Some(&self.universe_id)
    }
    fn doc_key(&self) -> Option<&str> {
        Some(&self.symbol)
    }
    fn status(&self) -> Option<&str> {
        Some(if self.is_active { "active" } else { "inactive" })
    }
    fn is_test(&self) -> bool {
        self.is_test
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub organization_slug: String,
    pub scope_level: ScopeLevel,
    #[serde(default)]
    pub universe_id: Option<String>,
    #[serde(default)]
    pub target_id: Option<String>,
    pub source_type: String,
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    pub crawl_frequency_minutes: u32,
    #[serde(default)]
    pub crawl_config: serde_json::Value,
    pub is_active: bool,
    #[serde(default)]
    pub last_crawled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Doc for Source {
    const TABLE: Table = Table::Sources;

    fn id(&self) -> &str {
        &self.id
    }
    fn org(&self) -> &str {
        &self.organization_slug
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
    fn universe_id(&self) -> Option<&str> {
        self.universe_id.as_deref()
    }
    fn target_id(&self) -> Option<&str> {
        self.target_id.as_deref()
    }
    fn status(&self) -> Option<&str> {
        Some(if self.is_active { "active" } else { "inactive" })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TierInstructions {
    #[serde(default)]
    pub gold: String,
    #[serde(default)]
    pub silver: String,
    #[serde(default)]
    pub bronze: String,
}

impl TierInstructions {
    pub fn for_tier(&self, tier: Tier) -> &str {
        match tier {
            Tier::Gold => &self.gold,
            Tier::Silver => &self.silver,
            Tier::Bronze => &self.bronze,
        }
    }
}

/// A scoring persona. Slug is unique per organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analyst {
    pub id: String,
    pub organization_slug: String,
    pub slug: String,
    pub name: String,
    pub scope_level: ScopeLevel,
    #[serde(default)]
    pub universe_id: Option<String>,
    #[serde(default)]
    pub target_id: Option<String>,
    pub perspective: String,
    #[serde(default)]
    pub tier_instructions: TierInstructions,
    pub default_weight: f64,
    pub is_enabled: bool,
    #[serde(default)]
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
}

impl Doc for Analyst {
    const TABLE: Table = Table::Analysts;

    fn id(&self) -> &str {
        &self.id
    }
    fn org(&self) -> &str {
        &self.organization_slug
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
    fn universe_id(&self) -> Option<&str> {
        self.universe_id.as_deref()
    }
    fn target_id(&self) -> Option<&str> {
        self.target_id.as_deref()
    }
    fn doc_key(&self) -> Option<&str> {
        Some(&self.slug)
    }
    fn status(&self) -> Option<&str> {
        Some(if self.is_enabled { "active" } else { "inactive" })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Conservative,
    Balanced,
    Aggressive,
}

/// Named threshold+weight bundle recommendable per universe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Strategy {
    pub id: String,
    pub organization_slug: String,
    pub slug: String,
    pub name: String,
    pub thresholds: Thresholds,
    /// analyst slug → weight override
    #[serde(default)]
    pub analyst_weights: HashMap<String, f64>,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
}

impl Doc for Strategy {
    const TABLE: Table = Table::Strategies;

    fn id(&self) -> &str {
        &self.id
    }
    fn org(&self) -> &str {
        &self.organization_slug
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
    fn doc_key(&self) -> Option<&str> {
        Some(&self.slug)
    }
}

// ---------------------------------------------------------------------------
// Input payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewUniverse {
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub llm_config: Option<UniverseLlmConfig>,
    #[serde(default)]
    pub thresholds: Option<Thresholds>,
    #[serde(default)]
    pub notification_config: Option<NotificationConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UniverseUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub llm_config: Option<UniverseLlmConfig>,
    #[serde(default)]
    pub thresholds: Option<Thresholds>,
    #[serde(default)]
    pub notification_config: Option<NotificationConfig>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTarget {
    pub universe_id: Option<String>,
    pub symbol: Option<String>,
    pub target_type: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub metadata: Option<TargetMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TargetUpdate {
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub metadata: Option<TargetMetadata>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewSource {
    pub scope_level: Option<ScopeLevel>,
    pub source_type: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    pub crawl_frequency_minutes: Option<u32>,
    #[serde(default)]
    pub universe_id: Option<String>,
    #[serde(default)]
    pub target_id: Option<String>,
    #[serde(default)]
    pub crawl_config: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub crawl_frequency_minutes: Option<u32>,
    #[serde(default)]
    pub crawl_config: Option<serde_json::Value>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewAnalyst {
    pub slug: Option<String>,
    pub name: Option<String>,
    pub scope_level: Option<ScopeLevel>,
    #[serde(default)]
    pub universe_id: Option<String>,
    #[serde(default)]
    pub target_id: Option<String>,
    #[serde(default)]
    pub perspective: Option<String>,
    #[serde(default)]
    pub tier_instructions: Option<TierInstructions>,
    #[serde(default)]
    pub default_weight: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalystUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub perspective: Option<String>,
    #[serde(default)]
    pub tier_instructions: Option<TierInstructions>,
    #[serde(default)]
    pub default_weight: Option<f64>,
    #[serde(default)]
    pub is_enabled: Option<bool>,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct CatalogStore {
    db: Database,
}

impl CatalogStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    // --- universes ---

    pub async fn create_universe(&self, scope: &OrgScope, input: NewUniverse) -> Result<Universe> {
        let name = input
            .name
            .filter(|n| !n.is_empty())
            .ok_or_else(|| PipelineError::invalid_data("universe name is required"))?;
        let universe = Universe {
            id: new_id(),
            organization_slug: scope.organization_slug.clone(),
            agent_slug: scope.agent_slug.clone(),
            name,
            description: input.description,
            llm_config: input.llm_config.unwrap_or_default(),
            thresholds: input.thresholds.unwrap_or_default(),
            notification_config: input.notification_config.unwrap_or_default(),
            is_active: true,
            created_at: Utc::now(),
        };
        self.db.put(&universe).await?;
        Ok(universe)
    }

    pub async fn get_universe(&self, org: &str, id: &str) -> Result<Universe> {
        self.db
            .get(org, id)
            .await?
            .ok_or_else(|| PipelineError::not_found("universe", id))
    }

    pub async fn list_universes(
        &self,
        org: &str,
        page: PageRequest,
    ) -> Result<Paginated<Universe>> {
        let filter = DocFilter::default()
            .limit(page.page_size)
            .offset(page.offset());
        let data = self.db.list(org, &filter).await?;
        let total = self.db.count::<Universe>(org, &DocFilter::default()).await?;
        Ok(Paginated::new(data, page, total))
    }

    pub async fn update_universe(
        &self,
        org: &str,
        id: &str,
        update: UniverseUpdate,
    ) -> Result<Universe> {
        let mut universe = self.get_universe(org, id).await?;
        if let Some(name) = update.name {
            universe.name = name;
        }
        if let Some(description) = update.description {
            universe.description = Some(description);
        }
        if let Some(llm_config) = update.llm_config {
            universe.llm_config = llm_config;
        }
        if let Some(thresholds) = update.thresholds {
            universe.thresholds = thresholds;
        }
        if let Some(notification_config) = update.notification_config {
            universe.notification_config = notification_config;
        }
        if let Some(is_active) = update.is_active {
            universe.is_active = is_active;
        }
        self.db.put(&universe).await?;
        Ok(universe)
    }

    /// Soft delete: the universe stays queryable but inactive.
    pub async fn delete_universe(&self, org: &str, id: &str) -> Result<()> {
        if let Some(mut universe) = self.db.get::<Universe>(org, id).await? {
            universe.is_active = false;
            self.db.put(&universe).await?;
        }
        Ok(())
    }

    // --- targets ---

    pub async fn create_target(&self, org: &str, input: NewTarget) -> Result<Target> {
        let universe_id = input.universe_id.filter(|v| !v.is_empty()).ok_or_else(|| {
            PipelineError::validation(ErrorCode::MissingUniverseId, "universeId is required")
        })?;
        let symbol = input
            .symbol
            .filter(|v| !v.is_empty())
            .ok_or_else(|| PipelineError::invalid_data("symbol is required"))?;
        let target_type = input
            .target_type
            .filter(|v| !v.is_empty())
            .ok_or_else(|| PipelineError::invalid_data("targetType is required"))?;
        // Universe must exist within the same org.
        self.get_universe(org, &universe_id).await?;

        let target = Target {
            id: new_id(),
            organization_slug: org.to_string(),
            universe_id,
            is_test: is_test_symbol(&symbol),
            symbol,
            target_type,
            context: input.context,
            is_active: true,
            metadata: input.metadata.unwrap_or_default(),
            created_at: Utc::now(),
        };
        self.db.put(&target).await?;
        Ok(target)
    }

    pub async fn get_target(&self, org: &str, id: &str) -> Result<Target> {
        self.db
            .get(org, id)
            .await?
            .ok_or_else(|| PipelineError::not_found("target", id))
    }

    /// List always requires an explicit universe; there is no implicit
    /// cross-universe scan.
    pub async fn list_targets(
        &self,
        org: &str,
        universe_id: Option<&str>,
        active_only: bool,
        page: PageRequest,
    ) -> Result<Paginated<Target>> {
        let universe_id = universe_id.filter(|v| !v.is_empty()).ok_or_else(|| {
            PipelineError::validation(ErrorCode::MissingUniverseId, "universeId is required")
        })?;
        let mut filter = DocFilter::default().universe(universe_id);
        if active_only {
            filter = filter.status("active");
        }
        let total = self.db.count::<Target>(org, &filter).await?;
        filter = filter.limit(page.page_size).offset(page.offset());
        let data = self.db.list(org, &filter).await?;
        Ok(Paginated::new(data, page, total))
    }

    pub async fn update_target(&self, org: &str, id: &str, update: TargetUpdate) -> Result<Target> {
        let mut target = self.get_target(org, id).await?;
        if let Some(context) = update.context {
            target.context = Some(context);
        }
        if let Some(metadata) = update.metadata {
            target.metadata = metadata;
        }
        if let Some(is_active) = update.is_active {
            target.is_active = is_active;
        }
        self.db.put(&target).await?;
        Ok(target)
    }

    pub async fn delete_target(&self, org: &str, id: &str) -> Result<()> {
        self.db.delete::<Target>(org, id).await
    }

    // --- sources ---

    pub async fn create_source(&self, org: &str, input: NewSource) -> Result<Source> {
        let scope_level = input
            .scope_level
            .ok_or_else(|| PipelineError::invalid_data("scopeLevel is required"))?;
        let source_type = input
            .source_type
            .filter(|v| !v.is_empty())
            .ok_or_else(|| PipelineError::invalid_data("sourceType is required"))?;
        let frequency = input
            .crawl_frequency_minutes
            .ok_or_else(|| PipelineError::invalid_data("crawlFrequencyMinutes is required"))?;
        if !CRAWL_FREQUENCIES.contains(&frequency) {
            return Err(PipelineError::validation_with(
                ErrorCode::InvalidData,
                format!("crawlFrequencyMinutes must be one of {:?}", CRAWL_FREQUENCIES),
                serde_json::json!({ "allowed": CRAWL_FREQUENCIES }),
            ));
        }
        if scope_level == ScopeLevel::Target
            && (input.target_id.is_none() || input.universe_id.is_none())
        {
            return Err(PipelineError::invalid_data(
                "target-scoped sources require targetId and universeId",
            ));
        }
        if let Some(target_id) = &input.target_id {
            self.get_target(org, target_id).await?;
        }
        if let Some(universe_id) = &input.universe_id {
            self.get_universe(org, universe_id).await?;
        }

        let source = Source {
            id: new_id(),
            organization_slug: org.to_string(),
            scope_level,
            universe_id: input.universe_id,
            target_id: input.target_id,
            name: input.name.unwrap_or_else(|| source_type.clone()),
            source_type,
            url: input.url,
            crawl_frequency_minutes: frequency,
            crawl_config: input.crawl_config.unwrap_or(serde_json::Value::Null),
            is_active: true,
            last_crawled_at: None,
            created_at: Utc::now(),
        };
        self.db.put(&source).await?;
        Ok(source)
    }

    pub async fn get_source(&self, org: &str, id: &str) -> Result<Source> {
        self.db
            .get(org, id)
            .await?
            .ok_or_else(|| PipelineError::not_found("source", id))
    }

    pub async fn list_sources(&self, org: &str, page: PageRequest) -> Result<Paginated<Source>> {
        let filter = DocFilter::default()
            .limit(page.page_size)
            .offset(page.offset());
        let data = self.db.list(org, &filter).await?;
        let total = self.db.count::<Source>(org, &DocFilter::default()).await?;
        Ok(Paginated::new(data, page, total))
    }

    pub async fn update_source(&self, org: &str, id: &str, update: SourceUpdate) -> Result<Source> {
        let mut source = self.get_source(org, id).await?;
        if let Some(name) = update.name {
            source.name = name;
        }
        if let Some(url) = update.url {
            source.url = Some(url);
        }
        if let Some(frequency) = update.crawl_frequency_minutes {
            if !CRAWL_FREQUENCIES.contains(&frequency) {
                return Err(PipelineError::invalid_data(format!(
                    "crawlFrequencyMinutes must be one of {:?}",
                    CRAWL_FREQUENCIES
                )));
            }
            source.crawl_frequency_minutes = frequency;
        }
        if let Some(crawl_config) = update.crawl_config {
            source.crawl_config = crawl_config;
        }
        if let Some(is_active) = update.is_active {
            source.is_active = is_active;
        }
        self.db.put(&source).await?;
        Ok(source)
    }

    pub async fn delete_source(&self, org: &str, id: &str) -> Result<()> {
        self.db.delete::<Source>(org, id).await
    }

    pub async fn mark_crawled(&self, org: &str, id: &str, at: DateTime<Utc>) -> Result<()> {
        let mut source = self.get_source(org, id).await?;
        source.last_crawled_at = Some(at);
        self.db.put(&source).await
    }

    /// All active sources a target inherits: its own, plus universe-,
    /// domain- and runner-scoped ones.
    pub async fn sources_for_target(&self, org: &str, target: &Target) -> Result<Vec<Source>> {
        let all: Vec<Source> = self
            .db
            .list(org, &DocFilter::default().status("active"))
            .await?;
        Ok(all
            .into_iter()
            .filter(|s| source_applies(s, target))
            .collect())
    }

    // --- analysts ---

    pub async fn create_analyst(&self, org: &str, input: NewAnalyst) -> Result<Analyst> {
        let slug = input
            .slug
            .filter(|v| !v.is_empty())
            .ok_or_else(|| PipelineError::invalid_data("analyst slug is required"))?;
        let scope_level = input
            .scope_level
            .ok_or_else(|| PipelineError::invalid_data("scopeLevel is required"))?;
        let analyst = Analyst {
            id: new_id(),
            organization_slug: org.to_string(),
            name: input.name.unwrap_or_else(|| slug.clone()),
            slug,
            scope_level,
            universe_id: input.universe_id,
            target_id: input.target_id,
            perspective: input.perspective.unwrap_or_default(),
            tier_instructions: input.tier_instructions.unwrap_or_default(),
            default_weight: input.default_weight.unwrap_or(1.0).clamp(0.0, 10.0),
            is_enabled: true,
            is_system: false,
            created_at: Utc::now(),
        };
        self.db.put(&analyst).await?;
        Ok(analyst)
    }

    pub async fn get_analyst(&self, org: &str, id: &str) -> Result<Analyst> {
        self.db
            .get(org, id)
            .await?
            .ok_or_else(|| PipelineError::not_found("analyst", id))
    }

    pub async fn get_analyst_by_slug(&self, org: &str, slug: &str) -> Result<Option<Analyst>> {
        let found: Vec<Analyst> = self
            .db
            .list(org, &DocFilter::default().key(slug).limit(1))
            .await?;
        Ok(found.into_iter().next())
    }

    pub async fn list_analysts(&self, org: &str, page: PageRequest) -> Result<Paginated<Analyst>> {
        let filter = DocFilter::default()
            .limit(page.page_size)
            .offset(page.offset());
        let data = self.db.list(org, &filter).await?;
        let total = self.db.count::<Analyst>(org, &DocFilter::default()).await?;
        Ok(Paginated::new(data, page, total))
    }

    pub async fn update_analyst(
        &self,
        org: &str,
        id: &str,
        update: AnalystUpdate,
    ) -> Result<Analyst> {
        let mut analyst = self.get_analyst(org, id).await?;
        if let Some(name) = update.name {
            analyst.name = name;
        }
        if let Some(perspective) = update.perspective {
            analyst.perspective = perspective;
        }
        if let Some(instructions) = update.tier_instructions {
            analyst.tier_instructions = instructions;
        }
        if let Some(weight) = update.default_weight {
            analyst.default_weight = weight.clamp(0.0, 10.0);
        }
        if let Some(is_enabled) = update.is_enabled {
            analyst.is_enabled = is_enabled;
        }
        self.db.put(&analyst).await?;
        Ok(analyst)
    }

    pub async fn delete_analyst(&self, org: &str, id: &str) -> Result<()> {
        self.db.delete::<Analyst>(org, id).await
    }

    /// Enabled analysts whose scope chain covers the target.
    pub async fn analysts_for_target(&self, org: &str, target: &Target) -> Result<Vec<Analyst>> {
        let all: Vec<Analyst> = self
            .db
            .list(org, &DocFilter::default().status("active"))
            .await?;
        Ok(all
            .into_iter()
            .filter(|a| analyst_applies(a, target))
            .collect())
    }

    // --- strategies ---

    pub async fn put_strategy(&self, strategy: &Strategy) -> Result<()> {
        self.db.put(strategy).await
    }

    pub async fn get_strategy(&self, org: &str, id: &str) -> Result<Strategy> {
        self.db
            .get(org, id)
            .await?
            .ok_or_else(|| PipelineError::not_found("strategy", id))
    }

    pub async fn list_strategies(&self, org: &str) -> Result<Vec<Strategy>> {
        self.db.list(org, &DocFilter::default()).await
    }
}

fn source_applies(source: &Source, target: &Target) -> bool {
    match source.scope_level {
        ScopeLevel::Runner | ScopeLevel::Domain => true,
        ScopeLevel::Universe => source.universe_id.as_deref() == Some(target.universe_id.as_str()),
        ScopeLevel::Target => source.target_id.as_deref() == Some(target.id.as_str()),
    }
}

fn analyst_applies(analyst: &Analyst, target: &Target) -> bool {
    match analyst.scope_level {
        ScopeLevel::Runner | ScopeLevel::Domain => true,
        ScopeLevel::Universe => analyst.universe_id.as_deref() == Some(target.universe_id.as_str()),
        ScopeLevel::Target => analyst.target_id.as_deref() == Some(target.id.as_str()),
    }
}
