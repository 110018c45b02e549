//! Crawl scheduling
//!
//! One scheduler owns the due-queue: `(due_at, source_id)` ordered soonest
//! first, rebuilt from persisted `last_crawled_at` on each pass. A source
//! is due when `now - last_crawled_at >= crawl_frequency_minutes`. Items
//! are deduplicated through `seen_items` keyed by a content-derived hash,
//! so re-crawling the same feed is a no-op.


use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;

use crate::catalog::{CatalogStore, Source, Target};
use crate::config::SchedulerConfig;
use crate::detector::seen_item_key;
use crate::error::Result;
use crate::storage::{Database, Doc, DocFilter, Table};
use crate::types::{new_id, Article};

/// Dedup record: one row per item ever accepted from a source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeenItem {
    /// `sha256(source_id | item identity)`; doubles as the primary key.
    pub id: String,
    pub organization_slug: String,
    pub source_id: String,
    pub item_identity: String,
    pub seen_at: DateTime<Utc>,
}

impl Doc for SeenItem {
    const TABLE: Table = Table::SeenItems;

    fn id(&self) -> &str {
        &self.id
    }
    fn org(&self) -> &str {
        &self.organization_slug
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.seen_at
    }
    fn doc_key(&self) -> Option<&str> {
        Some(&self.source_id)
    }
}

/// Raw item pulled from a source before dedup.
#[derive(Debug, Clone)]
pub struct FetchedItem {
    /// Stable identity within the source (guid, url, or content hash).
    pub identity: String,
    pub title: String,
    pub body: String,
    pub url: Option<String>,
    pub published_at: DateTime<Utc>,
}

/// Pulls content for one source. Parsing specifics live behind this seam.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, source: &Source) -> Result<Vec<FetchedItem>>;
}

/// Plain HTTP fetcher: one GET, the response body becomes a single item
/// identified by its own hash.
pub struct HttpFetcher {
    http: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentFetcher for HttpFetcher {
    async fn fetch(&self, source: &Source) -> Result<Vec<FetchedItem>> {
        let Some(url) = &source.url else {
            return Ok(Vec::new());
        };
        let body = self.http.get(url).send().await?.text().await?;
        if body.is_empty() {
            return Ok(Vec::new());
        }
        let identity = seen_item_key(&source.id, &body);
        Ok(vec![FetchedItem {
            identity,
            title: source.name.clone(),
            body,
            url: Some(url.clone()),
            published_at: Utc::now(),
        }])
    }
}

/// Outcome of one scheduling pass.
#[derive(Debug, Default, Serialize)]
pub struct CrawlReport {
    pub sources_crawled: u32,
    pub items_fetched: u32,
    pub items_deduplicated: u32,
    #[serde(skip)]
    pub new_articles: Vec<Article>,
}

pub struct CrawlScheduler {
    db: Database,
    catalog: CatalogStore,
    fetcher: Arc<dyn ContentFetcher>,
    config: SchedulerConfig,
}

impl CrawlScheduler {
    pub fn new(
        db: Database,
        catalog: CatalogStore,
        fetcher: Arc<dyn ContentFetcher>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            db,
            catalog,
            fetcher,
            config,
        }
    }

    /// A source never having been crawled is due immediately.
    pub fn is_due(source: &Source, now: DateTime<Utc>) -> bool {
        match source.last_crawled_at {
            None => true,
            Some(last) => now - last >= Duration::minutes(source.crawl_frequency_minutes as i64),
        }
    }

    fn due_at(source: &Source) -> DateTime<Utc> {
        match source.last_crawled_at {
            None => DateTime::<Utc>::MIN_UTC,
            Some(last) => last + Duration::minutes(source.crawl_frequency_minutes as i64),
        }
    }

    /// The due-queue for an org: soonest-due first, active sources that
    /// apply to at least one active target. Deactivated targets drop out
    /// of the candidate set entirely.
    pub async fn build_queue(
        &self,
        org: &str,
    ) -> Result<BinaryHeap<Reverse<(DateTime<Utc>, String)>>> {
        let targets: Vec<Target> = self
            .db
            .list(org, &DocFilter::default().status("active"))
            .await?;
        let mut queue = BinaryHeap::new();
        let mut queued: Vec<String> = Vec::new();
        for target in &targets {
            for source in self.catalog.sources_for_target(org, target).await? {
                if !queued.contains(&source.id) {
                    queue.push(Reverse((Self::due_at(&source), source.id.clone())));
                    queued.push(source.id);
                }
            }
        }
        Ok(queue)
    }

    /// One scheduling pass: crawl every due source, dedup, persist new
    /// articles. Safe to re-invoke; already-seen items are skipped.
    pub async fn tick(&self, org: &str) -> Result<CrawlReport> {
        let now = Utc::now();
        let mut queue = self.build_queue(org).await?;
        let mut report = CrawlReport::default();

        while let Some(Reverse((due_at, source_id))) = queue.pop() {
            if due_at > now {
                break;
            }
            let source = self.catalog.get_source(org, &source_id).await?;
            if !Self::is_due(&source, now) {
                continue;
            }
            let items = match self.fetcher.fetch(&source).await {
                Ok(items) => items,
                Err(e) => {
                    tracing::warn!(source_id = %source.id, "fetch failed: {}", e);
                    continue;
                }
            };
            report.sources_crawled += 1;
            self.catalog.mark_crawled(org, &source.id, now).await?;

            for item in items.into_iter().take(self.config.max_items_per_fetch) {
                report.items_fetched += 1;
                let key = seen_item_key(&source.id, &item.identity);
                if self.db.get::<SeenItem>(org, &key).await?.is_some() {
                    report.items_deduplicated += 1;
                    continue;
                }
                self.db
                    .put(&SeenItem {
                        id: key,
                        organization_slug: org.to_string(),
                        source_id: source.id.clone(),
                        item_identity: item.identity.clone(),
                        seen_at: now,
                    })
                    .await?;

                for target in self.targets_for_source(org, &source).await? {
                    let article = Article {
                        id: new_id(),
                        organization_slug: org.to_string(),
                        source_id: source.id.clone(),
                        target_id: target.id.clone(),
                        title: item.title.clone(),
                        body: item.body.clone(),
                        url: item.url.clone(),
                        published_at: item.published_at,
                        is_test: target.is_test,
                        scenario_id: None,
                    };
                    self.db.put(&article).await?;
                    report.new_articles.push(article);
                }
            }
        }
        tracing::info!(
            org,
            sources = report.sources_crawled,
            fetched = report.items_fetched,
            deduped = report.items_deduplicated,
            "crawl pass complete"
        );
        Ok(report)
    }

    /// Active targets a source's scope covers.
    async fn targets_for_source(&self, org: &str, source: &Source) -> Result<Vec<Target>> {
        let targets: Vec<Target> = self
            .db
            .list(org, &DocFilter::default().status("active"))
            .await?;
        let mut out = Vec::new();
        for target in targets {
            let applies = self
                .catalog
                .sources_for_target(org, &target)
                .await?
                .iter()
                .any(|s| s.id == source.id);
            if applies {
                out.push(target);
            }
        }
        Ok(out)
    }
}
