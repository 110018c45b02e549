//! Pipeline orchestration
//!
//! Owns every stage component and runs the full cycle: crawl → detect →
//! score → emit → expire → evaluate → monitor. Emission is serialized per
//! `(org, target)` through keyed locks, so concurrent cycles can never
//! race two predictions onto one target.

use std::collections::HashMap;
use std::sync::Arc;

use crate::analysts::{LlmScorer, PredictorAggregator, ScoringCapability};
use crate::catalog::CatalogStore;
use crate::config::Config;
use crate::detector::SignalDetector;
use crate::error::Result;
use crate::evaluator::Evaluator;
use crate::events::{EventContext, EventSink, PipelineEvent, TracingSink};
use crate::learning::LearningQueue;
use crate::monitor::AnomalyMonitor;
use crate::predictions::PredictionGenerator;
use crate::promotion::PromotionEngine;
use crate::review::ReviewQueue;
use crate::sandbox::Sandbox;
use crate::scheduler::{ContentFetcher, CrawlScheduler, HttpFetcher};
use crate::storage::Database;

/// Counts from one full cycle.
#[derive(Debug, Default, serde::Serialize)]
pub struct CycleReport {
    pub sources_crawled: u32,
    pub articles_created: u32,
    pub signals_created: u32,
    pub signals_corroborated: u32,
    pub predictors_created: u32,
    pub queued_for_review: u32,
    pub predictions_emitted: u32,
    pub predictions_expired: u32,
    pub evaluations_created: u32,
    pub alerts_created: u32,
}

type TargetLocks = parking_lot::Mutex<HashMap<(String, String), Arc<tokio::sync::Mutex<()>>>>;

pub struct Pipeline {
    db: Database,
    config: Config,
    catalog: CatalogStore,
    scheduler: CrawlScheduler,
    detector: Arc<SignalDetector>,
    aggregator: Arc<PredictorAggregator>,
    generator: Arc<PredictionGenerator>,
    evaluator: Arc<Evaluator>,
    review: ReviewQueue,
    learning: LearningQueue,
    promotion: PromotionEngine,
    monitor: AnomalyMonitor,
    sandbox: Sandbox,
    events: Arc<dyn EventSink>,
    target_locks: TargetLocks,
}

impl Pipeline {
    pub fn new(db: Database, config: Config) -> Self {
        let scorer: Arc<dyn ScoringCapability> = Arc::new(LlmScorer::new(config.llm.clone()));
        let fetcher: Arc<dyn ContentFetcher> = Arc::new(HttpFetcher::new());
        Self::with_components(db, config, scorer, fetcher, Arc::new(TracingSink))
    }

    /// Full wiring with injectable seams, used by tests and the sandbox.
    pub fn with_components(
        db: Database,
        config: Config,
        scorer: Arc<dyn ScoringCapability>,
        fetcher: Arc<dyn ContentFetcher>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let catalog = CatalogStore::new(db.clone());
        let scheduler = CrawlScheduler::new(
            db.clone(),
            catalog.clone(),
            fetcher,
            config.scheduler.clone(),
        );
        let detector = Arc::new(SignalDetector::new(db.clone(), config.detection.clone()));
        let aggregator = Arc::new(PredictorAggregator::new(
            db.clone(),
            catalog.clone(),
            scorer,
            config.review.clone(),
            config.aggregation.clone(),
            config.llm.clone(),
        ));
        let generator = Arc::new(PredictionGenerator::new(
            db.clone(),
            config.aggregation.clone(),
            config.generation.clone(),
        ));
        let evaluator = Arc::new(Evaluator::new(db.clone(), config.evaluation.clone()));
        let review = ReviewQueue::new(db.clone(), catalog.clone());
        let learning = LearningQueue::new(db.clone());
        let promotion =
            PromotionEngine::new(db.clone(), config.promotion.clone(), Arc::clone(&events));
        let monitor = AnomalyMonitor::new(db.clone(), config.monitor.clone());
        let sandbox = Sandbox::new(
            db.clone(),
            catalog.clone(),
            Arc::clone(&detector),
            Arc::clone(&aggregator),
            Arc::clone(&generator),
            Arc::clone(&evaluator),
            Arc::clone(&events),
        );
        Self {
            db,
            config,
            catalog,
            scheduler,
            detector,
            aggregator,
            generator,
            evaluator,
            review,
            learning,
            promotion,
            monitor,
            sandbox,
            events,
            target_locks: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn catalog(&self) -> &CatalogStore {
        &self.catalog
    }

    pub fn scheduler(&self) -> &CrawlScheduler {
        &self.scheduler
    }

    pub fn detector(&self) -> &SignalDetector {
        &self.detector
    }

    pub fn aggregator(&self) -> &PredictorAggregator {
        &self.aggregator
    }

    pub fn generator(&self) -> &PredictionGenerator {
        &self.generator
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    pub fn review(&self) -> &ReviewQueue {
        &self.review
    }

    pub fn learning(&self) -> &LearningQueue {
        &self.learning
    }

    pub fn promotion(&self) -> &PromotionEngine {
        &self.promotion
    }

    pub fn monitor(&self) -> &AnomalyMonitor {
        &self.monitor
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    fn target_lock(&self, org: &str, target_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.target_locks.lock();
        Arc::clone(
            locks
                .entry((org.to_string(), target_id.to_string()))
                .or_default(),
        )
    }

    /// One full pass over an org. Every stage is idempotent, so a crashed
    /// or repeated cycle converges instead of duplicating work.
    pub async fn run_cycle(&self, org: &str) -> Result<CycleReport> {
        let ctx = EventContext::for_org(org);
        self.events.emit(
            &ctx,
            PipelineEvent::Started {
                operation: "pipeline_cycle".to_string(),
            },
        );
        let result = self.run_cycle_inner(org, &ctx).await;
        self.events.emit(
            &ctx,
            PipelineEvent::Completed {
                operation: "pipeline_cycle".to_string(),
                success: result.is_ok(),
            },
        );
        result
    }

    async fn run_cycle_inner(&self, org: &str, ctx: &EventContext) -> Result<CycleReport> {
        let mut report = CycleReport::default();

        let crawl = self.scheduler.tick(org).await?;
        report.sources_crawled = crawl.sources_crawled;
        report.articles_created = crawl.new_articles.len() as u32;
        self.progress(ctx, 25, "crawl complete");

        // Detect, then score per target under the target lock.
        let mut touched_targets: Vec<String> = Vec::new();
        for article in &crawl.new_articles {
            let target = self.catalog.get_target(org, &article.target_id).await?;
            for detection in self.detector.detect(article, &target).await? {
                if detection.is_new() {
                    report.signals_created += 1;
                } else {
                    report.signals_corroborated += 1;
                }
                let universe = self.catalog.get_universe(org, &target.universe_id).await?;
                let lock = self.target_lock(org, &target.id);
                let _guard = lock.lock().await;
                let scored = self
                    .aggregator
                    .score_signal(org, detection.signal(), &target, &universe)
                    .await?;
                report.predictors_created += scored.predictors.len() as u32;
                report.queued_for_review += scored.queued_for_review;
                if !touched_targets.contains(&target.id) {
                    touched_targets.push(target.id.clone());
                }
            }
        }
        self.progress(ctx, 50, "scoring complete");

        for target_id in touched_targets {
            let target = self.catalog.get_target(org, &target_id).await?;
            let universe = self.catalog.get_universe(org, &target.universe_id).await?;
            let lock = self.target_lock(org, &target.id);
            let _guard = lock.lock().await;
            if self
                .generator
                .try_emit(org, &target, &universe, None)
                .await?
                .is_some()
            {
                report.predictions_emitted += 1;
            }
        }
        self.progress(ctx, 75, "emission complete");

        report.predictions_expired = self.generator.expire_due(org).await?;
        let evaluation = self.evaluator.evaluate_resolved(org, None).await?;
        report.evaluations_created = evaluation.evaluated;
        let monitoring = self.monitor.run(org).await?;
        report.alerts_created = monitoring.alerts_created;

        tracing::info!(
            org,
            articles = report.articles_created,
            signals = report.signals_created,
            predictions = report.predictions_emitted,
            "cycle complete"
        );
        Ok(report)
    }

    fn progress(&self, ctx: &EventContext, percent: u8, message: &str) {
        self.events.emit(
            ctx,
            PipelineEvent::Progress {
                operation: "pipeline_cycle".to_string(),
                percent,
                message: message.to_string(),
            },
        );
    }
}
