//! # Harvest Orchestrator
//!
//! Wires the pipeline together and owns the shutdown order:
//!
//! 1. discovery finishes and closes the item queue
//! 2. workers drain the item queue and exit
//! 3. all worker handles are awaited (barrier)
//! 4. the result queue is closed
//! 5. the collector drains and signals completion
//! 6. statistics are finalized
//!
//! A task that panics is reported in `HarvestReport::task_failures`; the
//! remaining steps still run so no stage is left waiting.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span};
use uuid::Uuid;

use crate::crawling::collector::{RecipeCollection, ResultCollector};
use crate::crawling::discovery::{DiscoveryReport, DiscoverySettings, DiscoveryStage};
use crate::crawling::queues::BoundedQueue;
use crate::crawling::state::{MetricsAggregator, StatsSnapshot};
use crate::crawling::topology::{TopologyEstimate, detect_topology};
use crate::crawling::workers::{WorkerContext, WorkerPool};
use crate::domain::{DiscoveredItem, Recipe};
use crate::infrastructure::config::{AppConfig, ConfigError};
use crate::infrastructure::http_client::{
    BrowserSession, FetcherSource, HttpClient, PageFetcher, SharedFetcher,
};
use crate::infrastructure::parsing::{ListingParser, ParsingError, RecipeParser};

#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid selector configuration: {0}")]
    Parsing(#[from] ParsingError),

    #[error("Failed to build HTTP client: {0:#}")]
    HttpClient(anyhow::Error),
}

/// Everything a finished run produced
#[derive(Debug, Clone, Serialize)]
pub struct HarvestReport {
    pub run_id: Uuid,
    pub recipes: Vec<Recipe>,
    pub stats: StatsSnapshot,
    pub topology: TopologyEstimate,
    pub discovery: DiscoveryReport,
    /// Tasks that ended abnormally
    pub task_failures: Vec<String>,
}

impl HarvestReport {
    pub fn is_clean(&self) -> bool {
        self.task_failures.is_empty()
    }
}

pub struct HarvestOrchestrator {
    config: AppConfig,
    discovery_fetcher: Arc<dyn PageFetcher>,
    detail_fetchers: Arc<dyn FetcherSource>,
    worker_override: Option<usize>,
}

impl HarvestOrchestrator {
    /// Use the given fetchers for listing and detail pages; all workers share `detail_fetcher`
    pub fn new(
        config: AppConfig,
        discovery_fetcher: Arc<dyn PageFetcher>,
        detail_fetcher: Arc<dyn PageFetcher>,
    ) -> Self {
        Self::with_detail_source(config, discovery_fetcher, Arc::new(SharedFetcher(detail_fetcher)))
    }

    /// Like [`Self::new`], but every worker asks `detail_fetchers` for its own fetcher
    pub fn with_detail_source(
        config: AppConfig,
        discovery_fetcher: Arc<dyn PageFetcher>,
        detail_fetchers: Arc<dyn FetcherSource>,
    ) -> Self {
        Self {
            config,
            discovery_fetcher,
            detail_fetchers,
            worker_override: None,
        }
    }

    /// Build real HTTP clients sharing one browser session
    ///
    /// Discovery gets one client paced by `discovery_rate`. Each worker gets
    /// its own fork of the detail client, paced by `detail_rate`.
    pub fn from_config(config: AppConfig) -> Result<Self, HarvestError> {
        config.validate()?;

        let session = BrowserSession::default();
        let discovery = HttpClient::new(&config.http, config.discovery_rate, &session)
            .map_err(HarvestError::HttpClient)?;
        let detail = HttpClient::new(&config.http, config.detail_rate, &session)
            .map_err(HarvestError::HttpClient)?;

        Ok(Self::with_detail_source(config, Arc::new(discovery), Arc::new(detail)))
    }

    /// Fix the pool size instead of deriving it from the host
    #[must_use]
    pub fn with_worker_count(mut self, workers: usize) -> Self {
        self.worker_override = Some(workers.max(1));
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Run the whole pipeline to completion
    pub async fn run(&self) -> Result<HarvestReport, HarvestError> {
        let run_id = Uuid::new_v4();
        self.execute(run_id)
            .instrument(info_span!("harvest", %run_id))
            .await
    }

    fn topology(&self) -> TopologyEstimate {
        let harvest = &self.config.harvest;
        let detected = detect_topology(harvest.min_workers, harvest.max_workers);
        match self.worker_override {
            Some(workers) => TopologyEstimate { workers, ..detected },
            None => detected,
        }
    }

    async fn execute(&self, run_id: Uuid) -> Result<HarvestReport, HarvestError> {
        let config = &self.config;
        let harvest = &config.harvest;

        // Selector problems surface before any task is spawned
        let listing_parser = ListingParser::with_config(&config.selectors.listing)?;
        let recipe_parser = Arc::new(RecipeParser::with_config(&config.selectors.recipe)?);

        let topology = self.topology();
        info!("🚀 Starting harvest {} over {} categories", run_id, harvest.categories.len());
        info!("🧮 Topology: {}", topology);

        let metrics = Arc::new(MetricsAggregator::new());
        metrics.set_worker_count(topology.workers).await;

        let item_queue: Arc<BoundedQueue<DiscoveredItem>> =
            Arc::new(BoundedQueue::new("items", harvest.item_queue_capacity));
        let result_queue: Arc<BoundedQueue<Recipe>> =
            Arc::new(BoundedQueue::new("results", harvest.result_queue_capacity));
        let records: RecipeCollection = Arc::new(Mutex::new(Vec::new()));
        let mut task_failures = Vec::new();

        // Per-worker fetchers are built before anything runs
        let worker_pool = WorkerPool::new(
            topology.workers,
            WorkerContext {
                fetchers: Arc::clone(&self.detail_fetchers),
                parser: recipe_parser,
                item_queue: Arc::clone(&item_queue),
                result_queue: Arc::clone(&result_queue),
                metrics: Arc::clone(&metrics),
                rate_limit_cooldown: config.timing.rate_limit_cooldown,
            },
        )
        .map_err(HarvestError::HttpClient)?;

        let (collector_handle, drained) =
            ResultCollector::new(Arc::clone(&result_queue), Arc::clone(&records)).spawn();
        let worker_handles = worker_pool.spawn();

        let reporter_token = CancellationToken::new();
        let reporter = (harvest.stats_interval_secs > 0).then(|| {
            spawn_stats_reporter(
                Arc::clone(&metrics),
                Arc::clone(&item_queue),
                Duration::from_secs(harvest.stats_interval_secs),
                reporter_token.clone(),
            )
        });

        let discovery_stage = DiscoveryStage::new(
            Arc::clone(&self.discovery_fetcher),
            listing_parser,
            Arc::clone(&item_queue),
            Arc::clone(&metrics),
            DiscoverySettings {
                categories: harvest.categories.clone(),
                max_pages_per_category: harvest.max_pages_per_category,
                warmup_url: Some(harvest.warmup_url.clone()).filter(|url| !url.is_empty()),
                timing: config.timing.clone(),
            },
        );
        let discovery_handle = tokio::spawn(discovery_stage.run().instrument(info_span!("discovery")));

        // (1) discovery closes the item queue on every exit path
        let discovery = match discovery_handle.await {
            Ok(report) => report,
            Err(e) => {
                error!("💥 Discovery stage ended abnormally: {}", e);
                task_failures.push(format!("discovery: {e}"));
                DiscoveryReport::default()
            }
        };

        // (2) + (3) barrier over every worker
        for (id, outcome) in futures::future::join_all(worker_handles).await.into_iter().enumerate() {
            if let Err(e) = outcome {
                error!("💥 Worker {} ended abnormally: {}", id, e);
                task_failures.push(format!("worker {id}: {e}"));
            }
        }
        debug!("All workers finished");

        // (4) no producer is left for the result queue
        result_queue.close();

        // (5) wait for the collector's drain signal
        match drained.await {
            Ok(count) => debug!("Collector reported {} records", count),
            Err(_) => task_failures.push("collector: exited without signalling".to_string()),
        }
        if let Err(e) = collector_handle.await {
            error!("💥 Result collector ended abnormally: {}", e);
            task_failures.push(format!("collector: {e}"));
        }

        reporter_token.cancel();
        if let Some(reporter) = reporter {
            let _ = reporter.await;
        }

        // (6)
        let stats = metrics.finalize().await;
        let recipes = std::mem::take(&mut *records.lock().await);

        info!(
            "🏁 Harvest {} finished: {} recipes, {} failed, {} dropped, success rate {:.1}%",
            run_id,
            recipes.len(),
            stats.stats.items_failed,
            stats.stats.items_dropped,
            stats.success_rate
        );

        Ok(HarvestReport {
            run_id,
            recipes,
            stats,
            topology,
            discovery,
            task_failures,
        })
    }
}

/// Periodic progress line until `token` is cancelled
fn spawn_stats_reporter(
    metrics: Arc<MetricsAggregator>,
    item_queue: Arc<BoundedQueue<DiscoveredItem>>,
    every: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            tokio::select! {
                () = token.cancelled() => {
                    debug!("Stats reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let snapshot = metrics.snapshot().await;
                    let stats = &snapshot.stats;
                    let queued = item_queue.len();
                    info!(
                        "📊 {:.0}s: {} requests, {} discovered, {} completed, {} failed, {} dropped, {} queued",
                        snapshot.elapsed_secs,
                        stats.total_requests,
                        stats.items_discovered,
                        stats.items_completed,
                        stats.items_failed,
                        stats.items_dropped,
                        queued
                    );
                    if let Some(remaining) = stats.estimated_remaining_secs(queued).filter(|_| queued > 0) {
                        info!(
                            "⏳ ~{:.0}s left for {} queued recipes at {:.2}s each",
                            remaining,
                            queued,
                            stats.secs_per_item()
                        );
                    }
                }
            }
        }
    })
}
