//! # Worker Pool
//!
//! A fixed number of tasks pull discovered items until the item queue is
//! closed and empty. Each item is fetched once; a failure is counted and the
//! worker moves on. Every worker owns the fetcher it was given at start-up,
//! so a per-worker rate policy paces one worker without slowing the others.
//! The pool size is the only bound on concurrent detail requests.

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::crawling::queues::BoundedQueue;
use crate::crawling::state::{MetricsAggregator, WorkerState};
use crate::domain::{DiscoveredItem, Recipe};
use crate::infrastructure::config::DelayRange;
use crate::infrastructure::http_client::{FetchError, FetcherSource, PageFetcher};
use crate::infrastructure::parsing::RecipeParser;

/// Per-item failure inside a worker
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Result queue closed before the record could be published")]
    ResultQueueClosed,
}

impl WorkerError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::Fetch(e) if e.is_rate_limited())
    }
}

/// Everything the workers share
pub struct WorkerContext {
    pub fetchers: Arc<dyn FetcherSource>,
    pub parser: Arc<RecipeParser>,
    pub item_queue: Arc<BoundedQueue<DiscoveredItem>>,
    pub result_queue: Arc<BoundedQueue<Recipe>>,
    pub metrics: Arc<MetricsAggregator>,
    /// Wait taken by a worker after a 403/429
    pub rate_limit_cooldown: DelayRange,
}

/// Fetch state private to one item
struct ItemFetch {
    item: DiscoveredItem,
    started: Instant,
}

impl ItemFetch {
    fn new(item: DiscoveredItem) -> Self {
        Self {
            item,
            started: Instant::now(),
        }
    }

    async fn execute(
        self,
        fetcher: &dyn PageFetcher,
        context: &WorkerContext,
    ) -> Result<Recipe, WorkerError> {
        context.metrics.increment_detail_request().await;
        let body = fetcher.fetch(&self.item.source_url).await?;
        let recipe = context.parser.parse(&body, &self.item);
        debug!(
            "Parsed '{}' ({} ingredients, {} steps) in {:?}",
            recipe.name,
            recipe.ingredients.len(),
            recipe.instructions.len(),
            self.started.elapsed()
        );
        Ok(recipe)
    }
}

pub struct WorkerPool {
    fetchers: Vec<Arc<dyn PageFetcher>>,
    context: Arc<WorkerContext>,
}

impl WorkerPool {
    /// Prepare `size` workers; every fetcher is built here, before any task starts
    pub fn new(size: usize, context: WorkerContext) -> anyhow::Result<Self> {
        let fetchers = (0..size.max(1))
            .map(|id| context.fetchers.for_worker(id))
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self {
            fetchers,
            context: Arc::new(context),
        })
    }

    pub fn size(&self) -> usize {
        self.fetchers.len()
    }

    /// Start every worker; each handle yields that worker's final state
    pub fn spawn(self) -> Vec<JoinHandle<WorkerState>> {
        info!("👷 Starting {} workers", self.fetchers.len());
        self.fetchers
            .into_iter()
            .enumerate()
            .map(|(id, fetcher)| {
                let context = Arc::clone(&self.context);
                tokio::spawn(run_worker(id, fetcher, context).instrument(info_span!("worker", id)))
            })
            .collect()
    }
}

async fn run_worker(
    id: usize,
    fetcher: Arc<dyn PageFetcher>,
    context: Arc<WorkerContext>,
) -> WorkerState {
    let mut state = WorkerState::new(id);
    debug!("Worker {} started", id);

    while let Some(item) = context.item_queue.dequeue().await {
        let url = item.source_url.clone();
        state.requests_handled += 1;

        let outcome = match ItemFetch::new(item).execute(fetcher.as_ref(), &context).await {
            Ok(recipe) => context
                .result_queue
                .enqueue(recipe)
                .await
                .map_err(|_| WorkerError::ResultQueueClosed),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                state.items_processed += 1;
                context.metrics.increment_completed().await;
            }
            Err(e) => {
                warn!("❌ Worker {} failed on {}: {}", id, url, e);
                context.metrics.increment_failed().await;
                if e.is_rate_limited() {
                    context.metrics.increment_rate_limited().await;
                    let cooldown = context.rate_limit_cooldown.sample();
                    warn!("⏳ Worker {} cooling down for {:?}", id, cooldown);
                    tokio::time::sleep(cooldown).await;
                }
            }
        }
    }

    state.finish();
    debug!(
        "Worker {} exiting: {} requests, {} recipes",
        id, state.requests_handled, state.items_processed
    );
    context.metrics.record_worker_exit(state.clone()).await;
    state
}
