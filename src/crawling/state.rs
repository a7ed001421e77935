//! # Shared Run Statistics
//!
//! All stages report into one `MetricsAggregator`. Every mutation is a
//! counter bump or a single map insert under one reader/writer lock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Per-worker counters, owned by the worker until it exits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerState {
    pub id: usize,
    /// Detail fetches attempted
    pub requests_handled: u64,
    /// Detail fetches that produced a record
    pub items_processed: u64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl WorkerState {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            requests_handled: 0,
            items_processed: 0,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    pub fn finish(&mut self) {
        self.ended_at = Some(Utc::now());
    }

    /// Active time in seconds; 0 while still running
    pub fn duration_secs(&self) -> f64 {
        self.ended_at
            .map_or(0.0, |end| elapsed_secs(self.started_at, end))
    }
}

/// Run-wide counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalStats {
    pub total_requests: u64,
    pub discovery_requests: u64,
    pub detail_requests: u64,
    pub items_discovered: u64,
    pub items_completed: u64,
    pub items_failed: u64,
    /// Discovered but rejected by a full item queue
    pub items_dropped: u64,
    /// 403/429 answers seen by any stage
    pub rate_limit_hits: u64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub worker_count: usize,
    pub per_worker: BTreeMap<usize, WorkerState>,
    pub requests_per_second: f64,
    pub items_per_second: f64,
}

impl GlobalStats {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            total_requests: 0,
            discovery_requests: 0,
            detail_requests: 0,
            items_discovered: 0,
            items_completed: 0,
            items_failed: 0,
            items_dropped: 0,
            rate_limit_hits: 0,
            started_at,
            ended_at: None,
            worker_count: 0,
            per_worker: BTreeMap::new(),
            requests_per_second: 0.0,
            items_per_second: 0.0,
        }
    }

    /// Seconds from start to end, or to now while the run is in progress
    pub fn elapsed_secs(&self) -> f64 {
        elapsed_secs(self.started_at, self.ended_at.unwrap_or_else(Utc::now))
    }

    /// Completed share of discovered items, in percent
    pub fn success_rate(&self) -> f64 {
        if self.items_discovered == 0 {
            return 0.0;
        }
        self.items_completed as f64 / self.items_discovered as f64 * 100.0
    }

    /// Items that reached a final outcome
    pub fn items_accounted(&self) -> u64 {
        self.items_completed + self.items_failed + self.items_dropped
    }

    /// Requests spent per completed item
    pub fn requests_per_item(&self) -> f64 {
        if self.items_completed == 0 {
            return 0.0;
        }
        self.total_requests as f64 / self.items_completed as f64
    }

    /// Wall-clock seconds per completed item, all workers together
    pub fn secs_per_item(&self) -> f64 {
        if self.items_completed == 0 {
            return 0.0;
        }
        self.elapsed_secs() / self.items_completed as f64
    }

    /// Seconds one worker spends per completed item, from the exited workers
    pub fn worker_secs_per_item(&self) -> f64 {
        let processed: u64 = self.per_worker.values().map(|w| w.items_processed).sum();
        if processed == 0 {
            return 0.0;
        }
        let busy: f64 = self.per_worker.values().map(WorkerState::duration_secs).sum();
        busy / processed as f64
    }

    /// Time left for `queued` items at the pace seen so far; `None` before the first completion
    pub fn estimated_remaining_secs(&self, queued: usize) -> Option<f64> {
        (self.items_completed > 0).then(|| self.secs_per_item() * queued as f64)
    }
}

/// Point-in-time copy of the statistics with derived values
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    #[serde(flatten)]
    pub stats: GlobalStats,
    pub elapsed_secs: f64,
    pub success_rate: f64,
}

impl From<GlobalStats> for StatsSnapshot {
    fn from(stats: GlobalStats) -> Self {
        Self {
            elapsed_secs: stats.elapsed_secs(),
            success_rate: stats.success_rate(),
            stats,
        }
    }
}

fn elapsed_secs(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let millis = (end - start).num_milliseconds();
    if millis <= 0 { 0.0 } else { millis as f64 / 1000.0 }
}

/// Thread-safe owner of the run statistics
#[derive(Debug)]
pub struct MetricsAggregator {
    stats: RwLock<GlobalStats>,
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    pub fn starting_at(started_at: DateTime<Utc>) -> Self {
        Self {
            stats: RwLock::new(GlobalStats::new(started_at)),
        }
    }

    pub async fn set_worker_count(&self, workers: usize) {
        self.stats.write().await.worker_count = workers;
    }

    pub async fn increment_discovery_request(&self) {
        let mut stats = self.stats.write().await;
        stats.discovery_requests += 1;
        stats.total_requests += 1;
    }

    pub async fn increment_detail_request(&self) {
        let mut stats = self.stats.write().await;
        stats.detail_requests += 1;
        stats.total_requests += 1;
    }

    pub async fn increment_discovered(&self) {
        self.stats.write().await.items_discovered += 1;
    }

    pub async fn increment_completed(&self) {
        self.stats.write().await.items_completed += 1;
    }

    pub async fn increment_failed(&self) {
        self.stats.write().await.items_failed += 1;
    }

    pub async fn increment_dropped(&self) {
        self.stats.write().await.items_dropped += 1;
    }

    pub async fn increment_rate_limited(&self) {
        self.stats.write().await.rate_limit_hits += 1;
    }

    /// Publish a worker's final counters
    pub async fn record_worker_exit(&self, state: WorkerState) {
        self.stats.write().await.per_worker.insert(state.id, state);
    }

    /// Consistent copy taken under the read lock
    pub async fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot::from(self.stats.read().await.clone())
    }

    /// Stamp the end time and compute rates
    pub async fn finalize(&self) -> StatsSnapshot {
        self.finalize_at(Utc::now()).await
    }

    pub async fn finalize_at(&self, ended_at: DateTime<Utc>) -> StatsSnapshot {
        let mut stats = self.stats.write().await;
        stats.ended_at = Some(ended_at);

        let elapsed = stats.elapsed_secs();
        if elapsed > 0.0 {
            stats.requests_per_second = stats.total_requests as f64 / elapsed;
            stats.items_per_second = stats.items_completed as f64 / elapsed;
        } else {
            stats.requests_per_second = 0.0;
            stats.items_per_second = 0.0;
        }

        StatsSnapshot::from(stats.clone())
    }
}
