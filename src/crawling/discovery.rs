//! # Discovery Stage
//!
//! Walks the configured categories in order, follows pagination up to the
//! page limit, and feeds harvestable listing cards into the item queue.
//! The stage is the only producer of the item queue and closes it when it
//! finishes, including when it unwinds.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::crawling::queues::{BoundedQueue, QueueError};
use crate::crawling::state::MetricsAggregator;
use crate::domain::DiscoveredItem;
use crate::infrastructure::config::TimingConfig;
use crate::infrastructure::http_client::PageFetcher;
use crate::infrastructure::parsing::{ListingParser, ParseContext};

/// What the discovery stage walks
#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    pub categories: Vec<String>,
    pub max_pages_per_category: u32,
    /// Visited once before the first category
    pub warmup_url: Option<String>,
    pub timing: TimingConfig,
}

/// Summary of one discovery run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryReport {
    pub categories_visited: usize,
    pub pages_visited: u32,
    pub pages_failed: u32,
    pub items_queued: u64,
    pub items_dropped: u64,
}

/// Closes the item queue when the stage ends, even on panic
struct CloseOnDrop(Arc<BoundedQueue<DiscoveredItem>>);

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        if self.0.close() {
            debug!("Item queue closed by discovery stage");
        }
    }
}

pub struct DiscoveryStage {
    fetcher: Arc<dyn PageFetcher>,
    parser: ListingParser,
    item_queue: Arc<BoundedQueue<DiscoveredItem>>,
    metrics: Arc<MetricsAggregator>,
    settings: DiscoverySettings,
    pending_cooldown: Option<Duration>,
    seen_items: HashSet<String>,
    report: DiscoveryReport,
}

impl DiscoveryStage {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        parser: ListingParser,
        item_queue: Arc<BoundedQueue<DiscoveredItem>>,
        metrics: Arc<MetricsAggregator>,
        settings: DiscoverySettings,
    ) -> Self {
        Self {
            fetcher,
            parser,
            item_queue,
            metrics,
            settings,
            pending_cooldown: None,
            seen_items: HashSet::new(),
            report: DiscoveryReport::default(),
        }
    }

    /// Run to completion and close the item queue
    pub async fn run(mut self) -> DiscoveryReport {
        let _closer = CloseOnDrop(Arc::clone(&self.item_queue));

        if let Some(warmup_url) = self.settings.warmup_url.clone() {
            self.warm_up(&warmup_url).await;
        }

        let categories = std::mem::take(&mut self.settings.categories);
        let total = categories.len();
        for (index, category) in categories.iter().enumerate() {
            info!("📂 Category {}/{}: {}", index + 1, total, category);
            self.harvest_category(category).await;
            self.report.categories_visited += 1;

            if index + 1 < total {
                let pause = self.settings.timing.category_pause.sample();
                debug!("Pausing {:?} before next category", pause);
                tokio::time::sleep(pause).await;
            }
        }

        info!(
            "✅ Discovery finished: {} pages, {} items queued, {} dropped",
            self.report.pages_visited, self.report.items_queued, self.report.items_dropped
        );
        self.report
    }

    /// Visit the home page once so the cookie jar holds a session
    async fn warm_up(&mut self, url: &str) {
        info!("🌐 Warming up session on {}", url);
        if self.fetch_page(url).await.is_none() {
            warn!("⚠️ Warm-up visit failed, continuing without session cookies");
        }
        tokio::time::sleep(self.settings.timing.warmup_pause.sample()).await;
    }

    async fn harvest_category(&mut self, category: &str) {
        let mut visited_pages = HashSet::new();
        let mut next_url = Some(category.to_string());
        let mut pages = 0u32;

        while let Some(url) = next_url.take() {
            if !visited_pages.insert(url.clone()) {
                warn!("Pagination loops back to {}, stopping category", url);
                break;
            }
            pages += 1;

            let Some(body) = self.fetch_page(&url).await else {
                self.report.pages_failed += 1;
                break;
            };
            self.report.pages_visited += 1;

            let context = match ParseContext::new(&url, pages) {
                Ok(context) => context,
                Err(e) => {
                    warn!("Cannot parse listing page {}: {}", url, e);
                    break;
                }
            };
            let listing = self.parser.parse(&body, &context);
            self.publish(listing.items).await;

            match listing.next_page {
                Some(next) if pages < self.settings.max_pages_per_category => {
                    let delay = self.settings.timing.pagination_delay.sample();
                    debug!("Next page {} in {:?}", next, delay);
                    tokio::time::sleep(delay).await;
                    next_url = Some(next);
                }
                Some(_) => {
                    info!(
                        "Page limit ({}) reached for {}",
                        self.settings.max_pages_per_category, category
                    );
                }
                None => debug!("Last page of {} reached after {} pages", category, pages),
            }
        }
    }

    /// Fetch one page, honouring a cooldown armed by an earlier 403/429
    async fn fetch_page(&mut self, url: &str) -> Option<String> {
        if let Some(cooldown) = self.pending_cooldown.take() {
            warn!("⏳ Cooling down for {:?} after rate limiting", cooldown);
            tokio::time::sleep(cooldown).await;
        }

        self.metrics.increment_discovery_request().await;
        match self.fetcher.fetch(url).await {
            Ok(body) => Some(body),
            Err(e) if e.is_rate_limited() => {
                self.metrics.increment_rate_limited().await;
                let cooldown = self.settings.timing.rate_limit_cooldown.sample();
                warn!("🚫 Rate limited on {}: {} (next request in {:?})", url, e, cooldown);
                self.pending_cooldown = Some(cooldown);
                None
            }
            Err(e) => {
                warn!("❌ Listing request failed: {}", e);
                None
            }
        }
    }

    async fn publish(&mut self, items: Vec<DiscoveredItem>) {
        for item in items {
            if !item.is_harvestable() {
                debug!("Skipping card without link or title: {:?}", item);
                continue;
            }
            if !self.seen_items.insert(item.source_url.clone()) {
                debug!("Already discovered {}", item.source_url);
                continue;
            }

            self.metrics.increment_discovered().await;
            match self.item_queue.try_enqueue(item) {
                Ok(()) => self.report.items_queued += 1,
                Err(e @ (QueueError::Full | QueueError::Closed)) => {
                    warn!("⚠️ Item dropped ({})", e);
                    self.metrics.increment_dropped().await;
                    self.report.items_dropped += 1;
                }
            }
        }
    }
}
