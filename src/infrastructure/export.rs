//! Result and metrics export
//!
//! Writes the harvested records as a pretty-printed JSON array, optionally a
//! JSON metrics document, and renders the end-of-run summary.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::crawling::discovery::DiscoveryReport;
use crate::crawling::orchestrator::HarvestReport;
use crate::crawling::state::StatsSnapshot;
use crate::crawling::topology::TopologyEstimate;
use crate::domain::Recipe;

/// Metrics document written next to the records
#[derive(Debug, Serialize)]
struct RunStatsDocument<'a> {
    run_id: Uuid,
    stats: &'a StatsSnapshot,
    topology: &'a TopologyEstimate,
    discovery: &'a DiscoveryReport,
    task_failures: &'a [String],
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize JSON document")?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Write every record as one JSON array
pub async fn save_recipes(path: &Path, recipes: &[Recipe]) -> Result<()> {
    write_json(path, recipes).await?;
    info!("💾 Saved {} recipes to {}", recipes.len(), path.display());
    Ok(())
}

pub async fn save_stats(path: &Path, report: &HarvestReport) -> Result<()> {
    let document = RunStatsDocument {
        run_id: report.run_id,
        stats: &report.stats,
        topology: &report.topology,
        discovery: &report.discovery,
        task_failures: &report.task_failures,
    };
    write_json(path, &document).await?;
    info!("📈 Saved run statistics to {}", path.display());
    Ok(())
}

/// Human-readable end-of-run summary
pub fn render_summary(report: &HarvestReport) -> String {
    let snapshot = &report.stats;
    let stats = &snapshot.stats;
    let mut out = String::new();

    // Writing into a String cannot fail
    let _ = writeln!(out, "==================== HARVEST SUMMARY ====================");
    let _ = writeln!(out, "Run id:               {}", report.run_id);
    let _ = writeln!(out, "Duration:             {:.2}s", snapshot.elapsed_secs);
    let _ = writeln!(out, "Topology:             {}", report.topology);
    let _ = writeln!(
        out,
        "Requests:             {} total ({} discovery, {} detail)",
        stats.total_requests, stats.discovery_requests, stats.detail_requests
    );
    let _ = writeln!(
        out,
        "Throughput:           {:.2} req/s, {:.2} items/s",
        stats.requests_per_second, stats.items_per_second
    );
    let _ = writeln!(
        out,
        "Listing pages:        {} visited, {} failed over {} categories",
        report.discovery.pages_visited,
        report.discovery.pages_failed,
        report.discovery.categories_visited
    );
    let _ = writeln!(out, "Items discovered:     {}", stats.items_discovered);
    let _ = writeln!(out, "Items completed:      {}", stats.items_completed);
    let _ = writeln!(out, "Items failed:         {}", stats.items_failed);
    let _ = writeln!(out, "Items dropped:        {}", stats.items_dropped);
    let _ = writeln!(out, "Rate limit hits:      {}", stats.rate_limit_hits);
    let _ = writeln!(out, "Success rate:         {:.1}%", snapshot.success_rate);
    let _ = writeln!(
        out,
        "Avg requests/recipe:  {:.2}",
        stats.requests_per_item()
    );
    let _ = writeln!(
        out,
        "Avg time/recipe:      {:.2}s wall, {:.2}s per worker",
        stats.secs_per_item(),
        stats.worker_secs_per_item()
    );

    if !stats.per_worker.is_empty() {
        let _ = writeln!(out, "Workers:");
        for worker in stats.per_worker.values() {
            let _ = writeln!(
                out,
                "  #{:<3} {} requests, {} recipes in {:.2}s",
                worker.id,
                worker.requests_handled,
                worker.items_processed,
                worker.duration_secs()
            );
        }
    }

    if !report.task_failures.is_empty() {
        let _ = writeln!(out, "Abnormal task exits:");
        for failure in &report.task_failures {
            let _ = writeln!(out, "  - {failure}");
        }
    }

    out.push_str("=========================================================");
    out
}
