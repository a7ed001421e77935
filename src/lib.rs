//! Recipe Harvester
//!
//! Concurrent discovery and extraction of recipe pages from category
//! listings, written out as a JSON collection with run statistics.

pub mod crawling;
pub mod domain;
pub mod infrastructure;

#[cfg(test)]
pub(crate) mod test_utils;

pub use crawling::{HarvestError, HarvestOrchestrator, HarvestReport};
pub use domain::{DiscoveredItem, Recipe};
pub use infrastructure::AppConfig;
