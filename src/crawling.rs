//! # Harvest Pipeline
//!
//! Discovery feeds a bounded item queue, a fixed worker pool turns items
//! into records, and a single collector gathers them. The orchestrator owns
//! start-up and the ordered shutdown.

pub mod collector;
pub mod discovery;
pub mod orchestrator;
pub mod queues;
pub mod state;
pub mod topology;
pub mod workers;

pub use collector::{RecipeCollection, ResultCollector};
pub use discovery::{DiscoveryReport, DiscoverySettings, DiscoveryStage};
pub use orchestrator::{HarvestError, HarvestOrchestrator, HarvestReport};
pub use queues::{BoundedQueue, QueueError, QueueState};
pub use state::{GlobalStats, MetricsAggregator, StatsSnapshot, WorkerState};
pub use topology::{TopologyEstimate, detect_topology, estimate_worker_count};
pub use workers::{WorkerContext, WorkerError, WorkerPool};
