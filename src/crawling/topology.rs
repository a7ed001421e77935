//! Worker pool sizing from host topology
//!
//! The physical core count is a guess: the host only reports schedulable
//! contexts, so common hyperthreaded layouts are mapped through a lookup
//! table. Treat the result as approximate.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a worker count was derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyEstimate {
    /// Execution contexts reported by the host
    pub logical: usize,
    /// Estimated physical cores
    pub physical: usize,
    /// Workers per physical core
    pub ratio: usize,
    /// Final pool size after clamping
    pub workers: usize,
}

impl fmt::Display for TopologyEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} logical / ~{} physical cores, ratio {}x -> {} workers",
            self.logical, self.physical, self.ratio, self.workers
        )
    }
}

/// Physical core estimate for a logical context count
pub fn physical_cores_for(logical: usize) -> usize {
    match logical {
        0 => 0,
        1 => 1,
        2 => 2,
        4 => 2,
        6 => 6,
        8 => 4,
        12 => 6,
        16 => 8,
        24 => 12,
        32 => 16,
        n if n % 2 == 0 => n / 2,
        n => n,
    }
}

/// Workers per physical core: weak hosts get more, large hosts fewer
pub fn adaptive_ratio(physical: usize) -> usize {
    match physical {
        0..=2 => 3,
        3..=8 => 2,
        _ => 1,
    }
}

/// Derive a pool size from a reported context count
pub fn estimate_for_logical(logical: i64, min_workers: usize, max_workers: usize) -> TopologyEstimate {
    let clamp = |workers: usize| workers.max(min_workers).min(max_workers).max(1);

    let Ok(logical) = usize::try_from(logical) else {
        return TopologyEstimate {
            logical: 0,
            physical: 0,
            ratio: 0,
            workers: clamp(min_workers),
        };
    };

    match logical {
        0 => TopologyEstimate {
            logical,
            physical: 0,
            ratio: 0,
            workers: clamp(min_workers),
        },
        // A single context is never oversubscribed
        1 => TopologyEstimate {
            logical,
            physical: 1,
            ratio: 1,
            workers: clamp(1),
        },
        _ => {
            let physical = physical_cores_for(logical);
            let ratio = adaptive_ratio(physical);
            TopologyEstimate {
                logical,
                physical,
                ratio,
                workers: clamp(physical.saturating_mul(ratio)),
            }
        }
    }
}

/// Inspect the host and size the worker pool
pub fn detect_topology(min_workers: usize, max_workers: usize) -> TopologyEstimate {
    let logical = std::thread::available_parallelism()
        .map(|n| i64::try_from(n.get()).unwrap_or(i64::MAX))
        .unwrap_or(0);
    estimate_for_logical(logical, min_workers, max_workers)
}

/// Worker count for this host within `[min_workers, max_workers]`
pub fn estimate_worker_count(min_workers: usize, max_workers: usize) -> usize {
    detect_topology(min_workers, max_workers).workers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_table() {
        let table = [(1, 1), (2, 2), (4, 2), (6, 6), (8, 4), (12, 6), (16, 8), (24, 12), (32, 16)];
        for (logical, physical) in table {
            assert_eq!(physical_cores_for(logical), physical, "logical={logical}");
        }
        assert_eq!(physical_cores_for(10), 5);
        assert_eq!(physical_cores_for(7), 7);
    }

    #[test]
    fn test_adaptive_ratio_steps() {
        assert_eq!(adaptive_ratio(1), 3);
        assert_eq!(adaptive_ratio(2), 3);
        assert_eq!(adaptive_ratio(3), 2);
        assert_eq!(adaptive_ratio(8), 2);
        assert_eq!(adaptive_ratio(9), 1);
    }

    #[test]
    fn test_typical_hosts() {
        assert_eq!(estimate_for_logical(8, 1, 100).workers, 8);
        assert_eq!(estimate_for_logical(4, 1, 100).workers, 6);
        assert_eq!(estimate_for_logical(32, 1, 100).workers, 16);
        assert_eq!(estimate_for_logical(32, 1, 10).workers, 10);
        assert_eq!(estimate_for_logical(2, 20, 100).workers, 20);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert_eq!(estimate_for_logical(1, 1, 100).workers, 1);
        assert_eq!(estimate_for_logical(0, 3, 100).workers, 3);
        assert_eq!(estimate_for_logical(-4, 2, 100).workers, 2);
    }

    #[test]
    fn test_host_detection_within_bounds() {
        let workers = estimate_worker_count(2, 5);
        assert!((2..=5).contains(&workers));
    }
}
