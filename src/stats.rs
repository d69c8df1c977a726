use std::fmt;

use serde::Serialize;

use crate::{
    cache::AccessOutcome,
    config::{CacheConfig, Geometry},
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub accesses: u64,
    pub hits: u64,
    pub misses: u64,
    pub writebacks: u64,
}

impl CacheStats {
    pub fn record(&mut self, outcome: AccessOutcome) {
        self.accesses += 1;
        match outcome {
            AccessOutcome::Hit => self.hits += 1,
            AccessOutcome::Miss => self.misses += 1,
            AccessOutcome::MissWithWriteback => {
                self.misses += 1;
                self.writebacks += 1;
            }
        }
    }

    pub fn miss_rate(&self) -> f64 {
        if self.accesses == 0 {
            0.0
        } else {
            self.misses as f64 / self.accesses as f64
        }
    }
}

/// `accesses, hits, misses, writebacks`, the line downstream tools parse.
impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {}, {}, {}",
            self.accesses, self.hits, self.misses, self.writebacks
        )
    }
}

#[derive(Debug, Serialize)]
pub struct StatsReport {
    config: CacheConfig,
    geometry: Geometry,
    #[serde(flatten)]
    stats: CacheStats,
    miss_rate: f64,
}

impl StatsReport {
    pub fn new(config: CacheConfig, stats: CacheStats) -> Self {
        StatsReport {
            config,
            geometry: config.geometry(),
            stats,
            miss_rate: stats.miss_rate(),
        }
    }
}
