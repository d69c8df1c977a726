//! Trace-driven simulator for a set-associative, write-back, LRU cache.
//!
//! Feed [`Access`] records to a [`Cache`] built from a validated
//! [`CacheConfig`], then read the counters back with [`Cache::stats`].

pub mod addr;
pub mod cache;
pub mod config;
pub mod lru;
pub mod stats;
pub mod trace;

pub use cache::{AccessOutcome, Cache};
pub use config::{CacheConfig, ConfigError};
pub use stats::{CacheStats, StatsReport};
pub use trace::{Access, AccessKind, Trace, TraceError};
