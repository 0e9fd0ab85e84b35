//! Collector policy: the record of how collection cycles concluded.

/// Cycle outcome counters, streaks and the shutdown latch.
pub mod collector_policy;

pub use self::collector_policy::{CollectorPolicy, DegenPoint};
