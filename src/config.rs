//! # Global runtime configuration.
//!
//! Provides [`Config`], centralized settings shared by the direct tracker,
//! the built-in worker pool, and the keep-alive enqueuer.
//!
//! ## Defaults
//! The defaults mirror what a process manager expects from a well-behaved
//! background component: a short launch lease that outlives signal
//! delivery, a long processing lease renewed per drain run, and a small
//! elastic pool that shrinks back to one resident worker when idle.

use std::time::Duration;

/// Global configuration for the worklatch runtime.
///
/// ## Field semantics
/// - `bus_capacity`: event bus ring buffer size (min 1; clamped by `Bus`)
/// - `pool_resident_workers`: workers the pool never shrinks below
/// - `pool_max_workers`: hard cap on concurrent pool workers
/// - `pool_idle_timeout`: how long a surplus worker idles before exiting
/// - `launch_lease`: keep-alive window between signal delivery and drain start
/// - `processing_lease`: keep-alive window while a drain run is active
#[derive(Clone, Debug)]
pub struct Config {
    /// Capacity of the event bus broadcast channel ring buffer.
    ///
    /// Slow subscribers that lag behind more than `bus_capacity` events
    /// observe `Lagged` and skip older items. Minimum value is 1.
    pub bus_capacity: usize,

    /// Number of pool workers kept alive even when the backlog is empty.
    pub pool_resident_workers: usize,

    /// Maximum number of pool workers running concurrently.
    ///
    /// The backlog itself is unbounded; jobs beyond this cap queue and are
    /// never dropped.
    pub pool_max_workers: usize,

    /// How long a non-resident worker waits for new work before exiting.
    pub pool_idle_timeout: Duration,

    /// Timeout of the keep-alive lease acquired when a signal is delivered
    /// but processing has not started yet.
    pub launch_lease: Duration,

    /// Timeout of the keep-alive lease held while a drain run is active.
    pub processing_lease: Duration,
}

impl Config {
    /// Returns the bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Returns the worker cap clamped so it is never below the resident count.
    #[inline]
    pub fn pool_max_clamped(&self) -> usize {
        self.pool_max_workers.max(self.pool_resident_workers).max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `bus_capacity = 1024`
    /// - `pool_resident_workers = 1`
    /// - `pool_max_workers = 8`
    /// - `pool_idle_timeout = 30s`
    /// - `launch_lease = 60s`
    /// - `processing_lease = 10min`
    fn default() -> Self {
        Self {
            bus_capacity: 1024,
            pool_resident_workers: 1,
            pool_max_workers: 8,
            pool_idle_timeout: Duration::from_secs(30),
            launch_lease: Duration::from_secs(60),
            processing_lease: Duration::from_secs(10 * 60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.pool_resident_workers, 1);
        assert_eq!(cfg.pool_max_workers, 8);
        assert_eq!(cfg.pool_idle_timeout, Duration::from_secs(30));
        assert_eq!(cfg.launch_lease, Duration::from_secs(60));
        assert_eq!(cfg.processing_lease, Duration::from_secs(600));
    }

    #[test]
    fn pool_max_never_below_resident() {
        let cfg = Config {
            pool_resident_workers: 4,
            pool_max_workers: 2,
            ..Config::default()
        };
        assert_eq!(cfg.pool_max_clamped(), 4);
    }
}
