//! # Global runtime configuration.
//!
//! Provides [`Config`], the centralized settings for the supervision runtime.
//! Everything here is process-wide and fixed at startup; nothing is tuned
//! per-device (per-device behavior comes from the intervals the device's own
//! channels propose).
//!
//! Config is used in two ways:
//! 1. **Supervisor creation**: `Supervisor::builder(config)`
//! 2. **Resolver construction**: `IntervalResolver::new(&config)`
//!
//! ## Sentinel values
//! - `max_concurrent_polls = 0` → unlimited (no global semaphore created)
//! - `poll_timeout = 0s` → no per-poll timeout
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use meshvisor::Config;
//!
//! let mut cfg = Config::default();
//! cfg.last_chance_grace = Duration::from_secs(20);
//! cfg.reconnect_period = Duration::from_secs(3);
//! cfg.max_concurrent_polls = 4;
//!
//! assert_eq!(cfg.concurrency_limit(), Some(4));
//! ```

use std::time::Duration;

use crate::schedule::PollLimits;

/// Global configuration for the supervision runtime.
///
/// Defines:
/// - **Liveness escalation**: last-chance grace, timeout factor and margin
/// - **Poll scheduling**: per-class clamp ranges, concurrency cap, poll timeout
/// - **Reconnect behavior**: fixed loop period
/// - **Shutdown behavior**: grace period for graceful termination
/// - **Event system**: bus capacity for event delivery
///
/// ## Field semantics
/// - `last_chance_grace`: the fixed window a silent device gets after the
///   first escalation, independent of its own interval
/// - `timeout_factor` / `timeout_margin`: `timeout = tightest_interval *
///   factor + margin`
/// - `mains_limits` / `battery_limits`: poll-period clamp per device class
/// - `reconnect_period`: tick period of the coordinator reconnect loop
/// - `max_concurrent_polls`: global poll concurrency (`0` = unlimited)
/// - `poll_timeout`: per-poll attempt cap (`0s` = none)
/// - `grace`: wait bound for worker teardown (`stop()`, unregister, replace)
/// - `bus_capacity`: event bus ring buffer size (min 1; clamped by the bus)
/// - `jitter_seed`: fixed seed for the first-fire jitter (`None` = entropy)
#[derive(Clone, Debug)]
pub struct Config {
    /// Fixed grace window granted after the first (last-chance) escalation.
    ///
    /// Independent of the device's own expected interval: once a device has
    /// been silent for its full budget, it gets exactly this long to answer
    /// the proactive re-poll before being declared unreachable.
    pub last_chance_grace: Duration,

    /// Multiplier applied to the tightest channel interval when sizing the
    /// liveness window. Compensates for reports that are merely delayed or
    /// dropped once.
    pub timeout_factor: u32,

    /// Constant added on top of the multiplied interval to absorb scheduling
    /// jitter on both ends of the radio.
    pub timeout_margin: Duration,

    /// Poll-period clamp for mains-powered (full-function) devices.
    pub mains_limits: PollLimits,

    /// Poll-period clamp for battery-powered (reduced-function) devices.
    ///
    /// The much longer ceiling keeps sleepy end-devices from being woken
    /// more often than their power budget allows.
    pub battery_limits: PollLimits,

    /// Tick period of the coordinator reconnect loop.
    ///
    /// Each tick performs at most one serialized reconnect attempt; the loop
    /// runs until the link reports online or the supervisor stops.
    pub reconnect_period: Duration,

    /// Maximum number of devices polled simultaneously (`0` = unlimited).
    ///
    /// All polls go through one shared radio coordinator; capping them keeps
    /// the coordinator's request queue shallow.
    pub max_concurrent_polls: usize,

    /// Per-poll attempt timeout (`Duration::ZERO` = no timeout).
    pub poll_timeout: Duration,

    /// Maximum time to wait for workers to stop during [`stop`].
    ///
    /// Also bounds how long an outgoing poll worker may sit in a hung
    /// device poll when its device is unregistered or re-registered
    /// before the worker is aborted.
    ///
    /// [`stop`]: crate::Supervisor::stop
    pub grace: Duration,

    /// Capacity of the event bus broadcast ring buffer.
    ///
    /// Slow subscribers that lag behind more than `bus_capacity` events
    /// observe `Lagged` and skip older items. Minimum value is 1.
    pub bus_capacity: usize,

    /// Fixed seed for first-fire poll jitter (`None` = OS entropy).
    ///
    /// A fixed seed makes the jittered schedule reproducible, which the
    /// deterministic tests rely on.
    pub jitter_seed: Option<u64>,
}

impl Config {
    /// Returns the global poll concurrency limit as an `Option`.
    ///
    /// - `None` → unlimited (no semaphore)
    /// - `Some(n)` → at most `n` concurrent polls
    #[inline]
    pub fn concurrency_limit(&self) -> Option<usize> {
        if self.max_concurrent_polls == 0 {
            None
        } else {
            Some(self.max_concurrent_polls)
        }
    }

    /// Returns the per-poll timeout as an `Option`.
    ///
    /// - `None` → no timeout
    /// - `Some(d)` → timeout applied per poll attempt
    #[inline]
    pub fn poll_timeout_opt(&self) -> Option<Duration> {
        if self.poll_timeout == Duration::ZERO {
            None
        } else {
            Some(self.poll_timeout)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `last_chance_grace = 30s`
    /// - `timeout_factor = 2`, `timeout_margin = 30s`
    /// - `mains_limits = 5s..=30min`, `battery_limits = 60s..=24h`
    /// - `reconnect_period = 5s`
    /// - `max_concurrent_polls = 0` (unlimited)
    /// - `poll_timeout = 0s` (no timeout)
    /// - `grace = 30s`
    /// - `bus_capacity = 1024`
    /// - `jitter_seed = None` (OS entropy)
    fn default() -> Self {
        Self {
            last_chance_grace: Duration::from_secs(30),
            timeout_factor: 2,
            timeout_margin: Duration::from_secs(30),
            mains_limits: PollLimits::new(Duration::from_secs(5), Duration::from_secs(1800)),
            battery_limits: PollLimits::new(Duration::from_secs(60), Duration::from_secs(86_400)),
            reconnect_period: Duration::from_secs(5),
            max_concurrent_polls: 0,
            poll_timeout: Duration::ZERO,
            grace: Duration::from_secs(30),
            bus_capacity: 1024,
            jitter_seed: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_helpers() {
        let mut cfg = Config::default();
        assert_eq!(cfg.concurrency_limit(), None);
        assert_eq!(cfg.poll_timeout_opt(), None);

        cfg.max_concurrent_polls = 3;
        cfg.poll_timeout = Duration::from_secs(2);
        assert_eq!(cfg.concurrency_limit(), Some(3));
        assert_eq!(cfg.poll_timeout_opt(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_bus_capacity_is_clamped() {
        let mut cfg = Config::default();
        cfg.bus_capacity = 0;
        assert_eq!(cfg.bus_capacity_clamped(), 1);
    }

    #[test]
    fn test_battery_ceiling_exceeds_mains() {
        let cfg = Config::default();
        assert!(cfg.battery_limits.max > cfg.mains_limits.max);
        assert!(cfg.battery_limits.min > cfg.mains_limits.min);
    }
}
