//! # Interval resolution for one device.
//!
//! [`IntervalResolver`] reduces the interval proposals of all channels on a
//! device into one [`DeviceSchedule`]. It is parameterized by:
//! - [`Config::timeout_factor`](crate::Config::timeout_factor) the multiplier widening the liveness window;
//! - [`Config::timeout_margin`](crate::Config::timeout_margin) the additive slack for scheduling jitter;
//! - per-class [`PollLimits`] clamping the poll period.
//!
//! The liveness window is derived from the **tightest** channel bound: a
//! device must be at least as alive as its most frequently reporting channel
//! claims, or silence could go undetected for the slowest channel's full
//! interval. This is deliberately conservative.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use meshvisor::{Config, DeviceClass, IntervalProposal, IntervalResolver};
//!
//! let resolver = IntervalResolver::new(&Config::default());
//!
//! let proposals = [
//!     IntervalProposal::reporting(Duration::from_secs(30), Duration::from_secs(600)),
//!     IntervalProposal::polling(Duration::from_secs(300)),
//! ];
//!
//! let schedule = resolver.resolve(DeviceClass::Mains, &proposals).unwrap();
//!
//! // tightest bound is 300s; default widening is ×2 + 30s
//! assert_eq!(schedule.liveness_timeout, Duration::from_secs(630));
//! assert_eq!(schedule.poll_period, Duration::from_secs(300));
//! ```

use std::sync::Mutex;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::Config;
use crate::devices::{DeviceClass, IntervalProposal};
use crate::schedule::limits::PollLimits;

/// Resolved schedule for one device.
///
/// Produced by [`IntervalResolver::resolve`]; consumed by the liveness
/// tracker (`liveness_timeout`) and the poller (`poll_period`,
/// `first_poll_delay`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceSchedule {
    /// Silence budget handed to the liveness tracker.
    pub liveness_timeout: Duration,
    /// Steady-state fallback poll period (clamped per device class).
    pub poll_period: Duration,
    /// Delay before the first poll; jittered into the second period so
    /// same-period devices spread across a full window.
    pub first_poll_delay: Duration,
}

/// Reduces per-channel interval proposals to one schedule per device.
///
/// Cheap to share behind an `Arc`; the only interior state is the jitter
/// generator (seedable for deterministic tests).
#[derive(Debug)]
pub struct IntervalResolver {
    factor: u32,
    margin: Duration,
    mains: PollLimits,
    battery: PollLimits,
    rng: Mutex<StdRng>,
}

impl IntervalResolver {
    /// Creates a resolver from global config.
    ///
    /// With [`Config::jitter_seed`](crate::Config::jitter_seed) set, first-fire jitter becomes
    /// reproducible; otherwise the generator is seeded from the OS.
    pub fn new(cfg: &Config) -> Self {
        let rng = match cfg.jitter_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            factor: cfg.timeout_factor,
            margin: cfg.timeout_margin,
            mains: cfg.mains_limits,
            battery: cfg.battery_limits,
            rng: Mutex::new(rng),
        }
    }

    /// Resolves all channel proposals of one device into a schedule.
    ///
    /// ### Algorithm
    /// 1. Per channel, take `reporting_max` if present, else `poll_fallback`;
    ///    drop zero/missing values. No candidates ⇒ no schedule (`None`).
    /// 2. `liveness_timeout = min(candidates) × factor + margin`.
    /// 3. Poll period: `min` over positive `poll_fallback`s; if no channel
    ///    proposes one, fall back to the timeout candidate minimum (polling
    ///    at the reporting cadence). Clamp per device class.
    /// 4. First fire: `poll_period + uniform(0..poll_period)`.
    pub fn resolve(
        &self,
        class: DeviceClass,
        proposals: &[IntervalProposal],
    ) -> Option<DeviceSchedule> {
        let raw_timeout = proposals
            .iter()
            .filter_map(|p| p.reporting_max.or(p.poll_fallback))
            .filter(|d| !d.is_zero())
            .min()?;

        let liveness_timeout = raw_timeout
            .checked_mul(self.factor)
            .and_then(|d| d.checked_add(self.margin))
            .unwrap_or(Duration::MAX);

        let raw_period = proposals
            .iter()
            .filter_map(|p| p.poll_fallback)
            .filter(|d| !d.is_zero())
            .min()
            .unwrap_or(raw_timeout);

        let limits = match class {
            DeviceClass::Mains => self.mains,
            DeviceClass::Battery => self.battery,
        };
        let poll_period = limits.clamp(raw_period);
        let first_poll_delay = poll_period
            .checked_add(self.jitter(poll_period))
            .unwrap_or(Duration::MAX);

        Some(DeviceSchedule {
            liveness_timeout,
            poll_period,
            first_poll_delay,
        })
    }

    /// Uniform random offset in `[0, period)`.
    fn jitter(&self, period: Duration) -> Duration {
        let ms = period.as_millis().min(u128::from(u64::MAX)) as u64;
        if ms == 0 {
            return Duration::ZERO;
        }
        let mut rng = self
            .rng
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Duration::from_millis(rng.random_range(0..ms))
    }
}
