//! # Poll period clamp window.
//!
//! [`PollLimits`] bounds resolved poll periods per device class. Mains
//! powered devices tolerate tight polling; battery powered devices get a far
//! higher floor and ceiling so fallback polling does not drain them.

use std::time::Duration;

/// Inclusive clamp window for poll periods.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollLimits {
    /// Fastest allowed poll period.
    pub min: Duration,
    /// Slowest allowed poll period.
    pub max: Duration,
}

impl PollLimits {
    /// Creates a clamp window.
    ///
    /// If `min > max` the bounds are swapped rather than rejected, so a
    /// misconfigured window still yields a usable clamp.
    pub fn new(min: Duration, max: Duration) -> Self {
        if min > max {
            Self { min: max, max: min }
        } else {
            Self { min, max }
        }
    }

    /// Clamps a period into the window.
    pub fn clamp(&self, period: Duration) -> Duration {
        period.clamp(self.min, self.max)
    }
}
