//! # Interval resolution policies.
//!
//! This module reduces raw per-channel interval proposals into the single
//! schedule the engines consume:
//! - [`IntervalResolver`] - min-reduction, timeout widening, clamp, jitter
//! - [`DeviceSchedule`] - the resolved output (timeout, period, first fire)
//! - [`PollLimits`] - per-class clamp window for poll periods

mod limits;
mod resolver;

pub use limits::PollLimits;
pub use resolver::{DeviceSchedule, IntervalResolver};
