//! # Per-channel interval proposals.
//!
//! Defines [`IntervalProposal`], the raw scheduling input one device channel
//! contributes before resolution. A device usually yields several proposals
//! (one per reportable channel plus one per poll-only channel); the resolver
//! reduces them to a single schedule.
//!
//! ## Rules
//! - `reporting_max` is the channel's worst-case silence: "if healthy, this
//!   channel reports at least once per `reporting_max`".
//! - `poll_fallback` is the desired poll period for channels that cannot
//!   report on their own.
//! - Zero durations are meaningless here and are dropped during resolution.

use std::time::Duration;

/// Scheduling input contributed by one device channel.
///
/// Built with [`IntervalProposal::reporting`] for channels with configured
/// periodic reporting, or [`IntervalProposal::polling`] for channels that
/// must be actively read.
///
/// ## Example
/// ```rust
/// use std::time::Duration;
/// use meshvisor::IntervalProposal;
///
/// let temp = IntervalProposal::reporting(
///     Duration::from_secs(30),
///     Duration::from_secs(600),
/// );
/// let meter = IntervalProposal::polling(Duration::from_secs(300));
///
/// assert_eq!(temp.reporting_max, Some(Duration::from_secs(600)));
/// assert_eq!(meter.poll_fallback, Some(Duration::from_secs(300)));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalProposal {
    /// Fastest the channel is configured to report (informational).
    pub reporting_min: Option<Duration>,
    /// Slowest the channel is configured to report; the liveness candidate.
    pub reporting_max: Option<Duration>,
    /// Desired poll period for channels without autonomous reporting.
    pub poll_fallback: Option<Duration>,
}

impl IntervalProposal {
    /// Proposal from a channel with configured periodic reporting.
    pub fn reporting(min: Duration, max: Duration) -> Self {
        Self {
            reporting_min: Some(min),
            reporting_max: Some(max),
            poll_fallback: None,
        }
    }

    /// Proposal from a poll-only channel.
    pub fn polling(period: Duration) -> Self {
        Self {
            reporting_min: None,
            reporting_max: None,
            poll_fallback: Some(period),
        }
    }
}
