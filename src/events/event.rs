//! # Runtime events emitted by the supervision engines.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Liveness events**: per-device escalation flow (registered, last
//!   chance, timed out, unregistered)
//! - **Poll events**: fallback polling activity (scheduled, failed)
//! - **Link events**: coordinator state transitions and reconnect activity
//! - **Runtime events**: shutdown progress and subscriber faults
//!
//! The [`Event`] struct carries additional metadata such as timestamps,
//! device ids, reasons, attempt counters and durations.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically. Use `seq` to restore the exact order when events are
//! delivered out of order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use meshvisor::{Event, EventKind};
//!
//! let ev = Event::now(EventKind::DeviceTimedOut)
//!     .with_device("sensor-7")
//!     .with_timeout(Duration::from_secs(150));
//!
//! assert_eq!(ev.kind, EventKind::DeviceTimedOut);
//! assert_eq!(ev.device.as_deref(), Some("sensor-7"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::link::LinkState;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Liveness events ===
    /// A device entered supervision (or was re-armed with a new budget).
    ///
    /// Sets:
    /// - `device`: device id
    /// - `timeout_ms`: liveness window handed to the tracker (ms)
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    DeviceRegistered,

    /// A device exhausted its silence budget and entered the last-chance
    /// stage; a proactive re-poll is its one way back to normal.
    ///
    /// Sets:
    /// - `device`: device id
    /// - `delay_ms`: the grace window now running (ms)
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    LastChanceEntered,

    /// A device stayed silent through its grace window and was dropped from
    /// supervision; the device layer owns marking it unreachable.
    ///
    /// Sets:
    /// - `device`: device id
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    DeviceTimedOut,

    /// A device left supervision (explicit unregister).
    ///
    /// Sets:
    /// - `device`: device id
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    DeviceUnregistered,

    /// A device callback returned an error during escalation.
    ///
    /// Sets:
    /// - `device`: device id
    /// - `reason`: failure message
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    CallbackFailed,

    /// A device callback panicked (escalation callback or poll). Stage and
    /// schedule bookkeeping had already completed; the panic is isolated to
    /// the calling task.
    ///
    /// Sets:
    /// - `device`: device id
    /// - `reason`: panic info/message
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    CallbackPanicked,

    // === Poll events ===
    /// A fallback poll schedule was installed for a device.
    ///
    /// Sets:
    /// - `device`: device id
    /// - `delay_ms`: poll period (ms)
    /// - `timeout_ms`: jittered first-fire delay (ms)
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    PollScheduled,

    /// A poll attempt failed or timed out; the schedule continues.
    ///
    /// Sets:
    /// - `device`: device id
    /// - `reason`: failure message
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    PollFailed,

    // === Link events ===
    /// The coordinator link reported a state transition.
    ///
    /// Sets:
    /// - `link_state`: the newly observed state
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    LinkStateChanged,

    /// The reconnect loop was scheduled (first qualifying OFFLINE).
    ///
    /// Sets:
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    ReconnectScheduled,

    /// One serialized reconnect attempt began (teardown + bring-up).
    ///
    /// Sets:
    /// - `attempt`: attempt number (1-based, monotonic per supervisor)
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    ReconnectAttempted,

    /// A reconnect attempt failed; the loop retries on its next tick.
    ///
    /// Sets:
    /// - `attempt`: attempt number
    /// - `reason`: failure message
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    ReconnectFailed,

    /// An OFFLINE observation was intentionally ignored (firmware update in
    /// progress, or the coordinator is in a terminal lifecycle state).
    ///
    /// Sets:
    /// - `reason`: which condition disqualified the transition
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    ReconnectSkipped,

    /// The reconnect loop exited (link recovered or supervisor stopping).
    ///
    /// Sets:
    /// - `reason`: why the loop exited
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    ReconnectStopped,

    // === Runtime events ===
    /// Supervisor stop requested.
    ///
    /// Sets:
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    ShutdownRequested,

    /// All workers stopped within the configured grace period.
    ///
    /// Sets:
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    AllStoppedWithin,

    /// Grace period exceeded; some workers did not stop in time.
    ///
    /// Sets:
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    GraceExceeded,

    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `device`: subscriber name
    /// - `reason`: panic info/message
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    SubscriberPanicked,

    /// Subscriber or internal listener dropped events (queue full, worker
    /// closed, or broadcast lag).
    ///
    /// Sets:
    /// - `device`: subscriber/listener name
    /// - `reason`: reason string (e.g., "full", "closed", "lagged")
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    SubscriberOverflow,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,

    /// Device id (or subscriber name for subscriber fault events).
    pub device: Option<Arc<str>>,
    /// Human-readable reason (errors, skip causes, overflow details).
    pub reason: Option<Arc<str>>,
    /// Reconnect attempt counter (starting from 1).
    pub attempt: Option<u64>,
    /// Liveness window or first-fire delay in milliseconds (compact).
    pub timeout_ms: Option<u64>,
    /// Grace window or poll period in milliseconds (compact).
    pub delay_ms: Option<u64>,
    /// Newly observed link state (link events only).
    pub link_state: Option<LinkState>,
    /// Event classification.
    pub kind: EventKind,
}

impl Event {
    /// Creates a new event of the given kind with the current timestamp and
    /// the next global sequence number.
    pub fn now(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            device: None,
            reason: None,
            attempt: None,
            timeout_ms: None,
            delay_ms: None,
            link_state: None,
            kind,
        }
    }

    /// Attaches a device id (or subscriber name for fault events).
    #[inline]
    pub fn with_device(mut self, device: impl Into<Arc<str>>) -> Self {
        self.device = Some(device.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a reconnect attempt counter.
    #[inline]
    pub fn with_attempt(mut self, n: u64) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a timeout duration (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        self.timeout_ms = Some(Self::to_ms(d));
        self
    }

    /// Attaches a delay/period duration (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(Self::to_ms(d));
        self
    }

    /// Attaches the newly observed link state.
    #[inline]
    pub fn with_link_state(mut self, state: LinkState) -> Self {
        self.link_state = Some(state);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::now(EventKind::SubscriberOverflow)
            .with_device(subscriber)
            .with_reason(reason)
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::now(EventKind::SubscriberPanicked)
            .with_device(subscriber)
            .with_reason(info)
    }

    #[inline]
    fn to_ms(d: Duration) -> u64 {
        d.as_millis().min(u128::from(u64::MAX)) as u64
    }
}
