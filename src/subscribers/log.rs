//! # LogWriter — simple event printer
//!
//! A minimal subscriber that prints incoming [`Event`]s to stdout.
//! Use it for test or demo.
//!
//! ## Example output
//! ```text
//! [registered] device="sensor-7" timeout_ms=Some(1260000)
//! [last-chance] device="sensor-7" grace_ms=Some(30000)
//! [timed-out] device="sensor-7"
//! [poll-scheduled] device="sensor-7" period_ms=Some(300000) first_ms=Some(412000)
//! [link-state] state=offline
//! [reconnect-attempt] attempt=Some(3)
//! [shutdown-requested]
//! [all-stopped-within-grace]
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
///
/// Enabled via the `logging` feature. Prints human-readable event lines to
/// stdout for debugging and demos; implement a custom [`Subscribe`] for
/// structured logging or metrics collection.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        match e.kind {
            EventKind::DeviceRegistered => {
                println!(
                    "[registered] device={:?} timeout_ms={:?}",
                    e.device, e.timeout_ms
                );
            }
            EventKind::LastChanceEntered => {
                println!("[last-chance] device={:?} grace_ms={:?}", e.device, e.delay_ms);
            }
            EventKind::DeviceTimedOut => {
                println!("[timed-out] device={:?}", e.device);
            }
            EventKind::DeviceUnregistered => {
                println!("[unregistered] device={:?}", e.device);
            }
            EventKind::CallbackFailed => {
                println!("[callback-failed] device={:?} err={:?}", e.device, e.reason);
            }
            EventKind::CallbackPanicked => {
                println!(
                    "[callback-panicked] device={:?} info={:?}",
                    e.device, e.reason
                );
            }
            EventKind::PollScheduled => {
                println!(
                    "[poll-scheduled] device={:?} period_ms={:?} first_ms={:?}",
                    e.device, e.delay_ms, e.timeout_ms
                );
            }
            EventKind::PollFailed => {
                println!("[poll-failed] device={:?} err={:?}", e.device, e.reason);
            }
            EventKind::LinkStateChanged => {
                let state = e.link_state.map(|s| s.as_label()).unwrap_or("unknown");
                println!("[link-state] state={state}");
            }
            EventKind::ReconnectScheduled => {
                println!("[reconnect-scheduled]");
            }
            EventKind::ReconnectAttempted => {
                println!("[reconnect-attempt] attempt={:?}", e.attempt);
            }
            EventKind::ReconnectFailed => {
                println!(
                    "[reconnect-failed] attempt={:?} err={:?}",
                    e.attempt, e.reason
                );
            }
            EventKind::ReconnectSkipped => {
                println!("[reconnect-skipped] reason={:?}", e.reason);
            }
            EventKind::ReconnectStopped => {
                println!("[reconnect-stopped] reason={:?}", e.reason);
            }
            EventKind::ShutdownRequested => {
                println!("[shutdown-requested]");
            }
            EventKind::AllStoppedWithin => {
                println!("[all-stopped-within-grace]");
            }
            EventKind::GraceExceeded => {
                println!("[grace-exceeded]");
            }
            EventKind::SubscriberOverflow => {
                println!(
                    "[subscriber-overflow] subscriber={:?} reason={:?}",
                    e.device, e.reason
                );
            }
            EventKind::SubscriberPanicked => {
                println!(
                    "[subscriber-panicked] subscriber={} info={}",
                    e.device.as_deref().unwrap_or("unknown"),
                    e.reason.as_deref().unwrap_or("unknown"),
                );
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
