//! # Fan-out of runtime events to attached subscribers.
//!
//! The [`SubscriberSet`] sits between the event bus and whatever the host
//! attached at build time: log writers, alert hooks, availability
//! recorders. Every subscriber gets a bounded lane and a worker draining
//! it, so a slow consumer degrades to sampling instead of stalling the
//! engines.
//!
//! ```text
//! bus pump ──► emit(event)            one Arc<Event>, shared by all lanes
//!                 │
//!                 ├──► lane "alerts" [■■ ] ──► worker ──► on_event
//!                 ├──► lane "log"    [■■■] ──► worker ──► on_event
//!                 └──► lane "audit"  [   ] ──► worker ──► on_event
//!                          full: drop + SubscriberOverflow on the bus
//! ```
//!
//! ## Delivery contract
//! - [`emit`](SubscriberSet::emit) never waits. A full lane costs exactly
//!   that subscriber the event; the drop surfaces as `SubscriberOverflow`.
//! - Each lane is FIFO, so one subscriber sees events in publish order.
//!   Two subscribers may be at different points of the stream.
//! - A panicking subscriber loses the event it was handling and nothing
//!   else; the panic surfaces as `SubscriberPanicked` and its lane keeps
//!   moving.
//! - Fault reports never breed fault reports: a `SubscriberOverflow` or
//!   `SubscriberPanicked` that itself fails to enqueue is dropped
//!   silently.
//!
//! `on_event` runs under `AssertUnwindSafe`. A subscriber that shares
//! mutable state across calls is responsible for keeping that state sane
//! when a call unwinds.

use std::any::Any;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::events::{Bus, Event, EventKind};
use crate::subscribers::Subscribe;

/// One attached subscriber: its feed plus the worker draining it.
struct Lane {
    name: &'static str,
    feed: mpsc::Sender<Arc<Event>>,
    worker: JoinHandle<()>,
}

/// Delivers runtime events to every attached subscriber without letting
/// any of them block the engines.
///
/// Built by the [`SupervisorBuilder`](crate::SupervisorBuilder); the
/// supervisor's bus pump is the only caller of [`emit`](Self::emit) in
/// normal operation.
pub struct SubscriberSet {
    lanes: Vec<Lane>,
    bus: Bus,
}

impl SubscriberSet {
    /// Opens one lane per subscriber and starts its worker.
    ///
    /// A subscriber whose [`queue_capacity`](Subscribe::queue_capacity) is
    /// zero inherits `default_depth`, the configured bus capacity.
    #[must_use]
    pub fn new(subscribers: Vec<Arc<dyn Subscribe>>, bus: Bus, default_depth: usize) -> Self {
        let lanes = subscribers
            .into_iter()
            .map(|sub| Self::open_lane(sub, &bus, default_depth))
            .collect();
        Self { lanes, bus }
    }

    fn open_lane(sub: Arc<dyn Subscribe>, bus: &Bus, default_depth: usize) -> Lane {
        let depth = match sub.queue_capacity() {
            0 => default_depth.max(1),
            n => n,
        };
        let (feed, rx) = mpsc::channel(depth);
        let name = sub.name();
        let worker = tokio::spawn(Self::drive(sub, rx, bus.clone()));
        Lane { name, feed, worker }
    }

    /// Worker loop for one lane: delivers events until the feed closes,
    /// turning subscriber panics into `SubscriberPanicked` reports.
    async fn drive(sub: Arc<dyn Subscribe>, mut rx: mpsc::Receiver<Arc<Event>>, bus: Bus) {
        while let Some(ev) = rx.recv().await {
            let delivery = std::panic::AssertUnwindSafe(sub.on_event(&ev)).catch_unwind();
            if let Err(payload) = delivery.await {
                bus.publish(Event::subscriber_panicked(sub.name(), panic_text(&*payload)));
            }
        }
    }

    /// Hands one event to every lane. Never waits.
    ///
    /// The event is wrapped in an `Arc` once and shared. A lane that
    /// cannot take it (full, or its worker torn down with the runtime)
    /// loses the event for that subscriber only, and the drop is reported
    /// on the bus unless the event is itself a fault report.
    pub fn emit(&self, event: Event) {
        let muted = is_fault_report(event.kind);
        let shared = Arc::new(event);

        for lane in &self.lanes {
            let refused = match lane.feed.try_send(Arc::clone(&shared)) {
                Ok(()) => continue,
                Err(TrySendError::Full(_)) => "full",
                Err(TrySendError::Closed(_)) => "closed",
            };
            if !muted {
                self.bus
                    .publish(Event::subscriber_overflow(lane.name, refused));
            }
        }
    }

    /// Closes every lane and waits for its worker to finish draining.
    pub async fn shutdown(self) {
        for lane in self.lanes {
            let Lane { feed, worker, .. } = lane;
            drop(feed);
            let _ = worker.await;
        }
    }
}

/// Reports about misbehaving subscribers must not breed further reports;
/// a persistently full lane would otherwise turn every drop into more bus
/// traffic.
fn is_fault_report(kind: EventKind) -> bool {
    matches!(
        kind,
        EventKind::SubscriberOverflow | EventKind::SubscriberPanicked
    )
}

fn panic_text(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "opaque panic payload".to_string())
}
