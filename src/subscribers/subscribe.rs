//! # Subscriber contract for runtime events.
//!
//! A [`Subscribe`] implementation is the host's window into the runtime:
//! registrations, escalations, poll outcomes, and link transitions all
//! arrive here as [`Event`]s. Typical subscribers persist availability
//! history or raise operator alerts when devices go quiet.
//!
//! Delivery happens on a dedicated worker per subscriber, fed from a
//! bounded lane owned by the
//! [`SubscriberSet`](crate::subscribers::SubscriberSet). A subscriber may
//! take its time without slowing anyone else down; the price is the lane
//! bound. While the worker is busy the lane fills, and once full, further
//! events are dropped for that subscriber and reported as
//! `SubscriberOverflow`.
//!
//! ## Example
//! ```
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use async_trait::async_trait;
//! use meshvisor::{Event, EventKind, LinkState, Subscribe};
//!
//! /// Feeds an operator panel with the number of coordinator link drops.
//! struct FlapCounter {
//!     drops: AtomicUsize,
//! }
//!
//! #[async_trait]
//! impl Subscribe for FlapCounter {
//!     async fn on_event(&self, event: &Event) {
//!         if event.kind == EventKind::LinkStateChanged
//!             && event.link_state == Some(LinkState::Offline)
//!         {
//!             self.drops.fetch_add(1, Ordering::Relaxed);
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str {
//!         "flap-counter"
//!     }
//!
//!     fn queue_capacity(&self) -> usize {
//!         32
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// A consumer of runtime events, attached at build time via
/// [`SupervisorBuilder::with_subscribers`](crate::SupervisorBuilder::with_subscribers).
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles one event.
    ///
    /// Runs on this subscriber's own worker task, so blocking here stalls
    /// only this subscriber's lane. A panic is caught, reported as
    /// `SubscriberPanicked`, and the worker moves on to the next event.
    async fn on_event(&self, event: &Event);

    /// Name used in fault reports (`SubscriberOverflow`, `SubscriberPanicked`).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// How many undelivered events this subscriber's lane may hold.
    ///
    /// `0` (the default) inherits the configured bus capacity
    /// ([`Config::bus_capacity`](crate::Config::bus_capacity)). Size this
    /// for the burstiest stream the subscriber has to ride out; a whole
    /// fleet escalating at once is the worst case.
    fn queue_capacity(&self) -> usize {
        0
    }
}
