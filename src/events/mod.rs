//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to runtime events emitted by the liveness tracker, the
//! link supervisor, the poll workers and the subscriber workers.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `LivenessTracker`, `LinkSupervisor`, `Poller`,
//!   `Supervisor`, `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: `Supervisor`'s subscriber listener (fans out to
//!   `SubscriberSet`), and the `Poller`'s escalation listener.
//!
//! See `core/mod.rs` for the system-level wiring diagram.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
