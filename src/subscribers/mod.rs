//! # Event subscribers for the meshvisor runtime.
//!
//! This module provides the [`Subscribe`] trait and the fan-out machinery
//! for handling runtime events broadcast through the [`Bus`](crate::events::Bus).
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   engines ── publish(Event) ──► Bus ──► subscriber_listener (Supervisor)
//!                                              │
//!                                              ▼
//!                                        SubscriberSet
//!                                    ┌────────┼─────────┐
//!                                    ▼        ▼         ▼
//!                                LogWriter  Metrics   Custom...
//! ```
//!
//! ## Implementing custom subscribers
//! ```no_run
//! use meshvisor::{Event, EventKind, Subscribe};
//! use async_trait::async_trait;
//!
//! struct TimeoutCounter;
//!
//! #[async_trait]
//! impl Subscribe for TimeoutCounter {
//!     async fn on_event(&self, event: &Event) {
//!         if event.kind == EventKind::DeviceTimedOut {
//!             // increment a counter
//!         }
//!     }
//! }
//! ```

mod set;
mod subscribe;

pub use set::SubscriberSet;
pub use subscribe::Subscribe;

#[cfg(feature = "logging")]
mod log;
#[cfg(feature = "logging")]
pub use log::LogWriter;
