//! # Coordinator link boundary.
//!
//! This module defines the seam between the supervision core and the
//! physical coordinator link:
//! - [`NetworkLink`] - trait the protocol layer implements (teardown/bring-up)
//! - [`LinkRef`] - shared reference to a link (`Arc<dyn NetworkLink>`)
//! - [`LinkState`] - the four-state link machine
//! - [`CoordinatorLifecycle`] - host-owned lifecycle gating reconnects

mod network;
mod state;

pub use network::{LinkRef, NetworkLink};
pub use state::{CoordinatorLifecycle, LinkState};
