//! # Physical link boundary.
//!
//! [`NetworkLink`] is the seam the protocol layer implements. The link
//! supervisor drives the link through this trait: read its current state,
//! tear the link down, bring it back up. Teardown and bring-up may be slow
//! (serial port resets, firmware handshakes) and are therefore invoked from
//! dedicated tasks, never from the state-notification path.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::LinkError;
use crate::link::LinkState;

/// Shared reference to a link (`Arc<dyn NetworkLink>`).
pub type LinkRef = Arc<dyn NetworkLink>;

/// # Physical coordinator link.
///
/// Implemented by the protocol layer; consumed by
/// [`LinkSupervisor`](crate::LinkSupervisor). State normally flows the other
/// way: the protocol layer reports transitions through
/// [`LinkSupervisor::on_state_changed`](crate::LinkSupervisor::on_state_changed)
/// and the supervisor keeps its own view. [`state`](NetworkLink::state) is
/// the ground truth the reconnect loop consults before each attempt, so a
/// recovery whose report was lost still stops reconnection.
///
/// ## Rules
/// - [`state`](NetworkLink::state) must be cheap; the supervisor calls it on
///   every reconnect tick.
/// - [`teardown`](NetworkLink::teardown) and
///   [`reinitialize`](NetworkLink::reinitialize) may block for seconds; the
///   supervisor calls them from reconnect tasks only.
/// - `reinitialize` reports completion through the normal state-notification
///   channel (`Online` on success, `Offline` on failure), not through its
///   return value alone.
#[async_trait]
pub trait NetworkLink: Send + Sync + 'static {
    /// Returns the link's own view of its state.
    fn state(&self) -> LinkState;

    /// Tears the physical link down (close ports, drop sessions).
    async fn teardown(&self) -> Result<(), LinkError>;

    /// Brings the physical link back up from scratch.
    async fn reinitialize(&self) -> Result<(), LinkError>;
}
