//! # Link state machine and coordinator lifecycle.
//!
//! [`LinkState`] is the observable state of the coordinator link, reported by
//! the protocol layer and mirrored by the link supervisor. [`CoordinatorLifecycle`]
//! is the host-owned lifecycle of the coordinator itself; anything but
//! [`Ready`](CoordinatorLifecycle::Ready) disqualifies reconnect scheduling.

/// Observable state of the coordinator link.
///
/// Transitions are reported by the protocol layer via
/// [`LinkSupervisor::on_state_changed`](crate::LinkSupervisor::on_state_changed):
///
/// ```text
/// Uninitialized ──► Initializing ──► Online
///                        │             │
///                        ▼             ▼
///                      Offline ◄───────┘
///                        │  ▲
///                        ▼  │ (reconnect loop: teardown + bring-up)
///                   Initializing
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Link startup has not been requested yet.
    Uninitialized,
    /// Link bring-up is in flight; timers stay deferred.
    Initializing,
    /// Link is up; reconnect machinery is idle.
    Online,
    /// Link is down; the reconnect loop runs until recovery.
    Offline,
}

impl LinkState {
    /// Returns stable snake_case state label (for logs).
    pub fn as_label(&self) -> &'static str {
        match self {
            LinkState::Uninitialized => "uninitialized",
            LinkState::Initializing => "initializing",
            LinkState::Online => "online",
            LinkState::Offline => "offline",
        }
    }
}

/// Host-owned lifecycle of the coordinator device.
///
/// The link supervisor consults this before scheduling reconnects: a
/// coordinator that is not yet initialized, being removed, or already removed
/// must not have its link brought back up underneath the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorLifecycle {
    /// Created but not started.
    New,
    /// Operational; reconnects are allowed.
    Ready,
    /// Teardown in progress.
    Removing,
    /// Gone; terminal.
    Removed,
}

impl CoordinatorLifecycle {
    /// Whether this lifecycle stage permits reconnect scheduling.
    pub fn allows_reconnect(&self) -> bool {
        matches!(self, CoordinatorLifecycle::Ready)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_ready_allows_reconnect() {
        assert!(CoordinatorLifecycle::Ready.allows_reconnect());
        assert!(!CoordinatorLifecycle::New.allows_reconnect());
        assert!(!CoordinatorLifecycle::Removing.allows_reconnect());
        assert!(!CoordinatorLifecycle::Removed.allows_reconnect());
    }

    #[test]
    fn test_state_labels_are_stable() {
        assert_eq!(LinkState::Online.as_label(), "online");
        assert_eq!(LinkState::Offline.as_label(), "offline");
    }
}
