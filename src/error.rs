//! Error types used by the meshvisor runtime and its collaborators.
//!
//! This module defines three error enums:
//!
//! - [`SupervisorError`] — errors raised by the supervision runtime itself.
//! - [`DeviceError`] — errors raised by device-layer callbacks and polls.
//! - [`LinkError`] — errors raised by the coordinator link layer.
//!
//! All types provide helper methods (`as_label`, `as_message`) for
//! logs/metrics, and [`DeviceError`] additionally offers
//! [`is_retryable`](DeviceError::is_retryable).
//!
//! Nothing in this crate propagates a fatal error upward: silence timeouts,
//! failed polls, and failed reconnect attempts are all handled locally
//! (escalate, retry, publish). The enums below exist so that collaborators
//! can report failures in a typed way and so that the runtime can label them
//! consistently on the event bus.

use std::time::Duration;
use thiserror::Error;

/// # Errors produced by the supervision runtime.
///
/// These represent misuse of the runtime API or a shutdown sequence that
/// exceeded its grace period — not device or link failures, which are soft
/// and never surface as errors.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// A device was registered with a zero-length expected interval.
    #[error("device '{device}' registered with a non-positive interval")]
    InvalidInterval {
        /// Identity of the offending device.
        device: String,
    },

    /// Shutdown grace period was exceeded; some workers remained stuck.
    #[error("shutdown grace {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Device ids whose workers did not stop in time.
        stuck: Vec<String>,
    },

    /// `start` was called on a supervisor that is already running.
    #[error("supervisor already started")]
    AlreadyStarted,
}

impl SupervisorError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use meshvisor::SupervisorError;
    ///
    /// let err = SupervisorError::AlreadyStarted;
    /// assert_eq!(err.as_label(), "supervisor_already_started");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            SupervisorError::InvalidInterval { .. } => "supervisor_invalid_interval",
            SupervisorError::GraceExceeded { .. } => "supervisor_grace_exceeded",
            SupervisorError::AlreadyStarted => "supervisor_already_started",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            SupervisorError::InvalidInterval { device } => {
                format!("non-positive interval for device '{device}'")
            }
            SupervisorError::GraceExceeded { grace, stuck } => {
                format!("grace exceeded after {grace:?}; stuck workers={stuck:?}")
            }
            SupervisorError::AlreadyStarted => "supervisor already started".to_string(),
        }
    }
}

/// # Errors produced by the device layer.
///
/// Returned by [`DeviceHandle`](crate::DeviceHandle) callbacks and poll
/// attempts. The runtime treats all of them as soft: they are published on
/// the event bus and never interrupt stage progression or the poll schedule.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum DeviceError {
    /// The device did not answer within the configured poll timeout.
    #[error("device timed out after {timeout:?}")]
    Timeout {
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// The operation failed but may succeed if retried on the next schedule.
    #[error("device operation failed: {reason}")]
    Fail {
        /// The underlying failure message.
        reason: String,
    },

    /// The device is known to be unreachable (retrying is pointless until
    /// the device layer re-registers it).
    #[error("device unreachable: {reason}")]
    Unreachable {
        /// The underlying failure message.
        reason: String,
    },
}

impl DeviceError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            DeviceError::Timeout { .. } => "device_timeout",
            DeviceError::Fail { .. } => "device_failed",
            DeviceError::Unreachable { .. } => "device_unreachable",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            DeviceError::Timeout { timeout } => format!("timeout: {timeout:?}"),
            DeviceError::Fail { reason } => format!("error: {reason}"),
            DeviceError::Unreachable { reason } => format!("unreachable: {reason}"),
        }
    }

    /// Indicates whether the failure is worth retrying on the next schedule.
    ///
    /// Returns `true` for [`DeviceError::Fail`] and [`DeviceError::Timeout`],
    /// `false` for [`DeviceError::Unreachable`].
    ///
    /// # Example
    /// ```
    /// use meshvisor::DeviceError;
    ///
    /// let soft = DeviceError::Fail { reason: "no ack".into() };
    /// assert!(soft.is_retryable());
    ///
    /// let gone = DeviceError::Unreachable { reason: "left network".into() };
    /// assert!(!gone.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(self, DeviceError::Fail { .. } | DeviceError::Timeout { .. })
    }
}

/// # Errors produced by the coordinator link layer.
///
/// Returned by [`NetworkLink`](crate::NetworkLink) operations. A failed
/// bring-up is never escalated: the reconnect loop publishes it and tries
/// again on its fixed schedule.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LinkError {
    /// Tearing the link down failed (stale handles, driver refusal).
    #[error("link teardown failed: {reason}")]
    Teardown {
        /// The underlying failure message.
        reason: String,
    },

    /// Bringing the link back up failed (port busy, driver error, no key).
    #[error("link bring-up failed: {reason}")]
    Bringup {
        /// The underlying failure message.
        reason: String,
    },
}

impl LinkError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            LinkError::Teardown { .. } => "link_teardown_failed",
            LinkError::Bringup { .. } => "link_bringup_failed",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            LinkError::Teardown { reason } => format!("teardown: {reason}"),
            LinkError::Bringup { reason } => format!("bring-up: {reason}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supervisor_labels_are_stable() {
        let err = SupervisorError::GraceExceeded {
            grace: Duration::from_secs(5),
            stuck: vec!["lamp-1".into()],
        };
        assert_eq!(err.as_label(), "supervisor_grace_exceeded");
        assert!(err.as_message().contains("lamp-1"));
    }

    #[test]
    fn test_device_retryability() {
        let timeout = DeviceError::Timeout {
            timeout: Duration::from_secs(1),
        };
        let fail = DeviceError::Fail {
            reason: "nack".into(),
        };
        let gone = DeviceError::Unreachable {
            reason: "left network".into(),
        };
        assert!(timeout.is_retryable());
        assert!(fail.is_retryable());
        assert!(!gone.is_retryable());
    }

    #[test]
    fn test_link_labels_are_stable() {
        let err = LinkError::Bringup {
            reason: "port busy".into(),
        };
        assert_eq!(err.as_label(), "link_bringup_failed");
        assert_eq!(err.to_string(), "link bring-up failed: port busy");
    }
}
