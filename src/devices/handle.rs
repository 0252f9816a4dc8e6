//! # Device abstraction for liveness and poll supervision.
//!
//! This module defines the [`DeviceHandle`] trait (async callbacks invoked by
//! the supervision engines) and the [`DeviceClass`] power classification.
//! The common handle type is [`DeviceRef`], an `Arc<dyn DeviceHandle>` suitable
//! for sharing across the runtime.
//!
//! Callbacks are invoked from detached tasks: a slow or panicking callback
//! never stalls timer bookkeeping for other devices.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::DeviceError;

/// Shared reference to a device (`Arc<dyn DeviceHandle>`).
pub type DeviceRef = Arc<dyn DeviceHandle>;

/// Power classification of a device.
///
/// Determines which clamp window applies to derived poll periods: mains
/// powered devices tolerate frequent polls, battery powered devices must be
/// polled sparingly to preserve their lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    /// Mains powered (router or always-listening device).
    Mains,
    /// Battery powered (sleepy end device).
    Battery,
}

/// # Supervised wireless device.
///
/// A `DeviceHandle` has a stable [`id`](DeviceHandle::id), a power
/// [`class`](DeviceHandle::class), and async callbacks the engines invoke at
/// escalation points:
///
/// - [`on_last_chance`](DeviceHandle::on_last_chance): the device exhausted
///   its silence budget; implementations typically fire a cheap read request
///   so a live device can prove itself before the grace window closes.
/// - [`on_timeout`](DeviceHandle::on_timeout): the grace window closed with
///   no sign of life; implementations mark the device unreachable.
/// - [`poll`](DeviceHandle::poll): one fallback poll round for devices that
///   never report on their own. A successful poll counts as activity.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use meshvisor::{DeviceClass, DeviceError, DeviceHandle};
///
/// struct Sensor;
///
/// #[async_trait]
/// impl DeviceHandle for Sensor {
///     fn id(&self) -> &str { "sensor-7" }
///
///     fn class(&self) -> DeviceClass { DeviceClass::Battery }
///
///     async fn on_last_chance(&self) -> Result<(), DeviceError> {
///         // fire a read request...
///         Ok(())
///     }
///
///     async fn on_timeout(&self) -> Result<(), DeviceError> {
///         // mark unreachable...
///         Ok(())
///     }
///
///     async fn poll(&self) -> Result<(), DeviceError> {
///         // read an attribute...
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait DeviceHandle: Send + Sync + 'static {
    /// Returns a stable, human-readable device id.
    fn id(&self) -> &str;

    /// Returns the device power class.
    fn class(&self) -> DeviceClass;

    /// Invoked once when the device enters the last-chance stage.
    ///
    /// Implementations should issue a cheap request that provokes a reply;
    /// the reply (reported as activity) is what rescues the device.
    async fn on_last_chance(&self) -> Result<(), DeviceError>;

    /// Invoked once when the device exhausts its last-chance grace window.
    ///
    /// At this point the device is no longer tracked; implementations own
    /// the availability bookkeeping (e.g., marking it unreachable).
    async fn on_timeout(&self) -> Result<(), DeviceError>;

    /// Executes one fallback poll round.
    ///
    /// A successful poll is treated as device activity and resets the
    /// liveness window.
    async fn poll(&self) -> Result<(), DeviceError>;
}
