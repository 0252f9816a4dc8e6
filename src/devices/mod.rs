//! # Device abstractions and interval proposals.
//!
//! This module provides the device-facing types:
//! - [`DeviceHandle`] - trait for implementing supervised devices
//! - [`DeviceRef`] - shared reference to a device (`Arc<dyn DeviceHandle>`)
//! - [`DeviceClass`] - power class used to clamp poll periods
//! - [`IntervalProposal`] - per-channel reporting/polling interval candidate

mod handle;
mod proposal;

pub use handle::{DeviceClass, DeviceHandle, DeviceRef};
pub use proposal::IntervalProposal;
