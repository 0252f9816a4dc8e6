//! # meshvisor
//!
//! **Meshvisor** is a device liveness and connectivity supervision library
//! for mesh-network hubs.
//!
//! It watches a fleet of devices behind one coordinator radio: every device
//! gets a silence budget with two-stage escalation, a fallback poll schedule
//! derived from its reporting intervals, and the coordinator link itself is
//! driven back online by a serialized reconnect loop. The crate is designed
//! as a building block for higher-level hub runtimes.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!   │ DeviceHandle │   │ DeviceHandle │   │ DeviceHandle │
//!   │ (device #1)  │   │ (device #2)  │   │ (device #3)  │
//!   └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!          │ register_device(device, proposals)  │
//!          ▼                  ▼                  ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  Supervisor (runtime orchestrator)                               │
//! │  - IntervalResolver (proposals → one schedule per device)        │
//! │  - Bus (broadcast events)                                        │
//! │  - SubscriberSet (fans out to user subscribers)                  │
//! └────┬─────────────────────┬─────────────────────┬────────────────┘
//!      ▼                     ▼                     ▼
//! ┌───────────────┐   ┌───────────────┐   ┌───────────────────┐
//! │LivenessTracker│   │    Poller     │   │  LinkSupervisor   │
//! │ (two-stage    │   │ (fallback     │   │ (link state +     │
//! │  timers)      │   │  poll workers)│   │  reconnect loop)  │
//! └┬──────────────┘   └┬──────────────┘   └┬──────────────────┘
//!  │ Publishes:        │ Publishes:        │ Publishes:
//!  │ - LastChance...   │ - PollScheduled   │ - LinkStateChanged
//!  │ - DeviceTimedOut  │ - PollFailed      │ - ReconnectAttempted
//!  │ - ...             │ - ...             │ - ...
//!  ▼                   ▼                   ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                     Bus (broadcast channel)                      │
//! │                  (capacity: Config::bus_capacity)                │
//! └───────────────┬─────────────────────────────┬────────────────────┘
//!                 ▼                             ▼
//!      ┌──────────────────────┐     ┌────────────────────────┐
//!      │ subscriber_listener  │     │     poll listener      │
//!      │   (in Supervisor)    │     │  LastChanceEntered ──► │
//!      └──────────┬───────────┘     │  request_poll(device)  │
//!                 ▼                 └────────────────────────┘
//!           SubscriberSet
//!          (per-sub queues)
//!         ┌────────┼────────┐
//!         ▼        ▼        ▼
//!      worker1  worker2  workerN
//!         ▼        ▼        ▼
//!      sub1.on  sub2.on  subN.on
//!      _event() _event() _event()
//! ```
//!
//! ### Lifecycle
//! ```text
//! register_device ──► IntervalResolver ──► LivenessTracker + Poller
//!
//! NORMAL ──(budget expires)──► LAST_CHANCE ──(grace expires)──► timed out
//!   ▲                             │  │                             │
//!   │ device_activity()           │  │ poke: request_poll(device)  │
//!   │ re-arms the budget          │  ▼                             ▼
//!   └──(activity / poll Ok)───────┘  poll worker wakes,        on_timeout(),
//!                                    poll Ok → budget reset    DeviceTimedOut,
//!                                                              device dropped
//!
//! link_state_changed(OFFLINE) ── qualified? ──► reconnect loop (single task)
//!   loop every reconnect_period:
//!     ├─► pause while a firmware update or the coordinator
//!     │   lifecycle disqualifies the attempt
//!     ├─► abort stale bring-up, link.teardown()
//!     ├─► spawn link.reinitialize(), park on the completion gate
//!     └─► exit once the link reports ONLINE (or on shutdown)
//! ```
//!
//! ## Features
//! | Area               | Description                                                  | Key types / traits                                |
//! |--------------------|--------------------------------------------------------------|---------------------------------------------------|
//! | **Device API**     | Implement supervised devices with escalation callbacks.      | [`DeviceHandle`], [`DeviceRef`], [`DeviceClass`]  |
//! | **Liveness**       | Per-device silence budgets with two-stage escalation.        | [`LivenessTracker`], [`Stage`]                    |
//! | **Polling**        | Fallback poll workers with capped concurrency and pokes.     | [`Poller`]                                        |
//! | **Connectivity**   | Link state machine and serialized reconnect loop.            | [`NetworkLink`], [`LinkSupervisor`], [`LinkState`]|
//! | **Scheduling**     | Reduce per-channel interval proposals into one schedule.     | [`IntervalResolver`], [`DeviceSchedule`]          |
//! | **Subscriber API** | Hook into runtime events (logging, metrics, custom).         | [`Subscribe`]                                     |
//! | **Errors**         | Typed errors for supervision, devices, and the link.         | [`SupervisorError`], [`DeviceError`], [`LinkError`]|
//! | **Configuration**  | Centralize runtime settings.                                 | [`Config`]                                        |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use async_trait::async_trait;
//! use meshvisor::{
//!     Config, DeviceClass, DeviceError, DeviceHandle, IntervalProposal, LinkError,
//!     LinkState, NetworkLink, Supervisor,
//! };
//!
//! struct Coordinator;
//!
//! #[async_trait]
//! impl NetworkLink for Coordinator {
//!     fn state(&self) -> LinkState {
//!         LinkState::Online
//!     }
//!
//!     async fn teardown(&self) -> Result<(), LinkError> {
//!         Ok(())
//!     }
//!
//!     async fn reinitialize(&self) -> Result<(), LinkError> {
//!         Ok(())
//!     }
//! }
//!
//! struct DoorSensor;
//!
//! #[async_trait]
//! impl DeviceHandle for DoorSensor {
//!     fn id(&self) -> &str {
//!         "door-sensor-1"
//!     }
//!
//!     fn class(&self) -> DeviceClass {
//!         DeviceClass::Battery
//!     }
//!
//!     async fn on_last_chance(&self) -> Result<(), DeviceError> {
//!         println!("door-sensor-1 entered last chance");
//!         Ok(())
//!     }
//!
//!     async fn on_timeout(&self) -> Result<(), DeviceError> {
//!         println!("door-sensor-1 timed out");
//!         Ok(())
//!     }
//!
//!     async fn poll(&self) -> Result<(), DeviceError> {
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = Config::default();
//!
//!     // Build subscribers (optional)
//!     #[cfg(feature = "logging")]
//!     let subs: Vec<Arc<dyn meshvisor::Subscribe>> = {
//!         use meshvisor::LogWriter;
//!         vec![Arc::new(LogWriter::default())]
//!     };
//!     #[cfg(not(feature = "logging"))]
//!     let subs: Vec<Arc<dyn meshvisor::Subscribe>> = Vec::new();
//!
//!     // Create the supervisor around the coordinator link
//!     let sup = Supervisor::builder(cfg)
//!         .with_subscribers(subs)
//!         .build(Arc::new(Coordinator));
//!     sup.start()?;
//!
//!     // Devices propose intervals per channel; the supervisor resolves them
//!     // into one liveness budget and one fallback poll schedule.
//!     let schedule = sup
//!         .register_device(
//!             Arc::new(DoorSensor),
//!             &[IntervalProposal::reporting(
//!                 Duration::from_secs(60),
//!                 Duration::from_secs(3600),
//!             )],
//!         )
//!         .await?;
//!     println!("schedule: {schedule:?}");
//!
//!     // The protocol layer reports link transitions as they happen
//!     sup.link_state_changed(LinkState::Online);
//!
//!     sup.stop().await?;
//!     Ok(())
//! }
//! ```
mod config;
mod core;
mod devices;
mod error;
mod events;
mod link;
mod schedule;
mod subscribers;

// ---- Public re-exports ----

pub use config::Config;
pub use core::{LinkSupervisor, LivenessTracker, Poller, Stage, Supervisor, SupervisorBuilder};
pub use devices::{DeviceClass, DeviceHandle, DeviceRef, IntervalProposal};
pub use error::{DeviceError, LinkError, SupervisorError};
pub use events::{Bus, Event, EventKind};
pub use link::{CoordinatorLifecycle, LinkRef, LinkState, NetworkLink};
pub use schedule::{DeviceSchedule, IntervalResolver, PollLimits};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
