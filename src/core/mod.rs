//! Runtime core: supervision engines and lifecycle.
//!
//! This module contains the embedded implementation of the meshvisor runtime.
//! The public API from this module is [`Supervisor`] (with its builder) plus
//! the engine handles it exposes for direct access.
//!
//! Internal modules:
//! - [`liveness`]: per-device silence budgets with two-stage escalation;
//! - [`poller`]: fallback poll workers and the last-chance poke listener;
//! - [`reconnect`]: coordinator link tracking and the serialized reconnect loop;
//! - [`gate`]: completion gate that parks reconnect attempts until resolved;
//! - [`supervisor`]: ties the engines together, handles graceful shutdown;
//! - [`builder`]: wires config, bus, and engines into a supervisor.

mod builder;
mod gate;
mod liveness;
mod poller;
mod reconnect;
mod supervisor;

pub use builder::SupervisorBuilder;
pub use liveness::{LivenessTracker, Stage};
pub use poller::Poller;
pub use reconnect::LinkSupervisor;
pub use supervisor::Supervisor;
