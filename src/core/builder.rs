//! # Builder: assembles a [`Supervisor`] from configuration.
//!
//! Wires the shared pieces in dependency order: the event [`Bus`] first,
//! then the [`SubscriberSet`] and the optional poll-concurrency semaphore,
//! then the three engines, all sharing one runtime cancellation token.
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use meshvisor::{Config, LinkError, LinkState, NetworkLink, SupervisorBuilder};
//!
//! struct Coordinator;
//!
//! #[async_trait]
//! impl NetworkLink for Coordinator {
//!     fn state(&self) -> LinkState { LinkState::Online }
//!     async fn teardown(&self) -> Result<(), LinkError> { Ok(()) }
//!     async fn reinitialize(&self) -> Result<(), LinkError> { Ok(()) }
//! }
//!
//! let sup = SupervisorBuilder::new(Config::default())
//!     .with_subscribers(Vec::new())
//!     .build(Arc::new(Coordinator));
//! ```

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::core::liveness::LivenessTracker;
use crate::core::poller::Poller;
use crate::core::reconnect::LinkSupervisor;
use crate::core::supervisor::Supervisor;
use crate::events::Bus;
use crate::link::LinkRef;
use crate::subscribers::{Subscribe, SubscriberSet};

/// Builder for [`Supervisor`].
pub struct SupervisorBuilder {
    cfg: Config,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl SupervisorBuilder {
    /// Creates a builder with no subscribers attached.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
        }
    }

    /// Attaches event subscribers (replaces any previously set).
    ///
    /// Subscribers receive runtime events (escalations, poll outcomes, link
    /// transitions) through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the supervisor around the given coordinator link.
    pub fn build(self, link: LinkRef) -> Arc<Supervisor> {
        let depth = self.cfg.bus_capacity_clamped();
        let bus = Bus::new(depth);
        let subs = Arc::new(SubscriberSet::new(self.subscribers, bus.clone(), depth));
        let runtime_token = CancellationToken::new();

        let semaphore = self
            .cfg
            .concurrency_limit()
            .map(Semaphore::new)
            .map(Arc::new);

        let liveness = LivenessTracker::new(
            bus.clone(),
            self.cfg.last_chance_grace,
            runtime_token.clone(),
        );
        let poller = Poller::new(
            bus.clone(),
            Arc::clone(&liveness),
            semaphore,
            self.cfg.poll_timeout_opt(),
            self.cfg.grace,
            runtime_token.clone(),
        );
        let link = LinkSupervisor::new(
            link,
            bus.clone(),
            self.cfg.reconnect_period,
            runtime_token.clone(),
        );

        Arc::new(Supervisor::new_internal(
            self.cfg,
            bus,
            subs,
            liveness,
            poller,
            link,
            runtime_token,
        ))
    }
}
