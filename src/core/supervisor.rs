//! # Supervisor: ties the liveness, polling, and connectivity engines together.
//!
//! The [`Supervisor`] owns the event bus, a [`SubscriberSet`], and the three
//! engines. Hosts register devices with per-channel interval proposals; the
//! supervisor resolves them into one schedule and feeds both the liveness
//! tracker and the fallback poller.
//!
//! ## Key responsibilities
//! - resolve interval proposals into per-device schedules
//! - feed device registration/activity into [`LivenessTracker`] and [`Poller`]
//! - forward link state reports to the [`LinkSupervisor`]
//! - subscribe to the [`Bus`] and **fan-out** events via [`SubscriberSet`]
//! - perform graceful shutdown with a configurable [`Config::grace`]
//!
//! ## High-level architecture
//! ```text
//! Registration:
//!   register_device(device, proposals) ──► IntervalResolver::resolve(class, proposals)
//!       │ Some(schedule)
//!       ├──► LivenessTracker::register(device, schedule.liveness_timeout)
//!       └──► Poller::register(device, schedule)
//!
//! Event flow (as wired here):
//!   engines ── publish(Event) ──► Bus ──► subscriber_listener ──► SubscriberSet::emit(Event)
//!                                  │                                ┌─────────┬─────────┐
//!                                  │                                ▼         ▼         ▼
//!                                  │                          [queue S1] [queue S2] [queue SN]
//!                                  │                           worker S1  worker S2  worker SN
//!                                  │
//!                                  └──► poll listener: LastChanceEntered ──► request_poll(device)
//!
//! Connectivity:
//!   link_state_changed(state) ──► LinkSupervisor::on_state_changed(state)
//!                                    └─ OFFLINE (qualified) ──► reconnect loop
//!
//! Shutdown path:
//!   stop()
//!     └─► Bus.publish(ShutdownRequested)
//!     └─► lifecycle → Removing; runtime_token.cancel() → propagates to child tokens
//!     └─► wait up to cfg.grace for poll workers + reconnect machinery:
//!            ├─ all joined      → Bus.publish(AllStoppedWithin), lifecycle → Removed
//!            └─ grace exceeded  → Bus.publish(GraceExceeded)
//!                                 (stuck device ids from Poller::active)
//! ```
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use async_trait::async_trait;
//! use meshvisor::{
//!     Config, DeviceClass, DeviceError, DeviceHandle, IntervalProposal, LinkError,
//!     LinkState, NetworkLink, SupervisorBuilder,
//! };
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
//! struct Thermostat;
//!
//! #[async_trait]
//! impl DeviceHandle for Thermostat {
//!     fn id(&self) -> &str { "thermostat-1" }
//!     fn class(&self) -> DeviceClass { DeviceClass::Mains }
//!     async fn on_last_chance(&self) -> Result<(), DeviceError> { Ok(()) }
//!     async fn on_timeout(&self) -> Result<(), DeviceError> { Ok(()) }
//!     async fn poll(&self) -> Result<(), DeviceError> { Ok(()) }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sup = SupervisorBuilder::new(Config::default()).build(Arc::new(Coordinator));
//!     sup.start()?;
//!
//!     let schedule = sup
//!         .register_device(
//!             Arc::new(Thermostat),
//!             &[IntervalProposal::reporting(
//!                 Duration::from_secs(60),
//!                 Duration::from_secs(300),
//!             )],
//!         )
//!         .await?;
//!     assert!(schedule.is_some());
//!
//!     sup.stop().await?;
//!     Ok(())
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::core::builder::SupervisorBuilder;
use crate::core::liveness::{LivenessTracker, Stage};
use crate::core::poller::Poller;
use crate::core::reconnect::LinkSupervisor;
use crate::devices::{DeviceRef, IntervalProposal};
use crate::error::SupervisorError;
use crate::events::{Bus, Event, EventKind};
use crate::link::{CoordinatorLifecycle, LinkState};
use crate::schedule::{DeviceSchedule, IntervalResolver};
use crate::subscribers::SubscriberSet;

/// Coordinates device liveness, fallback polling, link recovery, and event
/// delivery for one coordinator radio.
pub struct Supervisor {
    /// Global runtime configuration.
    pub cfg: Config,
    /// Event bus shared with all engines; subscribe for raw event access.
    pub bus: Bus,
    subs: Arc<SubscriberSet>,
    resolver: IntervalResolver,
    liveness: Arc<LivenessTracker>,
    poller: Arc<Poller>,
    link: Arc<LinkSupervisor>,
    runtime_token: CancellationToken,
    started: AtomicBool,
}

impl Supervisor {
    /// Returns a builder for this configuration.
    pub fn builder(cfg: Config) -> SupervisorBuilder {
        SupervisorBuilder::new(cfg)
    }

    pub(crate) fn new_internal(
        cfg: Config,
        bus: Bus,
        subs: Arc<SubscriberSet>,
        liveness: Arc<LivenessTracker>,
        poller: Arc<Poller>,
        link: Arc<LinkSupervisor>,
        runtime_token: CancellationToken,
    ) -> Self {
        let resolver = IntervalResolver::new(&cfg);
        Self {
            cfg,
            bus,
            subs,
            resolver,
            liveness,
            poller,
            link,
            runtime_token,
            started: AtomicBool::new(false),
        }
    }

    /// Starts event delivery and marks the coordinator operational.
    ///
    /// Must be called from within the runtime (spawns the listener tasks).
    ///
    /// ### Errors
    /// [`SupervisorError::AlreadyStarted`] on a second call.
    pub fn start(&self) -> Result<(), SupervisorError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(SupervisorError::AlreadyStarted);
        }

        self.subscriber_listener();
        Arc::clone(&self.poller).spawn_listener();
        self.link.set_lifecycle(CoordinatorLifecycle::Ready);
        Ok(())
    }

    /// Stops every worker and waits up to [`Config::grace`] for them.
    ///
    /// Cancellation propagates through the runtime token: liveness timers,
    /// poll workers, the reconnect loop, and the listeners all stop. Workers
    /// that fail to stop in time are reported in the error.
    pub async fn stop(&self) -> Result<(), SupervisorError> {
        self.bus.publish(Event::now(EventKind::ShutdownRequested));
        self.link.set_lifecycle(CoordinatorLifecycle::Removing);
        self.runtime_token.cancel();

        let drained = time::timeout(self.cfg.grace, async {
            self.poller.shutdown().await;
            self.link.shutdown().await;
        })
        .await;

        match drained {
            Ok(_) => {
                self.bus.publish(Event::now(EventKind::AllStoppedWithin));
                self.link.set_lifecycle(CoordinatorLifecycle::Removed);
                Ok(())
            }
            Err(_) => {
                self.bus.publish(Event::now(EventKind::GraceExceeded));
                Err(SupervisorError::GraceExceeded {
                    grace: self.cfg.grace,
                    stuck: self.poller.active().await,
                })
            }
        }
    }

    /// Registers a device under supervision.
    ///
    /// Resolves the channel proposals into one schedule; devices with no
    /// usable candidate are left unsupervised (`Ok(None)`). Re-registering
    /// replaces the previous budget and poll schedule.
    pub async fn register_device(
        &self,
        device: DeviceRef,
        proposals: &[IntervalProposal],
    ) -> Result<Option<DeviceSchedule>, SupervisorError> {
        let Some(schedule) = self.resolver.resolve(device.class(), proposals) else {
            return Ok(None);
        };

        self.liveness
            .register(Arc::clone(&device), schedule.liveness_timeout)
            .await?;
        self.poller.register(device, &schedule).await;
        Ok(Some(schedule))
    }

    /// Removes a device from supervision (budget and poll schedule).
    ///
    /// An in-flight poll gets up to [`Config::grace`] to finish before the
    /// device's poll worker is aborted, so this call always returns.
    pub async fn unregister_device(&self, id: &str) {
        self.liveness.unregister(id).await;
        self.poller.unregister(id).await;
    }

    /// Records a sign of life for a device (report, trigger, any traffic).
    ///
    /// Call this from the device layer for every observable activity; it is
    /// what keeps a healthy device from ever escalating.
    pub async fn device_activity(&self, id: &str) {
        self.liveness.reset(id).await;
    }

    /// Pokes a device's poll worker for an immediate poll.
    pub async fn request_poll(&self, id: &str) {
        self.poller.request_poll(id).await;
    }

    /// Forwards a link state report from the protocol layer.
    pub fn link_state_changed(&self, next: LinkState) {
        self.link.on_state_changed(next);
    }

    /// Marks a coordinator firmware update as started/finished.
    pub fn set_firmware_update(&self, active: bool) {
        self.link.set_firmware_update(active);
    }

    /// Overrides the coordinator lifecycle stage.
    ///
    /// `start`/`stop` manage this on their own; hosts only need it for
    /// removal flows that happen outside `stop` (device deleted while the
    /// process keeps running).
    pub fn set_coordinator_lifecycle(&self, next: CoordinatorLifecycle) {
        self.link.set_lifecycle(next);
    }

    /// Returns the last reported link state.
    pub fn link_state(&self) -> LinkState {
        self.link.state()
    }

    /// Returns sorted ids of devices currently under liveness supervision.
    pub async fn tracked_devices(&self) -> Vec<String> {
        self.liveness.tracked().await
    }

    /// Returns the escalation stage of a supervised device.
    pub async fn device_stage(&self, id: &str) -> Option<Stage> {
        self.liveness.stage(id).await
    }

    /// Subscribes to the bus and pumps events into the subscriber set
    /// (fire-and-forget). A lagged pump reports the gap to the lanes and
    /// resumes; it exits when the bus closes.
    fn subscriber_listener(&self) {
        let mut rx = self.bus.subscribe();
        let set = Arc::clone(&self.subs);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ev) => set.emit(ev),
                    Err(RecvError::Lagged(_)) => {
                        set.emit(Event::subscriber_overflow("subscriber_listener", "lagged"));
                    }
                    Err(RecvError::Closed) => return,
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::devices::{DeviceClass, DeviceHandle};
    use crate::error::{DeviceError, LinkError};
    use crate::link::NetworkLink;

    struct IdleLink;

    #[async_trait]
    impl NetworkLink for IdleLink {
        fn state(&self) -> LinkState {
            LinkState::Online
        }

        async fn teardown(&self) -> Result<(), LinkError> {
            Ok(())
        }

        async fn reinitialize(&self) -> Result<(), LinkError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct FleetProbe {
        polls: AtomicUsize,
        last_chance: AtomicUsize,
        timeouts: AtomicUsize,
    }

    struct FleetDevice {
        id: String,
        answering: AtomicBool,
        hang: bool,
        probe: Arc<FleetProbe>,
    }

    impl FleetDevice {
        fn new(id: &str, answering: bool, probe: &Arc<FleetProbe>) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                answering: AtomicBool::new(answering),
                hang: false,
                probe: Arc::clone(probe),
            })
        }

        fn hanging(id: &str, probe: &Arc<FleetProbe>) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                answering: AtomicBool::new(false),
                hang: true,
                probe: Arc::clone(probe),
            })
        }
    }

    #[async_trait]
    impl DeviceHandle for FleetDevice {
        fn id(&self) -> &str {
            &self.id
        }

        fn class(&self) -> DeviceClass {
            DeviceClass::Mains
        }

        async fn on_last_chance(&self) -> Result<(), DeviceError> {
            self.probe.last_chance.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn on_timeout(&self) -> Result<(), DeviceError> {
            self.probe.timeouts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn poll(&self) -> Result<(), DeviceError> {
            self.probe.polls.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                std::future::pending::<()>().await;
            }
            if self.answering.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(DeviceError::Fail {
                    reason: "no report".to_string(),
                })
            }
        }
    }

    fn cfg() -> Config {
        Config {
            jitter_seed: Some(7),
            ..Config::default()
        }
    }

    // reporting(60s, 300s) with default factor/margin: timeout 630s, period 300s.
    fn proposal() -> IntervalProposal {
        IntervalProposal::reporting(Duration::from_secs(60), Duration::from_secs(300))
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    fn drain(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<EventKind> {
        let mut kinds = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            kinds.push(ev.kind);
        }
        kinds
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_installs_budget_and_schedule() {
        let sup = SupervisorBuilder::new(cfg()).build(Arc::new(IdleLink));
        let probe = Arc::new(FleetProbe::default());

        let schedule = sup
            .register_device(FleetDevice::new("t1", true, &probe), &[proposal()])
            .await
            .unwrap()
            .expect("schedule");

        assert_eq!(schedule.liveness_timeout, Duration::from_secs(630));
        assert_eq!(schedule.poll_period, Duration::from_secs(300));
        assert_eq!(sup.tracked_devices().await, vec!["t1"]);
        assert_eq!(sup.poller.active().await, vec!["t1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_without_candidates_is_unsupervised() {
        let sup = SupervisorBuilder::new(cfg()).build(Arc::new(IdleLink));
        let probe = Arc::new(FleetProbe::default());

        let schedule = sup
            .register_device(FleetDevice::new("t1", true, &probe), &[])
            .await
            .unwrap();

        assert!(schedule.is_none());
        assert!(sup.tracked_devices().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_errors() {
        let sup = SupervisorBuilder::new(cfg()).build(Arc::new(IdleLink));
        sup.start().unwrap();
        assert!(matches!(sup.start(), Err(SupervisorError::AlreadyStarted)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_stop_reports_and_advances_lifecycle() {
        let sup = SupervisorBuilder::new(cfg()).build(Arc::new(IdleLink));
        let mut rx = sup.bus.subscribe();
        let probe = Arc::new(FleetProbe::default());

        sup.start().unwrap();
        sup.register_device(FleetDevice::new("t1", true, &probe), &[proposal()])
            .await
            .unwrap();

        sup.stop().await.unwrap();

        assert_eq!(sup.link.lifecycle(), CoordinatorLifecycle::Removed);
        let kinds = drain(&mut rx);
        assert!(kinds.contains(&EventKind::ShutdownRequested));
        assert!(kinds.contains(&EventKind::AllStoppedWithin));
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_exceeded_lists_stuck_devices() {
        let mut config = cfg();
        config.grace = Duration::from_secs(1);
        let sup = SupervisorBuilder::new(config).build(Arc::new(IdleLink));
        let probe = Arc::new(FleetProbe::default());

        sup.start().unwrap();
        sup.register_device(FleetDevice::hanging("t1", &probe), &[proposal()])
            .await
            .unwrap();

        // Park the worker inside a poll that never returns.
        sup.request_poll("t1").await;
        settle().await;
        assert_eq!(probe.polls.load(Ordering::SeqCst), 1);

        let err = sup.stop().await.unwrap_err();
        match err {
            SupervisorError::GraceExceeded { stuck, .. } => {
                assert_eq!(stuck, vec!["t1"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_chance_poll_rescues_device() {
        let sup = SupervisorBuilder::new(cfg()).build(Arc::new(IdleLink));
        let probe = Arc::new(FleetProbe::default());
        let device = FleetDevice::new("t1", false, &probe);

        // Tight 300s reporting bound (630s budget) but a lazy poll fallback,
        // so the last-chance poke is the only poll in this window.
        let lazy = IntervalProposal {
            poll_fallback: Some(Duration::from_secs(3600)),
            ..proposal()
        };
        sup.start().unwrap();
        sup.register_device(Arc::clone(&device) as DeviceRef, &[lazy])
            .await
            .unwrap();

        time::advance(Duration::from_secs(629)).await;
        settle().await;
        assert_eq!(sup.device_stage("t1").await, Some(Stage::Normal));
        assert_eq!(probe.polls.load(Ordering::SeqCst), 0);

        // The device starts answering just as the budget expires: the
        // last-chance poke reaches it and resets the budget.
        device.answering.store(true, Ordering::SeqCst);
        time::advance(Duration::from_secs(1)).await;
        settle().await;

        assert_eq!(probe.last_chance.load(Ordering::SeqCst), 1);
        assert_eq!(probe.polls.load(Ordering::SeqCst), 1);
        assert_eq!(probe.timeouts.load(Ordering::SeqCst), 0);
        assert_eq!(sup.device_stage("t1").await, Some(Stage::Normal));
        assert_eq!(sup.tracked_devices().await, vec!["t1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_device_times_out_end_to_end() {
        let sup = SupervisorBuilder::new(cfg()).build(Arc::new(IdleLink));
        let mut rx = sup.bus.subscribe();
        let probe = Arc::new(FleetProbe::default());

        sup.start().unwrap();
        sup.register_device(FleetDevice::new("t1", false, &probe), &[proposal()])
            .await
            .unwrap();

        time::advance(Duration::from_secs(630)).await;
        settle().await;
        assert_eq!(probe.last_chance.load(Ordering::SeqCst), 1);

        time::advance(Duration::from_secs(30)).await;
        settle().await;

        assert_eq!(probe.timeouts.load(Ordering::SeqCst), 1);
        assert!(sup.tracked_devices().await.is_empty());
        assert!(drain(&mut rx).contains(&EventKind::DeviceTimedOut));
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_reports_flow_through() {
        let sup = SupervisorBuilder::new(cfg()).build(Arc::new(IdleLink));
        let mut rx = sup.bus.subscribe();

        sup.start().unwrap();
        sup.link_state_changed(LinkState::Offline);
        settle().await;

        assert_eq!(sup.link_state(), LinkState::Offline);
        let kinds = drain(&mut rx);
        assert!(kinds.contains(&EventKind::LinkStateChanged));
        assert!(kinds.contains(&EventKind::ReconnectScheduled));
    }
}
