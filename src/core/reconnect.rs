//! # LinkSupervisor: coordinator link state and serialized reconnection.
//!
//! Mirrors the link state reported by the protocol layer and, when the link
//! drops, drives recovery through a single periodic reconnect loop:
//! ```text
//! on_state_changed(OFFLINE)            reconnect loop (one per outage)
//!   │ not disqualified                    │
//!   ▼                                     ▼ every `reconnect_period`
//! ensure_loop ─────────────────────► tick: ONLINE?  ──yes──► exit
//!                                         │ no
//!                                         ▼
//!                                    abort stale bring-up
//!                                    teardown link
//!                                    arm gate, spawn bring-up
//!                                    park on gate ◄─── released by the next
//!                                         │            ONLINE/OFFLINE report
//!                                         └──► next tick
//! ```
//!
//! ## Rules
//! - **Single loop**: a second `OFFLINE` report while a loop is alive does
//!   not start another; the slot is re-armed only after the loop finishes.
//! - **Ground truth**: each tick consults
//!   [`NetworkLink::state`](crate::link::NetworkLink::state) before anything
//!   else; a recovery whose report was lost still stops the loop and is
//!   recorded as `ONLINE`.
//! - **Single flight**: each tick parks on the [`AttemptGate`] until the
//!   attempt settles, so bring-ups never overlap. A tick that begins while a
//!   disqualifier holds skips the attempt and keeps ticking.
//! - **Disqualified OFFLINE**: a firmware update in progress, or a
//!   coordinator lifecycle that is not [`Ready`](CoordinatorLifecycle::Ready),
//!   suppresses loop scheduling entirely. The observation is still recorded.
//! - **Failure is not fatal**: a failed attempt leaves the state at
//!   `OFFLINE`; the next tick retries, indefinitely, until recovery or
//!   shutdown.
//! - `on_state_changed` must be called from within the runtime; it never
//!   blocks and never touches the link itself.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::core::gate::AttemptGate;
use crate::events::{Bus, Event, EventKind};
use crate::link::{CoordinatorLifecycle, LinkRef, LinkState};

/// Running reconnect loop: cancel handle plus join for orderly shutdown.
struct LoopHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

/// Supervises the coordinator link.
///
/// ### Responsibilities
/// - Mirrors the protocol layer's state reports ([`on_state_changed`](Self::on_state_changed))
/// - Schedules the reconnect loop on qualifying `OFFLINE` observations
/// - Serializes reconnect attempts through the completion gate
/// - Publishes link and reconnect events to the bus
pub struct LinkSupervisor {
    link: LinkRef,
    bus: Bus,
    /// Fixed tick period of the reconnect loop.
    period: Duration,
    /// Last state reported by the protocol layer.
    state: Mutex<LinkState>,
    gate: AttemptGate,
    firmware_update: AtomicBool,
    lifecycle: Mutex<CoordinatorLifecycle>,
    loop_slot: Mutex<Option<LoopHandle>>,
    /// Most recent bring-up task; superseded attempts abort it.
    init_task: Mutex<Option<JoinHandle<()>>>,
    attempts: AtomicU64,
    runtime_token: CancellationToken,
}

impl LinkSupervisor {
    /// Creates a supervisor for the given link.
    ///
    /// Starts with [`LinkState::Uninitialized`] and
    /// [`CoordinatorLifecycle::New`]; nothing is scheduled until the first
    /// state report arrives.
    pub fn new(
        link: LinkRef,
        bus: Bus,
        period: Duration,
        runtime_token: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            link,
            bus,
            period,
            state: Mutex::new(LinkState::Uninitialized),
            gate: AttemptGate::new(),
            firmware_update: AtomicBool::new(false),
            lifecycle: Mutex::new(CoordinatorLifecycle::New),
            loop_slot: Mutex::new(None),
            init_task: Mutex::new(None),
            attempts: AtomicU64::new(0),
            runtime_token,
        })
    }

    /// Handles a state report from the protocol layer.
    ///
    /// Every report is recorded and published. `ONLINE` and `OFFLINE` both
    /// release a parked reconnect wait (the in-flight attempt is over either
    /// way); a qualifying `OFFLINE` additionally schedules the reconnect
    /// loop. `INITIALIZING`/`UNINITIALIZED` keep waiters parked.
    pub fn on_state_changed(self: &Arc<Self>, next: LinkState) {
        {
            let mut state = self
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            *state = next;
        }
        self.bus
            .publish(Event::now(EventKind::LinkStateChanged).with_link_state(next));

        match next {
            LinkState::Online => self.gate.finish(),
            LinkState::Offline => {
                self.gate.finish();
                match self.disqualified() {
                    Some(reason) => {
                        self.bus
                            .publish(Event::now(EventKind::ReconnectSkipped).with_reason(reason));
                    }
                    None => self.ensure_loop(),
                }
            }
            LinkState::Initializing | LinkState::Uninitialized => {}
        }
    }

    /// Marks a coordinator firmware update as started/finished.
    ///
    /// While set, `OFFLINE` observations do not schedule reconnection and a
    /// running loop stops attempting. Clearing the flag does not schedule
    /// anything retroactively; the next state report drives that.
    pub fn set_firmware_update(&self, active: bool) {
        self.firmware_update.store(active, Ordering::Relaxed);
    }

    /// Moves the coordinator through its host-owned lifecycle.
    pub fn set_lifecycle(&self, next: CoordinatorLifecycle) {
        let mut lifecycle = self
            .lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *lifecycle = next;
    }

    /// Returns the last reported link state.
    pub fn state(&self) -> LinkState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the coordinator lifecycle stage.
    pub fn lifecycle(&self) -> CoordinatorLifecycle {
        *self
            .lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the total number of reconnect attempts started.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Stops the reconnect loop and any in-flight bring-up task.
    pub async fn shutdown(&self) {
        let running = {
            let mut slot = self
                .loop_slot
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            slot.take()
        };
        if let Some(handle) = running {
            handle.cancel.cancel();
            let _ = handle.join.await;
        }

        let bringup = {
            let mut slot = self
                .init_task
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            slot.take()
        };
        if let Some(handle) = bringup {
            handle.abort();
            let _ = handle.await;
        }
    }

    /// Returns the reason the current `OFFLINE` observation must be ignored,
    /// if any.
    fn disqualified(&self) -> Option<&'static str> {
        if self.firmware_update.load(Ordering::Relaxed) {
            return Some("firmware update in progress");
        }
        let lifecycle = self
            .lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !lifecycle.allows_reconnect() {
            return Some("coordinator not operational");
        }
        None
    }

    /// Spawns the reconnect loop unless one is already alive.
    fn ensure_loop(self: &Arc<Self>) {
        let mut slot = self
            .loop_slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = slot.as_ref() {
            if !handle.join.is_finished() {
                return;
            }
        }

        let cancel = self.runtime_token.child_token();
        let me = Arc::clone(self);
        let join = tokio::spawn(me.reconnect_loop(cancel.clone()));
        *slot = Some(LoopHandle { cancel, join });
        self.bus.publish(Event::now(EventKind::ReconnectScheduled));
    }

    /// Ticks at the fixed period until the link recovers or the loop is
    /// cancelled. Exactly one of these runs per outage.
    async fn reconnect_loop(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = time::sleep(self.period) => {}
                _ = cancel.cancelled() => {
                    self.publish_stopped("cancelled");
                    return;
                }
            }

            // The link itself is the ground truth for recovery; a report
            // lost between the protocol layer and us must not keep this
            // loop tearing down a link that already came back.
            if self.link.state() == LinkState::Online {
                if self.state() != LinkState::Online {
                    self.on_state_changed(LinkState::Online);
                }
                self.publish_stopped("online");
                return;
            }

            match self.state() {
                LinkState::Online => {
                    self.publish_stopped("online");
                    return;
                }
                // A superseded bring-up may still be settling.
                LinkState::Initializing => continue,
                LinkState::Offline | LinkState::Uninitialized => {}
            }
            if self.disqualified().is_some() {
                continue;
            }

            self.attempt(&cancel).await;

            if self.state() == LinkState::Online {
                self.publish_stopped("online");
                return;
            }
        }
    }

    /// Runs one serialized reconnect attempt: abort the superseded bring-up,
    /// tear the link down, arm the gate, request bring-up, park until the
    /// attempt settles.
    async fn attempt(self: &Arc<Self>, cancel: &CancellationToken) {
        let n = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
        self.bus
            .publish(Event::now(EventKind::ReconnectAttempted).with_attempt(n));

        self.abort_stale_bringup();

        let torn_down = tokio::select! {
            result = self.link.teardown() => result,
            _ = cancel.cancelled() => return,
        };
        if let Err(e) = torn_down {
            self.bus.publish(
                Event::now(EventKind::ReconnectFailed)
                    .with_attempt(n)
                    .with_reason(e.to_string()),
            );
            return;
        }

        self.gate.begin();
        self.spawn_bringup(n);
        self.gate.wait(cancel).await;
    }

    /// Requests link bring-up on a detached task.
    ///
    /// An error finishes the gate directly. Success is reported by the
    /// protocol layer through [`on_state_changed`](Self::on_state_changed),
    /// which is what finishes the gate on the happy path.
    fn spawn_bringup(self: &Arc<Self>, attempt: u64) {
        let me = Arc::clone(self);
        let handle = tokio::spawn(async move {
            if let Err(e) = me.link.reinitialize().await {
                me.bus.publish(
                    Event::now(EventKind::ReconnectFailed)
                        .with_attempt(attempt)
                        .with_reason(e.to_string()),
                );
                me.gate.finish();
            }
        });

        let mut slot = self
            .init_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = Some(handle);
    }

    fn abort_stale_bringup(&self) {
        let stale = {
            let mut slot = self
                .init_task
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            slot.take()
        };
        if let Some(handle) = stale {
            handle.abort();
        }
    }

    fn publish_stopped(&self, reason: &'static str) {
        self.bus
            .publish(Event::now(EventKind::ReconnectStopped).with_reason(reason));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use tokio::sync::broadcast::Receiver;

    use crate::error::LinkError;
    use crate::link::NetworkLink;

    const PERIOD: Duration = Duration::from_secs(5);

    #[derive(Clone, Copy)]
    enum Behavior {
        Succeed,
        FailTeardown,
        FailBringup,
        Hang,
    }

    struct TestLink {
        behavior: Behavior,
        state: Mutex<LinkState>,
        teardowns: AtomicUsize,
        bringups: AtomicUsize,
    }

    impl TestLink {
        fn new(behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                behavior,
                state: Mutex::new(LinkState::Offline),
                teardowns: AtomicUsize::new(0),
                bringups: AtomicUsize::new(0),
            })
        }

        fn set_state(&self, next: LinkState) {
            *self.state.lock().unwrap() = next;
        }
    }

    #[async_trait]
    impl NetworkLink for TestLink {
        fn state(&self) -> LinkState {
            *self.state.lock().unwrap()
        }

        async fn teardown(&self) -> Result<(), LinkError> {
            self.teardowns.fetch_add(1, Ordering::SeqCst);
            if matches!(self.behavior, Behavior::FailTeardown) {
                return Err(LinkError::Teardown {
                    reason: "port busy".to_string(),
                });
            }
            Ok(())
        }

        async fn reinitialize(&self) -> Result<(), LinkError> {
            self.bringups.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::FailBringup => Err(LinkError::Bringup {
                    reason: "no response from adapter".to_string(),
                }),
                Behavior::Hang => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
                _ => Ok(()),
            }
        }
    }

    fn harness(behavior: Behavior) -> (Arc<LinkSupervisor>, Arc<TestLink>, Receiver<Event>) {
        let link = TestLink::new(behavior);
        let bus = Bus::new(64);
        let rx = bus.subscribe();
        let sup = LinkSupervisor::new(link.clone(), bus, PERIOD, CancellationToken::new());
        (sup, link, rx)
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    fn drain(rx: &mut Receiver<Event>) -> Vec<EventKind> {
        let mut kinds = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            kinds.push(ev.kind);
        }
        kinds
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_starts_exactly_one_loop() {
        let (sup, link, mut rx) = harness(Behavior::Hang);
        sup.set_lifecycle(CoordinatorLifecycle::Ready);

        sup.on_state_changed(LinkState::Offline);
        sup.on_state_changed(LinkState::Offline);
        settle().await;

        assert_eq!(sup.state(), LinkState::Offline);
        let kinds = drain(&mut rx);
        let scheduled = kinds
            .iter()
            .filter(|k| **k == EventKind::ReconnectScheduled)
            .count();
        assert_eq!(scheduled, 1);

        time::advance(PERIOD).await;
        settle().await;
        assert_eq!(link.teardowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_are_single_flight() {
        let (sup, link, mut rx) = harness(Behavior::Hang);
        sup.set_lifecycle(CoordinatorLifecycle::Ready);
        sup.on_state_changed(LinkState::Offline);

        // The first attempt parks on the gate; later ticks must not pile up.
        for _ in 0..10 {
            time::advance(PERIOD).await;
            settle().await;
        }
        assert_eq!(link.bringups.load(Ordering::SeqCst), 1);
        assert_eq!(sup.attempts(), 1);

        sup.on_state_changed(LinkState::Online);
        settle().await;
        for _ in 0..4 {
            time::advance(PERIOD).await;
            settle().await;
        }

        assert_eq!(link.bringups.load(Ordering::SeqCst), 1);
        let kinds = drain(&mut rx);
        assert!(kinds.contains(&EventKind::ReconnectStopped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_bringup_retries_next_tick() {
        let (sup, link, mut rx) = harness(Behavior::FailBringup);
        sup.set_lifecycle(CoordinatorLifecycle::Ready);
        sup.on_state_changed(LinkState::Offline);
        settle().await;

        time::advance(PERIOD).await;
        settle().await;
        time::advance(PERIOD).await;
        settle().await;

        assert_eq!(link.bringups.load(Ordering::SeqCst), 2);
        assert_eq!(sup.attempts(), 2);
        let failures = drain(&mut rx)
            .into_iter()
            .filter(|k| *k == EventKind::ReconnectFailed)
            .count();
        assert_eq!(failures, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_failure_skips_bringup() {
        let (sup, link, mut rx) = harness(Behavior::FailTeardown);
        sup.set_lifecycle(CoordinatorLifecycle::Ready);
        sup.on_state_changed(LinkState::Offline);
        settle().await;

        time::advance(PERIOD).await;
        settle().await;

        assert_eq!(link.teardowns.load(Ordering::SeqCst), 1);
        assert_eq!(link.bringups.load(Ordering::SeqCst), 0);
        assert!(drain(&mut rx).contains(&EventKind::ReconnectFailed));

        time::advance(PERIOD).await;
        settle().await;
        assert_eq!(link.teardowns.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_firmware_update_blocks_scheduling() {
        let (sup, link, mut rx) = harness(Behavior::Succeed);
        sup.set_lifecycle(CoordinatorLifecycle::Ready);
        sup.set_firmware_update(true);

        sup.on_state_changed(LinkState::Offline);
        for _ in 0..3 {
            time::advance(PERIOD).await;
            settle().await;
        }

        assert_eq!(link.teardowns.load(Ordering::SeqCst), 0);
        let kinds = drain(&mut rx);
        assert!(kinds.contains(&EventKind::ReconnectSkipped));
        assert!(!kinds.contains(&EventKind::ReconnectScheduled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lifecycle_gates_scheduling() {
        let (sup, _link, mut rx) = harness(Behavior::Succeed);

        // Default lifecycle is New: not yet operational.
        sup.on_state_changed(LinkState::Offline);
        settle().await;
        let kinds = drain(&mut rx);
        assert!(kinds.contains(&EventKind::ReconnectSkipped));
        assert!(!kinds.contains(&EventKind::ReconnectScheduled));

        sup.set_lifecycle(CoordinatorLifecycle::Ready);
        sup.on_state_changed(LinkState::Offline);
        settle().await;
        assert!(drain(&mut rx).contains(&EventKind::ReconnectScheduled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_before_first_tick_stops_loop() {
        let (sup, link, mut rx) = harness(Behavior::Succeed);
        sup.set_lifecycle(CoordinatorLifecycle::Ready);

        sup.on_state_changed(LinkState::Offline);
        settle().await;
        sup.on_state_changed(LinkState::Online);

        time::advance(PERIOD).await;
        settle().await;

        assert_eq!(link.teardowns.load(Ordering::SeqCst), 0);
        assert!(drain(&mut rx).contains(&EventKind::ReconnectStopped));

        // The finished loop must not block a fresh outage.
        sup.on_state_changed(LinkState::Offline);
        settle().await;
        assert!(drain(&mut rx).contains(&EventKind::ReconnectScheduled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_resyncs_from_link_ground_truth() {
        let (sup, link, mut rx) = harness(Behavior::Hang);
        sup.set_lifecycle(CoordinatorLifecycle::Ready);
        sup.on_state_changed(LinkState::Offline);
        settle().await;

        // The link recovered on its own and the report never arrived.
        link.set_state(LinkState::Online);
        time::advance(PERIOD).await;
        settle().await;

        assert_eq!(sup.state(), LinkState::Online);
        assert_eq!(link.teardowns.load(Ordering::SeqCst), 0);
        let kinds = drain(&mut rx);
        assert!(kinds.contains(&EventKind::LinkStateChanged));
        assert!(kinds.contains(&EventKind::ReconnectStopped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_releases_parked_attempt() {
        let (sup, link, _rx) = harness(Behavior::Hang);
        sup.set_lifecycle(CoordinatorLifecycle::Ready);
        sup.on_state_changed(LinkState::Offline);
        settle().await;

        time::advance(PERIOD).await;
        settle().await;
        assert_eq!(link.bringups.load(Ordering::SeqCst), 1);

        tokio::time::timeout(Duration::from_secs(30), sup.shutdown())
            .await
            .expect("shutdown must release the parked attempt");
    }
}
