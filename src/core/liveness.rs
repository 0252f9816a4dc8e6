//! # LivenessTracker: per-device silence budgets with two-stage escalation.
//!
//! Tracks one timeout record per registered device and escalates silence in
//! two stages:
//! ```text
//! register(device, timeout) ──► NORMAL ── timer fires ──► LAST_CHANCE
//!                                 ▲                            │
//!                                 │ reset(device)              │ grace timer fires
//!                                 │ (any activity)             ▼
//!                                 └──────────────────── on_timeout(), untracked
//!
//! NORMAL expiry:       stage → LAST_CHANCE, publish LastChanceEntered,
//!                      dispatch on_last_chance(), re-arm with fixed grace
//! LAST_CHANCE expiry:  drop record, publish DeviceTimedOut,
//!                      dispatch on_timeout()
//! ```
//!
//! ## Rules
//! - **Lock order**: the device map is locked first, a record second; a
//!   record is never locked without the map lock held. This serializes
//!   register/reset/unregister/timer-fire per device while unrelated devices
//!   proceed in parallel.
//! - **Stale timers**: every mutation bumps the record epoch; a fired timer
//!   that lost the race to a concurrent reset/unregister sees a mismatched
//!   epoch and does nothing.
//! - **Callbacks never block bookkeeping**: `on_last_chance`/`on_timeout`
//!   run on detached tasks with panic isolation; stage progression has
//!   already happened by the time they run.
//! - `reset` on an untracked device is a no-op; `unregister` is idempotent.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{Mutex, RwLock};
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::devices::DeviceRef;
use crate::error::SupervisorError;
use crate::events::{Bus, Event, EventKind};

/// Escalation stage of a tracked device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Within the silence budget; the full timeout is armed.
    Normal,
    /// Budget exhausted; the fixed grace window is armed.
    LastChance,
}

/// Which device callback a fired timer dispatches.
#[derive(Clone, Copy)]
enum Escalation {
    LastChance,
    Timeout,
}

/// Per-device timeout record.
struct TimeoutRecord {
    device: DeviceRef,
    interval: Duration,
    stage: Stage,
    /// Bumped on every mutation; armed timers carry the value at arm time.
    epoch: u64,
    /// Cancellation handle of the pending timer, if any.
    timer: Option<CancellationToken>,
}

impl TimeoutRecord {
    fn cancel_timer(&mut self) {
        if let Some(token) = self.timer.take() {
            token.cancel();
        }
    }
}

/// Tracks silence budgets for registered devices and drives escalation.
///
/// ### Responsibilities
/// - Owns the device → record map and all pending timers
/// - Escalates NORMAL → LAST_CHANCE → timed out on silence
/// - Publishes liveness events to the bus
/// - Dispatches device callbacks on detached, panic-isolated tasks
pub struct LivenessTracker {
    devices: RwLock<HashMap<String, Arc<Mutex<TimeoutRecord>>>>,
    bus: Bus,
    /// Fixed window granted after the first escalation.
    grace: Duration,
    runtime_token: CancellationToken,
}

impl LivenessTracker {
    /// Creates a new tracker.
    ///
    /// `grace` is the fixed last-chance window; `runtime_token` tears down
    /// every pending timer when cancelled.
    pub fn new(bus: Bus, grace: Duration, runtime_token: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            devices: RwLock::new(HashMap::new()),
            bus,
            grace,
            runtime_token,
        })
    }

    /// Starts (or re-arms) supervision of a device with the given budget.
    ///
    /// Overwrites any previous record for the same id: the stage drops back
    /// to NORMAL and the pending timer is replaced. Idempotent in the sense
    /// that repeated calls simply re-arm.
    ///
    /// ### Errors
    /// [`SupervisorError::InvalidInterval`] if `timeout` is zero.
    pub async fn register(
        self: &Arc<Self>,
        device: DeviceRef,
        timeout: Duration,
    ) -> Result<(), SupervisorError> {
        if timeout.is_zero() {
            return Err(SupervisorError::InvalidInterval {
                device: device.id().to_string(),
            });
        }
        let id = device.id().to_string();

        let mut devices = self.devices.write().await;
        let record = devices
            .entry(id.clone())
            .or_insert_with(|| {
                Arc::new(Mutex::new(TimeoutRecord {
                    device: Arc::clone(&device),
                    interval: timeout,
                    stage: Stage::Normal,
                    epoch: 0,
                    timer: None,
                }))
            })
            .clone();

        let mut rec = record.lock().await;
        rec.cancel_timer();
        rec.device = device;
        rec.interval = timeout;
        rec.stage = Stage::Normal;
        rec.epoch += 1;
        self.bus.publish(
            Event::now(EventKind::DeviceRegistered)
                .with_device(id.clone())
                .with_timeout(timeout),
        );
        self.arm(&id, &record, &mut rec, timeout);
        Ok(())
    }

    /// Records device activity: cancels the pending timer, clears the
    /// last-chance stage, and re-arms a full NORMAL budget.
    ///
    /// No-op if the device is not tracked. Call this for every observable
    /// sign of life (report, trigger, successful command round-trip).
    pub async fn reset(self: &Arc<Self>, id: &str) {
        let devices = self.devices.read().await;
        let Some(record) = devices.get(id).map(Arc::clone) else {
            return;
        };

        let mut rec = record.lock().await;
        rec.cancel_timer();
        rec.stage = Stage::Normal;
        rec.epoch += 1;
        let interval = rec.interval;
        self.arm(id, &record, &mut rec, interval);
    }

    /// Stops supervision of a device and drops its record. Idempotent.
    pub async fn unregister(&self, id: &str) {
        let removed = {
            let mut devices = self.devices.write().await;
            devices.remove(id)
        };
        let Some(record) = removed else {
            return;
        };

        let mut rec = record.lock().await;
        rec.cancel_timer();
        rec.epoch += 1;
        drop(rec);

        self.bus
            .publish(Event::now(EventKind::DeviceUnregistered).with_device(id.to_string()));
    }

    /// Returns sorted ids of currently tracked devices.
    pub async fn tracked(&self) -> Vec<String> {
        let devices = self.devices.read().await;
        let mut ids: Vec<String> = devices.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// Returns true if the device has an active record.
    pub async fn is_tracked(&self, id: &str) -> bool {
        self.devices.read().await.contains_key(id)
    }

    /// Returns the current escalation stage of a tracked device.
    pub async fn stage(&self, id: &str) -> Option<Stage> {
        let devices = self.devices.read().await;
        let record = devices.get(id)?;
        let rec = record.lock().await;
        Some(rec.stage)
    }

    /// Spawns the pending timer for a record. Caller holds both locks.
    ///
    /// The timer captures the post-bump epoch; any later mutation bumps it
    /// again, so a fired-but-unprocessed timer turns into a no-op.
    fn arm(
        self: &Arc<Self>,
        id: &str,
        record: &Arc<Mutex<TimeoutRecord>>,
        rec: &mut TimeoutRecord,
        delay: Duration,
    ) {
        let token = CancellationToken::new();
        rec.timer = Some(token.clone());

        let epoch = rec.epoch;
        let id = id.to_string();
        let record = Arc::clone(record);
        let me = Arc::clone(self);
        let runtime = self.runtime_token.clone();

        tokio::spawn(async move {
            let sleep = time::sleep(delay);
            tokio::pin!(sleep);
            tokio::select! {
                _ = &mut sleep => me.on_expiry(id, record, epoch).await,
                _ = token.cancelled() => {}
                _ = runtime.cancelled() => {}
            }
        });
    }

    /// Handles a fired timer. Stage bookkeeping happens under both locks so
    /// no concurrent reset/unregister can interleave; callbacks are
    /// dispatched after the locks are released.
    async fn on_expiry(self: Arc<Self>, id: String, record: Arc<Mutex<TimeoutRecord>>, epoch: u64) {
        let (device, escalation) = {
            let mut devices = self.devices.write().await;
            let mut rec = record.lock().await;
            if rec.epoch != epoch {
                return;
            }

            match rec.stage {
                Stage::Normal => {
                    rec.stage = Stage::LastChance;
                    rec.epoch += 1;
                    rec.timer = None;
                    self.bus.publish(
                        Event::now(EventKind::LastChanceEntered)
                            .with_device(id.clone())
                            .with_delay(self.grace),
                    );
                    let grace = self.grace;
                    let device = Arc::clone(&rec.device);
                    self.arm(&id, &record, &mut rec, grace);
                    (device, Escalation::LastChance)
                }
                Stage::LastChance => {
                    rec.epoch += 1;
                    rec.timer = None;
                    let device = Arc::clone(&rec.device);
                    drop(rec);
                    devices.remove(&id);
                    self.bus
                        .publish(Event::now(EventKind::DeviceTimedOut).with_device(id.clone()));
                    (device, Escalation::Timeout)
                }
            }
        };

        self.dispatch(device, escalation);
    }

    /// Runs a device callback on a detached task with panic isolation.
    fn dispatch(&self, device: DeviceRef, escalation: Escalation) {
        let bus = self.bus.clone();
        tokio::spawn(async move {
            let id: Arc<str> = Arc::from(device.id());
            let fut = async {
                match escalation {
                    Escalation::LastChance => device.on_last_chance().await,
                    Escalation::Timeout => device.on_timeout().await,
                }
            };

            match std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    bus.publish(
                        Event::now(EventKind::CallbackFailed)
                            .with_device(id)
                            .with_reason(e.to_string()),
                    );
                }
                Err(panic_err) => {
                    let info = {
                        let any = &*panic_err;
                        if let Some(msg) = any.downcast_ref::<&'static str>() {
                            (*msg).to_string()
                        } else if let Some(msg) = any.downcast_ref::<String>() {
                            msg.clone()
                        } else {
                            "unknown panic".to_string()
                        }
                    };
                    bus.publish(
                        Event::now(EventKind::CallbackPanicked)
                            .with_device(id)
                            .with_reason(info),
                    );
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::broadcast::Receiver;

    use crate::devices::{DeviceClass, DeviceHandle};
    use crate::error::DeviceError;

    #[derive(Default)]
    struct Probe {
        last_chance: AtomicUsize,
        timeout: AtomicUsize,
        panic_on_last_chance: bool,
    }

    struct TestDevice {
        id: String,
        probe: Arc<Probe>,
    }

    #[async_trait]
    impl DeviceHandle for TestDevice {
        fn id(&self) -> &str {
            &self.id
        }

        fn class(&self) -> DeviceClass {
            DeviceClass::Mains
        }

        async fn on_last_chance(&self) -> Result<(), DeviceError> {
            self.probe.last_chance.fetch_add(1, Ordering::SeqCst);
            if self.probe.panic_on_last_chance {
                panic!("probe exploded");
            }
            Ok(())
        }

        async fn on_timeout(&self) -> Result<(), DeviceError> {
            self.probe.timeout.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn poll(&self) -> Result<(), DeviceError> {
            Ok(())
        }
    }

    fn tracker(grace: Duration) -> (Arc<LivenessTracker>, Receiver<Event>) {
        let bus = Bus::new(64);
        let rx = bus.subscribe();
        let tracker = LivenessTracker::new(bus, grace, CancellationToken::new());
        (tracker, rx)
    }

    fn device(id: &str, probe: &Arc<Probe>) -> DeviceRef {
        Arc::new(TestDevice {
            id: id.to_string(),
            probe: Arc::clone(probe),
        })
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
    async fn test_register_rejects_zero_interval() {
        let (tracker, _rx) = tracker(Duration::from_secs(30));
        let probe = Arc::new(Probe::default());

        let err = tracker
            .register(device("d1", &probe), Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::InvalidInterval { .. }));
        assert!(!tracker.is_tracked("d1").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silence_escalates_through_both_stages() {
        let (tracker, mut rx) = tracker(Duration::from_secs(30));
        let probe = Arc::new(Probe::default());
        tracker
            .register(device("d1", &probe), Duration::from_secs(100))
            .await
            .unwrap();
        settle().await;

        time::advance(Duration::from_secs(101)).await;
        settle().await;

        assert_eq!(probe.last_chance.load(Ordering::SeqCst), 1);
        assert_eq!(probe.timeout.load(Ordering::SeqCst), 0);
        assert_eq!(tracker.stage("d1").await, Some(Stage::LastChance));

        time::advance(Duration::from_secs(31)).await;
        settle().await;

        assert_eq!(probe.timeout.load(Ordering::SeqCst), 1);
        assert!(!tracker.is_tracked("d1").await);

        let kinds = drain(&mut rx);
        assert_eq!(
            kinds,
            vec![
                EventKind::DeviceRegistered,
                EventKind::LastChanceEntered,
                EventKind::DeviceTimedOut,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_prevents_escalation() {
        let (tracker, _rx) = tracker(Duration::from_secs(30));
        let probe = Arc::new(Probe::default());
        tracker
            .register(device("d1", &probe), Duration::from_secs(100))
            .await
            .unwrap();

        for _ in 0..5 {
            time::advance(Duration::from_secs(60)).await;
            tracker.reset("d1").await;
        }
        settle().await;

        assert_eq!(probe.last_chance.load(Ordering::SeqCst), 0);
        assert_eq!(tracker.stage("d1").await, Some(Stage::Normal));
    }

    #[tokio::test(start_paused = true)]
    async fn test_racing_resets_leave_single_timer() {
        let (tracker, _rx) = tracker(Duration::from_secs(30));
        let probe = Arc::new(Probe::default());
        tracker
            .register(device("d1", &probe), Duration::from_secs(100))
            .await
            .unwrap();

        // Several tasks hammer reset at once; only the newest armed timer
        // may ever act.
        let mut joins = Vec::new();
        for _ in 0..4 {
            let tracker = Arc::clone(&tracker);
            joins.push(tokio::spawn(async move {
                for _ in 0..25 {
                    tracker.reset("d1").await;
                    tokio::task::yield_now().await;
                }
            }));
        }
        for join in joins {
            join.await.unwrap();
        }

        time::advance(Duration::from_secs(101)).await;
        settle().await;

        assert_eq!(probe.last_chance.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.stage("d1").await, Some(Stage::LastChance));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_rescues_last_chance_device() {
        let (tracker, _rx) = tracker(Duration::from_secs(30));
        let probe = Arc::new(Probe::default());
        tracker
            .register(device("d1", &probe), Duration::from_secs(100))
            .await
            .unwrap();
        settle().await;

        time::advance(Duration::from_secs(101)).await;
        settle().await;
        assert_eq!(tracker.stage("d1").await, Some(Stage::LastChance));

        // The device answered the proactive re-poll just in time.
        tracker.reset("d1").await;
        assert_eq!(tracker.stage("d1").await, Some(Stage::Normal));
        settle().await;

        // The old grace timer must not fire anything.
        time::advance(Duration::from_secs(31)).await;
        settle().await;
        assert_eq!(probe.timeout.load(Ordering::SeqCst), 0);
        assert!(tracker.is_tracked("d1").await);

        // A fresh full budget is armed.
        time::advance(Duration::from_secs(70)).await;
        settle().await;
        assert_eq!(probe.last_chance.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unregister_cancels_pending_timer() {
        let (tracker, mut rx) = tracker(Duration::from_secs(30));
        let probe = Arc::new(Probe::default());
        tracker
            .register(device("d1", &probe), Duration::from_secs(100))
            .await
            .unwrap();

        tracker.unregister("d1").await;
        tracker.unregister("d1").await; // idempotent

        time::advance(Duration::from_secs(1000)).await;
        settle().await;

        assert_eq!(probe.last_chance.load(Ordering::SeqCst), 0);
        assert_eq!(probe.timeout.load(Ordering::SeqCst), 0);

        let kinds = drain(&mut rx);
        assert_eq!(
            kinds,
            vec![EventKind::DeviceRegistered, EventKind::DeviceUnregistered]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reregister_replaces_budget() {
        let (tracker, _rx) = tracker(Duration::from_secs(30));
        let probe = Arc::new(Probe::default());
        tracker
            .register(device("d1", &probe), Duration::from_secs(100))
            .await
            .unwrap();
        tracker
            .register(device("d1", &probe), Duration::from_secs(200))
            .await
            .unwrap();
        settle().await;

        time::advance(Duration::from_secs(150)).await;
        settle().await;
        assert_eq!(probe.last_chance.load(Ordering::SeqCst), 0);

        time::advance(Duration::from_secs(51)).await;
        settle().await;
        assert_eq!(probe.last_chance.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_callback_panic_does_not_stall_escalation() {
        let (tracker, mut rx) = tracker(Duration::from_secs(30));
        let probe = Arc::new(Probe {
            panic_on_last_chance: true,
            ..Probe::default()
        });
        tracker
            .register(device("d1", &probe), Duration::from_secs(100))
            .await
            .unwrap();
        settle().await;

        time::advance(Duration::from_secs(101)).await;
        settle().await;
        assert_eq!(probe.last_chance.load(Ordering::SeqCst), 1);

        time::advance(Duration::from_secs(31)).await;
        settle().await;
        assert_eq!(probe.timeout.load(Ordering::SeqCst), 1);
        assert!(!tracker.is_tracked("d1").await);

        let kinds = drain(&mut rx);
        assert!(kinds.contains(&EventKind::CallbackPanicked));
        assert!(kinds.contains(&EventKind::DeviceTimedOut));
    }

    #[tokio::test(start_paused = true)]
    async fn test_devices_escalate_independently() {
        let (tracker, _rx) = tracker(Duration::from_secs(30));
        let fast = Arc::new(Probe::default());
        let slow = Arc::new(Probe::default());
        tracker
            .register(device("fast", &fast), Duration::from_secs(50))
            .await
            .unwrap();
        tracker
            .register(device("slow", &slow), Duration::from_secs(500))
            .await
            .unwrap();
        settle().await;

        time::advance(Duration::from_secs(51)).await;
        settle().await;

        assert_eq!(fast.last_chance.load(Ordering::SeqCst), 1);
        assert_eq!(slow.last_chance.load(Ordering::SeqCst), 0);
        assert_eq!(tracker.tracked().await, vec!["fast", "slow"]);
    }
}
