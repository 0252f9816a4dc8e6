//! # Poller: per-device fallback poll workers.
//!
//! Devices that report on their own terms still get polled as a fallback so
//! a quiet-but-healthy device never escalates. Each registered device owns
//! one worker task:
//! ```text
//! register(device, schedule)
//!   │
//!   ▼
//! worker: sleep(first_poll_delay) ──► poll ──► sleep(poll_period) ──► poll ──► ...
//!              ▲                       │
//!              │ wake (request_poll)   ├─ Ok   → liveness reset
//!              └───────────────────────┤
//!                                      ├─ Err  → PollFailed, schedule continues
//!                                      └─ panic → CallbackPanicked, schedule continues
//! ```
//!
//! The listener task ([`spawn_listener`](Poller::spawn_listener)) watches the
//! bus for devices entering their last-chance window and pokes their worker,
//! which is the proactive re-poll that can rescue them.
//!
//! ## Rules
//! - A poke resets the cadence: after a woken poll, the next one is a full
//!   period away.
//! - The optional semaphore caps device polls in flight across all workers;
//!   the permit is held for the whole poll, waiting does not skip a poll.
//! - Poll outcomes never stop the schedule; only `unregister`/`shutdown` or
//!   runtime cancellation do.
//! - Re-registering or unregistering retires the outgoing worker: it is
//!   cancelled, joined for up to the grace window, and aborted past that
//!   so a hung device poll cannot pin the caller.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Notify, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::core::liveness::LivenessTracker;
use crate::devices::DeviceRef;
use crate::error::DeviceError;
use crate::events::{Bus, Event, EventKind};
use crate::schedule::DeviceSchedule;

/// Running poll worker: cancel handle, wake handle, join for shutdown.
struct PollHandle {
    cancel: CancellationToken,
    wake: Arc<Notify>,
    join: JoinHandle<()>,
}

/// Owns the fallback poll workers.
///
/// ### Responsibilities
/// - One worker per registered device, driven by its [`DeviceSchedule`]
/// - Immediate re-polls on demand ([`request_poll`](Self::request_poll))
/// - Successful polls count as device activity (liveness reset)
/// - Optional global cap on polls in flight
pub struct Poller {
    workers: RwLock<HashMap<String, PollHandle>>,
    bus: Bus,
    liveness: Arc<LivenessTracker>,
    /// Global cap on polls in flight; `None` means unlimited.
    semaphore: Option<Arc<Semaphore>>,
    /// Per-poll deadline; `None` means the device call runs unbounded.
    poll_timeout: Option<Duration>,
    /// How long a retired worker may linger in an in-flight poll before
    /// it is aborted.
    grace: Duration,
    runtime_token: CancellationToken,
}

impl Poller {
    pub fn new(
        bus: Bus,
        liveness: Arc<LivenessTracker>,
        semaphore: Option<Arc<Semaphore>>,
        poll_timeout: Option<Duration>,
        grace: Duration,
        runtime_token: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            workers: RwLock::new(HashMap::new()),
            bus,
            liveness,
            semaphore,
            poll_timeout,
            grace,
            runtime_token,
        })
    }

    /// Installs (or replaces) the fallback poll schedule for a device.
    ///
    /// The first poll fires after `schedule.first_poll_delay`, every
    /// `schedule.poll_period` after that. A previous worker for the same id
    /// is retired before the new one takes over.
    pub async fn register(self: &Arc<Self>, device: DeviceRef, schedule: &DeviceSchedule) {
        let id = device.id().to_string();

        let replaced = {
            let mut workers = self.workers.write().await;
            let replaced = workers.remove(&id);

            let cancel = self.runtime_token.child_token();
            let wake = Arc::new(Notify::new());
            let me = Arc::clone(self);
            let join = tokio::spawn(me.worker(
                device,
                schedule.first_poll_delay,
                schedule.poll_period,
                cancel.clone(),
                Arc::clone(&wake),
            ));
            workers.insert(id.clone(), PollHandle { cancel, wake, join });
            replaced
        };
        if let Some(handle) = replaced {
            self.retire(handle).await;
        }

        self.bus.publish(
            Event::now(EventKind::PollScheduled)
                .with_device(id)
                .with_delay(schedule.poll_period)
                .with_timeout(schedule.first_poll_delay),
        );
    }

    /// Pokes a device's worker for an immediate poll.
    ///
    /// No-op if the device has no poll schedule. The woken poll resets the
    /// cadence, so the next regular poll is a full period later.
    pub async fn request_poll(&self, id: &str) {
        let workers = self.workers.read().await;
        if let Some(handle) = workers.get(id) {
            handle.wake.notify_one();
        }
    }

    /// Removes a device's poll schedule and retires its worker. Idempotent.
    ///
    /// The worker normally exits as soon as it is cancelled; one stuck in
    /// a hung device poll is aborted after the grace window, so this call
    /// always returns.
    pub async fn unregister(&self, id: &str) {
        let removed = {
            let mut workers = self.workers.write().await;
            workers.remove(id)
        };
        if let Some(handle) = removed {
            self.retire(handle).await;
        }
    }

    /// Cancels one worker and joins it, aborting past the grace window.
    ///
    /// A worker parked between polls exits on cancel right away. One that
    /// is inside a device poll finishes that poll first; with no poll
    /// timeout configured a hung device would pin the caller forever,
    /// hence the bound.
    async fn retire(&self, handle: PollHandle) {
        handle.cancel.cancel();
        let mut join = handle.join;
        if time::timeout(self.grace, &mut join).await.is_err() {
            join.abort();
            let _ = join.await;
        }
    }

    /// Returns sorted ids of devices whose workers are still running.
    pub async fn active(&self) -> Vec<String> {
        let workers = self.workers.read().await;
        let mut ids: Vec<String> = workers
            .iter()
            .filter(|(_, handle)| !handle.join.is_finished())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Cancels every worker, then joins them one by one.
    ///
    /// Joins here are unbounded; the caller owns the deadline. A worker is
    /// removed from the map only once its join completes, so a caller that
    /// abandons this future mid-way (grace deadline) still sees the
    /// unfinished workers in [`active`](Self::active).
    pub async fn shutdown(&self) {
        let ids: Vec<String> = {
            let workers = self.workers.read().await;
            for handle in workers.values() {
                handle.cancel.cancel();
            }
            workers.keys().cloned().collect()
        };

        for id in ids {
            let mut workers = self.workers.write().await;
            if let Some(handle) = workers.get_mut(&id) {
                let _ = (&mut handle.join).await;
                workers.remove(&id);
            }
        }
    }

    /// Spawns the bus listener that pokes workers for devices entering their
    /// last-chance window.
    pub fn spawn_listener(self: Arc<Self>) -> JoinHandle<()> {
        let mut rx = self.bus.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = self.runtime_token.cancelled() => return,
                    recv = rx.recv() => match recv {
                        Ok(ev) => {
                            if ev.kind == EventKind::LastChanceEntered {
                                if let Some(device) = ev.device.as_deref() {
                                    self.request_poll(device).await;
                                }
                            }
                        }
                        Err(RecvError::Lagged(_)) => {
                            self.bus
                                .publish(Event::subscriber_overflow("poll_listener", "lagged"));
                        }
                        Err(RecvError::Closed) => return,
                    },
                }
            }
        })
    }

    /// Worker loop for one device.
    async fn worker(
        self: Arc<Self>,
        device: DeviceRef,
        first: Duration,
        period: Duration,
        cancel: CancellationToken,
        wake: Arc<Notify>,
    ) {
        let mut delay = first;
        loop {
            tokio::select! {
                _ = time::sleep(delay) => {}
                _ = wake.notified() => {}
                _ = cancel.cancelled() => return,
            }
            delay = period;

            let _permit = match &self.semaphore {
                Some(semaphore) => {
                    tokio::select! {
                        permit = Arc::clone(semaphore).acquire_owned() => match permit {
                            Ok(p) => Some(p),
                            Err(_) => return,
                        },
                        _ = cancel.cancelled() => return,
                    }
                }
                None => None,
            };
            self.poll_once(&device).await;
        }
    }

    /// Runs one poll with deadline and panic isolation, then reports the
    /// outcome. Success counts as device activity.
    async fn poll_once(&self, device: &DeviceRef) {
        let id: Arc<str> = Arc::from(device.id());
        let poll = async {
            match self.poll_timeout {
                Some(limit) => match time::timeout(limit, device.poll()).await {
                    Ok(result) => result,
                    Err(_) => Err(DeviceError::Timeout { timeout: limit }),
                },
                None => device.poll().await,
            }
        };

        match std::panic::AssertUnwindSafe(poll).catch_unwind().await {
            Ok(Ok(())) => self.liveness.reset(&id).await,
            Ok(Err(e)) => {
                self.bus.publish(
                    Event::now(EventKind::PollFailed)
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
                self.bus.publish(
                    Event::now(EventKind::CallbackPanicked)
                        .with_device(id)
                        .with_reason(info),
                );
            }
        }
    }
}
