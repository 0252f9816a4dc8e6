//! # Single-flight completion gate for reconnect attempts.
//!
//! [`AttemptGate`] is the synchronization point that serializes reconnect
//! attempts: the reconnect loop parks on [`wait`](AttemptGate::wait) after
//! requesting a link bring-up, and stays parked until the attempt is declared
//! over (success or failure both count).
//!
//! ## Rules
//! - [`begin`](AttemptGate::begin) arms the gate for a fresh attempt.
//! - [`finish`](AttemptGate::finish) never blocks and takes no lock shared
//!   with the waiter's select. It is safe to call from the state-notification
//!   path, which must be able to release the very wait it would otherwise be
//!   queued behind.
//! - [`wait`](AttemptGate::wait) is interruptible via a [`CancellationToken`];
//!   teardown of the supervisor releases a parked waiter without touching the
//!   link layer.
//! - A `finish` that lands before `wait` is not lost: the completion flag is
//!   re-checked after registering for notification.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Completion gate shared by the reconnect loop, the bring-up task, and the
/// state-notification handler. Cheap to clone.
#[derive(Clone, Debug, Default)]
pub(crate) struct AttemptGate {
    inner: Arc<GateInner>,
}

#[derive(Debug, Default)]
struct GateInner {
    complete: Mutex<bool>,
    notify: Notify,
}

impl AttemptGate {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Arms the gate: the attempt that is about to start is not complete.
    pub(crate) fn begin(&self) {
        let mut complete = self
            .inner
            .complete
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *complete = false;
    }

    /// Declares the in-flight attempt over and wakes every waiter.
    ///
    /// Idempotent; never blocks.
    pub(crate) fn finish(&self) {
        {
            let mut complete = self
                .inner
                .complete
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            *complete = true;
        }
        self.inner.notify.notify_waiters();
    }

    /// Parks until the attempt completes or `cancel` fires.
    ///
    /// The notification is registered **before** the flag check, so a
    /// `finish` racing with entry to this function cannot be missed.
    pub(crate) async fn wait(&self, cancel: &CancellationToken) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_complete() {
                return;
            }
            tokio::select! {
                _ = &mut notified => {
                    if self.is_complete() {
                        return;
                    }
                }
                _ = cancel.cancelled() => return,
            }
        }
    }

    fn is_complete(&self) -> bool {
        *self
            .inner
            .complete
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_finish_before_wait_returns_immediately() {
        let gate = AttemptGate::new();
        gate.begin();
        gate.finish();

        let cancel = CancellationToken::new();
        tokio::time::timeout(Duration::from_secs(1), gate.wait(&cancel))
            .await
            .expect("wait should not park");
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_parks_until_finish() {
        let gate = AttemptGate::new();
        gate.begin();

        let cancel = CancellationToken::new();
        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait(&cancel).await })
        };

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(!waiter.is_finished());

        gate.finish();
        waiter.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_releases_parked_waiter() {
        let gate = AttemptGate::new();
        gate.begin();

        let cancel = CancellationToken::new();
        let waiter = {
            let gate = gate.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { gate.wait(&cancel).await })
        };

        tokio::time::advance(Duration::from_secs(1)).await;
        cancel.cancel();
        waiter.await.unwrap();
    }
}
