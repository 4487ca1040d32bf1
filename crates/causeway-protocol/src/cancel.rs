// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cooperative cancellation token passed alongside every exchange.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

use serde_json::Value;
use tokio::sync::Notify;

/// One-shot cooperative cancellation token.
///
/// Cloneable and backed by an `Arc`; cancelling any clone signals all
/// waiters. The token is monotonic: once aborted it stays aborted, and the
/// first abort's reason wins. Waiters that register after the abort complete
/// immediately.
#[derive(Clone, Debug)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    reason: Mutex<Option<Value>>,
    notify: Notify,
}

impl CancelToken {
    /// Create a new, non-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner::default()),
        }
    }

    /// Signal cancellation to all waiters, recording `reason`.
    ///
    /// Only the first call takes effect; later calls are no-ops.
    pub fn cancel(&self, reason: Value) {
        {
            let mut slot = self
                .inner
                .reason
                .lock()
                .expect("cancel reason lock poisoned");
            if self.inner.cancelled.load(Ordering::SeqCst) {
                return;
            }
            *slot = Some(reason);
            self.inner.cancelled.store(true, Ordering::SeqCst);
        }
        self.inner.notify.notify_waiters();
    }

    /// Returns `true` once cancellation has been signalled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// The abort reason, if the token has been cancelled.
    #[must_use]
    pub fn reason(&self) -> Option<Value> {
        self.inner
            .reason
            .lock()
            .expect("cancel reason lock poisoned")
            .clone()
    }

    /// Wait until cancellation is signalled (immediately if already
    /// cancelled).
    pub async fn cancelled(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a cancel landing between the
        // check and the await cannot be missed.
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
