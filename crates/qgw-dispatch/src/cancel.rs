// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cooperative cancellation for in-flight upstream requests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// Cancellation handle shared between the request task and whatever
/// observes the client connection.
///
/// Cloneable; cancelling any clone wakes every waiter. The read loop
/// selects on [`cancelled`](CancelToken::cancelled) so a client
/// disconnect tears down the upstream stream promptly.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelToken {
    /// A fresh, non-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation to every waiter.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Whether cancellation has been signalled.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolve once cancellation is signalled; immediately if it already
    /// was.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before the re-check so a cancel() racing this call
        // cannot slip between the flag read and the wait.
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
