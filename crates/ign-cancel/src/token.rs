// SPDX-License-Identifier: MIT OR Apache-2.0
//! The shared cancellation token.

use futures::future::{self, BoxFuture};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// A cloneable, cheaply-shareable token used to signal cancellation.
///
/// All clones share the same underlying state; cancelling one
/// immediately makes every clone observe `is_cancelled() == true`.
///
/// A token may be derived from one or more parents via [`child`](Self::child)
/// or [`linked`](Self::linked). A derived token observes cancellation of any
/// parent, while cancelling the derived token leaves its parents untouched.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

struct TokenInner {
    cancelled: AtomicBool,
    notify: Notify,
    parents: Vec<CancellationToken>,
}

impl CancellationToken {
    /// Create a new root token that is **not** cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::with_parents(Vec::new())
    }

    /// Create a token cancelled whenever `self` is cancelled.
    ///
    /// Cancelling the child does not cancel `self`.
    #[must_use]
    pub fn child(&self) -> Self {
        Self::with_parents(vec![self.clone()])
    }

    /// Create a token cancelled whenever **any** of the given tokens is.
    #[must_use]
    pub fn linked(parents: Vec<CancellationToken>) -> Self {
        Self::with_parents(parents)
    }

    fn with_parents(parents: Vec<CancellationToken>) -> Self {
        Self {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
                parents,
            }),
        }
    }

    /// Signal cancellation. Idempotent; calling more than once is harmless.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Returns `true` if this token or any of its parents has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        if self.inner.cancelled.load(Ordering::SeqCst) {
            return true;
        }
        self.inner.parents.iter().any(CancellationToken::is_cancelled)
    }

    /// Returns `true` if this token itself was cancelled, ignoring parents.
    #[must_use]
    pub fn is_cancelled_locally(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Returns a future that completes when the token is cancelled.
    ///
    /// If the token is already cancelled the future resolves immediately.
    pub fn cancelled(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            loop {
                // Register interest before the flag check so a concurrent
                // cancel cannot slip between check and await.
                let mut notified = Box::pin(self.inner.notify.notified());
                notified.as_mut().enable();
                if self.is_cancelled() {
                    return;
                }
                if self.inner.parents.is_empty() {
                    notified.await;
                } else {
                    let mut waits: Vec<BoxFuture<'_, ()>> =
                        Vec::with_capacity(self.inner.parents.len() + 1);
                    waits.push(Box::pin(async move { notified.await }));
                    for parent in &self.inner.parents {
                        waits.push(Box::pin(parent.cancelled()));
                    }
                    future::select_all(waits).await;
                }
            }
        })
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
