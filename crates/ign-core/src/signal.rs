// SPDX-License-Identifier: MIT OR Apache-2.0
//! The signal contract and the closure-backed adapter.

use async_trait::async_trait;
use futures::future::BoxFuture;
use ign_cancel::{CancellationScope, CancellationToken};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Opaque failure value captured from a signal's wait.
pub type SignalError = Box<dyn std::error::Error + Send + Sync>;

/// A single unit of startup readiness work.
///
/// A signal is an addressable, cancellable asynchronous operation with a
/// stable name. Names are unique by convention: the coordinator does not
/// enforce uniqueness, but result lookup assumes it.
///
/// The coordinator races [`wait`](Self::wait) against the signal's effective
/// timeout and the run-scoped cancellation token; implementations should
/// also observe the passed token at their own suspension points so an
/// aborted wait releases its resources promptly.
#[async_trait]
pub trait Signal: Send + Sync {
    /// Stable, non-empty name.
    fn name(&self) -> &str;

    /// Optional per-signal timeout. Must be positive when set.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Stage number for staged execution. Signals without an explicit stage
    /// run in stage 0.
    fn stage(&self) -> u32 {
        0
    }

    /// The cancellation scope this signal participates in, if any.
    fn scope(&self) -> Option<Arc<CancellationScope>> {
        None
    }

    /// When `true`, a failure or timeout of this signal cancels its scope,
    /// taking the rest of the bundle down with it.
    fn cancel_scope_on_failure(&self) -> bool {
        false
    }

    /// Perform the readiness work once.
    ///
    /// # Errors
    ///
    /// Any error is captured into the signal's result; it never propagates
    /// past the executor.
    async fn wait(&self, token: CancellationToken) -> Result<(), SignalError>;
}

// ---------------------------------------------------------------------------
// FnSignal
// ---------------------------------------------------------------------------

type WaitFn =
    dyn Fn(CancellationToken) -> BoxFuture<'static, Result<(), SignalError>> + Send + Sync;

/// A [`Signal`] backed by a closure, with builder-style setters for the
/// optional attributes.
///
/// ```
/// use ign_core::FnSignal;
/// use std::time::Duration;
///
/// let signal = FnSignal::new("cache-warm", |_token| async { Ok(()) })
///     .with_timeout(Duration::from_millis(500))
///     .with_stage(1);
/// ```
pub struct FnSignal {
    name: String,
    timeout: Option<Duration>,
    stage: u32,
    scope: Option<Arc<CancellationScope>>,
    cancel_scope_on_failure: bool,
    wait: Box<WaitFn>,
}

impl FnSignal {
    /// Create a signal from a name and an async closure.
    pub fn new<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), SignalError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            timeout: None,
            stage: 0,
            scope: None,
            cancel_scope_on_failure: false,
            wait: Box::new(move |token| Box::pin(f(token))),
        }
    }

    /// A signal that completes immediately. Handy in examples and tests.
    #[must_use]
    pub fn ready(name: impl Into<String>) -> Self {
        Self::new(name, |_| async { Ok(()) })
    }

    /// Set the per-signal timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the stage number.
    #[must_use]
    pub fn with_stage(mut self, stage: u32) -> Self {
        self.stage = stage;
        self
    }

    /// Attach a cancellation scope. When `cancel_on_failure` is set, failure
    /// or timeout of this signal cancels the whole scope.
    #[must_use]
    pub fn with_scope(mut self, scope: Arc<CancellationScope>, cancel_on_failure: bool) -> Self {
        self.scope = Some(scope);
        self.cancel_scope_on_failure = cancel_on_failure;
        self
    }
}

#[async_trait]
impl Signal for FnSignal {
    fn name(&self) -> &str {
        &self.name
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn stage(&self) -> u32 {
        self.stage
    }

    fn scope(&self) -> Option<Arc<CancellationScope>> {
        self.scope.clone()
    }

    fn cancel_scope_on_failure(&self) -> bool {
        self.cancel_scope_on_failure
    }

    async fn wait(&self, token: CancellationToken) -> Result<(), SignalError> {
        (self.wait)(token).await
    }
}

impl std::fmt::Debug for FnSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnSignal")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .field("stage", &self.stage)
            .finish()
    }
}
