// SPDX-License-Identifier: MIT OR Apache-2.0
//! A cancellation source that records why it fired.

use crate::reason::CancellationReason;
use crate::token::CancellationToken;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
struct Cause {
    reason: CancellationReason,
    triggered_by: Option<String>,
}

/// Wraps a [`CancellationToken`] together with the reason it was cancelled
/// and the signal that triggered it.
///
/// Only the **first** cancellation is recorded; subsequent calls still signal
/// the token but do not overwrite the cause.
#[derive(Clone)]
pub struct CancellationSource {
    token: CancellationToken,
    cause: Arc<Mutex<Option<Cause>>>,
}

impl CancellationSource {
    /// Create a source wrapping a fresh root token.
    #[must_use]
    pub fn new() -> Self {
        Self::from_token(CancellationToken::new())
    }

    /// Create a source wrapping the given token.
    ///
    /// Useful for deriving a run-scoped source from a caller-provided token.
    #[must_use]
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            cause: Arc::new(Mutex::new(None)),
        }
    }

    /// Cancel with the given reason and optional triggering signal name.
    ///
    /// Returns `true` if this call was the first cancellation.
    pub fn cancel(&self, reason: CancellationReason, triggered_by: Option<&str>) -> bool {
        let first = {
            let mut guard = self.cause.lock().expect("cause lock poisoned");
            if guard.is_some() {
                false
            } else {
                *guard = Some(Cause {
                    reason,
                    triggered_by: triggered_by.map(str::to_owned),
                });
                true
            }
        };
        self.token.cancel();
        first
    }

    /// Returns `true` if the source (or a parent of its token) is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The recorded reason, or [`CancellationReason::None`] when not cancelled.
    #[must_use]
    pub fn reason(&self) -> CancellationReason {
        self.cause
            .lock()
            .expect("cause lock poisoned")
            .as_ref()
            .map_or(CancellationReason::None, |c| c.reason)
    }

    /// Name of the signal that triggered cancellation, if one was recorded.
    #[must_use]
    pub fn triggered_by(&self) -> Option<String> {
        self.cause
            .lock()
            .expect("cause lock poisoned")
            .as_ref()
            .and_then(|c| c.triggered_by.clone())
    }

    /// A clone of the underlying token.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Default for CancellationSource {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationSource")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_tracks_reason_and_trigger() {
        let source = CancellationSource::new();
        assert_eq!(source.reason(), CancellationReason::None);
        assert!(source.cancel(CancellationReason::GlobalTimeout, Some("db")));
        assert!(source.is_cancelled());
        assert_eq!(source.reason(), CancellationReason::GlobalTimeout);
        assert_eq!(source.triggered_by().as_deref(), Some("db"));
    }

    #[test]
    fn first_cancellation_wins() {
        let source = CancellationSource::new();
        assert!(source.cancel(CancellationReason::BundleCancelled, Some("cache")));
        assert!(!source.cancel(CancellationReason::GlobalTimeout, None));
        assert_eq!(source.reason(), CancellationReason::BundleCancelled);
        assert_eq!(source.triggered_by().as_deref(), Some("cache"));
    }

    #[test]
    fn from_token_observes_parent() {
        let caller = CancellationToken::new();
        let source = CancellationSource::from_token(caller.child());
        caller.cancel();
        assert!(source.is_cancelled());
        // The caller cancelled the token directly, so no reason was recorded.
        assert_eq!(source.reason(), CancellationReason::None);
    }
}
