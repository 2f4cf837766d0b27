// SPDX-License-Identifier: MIT OR Apache-2.0
//! Hierarchical cancellation scopes.
//!
//! A scope is a node in a tree. Each scope owns a [`CancellationSource`]
//! whose token is derived from the parent's, so cancelling a parent is
//! observable on every descendant token. Cancelling a parent also walks the
//! tree so that each descendant records [`CancellationReason::ScopeCancelled`]
//! with the parent's triggering signal propagated.

use crate::reason::CancellationReason;
use crate::source::CancellationSource;
use crate::token::CancellationToken;
use std::sync::{Arc, Mutex, Weak};

/// A node in the hierarchical cancellation tree.
///
/// Scopes are always handled through `Arc` so children can hold a parent
/// pointer while the tree holds only weak references downward.
pub struct CancellationScope {
    name: String,
    parent: Option<Arc<CancellationScope>>,
    source: CancellationSource,
    children: Mutex<Vec<Weak<CancellationScope>>>,
}

impl CancellationScope {
    /// Create a root scope with the given name.
    #[must_use]
    pub fn root(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            parent: None,
            source: CancellationSource::new(),
            children: Mutex::new(Vec::new()),
        })
    }

    /// Create a child scope whose token observes this scope's token.
    #[must_use]
    pub fn child(self: &Arc<Self>, name: impl Into<String>) -> Arc<Self> {
        let child = Arc::new(Self {
            name: name.into(),
            parent: Some(Arc::clone(self)),
            source: CancellationSource::from_token(self.source.token().child()),
            children: Mutex::new(Vec::new()),
        });
        self.children
            .lock()
            .expect("children lock poisoned")
            .push(Arc::downgrade(&child));
        child
    }

    /// The scope's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The parent scope, if any.
    #[must_use]
    pub fn parent(&self) -> Option<&Arc<CancellationScope>> {
        self.parent.as_ref()
    }

    /// A clone of this scope's token.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.source.token()
    }

    /// Cancel this scope and all its descendants.
    ///
    /// The first cancellation wins; later requests are no-ops and do not
    /// re-walk the tree. Descendants record [`CancellationReason::ScopeCancelled`]
    /// with this scope's triggering signal name propagated.
    pub fn cancel(&self, reason: CancellationReason, triggered_by: Option<&str>) {
        if !self.source.cancel(reason, triggered_by) {
            return;
        }
        let children: Vec<Arc<CancellationScope>> = {
            let guard = self.children.lock().expect("children lock poisoned");
            guard.iter().filter_map(Weak::upgrade).collect()
        };
        for child in children {
            child.cancel(CancellationReason::ScopeCancelled, triggered_by);
        }
    }

    /// Returns `true` once this scope (or an ancestor) has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.source.is_cancelled()
    }

    /// The reason recorded on **this** scope, or `None` when not cancelled.
    #[must_use]
    pub fn reason(&self) -> CancellationReason {
        self.source.reason()
    }

    /// Name of the signal whose failure triggered cancellation, if recorded.
    #[must_use]
    pub fn triggered_by(&self) -> Option<String> {
        self.source.triggered_by()
    }
}

impl std::fmt::Debug for CancellationScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationScope")
            .field("name", &self.name)
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}
