// SPDX-License-Identifier: MIT OR Apache-2.0
//! Why a token, source, or scope was cancelled.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Why a signal, scope, or run was cancelled.
///
/// When several sources race, attribution follows [`priority`](Self::priority):
/// scope-originated reasons outrank the global deadline, which outranks
/// external cancellation. A per-signal timeout is attributed locally before
/// any of these are consulted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CancellationReason {
    /// Not cancelled.
    #[default]
    None,
    /// The run-wide deadline expired.
    GlobalTimeout,
    /// The signal's own timeout expired.
    PerSignalTimeout,
    /// A parent scope was cancelled.
    ScopeCancelled,
    /// A sibling in the same scope failed or timed out.
    BundleCancelled,
    /// A dependency of the signal failed.
    DependencyFailed,
    /// Cancellation arrived from outside the run.
    ExternalCancellation,
}

impl CancellationReason {
    /// Human-readable description of the reason.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::None => "not cancelled",
            Self::GlobalTimeout => "cancelled because the global deadline expired",
            Self::PerSignalTimeout => "cancelled because the signal's own timeout expired",
            Self::ScopeCancelled => "cancelled because a parent scope was cancelled",
            Self::BundleCancelled => "cancelled because a scope sibling failed",
            Self::DependencyFailed => "cancelled because a dependency failed",
            Self::ExternalCancellation => "cancelled from outside the run",
        }
    }

    /// Returns `true` for reasons that originate inside a scope tree.
    #[must_use]
    pub fn is_scope_originated(&self) -> bool {
        matches!(
            self,
            Self::ScopeCancelled | Self::BundleCancelled | Self::DependencyFailed
        )
    }

    /// Attribution rank when several cancellation sources fire at once.
    ///
    /// Higher wins. Scope-originated reasons > global timeout > external.
    #[must_use]
    pub fn priority(&self) -> u8 {
        match self {
            Self::None => 0,
            Self::ExternalCancellation => 1,
            Self::GlobalTimeout => 2,
            Self::PerSignalTimeout => 3,
            Self::ScopeCancelled | Self::BundleCancelled | Self::DependencyFailed => 4,
        }
    }
}

impl std::fmt::Display for CancellationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [CancellationReason; 7] = [
        CancellationReason::None,
        CancellationReason::GlobalTimeout,
        CancellationReason::PerSignalTimeout,
        CancellationReason::ScopeCancelled,
        CancellationReason::BundleCancelled,
        CancellationReason::DependencyFailed,
        CancellationReason::ExternalCancellation,
    ];

    #[test]
    fn all_reasons_have_descriptions() {
        for r in &ALL {
            assert!(!r.description().is_empty(), "{r:?} has empty description");
        }
    }

    #[test]
    fn scope_reasons_outrank_global_timeout() {
        for r in &ALL {
            if r.is_scope_originated() {
                assert!(r.priority() > CancellationReason::GlobalTimeout.priority());
            }
        }
    }

    #[test]
    fn global_timeout_outranks_external() {
        assert!(
            CancellationReason::GlobalTimeout.priority()
                > CancellationReason::ExternalCancellation.priority()
        );
    }

    #[test]
    fn serde_roundtrip() {
        for reason in &ALL {
            let json = serde_json::to_string(reason).unwrap();
            let back: CancellationReason = serde_json::from_str(&json).unwrap();
            assert_eq!(&back, reason);
        }
    }

    #[test]
    fn snake_case_wire_form() {
        let json = serde_json::to_string(&CancellationReason::PerSignalTimeout).unwrap();
        assert_eq!(json, "\"per_signal_timeout\"");
    }
}
