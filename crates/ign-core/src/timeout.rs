// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pluggable effective-timeout decisions.

use crate::options::IgnitionOptions;
use crate::signal::Signal;
use std::time::Duration;

/// The effective timeout decision for one signal execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveTimeout {
    /// The deadline to race the wait against. `None` disables the
    /// per-signal timer entirely.
    pub timeout: Option<Duration>,
    /// Whether expiry cancels the signal's wait.
    pub cancel_on_timeout: bool,
}

/// Decides the effective timeout for each signal execution.
///
/// When a strategy is configured it wins over the signal's own declared
/// timeout. The strategy is consulted exactly once per execution and must be
/// deterministic and thread-safe.
pub trait TimeoutStrategy: Send + Sync {
    /// The timeout to apply to this execution of `signal`.
    fn effective_timeout(&self, signal: &dyn Signal, options: &IgnitionOptions) -> EffectiveTimeout;

    /// Stable name used in logs and recordings.
    fn name(&self) -> &str;
}

/// The default decision: the signal's own timeout, cancellation per
/// `cancel_individual_on_timeout`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTimeoutStrategy;

impl TimeoutStrategy for DefaultTimeoutStrategy {
    fn effective_timeout(&self, signal: &dyn Signal, options: &IgnitionOptions) -> EffectiveTimeout {
        EffectiveTimeout {
            timeout: signal.timeout(),
            cancel_on_timeout: options.cancel_individual_on_timeout,
        }
    }

    fn name(&self) -> &str {
        "default"
    }
}

/// Applies one timeout to every signal, regardless of what each declares.
#[derive(Debug, Clone, Copy)]
pub struct FixedTimeoutStrategy {
    /// The uniform timeout; `None` disables per-signal timers run-wide.
    pub timeout: Option<Duration>,
    /// Whether expiry cancels the wait.
    pub cancel_on_timeout: bool,
}

impl TimeoutStrategy for FixedTimeoutStrategy {
    fn effective_timeout(&self, _signal: &dyn Signal, _options: &IgnitionOptions) -> EffectiveTimeout {
        EffectiveTimeout {
            timeout: self.timeout,
            cancel_on_timeout: self.cancel_on_timeout,
        }
    }

    fn name(&self) -> &str {
        "fixed"
    }
}
