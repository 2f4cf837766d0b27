// SPDX-License-Identifier: MIT OR Apache-2.0
//! ign-cancel
//!
//! Cancellation primitives for ignition runs: a cheaply-cloneable
//! [`CancellationToken`], a reason-carrying [`CancellationSource`], and the
//! hierarchical [`CancellationScope`] tree used to group signals that should
//! fail together.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Reasons a token, source, or scope was cancelled.
pub mod reason;
/// Hierarchical cancellation scopes.
pub mod scope;
/// Reason-carrying cancellation source.
pub mod source;
/// The shared cancellation token.
pub mod token;

pub use reason::CancellationReason;
pub use scope::CancellationScope;
pub use source::CancellationSource;
pub use token::CancellationToken;
