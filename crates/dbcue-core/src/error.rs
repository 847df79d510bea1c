// crates/dbcue-core/src/error.rs
// ============================================================================
// Module: Coordination Error Taxonomy
// Description: Stable error variants shared by all coordination primitives.
// Purpose: Give callers a programmatic surface for connectivity, cancellation,
//          timeout, and capability failures.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! One taxonomy covers every primitive in the workspace. The variants map to
//! distinct caller decisions:
//! - [`CoordError::Connectivity`] is fatal for the failing call; no primitive
//!   retries it internally. Retry policy belongs to the caller.
//! - [`CoordError::Cancelled`] is cooperative and observed only at bounded
//!   wait boundaries.
//! - [`CoordError::Timeout`] is a distinct outcome, never silently folded
//!   into success. Empty results from `peek`/`poll` are `Option::None`, not
//!   an error.
//!
//! Invariants:
//! - Variants are stable for programmatic handling.
//! - A cancellation is never wrapped inside another variant; joiners unwrap
//!   it before propagating.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

// ============================================================================
// SECTION: Error Taxonomy
// ============================================================================

/// Errors returned by coordination primitives.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - `Connectivity` carries the backend message verbatim; the backend error
///   type does not leak into this crate.
#[derive(Debug, Error)]
pub enum CoordError {
    /// The shared store is unreachable or rejected the operation.
    #[error("store connectivity failure: {0}")]
    Connectivity(String),
    /// The call was cancelled cooperatively between bounded wait segments.
    #[error("operation cancelled")]
    Cancelled,
    /// The overall deadline elapsed before the operation completed.
    #[error("operation timed out")]
    Timeout,
    /// No element was available where one was required.
    #[error("no element available")]
    Empty,
    /// The operation is deliberately not implemented by this primitive.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
    /// A queue or barrier name failed validation.
    #[error("invalid coordination name: {0}")]
    InvalidName(String),
    /// Payload encoding or decoding failed.
    #[error("payload codec failure: {0}")]
    Codec(String),
}

impl CoordError {
    /// Returns `true` when the error is a cooperative cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns `true` when the error is a deadline expiry.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}
