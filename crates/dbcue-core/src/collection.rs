// crates/dbcue-core/src/collection.rs
// ============================================================================
// Module: Blocking Collection Contract
// Description: Capability trait for store-backed blocking FIFO queues.
// Purpose: Layer derived operations once over any primitive supplying
//          add/poll/peek/len.
// Dependencies: async-trait, tokio, tokio-util
// ============================================================================

//! ## Overview
//! [`BlockingQueue`] is the narrow capability surface shared by every queue
//! primitive in the workspace. Implementations supply the five storage-bound
//! operations; everything else (`element`, `remove`, `take`, `drain_into`,
//! `clear`, ...) is derived here exactly once.
//!
//! Invariants:
//! - Capacity is unbounded: `put` delegates to `add` and never blocks,
//!   `remaining_capacity` reports a sentinel.
//! - `take` observes cancellation only between bounded poll segments, never
//!   mid-segment.
//! - Operations the underlying store cannot answer exactly (`contains`) fail
//!   fast instead of returning a partial or stale answer.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::CoordError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Poll segment used by [`BlockingQueue::take`].
///
/// Bounds cancellation responsiveness only; it is not a semantic timeout.
pub const TAKE_POLL_SEGMENT: Duration = Duration::from_secs(60);

/// Capacity sentinel reported by [`BlockingQueue::remaining_capacity`].
pub const UNBOUNDED_CAPACITY: u64 = u64::MAX;

// ============================================================================
// SECTION: Blocking Queue Contract
// ============================================================================

/// FIFO blocking queue capability surface.
///
/// # Invariants
/// - Among entries of one queue, delivery follows insertion order.
/// - `poll_now`/`poll_within` claim at most one entry, exactly once across
///   all concurrent callers.
/// - `peek` and `len` are advisory; their answers may be stale the instant
///   they return.
#[async_trait]
pub trait BlockingQueue<T>: Send + Sync
where
    T: Send + Sync + 'static,
{
    /// Appends a value to the tail of the queue.
    ///
    /// Never blocks beyond store I/O; wakes at most one blocked consumer.
    ///
    /// # Errors
    ///
    /// Returns [`CoordError::Connectivity`] or [`CoordError::Codec`] when the
    /// insert fails.
    async fn add(&self, value: &T) -> Result<(), CoordError>;

    /// Claims and returns the head of the queue without blocking.
    ///
    /// Returns `None` when no entry is available; losing a claim race is not
    /// an error.
    ///
    /// # Errors
    ///
    /// Returns [`CoordError::Connectivity`] or [`CoordError::Codec`] when the
    /// claim fails.
    async fn poll_now(&self) -> Result<Option<T>, CoordError>;

    /// Claims the head of the queue, blocking up to `timeout`.
    ///
    /// Returns `None` once the deadline passes with no entry claimed.
    ///
    /// # Errors
    ///
    /// Returns [`CoordError::Connectivity`] or [`CoordError::Codec`] when a
    /// claim attempt or wait fails.
    async fn poll_within(&self, timeout: Duration) -> Result<Option<T>, CoordError>;

    /// Returns the head of the queue without claiming it.
    ///
    /// Advisory only: another consumer may claim the entry before the caller
    /// acts on it.
    ///
    /// # Errors
    ///
    /// Returns [`CoordError::Connectivity`] or [`CoordError::Codec`] when the
    /// read fails.
    async fn peek(&self) -> Result<Option<T>, CoordError>;

    /// Returns the number of unclaimed entries.
    ///
    /// # Errors
    ///
    /// Returns [`CoordError::Connectivity`] when the count fails.
    async fn len(&self) -> Result<u64, CoordError>;

    /// Returns `true` when no unclaimed entry exists.
    ///
    /// # Errors
    ///
    /// Returns [`CoordError::Connectivity`] when the count fails.
    async fn is_empty(&self) -> Result<bool, CoordError> {
        Ok(self.len().await? == 0)
    }

    /// Returns the head of the queue, failing when the queue is empty.
    ///
    /// # Errors
    ///
    /// Returns [`CoordError::Empty`] when no entry exists, otherwise the
    /// errors of [`BlockingQueue::peek`].
    async fn element(&self) -> Result<T, CoordError> {
        self.peek().await?.ok_or(CoordError::Empty)
    }

    /// Claims the head of the queue, failing when the queue is empty.
    ///
    /// # Errors
    ///
    /// Returns [`CoordError::Empty`] when no entry exists, otherwise the
    /// errors of [`BlockingQueue::poll_now`].
    async fn remove(&self) -> Result<T, CoordError> {
        self.poll_now().await?.ok_or(CoordError::Empty)
    }

    /// Appends a value, blocking if the queue is full.
    ///
    /// Capacity is unbounded, so this delegates to [`BlockingQueue::add`]
    /// and never blocks.
    ///
    /// # Errors
    ///
    /// The errors of [`BlockingQueue::add`].
    async fn put(&self, value: &T) -> Result<(), CoordError> {
        self.add(value).await
    }

    /// Claims the head of the queue, blocking until one is available.
    ///
    /// Polls in segments of [`TAKE_POLL_SEGMENT`] and observes `cancel`
    /// between segments, so cancellation latency is bounded by one segment.
    ///
    /// # Errors
    ///
    /// Returns [`CoordError::Cancelled`] when `cancel` fires, otherwise the
    /// errors of [`BlockingQueue::poll_within`].
    async fn take(&self, cancel: &CancellationToken) -> Result<T, CoordError> {
        loop {
            if cancel.is_cancelled() {
                return Err(CoordError::Cancelled);
            }
            if let Some(value) = self.poll_within(TAKE_POLL_SEGMENT).await? {
                return Ok(value);
            }
        }
    }

    /// Drains up to `max` entries into `sink` without blocking.
    ///
    /// Stops at `max` entries or queue exhaustion, whichever comes first, and
    /// returns the number drained.
    ///
    /// # Errors
    ///
    /// The errors of [`BlockingQueue::poll_now`]. Entries drained before a
    /// failure remain in `sink`.
    async fn drain_into(&self, sink: &mut Vec<T>, max: usize) -> Result<usize, CoordError> {
        let mut drained = 0;
        while drained < max {
            match self.poll_now().await? {
                Some(value) => {
                    sink.push(value);
                    drained += 1;
                }
                None => break,
            }
        }
        Ok(drained)
    }

    /// Discards every unclaimed entry.
    ///
    /// Claim-and-discard loop; not atomic as a whole. Entries added
    /// concurrently may survive.
    ///
    /// # Errors
    ///
    /// The errors of [`BlockingQueue::poll_now`].
    async fn clear(&self) -> Result<(), CoordError> {
        while self.poll_now().await?.is_some() {
            // Keep discarding until the queue reports empty.
        }
        Ok(())
    }

    /// Reports remaining capacity.
    ///
    /// Always [`UNBOUNDED_CAPACITY`]; the store imposes no entry limit.
    fn remaining_capacity(&self) -> u64 {
        UNBOUNDED_CAPACITY
    }

    /// Containment probe.
    ///
    /// The store offers no exact membership answer for opaque payloads, so
    /// this fails fast rather than scanning and lying.
    ///
    /// # Errors
    ///
    /// Always returns [`CoordError::Unsupported`].
    fn contains(&self, _value: &T) -> Result<bool, CoordError> {
        Err(CoordError::Unsupported("contains"))
    }
}
