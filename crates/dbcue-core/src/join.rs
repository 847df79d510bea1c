// crates/dbcue-core/src/join.rs
// ============================================================================
// Module: Future Joiner
// Description: Deadline-bounded collector for many concurrent task results.
// Purpose: Let callers (and tests) await several outstanding operations with
//          one overall timeout and first-failure-wins semantics.
// Dependencies: tokio
// ============================================================================

//! ## Overview
//! Joins a set of already-running tokio tasks. [`join_all`] waits for every
//! task; [`join_all_within`] bounds the whole join by one deadline while
//! keeping the polling fair: each pass polls every pending task with a
//! sub-timeout of `remaining / (2 x pending)`, so every task gets at least
//! two polling opportunities within the budget regardless of how many tasks
//! are outstanding.
//!
//! Invariants:
//! - Results preserve input order.
//! - The first failure aborts the join and discards already-obtained results.
//! - A task that was cancelled surfaces as [`CoordError::Cancelled`] itself,
//!   never wrapped in another variant.
//! - Deadline expiry yields [`CoordError::Timeout`] and no partial results.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use tokio::task::JoinError;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio::time::timeout;

use crate::error::CoordError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Smallest per-task sub-timeout used by a polling pass.
///
/// Keeps passes making progress once the remaining budget divided across
/// pending tasks would round down to nothing.
const MIN_POLL_SLICE: Duration = Duration::from_millis(1);

// ============================================================================
// SECTION: Join Operations
// ============================================================================

/// Waits for every task and returns the results in input order.
///
/// # Errors
///
/// Returns the first task failure encountered, discarding already-obtained
/// results. A cancelled task yields [`CoordError::Cancelled`].
///
/// # Panics
///
/// Resumes the panic of any task that panicked.
pub async fn join_all<T>(
    handles: Vec<JoinHandle<Result<T, CoordError>>>,
) -> Result<Vec<T>, CoordError>
where
    T: Send + 'static,
{
    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(settle(handle.await)?);
    }
    Ok(results)
}

/// Waits for every task, bounded by one overall `budget`.
///
/// Tasks are polled in passes; each pending task receives a sub-timeout of
/// `remaining / (2 x pending)` (floored at [`MIN_POLL_SLICE`]) so the budget
/// is shared fairly however many tasks remain.
///
/// # Errors
///
/// Returns [`CoordError::Timeout`] once the deadline passes with tasks still
/// pending, reporting no partial results. Returns the first task failure
/// encountered; a cancelled task yields [`CoordError::Cancelled`].
///
/// # Panics
///
/// Resumes the panic of any task that panicked.
pub async fn join_all_within<T>(
    handles: Vec<JoinHandle<Result<T, CoordError>>>,
    budget: Duration,
) -> Result<Vec<T>, CoordError>
where
    T: Send + 'static,
{
    let deadline = Instant::now() + budget;
    let total = handles.len();
    let mut pending: Vec<Option<JoinHandle<Result<T, CoordError>>>> =
        handles.into_iter().map(Some).collect();
    let mut slots: Vec<Option<T>> = (0..total).map(|_| None).collect();
    let mut done = 0;

    while done < total {
        let now = Instant::now();
        if now >= deadline {
            return Err(CoordError::Timeout);
        }
        let slice = poll_slice(deadline - now, total - done);

        for index in 0..total {
            let Some(handle) = pending[index].as_mut() else {
                continue;
            };
            match timeout(slice, &mut *handle).await {
                Ok(outcome) => {
                    pending[index] = None;
                    slots[index] = Some(settle(outcome)?);
                    done += 1;
                }
                Err(_elapsed) => {
                    if Instant::now() >= deadline {
                        return Err(CoordError::Timeout);
                    }
                }
            }
        }
    }

    Ok(slots.into_iter().flatten().collect())
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Sizes one per-task sub-timeout from the remaining budget.
fn poll_slice(remaining: Duration, pending_count: usize) -> Duration {
    let shares = u32::try_from(pending_count)
        .unwrap_or(u32::MAX)
        .saturating_mul(2)
        .max(1);
    (remaining / shares).max(MIN_POLL_SLICE)
}

/// Maps one joined task outcome onto the coordination taxonomy.
///
/// Cancellation is surfaced as [`CoordError::Cancelled`] directly rather
/// than wrapped; a panicked task has its panic resumed on the joining task.
fn settle<T>(outcome: Result<Result<T, CoordError>, JoinError>) -> Result<T, CoordError> {
    match outcome {
        Ok(result) => result,
        Err(join_err) if join_err.is_panic() => std::panic::resume_unwind(join_err.into_panic()),
        Err(_cancelled) => Err(CoordError::Cancelled),
    }
}
