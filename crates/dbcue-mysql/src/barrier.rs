// crates/dbcue-mysql/src/barrier.rs
// ============================================================================
// Module: Wait Barrier
// Description: Named distributed condition variable over MySQL.
// Purpose: Emulate wait/notify across processes using SLEEP, the session
//          registry, and remote statement cancellation.
// Dependencies: dbcue-core, serde, sqlx, tokio-util, tracing
// ============================================================================

//! ## Overview
//! A wait is a bounded blocking statement (`SELECT SLEEP(..), '<tag>'`) that
//! registers itself in the store's session registry by embedding the barrier
//! tag in its literal text. A signal is the remote cancellation of such a
//! statement. There is no other channel between processes.
//!
//! Invariants:
//! - Each wait segment holds one pooled connection for its duration and
//!   releases it on every exit path.
//! - Cancellation of [`WaitBarrier::wait`] is observed only between
//!   segments, never mid-segment.
//! - [`WaitBarrier::signal_one`] cancels the oldest registered waiter and is
//!   a no-op when none is registered; wakeups are not queued for future
//!   waiters.
//!
//! Known, accepted race: a signal arriving between a caller deciding to wait
//! and its session appearing in the registry is lost. [`WaitBarrier::wait`]
//! re-enters the sleep after every bounded segment, so a lost wakeup delays
//! delivery by at most one segment; it never blocks permanently.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;
use std::time::Instant;

use dbcue_core::CoordError;
use serde::Deserialize;
use sqlx::Executor;
use sqlx::Row;
use sqlx::mysql::MySqlPool;
use tokio_util::sync::CancellationToken;

use crate::session::ER_QUERY_INTERRUPTED;
use crate::session::connectivity;
use crate::session::kill_session_query;
use crate::session::matches_sleep_statement;
use crate::session::mysql_error_number;
use crate::session::sleep_statement;
use crate::session::sleeping_sessions;
use crate::session::validate_name;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Default upper bound for one wait segment (ms).
const DEFAULT_MAX_WAIT_SEGMENT_MS: u64 = 30_000;

/// Configuration for a [`WaitBarrier`].
///
/// # Invariants
/// - `max_wait_segment_ms` is interpreted as milliseconds and must be
///   greater than zero.
#[derive(Debug, Clone, Deserialize)]
pub struct BarrierConfig {
    /// Upper bound for one blocking wait segment, in milliseconds.
    ///
    /// Bounds both cancellation latency and lost-wakeup exposure for
    /// [`WaitBarrier::wait`]. Empirically chosen default; tune per
    /// deployment.
    #[serde(default = "default_max_wait_segment_ms")]
    pub max_wait_segment_ms: u64,
}

/// Returns the default maximum wait segment in milliseconds.
const fn default_max_wait_segment_ms() -> u64 {
    DEFAULT_MAX_WAIT_SEGMENT_MS
}

impl Default for BarrierConfig {
    fn default() -> Self {
        Self { max_wait_segment_ms: default_max_wait_segment_ms() }
    }
}

impl BarrierConfig {
    /// Returns the maximum wait segment as a duration.
    #[must_use]
    pub const fn max_wait_segment(&self) -> Duration {
        Duration::from_millis(self.max_wait_segment_ms)
    }
}

// ============================================================================
// SECTION: Wait Barrier
// ============================================================================

/// Named distributed condition variable layered on a MySQL pool.
///
/// # Invariants
/// - The barrier holds no cross-call state; all coordination lives in the
///   store's session registry. Any number of processes may construct a
///   barrier with the same name against the same store.
pub struct WaitBarrier {
    /// Shared connection pool; one connection is held per wait segment.
    pool: MySqlPool,
    /// Barrier name as supplied by the caller.
    name: String,
    /// Tag embedded in sleep statement literals.
    tag: String,
    /// Wait segment bounds.
    config: BarrierConfig,
}

impl WaitBarrier {
    /// Creates a barrier named `name` over `pool`.
    ///
    /// # Errors
    ///
    /// Returns [`CoordError::InvalidName`] when `name` fails validation or
    /// the configured segment is zero.
    pub fn new(pool: MySqlPool, name: &str, config: BarrierConfig) -> Result<Self, CoordError> {
        validate_name(name)?;
        if config.max_wait_segment_ms == 0 {
            return Err(CoordError::InvalidName(format!(
                "barrier {name}: max_wait_segment_ms must be greater than zero"
            )));
        }
        Ok(Self {
            pool,
            name: name.to_string(),
            tag: format!("dbcue:{name}"),
            config,
        })
    }

    /// Returns the barrier name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Waits until signalled.
    ///
    /// Loops bounded segments of at most the configured maximum, observing
    /// `cancel` between segments.
    ///
    /// # Errors
    ///
    /// Returns [`CoordError::Cancelled`] when `cancel` fires, or
    /// [`CoordError::Connectivity`] when the store is unreachable; neither
    /// is retried here.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<(), CoordError> {
        loop {
            if cancel.is_cancelled() {
                return Err(CoordError::Cancelled);
            }
            if self.wait_segment(self.config.max_wait_segment()).await? {
                return Ok(());
            }
        }
    }

    /// Waits a single bounded segment of up to `duration`.
    ///
    /// Returns `true` when the wait ended by signal, `false` on natural
    /// expiry.
    ///
    /// # Errors
    ///
    /// Returns [`CoordError::Connectivity`] when the store is unreachable.
    pub async fn wait_for(&self, duration: Duration) -> Result<bool, CoordError> {
        self.wait_segment(duration).await
    }

    /// Waits a single bounded segment ending at `deadline`.
    ///
    /// Returns `true` when the wait ended by signal, `false` on natural
    /// expiry (including a deadline already in the past).
    ///
    /// # Errors
    ///
    /// Returns [`CoordError::Connectivity`] when the store is unreachable.
    pub async fn wait_until(&self, deadline: Instant) -> Result<bool, CoordError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        self.wait_segment(remaining).await
    }

    /// Wakes the waiter that has been registered longest.
    ///
    /// No-op returning `false` when no session is registered under this
    /// barrier's tag: wakeups are not queued. Also returns `false` when the
    /// chosen session expired before the cancellation landed.
    ///
    /// # Errors
    ///
    /// Returns [`CoordError::Connectivity`] when the registry query or the
    /// cancellation fails.
    pub async fn signal_one(&self) -> Result<bool, CoordError> {
        let mut conn = self.pool.acquire().await.map_err(connectivity)?;
        let sessions = sleeping_sessions(&mut conn, &self.tag).await?;
        let Some(session_id) = sessions.first().copied() else {
            tracing::debug!(barrier = %self.name, "no registered waiter to signal");
            return Ok(false);
        };
        kill_session_query(&mut conn, session_id).await
    }

    /// Wakes every currently registered waiter.
    ///
    /// Returns the number of sessions cancelled; sessions expiring during
    /// the sweep are skipped, not errors.
    ///
    /// # Errors
    ///
    /// Returns [`CoordError::Connectivity`] when the registry query or a
    /// cancellation fails.
    pub async fn signal_all(&self) -> Result<usize, CoordError> {
        let mut conn = self.pool.acquire().await.map_err(connectivity)?;
        let sessions = sleeping_sessions(&mut conn, &self.tag).await?;
        let mut woken = 0;
        for session_id in sessions {
            if kill_session_query(&mut conn, session_id).await? {
                woken += 1;
            }
        }
        Ok(woken)
    }

    /// Runs one bounded sleep segment registered under this barrier's tag.
    ///
    /// The segment is shortened by the time spent acquiring a connection so
    /// the caller-visible bound holds. Returns `true` when the sleep was
    /// cancelled remotely (`SLEEP() = 1`, or error 1317 on servers that
    /// abort the statement instead).
    async fn wait_segment(&self, duration: Duration) -> Result<bool, CoordError> {
        if duration.is_zero() {
            return Ok(false);
        }

        let started = Instant::now();
        let mut conn = self.pool.acquire().await.map_err(connectivity)?;

        let budget = duration.saturating_sub(started.elapsed());
        if budget.is_zero() {
            return Ok(false);
        }

        // Unprepared on purpose: the registry shows the literal statement
        // text, which is what signal_one/signal_all discover waiters by.
        let statement = sleep_statement(&self.tag, budget);
        debug_assert!(matches_sleep_statement(&statement, &self.tag));

        match (&mut *conn).fetch_one(statement.as_str()).await {
            Ok(row) => {
                let cancelled: i64 = row.try_get(0).map_err(connectivity)?;
                Ok(cancelled == 1)
            }
            Err(err) if mysql_error_number(&err) == Some(ER_QUERY_INTERRUPTED) => Ok(true),
            Err(err) => Err(connectivity(err)),
        }
    }
}
