// crates/dbcue-mysql/src/queue.rs
// ============================================================================
// Module: Work Queue
// Description: FIFO blocking work queue persisted in MySQL.
// Purpose: Deliver each enqueued entry to exactly one consumer, in id order,
//          across any number of processes.
// Dependencies: dbcue-core, async-trait, serde, sqlx, tokio-util, tracing
// ============================================================================

//! ## Overview
//! One table holds every queue; rows are scoped by `queue_name`. Producers
//! insert a row and signal the queue's wait barrier; consumers claim the
//! oldest unclaimed row atomically and fall back to the barrier when none is
//! available.
//!
//! The claim runs in a single transaction whose UPDATE both selects the
//! oldest unclaimed row and captures its id as a side effect of the row
//! selection (`id = (SELECT @dbcue_claim_id := id)`). Two claimants can
//! therefore never read the same candidate row before one of them updates
//! it; the losing transaction simply matches zero rows.
//!
//! Invariants:
//! - Row ids are store-assigned, strictly increasing, never reused; id
//!   order, not timestamps, is authoritative for delivery order.
//! - A row transitions Unclaimed -> Claimed exactly once and never back;
//!   cleanup deletes only claimed rows older than the retention window.
//! - `add` and its follow-on signal are two separate store operations; the
//!   resulting lost-wakeup window is bounded by the wait segment, not
//!   eliminated.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use dbcue_core::BlockingQueue;
use dbcue_core::CoordError;
use dbcue_core::PayloadCodec;
use serde::Deserialize;
use sqlx::Executor;
use sqlx::Row;
use sqlx::mysql::MySqlPool;
use tokio_util::sync::CancellationToken;

use crate::barrier::BarrierConfig;
use crate::barrier::WaitBarrier;
use crate::session::connectivity;
use crate::session::validate_name;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default wait segment between claim retries (ms).
const DEFAULT_WAIT_SEGMENT_MS: u64 = 30_000;

/// Default retention window for claimed rows (seconds): ten days.
const DEFAULT_RETENTION_SECONDS: u64 = 10 * 24 * 60 * 60;

/// Inserts a new unclaimed row.
const ADD_QUERY: &str = "INSERT INTO work_queue \
     (queue_name, inserted_at, inserted_by, payload) \
     VALUES (?, NOW(6), ?, ?)";

/// Reads the oldest unclaimed payload without claiming it.
const PEEK_QUERY: &str = "SELECT payload FROM work_queue \
     WHERE acquired_at IS NULL AND queue_name = ? \
     ORDER BY id ASC LIMIT 1";

/// Counts unclaimed rows.
const SIZE_QUERY: &str = "SELECT COUNT(*) FROM work_queue \
     WHERE acquired_at IS NULL AND queue_name = ?";

/// Resets the claim capture variable on this connection.
const CLAIM_RESET: &str = "SET @dbcue_claim_id := -1";

/// Claims the oldest unclaimed row, capturing its id while selecting it.
const CLAIM_UPDATE: &str = "UPDATE work_queue SET \
     id = (SELECT @dbcue_claim_id := id), \
     acquired_at = NOW(6), \
     acquired_by = ? \
     WHERE acquired_at IS NULL AND queue_name = ? \
     ORDER BY id ASC \
     LIMIT 1";

/// Reads the payload of the row just claimed, by captured id.
const CLAIM_READBACK: &str = "SELECT payload FROM work_queue WHERE id = @dbcue_claim_id";

/// Purges old claimed rows of one queue.
const CLEANUP_QUERY: &str = "DELETE FROM work_queue \
     WHERE acquired_at IS NOT NULL \
     AND queue_name = ? \
     AND acquired_at < DATE_SUB(NOW(6), INTERVAL ? SECOND)";

/// Purges old claimed rows of every queue.
const CLEANUP_ALL_QUERY: &str = "DELETE FROM work_queue \
     WHERE acquired_at IS NOT NULL \
     AND acquired_at < DATE_SUB(NOW(6), INTERVAL ? SECOND)";

// ============================================================================
// SECTION: Config
// ============================================================================

/// Configuration for a [`MysqlWorkQueue`].
///
/// # Invariants
/// - `wait_segment_ms` is interpreted as milliseconds and must be greater
///   than zero.
/// - `retention_seconds` is the minimum age of a claimed row before cleanup
///   may delete it.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Bounded wait segment used between claim retries, in milliseconds.
    ///
    /// Bounds lost-wakeup exposure and cancellation latency for blocking
    /// polls. Empirically chosen default; tune per deployment.
    #[serde(default = "default_wait_segment_ms")]
    pub wait_segment_ms: u64,
    /// Retention window for claimed rows, in seconds.
    #[serde(default = "default_retention_seconds")]
    pub retention_seconds: u64,
}

/// Returns the default wait segment in milliseconds.
const fn default_wait_segment_ms() -> u64 {
    DEFAULT_WAIT_SEGMENT_MS
}

/// Returns the default retention window in seconds.
const fn default_retention_seconds() -> u64 {
    DEFAULT_RETENTION_SECONDS
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            wait_segment_ms: default_wait_segment_ms(),
            retention_seconds: default_retention_seconds(),
        }
    }
}

impl QueueConfig {
    /// Returns the wait segment as a duration.
    #[must_use]
    pub const fn wait_segment(&self) -> Duration {
        Duration::from_millis(self.wait_segment_ms)
    }
}

// ============================================================================
// SECTION: Work Queue
// ============================================================================

/// FIFO blocking work queue persisted in MySQL.
///
/// # Invariants
/// - All instances sharing a store and queue name observe one queue; the
///   struct holds no cross-call state beyond configuration.
/// - Every operation acquires its own connection (or transaction) for its
///   duration and releases it on every exit path.
pub struct MysqlWorkQueue<T> {
    /// Shared connection pool.
    pool: MySqlPool,
    /// Queue name scoping rows in the shared table.
    queue_name: String,
    /// Caller identity recorded in `inserted_by`/`acquired_by`.
    identity: String,
    /// Barrier used to block consumers and wake them on add.
    barrier: WaitBarrier,
    /// Caller-supplied payload codec.
    codec: Arc<dyn PayloadCodec<T>>,
    /// Wait and retention tuning.
    config: QueueConfig,
}

impl<T> MysqlWorkQueue<T>
where
    T: Send + Sync + 'static,
{
    /// Creates a queue named `queue_name` over `pool`.
    ///
    /// `identity` is recorded on rows this instance inserts or claims; the
    /// caller decides what it resolves to (hostname, pod name, ...).
    ///
    /// # Errors
    ///
    /// Returns [`CoordError::InvalidName`] when the queue name or
    /// configuration fails validation.
    pub fn new(
        pool: MySqlPool,
        queue_name: &str,
        identity: &str,
        codec: Arc<dyn PayloadCodec<T>>,
        config: QueueConfig,
    ) -> Result<Self, CoordError> {
        validate_name(queue_name)?;
        if identity.is_empty() {
            return Err(CoordError::InvalidName("identity is empty".to_string()));
        }
        if config.wait_segment_ms == 0 {
            return Err(CoordError::InvalidName(format!(
                "queue {queue_name}: wait_segment_ms must be greater than zero"
            )));
        }
        let barrier = WaitBarrier::new(
            pool.clone(),
            &format!("queue-{queue_name}"),
            BarrierConfig { max_wait_segment_ms: config.wait_segment_ms },
        )?;
        Ok(Self {
            pool,
            queue_name: queue_name.to_string(),
            identity: identity.to_string(),
            barrier,
            codec,
            config,
        })
    }

    /// Returns the queue name.
    #[must_use]
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Appends a value to the tail of the queue and wakes one consumer.
    ///
    /// The insert and the wakeup are two separate store operations, not one
    /// transaction; see the module docs for the resulting bounded race.
    ///
    /// # Errors
    ///
    /// Returns [`CoordError::Codec`] when encoding fails or
    /// [`CoordError::Connectivity`] when the insert or signal fails.
    pub async fn add(&self, value: &T) -> Result<(), CoordError> {
        let payload = self.codec.encode(value)?;
        sqlx::query(ADD_QUERY)
            .bind(&self.queue_name)
            .bind(&self.identity)
            .bind(payload)
            .execute(&self.pool)
            .await
            .map_err(connectivity)?;

        self.barrier.signal_one().await?;
        Ok(())
    }

    /// Returns the oldest unclaimed value without claiming it.
    ///
    /// Advisory only: no mutation, no freshness guarantee.
    ///
    /// # Errors
    ///
    /// Returns [`CoordError::Connectivity`] or [`CoordError::Codec`] when
    /// the read fails.
    pub async fn peek(&self) -> Result<Option<T>, CoordError> {
        let row = sqlx::query(PEEK_QUERY)
            .bind(&self.queue_name)
            .fetch_optional(&self.pool)
            .await
            .map_err(connectivity)?;
        self.decode_payload_row(row)
    }

    /// Atomically claims the oldest unclaimed value, without blocking.
    ///
    /// Under N concurrent callers and M available rows, exactly min(N, M)
    /// distinct rows are claimed; a caller losing every race observes
    /// `None`, which is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`CoordError::Connectivity`] or [`CoordError::Codec`] when
    /// the claim transaction fails.
    pub async fn poll_now(&self) -> Result<Option<T>, CoordError> {
        let mut tx = self.pool.begin().await.map_err(connectivity)?;

        (&mut *tx).execute(CLAIM_RESET).await.map_err(connectivity)?;

        let claimed = sqlx::query(CLAIM_UPDATE)
            .bind(&self.identity)
            .bind(&self.queue_name)
            .execute(&mut *tx)
            .await
            .map_err(connectivity)?;

        let row = if claimed.rows_affected() == 0 {
            None
        } else {
            sqlx::query(CLAIM_READBACK)
                .fetch_optional(&mut *tx)
                .await
                .map_err(connectivity)?
        };

        tx.commit().await.map_err(connectivity)?;

        if row.is_some() {
            tracing::trace!(queue = %self.queue_name, "claimed one entry");
        }
        self.decode_payload_row(row)
    }

    /// Claims the oldest unclaimed value, blocking up to `timeout`.
    ///
    /// Loops claim attempts separated by bounded barrier waits (clamped to
    /// the configured wait segment). A wakeup does not guarantee a row
    /// survives to this consumer's retry; losing it to another consumer is
    /// expected.
    ///
    /// # Errors
    ///
    /// Returns [`CoordError::Connectivity`] or [`CoordError::Codec`] when a
    /// claim attempt or wait fails.
    pub async fn poll_within(&self, timeout: Duration) -> Result<Option<T>, CoordError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(value) = self.poll_now().await? {
                return Ok(Some(value));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let segment = (deadline - now).min(self.config.wait_segment());
            // Signalled or expired, retry the claim either way; the signal
            // may have been consumed by a faster competitor.
            self.barrier.wait_for(segment).await?;
        }
    }

    /// Claims the oldest unclaimed value, blocking until one is available.
    ///
    /// Equivalent to an infinite-timeout poll, segmented so `cancel` is
    /// observed at wait-segment granularity.
    ///
    /// # Errors
    ///
    /// Returns [`CoordError::Cancelled`] when `cancel` fires, otherwise the
    /// errors of [`MysqlWorkQueue::poll_within`].
    pub async fn take(&self, cancel: &CancellationToken) -> Result<T, CoordError> {
        loop {
            if cancel.is_cancelled() {
                return Err(CoordError::Cancelled);
            }
            if let Some(value) = self.poll_within(self.config.wait_segment()).await? {
                return Ok(value);
            }
        }
    }

    /// Returns the number of unclaimed rows; advisory, possibly stale.
    ///
    /// # Errors
    ///
    /// Returns [`CoordError::Connectivity`] when the count fails.
    pub async fn len(&self) -> Result<u64, CoordError> {
        let row = sqlx::query(SIZE_QUERY)
            .bind(&self.queue_name)
            .fetch_one(&self.pool)
            .await
            .map_err(connectivity)?;
        let count: i64 = row.try_get(0).map_err(connectivity)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Returns `true` when no unclaimed row exists.
    ///
    /// # Errors
    ///
    /// Returns [`CoordError::Connectivity`] when the count fails.
    pub async fn is_empty(&self) -> Result<bool, CoordError> {
        Ok(self.len().await? == 0)
    }

    /// Discards every unclaimed row by claiming repeatedly.
    ///
    /// Not atomic as a whole; rows added concurrently may survive.
    ///
    /// # Errors
    ///
    /// The errors of [`MysqlWorkQueue::poll_now`].
    pub async fn clear(&self) -> Result<(), CoordError> {
        while self.poll_now().await?.is_some() {
            // Keep claiming and discarding until none remain.
        }
        Ok(())
    }

    /// Purges claimed rows of this queue older than the retention window.
    ///
    /// Never touches unclaimed rows. Returns the number of rows deleted.
    ///
    /// # Errors
    ///
    /// Returns [`CoordError::Connectivity`] when the delete fails.
    pub async fn cleanup(&self) -> Result<u64, CoordError> {
        let result = sqlx::query(CLEANUP_QUERY)
            .bind(&self.queue_name)
            .bind(retention_seconds_param(self.config.retention_seconds))
            .execute(&self.pool)
            .await
            .map_err(connectivity)?;
        Ok(result.rows_affected())
    }

    /// Purges claimed rows of every queue older than the retention window.
    ///
    /// Never touches unclaimed rows. Returns the number of rows deleted.
    ///
    /// # Errors
    ///
    /// Returns [`CoordError::Connectivity`] when the delete fails.
    pub async fn cleanup_all(&self) -> Result<u64, CoordError> {
        let result = sqlx::query(CLEANUP_ALL_QUERY)
            .bind(retention_seconds_param(self.config.retention_seconds))
            .execute(&self.pool)
            .await
            .map_err(connectivity)?;
        Ok(result.rows_affected())
    }

    /// Decodes the payload column of an optional claimed/peeked row.
    fn decode_payload_row(
        &self,
        row: Option<sqlx::mysql::MySqlRow>,
    ) -> Result<Option<T>, CoordError> {
        match row {
            Some(row) => {
                let payload: Vec<u8> = row.try_get(0).map_err(connectivity)?;
                Ok(Some(self.codec.decode(&payload)?))
            }
            None => Ok(None),
        }
    }
}

/// Converts the retention window into the bind parameter for `INTERVAL ?
/// SECOND`, saturating at `i64::MAX`.
fn retention_seconds_param(retention_seconds: u64) -> i64 {
    i64::try_from(retention_seconds).unwrap_or(i64::MAX)
}

// ============================================================================
// SECTION: Blocking Collection Contract
// ============================================================================

#[async_trait]
impl<T> BlockingQueue<T> for MysqlWorkQueue<T>
where
    T: Send + Sync + 'static,
{
    async fn add(&self, value: &T) -> Result<(), CoordError> {
        Self::add(self, value).await
    }

    async fn poll_now(&self) -> Result<Option<T>, CoordError> {
        Self::poll_now(self).await
    }

    async fn poll_within(&self, timeout: Duration) -> Result<Option<T>, CoordError> {
        Self::poll_within(self, timeout).await
    }

    async fn peek(&self) -> Result<Option<T>, CoordError> {
        Self::peek(self).await
    }

    async fn len(&self) -> Result<u64, CoordError> {
        Self::len(self).await
    }

    async fn take(&self, cancel: &CancellationToken) -> Result<T, CoordError> {
        Self::take(self, cancel).await
    }
}
