// crates/dbcue-mysql/src/schema.rs
// ============================================================================
// Module: Queue Schema
// Description: DDL for the shared work queue table.
// Purpose: Document the persisted shape and offer a bootstrap helper for
//          tests and first deployment.
// Dependencies: dbcue-core, sqlx
// ============================================================================

//! ## Overview
//! One table backs every queue. Schema management is a deployment concern;
//! [`ensure_schema`] exists so tests and fresh environments can bootstrap
//! without a migration framework.
//!
//! Invariants:
//! - `id` is store-assigned and strictly increasing; it is the authority
//!   for delivery order (timestamps are informational only).
//! - `acquired_at`/`acquired_by` are NULL until the row is claimed and are
//!   written exactly once. `DATETIME(6)` is used instead of `TIMESTAMP` so
//!   the server never auto-populates them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use dbcue_core::CoordError;
use sqlx::Executor;
use sqlx::mysql::MySqlPool;

use crate::session::connectivity;

// ============================================================================
// SECTION: DDL
// ============================================================================

/// DDL for the shared work queue table.
pub const QUEUE_TABLE_DDL: &str = "CREATE TABLE IF NOT EXISTS work_queue ( \
     id          BIGINT UNSIGNED NOT NULL AUTO_INCREMENT, \
     queue_name  VARCHAR(190)    NOT NULL, \
     inserted_at DATETIME(6)     NOT NULL, \
     inserted_by VARCHAR(190)    NOT NULL, \
     acquired_at DATETIME(6)     NULL, \
     acquired_by VARCHAR(190)    NULL, \
     payload     BLOB            NOT NULL, \
     PRIMARY KEY (id), \
     KEY idx_work_queue_claim (queue_name, acquired_at, id) \
     ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4";

// ============================================================================
// SECTION: Bootstrap
// ============================================================================

/// Creates the work queue table when it does not exist yet.
///
/// # Errors
///
/// Returns [`CoordError::Connectivity`] when the DDL fails.
pub async fn ensure_schema(pool: &MySqlPool) -> Result<(), CoordError> {
    pool.execute(QUEUE_TABLE_DDL).await.map_err(connectivity)?;
    Ok(())
}
