// crates/dbcue-mysql/src/lib.rs
// ============================================================================
// Module: DBCUE MySQL Backend
// Description: Wait barrier and work queue over a shared MySQL store.
// Purpose: Implement cross-process wait/notify and blocking dequeue with no
//          channel between processes other than the store itself.
// Dependencies: dbcue-core, async-trait, serde, sqlx, tokio-util, tracing
// ============================================================================

//! ## Overview
//! MySQL offers the two primitives this backend is built from: a statement
//! that blocks its connection for a bounded duration (`SLEEP`) while being
//! visible in an introspectable session registry
//! (`information_schema.PROCESSLIST`), and remote cancellation of another
//! session's in-flight statement (`KILL QUERY`). [`WaitBarrier`] turns those
//! into a named distributed condition variable; [`MysqlWorkQueue`] layers a
//! FIFO blocking queue on top.
//!
//! A store lacking a blocking statement plus a cancelable session registry
//! cannot host this barrier; porting to such a store means substituting its
//! native primitive (blocking pop, pub/sub) behind the
//! [`dbcue_core::BlockingQueue`] contract instead.
//!
//! Concurrency model: every blocking caller holds one pooled connection per
//! wait segment, so the number of concurrently blocked callers is capped by
//! the pool size. Sizing the pool below the expected waiter count deadlocks
//! the waiters; that is a deployment constraint, not a failure this crate
//! detects.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod barrier;
pub mod queue;
pub mod schema;
mod session;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use barrier::BarrierConfig;
pub use barrier::WaitBarrier;
pub use queue::MysqlWorkQueue;
pub use queue::QueueConfig;
pub use schema::QUEUE_TABLE_DDL;
pub use schema::ensure_schema;
pub use session::MAX_NAME_LENGTH;
pub use session::validate_name;
