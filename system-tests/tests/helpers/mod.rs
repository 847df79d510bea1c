// system-tests/tests/helpers/mod.rs
// ============================================================================
// Module: System Test Helpers
// Description: Shared MySQL fixture, queue construction, and naming helpers.
// Purpose: Keep the queue/barrier/stress suites on one fixture and one
//          naming scheme.
// ============================================================================

//! ## Overview
//! Shared helpers for the MySQL-backed system-test suites: the lazily started
//! store fixture, queue construction with test-sized tuning, and per-test
//! unique naming so suites can share one server.

#![allow(dead_code, reason = "Shared helpers are reused across multiple test suites.")]

pub mod bitset;
pub mod infra;

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::UNIX_EPOCH;

use dbcue_core::JsonCodec;
use dbcue_mysql::MysqlWorkQueue;
use dbcue_mysql::QueueConfig;
use tokio::sync::OnceCell;

/// One fixture per test binary; containers are expensive to boot.
static FIXTURE: OnceCell<infra::MySqlFixture> = OnceCell::const_new();

/// Monotonic suffix so names stay unique within one process.
static NAME_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Returns the shared MySQL fixture, starting it on first use.
pub async fn fixture() -> &'static infra::MySqlFixture {
    FIXTURE
        .get_or_init(|| async {
            init_tracing();
            infra::MySqlFixture::start().await.expect("mysql fixture should start")
        })
        .await
}

/// Builds a queue of `u32` payloads with test-friendly wait tuning.
pub fn queue(
    fixture: &infra::MySqlFixture,
    name: &str,
    wait_segment_ms: u64,
    retention_seconds: u64,
) -> MysqlWorkQueue<u32> {
    MysqlWorkQueue::new(
        fixture.pool.clone(),
        name,
        "system-tests",
        Arc::new(JsonCodec),
        QueueConfig { wait_segment_ms, retention_seconds },
    )
    .expect("queue construction should succeed")
}

/// Returns a queue/barrier name unique to this test invocation.
///
/// Suites may share one store (env-supplied or containerized), so every test
/// isolates itself by name.
pub fn unique_name(prefix: &str) -> String {
    let seq = NAME_COUNTER.fetch_add(1, Ordering::Relaxed);
    let nanos = std::time::SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.subsec_nanos())
        .unwrap_or(0);
    format!("{prefix}-{}-{seq}-{nanos}", std::process::id())
}

/// Installs the fmt subscriber once; honors `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
