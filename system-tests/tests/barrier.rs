// system-tests/tests/barrier.rs
// ============================================================================
// Module: Wait Barrier System Tests
// Description: Signal-one/signal-all/timeout/cancellation tests against a
//              real MySQL session registry.
// Purpose: Validate barrier semantics end to end, store included.
// ============================================================================

//! ## Overview
//! Barrier invariants under test:
//! - `signal_one` wakes exactly one registered waiter.
//! - `signal_all` wakes every registered waiter and reports the count.
//! - Signals never cross barrier names.
//! - An unsignalled bounded wait expires naturally, no earlier than asked.
//! - `wait` observes cancellation within a bounded number of segments.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

mod helpers;

use std::time::Duration;
use std::time::Instant;

use dbcue_core::CoordError;
use dbcue_core::join_all;
use dbcue_mysql::BarrierConfig;
use dbcue_mysql::WaitBarrier;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use helpers::fixture;
use helpers::infra::MySqlFixture;
use helpers::unique_name;

/// Long enough that a registered waiter is still sleeping when signalled,
/// short enough that unsignalled waiters expire within the test.
const WAITER_TIMEOUT: Duration = Duration::from_secs(6);

/// Generous pause for spawned waiters to appear in the session registry.
const REGISTRATION_PAUSE: Duration = Duration::from_secs(1);

fn barrier(fx: &MySqlFixture, name: &str) -> WaitBarrier {
    WaitBarrier::new(fx.pool.clone(), name, BarrierConfig::default())
        .expect("barrier construction should succeed")
}

/// Spawns `count` waiters, each blocking in `wait_for(WAITER_TIMEOUT)` on its
/// own barrier instance, and pauses until they have had time to register.
async fn spawn_waiters(
    fx: &MySqlFixture,
    name: &str,
    count: usize,
) -> Vec<JoinHandle<Result<bool, CoordError>>> {
    let mut handles = Vec::with_capacity(count);
    for _ in 0..count {
        let waiter = barrier(fx, name);
        handles.push(tokio::spawn(async move { waiter.wait_for(WAITER_TIMEOUT).await }));
    }
    tokio::time::sleep(REGISTRATION_PAUSE).await;
    handles
}

// ============================================================================
// SECTION: Signalling
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn signal_one_wakes_exactly_one_waiter() {
    let fx = fixture().await;
    let name = unique_name("one");
    let handles = spawn_waiters(fx, &name, 3).await;

    assert!(barrier(fx, &name).signal_one().await.expect("signal_one"));

    let outcomes = join_all(handles).await.expect("waiters");
    let signalled = outcomes.iter().filter(|woke| **woke).count();
    assert_eq!(signalled, 1, "outcomes: {outcomes:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn signal_all_wakes_every_waiter() {
    let fx = fixture().await;
    let name = unique_name("all");
    let handles = spawn_waiters(fx, &name, 3).await;

    let started = Instant::now();
    assert_eq!(barrier(fx, &name).signal_all().await.expect("signal_all"), 3);

    let outcomes = join_all(handles).await.expect("waiters");
    assert!(outcomes.iter().all(|woke| *woke), "outcomes: {outcomes:?}");
    assert!(
        started.elapsed() < WAITER_TIMEOUT,
        "waiters returned by expiry, not by signal"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn signals_do_not_cross_barrier_names() {
    let fx = fixture().await;
    let waited = unique_name("waited");
    let other = unique_name("other");
    let handles = spawn_waiters(fx, &waited, 1).await;

    // The other barrier sees no registered waiter at all.
    assert_eq!(barrier(fx, &other).signal_all().await.expect("signal_all"), 0);
    assert!(!barrier(fx, &other).signal_one().await.expect("signal_one"));

    let outcomes = join_all(handles).await.expect("waiter");
    assert_eq!(outcomes, vec![false]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn open_ended_wait_returns_when_signalled() {
    let fx = fixture().await;
    let name = unique_name("open");
    let waiter = barrier(fx, &name);

    let cancel = CancellationToken::new();
    let waiter_cancel = cancel.clone();
    let started = Instant::now();
    let blocked = tokio::spawn(async move { waiter.wait(&waiter_cancel).await });

    tokio::time::sleep(REGISTRATION_PAUSE).await;
    assert!(barrier(fx, &name).signal_one().await.expect("signal_one"));

    blocked.await.expect("join").expect("wait should end by signal");
    assert!(
        started.elapsed() < Duration::from_secs(10),
        "wait did not return promptly after the signal"
    );
}

// ============================================================================
// SECTION: Expiry And Cancellation
// ============================================================================

#[tokio::test]
async fn unsignalled_wait_expires_no_earlier_than_asked() {
    let fx = fixture().await;
    let name = unique_name("expiry");
    let timeout = Duration::from_millis(1_500);

    let started = Instant::now();
    let woke = barrier(fx, &name).wait_for(timeout).await.expect("wait_for");
    let elapsed = started.elapsed();

    assert!(!woke);
    assert!(elapsed >= timeout, "expired early after {elapsed:?}");
}

#[tokio::test]
async fn wait_until_past_deadline_returns_immediately() {
    let fx = fixture().await;
    let name = unique_name("past");

    let woke = barrier(fx, &name).wait_until(Instant::now()).await.expect("wait_until");
    assert!(!woke);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn wait_observes_cancellation_between_segments() {
    let fx = fixture().await;
    let name = unique_name("cancel");
    let waiter = WaitBarrier::new(
        fx.pool.clone(),
        &name,
        BarrierConfig { max_wait_segment_ms: 200 },
    )
    .expect("barrier construction should succeed");

    let cancel = CancellationToken::new();
    let waiter_cancel = cancel.clone();
    let blocked = tokio::spawn(async move { waiter.wait(&waiter_cancel).await });

    tokio::time::sleep(Duration::from_millis(400)).await;
    let started = Instant::now();
    cancel.cancel();

    let outcome = blocked.await.expect("join");
    assert!(matches!(outcome, Err(CoordError::Cancelled)), "got {outcome:?}");
    assert!(
        started.elapsed() < Duration::from_secs(3),
        "cancellation latency exceeded a few segments"
    );
}
