// system-tests/tests/stress.rs
// ============================================================================
// Module: Work Queue Stress Test
// Description: Concurrent producers and consumers racing over one queue.
// Purpose: Shake out duplicate or lost deliveries under sustained claim
//          contention against a real MySQL.
// ============================================================================

//! ## Overview
//! Several producers insert disjoint value ranges while several consumers
//! drain concurrently. Every produced value must be delivered exactly once:
//! the claim bit set rejects duplicates as they happen and reports gaps at
//! the end.

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

use std::sync::Arc;
use std::time::Duration;

use dbcue_core::CoordError;
use dbcue_core::join_all;

use helpers::bitset::ClaimBits;
use helpers::fixture;
use helpers::queue;
use helpers::unique_name;

/// Producer task count; each covers one residue class of the value range.
const PRODUCERS: u32 = 4;

/// Consumer task count.
const CONSUMERS: usize = 4;

/// Values produced per producer.
const VALUES_PER_PRODUCER: u32 = 30;

/// Total value range, `0..TOTAL`.
const TOTAL: u32 = PRODUCERS * VALUES_PER_PRODUCER;

/// A consumer gives up once the queue stays empty this long; producers finish
/// well inside this window.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(3);

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_producers_and_consumers_deliver_exactly_once() {
    let fx = fixture().await;
    let name = unique_name("stress");
    let claims = Arc::new(ClaimBits::new(TOTAL as usize));

    let mut producers = Vec::new();
    for producer in 0..PRODUCERS {
        let q = queue(fx, &name, 500, 10 * 24 * 60 * 60);
        producers.push(tokio::spawn(async move {
            // Residue class `producer` modulo PRODUCERS, ascending.
            for step in 0..VALUES_PER_PRODUCER {
                q.add(&(producer + step * PRODUCERS)).await?;
            }
            Ok::<(), CoordError>(())
        }));
    }

    let mut consumers = Vec::new();
    for _ in 0..CONSUMERS {
        let q = queue(fx, &name, 500, 10 * 24 * 60 * 60);
        let claims = Arc::clone(&claims);
        consumers.push(tokio::spawn(async move {
            let mut drained = 0_u32;
            while let Some(value) = q.poll_within(DRAIN_TIMEOUT).await? {
                assert!(
                    claims.set_once(value as usize),
                    "value {value} delivered twice"
                );
                drained += 1;
            }
            Ok::<u32, CoordError>(drained)
        }));
    }

    join_all(producers).await.expect("producers");
    let drained = join_all(consumers).await.expect("consumers");

    assert_eq!(drained.iter().sum::<u32>(), TOTAL);
    assert_eq!(claims.cardinality(), TOTAL as usize);
    assert!(claims.missing().is_empty(), "missing: {:?}", claims.missing());

    let q = queue(fx, &name, 500, 10 * 24 * 60 * 60);
    assert!(q.is_empty().await.expect("is_empty"));
    assert_eq!(q.len().await.expect("len"), 0);
    assert_eq!(q.peek().await.expect("peek"), None);
}
