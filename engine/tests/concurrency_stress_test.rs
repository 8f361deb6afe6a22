//! Concurrency stress tests for last-unit scenarios.
//!
//! Many sessions race for the same item; the store scripts must hand out
//! exactly the units that exist.
//!
//! Run with: `cargo test --test concurrency_stress_test -- --nocapture`

#![allow(clippy::expect_used, clippy::unwrap_used)] // Test code can use unwrap/expect

use std::sync::Arc;
use stockhold_engine::{
    Engine, EngineConfig, HoldOutcome, HoldRejection, ItemId, ReservationPolicy, SessionId,
};
use stockhold_testing::InMemoryStore;

fn create_engine(max_per_item: u32) -> Engine {
    let config = EngineConfig {
        policy: ReservationPolicy {
            max_per_item,
            ..ReservationPolicy::default()
        },
        ..EngineConfig::default()
    };
    Engine::new(Arc::new(InMemoryStore::new()), config)
}

async fn race(engine: &Engine, item: &ItemId, attempts: usize) -> Vec<HoldOutcome> {
    let handles: Vec<_> = (0..attempts)
        .map(|i| {
            let engine = engine.clone();
            let item = item.clone();
            tokio::spawn(async move {
                let session = SessionId::new(format!("cs_{i}")).expect("valid session");
                engine
                    .reservations()
                    .create_hold(&item, &session, 1, None)
                    .await
                    .expect("store available")
            })
        })
        .collect();

    futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked"))
        .collect()
}

/// Test: 100 concurrent holds for 10 units.
///
/// Verifies that:
/// - Exactly 10 holds succeed
/// - The other 90 are rejected as out of stock
/// - Nothing is left available
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_oversell_100_requests_for_10_units() {
    println!("🧪 Concurrency Stress Test: 100 concurrent holds for 10 units");

    let engine = create_engine(1_000);
    let item = ItemId::new("limited-print").unwrap();
    engine.ledger().set_stock(&item, 10).await.unwrap();

    println!("  🚀 Launching 100 concurrent hold attempts...");
    let outcomes = race(&engine, &item, 100).await;

    let reserved = outcomes
        .iter()
        .filter(|o| matches!(o, HoldOutcome::Reserved { .. }))
        .count();
    let sold_out = outcomes
        .iter()
        .filter(|o| {
            matches!(
                o,
                HoldOutcome::Rejected {
                    rejection: HoldRejection::OutOfStock
                }
            )
        })
        .count();

    println!("  📊 Results: {reserved} reserved, {sold_out} sold out");
    assert_eq!(reserved, 10, "exactly the available units are held");
    assert_eq!(sold_out, 90);

    let snapshot = engine.availability().snapshot(&item).await.unwrap();
    assert_eq!(snapshot.reserved, 10);
    assert_eq!(snapshot.available, 0);
    println!("  ✅ No oversell");
}

/// Test: two sessions for the last unit, winner confirms, third shopper loses.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_last_unit_two_sessions_then_confirm() {
    println!("🧪 Last unit: two sessions race, winner pays");

    let engine = create_engine(25);
    let item = ItemId::new("mug").unwrap();
    engine.ledger().set_stock(&item, 1).await.unwrap();

    let outcomes = race(&engine, &item, 2).await;
    let winner = outcomes
        .iter()
        .position(|o| matches!(o, HoldOutcome::Reserved { .. }))
        .expect("one session wins");
    let loser = 1 - winner;
    assert_eq!(
        outcomes[loser],
        HoldOutcome::Rejected {
            rejection: HoldRejection::OutOfStock
        }
    );

    let sold = engine
        .reservations()
        .confirm(&SessionId::new(format!("cs_{winner}")).unwrap())
        .await
        .unwrap();
    assert_eq!(sold, 1);

    let snapshot = engine.availability().snapshot(&item).await.unwrap();
    assert_eq!(snapshot.stock, 0);
    assert_eq!(snapshot.reserved, 0);

    let late = engine
        .reservations()
        .create_hold(&item, &SessionId::new("cs_late").unwrap(), 1, None)
        .await
        .unwrap();
    assert_eq!(
        late,
        HoldOutcome::Rejected {
            rejection: HoldRejection::OutOfStock
        }
    );
    println!("  ✅ Exactly one sale");
}

/// Test: the same session retried concurrently reserves once.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_duplicate_session_retries_reserve_once() {
    println!("🧪 50 concurrent retries of one session");

    let engine = create_engine(25);
    let item = ItemId::new("mug").unwrap();
    engine.ledger().set_stock(&item, 20).await.unwrap();

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let engine = engine.clone();
            let item = item.clone();
            tokio::spawn(async move {
                let session = SessionId::new("cs_retry").unwrap();
                engine
                    .reservations()
                    .create_hold(&item, &session, 3, None)
                    .await
                    .unwrap()
            })
        })
        .collect();
    let outcomes: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    let reserved = outcomes
        .iter()
        .filter(|o| matches!(o, HoldOutcome::Reserved { .. }))
        .count();
    assert_eq!(reserved, 1);
    assert!(
        outcomes
            .iter()
            .all(|o| matches!(o, HoldOutcome::Reserved { .. } | HoldOutcome::AlreadyHeld))
    );
    assert_eq!(engine.availability().available(&item).await.unwrap(), 17);
    println!("  ✅ Reserved once");
}
