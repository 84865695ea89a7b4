//! Property-Based Tests for Cache Limits and Namespace Isolation
//!
//! For any sequence of puts, gets, and invalidations, a namespace never holds
//! more than `max_entries` entries or more than `max_bytes` bytes, its byte
//! total always equals the sum of its resident entries, and operations on one
//! namespace never change another namespace's contents or counters.

use chrono::Utc;
use proptest::prelude::*;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use vantage_cache::{CacheManager, NamespaceStore};
use vantage_core::{CacheKey, CacheManagerConfig, NamespaceConfig, UrlNormalizer};

// ============================================================================
// STRATEGIES
// ============================================================================

#[derive(Debug, Clone)]
enum Op {
    Put { page: u8, len: usize },
    Get { page: u8 },
    Invalidate { page: u8 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0u8..16, 0usize..200).prop_map(|(page, len)| Op::Put { page, len }),
        3 => (0u8..16).prop_map(|page| Op::Get { page }),
        1 => (0u8..16).prop_map(|page| Op::Invalidate { page }),
    ]
}

fn key(namespace: &str, page: u8) -> CacheKey {
    let url = UrlNormalizer::default()
        .normalize(&format!("https://acme.test/page/{page}"))
        .expect("valid url");
    CacheKey::new(namespace, &url)
}

fn apply(store: &NamespaceStore<Value>, namespace: &str, op: &Op) {
    match op {
        Op::Put { page, len } => {
            store.put(key(namespace, *page), json!("x".repeat(*len)), Duration::from_secs(60));
        }
        Op::Get { page } => {
            store.get(&key(namespace, *page));
        }
        Op::Invalidate { page } => {
            store.invalidate(&key(namespace, *page));
        }
    }
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_limits_always_hold(
        max_entries in 1usize..8,
        max_bytes in 64u64..1024,
        ops in prop::collection::vec(op_strategy(), 1..60),
    ) {
        let store = NamespaceStore::new(
            "scraped",
            NamespaceConfig::new(Duration::from_secs(60), max_entries, max_bytes),
        );

        for op in &ops {
            apply(&store, "scraped", op);
            let metrics = store.metrics();
            prop_assert!(metrics.entries <= max_entries);
            prop_assert!(metrics.bytes <= max_bytes);
        }
    }

    #[test]
    fn prop_counters_account_for_every_lookup(
        ops in prop::collection::vec(op_strategy(), 1..60),
    ) {
        let store = NamespaceStore::new("scraped", NamespaceConfig::default());
        let lookups = ops.iter().filter(|op| matches!(op, Op::Get { .. })).count() as u64;
        let puts = ops.iter().filter(|op| matches!(op, Op::Put { .. })).count() as u64;

        for op in &ops {
            apply(&store, "scraped", op);
        }

        let metrics = store.metrics();
        prop_assert_eq!(metrics.requests(), lookups);
        prop_assert_eq!(metrics.puts, puts);
    }

    #[test]
    fn prop_namespaces_are_isolated(
        ops in prop::collection::vec(op_strategy(), 1..40),
    ) {
        let manager = CacheManager::with_defaults();
        let bystander = manager.namespace::<Value>("final-analysis").expect("namespace");
        bystander.put(key("final-analysis", 0), json!("kept"), Duration::from_secs(60));
        let before = bystander.metrics();

        let busy = manager.namespace::<Value>("scraped").expect("namespace");
        for op in &ops {
            apply(&busy, "scraped", op);
        }
        manager.clear_namespace("scraped").expect("clear");

        prop_assert_eq!(bystander.metrics(), before);
        prop_assert!(bystander.contains(&key("final-analysis", 0)));
    }
}

// ============================================================================
// CONCURRENCY
// ============================================================================

#[test]
fn test_concurrent_access_keeps_limits() {
    let config = CacheManagerConfig::new().with_namespace(
        "scraped",
        NamespaceConfig::new(Duration::from_secs(60), 32, 64 * 1024),
    );
    let manager = Arc::new(CacheManager::new(config).expect("valid config"));

    let handles: Vec<_> = (0..8u8)
        .map(|worker| {
            let manager = Arc::clone(&manager);
            std::thread::spawn(move || {
                for i in 0..200u16 {
                    let page = ((worker as u16 * 31 + i) % 64) as u8;
                    let k = key("scraped", page);
                    if i % 3 == 0 {
                        manager.put("scraped", k, Arc::new(json!({"worker": worker, "i": i})));
                    } else {
                        manager.get::<Value>("scraped", &k);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("worker panicked");
    }

    let metrics = manager.aggregate_metrics().per_namespace["scraped"].clone();
    assert!(metrics.entries <= 32);
    assert!(metrics.bytes <= 64 * 1024);
    assert_eq!(metrics.requests(), 8 * 200 - metrics.puts);
}

#[test]
fn test_sweep_after_ttl_empties_namespace() {
    let manager = CacheManager::with_defaults();
    let store = manager.namespace::<Value>("scraped").expect("namespace");
    let t0 = Utc::now();
    for page in 0..5 {
        store.put_at(key("scraped", page), Arc::new(json!(page)), Duration::from_secs(30), t0);
    }

    let report = manager.run_sweep_at(t0 + chrono::Duration::seconds(31));
    assert_eq!(report.expired, 5);
    assert!(store.is_empty());
    assert_eq!(store.metrics().expirations, 5);
}
