//! Integration tests for sequence numbers against SQLite.
//!
//! Tests verify that:
//! - Each entity type renders its own format
//! - Counters are kept per entity type and year
//! - Concurrent callers receive distinct, contiguous numbers
//! - A failed increment produces no number

use futures_util::future::join_all;
use maintenance_store::db::{ConnectionPool, QueryExecutor, QueryParam, ensure_schema};
use maintenance_store::models::StoreConfig;
use maintenance_store::sequence::current_year;
use maintenance_store::{EntityType, PoolOptions, SequenceGenerator, StoreError};
use rand::seq::SliceRandom;
use std::collections::HashSet;
use tempfile::TempDir;

async fn setup(max_connections: u32) -> (TempDir, ConnectionPool, SequenceGenerator) {
    let dir = TempDir::new().unwrap();
    let opts = PoolOptions {
        max_connections: Some(max_connections),
        ..PoolOptions::default()
    };
    let config = StoreConfig::sqlite(dir.path().join("seq.db"), opts).unwrap();
    let pool = ConnectionPool::new(config).unwrap();
    let executor = QueryExecutor::new(pool.clone());
    ensure_schema(&executor).await.unwrap();
    (dir, pool, SequenceGenerator::new(executor))
}

async fn set_counter(pool: &ConnectionPool, entity_type: &str, year: i32, counter: i64) {
    QueryExecutor::new(pool.clone())
        .execute(
            "INSERT INTO counters (entity_type, year, counter) VALUES (?, ?, ?)",
            vec![
                QueryParam::from(entity_type),
                QueryParam::from(year),
                QueryParam::from(counter),
            ],
        )
        .await
        .unwrap();
}

/// Counter value behind a formatted number, e.g. `OS-012-2025` -> 12.
fn counter_of(number: &str) -> i64 {
    let digits: String = number
        .trim_start_matches("OS-")
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().unwrap()
}

#[tokio::test]
async fn test_service_orders_start_at_one() {
    let (_dir, pool, generator) = setup(5).await;

    assert_eq!(
        generator
            .next_number_for_year("service_orders", 2025)
            .await
            .unwrap(),
        "OS-001-2025"
    );
    assert_eq!(
        generator
            .next_number_for_year(EntityType::ServiceOrders, 2025)
            .await
            .unwrap(),
        "OS-002-2025"
    );
    assert_eq!(
        generator
            .current_counter("service_orders", 2025)
            .await
            .unwrap(),
        Some(2)
    );

    pool.close().await;
}

#[tokio::test]
async fn test_formats_per_entity_type() {
    let (_dir, pool, generator) = setup(5).await;

    set_counter(&pool, "equipment", 2025, 6).await;
    set_counter(&pool, "unknown_type", 2025, 2).await;

    assert_eq!(
        generator
            .next_number_for_year("equipment", 2025)
            .await
            .unwrap(),
        "EQ-07/2025"
    );
    assert_eq!(
        generator
            .next_number_for_year("companies", 2025)
            .await
            .unwrap(),
        "EMP-01/2025"
    );
    assert_eq!(
        generator
            .next_number_for_year("unknown_type", 2025)
            .await
            .unwrap(),
        "03/2025"
    );

    pool.close().await;
}

#[tokio::test]
async fn test_counters_are_per_year() {
    let (_dir, pool, generator) = setup(5).await;

    set_counter(&pool, "service_orders", 2024, 41).await;

    assert_eq!(
        generator
            .next_number_for_year("service_orders", 2024)
            .await
            .unwrap(),
        "OS-042-2024"
    );
    assert_eq!(
        generator
            .next_number_for_year("service_orders", 2025)
            .await
            .unwrap(),
        "OS-001-2025"
    );
    assert_eq!(
        generator.current_counter("service_orders", 2026).await.unwrap(),
        None
    );

    pool.close().await;
}

#[tokio::test]
async fn test_next_number_uses_current_year() {
    let (_dir, pool, generator) = setup(5).await;

    let number = generator.next_number("companies").await.unwrap();
    assert_eq!(number, format!("EMP-01/{}", current_year()));

    pool.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_get_contiguous_numbers() {
    let (_dir, pool, generator) = setup(5).await;

    set_counter(&pool, "service_orders", 2025, 10).await;

    let calls = (0..25).map(|_| {
        let generator = generator.clone();
        tokio::spawn(async move {
            generator
                .next_number_for_year("service_orders", 2025)
                .await
        })
    });
    let numbers: Vec<String> = join_all(calls)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    let distinct: HashSet<&String> = numbers.iter().collect();
    assert_eq!(distinct.len(), numbers.len());

    let mut counters: Vec<i64> = numbers.iter().map(|n| counter_of(n)).collect();
    counters.sort_unstable();
    assert_eq!(counters, (11..=35).collect::<Vec<_>>());

    pool.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_mixed_entity_types_stay_independent() {
    let (_dir, pool, generator) = setup(4).await;

    let mut kinds: Vec<&str> = std::iter::repeat_n("equipment", 8)
        .chain(std::iter::repeat_n("companies", 8))
        .collect();
    kinds.shuffle(&mut rand::thread_rng());

    let calls = kinds.into_iter().map(|kind| {
        let generator = generator.clone();
        tokio::spawn(async move { generator.next_number_for_year(kind, 2025).await })
    });
    let numbers: Vec<String> = join_all(calls)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    let mut equipment: Vec<&String> = numbers.iter().filter(|n| n.starts_with("EQ-")).collect();
    let mut companies: Vec<&String> = numbers.iter().filter(|n| n.starts_with("EMP-")).collect();
    equipment.sort();
    companies.sort();

    let expected_eq: Vec<String> = (1..=8).map(|i| format!("EQ-{:02}/2025", i)).collect();
    let expected_emp: Vec<String> = (1..=8).map(|i| format!("EMP-{:02}/2025", i)).collect();
    assert_eq!(equipment, expected_eq.iter().collect::<Vec<_>>());
    assert_eq!(companies, expected_emp.iter().collect::<Vec<_>>());

    pool.close().await;
}

#[tokio::test]
async fn test_missing_counter_table_yields_query_error() {
    let dir = TempDir::new().unwrap();
    let config = StoreConfig::sqlite(dir.path().join("empty.db"), PoolOptions::default()).unwrap();
    let pool = ConnectionPool::new(config).unwrap();
    let generator = SequenceGenerator::new(QueryExecutor::new(pool.clone()));

    let err = generator
        .next_number_for_year("service_orders", 2025)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Query { .. }));
    assert!(err.sql().is_some_and(|sql| sql.contains("counters")));
    assert_eq!(
        err.params(),
        Some(&[QueryParam::from("service_orders"), QueryParam::from(2025)][..])
    );

    pool.close().await;
}
