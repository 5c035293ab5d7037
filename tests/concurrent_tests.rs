//! Concurrent access tests for the session pool.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use html2pdf_engine::prelude::*;
use html2pdf_engine::EngineError;

use common::{init_logging, MockBrowser, MOCK_PDF};

fn test_config(pool_size: usize) -> SessionPoolConfig {
    SessionPoolConfigBuilder::new()
        .pool_size(pool_size)
        .max_session_uses(1000)
        .init_timeout(Duration::from_secs(5))
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

/// Renders from many tasks at once land on the fixed set of sessions, all
/// succeed, and call ids stay strictly increasing on the wire.
#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_renders() {
    init_logging();
    let hub = MockBrowser::new();
    let pool = Arc::new(
        SessionPool::builder()
            .config(test_config(4))
            .launcher(hub.launcher())
            .build()
            .await
            .unwrap(),
    );

    let mut tasks = JoinSet::new();
    for task_number in 0..8 {
        let pool = Arc::clone(&pool);
        tasks.spawn(async move {
            for render_number in 0..3 {
                let response = print_html(
                    &pool,
                    &PrintHtmlRequest {
                        html: format!("<p>task {task_number} render {render_number}</p>"),
                        ..Default::default()
                    },
                )
                .await
                .expect("render should succeed");
                assert_eq!(response.data, MOCK_PDF);
            }
        });
    }

    while let Some(result) = tasks.join_next().await {
        result.expect("task should not panic");
    }

    // No recycling configured: the four bootstrap targets served everything.
    assert_eq!(hub.targets_created().len(), 4);
    // Every call on the pipe carried a strictly increasing id.
    assert_eq!(hub.id_order_violations(), 0);

    pool.shutdown().await;
}

/// With every session checked out, concurrent zero-timeout checkouts all
/// fail fast instead of queueing.
#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_exhaustion() {
    init_logging();
    let hub = MockBrowser::new();
    let pool = Arc::new(
        SessionPool::builder()
            .config(test_config(2))
            .launcher(hub.launcher())
            .build()
            .await
            .unwrap(),
    );

    let first = pool.checkout(Duration::from_secs(1)).await.unwrap();
    let second = pool.checkout(Duration::from_secs(1)).await.unwrap();

    let mut tasks = JoinSet::new();
    for _ in 0..5 {
        let pool = Arc::clone(&pool);
        tasks.spawn(async move { pool.checkout(Duration::ZERO).await });
    }

    while let Some(result) = tasks.join_next().await {
        let checkout = result.expect("task should not panic");
        assert!(matches!(checkout, Err(EngineError::PoolExhausted)));
    }

    drop(first);
    drop(second);
    pool.shutdown().await;
}

/// Stats can be read from many tasks while renders are in flight.
#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_stats_access() {
    init_logging();
    let hub = MockBrowser::new();
    let pool = Arc::new(
        SessionPool::builder()
            .config(test_config(2))
            .launcher(hub.launcher())
            .build()
            .await
            .unwrap(),
    );

    let mut tasks = JoinSet::new();

    for _ in 0..4 {
        let pool = Arc::clone(&pool);
        tasks.spawn(async move {
            for _ in 0..100 {
                let stats = pool.stats();
                assert!(stats.live <= 3, "live sessions bounded by pool + in-flight replacement");
            }
        });
    }

    for _ in 0..2 {
        let pool = Arc::clone(&pool);
        tasks.spawn(async move {
            for _ in 0..3 {
                print_html(
                    &pool,
                    &PrintHtmlRequest {
                        html: "<p>stats</p>".to_string(),
                        ..Default::default()
                    },
                )
                .await
                .expect("render should succeed");
            }
        });
    }

    while let Some(result) = tasks.join_next().await {
        result.expect("task should not panic");
    }

    pool.shutdown().await;
}
