//! Load testing for the load balancer.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use axum::http::StatusCode;

mod common;

/// Response bodies release their backend slot as they finish, which can
/// trail the client seeing the last byte.
async fn wait_for_idle(proxy: &common::TestProxy) {
    let deadline = Instant::now() + Duration::from_secs(2);
    for backend in proxy.state.pool.snapshot().iter() {
        while backend.active_connections() != 0 {
            assert!(Instant::now() < deadline, "{} leaked", backend.id());
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[tokio::test]
async fn test_load_performance() {
    let b1 = common::start_backend("b1").await;
    let b2 = common::start_backend("b2").await;
    let mut config = common::config_for(&[b1, b2]);
    config.rate_limit = 100_000.0;
    config.burst = 100_000.0;
    let proxy = common::start_proxy(config).await;

    let concurrency = 20;
    let requests_per_task = 50;
    let total_requests = concurrency * requests_per_task;

    let client = common::client();
    let start = Instant::now();

    let mut tasks = Vec::with_capacity(concurrency);
    for _ in 0..concurrency {
        let client = client.clone();
        let url = proxy.url("/");
        tasks.push(tokio::spawn(async move {
            let mut served: HashMap<String, usize> = HashMap::new();
            for _ in 0..requests_per_task {
                let res = client.get(&url).send().await.unwrap();
                assert_eq!(res.status(), StatusCode::OK);
                *served.entry(res.text().await.unwrap()).or_default() += 1;
            }
            served
        }));
    }

    let mut served: HashMap<String, usize> = HashMap::new();
    for task in tasks {
        for (backend, count) in task.await.unwrap() {
            *served.entry(backend).or_default() += count;
        }
    }
    let elapsed = start.elapsed();

    println!(
        "{} requests in {:?} ({:.0} req/s), distribution {:?}",
        total_requests,
        elapsed,
        total_requests as f64 / elapsed.as_secs_f64(),
        served
    );

    assert_eq!(served.values().sum::<usize>(), total_requests);
    assert!(served.contains_key("b1"));
    assert!(served.contains_key("b2"));

    // Every tracked connection was released.
    wait_for_idle(&proxy).await;
    assert_eq!(
        proxy.state.metrics.snapshot().requests_total,
        total_requests as u64
    );

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_concurrent_slow_requests_spread() {
    let b1 = common::start_slow_backend("b1", Duration::from_secs(1)).await;
    let b2 = common::start_slow_backend("b2", Duration::from_secs(1)).await;
    let proxy = common::start_proxy(common::config_for(&[b1, b2])).await;

    let client = common::client();
    let mut tasks = Vec::new();
    for _ in 0..10 {
        let client = client.clone();
        let url = proxy.url("/");
        tasks.push(tokio::spawn(async move {
            client.get(url).send().await.unwrap().text().await.unwrap()
        }));
        // Let each request reach its backend before the next selection.
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    let mut b1_count = 0;
    for task in tasks {
        if task.await.unwrap() == "b1" {
            b1_count += 1;
        }
    }

    // Least connections keeps the two in-flight sets balanced.
    assert!((4..=6).contains(&b1_count), "b1 served {}", b1_count);
    wait_for_idle(&proxy).await;

    proxy.shutdown.trigger();
}
