mod common;

use common::{test_async_config, test_config};
use mockito::Server;
use resilient_http::{ConnectionPool, Error, PoolConfig, PoolStats};
use std::sync::Arc;
use std::time::Duration;

const HOST: &str = "http://127.0.0.1:9";

fn pool(config: PoolConfig) -> ConnectionPool {
    ConnectionPool::with_client_configs(config, test_config(1), test_async_config(1))
}

#[test]
fn test_live_client_is_reused_for_same_host() {
    let pool = pool(PoolConfig::new().with_max_sessions(3));

    let a = pool.get_client(HOST).unwrap();
    let b = pool.get_client("http://127.0.0.1:9/api/v1").unwrap();
    let c = pool.get_client(HOST).unwrap();

    assert!(Arc::ptr_eq(&a, &b));
    assert!(Arc::ptr_eq(&a, &c));
    assert_eq!(pool.get_pool_stats().sync_clients, 1);
}

#[test]
fn test_pooled_client_is_bound_to_origin_not_first_path() {
    let mut server = Server::new();
    let quote = server
        .mock("GET", "/api/quote")
        .with_status(200)
        .expect(1)
        .create();
    let url = server.url();
    let pool = pool(PoolConfig::default());

    let reports = pool.get_client(&format!("{url}/reports")).unwrap();
    let other = pool.get_client(&url).unwrap();

    assert!(Arc::ptr_eq(&reports, &other));
    assert_eq!(other.base_url(), url.trim_end_matches('/'));
    let resp = other.get("/api/quote", &[]).unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    quote.assert();
}

#[test]
fn test_at_most_max_sessions_clients_per_host() {
    let k = 2;
    let pool = pool(
        PoolConfig::new()
            .with_max_sessions(k)
            .with_prefer_idle(true),
    );

    // hold every handle so no entry is ever idle
    let handles: Vec<_> = (0..6).map(|_| pool.get_client(HOST).unwrap()).collect();

    let distinct = handles
        .iter()
        .enumerate()
        .filter(|(i, h)| !handles[..*i].iter().any(|p| Arc::ptr_eq(p, h)))
        .count();
    assert_eq!(distinct, k);
    assert_eq!(pool.get_pool_stats().sync_clients, k);
    // the (k+1)-th call shares an existing instance
    assert!(handles[..k].iter().any(|h| Arc::ptr_eq(h, &handles[k])));
}

#[test]
fn test_capacity_fallback_shares_least_recently_used() {
    let pool = pool(
        PoolConfig::new()
            .with_max_sessions(2)
            .with_prefer_idle(true),
    );

    let first = pool.get_client(HOST).unwrap();
    std::thread::sleep(Duration::from_millis(2));
    let second = pool.get_client(HOST).unwrap();
    assert!(!Arc::ptr_eq(&first, &second));

    std::thread::sleep(Duration::from_millis(2));
    let third = pool.get_client(HOST).unwrap();
    assert!(Arc::ptr_eq(&first, &third));

    // `first` was just touched, so `second` is now the least recently used
    std::thread::sleep(Duration::from_millis(2));
    let fourth = pool.get_client(HOST).unwrap();
    assert!(Arc::ptr_eq(&second, &fourth));
}

#[test]
fn test_prefer_idle_reuses_released_client() {
    let pool = pool(
        PoolConfig::new()
            .with_max_sessions(4)
            .with_prefer_idle(true),
    );

    let first = pool.get_client(HOST).unwrap();
    let ptr = Arc::as_ptr(&first);
    drop(first);

    let again = pool.get_client(HOST).unwrap();
    assert_eq!(Arc::as_ptr(&again), ptr);
    assert_eq!(pool.get_pool_stats().sync_clients, 1);
}

#[test]
fn test_expired_clients_are_evicted_and_closed() {
    let pool = pool(PoolConfig::new().with_session_ttl(Duration::from_millis(50)));

    let old = pool.get_client(HOST).unwrap();
    std::thread::sleep(Duration::from_millis(80));
    let fresh = pool.get_client(HOST).unwrap();

    assert!(!Arc::ptr_eq(&old, &fresh));
    assert!(old.is_closed());
    assert!(!fresh.is_closed());
    assert_eq!(pool.get_pool_stats().sync_clients, 1);
}

#[test]
fn test_sync_and_async_buckets_are_separate() {
    let pool = pool(PoolConfig::default());

    pool.get_client(HOST).unwrap();
    pool.get_client("http://localhost:9").unwrap();
    pool.get_async_client(HOST).unwrap();

    let stats = pool.get_pool_stats();
    assert_eq!(stats.sync_clients, 2);
    assert_eq!(stats.hosts_sync, 2);
    assert_eq!(stats.async_clients, 1);
    assert_eq!(stats.hosts_async, 1);
}

#[test]
fn test_pool_stats_are_idempotent() {
    let pool = pool(PoolConfig::new().with_max_sessions(5));
    pool.get_client(HOST).unwrap();
    pool.get_async_client(HOST).unwrap();

    let first = pool.get_pool_stats();
    let second = pool.get_pool_stats();

    assert_eq!(first, second);
    assert_eq!(
        first,
        PoolStats {
            sync_clients: 1,
            async_clients: 1,
            hosts_sync: 1,
            hosts_async: 1,
            max_per_host: 5,
            ttl_secs: 300,
        }
    );
}

#[test]
fn test_close_all_closes_and_clears() {
    let pool = pool(PoolConfig::default());
    let client = pool.get_client(HOST).unwrap();
    let async_client = pool.get_async_client(HOST).unwrap();

    pool.close_all();

    assert!(client.is_closed());
    assert!(async_client.is_closed());
    let stats = pool.get_pool_stats();
    assert_eq!(stats.sync_clients + stats.async_clients, 0);

    let replacement = pool.get_client(HOST).unwrap();
    assert!(!Arc::ptr_eq(&client, &replacement));
}

#[test]
fn test_invalid_base_url_is_rejected() {
    let pool = pool(PoolConfig::default());

    let err = pool.get_client("www.example.com").unwrap_err();
    assert!(matches!(err, Error::Configuration { .. }));
    assert!(pool.get_async_client("ftp://example.com").is_err());
    assert_eq!(pool.get_pool_stats().hosts_sync, 0);
}

#[test]
fn test_concurrent_checkout_respects_capacity() {
    let pool = Arc::new(pool(
        PoolConfig::new()
            .with_max_sessions(3)
            .with_prefer_idle(true),
    ));

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let pool = pool.clone();
            std::thread::spawn(move || {
                let client = pool.get_client(HOST).unwrap();
                std::thread::sleep(Duration::from_millis(20));
                drop(client);
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }

    assert!(pool.get_pool_stats().sync_clients <= 3);
}
