//! End-to-end coverage of the caching engine against a local origin server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tempfile::TempDir;

use pakio_engine::{CacheProxy, ProxyConfig, ProxyError, TaskLockService, create_client};

/// Origin stub that counts how often it is hit and serves `body`.
async fn spawn_origin(body: &'static [u8]) -> (SocketAddr, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let handler_hits = Arc::clone(&hits);
    let app = Router::new().fallback(move || {
        let hits = Arc::clone(&handler_hits);
        async move {
            hits.fetch_add(1, Ordering::SeqCst);
            body.to_vec()
        }
    });
    (serve(app).await, hits)
}

/// Origin stub that refuses the first request and serves `body` afterwards.
async fn spawn_flaky_origin(body: &'static [u8]) -> (SocketAddr, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let handler_hits = Arc::clone(&hits);
    let app = Router::new().fallback(move || {
        let hits = Arc::clone(&handler_hits);
        async move {
            if hits.fetch_add(1, Ordering::SeqCst) == 0 {
                (StatusCode::SERVICE_UNAVAILABLE, "warming up").into_response()
            } else {
                body.to_vec().into_response()
            }
        }
    });
    (serve(app).await, hits)
}

/// Origin stub that delays every response, to widen the race window.
async fn spawn_slow_origin(body: &'static [u8]) -> (SocketAddr, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let handler_hits = Arc::clone(&hits);
    let app = Router::new().fallback(move || {
        let hits = Arc::clone(&handler_hits);
        async move {
            hits.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            body.to_vec()
        }
    });
    (serve(app).await, hits)
}

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn test_config(cache_dir: &TempDir, metadata_keep: Duration) -> ProxyConfig {
    ProxyConfig::builder()
        .with_cache_dir(cache_dir.path())
        .with_metadata_keep(metadata_keep)
        .with_poll_interval(Duration::from_millis(10))
        .with_wait_timeout(Duration::from_secs(5))
        .build()
}

fn in_process_proxy(config: &ProxyConfig) -> CacheProxy {
    CacheProxy::with_lock_service(
        config,
        create_client(config).unwrap(),
        Arc::new(TaskLockService::new()),
    )
}

#[tokio::test]
async fn test_cold_cache_fetches_stores_and_serves() {
    let (addr, hits) = spawn_origin(b"metadata bytes").await;
    let cache = TempDir::new().unwrap();
    let proxy = in_process_proxy(&test_config(&cache, Duration::from_secs(3600)));

    let url = format!("http://{addr}/x86_64/repodata/repomd.xml");
    let served = proxy.handle(&url).await.unwrap();

    assert_eq!(served.file_name, "repomd.xml");
    assert_eq!(served.size, b"metadata bytes".len() as u64);
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    let stored = cache
        .path()
        .join(addr.to_string())
        .join("x86_64/repodata/repomd.xml");
    assert_eq!(served.path, stored);
    assert_eq!(std::fs::read(&stored).unwrap(), b"metadata bytes");
}

#[tokio::test]
async fn test_second_request_is_a_pure_cache_hit() {
    let (addr, hits) = spawn_origin(b"metadata bytes").await;
    let cache = TempDir::new().unwrap();
    let proxy = in_process_proxy(&test_config(&cache, Duration::from_secs(3600)));

    let url = format!("http://{addr}/x86_64/repodata/repomd.xml");
    proxy.handle(&url).await.unwrap();
    let served = proxy.handle(&url).await.unwrap();

    assert_eq!(served.size, b"metadata bytes".len() as u64);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_expired_metadata_refetches_exactly_once() {
    let (addr, hits) = spawn_origin(b"metadata bytes").await;
    let cache = TempDir::new().unwrap();
    let proxy = in_process_proxy(&test_config(&cache, Duration::from_millis(50)));

    let url = format!("http://{addr}/repodata/repomd.xml");
    proxy.handle(&url).await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(80)).await;
    proxy.handle(&url).await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_content_objects_never_refetch() {
    let (addr, hits) = spawn_origin(b"rpm payload").await;
    let cache = TempDir::new().unwrap();
    // Retention short enough that a metadata file would have expired.
    let proxy = in_process_proxy(&test_config(&cache, Duration::from_millis(50)));

    let url = format!("http://{addr}/packages/package-1.0.rpm");
    proxy.handle(&url).await.unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;
    let served = proxy.handle(&url).await.unwrap();

    assert_eq!(served.size, b"rpm payload".len() as u64);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_directory_target_rejected_without_fetch() {
    let (addr, hits) = spawn_origin(b"unused").await;
    let cache = TempDir::new().unwrap();
    let proxy = in_process_proxy(&test_config(&cache, Duration::from_secs(3600)));

    std::fs::create_dir_all(cache.path().join(addr.to_string()).join("repodata")).unwrap();

    let url = format!("http://{addr}/repodata");
    let result = proxy.handle(&url).await;
    assert!(matches!(result, Err(ProxyError::DirectoryListing(_))));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_traversal_url_rejected_without_fetch() {
    let cache = TempDir::new().unwrap();
    let proxy = in_process_proxy(&test_config(&cache, Duration::from_secs(3600)));

    let result = proxy.handle("http://mirror/../../etc/passwd").await;
    assert!(matches!(result, Err(ProxyError::PathTraversal(_))));
}

#[tokio::test]
async fn test_concurrent_requests_collapse_into_one_download() {
    let (addr, hits) = spawn_slow_origin(b"large package").await;
    let cache = TempDir::new().unwrap();
    // Default lock service: lock files under the cache root.
    let proxy = Arc::new(CacheProxy::new(&test_config(&cache, Duration::from_secs(3600))).unwrap());

    let url = format!("http://{addr}/packages/big-2.0.rpm");
    let mut handles = Vec::new();
    for _ in 0..8 {
        let proxy = Arc::clone(&proxy);
        let url = url.clone();
        handles.push(tokio::spawn(async move { proxy.handle(&url).await }));
    }

    for handle in handles {
        let served = handle.await.unwrap().unwrap();
        assert_eq!(served.size, b"large package".len() as u64);
    }
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_follower_refetches_after_leader_failure() {
    let (addr, hits) = spawn_flaky_origin(b"eventually served").await;
    let cache = TempDir::new().unwrap();
    let proxy = Arc::new(in_process_proxy(&test_config(
        &cache,
        Duration::from_secs(3600),
    )));

    let url = format!("http://{addr}/packages/flaky-1.0.rpm");
    let first = tokio::spawn({
        let proxy = Arc::clone(&proxy);
        let url = url.clone();
        async move { proxy.handle(&url).await }
    });
    let second = tokio::spawn({
        let proxy = Arc::clone(&proxy);
        let url = url.clone();
        async move { proxy.handle(&url).await }
    });

    let results = [first.await.unwrap(), second.await.unwrap()];
    let ok_count = results.iter().filter(|r| r.is_ok()).count();
    let failed_count = results
        .iter()
        .filter(|r| matches!(r, Err(ProxyError::FetchFailed(status)) if *status == StatusCode::SERVICE_UNAVAILABLE))
        .count();

    // The worker that hit the refusal surfaces it; the other retried its own
    // fetch instead of trusting the cleared lock.
    assert_eq!(ok_count, 1);
    assert_eq!(failed_count, 1);
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    let stored = cache
        .path()
        .join(addr.to_string())
        .join("packages/flaky-1.0.rpm");
    assert_eq!(std::fs::read(&stored).unwrap(), b"eventually served");
}

#[tokio::test]
async fn test_failed_fetch_caches_nothing() {
    let (addr, hits) = spawn_flaky_origin(b"unused").await;
    let cache = TempDir::new().unwrap();
    let proxy = in_process_proxy(&test_config(&cache, Duration::from_secs(3600)));

    let url = format!("http://{addr}/packages/missing.rpm");
    let result = proxy.handle(&url).await;
    assert!(matches!(
        result,
        Err(ProxyError::FetchFailed(status)) if status == StatusCode::SERVICE_UNAVAILABLE
    ));
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    let stored = cache
        .path()
        .join(addr.to_string())
        .join("packages/missing.rpm");
    assert!(!stored.exists());
}
