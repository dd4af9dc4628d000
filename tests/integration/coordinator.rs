//! Integration tests for the render server and HTTP workers

use edgetrail::cancel::AbortFile;
use edgetrail::config::{CoordinatorConfig, RenderConfig};
use edgetrail::coordinator::{
    run_client, serve_on, CoordinatorTransport, HttpTransport, JobQueue, RetryPolicy,
};
use edgetrail::oracle::{EscapeTimeOracle, MembershipOracle};
use edgetrail::store::{FrameFilter, FrameStore, SledFrameStore};
use edgetrail::{PlanePoint, WorkError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn quick_retry() -> RetryPolicy {
    RetryPolicy {
        initial: Duration::from_millis(10),
        step: Duration::from_millis(10),
        cap: Duration::from_millis(30),
        deadline: Duration::from_millis(200),
    }
}

fn tiny_render() -> RenderConfig {
    RenderConfig {
        width: 8,
        height: 8,
        max_iter: 20,
        ..RenderConfig::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_workers_render_every_queued_frame() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(SledFrameStore::new(temp_dir.path().join("db")).unwrap());
    let trail: Vec<PlanePoint> = (0..12)
        .map(|i| PlanePoint::new(-0.75 + i as f64 * 0.01, 0.1))
        .collect();
    store.load_trail(&trail).unwrap();
    // Already rendered frames are not queued
    store.store_escape_map(0, b"done").unwrap();

    let config = CoordinatorConfig {
        batch_size: 5,
        flush_pending: 4,
        workers: 2,
        worker_name: Some("integration".to_string()),
        ..CoordinatorConfig::default()
    };
    let queue = JobQueue::from_store(store.clone(), &config).unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let server_abort = AbortFile::new(temp_dir.path().join("server.stop"));
    let server = tokio::spawn(serve_on(
        listener,
        Arc::new(Mutex::new(queue)),
        server_abort.clone(),
    ));

    let transport: Arc<dyn CoordinatorTransport> =
        Arc::new(HttpTransport::new(&base_url, quick_retry()).unwrap());
    let oracle: Arc<dyn MembershipOracle> = Arc::new(EscapeTimeOracle::new(false));
    let report = run_client(
        transport.clone(),
        oracle,
        &tiny_render(),
        &config,
        AbortFile::new(temp_dir.path().join("client.stop")),
    )
    .await
    .unwrap();
    assert_eq!(report.workers, 2);
    assert_eq!(report.failed, 0);
    assert_eq!(report.frames, 11);

    // Workers are done; another fetch sees an empty queue
    assert!(transport.fetch_batch().await.unwrap().is_empty());
    drop(transport);

    std::fs::write(server_abort.path(), b"").unwrap();
    let served = tokio::time::timeout(Duration::from_secs(10), server)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(served.queued, 11);
    assert_eq!(served.accepted, 11);
    assert_eq!(served.remaining, 0);

    assert!(store.iterate(FrameFilter::UNRENDERED).unwrap().is_empty());
    assert_eq!(store.escape_map(0).unwrap(), Some(b"done".to_vec()));
    assert_eq!(store.stats().unwrap().with_data, 12);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_flush_endpoint_writes_pending_frames() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(SledFrameStore::new(temp_dir.path().join("db")).unwrap());
    store
        .load_trail(&[PlanePoint::new(-0.5, 0.5), PlanePoint::new(-0.5, 0.6)])
        .unwrap();
    let config = CoordinatorConfig {
        batch_size: 1,
        flush_pending: 100,
        workers: 1,
        ..CoordinatorConfig::default()
    };
    let queue = Arc::new(Mutex::new(JobQueue::from_store(store.clone(), &config).unwrap()));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let server_abort = AbortFile::new(temp_dir.path().join("server.stop"));
    let server = tokio::spawn(serve_on(listener, queue.clone(), server_abort.clone()));

    let transport = Arc::new(HttpTransport::new(&base_url, quick_retry()).unwrap());
    let report = run_client(
        transport.clone(),
        Arc::new(EscapeTimeOracle::new(false)),
        &tiny_render(),
        &config,
        AbortFile::new(temp_dir.path().join("client.stop")),
    )
    .await
    .unwrap();
    assert_eq!(report.frames, 2);
    assert_eq!(queue.lock().pending(), 2);
    assert_eq!(store.stats().unwrap().with_data, 0);

    assert_eq!(transport.flush().await.unwrap(), "Flushed 2 items");
    assert_eq!(store.stats().unwrap().with_data, 2);
    drop(transport);

    std::fs::write(server_abort.path(), b"").unwrap();
    let served = tokio::time::timeout(Duration::from_secs(10), server)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(served.accepted, 2);
}

#[tokio::test]
async fn test_unreachable_server_gives_up_after_deadline() {
    // Bind then drop to get a port nothing listens on
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let transport = HttpTransport::new(&format!("http://127.0.0.1:{}/", port), quick_retry()).unwrap();
    match transport.hello().await {
        Err(WorkError::ServerUnavailable(elapsed)) => {
            assert!(elapsed < Duration::from_secs(2));
        }
        other => panic!("expected the server to be unavailable, got {:?}", other),
    }
}
