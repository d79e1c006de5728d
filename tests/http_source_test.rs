use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;

use mindful_engine::config::CacheConfig;
use mindful_engine::engine::cache::{Audio, MediaAsset, ResourceCache};
use mindful_engine::error::CacheError;
use mindful_engine::source::connectivity::AlwaysOnline;
use mindful_engine::source::http_source::HttpSource;
use mindful_engine::source::traits::MediaSource;

const TEST_SIZE: usize = 256 * 1024; // 256 KB

fn body() -> Vec<u8> {
    (0..TEST_SIZE).map(|i| (i % 256) as u8).collect()
}

async fn serve_file(State(hits): State<Arc<AtomicUsize>>, req: Request) -> impl IntoResponse {
    hits.fetch_add(1, Ordering::SeqCst);
    if req.headers().get("x-token").map(|v| v.as_bytes()) == Some(b"denied".as_slice()) {
        return StatusCode::FORBIDDEN.into_response();
    }
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "audio/wav".to_string())],
        body(),
    )
        .into_response()
}

async fn start_server() -> (SocketAddr, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/media/inhale.wav", get(serve_file))
        .with_state(hits.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, hits)
}

#[tokio::test]
async fn test_http_source_streams_body() {
    let (addr, _hits) = start_server().await;
    let source = HttpSource::default();

    let mut resp = source
        .open(&format!("http://{}/media/inhale.wav", addr))
        .await
        .unwrap();
    assert_eq!(resp.content_length(), Some(TEST_SIZE as u64));

    let mut data = Vec::new();
    while let Some(chunk) = resp.chunk().await.unwrap() {
        data.extend_from_slice(&chunk);
    }
    assert_eq!(data, body());
}

#[tokio::test]
async fn test_http_source_rejects_error_status() {
    let (addr, _hits) = start_server().await;
    let source = HttpSource::default();

    let err = source
        .open(&format!("http://{}/media/missing.wav", addr))
        .await
        .err()
        .unwrap();
    assert!(err.to_string().contains("HTTP 404"), "{err}");

    source.update_headers(HashMap::from([("x-token".to_string(), "denied".to_string())]));
    let err = source
        .open(&format!("http://{}/media/inhale.wav", addr))
        .await
        .err()
        .unwrap();
    assert!(err.to_string().contains("HTTP 403"), "{err}");
}

#[tokio::test]
async fn test_cache_resolves_over_http() {
    let (addr, hits) = start_server().await;
    let dir = tempfile::tempdir().unwrap();
    let config = CacheConfig {
        cache_dir: dir.path().to_path_buf(),
        max_attempts: 3,
        retry_delay_ms: 10,
    };
    let cache = ResourceCache::<Audio>::new(
        &config,
        Arc::new(HttpSource::default()),
        Arc::new(AlwaysOnline),
    );

    let asset = MediaAsset::new(format!("http://{}/media/inhale.wav", addr), "inhale.wav");
    let path = cache.resolve(&asset, None).await.unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), body());
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    let missing = MediaAsset::new(format!("http://{}/media/gone.wav", addr), "gone.wav");
    let err = cache.resolve(&missing, None).await.unwrap_err();
    assert!(matches!(err, CacheError::DownloadFailed { attempts: 3, .. }));
}
