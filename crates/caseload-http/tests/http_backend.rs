//! `HttpBackend` against an in-process axum server.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use caseload_core::{Backend, BackendError, Pipeline, PipelineBuilder};
use caseload_http::{HttpBackend, HttpBackendConfig, RetryConfig};

#[derive(Default)]
struct Cluster {
    docs: Mutex<Vec<(String, HashMap<String, String>, Value)>>,
    /// Answer this many index requests with 503 before accepting.
    fail_first: AtomicUsize,
    /// Hold this many index requests past the client timeout, then answer 503.
    stall_first: AtomicUsize,
    index_requests: AtomicUsize,
}

async fn root() -> Json<Value> {
    Json(json!({
        "name": "node-1",
        "cluster_name": "test-cluster",
        "version": { "number": "7.17.9" },
        "tagline": "You Know, for Search"
    }))
}

async fn index_doc(
    State(cluster): State<Arc<Cluster>>,
    Path(index): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    body: String,
) -> (StatusCode, Json<Value>) {
    cluster.index_requests.fetch_add(1, Ordering::SeqCst);
    let stalls = cluster.stall_first.load(Ordering::SeqCst);
    if stalls > 0 {
        cluster.stall_first.store(stalls - 1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(400)).await;
        return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"error": "stalled"})));
    }
    let remaining = cluster.fail_first.load(Ordering::SeqCst);
    if remaining > 0 {
        cluster.fail_first.store(remaining - 1, Ordering::SeqCst);
        return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"error": "busy"})));
    }
    let doc: Value = match serde_json::from_str(&body) {
        Ok(v) => v,
        Err(_) => return (StatusCode::BAD_REQUEST, Json(json!({"error": "bad json"}))),
    };
    cluster.docs.lock().unwrap().push((index, params, doc));
    (StatusCode::CREATED, Json(json!({"result": "created"})))
}

async fn serve(cluster: Arc<Cluster>) -> SocketAddr {
    let app = Router::new()
        .route("/", get(root))
        .route("/:index/_doc", post(index_doc))
        .with_state(cluster);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn sample_path() -> std::path::PathBuf {
    std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../data/sample.json")
}

fn fast_retry(max_retries: u32) -> HttpBackendConfig {
    HttpBackendConfig {
        retry: RetryConfig {
            max_retries,
            initial_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(20),
            multiplier: 2.0,
        },
        request_timeout: Duration::from_secs(5),
        refresh: true,
    }
}

#[tokio::test]
async fn info_reads_cluster_and_version() {
    let addr = serve(Arc::new(Cluster::default())).await;
    let backend = HttpBackend::default_for(format!("http://{addr}")).unwrap();

    let info = backend.info().await.unwrap();
    assert_eq!(info.cluster_name, "test-cluster");
    assert_eq!(info.version, "7.17.9");
}

#[tokio::test]
async fn index_posts_document_with_refresh() {
    let cluster = Arc::new(Cluster::default());
    let addr = serve(cluster.clone()).await;
    let backend = HttpBackend::new(format!("http://{addr}"), fast_retry(0)).unwrap();

    backend
        .index("covid", json!({"cases": 5}).to_string())
        .await
        .unwrap();

    let docs = cluster.docs.lock().unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].0, "covid");
    assert_eq!(docs[0].1.get("refresh").map(String::as_str), Some("true"));
    assert_eq!(docs[0].2["cases"], 5);
}

#[tokio::test]
async fn transient_errors_are_retried() {
    let cluster = Arc::new(Cluster {
        fail_first: AtomicUsize::new(2),
        ..Default::default()
    });
    let addr = serve(cluster.clone()).await;
    let backend = HttpBackend::new(format!("http://{addr}"), fast_retry(3)).unwrap();

    backend.index("covid", "{}".into()).await.unwrap();

    assert_eq!(cluster.index_requests.load(Ordering::SeqCst), 3);
    assert_eq!(cluster.docs.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn retries_exhausted_returns_status() {
    let cluster = Arc::new(Cluster {
        fail_first: AtomicUsize::new(10),
        ..Default::default()
    });
    let addr = serve(cluster.clone()).await;
    let backend = HttpBackend::new(format!("http://{addr}"), fast_retry(1)).unwrap();

    let err = backend.index("covid", "{}".into()).await.unwrap_err();

    assert!(matches!(err, BackendError::Status { status: 503, .. }));
    assert_eq!(cluster.index_requests.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let cluster = Arc::new(Cluster::default());
    let addr = serve(cluster.clone()).await;
    let backend = HttpBackend::new(format!("http://{addr}"), fast_retry(3)).unwrap();

    let err = backend.index("covid", "not json".into()).await.unwrap_err();

    assert!(matches!(err, BackendError::Status { status: 400, .. }));
    assert_eq!(cluster.index_requests.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unreachable_endpoint_is_http_error() {
    // Bind then drop to get a port nothing listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let backend = HttpBackend::new(format!("http://{addr}"), fast_retry(0)).unwrap();
    assert!(matches!(backend.info().await, Err(BackendError::Http(_))));
}

#[tokio::test]
async fn pipeline_over_http() {
    let cluster = Arc::new(Cluster::default());
    let addr = serve(cluster.clone()).await;
    let backend = Arc::new(HttpBackend::new(format!("http://{addr}"), fast_retry(2)).unwrap());

    let config = PipelineBuilder::new()
        .input(sample_path())
        .workers(3)
        .batch_size(5)
        .index("covid")
        .build_config();
    let records = caseload_core::load_dataset(&config).unwrap();
    let total = records.len();

    let report = Pipeline::new(config, backend)
        .run(records, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.cluster.version, "7.17.9");
    assert_eq!(report.batches, total.div_ceil(5));
    assert_eq!(report.succeeded, total);
    assert_eq!(cluster.docs.lock().unwrap().len(), total);
}

#[tokio::test]
async fn pipeline_retries_timed_out_request() {
    let cluster = Arc::new(Cluster {
        stall_first: AtomicUsize::new(1),
        ..Default::default()
    });
    let addr = serve(cluster.clone()).await;
    let backend = HttpBackend::new(
        format!("http://{addr}"),
        HttpBackendConfig {
            request_timeout: Duration::from_millis(200),
            ..fast_retry(3)
        },
    )
    .unwrap();
    let deadline = backend.record_deadline();

    let config = PipelineBuilder::new()
        .input(sample_path())
        .limit(1)
        .workers(1)
        .batch_size(1)
        .request_timeout_ms(200)
        .record_deadline_ms(deadline.as_millis() as u64)
        .build_config();
    let records = caseload_core::load_dataset(&config).unwrap();

    let report = Pipeline::new(config, Arc::new(backend))
        .run(records, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!((report.succeeded, report.failed), (1, 0));
    assert_eq!(cluster.index_requests.load(Ordering::SeqCst), 2);
    assert_eq!(cluster.docs.lock().unwrap().len(), 1);
}
