//! End-to-end tests through the real HTTP client against an in-process
//! stub of the OpenSearch `_bulk` endpoint.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};

use oslane::{Connection, ConnectionConfig, EmergencyFn, LogRecord, Stats};

// =============================================================================
// Stub server
// =============================================================================

#[derive(Default)]
struct StubState {
    /// Raw request bodies received on `/_bulk`
    bodies: Mutex<Vec<String>>,

    /// Answer every bulk request with a plain-text 401
    force_unauthorized: AtomicBool,
}

async fn cluster_info() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "cluster_name": "stub-cluster",
        "version": { "number": "2.11.0" }
    }))
}

async fn bulk(State(stub): State<Arc<StubState>>, body: String) -> axum::response::Response {
    if stub.force_unauthorized.load(Ordering::SeqCst) {
        // plain text on purpose: auth middlewares answer like this
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    }

    assert!(!body.is_empty(), "bulk request body must not be empty");
    stub.bodies.lock().unwrap().push(body);
    axum::Json(serde_json::json!({ "took": 1, "errors": false })).into_response()
}

async fn start_stub() -> (Arc<StubState>, SocketAddr) {
    let stub = Arc::new(StubState::default());
    let app = Router::new()
        .route("/", get(cluster_info))
        .route("/_bulk", post(bulk))
        .with_state(Arc::clone(&stub));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (stub, addr)
}

fn stub_config(addr: SocketAddr) -> ConnectionConfig {
    ConnectionConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        protocol: "http".into(),
        index: "sample".into(),
        app_name: "stub-test".into(),
        log_threshold: 1,
        backoff_interval: Duration::from_millis(1),
        backoff_limit: Duration::from_millis(10),
        idle_flush_interval: Duration::from_millis(10),
        ..ConnectionConfig::default()
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met within timeout");
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_bulk_insert_round_trip() {
    let (stub, addr) = start_stub().await;
    let connection = Connection::connect(stub_config(addr)).await.unwrap();

    connection.log(LogRecord::new("hello opensearch").with_lane_id("lane-1"));
    wait_until(|| connection.stats().sent == 1).await;

    let bodies = stub.bodies.lock().unwrap().clone();
    assert_eq!(bodies.len(), 1);
    let body = &bodies[0];
    assert!(body.ends_with('\n'));

    let lines: Vec<&str> = body.lines().collect();
    assert_eq!(lines.len(), 2);
    let action: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(action["create"]["_index"], "sample");
    let document: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
    assert_eq!(document["appName"], "stub-test");
    assert_eq!(document["laneId"], "lane-1");
    assert_eq!(document["logMessage"], "hello opensearch");
    assert!(document["metadata"]["timestamp"].is_string());

    connection.detach().await.unwrap();
}

#[tokio::test]
async fn test_multiple_records_batched_in_order() {
    let (stub, addr) = start_stub().await;
    let config = ConnectionConfig {
        log_threshold: 5,
        ..stub_config(addr)
    };
    let connection = Connection::connect(config).await.unwrap();

    for i in 0..5 {
        connection.log(LogRecord::new(format!("entry {i}")));
    }
    wait_until(|| connection.stats().sent == 5).await;

    let bodies = stub.bodies.lock().unwrap().clone();
    let messages: Vec<String> = bodies
        .iter()
        .flat_map(|body| body.lines())
        .filter_map(|line| {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            value.get("logMessage").map(|m| m.as_str().unwrap().to_owned())
        })
        .collect();
    let expected: Vec<String> = (0..5).map(|i| format!("entry {i}")).collect();
    assert_eq!(messages, expected);

    connection.detach().await.unwrap();
}

#[tokio::test]
async fn test_plain_text_error_body_reaches_diagnostics() {
    let (stub, addr) = start_stub().await;
    stub.force_unauthorized.store(true, Ordering::SeqCst);

    let connection = Connection::connect(stub_config(addr)).await.unwrap();

    let captured: Arc<Mutex<Vec<Vec<LogRecord>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&captured);
    let handler: Arc<EmergencyFn> = Arc::new(move |batch| {
        sink.lock().unwrap().push(batch);
    });
    connection.set_emergency_handler(Some(handler));

    connection.log(LogRecord::new("rejected"));
    wait_until(|| connection.stats().sent_failed == 1).await;

    let batches = captured.lock().unwrap().clone();
    assert!(
        batches
            .iter()
            .any(|batch| batch.len() == 1 && batch[0].log_message.contains("Unauthorized")),
        "expected the 401 body to surface in a diagnostic record"
    );
    assert!(
        batches
            .iter()
            .any(|batch| batch.iter().any(|r| r.log_message == "rejected")),
        "expected the undeliverable batch on the emergency path"
    );

    assert_eq!(
        connection.stats(),
        Stats { queued: 1, sent: 0, sent_failed: 1 }
    );

    connection.detach().await.unwrap();
}
