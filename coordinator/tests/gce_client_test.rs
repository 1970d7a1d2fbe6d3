//! Compute Engine client tests
//!
//! Runs a local axum server standing in for both the Compute REST API and the
//! metadata server, and checks the requests the client sends.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio::sync::Mutex;

use coordinator::compute::{ComputeError, ComputeProvider, GceCompute};

#[derive(Default)]
struct FakeGce {
    /// (method, project, zone, instance, authorization header)
    requests: Mutex<Vec<(String, String, String, String, String)>>,
    token_fetches: AtomicUsize,
}

type InstancePath = Path<(String, String, String)>;

async fn stop_instance(
    State(fake): State<Arc<FakeGce>>,
    Path((project, zone, name)): InstancePath,
    headers: HeaderMap,
) -> (StatusCode, Json<serde_json::Value>) {
    record(&fake, "stop", &project, &zone, &name, &headers).await;
    respond_for(&name)
}

async fn delete_instance(
    State(fake): State<Arc<FakeGce>>,
    Path((project, zone, name)): InstancePath,
    headers: HeaderMap,
) -> (StatusCode, Json<serde_json::Value>) {
    record(&fake, "delete", &project, &zone, &name, &headers).await;
    respond_for(&name)
}

async fn metadata_token(
    State(fake): State<Arc<FakeGce>>,
    headers: HeaderMap,
) -> (StatusCode, Json<serde_json::Value>) {
    if headers.get("Metadata-Flavor").and_then(|v| v.to_str().ok()) != Some("Google") {
        return (StatusCode::FORBIDDEN, Json(json!({})));
    }
    fake.token_fetches.fetch_add(1, Ordering::SeqCst);
    (
        StatusCode::OK,
        Json(json!({
            "access_token": "metadata-token",
            "expires_in": 3599,
            "token_type": "Bearer"
        })),
    )
}

async fn record(
    fake: &FakeGce,
    method: &str,
    project: &str,
    zone: &str,
    name: &str,
    headers: &HeaderMap,
) {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    fake.requests.lock().await.push((
        method.to_string(),
        project.to_string(),
        zone.to_string(),
        name.to_string(),
        auth,
    ));
}

fn respond_for(name: &str) -> (StatusCode, Json<serde_json::Value>) {
    match name {
        "gone1" => (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" }))),
        "broken1" => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "backend exploded" })),
        ),
        _ => (StatusCode::OK, Json(json!({ "kind": "compute#operation" }))),
    }
}

async fn spawn_fake() -> (String, Arc<FakeGce>) {
    let fake = Arc::new(FakeGce::default());
    let app = Router::new()
        .route(
            "/compute/v1/projects/{project}/zones/{zone}/instances/{name}/stop",
            post(stop_instance),
        )
        .route(
            "/compute/v1/projects/{project}/zones/{zone}/instances/{name}",
            axum::routing::delete(delete_instance),
        )
        .route("/metadata/token", get(metadata_token))
        .with_state(Arc::clone(&fake));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind fake server");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), fake)
}

fn client_for(base: &str, token: Option<&str>) -> GceCompute {
    GceCompute::new(
        reqwest::Client::new(),
        "europe-west1-b".to_string(),
        token.map(str::to_string),
    )
    .with_api_base(format!("{base}/compute/v1"))
    .with_metadata_url(format!("{base}/metadata/token"))
}

#[tokio::test]
async fn test_stop_and_delete_requests() {
    let (base, fake) = spawn_fake().await;
    let gce = client_for(&base, Some("static-token"));

    gce.stop_instance("proj-a", "studyx1").await.unwrap();
    gce.delete_instance("proj-b", "studyx2").await.unwrap();

    let requests = fake.requests.lock().await.clone();
    assert_eq!(
        requests,
        vec![
            (
                "stop".to_string(),
                "proj-a".to_string(),
                "europe-west1-b".to_string(),
                "studyx1".to_string(),
                "Bearer static-token".to_string(),
            ),
            (
                "delete".to_string(),
                "proj-b".to_string(),
                "europe-west1-b".to_string(),
                "studyx2".to_string(),
                "Bearer static-token".to_string(),
            ),
        ]
    );
    assert_eq!(fake.token_fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_instance_is_success() {
    let (base, _fake) = spawn_fake().await;
    let gce = client_for(&base, Some("static-token"));

    gce.stop_instance("proj-a", "gone1").await.unwrap();
    gce.delete_instance("proj-a", "gone1").await.unwrap();
}

#[tokio::test]
async fn test_api_failure_is_reported() {
    let (base, _fake) = spawn_fake().await;
    let gce = client_for(&base, Some("static-token"));

    match gce.stop_instance("proj-a", "broken1").await {
        Err(ComputeError::Api { status, body }) => {
            assert_eq!(status, 500);
            assert!(body.contains("backend exploded"));
        }
        other => panic!("expected api error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_metadata_token_is_cached() {
    let (base, fake) = spawn_fake().await;
    let gce = client_for(&base, None);

    gce.stop_instance("proj-a", "studyx1").await.unwrap();
    gce.stop_instance("proj-a", "studyx2").await.unwrap();

    assert_eq!(fake.token_fetches.load(Ordering::SeqCst), 1);
    let requests = fake.requests.lock().await.clone();
    assert!(requests
        .iter()
        .all(|(_, _, _, _, auth)| auth == "Bearer metadata-token"));
}

#[tokio::test]
async fn test_unreachable_metadata_server() {
    let gce = GceCompute::new(reqwest::Client::new(), "us-central1-a".to_string(), None)
        .with_api_base("http://127.0.0.1:9")
        .with_metadata_url("http://127.0.0.1:9/token");

    assert!(matches!(
        gce.delete_instance("proj-a", "studyx1").await,
        Err(ComputeError::Token(_))
    ));
}
