//! API Integration Tests
//!
//! Drives the participant-facing routes end to end over the in-memory
//! store and the simulated compute provider.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use coordinator::api;
use coordinator::auth::StaticAuthorizer;
use coordinator::compute::memory::InstanceState;
use coordinator::compute::InMemoryCompute;
use coordinator::engine::{Coordinator, CoordinatorSettings, LifecycleTrigger};
use coordinator::store::{DocumentStore, InMemoryStudyStore, RetryPolicy};
use coordinator::AppState;
use shared_types::{Parameter, StudyRecord};

const STUDY: &str = "gwasdemo";

struct TestApp {
    app: axum::Router,
    store: Arc<InMemoryStudyStore>,
    compute: Arc<InMemoryCompute>,
    coordinator: Arc<Coordinator>,
}

fn study_record() -> StudyRecord {
    let mut personal_parameters = BTreeMap::new();
    for (participant, project) in [("Broad", "broad-proj"), ("alice@example.org", "alice-proj")] {
        let mut params = BTreeMap::new();
        params.insert(
            "GCP_PROJECT".to_string(),
            Parameter::new("GCP Project ID", "", json!(project)),
        );
        params.insert(
            "DELETE_VM".to_string(),
            Parameter::new("Delete VM", "", json!("No")),
        );
        personal_parameters.insert(participant.to_string(), params);
    }

    StudyRecord {
        title: "GWAS Demo".to_string(),
        setup_configuration: "website".to_string(),
        participants: vec!["Broad".to_string(), "alice@example.org".to_string()],
        personal_parameters,
        ..Default::default()
    }
}

async fn setup_test_app() -> TestApp {
    let store = Arc::new(InMemoryStudyStore::new());
    store
        .insert(STUDY, &study_record())
        .await
        .expect("Failed to seed study");

    let compute = Arc::new(InMemoryCompute::new());
    compute.add_running("alice-proj", "gwasdemo1").await;

    let coordinator = Arc::new(Coordinator::new(
        store.clone(),
        LifecycleTrigger::new(compute.clone(), 2),
        CoordinatorSettings {
            write_retry: RetryPolicy::fixed(5, Duration::ZERO),
            task_retry: RetryPolicy::fixed(10, Duration::from_millis(1)),
        },
    ));

    let authorizer = StaticAuthorizer::new()
        .with_key("key-alice", STUDY, "alice@example.org")
        .with_key("key-stranger", STUDY, "mallory")
        .with_key("key-orphan", "deleted-study", "alice@example.org");

    let state = Arc::new(AppState {
        store: store.clone(),
        coordinator: Arc::clone(&coordinator),
        authorizer: Arc::new(authorizer),
    });

    TestApp {
        app: api::router(state),
        store,
        compute,
        coordinator,
    }
}

fn get(uri: &str, key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(key) = key {
        builder = builder.header("Authorization", key);
    }
    builder.body(Body::empty()).unwrap()
}

fn update_uri(msg: &str) -> String {
    let encoded: String = msg
        .chars()
        .map(|c| match c {
            ' ' => "%20".to_string(),
            ':' => "%3A".to_string(),
            '=' => "%3D".to_string(),
            other => other.to_string(),
        })
        .collect();
    format!("/api/update_firestore?msg={encoded}")
}

async fn json_response(app: &axum::Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.expect("Request failed");
    let status = response.status();
    let body = response
        .into_body()
        .collect()
        .await
        .expect("Failed to read body")
        .to_bytes();
    let value: Value = serde_json::from_slice(&body).expect("Invalid JSON response");
    (status, value)
}

#[tokio::test]
async fn test_health_needs_no_key() {
    let t = setup_test_app().await;
    let (status, body) = json_response(&t.app, get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_missing_or_unknown_key_is_unauthorized() {
    let t = setup_test_app().await;

    let (status, body) = json_response(&t.app, get("/api/get_username", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "error": "unauthorized" }));

    let (status, _) = json_response(&t.app, get("/api/get_username", Some("bogus"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_get_username() {
    let t = setup_test_app().await;
    let (status, body) = json_response(&t.app, get("/api/get_username", Some("key-alice"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alice@example.org");
}

#[tokio::test]
async fn test_status_update_and_teardown() {
    let t = setup_test_app().await;

    let uri = update_uri("update_firestore::status=Finished protocol");
    let (status, body) = json_response(&t.app, get(&uri, Some("key-alice"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({}));

    t.coordinator.lifecycle().wait_idle().await;
    assert_eq!(
        t.compute.state_of("alice-proj", "gwasdemo1").await,
        Some(InstanceState::Stopped)
    );

    let (status, record) =
        json_response(&t.app, get("/api/get_doc_ref_dict", Some("key-alice"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["status"]["alice@example.org"], "Finished protocol");
    assert_eq!(record["title"], "GWAS Demo");
}

#[tokio::test]
async fn test_task_updates_through_api() {
    let t = setup_test_app().await;
    for task in ["QC", "QC", "QC completed", "PCA"] {
        let uri = update_uri(&format!("update_firestore::task={task}"));
        let (status, _) = json_response(&t.app, get(&uri, Some("key-alice"))).await;
        assert_eq!(status, StatusCode::OK);
    }

    let record = t.store.get(STUDY).await.unwrap();
    assert_eq!(record.tasks["alice@example.org"], vec!["QC completed", "PCA"]);
}

#[tokio::test]
async fn test_bad_requests() {
    let t = setup_test_app().await;

    // No separator.
    let (status, body) =
        json_response(&t.app, get(&update_uri("status=QC"), Some("key-alice"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("malformed"));

    // No msg at all.
    let (status, _) =
        json_response(&t.app, get("/api/update_firestore", Some("key-alice"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Unknown parameter.
    let (status, body) = json_response(
        &t.app,
        get(&update_uri("update_firestore::NOT_A_PARAM=1"), Some("key-alice")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"],
        format!("parameter NOT_A_PARAM not found in {STUDY}")
    );

    // Authorized key whose participant is not in the study.
    let (status, _) = json_response(
        &t.app,
        get(&update_uri("update_firestore::status=QC"), Some("key-stranger")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Study record missing.
    let (status, _) =
        json_response(&t.app, get("/api/get_doc_ref_dict", Some("key-orphan"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(t.store.commit_count().await, 0);
}

#[tokio::test]
async fn test_parameter_update_through_api() {
    let t = setup_test_app().await;
    let uri = update_uri("update_firestore::DELETE_VM=Yes");
    let (status, _) = json_response(&t.app, get(&uri, Some("key-alice"))).await;
    assert_eq!(status, StatusCode::OK);

    let record = t.store.get(STUDY).await.unwrap();
    assert_eq!(
        record.personal_parameters["alice@example.org"]["DELETE_VM"].value,
        json!("Yes")
    );
    assert_eq!(
        record.personal_parameters["Broad"]["DELETE_VM"].value,
        json!("No")
    );
}
