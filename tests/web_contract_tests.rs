//! HTTP contract tests: every route driven through the router in-process.

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use medreg::{AppState, MemoryStore, Registry, build_router};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::Arc;
use tower::ServiceExt;

fn app(registry: &Registry) -> Router {
    build_router(AppState::new(registry.clone()))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.oneshot(request).await.expect("router is infallible");
    let status = response.status();
    let body = response
        .into_body()
        .collect()
        .await
        .expect("body collects")
        .to_bytes()
        .to_vec();
    (status, body)
}

async fn post_json(app: Router, uri: &str, payload: Value) -> (StatusCode, Value) {
    let (status, body) = send(
        app,
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .expect("valid request"),
    )
    .await;
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let (status, body) = send(
        app,
        Request::builder().uri(uri).body(Body::empty()).expect("valid request"),
    )
    .await;
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

async fn get_ndjson(app: Router, uri: &str) -> (StatusCode, Vec<Value>) {
    let (status, body) = send(
        app,
        Request::builder().uri(uri).body(Body::empty()).expect("valid request"),
    )
    .await;
    let items = String::from_utf8(body)
        .expect("utf8 body")
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect();
    (status, items)
}

fn person_id(value: &Value) -> u64 {
    value["person"]["id"].as_u64().expect("person id")
}

#[tokio::test]
async fn test_register_people_and_fetch_them() {
    let registry = Registry::new();

    let (status, patient) = post_json(app(&registry), "/patients", json!({"name": "Alice"})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(person_id(&patient), 1);
    assert_eq!(patient["person"]["name"], "Alice");

    let (status, doctor) = post_json(
        app(&registry),
        "/doctors",
        json!({"name": "Bob", "birth_date": "1970-05-01"}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(person_id(&doctor), 2);
    assert_eq!(doctor["person"]["birth_date"], "1970-05-01");

    let (status, technician) = post_json(app(&registry), "/technicians", json!({"name": "Tess"})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(person_id(&technician), 3);

    let (status, fetched) = get_json(app(&registry), "/doctors/2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, doctor);

    let (status, problem) = get_json(app(&registry), "/patients/2").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(problem["code"], "not_found");

    let (status, problem) = get_json(app(&registry), "/patients/abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(problem["code"], "input_error");

    let (status, patients) = get_ndjson(app(&registry), "/patients").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(patients, vec![patient]);
}

#[tokio::test]
async fn test_submitted_id_is_ignored() {
    let registry = Registry::new();
    let (status, created) =
        post_json(app(&registry), "/patients", json!({"id": 99, "name": "Sneaky"})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(person_id(&created), 1);
}

#[tokio::test]
async fn test_test_submission_and_queries() {
    let registry = Registry::new();
    let (_, doctor) = post_json(app(&registry), "/doctors", json!({"name": "Doc"})).await;
    let (_, technician) = post_json(app(&registry), "/technicians", json!({"name": "Tech"})).await;
    let (_, alice) = post_json(app(&registry), "/patients", json!({"name": "Alice"})).await;
    let (_, bob) = post_json(app(&registry), "/patients", json!({"name": "Bob"})).await;

    for patient in [&alice, &alice, &bob, &bob] {
        let (status, created) = post_json(
            app(&registry),
            "/tests",
            json!({
                "doctor": person_id(&doctor),
                "patient": person_id(patient),
                "technician": person_id(&technician),
                "results": {"cholesterol": "190"}
            }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["status"], "Created");
        assert_eq!(created["test"]["results"]["cholesterol"], "190");
    }

    let (status, test) = get_json(app(&registry), "/tests/3").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(test["patient"], bob);

    let (status, _) = get_json(app(&registry), "/tests/30").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, all) = get_ndjson(app(&registry), "/tests").await;
    assert_eq!(all.len(), 4);

    let ids = |items: Vec<Value>| -> HashSet<u64> {
        items.iter().map(|t| t["id"].as_u64().expect("test id")).collect()
    };
    let (_, even) = get_ndjson(app(&registry), "/tests?parity=even").await;
    assert_eq!(ids(even), HashSet::from([2, 4]));
    let (_, odd) = get_ndjson(app(&registry), "/tests?parity=odd").await;
    assert_eq!(ids(odd), HashSet::from([1, 3]));

    let uri = format!("/patients/{}/tests", person_id(&alice));
    let (status, alice_tests) = get_ndjson(app(&registry), &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(alice_tests), HashSet::from([1, 2]));
}

#[tokio::test]
async fn test_rejected_submission_lists_missing_kinds() {
    let registry = Registry::new();
    let (_, technician) = post_json(app(&registry), "/technicians", json!({"name": "Tech"})).await;

    let (status, body) = post_json(
        app(&registry),
        "/tests",
        json!({"doctor": 50, "patient": 51, "technician": person_id(&technician)}),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["status"], "Cannot find: doctor, patient");
    assert_eq!(body["missing"], json!(["doctor", "patient"]));

    let (_, tests) = get_ndjson(app(&registry), "/tests").await;
    assert!(tests.is_empty());
}

#[tokio::test]
async fn test_health_reports_phase_and_counts() {
    let registry = Registry::new();
    post_json(app(&registry), "/patients", json!({"name": "Alice"})).await;

    let (status, health) = get_json(app(&registry), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["phase"], "serving");
    assert_eq!(health["counts"]["patients"], 1);
    assert_eq!(health["person_counter"], 1);
}

#[tokio::test]
async fn test_draining_registry_answers_503() {
    let registry = Registry::new();
    registry.shutdown(Arc::new(MemoryStore::new())).await.unwrap();

    let (status, problem) = post_json(app(&registry), "/patients", json!({"name": "Late"})).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(problem["code"], "draining");

    let (status, _) = send(
        app(&registry),
        Request::builder().uri("/tests").body(Body::empty()).expect("valid request"),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (_, health) = get_json(app(&registry), "/health").await;
    assert_eq!(health["phase"], "terminated");
}

#[tokio::test]
async fn test_malformed_input_uses_error_body() {
    let registry = Registry::new();

    let (status, body) = send(
        app(&registry),
        Request::builder()
            .method("POST")
            .uri("/patients")
            .header("content-type", "application/json")
            .body(Body::from("{\"name\": "))
            .expect("valid request"),
    )
    .await;
    let problem: Value = serde_json::from_slice(&body).expect("json error body");
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(problem["code"], "input_error");

    let (status, problem) = post_json(app(&registry), "/tests", json!({"doctor": "one"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(problem["code"], "input_error");

    let (status, problem) = get_json(app(&registry), "/tests?parity=sideways").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(problem["code"], "input_error");
    assert!(problem["error"].as_str().is_some_and(|e| !e.is_empty()));

    assert_eq!(registry.stats().await.person_counter, 0);
}
