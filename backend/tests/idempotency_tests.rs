//! Idempotency guard tests
//!
//! Replays of a mutating request are rejected before the handler runs, and a failed attempt
//! frees its key for a retry.

mod common;

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware,
    routing::{get, post},
    Router,
};
use tower::ServiceExt;

use warehouse_ledger_backend::{
    create_app,
    middleware::idempotency_guard,
    services::{IdempotencyKey, IdempotencyStore, InMemoryIdempotencyStore},
};

use common::{body_json, lazy_state, TEST_API_KEY};

#[derive(Clone)]
struct Counter {
    hits: Arc<AtomicUsize>,
    fail_first: bool,
}

async fn count(State(counter): State<Counter>) -> StatusCode {
    let previous = counter.hits.fetch_add(1, Ordering::SeqCst);
    if counter.fail_first && previous == 0 {
        StatusCode::CONFLICT
    } else {
        StatusCode::CREATED
    }
}

fn router(store: Arc<InMemoryIdempotencyStore>, fail_first: bool) -> (Router, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Counter {
        hits: hits.clone(),
        fail_first,
    };
    let store: Arc<dyn IdempotencyStore> = store;

    let router = Router::new()
        .route("/orders/:code/approve", post(count))
        .route("/orders/:code/cancel", post(count))
        .route("/orders", get(count))
        .route_layer(middleware::from_fn_with_state(store, idempotency_guard))
        .with_state(counter);

    (router, hits)
}

fn request(method: &str, uri: &str, key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(key) = key {
        builder = builder.header("idempotency-key", key);
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_replay_is_rejected_without_running_handler() {
    let store = Arc::new(InMemoryIdempotencyStore::new());
    let (app, hits) = router(store.clone(), false);

    let first = app
        .clone()
        .oneshot(request("POST", "/orders/IN-1/approve", Some("abc")))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);

    let replay = app
        .oneshot(request("POST", "/orders/IN-1/approve", Some("abc")))
        .await
        .unwrap();
    assert_eq!(replay.status(), StatusCode::CONFLICT);
    let body = body_json(replay).await;
    assert_eq!(body["error"]["code"], "IDEMPOTENT_REPLAY");

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_same_key_on_other_path_is_independent() {
    let store = Arc::new(InMemoryIdempotencyStore::new());
    let (app, hits) = router(store.clone(), false);

    for uri in ["/orders/IN-1/approve", "/orders/IN-1/cancel", "/orders/IN-2/approve"] {
        let response = app.clone().oneshot(request("POST", uri, Some("abc"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED, "{}", uri);
    }

    assert_eq!(hits.load(Ordering::SeqCst), 3);
    assert_eq!(store.len(), 3);
}

#[tokio::test]
async fn test_failed_request_releases_key() {
    let store = Arc::new(InMemoryIdempotencyStore::new());
    let (app, hits) = router(store.clone(), true);

    let failed = app
        .clone()
        .oneshot(request("POST", "/orders/OUT-9/approve", Some("retry-me")))
        .await
        .unwrap();
    assert_eq!(failed.status(), StatusCode::CONFLICT);
    assert!(store.is_empty());

    let retried = app
        .oneshot(request("POST", "/orders/OUT-9/approve", Some("retry-me")))
        .await
        .unwrap();
    assert_eq!(retried.status(), StatusCode::CREATED);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_requests_without_key_are_not_guarded() {
    let store = Arc::new(InMemoryIdempotencyStore::new());
    let (app, hits) = router(store.clone(), false);

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(request("POST", "/orders/IN-1/approve", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }
    let blank = app
        .clone()
        .oneshot(request("POST", "/orders/IN-1/approve", Some("   ")))
        .await
        .unwrap();
    assert_eq!(blank.status(), StatusCode::CREATED);

    assert_eq!(hits.load(Ordering::SeqCst), 3);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_reads_ignore_idempotency_key() {
    let store = Arc::new(InMemoryIdempotencyStore::new());
    let (app, _hits) = router(store.clone(), false);

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(request("GET", "/orders", Some("abc")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_oversized_key_is_rejected() {
    let store = Arc::new(InMemoryIdempotencyStore::new());
    let (app, hits) = router(store.clone(), false);
    let key = "k".repeat(201);

    let response = app
        .oneshot(request("POST", "/orders/IN-1/approve", Some(&key)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(body["error"]["field"], "Idempotency-Key");
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_guard_claims_full_nested_path() {
    let store = Arc::new(InMemoryIdempotencyStore::new());
    let (inner, _hits) = router(store.clone(), false);
    let app = Router::new().nest("/api/v1", inner);

    let response = app
        .oneshot(request("POST", "/api/v1/orders/IN-1/approve", Some("nested")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let full = IdempotencyKey {
        key: "nested".to_string(),
        method: "POST".to_string(),
        path: "/api/v1/orders/IN-1/approve".to_string(),
    };
    assert!(!store.claim(&full).await.unwrap());
}

#[tokio::test]
async fn test_guard_validates_key_on_api_routes() {
    let app = create_app(lazy_state());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/outbound/OUT-1/pick")
                .header("x-api-key", TEST_API_KEY)
                .header("idempotency-key", "x".repeat(201))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
