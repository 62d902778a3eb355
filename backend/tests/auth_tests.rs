//! Authentication tests
//!
//! API key and bearer token acceptance, rejection of missing or forged credentials, and the
//! `CurrentUser` extractor.

mod common;

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware,
    routing::get,
    Router,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use tower::ServiceExt;

use warehouse_ledger_backend::{
    config::AuthConfig,
    create_app,
    middleware::{auth_middleware, AuthMethod, Claims, CurrentUser},
    services::{IdempotencyKey, IdempotencyStore},
};

use common::{body_json, lazy_state, TEST_API_KEY, TEST_JWT_SECRET};

async fn whoami(CurrentUser(user): CurrentUser) -> String {
    let method = match user.method {
        AuthMethod::ApiKey => "key",
        AuthMethod::Bearer => "bearer",
    };
    format!("{}:{}", method, user.subject)
}

fn guarded_router() -> Router {
    let auth = Arc::new(AuthConfig {
        jwt_secret: TEST_JWT_SECRET.to_string(),
        api_key: Some(TEST_API_KEY.to_string()),
    });

    Router::new()
        .route("/me", get(whoami))
        .route_layer(middleware::from_fn_with_state(auth, auth_middleware))
}

fn token(secret: &str, exp_offset_secs: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: "clerk-7".to_string(),
        exp: now + exp_offset_secs,
        iat: now,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .expect("encode token")
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    String::from_utf8(bytes.to_vec()).expect("utf8")
}

#[tokio::test]
async fn test_api_key_is_accepted() {
    let response = guarded_router()
        .oneshot(
            Request::builder()
                .uri("/me")
                .header("x-api-key", TEST_API_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "key:api-key");
}

#[tokio::test]
async fn test_wrong_api_key_is_rejected() {
    let response = guarded_router()
        .oneshot(
            Request::builder()
                .uri("/me")
                .header("x-api-key", "not-the-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_bearer_token_is_accepted() {
    let response = guarded_router()
        .oneshot(
            Request::builder()
                .uri("/me")
                .header("authorization", format!("Bearer {}", token(TEST_JWT_SECRET, 3600)))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "bearer:clerk-7");
}

#[tokio::test]
async fn test_token_signed_with_other_secret_is_rejected() {
    let response = guarded_router()
        .oneshot(
            Request::builder()
                .uri("/me")
                .header("authorization", format!("Bearer {}", token("someone-else", 3600)))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_expired_token_is_rejected() {
    let response = guarded_router()
        .oneshot(
            Request::builder()
                .uri("/me")
                .header("authorization", format!("Bearer {}", token(TEST_JWT_SECRET, -3600)))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_missing_credentials_are_rejected() {
    let response = guarded_router()
        .oneshot(Request::builder().uri("/me").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_api_routes_require_authentication() {
    let app = create_app(lazy_state());

    for uri in [
        "/api/v1/inbound",
        "/api/v1/outbound/OUT-1",
        "/api/v1/stock",
        "/api/v1/stock/movements",
        "/api/v1/notifications",
        "/api/v1/settings/alerts",
    ] {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", uri);
    }
}

#[tokio::test]
async fn test_rejected_request_does_not_claim_idempotency_key() {
    let state = lazy_state();
    let store = state.idempotency.clone();
    let app = create_app(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/inbound/IN-1/cancel")
                .header("idempotency-key", "k-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let key = IdempotencyKey {
        key: "k-1".to_string(),
        method: "POST".to_string(),
        path: "/api/v1/inbound/IN-1/cancel".to_string(),
    };
    assert!(store.claim(&key).await.unwrap());
}
