//! Replay guard for mutating requests
//!
//! A request carrying an `Idempotency-Key` claims `(key, method, path)` before its handler
//! runs. A second request with the same triple is rejected without reaching the handler. When
//! the handler fails the claim is released, since the failed attempt changed nothing.

use std::sync::Arc;

use axum::{
    extract::{OriginalUri, Request, State},
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
};

use shared::validate_idempotency_key;

use crate::error::AppError;
use crate::services::{IdempotencyKey, IdempotencyStore};

pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

fn is_guarded(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

/// Extract the claim for a request, if it should be guarded at all.
fn request_key(request: &Request) -> Result<Option<IdempotencyKey>, AppError> {
    if !is_guarded(request.method()) {
        return Ok(None);
    }

    let Some(raw) = request.headers().get(IDEMPOTENCY_HEADER) else {
        return Ok(None);
    };
    let key = raw
        .to_str()
        .map_err(|_| AppError::validation("Idempotency-Key", "Idempotency key must be visible ASCII"))?
        .trim();
    if key.is_empty() {
        return Ok(None);
    }
    validate_idempotency_key(key).map_err(|msg| AppError::validation("Idempotency-Key", msg))?;

    // Nested routers see a stripped URI; the claim is on the full path.
    let path = request
        .extensions()
        .get::<OriginalUri>()
        .map(|uri| uri.0.path().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    Ok(Some(IdempotencyKey {
        key: key.to_string(),
        method: request.method().as_str().to_string(),
        path,
    }))
}

pub async fn idempotency_guard(
    State(store): State<Arc<dyn IdempotencyStore>>,
    request: Request,
    next: Next,
) -> Response {
    let key = match request_key(&request) {
        Ok(Some(key)) => key,
        Ok(None) => return next.run(request).await,
        Err(err) => return err.into_response(),
    };

    match store.claim(&key).await {
        Ok(true) => {}
        Ok(false) => {
            tracing::warn!(key = %key.key, method = %key.method, path = %key.path, "Idempotent replay rejected");
            return AppError::IdempotentReplay.into_response();
        }
        Err(err) => return err.into_response(),
    }

    let response = next.run(request).await;

    if !response.status().is_success() {
        if let Err(err) = store.release(&key).await {
            tracing::error!(key = %key.key, "Failed to release idempotency key: {}", err);
        }
    }

    response
}
