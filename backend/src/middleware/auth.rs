//! Authentication middleware
//!
//! Accepts either the configured static API key or an HS256 bearer token.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::AuthConfig;
use crate::error::AppError;

pub const API_KEY_HEADER: &str = "x-api-key";

/// How the caller proved who they are
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthMethod {
    ApiKey,
    Bearer,
}

/// Authenticated principal, inserted into request extensions
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub subject: String,
    pub method: AuthMethod,
}

/// JWT claims structure
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    #[serde(default)]
    pub iat: i64,
}

pub async fn auth_middleware(
    State(auth): State<Arc<AuthConfig>>,
    mut request: Request,
    next: Next,
) -> Response {
    match authenticate(&auth, &request) {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(err) => err.into_response(),
    }
}

fn authenticate(auth: &AuthConfig, request: &Request) -> Result<AuthUser, AppError> {
    let headers = request.headers();

    if let Some(presented) = headers.get(API_KEY_HEADER).and_then(|h| h.to_str().ok()) {
        return match auth.api_key.as_deref() {
            Some(expected) if !expected.is_empty() && presented == expected => Ok(AuthUser {
                subject: "api-key".to_string(),
                method: AuthMethod::ApiKey,
            }),
            _ => Err(AppError::Unauthorized("Invalid API key".to_string())),
        };
    }

    let token = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("Missing or invalid Authorization header".to_string()))?;

    let claims = decode_jwt(token, &auth.jwt_secret).map_err(AppError::Unauthorized)?;

    Ok(AuthUser {
        subject: claims.sub,
        method: AuthMethod::Bearer,
    })
}

/// Decode and validate JWT token
fn decode_jwt(token: &str, secret: &str) -> Result<Claims, String> {
    use jsonwebtoken::{decode, DecodingKey, Validation};

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| format!("Invalid token: {}", e))
}

/// Extractor for authenticated user
/// Use this in handlers to get the current user
#[derive(Clone, Debug)]
pub struct CurrentUser(pub AuthUser);

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))
    }
}
