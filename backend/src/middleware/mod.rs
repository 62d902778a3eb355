//! Request middleware: authentication gate and idempotency guard

pub mod auth;
pub mod idempotency;

pub use auth::{auth_middleware, AuthMethod, AuthUser, Claims, CurrentUser, API_KEY_HEADER};
pub use idempotency::{idempotency_guard, IDEMPOTENCY_HEADER};
