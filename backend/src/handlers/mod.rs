//! HTTP request handlers

pub mod health;
pub mod inbound;
pub mod notification;
pub mod outbound;
pub mod settings;
pub mod stock;

pub use health::*;
pub use inbound::*;
pub use notification::*;
pub use outbound::*;
pub use settings::*;
pub use stock::*;

use axum::http::{header::IF_MATCH, HeaderMap};
use serde::Deserialize;

use crate::error::{AppError, AppResult};

/// Optional body of the posting endpoints (`putaway`, `pick`)
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostInput {
    pub warehouse_code: Option<String>,
}

/// Read the order version a client expects from `If-Match`.
///
/// Both the quoted entity-tag form `"3"` and a bare `3` are accepted.
pub fn expected_version(headers: &HeaderMap) -> AppResult<Option<i64>> {
    let Some(raw) = headers.get(IF_MATCH) else {
        return Ok(None);
    };

    let invalid = || AppError::validation("If-Match", "If-Match must carry an order version");
    let value = raw.to_str().map_err(|_| invalid())?.trim();
    let value = value.strip_prefix("W/").unwrap_or(value);
    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value);

    value.parse::<i64>().map(Some).map_err(|_| invalid())
}
