use axum::{
    extract::{FromRequestParts, Query},
    http::request::Parts,
};
use serde::Deserialize;

use crate::AppState;
use crate::error::AppError;

/// Header carrying the admin token, accepted alongside the `token` query parameter.
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Proof that the request presented the configured admin token.
///
/// Add this as a handler parameter to restrict the handler to operators.
/// With no token configured every request is refused with
/// [`AppError::AdminDisabled`]; a missing or wrong token yields
/// [`AppError::Unauthorized`].
#[derive(Debug, Clone, Copy)]
pub struct AdminAccess;

impl FromRequestParts<AppState> for AdminAccess {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.config.admin.token() else {
            return Err(AppError::AdminDisabled);
        };

        let presented = presented_token(parts);
        match presented.as_deref() {
            Some(token) if tokens_match(token, expected) => Ok(AdminAccess),
            Some(_) => {
                tracing::warn!(path = %parts.uri.path(), "Admin token mismatch");
                Err(AppError::Unauthorized)
            }
            None => {
                tracing::warn!(path = %parts.uri.path(), "Admin token missing");
                Err(AppError::Unauthorized)
            }
        }
    }
}

/// Header first, then `?token=`.
fn presented_token(parts: &Parts) -> Option<String> {
    if let Some(value) = parts
        .headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        return Some(value.to_string());
    }

    Query::<TokenQuery>::try_from_uri(&parts.uri)
        .ok()
        .and_then(|Query(q)| q.token)
}

/// Exact comparison whose running time does not depend on where the inputs
/// first differ. Only the length can be observed.
pub fn tokens_match(presented: &str, expected: &str) -> bool {
    let (a, b) = (presented.as_bytes(), expected.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
