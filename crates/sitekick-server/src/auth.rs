use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::AppError;

/// Bearer-token guard for `/api/admin/*`.
///
/// When `token` is `None` every request is refused: admin routes are never
/// open by default.
#[derive(Clone, Default)]
pub struct AdminAuth {
    pub token: Option<String>,
}

impl AdminAuth {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    fn accepts(&self, presented: &str) -> bool {
        match self.token.as_deref() {
            Some(expected) if !expected.is_empty() => {
                constant_time_eq(expected.as_bytes(), presented.as_bytes())
            }
            _ => false,
        }
    }
}

/// Axum middleware checking `Authorization: Bearer <token>`.
pub async fn admin_auth(State(auth): State<AdminAuth>, req: Request, next: Next) -> Response {
    let presented = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    match presented {
        Some(token) if auth.accepts(token) => next.run(req).await,
        _ => {
            tracing::warn!(path = %req.uri().path(), "admin request rejected");
            AppError::unauthorized().into_response()
        }
    }
}

/// Compares fixed-size digests so neither the contents nor the length of the
/// expected token show up in timing.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let (a, b) = (Sha256::digest(a), Sha256::digest(b));
    bool::from(a.as_slice().ct_eq(b.as_slice()))
}
