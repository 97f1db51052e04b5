use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sitekick_core::error::SitekickError;

// ---------------------------------------------------------------------------
// Internal sentinels for explicit 400 / 401 errors
// ---------------------------------------------------------------------------

/// Carries an explicit HTTP 400 through the `anyhow::Error` chain without
/// touching the `SitekickError` enum.
#[derive(Debug)]
struct BadRequestError(String);

impl std::fmt::Display for BadRequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BadRequestError {}

#[derive(Debug)]
struct UnauthorizedError;

impl std::fmt::Display for UnauthorizedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("unauthorized")
    }
}

impl std::error::Error for UnauthorizedError {}

// ---------------------------------------------------------------------------
// AppError: unified error type for HTTP responses
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(BadRequestError(msg.into()).into())
    }

    pub fn unauthorized() -> Self {
        Self(UnauthorizedError.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Some(b) = self.0.downcast_ref::<BadRequestError>() {
            let body = serde_json::json!({ "error": b.0.clone() });
            return (StatusCode::BAD_REQUEST, axum::Json(body)).into_response();
        }
        if self.0.downcast_ref::<UnauthorizedError>().is_some() {
            let body = serde_json::json!({ "error": "unauthorized" });
            return (StatusCode::UNAUTHORIZED, axum::Json(body)).into_response();
        }

        let status = if let Some(e) = self.0.downcast_ref::<SitekickError>() {
            match e {
                SitekickError::SubjectNotFound(_) => StatusCode::NOT_FOUND,
                SitekickError::InvalidEventType(_)
                | SitekickError::InvalidProjectStatus(_)
                | SitekickError::InvalidPaymentStatus(_)
                | SitekickError::InvalidOutcome(_) => StatusCode::BAD_REQUEST,
                SitekickError::Dispatch(_) => StatusCode::BAD_GATEWAY,
                SitekickError::Storage(_)
                | SitekickError::Config(_)
                | SitekickError::Io(_)
                | SitekickError::Yaml(_)
                | SitekickError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
            }
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self.0, "request failed");
        }

        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
