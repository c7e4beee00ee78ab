//! Maps [`ovp_core::GatewayError`] onto the HTTP and session wire
//! contracts (spec §7).
//!
//! HTTP handlers return `Result<T, GatewayError>`; this single
//! `IntoResponse` impl renders the JSON error body `{error, message,
//! timestamp}` for every kind. Session frames use `GatewayError::label`/
//! `tag` directly instead (see `crate::session::send_error`).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ovp_core::GatewayError;
use serde_json::json;

/// Wraps a `GatewayError` so `axum` handlers can return it directly.
/// A newtype rather than an inherent `impl IntoResponse for GatewayError`
/// since `GatewayError` lives in `ovp_core`, which does not depend on
/// `axum`.
pub struct ApiError(pub GatewayError);

impl From<GatewayError> for ApiError {
    fn from(e: GatewayError) -> Self {
        ApiError(e)
    }
}

/// Whether production mode should scrub error detail from response
/// bodies (spec §7, "Internal errors never leak provider credentials or
/// stack traces in production mode").
fn scrub_in_production(production: bool, err: &GatewayError) -> String {
    if production && matches!(err, GatewayError::Internal(_) | GatewayError::ProviderFailed(_)) {
        "an internal error occurred".to_string()
    } else {
        err.to_string()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let production = crate::state::is_production();
        let status = StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let message = scrub_in_production(production, &self.0);

        let mut body = json!({
            "error": self.0.label(),
            "message": message,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        if let GatewayError::RateLimited { reset_at_ms, remaining } = &self.0 {
            body["resetAt"] = json!(reset_at_ms);
            body["remaining"] = json!(remaining);
        }

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
