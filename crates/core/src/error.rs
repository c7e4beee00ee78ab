//! Gateway-wide error kind.
//!
//! One enum carries every error kind named in the request-pipeline design;
//! each HTTP surface maps it to a status code and a `{error, message,
//! timestamp}` body. Session frames map it to `{type:"error", error, code}`
//! instead (see `ovp_server::session`).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("rate limit exceeded")]
    RateLimited { reset_at_ms: i64, remaining: u32 },

    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("provider failed: {0}")]
    ProviderFailed(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Stable machine-readable tag, used in both the HTTP JSON body and
    /// session `error` frames.
    pub fn tag(&self) -> &'static str {
        match self {
            GatewayError::BadRequest(_) => "BadRequest",
            GatewayError::Unauthorized(_) => "Unauthorized",
            GatewayError::Forbidden(_) => "Forbidden",
            GatewayError::NotFound(_) => "NotFound",
            GatewayError::RateLimited { .. } => "RateLimited",
            GatewayError::ProviderUnavailable(_) => "ProviderUnavailable",
            GatewayError::ProviderFailed(_) => "ProviderFailed",
            GatewayError::Unsupported(_) => "Unsupported",
            GatewayError::Config(_) => "Internal",
            GatewayError::Persistence(_) => "Internal",
            GatewayError::Internal(_) => "Internal",
        }
    }

    /// Human-readable phrase for the HTTP JSON error body's `error`
    /// field (spec §8 scenarios 3 and 4 pin the exact wording for rate
    /// limiting and voice-not-found).
    pub fn label(&self) -> String {
        match self {
            GatewayError::RateLimited { .. } => "Rate Limit Exceeded".to_string(),
            GatewayError::Config(_) | GatewayError::Persistence(_) | GatewayError::Internal(_) => {
                "Internal Server Error".to_string()
            }
            other => other.to_string(),
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::BadRequest(_) => 400,
            GatewayError::Unauthorized(_) => 401,
            GatewayError::Forbidden(_) => 403,
            GatewayError::NotFound(_) => 404,
            GatewayError::RateLimited { .. } => 429,
            GatewayError::ProviderUnavailable(_) => 503,
            GatewayError::ProviderFailed(_) => 500,
            GatewayError::Unsupported(_) => 400,
            GatewayError::Config(_) | GatewayError::Persistence(_) | GatewayError::Internal(_) => {
                500
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
