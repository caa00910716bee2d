//! Unified application error model.
//! Authentication failures are always recovered at the HTTP boundary: they turn into
//! structured JSON here, or into redirects in the gateway for browser navigation.

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AppError {
    #[error("Too many attempts. Please try again in {minutes} minutes.")]
    LockedOut { minutes: u64 },
    #[error("{message}")]
    InvalidCredential { message: String, attempts_left: u32 },
    #[error("Authentication required")]
    Unauthenticated,
    #[error("identity provider unavailable: {0}")]
    IdentityProviderUnavailable(String),
    #[error("too many requests")]
    RateLimited { retry_after_secs: u64 },
    #[error("{0}")]
    UserInput(String),
    #[error("{0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn code_str(&self) -> &'static str {
        match self {
            AppError::LockedOut { .. } => "locked_out",
            AppError::InvalidCredential { .. } => "invalid_credential",
            AppError::Unauthenticated => "unauthenticated",
            AppError::IdentityProviderUnavailable(_) => "identity_provider_unavailable",
            AppError::RateLimited { .. } => "rate_limited",
            AppError::UserInput(_) => "bad_input",
            AppError::NotFound(_) => "not_found",
            AppError::Io(_) => "io",
            AppError::Internal(_) => "internal",
        }
    }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> StatusCode {
        match self {
            AppError::LockedOut { .. } | AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::InvalidCredential { .. } | AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::IdentityProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::UserInput(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Io(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// JSON body in the shape the browser client expects for each failure.
    pub fn body(&self) -> serde_json::Value {
        match self {
            AppError::LockedOut { minutes } => json!({
                "error": self.to_string(),
                "locked": true,
                "lockoutMinutes": minutes,
            }),
            AppError::InvalidCredential { attempts_left, .. } => json!({
                "valid": false,
                "error": self.to_string(),
                "attemptsLeft": attempts_left,
            }),
            AppError::Unauthenticated => json!({
                "error": self.to_string(),
                "loginUrl": "/login",
            }),
            other => json!({ "error": other.to_string(), "code": other.code_str() }),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.http_status();
        let mut resp = (status, Json(self.body())).into_response();
        if let AppError::RateLimited { retry_after_secs } = self {
            if let Ok(v) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                resp.headers_mut().insert("retry-after", v);
            }
        }
        resp
    }
}

pub type AppResult<T> = Result<T, AppError>;

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self { AppError::Io(err.to_string()) }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self { AppError::Internal(err.to_string()) }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
