//! Error types for relay operations.
//!
//! Provides [`RelayError`], the single error enum surfaced by the store and
//! the proxy, together with its HTTP status mapping.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

/// Errors that can occur while handling a relay request.
///
/// An absent task or result is not an error: polls that find nothing are a
/// normal outcome and are reported as `None` by the store.
///
/// # Examples
///
/// ```
/// use handoff_relay::RelayError;
/// use axum::http::StatusCode;
///
/// let err = RelayError::Validation("Missing sessionId".to_string());
/// assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
/// assert_eq!(err.to_string(), "Missing sessionId");
/// ```
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// A required payload field was missing or empty.
    #[error("{0}")]
    Validation(String),

    /// The proxy request was malformed (target or body).
    #[error("{0}")]
    BadRequest(String),

    /// The proxy target host is not on the allow-list.
    #[error("upstream host not allowed: {host}")]
    Forbidden {
        /// The rejected host.
        host: String,
    },

    /// The request body exceeded the configured limit.
    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge {
        /// The configured limit in bytes.
        limit: usize,
    },

    /// The upstream could not be reached or failed mid-request.
    #[error("upstream request failed: {0}")]
    BadGateway(String),

    /// The upstream did not answer within the configured timeout.
    #[error("upstream timed out after {}s", after.as_secs())]
    GatewayTimeout {
        /// The timeout that elapsed.
        after: Duration,
    },
}

impl RelayError {
    /// Maps this error to the HTTP status returned to the caller.
    ///
    /// - `400`: `Validation`, `BadRequest`
    /// - `403`: `Forbidden`
    /// - `413`: `PayloadTooLarge`
    /// - `502`: `BadGateway`
    /// - `504`: `GatewayTimeout`
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::GatewayTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Returns `true` if the caller may succeed by retrying the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BadGateway(_) | Self::GatewayTimeout { .. })
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!(error = %self, status = status.as_u16(), "relay error");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }
        (status, Json(json!({ "ok": false, "error": self.to_string() }))).into_response()
    }
}
