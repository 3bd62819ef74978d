use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use onair_core::{FeedError, ReconcileError, RemoteError};
use onair_model::FeedStatus;
use serde_json::json;
use std::{fmt, time::Duration};
use tracing::error;

use crate::handlers::FEED_STATUS_HEADER;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
    /// Set for feed failures so clients see `feedStatus` without parsing text.
    pub feed_status: Option<FeedStatus>,
    pub retry_after: Option<Duration>,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            feed_status: None,
            retry_after: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    pub fn rate_limited(retry_after: Duration) -> Self {
        Self {
            retry_after: Some(retry_after),
            ..Self::new(StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded")
        }
    }

    pub fn with_feed_status(mut self, status: FeedStatus) -> Self {
        self.feed_status = Some(status);
        self
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut error = json!({
            "message": self.message,
            "status": self.status.as_u16(),
        });
        let mut headers = HeaderMap::new();

        if let Some(feed_status) = self.feed_status {
            error["feedStatus"] = json!(feed_status);
            headers.insert(
                FEED_STATUS_HEADER,
                HeaderValue::from_static(feed_status.as_str()),
            );
        }
        if let Some(retry_after) = self.retry_after {
            // Whole seconds, rounded up so clients never retry early.
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            headers.insert(header::RETRY_AFTER, HeaderValue::from(secs.max(1)));
        }

        (self.status, headers, Json(json!({ "error": error }))).into_response()
    }
}

impl From<FeedError> for AppError {
    fn from(err: FeedError) -> Self {
        let app = match &err {
            FeedError::CircuitOpen => Self::unavailable(err.to_string()),
            FeedError::StrictViolation { .. } => Self::internal(err.to_string()),
            FeedError::Source(_) | FeedError::Serialization(_) => {
                error!(error = %err, "feed build failed");
                Self::internal(err.to_string())
            }
        };
        app.with_feed_status(FeedStatus::Error)
    }
}

impl From<ReconcileError> for AppError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::InFlight { .. } => Self::conflict(err.to_string()),
            ReconcileError::Remote(RemoteError::Cancelled) | ReconcileError::Cancelled => {
                Self::unavailable("Reconciliation cancelled; service is shutting down")
            }
            ReconcileError::Remote(inner) => {
                error!(error = %inner, "reconciliation remote call failed");
                Self::bad_gateway(inner.to_string())
            }
            ReconcileError::WindowMismatch { .. } => {
                error!(error = %err, "apply attempted with the wrong window lock");
                Self::internal(err.to_string())
            }
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_after_rounds_up() {
        let response = AppError::rate_limited(Duration::from_millis(1_200)).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "2");
    }

    #[test]
    fn feed_errors_carry_feed_status() {
        let response = AppError::from(FeedError::CircuitOpen).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[FEED_STATUS_HEADER], "error");
    }
}
