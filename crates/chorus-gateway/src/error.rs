//! Error type mapping relay failures onto HTTP status codes and the error envelope

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chorus_core::RelayError;
use serde_json::json;
use tracing::error;

#[derive(Debug)]
pub enum ApiError {
    /// Failure reported by the relay
    Relay(RelayError),
    /// Body was not the JSON the route expects
    InvalidRequest(String),
}

impl From<RelayError> for ApiError {
    fn from(e: RelayError) -> Self {
        ApiError::Relay(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::InvalidRequest(e.body_text())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Relay(RelayError::EmptyMessage | RelayError::UnknownProvider(_)) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Relay(RelayError::SessionNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Relay(RelayError::Store(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Relay(e) => e.code(),
            ApiError::InvalidRequest(_) => "INVALID_REQUEST",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Relay(e) => e.to_string(),
            ApiError::InvalidRequest(msg) => msg.clone(),
        };
        if status.is_server_error() {
            error!("Request failed: {}", message);
        }

        let body = json!({
            "error": {
                "code": self.code(),
                "message": message,
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::from(RelayError::EmptyMessage), StatusCode::BAD_REQUEST),
            (
                ApiError::from(RelayError::UnknownProvider("x".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::from(RelayError::SessionNotFound("s".into())),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::from(RelayError::Store(anyhow::anyhow!("disk"))),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ApiError::InvalidRequest("bad".into()),
                StatusCode::BAD_REQUEST,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.status(), status, "{:?}", err);
        }
    }

    #[test]
    fn test_into_response_status() {
        let resp = ApiError::from(RelayError::SessionNotFound("gone".into())).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
