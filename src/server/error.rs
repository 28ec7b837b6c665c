use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::auth::AuthError;
use crate::core::caption::CaptionError;
use crate::core::data_url::DataUrlError;
use crate::core::validation::ValidationError;

/// Error half of every handler. Rendered as `{"error": message}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("{0}")]
    BadGateway(String),

    #[error("{0}")]
    ServiceUnavailable(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::UnsupportedType { .. } => ApiError::BadRequest(err.to_string()),
            ValidationError::TooLarge { .. } => ApiError::PayloadTooLarge(err.to_string()),
        }
    }
}

impl From<DataUrlError> for ApiError {
    fn from(err: DataUrlError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<CaptionError> for ApiError {
    fn from(err: CaptionError) -> Self {
        ApiError::BadGateway(err.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials(_) | AuthError::InvalidToken => {
                ApiError::Unauthorized(err.to_string())
            }
            AuthError::NotConfigured => ApiError::ServiceUnavailable(err.to_string()),
            AuthError::Provider(_) => ApiError::BadGateway(err.to_string()),
        }
    }
}
