//! Maps `CoreError` (§7) onto HTTP status codes for the management API
//! (C14). Kept out of `common::errors` so the domain/store layer never
//! depends on axum.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

use crate::common::CoreError;

pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        Self(e)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        Self(CoreError::Internal(e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoreError::Validation(_) => StatusCode::BAD_REQUEST,
            CoreError::Authorization => StatusCode::FORBIDDEN,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::QuotaExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            CoreError::Dispatch(_) => StatusCode::BAD_GATEWAY,
            CoreError::Store(_) | CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
