use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use pkg_controllers::AdmissionError;
use pkg_quota::QuotaError;
use pkg_state::StoreError;
use serde_json::json;
use tracing::error;

/// Handler failure, rendered as `{"error": ..., "field": ...}`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Quota(QuotaError),
    Store(StoreError),
    Internal(anyhow::Error),
}

impl From<QuotaError> for ApiError {
    fn from(e: QuotaError) -> Self {
        ApiError::Quota(e)
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Store(e)
    }
}

impl From<AdmissionError> for ApiError {
    fn from(e: AdmissionError) -> Self {
        match e {
            AdmissionError::Quota(e) => ApiError::Quota(e),
            AdmissionError::Store(e) => ApiError::Store(e),
            AdmissionError::Invalid(msg) => ApiError::BadRequest(msg),
        }
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Quota(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
            ApiError::Store(StoreError::AlreadyExists { .. })
            | ApiError::Store(StoreError::Conflict { .. }) => StatusCode::CONFLICT,
            ApiError::Store(StoreError::Invalid { .. }) => StatusCode::BAD_REQUEST,
            ApiError::Store(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn field(&self) -> Option<&str> {
        match self {
            ApiError::Quota(QuotaError::MissingRequiredField { field, .. })
            | ApiError::Quota(QuotaError::MaxLimitExceeded { field, .. }) => Some(field),
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::BadRequest(msg) => msg.clone(),
            ApiError::Quota(e) => e.to_string(),
            ApiError::Store(e) => e.to_string(),
            ApiError::Internal(e) => e.to_string(),
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("request failed: {}", message);
        }
        let body = match self.field() {
            Some(field) => json!({ "error": message, "field": field }),
            None => json!({ "error": message }),
        };
        (status, Json(body)).into_response()
    }
}
