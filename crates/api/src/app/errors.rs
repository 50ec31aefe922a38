use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use ledgergate_ai::AiError;
use ledgergate_core::ErrorCategory;
use ledgergate_infra::EngineError;

/// Error returned by handlers; rendered as `{error, message}`.
#[derive(Debug)]
pub enum ApiError {
    Engine(EngineError),
    BadRequest(String),
    Internal(String),
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError::Engine(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ApiError::Engine(err) => engine_error_to_response(err),
            ApiError::BadRequest(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
            ApiError::Internal(msg) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
        }
    }
}

pub fn engine_error_to_response(err: EngineError) -> axum::response::Response {
    let message = err.to_string();
    if let EngineError::Classifier(AiError::InferenceFailed(_)) = &err {
        return json_error(StatusCode::BAD_GATEWAY, "classifier_error", message);
    }

    let (status, code) = status_for(err.category());
    if status.is_server_error() {
        tracing::warn!(error = %message, "request failed");
    }
    json_error(status, code, message)
}

pub fn status_for(category: ErrorCategory) -> (StatusCode, &'static str) {
    match category {
        ErrorCategory::Validation => (StatusCode::BAD_REQUEST, "validation_error"),
        ErrorCategory::NotFound => (StatusCode::NOT_FOUND, "not_found"),
        ErrorCategory::Conflict => (StatusCode::CONFLICT, "conflict"),
        ErrorCategory::ExpiredResource => (StatusCode::GONE, "expired"),
        ErrorCategory::InsufficientStock => (StatusCode::UNPROCESSABLE_ENTITY, "insufficient_stock"),
        ErrorCategory::PolicyRejection => (StatusCode::UNPROCESSABLE_ENTITY, "policy_rejection"),
        ErrorCategory::Unavailable => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
        ErrorCategory::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
