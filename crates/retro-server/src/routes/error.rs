use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use retro_core::{CoreError, ErrorCode};

/// Error returned by every handler.
#[derive(Debug)]
pub enum ApiError {
    Core(CoreError),
    Unauthorized,
    RateLimited(Duration),
    BadRequest(String),
}

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        ApiError::Core(e)
    }
}

pub fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::BoardNotFound | ErrorCode::CardNotFound => StatusCode::NOT_FOUND,
        ErrorCode::BoardClosed => StatusCode::CONFLICT,
        ErrorCode::Forbidden | ErrorCode::CardLimitReached | ErrorCode::ReactionLimitReached => {
            StatusCode::FORBIDDEN
        }
        ErrorCode::ChildCannotBeParent
        | ErrorCode::ParentCannotBeChild
        | ErrorCode::InvalidLink => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorCode::ValidationError | ErrorCode::ColumnNotFound => StatusCode::BAD_REQUEST,
        ErrorCode::StorageError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn body(code: &str, message: String) -> Json<serde_json::Value> {
    Json(json!({ "error": { "code": code, "message": message } }))
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Core(e) => {
                let code = e.code();
                let status = status_for(code);
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    error!(error = %e, "Request failed");
                }
                (status, body(code.as_str(), e.to_string())).into_response()
            }
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                body("UNAUTHORIZED", "Missing bearer token".to_string()),
            )
                .into_response(),
            ApiError::RateLimited(wait_time) => (
                StatusCode::TOO_MANY_REQUESTS,
                body(
                    "RATE_LIMITED",
                    format!("Rate limited. Try again in {:?}", wait_time),
                ),
            )
                .into_response(),
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                body(ErrorCode::ValidationError.as_str(), message),
            )
                .into_response(),
        }
    }
}
