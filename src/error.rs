use crate::backend::StoreError;
use crate::calendar::InvalidDate;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("Please authenticate")]
    Unauthorized,

    #[error("Access denied")]
    Forbidden,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Internal(cause) => {
                error!(%cause, "Request failed");
                "Server error".to_string()
            }
            _ => self.to_string(),
        };

        (status, Json(json!({ "message": message }))).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(message) => AppError::NotFound(message),
            StoreError::Conflict(message) => AppError::Conflict(message),
            StoreError::Database(cause) => AppError::Internal(cause),
        }
    }
}

impl From<InvalidDate> for AppError {
    fn from(err: InvalidDate) -> Self {
        AppError::Validation(err.to_string())
    }
}
