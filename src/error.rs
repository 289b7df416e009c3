use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::db::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("No active committee members found")]
    NoActiveRecipients,

    #[error("Could not allocate a unique paper id after {attempts} attempts, please retry")]
    PaperIdContention { attempts: usize },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::NoActiveRecipients => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::PaperIdContention { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Store(err) => match err {
                StoreError::NotFound => StatusCode::NOT_FOUND,
                StoreError::DuplicateEmail | StoreError::DuplicatePaperId => StatusCode::CONFLICT,
                StoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                StoreError::Corrupt(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let message = match &self {
            AppError::Store(StoreError::Unavailable(_)) => {
                "Service temporarily unavailable, please retry".to_string()
            }
            AppError::Store(StoreError::Corrupt(_)) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        (
            status,
            Json(serde_json::json!({ "success": false, "message": message })),
        )
            .into_response()
    }
}
