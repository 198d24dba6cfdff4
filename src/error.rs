use axum::{
    response::{IntoResponse, Response},
    Json,
    http::StatusCode,
};
use serde::Serialize;

use crate::runner::RunError;

#[derive(Serialize)]
pub struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    logs: Option<Vec<String>>,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    Unsupported(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("{message}")]
    Spawn { message: String, logs: Vec<String> },

    #[error("Script kết thúc với mã {}.", display_code(.code))]
    ExitStatus { code: Option<i32>, logs: Vec<String> },

    #[error("Script vượt quá thời gian cho phép ({secs} giây).")]
    Timeout { secs: u64, logs: Vec<String> },

    #[error("{0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "null".to_string(),
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unsupported(_) => StatusCode::NOT_IMPLEMENTED,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Spawn { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ExitStatus { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = self.to_string();
        let logs = match self {
            AppError::Spawn { logs, .. }
            | AppError::ExitStatus { logs, .. }
            | AppError::Timeout { logs, .. } => Some(logs),
            AppError::Internal(_) => Some(Vec::new()),
            AppError::InvalidRequest(_)
            | AppError::Unsupported(_)
            | AppError::PayloadTooLarge(_)
            | AppError::ConfigError(_) => None,
        };

        let body = Json(ErrorResponse { error, logs });

        (status, body).into_response()
    }
}

impl From<RunError> for AppError {
    fn from(err: RunError) -> Self {
        let message = err.to_string();
        match err {
            RunError::Spawn { .. } => AppError::Spawn { message, logs: Vec::new() },
            RunError::Timeout { after, outcome } => AppError::Timeout {
                secs: after.as_secs(),
                logs: outcome.logs(),
            },
            RunError::Wait { outcome, .. } => AppError::Spawn { message, logs: outcome.logs() },
            RunError::Lost => AppError::Internal(message),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
