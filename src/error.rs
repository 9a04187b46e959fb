use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

/// Non-standard status clients use to detect a dead bearer or refresh token.
pub const INVALID_TOKEN_STATUS: u16 = 498;

pub const GENERIC_MESSAGE: &str = "Something went very wrong!";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    InvalidToken(String),
    /// Server-side failure whose message is safe to show.
    #[error("{0}")]
    Internal(String),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
    pub fn invalid_token(msg: impl Into<String>) -> Self {
        Self::InvalidToken(msg.into())
    }
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::InvalidToken(_) => {
                StatusCode::from_u16(INVALID_TOKEN_STATUS).unwrap_or(StatusCode::UNAUTHORIZED)
            }
            Self::Internal(_) | Self::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Operational errors carry a message that is safe to return to clients.
    pub fn is_operational(&self) -> bool {
        !matches!(self, Self::Unexpected(_))
    }
}

/// "fail" for client-caused errors, "error" for everything else.
pub fn status_label(status: StatusCode) -> &'static str {
    if status.is_client_error() {
        "fail"
    } else {
        "error"
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub status: &'static str,
    pub message: String,
}

/// Attached to every error response so the render layer can expand it in development.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub message: String,
    pub detail: String,
    pub chain: Vec<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if self.is_operational() {
            self.to_string()
        } else {
            GENERIC_MESSAGE.to_string()
        };

        let report = match &self {
            Self::Unexpected(e) => {
                error!(error = ?e, "unexpected error");
                ErrorReport {
                    message: e.to_string(),
                    detail: format!("{e:?}"),
                    chain: e.chain().map(|c| c.to_string()).collect(),
                }
            }
            other => {
                if status.is_server_error() {
                    error!(%status, message = %other, "request failed");
                } else {
                    warn!(%status, message = %other, "request rejected");
                }
                ErrorReport {
                    message: other.to_string(),
                    detail: format!("{other:?}"),
                    chain: vec![other.to_string()],
                }
            }
        };

        let body = ErrorBody {
            status: status_label(status),
            message,
        };
        let mut res = (status, Json(body)).into_response();
        res.extensions_mut().insert(report);
        res
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}
