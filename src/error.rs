use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Coarse classification of a failure, so callers can tell retryable
/// upstream problems apart from bad input or local disk trouble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Backend,
    Io,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{0}")]
    Invalid(String),

    #[error("{0}")]
    Backend(String),

    #[error("yt-dlp did not finish within {0} seconds")]
    TimedOut(u64),

    #[error("yt-dlp is not installed or could not be found on PATH")]
    ToolMissing,

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Invalid(_) => ErrorKind::Validation,
            Self::Backend(_) | Self::TimedOut(_) | Self::ToolMissing => ErrorKind::Backend,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Backend failures may succeed with a different strategy; bad input and
    /// local I/O problems will not.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Backend
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub code: Option<&'static str>,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            code: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
            code: None,
        }
    }

    pub fn file_transfer(error: impl std::fmt::Display) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("File transfer error: {error}"),
            code: Some("FILE_TRANSFER_FAILED"),
        }
    }
}

impl From<FetchError> for ApiError {
    fn from(error: FetchError) -> Self {
        let (status, code) = match error.kind() {
            ErrorKind::Validation => (StatusCode::BAD_REQUEST, None),
            ErrorKind::Backend => (StatusCode::INTERNAL_SERVER_ERROR, Some("DOWNLOAD_FAILED")),
            ErrorKind::Io => (StatusCode::INTERNAL_SERVER_ERROR, Some("STORAGE_FAILED")),
        };

        Self {
            status,
            message: error.to_string(),
            code,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            success: false,
            error: self.message,
            code: self.code,
        });

        (self.status, body).into_response()
    }
}
