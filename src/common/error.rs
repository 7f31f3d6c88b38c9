// src/common/error.rs

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

/// Machine-checkable category of an [`AppError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Conflict,
    PreconditionFailed,
    Validation,
    LockedOut,
    CredentialInvalid,
    Unauthorized,
    Forbidden,
    Internal,
}

// The business error. The `Display` output is the message shown to the caller.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    PreconditionFailed(String),

    #[error("{0}")]
    Validation(String),

    #[error("One or more fields are invalid.")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("{0}")]
    LockedOut(String),

    #[error("{0}")]
    InvalidCredentials(String),

    #[error("Invalid or missing authentication token.")]
    InvalidToken,

    #[error("{0}")]
    Forbidden(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    InternalServerError(#[from] anyhow::Error),

    #[error("Bcrypt error: {0}")]
    BcryptError(#[from] bcrypt::BcryptError),

    #[error("JWT error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::Conflict(_) => ErrorKind::Conflict,
            AppError::PreconditionFailed(_) => ErrorKind::PreconditionFailed,
            AppError::Validation(_) | AppError::ValidationError(_) => ErrorKind::Validation,
            AppError::LockedOut(_) => ErrorKind::LockedOut,
            AppError::InvalidCredentials(_) => ErrorKind::CredentialInvalid,
            AppError::InvalidToken => ErrorKind::Unauthorized,
            AppError::Forbidden(_) => ErrorKind::Forbidden,
            AppError::DatabaseError(_)
            | AppError::InternalServerError(_)
            | AppError::BcryptError(_)
            | AppError::JwtError(_) => ErrorKind::Internal,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        AppError::Conflict(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }
}

/// The HTTP-facing error body. Handlers return it and `?` converts from [`AppError`].
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: ErrorKind,
    pub error: String,
    pub details: Option<Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, kind: ErrorKind, error: impl Into<String>) -> Self {
        Self { status, kind, error: error.into(), details: None }
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        let kind = err.kind();
        let status = match kind {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::LockedOut => StatusCode::LOCKED,
            ErrorKind::CredentialInvalid | ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        match err {
            // Field-level details for payload validation failures.
            AppError::ValidationError(ref errors) => {
                let mut details = serde_json::Map::new();
                for (field, field_errors) in errors.field_errors() {
                    let messages: Vec<String> = field_errors
                        .iter()
                        .map(|e| {
                            e.message
                                .as_ref()
                                .map(|m| m.to_string())
                                .unwrap_or_else(|| e.code.to_string())
                        })
                        .collect();
                    details.insert(field.to_string(), json!(messages));
                }
                ApiError {
                    status,
                    kind,
                    error: err.to_string(),
                    details: Some(Value::Object(details)),
                }
            }
            ref e if kind == ErrorKind::Internal => {
                tracing::error!("Internal server error: {}", e);
                ApiError::new(status, kind, "An unexpected error occurred.")
            }
            e => ApiError::new(status, kind, e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "error": self.error,
            "kind": self.kind,
        });
        if let Some(details) = self.details {
            body["details"] = details;
        }
        (self.status, Json(body)).into_response()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}
