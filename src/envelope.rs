//! Uniform response envelope.
//!
//! Every outcome leaves the process as either
//! `{"success": true, "data": ..., "timestamp": ...}` or
//! `{"success": false, "error": {"code", "message", "details"?}, "timestamp": ...}`.
//! Errors map to stable codes; infrastructure detail is logged, not returned.

use crate::adapter::ValidationError;
use crate::error::DbError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Value as JsonValue, json};

pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
pub const INVALID_BODY: &str = "INVALID_BODY";

/// The `error` member of a failure envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<JsonValue>,
}

impl ErrorBody {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: JsonValue) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status(&self) -> StatusCode {
        match self.code.as_str() {
            VALIDATION_ERROR | INVALID_BODY | "INVALID_INPUT" => StatusCode::BAD_REQUEST,
            "CONNECTION_ERROR" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<&DbError> for ErrorBody {
    fn from(err: &DbError) -> Self {
        if err.is_internal() {
            tracing::error!(code = err.code(), error = %err, "Internal error");
            return ErrorBody::new(err.code(), "An unexpected error occurred");
        }
        match err {
            DbError::Connection { .. } => {
                tracing::error!(error = %err, "Database unavailable");
                ErrorBody::new(err.code(), "The database is currently unavailable")
            }
            DbError::Execution { message, sql_state, .. } => {
                let body = ErrorBody::new(err.code(), message.clone());
                match sql_state {
                    Some(state) => body.with_details(json!({ "sqlState": state })),
                    None => body,
                }
            }
            DbError::InvalidInput { message } => ErrorBody::new(err.code(), message.clone()),
            _ => ErrorBody::new(err.code(), "An unexpected error occurred"),
        }
    }
}

impl From<&ValidationError> for ErrorBody {
    fn from(err: &ValidationError) -> Self {
        ErrorBody::new(VALIDATION_ERROR, err.to_string()).with_details(json!(err.issues))
    }
}

/// A success or failure response.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Envelope<T> {
    Success {
        success: bool,
        data: T,
        timestamp: String,
    },
    Failure {
        success: bool,
        error: ErrorBody,
        timestamp: String,
    },
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl<T> Envelope<T> {
    pub fn success(data: T) -> Self {
        Self::Success {
            success: true,
            data,
            timestamp: timestamp(),
        }
    }

    pub fn failure(error: ErrorBody) -> Self {
        Self::Failure {
            success: false,
            error,
            timestamp: timestamp(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn error(&self) -> Option<&ErrorBody> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { error, .. } => Some(error),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Success { .. } => StatusCode::OK,
            Self::Failure { error, .. } => error.status(),
        }
    }
}

impl<T, E> From<Result<T, E>> for Envelope<T>
where
    E: Into<Envelope<T>>,
{
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(data) => Self::success(data),
            Err(err) => err.into(),
        }
    }
}

impl<T> From<DbError> for Envelope<T> {
    fn from(err: DbError) -> Self {
        Self::failure(ErrorBody::from(&err))
    }
}

impl<T> From<ValidationError> for Envelope<T> {
    fn from(err: ValidationError) -> Self {
        Self::failure(ErrorBody::from(&err))
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}
