//! Error types for the routine gateway.
//!
//! This module defines the propagating error taxonomy using `thiserror`.
//! Validation failures are deliberately not part of it: the request adapter
//! returns them as values (see [`crate::adapter::ValidationError`]).
//! Everything here travels unmodified to an outer boundary, which renders it
//! as a failure envelope with a stable code.

use crate::db::transaction::TransactionState;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Execution failed: {message}")]
    Execution {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Transaction {transaction_id} is {state}, cannot {operation}")]
    TransactionState {
        transaction_id: String,
        state: TransactionState,
        operation: &'static str,
    },

    #[error("Cannot close the connection pool while {open} transaction(s) are open")]
    OpenTransactions { open: usize },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create an execution error with optional SQL state.
    pub fn execution(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Execution {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    pub fn transaction_state(
        transaction_id: impl Into<String>,
        state: TransactionState,
        operation: &'static str,
    ) -> Self {
        Self::TransactionState {
            transaction_id: transaction_id.into(),
            state,
            operation,
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Execution { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// Stable machine-readable code used in failure envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "CONNECTION_ERROR",
            Self::Execution { .. } => "EXECUTION_ERROR",
            Self::TransactionState { .. } | Self::OpenTransactions { .. } => {
                "TRANSACTION_STATE_ERROR"
            }
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::Configuration { .. } => "CONFIGURATION_ERROR",
            Self::Internal { .. } => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Programming and infrastructure errors whose text must not reach callers.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::TransactionState { .. }
                | Self::OpenTransactions { .. }
                | Self::Configuration { .. }
                | Self::Internal { .. }
        )
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection descriptor format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::execution(
                    db_err.message(),
                    code,
                    "Check the routine name, its parameters and referenced objects",
                )
            }
            sqlx::Error::RowNotFound => DbError::execution(
                "No rows returned",
                None,
                "Verify the routine arguments match existing data",
            ),
            sqlx::Error::PoolTimedOut => DbError::connection(
                "Timed out acquiring a pooled connection",
                "Increase acquire_timeout or max_connections",
            ),
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Reconnect to the database")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::internal(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbError::connection("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));
    }

    #[test]
    fn test_error_suggestion() {
        let err = DbError::execution(
            "Syntax error",
            Some("42601".to_string()),
            "Check SQL syntax",
        );
        assert_eq!(err.suggestion(), Some("Check SQL syntax"));
        assert_eq!(DbError::invalid_input("x").suggestion(), None);
    }

    #[test]
    fn test_transaction_state_display() {
        let err = DbError::transaction_state("tx_1", TransactionState::Committed, "commit");
        assert_eq!(err.to_string(), "Transaction tx_1 is committed, cannot commit");
    }

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(DbError::connection("a", "b").code(), "CONNECTION_ERROR");
        assert_eq!(DbError::execution("a", None, "b").code(), "EXECUTION_ERROR");
        assert_eq!(
            DbError::transaction_state("tx", TransactionState::RolledBack, "rollback").code(),
            "TRANSACTION_STATE_ERROR"
        );
        assert_eq!(
            DbError::OpenTransactions { open: 2 }.code(),
            "TRANSACTION_STATE_ERROR"
        );
        assert_eq!(DbError::invalid_input("x").code(), "INVALID_INPUT");
        assert_eq!(DbError::internal("x").code(), "INTERNAL_SERVER_ERROR");
    }

    #[test]
    fn test_internal_classification() {
        assert!(DbError::internal("x").is_internal());
        assert!(DbError::OpenTransactions { open: 1 }.is_internal());
        assert!(!DbError::connection("a", "b").is_internal());
        assert!(!DbError::invalid_input("x").is_internal());
    }

    #[test]
    fn test_pool_closed_maps_to_connection() {
        let err: DbError = sqlx::Error::PoolClosed.into();
        assert!(matches!(err, DbError::Connection { .. }));
    }

    #[test]
    fn test_row_not_found_maps_to_execution() {
        let err: DbError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.code(), "EXECUTION_ERROR");
    }
}
