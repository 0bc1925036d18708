//! Error types for transactional operations.
//!
//! This module defines all error types using `thiserror`. Variants follow the
//! lifecycle of a transaction (begin, work, commit, rollback, save points) so
//! callers can tell which step failed.

use thiserror::Error;

/// SQLSTATE class for "feature not supported" (PostgreSQL and the SQL standard).
pub const SQLSTATE_FEATURE_NOT_SUPPORTED: &str = "0A000";

/// MySQL `ER_NOT_SUPPORTED_YET`.
pub const MYSQL_ER_NOT_SUPPORTED_YET: &str = "1235";

#[derive(Error, Debug)]
pub enum TransactionalError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "40001" for serialization failure
        sql_state: Option<String>,
    },

    #[error("Failed to begin transaction on '{connection}': {message}")]
    Begin { message: String, connection: String },

    #[error("Commit failed: {message} (transaction: {transaction_id})")]
    Commit {
        message: String,
        transaction_id: String,
    },

    #[error("Rollback failed: {message} (transaction: {transaction_id}); original: {original}")]
    Rollback {
        message: String,
        transaction_id: String,
        original: String,
    },

    #[error("Savepoint '{savepoint}' failed: {message}")]
    Savepoint {
        message: String,
        savepoint: String,
        sql_state: Option<String>,
    },

    #[error("No active transaction on '{connection}'")]
    TransactionNotActive { connection: String },

    #[error("A transaction is already active on '{connection}'")]
    TransactionAlreadyActive { connection: String },

    #[error("Transaction is no longer active (transaction: {transaction_id})")]
    TransactionFinished { transaction_id: String },

    #[error("Write rejected in read-only transaction: {operation}")]
    ReadOnly { operation: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Transaction aborted: {reason}")]
    Aborted { reason: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl TransactionalError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
        }
    }

    pub fn begin(message: impl Into<String>, connection: impl Into<String>) -> Self {
        Self::Begin {
            message: message.into(),
            connection: connection.into(),
        }
    }

    pub fn commit(message: impl Into<String>, transaction_id: impl Into<String>) -> Self {
        Self::Commit {
            message: message.into(),
            transaction_id: transaction_id.into(),
        }
    }

    /// Create a rollback error chained with the error that triggered the rollback.
    pub fn rollback(
        message: impl Into<String>,
        transaction_id: impl Into<String>,
        original: impl Into<String>,
    ) -> Self {
        Self::Rollback {
            message: message.into(),
            transaction_id: transaction_id.into(),
            original: original.into(),
        }
    }

    pub fn savepoint(
        message: impl Into<String>,
        savepoint: impl Into<String>,
        sql_state: Option<String>,
    ) -> Self {
        Self::Savepoint {
            message: message.into(),
            savepoint: savepoint.into(),
            sql_state,
        }
    }

    pub fn not_active(connection: impl Into<String>) -> Self {
        Self::TransactionNotActive {
            connection: connection.into(),
        }
    }

    pub fn already_active(connection: impl Into<String>) -> Self {
        Self::TransactionAlreadyActive {
            connection: connection.into(),
        }
    }

    /// The handle outlived its transaction.
    pub fn finished(transaction_id: impl Into<String>) -> Self {
        Self::TransactionFinished {
            transaction_id: transaction_id.into(),
        }
    }

    pub fn read_only(operation: impl Into<String>) -> Self {
        Self::ReadOnly {
            operation: operation.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Abort the surrounding transaction from inside work code.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted {
            reason: reason.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// SQL state reported by the database, if any.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Database { sql_state, .. } | Self::Savepoint { sql_state, .. } => {
                sql_state.as_deref()
            }
            _ => None,
        }
    }
}

/// Whether a database error code means "this statement is not supported".
pub fn is_unsupported_code(code: &str) -> bool {
    code == SQLSTATE_FEATURE_NOT_SUPPORTED || code == MYSQL_ER_NOT_SUPPORTED_YET
}

/// Convert sqlx errors to TransactionalError.
impl From<sqlx::Error> for TransactionalError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => TransactionalError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                TransactionalError::database(db_err.message(), code)
            }
            sqlx::Error::RowNotFound => TransactionalError::database("No rows returned", None),
            sqlx::Error::PoolTimedOut => TransactionalError::connection(
                "Timed out acquiring a connection from the pool",
                "Increase max_connections or shorten transactions",
            ),
            sqlx::Error::PoolClosed => TransactionalError::connection(
                "Connection pool is closed",
                "Reconnect to the database",
            ),
            sqlx::Error::Io(io_err) => TransactionalError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => TransactionalError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => TransactionalError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnDecode { index, source } => TransactionalError::internal(format!(
                "Failed to decode column {}: {}",
                index, source
            )),
            sqlx::Error::Decode(source) => {
                TransactionalError::internal(format!("Decode error: {}", source))
            }
            sqlx::Error::WorkerCrashed => TransactionalError::internal("Database worker crashed"),
            _ => TransactionalError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for transactional operations.
pub type TransactionalResult<T> = Result<T, TransactionalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TransactionalError::connection("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));
    }

    #[test]
    fn test_rollback_error_chains_original() {
        let err = TransactionalError::rollback("connection reset", "tx_1", "Rollback");
        let msg = err.to_string();
        assert!(msg.contains("connection reset"));
        assert!(msg.contains("original: Rollback"));
    }

    #[test]
    fn test_error_suggestion() {
        let err = TransactionalError::connection("refused", "Check the host");
        assert_eq!(err.suggestion(), Some("Check the host"));
        assert_eq!(TransactionalError::aborted("x").suggestion(), None);
    }

    #[test]
    fn test_sql_state() {
        let err = TransactionalError::savepoint("nope", "sp_1", Some("0A000".to_string()));
        assert_eq!(err.sql_state(), Some("0A000"));
        assert_eq!(TransactionalError::not_active("default").sql_state(), None);
    }

    #[test]
    fn test_unsupported_codes() {
        assert!(is_unsupported_code("0A000"));
        assert!(is_unsupported_code("1235"));
        assert!(!is_unsupported_code("40001"));
    }

    #[test]
    fn test_row_not_found_maps_to_database() {
        let err: TransactionalError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, TransactionalError::Database { .. }));
    }

    #[test]
    fn test_pool_closed_maps_to_connection() {
        let err: TransactionalError = sqlx::Error::PoolClosed.into();
        assert!(matches!(err, TransactionalError::Connection { .. }));
        assert!(err.suggestion().is_some());
    }
}
