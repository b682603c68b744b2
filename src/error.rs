//! Error types for the database abstraction layer.
//!
//! Every driver failure is normalized into [`DbalError`]. The driver's message
//! and SQLSTATE code are preserved so callers can still inspect the cause.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbalError {
    #[error("Driver is not supported: {driver}")]
    UnsupportedDriver { driver: String },

    #[error("Connection error: {message}")]
    Connection {
        message: String,
        code: Option<String>,
        suggestion: String,
    },

    #[error("Transaction error: {message}")]
    Transaction {
        message: String,
        code: Option<String>,
    },

    #[error("Database error: {message} (SQL: {sql})")]
    Query {
        message: String,
        /// e.g., "42P01" for undefined table
        code: Option<String>,
        sql: String,
    },

    #[error("Driver does not support quoting: {reason}")]
    QuotingUnsupported { driver: String, reason: String },

    #[error("Connection \"{name}\" does not exist")]
    ConnectionNotFound { name: String },

    #[error("Cannot change {setting} of {entity} after first use")]
    ConfigurationLocked { entity: String, setting: String },

    #[error("Cannot hydrate column '{column}': {message}")]
    Hydration { column: String, message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbalError {
    /// Create an unsupported driver error.
    pub fn unsupported_driver(driver: impl Into<String>) -> Self {
        Self::UnsupportedDriver {
            driver: driver.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(
        message: impl Into<String>,
        code: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            code,
            suggestion: suggestion.into(),
        }
    }

    /// Create a transaction error.
    pub fn transaction(message: impl Into<String>, code: Option<String>) -> Self {
        Self::Transaction {
            message: message.into(),
            code,
        }
    }

    /// Create a query error carrying the SQL that was attempted.
    pub fn query(message: impl Into<String>, code: Option<String>, sql: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
            code,
            sql: sql.into(),
        }
    }

    /// Wrap a driver error raised while running `sql`.
    pub fn from_driver(err: &sqlx::Error, sql: impl Into<String>) -> Self {
        let (message, code) = driver_cause(err);
        Self::query(message, code, sql)
    }

    /// Wrap a driver error raised by transaction control.
    pub fn from_transaction(err: &sqlx::Error) -> Self {
        let (message, code) = driver_cause(err);
        Self::transaction(message, code)
    }

    /// Create a quoting error.
    pub fn quoting_unsupported(driver: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::QuotingUnsupported {
            driver: driver.into(),
            reason: reason.into(),
        }
    }

    /// Create a connection not found error.
    pub fn connection_not_found(name: impl Into<String>) -> Self {
        Self::ConnectionNotFound { name: name.into() }
    }

    /// Create a configuration locked error.
    pub fn configuration_locked(entity: impl Into<String>, setting: impl Into<String>) -> Self {
        Self::ConfigurationLocked {
            entity: entity.into(),
            setting: setting.into(),
        }
    }

    /// Create a hydration error.
    pub fn hydration(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Hydration {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// SQL text attached to a query error.
    pub fn sql(&self) -> Option<&str> {
        match self {
            Self::Query { sql, .. } => Some(sql),
            _ => None,
        }
    }

    /// SQLSTATE (or driver-specific code) reported by the driver, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Connection { code, .. } | Self::Transaction { code, .. } | Self::Query { code, .. } => {
                code.as_deref()
            }
            _ => None,
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}

/// Extract the driver-reported message and code from a sqlx error.
pub(crate) fn driver_cause(err: &sqlx::Error) -> (String, Option<String>) {
    match err {
        sqlx::Error::Database(db_err) => (
            db_err.message().to_string(),
            db_err.code().map(|c| c.to_string()),
        ),
        sqlx::Error::RowNotFound => ("No rows returned".to_string(), None),
        sqlx::Error::ColumnNotFound(col) => (format!("Column not found: {}", col), None),
        sqlx::Error::ColumnIndexOutOfBounds { index, len } => (
            format!("Column index {} out of bounds (len: {})", index, len),
            None,
        ),
        sqlx::Error::Io(io_err) => (format!("I/O error: {}", io_err), None),
        sqlx::Error::Tls(tls_err) => (format!("TLS error: {}", tls_err), None),
        sqlx::Error::Protocol(msg) => (format!("Protocol error: {}", msg), None),
        other => (other.to_string(), None),
    }
}

/// Result type alias for DBAL operations.
pub type DbalResult<T> = Result<T, DbalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbalError::connection("Failed to connect", None, "Check credentials");
        assert!(err.to_string().contains("Connection error"));
    }

    #[test]
    fn test_query_error_carries_sql() {
        let err = DbalError::query("syntax error", Some("42601".to_string()), "SELEC 1");
        assert_eq!(err.sql(), Some("SELEC 1"));
        assert_eq!(err.code(), Some("42601"));
        assert!(err.to_string().contains("SELEC 1"));
    }

    #[test]
    fn test_error_suggestion() {
        let err = DbalError::connection("refused", None, "Check that the server is running");
        assert_eq!(err.suggestion(), Some("Check that the server is running"));
        assert_eq!(DbalError::invalid_input("bad").suggestion(), None);
    }

    #[test]
    fn test_error_retryable() {
        assert!(DbalError::connection("err", None, "sugg").is_retryable());
        assert!(!DbalError::transaction("no active transaction", None).is_retryable());
    }

    #[test]
    fn test_driver_cause_for_non_database_errors() {
        let (message, code) = driver_cause(&sqlx::Error::RowNotFound);
        assert_eq!(message, "No rows returned");
        assert!(code.is_none());

        let err = DbalError::from_driver(&sqlx::Error::ColumnNotFound("email".into()), "SELECT email FROM t");
        assert!(matches!(err, DbalError::Query { .. }));
        assert!(err.to_string().contains("email"));
    }

    #[test]
    fn test_unsupported_driver_display() {
        let err = DbalError::unsupported_driver("oracle");
        assert_eq!(err.to_string(), "Driver is not supported: oracle");
    }
}
