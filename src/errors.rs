//! Error types for offstore
//!
//! Error codes:
//! - OFFSTORE_CONNECTION_FAILED (ERROR)
//! - OFFSTORE_SCHEMA_VIOLATION (REJECT)
//! - OFFSTORE_INVALID_SELECTOR (REJECT)
//! - OFFSTORE_TRANSACTION_ABORTED (ERROR)
//! - OFFSTORE_STORE_NOT_FOUND (REJECT)
//! - OFFSTORE_RECORD_NOT_FOUND (REJECT)
//! - OFFSTORE_COMPLETION (ERROR)
//! - OFFSTORE_CONFIG_INVALID (FATAL)

use std::fmt;

use thiserror::Error;

/// Severity levels for store errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Caller request rejected before any work started
    Reject,
    /// Operation failed but the store is healthy
    Error,
    /// Store cannot be used with this configuration
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Reject => write!(f, "REJECT"),
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Why a transaction aborted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// Key already present on `add`
    Constraint,
    /// Record carries no usable primary key
    Data,
    /// Mutation attempted in a read-only transaction
    ReadOnly,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::Constraint => write!(f, "constraint"),
            AbortReason::Data => write!(f, "data"),
            AbortReason::ReadOnly => write!(f, "read-only"),
        }
    }
}

/// Failures of the single-fire completion primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CompletionError {
    /// A second success or failure signal reached a settled completion
    #[error("completion already settled")]
    AlreadySettled,
    /// Every resolver was dropped without a signal
    #[error("completion abandoned before settling")]
    Abandoned,
}

/// Store error
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Opening or upgrading a database failed
    #[error("connection to '{database}' failed: {reason}")]
    Connection { database: String, reason: String },

    /// First selector field does not name an index of the store
    #[error("the first filter key must be indexed: '{field}' is not an index of '{store}'")]
    SchemaViolation { store: String, field: String },

    /// Selector is malformed
    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    /// The engine aborted a transaction
    #[error("transaction on '{store}' aborted ({reason}): {message}")]
    Transaction {
        store: String,
        reason: AbortReason,
        message: String,
    },

    /// Store is not declared in the database
    #[error("store not found: '{0}'")]
    StoreNotFound(String),

    /// Update target is missing
    #[error("record not found in '{store}': {key}")]
    RecordNotFound { store: String, key: String },

    /// Completion primitive misuse
    #[error("completion error: {0}")]
    Completion(#[from] CompletionError),

    /// Schema or config file unreadable or malformed
    #[error("invalid config at {path}: {reason}")]
    Config { path: String, reason: String },
}

impl StoreError {
    /// Create a connection error
    pub fn connection(database: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Connection {
            database: database.into(),
            reason: reason.into(),
        }
    }

    /// Create a schema violation error
    pub fn schema_violation(store: impl Into<String>, field: impl Into<String>) -> Self {
        Self::SchemaViolation {
            store: store.into(),
            field: field.into(),
        }
    }

    /// Create an invalid selector error
    pub fn invalid_selector(reason: impl Into<String>) -> Self {
        Self::InvalidSelector(reason.into())
    }

    /// Create a transaction abort error
    pub fn aborted(store: impl Into<String>, reason: AbortReason, message: impl Into<String>) -> Self {
        Self::Transaction {
            store: store.into(),
            reason,
            message: message.into(),
        }
    }

    /// Create a store-not-found error
    pub fn store_not_found(store: impl Into<String>) -> Self {
        Self::StoreNotFound(store.into())
    }

    /// Create a record-not-found error
    pub fn record_not_found(store: impl Into<String>, key: impl fmt::Display) -> Self {
        Self::RecordNotFound {
            store: store.into(),
            key: key.to_string(),
        }
    }

    /// Create a config error
    pub fn config(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Returns the stable error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "OFFSTORE_CONNECTION_FAILED",
            Self::SchemaViolation { .. } => "OFFSTORE_SCHEMA_VIOLATION",
            Self::InvalidSelector(_) => "OFFSTORE_INVALID_SELECTOR",
            Self::Transaction { .. } => "OFFSTORE_TRANSACTION_ABORTED",
            Self::StoreNotFound(_) => "OFFSTORE_STORE_NOT_FOUND",
            Self::RecordNotFound { .. } => "OFFSTORE_RECORD_NOT_FOUND",
            Self::Completion(_) => "OFFSTORE_COMPLETION",
            Self::Config { .. } => "OFFSTORE_CONFIG_INVALID",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            Self::SchemaViolation { .. }
            | Self::InvalidSelector(_)
            | Self::StoreNotFound(_)
            | Self::RecordNotFound { .. } => Severity::Reject,
            Self::Config { .. } => Severity::Fatal,
            _ => Severity::Error,
        }
    }

    /// Returns whether this is a fatal error
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            StoreError::schema_violation("plan", "owner").code(),
            "OFFSTORE_SCHEMA_VIOLATION"
        );
        assert_eq!(
            StoreError::store_not_found("nope").code(),
            "OFFSTORE_STORE_NOT_FOUND"
        );
        assert_eq!(
            StoreError::from(CompletionError::AlreadySettled).code(),
            "OFFSTORE_COMPLETION"
        );
    }

    #[test]
    fn test_severity() {
        assert_eq!(
            StoreError::invalid_selector("empty").severity(),
            Severity::Reject
        );
        assert_eq!(
            StoreError::aborted("plan", AbortReason::Constraint, "dup").severity(),
            Severity::Error
        );
        assert!(StoreError::config("x.json", "bad").is_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = StoreError::aborted("plan", AbortReason::Constraint, "key 1 exists");
        let display = err.to_string();
        assert!(display.contains("plan"));
        assert!(display.contains("constraint"));
        assert!(display.contains("key 1 exists"));
    }
}
