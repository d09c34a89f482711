//! Observable events for offstore
//!
//! Events are explicit and typed.

use std::fmt;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Configuration
    /// Configuration loaded
    ConfigLoaded,
    /// Schema catalog loaded
    SchemasLoaded,

    // Connection
    /// Database opened
    DbOpen,
    /// Database upgraded to a new version
    DbUpgrade,
    /// Store created during an upgrade
    StoreCreated,
    /// Database open failed
    DbOpenFailed,

    // Operations
    /// Selector or key lookup
    Find,
    /// Records added
    Insert,
    /// Records merged or replaced
    Update,
    /// Records deleted
    Remove,
    /// Query rejected before execution
    QueryRejected,

    // Transactions
    /// Transaction aborted
    TransactionAbort,

    // Display
    /// Result rows emitted for inspection
    ResultDisplay,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::SchemasLoaded => "SCHEMAS_LOADED",
            Event::DbOpen => "DB_OPEN",
            Event::DbUpgrade => "DB_UPGRADE",
            Event::StoreCreated => "STORE_CREATED",
            Event::DbOpenFailed => "DB_OPEN_FAILED",
            Event::Find => "FIND",
            Event::Insert => "INSERT",
            Event::Update => "UPDATE",
            Event::Remove => "REMOVE",
            Event::QueryRejected => "QUERY_REJECTED",
            Event::TransactionAbort => "TRANSACTION_ABORT",
            Event::ResultDisplay => "RESULT_DISPLAY",
        }
    }

    /// Failure events log at WARN, everything else at INFO
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Event::DbOpenFailed | Event::QueryRejected | Event::TransactionAbort
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
