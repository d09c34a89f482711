//! Observability for offstore
//!
//! - Structured logging (JSON lines)
//! - Typed lifecycle events
//! - Scope-based timing of store operations
//!
//! Logging is synchronous and never fails the caller. Output below the
//! configured minimum severity (WARN unless `StoreConfig::log_level` says
//! otherwise) is dropped.
//!
//! # Usage
//!
//! ```ignore
//! use offstore::observability::{log_event_with_fields, Event, ObservationScope};
//!
//! log_event_with_fields(Event::DbOpen, &[("database", "1389_db")]);
//!
//! let scope = ObservationScope::with_fields("FIND", &[("store", "plan")]);
//! // ... scan ...
//! scope.complete_with_fields(&[("returned", "2")]);
//! ```

mod events;
mod logger;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use scope::ObservationScope;

#[cfg(test)]
pub(crate) use logger::capture_log;

fn severity_of(event: Event) -> Severity {
    if event.is_failure() {
        Severity::Warn
    } else {
        Severity::Info
    }
}

/// Log a lifecycle event
pub fn log_event(event: Event) {
    Logger::log(severity_of(event), event.as_str(), &[]);
}

/// Log a lifecycle event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(severity_of(event), event.as_str(), fields);
}
