//! Per-call context
//!
//! A Context binds an open connection to one target store together with the
//! call's result options. It is never mutated: per-call parameters derive a
//! new Context with `with_params`.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::Connection;

/// Per-call parameters as they arrive from the caller.
///
/// Unrecognized keys are kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallParams {
    /// User whose database is addressed
    pub userid: Option<String>,
    /// Target store
    pub level: Option<String>,
    /// Result limit; 0 means unbounded
    pub count: Option<usize>,
    /// Projection
    pub fields: Option<Vec<String>>,
    /// Log the result rows
    pub display: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CallParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_display(mut self, display: bool) -> Self {
        self.display = Some(display);
        self
    }

    pub fn with_userid(mut self, userid: impl Into<String>) -> Self {
        self.userid = Some(userid.into());
        self
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = Some(level.into());
        self
    }
}

/// Immutable per-call configuration
#[derive(Debug, Clone)]
pub struct Context {
    /// Correlates the log lines of one call
    pub call_id: Uuid,
    connection: Connection,
    store: String,
    count: Option<usize>,
    fields: Option<Vec<String>>,
    display: bool,
    extra: Map<String, Value>,
    created_at: DateTime<Utc>,
    started: Instant,
}

impl Context {
    /// Create a context targeting `store` on `connection`
    pub fn new(connection: Connection, store: impl Into<String>) -> Self {
        Self {
            call_id: Uuid::new_v4(),
            connection,
            store: store.into(),
            count: None,
            fields: None,
            display: false,
            extra: Map::new(),
            created_at: Utc::now(),
            started: Instant::now(),
        }
    }

    /// Derives the context for one call.
    ///
    /// Set parameters override, unset ones are inherited, extras merge.
    /// `userid` selects the connection and is not part of the context.
    pub fn with_params(&self, params: &CallParams) -> Context {
        let mut extra = self.extra.clone();
        for (key, value) in &params.extra {
            extra.insert(key.clone(), value.clone());
        }

        Context {
            call_id: self.call_id,
            connection: self.connection.clone(),
            store: params.level.clone().unwrap_or_else(|| self.store.clone()),
            count: params.count.or(self.count),
            fields: params.fields.clone().or_else(|| self.fields.clone()),
            display: params.display.unwrap_or(self.display),
            extra,
            created_at: self.created_at,
            started: self.started,
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn store(&self) -> &str {
        &self.store
    }

    /// Result limit; None when unbounded
    pub fn limit(&self) -> Option<usize> {
        self.count.filter(|&n| n > 0)
    }

    pub fn fields(&self) -> Option<&[String]> {
        self.fields.as_deref()
    }

    pub fn display(&self) -> bool {
        self.display
    }

    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Milliseconds since the context was created
    pub fn elapsed_ms(&self) -> u128 {
        self.started.elapsed().as_millis()
    }
}
