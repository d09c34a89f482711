//! Store configuration
//!
//! ```json
//! {
//!   "default_userid": "1389",
//!   "db_suffix": "_db",
//!   "version": 2,
//!   "log_level": "info",
//!   "schemas": [
//!     {"name": "plan", "primaryKeyField": "planid", "indexedFields": ["status"]}
//!   ]
//! }
//! ```
//!
//! Every field is optional; missing fields take their defaults.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{StoreError, StoreResult};
use crate::observability::{log_event_with_fields, Event, Logger, Severity};
use crate::schema::SchemaCatalog;

/// Configuration shared by every connection of a `ConnectionManager`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// User id used when a call names none
    pub default_userid: String,
    /// Appended to the user id to name its database
    pub db_suffix: String,
    /// Schema version to open; None opens at the stored version
    pub version: Option<u32>,
    /// Minimum severity written by the logger
    pub log_level: Severity,
    /// Declared stores
    pub schemas: SchemaCatalog,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_userid: "1389".to_string(),
            db_suffix: "_db".to_string(),
            version: None,
            log_level: Severity::Warn,
            schemas: SchemaCatalog::default(),
        }
    }
}

impl StoreConfig {
    /// Uses `schemas` as the catalog
    pub fn with_schemas(mut self, schemas: SchemaCatalog) -> Self {
        self.schemas = schemas;
        self
    }

    /// Loads and validates a config file
    pub fn load(path: &Path) -> StoreResult<Self> {
        let origin = path.display().to_string();
        let content = fs::read_to_string(path)
            .map_err(|e| StoreError::config(&origin, format!("cannot read config file: {}", e)))?;
        let config: StoreConfig = serde_json::from_str(&content)
            .map_err(|e| StoreError::config(&origin, format!("invalid config: {}", e)))?;
        config.validate(&origin)?;

        log_event_with_fields(Event::ConfigLoaded, &[("path", origin.as_str())]);
        Ok(config)
    }

    /// Checks the config is usable
    pub fn validate(&self, origin: &str) -> StoreResult<()> {
        if self.default_userid.trim().is_empty() {
            return Err(StoreError::config(origin, "default_userid must not be empty"));
        }
        if self.version == Some(0) {
            return Err(StoreError::config(origin, "version must be positive"));
        }
        self.schemas.validate(origin)
    }

    /// Sets the global log level from this config
    pub fn apply_log_level(&self) {
        Logger::set_min_severity(self.log_level);
    }

    /// Database name for a user id
    pub fn db_name(&self, userid: Option<&str>) -> String {
        format!(
            "{}{}",
            userid.unwrap_or(&self.default_userid),
            self.db_suffix
        )
    }
}
