//! Schema catalog: the declared stores of a database
//!
//! - Declaration order is kept; upgrades create stores in that order
//! - Store names are unique
//! - Loaded from a JSON array of store declarations

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{StoreError, StoreResult};
use crate::observability::{log_event_with_fields, Event};

use super::types::StoreDef;

/// Levels declared when no catalog is supplied
pub const DEFAULT_LEVELS: [&str; 3] = ["account", "plan", "unit"];

/// Ordered set of store declarations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaCatalog {
    stores: Vec<StoreDef>,
}

impl Default for SchemaCatalog {
    fn default() -> Self {
        Self::default_levels()
    }
}

impl SchemaCatalog {
    /// An empty catalog
    pub fn empty() -> Self {
        Self { stores: Vec::new() }
    }

    /// The account/plan/unit levels, keyed by `<level>id`, without indexes
    pub fn default_levels() -> Self {
        Self {
            stores: DEFAULT_LEVELS.iter().map(|l| StoreDef::level(l)).collect(),
        }
    }

    /// Builds a catalog from declarations, rejecting invalid or duplicate ones
    pub fn from_defs(defs: Vec<StoreDef>, origin: &str) -> StoreResult<Self> {
        let mut catalog = Self::empty();
        for def in defs {
            def.validate(origin)?;
            if catalog.get(&def.name).is_some() {
                return Err(StoreError::config(
                    origin,
                    format!("store '{}' declared twice", def.name),
                ));
            }
            catalog.stores.push(def);
        }
        Ok(catalog)
    }

    /// Parses a JSON array of `{name, primaryKeyField, indexedFields}`
    pub fn from_json(value: Value, origin: &str) -> StoreResult<Self> {
        let defs: Vec<StoreDef> = serde_json::from_value(value)
            .map_err(|e| StoreError::config(origin, format!("malformed schema: {}", e)))?;
        Self::from_defs(defs, origin)
    }

    /// Loads a schema-only file
    pub fn load(path: &Path) -> StoreResult<Self> {
        let origin = path.display().to_string();
        let content = fs::read_to_string(path)
            .map_err(|e| StoreError::config(&origin, format!("cannot read schema file: {}", e)))?;
        let value: Value = serde_json::from_str(&content)
            .map_err(|e| StoreError::config(&origin, format!("invalid JSON: {}", e)))?;
        let catalog = Self::from_json(value, &origin)?;

        let count = catalog.len().to_string();
        log_event_with_fields(
            Event::SchemasLoaded,
            &[("path", origin.as_str()), ("stores", count.as_str())],
        );
        Ok(catalog)
    }

    pub fn get(&self, name: &str) -> Option<&StoreDef> {
        self.stores.iter().find(|s| s.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StoreDef> {
        self.stores.iter()
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    /// Re-checks every declaration
    pub fn validate(&self, origin: &str) -> StoreResult<()> {
        Self::from_defs(self.stores.clone(), origin).map(|_| ())
    }
}
