//! Store declarations

use serde::{Deserialize, Serialize};

use crate::errors::{StoreError, StoreResult};

/// Declaration of one store: its name, key path and secondary indexes.
///
/// Wire form is camelCase: `{"name", "primaryKeyField", "indexedFields"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreDef {
    pub name: String,
    #[serde(alias = "primaryKey", alias = "keyPath")]
    pub primary_key_field: String,
    #[serde(default, alias = "indexes")]
    pub indexed_fields: Vec<String>,
}

impl StoreDef {
    pub fn new(name: impl Into<String>, primary_key_field: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key_field: primary_key_field.into(),
            indexed_fields: Vec::new(),
        }
    }

    /// Adds a non-unique index on `field`
    pub fn with_index(mut self, field: impl Into<String>) -> Self {
        self.indexed_fields.push(field.into());
        self
    }

    /// Store for a level, keyed by `<level>id`
    pub fn level(level: &str) -> Self {
        Self::new(level, format!("{}id", level))
    }

    pub fn is_indexed(&self, field: &str) -> bool {
        self.indexed_fields.iter().any(|f| f == field)
    }

    /// Checks names are non-empty and indexes are unique.
    ///
    /// `origin` names the file or caller for the error message.
    pub fn validate(&self, origin: &str) -> StoreResult<()> {
        if self.name.trim().is_empty() {
            return Err(StoreError::config(origin, "store name must not be empty"));
        }
        if self.primary_key_field.trim().is_empty() {
            return Err(StoreError::config(
                origin,
                format!("store '{}' has an empty primaryKeyField", self.name),
            ));
        }
        for (i, field) in self.indexed_fields.iter().enumerate() {
            if field.trim().is_empty() {
                return Err(StoreError::config(
                    origin,
                    format!("store '{}' declares an empty index name", self.name),
                ));
            }
            if self.indexed_fields[..i].contains(field) {
                return Err(StoreError::config(
                    origin,
                    format!("store '{}' declares index '{}' twice", self.name, field),
                ));
            }
        }
        Ok(())
    }
}
