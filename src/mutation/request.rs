//! Mutation requests and their results

use serde_json::Value;

use crate::query::{Lookup, Selector};

/// An insert or update, stated explicitly instead of inferred from shape
#[derive(Debug, Clone)]
pub enum WriteRequest {
    /// Add every record; a duplicate key fails the whole batch
    InsertMany(Vec<Value>),
    /// Merge `data` over the record(s) named by `target`
    UpdateOne { target: Lookup, data: Value },
}

impl WriteRequest {
    /// Insert of one record or a list of records
    pub fn insert(data: Value) -> Self {
        WriteRequest::InsertMany(normalize(data))
    }

    pub fn update(target: impl Into<Lookup>, data: Value) -> Self {
        WriteRequest::UpdateOne {
            target: target.into(),
            data,
        }
    }
}

/// Outcome of an update
#[derive(Debug, Clone, PartialEq)]
pub enum Updated {
    /// Records added by `InsertMany`
    Inserted(Vec<Value>),
    /// Record updated by key
    One(Value),
    /// Records updated by selector
    Many(Vec<Value>),
}

impl Updated {
    /// Every record written, in order
    pub fn into_records(self) -> Vec<Value> {
        match self {
            Updated::Inserted(records) | Updated::Many(records) => records,
            Updated::One(record) => vec![record],
        }
    }
}

/// What a remove deletes
#[derive(Debug, Clone)]
pub enum RemoveTarget {
    /// One record by primary key
    Key(Value),
    /// Each listed record, by its key-path value
    Records(Vec<Value>),
    /// Every record matching a selector
    Query(Selector),
}

impl From<Lookup> for RemoveTarget {
    fn from(lookup: Lookup) -> Self {
        match lookup {
            Lookup::Key(key) => RemoveTarget::Key(key),
            Lookup::Query(selector) => RemoveTarget::Query(selector),
        }
    }
}

impl From<Vec<Value>> for RemoveTarget {
    fn from(records: Vec<Value>) -> Self {
        RemoveTarget::Records(records)
    }
}

/// Outcome of a remove
#[derive(Debug, Clone, PartialEq)]
pub enum Removed {
    /// Primary keys of the deleted records
    Keys(Vec<Value>),
    /// The deleted records themselves
    Records(Vec<Value>),
}

impl Removed {
    /// Primary keys of the deleted records
    pub fn into_keys(self, key_path: &str) -> Vec<Value> {
        match self {
            Removed::Keys(keys) => keys,
            Removed::Records(records) => records
                .iter()
                .filter_map(|r| r.get(key_path).cloned())
                .collect(),
        }
    }
}

/// A single record becomes a one-element list
pub fn normalize(data: Value) -> Vec<Value> {
    match data {
        Value::Array(records) => records,
        record => vec![record],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(json!({"planid": 1})), vec![json!({"planid": 1})]);
        assert_eq!(
            normalize(json!([{"planid": 1}, {"planid": 2}])).len(),
            2
        );
    }

    #[test]
    fn test_removed_keys() {
        let removed = Removed::Records(vec![
            json!({"planid": 1, "status": "done"}),
            json!({"planid": 2}),
        ]);
        assert_eq!(removed.into_keys("planid"), vec![json!(1), json!(2)]);
        assert_eq!(
            Removed::Keys(vec![json!("a")]).into_keys("planid"),
            vec![json!("a")]
        );
    }

    #[test]
    fn test_remove_target_from_lookup() {
        let target = RemoveTarget::from(Lookup::parse(json!(3)).unwrap());
        assert!(matches!(target, RemoveTarget::Key(_)));
    }

    #[test]
    fn test_updated_records() {
        assert_eq!(
            Updated::One(json!({"planid": 1})).into_records(),
            vec![json!({"planid": 1})]
        );
    }
}
