//! Selector parsing
//!
//! A selector is an ordered JSON object mapping field names to a literal
//! (exact match) or an operator object with one operator:
//!
//! ```json
//! {"status": {"$eq": "active"}, "owner": "u1", "title": {"$like": "^q[1-4]"}}
//! ```
//!
//! Field order is the JSON key order; the first field drives the index scan.

use std::fmt;

use regex::{Regex, RegexBuilder};
use serde_json::Value;

use crate::engine::Key;
use crate::errors::{StoreError, StoreResult};

/// Selector operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    /// Operator object with an unrecognized operator, or not exactly one key
    Unknown,
}

impl Operator {
    /// Parses an operator key such as `$gte`
    pub fn parse(key: &str) -> Self {
        match key {
            "$eq" => Operator::Eq,
            "$ne" => Operator::Ne,
            "$gt" => Operator::Gt,
            "$gte" => Operator::Gte,
            "$lt" => Operator::Lt,
            "$lte" => Operator::Lte,
            "$like" => Operator::Like,
            _ => Operator::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "$eq",
            Operator::Ne => "$ne",
            Operator::Gt => "$gt",
            Operator::Gte => "$gte",
            Operator::Lt => "$lt",
            Operator::Lte => "$lte",
            Operator::Like => "$like",
            Operator::Unknown => "$unknown",
        }
    }

    /// True for operators an index range can express
    pub fn is_range(&self) -> bool {
        matches!(
            self,
            Operator::Eq | Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One field's condition
#[derive(Debug, Clone)]
pub struct Condition {
    op: Operator,
    value: Value,
    pattern: Option<Regex>,
}

impl Condition {
    /// Creates a condition; a `$like` pattern is compiled case-insensitively
    pub fn new(op: Operator, value: Value) -> StoreResult<Self> {
        let pattern = match op {
            Operator::Like => {
                let source = string_form(&value).ok_or_else(|| {
                    StoreError::invalid_selector(format!("$like pattern must be a string, got {}", value))
                })?;
                let regex = RegexBuilder::new(&source)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| {
                        StoreError::invalid_selector(format!("invalid $like pattern '{}': {}", source, e))
                    })?;
                Some(regex)
            }
            _ => None,
        };
        Ok(Self { op, value, pattern })
    }

    /// Exact match on `value`
    pub fn eq(value: Value) -> Self {
        Self {
            op: Operator::Eq,
            value,
            pattern: None,
        }
    }

    /// Parses a literal or an operator object
    pub fn parse(raw: &Value) -> StoreResult<Self> {
        let object = match raw {
            Value::Object(object) => object,
            literal => return Ok(Self::eq(literal.clone())),
        };

        let mut entries = object.iter();
        match (entries.next(), entries.next()) {
            (Some((key, value)), None) => Self::new(Operator::parse(key), value.clone()),
            _ => Ok(Self {
                op: Operator::Unknown,
                value: raw.clone(),
                pattern: None,
            }),
        }
    }

    pub fn op(&self) -> Operator {
        self.op
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Compiled `$like` pattern
    pub fn pattern(&self) -> Option<&Regex> {
        self.pattern.as_ref()
    }
}

/// Renders a scalar the way `$like` sees it
pub(crate) fn string_form(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// A field and its condition
#[derive(Debug, Clone)]
pub struct Predicate {
    pub field: String,
    pub condition: Condition,
}

impl Predicate {
    pub fn new(field: impl Into<String>, condition: Condition) -> Self {
        Self {
            field: field.into(),
            condition,
        }
    }
}

/// Ordered, non-empty list of field predicates (AND semantics)
#[derive(Debug, Clone)]
pub struct Selector {
    predicates: Vec<Predicate>,
}

impl Selector {
    /// Parses a selector object
    pub fn parse(raw: &Value) -> StoreResult<Self> {
        let object = raw.as_object().ok_or_else(|| {
            StoreError::invalid_selector(format!("selector must be an object, got {}", raw))
        })?;

        let predicates = object
            .iter()
            .map(|(field, value)| Ok(Predicate::new(field.as_str(), Condition::parse(value)?)))
            .collect::<StoreResult<Vec<_>>>()?;
        Self::from_predicates(predicates)
    }

    /// Builds a selector from predicates in scan order
    pub fn from_predicates(predicates: Vec<Predicate>) -> StoreResult<Self> {
        if predicates.is_empty() {
            return Err(StoreError::invalid_selector("selector has no fields"));
        }
        Ok(Self { predicates })
    }

    /// The predicate that drives the index scan
    pub fn first(&self) -> &Predicate {
        &self.predicates[0]
    }

    /// Every predicate after the first
    pub fn rest(&self) -> &[Predicate] {
        &self.predicates[1..]
    }

    /// Predicates left to check after the index scan.
    ///
    /// Only an exact first field with a valid key is fully enforced by the
    /// index; ordered ranges span every key type, so their typed comparison
    /// is re-checked.
    pub fn residual(&self) -> &[Predicate] {
        if self.first_needs_check() {
            &self.predicates
        } else {
            self.rest()
        }
    }

    /// True unless the first field is an exact match on a valid key
    pub fn first_needs_check(&self) -> bool {
        let first = &self.first().condition;
        first.op() != Operator::Eq || Key::from_json(first.value()).is_none()
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}

/// Target of a find, update or remove: a primary key or a selector
#[derive(Debug, Clone)]
pub enum Lookup {
    Key(Value),
    Query(Selector),
}

impl Lookup {
    /// Objects are selectors; anything else is a primary key
    pub fn parse(raw: Value) -> StoreResult<Self> {
        if raw.is_object() {
            Ok(Lookup::Query(Selector::parse(&raw)?))
        } else {
            Ok(Lookup::Key(raw))
        }
    }

    pub fn key(key: impl Into<Value>) -> Self {
        Lookup::Key(key.into())
    }
}

impl From<Selector> for Lookup {
    fn from(selector: Selector) -> Self {
        Lookup::Query(selector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_order_preserved() {
        let selector = Selector::parse(&json!({
            "status": {"$eq": "active"},
            "owner": "u1",
            "age": {"$gt": 3}
        }))
        .unwrap();

        let fields: Vec<&str> = selector.predicates().iter().map(|p| p.field.as_str()).collect();
        assert_eq!(fields, vec!["status", "owner", "age"]);
        assert_eq!(selector.first().condition.op(), Operator::Eq);
        assert_eq!(selector.rest().len(), 2);
    }

    #[test]
    fn test_literal_is_eq() {
        let condition = Condition::parse(&json!(5)).unwrap();
        assert_eq!(condition.op(), Operator::Eq);
        assert_eq!(condition.value(), &json!(5));
    }

    #[test]
    fn test_unknown_operator_forms() {
        assert_eq!(
            Condition::parse(&json!({"$in": [1, 2]})).unwrap().op(),
            Operator::Unknown
        );
        assert_eq!(Condition::parse(&json!({})).unwrap().op(), Operator::Unknown);
        assert_eq!(
            Condition::parse(&json!({"$gt": 1, "$lt": 5})).unwrap().op(),
            Operator::Unknown
        );
    }

    #[test]
    fn test_like_compiles_case_insensitive() {
        let condition = Condition::parse(&json!({"$like": "abc"})).unwrap();
        let pattern = condition.pattern().unwrap();
        assert!(pattern.is_match("xxABCxx"));
        assert!(!pattern.is_match("ab c"));
    }

    #[test]
    fn test_invalid_like_pattern() {
        let err = Condition::parse(&json!({"$like": "(unclosed"})).unwrap_err();
        assert_eq!(err.code(), "OFFSTORE_INVALID_SELECTOR");
    }

    #[test]
    fn test_empty_and_non_object_selectors() {
        assert!(Selector::parse(&json!({})).is_err());
        assert!(Selector::parse(&json!([1, 2])).is_err());
    }

    #[test]
    fn test_residual_includes_untranslatable_first() {
        let selector = Selector::parse(&json!({"status": {"$ne": "done"}, "owner": "u1"})).unwrap();
        assert_eq!(selector.residual().len(), 2);

        let selector = Selector::parse(&json!({"age": {"$gt": 5}, "owner": "u1"})).unwrap();
        assert_eq!(selector.residual().len(), 2);

        let selector = Selector::parse(&json!({"status": "done", "owner": "u1"})).unwrap();
        assert_eq!(selector.residual().len(), 1);
    }

    #[test]
    fn test_lookup_parse() {
        assert!(matches!(Lookup::parse(json!(7)).unwrap(), Lookup::Key(_)));
        assert!(matches!(Lookup::parse(json!("a1")).unwrap(), Lookup::Key(_)));
        assert!(matches!(
            Lookup::parse(json!({"status": "active"})).unwrap(),
            Lookup::Query(_)
        ));
    }
}
