//! Secondary filtering of scanned records
//!
//! Applies the predicates the index scan could not enforce, then the
//! projection. Typed comparison only: no string/number coercion.

use std::cmp::Ordering;

use serde_json::{Map, Value};

use super::selector::{string_form, Operator, Predicate};

/// Evaluates predicates against materialized records
pub struct SecondaryFilter;

impl SecondaryFilter {
    /// Checks if a record matches all predicates
    pub fn matches(record: &Value, predicates: &[Predicate]) -> bool {
        predicates
            .iter()
            .all(|pred| Self::matches_predicate(record, pred))
    }

    /// Keeps the records matching every predicate, in order
    pub fn apply(records: Vec<Value>, predicates: &[Predicate]) -> Vec<Value> {
        if predicates.is_empty() {
            return records;
        }
        records
            .into_iter()
            .filter(|record| Self::matches(record, predicates))
            .collect()
    }

    /// Filters, then projects when `fields` is set
    pub fn filter(records: Vec<Value>, predicates: &[Predicate], fields: Option<&[String]>) -> Vec<Value> {
        let matched = Self::apply(records, predicates);
        match fields {
            Some(fields) => matched.iter().map(|r| Self::project(r, fields)).collect(),
            None => matched,
        }
    }

    /// New object holding only `fields`; absent fields are omitted
    pub fn project(record: &Value, fields: &[String]) -> Value {
        let mut projected = Map::new();
        for field in fields {
            if let Some(value) = record.get(field) {
                projected.insert(field.clone(), value.clone());
            }
        }
        Value::Object(projected)
    }

    fn matches_predicate(record: &Value, predicate: &Predicate) -> bool {
        let condition = &predicate.condition;
        let actual = record.get(&predicate.field).filter(|v| !v.is_null());

        if condition.op() == Operator::Ne {
            // Missing field satisfies $ne
            return !actual.is_some_and(|a| Self::eq_match(a, condition.value()));
        }

        let actual = match actual {
            Some(v) => v,
            None => return false,
        };

        match condition.op() {
            Operator::Eq => Self::eq_match(actual, condition.value()),
            Operator::Gt => Self::compare(actual, condition.value()) == Some(Ordering::Greater),
            Operator::Gte => matches!(
                Self::compare(actual, condition.value()),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Operator::Lt => Self::compare(actual, condition.value()) == Some(Ordering::Less),
            Operator::Lte => matches!(
                Self::compare(actual, condition.value()),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Operator::Like => match (condition.pattern(), string_form(actual)) {
                (Some(pattern), Some(text)) => pattern.is_match(&text),
                _ => false,
            },
            Operator::Ne | Operator::Unknown => false,
        }
    }

    /// Typed equality; numbers compare numerically
    fn eq_match(actual: &Value, expected: &Value) -> bool {
        match (actual, expected) {
            (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
                (Some(af), Some(bf)) => af == bf,
                _ => a == b,
            },
            _ => actual == expected,
        }
    }

    /// Ordering between two numbers or two strings
    fn compare(actual: &Value, bound: &Value) -> Option<Ordering> {
        match (actual, bound) {
            (Value::Number(a), Value::Number(b)) => {
                if let (Some(ai), Some(bi)) = (a.as_i64(), b.as_i64()) {
                    return Some(ai.cmp(&bi));
                }
                a.as_f64()?.partial_cmp(&b.as_f64()?)
            }
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::selector::Selector;
    use serde_json::json;

    fn matches(record: Value, selector: Value) -> bool {
        let selector = Selector::parse(&selector).unwrap();
        SecondaryFilter::matches(&record, selector.predicates())
    }

    #[test]
    fn test_equality_match() {
        let doc = json!({"name": "Alice", "age": 30});
        assert!(matches(doc.clone(), json!({"name": "Alice"})));
        assert!(matches(doc.clone(), json!({"name": {"$eq": "Alice"}})));
        assert!(!matches(doc, json!({"name": "Bob"})));
    }

    #[test]
    fn test_no_type_coercion() {
        let doc = json!({"value": 123});
        assert!(!matches(doc.clone(), json!({"value": "123"})));
        assert!(matches(doc.clone(), json!({"value": 123})));
        assert!(matches(doc, json!({"value": 123.0})));
    }

    #[test]
    fn test_range_predicates() {
        let doc = json!({"age": 25});
        assert!(matches(doc.clone(), json!({"age": {"$gte": 18}})));
        assert!(matches(doc.clone(), json!({"age": {"$lte": 25}})));
        assert!(!matches(doc.clone(), json!({"age": {"$gt": 25}})));
        assert!(!matches(doc.clone(), json!({"age": {"$lt": 25}})));
        assert!(!matches(doc, json!({"age": {"$gt": "20"}})));
    }

    #[test]
    fn test_string_ranges() {
        let doc = json!({"name": "m"});
        assert!(matches(doc.clone(), json!({"name": {"$gt": "a"}})));
        assert!(!matches(doc, json!({"name": {"$lt": "a"}})));
    }

    #[test]
    fn test_ne_and_missing_field() {
        let doc = json!({"status": "active"});
        assert!(matches(doc.clone(), json!({"status": {"$ne": "done"}})));
        assert!(!matches(doc.clone(), json!({"status": {"$ne": "active"}})));
        assert!(matches(doc, json!({"owner": {"$ne": "u1"}})));
    }

    #[test]
    fn test_like_case_insensitive_substring() {
        assert!(matches(json!({"t": "xxABCyy"}), json!({"t": {"$like": "abc"}})));
        assert!(matches(json!({"t": "abc"}), json!({"t": {"$like": "ABC"}})));
        assert!(!matches(json!({"t": "ab-c"}), json!({"t": {"$like": "abc"}})));
        assert!(matches(json!({"n": 1234}), json!({"n": {"$like": "23"}})));
        assert!(!matches(json!({"t": ["abc"]}), json!({"t": {"$like": "abc"}})));
    }

    #[test]
    fn test_unknown_operator_never_matches() {
        assert!(!matches(json!({"a": 1}), json!({"a": {"$in": [1]}})));
    }

    #[test]
    fn test_missing_and_null_no_match() {
        assert!(!matches(json!({"name": "Alice"}), json!({"age": 30})));
        assert!(!matches(json!({"name": null}), json!({"name": "Alice"})));
    }

    #[test]
    fn test_multiple_predicates_and() {
        let doc = json!({"age": 25, "active": true});
        assert!(matches(doc.clone(), json!({"age": {"$gte": 18}, "active": true})));
        assert!(!matches(doc, json!({"age": {"$gte": 18}, "active": false})));
    }

    #[test]
    fn test_projection() {
        let records = vec![
            json!({"planid": 1, "status": "active", "owner": "u1"}),
            json!({"planid": 2, "status": "done"}),
        ];
        let fields = vec!["planid".to_string(), "owner".to_string()];

        let projected = SecondaryFilter::filter(records.clone(), &[], Some(&fields));
        assert_eq!(
            projected,
            vec![json!({"planid": 1, "owner": "u1"}), json!({"planid": 2})]
        );
        assert_eq!(records[0]["status"], "active");
    }
}
