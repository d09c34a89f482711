//! Range translation
//!
//! Translates the first selector field's condition into the key range the
//! index scan walks. Operators no range can express scan the whole index.

use crate::engine::{Key, KeyRange};

use super::selector::{Condition, Operator};

/// Converts conditions into index key ranges
pub struct RangeTranslator;

impl RangeTranslator {
    /// Key range for one condition.
    ///
    /// | operator | range |
    /// |---|---|
    /// | literal, `$eq v` | exactly v |
    /// | `$gt v` / `$gte v` | lower bound v, open / closed |
    /// | `$lt v` / `$lte v` | upper bound v, open / closed |
    /// | anything else | unbounded |
    ///
    /// A bound that is not a valid key (null, array, object) is unbounded.
    pub fn translate(condition: &Condition) -> KeyRange {
        let bound = match Key::from_json(condition.value()) {
            Some(key) => key,
            None => return KeyRange::Unbounded,
        };

        match condition.op() {
            Operator::Eq => KeyRange::only(bound),
            Operator::Gt => KeyRange::lower_bound(bound, true),
            Operator::Gte => KeyRange::lower_bound(bound, false),
            Operator::Lt => KeyRange::upper_bound(bound, true),
            Operator::Lte => KeyRange::upper_bound(bound, false),
            Operator::Ne | Operator::Like | Operator::Unknown => KeyRange::Unbounded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Direction;
    use serde_json::json;

    fn translate(raw: serde_json::Value) -> KeyRange {
        RangeTranslator::translate(&Condition::parse(&raw).unwrap())
    }

    fn five() -> Key {
        Key::from_json(&json!(5)).unwrap()
    }

    #[test]
    fn test_literal_is_exact() {
        let range = translate(json!(5));
        assert_eq!(range.direction(), Direction::Exact);
        assert_eq!(range.bound(), Some(&five()));
        assert!(range.is_inclusive());
    }

    #[test]
    fn test_literal_equals_eq_operator() {
        assert_eq!(translate(json!(5)), translate(json!({"$eq": 5})));
    }

    #[test]
    fn test_boundaries() {
        let four = Key::from_json(&json!(4)).unwrap();
        let six = Key::from_json(&json!(6)).unwrap();

        let gt = translate(json!({"$gt": 5}));
        assert!(!gt.contains(&five()));
        assert!(gt.contains(&six));

        let gte = translate(json!({"$gte": 5}));
        assert!(gte.contains(&five()));
        assert_eq!(gte.direction(), Direction::Lower);

        let lt = translate(json!({"$lt": 5}));
        assert!(!lt.contains(&five()));
        assert!(lt.contains(&four));

        let lte = translate(json!({"$lte": 5}));
        assert!(lte.contains(&five()));
        assert_eq!(lte.direction(), Direction::Upper);
    }

    #[test]
    fn test_untranslatable_is_unbounded() {
        assert_eq!(translate(json!({"$ne": 5})), KeyRange::Unbounded);
        assert_eq!(translate(json!({"$like": "ab"})), KeyRange::Unbounded);
        assert_eq!(translate(json!({"$in": [5]})), KeyRange::Unbounded);
        assert_eq!(translate(json!({"$gt": null})), KeyRange::Unbounded);
    }
}
