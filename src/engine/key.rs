//! Key domain and key ranges
//!
//! Keys order deterministically: Bool < Number < String.
//! All numbers share one ordering (integers and floats compare numerically).
//! Ordered ranges stay inside their bound's type band: a numeric bound never
//! reaches booleans or strings.

use std::fmt;
use std::ops::Bound;

use serde_json::Value;

/// Ordered key used for primary keys and index entries.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    /// Boolean value (false < true)
    Bool(bool),
    /// Number, stored as total-ordering bits of its f64 value
    Number(u64),
    /// String value
    String(String),
}

impl Key {
    /// Create a key from a number.
    ///
    /// Returns None for NaN. Negative zero collapses to zero.
    pub fn from_f64(v: f64) -> Option<Self> {
        if v.is_nan() {
            return None;
        }
        let v = if v == 0.0 { 0.0 } else { v };
        let bits = v.to_bits();
        let ordered = if (bits >> 63) == 1 {
            !bits
        } else {
            bits ^ (1 << 63)
        };
        Some(Key::Number(ordered))
    }

    /// Create a key from a string
    pub fn from_string(v: impl Into<String>) -> Self {
        Key::String(v.into())
    }

    /// Create a key from a JSON value.
    ///
    /// Null, arrays and objects are not valid keys.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(Key::Bool(*b)),
            Value::Number(n) => n.as_f64().and_then(Key::from_f64),
            Value::String(s) => Some(Key::from_string(s.as_str())),
            _ => None,
        }
    }

    /// Rank of the key's type band
    fn band(&self) -> u8 {
        match self {
            Key::Bool(_) => 0,
            Key::Number(_) => 1,
            Key::String(_) => 2,
        }
    }

    /// Smallest key of this key's band
    fn band_floor(&self) -> Key {
        match self {
            Key::Bool(_) => Key::Bool(false),
            Key::Number(_) => Key::Number(0),
            Key::String(_) => Key::String(String::new()),
        }
    }

    /// Smallest key of the next band; strings are the last band
    fn band_ceiling(&self) -> Option<Key> {
        match self {
            Key::Bool(_) => Some(Key::Number(0)),
            Key::Number(_) => Some(Key::String(String::new())),
            Key::String(_) => None,
        }
    }

    /// Returns the numeric value for number keys
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Key::Number(ordered) => {
                let bits = if (ordered >> 63) == 1 {
                    ordered ^ (1 << 63)
                } else {
                    !ordered
                };
                Some(f64::from_bits(bits))
            }
            _ => None,
        }
    }

    /// Converts the key back into JSON.
    ///
    /// Integral numbers come back as integers.
    pub fn to_json(&self) -> Value {
        match self {
            Key::Bool(b) => Value::Bool(*b),
            Key::String(s) => Value::String(s.clone()),
            Key::Number(_) => {
                let v = self.as_f64().unwrap_or_default();
                if v.fract() == 0.0 && v.abs() < 9.007_199_254_740_992e15 {
                    Value::from(v as i64)
                } else {
                    serde_json::Number::from_f64(v)
                        .map(Value::Number)
                        .unwrap_or(Value::Null)
                }
            }
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

/// Direction of a key range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Everything at or above the bound
    Lower,
    /// Everything at or below the bound
    Upper,
    /// Only the bound itself
    Exact,
    /// The whole key domain
    Unbounded,
}

/// A directional bounded interval over the key domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyRange {
    /// Whole domain, from the minimum key upward
    Unbounded,
    /// Exactly one key
    Only(Key),
    /// Lower bound; `open` excludes the bound itself
    Lower { bound: Key, open: bool },
    /// Upper bound; `open` excludes the bound itself
    Upper { bound: Key, open: bool },
}

impl KeyRange {
    /// Range matching a single key
    pub fn only(key: Key) -> Self {
        KeyRange::Only(key)
    }

    /// Range from `bound` upward
    pub fn lower_bound(bound: Key, open: bool) -> Self {
        KeyRange::Lower { bound, open }
    }

    /// Range from `bound` downward
    pub fn upper_bound(bound: Key, open: bool) -> Self {
        KeyRange::Upper { bound, open }
    }

    /// Returns the direction of this range
    pub fn direction(&self) -> Direction {
        match self {
            KeyRange::Unbounded => Direction::Unbounded,
            KeyRange::Only(_) => Direction::Exact,
            KeyRange::Lower { .. } => Direction::Lower,
            KeyRange::Upper { .. } => Direction::Upper,
        }
    }

    /// Returns the bound key, if any
    pub fn bound(&self) -> Option<&Key> {
        match self {
            KeyRange::Unbounded => None,
            KeyRange::Only(k) => Some(k),
            KeyRange::Lower { bound, .. } | KeyRange::Upper { bound, .. } => Some(bound),
        }
    }

    /// Returns true if the bound itself belongs to the range
    pub fn is_inclusive(&self) -> bool {
        match self {
            KeyRange::Unbounded | KeyRange::Only(_) => true,
            KeyRange::Lower { open, .. } | KeyRange::Upper { open, .. } => !open,
        }
    }

    /// Bounds usable with `BTreeMap::range`.
    ///
    /// The open side of a `Lower` or `Upper` range stops at the edge of the
    /// bound's type band.
    pub fn as_bounds(&self) -> (Bound<Key>, Bound<Key>) {
        fn edge(key: &Key, open: bool) -> Bound<Key> {
            if open {
                Bound::Excluded(key.clone())
            } else {
                Bound::Included(key.clone())
            }
        }

        match self {
            KeyRange::Unbounded => (Bound::Unbounded, Bound::Unbounded),
            KeyRange::Only(k) => (Bound::Included(k.clone()), Bound::Included(k.clone())),
            KeyRange::Lower { bound, open } => (
                edge(bound, *open),
                bound
                    .band_ceiling()
                    .map_or(Bound::Unbounded, Bound::Excluded),
            ),
            KeyRange::Upper { bound, open } => {
                (Bound::Included(bound.band_floor()), edge(bound, *open))
            }
        }
    }

    /// Checks whether a key falls inside the range
    pub fn contains(&self, key: &Key) -> bool {
        match self {
            KeyRange::Unbounded => true,
            KeyRange::Only(k) => key == k,
            KeyRange::Lower { bound, open } => {
                key.band() == bound.band() && if *open { key > bound } else { key >= bound }
            }
            KeyRange::Upper { bound, open } => {
                key.band() == bound.band() && if *open { key < bound } else { key <= bound }
            }
        }
    }
}
