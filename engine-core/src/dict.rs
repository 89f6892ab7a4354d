//! `Dict`, the flat key/value payload threaded through events, mail, and errors.
//!
//! Every value is one of four scalar kinds (string, signed integer, float, bool) or a
//! nested `Dict` of the same. There is no array kind and no arbitrary nesting depth beyond
//! `Dict`-in-`Dict`: payloads in this engine describe a handful of named fields, not
//! general-purpose documents.

use std::collections::BTreeMap;
use std::fmt;

/// A single value held by a [`Dict`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Dict(Dict),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Dict(d) => write!(f, "{d}"),
        }
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<Dict> for Value {
    fn from(v: Dict) -> Self {
        Self::Dict(v)
    }
}

/// A flat, ordered (by key) map of string keys to [`Value`]s.
///
/// `Dict` is the one payload type every service boundary speaks: event data, mail
/// bodies, and the contextual fields attached to an [`crate::error::EngineError`] are all
/// `Dict`s. Keys are compared with `BTreeMap` so iteration order is stable, which makes
/// equality checks in tests deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dict {
    entries: BTreeMap<String, Value>,
}

impl Dict {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.entries.insert(key.into(), value.into())
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.entries.get(key)? {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.entries.get(key)? {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.entries.get(key)? {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }
}

impl fmt::Display for Dict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{k}: {v}")?;
        }
        write!(f, "}}")
    }
}

impl FromIterator<(String, Value)> for Dict {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_round_trips_scalars() {
        let d = Dict::new()
            .with("name", "socket-router")
            .with("fd", 7_i64)
            .with("ratio", 0.5_f64)
            .with("active", true);

        assert_eq!(d.get_str("name"), Some("socket-router"));
        assert_eq!(d.get_int("fd"), Some(7));
        assert_eq!(d.get("ratio"), Some(&Value::Float(0.5)));
        assert_eq!(d.get_bool("active"), Some(true));
        assert_eq!(d.len(), 4);
    }

    #[test]
    fn missing_key_is_none() {
        let d = Dict::new();
        assert_eq!(d.get_str("missing"), None);
        assert!(!d.contains_key("missing"));
    }

    #[test]
    fn nested_dict_displays() {
        let inner = Dict::new().with("socket_id", 3_i64);
        let outer = Dict::new().with("payload", inner);
        assert_eq!(outer.to_string(), "{payload: {socket_id: 3}}");
    }

    #[test]
    fn wrong_type_accessor_returns_none() {
        let d = Dict::new().with("name", "x");
        assert_eq!(d.get_int("name"), None);
    }
}
