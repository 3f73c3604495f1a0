//! Shared types for collect-agent components.
//!
//! Statistics reported to rstats are a finite tagged union of JSON-like
//! values. Anything that cannot be represented by [`StatValue`] is rejected
//! when it crosses into this crate; [`Statistics::validate`] catches values
//! built directly from the public variants.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map;
use std::convert::TryFrom;

/// Errors raised when a dynamic value does not fit the statistics union
#[derive(Debug, thiserror::Error)]
pub enum ValueError {
    #[error("Non-finite float cannot be reported: {0}")]
    NonFiniteFloat(f64),

    #[error("Integer out of range: {0}")]
    IntegerOutOfRange(String),

    #[error("Statistics must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("Invalid statistics JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// A single statistic value.
///
/// Serialized untagged, so `StatValue::Int(3)` is the JSON `3` and
/// `StatValue::Null` is `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<StatValue>),
    Object(BTreeMap<String, StatValue>),
}

impl StatValue {
    /// Build a float value, rejecting NaN and infinities.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::NonFiniteFloat` if `value` is not finite.
    pub fn float(value: f64) -> Result<Self, ValueError> {
        if value.is_finite() {
            Ok(Self::Float(value))
        } else {
            Err(ValueError::NonFiniteFloat(value))
        }
    }

    /// Check that the value, and everything nested in it, can be encoded.
    ///
    /// Variants are public, so a `Float` built directly may still hold NaN
    /// or an infinity; JSON has no representation for those.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::NonFiniteFloat` for the first non-finite float.
    pub fn validate(&self) -> Result<(), ValueError> {
        match self {
            StatValue::Float(value) if !value.is_finite() => {
                Err(ValueError::NonFiniteFloat(*value))
            }
            StatValue::Array(items) => items.iter().try_for_each(StatValue::validate),
            StatValue::Object(map) => map.values().try_for_each(StatValue::validate),
            _ => Ok(()),
        }
    }

    /// Name of the variant, used in error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            StatValue::Null => "null",
            StatValue::Bool(_) => "bool",
            StatValue::Int(_) => "int",
            StatValue::Float(_) => "float",
            StatValue::String(_) => "string",
            StatValue::Array(_) => "array",
            StatValue::Object(_) => "object",
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            StatValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for StatValue {
    fn from(value: bool) -> Self {
        StatValue::Bool(value)
    }
}

impl From<i64> for StatValue {
    fn from(value: i64) -> Self {
        StatValue::Int(value)
    }
}

impl From<i32> for StatValue {
    fn from(value: i32) -> Self {
        StatValue::Int(i64::from(value))
    }
}

impl From<u32> for StatValue {
    fn from(value: u32) -> Self {
        StatValue::Int(i64::from(value))
    }
}

impl From<&str> for StatValue {
    fn from(value: &str) -> Self {
        StatValue::String(value.to_string())
    }
}

impl From<String> for StatValue {
    fn from(value: String) -> Self {
        StatValue::String(value)
    }
}

impl From<Vec<StatValue>> for StatValue {
    fn from(value: Vec<StatValue>) -> Self {
        StatValue::Array(value)
    }
}

impl From<Statistics> for StatValue {
    fn from(value: Statistics) -> Self {
        StatValue::Object(value.0)
    }
}

impl TryFrom<f64> for StatValue {
    type Error = ValueError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        StatValue::float(value)
    }
}

impl TryFrom<u64> for StatValue {
    type Error = ValueError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        i64::try_from(value)
            .map(StatValue::Int)
            .map_err(|_| ValueError::IntegerOutOfRange(value.to_string()))
    }
}

impl TryFrom<serde_json::Value> for StatValue {
    type Error = ValueError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        use serde_json::Value;

        Ok(match value {
            Value::Null => StatValue::Null,
            Value::Bool(b) => StatValue::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    StatValue::Int(i)
                } else if n.is_u64() {
                    return Err(ValueError::IntegerOutOfRange(n.to_string()));
                } else {
                    let f = n
                        .as_f64()
                        .ok_or_else(|| ValueError::IntegerOutOfRange(n.to_string()))?;
                    StatValue::float(f)?
                }
            }
            Value::String(s) => StatValue::String(s),
            Value::Array(items) => StatValue::Array(
                items
                    .into_iter()
                    .map(StatValue::try_from)
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(map) => StatValue::Object(
                map.into_iter()
                    .map(|(k, v)| StatValue::try_from(v).map(|v| (k, v)))
                    .collect::<Result<_, _>>()?,
            ),
        })
    }
}

/// Named statistics sent in a single `SendStat` command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Statistics(BTreeMap<String, StatValue>);

impl Statistics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse statistics from an already serialized JSON object.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not JSON, is not an object, or
    /// contains a value outside the statistics union.
    pub fn from_json_str(json: &str) -> Result<Self, ValueError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::try_from(value)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<StatValue>) {
        self.0.insert(name.into(), value.into());
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<StatValue>) -> Self {
        self.insert(name, value);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&StatValue> {
        self.0.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<StatValue> {
        self.0.remove(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, StatValue> {
        self.0.iter()
    }

    /// Check every value, see [`StatValue::validate`].
    ///
    /// # Errors
    ///
    /// Returns the first value that cannot be encoded.
    pub fn validate(&self) -> Result<(), ValueError> {
        self.0.values().try_for_each(StatValue::validate)
    }

    /// Merge another set of statistics into this one, overwriting duplicates.
    pub fn merge(&mut self, other: Statistics) {
        self.0.extend(other.0);
    }
}

impl TryFrom<serde_json::Value> for Statistics {
    type Error = ValueError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        match StatValue::try_from(value)? {
            StatValue::Object(map) => Ok(Self(map)),
            other => Err(ValueError::NotAnObject(other.kind())),
        }
    }
}

impl FromIterator<(String, StatValue)> for Statistics {
    fn from_iter<I: IntoIterator<Item = (String, StatValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Statistics {
    type Item = (String, StatValue);
    type IntoIter = btree_map::IntoIter<String, StatValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Statistics {
    type Item = (&'a String, &'a StatValue);
    type IntoIter = btree_map::Iter<'a, String, StatValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
