use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Props and styles keyed by name. Ordered so that serialization is canonical.
pub type ValueMap = BTreeMap<String, Value>;

/// Deepest list/map nesting accepted inside one value.
///
/// Together with the node depth limit this keeps every document, version
/// blob and wire envelope under serde_json's 128-level parse limit.
pub const MAX_VALUE_DEPTH: usize = 32;

/// A serializable prop, style or render value.
///
/// Variant order matters for untagged deserialization: `null` and booleans are
/// tried before numbers so that JSON scalars land in the obvious variant.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
    Map(ValueMap),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&ValueMap> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check that the value survives a JSON round trip unchanged: numbers
    /// are finite and nesting stays within [`MAX_VALUE_DEPTH`].
    pub fn check(&self) -> Result<(), String> {
        self.check_within(MAX_VALUE_DEPTH)
    }

    fn check_within(&self, remaining: usize) -> Result<(), String> {
        match self {
            Value::Number(n) if !n.is_finite() => Err(format!("non-finite number {}", n)),
            Value::List(_) | Value::Map(_) if remaining == 0 => Err(format!(
                "nested deeper than {} levels",
                MAX_VALUE_DEPTH
            )),
            Value::List(items) => items.iter().try_for_each(|v| v.check_within(remaining - 1)),
            Value::Map(map) => map.values().try_for_each(|v| v.check_within(remaining - 1)),
            _ => Ok(()),
        }
    }

    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::List(_) => "sequence",
            Value::Map(_) => "mapping",
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(l: Vec<Value>) -> Self {
        Value::List(l)
    }
}

impl From<ValueMap> for Value {
    fn from(m: ValueMap) -> Self {
        Value::Map(m)
    }
}
