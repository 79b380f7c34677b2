// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Runtime values seen by templates.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// A template runtime value.
///
/// Missing variables and attributes evaluate to [`Value::Undefined`],
/// which is falsy and renders as an empty string. [`Value::Safe`] marks
/// markup that must not be escaped again.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// A name that does not resolve.
    #[default]
    Undefined,
    /// Explicit `none`.
    None,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Float.
    Float(f64),
    /// Plain text, escaped on output when autoescape is on.
    String(String),
    /// Trusted markup, never escaped.
    Safe(String),
    /// Sequence.
    List(Vec<Value>),
    /// Mapping with string keys.
    Dict(BTreeMap<String, Value>),
}

/// Result type returned by filters and functions.
///
/// The error string is wrapped into a render error naming the template.
pub type CallResult = std::result::Result<Value, String>;

impl Value {
    /// Wraps trusted markup.
    pub fn safe(s: impl Into<String>) -> Self {
        Value::Safe(s.into())
    }

    /// Converts any serializable value.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Value::from(serde_json::to_value(value)?))
    }

    /// Python-style truthiness.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) | Value::Safe(s) => !s.is_empty(),
            Value::List(l) => !l.is_empty(),
            Value::Dict(d) => !d.is_empty(),
        }
    }

    /// Whether the value is trusted markup.
    pub fn is_safe(&self) -> bool {
        matches!(self, Value::Safe(_))
    }

    /// Whether the value is undefined.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) | Value::Safe(_) => "string",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
        }
    }

    /// Borrows string content of plain or safe strings.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Safe(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view; floats are truncated and numeric strings parsed.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) => Some(*f as i64),
            Value::Bool(b) => Some(*b as i64),
            Value::String(s) | Value::Safe(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Float view; numeric strings are parsed.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(*b as i64 as f64),
            Value::String(s) | Value::Safe(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Whether the value is an int or a float.
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Length of strings, lists and dicts.
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::String(s) | Value::Safe(s) => Some(s.chars().count()),
            Value::List(l) => Some(l.len()),
            Value::Dict(d) => Some(d.len()),
            _ => None,
        }
    }

    /// Attribute lookup (`value.name`).
    pub fn get_attr(&self, name: &str) -> Value {
        match self {
            Value::Dict(d) => d.get(name).cloned().unwrap_or(Value::Undefined),
            _ => Value::Undefined,
        }
    }

    /// Subscript lookup (`value[key]`). Negative list indexes count from the end.
    pub fn get_item(&self, key: &Value) -> Value {
        match (self, key) {
            (Value::Dict(d), k) => match k.as_str() {
                Some(k) => d.get(k).cloned().unwrap_or(Value::Undefined),
                None => d.get(&k.to_string()).cloned().unwrap_or(Value::Undefined),
            },
            (Value::List(l), Value::Int(i)) => {
                let idx = if *i < 0 { l.len() as i64 + i } else { *i };
                usize::try_from(idx)
                    .ok()
                    .and_then(|i| l.get(i))
                    .cloned()
                    .unwrap_or(Value::Undefined)
            }
            (Value::String(s) | Value::Safe(s), Value::Int(i)) => {
                let count = s.chars().count() as i64;
                let idx = if *i < 0 { count + i } else { *i };
                usize::try_from(idx)
                    .ok()
                    .and_then(|i| s.chars().nth(i))
                    .map(|c| Value::String(c.to_string()))
                    .unwrap_or(Value::Undefined)
            }
            _ => Value::Undefined,
        }
    }

    /// Items produced when iterating in a `for` loop.
    ///
    /// Dicts iterate over their keys, strings over their characters.
    pub fn iter_items(&self) -> Option<Vec<Value>> {
        match self {
            Value::List(l) => Some(l.clone()),
            Value::Dict(d) => Some(d.keys().cloned().map(Value::String).collect()),
            Value::String(s) | Value::Safe(s) => {
                Some(s.chars().map(|c| Value::String(c.to_string())).collect())
            }
            Value::Undefined | Value::None => Some(Vec::new()),
            _ => None,
        }
    }

    /// Loose equality: ints and floats compare numerically, safe and plain
    /// strings compare by content.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
            (a, b) if a.as_str().is_some() && b.as_str().is_some() => a.as_str() == b.as_str(),
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined | Value::None => Ok(()),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) if v.is_finite() && v.fract() == 0.0 => write!(f, "{:.1}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(s) | Value::Safe(s) => f.write_str(s),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    match item {
                        Value::String(s) | Value::Safe(s) => write!(f, "'{}'", s)?,
                        other => write!(f, "{}", other)?,
                    }
                }
                f.write_str("]")
            }
            Value::Dict(map) => {
                f.write_str("{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "'{}': {}", k, v)?;
                }
                f.write_str("}")
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::{SerializeMap, SerializeSeq};

        match self {
            Value::Undefined | Value::None => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::String(s) | Value::Safe(s) => serializer.serialize_str(s),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Dict(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (key, value) in map {
                    out.serialize_entry(key, value)?;
                }
                out.end()
            }
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::None,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(0.0)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(a) => Value::List(a.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(o) => {
                Value::Dict(o.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
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

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<Vec<Value>> for Value {
    fn from(l: Vec<Value>) -> Self {
        Value::List(l)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(d: BTreeMap<String, Value>) -> Self {
        Value::Dict(d)
    }
}

/// Arguments passed to a filter or function call.
#[derive(Debug, Clone, Default)]
pub struct Args {
    /// Positional arguments in call order.
    pub positional: Vec<Value>,
    /// Keyword arguments.
    pub kwargs: BTreeMap<String, Value>,
}

impl Args {
    /// Creates positional-only arguments.
    pub fn new(positional: Vec<Value>) -> Self {
        Self {
            positional,
            kwargs: BTreeMap::new(),
        }
    }

    /// Looks an argument up by keyword first, then by position.
    pub fn get(&self, index: usize, name: &str) -> Option<&Value> {
        self.kwargs
            .get(name)
            .or_else(|| self.positional.get(index))
            .filter(|v| !v.is_undefined())
    }

    /// String argument with a default.
    pub fn str_or<'a>(&'a self, index: usize, name: &str, default: &'a str) -> String {
        self.get(index, name)
            .map(|v| v.to_string())
            .unwrap_or_else(|| default.to_string())
    }

    /// Integer argument with a default.
    pub fn int_or(&self, index: usize, name: &str, default: i64) -> i64 {
        self.get(index, name).and_then(Value::as_i64).unwrap_or(default)
    }
}
