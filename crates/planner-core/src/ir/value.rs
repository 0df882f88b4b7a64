//! Runtime values shared by literals, the evaluator, and the vault.

use std::collections::BTreeMap;
use std::fmt;

/// A resolved or literal value (spec §3 "Literal").
///
/// `Object` uses a `BTreeMap` rather than a `HashMap` for object literals so
/// that serialization is key-sorted by construction (spec §6 "map-typed
/// fields must serialize in sorted key order"), not by a serializer option
/// a future refactor could silently drop.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Value {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Duration(std::time::Duration),
    Null,
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Truthiness (spec §4.4): booleans as themselves; numerics != 0;
    /// non-empty strings; non-nil collections; null is false.
    #[must_use]
    pub fn truthy(&self) -> bool {
        match self {
            Self::String(s) => !s.is_empty(),
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Bool(b) => *b,
            Self::Duration(d) => !d.is_zero(),
            Self::Null => false,
            Self::Array(items) => !items.is_empty(),
            Self::Object(fields) => !fields.is_empty(),
        }
    }

    /// String form used for regex pattern-matching against a scrutinee
    /// (spec §4.4 "regex -> string-match against scrutinee string form").
    #[must_use]
    pub fn as_match_string(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "String",
            Self::Int(_) => "Int",
            Self::Float(_) => "Float",
            Self::Bool(_) => "Bool",
            Self::Duration(_) => "Duration",
            Self::Null => "Null",
            Self::Array(_) => "Array",
            Self::Object(_) => "Object",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Duration(d) => write!(f, "{}s", d.as_secs_f64()),
            Self::Null => f.write_str(""),
            Self::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Object(fields) => {
                write!(f, "{{")?;
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}
