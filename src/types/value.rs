//! Row payload representation.
use std::fmt;

use serde::{Deserialize, Serialize};

/// Typed payload carried by node, prop, alias, name and edge rows.
///
/// Equality is identity of the stored payload: floats compare by bit
/// pattern, so `NaN == NaN` and `0.0 != -0.0`. Compare-and-set relies on a
/// value always equalling itself.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Value {
    /// No payload.
    Null,
    /// Boolean payload.
    Bool(bool),
    /// Signed 64-bit integer; the only kind `increment` accepts.
    Int(i64),
    /// 64-bit floating point payload.
    Float(f64),
    /// UTF-8 string payload.
    Str(String),
    /// Opaque bytes.
    Bytes(Vec<u8>),
    /// Structured document.
    Json(serde_json::Value),
}

/// Declared payload kind of a row context.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    /// Rows carry no payload.
    Null,
    /// Boolean rows.
    Bool,
    /// Integer rows.
    Int,
    /// Float rows.
    Float,
    /// String rows.
    Str,
    /// Byte rows.
    Bytes,
    /// Document rows.
    Json,
}

impl Value {
    /// The kind of this payload.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Str(_) => ValueKind::Str,
            Value::Bytes(_) => ValueKind::Bytes,
            Value::Json(_) => ValueKind::Json,
        }
    }

    /// Integer payload, if this is one.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// String payload, if this is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Document payload, if this is one.
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Value::Json(v) => Some(v),
            _ => None,
        }
    }

    /// Whether this is [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl ValueKind {
    /// Payload a freshly constructed row of this kind starts with.
    pub fn default_value(self) -> Value {
        match self {
            ValueKind::Null => Value::Null,
            ValueKind::Bool => Value::Bool(false),
            ValueKind::Int => Value::Int(0),
            ValueKind::Float => Value::Float(0.0),
            ValueKind::Str => Value::Str(String::new()),
            ValueKind::Bytes => Value::Bytes(Vec::new()),
            ValueKind::Json => Value::Json(serde_json::Value::Object(Default::default())),
        }
    }

    /// Whether `value` may be stored under this kind. `Null` is always accepted.
    pub fn admits(self, value: &Value) -> bool {
        value.is_null() || value.kind() == self
    }

    /// Short lowercase label used in errors.
    pub fn as_str(self) -> &'static str {
        match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Str => "str",
            ValueKind::Bytes => "bytes",
            ValueKind::Json => "json",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Json(a), Value::Json(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(v) => write!(f, "{v}"),
            Value::Bytes(v) => write!(f, "bytes(len={})", v.len()),
            Value::Json(v) => write!(f, "{v}"),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Value::Json(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_serde_shape() {
        let encoded = serde_json::to_string(&Value::Int(7)).expect("encode");
        assert_eq!(encoded, r#"{"t":"Int","v":7}"#);
        let decoded: Value = serde_json::from_str(r#"{"t":"Str","v":"x"}"#).expect("decode");
        assert_eq!(decoded, Value::Str("x".into()));
    }

    #[test]
    fn kinds_admit_null_and_their_own_payload() {
        assert!(ValueKind::Int.admits(&Value::Int(3)));
        assert!(ValueKind::Int.admits(&Value::Null));
        assert!(!ValueKind::Int.admits(&Value::Str("3".into())));
        assert_eq!(ValueKind::Json.default_value().kind(), ValueKind::Json);
    }

    #[test]
    fn floats_compare_by_bits() {
        assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
        assert_ne!(Value::Float(0.0), Value::Float(-0.0));
        assert_eq!(Value::Float(1.5), Value::from(1.5));
        assert_ne!(Value::Float(1.0), Value::Int(1));
    }
}
