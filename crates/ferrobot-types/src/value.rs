//! [`Value`] – the runtime-polymorphic value carried by command parameters,
//! command results and event payloads.
//!
//! | Variant | JSON form |
//! |---|---|
//! | [`Value::Null`] | `null` |
//! | [`Value::Bool`] | `true` / `false` |
//! | [`Value::Int`] | integer number |
//! | [`Value::Float`] | floating point number (non-finite values become `null`) |
//! | [`Value::String`] | string |
//! | [`Value::Bytes`] | array of numbers `0..=255` |
//! | [`Value::List`] | array |
//! | [`Value::Map`] | object |

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::FerroError;

/// Dynamically typed value exchanged between user code, drivers and the API.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// `true` for `List` and `Map`.
    pub fn is_compound(&self) -> bool {
        matches!(self, Value::List(_) | Value::Map(_))
    }

    /// Numeric view; integers widen, numeric strings are parsed.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Integer view; floats are accepted only when they carry no fraction,
    /// numeric strings are parsed.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            Value::String(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean view; accepts `"true"`/`"false"` strings and `0`/`1`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(0) => Some(false),
            Value::Int(1) => Some(true),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
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

    /// Convert into a [`serde_json::Value`].
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as J;
        match self {
            Value::Null => J::Null,
            Value::Bool(b) => J::Bool(*b),
            Value::Int(i) => J::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f).map_or(J::Null, J::Number),
            Value::String(s) => J::String(s.clone()),
            Value::Bytes(b) => J::Array(b.iter().map(|byte| J::from(*byte)).collect()),
            Value::List(l) => J::Array(l.iter().map(Value::to_json).collect()),
            Value::Map(m) => J::Object(m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()),
        }
    }

    /// Build a `Value::Map` from `(key, value)` pairs.
    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        use serde_json::Value as J;
        match json {
            J::Null => Value::Null,
            J::Bool(b) => Value::Bool(b),
            J::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            J::String(s) => Value::String(s),
            J::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
            J::Object(obj) => Value::Map(obj.into_iter().map(|(k, v)| (k, Value::from(v))).collect()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Int(i64::from(v))
            }
        })*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Value::List(v.into_iter().map(Value::String).collect())
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Value::Map(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

// ---------------------------------------------------------------------------
// Params
// ---------------------------------------------------------------------------

/// Command parameters: a name → value mapping.
pub type Params = BTreeMap<String, Value>;

/// Typed extraction helpers for [`Params`].
///
/// Every `require_*` method fails with [`FerroError::Command`] when the key is
/// missing or its value cannot be coerced.
pub trait ParamsExt {
    fn require(&self, key: &str) -> Result<&Value, FerroError>;
    fn require_f64(&self, key: &str) -> Result<f64, FerroError>;
    fn require_i64(&self, key: &str) -> Result<i64, FerroError>;
    fn require_str(&self, key: &str) -> Result<&str, FerroError>;
    fn require_bool(&self, key: &str) -> Result<bool, FerroError>;
}

impl ParamsExt for Params {
    fn require(&self, key: &str) -> Result<&Value, FerroError> {
        self.get(key)
            .ok_or_else(|| FerroError::Command(format!("missing parameter '{key}'")))
    }

    fn require_f64(&self, key: &str) -> Result<f64, FerroError> {
        let v = self.require(key)?;
        v.as_f64().ok_or_else(|| mistyped(key, "number", v))
    }

    fn require_i64(&self, key: &str) -> Result<i64, FerroError> {
        let v = self.require(key)?;
        v.as_i64().ok_or_else(|| mistyped(key, "integer", v))
    }

    fn require_str(&self, key: &str) -> Result<&str, FerroError> {
        let v = self.require(key)?;
        v.as_str().ok_or_else(|| mistyped(key, "string", v))
    }

    fn require_bool(&self, key: &str) -> Result<bool, FerroError> {
        let v = self.require(key)?;
        v.as_bool().ok_or_else(|| mistyped(key, "boolean", v))
    }
}

fn mistyped(key: &str, expected: &str, got: &Value) -> FerroError {
    FerroError::Command(format!("parameter '{key}' must be a {expected}, got {got}"))
}
