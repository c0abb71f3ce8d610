//! Values exchanged with the remote process.
//!
//! Arguments and results are restricted to this tagged union. Encoding it to
//! bytes is the codec's job (`rpc::codec`); nothing else in the crate looks at
//! the wire representation.

use std::collections::BTreeMap;
use std::fmt;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::rpc::Session;

/// A remote value, recursively composed of primitives, containers and handles.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Nil,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Binary(Vec<u8>),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Handle(Handle),
}

impl Value {
    /// Short type name, used in conversion errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Binary(_) => "binary",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Handle(_) => "handle",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_handle(&self) -> Option<Handle> {
        match self {
            Value::Handle(h) => Some(*h),
            _ => None,
        }
    }

    /// Look up a key when this value is a map.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|map| map.get(key))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
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

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::String(s.clone())
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Binary(bytes)
    }
}

impl From<Handle> for Value {
    fn from(h: Handle) -> Self {
        Value::Handle(h)
    }
}

impl From<(i64, i64)> for Value {
    fn from((a, b): (i64, i64)) -> Self {
        Value::Array(vec![Value::Integer(a), Value::Integer(b)])
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<Vec<String>> for Value {
    fn from(items: Vec<String>) -> Self {
        Value::Array(items.into_iter().map(Value::String).collect())
    }
}

impl From<&[&str]> for Value {
    fn from(items: &[&str]) -> Self {
        Value::Array(items.iter().map(|s| Value::from(*s)).collect())
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Value::Map(map)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Value::Nil)
    }
}

/// JSON input, as accepted by the command line. Integers that fit `i64`
/// stay integers; other numbers become floats.
impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Nil,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("nil"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Binary(bytes) => write!(f, "<{} bytes>", bytes.len()),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Map(map) => {
                f.write_str("{")?;
                for (i, (key, item)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{:?}: {}", key, item)?;
                }
                f.write_str("}")
            }
            Value::Handle(h) => write!(f, "{}", h),
        }
    }
}

/// JSON-friendly rendering. Handles become `{"kind": .., "id": ..}`.
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Nil => serializer.serialize_unit(),
            Value::Boolean(b) => serializer.serialize_bool(*b),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Float(x) => serializer.serialize_f64(*x),
            Value::String(s) => serializer.serialize_str(s),
            Value::Binary(bytes) => serializer.serialize_bytes(bytes),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (key, item) in map {
                    out.serialize_entry(key, item)?;
                }
                out.end()
            }
            Value::Handle(h) => {
                let mut out = serializer.serialize_map(Some(2))?;
                out.serialize_entry("kind", h.kind().name())?;
                out.serialize_entry("id", &h.id())?;
                out.end()
            }
        }
    }
}

/// Conversion from a decoded result into the type a facade method returns.
///
/// The session is passed along so that handle results can become proxies
/// bound to the connection they arrived on.
pub trait FromValue: Sized {
    fn from_value(value: Value, session: &Session) -> Result<Self>;
}

impl FromValue for Value {
    fn from_value(value: Value, _: &Session) -> Result<Self> {
        Ok(value)
    }
}

/// Void methods answer with nil; whatever comes back is discarded.
impl FromValue for () {
    fn from_value(_: Value, _: &Session) -> Result<Self> {
        Ok(())
    }
}

impl FromValue for bool {
    fn from_value(value: Value, _: &Session) -> Result<Self> {
        match value {
            Value::Boolean(b) => Ok(b),
            other => Err(Error::unexpected("boolean", &other)),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: Value, _: &Session) -> Result<Self> {
        match value {
            Value::Integer(i) => Ok(i),
            other => Err(Error::unexpected("integer", &other)),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: Value, _: &Session) -> Result<Self> {
        value.as_f64().ok_or_else(|| Error::unexpected("float", &value))
    }
}

impl FromValue for String {
    fn from_value(value: Value, _: &Session) -> Result<Self> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(Error::unexpected("string", &other)),
        }
    }
}

impl FromValue for Handle {
    fn from_value(value: Value, _: &Session) -> Result<Self> {
        match value {
            Value::Handle(h) => Ok(h),
            other => Err(Error::unexpected("handle", &other)),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value, session: &Session) -> Result<Self> {
        match value {
            Value::Array(items) => items
                .into_iter()
                .map(|item| T::from_value(item, session))
                .collect(),
            other => Err(Error::unexpected("array", &other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_conversions() {
        assert_eq!(Value::from(true), Value::Boolean(true));
        assert_eq!(Value::from(7i64), Value::Integer(7));
        assert_eq!(Value::from("x"), Value::String("x".into()));
        assert_eq!(
            Value::from((1, 2)),
            Value::Array(vec![Value::Integer(1), Value::Integer(2)])
        );
        assert_eq!(
            Value::from(vec!["a".to_string(), "b".to_string()]),
            Value::Array(vec![Value::from("a"), Value::from("b")])
        );
        assert_eq!(Value::from(None::<i64>), Value::Nil);
    }

    #[test]
    fn test_accessors() {
        let mut map = BTreeMap::new();
        map.insert("name".to_string(), Value::from("main.rs"));
        let value = Value::Map(map);
        assert_eq!(value.get("name").and_then(Value::as_str), Some("main.rs"));
        assert_eq!(value.get("missing"), None);
        assert_eq!(Value::Integer(3).as_f64(), Some(3.0));
        assert_eq!(Value::from("3").as_i64(), None);
        assert_eq!(Value::Handle(Handle::buffer(2)).as_handle(), Some(Handle::buffer(2)));
    }

    #[test]
    fn test_from_json() {
        let value = Value::from(serde_json::json!({"n": 1, "x": 1.5, "list": [true, null, "s"]}));
        let mut expected = BTreeMap::new();
        expected.insert("n".to_string(), Value::Integer(1));
        expected.insert("x".to_string(), Value::Float(1.5));
        expected.insert(
            "list".to_string(),
            Value::Array(vec![Value::Boolean(true), Value::Nil, Value::from("s")]),
        );
        assert_eq!(value, Value::Map(expected));
    }

    #[test]
    fn test_display() {
        let value = Value::Array(vec![
            Value::Integer(1),
            Value::from("two"),
            Value::Handle(Handle::window(1000)),
            Value::Nil,
        ]);
        assert_eq!(value.to_string(), r#"[1, "two", Window(1000), nil]"#);
    }

    #[tokio::test]
    async fn test_from_value() {
        let (client, _peer) = tokio::io::duplex(64);
        let (reader, writer) = tokio::io::split(client);
        let session = crate::rpc::attach_with(writer, reader, Default::default()).unwrap();

        assert_eq!(i64::from_value(Value::Integer(4), &session).unwrap(), 4);
        assert_eq!(f64::from_value(Value::Integer(4), &session).unwrap(), 4.0);
        assert_eq!(
            Vec::<String>::from_value(Value::from(vec!["a".to_string()]), &session).unwrap(),
            vec!["a".to_string()]
        );
        assert!(<()>::from_value(Value::from("ignored"), &session).is_ok());

        match bool::from_value(Value::from("yes"), &session) {
            Err(Error::UnexpectedValue { expected, got }) => {
                assert_eq!(expected, "boolean");
                assert_eq!(got, "string");
            }
            other => panic!("Expected UnexpectedValue, got {:?}", other),
        }
        assert!(Vec::<i64>::from_value(Value::Array(vec![Value::Nil]), &session).is_err());
    }

    #[test]
    fn test_serialize_json() {
        let mut map = BTreeMap::new();
        map.insert("buf".to_string(), Value::Handle(Handle::buffer(1)));
        map.insert("lines".to_string(), Value::from(vec!["a".to_string()]));
        let json = serde_json::to_value(Value::Map(map)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "buf": {"kind": "Buffer", "id": 1},
                "lines": ["a"]
            })
        );
        assert_eq!(serde_json::to_value(Value::Nil).unwrap(), serde_json::Value::Null);
    }
}
