//! msgpack-rpc message codec.
//!
//! # Wire Format
//!
//! ```text
//! request       [0, msgid, method, params]
//! response      [1, msgid, error, result]
//! notification  [2, method, params]
//! ```
//!
//! Remote handles travel as msgpack ext values whose type code is the
//! handle kind and whose payload is the msgpack encoding of the identity.

use std::collections::BTreeMap;
use std::io::{Cursor, ErrorKind};

use rmpv::Value as Wire;

use crate::error::{Error, Result};
use crate::handle::{Handle, HandleKind};
use crate::value::Value;

const REQUEST: u64 = 0;
const RESPONSE: u64 = 1;
const NOTIFICATION: u64 = 2;

/// A decoded message, tagged by direction and correlation.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request {
        id: u32,
        method: String,
        args: Vec<Value>,
    },
    /// `outcome` is `Err(payload)` when the remote reported an error.
    Response {
        id: u32,
        outcome: std::result::Result<Value, Value>,
    },
    Notification {
        event: String,
        args: Vec<Value>,
    },
}

impl Message {
    /// Short description for log lines.
    pub fn describe(&self) -> String {
        match self {
            Message::Request { id, method, .. } => format!("request {} ({})", id, method),
            Message::Response { id, outcome } => format!(
                "response {} ({})",
                id,
                if outcome.is_ok() { "ok" } else { "error" }
            ),
            Message::Notification { event, .. } => format!("notification {}", event),
        }
    }
}

/// Serialize a message to bytes.
pub fn encode(message: &Message) -> Result<Vec<u8>> {
    let wire = match message {
        Message::Request { id, method, args } => Wire::Array(vec![
            Wire::from(REQUEST),
            Wire::from(*id),
            Wire::from(method.as_str()),
            Wire::Array(args.iter().map(to_wire).collect::<Result<_>>()?),
        ]),
        Message::Response { id, outcome } => {
            let (error, result) = match outcome {
                Ok(value) => (Wire::Nil, to_wire(value)?),
                Err(payload) => (to_wire(payload)?, Wire::Nil),
            };
            Wire::Array(vec![Wire::from(RESPONSE), Wire::from(*id), error, result])
        }
        Message::Notification { event, args } => Wire::Array(vec![
            Wire::from(NOTIFICATION),
            Wire::from(event.as_str()),
            Wire::Array(args.iter().map(to_wire).collect::<Result<_>>()?),
        ]),
    };

    let mut buf = Vec::new();
    rmpv::encode::write_value(&mut buf, &wire).map_err(|e| Error::Encode(e.to_string()))?;
    Ok(buf)
}

/// Try to decode one message from the front of `bytes`.
///
/// Returns `Ok(None)` when `bytes` holds only part of a message, and the
/// number of bytes consumed otherwise.
pub fn decode(bytes: &[u8]) -> Result<Option<(Message, usize)>> {
    let mut cursor = Cursor::new(bytes);
    let wire = match rmpv::decode::read_value(&mut cursor) {
        Ok(wire) => wire,
        Err(err) => {
            return match err {
                rmpv::decode::Error::InvalidMarkerRead(io) | rmpv::decode::Error::InvalidDataRead(io)
                    if io.kind() == ErrorKind::UnexpectedEof =>
                {
                    Ok(None)
                }
                other => Err(Error::Protocol(format!("Undecodable msgpack: {}", other))),
            };
        }
    };

    let consumed = usize::try_from(cursor.position())
        .map_err(|_| Error::Protocol("Message length overflows usize".to_string()))?;
    Ok(Some((message_from_wire(wire)?, consumed)))
}

fn message_from_wire(wire: Wire) -> Result<Message> {
    let items = match wire {
        Wire::Array(items) => items,
        other => {
            return Err(Error::Protocol(format!(
                "Expected message array, got {}",
                other
            )))
        }
    };

    let kind = items
        .first()
        .and_then(Wire::as_u64)
        .ok_or_else(|| Error::Protocol("Message type must be an integer".to_string()))?;

    let mut items = items.into_iter().skip(1);
    match (kind, items.len()) {
        (REQUEST, 3) => {
            let id = msgid(items.next())?;
            let method = name(items.next(), "method")?;
            let args = params(items.next())?;
            Ok(Message::Request { id, method, args })
        }
        (RESPONSE, 3) => {
            let id = msgid(items.next())?;
            let error = from_wire(items.next().unwrap_or(Wire::Nil))?;
            let result = from_wire(items.next().unwrap_or(Wire::Nil))?;
            let outcome = if error.is_nil() { Ok(result) } else { Err(error) };
            Ok(Message::Response { id, outcome })
        }
        (NOTIFICATION, 2) => {
            let event = name(items.next(), "event")?;
            let args = params(items.next())?;
            Ok(Message::Notification { event, args })
        }
        (REQUEST | RESPONSE | NOTIFICATION, len) => Err(Error::Protocol(format!(
            "Message type {} has {} fields",
            kind,
            len + 1
        ))),
        _ => Err(Error::Protocol(format!("Unknown message type {}", kind))),
    }
}

fn msgid(wire: Option<Wire>) -> Result<u32> {
    wire.as_ref()
        .and_then(Wire::as_u64)
        .and_then(|id| u32::try_from(id).ok())
        .ok_or_else(|| Error::Protocol("Invalid msgid".to_string()))
}

fn name(wire: Option<Wire>, field: &str) -> Result<String> {
    match wire {
        Some(Wire::String(s)) => s
            .into_str()
            .ok_or_else(|| Error::Protocol(format!("{} name is not valid UTF-8", field))),
        _ => Err(Error::Protocol(format!("{} name must be a string", field))),
    }
}

fn params(wire: Option<Wire>) -> Result<Vec<Value>> {
    match wire {
        Some(Wire::Array(items)) => items.into_iter().map(from_wire).collect(),
        _ => Err(Error::Protocol("params must be an array".to_string())),
    }
}

fn to_wire(value: &Value) -> Result<Wire> {
    Ok(match value {
        Value::Nil => Wire::Nil,
        Value::Boolean(b) => Wire::Boolean(*b),
        Value::Integer(i) => Wire::from(*i),
        Value::Float(x) => Wire::F64(*x),
        Value::String(s) => Wire::from(s.as_str()),
        Value::Binary(bytes) => Wire::Binary(bytes.clone()),
        Value::Array(items) => Wire::Array(items.iter().map(to_wire).collect::<Result<_>>()?),
        Value::Map(map) => Wire::Map(
            map.iter()
                .map(|(k, v)| Ok((Wire::from(k.as_str()), to_wire(v)?)))
                .collect::<Result<_>>()?,
        ),
        Value::Handle(h) => {
            let mut payload = Vec::new();
            rmpv::encode::write_value(&mut payload, &Wire::from(h.id()))
                .map_err(|e| Error::Encode(e.to_string()))?;
            Wire::Ext(h.kind().ext_type(), payload)
        }
    })
}

fn from_wire(wire: Wire) -> Result<Value> {
    Ok(match wire {
        Wire::Nil => Value::Nil,
        Wire::Boolean(b) => Value::Boolean(b),
        Wire::Integer(i) => Value::Integer(
            i.as_i64()
                .ok_or_else(|| Error::Protocol(format!("Integer {} out of range", i)))?,
        ),
        Wire::F32(x) => Value::Float(f64::from(x)),
        Wire::F64(x) => Value::Float(x),
        // Buffer contents are not guaranteed to be UTF-8.
        Wire::String(s) => match String::from_utf8(s.into_bytes()) {
            Ok(text) => Value::String(text),
            Err(err) => Value::Binary(err.into_bytes()),
        },
        Wire::Binary(bytes) => Value::Binary(bytes),
        Wire::Array(items) => Value::Array(items.into_iter().map(from_wire).collect::<Result<_>>()?),
        Wire::Map(pairs) => {
            let mut map = BTreeMap::new();
            for (key, item) in pairs {
                let key = match key {
                    Wire::String(s) => s
                        .into_str()
                        .ok_or_else(|| Error::Protocol("Map key is not valid UTF-8".to_string()))?,
                    other => {
                        return Err(Error::Protocol(format!(
                            "Map key must be a string, got {}",
                            other
                        )))
                    }
                };
                map.insert(key, from_wire(item)?);
            }
            Value::Map(map)
        }
        Wire::Ext(code, payload) => {
            let kind = HandleKind::from_ext_type(code)
                .ok_or_else(|| Error::Protocol(format!("Unknown ext type {}", code)))?;
            let id = rmpv::decode::read_value(&mut Cursor::new(payload.as_slice()))
                .ok()
                .and_then(|inner| inner.as_i64())
                .ok_or_else(|| Error::Protocol(format!("Invalid {} handle payload", kind)))?;
            Value::Handle(Handle::new(kind, id))
        }
    })
}
