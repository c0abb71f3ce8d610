//! The remote's self-description, as returned by `nvim_get_api_info`.
//!
//! Used to check the static method tables against what a running editor
//! actually offers.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::api::all_methods;
use crate::error::{Error, Result};
use crate::handle::HandleKind;
use crate::value::Value;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Version {
    pub major: i64,
    pub minor: i64,
    pub patch: i64,
    pub api_level: i64,
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{} (api {})", self.major, self.minor, self.patch, self.api_level)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionInfo {
    pub name: String,
    /// `(type, name)` pairs.
    pub parameters: Vec<(String, String)>,
    pub return_type: String,
    /// True when the first parameter is the receiver handle.
    pub method: bool,
    pub deprecated_since: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiInfo {
    pub channel_id: i64,
    pub version: Option<Version>,
    pub functions: Vec<FunctionInfo>,
    /// Handle type name to msgpack ext type code.
    pub handle_types: BTreeMap<String, i64>,
}

impl ApiInfo {
    /// Parse the `[channel_id, metadata]` pair.
    pub fn parse(value: &Value) -> Result<Self> {
        let (channel, metadata) = match value.as_array() {
            Some([channel, metadata]) => (channel, metadata),
            _ => return Err(Error::unexpected("[channel_id, metadata]", value)),
        };
        let channel_id = channel
            .as_i64()
            .ok_or_else(|| Error::unexpected("integer channel id", channel))?;

        let version = metadata.get("version").map(parse_version);

        let functions = match metadata.get("functions") {
            Some(Value::Array(items)) => items.iter().map(parse_function).collect::<Result<_>>()?,
            Some(other) => return Err(Error::unexpected("function list", other)),
            None => Vec::new(),
        };

        let mut handle_types = BTreeMap::new();
        if let Some(types) = metadata.get("types").and_then(Value::as_map) {
            for (name, info) in types {
                if let Some(id) = info.get("id").and_then(Value::as_i64) {
                    handle_types.insert(name.clone(), id);
                }
            }
        }

        Ok(Self {
            channel_id,
            version,
            functions,
            handle_types,
        })
    }

    pub fn function(&self, name: &str) -> Option<&FunctionInfo> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Catalogue methods the remote does not advertise.
    pub fn missing_methods(&self) -> Vec<&'static str> {
        all_methods()
            .map(|spec| spec.name)
            .filter(|name| self.function(name).is_none())
            .collect()
    }

    /// Fail unless the remote encodes handles with the ext codes we decode.
    pub fn check_handle_types(&self) -> Result<()> {
        for kind in HandleKind::ALL {
            match self.handle_types.get(kind.name()) {
                Some(&id) if id == i64::from(kind.ext_type()) => {}
                Some(&id) => {
                    return Err(Error::Protocol(format!(
                        "Remote encodes {} as ext type {}, expected {}",
                        kind,
                        id,
                        kind.ext_type()
                    )))
                }
                None => {
                    return Err(Error::Protocol(format!(
                        "Remote metadata does not describe the {} type",
                        kind
                    )))
                }
            }
        }
        Ok(())
    }
}

fn parse_version(value: &Value) -> Version {
    let field = |key: &str| value.get(key).and_then(Value::as_i64).unwrap_or(0);
    Version {
        major: field("major"),
        minor: field("minor"),
        patch: field("patch"),
        api_level: field("api_level"),
    }
}

fn parse_function(value: &Value) -> Result<FunctionInfo> {
    let name = value
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::unexpected("function with a name", value))?;

    let parameters = value
        .get("parameters")
        .and_then(Value::as_array)
        .unwrap_or_default()
        .iter()
        .filter_map(|param| match param.as_array() {
            Some([ty, name]) => Some((ty.as_str()?.to_string(), name.as_str()?.to_string())),
            _ => None,
        })
        .collect();

    Ok(FunctionInfo {
        name: name.to_string(),
        parameters,
        return_type: value
            .get("return_type")
            .and_then(Value::as_str)
            .unwrap_or("void")
            .to_string(),
        method: value.get("method").and_then(Value::as_bool).unwrap_or(false),
        deprecated_since: value.get("deprecated_since").and_then(Value::as_i64),
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn map(entries: Vec<(&str, Value)>) -> Value {
        Value::Map(entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    fn function(name: &str, params: &[(&str, &str)], method: bool) -> Value {
        map(vec![
            ("name", Value::from(name)),
            (
                "parameters",
                Value::Array(
                    params
                        .iter()
                        .map(|(ty, n)| Value::Array(vec![Value::from(*ty), Value::from(*n)]))
                        .collect(),
                ),
            ),
            ("return_type", Value::from("Object")),
            ("method", Value::from(method)),
        ])
    }

    fn handle_types(buffer: i64) -> Value {
        map(vec![
            ("Buffer", map(vec![("id", Value::Integer(buffer)), ("prefix", Value::from("nvim_buf_"))])),
            ("Window", map(vec![("id", Value::Integer(1)), ("prefix", Value::from("nvim_win_"))])),
            ("Tabpage", map(vec![("id", Value::Integer(2)), ("prefix", Value::from("nvim_tabpage_"))])),
        ])
    }

    fn sample(buffer_type: i64) -> Value {
        Value::Array(vec![
            Value::Integer(3),
            map(vec![
                (
                    "version",
                    map(vec![
                        ("major", Value::Integer(0)),
                        ("minor", Value::Integer(9)),
                        ("patch", Value::Integer(5)),
                        ("api_level", Value::Integer(11)),
                    ]),
                ),
                (
                    "functions",
                    Value::Array(vec![
                        function("nvim_eval", &[("String", "expr")], false),
                        function(
                            "nvim_buf_get_lines",
                            &[
                                ("Buffer", "buffer"),
                                ("Integer", "start"),
                                ("Integer", "end"),
                                ("Boolean", "strict_indexing"),
                            ],
                            true,
                        ),
                    ]),
                ),
                ("types", handle_types(buffer_type)),
            ]),
        ])
    }

    #[test]
    fn test_parse() {
        let info = ApiInfo::parse(&sample(0)).unwrap();
        assert_eq!(info.channel_id, 3);
        assert_eq!(info.version.as_ref().map(ToString::to_string), Some("0.9.5 (api 11)".to_string()));
        assert_eq!(info.functions.len(), 2);

        let get_lines = info.function("nvim_buf_get_lines").unwrap();
        assert!(get_lines.method);
        assert_eq!(get_lines.parameters[0], ("Buffer".to_string(), "buffer".to_string()));
        assert_eq!(get_lines.deprecated_since, None);
        assert!(info.check_handle_types().is_ok());
    }

    #[test]
    fn test_missing_methods() {
        let info = ApiInfo::parse(&sample(0)).unwrap();
        let missing = info.missing_methods();
        assert!(!missing.contains(&"nvim_eval"));
        assert!(!missing.contains(&"nvim_buf_get_lines"));
        assert!(missing.contains(&"nvim_command"));
    }

    #[test]
    fn test_mismatched_handle_types() {
        let info = ApiInfo::parse(&sample(7)).unwrap();
        match info.check_handle_types() {
            Err(Error::Protocol(msg)) => assert!(msg.contains("Buffer"), "{}", msg),
            other => panic!("Expected Protocol error, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_wrong_shape() {
        assert!(ApiInfo::parse(&Value::Integer(1)).is_err());
        assert!(ApiInfo::parse(&Value::Array(vec![Value::from("x"), Value::Nil])).is_err());
    }
}
