//! Conversion between wire-level JSON and typed call arguments.
//!
//! Two decoding modes exist:
//! - **named**: parameters are looked up by name, first in the query string,
//!   then in the JSON object body (path+verb call path)
//! - **positional**: parameters are taken by index from a `{"params": [...]}`
//!   body (handle call path)
//!
//! Both share one coercion table keyed by [`ParamType`]. Booleans follow a
//! lenient rule: only the text `true` (any case) is true, everything else is
//! false rather than an error.

use crate::config::TransportConfig;
use crate::registry::{Arg, Args, ParamType, Target};
use crate::{Result, RpcError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use tracing::error;

/// Wire-level error body: `{"code", "message", "type"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub code: u16,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Where a named argument was found.
enum Source<'a> {
    Query(&'a str),
    Body(&'a Value),
    Missing,
}

/// Decodes arguments and encodes results and errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct Marshaller {
    pretty: bool,
}

impl Marshaller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marshaller that pretty-prints every JSON document it encodes.
    pub fn pretty() -> Self {
        Self { pretty: true }
    }

    // ========================================
    // Decoding
    // ========================================

    /// Decode arguments by parameter name.
    ///
    /// A query parameter wins over a body field of the same name; a parameter
    /// found in neither decodes as null. A non-empty body must be a JSON object.
    pub fn decode_named(
        &self,
        target: &Target,
        body: &str,
        query: &HashMap<String, String>,
    ) -> Result<Args> {
        let fields = if body.trim().is_empty() {
            Map::new()
        } else {
            match serde_json::from_str::<Value>(body) {
                Ok(Value::Object(fields)) => fields,
                Ok(other) => {
                    return Err(RpcError::decoding(
                        "body",
                        format!("expected a JSON object, got {}", json_type_name(&other)),
                    ))
                }
                Err(e) => return Err(RpcError::decoding("body", format!("invalid JSON: {}", e))),
            }
        };

        let names = target.param_names();
        let mut values = Vec::with_capacity(names.len());
        for (name, param) in names.iter().zip(target.params()) {
            let source = match query.get(name) {
                Some(text) => Source::Query(text),
                None => fields.get(name).map_or(Source::Missing, Source::Body),
            };
            let arg = match source {
                Source::Query(text) => coerce_text(name, text, param.ty)?,
                Source::Body(value) => coerce_value(name, value, param.ty, false)?,
                Source::Missing => Arg::Null,
            };
            values.push(arg);
        }

        Ok(Args::new(names, values))
    }

    /// Decode arguments by position from a `{"params": [...]}` body.
    pub fn decode_positional(&self, target: &Target, body: &str) -> Result<Args> {
        let request: Value = serde_json::from_str(body)
            .map_err(|e| RpcError::decoding("body", format!("invalid JSON: {}", e)))?;
        let params = request
            .get("params")
            .and_then(Value::as_array)
            .ok_or_else(|| RpcError::decoding("params", "body must contain a `params` array"))?;

        let names = target.param_names();
        let mut values = Vec::with_capacity(names.len());
        for (index, (name, param)) in names.iter().zip(target.params()).enumerate() {
            let value = params.get(index).ok_or_else(|| {
                RpcError::decoding(
                    name.as_str(),
                    format!(
                        "expected {} positional arguments, got {}",
                        names.len(),
                        params.len()
                    ),
                )
            })?;
            values.push(coerce_value(name, value, param.ty, true)?);
        }

        Ok(Args::new(names, values))
    }

    // ========================================
    // Encoding
    // ========================================

    fn to_json(&self, value: &impl Serialize) -> Result<String> {
        let encoded = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        encoded.map_err(|e| RpcError::ResponseEncoding(e.to_string()))
    }

    /// Encode a result as a bare JSON document. Null encodes as `{}`.
    pub fn encode_result(&self, value: &Value) -> Result<String> {
        if value.is_null() {
            return Ok("{}".to_string());
        }
        self.to_json(value)
    }

    /// Encode a result as `{"result": value}`. Null encodes as `{}`.
    pub fn encode_invoke_result(&self, value: &Value) -> Result<String> {
        if value.is_null() {
            return Ok("{}".to_string());
        }
        let mut wrapped = Map::new();
        wrapped.insert("result".to_string(), value.clone());
        self.to_json(&Value::Object(wrapped))
    }

    /// Encode an error envelope, falling back to a fixed body if that fails.
    pub fn encode_error(&self, code: u16, message: &str, kind: &str) -> String {
        let envelope = ErrorEnvelope {
            code,
            message: message.to_string(),
            kind: kind.to_string(),
        };
        self.to_json(&envelope).unwrap_or_else(|e| {
            error!("Error marshalling error response: {}", e);
            TransportConfig::FALLBACK_ERROR_BODY.to_string()
        })
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn unsupported(name: &str, ty: ParamType) -> RpcError {
    RpcError::UnsupportedParameterType {
        param: name.to_string(),
        ty: ty.to_string(),
    }
}

/// Coerce text (a query value or a JSON string) into the declared type.
/// Empty text decodes as null.
fn coerce_text(name: &str, text: &str, ty: ParamType) -> Result<Arg> {
    if text.is_empty() {
        return Ok(Arg::Null);
    }

    let not_a = |expected: &str| {
        RpcError::decoding(name, format!("expected {}, got `{}`", expected, text))
    };

    let arg = match ty {
        ParamType::Int => Arg::Int(text.parse().map_err(|_| not_a("an integer"))?),
        ParamType::Long => Arg::Long(text.parse().map_err(|_| not_a("an integer"))?),
        ParamType::Float => Arg::Float(text.parse().map_err(|_| not_a("a number"))?),
        ParamType::Double => Arg::Double(text.parse().map_err(|_| not_a("a number"))?),
        ParamType::Bool => Arg::Bool(text.eq_ignore_ascii_case("true")),
        ParamType::Str => Arg::Str(text.to_string()),
        ParamType::Json => return Err(unsupported(name, ty)),
    };
    Ok(arg)
}

/// Coerce a JSON value into the declared type.
///
/// `Json` parameters only pass through on the positional path; the named path
/// rejects them as unsupported.
fn coerce_value(name: &str, value: &Value, ty: ParamType, positional: bool) -> Result<Arg> {
    if value.is_null() {
        return Ok(Arg::Null);
    }

    match (ty, value) {
        (ParamType::Json, _) if positional => Ok(Arg::Json(value.clone())),
        (ParamType::Json, _) => Err(unsupported(name, ty)),
        (_, Value::Number(n)) => Ok(coerce_number(n, ty)),
        (_, Value::String(s)) => coerce_text(name, s, ty),
        (_, other) => coerce_text(name, &other.to_string(), ty),
    }
}

fn coerce_number(n: &Number, ty: ParamType) -> Arg {
    match ty {
        ParamType::Int => Arg::Int(truncate_i32(n)),
        ParamType::Long => Arg::Long(truncate_i64(n)),
        ParamType::Float => Arg::Float(n.as_f64().unwrap_or_default() as f32),
        ParamType::Double => Arg::Double(n.as_f64().unwrap_or_default()),
        // A number is never the text `true`.
        ParamType::Bool => Arg::Bool(false),
        ParamType::Str => Arg::Str(n.to_string()),
        ParamType::Json => Arg::Json(Value::Number(n.clone())),
    }
}

/// Truncate toward zero, saturating at the bounds of `i32`.
fn truncate_i32(n: &Number) -> i32 {
    match n.as_i64() {
        Some(v) => v.clamp(i32::MIN as i64, i32::MAX as i64) as i32,
        None if n.is_u64() => i32::MAX,
        None => n.as_f64().unwrap_or_default() as i32,
    }
}

/// Truncate toward zero, saturating at the bounds of `i64`.
fn truncate_i64(n: &Number) -> i64 {
    match n.as_i64() {
        Some(v) => v,
        None if n.is_u64() => i64::MAX,
        None => n.as_f64().unwrap_or_default() as i64,
    }
}
