//! Value transcoding between wire tokens and application values
//!
//! Temperature features (`SETPTEMP`, `AMBTMP`) carry integer tenths of a
//! degree on the wire: `215` <-> `21.5`. Every other feature value is an
//! opaque ASCII token passed through unchanged.

use crate::error::{Result, WmpError};
use crate::protocol::Feature;
use serde::Serialize;
use std::fmt;

/// Wire integer units per degree
const TEMPERATURE_SCALE: f64 = 10.0;

/// Application-level feature value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Decimal degrees
    Temperature(f64),
    /// Opaque wire token (e.g. `ON`, `AUTO`, `3`)
    Text(String),
}

impl Value {
    /// Degrees, if this is a temperature
    pub fn as_temperature(&self) -> Option<f64> {
        match self {
            Self::Temperature(t) => Some(*t),
            Self::Text(_) => None,
        }
    }

    /// Token, if this is an opaque value
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Temperature(_) => None,
            Self::Text(s) => Some(s),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Temperature(t) => write!(f, "{}", t),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<f64> for Value {
    fn from(t: f64) -> Self {
        Self::Temperature(t)
    }
}

/// Encode decimal degrees as wire tenths (`21.5` -> `215`)
pub fn encode_temperature(degrees: f64) -> Result<i32> {
    let scaled = (degrees * TEMPERATURE_SCALE).round();
    if !scaled.is_finite() || scaled < i32::MIN as f64 || scaled > i32::MAX as f64 {
        return Err(WmpError::ValueEncode {
            feature: "temperature".into(),
            reason: format!("{} is out of range", degrees),
        });
    }
    Ok(scaled as i32)
}

/// Decode wire tenths as decimal degrees (`215` -> `21.5`)
pub fn decode_temperature(wire: i32) -> f64 {
    wire as f64 / TEMPERATURE_SCALE
}

/// Decode the wire token of `feature`
///
/// Fails with `ValueDecode` when a temperature feature carries a
/// non-integer token.
pub fn decode(feature: &Feature, wire: &str) -> Result<Value> {
    if !feature.is_temperature() {
        return Ok(Value::Text(wire.to_string()));
    }

    wire.trim()
        .parse::<i32>()
        .map(|n| Value::Temperature(decode_temperature(n)))
        .map_err(|_| WmpError::ValueDecode {
            feature: feature.to_string(),
            value: wire.to_string(),
        })
}

/// Encode `value` into the wire token for `feature`
///
/// Temperatures are only accepted for temperature features. Text is sent
/// verbatim but must fit in one comma-separated field; for a temperature
/// feature it must already be an integer wire value.
pub fn encode(feature: &Feature, value: &Value) -> Result<String> {
    let invalid = |reason: String| WmpError::ValueEncode {
        feature: feature.to_string(),
        reason,
    };

    match value {
        Value::Temperature(degrees) if feature.is_temperature() => {
            Ok(encode_temperature(*degrees)?.to_string())
        }
        Value::Temperature(_) => Err(invalid("not a temperature feature".into())),
        Value::Text(text) => {
            if text.is_empty() {
                return Err(invalid("empty value".into()));
            }
            if !text.is_ascii() || text.contains([',', '\r', '\n']) {
                return Err(invalid(format!("{:?} is not a single ASCII field", text)));
            }
            if feature.is_temperature() && text.parse::<i32>().is_err() {
                return Err(invalid(format!("{:?} is not a wire temperature", text)));
            }
            Ok(text.clone())
        }
    }
}
