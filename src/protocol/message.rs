//! Reply line parsing
//!
//! Line format: `<TYPE>[,<slot>][:<payload>]`
//! - `ACK`, `ERR` - no payload
//! - `ID:<model>,<mac>,<ip>,<protocol>,<version>,<rssi>`
//! - `INFO:<key>,<value>` - one line per key, value may contain `:`
//! - `CHN,<slot>:<feature>,<value>` - unsolicited notification
//! - `GET,<slot>:...`, `SET,<slot>:...` and unknown types - feature reply
//!
//! Only the first `:` separates type from payload.

use crate::codec::value::{self, Value};
use crate::error::{Result, WmpError};
use crate::protocol::Feature;
use serde::Serialize;

/// Identity reply (`ID:...`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceIdentity {
    pub model: String,
    pub mac: String,
    pub ip: String,
    pub protocol: String,
    pub version: String,
    pub rssi: String,
}

impl DeviceIdentity {
    /// Signal strength in dBm, if numeric
    pub fn rssi_dbm(&self) -> Option<i32> {
        self.rssi.parse().ok()
    }
}

/// A feature token with its wire value and decoded application value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureValue {
    pub feature: Feature,
    pub wire: String,
    pub value: Value,
}

impl FeatureValue {
    /// Decode `wire` according to the feature's scaling rule
    pub fn decode(feature: Feature, wire: &str) -> Result<Self> {
        let value = value::decode(&feature, wire)?;
        Ok(Self {
            feature,
            wire: wire.to_string(),
            value,
        })
    }
}

/// A feature value reported by the device, with the slot it refers to
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureReport {
    pub slot: Option<u16>,
    #[serde(flatten)]
    pub value: FeatureValue,
}

/// One parsed reply line
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseMessage {
    /// `ACK`
    Acknowledge,
    /// `ERR`
    Error,
    /// `ID:...`
    Identity(DeviceIdentity),
    /// One `INFO:<key>,<value>` line
    Info { key: String, value: String },
    /// `CHN,<slot>:<feature>,<value>` - never answers a command
    Notification(FeatureReport),
    /// Any other type carrying `<feature>,<value>`, type kept verbatim
    FeatureReply { kind: String, report: FeatureReport },
}

impl ResponseMessage {
    /// Message type token
    pub fn kind(&self) -> &str {
        match self {
            Self::Acknowledge => "ACK",
            Self::Error => "ERR",
            Self::Identity(_) => "ID",
            Self::Info { .. } => "INFO",
            Self::Notification(_) => "CHN",
            Self::FeatureReply { kind, .. } => kind,
        }
    }

    pub fn is_notification(&self) -> bool {
        matches!(self, Self::Notification(_))
    }

    pub fn is_info(&self) -> bool {
        matches!(self, Self::Info { .. })
    }
}

/// Parse one reply line
///
/// Returns `Parse` for a missing or malformed payload and `ValueDecode`
/// for a non-numeric temperature. Callers drop such lines.
pub fn parse_line(line: &str) -> Result<ResponseMessage> {
    let line = line.trim();
    let (head, payload) = match line.split_once(':') {
        Some((head, payload)) => (head, Some(payload.trim()).filter(|p| !p.is_empty())),
        None => (line, None),
    };
    let (kind, qualifier) = match head.split_once(',') {
        Some((kind, qualifier)) => (kind.trim(), Some(qualifier.trim())),
        None => (head.trim(), None),
    };

    let fail = |reason: &str| WmpError::Parse {
        line: line.to_string(),
        reason: reason.to_string(),
    };

    match kind {
        "" => Err(fail("empty message type")),
        "ACK" => Ok(ResponseMessage::Acknowledge),
        "ERR" => Ok(ResponseMessage::Error),
        "ID" => {
            let payload = payload.ok_or_else(|| fail("missing identity payload"))?;
            let fields: Vec<&str> = payload.split(',').map(str::trim).collect();
            let [model, mac, ip, protocol, version, rssi] = fields[..] else {
                return Err(fail("identity needs 6 fields"));
            };
            Ok(ResponseMessage::Identity(DeviceIdentity {
                model: model.to_string(),
                mac: mac.to_string(),
                ip: ip.to_string(),
                protocol: protocol.to_string(),
                version: version.to_string(),
                rssi: rssi.to_string(),
            }))
        }
        "INFO" => {
            let payload = payload.ok_or_else(|| fail("missing info payload"))?;
            let (key, value) = payload
                .split_once(',')
                .ok_or_else(|| fail("info needs key,value"))?;
            Ok(ResponseMessage::Info {
                key: key.trim().to_string(),
                value: value.trim().to_string(),
            })
        }
        _ => {
            let payload = payload.ok_or_else(|| fail("missing feature payload"))?;
            let (feature, wire) = payload
                .split_once(',')
                .ok_or_else(|| fail("feature needs feature,value"))?;
            let slot = qualifier
                .map(|q| q.parse::<u16>().map_err(|_| fail("invalid slot")))
                .transpose()?;
            let report = FeatureReport {
                slot,
                value: FeatureValue::decode(Feature::from_token(feature), wire.trim())?,
            };

            if kind == "CHN" {
                Ok(ResponseMessage::Notification(report))
            } else {
                Ok(ResponseMessage::FeatureReply {
                    kind: kind.to_string(),
                    report,
                })
            }
        }
    }
}
