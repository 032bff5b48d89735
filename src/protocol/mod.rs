//! WMP protocol vocabulary
//!
//! Outgoing commands and the feature tokens they address.
//!
//! Command format (client -> device, LF terminated):
//! - `ID`, `INFO`, `LOGOUT`
//! - `GET,<slot>:<feature>`
//! - `SET,<slot>:<feature>,<value>`
//! - `LOGIN:<password>`
//!
//! Replies are parsed by [`message::parse_line`].

pub mod message;

pub use crate::codec::Value;
pub use message::{parse_line, DeviceIdentity, FeatureReport, FeatureValue, ResponseMessage};

use crate::constants::DEFAULT_SLOT;
use serde::{Serialize, Serializer};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// A named device parameter readable with `GET` and writable with `SET`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Feature {
    /// `ONOFF` - unit on or off
    OnOff,
    /// `MODE` - heat, cool, fan, dry or auto
    Mode,
    /// `SETPTEMP` - set-point temperature (tenths of a degree on the wire)
    SetPointTemperature,
    /// `FANSP` - fan speed
    FanSpeed,
    /// `VANEUD` - up/down vane position
    VaneUpDown,
    /// `VANELR` - left/right vane position
    VaneLeftRight,
    /// `AMBTMP` - ambient temperature (tenths of a degree on the wire)
    AmbientTemperature,
    /// `ERRSTATUS` - `OK` or `ERR`
    ErrorStatus,
    /// `ERRCODE` - device error code
    ErrorCode,
    /// Token this client does not know, kept verbatim
    Other(String),
}

impl Feature {
    const KNOWN: [Feature; 9] = [
        Feature::OnOff,
        Feature::Mode,
        Feature::SetPointTemperature,
        Feature::FanSpeed,
        Feature::VaneUpDown,
        Feature::VaneLeftRight,
        Feature::AmbientTemperature,
        Feature::ErrorStatus,
        Feature::ErrorCode,
    ];

    /// Wire token for this feature
    pub fn token(&self) -> &str {
        match self {
            Self::OnOff => "ONOFF",
            Self::Mode => "MODE",
            Self::SetPointTemperature => "SETPTEMP",
            Self::FanSpeed => "FANSP",
            Self::VaneUpDown => "VANEUD",
            Self::VaneLeftRight => "VANELR",
            Self::AmbientTemperature => "AMBTMP",
            Self::ErrorStatus => "ERRSTATUS",
            Self::ErrorCode => "ERRCODE",
            Self::Other(token) => token,
        }
    }

    /// Resolve a wire token (case-insensitive for known features)
    pub fn from_token(token: &str) -> Self {
        let token = token.trim();
        Self::KNOWN
            .iter()
            .find(|f| f.token().eq_ignore_ascii_case(token))
            .cloned()
            .unwrap_or_else(|| Self::Other(token.to_string()))
    }

    /// Whether the wire value is a temperature in tenths of a degree
    pub fn is_temperature(&self) -> bool {
        matches!(self, Self::SetPointTemperature | Self::AmbientTemperature)
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for Feature {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_token(s))
    }
}

impl Serialize for Feature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.token())
    }
}

/// An outgoing WMP command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Device identity query (also used as keep-alive ping)
    Id,
    /// Device info query, answered by one or more `INFO` lines
    Info,
    /// Read a feature value
    Get { feature: Feature },
    /// Write a feature value (already encoded for the wire)
    Set { feature: Feature, value: String },
    /// Plain-text login
    Login { password: String },
    /// End the login session
    Logout,
}

impl Command {
    /// Command verb without arguments
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Id => "ID",
            Self::Info => "INFO",
            Self::Get { .. } => "GET",
            Self::Set { .. } => "SET",
            Self::Login { .. } => "LOGIN",
            Self::Logout => "LOGOUT",
        }
    }

    /// Command text as sent on the wire (terminator excluded)
    pub fn to_wire(&self) -> String {
        match self {
            Self::Id | Self::Info | Self::Logout => self.verb().to_string(),
            Self::Get { feature } => format!("GET,{}:{}", DEFAULT_SLOT, feature),
            Self::Set { feature, value } => format!("SET,{}:{},{}", DEFAULT_SLOT, feature, value),
            Self::Login { password } => format!("LOGIN:{}", password),
        }
    }

    /// Whether the reply spans a run of `INFO` lines
    pub fn collects_info(&self) -> bool {
        matches!(self, Self::Info)
    }
}

/// Log-safe rendering: the login password is masked
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Login { .. } => f.write_str("LOGIN:***"),
            other => f.write_str(&other.to_wire()),
        }
    }
}
