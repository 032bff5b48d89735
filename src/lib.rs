//! WMP client library
//!
//! Asynchronous client for the WMP protocol spoken by Wi-Fi air-conditioning
//! controllers: LF-terminated ASCII commands over TCP, replies matched to
//! commands in send order, unsolicited `CHN` notifications, and a periodic
//! `ID` keep-alive.
//!
//! ```ignore
//! let client = Client::new(ClientConfig::new("192.168.100.246"));
//! client.connect().await?;
//! client.set_temperature(21.5).await?;
//! client.close().await;
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod transport;

pub use client::{Client, ClientConfig, ConnectionState, DeviceInfo, InfoEntry, Reply};
pub use codec::Value;
pub use error::{Result, WmpError};
pub use protocol::{Command, DeviceIdentity, Feature, FeatureReport, FeatureValue, ResponseMessage};
