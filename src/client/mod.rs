//! WMP connection controller and public client API
//!
//! A `Client` owns at most one connection at a time. Each connection has:
//! - a session task (socket I/O, reply routing, pending queue)
//! - a keep-alive driver pinging with `ID`
//!
//! Commands may be pipelined. Replies are matched to commands purely by
//! order, which relies on the device answering in the order it received
//! commands; the protocol offers nothing to verify this.

pub mod keepalive;
pub mod queue;
pub mod session;

pub use queue::{DeviceInfo, InfoEntry, Reply};

use self::keepalive::KeepAlive;
use self::session::{CommandSender, Router, Session};
use crate::codec::{value, LineCodec, Value};
use crate::config::ConnectionConfig;
use crate::constants::{
    CHANNEL_CAPACITY, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_INFO_IDLE_MS, DEFAULT_INFO_MAX_LINES,
    DEFAULT_KEEPALIVE_INTERVAL_MS, DEFAULT_MAX_LINE_LENGTH, DEFAULT_WMP_PORT,
    NOTIFICATION_CAPACITY,
};
use crate::error::{Result, WmpError};
use crate::protocol::{Command, DeviceIdentity, Feature, FeatureReport, FeatureValue, ResponseMessage};
use crate::transport::{TcpTransport, Transport};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

/// Runtime settings of a client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    /// `None` disables the keep-alive driver
    pub keepalive_interval: Option<Duration>,
    pub connect_timeout: Duration,
    /// `None` waits for the reply or connection close
    pub command_timeout: Option<Duration>,
    pub max_line_length: usize,
    pub info_idle: Duration,
    pub info_max_lines: usize,
}

impl ClientConfig {
    /// Defaults for a device at `host`
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_WMP_PORT,
            keepalive_interval: Some(Duration::from_millis(DEFAULT_KEEPALIVE_INTERVAL_MS)),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            command_timeout: None,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            info_idle: Duration::from_millis(DEFAULT_INFO_IDLE_MS),
            info_max_lines: DEFAULT_INFO_MAX_LINES,
        }
    }
}

impl From<&ConnectionConfig> for ClientConfig {
    fn from(cfg: &ConnectionConfig) -> Self {
        let millis = |ms: u64| (ms > 0).then(|| Duration::from_millis(ms));
        Self {
            host: cfg.host.clone(),
            port: cfg.port,
            keepalive_interval: millis(cfg.keepalive_interval_ms),
            connect_timeout: Duration::from_millis(cfg.connect_timeout_ms),
            command_timeout: millis(cfg.command_timeout_ms),
            max_line_length: cfg.max_line_length,
            info_idle: Duration::from_millis(cfg.info_idle_ms),
            info_max_lines: cfg.info_max_lines,
        }
    }
}

/// An open connection: session task plus keep-alive
struct Connection {
    peer: String,
    sender: CommandSender,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
    keepalive: KeepAlive,
}

/// WMP protocol client
///
/// All operations take `&self`, so a client shared between tasks (for
/// example behind an `Arc`) can be closed while commands are pending.
pub struct Client {
    config: ClientConfig,
    connection: Mutex<Option<Connection>>,
    state: Arc<RwLock<ConnectionState>>,
    notifications: broadcast::Sender<FeatureReport>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            config,
            connection: Mutex::new(None),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            notifications,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Get current state
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Receive every `CHN` notification from now on
    ///
    /// Subscriptions survive reconnects.
    pub fn subscribe(&self) -> broadcast::Receiver<FeatureReport> {
        self.notifications.subscribe()
    }

    /// Connect over TCP to the configured host and port
    pub async fn connect(&self) -> Result<()> {
        let transport = TcpTransport::new(
            self.config.host.clone(),
            self.config.port,
            self.config.connect_timeout,
        );
        self.connect_with(transport).await
    }

    /// Connect over an arbitrary transport
    ///
    /// An existing connection is closed first.
    pub async fn connect_with<T: Transport>(&self, transport: T) -> Result<()> {
        if self.connection.lock().is_some() {
            warn!("Closing existing connection before reconnecting");
            self.close().await;
        }

        let peer = transport.describe();
        *self.state.write() = ConnectionState::Connecting;

        let transport_shutdown = Arc::new(AtomicBool::new(false));
        let channels = match transport.open(transport_shutdown.clone()).await {
            Ok(channels) => channels,
            Err(e) => {
                *self.state.write() = ConnectionState::Disconnected;
                return Err(e);
            }
        };

        let (requests_tx, requests_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let router = Router::new(
            self.notifications.clone(),
            self.config.info_idle,
            self.config.info_max_lines,
        );

        *self.state.write() = ConnectionState::Connected;
        let session = Session::new(
            channels,
            LineCodec::new(self.config.max_line_length),
            router,
            requests_rx,
            shutdown_rx,
            transport_shutdown,
            self.state.clone(),
        );
        let task = tokio::spawn(session.run());

        let sender = CommandSender::new(requests_tx, self.config.command_timeout);
        let mut keepalive = KeepAlive::default();
        if let Some(interval) = self.config.keepalive_interval {
            keepalive.start(interval, sender.clone());
        }

        info!(peer = %peer, "Connected");
        let previous = self.connection.lock().replace(Connection {
            peer,
            sender,
            shutdown: shutdown_tx,
            task,
            keepalive,
        });
        if let Some(previous) = previous {
            // Lost a race with a concurrent connect; dropping it ends its session
            warn!(peer = %previous.peer, "Replaced connection opened concurrently");
        }
        Ok(())
    }

    /// Close the connection
    ///
    /// Stops the keep-alive, fails every pending command with
    /// `ConnectionClosed` and releases the socket. No-op when not connected.
    pub async fn close(&self) {
        let Some(mut connection) = self.connection.lock().take() else {
            return;
        };

        {
            let mut state = self.state.write();
            if *state != ConnectionState::Disconnected {
                *state = ConnectionState::Closing;
            }
        }

        connection.keepalive.stop();
        let _ = connection.shutdown.send(true);
        if let Err(e) = connection.task.await {
            warn!("Session task ended abnormally: {}", e);
        }

        *self.state.write() = ConnectionState::Disconnected;
        info!(peer = %connection.peer, "Closed");
    }

    /// Send a raw command and wait for its reply
    ///
    /// Fails with `NotConnected` without any I/O unless connected,
    /// `CommandRejected` if the device answers `ERR`, and
    /// `ConnectionClosed` if the connection ends first.
    pub async fn send_command(&self, command: Command) -> Result<Reply> {
        if !self.is_connected() {
            return Err(WmpError::NotConnected);
        }
        let sender = self
            .connection
            .lock()
            .as_ref()
            .map(|c| c.sender.clone())
            .ok_or(WmpError::NotConnected)?;
        sender.send(command).await
    }

    /// Query device identity (`ID`)
    pub async fn get_device_id(&self) -> Result<DeviceIdentity> {
        match self.send_command(Command::Id).await? {
            Reply::Message(ResponseMessage::Identity(identity)) => Ok(identity),
            other => Err(unexpected(&Command::Id, &other)),
        }
    }

    /// Query device info (`INFO`), aggregated over all `INFO` lines
    pub async fn get_info(&self) -> Result<DeviceInfo> {
        match self.send_command(Command::Info).await? {
            Reply::Info(info) => Ok(info),
            other => Err(unexpected(&Command::Info, &other)),
        }
    }

    /// Read a feature (`GET,1:<feature>`)
    pub async fn get_feature(&self, feature: Feature) -> Result<FeatureValue> {
        let command = Command::Get {
            feature: feature.clone(),
        };

        match self.send_command(command.clone()).await? {
            Reply::Message(ResponseMessage::FeatureReply { report, .. })
                if report.value.feature == feature =>
            {
                Ok(report.value)
            }
            other => Err(unexpected(&command, &other)),
        }
    }

    /// Write a feature (`SET,1:<feature>,<value>`), value transcoded for the wire
    ///
    /// Succeeds on `ACK` or a feature echo.
    pub async fn set_feature(&self, feature: Feature, value: impl Into<Value>) -> Result<()> {
        let wire = value::encode(&feature, &value.into())?;
        let command = Command::Set { feature, value: wire };

        match self.send_command(command.clone()).await? {
            Reply::Message(ResponseMessage::Acknowledge)
            | Reply::Message(ResponseMessage::FeatureReply { .. }) => Ok(()),
            other => Err(unexpected(&command, &other)),
        }
    }

    /// Set-point temperature in degrees
    pub async fn get_temperature(&self) -> Result<f64> {
        self.get_scaled(Feature::SetPointTemperature).await
    }

    /// Ambient temperature in degrees
    pub async fn get_ambient_temperature(&self) -> Result<f64> {
        self.get_scaled(Feature::AmbientTemperature).await
    }

    /// Set the set-point temperature in degrees (sent as tenths)
    pub async fn set_temperature(&self, degrees: f64) -> Result<()> {
        self.set_feature(Feature::SetPointTemperature, Value::Temperature(degrees))
            .await
    }

    pub async fn turn_on(&self) -> Result<()> {
        self.set_feature(Feature::OnOff, "ON").await
    }

    pub async fn turn_off(&self) -> Result<()> {
        self.set_feature(Feature::OnOff, "OFF").await
    }

    /// Plain-text login (`LOGIN:<password>`)
    pub async fn login(&self, password: &str) -> Result<()> {
        self.expect_ack(Command::Login {
            password: password.to_string(),
        })
        .await
    }

    pub async fn logout(&self) -> Result<()> {
        self.expect_ack(Command::Logout).await
    }

    async fn get_scaled(&self, feature: Feature) -> Result<f64> {
        let value = self.get_feature(feature).await?;
        // Temperature features always decode to Value::Temperature
        value
            .value
            .as_temperature()
            .ok_or_else(|| WmpError::ValueDecode {
                feature: value.feature.to_string(),
                value: value.wire.clone(),
            })
    }

    async fn expect_ack(&self, command: Command) -> Result<()> {
        match self.send_command(command.clone()).await? {
            Reply::Message(ResponseMessage::Acknowledge) => Ok(()),
            other => Err(unexpected(&command, &other)),
        }
    }
}

fn unexpected(command: &Command, reply: &Reply) -> WmpError {
    let reply = match reply {
        Reply::Message(message) => message.kind().to_string(),
        Reply::Info(info) => format!("INFO ({} lines)", info.entries.len()),
    };
    WmpError::UnexpectedReply {
        command: command.to_string(),
        reply,
    }
}
