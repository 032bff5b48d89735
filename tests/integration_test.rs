//! Integration tests for the WMP client
//!
//! Tests the complete command/reply flow through the client using a mock
//! transport driven by the test, plus one run against a loopback TCP peer.

use bytes::Bytes;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use wmp_client::transport::{Transport, TransportChannels, TransportEvent};
use wmp_client::{
    Client, ClientConfig, ConnectionState, Feature, Result, Value, WmpError,
};

const IDENTITY: &str = "ID:IS-ACS-WIFI,CC3F1D0123A4,192.168.100.246,ASCII,v1.0.0,-52\r\n";

// =============================================================================
// Mock Transport
// =============================================================================

/// Mock transport for testing the client without real I/O
pub struct MockTransport {
    rx: mpsc::Receiver<TransportEvent>,
    tx: mpsc::Sender<Bytes>,
}

/// Device side of a `MockTransport`
pub struct MockPeer {
    events: mpsc::Sender<TransportEvent>,
    written: mpsc::Receiver<Bytes>,
}

impl MockTransport {
    /// Create a transport and the peer that drives it
    pub fn pair() -> (Self, MockPeer) {
        let (events, rx) = mpsc::channel(16);
        let (tx, written) = mpsc::channel(16);
        (Self { rx, tx }, MockPeer { events, written })
    }
}

impl Transport for MockTransport {
    async fn open(self, _shutdown: Arc<AtomicBool>) -> Result<TransportChannels> {
        Ok(TransportChannels {
            rx: self.rx,
            tx: self.tx,
        })
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}

impl MockPeer {
    /// Next line written by the client
    pub async fn expect(&mut self, line: &str) {
        let data = tokio::time::timeout(Duration::from_secs(60), self.written.recv())
            .await
            .expect("timeout")
            .expect("client stopped writing");
        assert_eq!(
            std::str::from_utf8(&data).unwrap(),
            format!("{}\n", line),
            "unexpected command on the wire"
        );
    }

    /// Send raw bytes to the client
    pub async fn send(&self, data: &str) {
        self.events
            .send(TransportEvent::Data(Bytes::copy_from_slice(data.as_bytes())))
            .await
            .expect("client gone");
    }

    /// Whether the client wrote anything not yet read
    pub fn idle(&mut self) -> bool {
        self.written.try_recv().is_err()
    }

    /// Simulate the device closing the connection
    pub fn hang_up(self) {}
}

fn test_config() -> ClientConfig {
    ClientConfig {
        keepalive_interval: None,
        ..ClientConfig::new("mock")
    }
}

async fn connected(config: ClientConfig) -> (Client, MockPeer) {
    let (transport, peer) = MockTransport::pair();
    let client = Client::new(config);
    client.connect_with(transport).await.unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);
    (client, peer)
}

// =============================================================================
// Command / reply correlation
// =============================================================================

#[tokio::test]
async fn test_pipelined_replies_in_send_order_with_notifications() {
    let (client, mut peer) = connected(test_config()).await;
    let mut notes = client.subscribe();

    let (identity, mode, ()) = tokio::join!(
        client.get_device_id(),
        client.get_feature(Feature::Mode),
        async {
            peer.expect("ID").await;
            peer.expect("GET,1:MODE").await;
            peer.send("CHN,1:ONOFF,ON\r\n").await;
            peer.send(IDENTITY).await;
            peer.send("CHN,1:SETPTEMP,215\r\nGET,1:MODE,HEAT\r\n").await;
        }
    );

    let identity = identity.unwrap();
    assert_eq!(identity.model, "IS-ACS-WIFI");
    assert_eq!(identity.rssi_dbm(), Some(-52));
    assert_eq!(mode.unwrap().value, Value::Text("HEAT".into()));

    let first = notes.recv().await.unwrap();
    assert_eq!(first.slot, Some(1));
    assert_eq!(first.value.feature, Feature::OnOff);
    let second = notes.recv().await.unwrap();
    assert_eq!(second.value.value, Value::Temperature(21.5));
}

#[tokio::test]
async fn test_err_fails_only_oldest_command() {
    let (client, mut peer) = connected(test_config()).await;

    let (set, identity, ()) = tokio::join!(
        client.set_feature(Feature::Mode, "BOGUS"),
        client.get_device_id(),
        async {
            peer.expect("SET,1:MODE,BOGUS").await;
            peer.expect("ID").await;
            peer.send("ERR\r\n").await;
            peer.send(IDENTITY).await;
        }
    );

    match set {
        Err(WmpError::CommandRejected { command }) => assert_eq!(command, "SET,1:MODE,BOGUS"),
        other => panic!("Expected CommandRejected, got {:?}", other),
    }
    assert!(identity.is_ok());
}

#[tokio::test]
async fn test_unexpected_reply_kind() {
    let (client, mut peer) = connected(test_config()).await;

    let (identity, ()) = tokio::join!(client.get_device_id(), async {
        peer.expect("ID").await;
        peer.send("ACK\r\n").await;
    });

    assert!(matches!(identity, Err(WmpError::UnexpectedReply { .. })));
}

#[tokio::test]
async fn test_malformed_line_is_dropped() {
    let (client, mut peer) = connected(test_config()).await;

    let (identity, ()) = tokio::join!(client.get_device_id(), async {
        peer.expect("ID").await;
        peer.send("ID:too,few\r\n").await;
        peer.send(IDENTITY).await;
    });

    assert_eq!(identity.unwrap().mac, "CC3F1D0123A4");
}

#[tokio::test]
async fn test_overlong_line_is_dropped() {
    let (client, mut peer) = connected(ClientConfig {
        max_line_length: 16,
        ..test_config()
    })
    .await;

    let (onoff, ()) = tokio::join!(client.get_feature(Feature::OnOff), async {
        peer.expect("GET,1:ONOFF").await;
        peer.send("CHN,1:MODE,AAAAAAAAAAAAAAAAAAAA\r\n").await;
        peer.send("GET,1:ONOFF,ON\r\n").await;
    });

    let onoff = onoff.unwrap();
    assert_eq!(onoff.feature, Feature::OnOff);
    assert_eq!(onoff.value, Value::from("ON"));
    assert!(client.is_connected());
}

// =============================================================================
// Features and temperatures
// =============================================================================

#[tokio::test]
async fn test_set_temperature_sends_tenths() {
    let (client, mut peer) = connected(test_config()).await;

    let (result, ()) = tokio::join!(client.set_temperature(21.5), async {
        peer.expect("SET,1:SETPTEMP,215").await;
        peer.send("ACK\r\n").await;
    });
    assert!(result.is_ok());

    // A feature echo is accepted too
    let (result, ()) = tokio::join!(client.set_temperature(18.0), async {
        peer.expect("SET,1:SETPTEMP,180").await;
        peer.send("SET,1:SETPTEMP,180\r\n").await;
    });
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_get_temperatures_are_scaled() {
    let (client, mut peer) = connected(test_config()).await;

    let (setpoint, ambient, ()) = tokio::join!(
        client.get_temperature(),
        client.get_ambient_temperature(),
        async {
            peer.expect("GET,1:SETPTEMP").await;
            peer.expect("GET,1:AMBTMP").await;
            peer.send("GET,1:SETPTEMP,215\r\nGET,1:AMBTMP,198\r\n").await;
        }
    );

    assert_eq!(setpoint.unwrap(), 21.5);
    assert_eq!(ambient.unwrap(), 19.8);
}

#[tokio::test]
async fn test_on_off_login_logout() {
    let (client, mut peer) = connected(test_config()).await;

    let (login, on, off, logout, ()) = tokio::join!(
        client.login("secret"),
        client.turn_on(),
        client.turn_off(),
        client.logout(),
        async {
            peer.expect("LOGIN:secret").await;
            peer.expect("SET,1:ONOFF,ON").await;
            peer.expect("SET,1:ONOFF,OFF").await;
            peer.expect("LOGOUT").await;
            peer.send("ACK\r\nACK\r\nACK\r\nACK\r\n").await;
        }
    );

    assert!(login.is_ok());
    assert!(on.is_ok());
    assert!(off.is_ok());
    assert!(logout.is_ok());
}

#[tokio::test]
async fn test_info_lines_aggregated() {
    let (client, mut peer) = connected(test_config()).await;

    let (info, identity, ()) = tokio::join!(client.get_info(), client.get_device_id(), async {
        peer.expect("INFO").await;
        peer.expect("ID").await;
        peer.send("INFO:RUNVERSION,1.0.1\r\nINFO:CFGVERSION,1.0.2\r\n")
            .await;
        peer.send("INFO:HASH,2000:0106:001F:0104:F4DE\r\n").await;
        peer.send(IDENTITY).await;
    });

    let info = info.unwrap();
    assert_eq!(info.entries.len(), 3);
    assert_eq!(info.entries[0].key, "RUNVERSION");
    assert_eq!(info.get("HASH"), Some("2000:0106:001F:0104:F4DE"));
    assert!(identity.is_ok());
}

#[tokio::test]
async fn test_info_completes_after_silence() {
    let (client, mut peer) = connected(ClientConfig {
        info_idle: Duration::from_millis(50),
        ..test_config()
    })
    .await;

    let (info, ()) = tokio::join!(client.get_info(), async {
        peer.expect("INFO").await;
        peer.send("INFO:RUNVERSION,1.0.1\r\n").await;
    });

    assert_eq!(info.unwrap().get("RUNVERSION"), Some("1.0.1"));
}

#[tokio::test]
async fn test_concurrent_info_queries_get_their_own_lines() {
    let (client, mut peer) = connected(ClientConfig {
        info_idle: Duration::from_millis(50),
        ..test_config()
    })
    .await;

    let (first, second, ()) = tokio::join!(client.get_info(), client.get_info(), async {
        peer.expect("INFO").await;
        peer.send("INFO:RUNVERSION,1.0.1\r\nINFO:CFGVERSION,1.0.2\r\n")
            .await;

        // Second query goes out only once the first run has ended
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(peer.idle());
        peer.expect("INFO").await;
        peer.send("INFO:HASH,2000:0106:001F:0104:F4DE\r\n").await;
    });

    let first = first.unwrap();
    assert_eq!(first.entries.len(), 2);
    assert_eq!(first.get("CFGVERSION"), Some("1.0.2"));

    let second = second.unwrap();
    assert_eq!(second.entries.len(), 1);
    assert_eq!(second.get("HASH"), Some("2000:0106:001F:0104:F4DE"));
}

#[tokio::test]
async fn test_err_after_info_lines_rejects_next_command() {
    let (client, mut peer) = connected(test_config()).await;

    let (info, set, ()) = tokio::join!(
        client.get_info(),
        client.set_feature(Feature::Mode, "BOGUS"),
        async {
            peer.expect("INFO").await;
            peer.expect("SET,1:MODE,BOGUS").await;
            peer.send("INFO:RUNVERSION,1.0.1\r\nINFO:CFGVERSION,1.0.2\r\n")
                .await;
            peer.send("ERR\r\n").await;
        }
    );

    assert_eq!(info.unwrap().entries.len(), 2);
    assert!(matches!(set, Err(WmpError::CommandRejected { .. })));
}

// =============================================================================
// Connection lifecycle
// =============================================================================

#[tokio::test]
async fn test_commands_fail_when_not_connected() {
    let client = Client::new(test_config());
    assert!(matches!(
        client.get_device_id().await,
        Err(WmpError::NotConnected)
    ));
}

#[tokio::test]
async fn test_peer_close_fails_all_pending() {
    let (client, mut peer) = connected(test_config()).await;

    let (identity, info, mode, ()) = tokio::join!(
        client.get_device_id(),
        client.get_info(),
        client.get_feature(Feature::Mode),
        async move {
            peer.expect("ID").await;
            peer.expect("INFO").await;
            peer.expect("GET,1:MODE").await;
            peer.hang_up();
        }
    );

    assert!(matches!(identity, Err(WmpError::ConnectionClosed)));
    assert!(matches!(info, Err(WmpError::ConnectionClosed)));
    assert!(matches!(mode, Err(WmpError::ConnectionClosed)));
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(matches!(
        client.turn_on().await,
        Err(WmpError::NotConnected)
    ));
}

#[tokio::test]
async fn test_close_while_commands_pending() {
    let (client, mut peer) = connected(test_config()).await;

    let (identity, info, mode, ()) = tokio::join!(
        client.get_device_id(),
        client.get_info(),
        client.get_feature(Feature::Mode),
        async {
            peer.expect("ID").await;
            peer.expect("INFO").await;
            peer.expect("GET,1:MODE").await;
            client.close().await;
        }
    );

    assert!(matches!(identity, Err(WmpError::ConnectionClosed)));
    assert!(matches!(info, Err(WmpError::ConnectionClosed)));
    assert!(matches!(mode, Err(WmpError::ConnectionClosed)));
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(matches!(
        client.get_device_id().await,
        Err(WmpError::NotConnected)
    ));
}

#[tokio::test]
async fn test_close_then_reconnect() {
    let (client, _peer) = connected(test_config()).await;
    let mut notes = client.subscribe();

    client.close().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(matches!(
        client.get_device_id().await,
        Err(WmpError::NotConnected)
    ));

    let (transport, mut peer) = MockTransport::pair();
    client.connect_with(transport).await.unwrap();

    let (identity, ()) = tokio::join!(client.get_device_id(), async {
        peer.expect("ID").await;
        peer.send("CHN,1:MODE,COOL\r\n").await;
        peer.send(IDENTITY).await;
    });
    assert!(identity.is_ok());

    // Subscriptions outlive the connection they were made on
    assert_eq!(notes.recv().await.unwrap().value.wire, "COOL");
    client.close().await;
}

#[tokio::test]
async fn test_command_timeout_keeps_fifo_order() {
    let (client, mut peer) = connected(ClientConfig {
        command_timeout: Some(Duration::from_millis(100)),
        ..test_config()
    })
    .await;

    let (late, ()) = tokio::join!(client.get_device_id(), async {
        peer.expect("ID").await;
    });
    assert!(matches!(late, Err(WmpError::CommandTimeout { .. })));

    // The late reply still belongs to the timed-out command
    let (mode, ()) = tokio::join!(client.get_feature(Feature::Mode), async {
        peer.expect("GET,1:MODE").await;
        peer.send(IDENTITY).await;
        peer.send("GET,1:MODE,AUTO\r\n").await;
    });
    assert_eq!(mode.unwrap().wire, "AUTO");
}

#[tokio::test(start_paused = true)]
async fn test_keepalive_pings_while_connected() {
    let (client, mut peer) = connected(ClientConfig {
        keepalive_interval: Some(Duration::from_secs(30)),
        ..test_config()
    })
    .await;

    tokio::time::sleep(Duration::from_secs(29)).await;
    assert!(peer.idle());

    for _ in 0..2 {
        peer.expect("ID").await;
        peer.send(IDENTITY).await;
    }

    client.close().await;
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert!(peer.idle());
}

// =============================================================================
// TCP
// =============================================================================

#[tokio::test]
async fn test_tcp_loopback_session() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let device = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let (reader, mut writer) = socket.into_split();
        let mut lines = BufReader::new(reader).lines();

        while let Some(line) = lines.next_line().await.unwrap() {
            let reply = match line.as_str() {
                "ID" => "ID: IS-ACS-WIFI,CC3F1D0123A4,127.0.0.1,ASCII,v1.0.0,-60\r\n",
                "SET,1:SETPTEMP,225" => "CHN,1:SETPTEMP,225\r\nACK\r\n",
                _ => "ERR\r\n",
            };
            writer.write_all(reply.as_bytes()).await.unwrap();
        }
    });

    let client = Client::new(ClientConfig {
        port,
        ..ClientConfig::new("127.0.0.1")
    });
    client.connect().await.unwrap();
    let mut notes = client.subscribe();

    let identity = client.get_device_id().await.unwrap();
    assert_eq!(identity.model, "IS-ACS-WIFI");
    assert_eq!(identity.ip, "127.0.0.1");

    client.set_temperature(22.5).await.unwrap();
    assert_eq!(
        notes.recv().await.unwrap().value.value,
        Value::Temperature(22.5)
    );

    assert!(matches!(
        client.set_feature(Feature::Mode, "BOGUS").await,
        Err(WmpError::CommandRejected { .. })
    ));

    client.close().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);
    tokio::time::timeout(Duration::from_secs(2), device)
        .await
        .expect("device still connected")
        .unwrap();
}

#[tokio::test]
async fn test_tcp_connect_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let client = Client::new(ClientConfig {
        port,
        ..ClientConfig::new("127.0.0.1")
    });
    assert!(matches!(
        client.connect().await,
        Err(WmpError::Connect { .. })
    ));
    assert_eq!(client.state(), ConnectionState::Disconnected);
}
