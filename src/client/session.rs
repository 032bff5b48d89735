//! Connection session - the processing loop behind a `Client`
//!
//! The session owns the transport channels and handles:
//! - Outbound commands: enqueue, then write (queue order = wire order)
//! - Inbound bytes: line framing, reply parsing, routing
//! - `INFO` reply aggregation (idle and line-count bounds)
//! - Teardown: failing every pending command exactly once
//!
//! Callers never block the loop; they await their own completion. The loop
//! never awaits the transport either: frames the transport cannot take yet
//! wait in a bounded outbox.
//!
//! An `INFO` command is held back while another `INFO` is pending, together
//! with everything requested after it, so two `INFO` runs are never
//! interleaved on the wire.

use super::queue::{PendingQueue, Reply, Responder};
use super::ConnectionState;
use crate::constants::CHANNEL_CAPACITY;
use crate::codec::LineCodec;
use crate::error::{Result, WmpError};
use crate::protocol::{parse_line, Command, FeatureReport, ResponseMessage};
use crate::transport::{TransportChannels, TransportEvent};
use bytes::Bytes;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// A command handed to the session
pub(crate) struct Request {
    pub command: Command,
    pub frame: Bytes,
    pub responder: Responder,
}

/// Cloneable handle for issuing commands to a running session
#[derive(Clone)]
pub(crate) struct CommandSender {
    requests: mpsc::Sender<Request>,
    command_timeout: Option<Duration>,
}

impl CommandSender {
    pub fn new(requests: mpsc::Sender<Request>, command_timeout: Option<Duration>) -> Self {
        Self {
            requests,
            command_timeout,
        }
    }

    /// Send `command` and wait for its reply
    pub async fn send(&self, command: Command) -> Result<Reply> {
        let frame = LineCodec::frame(&command.to_wire())?;
        let label = command.to_string();
        let (responder, completion) = oneshot::channel();

        self.requests
            .send(Request {
                command,
                frame,
                responder,
            })
            .await
            .map_err(|_| WmpError::NotConnected)?;

        let outcome = match self.command_timeout {
            Some(limit) => tokio::time::timeout(limit, completion)
                .await
                .map_err(|_| WmpError::CommandTimeout { command: label })?,
            None => completion.await,
        };

        // Responder dropped without an answer: session went away
        outcome.unwrap_or(Err(WmpError::ConnectionClosed))
    }
}

/// Routes parsed replies to the pending queue and subscribers
pub(crate) struct Router {
    queue: PendingQueue,
    notifications: broadcast::Sender<FeatureReport>,
    info_idle: Duration,
    info_max_lines: usize,
    info_deadline: Option<Instant>,
}

impl Router {
    pub fn new(
        notifications: broadcast::Sender<FeatureReport>,
        info_idle: Duration,
        info_max_lines: usize,
    ) -> Self {
        Self {
            queue: PendingQueue::new(),
            notifications,
            info_idle,
            info_max_lines,
            info_deadline: None,
        }
    }

    pub fn queue_mut(&mut self) -> &mut PendingQueue {
        &mut self.queue
    }

    /// When an in-progress `INFO` reply should be considered complete
    pub fn info_deadline(&self) -> Option<Instant> {
        self.info_deadline
    }

    pub fn queue(&self) -> &PendingQueue {
        &self.queue
    }

    /// Dispatch one reply
    ///
    /// Notifications go to subscribers only. `INFO` lines accumulate on an
    /// `INFO` command at the head of the queue. Anything else first closes
    /// an in-progress `INFO` run, then completes the oldest command.
    ///
    /// `ERR` follows the same rule: after at least one `INFO` line it ends
    /// the run (the `INFO` command succeeds with the lines so far) and
    /// rejects the next pending command. Before any line it rejects the
    /// `INFO` command itself.
    pub fn route(&mut self, message: ResponseMessage, now: Instant) {
        match message {
            ResponseMessage::Notification(report) => {
                debug!(feature = %report.value.feature, value = %report.value.value, "Notification");
                // No subscribers is fine
                let _ = self.notifications.send(report);
            }
            ResponseMessage::Info { key, value } if self.queue.head_collects_info() => {
                match self.queue.push_info(key, value) {
                    Some(lines) if lines >= self.info_max_lines => self.flush_info(),
                    _ => self.info_deadline = Some(now + self.info_idle),
                }
            }
            other => {
                self.flush_info();
                let kind = other.kind().to_string();
                if !self.queue.complete_oldest(other) {
                    warn!(kind = %kind, "Reply without pending command");
                }
            }
        }
    }

    /// Complete an in-progress `INFO` reply, if any
    pub fn flush_info(&mut self) {
        self.info_deadline = None;
        self.queue.flush_info();
    }
}

/// Session processing loop
pub(crate) struct Session {
    channels: TransportChannels,
    codec: LineCodec,
    router: Router,
    requests: mpsc::Receiver<Request>,
    /// Requests held back behind a pending `INFO`
    held: VecDeque<Request>,
    /// Frames accepted but not yet taken by the transport
    outbox: VecDeque<Bytes>,
    shutdown: watch::Receiver<bool>,
    transport_shutdown: Arc<AtomicBool>,
    state: Arc<RwLock<ConnectionState>>,
}

impl Session {
    pub fn new(
        channels: TransportChannels,
        codec: LineCodec,
        router: Router,
        requests: mpsc::Receiver<Request>,
        shutdown: watch::Receiver<bool>,
        transport_shutdown: Arc<AtomicBool>,
        state: Arc<RwLock<ConnectionState>>,
    ) -> Self {
        Self {
            channels,
            codec,
            router,
            requests,
            held: VecDeque::new(),
            outbox: VecDeque::new(),
            shutdown,
            transport_shutdown,
            state,
        }
    }

    /// Run until closed by the client, the peer, or a transport error
    pub async fn run(mut self) {
        let reason = loop {
            let info_deadline = self.router.info_deadline();
            // Stop taking requests while the local backlog is full
            let accepting = self.held.len() + self.outbox.len() < CHANNEL_CAPACITY;

            tokio::select! {
                biased;

                // Close requested (or client dropped)
                _ = self.shutdown.changed() => break "closed by client",

                event = self.channels.rx.recv() => match event {
                    Some(TransportEvent::Data(data)) => {
                        self.on_data(&data);
                        if !self.release_held() {
                            break "transport stopped";
                        }
                    }
                    Some(TransportEvent::Error(e)) => {
                        error!("Transport error: {}", e);
                        break "transport error";
                    }
                    None => break "peer closed connection",
                },

                // Owned permit so the arm holds no borrow of the session
                permit = self.channels.tx.clone().reserve_owned(), if !self.outbox.is_empty() => match permit {
                    Ok(permit) => {
                        if let Some(frame) = self.outbox.pop_front() {
                            permit.send(frame);
                        }
                    }
                    Err(_) => break "transport stopped",
                },

                request = self.requests.recv(), if accepting => match request {
                    Some(request) => {
                        if !self.submit(request) {
                            break "transport stopped";
                        }
                    }
                    None => break "client dropped",
                },

                _ = sleep_until(info_deadline) => {
                    self.router.flush_info();
                    if !self.release_held() {
                        break "transport stopped";
                    }
                }
            }
        };

        self.teardown(reason);
    }

    fn on_data(&mut self, data: &[u8]) {
        let now = Instant::now();
        for line in self.codec.feed(data) {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    error!("Dropping inbound data: {}", e);
                    continue;
                }
            };
            debug!("<- {}", line);

            match parse_line(&line) {
                Ok(message) => self.router.route(message, now),
                Err(e) => error!("Dropping line: {}", e),
            }
        }
    }

    /// Write a request now, or hold it behind a pending `INFO`
    ///
    /// False when the transport is gone.
    fn submit(&mut self, request: Request) -> bool {
        if !self.held.is_empty()
            || (request.command.collects_info() && self.router.queue().awaits_info())
        {
            debug!(command = %request.command, "Held behind pending INFO");
            self.held.push_back(request);
            return true;
        }
        self.write(request)
    }

    /// Write held requests up to (and including) the next `INFO`
    fn release_held(&mut self) -> bool {
        while let Some(request) = self.held.front() {
            if request.command.collects_info() && self.router.queue().awaits_info() {
                break;
            }
            let Some(request) = self.held.pop_front() else {
                break;
            };
            if !self.write(request) {
                return false;
            }
        }
        true
    }

    /// Enqueue then hand the frame to the transport without waiting
    fn write(&mut self, request: Request) -> bool {
        let Request {
            command,
            frame,
            responder,
        } = request;

        debug!("-> {}", command);
        self.router
            .queue_mut()
            .enqueue_with(command.to_string(), command.collects_info(), responder);

        if !self.outbox.is_empty() {
            self.outbox.push_back(frame);
            return true;
        }

        // On failure the entry is failed by teardown with the rest
        match self.channels.tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(frame)) => {
                self.outbox.push_back(frame);
                true
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    fn teardown(mut self, reason: &str) {
        self.transport_shutdown.store(true, Ordering::SeqCst);
        *self.state.write() = ConnectionState::Disconnected;

        let failed = self.router.queue_mut().fail_all(reason);

        // Requests that never reached the wire
        let mut late = 0;
        for request in self.held.drain(..) {
            let _ = request.responder.send(Err(WmpError::ConnectionClosed));
            late += 1;
        }
        self.requests.close();
        while let Ok(request) = self.requests.try_recv() {
            let _ = request.responder.send(Err(WmpError::ConnectionClosed));
            late += 1;
        }

        info!(reason, failed = failed + late, "Connection closed");
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
