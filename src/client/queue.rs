//! FIFO correlation of replies to commands
//!
//! WMP replies carry no request ID. The only correlation is order: the
//! peer is assumed to answer commands in the order they were sent, so the
//! oldest pending command owns the next non-notification reply. This queue
//! is the single place that assumption is applied.
//!
//! `INFO` is the one multi-line reply: its pending entry collects `INFO`
//! lines until the session decides the run is over (see `flush_info`).

use crate::error::{Result, WmpError};
use crate::protocol::ResponseMessage;
use serde::Serialize;
use std::collections::VecDeque;
use tokio::sync::oneshot;
use tracing::debug;

/// One `INFO:<key>,<value>` pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InfoEntry {
    pub key: String,
    pub value: String,
}

/// Aggregated `INFO` reply, in arrival order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub entries: Vec<InfoEntry>,
}

impl DeviceInfo {
    /// Value of the first entry named `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.value.as_str())
    }
}

/// What a pending command completes with
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// A single reply line
    Message(ResponseMessage),
    /// A run of `INFO` lines
    Info(DeviceInfo),
}

/// Receiving side of a pending command
pub type Completion = oneshot::Receiver<Result<Reply>>;

/// Sending side held by the queue
pub type Responder = oneshot::Sender<Result<Reply>>;

/// A command waiting for its reply
struct PendingCommand {
    label: String,
    info: Option<Vec<InfoEntry>>,
    responder: Responder,
}

impl PendingCommand {
    fn resolve(self, result: Result<Reply>) {
        if self.responder.send(result).is_err() {
            // Caller stopped waiting (timeout); the reply is still consumed
            debug!(command = %self.label, "Reply for abandoned command dropped");
        }
    }
}

/// Strict FIFO of commands awaiting replies
#[derive(Default)]
pub struct PendingQueue {
    entries: VecDeque<PendingCommand>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command and return its completion
    pub fn enqueue(&mut self, label: impl Into<String>, collects_info: bool) -> Completion {
        let (tx, rx) = oneshot::channel();
        self.enqueue_with(label, collects_info, tx);
        rx
    }

    /// Append a command whose completion the caller already holds
    pub fn enqueue_with(&mut self, label: impl Into<String>, collects_info: bool, responder: Responder) {
        self.entries.push_back(PendingCommand {
            label: label.into(),
            info: collects_info.then(Vec::new),
            responder,
        });
    }

    /// Resolve the oldest command with `message`
    ///
    /// `ERR` fails the command with `CommandRejected`. Returns false when
    /// nothing was pending (unmatched reply).
    pub fn complete_oldest(&mut self, message: ResponseMessage) -> bool {
        let Some(head) = self.entries.pop_front() else {
            return false;
        };

        let result = match message {
            ResponseMessage::Error => Err(WmpError::CommandRejected {
                command: head.label.clone(),
            }),
            other => Ok(Reply::Message(other)),
        };
        head.resolve(result);
        true
    }

    /// Whether the oldest command is an `INFO` query
    pub fn head_collects_info(&self) -> bool {
        self.entries.front().is_some_and(|h| h.info.is_some())
    }

    /// Whether any pending command is an `INFO` query
    ///
    /// While true, another `INFO` must not reach the wire: its lines would
    /// be indistinguishable from the pending run.
    pub fn awaits_info(&self) -> bool {
        self.entries.iter().any(|e| e.info.is_some())
    }

    /// Append an `INFO` pair to the oldest command
    ///
    /// Returns the number of lines collected so far, or `None` when the
    /// oldest command is not collecting.
    pub fn push_info(&mut self, key: String, value: String) -> Option<usize> {
        let info = self.entries.front_mut()?.info.as_mut()?;
        info.push(InfoEntry { key, value });
        Some(info.len())
    }

    /// Complete the oldest command with the `INFO` lines collected so far
    ///
    /// Returns false if it is not collecting or has collected nothing yet.
    pub fn flush_info(&mut self) -> bool {
        let ready = self
            .entries
            .front()
            .and_then(|h| h.info.as_ref())
            .is_some_and(|info| !info.is_empty());
        if !ready {
            return false;
        }

        let Some(mut head) = self.entries.pop_front() else {
            return false;
        };
        let entries = head.info.take().unwrap_or_default();
        head.resolve(Ok(Reply::Info(DeviceInfo { entries })));
        true
    }

    /// Fail every pending command with `ConnectionClosed`
    ///
    /// Returns how many commands were failed.
    pub fn fail_all(&mut self, reason: &str) -> usize {
        let count = self.entries.len();
        for pending in self.entries.drain(..) {
            debug!(command = %pending.label, reason, "Failing pending command");
            pending.resolve(Err(WmpError::ConnectionClosed));
        }
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
