//! Keep-alive driver
//!
//! The appliance drops idle connections, so an `ID` query is sent every
//! interval while connected. Ping results are only logged: a ping that
//! fails because the transport died is handled by the session teardown
//! like any other command.

use super::session::CommandSender;
use crate::protocol::Command;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Periodic `ID` ping, Idle until started
#[derive(Default)]
pub(crate) struct KeepAlive {
    task: Option<JoinHandle<()>>,
}

impl KeepAlive {
    /// Idle -> Active: first ping one `interval` from now
    pub fn start(&mut self, interval: Duration, sender: CommandSender) {
        self.stop();
        self.task = Some(tokio::spawn(run(interval, sender)));
    }

    /// Active -> Idle, even if a ping is in flight
    ///
    /// An in-flight ping stays in the pending queue; its reply is consumed
    /// there and nobody observes it.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run(interval: Duration, sender: CommandSender) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        match tokio::time::timeout(interval, sender.send(Command::Id)).await {
            Ok(Ok(_)) => info!("Ping successful"),
            Ok(Err(e)) if e.is_disconnect() => {
                debug!("Keep-alive stopping: {}", e);
                break;
            }
            Ok(Err(e)) => warn!("Ping failed: {}", e),
            Err(_) => warn!("Ping unanswered after {:?}", interval),
        }
    }
}
