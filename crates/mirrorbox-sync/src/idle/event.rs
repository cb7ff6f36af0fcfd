//! Mail events pushed by IDLE connections.
//!
//! The IMAP response loop calls the handler inline, so it only `try_send`s
//! into a small per-connection buffer. A forwarding task moves events to the
//! shared channel, waiting at most `event_send_timeout` per event. Under
//! backpressure events are dropped with a warning; a later sync catches up.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use mirrorbox_imap::{SeqNum, UnsolicitedHandler};
use serde::Serialize;
use tokio::sync::mpsc::{self, error::SendTimeoutError, error::TrySendError};
use tracing::{trace, warn};

use crate::account::AccountId;

/// Capacity of the per-connection buffer between handler and forwarder.
pub(super) const EVENT_BUFFER: usize = 64;

/// Change observed on a watched folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailEvent {
    /// What happened.
    pub kind: MailEventKind,
    /// Account the folder belongs to.
    pub account_id: AccountId,
    /// Folder path.
    pub folder: String,
}

/// Kind of [`MailEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MailEventKind {
    /// The folder now holds `count` messages.
    NewMail {
        /// Message count from EXISTS.
        count: u32,
    },
    /// The message at `seq_num` was expunged.
    Expunge {
        /// Sequence number from EXPUNGE.
        seq_num: u32,
    },
}

/// Turns unsolicited responses into [`MailEvent`]s.
///
/// Disarmed while the folder is being opened: the EXISTS of a SELECT is
/// the current count, not a change.
pub(super) struct EventHandler {
    account_id: AccountId,
    folder: String,
    armed: AtomicBool,
    queue: mpsc::Sender<MailEvent>,
}

impl EventHandler {
    pub(super) fn new(account_id: AccountId, folder: String, queue: mpsc::Sender<MailEvent>) -> Self {
        Self {
            account_id,
            folder,
            armed: AtomicBool::new(false),
            queue,
        }
    }

    pub(super) fn arm(&self) {
        self.armed.store(true, Ordering::Release);
    }

    pub(super) fn disarm(&self) {
        self.armed.store(false, Ordering::Release);
    }

    fn push(&self, kind: MailEventKind) {
        if !self.armed.load(Ordering::Acquire) {
            return;
        }
        let event = MailEvent {
            kind,
            account_id: self.account_id,
            folder: self.folder.clone(),
        };
        match self.queue.try_send(event) {
            Ok(()) => trace!(account = %self.account_id, ?kind, "Queued mail event"),
            Err(TrySendError::Full(event)) => {
                warn!(account = %event.account_id, kind = ?event.kind, "Event buffer full, dropping event");
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

impl UnsolicitedHandler for EventHandler {
    fn on_exists(&self, count: u32) {
        self.push(MailEventKind::NewMail { count });
    }

    fn on_expunge(&self, seq: SeqNum) {
        self.push(MailEventKind::Expunge { seq_num: seq.get() });
    }
}

/// Moves events from a connection's buffer to the shared channel until the
/// buffer closes or the shared receiver goes away.
pub(super) async fn forward(
    mut buffer: mpsc::Receiver<MailEvent>,
    shared: mpsc::Sender<MailEvent>,
    send_timeout: Duration,
) {
    while let Some(event) = buffer.recv().await {
        match shared.send_timeout(event, send_timeout).await {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(event)) => {
                warn!(
                    account = %event.account_id,
                    kind = ?event.kind,
                    "Event consumer too slow, dropping event"
                );
            }
            Err(SendTimeoutError::Closed(_)) => break,
        }
    }
}
