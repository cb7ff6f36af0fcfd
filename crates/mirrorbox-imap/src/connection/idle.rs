//! IMAP IDLE (RFC 2177).
//!
//! IDLE parks the connection so the server can push changes. RFC 2177 lets
//! servers drop an idle client after 30 minutes, so callers re-issue IDLE on
//! a shorter cycle: [`IdleHandle::wait`] takes the remaining cycle time and
//! reports [`IdleEvent::Timeout`] when it runs out.

#![allow(clippy::missing_errors_doc)]

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use super::client::{Client, Selected};
use crate::command::Command;
use crate::parser::{Response, UntaggedResponse, parse_response};
use crate::types::{SeqNum, Status, UidSet};
use crate::{Error, Result};

/// Something observed while idling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdleEvent {
    /// The mailbox now holds this many messages.
    Exists(u32),
    /// The message at this sequence number was removed.
    Expunge(SeqNum),
    /// Messages removed, by UID (QRESYNC).
    Vanished(UidSet),
    /// Some other untagged response (flag change, RECENT, ...).
    Other,
    /// The wait elapsed without a response.
    Timeout,
    /// The server ended IDLE on its own with a tagged OK.
    Terminated,
}

/// An active IDLE command. End it with [`IdleHandle::done`].
///
/// Dropping the handle without `done` leaves the connection unusable.
pub struct IdleHandle<'a, S> {
    client: &'a mut Client<S, Selected>,
    tag: String,
    terminated: bool,
}

impl<S> Client<S, Selected>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Enters IDLE.
    pub async fn idle(&mut self) -> Result<IdleHandle<'_, S>> {
        if !self.supports_idle() {
            return Err(Error::MissingCapability("IDLE"));
        }
        let tag = self.send(&Command::Idle).await?;
        self.await_continuation(&tag).await?;
        debug!("{tag} idling in {}", self.mailbox());
        Ok(IdleHandle {
            client: self,
            tag,
            terminated: false,
        })
    }
}

impl<S> IdleHandle<'_, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Waits up to `duration` for the next server response.
    ///
    /// Cancel-safe: a response that arrives partially before the deadline is
    /// kept for the next call. The registered handler sees EXISTS, EXPUNGE
    /// and VANISHED before they are returned here.
    pub async fn wait(&mut self, duration: Duration) -> Result<IdleEvent> {
        if self.terminated {
            return Ok(IdleEvent::Terminated);
        }
        let Some(raw) = self.client.stream.read_response_within(duration).await? else {
            return Ok(IdleEvent::Timeout);
        };
        let response = parse_response(&raw)?;
        match response {
            Response::Untagged(untagged) => {
                self.client.observe(&untagged);
                Ok(match untagged {
                    UntaggedResponse::Exists(n) => IdleEvent::Exists(n),
                    UntaggedResponse::Expunge(seq) => IdleEvent::Expunge(seq),
                    UntaggedResponse::Vanished { uids, .. } => IdleEvent::Vanished(uids),
                    UntaggedResponse::Condition {
                        status: Status::Bye,
                        text,
                        ..
                    } => return Err(Error::Bye(text)),
                    _ => IdleEvent::Other,
                })
            }
            Response::Tagged {
                tag, status, text, ..
            } if tag == self.tag => {
                self.client.in_flight = false;
                self.terminated = true;
                match status {
                    Status::Ok => Ok(IdleEvent::Terminated),
                    Status::No => Err(Error::No(text)),
                    _ => Err(Error::Bad(text)),
                }
            }
            Response::Tagged { tag, .. } => Err(Error::Protocol(format!(
                "unexpected tag {tag} during IDLE"
            ))),
            Response::Continuation(_) => Err(Error::Protocol(
                "unexpected continuation during IDLE".to_string(),
            )),
        }
    }

    /// Sends DONE and waits for IDLE to complete. Responses that raced the
    /// DONE still reach the handler.
    pub async fn done(self) -> Result<()> {
        if self.terminated {
            return Ok(());
        }
        self.client
            .stream
            .write_all(&Command::Done.serialize(""))
            .await?;
        self.client.collect(&self.tag, false).await.map(drop)
    }
}
