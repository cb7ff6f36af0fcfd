//! Type-state IMAP client.
//!
//! The connection states of RFC 3501 are tracked in the type:
//!
//! - `NotAuthenticated`: after the greeting
//! - `Authenticated`: after LOGIN/AUTHENTICATE
//! - `Selected`: after SELECT/EXAMINE
//!
//! Each state only exposes the commands valid in it. Every command goes
//! through one response loop that feeds unsolicited EXISTS/EXPUNGE/VANISHED
//! to the registered [`UnsolicitedHandler`], refreshes capabilities when the
//! server volunteers them, and maps NO/BAD/BYE to errors.

#![allow(clippy::missing_errors_doc)]

mod authenticated;
mod not_authenticated;
mod selected;
mod states;

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, trace, warn};

pub use self::selected::UidMapping;
pub use self::states::{Authenticated, NotAuthenticated, Selected};
use super::framed::FramedStream;
use crate::command::{Command, TagGenerator};
use crate::handler::UnsolicitedHandler;
use crate::parser::{Response, UntaggedResponse, parse_response};
use crate::types::{Capabilities, Capability, ResponseCode, Status};
use crate::{Error, Result};

/// IMAP client connection.
pub struct Client<S, State> {
    pub(crate) stream: FramedStream<S>,
    pub(crate) tags: TagGenerator,
    pub(crate) capabilities: Capabilities,
    pub(crate) handler: Option<Arc<dyn UnsolicitedHandler>>,
    /// Set while a command awaits its tagged response. Still set on entry
    /// means an earlier command was abandoned mid-flight.
    pub(crate) in_flight: bool,
    pub(crate) state: State,
}

impl<S, State: std::fmt::Debug> std::fmt::Debug for Client<S, State> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("tags", &self.tags)
            .field("capabilities", &self.capabilities)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Result of a completed command.
#[derive(Debug, Default)]
pub(crate) struct Completion {
    /// Untagged responses received before the tagged OK.
    pub untagged: Vec<UntaggedResponse>,
    /// Response code of the tagged OK.
    pub code: Option<ResponseCode>,
}

impl Completion {
    /// Response codes carried by untagged OK lines, then the tagged one.
    pub fn codes(&self) -> impl Iterator<Item = &ResponseCode> {
        self.untagged
            .iter()
            .filter_map(|u| match u {
                UntaggedResponse::Condition {
                    status: Status::Ok,
                    code: Some(code),
                    ..
                } => Some(code),
                _ => None,
            })
            .chain(self.code.iter())
    }
}

impl<S, State> Client<S, State>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// The server's current capability set.
    #[must_use]
    pub const fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Returns true if `cap` is advertised.
    #[must_use]
    pub fn has_capability(&self, cap: &Capability) -> bool {
        self.capabilities.has(cap)
    }

    /// Returns true if the server supports IDLE (RFC 2177).
    #[must_use]
    pub fn supports_idle(&self) -> bool {
        self.has_capability(&Capability::Idle)
    }

    /// Returns true if the server supports CONDSTORE (RFC 7162).
    #[must_use]
    pub fn supports_condstore(&self) -> bool {
        self.has_capability(&Capability::CondStore)
    }

    /// Returns true if the server supports UIDPLUS (RFC 4315).
    #[must_use]
    pub fn supports_uidplus(&self) -> bool {
        self.has_capability(&Capability::UidPlus)
    }

    /// Returns true if the server supports MOVE (RFC 6851).
    #[must_use]
    pub fn supports_move(&self) -> bool {
        self.has_capability(&Capability::Move)
    }

    /// Sends NOOP. Pending unsolicited responses reach the handler.
    pub async fn noop(&mut self) -> Result<()> {
        self.run(&Command::Noop).await.map(drop)
    }

    /// Asks the server for its capabilities and stores them.
    pub async fn refresh_capabilities(&mut self) -> Result<&Capabilities> {
        self.run(&Command::Capability).await?;
        Ok(&self.capabilities)
    }

    pub(crate) fn transition<T>(self, state: T) -> Client<S, T> {
        Client {
            stream: self.stream,
            tags: self.tags,
            capabilities: self.capabilities,
            handler: self.handler,
            in_flight: self.in_flight,
            state,
        }
    }

    /// Sends `command` and returns its tag.
    pub(crate) async fn send(&mut self, command: &Command) -> Result<String> {
        if self.in_flight {
            return Err(Error::Protocol(
                "connection out of sync after an abandoned command".to_string(),
            ));
        }
        let tag = self.tags.next_tag();
        debug!("{tag} {}", command.name());
        self.in_flight = true;
        self.stream.write_all(&command.serialize(&tag)).await?;
        Ok(tag)
    }

    /// Sends `command` and collects everything up to its tagged completion.
    pub(crate) async fn run(&mut self, command: &Command) -> Result<Completion> {
        let tag = self.send(command).await?;
        self.collect(&tag, matches!(command, Command::Logout)).await
    }

    /// Reads and parses the next response, observing unsolicited data.
    pub(crate) async fn next_response(&mut self) -> Result<Response> {
        let raw = self.stream.read_response().await?;
        let response = parse_response(&raw)?;
        if let Response::Untagged(untagged) = &response {
            self.observe(untagged);
        }
        Ok(response)
    }

    /// Feeds one untagged response to capability tracking and the handler.
    pub(crate) fn observe(&mut self, untagged: &UntaggedResponse) {
        match untagged {
            UntaggedResponse::Capability(caps)
            | UntaggedResponse::Condition {
                code: Some(ResponseCode::Capability(caps)),
                ..
            } => self.capabilities = Capabilities::new(caps.clone()),
            UntaggedResponse::Condition {
                code: Some(ResponseCode::Alert),
                text,
                ..
            } => warn!("Server alert: {text}"),
            _ => {}
        }
        let Some(handler) = &self.handler else {
            return;
        };
        match untagged {
            UntaggedResponse::Exists(n) => handler.on_exists(*n),
            UntaggedResponse::Expunge(seq) => handler.on_expunge(*seq),
            UntaggedResponse::Vanished {
                earlier: false,
                uids,
            } => handler.on_vanished(uids),
            _ => {}
        }
    }

    /// Reads until the tagged response for `tag`.
    ///
    /// An untagged BYE aborts with [`Error::Bye`] unless `expect_bye` is set
    /// (LOGOUT), in which case it is collected like any other response.
    pub(crate) async fn collect(&mut self, tag: &str, expect_bye: bool) -> Result<Completion> {
        let mut completion = Completion::default();
        loop {
            match self.next_response().await? {
                Response::Tagged {
                    tag: got,
                    status,
                    code,
                    text,
                } => {
                    if got != tag {
                        return Err(Error::Protocol(format!(
                            "expected tag {tag}, got {got}"
                        )));
                    }
                    self.in_flight = false;
                    trace!("{tag} {status:?} {text}");
                    if let Some(ResponseCode::Capability(caps)) = &code {
                        self.capabilities = Capabilities::new(caps.clone());
                    }
                    check_status(status, text)?;
                    completion.code = code;
                    return Ok(completion);
                }
                Response::Untagged(UntaggedResponse::Condition {
                    status: Status::Bye,
                    text,
                    ..
                }) if !expect_bye => return Err(Error::Bye(text)),
                Response::Untagged(untagged) => completion.untagged.push(untagged),
                Response::Continuation(text) => {
                    return Err(Error::Protocol(format!("unexpected continuation: {text}")));
                }
            }
        }
    }

    /// Reads until the server asks for more data. Untagged responses in
    /// between are observed and discarded.
    pub(crate) async fn await_continuation(&mut self, tag: &str) -> Result<String> {
        loop {
            match self.next_response().await? {
                Response::Continuation(text) => return Ok(text),
                Response::Tagged {
                    tag: got,
                    status,
                    text,
                    ..
                } if got == tag => {
                    self.in_flight = false;
                    check_status(status, text)?;
                    return Err(Error::Protocol(
                        "command completed before continuation".to_string(),
                    ));
                }
                Response::Tagged { tag: got, .. } => {
                    return Err(Error::Protocol(format!(
                        "expected tag {tag}, got {got}"
                    )));
                }
                Response::Untagged(UntaggedResponse::Condition {
                    status: Status::Bye,
                    text,
                    ..
                }) => return Err(Error::Bye(text)),
                Response::Untagged(_) => {}
            }
        }
    }
}

fn check_status(status: Status, text: String) -> Result<()> {
    match status {
        Status::Ok | Status::PreAuth => Ok(()),
        Status::No => Err(Error::No(text)),
        Status::Bad => Err(Error::Bad(text)),
        Status::Bye => Err(Error::Bye(text)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use std::time::Duration;

    use tokio_test::io::{Builder, Mock};

    use super::*;
    use crate::handler::recording::Recorder;

    /// Builds an authenticated client over a scripted stream.
    pub(crate) fn authenticated(mock: Mock, caps: &[&str]) -> Client<Mock, Authenticated> {
        Client {
            stream: FramedStream::new(mock, Some(Duration::from_secs(5))),
            tags: TagGenerator::default(),
            capabilities: Capabilities::new(caps.iter().map(|c| Capability::parse(c)).collect()),
            handler: None,
            in_flight: false,
            state: Authenticated,
        }
    }

    #[tokio::test]
    async fn noop_delivers_unsolicited_to_handler() {
        let mock = Builder::new()
            .write(b"A0001 NOOP\r\n")
            .read(b"* 22 EXISTS\r\n* 3 EXPUNGE\r\nA0001 OK NOOP completed\r\n")
            .build();
        let recorder = Arc::new(Recorder::default());
        let mut client = authenticated(mock, &[]);
        client.handler = Some(recorder.clone());
        client.noop().await.unwrap();
        assert_eq!(recorder.events(), vec!["exists 22", "expunge 3"]);
    }

    #[tokio::test]
    async fn no_maps_to_error() {
        let mock = Builder::new()
            .write(b"A0001 NOOP\r\n")
            .read(b"A0001 NO try later\r\n")
            .build();
        let mut client = authenticated(mock, &[]);
        let err = client.noop().await.unwrap_err();
        assert!(matches!(err, Error::No(ref t) if t == "try later"));
    }

    #[tokio::test]
    async fn untagged_bye_aborts_command() {
        let mock = Builder::new()
            .write(b"A0001 NOOP\r\n")
            .read(b"* BYE shutting down\r\n")
            .build();
        let mut client = authenticated(mock, &[]);
        let err = client.noop().await.unwrap_err();
        assert!(matches!(err, Error::Bye(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn capability_code_in_tagged_ok_is_stored() {
        let mock = Builder::new()
            .write(b"A0001 NOOP\r\n")
            .read(b"A0001 OK [CAPABILITY IMAP4rev1 IDLE MOVE] done\r\n")
            .build();
        let mut client = authenticated(mock, &["IMAP4rev1"]);
        client.noop().await.unwrap();
        assert!(client.supports_idle());
        assert!(client.supports_move());
    }

    #[tokio::test]
    async fn abandoned_command_poisons_connection() {
        let mock = Builder::new().build();
        let mut client = authenticated(mock, &[]);
        client.in_flight = true;
        let err = client.noop().await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[tokio::test]
    async fn mismatched_tag_is_protocol_error() {
        let mock = Builder::new()
            .write(b"A0001 NOOP\r\n")
            .read(b"B0007 OK what\r\n")
            .build();
        let mut client = authenticated(mock, &[]);
        assert!(matches!(
            client.noop().await.unwrap_err(),
            Error::Protocol(_)
        ));
    }
}
