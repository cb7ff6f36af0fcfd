//! Greeting, STARTTLS and authentication.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

use super::Client;
use super::states::{Authenticated, NotAuthenticated};
use crate::auth::{Credentials, Mechanism};
use crate::command::{Command, TagGenerator};
use crate::connection::framed::FramedStream;
use crate::handler::UnsolicitedHandler;
use crate::parser::{Response, UntaggedResponse};
use crate::types::{Capabilities, ResponseCode, Status};
use crate::{Error, Result};

impl<S> Client<S, NotAuthenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Reads the greeting from a freshly connected stream.
    pub async fn from_stream(stream: S, io_timeout: Option<Duration>) -> Result<Self> {
        Self::greet(stream, io_timeout, None).await
    }

    /// Like [`Client::from_stream`], registering `handler` for unsolicited
    /// mailbox changes for the lifetime of the connection.
    pub async fn from_stream_with_handler(
        stream: S,
        io_timeout: Option<Duration>,
        handler: Arc<dyn UnsolicitedHandler>,
    ) -> Result<Self> {
        Self::greet(stream, io_timeout, Some(handler)).await
    }

    async fn greet(
        stream: S,
        io_timeout: Option<Duration>,
        handler: Option<Arc<dyn UnsolicitedHandler>>,
    ) -> Result<Self> {
        let mut client = Self {
            stream: FramedStream::new(stream, io_timeout),
            tags: TagGenerator::default(),
            capabilities: Capabilities::default(),
            handler,
            in_flight: false,
            state: NotAuthenticated,
        };
        match client.next_response().await? {
            Response::Untagged(UntaggedResponse::Condition {
                status: Status::Ok | Status::PreAuth,
                text,
                ..
            }) => debug!("Greeting: {text}"),
            Response::Untagged(UntaggedResponse::Condition {
                status: Status::Bye,
                text,
                ..
            }) => return Err(Error::Bye(text)),
            other => {
                return Err(Error::Protocol(format!("unexpected greeting: {other:?}")));
            }
        }
        if client.capabilities.is_empty() {
            client.refresh_capabilities().await?;
        }
        Ok(client)
    }

    /// Wraps a stream that was just upgraded to TLS. No greeting follows
    /// STARTTLS, so capabilities are requested directly.
    pub(crate) async fn resume(
        stream: S,
        io_timeout: Option<Duration>,
        tags: TagGenerator,
        handler: Option<Arc<dyn UnsolicitedHandler>>,
    ) -> Result<Self> {
        let mut client = Self {
            stream: FramedStream::new(stream, io_timeout),
            tags,
            capabilities: Capabilities::default(),
            handler,
            in_flight: false,
            state: NotAuthenticated,
        };
        client.refresh_capabilities().await?;
        Ok(client)
    }

    /// Issues STARTTLS and hands back the raw stream for the TLS handshake,
    /// together with the parts needed to [`Client::resume`] afterwards.
    pub(crate) async fn starttls(
        mut self,
    ) -> Result<(S, TagGenerator, Option<Arc<dyn UnsolicitedHandler>>)> {
        self.run(&Command::StartTls).await?;
        let io_timeout = self.stream.io_timeout();
        debug!("STARTTLS accepted, I/O timeout {io_timeout:?}");
        let stream = self.stream.into_inner()?;
        Ok((stream, self.tags, self.handler))
    }

    /// Authenticates with the strategy [`Mechanism::choose`] picks.
    pub async fn login(mut self, credentials: &Credentials) -> Result<Client<S, Authenticated>> {
        let mechanism = Mechanism::choose(credentials, &self.capabilities)?;
        info!("Authenticating {} with {mechanism:?}", credentials.user());

        let result = match (mechanism, credentials) {
            (Mechanism::Login, Credentials::Password { username, password }) => {
                self.run(&Command::Login {
                    username: username.clone(),
                    password: password.clone(),
                })
                .await
            }
            _ => self.authenticate(mechanism, credentials).await,
        };
        let completion = match result {
            Ok(completion) => completion,
            Err(Error::No(text)) => return Err(Error::Auth(text)),
            Err(e) => return Err(e),
        };

        let mut client = self.transition(Authenticated);
        let announced = completion
            .codes()
            .any(|c| matches!(c, ResponseCode::Capability(_)))
            || completion
                .untagged
                .iter()
                .any(|u| matches!(u, UntaggedResponse::Capability(_)));
        if !announced {
            client.refresh_capabilities().await?;
        }
        Ok(client)
    }

    async fn authenticate(
        &mut self,
        mechanism: Mechanism,
        credentials: &Credentials,
    ) -> Result<super::Completion> {
        let name = mechanism
            .sasl_name()
            .ok_or_else(|| Error::Auth("LOGIN is not a SASL mechanism".to_string()))?;
        let payload = mechanism
            .initial_response(credentials)
            .ok_or_else(|| Error::Auth(format!("{name} does not fit these credentials")))?;
        let sasl_ir = self.has_capability(&crate::types::Capability::SaslIr);

        let tag = self
            .send(&Command::Authenticate {
                mechanism: name,
                initial_response: sasl_ir.then(|| payload.clone()),
            })
            .await?;
        let mut pending = (!sasl_ir).then_some(payload);
        loop {
            match self.next_response().await? {
                Response::Continuation(challenge) => {
                    // A challenge after the payload is an error report
                    // (XOAUTH2 sends JSON); an empty reply ends the exchange.
                    let reply = pending.take().unwrap_or_default();
                    if reply.is_empty() {
                        debug!("SASL challenge after payload: {challenge}");
                    }
                    self.stream.write_all(format!("{reply}\r\n").as_bytes()).await?;
                }
                Response::Tagged {
                    tag: got,
                    status,
                    code,
                    text,
                } if got == tag => {
                    self.in_flight = false;
                    if let Some(ResponseCode::Capability(caps)) = &code {
                        self.capabilities = Capabilities::new(caps.clone());
                    }
                    super::check_status(status, text)?;
                    return Ok(super::Completion {
                        untagged: Vec::new(),
                        code,
                    });
                }
                Response::Tagged { tag: got, .. } => {
                    return Err(Error::Protocol(format!("expected tag {tag}, got {got}")));
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

    /// Ends the session.
    pub async fn logout(mut self) -> Result<()> {
        self.run(&Command::Logout).await.map(drop)
    }
}
