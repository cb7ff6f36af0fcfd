//! Connection establishment and the type-state client.

#![allow(clippy::missing_errors_doc)]

pub mod client;
mod config;
pub(crate) mod framed;
pub mod idle;
mod stream;
pub mod trust;

use std::sync::Arc;

use tracing::{debug, info};

pub use self::client::{Authenticated, Client, NotAuthenticated, Selected, UidMapping};
pub use self::config::{Config, ConfigBuilder, Security};
pub use self::framed::FramedStream;
pub use self::idle::{IdleEvent, IdleHandle};
pub use self::stream::{ImapStream, dial};
pub use self::trust::{Fingerprint, MemoryPinStore, PinStore, TrustPolicy};
use crate::handler::UnsolicitedHandler;
use crate::types::Capability;
use crate::{Error, Result};

/// Dials `config`, negotiates TLS as configured and reads the greeting.
///
/// `handler`, when given, observes unsolicited mailbox changes for the
/// lifetime of the connection.
pub async fn connect(
    config: &Config,
    handler: Option<Arc<dyn UnsolicitedHandler>>,
) -> Result<Client<ImapStream, NotAuthenticated>> {
    let stream = dial(config).await?;
    let io_timeout = Some(config.io_timeout);
    let client = match handler {
        Some(h) => Client::from_stream_with_handler(stream, io_timeout, h).await?,
        None => Client::from_stream(stream, io_timeout).await?,
    };

    if config.security != Security::StartTls {
        info!("Connected to {}:{} ({:?})", config.host, config.port, config.security);
        return Ok(client);
    }

    if !client.has_capability(&Capability::StartTls) {
        return Err(Error::MissingCapability("STARTTLS"));
    }
    let (plain, tags, handler) = client.starttls().await?;
    let tls = plain.upgrade(config).await?;
    debug!("STARTTLS handshake with {} complete", config.host);
    let client = Client::resume(tls, io_timeout, tags, handler).await?;
    info!("Connected to {}:{} (STARTTLS)", config.host, config.port);
    Ok(client)
}
