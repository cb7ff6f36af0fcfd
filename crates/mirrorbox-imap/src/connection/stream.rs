//! Socket establishment: TCP, implicit TLS and STARTTLS upgrade.

#![allow(clippy::missing_errors_doc)]

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::task::{Context, Poll};

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::debug;

use super::config::Config;
use super::trust;
use crate::{Error, Result};

/// A plaintext or TLS socket.
pub enum ImapStream {
    /// Plaintext TCP.
    Plain(TcpStream),
    /// TLS over TCP (boxed to keep the enum small).
    Tls(Box<TlsStream<TcpStream>>),
}

impl ImapStream {
    /// Returns true if the stream is encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    /// Upgrades a plaintext socket after a successful STARTTLS.
    pub async fn upgrade(self, config: &Config) -> Result<Self> {
        match self {
            Self::Plain(tcp) => handshake(tcp, config).await,
            Self::Tls(_) => Err(Error::Protocol("stream is already TLS".to_string())),
        }
    }
}

/// Dials the server, bounded by `config.connect_timeout`. Performs the TLS
/// handshake for [`super::Security::Implicit`].
pub async fn dial(config: &Config) -> Result<ImapStream> {
    let timeout = config.connect_timeout;
    let attempt = async {
        let tcp = TcpStream::connect((config.host.as_str(), config.port)).await?;
        tcp.set_nodelay(true)?;
        debug!("TCP connected to {}:{}", config.host, config.port);
        if config.security == super::Security::Implicit {
            handshake(tcp, config).await
        } else {
            Ok(ImapStream::Plain(tcp))
        }
    };
    tokio::time::timeout(timeout, attempt)
        .await
        .map_err(|_| Error::ConnectTimeout {
            host: config.host.clone(),
            timeout,
        })?
}

async fn handshake(tcp: TcpStream, config: &Config) -> Result<ImapStream> {
    let (tls_config, mismatch) = trust::client_config(&config.trust, &config.host)?;
    let connector = TlsConnector::from(Arc::new(tls_config));
    let server_name = ServerName::try_from(config.host.clone())?;
    match connector.connect(server_name, tcp).await {
        Ok(tls) => Ok(ImapStream::Tls(Box::new(tls))),
        Err(_) if mismatch.load(Ordering::SeqCst) => Err(Error::CertificateMismatch {
            host: config.host.clone(),
        }),
        Err(e) => Err(Error::Io(e)),
    }
}

impl AsyncRead for ImapStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Self::Tls(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ImapStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Self::Tls(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_flush(cx),
            Self::Tls(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Self::Tls(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}
