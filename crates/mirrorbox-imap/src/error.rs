//! Error types for the IMAP client.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during IMAP operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error during network operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS handshake or encryption error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Invalid DNS name for TLS.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// TCP connect or TLS handshake did not finish in time.
    #[error("Connect to {host} timed out after {timeout:?}")]
    ConnectTimeout {
        /// Host being dialed.
        host: String,
        /// Configured connect timeout.
        timeout: Duration,
    },

    /// A read or write exceeded its deadline.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Server response could not be parsed.
    #[error("Parse error at position {position}: {message}")]
    Parse {
        /// Byte position where the error occurred.
        position: usize,
        /// Description of what went wrong.
        message: String,
    },

    /// Authentication failed or no usable mechanism exists.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Server returned NO.
    #[error("Server returned NO: {0}")]
    No(String),

    /// Server returned BAD.
    #[error("Server returned BAD: {0}")]
    Bad(String),

    /// Server sent BYE.
    #[error("Server sent BYE: {0}")]
    Bye(String),

    /// Protocol violation or unexpected data.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A capability required by the operation is not advertised.
    #[error("Server does not support {0}")]
    MissingCapability(&'static str),

    /// The operation was cancelled before the server answered.
    #[error("Operation cancelled")]
    Cancelled,

    /// The presented certificate does not match the pinned fingerprint.
    #[error("Certificate for {host} does not match pinned fingerprint")]
    CertificateMismatch {
        /// Host whose certificate changed.
        host: String,
    },
}

/// Coarse classification used by callers to pick a recovery strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Dial, TLS or deadline failure. Retry with backoff.
    Transport,
    /// Bad credentials. Surface to the user, never retry automatically.
    Authentication,
    /// Unexpected server response. Abort the operation and recycle the connection.
    Protocol,
    /// Server lacks an extension. Degrade, not an error for the account.
    Capability,
    /// Cancelled by the caller.
    Cancelled,
}

impl Error {
    /// Returns the recovery class of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_)
            | Self::Tls(_)
            | Self::InvalidDnsName(_)
            | Self::ConnectTimeout { .. }
            | Self::Timeout(_)
            | Self::Bye(_) => ErrorKind::Transport,
            Self::Auth(_) | Self::CertificateMismatch { .. } => ErrorKind::Authentication,
            Self::Parse { .. } | Self::No(_) | Self::Bad(_) | Self::Protocol(_) => {
                ErrorKind::Protocol
            }
            Self::MissingCapability(_) => ErrorKind::Capability,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Returns true if a reconnect with backoff may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transport)
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
