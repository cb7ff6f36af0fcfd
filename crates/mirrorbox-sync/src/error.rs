//! Error types for the sync engine.

use thiserror::Error;

use crate::account::AccountId;
use crate::credentials::CredentialError;

/// Errors that can occur while synchronizing.
#[derive(Debug, Error)]
pub enum Error {
    /// IMAP operation failed.
    #[error("IMAP error: {0}")]
    Imap(#[from] mirrorbox_imap::Error),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Credential lookup failed.
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Account not found.
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// Folder not found in the mirror.
    #[error("Folder not found: {0}")]
    FolderNotFound(String),

    /// The folder's UID epoch changed since the last sync. The cached UIDs
    /// cannot address server messages until the folder is resynced.
    #[error("UID validity of {0} changed, resync required")]
    StaleEpoch(String),

    /// The connectivity monitor reports no network.
    #[error("Offline")]
    Offline,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns true if retrying later may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Imap(e) => e.is_retryable(),
            Self::Offline | Self::Io(_) => true,
            _ => false,
        }
    }

    /// Returns true for errors that must be surfaced to the user instead of
    /// retried.
    #[must_use]
    pub const fn is_authentication(&self) -> bool {
        match self {
            Self::Imap(e) => matches!(e.kind(), mirrorbox_imap::ErrorKind::Authentication),
            Self::Credential(_) => true,
            _ => false,
        }
    }

    /// Returns true if the operation was cut short by a cancellation signal.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Imap(mirrorbox_imap::Error::Cancelled))
    }

    /// Returns true when the IMAP connection must be discarded.
    #[must_use]
    pub const fn is_protocol(&self) -> bool {
        matches!(
            self,
            Self::Imap(e) if matches!(e.kind(), mirrorbox_imap::ErrorKind::Protocol)
        )
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
