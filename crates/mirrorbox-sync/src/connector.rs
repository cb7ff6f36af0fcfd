//! Establishing authenticated IMAP sessions.
//!
//! Every connection the engine opens goes through an [`ImapConnector`], so
//! the IDLE layer and the sync engine can run against scripted streams in
//! tests and dial counts can be observed.

use std::future::Future;
use std::sync::Arc;

use mirrorbox_imap::{Authenticated, Client, ImapStream, TrustPolicy, UnsolicitedHandler};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::Result;
use crate::account::Account;
use crate::config::ConnectionConfig;
use crate::credentials::{self, CredentialStore};

/// Opens logged-in sessions for an account.
pub trait ImapConnector: Send + Sync + 'static {
    /// Transport the sessions run over.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Dials, negotiates TLS and logs in. `handler` observes unsolicited
    /// mailbox changes for the lifetime of the session.
    fn connect(
        &self,
        account: &Account,
        handler: Option<Arc<dyn UnsolicitedHandler>>,
    ) -> impl Future<Output = Result<Client<Self::Stream, Authenticated>>> + Send;
}

/// Connector that dials the account's real server.
pub struct NetworkConnector {
    credentials: Arc<dyn CredentialStore>,
    connection: ConnectionConfig,
    trust: TrustPolicy,
}

impl NetworkConnector {
    /// Creates a connector with Web PKI certificate validation.
    #[must_use]
    pub fn new(credentials: Arc<dyn CredentialStore>, connection: ConnectionConfig) -> Self {
        Self {
            credentials,
            connection,
            trust: TrustPolicy::WebPki,
        }
    }

    /// Replaces the certificate trust policy.
    #[must_use]
    pub fn with_trust(mut self, trust: TrustPolicy) -> Self {
        self.trust = trust;
        self
    }
}

impl ImapConnector for NetworkConnector {
    type Stream = ImapStream;

    async fn connect(
        &self,
        account: &Account,
        handler: Option<Arc<dyn UnsolicitedHandler>>,
    ) -> Result<Client<ImapStream, Authenticated>> {
        let credentials = credentials::resolve(self.credentials.as_ref(), account)?;
        let mut config = account.imap_config(&self.connection);
        config.trust = self.trust.clone();
        debug!(account = %account.email, host = %config.host, "Dialing");
        let client = mirrorbox_imap::connect(&config, handler).await?;
        Ok(client.login(&credentials).await?)
    }
}
