//! Credential lookup.
//!
//! The engine only reads secrets. Storage (and OAuth2 token refresh) is
//! owned by the application, which writes into the same store:
//! - [`KeyringStore`]: the platform keyring (Secret Service, Keychain,
//!   Credential Manager)
//! - [`MemoryStore`]: process-local, for tests and embedding

use std::collections::HashMap;
use std::sync::Mutex;

use keyring::Entry;
use mirrorbox_imap::Credentials;
use tracing::{debug, warn};

use crate::account::{Account, AccountId, AuthKind};

/// Service name used for keyring entries.
const SERVICE_NAME: &str = "mirrorbox";

/// Credential type identifier for IMAP passwords.
const PASSWORD_CREDENTIAL: &str = "imap";

/// Credential type identifier for `OAuth2` access tokens.
const OAUTH_TOKEN_CREDENTIAL: &str = "oauth_token";

/// Error type for credential operations.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// Failed to access keyring.
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    /// Nothing stored for the account.
    #[error("No {kind} stored for account {account}")]
    Missing {
        /// Account the lookup was for.
        account: AccountId,
        /// `password` or `oauth token`.
        kind: &'static str,
    },
}

/// Result type for credential operations.
pub type CredentialResult<T> = std::result::Result<T, CredentialError>;

/// Source of account secrets.
pub trait CredentialStore: Send + Sync {
    /// IMAP password for the account.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    fn password(&self, account: AccountId) -> CredentialResult<Option<String>>;

    /// Current `OAuth2` access token for the account.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    fn oauth_token(&self, account: AccountId) -> CredentialResult<Option<String>>;
}

/// Resolves the login credentials for `account` according to its auth kind.
///
/// # Errors
///
/// Returns [`CredentialError::Missing`] when the store holds nothing.
pub fn resolve(store: &dyn CredentialStore, account: &Account) -> crate::Result<Credentials> {
    let id = account.require_id()?;
    let user = account.imap.username.clone();
    let credentials = match account.imap.auth {
        AuthKind::Password => store
            .password(id)?
            .map(|password| Credentials::password(user, password))
            .ok_or(CredentialError::Missing {
                account: id,
                kind: "password",
            })?,
        AuthKind::OAuth2 => store
            .oauth_token(id)?
            .map(|token| Credentials::oauth2(user, token))
            .ok_or(CredentialError::Missing {
                account: id,
                kind: "oauth token",
            })?,
    };
    Ok(credentials)
}

/// Generates the keyring entry key for a credential.
fn credential_key(account_id: AccountId, credential_type: &str) -> String {
    format!("{SERVICE_NAME}_{credential_type}_{}", account_id.0)
}

/// Platform keyring store.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyringStore;

impl KeyringStore {
    /// Creates the store.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn get(account_id: AccountId, credential_type: &str) -> CredentialResult<Option<String>> {
        let key = credential_key(account_id, credential_type);
        let entry = Entry::new(SERVICE_NAME, &key)?;
        match entry.get_password() {
            Ok(secret) => {
                debug!("Retrieved {credential_type} for account {account_id}");
                Ok(Some(secret))
            }
            Err(keyring::Error::NoEntry) => {
                debug!("No {credential_type} found for account {account_id}");
                Ok(None)
            }
            Err(e) => {
                warn!("Failed to retrieve {credential_type} for account {account_id}: {e}");
                Err(e.into())
            }
        }
    }

    fn set(account_id: AccountId, credential_type: &str, secret: &str) -> CredentialResult<()> {
        let key = credential_key(account_id, credential_type);
        Entry::new(SERVICE_NAME, &key)?.set_password(secret)?;
        debug!("Stored {credential_type} for account {account_id}");
        Ok(())
    }

    /// Stores the IMAP password.
    ///
    /// # Errors
    ///
    /// Returns an error if the keyring operation fails.
    pub fn store_password(&self, account_id: AccountId, password: &str) -> CredentialResult<()> {
        Self::set(account_id, PASSWORD_CREDENTIAL, password)
    }

    /// Stores the `OAuth2` access token.
    ///
    /// # Errors
    ///
    /// Returns an error if the keyring operation fails.
    pub fn store_oauth_token(&self, account_id: AccountId, token: &str) -> CredentialResult<()> {
        Self::set(account_id, OAUTH_TOKEN_CREDENTIAL, token)
    }

    /// Deletes every secret stored for the account. Missing entries are not
    /// an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the keyring operation fails.
    pub fn delete_account(&self, account_id: AccountId) -> CredentialResult<()> {
        for credential_type in [PASSWORD_CREDENTIAL, OAUTH_TOKEN_CREDENTIAL] {
            let key = credential_key(account_id, credential_type);
            match Entry::new(SERVICE_NAME, &key)?.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => {}
                Err(e) => return Err(e.into()),
            }
        }
        debug!("Deleted credentials for account {account_id}");
        Ok(())
    }
}

impl CredentialStore for KeyringStore {
    fn password(&self, account: AccountId) -> CredentialResult<Option<String>> {
        Self::get(account, PASSWORD_CREDENTIAL)
    }

    fn oauth_token(&self, account: AccountId) -> CredentialResult<Option<String>> {
        Self::get(account, OAUTH_TOKEN_CREDENTIAL)
    }
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    secrets: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the IMAP password.
    pub fn set_password(&self, account_id: AccountId, password: impl Into<String>) {
        self.put(credential_key(account_id, PASSWORD_CREDENTIAL), password.into());
    }

    /// Sets the `OAuth2` access token.
    pub fn set_oauth_token(&self, account_id: AccountId, token: impl Into<String>) {
        self.put(credential_key(account_id, OAUTH_TOKEN_CREDENTIAL), token.into());
    }

    fn put(&self, key: String, secret: String) {
        if let Ok(mut secrets) = self.secrets.lock() {
            secrets.insert(key, secret);
        }
    }

    fn get(&self, key: &str) -> Option<String> {
        self.secrets.lock().ok().and_then(|s| s.get(key).cloned())
    }
}

impl CredentialStore for MemoryStore {
    fn password(&self, account: AccountId) -> CredentialResult<Option<String>> {
        Ok(self.get(&credential_key(account, PASSWORD_CREDENTIAL)))
    }

    fn oauth_token(&self, account: AccountId) -> CredentialResult<Option<String>> {
        Ok(self.get(&credential_key(account, OAUTH_TOKEN_CREDENTIAL)))
    }
}
