//! Account model types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Unique identifier for an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(pub i64);

impl AccountId {
    /// Create a new account ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Security/encryption mode for the IMAP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Security {
    /// No encryption (not recommended).
    None,
    /// Implicit TLS (connect directly with TLS).
    #[default]
    Tls,
    /// STARTTLS upgrade after plaintext connect.
    StartTls,
}

impl Security {
    /// Stable name used for storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Tls => "tls",
            Self::StartTls => "starttls",
        }
    }

    /// Inverse of [`Security::as_str`], defaulting to TLS.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "none" => Self::None,
            "starttls" => Self::StartTls,
            _ => Self::Tls,
        }
    }

    /// Get default port for the security mode.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::None | Self::StartTls => 143,
            Self::Tls => 993,
        }
    }
}

impl From<Security> for mirrorbox_imap::Security {
    fn from(security: Security) -> Self {
        match security {
            Security::None => Self::None,
            Security::Tls => Self::Implicit,
            Security::StartTls => Self::StartTls,
        }
    }
}

/// Which secret the credential store holds for the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AuthKind {
    /// LOGIN or SASL PLAIN with a password.
    #[default]
    Password,
    /// SASL XOAUTH2 / OAUTHBEARER with an access token refreshed upstream.
    OAuth2,
}

impl AuthKind {
    /// Stable name used for storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Password => "password",
            Self::OAuth2 => "oauth2",
        }
    }

    /// Inverse of [`AuthKind::as_str`], defaulting to password.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        if s == "oauth2" { Self::OAuth2 } else { Self::Password }
    }
}

/// IMAP server settings. Secrets live in the credential store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImapSettings {
    /// Server hostname.
    pub host: String,
    /// Server port (default: 993 for TLS, 143 for STARTTLS).
    pub port: u16,
    /// Security mode.
    pub security: Security,
    /// Username for authentication.
    pub username: String,
    /// Authentication strategy.
    pub auth: AuthKind,
}

/// Email account configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier (None for unsaved accounts).
    pub id: Option<AccountId>,
    /// Display name for the account.
    pub name: String,
    /// Email address.
    pub email: String,
    /// IMAP configuration.
    pub imap: ImapSettings,
    /// SMTP settings, passed through untouched to the sender.
    pub smtp: Option<serde_json::Value>,
    /// How often the scheduler re-syncs the account.
    #[serde(with = "crate::config::duration_secs")]
    pub sync_interval: Duration,
}

impl Default for Account {
    fn default() -> Self {
        Self {
            id: None,
            name: String::new(),
            email: String::new(),
            imap: ImapSettings::default(),
            smtp: None,
            sync_interval: Duration::from_secs(300),
        }
    }
}

impl Account {
    /// Create account with common defaults for well-known providers.
    #[must_use]
    pub fn with_email(email: &str) -> Self {
        let mut account = Self {
            email: email.to_string(),
            ..Default::default()
        };

        if let Some(domain) = email.split('@').nth(1) {
            let (name, host, auth) = match domain.to_lowercase().as_str() {
                "gmail.com" | "googlemail.com" => ("Gmail", "imap.gmail.com", AuthKind::OAuth2),
                "outlook.com" | "hotmail.com" | "live.com" => {
                    ("Outlook", "outlook.office365.com", AuthKind::OAuth2)
                }
                "yahoo.com" | "ymail.com" => ("Yahoo", "imap.mail.yahoo.com", AuthKind::Password),
                "icloud.com" | "me.com" | "mac.com" => {
                    ("iCloud", "imap.mail.me.com", AuthKind::Password)
                }
                "fastmail.com" | "fastmail.fm" => {
                    ("Fastmail", "imap.fastmail.com", AuthKind::Password)
                }
                other => {
                    account.name = other.to_string();
                    account.imap.host = format!("imap.{other}");
                    account.imap.port = Security::Tls.default_port();
                    account.imap.username = email.to_string();
                    return account;
                }
            };
            account.name = name.to_string();
            account.imap.host = host.to_string();
            account.imap.auth = auth;
        }

        account.imap.security = Security::Tls;
        account.imap.port = Security::Tls.default_port();
        account.imap.username = email.to_string();
        account
    }

    /// Returns the saved ID.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] for an account that was never stored.
    pub fn require_id(&self) -> crate::Result<AccountId> {
        self.id
            .ok_or_else(|| crate::Error::Config(format!("account {} is not saved", self.email)))
    }

    /// Builds the connection settings for this account.
    #[must_use]
    pub fn imap_config(&self, connection: &crate::config::ConnectionConfig) -> mirrorbox_imap::Config {
        let port = if self.imap.port == 0 {
            self.imap.security.default_port()
        } else {
            self.imap.port
        };
        mirrorbox_imap::Config::builder(&self.imap.host)
            .security(self.imap.security.into())
            .port(port)
            .connect_timeout(connection.connect_timeout)
            .io_timeout(connection.io_timeout)
            .build()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::ConnectionConfig;

    #[test]
    fn provider_defaults() {
        let gmail = Account::with_email("someone@gmail.com");
        assert_eq!(gmail.imap.host, "imap.gmail.com");
        assert_eq!(gmail.imap.port, 993);
        assert_eq!(gmail.imap.auth, AuthKind::OAuth2);
        assert_eq!(gmail.imap.username, "someone@gmail.com");

        let custom = Account::with_email("me@example.org");
        assert_eq!(custom.name, "example.org");
        assert_eq!(custom.imap.host, "imap.example.org");
        assert_eq!(custom.imap.auth, AuthKind::Password);
    }

    #[test]
    fn imap_config_uses_default_port_when_unset() {
        let mut account = Account::with_email("me@example.org");
        account.imap.port = 0;
        account.imap.security = Security::StartTls;
        let config = account.imap_config(&ConnectionConfig::default());
        assert_eq!(config.port, 143);
        assert_eq!(config.security, mirrorbox_imap::Security::StartTls);
    }

    #[test]
    fn unsaved_account_has_no_id() {
        assert!(Account::default().require_id().is_err());
    }

    #[test]
    fn security_storage_names() {
        for s in [Security::None, Security::Tls, Security::StartTls] {
            assert_eq!(Security::parse(s.as_str()), s);
        }
    }

    #[test]
    fn account_serializes_interval_as_seconds() {
        let account = Account::default();
        let json = serde_json::to_value(&account).unwrap();
        assert_eq!(json["sync_interval"], 300);
    }
}
