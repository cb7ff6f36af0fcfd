//! Authentication strategies.
//!
//! The mechanism is picked once per connection from the credentials and the
//! capability set the server advertised before login:
//!
//! | Credentials | Preference |
//! |-------------|------------|
//! | password    | `LOGIN`, unless `LOGINDISABLED`; then `AUTHENTICATE PLAIN` |
//! | `OAuth2`    | `XOAUTH2`, then `OAUTHBEARER` (RFC 7628) |

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::types::{Capabilities, Capability};
use crate::{Error, Result};

/// Account credentials.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// User name and password.
    Password {
        /// Login name.
        username: String,
        /// Password.
        password: String,
    },
    /// `OAuth2` bearer token. Refreshing is the caller's job.
    OAuth2 {
        /// Account e-mail address.
        user: String,
        /// Current access token.
        access_token: String,
    },
}

impl Credentials {
    /// Password credentials.
    #[must_use]
    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Password {
            username: username.into(),
            password: password.into(),
        }
    }

    /// `OAuth2` credentials.
    #[must_use]
    pub fn oauth2(user: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self::OAuth2 {
            user: user.into(),
            access_token: access_token.into(),
        }
    }

    /// The login name, for logs.
    #[must_use]
    pub fn user(&self) -> &str {
        match self {
            Self::Password { username, .. } => username,
            Self::OAuth2 { user, .. } => user,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Self::OAuth2 { user, .. } => f
                .debug_struct("OAuth2")
                .field("user", user)
                .field("access_token", &"<redacted>")
                .finish(),
        }
    }
}

/// The chosen authentication mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mechanism {
    /// Plain `LOGIN` command.
    Login,
    /// SASL PLAIN (RFC 4616).
    Plain,
    /// SASL XOAUTH2 (Google, Microsoft).
    XOAuth2,
    /// SASL OAUTHBEARER (RFC 7628).
    OAuthBearer,
}

impl Mechanism {
    /// Picks the mechanism for `credentials` given the server's capabilities.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] when no advertised mechanism fits.
    pub fn choose(credentials: &Credentials, caps: &Capabilities) -> Result<Self> {
        match credentials {
            Credentials::Password { .. } => {
                if !caps.has(&Capability::LoginDisabled) {
                    Ok(Self::Login)
                } else if caps.has_auth("PLAIN") {
                    Ok(Self::Plain)
                } else {
                    Err(Error::Auth(
                        "server disables LOGIN and does not offer AUTH=PLAIN".to_string(),
                    ))
                }
            }
            Credentials::OAuth2 { .. } => {
                if caps.has_auth("XOAUTH2") {
                    Ok(Self::XOAuth2)
                } else if caps.has_auth("OAUTHBEARER") {
                    Ok(Self::OAuthBearer)
                } else {
                    Err(Error::Auth(
                        "server offers neither XOAUTH2 nor OAUTHBEARER".to_string(),
                    ))
                }
            }
        }
    }

    /// SASL mechanism name, `None` for `LOGIN`.
    #[must_use]
    pub const fn sasl_name(self) -> Option<&'static str> {
        match self {
            Self::Login => None,
            Self::Plain => Some("PLAIN"),
            Self::XOAuth2 => Some("XOAUTH2"),
            Self::OAuthBearer => Some("OAUTHBEARER"),
        }
    }

    /// Base64 SASL response for this mechanism, `None` for `LOGIN`.
    pub(crate) fn initial_response(self, credentials: &Credentials) -> Option<String> {
        match (self, credentials) {
            (Self::Plain, Credentials::Password { username, password }) => {
                Some(plain_response(username, password))
            }
            (Self::XOAuth2, Credentials::OAuth2 { user, access_token }) => {
                Some(xoauth2_response(user, access_token))
            }
            (Self::OAuthBearer, Credentials::OAuth2 { user, access_token }) => {
                Some(oauthbearer_response(user, access_token))
            }
            _ => None,
        }
    }
}

/// `\0user\0password`, base64 (RFC 4616).
fn plain_response(username: &str, password: &str) -> String {
    STANDARD.encode(format!("\0{username}\0{password}"))
}

/// `user=<user>\x01auth=Bearer <token>\x01\x01`, base64.
fn xoauth2_response(user: &str, token: &str) -> String {
    STANDARD.encode(format!("user={user}\x01auth=Bearer {token}\x01\x01"))
}

/// `n,a=<user>,\x01auth=Bearer <token>\x01\x01`, base64 (RFC 7628).
fn oauthbearer_response(user: &str, token: &str) -> String {
    STANDARD.encode(format!("n,a={user},\x01auth=Bearer {token}\x01\x01"))
}
