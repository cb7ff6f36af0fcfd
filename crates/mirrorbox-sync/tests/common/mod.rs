//! Shared fixtures: a connector replaying scripted sessions and an
//! in-memory mirror with one saved account.

#![allow(clippy::unwrap_used, dead_code)]

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mirrorbox_imap::{Authenticated, Client, Credentials, UnsolicitedHandler};
use mirrorbox_sync::{Account, ImapConnector, Mirror};
use tokio_test::io::{Builder, Mock};

/// Greeting plus LOGIN; append the rest of the session.
pub fn session(caps: &str) -> Builder {
    let mut builder = Builder::new();
    builder
        .read(format!("* OK [CAPABILITY IMAP4rev1 {caps}] ready\r\n").as_bytes())
        .write(b"A0001 LOGIN user@example.org secret\r\n")
        .read(format!("A0001 OK [CAPABILITY IMAP4rev1 {caps}] Logged in\r\n").as_bytes());
    builder
}

pub fn logout(builder: &mut Builder, tag: &str) {
    builder
        .write(format!("{tag} LOGOUT\r\n").as_bytes())
        .read(format!("* BYE bye\r\n{tag} OK done\r\n").as_bytes());
}

/// Hands out one scripted session per dial.
pub struct Replay {
    sessions: Mutex<VecDeque<Mock>>,
    dials: AtomicUsize,
}

impl Replay {
    pub fn new(sessions: Vec<Mock>) -> Arc<Self> {
        Arc::new(Self {
            sessions: Mutex::new(sessions.into()),
            dials: AtomicUsize::new(0),
        })
    }

    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }
}

impl ImapConnector for Replay {
    type Stream = Mock;

    async fn connect(
        &self,
        _account: &Account,
        handler: Option<Arc<dyn UnsolicitedHandler>>,
    ) -> mirrorbox_sync::Result<Client<Mock, Authenticated>> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        let Some(mock) = self.sessions.lock().unwrap().pop_front() else {
            return Err(mirrorbox_imap::Error::Io(io::Error::from(io::ErrorKind::ConnectionRefused)).into());
        };
        let timeout = Some(Duration::from_secs(5));
        let client = match handler {
            Some(h) => Client::from_stream_with_handler(mock, timeout, h).await?,
            None => Client::from_stream(mock, timeout).await?,
        };
        Ok(client
            .login(&Credentials::password("user@example.org", "secret"))
            .await?)
    }
}

/// In-memory mirror with a saved account.
pub async fn mirror_with_account() -> (Mirror, Account) {
    let mirror = Mirror::in_memory().await.unwrap();
    let mut account = Account::with_email("user@example.org");
    mirror.save_account(&mut account).await.unwrap();
    (mirror, account)
}
