//! # mirrorbox-imap
//!
//! The IMAP side of the mirrorbox synchronization engine: transport with
//! enforced deadlines, a type-state protocol client, authentication
//! strategies, IDLE, and folder role inference.
//!
//! Only what a per-account mirror needs is implemented. Messages are always
//! addressed by UID and one connection serves one selected mailbox.
//!
//! ## Quick Start
//!
//! ```ignore
//! use mirrorbox_imap::{Config, Credentials, FetchAttribute, UidSet, connect};
//!
//! #[tokio::main]
//! async fn main() -> mirrorbox_imap::Result<()> {
//!     let config = Config::new("imap.example.com");
//!     let client = connect(&config, None).await?;
//!     let mut client = client
//!         .login(&Credentials::password("user@example.com", "secret"))
//!         .await?;
//!
//!     for entry in client.list("", "*").await? {
//!         println!("{}", entry.path);
//!     }
//!
//!     let mut inbox = client.select("INBOX").await?;
//!     let headers = inbox
//!         .uid_fetch(&UidSet::all(), &[FetchAttribute::Uid, FetchAttribute::Flags], None)
//!         .await?;
//!     println!("{} messages", headers.len());
//!     inbox.logout().await
//! }
//! ```
//!
//! ## Connection States
//!
//! ```text
//! NotAuthenticated ── login() ──→ Authenticated ── select()/examine() ──→ Selected
//!                                       ↑                                     │
//!                                       └────────────── close() ──────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`auth`]: credentials and mechanism selection
//! - [`command`]: command construction and serialization
//! - [`connection`]: transport, TLS trust, type-state client, IDLE
//! - [`folder_type`]: folder role inference
//! - [`handler`]: unsolicited response observer
//! - [`parser`]: response parser
//! - [`types`]: protocol value types

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod auth;
pub mod command;
pub mod connection;
mod error;
pub mod folder_type;
pub mod handler;
pub mod parser;
pub mod types;

pub use auth::{Credentials, Mechanism};
pub use command::{Command, FetchAttribute, StoreMode, THREADING_HEADERS, TagGenerator};
pub use connection::{
    Authenticated, Client, Config, ConfigBuilder, Fingerprint, IdleEvent, IdleHandle, ImapStream,
    MemoryPinStore, NotAuthenticated, PinStore, Security, Selected, TrustPolicy, UidMapping,
    connect,
};
pub use error::{Error, ErrorKind, Result};
pub use folder_type::{FolderType, infer_folder_types};
pub use handler::UnsolicitedHandler;
pub use parser::{Address, Envelope, FetchData, Response, UntaggedResponse};
pub use types::{
    Capabilities, Capability, Flag, ListEntry, MailboxAttribute, MailboxStatus,
    MailboxStatusItems, ModSeq, ResponseCode, SeqNum, StatusAttribute, Uid, UidSet, UidValidity,
};
