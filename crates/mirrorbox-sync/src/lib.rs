//! # mirrorbox-sync
//!
//! Keeps a local `SQLite` mirror of one or more IMAP accounts in line with
//! the servers.
//!
//! This crate provides:
//! - Account storage and credential lookup (OS keyring or in-memory)
//! - The local mirror: folders, message headers, bodies, sync state
//! - The sync engine: folder list diff, UID-epoch checks, CONDSTORE flag
//!   resync, header-first fetch and body backfill
//! - Message actions applied on the server, then mirrored
//! - Per-account IDLE connections feeding a shared event channel
//! - A scheduler for periodic and event-driven syncs
//!
//! Every component that dials consults a [`ConnectivityMonitor`] first;
//! nothing dials while it reports offline.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod account;
pub mod backoff;
pub mod config;
pub mod connectivity;
pub mod connector;
pub mod credentials;
mod error;
pub mod idle;
pub mod mirror;
pub mod scheduler;
pub mod sync;

pub use account::{Account, AccountId, AuthKind, ImapSettings, Security};
pub use config::EngineConfig;
pub use connectivity::{AlwaysOnline, ConnectivityMonitor, ManualConnectivity};
pub use connector::{ImapConnector, NetworkConnector};
pub use credentials::{CredentialStore, KeyringStore, MemoryStore};
pub use error::{Error, Result};
pub use idle::{IdleManager, IdleState, MailEvent, MailEventKind};
pub use mirror::Mirror;
pub use scheduler::Scheduler;
pub use sync::SyncEngine;
