//! IMAP IDLE push notifications.
//!
//! Each account gets one [`IdleConnection`]: a background task holding a
//! session parked in IDLE on the watched folder (INBOX by default). EXISTS
//! and EXPUNGE responses become [`MailEvent`]s on a shared bounded channel,
//! which the scheduler turns into targeted folder syncs.
//!
//! ```text
//! Disconnected -> Connecting -> Idling -+-> Idling (event, cycle renewal)
//!       ^             |                 |
//!       +-------------+-----------------+   (error, stop, offline)
//! ```
//!
//! IDLE is re-issued every `cycle_interval`, well inside the 29 minutes
//! RFC 2177 allows. Lost sessions are retried with exponential backoff.

mod connection;
mod event;
mod manager;
mod state;

pub use connection::{IdleConnection, IdleExit};
pub use event::{MailEvent, MailEventKind};
pub use manager::IdleManager;
pub use state::{IdleState, StateCell};
