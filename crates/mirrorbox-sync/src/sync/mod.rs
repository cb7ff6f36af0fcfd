//! Mirror synchronization.
//!
//! - [`SyncEngine::sync_account`]: folder list diff, then every folder
//! - [`SyncEngine::sync_folder`]: one folder, e.g. after an IDLE event
//! - [`SyncEngine::backfill_bodies`]: bodies for messages synced header-first
//! - message actions (`set_seen`, `set_flagged`, `append_message`, `copy_messages`,
//!   `move_messages`, `delete_messages`), server first, then mirrored
//!
//! A folder sync checks the UID epoch before anything else. When the server's
//! UIDVALIDITY differs from the stored one, every cached message of the
//! folder is deleted in the same transaction that stores the new epoch's
//! headers.

mod actions;
mod bodies;
mod engine;
pub mod headers;

#[cfg(test)]
mod tests;

pub(crate) use engine::cancellable;
pub use engine::{AccountSyncReport, FolderSyncReport, SyncEngine, remote_folders};
