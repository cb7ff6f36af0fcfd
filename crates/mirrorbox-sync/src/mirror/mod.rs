//! Local SQLite mirror.
//!
//! Folders are keyed by `(account, path)` and messages by `(folder, uid)`.
//! A message UID is only meaningful inside its folder's current
//! `uid_validity` epoch, so the mirror never uses one as a cross-folder key
//! and discards a folder's messages wholesale when the epoch changes.

mod model;
mod repository;

pub use model::{
    FetchProgress, FlagUpdate, Folder, FolderChanges, FolderId, FolderListDiff, FolderState,
    Message, MessageFlags, MessageHeader, RemoteFolder,
};
pub use repository::Mirror;
