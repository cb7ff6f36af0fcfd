//! User actions on messages: applied on the server first, then mirrored.
//!
//! Each action runs on its own read-write session. The local mirror only
//! changes once the server accepted the command, so a failed action leaves
//! both sides as they were.

use mirrorbox_imap::{Flag, StoreMode, Uid, UidMapping, UidSet, UidValidity};
use tracing::{debug, info};

use super::engine::{SelectedSession, SyncEngine, logout, remote_folders};
use super::headers::header_from_message;
use crate::account::Account;
use crate::connector::ImapConnector;
use crate::mirror::Folder;
use crate::{Error, Result};

impl<C: ImapConnector> SyncEngine<C> {
    /// Marks messages read or unread.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the change or storage fails.
    pub async fn set_seen(&self, account: &Account, path: &str, uids: &[u32], seen: bool) -> Result<()> {
        self.store_flag(account, path, uids, Flag::Seen, seen).await
    }

    /// Stars or unstars messages.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the change or storage fails.
    pub async fn set_flagged(
        &self,
        account: &Account,
        path: &str,
        uids: &[u32],
        flagged: bool,
    ) -> Result<()> {
        self.store_flag(account, path, uids, Flag::Flagged, flagged).await
    }

    /// Copies messages to another folder. Returns the source/destination UID
    /// pairs mirrored locally; empty when the server reported no mapping and
    /// the destination will pick the copies up on its next sync.
    ///
    /// # Errors
    ///
    /// Returns an error if either folder is unknown, the server rejects the
    /// copy, or storage fails.
    pub async fn copy_messages(
        &self,
        account: &Account,
        from: &str,
        to: &str,
        uids: &[u32],
    ) -> Result<Vec<(u32, u32)>> {
        let (source, destination) = self.folder_pair(account, from, to).await?;
        let set = uid_set(uids);
        if set.is_empty() {
            return Ok(Vec::new());
        }
        let mut selected = self.open_for_update(account, &source).await?;
        let mapping = selected.uid_copy(&set, to).await?;
        finish(selected).await;

        let pairs = self.mirror_copy(&source, &destination, mapping.as_ref()).await?;
        info!(from = %from, to = %to, count = uids.len(), "Copied messages");
        Ok(pairs)
    }

    /// Moves messages to another folder.
    ///
    /// # Errors
    ///
    /// Returns an error if either folder is unknown, the server rejects the
    /// move, or storage fails.
    pub async fn move_messages(
        &self,
        account: &Account,
        from: &str,
        to: &str,
        uids: &[u32],
    ) -> Result<Vec<(u32, u32)>> {
        let (source, destination) = self.folder_pair(account, from, to).await?;
        let set = uid_set(uids);
        if set.is_empty() {
            return Ok(Vec::new());
        }
        let mut selected = self.open_for_update(account, &source).await?;
        let mapping = selected.uid_move(&set, to).await?;
        finish(selected).await;

        let pairs = self.mirror_copy(&source, &destination, mapping.as_ref()).await?;
        self.mirror().delete_messages(source.id, uids).await?;
        info!(from = %from, to = %to, count = uids.len(), "Moved messages");
        Ok(pairs)
    }

    /// Appends a message to a folder, e.g. a saved draft. Returns the UID the
    /// server assigned when it reports one (`APPENDUID`). The message is
    /// mirrored right away, body included, only when that UID belongs to the
    /// folder's known epoch; otherwise the next sync picks it up.
    ///
    /// # Errors
    ///
    /// Returns an error if the folder is unknown, the server rejects the
    /// message, or storage fails.
    pub async fn append_message(
        &self,
        account: &Account,
        path: &str,
        flags: &[Flag],
        message: &[u8],
    ) -> Result<Option<u32>> {
        let folder = self.mirror().require_folder(account.require_id()?, path).await?;
        let mut session = self.open_session(account).await?;
        let assigned = session.append(path, flags, message).await?;
        logout(session).await;

        let Some((validity, uid)) = assigned else {
            debug!(folder = %path, "No APPENDUID, leaving the message to sync");
            return Ok(None);
        };
        if folder.uid_validity != Some(validity.get()) {
            debug!(folder = %path, "Folder epoch unknown, leaving the message to sync");
            return Ok(Some(uid.get()));
        }
        let header = header_from_message(uid.get(), flags, message);
        self.mirror().insert_message(folder.id, &header, message).await?;
        info!(folder = %path, uid = uid.get(), "Appended message");
        Ok(Some(uid.get()))
    }

    /// Creates a folder on the server, then refreshes the mirrored folder
    /// list so the new folder gets its inferred role.
    ///
    /// # Errors
    ///
    /// Returns an error if the server refuses the folder or storage fails.
    pub async fn create_folder(&self, account: &Account, path: &str) -> Result<()> {
        let account_id = account.require_id()?;
        let mut session = self.open_session(account).await?;
        session.create(path).await?;
        let entries = session.list("", "*").await?;
        logout(session).await;

        self.mirror()
            .apply_folder_list(account_id, &remote_folders(&entries))
            .await?;
        info!(folder = %path, "Created folder");
        Ok(())
    }

    /// Permanently deletes messages: `\Deleted` followed by `UID EXPUNGE`.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the deletion or storage fails.
    pub async fn delete_messages(&self, account: &Account, path: &str, uids: &[u32]) -> Result<()> {
        let folder = self.mirror().require_folder(account.require_id()?, path).await?;
        let set = uid_set(uids);
        if set.is_empty() {
            return Ok(());
        }
        let mut selected = self.open_for_update(account, &folder).await?;
        selected
            .uid_store(&set, StoreMode::Add, &[Flag::Deleted])
            .await?;
        selected.uid_expunge(&set).await?;
        finish(selected).await;

        self.mirror().delete_messages(folder.id, uids).await?;
        info!(folder = %path, count = uids.len(), "Deleted messages");
        Ok(())
    }

    async fn store_flag(
        &self,
        account: &Account,
        path: &str,
        uids: &[u32],
        flag: Flag,
        on: bool,
    ) -> Result<()> {
        let folder = self.mirror().require_folder(account.require_id()?, path).await?;
        let set = uid_set(uids);
        if set.is_empty() {
            return Ok(());
        }
        let mode = if on { StoreMode::Add } else { StoreMode::Remove };
        let mut selected = self.open_for_update(account, &folder).await?;
        selected
            .uid_store(&set, mode, std::slice::from_ref(&flag))
            .await?;
        finish(selected).await;

        self.mirror().set_flag(folder.id, uids, &flag, on).await?;
        debug!(folder = %path, uids = %set, flag = ?flag, on, "Stored flag");
        Ok(())
    }

    async fn folder_pair(&self, account: &Account, from: &str, to: &str) -> Result<(Folder, Folder)> {
        let account_id = account.require_id()?;
        let source = self.mirror().require_folder(account_id, from).await?;
        let destination = self.mirror().require_folder(account_id, to).await?;
        Ok((source, destination))
    }

    /// SELECTs the folder read-write, refusing when its UID epoch moved: the
    /// cached UIDs would address the wrong messages.
    async fn open_for_update(&self, account: &Account, folder: &Folder) -> Result<SelectedSession<C>> {
        let session = self.open_session(account).await?;
        let selected = session.select(&folder.path).await?;
        let server = selected.mailbox_status().uid_validity.map(UidValidity::get);
        if folder.uid_validity.is_some() && server != folder.uid_validity {
            finish(selected).await;
            return Err(Error::StaleEpoch(folder.path.clone()));
        }
        Ok(selected)
    }

    async fn mirror_copy(
        &self,
        source: &Folder,
        destination: &Folder,
        mapping: Option<&UidMapping>,
    ) -> Result<Vec<(u32, u32)>> {
        let Some(mapping) = mapping else {
            return Ok(Vec::new());
        };
        if destination.uid_validity != Some(mapping.uid_validity.get()) {
            debug!(folder = %destination.path, "Destination epoch unknown, leaving copies to sync");
            return Ok(Vec::new());
        }
        let pairs = uid_pairs(mapping);
        self.mirror()
            .copy_messages(source.id, destination.id, &pairs)
            .await?;
        Ok(pairs)
    }
}

/// Source/destination UID pairs of a `COPYUID` response, in order.
fn uid_pairs(mapping: &UidMapping) -> Vec<(u32, u32)> {
    mapping
        .source
        .expand()
        .into_iter()
        .zip(mapping.destination.expand())
        .map(|(s, d)| (s.get(), d.get()))
        .collect()
}

fn uid_set(uids: &[u32]) -> UidSet {
    UidSet::from_uids(uids.iter().copied().filter_map(Uid::new))
}

/// LOGOUT without CLOSE, which would expunge.
async fn finish<S>(selected: mirrorbox_imap::Client<S, mirrorbox_imap::Selected>)
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    if let Err(e) = selected.logout().await {
        debug!(error = %e, "LOGOUT failed");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn pairs_follow_copyuid_order() {
        let mapping = UidMapping {
            uid_validity: UidValidity::new(9).unwrap(),
            source: UidSet::parse("4:5,9").unwrap(),
            destination: UidSet::parse("100:102").unwrap(),
        };
        assert_eq!(uid_pairs(&mapping), vec![(4, 100), (5, 101), (9, 102)]);
    }

    #[test]
    fn zero_uids_are_dropped() {
        assert_eq!(uid_set(&[0, 3, 4]).to_string(), "3:4");
        assert!(uid_set(&[]).is_empty());
    }
}
