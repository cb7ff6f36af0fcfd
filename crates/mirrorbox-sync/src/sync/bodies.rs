//! Background body download for messages synced header-first.

use std::collections::HashSet;

use mirrorbox_imap::{FetchAttribute, Uid, UidSet, UidValidity};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::engine::{SyncEngine, cancellable, logout};
use crate::Result;
use crate::account::Account;
use crate::connector::ImapConnector;
use crate::mirror::FetchProgress;

impl<C: ImapConnector> SyncEngine<C> {
    /// Downloads every missing body in a folder, newest first, in batches of
    /// `body_batch_size`.
    ///
    /// A message the server no longer returns is dropped from the mirror, so
    /// a pass that completes leaves no message without its body. When the
    /// folder's UID epoch changed since the last sync nothing is fetched; the
    /// next folder sync rebuilds the cache first.
    ///
    /// # Errors
    ///
    /// Returns an error if the folder is unknown, the network is down, or
    /// the connection or storage fails. Bodies stored before the failure are
    /// kept.
    pub async fn backfill_bodies(
        &self,
        account: &Account,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<FetchProgress> {
        let mirror = self.mirror();
        let folder = mirror.require_folder(account.require_id()?, path).await?;
        let progress = mirror.fetch_progress(folder.id).await?;
        if progress.is_complete() {
            return Ok(progress);
        }

        let session = self.open_session(account).await?;
        let mut selected = session.examine_cancellable(path, cancel).await?;
        let server_validity = selected.mailbox_status().uid_validity.map(UidValidity::get);
        if folder.uid_validity.is_some() && server_validity != folder.uid_validity {
            warn!(folder = %path, "UIDVALIDITY changed, skipping body backfill until resync");
            logout(cancellable(cancel, selected.close()).await?).await;
            return Ok(progress);
        }

        let batch_size = self.config().body_batch_size;
        loop {
            let pending = mirror.uids_missing_body(folder.id, batch_size).await?;
            if pending.is_empty() {
                break;
            }
            let set = UidSet::from_uids(pending.iter().copied().filter_map(Uid::new));
            let fetched = cancellable(
                cancel,
                selected.uid_fetch(&set, &[FetchAttribute::Uid, FetchAttribute::FullBody], None),
            )
            .await?;

            let mut stored = HashSet::with_capacity(fetched.len());
            for data in fetched {
                if let (Some(uid), Some(body)) = (data.uid, data.body) {
                    mirror.store_body(folder.id, uid.get(), &body).await?;
                    stored.insert(uid.get());
                }
            }
            let vanished: Vec<u32> = pending
                .iter()
                .copied()
                .filter(|uid| !stored.contains(uid))
                .collect();
            if !vanished.is_empty() {
                debug!(folder = %path, count = vanished.len(), "Messages gone before body fetch");
                mirror.delete_messages(folder.id, &vanished).await?;
            }
        }

        logout(cancellable(cancel, selected.close()).await?).await;
        let progress = mirror.fetch_progress(folder.id).await?;
        info!(
            folder = %path,
            fetched = progress.bodies_fetched,
            total = progress.bodies_total,
            "Body backfill complete"
        );
        Ok(progress)
    }
}
