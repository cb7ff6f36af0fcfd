//! Account and folder synchronization.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use mirrorbox_imap::{
    Authenticated, Client, FetchAttribute, FolderType, ListEntry, MailboxStatus, ModSeq, Selected,
    StatusAttribute, THREADING_HEADERS, Uid, UidSet, UidValidity, infer_folder_types,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::headers::header_from_fetch;
use crate::account::{Account, AccountId};
use crate::config::SyncConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::connector::ImapConnector;
use crate::mirror::{
    FlagUpdate, Folder, FolderChanges, FolderState, MessageFlags, MessageHeader, Mirror,
    RemoteFolder,
};
use crate::{Error, Result};

pub(super) type Session<C> = Client<<C as ImapConnector>::Stream, Authenticated>;
pub(super) type SelectedSession<C> = Client<<C as ImapConnector>::Stream, Selected>;

/// Outcome of syncing one folder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderSyncReport {
    /// Folder path.
    pub path: String,
    /// STATUS showed nothing changed and the folder was not opened.
    pub unchanged: bool,
    /// The UID epoch changed and the cache was rebuilt.
    pub reset_epoch: bool,
    /// Headers stored for new messages.
    pub new_messages: usize,
    /// Cached messages removed because the server no longer has them.
    pub expunged: usize,
    /// Flag changes applied to cached messages.
    pub flag_updates: usize,
}

/// Outcome of syncing a whole account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountSyncReport {
    /// Folders that appeared on the server.
    pub folders_added: Vec<String>,
    /// Folders that disappeared, with their messages.
    pub folders_removed: Vec<String>,
    /// Per-folder results, in path order.
    pub folders: Vec<FolderSyncReport>,
    /// Folders skipped after a protocol error.
    pub failed: Vec<String>,
}

/// Brings the local mirror in line with the server.
///
/// Every pass runs on its own connection from the connector. Folders are
/// opened with EXAMINE so a sync never expunges anything.
pub struct SyncEngine<C> {
    mirror: Mirror,
    connector: Arc<C>,
    connectivity: Arc<dyn ConnectivityMonitor>,
    config: SyncConfig,
}

impl<C: ImapConnector> SyncEngine<C> {
    /// Creates an engine.
    #[must_use]
    pub fn new(
        mirror: Mirror,
        connector: Arc<C>,
        connectivity: Arc<dyn ConnectivityMonitor>,
        config: SyncConfig,
    ) -> Self {
        Self {
            mirror,
            connector,
            connectivity,
            config,
        }
    }

    /// The mirror this engine writes to.
    #[must_use]
    pub const fn mirror(&self) -> &Mirror {
        &self.mirror
    }

    /// Batch sizes and intervals.
    #[must_use]
    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Dials unless the network is down.
    pub(super) async fn open_session(&self, account: &Account) -> Result<Session<C>> {
        if !self.connectivity.is_connected() {
            return Err(Error::Offline);
        }
        self.connector.connect(account, None).await
    }

    /// Full pass over an account: refreshes the folder list, then syncs every
    /// folder. A folder that fails with a protocol error is skipped on a
    /// fresh connection; transport and authentication errors end the pass.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Offline`] without dialing when the network is down,
    /// and connection, authentication or storage errors otherwise.
    pub async fn sync_account(
        &self,
        account: &Account,
        cancel: &CancellationToken,
    ) -> Result<AccountSyncReport> {
        let account_id = account.require_id()?;
        let mut session = self.open_session(account).await?;
        info!(account = %account_id, "Syncing account");

        let entries = cancellable(cancel, session.list("", "*")).await?;
        let diff = self
            .mirror
            .apply_folder_list(account_id, &remote_folders(&entries))
            .await?;
        let mut report = AccountSyncReport {
            folders_added: diff.added,
            folders_removed: diff.removed,
            ..AccountSyncReport::default()
        };

        for folder in self.mirror.list_folders(account_id).await? {
            if cancel.is_cancelled() {
                return Err(mirrorbox_imap::Error::Cancelled.into());
            }
            match self.sync_folder_on(session, &folder, cancel).await {
                Ok((next, folder_report)) => {
                    session = next;
                    report.folders.push(folder_report);
                }
                Err(e) if e.is_protocol() => {
                    warn!(
                        account = %account_id,
                        folder = %folder.path,
                        error = %e,
                        "Folder sync failed, reconnecting"
                    );
                    report.failed.push(folder.path.clone());
                    session = self.open_session(account).await?;
                }
                Err(e) => return Err(e),
            }
        }

        logout(session).await;
        info!(
            account = %account_id,
            folders = report.folders.len(),
            failed = report.failed.len(),
            "Account sync complete"
        );
        Ok(report)
    }

    /// Syncs a single known folder, e.g. after an IDLE notification.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FolderNotFound`] for a path the mirror does not know,
    /// [`Error::Offline`] when the network is down, and connection or
    /// storage errors otherwise.
    pub async fn sync_folder(
        &self,
        account: &Account,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<FolderSyncReport> {
        let folder = self.mirror.require_folder(account.require_id()?, path).await?;
        let session = self.open_session(account).await?;
        let (session, report) = self.sync_folder_on(session, &folder, cancel).await?;
        logout(session).await;
        Ok(report)
    }

    /// Pins a folder's role against later inference.
    ///
    /// # Errors
    ///
    /// Returns an error if the folder is unknown or storage fails.
    pub async fn set_folder_type(
        &self,
        account: AccountId,
        path: &str,
        folder_type: FolderType,
    ) -> Result<()> {
        let folder = self.mirror.require_folder(account, path).await?;
        self.mirror.set_folder_type(folder.id, folder_type).await?;
        info!(account = %account, folder = %path, folder_type = %folder_type, "Folder type set");
        Ok(())
    }

    async fn sync_folder_on(
        &self,
        mut session: Session<C>,
        folder: &Folder,
        cancel: &CancellationToken,
    ) -> Result<(Session<C>, FolderSyncReport)> {
        let mut report = FolderSyncReport {
            path: folder.path.clone(),
            ..FolderSyncReport::default()
        };

        if self.is_unchanged(&mut session, folder, cancel).await? {
            self.mirror.touch_folder(folder.id).await?;
            debug!(folder = %folder.path, "Unchanged since last sync");
            report.unchanged = true;
            return Ok((session, report));
        }

        let mut selected = session.examine_cancellable(&folder.path, cancel).await?;
        let status = selected.mailbox_status().clone();
        let server_validity = status.uid_validity.map(UidValidity::get);
        let reset_epoch = matches!(
            (folder.uid_validity, server_validity),
            (Some(stored), Some(server)) if stored != server
        );
        if reset_epoch {
            warn!(
                folder = %folder.path,
                stored = ?folder.uid_validity,
                server = ?server_validity,
                "UIDVALIDITY changed, discarding cached messages"
            );
        }

        let local = if reset_epoch {
            Vec::new()
        } else {
            self.mirror.local_uids(folder.id).await?
        };
        let remote = if status.exists == 0 {
            Vec::new()
        } else {
            cancellable(cancel, selected.uid_search("ALL")).await?
        };

        let remote_set: HashSet<u32> = remote.iter().map(|u| u.get()).collect();
        let local_set: HashSet<u32> = local.iter().copied().collect();
        let expunged: Vec<u32> = local
            .iter()
            .copied()
            .filter(|u| !remote_set.contains(u))
            .collect();
        let (known, fresh): (Vec<Uid>, Vec<Uid>) = remote
            .iter()
            .copied()
            .partition(|u| local_set.contains(&u.get()));

        let flag_updates = self
            .fetch_flag_updates(&mut selected, folder, &status, &known, cancel)
            .await?;
        let new_messages = self.fetch_headers(&mut selected, &fresh, cancel).await?;

        // Nothing is written for a pass that was cancelled midway.
        if cancel.is_cancelled() {
            return Err(mirrorbox_imap::Error::Cancelled.into());
        }

        let uid_next = status
            .uid_next
            .map(Uid::get)
            .or_else(|| remote.last().map(|u| u.get().saturating_add(1)));
        let changes = FolderChanges {
            reset_epoch,
            expunged,
            flag_updates,
            new_messages,
            state: FolderState {
                uid_validity: server_validity,
                uid_next,
                highest_mod_seq: status.highest_mod_seq.map(ModSeq::get),
            },
        };
        report.reset_epoch = reset_epoch;
        report.expunged = changes.expunged.len();
        report.flag_updates = changes.flag_updates.len();
        report.new_messages = changes.new_messages.len();
        self.mirror.apply_folder_changes(folder.id, &changes).await?;

        let session = cancellable(cancel, selected.close()).await?;
        debug!(
            folder = %folder.path,
            new = report.new_messages,
            expunged = report.expunged,
            flags = report.flag_updates,
            "Folder synced"
        );
        Ok((session, report))
    }

    /// STATUS fast path. Only trusted with CONDSTORE, since without a mod
    /// sequence a flag change leaves every STATUS counter untouched.
    async fn is_unchanged(
        &self,
        session: &mut Session<C>,
        folder: &Folder,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let (Some(validity), Some(mod_seq)) = (folder.uid_validity, folder.highest_mod_seq) else {
            return Ok(false);
        };
        if !session.supports_condstore() {
            return Ok(false);
        }
        let status = session
            .status_cancellable(
                &folder.path,
                &[
                    StatusAttribute::Messages,
                    StatusAttribute::UidNext,
                    StatusAttribute::UidValidity,
                    StatusAttribute::HighestModSeq,
                ],
                cancel,
            )
            .await?;
        Ok(status.uid_validity.map(UidValidity::get) == Some(validity)
            && status.uid_next.map(Uid::get) == folder.uid_next
            && status.highest_mod_seq.map(ModSeq::get) == Some(mod_seq)
            && status.messages == Some(folder.total_count))
    }

    /// Flags of cached messages. Uses `CHANGEDSINCE` when the server keeps
    /// mod sequences for the folder, otherwise refetches every flag.
    async fn fetch_flag_updates(
        &self,
        selected: &mut SelectedSession<C>,
        folder: &Folder,
        status: &MailboxStatus,
        known: &[Uid],
        cancel: &CancellationToken,
    ) -> Result<Vec<FlagUpdate>> {
        if known.is_empty() {
            return Ok(Vec::new());
        }
        let condstore = selected.supports_condstore() && !status.no_mod_seq;
        let data = match (condstore, folder.highest_mod_seq, status.highest_mod_seq) {
            (true, Some(stored), Some(server)) => {
                if server.get() <= stored {
                    return Ok(Vec::new());
                }
                debug!(folder = %folder.path, since = stored, "Fetching changed flags");
                cancellable(
                    cancel,
                    selected.uid_fetch(
                        &UidSet::all(),
                        &[FetchAttribute::Uid, FetchAttribute::Flags, FetchAttribute::ModSeq],
                        Some(ModSeq::new(stored)),
                    ),
                )
                .await?
            }
            _ => {
                let mut all = Vec::with_capacity(known.len());
                for batch in UidSet::chunks(known, self.config.header_batch_size) {
                    let data = cancellable(
                        cancel,
                        selected.uid_fetch(
                            &batch,
                            &[FetchAttribute::Uid, FetchAttribute::Flags],
                            None,
                        ),
                    )
                    .await?;
                    all.extend(data);
                }
                all
            }
        };

        let known: HashSet<u32> = known.iter().map(|u| u.get()).collect();
        Ok(data
            .into_iter()
            .filter_map(|d| {
                let uid = d.uid?.get();
                if !known.contains(&uid) {
                    return None;
                }
                Some(FlagUpdate {
                    uid,
                    flags: MessageFlags::from_imap(d.flags.as_deref()?),
                    mod_seq: d.mod_seq.map(ModSeq::get),
                })
            })
            .collect())
    }

    /// Header-first fetch of new messages, in batches.
    async fn fetch_headers(
        &self,
        selected: &mut SelectedSession<C>,
        fresh: &[Uid],
        cancel: &CancellationToken,
    ) -> Result<Vec<MessageHeader>> {
        let mut items = vec![
            FetchAttribute::Uid,
            FetchAttribute::Flags,
            FetchAttribute::InternalDate,
            FetchAttribute::Size,
            FetchAttribute::Envelope,
        ];
        if selected.supports_condstore() {
            items.push(FetchAttribute::ModSeq);
        }
        items.push(FetchAttribute::HeaderFields(THREADING_HEADERS));

        let mut headers = Vec::with_capacity(fresh.len());
        for batch in UidSet::chunks(fresh, self.config.header_batch_size) {
            let data = cancellable(cancel, selected.uid_fetch(&batch, &items, None)).await?;
            headers.extend(data.iter().filter_map(header_from_fetch));
            debug!(fetched = headers.len(), total = fresh.len(), "Fetched headers");
        }
        Ok(headers)
    }
}

/// Races an IMAP command against `cancel`. A cancelled command leaves the
/// connection unusable, so callers drop it.
pub(crate) async fn cancellable<T>(
    cancel: &CancellationToken,
    command: impl Future<Output = mirrorbox_imap::Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(mirrorbox_imap::Error::Cancelled.into()),
        result = command => Ok(result?),
    }
}

/// Ends a session, logging instead of failing: the work is already done.
pub(super) async fn logout<S>(session: Client<S, Authenticated>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if let Err(e) = session.logout().await {
        debug!(error = %e, "LOGOUT failed");
    }
}

/// Selectable LIST entries with their inferred roles.
#[must_use]
pub fn remote_folders(entries: &[ListEntry]) -> Vec<RemoteFolder> {
    entries
        .iter()
        .zip(infer_folder_types(entries))
        .filter(|(entry, _)| entry.is_selectable())
        .map(|(entry, folder_type)| RemoteFolder {
            path: entry.path.clone(),
            delimiter: entry.delimiter,
            folder_type,
        })
        .collect()
}
