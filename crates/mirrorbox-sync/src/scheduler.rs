//! Background sync scheduler.
//!
//! One task per account re-syncs on the account's interval and on demand.
//! IDLE events turn into targeted syncs of the folder they came from; a
//! burst of events is coalesced into one pass. Ticks are skipped while the
//! connectivity monitor reports offline, so an offline tick never dials.
//! A rejected login stops the account's task; it stays down until
//! [`Scheduler::start_account`] is called again.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::account::{Account, AccountId};
use crate::config::EngineConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::connector::ImapConnector;
use crate::idle::MailEvent;
use crate::sync::SyncEngine;
use crate::{Error, Result};

/// Queued sync requests per account beyond which requests are dropped.
const TRIGGER_CAPACITY: usize = 32;

#[derive(Debug)]
enum Trigger {
    Account,
    Folder(String),
}

/// Requests gathered since the last pass.
#[derive(Debug, Default)]
struct Pending {
    full: bool,
    folders: BTreeSet<String>,
}

impl Pending {
    fn add(&mut self, trigger: Trigger) {
        match trigger {
            Trigger::Account => self.full = true,
            Trigger::Folder(path) => {
                self.folders.insert(path);
            }
        }
    }
}

struct AccountTask {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
    triggers: mpsc::Sender<Trigger>,
    auth_failed: Arc<AtomicBool>,
}

/// Periodic and event-driven sync for every account.
pub struct Scheduler<C> {
    engine: Arc<SyncEngine<C>>,
    connectivity: Arc<dyn ConnectivityMonitor>,
    default_interval: Duration,
    shutdown_timeout: Duration,
    tasks: StdMutex<HashMap<AccountId, AccountTask>>,
}

impl<C: ImapConnector> Scheduler<C> {
    /// Creates a scheduler with no accounts.
    #[must_use]
    pub fn new(
        engine: Arc<SyncEngine<C>>,
        connectivity: Arc<dyn ConnectivityMonitor>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            engine,
            connectivity,
            default_interval: config.sync.default_interval,
            shutdown_timeout: config.idle.shutdown_timeout,
            tasks: StdMutex::new(HashMap::new()),
        }
    }

    /// Starts the account's task. Returns false if it is already running.
    /// The first interval tick comes one interval after start; call
    /// [`Scheduler::request_sync`] for an immediate pass.
    ///
    /// # Errors
    ///
    /// Returns an error for an account that was never saved.
    pub fn start_account(&self, account: &Account) -> Result<bool> {
        let id = account.require_id()?;
        let mut tasks = self.tasks();
        if tasks.get(&id).is_some_and(|t| !t.handle.is_finished()) {
            return Ok(false);
        }
        let interval = if account.sync_interval.is_zero() {
            self.default_interval
        } else {
            account.sync_interval
        };
        let (triggers, rx) = mpsc::channel(TRIGGER_CAPACITY);
        let cancel = CancellationToken::new();
        let auth_failed = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn(run_account(
            Arc::clone(&self.engine),
            Arc::clone(&self.connectivity),
            account.clone(),
            interval,
            rx,
            cancel.clone(),
            Arc::clone(&auth_failed),
        ));
        tasks.insert(
            id,
            AccountTask {
                handle,
                cancel,
                triggers,
                auth_failed,
            },
        );
        info!(account = %id, interval_secs = interval.as_secs(), "Scheduler started");
        Ok(true)
    }

    /// Cancels the account's task, waiting up to the shutdown timeout
    /// before aborting it. Returns false if it had none.
    pub async fn stop_account(&self, id: AccountId) -> bool {
        let task = self.tasks().remove(&id);
        let Some(task) = task else {
            return false;
        };
        self.shutdown(id, task).await;
        true
    }

    /// Stops every account's task.
    pub async fn stop_all(&self) {
        let tasks: Vec<_> = self.tasks().drain().collect();
        for (id, task) in tasks {
            self.shutdown(id, task).await;
        }
    }

    /// Queues a full account pass. Returns false if the account has no
    /// task or its queue is full.
    pub fn request_sync(&self, id: AccountId) -> bool {
        self.trigger(id, Trigger::Account)
    }

    /// Queues a sync of the folder an IDLE event came from.
    pub fn notify(&self, event: &MailEvent) -> bool {
        debug!(account = %event.account_id, folder = %event.folder, kind = ?event.kind, "Mail event");
        self.trigger(event.account_id, Trigger::Folder(event.folder.clone()))
    }

    /// Feeds IDLE events to [`Scheduler::notify`] until the channel closes.
    pub fn route_events(self: &Arc<Self>, mut events: mpsc::Receiver<MailEvent>) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                scheduler.notify(&event);
            }
            debug!("Event channel closed");
        })
    }

    /// True while the account's task runs.
    #[must_use]
    pub fn is_running(&self, id: AccountId) -> bool {
        self.tasks()
            .get(&id)
            .is_some_and(|t| !t.handle.is_finished())
    }

    /// True when the account's task stopped because the server rejected
    /// its credentials.
    #[must_use]
    pub fn auth_failed(&self, id: AccountId) -> bool {
        self.tasks()
            .get(&id)
            .is_some_and(|t| t.auth_failed.load(Ordering::Acquire))
    }

    fn trigger(&self, id: AccountId, trigger: Trigger) -> bool {
        let tasks = self.tasks();
        let Some(task) = tasks.get(&id) else {
            debug!(account = %id, "No scheduler for account");
            return false;
        };
        match task.triggers.try_send(trigger) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(account = %id, "Sync queue full, dropping request");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    async fn shutdown(&self, id: AccountId, task: AccountTask) {
        task.cancel.cancel();
        let mut handle = task.handle;
        if tokio::time::timeout(self.shutdown_timeout, &mut handle)
            .await
            .is_err()
        {
            warn!(account = %id, "Scheduler did not stop in time, aborting");
            handle.abort();
        }
        info!(account = %id, "Scheduler stopped");
    }

    fn tasks(&self) -> std::sync::MutexGuard<'_, HashMap<AccountId, AccountTask>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn run_account<C: ImapConnector>(
    engine: Arc<SyncEngine<C>>,
    connectivity: Arc<dyn ConnectivityMonitor>,
    account: Account,
    interval: Duration,
    mut triggers: mpsc::Receiver<Trigger>,
    cancel: CancellationToken,
    auth_failed: Arc<AtomicBool>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let mut pending = Pending::default();
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            Some(trigger) = triggers.recv() => pending.add(trigger),
            _ = ticker.tick() => pending.full = true,
        }
        while let Ok(trigger) = triggers.try_recv() {
            pending.add(trigger);
        }

        if !connectivity.is_connected() {
            debug!(account = %account.email, "Offline, skipping sync");
            continue;
        }
        match run_pass(&engine, &account, pending, &cancel).await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => break,
            Err(e) if e.is_authentication() => {
                error!(
                    account = %account.email,
                    error = %e,
                    "Sync rejected, check credentials; scheduling stopped"
                );
                auth_failed.store(true, Ordering::Release);
                break;
            }
            Err(e) => warn!(account = %account.email, error = %e, "Sync failed"),
        }
    }
    debug!(account = %account.email, "Scheduler loop ended");
}

/// Targeted folder syncs first, then the full pass if one was requested or
/// an event named a folder the mirror does not know yet. Bodies are
/// backfilled after the headers.
async fn run_pass<C: ImapConnector>(
    engine: &SyncEngine<C>,
    account: &Account,
    pending: Pending,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut full = pending.full;
    if !full {
        for path in &pending.folders {
            match engine.sync_folder(account, path, cancel).await {
                Ok(report) => {
                    debug!(folder = %path, new = report.new_messages, "Targeted sync done");
                    engine.backfill_bodies(account, path, cancel).await?;
                }
                Err(Error::FolderNotFound(_)) => {
                    full = true;
                    break;
                }
                Err(e) => return Err(e),
            }
        }
    }
    if !full {
        return Ok(());
    }

    let report = engine.sync_account(account, cancel).await?;
    info!(
        account = %account.email,
        folders = report.folders.len(),
        new = report.folders.iter().map(|f| f.new_messages).sum::<usize>(),
        "Scheduled sync done"
    );
    for folder in engine.mirror().list_folders(account.require_id()?).await? {
        if cancel.is_cancelled() {
            break;
        }
        engine.backfill_bodies(account, &folder.path, cancel).await?;
    }
    Ok(())
}
