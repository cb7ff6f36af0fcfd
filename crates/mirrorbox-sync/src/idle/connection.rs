//! One long-lived IDLE session per account.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use mirrorbox_imap::{IdleEvent, IdleHandle, UnsolicitedHandler};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::event::{EVENT_BUFFER, EventHandler, MailEvent, forward};
use super::state::{IdleState, StateCell};
use crate::account::{Account, AccountId};
use crate::backoff::Backoff;
use crate::config::{BackoffConfig, IdleConfig};
use crate::connectivity::ConnectivityMonitor;
use crate::connector::ImapConnector;
use crate::sync::cancellable;
use crate::Result;

/// Why an IDLE task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdleExit {
    /// `stop()` was called.
    Stopped,
    /// The network went away. Restarted when it comes back.
    Offline,
    /// The server rejected the credentials.
    AuthFailed,
    /// Reconnection attempts ran out.
    Exhausted,
    /// The server does not support IDLE; the account is polled instead.
    Unsupported,
}

#[derive(Default)]
struct TaskSlot {
    handle: Option<JoinHandle<IdleExit>>,
    cancel: CancellationToken,
    last_exit: Option<IdleExit>,
}

impl TaskSlot {
    /// A task that recorded its exit is winding down and counts as stopped.
    fn is_running(&self) -> bool {
        self.last_exit.is_none() && self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

enum CycleEnd {
    Renew,
    Stop,
}

/// Owns the IDLE task of one account.
///
/// The task keeps a session parked in IDLE on the configured folder and
/// pushes [`MailEvent`]s to the shared channel. Lost sessions are retried
/// with exponential backoff; authentication failures and exhausted retries
/// end the task until it is started again.
pub struct IdleConnection<C> {
    account: Account,
    account_id: AccountId,
    connector: Arc<C>,
    connectivity: Arc<dyn ConnectivityMonitor>,
    config: IdleConfig,
    backoff: BackoffConfig,
    events: mpsc::Sender<MailEvent>,
    state: StateCell,
    task: Mutex<TaskSlot>,
}

impl<C: ImapConnector> IdleConnection<C> {
    /// Creates a stopped connection.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] for an account that was never saved.
    pub fn new(
        account: Account,
        connector: Arc<C>,
        connectivity: Arc<dyn ConnectivityMonitor>,
        config: IdleConfig,
        backoff: BackoffConfig,
        events: mpsc::Sender<MailEvent>,
    ) -> Result<Arc<Self>> {
        let account_id = account.require_id()?;
        Ok(Arc::new(Self {
            account,
            account_id,
            connector,
            connectivity,
            config,
            backoff,
            events,
            state: StateCell::default(),
            task: Mutex::new(TaskSlot::default()),
        }))
    }

    /// Account this connection serves.
    #[must_use]
    pub const fn account_id(&self) -> AccountId {
        self.account_id
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> IdleState {
        self.state.get()
    }

    /// Receiver that observes state changes.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<IdleState> {
        self.state.subscribe()
    }

    /// True while the task runs.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.slot().is_running()
    }

    /// Why the last task ended, once it has.
    #[must_use]
    pub fn last_exit(&self) -> Option<IdleExit> {
        self.slot().last_exit
    }

    /// Spawns the task. Returns false if it is already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut slot = self.slot();
        if slot.is_running() {
            debug!(account = %self.account_id, "IDLE already running");
            return false;
        }
        self.spawn(&mut slot);
        info!(account = %self.account_id, folder = %self.config.folder, "IDLE started");
        true
    }

    fn spawn(self: &Arc<Self>, slot: &mut TaskSlot) {
        let cancel = CancellationToken::new();
        slot.cancel = cancel.clone();
        slot.last_exit = None;
        slot.handle = Some(tokio::spawn(Arc::clone(self).run(cancel)));
    }

    /// Signals the task to stop and waits up to `shutdown_timeout` for it,
    /// aborting it after that. Returns how the task ended, if it ended on
    /// its own.
    pub async fn stop(&self) -> Option<IdleExit> {
        let (handle, cancel) = {
            let mut slot = self.slot();
            (slot.handle.take(), slot.cancel.clone())
        };
        cancel.cancel();
        let mut handle = handle?;

        let exit = match tokio::time::timeout(self.config.shutdown_timeout, &mut handle).await {
            Ok(Ok(exit)) => Some(exit),
            Ok(Err(e)) => {
                warn!(account = %self.account_id, error = %e, "IDLE task failed");
                None
            }
            Err(_) => {
                warn!(account = %self.account_id, "IDLE task did not stop in time, aborting");
                handle.abort();
                None
            }
        };
        self.state.reset();
        self.slot().last_exit = exit.or(Some(IdleExit::Stopped));
        info!(account = %self.account_id, "IDLE stopped");
        exit
    }

    fn slot(&self) -> MutexGuard<'_, TaskSlot> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run(self: Arc<Self>, cancel: CancellationToken) -> IdleExit {
        let (buffer_tx, buffer_rx) = mpsc::channel(EVENT_BUFFER);
        tokio::spawn(forward(
            buffer_rx,
            self.events.clone(),
            self.config.event_send_timeout,
        ));
        let handler = Arc::new(EventHandler::new(
            self.account_id,
            self.config.folder.clone(),
            buffer_tx,
        ));
        let mut backoff = Backoff::new(&self.backoff);

        let exit = loop {
            if cancel.is_cancelled() {
                break IdleExit::Stopped;
            }
            if !self.connectivity.is_connected() {
                info!(account = %self.account_id, "Offline, IDLE paused");
                break IdleExit::Offline;
            }
            self.state.transition(IdleState::Connecting);

            match self.session(&handler, &mut backoff, &cancel).await {
                Ok(exit) => break exit,
                Err(_) if cancel.is_cancelled() => break IdleExit::Stopped,
                Err(e) if e.is_authentication() => {
                    error!(account = %self.account_id, error = %e, "IDLE authentication failed");
                    break IdleExit::AuthFailed;
                }
                Err(e) => {
                    self.state.transition(IdleState::Disconnected);
                    let Some(delay) = backoff.next_delay() else {
                        error!(
                            account = %self.account_id,
                            attempts = backoff.attempts(),
                            error = %e,
                            "IDLE reconnection attempts exhausted"
                        );
                        break IdleExit::Exhausted;
                    };
                    warn!(
                        account = %self.account_id,
                        attempt = backoff.attempts(),
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "IDLE connection lost, reconnecting"
                    );
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => break IdleExit::Stopped,
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        };

        self.state.reset();
        let mut slot = self.slot();
        slot.last_exit = Some(exit);
        // The connectivity watcher skips a task that has not recorded its
        // exit yet, so a network that came back meanwhile is picked up here.
        // A taken handle means stop() owns the slot.
        if exit == IdleExit::Offline && slot.handle.is_some() && self.connectivity.is_connected() {
            info!(account = %self.account_id, "Network back while pausing, restarting IDLE");
            self.spawn(&mut slot);
        }
        drop(slot);
        debug!(account = %self.account_id, ?exit, "IDLE task ended");
        exit
    }

    /// One session: connect, open the folder, then IDLE in cycles until
    /// stopped or the session fails.
    async fn session(
        &self,
        handler: &Arc<EventHandler>,
        backoff: &mut Backoff,
        cancel: &CancellationToken,
    ) -> Result<IdleExit> {
        handler.disarm();
        let observer: Arc<dyn UnsolicitedHandler> = handler.clone();
        let session = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(IdleExit::Stopped),
            session = self.connector.connect(&self.account, Some(observer)) => session?,
        };
        if !session.supports_idle() {
            info!(account = %self.account_id, "Server lacks IDLE, relying on periodic sync");
            if let Err(e) = session.logout().await {
                debug!(error = %e, "LOGOUT failed");
            }
            return Ok(IdleExit::Unsupported);
        }

        let mut selected = session
            .examine_cancellable(&self.config.folder, cancel)
            .await?;
        handler.arm();
        backoff.reset();
        debug!(account = %self.account_id, folder = %self.config.folder, "Watching folder");

        loop {
            if self.config.health_check {
                cancellable(cancel, selected.noop()).await?;
            }
            self.state.transition(IdleState::Idling);
            let mut idle = selected.idle().await?;
            match self.idle_cycle(&mut idle, cancel).await? {
                CycleEnd::Renew => idle.done().await?,
                CycleEnd::Stop => {
                    if let Err(e) = idle.done().await {
                        debug!(error = %e, "DONE failed during shutdown");
                        return Ok(IdleExit::Stopped);
                    }
                    if let Err(e) = selected.logout().await {
                        debug!(error = %e, "LOGOUT failed");
                    }
                    return Ok(IdleExit::Stopped);
                }
            }
        }
    }

    /// Waits out one IDLE cycle. Events reach the handler before `wait`
    /// returns them, so they only need logging here.
    async fn idle_cycle(
        &self,
        idle: &mut IdleHandle<'_, C::Stream>,
        cancel: &CancellationToken,
    ) -> Result<CycleEnd> {
        let deadline = Instant::now() + self.config.cycle_interval;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let event = tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(CycleEnd::Stop),
                event = idle.wait(remaining) => event?,
            };
            match event {
                IdleEvent::Timeout | IdleEvent::Terminated => {
                    debug!(account = %self.account_id, ?event, "Renewing IDLE");
                    return Ok(CycleEnd::Renew);
                }
                other => {
                    debug!(account = %self.account_id, event = ?other, "IDLE event");
                    self.state.transition(IdleState::Idling);
                }
            }
        }
    }
}
