//! IDLE connections for every account.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError, Weak};

use tokio::sync::{Mutex, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info};

use super::connection::{IdleConnection, IdleExit};
use super::event::MailEvent;
use super::state::IdleState;
use crate::Result;
use crate::account::{Account, AccountId};
use crate::config::{BackoffConfig, EngineConfig, IdleConfig};
use crate::connectivity::ConnectivityMonitor;
use crate::connector::ImapConnector;

/// Starts, stops and restarts per-account [`IdleConnection`]s.
///
/// All connections feed one bounded channel, taken once with
/// [`IdleManager::take_events`].
pub struct IdleManager<C> {
    connector: Arc<C>,
    connectivity: Arc<dyn ConnectivityMonitor>,
    idle: IdleConfig,
    backoff: BackoffConfig,
    connections: Mutex<HashMap<AccountId, Arc<IdleConnection<C>>>>,
    events_tx: mpsc::Sender<MailEvent>,
    events_rx: StdMutex<Option<mpsc::Receiver<MailEvent>>>,
    watcher: StdMutex<Option<JoinHandle<()>>>,
}

impl<C: ImapConnector> IdleManager<C> {
    /// Creates a manager with no connections.
    #[must_use]
    pub fn new(
        connector: Arc<C>,
        connectivity: Arc<dyn ConnectivityMonitor>,
        config: &EngineConfig,
    ) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::channel(config.sync.event_channel_capacity.max(1));
        Arc::new(Self {
            connector,
            connectivity,
            idle: config.idle.clone(),
            backoff: config.backoff.clone(),
            connections: Mutex::new(HashMap::new()),
            events_tx,
            events_rx: StdMutex::new(Some(events_rx)),
            watcher: StdMutex::new(None),
        })
    }

    /// The shared event receiver. `None` after the first call.
    pub fn take_events(&self) -> Option<mpsc::Receiver<MailEvent>> {
        self.events_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Starts IDLE for an account. Idempotent: returns false while a live
    /// connection exists. A connection whose task ended is replaced.
    ///
    /// # Errors
    ///
    /// Returns an error for an account that was never saved.
    pub async fn start_account(&self, account: &Account) -> Result<bool> {
        let id = account.require_id()?;
        let mut connections = self.connections.lock().await;
        if connections.get(&id).is_some_and(|c| c.is_alive()) {
            debug!(account = %id, "IDLE already running");
            return Ok(false);
        }
        let connection = IdleConnection::new(
            account.clone(),
            Arc::clone(&self.connector),
            Arc::clone(&self.connectivity),
            self.idle.clone(),
            self.backoff.clone(),
            self.events_tx.clone(),
        )?;
        connection.start();
        connections.insert(id, connection);
        Ok(true)
    }

    /// Stops an account's connection. Returns false if it had none.
    pub async fn stop_account(&self, id: AccountId) -> bool {
        let connection = self.connections.lock().await.remove(&id);
        match connection {
            Some(connection) => {
                connection.stop().await;
                true
            }
            None => false,
        }
    }

    /// Stops and starts an account, e.g. after its settings changed. The old
    /// connection is stopped outside the bookkeeping lock; if another start
    /// won the race meanwhile, that connection is kept.
    ///
    /// # Errors
    ///
    /// Returns an error for an account that was never saved.
    pub async fn restart_account(&self, account: &Account) -> Result<()> {
        let id = account.require_id()?;
        let old = self.connections.lock().await.remove(&id);
        if let Some(old) = old {
            old.stop().await;
        }
        if self.start_account(account).await? {
            info!(account = %id, "IDLE restarted");
        }
        Ok(())
    }

    /// Stops every connection concurrently, and the connectivity watcher.
    pub async fn stop_all(&self) {
        if let Some(watcher) = self
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            watcher.abort();
        }
        let connections: Vec<_> = self.connections.lock().await.drain().map(|(_, c)| c).collect();
        let count = connections.len();
        let mut stopping = JoinSet::new();
        for connection in connections {
            stopping.spawn(async move { connection.stop().await });
        }
        while stopping.join_next().await.is_some() {}
        info!(count, "All IDLE connections stopped");
    }

    /// True while the account's task runs.
    pub async fn is_running(&self, id: AccountId) -> bool {
        self.connections
            .lock()
            .await
            .get(&id)
            .is_some_and(|c| c.is_alive())
    }

    /// Lifecycle state of the account's connection.
    pub async fn state(&self, id: AccountId) -> Option<IdleState> {
        self.connections.lock().await.get(&id).map(|c| c.state())
    }

    /// Why the account's last task ended.
    pub async fn last_exit(&self, id: AccountId) -> Option<IdleExit> {
        self.connections.lock().await.get(&id).and_then(|c| c.last_exit())
    }

    /// Restarts connections that ended because the network went away.
    /// Authentication failures and exhausted retries stay down.
    pub async fn resume_offline(&self) -> usize {
        let connections = self.connections.lock().await;
        let mut resumed = 0;
        for connection in connections.values() {
            if !connection.is_alive() && connection.last_exit() == Some(IdleExit::Offline) {
                connection.start();
                resumed += 1;
            }
        }
        resumed
    }

    /// Spawns a task that resumes offline connections whenever the network
    /// comes back. Replaces a previous watcher.
    pub fn watch_connectivity(self: &Arc<Self>) {
        let manager: Weak<Self> = Arc::downgrade(self);
        let mut online = self.connectivity.subscribe();
        let handle = tokio::spawn(async move {
            while online.changed().await.is_ok() {
                if !*online.borrow_and_update() {
                    continue;
                }
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                let resumed = manager.resume_offline().await;
                if resumed > 0 {
                    info!(resumed, "Network back, IDLE resumed");
                }
            }
        });
        let previous = self
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::sync::watch;
    use tokio::time::timeout;

    use super::*;
    use crate::connectivity::ManualConnectivity;
    use crate::connector::scripted::{DuplexConnector, FakeServer};
    use crate::idle::MailEventKind;

    const WAIT: Duration = Duration::from_secs(5);

    fn account() -> Account {
        let mut account = Account::with_email("user@example.org");
        account.id = Some(AccountId(1));
        account
    }

    fn config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.idle.shutdown_timeout = Duration::from_secs(2);
        config.backoff.floor = Duration::from_millis(10);
        config.backoff.ceiling = Duration::from_millis(10);
        config.backoff.max_attempts = 2;
        config
    }

    struct Harness {
        manager: Arc<IdleManager<DuplexConnector>>,
        connector: Arc<DuplexConnector>,
        monitor: Arc<ManualConnectivity>,
        servers: UnboundedReceiver<FakeServer>,
    }

    fn harness(online: bool, config: &EngineConfig) -> Harness {
        let (connector, servers) = DuplexConnector::new();
        let connector = Arc::new(connector);
        let monitor = Arc::new(ManualConnectivity::new(online));
        let manager = IdleManager::new(Arc::clone(&connector), monitor.clone(), config);
        Harness {
            manager,
            connector,
            monitor,
            servers,
        }
    }

    async fn next_server(servers: &mut UnboundedReceiver<FakeServer>) -> FakeServer {
        timeout(WAIT, servers.recv()).await.unwrap().unwrap()
    }

    /// Login, EXAMINE with 40 messages, the health check NOOP, then IDLE.
    async fn open_idle(server: &mut FakeServer) {
        server.login("IDLE").await;
        server.expect("A0002 EXAMINE INBOX\r\n").await;
        server
            .send("* 40 EXISTS\r\n* OK [UIDVALIDITY 7] ok\r\nA0002 OK [READ-ONLY] done\r\n")
            .await;
        server.expect("A0003 NOOP\r\n").await;
        server.send("A0003 OK done\r\n").await;
        server.expect("A0004 IDLE\r\n").await;
        server.send("+ idling\r\n").await;
    }

    async fn wait_until_stopped(manager: &IdleManager<DuplexConnector>, id: AccountId) {
        timeout(WAIT, async {
            while manager.is_running(id).await {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn expunge_during_idle_reaches_the_channel() {
        let mut h = harness(true, &config());
        let mut events = h.manager.take_events().unwrap();
        assert!(h.manager.take_events().is_none());

        assert!(h.manager.start_account(&account()).await.unwrap());
        assert!(!h.manager.start_account(&account()).await.unwrap());

        let mut server = next_server(&mut h.servers).await;
        open_idle(&mut server).await;
        server.send("* 5 EXPUNGE\r\n").await;

        let event = timeout(WAIT, events.recv()).await.unwrap().unwrap();
        assert_eq!(
            event,
            MailEvent {
                kind: MailEventKind::Expunge { seq_num: 5 },
                account_id: AccountId(1),
                folder: "INBOX".into(),
            }
        );
        assert_eq!(h.connector.dials(), 1);
        assert_eq!(h.manager.state(AccountId(1)).await, Some(IdleState::Idling));

        let manager = Arc::clone(&h.manager);
        let stopping = tokio::spawn(async move { manager.stop_all().await });
        server.expect("DONE\r\n").await;
        server.send("A0004 OK IDLE terminated\r\n").await;
        server.expect("A0005 LOGOUT\r\n").await;
        server.send("* BYE bye\r\nA0005 OK done\r\n").await;
        stopping.await.unwrap();

        assert!(!h.manager.is_running(AccountId(1)).await);
        assert!(h.servers.try_recv().is_err());
    }

    #[tokio::test]
    async fn new_mail_during_idle_is_reported() {
        let mut h = harness(true, &config());
        let mut events = h.manager.take_events().unwrap();
        h.manager.start_account(&account()).await.unwrap();

        let mut server = next_server(&mut h.servers).await;
        open_idle(&mut server).await;
        server.send("* 41 EXISTS\r\n").await;

        let event = timeout(WAIT, events.recv()).await.unwrap().unwrap();
        assert_eq!(event.kind, MailEventKind::NewMail { count: 41 });

        drop(server);
        h.manager.stop_all().await;
    }

    #[tokio::test]
    async fn offline_start_never_dials_and_resumes_when_online() {
        let mut h = harness(false, &config());
        let id = AccountId(1);
        h.manager.watch_connectivity();
        assert!(h.manager.start_account(&account()).await.unwrap());

        wait_until_stopped(&h.manager, id).await;
        assert_eq!(h.connector.dials(), 0);
        assert_eq!(h.manager.last_exit(id).await, Some(IdleExit::Offline));

        h.monitor.set_online(true);
        let _server = next_server(&mut h.servers).await;
        assert_eq!(h.connector.dials(), 1);

        h.manager.stop_all().await;
        assert!(!h.manager.is_running(id).await);
    }

    #[tokio::test]
    async fn rejected_login_is_terminal() {
        let mut h = harness(true, &config());
        let id = AccountId(1);
        h.manager.start_account(&account()).await.unwrap();

        let mut server = next_server(&mut h.servers).await;
        server.send("* OK [CAPABILITY IMAP4rev1 IDLE] ready\r\n").await;
        server.expect("A0001 LOGIN user@example.org secret\r\n").await;
        server.send("A0001 NO [AUTHENTICATIONFAILED] bad password\r\n").await;

        wait_until_stopped(&h.manager, id).await;
        assert_eq!(h.manager.last_exit(id).await, Some(IdleExit::AuthFailed));
        assert_eq!(h.connector.dials(), 1);
        assert_eq!(h.manager.resume_offline().await, 0);
    }

    #[tokio::test]
    async fn lost_connections_back_off_then_give_up() {
        let mut h = harness(true, &config());
        let id = AccountId(1);
        h.manager.start_account(&account()).await.unwrap();

        // Every session dies before the greeting.
        for _ in 0..3 {
            drop(next_server(&mut h.servers).await);
        }

        wait_until_stopped(&h.manager, id).await;
        assert_eq!(h.manager.last_exit(id).await, Some(IdleExit::Exhausted));
        assert_eq!(h.connector.dials(), 3);
        assert_eq!(h.manager.state(id).await, Some(IdleState::Disconnected));
    }

    #[tokio::test]
    async fn server_without_idle_falls_back_to_polling() {
        let mut h = harness(true, &config());
        let id = AccountId(1);
        h.manager.start_account(&account()).await.unwrap();

        let mut server = next_server(&mut h.servers).await;
        server.login("UIDPLUS").await;
        server.expect("A0002 LOGOUT\r\n").await;
        server.send("* BYE bye\r\nA0002 OK done\r\n").await;

        wait_until_stopped(&h.manager, id).await;
        assert_eq!(h.manager.last_exit(id).await, Some(IdleExit::Unsupported));
    }

    #[tokio::test]
    async fn restart_replaces_the_connection() {
        let mut h = harness(true, &config());
        let id = AccountId(1);
        h.manager.start_account(&account()).await.unwrap();
        let first = next_server(&mut h.servers).await;

        h.manager.restart_account(&account()).await.unwrap();
        drop(first);
        let _second = next_server(&mut h.servers).await;
        assert_eq!(h.connector.dials(), 2);
        assert!(h.manager.is_running(id).await);

        assert!(h.manager.stop_account(id).await);
        assert!(!h.manager.stop_account(id).await);
    }

    #[tokio::test]
    async fn restart_does_not_block_other_accounts() {
        let mut config = config();
        config.idle.shutdown_timeout = Duration::from_millis(500);
        let mut h = harness(true, &config);
        let id = AccountId(1);
        h.manager.start_account(&account()).await.unwrap();
        let mut first = next_server(&mut h.servers).await;
        open_idle(&mut first).await;

        let manager = Arc::clone(&h.manager);
        let restarting =
            tokio::spawn(async move { manager.restart_account(&account()).await.unwrap() });
        // DONE goes unanswered, so the old connection sits in stop().
        first.expect("DONE\r\n").await;
        let other = timeout(
            Duration::from_millis(100),
            h.manager.is_running(AccountId(2)),
        )
        .await
        .unwrap();
        assert!(!other);

        restarting.await.unwrap();
        let _second = next_server(&mut h.servers).await;
        assert_eq!(h.connector.dials(), 2);
        assert!(h.manager.is_running(id).await);
        h.manager.stop_all().await;
    }

    #[tokio::test]
    async fn stop_aborts_a_session_that_never_answers_done() {
        let mut config = config();
        config.idle.shutdown_timeout = Duration::from_millis(100);
        let (connector, mut servers) = DuplexConnector::new();
        let monitor: Arc<dyn ConnectivityMonitor> = Arc::new(ManualConnectivity::new(true));
        let (events, _events_rx) = mpsc::channel(4);
        let connection = IdleConnection::new(
            account(),
            Arc::new(connector),
            monitor,
            config.idle.clone(),
            config.backoff.clone(),
            events,
        )
        .unwrap();
        assert!(connection.start());
        let mut server = next_server(&mut servers).await;
        open_idle(&mut server).await;
        assert_eq!(connection.state(), IdleState::Idling);

        let started = Instant::now();
        assert_eq!(connection.stop().await, None);
        assert!(started.elapsed() < Duration::from_secs(2));
        server.expect("DONE\r\n").await;
        assert_eq!(connection.state(), IdleState::Disconnected);
        assert!(!connection.is_alive());
        assert_eq!(connection.last_exit(), Some(IdleExit::Stopped));
    }

    /// Reports offline on the first check and online afterwards, without
    /// ever waking subscribers.
    struct OnlineAfterFirstCheck {
        checks: AtomicUsize,
        state: watch::Sender<bool>,
    }

    impl ConnectivityMonitor for OnlineAfterFirstCheck {
        fn is_connected(&self) -> bool {
            self.checks.fetch_add(1, Ordering::SeqCst) > 0
        }

        fn subscribe(&self) -> watch::Receiver<bool> {
            self.state.subscribe()
        }
    }

    #[tokio::test]
    async fn network_back_during_offline_exit_resumes_without_a_transition() {
        let (connector, mut servers) = DuplexConnector::new();
        let connector = Arc::new(connector);
        let monitor = Arc::new(OnlineAfterFirstCheck {
            checks: AtomicUsize::new(0),
            state: watch::Sender::new(false),
        });
        let manager = IdleManager::new(Arc::clone(&connector), monitor, &config());
        manager.watch_connectivity();
        manager.start_account(&account()).await.unwrap();

        let _server = next_server(&mut servers).await;
        assert_eq!(connector.dials(), 1);
        assert!(manager.is_running(AccountId(1)).await);
        manager.stop_all().await;
    }
}
