//! Network connectivity as seen by the engine.
//!
//! The engine never probes the network itself. The embedding application
//! (which gets OS reachability callbacks) feeds a monitor, and the IDLE layer
//! and scheduler consult it before dialing.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Source of online/offline state.
pub trait ConnectivityMonitor: Send + Sync {
    /// Current state.
    fn is_connected(&self) -> bool;

    /// Receiver that observes every transition.
    fn subscribe(&self) -> watch::Receiver<bool>;

    /// Waits until the network is up. Returns false if `cancel` fired first
    /// or the monitor went away.
    fn wait_for_connection<'a>(
        &'a self,
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(async move {
            let mut rx = self.subscribe();
            let online = async move { rx.wait_for(|up| *up).await.is_ok() };
            tokio::select! {
                biased;
                () = cancel.cancelled() => false,
                up = online => up,
            }
        })
    }
}

/// Monitor driven by explicit [`ManualConnectivity::set_online`] calls.
#[derive(Debug)]
pub struct ManualConnectivity {
    state: watch::Sender<bool>,
}

impl ManualConnectivity {
    /// Creates a monitor in the given state.
    #[must_use]
    pub fn new(online: bool) -> Self {
        Self {
            state: watch::Sender::new(online),
        }
    }

    /// Records a transition. Repeated values do not wake subscribers.
    pub fn set_online(&self, online: bool) {
        let changed = self.state.send_if_modified(|current| {
            let changed = *current != online;
            *current = online;
            changed
        });
        if changed {
            info!("Connectivity changed: {}", if online { "online" } else { "offline" });
        }
    }
}

impl Default for ManualConnectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ConnectivityMonitor for ManualConnectivity {
    fn is_connected(&self) -> bool {
        *self.state.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }
}

/// Monitor that always reports online, for hosts without reachability
/// information.
#[derive(Debug)]
pub struct AlwaysOnline {
    state: watch::Sender<bool>,
}

impl Default for AlwaysOnline {
    fn default() -> Self {
        Self {
            state: watch::Sender::new(true),
        }
    }
}

impl ConnectivityMonitor for AlwaysOnline {
    fn is_connected(&self) -> bool {
        true
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }
}
