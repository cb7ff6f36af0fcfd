//! Lifecycle of one IDLE connection.

use serde::Serialize;
use tokio::sync::watch;
use tracing::{trace, warn};

/// Where an IDLE connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdleState {
    /// No session. Initial and final state.
    Disconnected,
    /// Dialing, logging in or opening the watched folder.
    Connecting,
    /// Parked in IDLE, or between two IDLE cycles.
    Idling,
}

impl IdleState {
    /// Whether `next` may follow `self`.
    ///
    /// `Idling -> Idling` is a cycle renewal or a received event.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Disconnected, Self::Connecting)
                | (Self::Connecting, Self::Idling | Self::Disconnected)
                | (Self::Idling, Self::Idling | Self::Disconnected)
        )
    }

    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Idling => "idling",
        }
    }
}

impl std::fmt::Display for IdleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable state with guarded transitions.
#[derive(Debug)]
pub struct StateCell {
    tx: watch::Sender<IdleState>,
}

impl Default for StateCell {
    fn default() -> Self {
        Self {
            tx: watch::Sender::new(IdleState::Disconnected),
        }
    }
}

impl StateCell {
    /// Current state.
    #[must_use]
    pub fn get(&self) -> IdleState {
        *self.tx.borrow()
    }

    /// Receiver that observes every change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<IdleState> {
        self.tx.subscribe()
    }

    /// Moves to `next` if the lifecycle allows it. Returns false, leaving the
    /// state untouched, otherwise.
    pub fn transition(&self, next: IdleState) -> bool {
        let mut allowed = true;
        self.tx.send_if_modified(|current| {
            if !current.can_transition_to(next) {
                allowed = false;
                return false;
            }
            let changed = *current != next;
            if changed {
                trace!("IDLE state {current} -> {next}");
            }
            *current = next;
            changed
        });
        if !allowed {
            warn!("Rejected IDLE state transition to {next} from {}", self.get());
        }
        allowed
    }

    /// Forces `Disconnected`, e.g. after the task was aborted.
    pub fn reset(&self) {
        self.tx.send_if_modified(|current| {
            let changed = *current != IdleState::Disconnected;
            *current = IdleState::Disconnected;
            changed
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_transitions() {
        use IdleState::{Connecting, Disconnected, Idling};

        assert!(Disconnected.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Idling));
        assert!(Connecting.can_transition_to(Disconnected));
        assert!(Idling.can_transition_to(Idling));
        assert!(Idling.can_transition_to(Disconnected));

        assert!(!Disconnected.can_transition_to(Idling));
        assert!(!Idling.can_transition_to(Connecting));
        assert!(!Disconnected.can_transition_to(Disconnected));
    }

    #[test]
    fn cell_rejects_illegal_moves() {
        let cell = StateCell::default();
        assert!(!cell.transition(IdleState::Idling));
        assert_eq!(cell.get(), IdleState::Disconnected);

        assert!(cell.transition(IdleState::Connecting));
        assert!(cell.transition(IdleState::Idling));
        assert!(cell.transition(IdleState::Idling));
        assert_eq!(cell.get(), IdleState::Idling);

        cell.reset();
        assert_eq!(cell.get(), IdleState::Disconnected);
    }

    #[test]
    fn subscribers_see_changes() {
        let cell = StateCell::default();
        let mut rx = cell.subscribe();
        cell.transition(IdleState::Connecting);
        assert!(rx.has_changed().unwrap_or(false));
        assert_eq!(*rx.borrow_and_update(), IdleState::Connecting);
    }
}
