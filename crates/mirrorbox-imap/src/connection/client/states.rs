//! Type-state markers.

use crate::types::MailboxStatus;

/// Connected, not yet logged in.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotAuthenticated;

/// Logged in, no mailbox selected.
#[derive(Debug, Clone, Copy, Default)]
pub struct Authenticated;

/// A mailbox is selected. Carries what SELECT/EXAMINE reported.
#[derive(Debug, Clone)]
pub struct Selected {
    pub(crate) mailbox: String,
    pub(crate) status: MailboxStatus,
}

impl Selected {
    /// The selected mailbox path.
    #[must_use]
    pub fn mailbox(&self) -> &str {
        &self.mailbox
    }

    /// The SELECT/EXAMINE snapshot.
    #[must_use]
    pub const fn status(&self) -> &MailboxStatus {
        &self.status
    }
}
