//! Observer for unsolicited mailbox changes.
//!
//! Servers may report EXISTS, EXPUNGE and VANISHED at any time: in reply to
//! NOOP, while a FETCH is running, or during IDLE. A handler registered when
//! the client is built sees every one of them, whichever command happened to
//! be in flight.

use crate::types::{SeqNum, UidSet};

/// Receives unsolicited mailbox notifications.
///
/// Called inline from the response loop, so implementations must not block.
pub trait UnsolicitedHandler: Send + Sync {
    /// The selected mailbox now holds `count` messages.
    fn on_exists(&self, count: u32) {
        let _ = count;
    }

    /// The message at `seq` was removed. Later sequence numbers shift down.
    fn on_expunge(&self, seq: SeqNum) {
        let _ = seq;
    }

    /// Messages were removed, reported by UID (QRESYNC).
    fn on_vanished(&self, uids: &UidSet) {
        let _ = uids;
    }
}
