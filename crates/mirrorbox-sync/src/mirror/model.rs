//! Mirror record types.

use chrono::{DateTime, Utc};
use mirrorbox_imap::{Flag, FolderType};
use serde::{Deserialize, Serialize};

use crate::account::AccountId;

/// Row ID of a mirrored folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FolderId(pub i64);

impl std::fmt::Display for FolderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One mirrored IMAP mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folder {
    /// Row ID.
    pub id: FolderId,
    /// Owning account.
    pub account_id: AccountId,
    /// Server-side path. Never changes for a row.
    pub path: String,
    /// Hierarchy delimiter.
    pub delimiter: Option<char>,
    /// Role of the folder.
    pub folder_type: FolderType,
    /// The role was set by the user and inference leaves it alone.
    pub type_overridden: bool,
    /// UID epoch the cached messages belong to.
    pub uid_validity: Option<u32>,
    /// Server's UIDNEXT at the last sync.
    pub uid_next: Option<u32>,
    /// CONDSTORE high-water mark at the last sync.
    pub highest_mod_seq: Option<u64>,
    /// Messages in the folder.
    pub total_count: u32,
    /// Messages without `\Seen`.
    pub unread_count: u32,
    /// Completion time of the last successful sync.
    pub last_synced: Option<DateTime<Utc>>,
}

/// A folder as reported by LIST, before it has a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFolder {
    /// Server-side path.
    pub path: String,
    /// Hierarchy delimiter.
    pub delimiter: Option<char>,
    /// Inferred role.
    pub folder_type: FolderType,
}

/// What a LIST-and-diff pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderListDiff {
    /// Paths that got a new row.
    pub added: Vec<String>,
    /// Paths whose rows (and messages) were deleted.
    pub removed: Vec<String>,
}

/// Message flags the mirror tracks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFlags {
    /// `\Seen`
    pub seen: bool,
    /// `\Flagged`
    pub flagged: bool,
    /// `\Answered`
    pub answered: bool,
    /// `$Forwarded`
    pub forwarded: bool,
    /// `\Draft`
    pub draft: bool,
    /// `\Deleted`
    pub deleted: bool,
}

impl MessageFlags {
    /// Collects the tracked flags out of a FETCH flag list.
    #[must_use]
    pub fn from_imap(flags: &[Flag]) -> Self {
        let mut out = Self::default();
        for flag in flags {
            match flag {
                Flag::Seen => out.seen = true,
                Flag::Flagged => out.flagged = true,
                Flag::Answered => out.answered = true,
                Flag::Forwarded => out.forwarded = true,
                Flag::Draft => out.draft = true,
                Flag::Deleted => out.deleted = true,
                Flag::Recent | Flag::Keyword(_) => {}
            }
        }
        out
    }

    /// Sets or clears the tracked counterpart of `flag`.
    pub fn apply(&mut self, flag: &Flag, on: bool) {
        match flag {
            Flag::Seen => self.seen = on,
            Flag::Flagged => self.flagged = on,
            Flag::Answered => self.answered = on,
            Flag::Forwarded => self.forwarded = on,
            Flag::Draft => self.draft = on,
            Flag::Deleted => self.deleted = on,
            Flag::Recent | Flag::Keyword(_) => {}
        }
    }
}

/// Header-level data for one message, as stored by the header pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageHeader {
    /// UID within the folder's current epoch.
    pub uid: u32,
    /// `Message-ID`, angle brackets included.
    pub message_id: Option<String>,
    /// `In-Reply-To`.
    pub in_reply_to: Option<String>,
    /// `References`, oldest first.
    pub references: Vec<String>,
    /// Decoded subject.
    pub subject: Option<String>,
    /// Sender as `Name <addr>`.
    pub from: Option<String>,
    /// `Date:` header, unparsed.
    pub date: Option<String>,
    /// Server arrival time, unparsed.
    pub internal_date: Option<String>,
    /// Message size in bytes.
    pub size: Option<u32>,
    /// Tracked flags.
    pub flags: MessageFlags,
    /// Per-message MODSEQ.
    pub mod_seq: Option<u64>,
}

/// A mirrored message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Folder row.
    pub folder_id: FolderId,
    /// Header data.
    pub header: MessageHeader,
    /// The full body has been downloaded.
    pub body_fetched: bool,
}

/// A flag change reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagUpdate {
    /// Message UID.
    pub uid: u32,
    /// New flags.
    pub flags: MessageFlags,
    /// MODSEQ of the change.
    pub mod_seq: Option<u64>,
}

/// Server-side mailbox state recorded after a sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FolderState {
    /// UIDVALIDITY.
    pub uid_validity: Option<u32>,
    /// UIDNEXT.
    pub uid_next: Option<u32>,
    /// HIGHESTMODSEQ.
    pub highest_mod_seq: Option<u64>,
}

/// Everything one folder sync changes, applied in a single transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderChanges {
    /// The UID epoch changed: drop every cached message first.
    pub reset_epoch: bool,
    /// UIDs no longer on the server.
    pub expunged: Vec<u32>,
    /// Flag changes for cached messages.
    pub flag_updates: Vec<FlagUpdate>,
    /// New messages, bodies not yet fetched.
    pub new_messages: Vec<MessageHeader>,
    /// State to record.
    pub state: FolderState,
}

/// Body backfill progress for one folder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchProgress {
    /// Messages in the mirror.
    pub bodies_total: u32,
    /// Messages whose body is stored.
    pub bodies_fetched: u32,
}

impl FetchProgress {
    /// True when every body is stored.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.bodies_fetched >= self.bodies_total
    }

    /// Fraction done, 1.0 for an empty folder.
    #[must_use]
    pub fn ratio(&self) -> f64 {
        if self.bodies_total == 0 {
            1.0
        } else {
            f64::from(self.bodies_fetched) / f64::from(self.bodies_total)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_from_imap_ignore_keywords() {
        let flags = MessageFlags::from_imap(&[
            Flag::Seen,
            Flag::Forwarded,
            Flag::Recent,
            Flag::Keyword("$Label1".into()),
        ]);
        assert!(flags.seen && flags.forwarded);
        assert!(!flags.flagged && !flags.deleted);
    }

    #[test]
    fn apply_toggles_single_flag() {
        let mut flags = MessageFlags::default();
        flags.apply(&Flag::Flagged, true);
        assert!(flags.flagged);
        flags.apply(&Flag::Flagged, false);
        assert_eq!(flags, MessageFlags::default());
    }

    #[test]
    fn progress_ratio() {
        assert!(FetchProgress::default().is_complete());
        let p = FetchProgress {
            bodies_total: 4,
            bodies_fetched: 1,
        };
        assert!(!p.is_complete());
        assert!((p.ratio() - 0.25).abs() < f64::EPSILON);
    }
}
