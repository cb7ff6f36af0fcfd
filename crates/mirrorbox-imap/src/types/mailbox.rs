//! Mailbox listing and status types.

use super::{Flag, ModSeq, Uid, UidValidity};

/// A LIST attribute, including RFC 6154 SPECIAL-USE markers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MailboxAttribute {
    /// `\Noselect` or `\NonExistent`: cannot be selected.
    NoSelect,
    /// `\HasChildren`
    HasChildren,
    /// `\HasNoChildren`
    HasNoChildren,
    /// `\All`
    All,
    /// `\Archive`
    Archive,
    /// `\Drafts`
    Drafts,
    /// `\Flagged`
    Flagged,
    /// `\Junk` (also accepts the non-standard `\Spam`)
    Junk,
    /// `\Sent`
    Sent,
    /// `\Trash`
    Trash,
    /// Anything else.
    Other(String),
}

impl MailboxAttribute {
    /// Parses a LIST attribute atom.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "\\NOSELECT" | "\\NONEXISTENT" => Self::NoSelect,
            "\\HASCHILDREN" => Self::HasChildren,
            "\\HASNOCHILDREN" => Self::HasNoChildren,
            "\\ALL" => Self::All,
            "\\ARCHIVE" => Self::Archive,
            "\\DRAFTS" => Self::Drafts,
            "\\FLAGGED" => Self::Flagged,
            "\\JUNK" | "\\SPAM" => Self::Junk,
            "\\SENT" => Self::Sent,
            "\\TRASH" => Self::Trash,
            _ => Self::Other(s.to_string()),
        }
    }
}

/// One `* LIST` response line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    /// Mailbox attributes.
    pub attributes: Vec<MailboxAttribute>,
    /// Hierarchy delimiter, `None` for a flat namespace.
    pub delimiter: Option<char>,
    /// Full server-side path.
    pub path: String,
}

impl ListEntry {
    /// Returns true unless the mailbox is `\Noselect`.
    #[must_use]
    pub fn is_selectable(&self) -> bool {
        !self.attributes.contains(&MailboxAttribute::NoSelect)
    }

    /// Returns true if the server marks the mailbox as having children.
    #[must_use]
    pub fn has_children(&self) -> bool {
        self.attributes.contains(&MailboxAttribute::HasChildren)
    }

    /// Last hierarchy component, used as display name.
    #[must_use]
    pub fn leaf_name(&self) -> &str {
        self.delimiter
            .and_then(|d| self.path.rsplit(d).next())
            .unwrap_or(&self.path)
    }
}

/// State reported by SELECT or EXAMINE.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailboxStatus {
    /// Number of messages (`EXISTS`).
    pub exists: u32,
    /// Number of `\Recent` messages.
    pub recent: u32,
    /// First unseen sequence number, if reported.
    pub unseen: Option<u32>,
    /// Predicted next UID.
    pub uid_next: Option<Uid>,
    /// UID epoch.
    pub uid_validity: Option<UidValidity>,
    /// CONDSTORE high-water mark.
    pub highest_mod_seq: Option<ModSeq>,
    /// Server reported `NOMODSEQ` for this mailbox.
    pub no_mod_seq: bool,
    /// Flags defined in the mailbox.
    pub flags: Vec<Flag>,
    /// Flags the client may set permanently.
    pub permanent_flags: Vec<Flag>,
    /// Opened read-only.
    pub read_only: bool,
}

/// Attributes that can be requested with STATUS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusAttribute {
    /// `MESSAGES`
    Messages,
    /// `UIDNEXT`
    UidNext,
    /// `UIDVALIDITY`
    UidValidity,
    /// `UNSEEN`
    Unseen,
    /// `HIGHESTMODSEQ` (CONDSTORE)
    HighestModSeq,
}

impl StatusAttribute {
    /// Wire name of the attribute.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Messages => "MESSAGES",
            Self::UidNext => "UIDNEXT",
            Self::UidValidity => "UIDVALIDITY",
            Self::Unseen => "UNSEEN",
            Self::HighestModSeq => "HIGHESTMODSEQ",
        }
    }
}

/// Parsed `* STATUS` response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailboxStatusItems {
    /// Mailbox the status belongs to.
    pub mailbox: String,
    /// `MESSAGES`
    pub messages: Option<u32>,
    /// `UIDNEXT`
    pub uid_next: Option<Uid>,
    /// `UIDVALIDITY`
    pub uid_validity: Option<UidValidity>,
    /// `UNSEEN`
    pub unseen: Option<u32>,
    /// `HIGHESTMODSEQ`
    pub highest_mod_seq: Option<ModSeq>,
}
