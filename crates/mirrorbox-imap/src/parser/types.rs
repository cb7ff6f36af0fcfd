//! Parsed response structures.

use crate::types::{
    Capability, Flag, ListEntry, MailboxStatusItems, ModSeq, ResponseCode, SeqNum, Status, Uid,
    UidSet,
};

/// One complete server response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Completion of a tagged command.
    Tagged {
        /// Command tag.
        tag: String,
        /// OK, NO or BAD.
        status: Status,
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// Untagged data (`* ...`).
    Untagged(UntaggedResponse),
    /// Continuation request (`+ ...`).
    Continuation(String),
}

/// Untagged server data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UntaggedResponse {
    /// `* OK|NO|BAD|PREAUTH|BYE [code] text`
    Condition {
        /// Condition status.
        status: Status,
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// `* CAPABILITY ...`
    Capability(Vec<Capability>),
    /// `* ENABLED ...`
    Enabled(Vec<String>),
    /// `* LIST (...) "/" name`
    List(ListEntry),
    /// `* FLAGS (...)`
    Flags(Vec<Flag>),
    /// `* n EXISTS`
    Exists(u32),
    /// `* n RECENT`
    Recent(u32),
    /// `* n EXPUNGE`
    Expunge(SeqNum),
    /// `* VANISHED [(EARLIER)] uid-set` (QRESYNC)
    Vanished {
        /// Response to a QRESYNC SELECT rather than a live expunge.
        earlier: bool,
        /// UIDs removed from the mailbox.
        uids: UidSet,
    },
    /// `* n FETCH (...)`
    Fetch {
        /// Message sequence number.
        seq: SeqNum,
        /// Parsed attributes.
        data: Box<FetchData>,
    },
    /// `* SEARCH n...` with optional `(MODSEQ n)`.
    Search {
        /// Matching UIDs (or sequence numbers for non-UID SEARCH).
        ids: Vec<u32>,
        /// Highest MODSEQ of the matches (CONDSTORE).
        mod_seq: Option<ModSeq>,
    },
    /// `* STATUS mailbox (...)`
    Status(MailboxStatusItems),
    /// Anything this client does not interpret.
    Other(String),
}

/// Attributes of one FETCH response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchData {
    /// `UID`
    pub uid: Option<Uid>,
    /// `FLAGS`
    pub flags: Option<Vec<Flag>>,
    /// `MODSEQ`
    pub mod_seq: Option<ModSeq>,
    /// `RFC822.SIZE`
    pub size: Option<u32>,
    /// `INTERNALDATE`, unparsed.
    pub internal_date: Option<String>,
    /// `ENVELOPE`
    pub envelope: Option<Envelope>,
    /// `BODY[HEADER.FIELDS (...)]` payload.
    pub header_fields: Option<Vec<u8>>,
    /// `BODY[]` payload.
    pub body: Option<Vec<u8>>,
}

/// Parsed ENVELOPE structure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    /// `Date:` header, unparsed.
    pub date: Option<String>,
    /// `Subject:`
    pub subject: Option<String>,
    /// `From:`
    pub from: Vec<Address>,
    /// `Sender:`
    pub sender: Vec<Address>,
    /// `Reply-To:`
    pub reply_to: Vec<Address>,
    /// `To:`
    pub to: Vec<Address>,
    /// `Cc:`
    pub cc: Vec<Address>,
    /// `Bcc:`
    pub bcc: Vec<Address>,
    /// `In-Reply-To:`
    pub in_reply_to: Option<String>,
    /// `Message-ID:`
    pub message_id: Option<String>,
}

/// One address from an ENVELOPE address list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Address {
    /// Display name.
    pub name: Option<String>,
    /// Local part.
    pub mailbox: Option<String>,
    /// Domain.
    pub host: Option<String>,
}

impl Address {
    /// Returns `local@domain` when both halves are present.
    #[must_use]
    pub fn email(&self) -> Option<String> {
        match (&self.mailbox, &self.host) {
            (Some(m), Some(h)) => Some(format!("{m}@{h}")),
            _ => None,
        }
    }

    /// `Name <local@domain>` or the bare address.
    #[must_use]
    pub fn display(&self) -> String {
        match (self.name.as_deref(), self.email()) {
            (Some(name), Some(email)) => format!("{name} <{email}>"),
            (None, Some(email)) => email,
            (Some(name), None) => name.to_string(),
            (None, None) => String::new(),
        }
    }
}
