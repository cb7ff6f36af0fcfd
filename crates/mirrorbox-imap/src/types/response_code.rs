//! Bracketed response codes (`[UIDVALIDITY 3857529045]` and friends).

use super::{Capability, Flag, ModSeq, Uid, UidSet, UidValidity};

/// A response code attached to an OK/NO/BAD/BYE line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseCode {
    /// `ALERT`: human-readable text that must be shown.
    Alert,
    /// `CAPABILITY ...`
    Capability(Vec<Capability>),
    /// `PERMANENTFLAGS (...)`
    PermanentFlags(Vec<Flag>),
    /// `READ-ONLY`
    ReadOnly,
    /// `READ-WRITE`
    ReadWrite,
    /// `UIDNEXT n`
    UidNext(Uid),
    /// `UIDVALIDITY n`
    UidValidity(UidValidity),
    /// `UNSEEN n`
    Unseen(u32),
    /// `HIGHESTMODSEQ n`
    HighestModSeq(ModSeq),
    /// `NOMODSEQ`
    NoModSeq,
    /// `APPENDUID validity uid` (UIDPLUS)
    AppendUid {
        /// Epoch of the destination mailbox.
        uid_validity: UidValidity,
        /// UIDs assigned to the appended message(s).
        uids: UidSet,
    },
    /// `COPYUID validity source destination` (UIDPLUS)
    CopyUid {
        /// Epoch of the destination mailbox.
        uid_validity: UidValidity,
        /// Source UIDs.
        source: UidSet,
        /// Destination UIDs in the same order.
        destination: UidSet,
    },
    /// `AUTHENTICATIONFAILED` (RFC 5530)
    AuthenticationFailed,
    /// `CLOSED` (QRESYNC)
    Closed,
    /// Unrecognized code with optional argument text.
    Other(String, Option<String>),
}
