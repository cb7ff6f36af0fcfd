//! Core IMAP value types.

mod capability;
mod flags;
mod identifiers;
mod mailbox;
mod response_code;
mod uid_set;
pub(crate) mod utf7;

pub use capability::{Capabilities, Capability, Status};
pub(crate) use flags::flag_list;
pub use flags::Flag;
pub use identifiers::{ModSeq, SeqNum, Uid, UidValidity};
pub use mailbox::{ListEntry, MailboxAttribute, MailboxStatus, MailboxStatusItems, StatusAttribute};
pub use response_code::ResponseCode;
pub use uid_set::UidSet;
