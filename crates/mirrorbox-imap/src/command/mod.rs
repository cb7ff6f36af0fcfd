//! IMAP command construction and serialization.
//!
//! Only the commands the sync engine issues are modelled. All message
//! addressing goes through UIDs; sequence-number variants are deliberately
//! absent so callers cannot accidentally act on shifting positions.

mod tag;

pub use tag::TagGenerator;

use crate::types::{Flag, ModSeq, StatusAttribute, UidSet, flag_list, utf7};

/// Header fields fetched for threading and list display.
pub const THREADING_HEADERS: &[&str] = &["MESSAGE-ID", "IN-REPLY-TO", "REFERENCES"];

/// Item requested in a `UID FETCH`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchAttribute {
    /// `UID`
    Uid,
    /// `FLAGS`
    Flags,
    /// `INTERNALDATE`
    InternalDate,
    /// `RFC822.SIZE`
    Size,
    /// `ENVELOPE`
    Envelope,
    /// `MODSEQ`
    ModSeq,
    /// `BODY.PEEK[HEADER.FIELDS (...)]`
    HeaderFields(&'static [&'static str]),
    /// `BODY.PEEK[]`: the full message without setting `\Seen`.
    FullBody,
}

impl FetchAttribute {
    fn write(&self, buf: &mut String) {
        match self {
            Self::Uid => buf.push_str("UID"),
            Self::Flags => buf.push_str("FLAGS"),
            Self::InternalDate => buf.push_str("INTERNALDATE"),
            Self::Size => buf.push_str("RFC822.SIZE"),
            Self::Envelope => buf.push_str("ENVELOPE"),
            Self::ModSeq => buf.push_str("MODSEQ"),
            Self::HeaderFields(fields) => {
                buf.push_str("BODY.PEEK[HEADER.FIELDS (");
                buf.push_str(&fields.join(" "));
                buf.push_str(")]");
            }
            Self::FullBody => buf.push_str("BODY.PEEK[]"),
        }
    }
}

/// Whether a STORE adds, removes or replaces flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    /// `+FLAGS`
    Add,
    /// `-FLAGS`
    Remove,
    /// `FLAGS`
    Replace,
}

/// An IMAP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `CAPABILITY`
    Capability,
    /// `NOOP`
    Noop,
    /// `LOGOUT`
    Logout,
    /// `STARTTLS`
    StartTls,
    /// `LOGIN user pass`
    Login {
        /// User name.
        username: String,
        /// Password.
        password: String,
    },
    /// `AUTHENTICATE mech [initial-response]`
    Authenticate {
        /// SASL mechanism name.
        mechanism: &'static str,
        /// Base64 initial response (SASL-IR).
        initial_response: Option<String>,
    },
    /// `ENABLE ext...`
    Enable(Vec<&'static str>),
    /// `LIST "" "*"`, optionally with `RETURN (SPECIAL-USE)`.
    List {
        /// Reference name.
        reference: String,
        /// Mailbox pattern.
        pattern: String,
        /// Ask for RFC 6154 attributes explicitly.
        special_use: bool,
    },
    /// `STATUS mailbox (attrs)`
    Status {
        /// Mailbox path.
        mailbox: String,
        /// Requested attributes.
        attributes: Vec<StatusAttribute>,
    },
    /// `SELECT` or `EXAMINE`, with optional `(CONDSTORE)`.
    Select {
        /// Mailbox path.
        mailbox: String,
        /// Open with EXAMINE.
        read_only: bool,
        /// Request CONDSTORE tracking.
        condstore: bool,
    },
    /// `CREATE mailbox`
    Create {
        /// Mailbox path.
        mailbox: String,
    },
    /// `APPEND mailbox (flags) {size}`. The literal follows after continuation.
    Append {
        /// Target mailbox.
        mailbox: String,
        /// Initial flags.
        flags: Vec<Flag>,
        /// Literal length in bytes.
        size: usize,
    },
    /// `CLOSE`
    Close,
    /// `EXPUNGE`
    Expunge,
    /// `UID EXPUNGE set` (UIDPLUS)
    UidExpunge(UidSet),
    /// `UID SEARCH criteria`
    UidSearch(String),
    /// `UID FETCH set (items) [(CHANGEDSINCE n)]`
    UidFetch {
        /// UIDs to fetch.
        uids: UidSet,
        /// Requested items.
        items: Vec<FetchAttribute>,
        /// Only messages whose MODSEQ is greater (CONDSTORE).
        changed_since: Option<ModSeq>,
    },
    /// `UID STORE set [+-]FLAGS[.SILENT] (flags)`
    UidStore {
        /// Target UIDs.
        uids: UidSet,
        /// Add, remove or replace.
        mode: StoreMode,
        /// Flags to apply.
        flags: Vec<Flag>,
        /// Suppress untagged FETCH echoes.
        silent: bool,
    },
    /// `UID COPY set mailbox`
    UidCopy {
        /// Source UIDs.
        uids: UidSet,
        /// Destination mailbox.
        mailbox: String,
    },
    /// `UID MOVE set mailbox` (RFC 6851)
    UidMove {
        /// Source UIDs.
        uids: UidSet,
        /// Destination mailbox.
        mailbox: String,
    },
    /// `IDLE`
    Idle,
    /// `DONE` (ends IDLE; untagged)
    Done,
}

impl Command {
    /// Short name for logs. Never includes arguments, so credentials stay out of traces.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Capability => "CAPABILITY",
            Self::Noop => "NOOP",
            Self::Logout => "LOGOUT",
            Self::StartTls => "STARTTLS",
            Self::Login { .. } => "LOGIN",
            Self::Authenticate { .. } => "AUTHENTICATE",
            Self::Enable(_) => "ENABLE",
            Self::List { .. } => "LIST",
            Self::Status { .. } => "STATUS",
            Self::Select {
                read_only: true, ..
            } => "EXAMINE",
            Self::Select { .. } => "SELECT",
            Self::Create { .. } => "CREATE",
            Self::Append { .. } => "APPEND",
            Self::Close => "CLOSE",
            Self::Expunge => "EXPUNGE",
            Self::UidExpunge(_) => "UID EXPUNGE",
            Self::UidSearch(_) => "UID SEARCH",
            Self::UidFetch { .. } => "UID FETCH",
            Self::UidStore { .. } => "UID STORE",
            Self::UidCopy { .. } => "UID COPY",
            Self::UidMove { .. } => "UID MOVE",
            Self::Idle => "IDLE",
            Self::Done => "DONE",
        }
    }

    /// Serializes the command with its tag and trailing CRLF.
    #[must_use]
    pub fn serialize(&self, tag: &str) -> Vec<u8> {
        let mut buf = String::new();
        if !matches!(self, Self::Done) {
            buf.push_str(tag);
            buf.push(' ');
        }

        match self {
            Self::Capability
            | Self::Noop
            | Self::Logout
            | Self::StartTls
            | Self::Close
            | Self::Expunge
            | Self::Idle
            | Self::Done => buf.push_str(self.name()),
            Self::Login { username, password } => {
                buf.push_str("LOGIN ");
                push_astring(&mut buf, username);
                buf.push(' ');
                push_astring(&mut buf, password);
            }
            Self::Authenticate {
                mechanism,
                initial_response,
            } => {
                buf.push_str("AUTHENTICATE ");
                buf.push_str(mechanism);
                if let Some(ir) = initial_response {
                    buf.push(' ');
                    // RFC 4959: an empty initial response is sent as "=".
                    buf.push_str(if ir.is_empty() { "=" } else { ir });
                }
            }
            Self::Enable(extensions) => {
                buf.push_str("ENABLE ");
                buf.push_str(&extensions.join(" "));
            }
            Self::List {
                reference,
                pattern,
                special_use,
            } => {
                buf.push_str("LIST ");
                push_mailbox(&mut buf, reference);
                buf.push(' ');
                push_mailbox(&mut buf, pattern);
                if *special_use {
                    buf.push_str(" RETURN (SPECIAL-USE)");
                }
            }
            Self::Status {
                mailbox,
                attributes,
            } => {
                buf.push_str("STATUS ");
                push_mailbox(&mut buf, mailbox);
                let names: Vec<&str> = attributes.iter().map(|a| a.as_str()).collect();
                buf.push_str(" (");
                buf.push_str(&names.join(" "));
                buf.push(')');
            }
            Self::Select {
                mailbox,
                condstore,
                ..
            } => {
                buf.push_str(self.name());
                buf.push(' ');
                push_mailbox(&mut buf, mailbox);
                if *condstore {
                    buf.push_str(" (CONDSTORE)");
                }
            }
            Self::Create { mailbox } => {
                buf.push_str("CREATE ");
                push_mailbox(&mut buf, mailbox);
            }
            Self::Append {
                mailbox,
                flags,
                size,
            } => {
                buf.push_str("APPEND ");
                push_mailbox(&mut buf, mailbox);
                if !flags.is_empty() {
                    buf.push(' ');
                    buf.push_str(&flag_list(flags));
                }
                buf.push_str(&format!(" {{{size}}}"));
            }
            Self::UidExpunge(uids) => {
                buf.push_str("UID EXPUNGE ");
                buf.push_str(&uids.to_string());
            }
            Self::UidSearch(criteria) => {
                buf.push_str("UID SEARCH ");
                buf.push_str(criteria);
            }
            Self::UidFetch {
                uids,
                items,
                changed_since,
            } => {
                buf.push_str("UID FETCH ");
                buf.push_str(&uids.to_string());
                buf.push_str(" (");
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        buf.push(' ');
                    }
                    item.write(&mut buf);
                }
                buf.push(')');
                if let Some(modseq) = changed_since {
                    buf.push_str(&format!(" (CHANGEDSINCE {modseq})"));
                }
            }
            Self::UidStore {
                uids,
                mode,
                flags,
                silent,
            } => {
                buf.push_str("UID STORE ");
                buf.push_str(&uids.to_string());
                buf.push_str(match mode {
                    StoreMode::Add => " +FLAGS",
                    StoreMode::Remove => " -FLAGS",
                    StoreMode::Replace => " FLAGS",
                });
                if *silent {
                    buf.push_str(".SILENT");
                }
                buf.push(' ');
                buf.push_str(&flag_list(flags));
            }
            Self::UidCopy { uids, mailbox } | Self::UidMove { uids, mailbox } => {
                buf.push_str(self.name());
                buf.push(' ');
                buf.push_str(&uids.to_string());
                buf.push(' ');
                push_mailbox(&mut buf, mailbox);
            }
        }

        buf.push_str("\r\n");
        buf.into_bytes()
    }
}

/// Appends a mailbox name, modified-UTF-7 encoded and quoted when needed.
fn push_mailbox(buf: &mut String, name: &str) {
    push_astring(buf, &utf7::encode(name));
}

/// Appends an atom when possible, otherwise a quoted string.
fn push_astring(buf: &mut String, s: &str) {
    if !s.is_empty() && !s.bytes().any(needs_quoting) {
        buf.push_str(s);
        return;
    }
    buf.push('"');
    for ch in s.chars() {
        if ch == '"' || ch == '\\' {
            buf.push('\\');
        }
        buf.push(ch);
    }
    buf.push('"');
}

const fn needs_quoting(b: u8) -> bool {
    matches!(
        b,
        b' ' | b'"' | b'\\' | b'(' | b')' | b'{' | b'%' | b'*' | b']'
    ) || b < 0x20
        || b >= 0x7F
}
