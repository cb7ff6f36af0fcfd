//! Folder role inference from LIST results.
//!
//! RFC 6154 SPECIAL-USE attributes are authoritative. Servers without them
//! (or folders the server does not tag) fall back to well-known names. When
//! any folder claims a role by attribute, other folders that only match that
//! role by name are plain folders: a server tagging `\Sent` on "Sent Mail"
//! means a leftover "Sent" folder is not the sent folder.

use std::collections::HashSet;
use std::fmt;

use crate::types::{ListEntry, MailboxAttribute};

/// Role of a folder in the mail client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FolderType {
    /// The INBOX.
    Inbox,
    /// Sent messages.
    Sent,
    /// Drafts.
    Drafts,
    /// Deleted messages.
    Trash,
    /// Junk mail.
    Spam,
    /// Archive.
    Archive,
    /// Virtual folder with all messages (Gmail "All Mail").
    All,
    /// Virtual folder with flagged messages.
    Starred,
    /// Any other folder.
    #[default]
    Folder,
}

impl FolderType {
    /// Role implied by a RFC 6154 attribute, if any.
    #[must_use]
    pub fn from_attributes(attributes: &[MailboxAttribute]) -> Option<Self> {
        attributes.iter().find_map(|a| match a {
            MailboxAttribute::Sent => Some(Self::Sent),
            MailboxAttribute::Drafts => Some(Self::Drafts),
            MailboxAttribute::Trash => Some(Self::Trash),
            MailboxAttribute::Junk => Some(Self::Spam),
            MailboxAttribute::Archive => Some(Self::Archive),
            MailboxAttribute::All => Some(Self::All),
            MailboxAttribute::Flagged => Some(Self::Starred),
            _ => None,
        })
    }

    /// Role guessed from a folder's leaf name.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_lowercase();
        match lower.as_str() {
            "inbox" => Self::Inbox,
            "sent" | "sent items" | "sent mail" | "sent messages" => Self::Sent,
            "drafts" | "draft" => Self::Drafts,
            "trash" | "deleted" | "deleted items" | "deleted messages" | "bin" => Self::Trash,
            "spam" | "junk" | "junk e-mail" | "junk mail" | "bulk mail" => Self::Spam,
            "archive" | "archives" => Self::Archive,
            "all mail" => Self::All,
            "starred" | "flagged" => Self::Starred,
            _ => Self::Folder,
        }
    }

    /// Stable lowercase name, used for storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inbox => "inbox",
            Self::Sent => "sent",
            Self::Drafts => "drafts",
            Self::Trash => "trash",
            Self::Spam => "spam",
            Self::Archive => "archive",
            Self::All => "all",
            Self::Starred => "starred",
            Self::Folder => "folder",
        }
    }

    /// Inverse of [`FolderType::as_str`].
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "inbox" => Self::Inbox,
            "sent" => Self::Sent,
            "drafts" => Self::Drafts,
            "trash" => Self::Trash,
            "spam" => Self::Spam,
            "archive" => Self::Archive,
            "all" => Self::All,
            "starred" => Self::Starred,
            "folder" => Self::Folder,
            _ => return None,
        })
    }
}

impl fmt::Display for FolderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Infers the role of every entry of one LIST result, in order.
#[must_use]
pub fn infer_folder_types(entries: &[ListEntry]) -> Vec<FolderType> {
    let by_attribute: Vec<Option<FolderType>> = entries
        .iter()
        .map(|e| FolderType::from_attributes(&e.attributes))
        .collect();
    let claimed: HashSet<FolderType> = by_attribute.iter().flatten().copied().collect();

    entries
        .iter()
        .zip(by_attribute)
        .map(|(entry, attr)| {
            if entry.path.eq_ignore_ascii_case("INBOX") {
                return FolderType::Inbox;
            }
            if let Some(t) = attr {
                return t;
            }
            match FolderType::from_name(entry.leaf_name()) {
                FolderType::Inbox => FolderType::Folder,
                t if claimed.contains(&t) => FolderType::Folder,
                t => t,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, attrs: &[MailboxAttribute]) -> ListEntry {
        ListEntry {
            attributes: attrs.to_vec(),
            delimiter: Some('/'),
            path: path.to_string(),
        }
    }

    #[test]
    fn attributes_take_precedence_over_names() {
        let entries = [entry("Papierkorb", &[MailboxAttribute::Trash])];
        assert_eq!(infer_folder_types(&entries), vec![FolderType::Trash]);
    }

    #[test]
    fn name_match_is_demoted_when_attribute_claims_role() {
        let entries = [
            entry("INBOX", &[]),
            entry("[Gmail]/Sent Mail", &[MailboxAttribute::Sent]),
            entry("Sent", &[]),
            entry("Drafts", &[]),
        ];
        assert_eq!(
            infer_folder_types(&entries),
            vec![
                FolderType::Inbox,
                FolderType::Sent,
                FolderType::Folder,
                FolderType::Drafts,
            ]
        );
    }

    #[test]
    fn nested_inbox_name_is_not_inbox() {
        let entries = [entry("INBOX", &[]), entry("Projects/Inbox", &[])];
        assert_eq!(
            infer_folder_types(&entries),
            vec![FolderType::Inbox, FolderType::Folder]
        );
    }

    #[test]
    fn names_without_special_use() {
        assert_eq!(FolderType::from_name("Junk E-mail"), FolderType::Spam);
        assert_eq!(FolderType::from_name("Deleted Items"), FolderType::Trash);
        assert_eq!(FolderType::from_name("All Mail"), FolderType::All);
        assert_eq!(FolderType::from_name("Receipts"), FolderType::Folder);
    }

    #[test]
    fn storage_names_round_trip() {
        for t in [FolderType::Inbox, FolderType::Starred, FolderType::Folder] {
            assert_eq!(FolderType::parse(t.as_str()), Some(t));
        }
        assert_eq!(FolderType::parse("bogus"), None);
    }
}
