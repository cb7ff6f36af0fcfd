//! Message-level commands for the selected state. Everything is UID-scoped.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use super::Client;
use super::states::{Authenticated, Selected};
use crate::command::{Command, FetchAttribute, StoreMode};
use crate::parser::{FetchData, UntaggedResponse};
use crate::types::{Flag, MailboxStatus, ModSeq, ResponseCode, Uid, UidSet, UidValidity};
use crate::{Error, Result};

/// Source-to-destination UID mapping reported by `COPYUID` (UIDPLUS).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UidMapping {
    /// Epoch of the destination mailbox.
    pub uid_validity: UidValidity,
    /// UIDs in the source mailbox.
    pub source: UidSet,
    /// Corresponding UIDs in the destination mailbox.
    pub destination: UidSet,
}

impl UidMapping {
    fn from_codes<'a>(mut codes: impl Iterator<Item = &'a ResponseCode>) -> Option<Self> {
        codes.find_map(|code| match code {
            ResponseCode::CopyUid {
                uid_validity,
                source,
                destination,
            } => Some(Self {
                uid_validity: *uid_validity,
                source: source.clone(),
                destination: destination.clone(),
            }),
            _ => None,
        })
    }
}

impl<S> Client<S, Selected>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// The selected mailbox path.
    #[must_use]
    pub fn mailbox(&self) -> &str {
        self.state.mailbox()
    }

    /// What SELECT/EXAMINE reported.
    #[must_use]
    pub const fn mailbox_status(&self) -> &MailboxStatus {
        self.state.status()
    }

    /// `UID SEARCH criteria`, e.g. `ALL` or `UID 100:*`.
    pub async fn uid_search(&mut self, criteria: &str) -> Result<Vec<Uid>> {
        let completion = self.run(&Command::UidSearch(criteria.to_string())).await?;
        let mut uids: Vec<Uid> = completion
            .untagged
            .into_iter()
            .filter_map(|u| match u {
                UntaggedResponse::Search { ids, .. } => Some(ids),
                _ => None,
            })
            .flatten()
            .filter_map(Uid::new)
            .collect();
        uids.sort_unstable();
        Ok(uids)
    }

    /// `UID FETCH`. `changed_since` adds the CONDSTORE modifier and needs the
    /// capability. Only responses carrying a UID are returned; unsolicited
    /// flag updates without one are skipped.
    pub async fn uid_fetch(
        &mut self,
        uids: &UidSet,
        items: &[FetchAttribute],
        changed_since: Option<ModSeq>,
    ) -> Result<Vec<FetchData>> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        if changed_since.is_some() && !self.supports_condstore() {
            return Err(Error::MissingCapability("CONDSTORE"));
        }
        let completion = self
            .run(&Command::UidFetch {
                uids: uids.clone(),
                items: items.to_vec(),
                changed_since,
            })
            .await?;
        Ok(completion
            .untagged
            .into_iter()
            .filter_map(|u| match u {
                UntaggedResponse::Fetch { data, .. } if data.uid.is_some() => Some(*data),
                _ => None,
            })
            .collect())
    }

    /// `UID STORE ... .SILENT`.
    pub async fn uid_store(&mut self, uids: &UidSet, mode: StoreMode, flags: &[Flag]) -> Result<()> {
        if uids.is_empty() {
            return Ok(());
        }
        self.run(&Command::UidStore {
            uids: uids.clone(),
            mode,
            flags: flags.to_vec(),
            silent: true,
        })
        .await
        .map(drop)
    }

    /// `UID COPY`. Returns the UID mapping when UIDPLUS reports it.
    pub async fn uid_copy(&mut self, uids: &UidSet, mailbox: &str) -> Result<Option<UidMapping>> {
        let completion = self
            .run(&Command::UidCopy {
                uids: uids.clone(),
                mailbox: mailbox.to_string(),
            })
            .await?;
        Ok(UidMapping::from_codes(completion.codes()))
    }

    /// `UID MOVE`, or COPY + `\Deleted` + expunge on servers without MOVE.
    pub async fn uid_move(&mut self, uids: &UidSet, mailbox: &str) -> Result<Option<UidMapping>> {
        if self.supports_move() {
            let completion = self
                .run(&Command::UidMove {
                    uids: uids.clone(),
                    mailbox: mailbox.to_string(),
                })
                .await?;
            return Ok(UidMapping::from_codes(completion.codes()));
        }
        debug!("Server lacks MOVE, emulating with COPY");
        let mapping = self.uid_copy(uids, mailbox).await?;
        self.uid_store(uids, StoreMode::Add, &[Flag::Deleted]).await?;
        self.uid_expunge(uids).await?;
        Ok(mapping)
    }

    /// Permanently removes `\Deleted` messages in `uids`.
    ///
    /// Uses `UID EXPUNGE` (UIDPLUS). Without it, falls back to a plain
    /// EXPUNGE, which also removes any other `\Deleted` message.
    pub async fn uid_expunge(&mut self, uids: &UidSet) -> Result<()> {
        let command = if self.supports_uidplus() {
            Command::UidExpunge(uids.clone())
        } else {
            warn!("Server lacks UIDPLUS, falling back to EXPUNGE");
            Command::Expunge
        };
        self.run(&command).await.map(drop)
    }

    /// Closes the mailbox (expunging `\Deleted` silently) and returns to the
    /// authenticated state.
    pub async fn close(mut self) -> Result<Client<S, Authenticated>> {
        self.run(&Command::Close).await?;
        Ok(self.transition(Authenticated))
    }

    /// Ends the session.
    pub async fn logout(mut self) -> Result<()> {
        self.run(&Command::Logout).await.map(drop)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tokio_test::io::{Builder, Mock};

    use super::super::tests::authenticated;
    use super::*;

    fn selected(mock: Mock, caps: &[&str]) -> Client<Mock, Selected> {
        authenticated(mock, caps).transition(Selected {
            mailbox: "INBOX".to_string(),
            status: MailboxStatus::default(),
        })
    }

    fn uids(list: &[u32]) -> UidSet {
        UidSet::from_uids(list.iter().filter_map(|n| Uid::new(*n)))
    }

    #[tokio::test]
    async fn search_returns_sorted_uids() {
        let mock = Builder::new()
            .write(b"A0001 UID SEARCH ALL\r\n")
            .read(b"* SEARCH 9 3 4\r\nA0001 OK done\r\n")
            .build();
        let mut client = selected(mock, &["IMAP4rev1"]);
        let found = client.uid_search("ALL").await.unwrap();
        let raw: Vec<u32> = found.iter().map(|u| u.get()).collect();
        assert_eq!(raw, vec![3, 4, 9]);
    }

    #[tokio::test]
    async fn fetch_skips_responses_without_uid() {
        let mock = Builder::new()
            .write(b"A0001 UID FETCH 1:2 (UID FLAGS) (CHANGEDSINCE 100)\r\n")
            .read(b"* 1 FETCH (UID 1 FLAGS (\\Seen) MODSEQ (120))\r\n")
            .read(b"* 5 FETCH (FLAGS (\\Deleted))\r\n")
            .read(b"* 2 FETCH (UID 2 FLAGS ())\r\n")
            .read(b"A0001 OK done\r\n")
            .build();
        let mut client = selected(mock, &["IMAP4rev1", "CONDSTORE"]);
        let data = client
            .uid_fetch(
                &uids(&[1, 2]),
                &[FetchAttribute::Uid, FetchAttribute::Flags],
                Some(ModSeq::new(100)),
            )
            .await
            .unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data[0].flags.as_deref(), Some(&[Flag::Seen][..]));
        assert_eq!(data[0].mod_seq, Some(ModSeq::new(120)));
    }

    #[tokio::test]
    async fn changedsince_requires_condstore() {
        let mut client = selected(Builder::new().build(), &["IMAP4rev1"]);
        let err = client
            .uid_fetch(&uids(&[1]), &[FetchAttribute::Flags], Some(ModSeq::new(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingCapability("CONDSTORE")));
    }

    #[tokio::test]
    async fn move_without_capability_emulates() {
        let mock = Builder::new()
            .write(b"A0001 UID COPY 4:5 Archive\r\n")
            .read(b"A0001 OK [COPYUID 7 4:5 100:101] done\r\n")
            .write(b"A0002 UID STORE 4:5 +FLAGS.SILENT (\\Deleted)\r\n")
            .read(b"A0002 OK done\r\n")
            .write(b"A0003 UID EXPUNGE 4:5\r\n")
            .read(b"* 3 EXPUNGE\r\n* 3 EXPUNGE\r\nA0003 OK done\r\n")
            .build();
        let mut client = selected(mock, &["IMAP4rev1", "UIDPLUS"]);
        let mapping = client
            .uid_move(&uids(&[4, 5]), "Archive")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(mapping.destination.to_string(), "100:101");
    }

    #[tokio::test]
    async fn native_move_reads_untagged_copyuid() {
        let mock = Builder::new()
            .write(b"A0001 UID MOVE 4 Trash\r\n")
            .read(b"* OK [COPYUID 9 4 12] moved\r\n* 2 EXPUNGE\r\nA0001 OK done\r\n")
            .build();
        let mut client = selected(mock, &["IMAP4rev1", "MOVE", "UIDPLUS"]);
        let mapping = client.uid_move(&uids(&[4]), "Trash").await.unwrap().unwrap();
        assert_eq!(mapping.uid_validity.get(), 9);
    }

    #[tokio::test]
    async fn expunge_without_uidplus_falls_back() {
        let mock = Builder::new()
            .write(b"A0001 EXPUNGE\r\n")
            .read(b"A0001 OK done\r\n")
            .build();
        let mut client = selected(mock, &["IMAP4rev1"]);
        client.uid_expunge(&uids(&[8])).await.unwrap();
    }

    #[tokio::test]
    async fn close_returns_to_authenticated() {
        let mock = Builder::new()
            .write(b"A0001 CLOSE\r\n")
            .read(b"A0001 OK closed\r\n")
            .build();
        let client = selected(mock, &["IMAP4rev1"]);
        let _authenticated: Client<Mock, Authenticated> = client.close().await.unwrap();
    }
}
