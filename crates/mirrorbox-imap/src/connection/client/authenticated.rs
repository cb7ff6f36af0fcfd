//! Mailbox-level commands for the authenticated state.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::Client;
use super::states::{Authenticated, Selected};
use crate::command::Command;
use crate::parser::UntaggedResponse;
use crate::types::{
    Capability, Flag, ListEntry, MailboxStatus, MailboxStatusItems, ResponseCode,
    StatusAttribute, Uid, UidValidity,
};
use crate::{Error, Result};

impl<S> Client<S, Authenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Lists mailboxes matching `pattern`. SPECIAL-USE attributes are
    /// requested explicitly when the server supports them.
    pub async fn list(&mut self, reference: &str, pattern: &str) -> Result<Vec<ListEntry>> {
        let completion = self
            .run(&Command::List {
                reference: reference.to_string(),
                pattern: pattern.to_string(),
                special_use: self.has_capability(&Capability::SpecialUse),
            })
            .await?;
        Ok(completion
            .untagged
            .into_iter()
            .filter_map(|u| match u {
                UntaggedResponse::List(entry) => Some(entry),
                _ => None,
            })
            .collect())
    }

    /// Queries a mailbox without selecting it.
    pub async fn status(
        &mut self,
        mailbox: &str,
        attributes: &[StatusAttribute],
    ) -> Result<MailboxStatusItems> {
        let attributes: Vec<StatusAttribute> = attributes
            .iter()
            .copied()
            .filter(|a| *a != StatusAttribute::HighestModSeq || self.supports_condstore())
            .collect();
        let completion = self
            .run(&Command::Status {
                mailbox: mailbox.to_string(),
                attributes,
            })
            .await?;
        completion
            .untagged
            .into_iter()
            .find_map(|u| match u {
                UntaggedResponse::Status(items) => Some(items),
                _ => None,
            })
            .ok_or_else(|| Error::Protocol(format!("no STATUS data for {mailbox}")))
    }

    /// [`Client::status`] raced against `cancel`.
    ///
    /// On [`Error::Cancelled`] the command is abandoned mid-flight and the
    /// connection refuses further commands; drop it.
    pub async fn status_cancellable(
        &mut self,
        mailbox: &str,
        attributes: &[StatusAttribute],
        cancel: &CancellationToken,
    ) -> Result<MailboxStatusItems> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(Error::Cancelled),
            result = self.status(mailbox, attributes) => result,
        }
    }

    /// Opens `mailbox` read-write. CONDSTORE is requested when available.
    pub async fn select(self, mailbox: &str) -> Result<Client<S, Selected>> {
        self.open(mailbox, false).await
    }

    /// Opens `mailbox` read-only.
    pub async fn examine(self, mailbox: &str) -> Result<Client<S, Selected>> {
        self.open(mailbox, true).await
    }

    /// [`Client::select`] raced against `cancel`. The connection is dropped
    /// together with the abandoned command.
    pub async fn select_cancellable(
        self,
        mailbox: &str,
        cancel: &CancellationToken,
    ) -> Result<Client<S, Selected>> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(Error::Cancelled),
            result = self.open(mailbox, false) => result,
        }
    }

    /// [`Client::examine`] raced against `cancel`.
    pub async fn examine_cancellable(
        self,
        mailbox: &str,
        cancel: &CancellationToken,
    ) -> Result<Client<S, Selected>> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(Error::Cancelled),
            result = self.open(mailbox, true) => result,
        }
    }

    async fn open(mut self, mailbox: &str, read_only: bool) -> Result<Client<S, Selected>> {
        let condstore = self.supports_condstore();
        let completion = self
            .run(&Command::Select {
                mailbox: mailbox.to_string(),
                read_only,
                condstore,
            })
            .await?;

        let mut status = MailboxStatus {
            read_only,
            ..MailboxStatus::default()
        };
        for untagged in &completion.untagged {
            match untagged {
                UntaggedResponse::Exists(n) => status.exists = *n,
                UntaggedResponse::Recent(n) => status.recent = *n,
                UntaggedResponse::Flags(flags) => status.flags.clone_from(flags),
                _ => {}
            }
        }
        for code in completion.codes() {
            match code {
                ResponseCode::UidValidity(v) => status.uid_validity = Some(*v),
                ResponseCode::UidNext(n) => status.uid_next = Some(*n),
                ResponseCode::Unseen(n) => status.unseen = Some(*n),
                ResponseCode::HighestModSeq(m) => status.highest_mod_seq = Some(*m),
                ResponseCode::NoModSeq => status.no_mod_seq = true,
                ResponseCode::PermanentFlags(flags) => status.permanent_flags.clone_from(flags),
                ResponseCode::ReadOnly => status.read_only = true,
                _ => {}
            }
        }
        debug!(
            "Selected {mailbox}: exists={} uidvalidity={:?} uidnext={:?}",
            status.exists, status.uid_validity, status.uid_next
        );
        Ok(self.transition(Selected {
            mailbox: mailbox.to_string(),
            status,
        }))
    }

    /// Creates a mailbox.
    pub async fn create(&mut self, mailbox: &str) -> Result<()> {
        self.run(&Command::Create {
            mailbox: mailbox.to_string(),
        })
        .await
        .map(drop)
    }

    /// Appends a message. Returns the assigned UID when UIDPLUS reports it.
    pub async fn append(
        &mut self,
        mailbox: &str,
        flags: &[Flag],
        message: &[u8],
    ) -> Result<Option<(UidValidity, Uid)>> {
        let tag = self
            .send(&Command::Append {
                mailbox: mailbox.to_string(),
                flags: flags.to_vec(),
                size: message.len(),
            })
            .await?;
        self.await_continuation(&tag).await?;
        let mut literal = Vec::with_capacity(message.len() + 2);
        literal.extend_from_slice(message);
        literal.extend_from_slice(b"\r\n");
        self.stream.write_all(&literal).await?;
        let completion = self.collect(&tag, false).await?;
        Ok(completion.codes().find_map(|code| match code {
            ResponseCode::AppendUid { uid_validity, uids } => {
                uids.expand().first().map(|uid| (*uid_validity, *uid))
            }
            _ => None,
        }))
    }

    /// Enables extensions (RFC 5161). Returns what the server enabled.
    pub async fn enable(&mut self, extensions: &[&'static str]) -> Result<Vec<String>> {
        if !self.has_capability(&Capability::Enable) {
            return Err(Error::MissingCapability("ENABLE"));
        }
        let completion = self.run(&Command::Enable(extensions.to_vec())).await?;
        Ok(completion
            .untagged
            .into_iter()
            .filter_map(|u| match u {
                UntaggedResponse::Enabled(exts) => Some(exts),
                _ => None,
            })
            .flatten()
            .collect())
    }

    /// Ends the session.
    pub async fn logout(mut self) -> Result<()> {
        self.run(&Command::Logout).await.map(drop)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use tokio_test::io::Builder;

    use super::super::tests::authenticated;
    use super::*;
    use crate::types::{MailboxAttribute, ModSeq};

    #[tokio::test]
    async fn list_requests_special_use() {
        let mock = Builder::new()
            .write(b"A0001 LIST \"\" \"*\" RETURN (SPECIAL-USE)\r\n")
            .read(b"* LIST (\\HasNoChildren) \"/\" INBOX\r\n")
            .read(b"* LIST (\\HasNoChildren \\Sent) \"/\" \"Sent Items\"\r\n")
            .read(b"A0001 OK LIST done\r\n")
            .build();
        let mut client = authenticated(mock, &["IMAP4rev1", "SPECIAL-USE"]);
        let entries = client.list("", "*").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].path, "Sent Items");
        assert!(entries[1].attributes.contains(&MailboxAttribute::Sent));
    }

    #[tokio::test]
    async fn select_collects_status() {
        let mock = Builder::new()
            .write(b"A0001 SELECT INBOX (CONDSTORE)\r\n")
            .read(b"* 172 EXISTS\r\n* 1 RECENT\r\n")
            .read(b"* OK [UIDVALIDITY 3857529045] UIDs valid\r\n")
            .read(b"* OK [UIDNEXT 4392] Predicted next UID\r\n")
            .read(b"* OK [HIGHESTMODSEQ 715194045007] Highest\r\n")
            .read(b"* FLAGS (\\Answered \\Flagged \\Deleted \\Seen \\Draft)\r\n")
            .read(b"A0001 OK [READ-WRITE] SELECT completed\r\n")
            .build();
        let client = authenticated(mock, &["IMAP4rev1", "CONDSTORE"]);
        let client = client.select("INBOX").await.unwrap();
        let status = client.mailbox_status();
        assert_eq!(status.exists, 172);
        assert_eq!(status.uid_validity.unwrap().get(), 3_857_529_045);
        assert_eq!(status.uid_next.unwrap().get(), 4392);
        assert_eq!(status.highest_mod_seq, Some(ModSeq::new(715_194_045_007)));
        assert_eq!(status.flags.len(), 5);
        assert!(!status.read_only);
    }

    #[tokio::test]
    async fn status_drops_highestmodseq_without_condstore() {
        let mock = Builder::new()
            .write(b"A0001 STATUS INBOX (MESSAGES UIDNEXT)\r\n")
            .read(b"* STATUS INBOX (MESSAGES 3 UIDNEXT 9)\r\n")
            .read(b"A0001 OK done\r\n")
            .build();
        let mut client = authenticated(mock, &["IMAP4rev1"]);
        let items = client
            .status(
                "INBOX",
                &[
                    StatusAttribute::Messages,
                    StatusAttribute::UidNext,
                    StatusAttribute::HighestModSeq,
                ],
            )
            .await
            .unwrap();
        assert_eq!(items.messages, Some(3));
        assert_eq!(items.uid_next.map(Uid::get), Some(9));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_select_returns_promptly() {
        let mock = Builder::new()
            .write(b"A0001 SELECT INBOX\r\n")
            .wait(Duration::from_secs(3600))
            .build();
        let client = authenticated(mock, &["IMAP4rev1"]);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });
        let err = client.select_cancellable("INBOX", &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test]
    async fn pre_cancelled_status_sends_nothing() {
        let mock = Builder::new().build();
        let mut client = authenticated(mock, &["IMAP4rev1"]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = client
            .status_cancellable("INBOX", &[StatusAttribute::Messages], &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test]
    async fn append_sends_literal_and_reads_appenduid() {
        let mock = Builder::new()
            .write(b"A0001 APPEND Drafts (\\Draft) {5}\r\n")
            .read(b"+ Ready\r\n")
            .write(b"hello\r\n")
            .read(b"A0001 OK [APPENDUID 38505 3955] APPEND completed\r\n")
            .build();
        let mut client = authenticated(mock, &["IMAP4rev1", "UIDPLUS"]);
        let (validity, uid) = client
            .append("Drafts", &[Flag::Draft], b"hello")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(validity.get(), 38505);
        assert_eq!(uid.get(), 3955);
    }

    #[tokio::test]
    async fn enable_requires_capability() {
        let mock = Builder::new().build();
        let mut client = authenticated(mock, &["IMAP4rev1"]);
        let err = client.enable(&["CONDSTORE"]).await.unwrap_err();
        assert!(matches!(err, Error::MissingCapability("ENABLE")));
    }
}
