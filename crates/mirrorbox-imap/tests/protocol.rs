//! End-to-end protocol sessions against scripted server streams.

#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_test::io::Builder;

use mirrorbox_imap::{
    Client, Credentials, FetchAttribute, FolderType, IdleEvent, SeqNum, StoreMode,
    THREADING_HEADERS, Uid, UidSet, UnsolicitedHandler, infer_folder_types,
};

const TIMEOUT: Option<Duration> = Some(Duration::from_secs(5));

#[derive(Default)]
struct Counter {
    exists: Mutex<Vec<u32>>,
    expunged: Mutex<Vec<u32>>,
}

impl UnsolicitedHandler for Counter {
    fn on_exists(&self, count: u32) {
        self.exists.lock().unwrap().push(count);
    }

    fn on_expunge(&self, seq: SeqNum) {
        self.expunged.lock().unwrap().push(seq.get());
    }
}

#[tokio::test]
async fn full_sync_session() {
    let mock = Builder::new()
        .read(b"* OK [CAPABILITY IMAP4rev1 SPECIAL-USE CONDSTORE UIDPLUS] Dovecot ready.\r\n")
        .write(b"A0001 LOGIN alice secret\r\n")
        .read(b"A0001 OK [CAPABILITY IMAP4rev1 SPECIAL-USE CONDSTORE UIDPLUS IDLE MOVE] Logged in\r\n")
        .write(b"A0002 LIST \"\" \"*\" RETURN (SPECIAL-USE)\r\n")
        .read(b"* LIST (\\HasNoChildren) \".\" INBOX\r\n")
        .read(b"* LIST (\\HasNoChildren \\Sent) \".\" Sent\r\n")
        .read(b"* LIST (\\HasNoChildren \\Trash) \".\" Trash\r\n")
        .read(b"* LIST (\\HasNoChildren) \".\" Drafts\r\n")
        .read(b"A0002 OK List completed\r\n")
        .write(b"A0003 SELECT INBOX (CONDSTORE)\r\n")
        .read(b"* 2 EXISTS\r\n* 0 RECENT\r\n")
        .read(b"* OK [UIDVALIDITY 1700000000] UIDs valid\r\n")
        .read(b"* OK [UIDNEXT 12] Predicted next UID\r\n")
        .read(b"* OK [HIGHESTMODSEQ 88] Highest\r\n")
        .read(b"A0003 OK [READ-WRITE] Select completed\r\n")
        .write(b"A0004 UID FETCH 10:11 (UID FLAGS RFC822.SIZE BODY.PEEK[HEADER.FIELDS (MESSAGE-ID IN-REPLY-TO REFERENCES)])\r\n")
        .read(b"* 1 FETCH (UID 10 FLAGS (\\Seen) RFC822.SIZE 1200 BODY[HEADER.FIELDS (MESSAGE-ID IN-REPLY-TO REFERENCES)] {23}\r\nMessage-ID: <a@b.c>\r\n\r\n)\r\n")
        .read(b"* 2 FETCH (UID 11 FLAGS () RFC822.SIZE 800 BODY[HEADER.FIELDS (MESSAGE-ID IN-REPLY-TO REFERENCES)] {2}\r\n\r\n)\r\n")
        .read(b"A0004 OK Fetch completed\r\n")
        .write(b"A0005 UID STORE 11 +FLAGS.SILENT (\\Flagged)\r\n")
        .read(b"A0005 OK Store completed\r\n")
        .write(b"A0006 LOGOUT\r\n")
        .read(b"* BYE Logging out\r\nA0006 OK Logout completed\r\n")
        .build();

    let client = Client::from_stream(mock, TIMEOUT).await.unwrap();
    let mut client = client
        .login(&Credentials::password("alice", "secret"))
        .await
        .unwrap();
    assert!(client.supports_idle());

    let entries = client.list("", "*").await.unwrap();
    let types = infer_folder_types(&entries);
    assert_eq!(
        types,
        vec![
            FolderType::Inbox,
            FolderType::Sent,
            FolderType::Trash,
            FolderType::Drafts
        ]
    );

    let mut inbox = client.select("INBOX").await.unwrap();
    let status = inbox.mailbox_status().clone();
    assert_eq!(status.uid_validity.unwrap().get(), 1_700_000_000);
    assert_eq!(status.uid_next.unwrap().get(), 12);

    let uids = UidSet::from_uids([Uid::new(10).unwrap(), Uid::new(11).unwrap()]);
    let headers = inbox
        .uid_fetch(
            &uids,
            &[
                FetchAttribute::Uid,
                FetchAttribute::Flags,
                FetchAttribute::Size,
                FetchAttribute::HeaderFields(THREADING_HEADERS),
            ],
            None,
        )
        .await
        .unwrap();
    assert_eq!(headers.len(), 2);
    assert_eq!(headers[0].size, Some(1200));
    assert_eq!(
        headers[0].header_fields.as_deref(),
        Some(&b"Message-ID: <a@b.c>\r\n\r\n"[..])
    );

    inbox
        .uid_store(
            &UidSet::single(Uid::new(11).unwrap()),
            StoreMode::Add,
            &[mirrorbox_imap::Flag::Flagged],
        )
        .await
        .unwrap();
    inbox.logout().await.unwrap();
}

#[tokio::test]
async fn idle_session_feeds_handler() {
    let mock = Builder::new()
        .read(b"* OK [CAPABILITY IMAP4rev1 IDLE] ready\r\n")
        .write(b"A0001 LOGIN bob pw\r\n")
        .read(b"A0001 OK [CAPABILITY IMAP4rev1 IDLE] ok\r\n")
        .write(b"A0002 SELECT INBOX\r\n")
        .read(b"* 40 EXISTS\r\n* OK [UIDVALIDITY 5] ok\r\nA0002 OK [READ-WRITE] ok\r\n")
        .write(b"A0003 IDLE\r\n")
        .read(b"+ idling\r\n")
        .read(b"* 5 EXPUNGE\r\n")
        .write(b"DONE\r\n")
        .read(b"* 39 EXISTS\r\nA0003 OK IDLE terminated\r\n")
        .build();

    let counter = Arc::new(Counter::default());
    let client = Client::from_stream_with_handler(mock, TIMEOUT, counter.clone())
        .await
        .unwrap();
    let client = client
        .login(&Credentials::password("bob", "pw"))
        .await
        .unwrap();
    let mut inbox = client.select("INBOX").await.unwrap();

    let mut idle = inbox.idle().await.unwrap();
    let event = idle.wait(Duration::from_secs(60)).await.unwrap();
    assert_eq!(event, IdleEvent::Expunge(SeqNum::new(5).unwrap()));
    idle.done().await.unwrap();

    assert_eq!(*counter.expunged.lock().unwrap(), vec![5]);
    // 40 from SELECT, 39 raced with DONE.
    assert_eq!(*counter.exists.lock().unwrap(), vec![40, 39]);
}
