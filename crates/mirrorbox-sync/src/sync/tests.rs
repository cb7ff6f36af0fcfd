#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use mirrorbox_imap::{Flag, FolderType};
use tokio_test::io::Mock;
use tokio_util::sync::CancellationToken;

use super::SyncEngine;
use crate::Error;
use crate::account::Account;
use crate::config::SyncConfig;
use crate::connectivity::ManualConnectivity;
use crate::connector::scripted::{ScriptedConnector, login_script};
use crate::mirror::{FolderChanges, FolderState, MessageHeader, Mirror, RemoteFolder};

const HEADER_FETCH: &str = "UID FLAGS INTERNALDATE RFC822.SIZE ENVELOPE \
    BODY.PEEK[HEADER.FIELDS (MESSAGE-ID IN-REPLY-TO REFERENCES)]";

struct Harness {
    engine: SyncEngine<ScriptedConnector>,
    connector: Arc<ScriptedConnector>,
    account: Account,
}

async fn harness(sessions: Vec<Mock>, online: bool, config: SyncConfig) -> Harness {
    let mirror = Mirror::in_memory().await.unwrap();
    let mut account = Account::with_email("user@example.org");
    mirror.save_account(&mut account).await.unwrap();
    let connector = Arc::new(ScriptedConnector::new(sessions));
    let engine = SyncEngine::new(
        mirror,
        Arc::clone(&connector),
        Arc::new(ManualConnectivity::new(online)),
        config,
    );
    Harness {
        engine,
        connector,
        account,
    }
}

/// INBOX cached with UIDs 1..=3 in epoch 100.
async fn seed_inbox(h: &Harness, highest_mod_seq: Option<u64>) {
    let mirror = h.engine.mirror();
    let account = h.account.id.unwrap();
    mirror
        .apply_folder_list(
            account,
            &[RemoteFolder {
                path: "INBOX".into(),
                delimiter: Some('/'),
                folder_type: FolderType::Inbox,
            }],
        )
        .await
        .unwrap();
    let inbox = mirror.require_folder(account, "INBOX").await.unwrap();
    let headers = (1..=3)
        .map(|uid| MessageHeader {
            uid,
            subject: Some(format!("Message {uid}")),
            ..MessageHeader::default()
        })
        .collect();
    mirror
        .apply_folder_changes(
            inbox.id,
            &FolderChanges {
                new_messages: headers,
                state: FolderState {
                    uid_validity: Some(100),
                    uid_next: Some(4),
                    highest_mod_seq,
                },
                ..FolderChanges::default()
            },
        )
        .await
        .unwrap();
}

async fn inbox_uids(h: &Harness) -> Vec<u32> {
    let mirror = h.engine.mirror();
    let inbox = mirror
        .require_folder(h.account.id.unwrap(), "INBOX")
        .await
        .unwrap();
    mirror.local_uids(inbox.id).await.unwrap()
}

fn logout(builder: &mut tokio_test::io::Builder, tag: &str) {
    builder
        .write(format!("{tag} LOGOUT\r\n").as_bytes())
        .read(format!("* BYE bye\r\n{tag} OK done\r\n").as_bytes());
}

#[tokio::test]
async fn first_sync_lists_folders_and_fetches_headers() {
    let mut script = login_script("UIDPLUS");
    script
        .write(b"A0002 LIST \"\" \"*\"\r\n")
        .read(b"* LIST (\\HasNoChildren) \"/\" INBOX\r\n")
        .read(b"* LIST (\\Noselect \\HasChildren) \"/\" Projects\r\n")
        .read(b"A0002 OK done\r\n")
        .write(b"A0003 EXAMINE INBOX\r\n")
        .read(b"* 3 EXISTS\r\n* OK [UIDVALIDITY 100] ok\r\n* OK [UIDNEXT 4] ok\r\n")
        .read(b"A0003 OK [READ-ONLY] done\r\n")
        .write(b"A0004 UID SEARCH ALL\r\n")
        .read(b"* SEARCH 1 2 3\r\nA0004 OK done\r\n")
        .write(format!("A0005 UID FETCH 1:3 ({HEADER_FETCH})\r\n").as_bytes())
        .read(b"* 1 FETCH (UID 1 FLAGS (\\Seen) BODY[HEADER.FIELDS (MESSAGE-ID IN-REPLY-TO REFERENCES)] {31}\r\nMessage-ID: <1@example.org>\r\n\r\n)\r\n")
        .read(b"* 2 FETCH (UID 2 FLAGS ())\r\n* 3 FETCH (UID 3 FLAGS ())\r\n")
        .read(b"A0005 OK done\r\n")
        .write(b"A0006 CLOSE\r\n")
        .read(b"A0006 OK done\r\n");
    logout(&mut script, "A0007");

    let h = harness(vec![script.build()], true, SyncConfig::default()).await;
    let report = h
        .engine
        .sync_account(&h.account, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.folders_added, vec!["INBOX"]);
    assert_eq!(report.folders.len(), 1);
    assert_eq!(report.folders[0].new_messages, 3);
    assert_eq!(inbox_uids(&h).await, vec![1, 2, 3]);

    let mirror = h.engine.mirror();
    let inbox = mirror
        .require_folder(h.account.id.unwrap(), "INBOX")
        .await
        .unwrap();
    assert_eq!(inbox.uid_validity, Some(100));
    assert_eq!(inbox.uid_next, Some(4));
    assert_eq!((inbox.total_count, inbox.unread_count), (3, 2));
    assert!(inbox.last_synced.is_some());
    let first = mirror.message(inbox.id, 1).await.unwrap().unwrap();
    assert_eq!(first.header.message_id.as_deref(), Some("<1@example.org>"));
    assert!(!first.body_fetched);
}

#[tokio::test]
async fn changed_uid_validity_discards_cached_uids() {
    let mut script = login_script("UIDPLUS");
    script
        .write(b"A0002 EXAMINE INBOX\r\n")
        .read(b"* 1 EXISTS\r\n* OK [UIDVALIDITY 200] ok\r\n* OK [UIDNEXT 2] ok\r\n")
        .read(b"A0002 OK done\r\n")
        .write(b"A0003 UID SEARCH ALL\r\n")
        .read(b"* SEARCH 1\r\nA0003 OK done\r\n")
        .write(format!("A0004 UID FETCH 1 ({HEADER_FETCH})\r\n").as_bytes())
        .read(b"* 1 FETCH (UID 1 FLAGS ())\r\nA0004 OK done\r\n")
        .write(b"A0005 CLOSE\r\n")
        .read(b"A0005 OK done\r\n");
    logout(&mut script, "A0006");

    let h = harness(vec![script.build()], true, SyncConfig::default()).await;
    seed_inbox(&h, None).await;

    let report = h
        .engine
        .sync_folder(&h.account, "INBOX", &CancellationToken::new())
        .await
        .unwrap();
    assert!(report.reset_epoch);
    assert_eq!(inbox_uids(&h).await, vec![1]);

    let mirror = h.engine.mirror();
    let inbox = mirror
        .require_folder(h.account.id.unwrap(), "INBOX")
        .await
        .unwrap();
    assert_eq!(inbox.uid_validity, Some(200));
    assert_eq!(inbox.total_count, 1);
    // UID 1 is a different message in the new epoch.
    let message = mirror.message(inbox.id, 1).await.unwrap().unwrap();
    assert_eq!(message.header.subject, None);
}

#[tokio::test]
async fn plain_resync_diffs_expunges_flags_and_new_mail() {
    let mut script = login_script("UIDPLUS");
    script
        .write(b"A0002 EXAMINE INBOX\r\n")
        .read(b"* 3 EXISTS\r\n* OK [UIDVALIDITY 100] ok\r\n* OK [UIDNEXT 5] ok\r\n")
        .read(b"A0002 OK done\r\n")
        .write(b"A0003 UID SEARCH ALL\r\n")
        .read(b"* SEARCH 1 3 4\r\nA0003 OK done\r\n")
        .write(b"A0004 UID FETCH 1,3 (UID FLAGS)\r\n")
        .read(b"* 1 FETCH (UID 1 FLAGS (\\Seen))\r\n* 2 FETCH (UID 3 FLAGS (\\Flagged))\r\n")
        .read(b"A0004 OK done\r\n")
        .write(format!("A0005 UID FETCH 4 ({HEADER_FETCH})\r\n").as_bytes())
        .read(b"* 3 FETCH (UID 4 FLAGS ())\r\nA0005 OK done\r\n")
        .write(b"A0006 CLOSE\r\n")
        .read(b"A0006 OK done\r\n");
    logout(&mut script, "A0007");

    let h = harness(vec![script.build()], true, SyncConfig::default()).await;
    seed_inbox(&h, None).await;

    let report = h
        .engine
        .sync_folder(&h.account, "INBOX", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(
        (report.expunged, report.flag_updates, report.new_messages),
        (1, 2, 1)
    );
    assert_eq!(inbox_uids(&h).await, vec![1, 3, 4]);

    let mirror = h.engine.mirror();
    let inbox = mirror
        .require_folder(h.account.id.unwrap(), "INBOX")
        .await
        .unwrap();
    assert_eq!(inbox.unread_count, 2);
    let three = mirror.message(inbox.id, 3).await.unwrap().unwrap();
    assert!(three.header.flags.flagged);
    assert_eq!(three.header.subject.as_deref(), Some("Message 3"));
}

#[tokio::test]
async fn unchanged_status_skips_examine() {
    let mut script = login_script("CONDSTORE");
    script
        .write(b"A0002 STATUS INBOX (MESSAGES UIDNEXT UIDVALIDITY HIGHESTMODSEQ)\r\n")
        .read(b"* STATUS INBOX (MESSAGES 3 UIDNEXT 4 UIDVALIDITY 100 HIGHESTMODSEQ 50)\r\n")
        .read(b"A0002 OK done\r\n");
    logout(&mut script, "A0003");

    let h = harness(vec![script.build()], true, SyncConfig::default()).await;
    seed_inbox(&h, Some(50)).await;

    let report = h
        .engine
        .sync_folder(&h.account, "INBOX", &CancellationToken::new())
        .await
        .unwrap();
    assert!(report.unchanged);
    assert_eq!(inbox_uids(&h).await, vec![1, 2, 3]);
}

#[tokio::test]
async fn condstore_fetches_only_changed_flags() {
    let mut script = login_script("CONDSTORE");
    script
        .write(b"A0002 STATUS INBOX (MESSAGES UIDNEXT UIDVALIDITY HIGHESTMODSEQ)\r\n")
        .read(b"* STATUS INBOX (MESSAGES 3 UIDNEXT 4 UIDVALIDITY 100 HIGHESTMODSEQ 60)\r\n")
        .read(b"A0002 OK done\r\n")
        .write(b"A0003 EXAMINE INBOX (CONDSTORE)\r\n")
        .read(b"* 3 EXISTS\r\n* OK [UIDVALIDITY 100] ok\r\n* OK [UIDNEXT 4] ok\r\n")
        .read(b"* OK [HIGHESTMODSEQ 60] ok\r\nA0003 OK [READ-ONLY] done\r\n")
        .write(b"A0004 UID SEARCH ALL\r\n")
        .read(b"* SEARCH 1 2 3\r\nA0004 OK done\r\n")
        .write(b"A0005 UID FETCH 1:* (UID FLAGS MODSEQ) (CHANGEDSINCE 50)\r\n")
        .read(b"* 2 FETCH (UID 2 FLAGS (\\Seen) MODSEQ (60))\r\nA0005 OK done\r\n")
        .write(b"A0006 CLOSE\r\n")
        .read(b"A0006 OK done\r\n");
    logout(&mut script, "A0007");

    let h = harness(vec![script.build()], true, SyncConfig::default()).await;
    seed_inbox(&h, Some(50)).await;

    let report = h
        .engine
        .sync_folder(&h.account, "INBOX", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.flag_updates, 1);

    let mirror = h.engine.mirror();
    let inbox = mirror
        .require_folder(h.account.id.unwrap(), "INBOX")
        .await
        .unwrap();
    assert_eq!(inbox.highest_mod_seq, Some(60));
    assert_eq!(inbox.unread_count, 2);
    let two = mirror.message(inbox.id, 2).await.unwrap().unwrap();
    assert!(two.header.flags.seen);
    assert_eq!(two.header.mod_seq, Some(60));
}

#[tokio::test]
async fn offline_sync_never_dials() {
    let h = harness(Vec::new(), false, SyncConfig::default()).await;
    let err = h
        .engine
        .sync_account(&h.account, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Offline));
    assert_eq!(h.connector.dials(), 0);
}

#[tokio::test]
async fn cancelled_sync_writes_nothing() {
    let h = harness(vec![login_script("IDLE").build()], true, SyncConfig::default()).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = h.engine.sync_account(&h.account, &cancel).await.unwrap_err();
    assert!(err.is_cancelled());
    let folders = h
        .engine
        .mirror()
        .list_folders(h.account.id.unwrap())
        .await
        .unwrap();
    assert!(folders.is_empty());
}

#[tokio::test]
async fn protocol_error_skips_folder_on_fresh_connection() {
    let mut first = login_script("UIDPLUS");
    first
        .write(b"A0002 LIST \"\" \"*\"\r\n")
        .read(b"* LIST () \"/\" INBOX\r\n* LIST () \"/\" Work\r\nA0002 OK done\r\n")
        .write(b"A0003 EXAMINE INBOX\r\n")
        .read(b"* 0 EXISTS\r\n* OK [UIDVALIDITY 5] ok\r\n* OK [UIDNEXT 1] ok\r\nA0003 OK done\r\n")
        .write(b"A0004 CLOSE\r\n")
        .read(b"A0004 OK done\r\n")
        .write(b"A0005 EXAMINE Work\r\n")
        .read(b"A0005 NO Mailbox is locked\r\n");
    let mut second = login_script("UIDPLUS");
    logout(&mut second, "A0002");

    let h = harness(
        vec![first.build(), second.build()],
        true,
        SyncConfig::default(),
    )
    .await;
    let report = h
        .engine
        .sync_account(&h.account, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.folders.len(), 1);
    assert_eq!(report.failed, vec!["Work"]);
    assert_eq!(h.connector.dials(), 2);
}

#[tokio::test]
async fn backfill_leaves_no_message_without_body() {
    let mut script = login_script("UIDPLUS");
    script
        .write(b"A0002 EXAMINE INBOX\r\n")
        .read(b"* 3 EXISTS\r\n* OK [UIDVALIDITY 100] ok\r\nA0002 OK done\r\n")
        .write(b"A0003 UID FETCH 2:3 (UID BODY.PEEK[])\r\n")
        .read(b"* 2 FETCH (UID 2 BODY[] {5}\r\nhello)\r\n")
        .read(b"* 3 FETCH (UID 3 BODY[] {5}\r\nworld)\r\n")
        .read(b"A0003 OK done\r\n")
        .write(b"A0004 UID FETCH 1 (UID BODY.PEEK[])\r\n")
        .read(b"A0004 OK done\r\n")
        .write(b"A0005 CLOSE\r\n")
        .read(b"A0005 OK done\r\n");
    logout(&mut script, "A0006");

    let config = SyncConfig {
        body_batch_size: 2,
        ..SyncConfig::default()
    };
    let h = harness(vec![script.build()], true, config).await;
    seed_inbox(&h, None).await;

    let progress = h
        .engine
        .backfill_bodies(&h.account, "INBOX", &CancellationToken::new())
        .await
        .unwrap();
    assert!(progress.is_complete());
    assert_eq!(progress.bodies_total, 2);

    let mirror = h.engine.mirror();
    let inbox = mirror
        .require_folder(h.account.id.unwrap(), "INBOX")
        .await
        .unwrap();
    assert!(mirror.uids_missing_body(inbox.id, 10).await.unwrap().is_empty());
    assert_eq!(
        mirror.message_body(inbox.id, 3).await.unwrap().unwrap(),
        b"world"
    );
}

#[tokio::test]
async fn move_mirrors_copyuid_mapping() {
    let mut script = login_script("UIDPLUS MOVE");
    script
        .write(b"A0002 SELECT INBOX\r\n")
        .read(b"* 3 EXISTS\r\n* OK [UIDVALIDITY 100] ok\r\nA0002 OK [READ-WRITE] done\r\n")
        .write(b"A0003 UID MOVE 2 Archive\r\n")
        .read(b"* OK [COPYUID 7 2 500] moved\r\n* 2 EXPUNGE\r\nA0003 OK done\r\n");
    logout(&mut script, "A0004");

    let h = harness(vec![script.build()], true, SyncConfig::default()).await;
    seed_inbox(&h, None).await;
    let mirror = h.engine.mirror();
    let account = h.account.id.unwrap();
    mirror
        .apply_folder_list(
            account,
            &[
                RemoteFolder {
                    path: "INBOX".into(),
                    delimiter: Some('/'),
                    folder_type: FolderType::Inbox,
                },
                RemoteFolder {
                    path: "Archive".into(),
                    delimiter: Some('/'),
                    folder_type: FolderType::Archive,
                },
            ],
        )
        .await
        .unwrap();
    let archive = mirror.require_folder(account, "Archive").await.unwrap();
    mirror
        .apply_folder_changes(
            archive.id,
            &FolderChanges {
                state: FolderState {
                    uid_validity: Some(7),
                    uid_next: Some(500),
                    highest_mod_seq: None,
                },
                ..FolderChanges::default()
            },
        )
        .await
        .unwrap();

    let pairs = h
        .engine
        .move_messages(&h.account, "INBOX", "Archive", &[2])
        .await
        .unwrap();
    assert_eq!(pairs, vec![(2, 500)]);
    assert_eq!(inbox_uids(&h).await, vec![1, 3]);
    let moved = mirror.message(archive.id, 500).await.unwrap().unwrap();
    assert_eq!(moved.header.subject.as_deref(), Some("Message 2"));
}

#[tokio::test]
async fn mark_read_updates_mirror_after_store() {
    let mut script = login_script("UIDPLUS");
    script
        .write(b"A0002 SELECT INBOX\r\n")
        .read(b"* 3 EXISTS\r\n* OK [UIDVALIDITY 100] ok\r\nA0002 OK [READ-WRITE] done\r\n")
        .write(b"A0003 UID STORE 1:2 +FLAGS.SILENT (\\Seen)\r\n")
        .read(b"A0003 OK done\r\n");
    logout(&mut script, "A0004");

    let h = harness(vec![script.build()], true, SyncConfig::default()).await;
    seed_inbox(&h, None).await;

    h.engine
        .set_seen(&h.account, "INBOX", &[1, 2], true)
        .await
        .unwrap();
    let inbox = h
        .engine
        .mirror()
        .require_folder(h.account.id.unwrap(), "INBOX")
        .await
        .unwrap();
    assert_eq!(inbox.unread_count, 1);
}

#[tokio::test]
async fn stale_epoch_refuses_action() {
    let mut script = login_script("UIDPLUS");
    script
        .write(b"A0002 SELECT INBOX\r\n")
        .read(b"* 3 EXISTS\r\n* OK [UIDVALIDITY 999] ok\r\nA0002 OK [READ-WRITE] done\r\n");
    logout(&mut script, "A0003");

    let h = harness(vec![script.build()], true, SyncConfig::default()).await;
    seed_inbox(&h, None).await;

    let err = h
        .engine
        .delete_messages(&h.account, "INBOX", &[1])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::StaleEpoch(path) if path == "INBOX"));
    assert_eq!(inbox_uids(&h).await, vec![1, 2, 3]);
}

#[tokio::test]
async fn folder_type_override_is_kept() {
    let mut script = login_script("UIDPLUS");
    script
        .write(b"A0002 LIST \"\" \"*\"\r\n")
        .read(b"* LIST (\\HasNoChildren) \"/\" Receipts\r\nA0002 OK done\r\n")
        .write(b"A0003 EXAMINE Receipts\r\n")
        .read(b"* 0 EXISTS\r\n* OK [UIDVALIDITY 9] ok\r\nA0003 OK done\r\n")
        .write(b"A0004 CLOSE\r\n")
        .read(b"A0004 OK done\r\n");
    logout(&mut script, "A0005");

    let h = harness(vec![script.build()], true, SyncConfig::default()).await;
    let account = h.account.id.unwrap();
    h.engine
        .mirror()
        .apply_folder_list(
            account,
            &[RemoteFolder {
                path: "Receipts".into(),
                delimiter: Some('/'),
                folder_type: FolderType::Folder,
            }],
        )
        .await
        .unwrap();
    h.engine
        .set_folder_type(account, "Receipts", FolderType::Archive)
        .await
        .unwrap();

    h.engine
        .sync_account(&h.account, &CancellationToken::new())
        .await
        .unwrap();
    let folder = h
        .engine
        .mirror()
        .require_folder(account, "Receipts")
        .await
        .unwrap();
    assert_eq!(folder.folder_type, FolderType::Archive);
    assert_eq!(folder.uid_next, None);
}

const DRAFT: &[u8] = b"Subject: Draft\r\nMessage-ID: <new@example.org>\r\n\r\nhi";

fn append_script(appenduid: &str) -> Mock {
    let mut script = login_script("UIDPLUS");
    script
        .write(b"A0002 APPEND INBOX (\\Seen) {51}\r\n")
        .read(b"+ Ready\r\n")
        .write(&[DRAFT, b"\r\n"].concat())
        .read(format!("A0002 OK [APPENDUID {appenduid}] done\r\n").as_bytes());
    logout(&mut script, "A0003");
    script.build()
}

#[tokio::test]
async fn appended_message_is_mirrored_in_the_current_epoch() {
    let h = harness(
        vec![append_script("100 4"), append_script("999 1")],
        true,
        SyncConfig::default(),
    )
    .await;
    seed_inbox(&h, None).await;

    let uid = h
        .engine
        .append_message(&h.account, "INBOX", &[Flag::Seen], DRAFT)
        .await
        .unwrap();
    assert_eq!(uid, Some(4));
    assert_eq!(inbox_uids(&h).await, vec![1, 2, 3, 4]);
    let mirror = h.engine.mirror();
    let inbox = mirror
        .require_folder(h.account.id.unwrap(), "INBOX")
        .await
        .unwrap();
    let stored = mirror.message(inbox.id, 4).await.unwrap().unwrap();
    assert_eq!(stored.header.subject.as_deref(), Some("Draft"));
    assert_eq!(stored.header.message_id.as_deref(), Some("<new@example.org>"));
    assert!(stored.header.flags.seen);
    assert!(stored.body_fetched);

    // A UID from another epoch is left for the next sync.
    let uid = h
        .engine
        .append_message(&h.account, "INBOX", &[Flag::Seen], DRAFT)
        .await
        .unwrap();
    assert_eq!(uid, Some(1));
    assert_eq!(inbox_uids(&h).await, vec![1, 2, 3, 4]);
    assert_eq!(h.connector.dials(), 2);
}

#[tokio::test]
async fn created_folder_joins_the_mirror() {
    let mut script = login_script("UIDPLUS");
    script
        .write(b"A0002 CREATE Receipts\r\n")
        .read(b"A0002 OK done\r\n")
        .write(b"A0003 LIST \"\" \"*\"\r\n")
        .read(b"* LIST (\\HasNoChildren) \"/\" INBOX\r\n")
        .read(b"* LIST (\\HasNoChildren) \"/\" Receipts\r\n")
        .read(b"A0003 OK done\r\n");
    logout(&mut script, "A0004");

    let h = harness(vec![script.build()], true, SyncConfig::default()).await;
    h.engine.create_folder(&h.account, "Receipts").await.unwrap();

    let folders = h
        .engine
        .mirror()
        .list_folders(h.account.id.unwrap())
        .await
        .unwrap();
    let paths: Vec<_> = folders.iter().map(|f| f.path.as_str()).collect();
    assert!(paths.contains(&"INBOX"));
    assert!(paths.contains(&"Receipts"));
    assert_eq!(folders.len(), 2);
}
