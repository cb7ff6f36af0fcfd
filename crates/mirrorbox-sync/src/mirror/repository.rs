//! SQLite storage for accounts, folders and messages.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mirrorbox_imap::{Flag, FolderType};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnection, SqlitePool, SqlitePoolOptions, SqliteRow};
use tracing::{debug, info, warn};

use super::model::{
    FetchProgress, Folder, FolderChanges, FolderId, FolderListDiff, Message, MessageFlags,
    MessageHeader, RemoteFolder,
};
use crate::Result;
use crate::account::{Account, AccountId, AuthKind, ImapSettings, Security};

/// Local mirror of every account's mailboxes.
#[derive(Debug, Clone)]
pub struct Mirror {
    pool: SqlitePool,
}

impl Mirror {
    /// Opens (creating if needed) the database at `database_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn new(database_path: &str) -> Result<Self> {
        let url = format!("sqlite:{database_path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let mirror = Self { pool };
        mirror.initialize().await?;
        Ok(mirror)
    }

    /// Create an in-memory mirror for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let mirror = Self { pool };
        mirror.initialize().await?;
        Ok(mirror)
    }

    /// Initialize database schema.
    async fn initialize(&self) -> Result<()> {
        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                imap_host TEXT NOT NULL,
                imap_port INTEGER NOT NULL,
                imap_security TEXT NOT NULL,
                imap_username TEXT NOT NULL,
                auth_kind TEXT NOT NULL,
                smtp_json TEXT,
                sync_interval_secs INTEGER NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS folders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
                path TEXT NOT NULL,
                delimiter TEXT,
                folder_type TEXT NOT NULL DEFAULT 'folder',
                type_overridden INTEGER NOT NULL DEFAULT 0,
                uid_validity INTEGER,
                uid_next INTEGER,
                highest_mod_seq INTEGER,
                total_count INTEGER NOT NULL DEFAULT 0,
                unread_count INTEGER NOT NULL DEFAULT 0,
                last_synced TEXT,
                UNIQUE(account_id, path)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                folder_id INTEGER NOT NULL REFERENCES folders(id) ON DELETE CASCADE,
                uid INTEGER NOT NULL,
                message_id TEXT,
                in_reply_to TEXT,
                references_list TEXT NOT NULL DEFAULT '[]',
                subject TEXT,
                from_addr TEXT,
                date TEXT,
                internal_date TEXT,
                size INTEGER,
                seen INTEGER NOT NULL DEFAULT 0,
                flagged INTEGER NOT NULL DEFAULT 0,
                answered INTEGER NOT NULL DEFAULT 0,
                forwarded INTEGER NOT NULL DEFAULT 0,
                draft INTEGER NOT NULL DEFAULT 0,
                deleted INTEGER NOT NULL DEFAULT 0,
                mod_seq INTEGER,
                body_fetched INTEGER NOT NULL DEFAULT 0,
                body BLOB,
                UNIQUE(folder_id, uid)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_message_id ON messages(message_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // -- Accounts -----------------------------------------------------------

    /// Save an account (insert or update). A new account gets its ID set.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn save_account(&self, account: &mut Account) -> Result<()> {
        let smtp = account
            .smtp
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let interval = i64::try_from(account.sync_interval.as_secs()).unwrap_or(i64::MAX);

        if let Some(id) = account.id {
            sqlx::query(
                r"
                UPDATE accounts SET
                    name = ?, email = ?,
                    imap_host = ?, imap_port = ?, imap_security = ?, imap_username = ?,
                    auth_kind = ?, smtp_json = ?, sync_interval_secs = ?,
                    updated_at = CURRENT_TIMESTAMP
                WHERE id = ?
                ",
            )
            .bind(&account.name)
            .bind(&account.email)
            .bind(&account.imap.host)
            .bind(i64::from(account.imap.port))
            .bind(account.imap.security.as_str())
            .bind(&account.imap.username)
            .bind(account.imap.auth.as_str())
            .bind(smtp)
            .bind(interval)
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        } else {
            let result = sqlx::query(
                r"
                INSERT INTO accounts (
                    name, email,
                    imap_host, imap_port, imap_security, imap_username,
                    auth_kind, smtp_json, sync_interval_secs
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ",
            )
            .bind(&account.name)
            .bind(&account.email)
            .bind(&account.imap.host)
            .bind(i64::from(account.imap.port))
            .bind(account.imap.security.as_str())
            .bind(&account.imap.username)
            .bind(account.imap.auth.as_str())
            .bind(smtp)
            .bind(interval)
            .execute(&self.pool)
            .await?;

            let id = AccountId::new(result.last_insert_rowid());
            account.id = Some(id);
            info!(account = %id, email = %account.email, "Added account");
        }
        Ok(())
    }

    /// Get all accounts.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_accounts(&self) -> Result<Vec<Account>> {
        let rows = sqlx::query(
            r"
            SELECT id, name, email, imap_host, imap_port, imap_security, imap_username,
                   auth_kind, smtp_json, sync_interval_secs
            FROM accounts
            ORDER BY id ASC
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_account).collect())
    }

    /// Get account by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn account(&self, id: AccountId) -> Result<Option<Account>> {
        let row = sqlx::query(
            r"
            SELECT id, name, email, imap_host, imap_port, imap_security, imap_username,
                   auth_kind, smtp_json, sync_interval_secs
            FROM accounts
            WHERE id = ?
            ",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_account))
    }

    /// Deletes an account together with its folders and messages.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn delete_account(&self, id: AccountId) -> Result<()> {
        sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        info!(account = %id, "Deleted account");
        Ok(())
    }

    // -- Folders ------------------------------------------------------------

    /// Folders of an account, ordered by path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_folders(&self, account: AccountId) -> Result<Vec<Folder>> {
        let rows = sqlx::query(&format!(
            "SELECT {FOLDER_COLUMNS} FROM folders WHERE account_id = ? ORDER BY path ASC"
        ))
        .bind(account.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_folder).collect())
    }

    /// Looks a folder up by path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn folder(&self, account: AccountId, path: &str) -> Result<Option<Folder>> {
        let row = sqlx::query(&format!(
            "SELECT {FOLDER_COLUMNS} FROM folders WHERE account_id = ? AND path = ?"
        ))
        .bind(account.0)
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_folder))
    }

    /// Like [`Mirror::folder`], failing with [`crate::Error::FolderNotFound`].
    ///
    /// # Errors
    ///
    /// Returns an error if the folder is unknown or the query fails.
    pub async fn require_folder(&self, account: AccountId, path: &str) -> Result<Folder> {
        self.folder(account, path)
            .await?
            .ok_or_else(|| crate::Error::FolderNotFound(path.to_string()))
    }

    /// Reconciles the folder table with one LIST result: inserts new paths,
    /// refreshes inferred types (unless overridden) and deletes paths the
    /// server no longer has, cascading to their messages.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails.
    pub async fn apply_folder_list(
        &self,
        account: AccountId,
        remote: &[RemoteFolder],
    ) -> Result<FolderListDiff> {
        let mut tx = self.pool.begin().await?;

        let existing: Vec<(i64, String)> =
            sqlx::query("SELECT id, path FROM folders WHERE account_id = ?")
                .bind(account.0)
                .fetch_all(&mut *tx)
                .await?
                .iter()
                .map(|row| (row.get("id"), row.get("path")))
                .collect();
        let known: HashSet<&str> = existing.iter().map(|(_, p)| p.as_str()).collect();
        let listed: HashSet<&str> = remote.iter().map(|r| r.path.as_str()).collect();

        let mut diff = FolderListDiff::default();
        for folder in remote {
            sqlx::query(
                r"
                INSERT INTO folders (account_id, path, delimiter, folder_type)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(account_id, path) DO UPDATE SET
                    delimiter = excluded.delimiter,
                    folder_type = CASE WHEN folders.type_overridden = 1
                                       THEN folders.folder_type
                                       ELSE excluded.folder_type END
                ",
            )
            .bind(account.0)
            .bind(&folder.path)
            .bind(folder.delimiter.map(String::from))
            .bind(folder.folder_type.as_str())
            .execute(&mut *tx)
            .await?;
            if !known.contains(folder.path.as_str()) {
                diff.added.push(folder.path.clone());
            }
        }

        for (id, path) in &existing {
            if !listed.contains(path.as_str()) {
                sqlx::query("DELETE FROM folders WHERE id = ?")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                diff.removed.push(path.clone());
            }
        }

        tx.commit().await?;
        if !diff.added.is_empty() || !diff.removed.is_empty() {
            info!(
                account = %account,
                added = diff.added.len(),
                removed = diff.removed.len(),
                "Folder list changed"
            );
        }
        Ok(diff)
    }

    /// Pins a folder's type. Later LIST passes no longer change it.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn set_folder_type(&self, folder: FolderId, folder_type: FolderType) -> Result<()> {
        sqlx::query("UPDATE folders SET folder_type = ?, type_overridden = 1 WHERE id = ?")
            .bind(folder_type.as_str())
            .bind(folder.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Drops a type override. The next LIST pass re-infers the type.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn clear_folder_type_override(&self, folder: FolderId) -> Result<()> {
        sqlx::query("UPDATE folders SET type_overridden = 0 WHERE id = ?")
            .bind(folder.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Records a sync where STATUS showed nothing changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn touch_folder(&self, folder: FolderId) -> Result<()> {
        sqlx::query("UPDATE folders SET last_synced = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(folder.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // -- Messages -----------------------------------------------------------

    /// Cached UIDs of a folder, ascending.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn local_uids(&self, folder: FolderId) -> Result<Vec<u32>> {
        let rows = sqlx::query("SELECT uid FROM messages WHERE folder_id = ? ORDER BY uid ASC")
            .bind(folder.0)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|r| to_u32(r.get("uid"))).collect())
    }

    /// One message.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a stored column is corrupt.
    pub async fn message(&self, folder: FolderId, uid: u32) -> Result<Option<Message>> {
        let row = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE folder_id = ? AND uid = ?"
        ))
        .bind(folder.0)
        .bind(uid)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_message).transpose()
    }

    /// Messages of a folder, ascending by UID.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a stored column is corrupt.
    pub async fn list_messages(&self, folder: FolderId) -> Result<Vec<Message>> {
        let rows = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE folder_id = ? ORDER BY uid ASC"
        ))
        .bind(folder.0)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_message).collect()
    }

    /// Every cached copy of a message across an account's folders.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a stored column is corrupt.
    pub async fn find_by_message_id(
        &self,
        account: AccountId,
        message_id: &str,
    ) -> Result<Vec<Message>> {
        let rows = sqlx::query(&format!(
            r"
            SELECT {MESSAGE_COLUMNS} FROM messages
            JOIN folders ON folders.id = messages.folder_id
            WHERE folders.account_id = ? AND messages.message_id = ?
            "
        ))
        .bind(account.0)
        .bind(message_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_message).collect()
    }

    /// Raw RFC 5322 body, if downloaded.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn message_body(&self, folder: FolderId, uid: u32) -> Result<Option<Vec<u8>>> {
        let row = sqlx::query("SELECT body FROM messages WHERE folder_id = ? AND uid = ?")
            .bind(folder.0)
            .bind(uid)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.and_then(|r| r.get::<Option<Vec<u8>>, _>("body")))
    }

    /// Up to `limit` UIDs still waiting for their body, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn uids_missing_body(&self, folder: FolderId, limit: usize) -> Result<Vec<u32>> {
        let rows = sqlx::query(
            r"
            SELECT uid FROM messages
            WHERE folder_id = ? AND body_fetched = 0
            ORDER BY uid DESC
            LIMIT ?
            ",
        )
        .bind(folder.0)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|r| to_u32(r.get("uid"))).collect())
    }

    /// Stores a downloaded body and marks the message fetched.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn store_body(&self, folder: FolderId, uid: u32, body: &[u8]) -> Result<()> {
        sqlx::query(
            "UPDATE messages SET body = ?, body_fetched = 1 WHERE folder_id = ? AND uid = ?",
        )
        .bind(body)
        .bind(folder.0)
        .bind(uid)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Body backfill counters for a folder.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn fetch_progress(&self, folder: FolderId) -> Result<FetchProgress> {
        let row = sqlx::query(
            r"
            SELECT COUNT(*) AS total, COALESCE(SUM(body_fetched), 0) AS fetched
            FROM messages WHERE folder_id = ?
            ",
        )
        .bind(folder.0)
        .fetch_one(&self.pool)
        .await?;
        Ok(FetchProgress {
            bodies_total: to_u32(row.get("total")),
            bodies_fetched: to_u32(row.get("fetched")),
        })
    }

    /// Applies one folder sync in a single transaction.
    ///
    /// On an epoch reset every cached message is deleted before anything
    /// else is written, so no old UID survives into the new epoch.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails; nothing is applied then.
    pub async fn apply_folder_changes(
        &self,
        folder: FolderId,
        changes: &FolderChanges,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        if changes.reset_epoch {
            let purged = sqlx::query("DELETE FROM messages WHERE folder_id = ?")
                .bind(folder.0)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            warn!(folder = %folder, purged, "UID epoch changed, discarded cached messages");
        }

        for uid in &changes.expunged {
            sqlx::query("DELETE FROM messages WHERE folder_id = ? AND uid = ?")
                .bind(folder.0)
                .bind(uid)
                .execute(&mut *tx)
                .await?;
        }

        for update in &changes.flag_updates {
            sqlx::query(
                r"
                UPDATE messages SET
                    seen = ?, flagged = ?, answered = ?, forwarded = ?, draft = ?, deleted = ?,
                    mod_seq = COALESCE(?, mod_seq)
                WHERE folder_id = ? AND uid = ?
                ",
            )
            .bind(update.flags.seen)
            .bind(update.flags.flagged)
            .bind(update.flags.answered)
            .bind(update.flags.forwarded)
            .bind(update.flags.draft)
            .bind(update.flags.deleted)
            .bind(update.mod_seq.and_then(to_i64))
            .bind(folder.0)
            .bind(update.uid)
            .execute(&mut *tx)
            .await?;
        }

        for header in &changes.new_messages {
            insert_header(&mut tx, folder, header).await?;
        }

        sqlx::query(
            r"
            UPDATE folders SET
                uid_validity = COALESCE(?, uid_validity), uid_next = ?, highest_mod_seq = ?,
                last_synced = ?
            WHERE id = ?
            ",
        )
        .bind(changes.state.uid_validity)
        .bind(changes.state.uid_next)
        .bind(changes.state.highest_mod_seq.and_then(to_i64))
        .bind(Utc::now().to_rfc3339())
        .bind(folder.0)
        .execute(&mut *tx)
        .await?;
        refresh_counts(&mut tx, folder).await?;

        tx.commit().await?;
        debug!(
            folder = %folder,
            expunged = changes.expunged.len(),
            flags = changes.flag_updates.len(),
            new = changes.new_messages.len(),
            "Applied folder changes"
        );
        Ok(())
    }

    /// Mirrors a successful `UID STORE`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails.
    pub async fn set_flag(&self, folder: FolderId, uids: &[u32], flag: &Flag, on: bool) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for &uid in uids {
            let row = sqlx::query(
                r"
                SELECT seen, flagged, answered, forwarded, draft, deleted
                FROM messages WHERE folder_id = ? AND uid = ?
                ",
            )
            .bind(folder.0)
            .bind(uid)
            .fetch_optional(&mut *tx)
            .await?;
            let Some(row) = row else { continue };
            let mut flags = row_to_flags(&row);
            flags.apply(flag, on);
            sqlx::query(
                r"
                UPDATE messages SET
                    seen = ?, flagged = ?, answered = ?, forwarded = ?, draft = ?, deleted = ?
                WHERE folder_id = ? AND uid = ?
                ",
            )
            .bind(flags.seen)
            .bind(flags.flagged)
            .bind(flags.answered)
            .bind(flags.forwarded)
            .bind(flags.draft)
            .bind(flags.deleted)
            .bind(folder.0)
            .bind(uid)
            .execute(&mut *tx)
            .await?;
        }
        refresh_counts(&mut tx, folder).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Mirrors a successful expunge or move-out.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails.
    pub async fn delete_messages(&self, folder: FolderId, uids: &[u32]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for &uid in uids {
            sqlx::query("DELETE FROM messages WHERE folder_id = ? AND uid = ?")
                .bind(folder.0)
                .bind(uid)
                .execute(&mut *tx)
                .await?;
        }
        refresh_counts(&mut tx, folder).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Mirrors a successful APPEND: the header row and, since the client
    /// already holds it, the full message.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails.
    pub async fn insert_message(
        &self,
        folder: FolderId,
        header: &MessageHeader,
        body: &[u8],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        insert_header(&mut tx, folder, header).await?;
        sqlx::query(
            "UPDATE messages SET body = ?, body_fetched = 1 WHERE folder_id = ? AND uid = ?",
        )
        .bind(body)
        .bind(folder.0)
        .bind(header.uid)
        .execute(&mut *tx)
        .await?;
        refresh_counts(&mut tx, folder).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Mirrors a successful COPY into `to` using the server's UID mapping.
    /// Bodies already downloaded travel along.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails.
    pub async fn copy_messages(
        &self,
        from: FolderId,
        to: FolderId,
        mapping: &[(u32, u32)],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for &(source, destination) in mapping {
            sqlx::query(
                r"
                INSERT OR IGNORE INTO messages
                    (folder_id, uid, message_id, in_reply_to, references_list, subject,
                     from_addr, date, internal_date, size, seen, flagged, answered,
                     forwarded, draft, deleted, mod_seq, body_fetched, body)
                SELECT ?, ?, message_id, in_reply_to, references_list, subject,
                       from_addr, date, internal_date, size, seen, flagged, answered,
                       forwarded, draft, deleted, NULL, body_fetched, body
                FROM messages WHERE folder_id = ? AND uid = ?
                ",
            )
            .bind(to.0)
            .bind(destination)
            .bind(from.0)
            .bind(source)
            .execute(&mut *tx)
            .await?;
        }
        refresh_counts(&mut tx, to).await?;
        tx.commit().await?;
        Ok(())
    }
}

const FOLDER_COLUMNS: &str = "id, account_id, path, delimiter, folder_type, type_overridden, \
    uid_validity, uid_next, highest_mod_seq, total_count, unread_count, last_synced";

const MESSAGE_COLUMNS: &str = "messages.folder_id, messages.uid, messages.message_id, \
    messages.in_reply_to, messages.references_list, messages.subject, messages.from_addr, \
    messages.date, messages.internal_date, messages.size, messages.seen, messages.flagged, \
    messages.answered, messages.forwarded, messages.draft, messages.deleted, \
    messages.mod_seq, messages.body_fetched";

async fn insert_header(
    conn: &mut SqliteConnection,
    folder: FolderId,
    header: &MessageHeader,
) -> Result<()> {
    sqlx::query(
        r"
        INSERT INTO messages
            (folder_id, uid, message_id, in_reply_to, references_list, subject, from_addr,
             date, internal_date, size, seen, flagged, answered, forwarded, draft, deleted,
             mod_seq)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(folder_id, uid) DO UPDATE SET
            message_id = excluded.message_id,
            in_reply_to = excluded.in_reply_to,
            references_list = excluded.references_list,
            subject = excluded.subject,
            from_addr = excluded.from_addr,
            date = excluded.date,
            internal_date = excluded.internal_date,
            size = excluded.size,
            seen = excluded.seen,
            flagged = excluded.flagged,
            answered = excluded.answered,
            forwarded = excluded.forwarded,
            draft = excluded.draft,
            deleted = excluded.deleted,
            mod_seq = excluded.mod_seq
        ",
    )
    .bind(folder.0)
    .bind(header.uid)
    .bind(&header.message_id)
    .bind(&header.in_reply_to)
    .bind(serde_json::to_string(&header.references)?)
    .bind(&header.subject)
    .bind(&header.from)
    .bind(&header.date)
    .bind(&header.internal_date)
    .bind(header.size)
    .bind(header.flags.seen)
    .bind(header.flags.flagged)
    .bind(header.flags.answered)
    .bind(header.flags.forwarded)
    .bind(header.flags.draft)
    .bind(header.flags.deleted)
    .bind(header.mod_seq.and_then(to_i64))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn refresh_counts(conn: &mut SqliteConnection, folder: FolderId) -> Result<()> {
    sqlx::query(
        r"
        UPDATE folders SET
            total_count = (SELECT COUNT(*) FROM messages WHERE folder_id = ?1),
            unread_count = (SELECT COUNT(*) FROM messages WHERE folder_id = ?1 AND seen = 0)
        WHERE id = ?1
        ",
    )
    .bind(folder.0)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

fn to_u32(v: i64) -> u32 {
    u32::try_from(v).unwrap_or_default()
}

fn to_i64(v: u64) -> Option<i64> {
    i64::try_from(v).ok()
}

fn row_to_account(row: &SqliteRow) -> Account {
    let smtp = row
        .get::<Option<String>, _>("smtp_json")
        .and_then(|s| serde_json::from_str(&s).ok());
    Account {
        id: Some(AccountId::new(row.get("id"))),
        name: row.get("name"),
        email: row.get("email"),
        imap: ImapSettings {
            host: row.get("imap_host"),
            port: u16::try_from(row.get::<i64, _>("imap_port")).unwrap_or_default(),
            security: Security::parse(row.get("imap_security")),
            username: row.get("imap_username"),
            auth: AuthKind::parse(row.get("auth_kind")),
        },
        smtp,
        sync_interval: Duration::from_secs(
            u64::try_from(row.get::<i64, _>("sync_interval_secs")).unwrap_or_default(),
        ),
    }
}

fn row_to_folder(row: &SqliteRow) -> Folder {
    Folder {
        id: FolderId(row.get("id")),
        account_id: AccountId::new(row.get("account_id")),
        path: row.get("path"),
        delimiter: row
            .get::<Option<String>, _>("delimiter")
            .and_then(|d| d.chars().next()),
        folder_type: FolderType::parse(row.get("folder_type")).unwrap_or_default(),
        type_overridden: row.get("type_overridden"),
        uid_validity: row.get::<Option<i64>, _>("uid_validity").map(to_u32),
        uid_next: row.get::<Option<i64>, _>("uid_next").map(to_u32),
        highest_mod_seq: row
            .get::<Option<i64>, _>("highest_mod_seq")
            .and_then(|v| u64::try_from(v).ok()),
        total_count: to_u32(row.get("total_count")),
        unread_count: to_u32(row.get("unread_count")),
        last_synced: row
            .get::<Option<String>, _>("last_synced")
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|d| d.with_timezone(&Utc)),
    }
}

fn row_to_flags(row: &SqliteRow) -> MessageFlags {
    MessageFlags {
        seen: row.get("seen"),
        flagged: row.get("flagged"),
        answered: row.get("answered"),
        forwarded: row.get("forwarded"),
        draft: row.get("draft"),
        deleted: row.get("deleted"),
    }
}

fn row_to_message(row: &SqliteRow) -> Result<Message> {
    let references: Vec<String> = serde_json::from_str(row.get("references_list"))?;
    Ok(Message {
        folder_id: FolderId(row.get("folder_id")),
        header: MessageHeader {
            uid: to_u32(row.get("uid")),
            message_id: row.get("message_id"),
            in_reply_to: row.get("in_reply_to"),
            references,
            subject: row.get("subject"),
            from: row.get("from_addr"),
            date: row.get("date"),
            internal_date: row.get("internal_date"),
            size: row.get::<Option<i64>, _>("size").map(to_u32),
            flags: row_to_flags(row),
            mod_seq: row
                .get::<Option<i64>, _>("mod_seq")
                .and_then(|v| u64::try_from(v).ok()),
        },
        body_fetched: row.get("body_fetched"),
    })
}
