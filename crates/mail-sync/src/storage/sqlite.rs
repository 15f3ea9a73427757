//! SQLite-based mail storage

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{Connection, OptionalExtension, Params, Row, params};
use rusqlite_migration::{M, Migrations};

use super::traits::MailStore;
use crate::models::{
    Account, AccountId, Email, EmailAddress, EmailId, EmailThread, Label, LabelId, SyncState,
    SyncStatus, ThreadId,
};

/// Database migrations
///
/// Each migration is applied in order. The user_version pragma tracks which
/// migrations have been applied.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: Initial schema
        M::up(
            r#"
            CREATE TABLE accounts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL,
                display_name TEXT,
                enabled INTEGER NOT NULL DEFAULT 1,
                added_at TEXT NOT NULL,
                last_sync_at TEXT
            );

            -- Sync checkpoint, one row per account
            CREATE TABLE sync_state (
                account_id INTEGER PRIMARY KEY,
                cursor TEXT,
                last_full_sync_at TEXT,
                last_incremental_sync_at TEXT,
                email_count INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'idle',
                error_message TEXT,
                sync_version INTEGER NOT NULL DEFAULT 1
            );

            -- Email metadata with zstd-compressed bodies
            -- received_at is epoch millis so ORDER BY is chronological
            CREATE TABLE emails (
                account_id INTEGER NOT NULL,
                id TEXT NOT NULL,
                thread_id TEXT NOT NULL,
                from_name TEXT,
                from_email TEXT NOT NULL,
                subject TEXT NOT NULL,
                snippet TEXT NOT NULL,
                received_at INTEGER NOT NULL,
                internal_date INTEGER NOT NULL,
                body_text BLOB,  -- zstd compressed
                body_html BLOB,  -- zstd compressed
                PRIMARY KEY (account_id, id)
            );

            CREATE INDEX idx_emails_thread ON emails(account_id, thread_id);
            CREATE INDEX idx_emails_received_at ON emails(account_id, received_at);

            -- Recipients (normalized, many-to-many)
            CREATE TABLE email_recipients (
                account_id INTEGER NOT NULL,
                email_id TEXT NOT NULL,
                recipient_type TEXT NOT NULL,
                name TEXT,
                email TEXT NOT NULL,
                position INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (account_id, email_id, recipient_type, position),
                FOREIGN KEY (account_id, email_id)
                    REFERENCES emails(account_id, id) ON DELETE CASCADE
            );

            -- Labels on emails (many-to-many)
            CREATE TABLE email_labels (
                account_id INTEGER NOT NULL,
                email_id TEXT NOT NULL,
                label_id TEXT NOT NULL,
                PRIMARY KEY (account_id, email_id, label_id),
                FOREIGN KEY (account_id, email_id)
                    REFERENCES emails(account_id, id) ON DELETE CASCADE
            );

            CREATE INDEX idx_email_labels_label ON email_labels(account_id, label_id);

            -- Derived thread aggregates, participants as a JSON array
            CREATE TABLE threads (
                account_id INTEGER NOT NULL,
                id TEXT NOT NULL,
                subject TEXT NOT NULL,
                snippet TEXT NOT NULL,
                last_message_at INTEGER NOT NULL,
                message_count INTEGER NOT NULL DEFAULT 0,
                is_read INTEGER NOT NULL DEFAULT 1,
                is_starred INTEGER NOT NULL DEFAULT 0,
                participants TEXT NOT NULL DEFAULT '[]',
                PRIMARY KEY (account_id, id)
            );

            CREATE INDEX idx_threads_last_message_at
                ON threads(account_id, last_message_at DESC);

            -- Label definitions mirrored from the server
            CREATE TABLE labels (
                account_id INTEGER NOT NULL,
                id TEXT NOT NULL,
                name TEXT NOT NULL,
                is_system INTEGER NOT NULL DEFAULT 0,
                message_count INTEGER NOT NULL DEFAULT 0,
                unread_count INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (account_id, id)
            );
            "#,
        ),
    ])
}

const EMAIL_COLUMNS: &str = "e.account_id, e.id, e.thread_id, e.from_name, e.from_email, \
     e.subject, e.snippet, e.received_at, e.internal_date, e.body_text, e.body_html";

const THREAD_COLUMNS: &str = "t.account_id, t.id, t.subject, t.snippet, t.last_message_at, \
     t.message_count, t.is_read, t.is_starred, t.participants";

/// Email columns as read from one row, before recipients and labels are attached
struct EmailRow {
    account_id: AccountId,
    id: String,
    thread_id: String,
    from: EmailAddress,
    subject: String,
    snippet: String,
    received_at: i64,
    internal_date: i64,
    body_text: Option<Vec<u8>>,
    body_html: Option<Vec<u8>>,
}

impl EmailRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            account_id: row.get(0)?,
            id: row.get(1)?,
            thread_id: row.get(2)?,
            from: EmailAddress {
                name: row.get(3)?,
                email: row.get(4)?,
            },
            subject: row.get(5)?,
            snippet: row.get(6)?,
            received_at: row.get(7)?,
            internal_date: row.get(8)?,
            body_text: row.get(9)?,
            body_html: row.get(10)?,
        })
    }
}

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).single().unwrap_or_default()
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

fn compress(text: Option<&String>, what: &str) -> Result<Option<Vec<u8>>> {
    // Level 3 = good balance of speed vs compression
    text.map(|t| zstd::encode_all(t.as_bytes(), 3))
        .transpose()
        .with_context(|| format!("Failed to compress {}", what))
}

fn decompress(data: Option<Vec<u8>>, what: &str) -> Result<Option<String>> {
    data.map(|d| {
        zstd::decode_all(d.as_slice())
            .with_context(|| format!("Failed to decompress {}", what))
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    })
    .transpose()
}

/// SQLite-based mail storage
pub struct SqliteMailStore {
    conn: Mutex<Connection>,
}

impl SqliteMailStore {
    /// Open (or create) a store at `db_path` and bring its schema up to date
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;
        Self::from_connection(conn)
    }

    /// Open a private in-memory database
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        // WAL lets readers proceed during sync writes; foreign keys are
        // required for ON DELETE CASCADE on recipients and labels
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            "#,
        )?;

        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database connection lock poisoned"))
    }

    /// Load recipients for an email
    fn load_recipients(
        conn: &Connection,
        account_id: AccountId,
        email_id: &str,
        recipient_type: &str,
    ) -> Result<Vec<EmailAddress>> {
        let mut stmt = conn.prepare_cached(
            "SELECT name, email FROM email_recipients
             WHERE account_id = ? AND email_id = ? AND recipient_type = ?
             ORDER BY position",
        )?;

        let recipients = stmt
            .query_map(params![account_id, email_id, recipient_type], |row| {
                Ok(EmailAddress {
                    name: row.get(0)?,
                    email: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(recipients)
    }

    fn load_labels(conn: &Connection, account_id: AccountId, email_id: &str) -> Result<Vec<String>> {
        let mut stmt = conn.prepare_cached(
            "SELECT label_id FROM email_labels WHERE account_id = ? AND email_id = ?",
        )?;

        let labels = stmt
            .query_map(params![account_id, email_id], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(labels)
    }

    fn save_recipients(
        conn: &Connection,
        email: &Email,
        recipient_type: &str,
        recipients: &[EmailAddress],
    ) -> Result<()> {
        let mut stmt = conn.prepare_cached(
            "INSERT INTO email_recipients
             (account_id, email_id, recipient_type, name, email, position)
             VALUES (?, ?, ?, ?, ?, ?)",
        )?;

        for (i, addr) in recipients.iter().enumerate() {
            stmt.execute(params![
                email.account_id,
                email.id.as_str(),
                recipient_type,
                addr.name,
                addr.email,
                i as i64
            ])?;
        }

        Ok(())
    }

    /// Run an email query and attach recipients and labels to each row
    fn query_emails<P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<Email>> {
        let rows = {
            let mut stmt = conn.prepare(sql)?;
            stmt.query_map(params, EmailRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?
        };

        rows.into_iter()
            .map(|row| Self::assemble_email(conn, row))
            .collect()
    }

    fn assemble_email(conn: &Connection, row: EmailRow) -> Result<Email> {
        let to = Self::load_recipients(conn, row.account_id, &row.id, "to")?;
        let cc = Self::load_recipients(conn, row.account_id, &row.id, "cc")?;
        let labels = Self::load_labels(conn, row.account_id, &row.id)?;
        let body_text = decompress(row.body_text, "body_text")?;
        let body_html = decompress(row.body_html, "body_html")?;

        Ok(Email::builder(EmailId::new(row.id), row.account_id, ThreadId::new(row.thread_id))
            .from(row.from)
            .to(to)
            .cc(cc)
            .subject(row.subject)
            .snippet(row.snippet)
            .received_at(millis_to_datetime(row.received_at))
            .internal_date(row.internal_date)
            .labels(labels)
            .body_text(body_text)
            .body_html(body_html)
            .build())
    }

    fn load_email(conn: &Connection, account_id: AccountId, id: &EmailId) -> Result<Option<Email>> {
        let sql = format!(
            "SELECT {} FROM emails e WHERE e.account_id = ? AND e.id = ?",
            EMAIL_COLUMNS
        );
        Ok(Self::query_emails(conn, &sql, params![account_id, id.as_str()])?
            .into_iter()
            .next())
    }

    fn query_threads<P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<EmailThread>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, |row| {
                Ok((
                    row.get::<_, AccountId>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, bool>(6)?,
                    row.get::<_, bool>(7)?,
                    row.get::<_, String>(8)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(
                |(account_id, id, subject, snippet, last, count, is_read, is_starred, participants)|
                 -> Result<EmailThread> {
                    let participants: BTreeSet<String> = serde_json::from_str(&participants)
                        .with_context(|| format!("Invalid participants for thread {}", id))?;
                    Ok(EmailThread {
                        id: ThreadId::new(id),
                        account_id,
                        subject,
                        snippet,
                        last_message_at: millis_to_datetime(last),
                        message_count: count as usize,
                        is_read,
                        is_starred,
                        participants,
                    })
                },
            )
            .collect()
    }

    fn account_from_row(row: &Row<'_>) -> rusqlite::Result<Account> {
        let added_at: String = row.get(4)?;
        let last_sync_at: Option<String> = row.get(5)?;
        Ok(Account {
            id: row.get(0)?,
            email: row.get(1)?,
            display_name: row.get(2)?,
            enabled: row.get(3)?,
            added_at: parse_datetime(&added_at).unwrap_or_else(Utc::now),
            last_sync_at: last_sync_at.as_deref().and_then(parse_datetime),
        })
    }
}

impl MailStore for SqliteMailStore {
    fn upsert_account(&self, account: Account) -> Result<AccountId> {
        let conn = self.conn()?;
        let added_at = account.added_at.to_rfc3339();
        let last_sync_at = account.last_sync_at.map(|t| t.to_rfc3339());

        if account.id == 0 {
            conn.execute(
                "INSERT INTO accounts (email, display_name, enabled, added_at, last_sync_at)
                 VALUES (?, ?, ?, ?, ?)",
                params![account.email, account.display_name, account.enabled, added_at, last_sync_at],
            )?;
            return Ok(conn.last_insert_rowid());
        }

        conn.execute(
            "INSERT INTO accounts (id, email, display_name, enabled, added_at, last_sync_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                email = excluded.email,
                display_name = excluded.display_name,
                enabled = excluded.enabled,
                added_at = excluded.added_at,
                last_sync_at = excluded.last_sync_at",
            params![
                account.id,
                account.email,
                account.display_name,
                account.enabled,
                added_at,
                last_sync_at
            ],
        )?;
        Ok(account.id)
    }

    fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        let conn = self.conn()?;
        let account = conn
            .query_row(
                "SELECT id, email, display_name, enabled, added_at, last_sync_at
                 FROM accounts WHERE id = ?",
                [id],
                Self::account_from_row,
            )
            .optional()?;
        Ok(account)
    }

    fn list_accounts(&self) -> Result<Vec<Account>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, email, display_name, enabled, added_at, last_sync_at
             FROM accounts ORDER BY id",
        )?;
        let accounts = stmt
            .query_map([], Self::account_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(accounts)
    }

    fn set_account_last_sync(&self, id: AccountId, at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE accounts SET last_sync_at = ? WHERE id = ?",
            params![at.to_rfc3339(), id],
        )?;
        Ok(())
    }

    fn upsert_email(&self, email: Email) -> Result<()> {
        let body_text = compress(email.body_text.as_ref(), "body_text")?;
        let body_html = compress(email.body_html.as_ref(), "body_html")?;

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        // ON CONFLICT DO UPDATE keeps the row, so cascaded children survive
        // until they are replaced below
        tx.execute(
            "INSERT INTO emails
             (account_id, id, thread_id, from_name, from_email, subject, snippet,
              received_at, internal_date, body_text, body_html)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(account_id, id) DO UPDATE SET
                thread_id = excluded.thread_id,
                from_name = excluded.from_name,
                from_email = excluded.from_email,
                subject = excluded.subject,
                snippet = excluded.snippet,
                received_at = excluded.received_at,
                internal_date = excluded.internal_date,
                body_text = excluded.body_text,
                body_html = excluded.body_html",
            params![
                email.account_id,
                email.id.as_str(),
                email.thread_id.as_str(),
                email.from.name,
                email.from.email,
                email.subject,
                email.snippet,
                email.received_at.timestamp_millis(),
                email.internal_date,
                body_text,
                body_html
            ],
        )?;

        tx.execute(
            "DELETE FROM email_recipients WHERE account_id = ? AND email_id = ?",
            params![email.account_id, email.id.as_str()],
        )?;
        tx.execute(
            "DELETE FROM email_labels WHERE account_id = ? AND email_id = ?",
            params![email.account_id, email.id.as_str()],
        )?;

        Self::save_recipients(&tx, &email, "to", &email.to)?;
        Self::save_recipients(&tx, &email, "cc", &email.cc)?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO email_labels (account_id, email_id, label_id) VALUES (?, ?, ?)",
            )?;
            for label in email.labels() {
                stmt.execute(params![email.account_id, email.id.as_str(), label])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn get_email(&self, account_id: AccountId, id: &EmailId) -> Result<Option<Email>> {
        let conn = self.conn()?;
        Self::load_email(&conn, account_id, id)
    }

    fn has_email(&self, account_id: AccountId, id: &EmailId) -> Result<bool> {
        let conn = self.conn()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM emails WHERE account_id = ? AND id = ?)",
            params![account_id, id.as_str()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn delete_email(&self, account_id: AccountId, id: &EmailId) -> Result<Option<Email>> {
        let conn = self.conn()?;
        let Some(email) = Self::load_email(&conn, account_id, id)? else {
            return Ok(None);
        };
        conn.execute(
            "DELETE FROM emails WHERE account_id = ? AND id = ?",
            params![account_id, id.as_str()],
        )?;
        Ok(Some(email))
    }

    fn list_emails_for_thread(
        &self,
        account_id: AccountId,
        thread_id: &ThreadId,
    ) -> Result<Vec<Email>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM emails e
             WHERE e.account_id = ? AND e.thread_id = ?
             ORDER BY e.received_at ASC, e.id ASC",
            EMAIL_COLUMNS
        );
        Self::query_emails(&conn, &sql, params![account_id, thread_id.as_str()])
    }

    fn list_emails_by_label(
        &self,
        account_id: AccountId,
        label: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Email>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM emails e
             JOIN email_labels l ON l.account_id = e.account_id AND l.email_id = e.id
             WHERE e.account_id = ? AND l.label_id = ?
             ORDER BY e.received_at DESC, e.id ASC
             LIMIT ? OFFSET ?",
            EMAIL_COLUMNS
        );
        Self::query_emails(
            &conn,
            &sql,
            params![account_id, label, limit as i64, offset as i64],
        )
    }

    fn list_oldest_emails(&self, account_id: AccountId, limit: usize) -> Result<Vec<Email>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM emails e
             WHERE e.account_id = ?
             ORDER BY e.received_at ASC, e.id ASC
             LIMIT ?",
            EMAIL_COLUMNS
        );
        Self::query_emails(&conn, &sql, params![account_id, limit as i64])
    }

    fn count_emails(&self, account_id: AccountId) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM emails WHERE account_id = ?",
            [account_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn upsert_thread(&self, thread: EmailThread) -> Result<()> {
        let participants = serde_json::to_string(&thread.participants)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO threads
             (account_id, id, subject, snippet, last_message_at, message_count,
              is_read, is_starred, participants)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(account_id, id) DO UPDATE SET
                subject = excluded.subject,
                snippet = excluded.snippet,
                last_message_at = excluded.last_message_at,
                message_count = excluded.message_count,
                is_read = excluded.is_read,
                is_starred = excluded.is_starred,
                participants = excluded.participants",
            params![
                thread.account_id,
                thread.id.as_str(),
                thread.subject,
                thread.snippet,
                thread.last_message_at.timestamp_millis(),
                thread.message_count as i64,
                thread.is_read,
                thread.is_starred,
                participants
            ],
        )?;
        Ok(())
    }

    fn get_thread(&self, account_id: AccountId, id: &ThreadId) -> Result<Option<EmailThread>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM threads t WHERE t.account_id = ? AND t.id = ?",
            THREAD_COLUMNS
        );
        Ok(Self::query_threads(&conn, &sql, params![account_id, id.as_str()])?
            .into_iter()
            .next())
    }

    fn delete_thread(&self, account_id: AccountId, id: &ThreadId) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM threads WHERE account_id = ? AND id = ?",
            params![account_id, id.as_str()],
        )?;
        Ok(())
    }

    fn list_threads(
        &self,
        account_id: AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<EmailThread>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM threads t
             WHERE t.account_id = ?
             ORDER BY t.last_message_at DESC, t.id ASC
             LIMIT ? OFFSET ?",
            THREAD_COLUMNS
        );
        Self::query_threads(&conn, &sql, params![account_id, limit as i64, offset as i64])
    }

    fn list_threads_by_label(
        &self,
        account_id: AccountId,
        label: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<EmailThread>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM threads t
             WHERE t.account_id = ?
               AND EXISTS (
                 SELECT 1 FROM emails e
                 JOIN email_labels l ON l.account_id = e.account_id AND l.email_id = e.id
                 WHERE e.account_id = t.account_id AND e.thread_id = t.id AND l.label_id = ?
               )
             ORDER BY t.last_message_at DESC, t.id ASC
             LIMIT ? OFFSET ?",
            THREAD_COLUMNS
        );
        Self::query_threads(
            &conn,
            &sql,
            params![account_id, label, limit as i64, offset as i64],
        )
    }

    fn count_threads(&self, account_id: AccountId) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM threads WHERE account_id = ?",
            [account_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn upsert_label(&self, label: Label) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO labels (account_id, id, name, is_system, message_count, unread_count)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(account_id, id) DO UPDATE SET
                name = excluded.name,
                is_system = excluded.is_system,
                message_count = excluded.message_count,
                unread_count = excluded.unread_count",
            params![
                label.account_id,
                label.id.as_str(),
                label.name,
                label.is_system,
                label.message_count,
                label.unread_count
            ],
        )?;
        Ok(())
    }

    fn list_labels(&self, account_id: AccountId) -> Result<Vec<Label>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT account_id, id, name, is_system, message_count, unread_count
             FROM labels WHERE account_id = ? ORDER BY id",
        )?;
        let labels = stmt
            .query_map([account_id], |row| {
                Ok(Label {
                    account_id: row.get(0)?,
                    id: LabelId::new(row.get::<_, String>(1)?),
                    name: row.get(2)?,
                    is_system: row.get(3)?,
                    message_count: row.get(4)?,
                    unread_count: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(labels)
    }

    fn get_sync_state(&self, account_id: AccountId) -> Result<Option<SyncState>> {
        let conn = self.conn()?;
        let state = conn
            .query_row(
                "SELECT account_id, cursor, last_full_sync_at, last_incremental_sync_at,
                        email_count, status, error_message, sync_version
                 FROM sync_state WHERE account_id = ?",
                [account_id],
                |row| {
                    let last_full: Option<String> = row.get(2)?;
                    let last_incremental: Option<String> = row.get(3)?;
                    let status: String = row.get(5)?;
                    Ok(SyncState {
                        account_id: row.get(0)?,
                        cursor: row.get(1)?,
                        last_full_sync_at: last_full.as_deref().and_then(parse_datetime),
                        last_incremental_sync_at: last_incremental
                            .as_deref()
                            .and_then(parse_datetime),
                        email_count: row.get::<_, i64>(4)? as usize,
                        status: SyncStatus::parse(&status),
                        error_message: row.get(6)?,
                        sync_version: row.get(7)?,
                    })
                },
            )
            .optional()?;
        Ok(state)
    }

    fn save_sync_state(&self, state: SyncState) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sync_state
             (account_id, cursor, last_full_sync_at, last_incremental_sync_at,
              email_count, status, error_message, sync_version)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(account_id) DO UPDATE SET
                cursor = excluded.cursor,
                last_full_sync_at = excluded.last_full_sync_at,
                last_incremental_sync_at = excluded.last_incremental_sync_at,
                email_count = excluded.email_count,
                status = excluded.status,
                error_message = excluded.error_message,
                sync_version = excluded.sync_version",
            params![
                state.account_id,
                state.cursor,
                state.last_full_sync_at.map(|t| t.to_rfc3339()),
                state.last_incremental_sync_at.map(|t| t.to_rfc3339()),
                state.email_count as i64,
                state.status.as_str(),
                state.error_message,
                state.sync_version
            ],
        )?;
        Ok(())
    }

    fn delete_sync_state(&self, account_id: AccountId) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM sync_state WHERE account_id = ?", [account_id])?;
        Ok(())
    }
}
