use certpulse_common::types::{
    DomainTrackingInfo, NotificationPreferences, PollItem, Status, TrackingRecord,
};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::domain::normalize_domain;
use crate::error::{Result, StorageError};
use crate::{AccountRow, TrackingStore};

const ACCOUNTS_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS accounts (
    user_id TEXT PRIMARY KEY,
    notify_upfront INTEGER NOT NULL DEFAULT 7,
    notify_default_email TEXT NOT NULL,
    slack_webhook_url TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
";

const DOMAIN_TRACKINGS_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS domain_trackings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    domain_name TEXT NOT NULL,
    server_ip TEXT NOT NULL DEFAULT '',
    issuer TEXT NOT NULL DEFAULT '',
    signature_algo TEXT NOT NULL DEFAULT '',
    public_key_algo TEXT NOT NULL DEFAULT '',
    encoded_pem TEXT NOT NULL DEFAULT '',
    public_key TEXT NOT NULL DEFAULT '',
    signature TEXT NOT NULL DEFAULT '',
    dns_names TEXT NOT NULL DEFAULT '',
    key_usage TEXT NOT NULL DEFAULT '',
    ext_key_usages TEXT NOT NULL DEFAULT '[]',
    expires INTEGER,
    status TEXT NOT NULL DEFAULT 'unresponsive',
    last_poll_at INTEGER,
    latency INTEGER NOT NULL DEFAULT 0,
    error TEXT NOT NULL DEFAULT '',
    created_at INTEGER NOT NULL,
    UNIQUE(user_id, domain_name)
);
CREATE INDEX IF NOT EXISTS idx_domain_trackings_user_id ON domain_trackings(user_id);
";

const TRACKING_COLUMNS: &str = "dt.id, dt.user_id, dt.domain_name, dt.server_ip, dt.issuer, \
     dt.signature_algo, dt.public_key_algo, dt.encoded_pem, dt.public_key, dt.signature, \
     dt.dns_names, dt.key_usage, dt.ext_key_usages, dt.expires, dt.status, dt.last_poll_at, \
     dt.latency, dt.error";

/// SQLite-backed [`TrackingStore`].
pub struct SqliteTrackingStore {
    conn: Mutex<Connection>,
}

impl SqliteTrackingStore {
    /// Opens (creating if needed) `trackings.db` inside `data_dir`.
    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join("trackings.db");
        let conn = Connection::open(&db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(ACCOUNTS_SCHEMA)?;
        conn.execute_batch(DOMAIN_TRACKINGS_SCHEMA)?;
        tracing::debug!(path = %db_path.display(), "Tracking store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn row_to_tracking(row: &rusqlite::Row) -> rusqlite::Result<TrackingRecord> {
        let ext_key_usages: String = row.get(12)?;
        let expires: Option<i64> = row.get(13)?;
        let status: String = row.get(14)?;
        let last_poll_at: Option<i64> = row.get(15)?;
        let latency: i64 = row.get(16)?;

        let ext_key_usages: Vec<String> = serde_json::from_str(&ext_key_usages)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(12, Type::Text, Box::new(e)))?;
        let status: Status = status.parse().map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                14,
                Type::Text,
                Box::new(StorageError::InvalidStatus(status.clone())),
            )
        })?;

        Ok(TrackingRecord {
            id: row.get(0)?,
            user_id: row.get(1)?,
            domain_name: row.get(2)?,
            info: DomainTrackingInfo {
                server_ip: row.get(3)?,
                issuer: row.get(4)?,
                signature_algo: row.get(5)?,
                public_key_algo: row.get(6)?,
                encoded_pem: row.get(7)?,
                public_key: row.get(8)?,
                signature: row.get(9)?,
                dns_names: row.get(10)?,
                key_usage: row.get(11)?,
                ext_key_usages,
                expires: expires.and_then(|ts| DateTime::from_timestamp(ts, 0)),
                status,
                last_poll_at: last_poll_at.and_then(|ts| DateTime::from_timestamp(ts, 0)),
                latency_ms: u64::try_from(latency).unwrap_or(0),
                error: row.get(17)?,
            },
        })
    }
}

impl TrackingStore for SqliteTrackingStore {
    fn upsert_account(&self, account: &AccountRow) -> Result<()> {
        let prefs = &account.preferences;
        if prefs.notify_upfront_days == 0 {
            return Err(StorageError::InvalidValue {
                field: "notify_upfront",
                reason: "must be greater than zero".to_string(),
            });
        }
        let now = Utc::now().timestamp();
        self.conn().execute(
            "INSERT INTO accounts (user_id, notify_upfront, notify_default_email, slack_webhook_url, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(user_id) DO UPDATE SET
                notify_upfront = excluded.notify_upfront,
                notify_default_email = excluded.notify_default_email,
                slack_webhook_url = excluded.slack_webhook_url,
                updated_at = excluded.updated_at",
            rusqlite::params![
                account.user_id,
                prefs.notify_upfront_days,
                prefs.default_email,
                prefs.webhook_url,
                now,
            ],
        )?;
        Ok(())
    }

    fn create_trackings(&self, user_id: &str, domains: &[String]) -> Result<usize> {
        let domains = domains
            .iter()
            .map(|d| normalize_domain(d))
            .collect::<Result<Vec<_>>>()?;

        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        let now = Utc::now().timestamp();
        let mut inserted = 0;
        {
            let mut exists = tx.prepare(
                "SELECT id FROM domain_trackings WHERE user_id = ?1 AND domain_name = ?2",
            )?;
            let mut insert = tx.prepare(
                "INSERT INTO domain_trackings (user_id, domain_name, created_at) VALUES (?1, ?2, ?3)",
            )?;
            for domain in &domains {
                let existing: Option<i64> = exists
                    .query_row(rusqlite::params![user_id, domain], |row| row.get(0))
                    .optional()?;
                if existing.is_some() {
                    tracing::debug!(user_id, domain = %domain, "Tracking already exists, skipping");
                    continue;
                }
                insert.execute(rusqlite::params![user_id, domain, now])?;
                inserted += 1;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    fn delete_tracking(&self, user_id: &str, domain: &str) -> Result<()> {
        let domain = domain.trim().to_lowercase();
        let deleted = self.conn().execute(
            "DELETE FROM domain_trackings WHERE user_id = ?1 AND domain_name = ?2",
            rusqlite::params![user_id, domain],
        )?;
        if deleted == 0 {
            return Err(StorageError::TrackingNotFound {
                user_id: user_id.to_string(),
                domain,
            });
        }
        tracing::debug!(user_id, domain = %domain, "Tracking deleted");
        Ok(())
    }

    fn list_trackings(&self, user_id: &str) -> Result<Vec<TrackingRecord>> {
        let conn = self.conn();
        let sql = format!(
            "SELECT {TRACKING_COLUMNS} FROM domain_trackings AS dt
             WHERE dt.user_id = ?1 ORDER BY dt.domain_name"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params![user_id], Self::row_to_tracking)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    fn fetch_all_trackings_with_preferences(&self) -> Result<Vec<PollItem>> {
        let conn = self.conn();
        let sql = format!(
            "SELECT {TRACKING_COLUMNS}, a.notify_upfront, a.notify_default_email, a.slack_webhook_url
             FROM domain_trackings AS dt
             INNER JOIN accounts AS a ON a.user_id = dt.user_id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            let tracking = Self::row_to_tracking(row)?;
            let notify_upfront: i64 = row.get(18)?;
            let webhook_url: Option<String> = row.get(20)?;
            Ok(PollItem {
                tracking,
                preferences: NotificationPreferences {
                    // Enforced on write; clamp rows written by other tools.
                    notify_upfront_days: u32::try_from(notify_upfront).unwrap_or(0).max(1),
                    default_email: row.get(19)?,
                    webhook_url: webhook_url.filter(|url| !url.trim().is_empty()),
                },
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    fn bulk_update_trackings(&self, records: &[TrackingRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        let mut updated = 0;
        {
            let mut stmt = tx.prepare(
                "UPDATE domain_trackings SET
                    issuer = ?2, expires = ?3, signature_algo = ?4, public_key_algo = ?5,
                    dns_names = ?6, last_poll_at = ?7, latency = ?8, error = ?9, status = ?10,
                    signature = ?11, public_key = ?12, key_usage = ?13, ext_key_usages = ?14,
                    encoded_pem = ?15, server_ip = ?16
                 WHERE id = ?1",
            )?;
            for record in records {
                let info = &record.info;
                let ext_key_usages = serde_json::to_string(&info.ext_key_usages)?;
                let latency = i64::try_from(info.latency_ms).unwrap_or(i64::MAX);
                let changed = stmt.execute(rusqlite::params![
                    record.id,
                    info.issuer,
                    info.expires.map(|e| e.timestamp()),
                    info.signature_algo,
                    info.public_key_algo,
                    info.dns_names,
                    info.last_poll_at.map(|t| t.timestamp()),
                    latency,
                    info.error,
                    info.status.as_str(),
                    info.signature,
                    info.public_key,
                    info.key_usage,
                    ext_key_usages,
                    info.encoded_pem,
                    info.server_ip,
                ])?;
                if changed == 0 {
                    tracing::warn!(
                        id = record.id,
                        domain = %record.domain_name,
                        "Tracking vanished before update, skipping"
                    );
                }
                updated += changed;
            }
        }
        tx.commit()?;
        Ok(updated)
    }
}
