//! SQLite result store.
//!
//! ## Storage Layout
//!
//! ```text
//! scans(id, url UNIQUE, timestamp, title, code,
//!       api_count, js_count, get_count, post_count)
//! api_requests(id, scan_id → scans.id, api_url, UNIQUE(scan_id, api_url))
//! js_files(id, scan_id → scans.id, js_url, UNIQUE(scan_id, js_url))
//! ```
//!
//! Writes use `INSERT OR IGNORE` inside one transaction per report, so saving
//! a URL twice never duplicates rows.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::Row;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};

use crate::error::Result;
use crate::models::{PageReport, ScanSummary};
use crate::storage::ResultStore;

const SCHEMA: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS scans (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        url TEXT NOT NULL UNIQUE,
        timestamp TEXT NOT NULL,
        title TEXT,
        code INTEGER,
        api_count INTEGER DEFAULT 0,
        js_count INTEGER DEFAULT 0,
        get_count INTEGER DEFAULT 0,
        post_count INTEGER DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS api_requests (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        scan_id INTEGER NOT NULL,
        api_url TEXT NOT NULL,
        UNIQUE (scan_id, api_url),
        FOREIGN KEY (scan_id) REFERENCES scans(id)
    )",
    "CREATE TABLE IF NOT EXISTS js_files (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        scan_id INTEGER NOT NULL,
        js_url TEXT NOT NULL,
        UNIQUE (scan_id, js_url),
        FOREIGN KEY (scan_id) REFERENCES scans(id)
    )",
];

/// Child tables first so foreign keys hold at every step.
const CLEAR: [&str; 3] = [
    "DELETE FROM api_requests",
    "DELETE FROM js_files",
    "DELETE FROM scans",
];

/// SQLite-backed result store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database file and its tables.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.create_tables().await?;

        log::info!("Result database: {}", path.display());
        Ok(store)
    }

    async fn create_tables(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Close all pooled connections.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl ResultStore for SqliteStore {
    async fn has_scanned(&self, url: &str) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, i64>("SELECT EXISTS(SELECT 1 FROM scans WHERE url = ?)")
            .bind(url)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists != 0)
    }

    async fn save(&self, report: &PageReport) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT OR IGNORE INTO scans
                (url, timestamp, title, code, api_count, js_count, get_count, post_count)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(report.url.as_str())
        .bind(report.scanned_at.to_rfc3339())
        .bind(report.title.as_str())
        .bind(i64::from(report.status_code))
        .bind(report.api_urls.len() as i64)
        .bind(report.script_urls.len() as i64)
        .bind(report.get_count as i64)
        .bind(report.post_count as i64)
        .execute(&mut *tx)
        .await?;

        let scan_id = sqlx::query_scalar::<_, i64>("SELECT id FROM scans WHERE url = ?")
            .bind(report.url.as_str())
            .fetch_one(&mut *tx)
            .await?;

        for api in &report.api_urls {
            sqlx::query("INSERT OR IGNORE INTO api_requests (scan_id, api_url) VALUES (?, ?)")
                .bind(scan_id)
                .bind(api.as_str())
                .execute(&mut *tx)
                .await?;
        }
        for js in &report.script_urls {
            sqlx::query("INSERT OR IGNORE INTO js_files (scan_id, js_url) VALUES (?, ?)")
                .bind(scan_id)
                .bind(js.as_str())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn clear_all(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for statement in CLEAR {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_scans(&self) -> Result<Vec<ScanSummary>> {
        let rows = sqlx::query(
            "SELECT url, title, code, api_count, js_count, get_count, post_count, timestamp
             FROM scans ORDER BY id DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(summary_from_row).collect()
    }
}

fn summary_from_row(row: &SqliteRow) -> Result<ScanSummary> {
    Ok(ScanSummary {
        url: row.try_get("url")?,
        title: row.try_get::<Option<String>, _>("title")?.unwrap_or_default(),
        status_code: u16::try_from(row.try_get::<Option<i64>, _>("code")?.unwrap_or(0))
            .unwrap_or(0),
        api_count: count(row, "api_count")?,
        script_count: count(row, "js_count")?,
        get_count: count(row, "get_count")?,
        post_count: count(row, "post_count")?,
        scanned_at: row.try_get("timestamp")?,
    })
}

fn count(row: &SqliteRow, column: &str) -> Result<usize> {
    let value = row.try_get::<Option<i64>, _>(column)?.unwrap_or(0);
    Ok(usize::try_from(value).unwrap_or(0))
}
