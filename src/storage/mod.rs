//! Storage abstractions for scan results.
//!
//! The scan controller only needs three questions answered: was a URL
//! scanned before, record this report, and forget everything. Listing is used
//! by the CLI report command.
//!
//! ## Schema (SQLite backend)
//!
//! ```text
//! scans          one row per URL (UNIQUE url)
//! ├── api_requests   endpoints observed on the page
//! └── js_files       script resources loaded by the page
//! ```

pub mod sqlite;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{PageReport, ScanSummary};

// Re-export for convenience
pub use sqlite::SqliteStore;

/// Trait for scan result backends.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Whether a report for this URL has been saved.
    async fn has_scanned(&self, url: &str) -> Result<bool>;

    /// Persist a page report. Saving the same URL twice keeps one row.
    async fn save(&self, report: &PageReport) -> Result<()>;

    /// Remove every stored scan.
    async fn clear_all(&self) -> Result<()>;

    /// Stored scans, newest first.
    async fn list_scans(&self) -> Result<Vec<ScanSummary>>;
}
