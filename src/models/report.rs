//! Page reports and run statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Everything observed while loading a single page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageReport {
    pub url: String,
    pub title: String,
    pub status_code: u16,
    /// Endpoints that look like API calls
    pub api_urls: Vec<String>,
    /// External script resources
    pub script_urls: Vec<String>,
    pub get_count: usize,
    pub post_count: usize,
    pub scanned_at: DateTime<Utc>,
}

impl PageReport {
    /// Empty report for a URL, stamped with the current time.
    pub fn new(url: impl Into<String>, status_code: u16) -> Self {
        Self {
            url: url.into(),
            title: String::new(),
            status_code,
            api_urls: Vec::new(),
            script_urls: Vec::new(),
            get_count: 0,
            post_count: 0,
            scanned_at: Utc::now(),
        }
    }
}

/// One stored scan as listed by the result store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub url: String,
    pub title: String,
    pub status_code: u16,
    pub api_count: usize,
    pub script_count: usize,
    pub get_count: usize,
    pub post_count: usize,
    pub scanned_at: String,
}

/// Counters for a completed scan run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanStats {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Seed URLs accepted into the queue
    pub seeded: usize,
    /// Tasks handed to the worker pool
    pub submitted: usize,
    /// Tasks dequeued but not submitted (resume hits, scan cap)
    pub skipped: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Tasks left in the queue when the drain loop exited
    pub stranded: usize,
}

impl ScanStats {
    pub fn duration_secs(&self) -> i64 {
        (self.finished_at - self.started_at).num_seconds()
    }
}
