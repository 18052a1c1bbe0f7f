//! Application configuration structures.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Scheduling behavior
    #[serde(default)]
    pub scanner: ScannerConfig,

    /// HTTP client settings shared by the renderer and link extractor
    #[serde(default)]
    pub http: HttpConfig,

    /// Result persistence
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.scanner.thread_count == 0 {
            return Err(AppError::validation("scanner.thread_count must be > 0"));
        }
        if self.scanner.url_list.trim().is_empty() {
            return Err(AppError::validation("scanner.url_list is empty"));
        }
        if self.http.user_agent.trim().is_empty() {
            return Err(AppError::validation("http.user_agent is empty"));
        }
        if self.http.timeout_secs == 0 {
            return Err(AppError::validation("http.timeout_secs must be > 0"));
        }
        if self.storage.result_db.trim().is_empty() {
            return Err(AppError::validation("storage.result_db is empty"));
        }
        Ok(())
    }
}

/// Crawl scheduling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Number of concurrent workers
    #[serde(default = "defaults::thread_count")]
    pub thread_count: usize,

    /// Starting depth for seed URLs (hops remaining)
    #[serde(default = "defaults::depth")]
    pub depth: u32,

    /// Skip URLs already present in the result store
    #[serde(default)]
    pub resume: bool,

    /// Wipe the result store before scanning
    #[serde(default)]
    pub clear_history: bool,

    /// Maximum tasks submitted per run (0 = unlimited)
    #[serde(default)]
    pub max_scan_count: usize,

    /// When the drain loop is allowed to stop
    #[serde(default)]
    pub drain_mode: DrainMode,

    /// Newline-separated seed URL file
    #[serde(default = "defaults::url_list")]
    pub url_list: String,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            thread_count: defaults::thread_count(),
            depth: defaults::depth(),
            resume: false,
            clear_history: false,
            max_scan_count: 0,
            drain_mode: DrainMode::default(),
            url_list: defaults::url_list(),
        }
    }
}

/// Termination policy for the controller's drain loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainMode {
    /// Stop only once the queue is empty and no submitted task is in flight.
    #[default]
    Settle,
    /// Stop the first time the queue is observed empty. Children enqueued by
    /// still-running workers after that point are never submitted.
    FirstEmpty,
}

impl fmt::Display for DrainMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DrainMode::Settle => f.write_str("settle"),
            DrainMode::FirstEmpty => f.write_str("first_empty"),
        }
    }
}

impl FromStr for DrainMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "settle" => Ok(DrainMode::Settle),
            "first_empty" => Ok(DrainMode::FirstEmpty),
            other => Err(AppError::config(format!("unknown drain mode '{other}'"))),
        }
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Pause after each processed task in milliseconds
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            request_delay_ms: defaults::request_delay(),
        }
    }
}

/// Result store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path of the SQLite result database
    #[serde(default = "defaults::result_db")]
    pub result_db: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            result_db: defaults::result_db(),
        }
    }
}

mod defaults {
    // Scanner defaults
    pub fn thread_count() -> usize {
        5
    }
    pub fn depth() -> u32 {
        2
    }
    pub fn url_list() -> String {
        "urls.txt".into()
    }

    // HTTP defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; scanner/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn request_delay() -> u64 {
        300
    }

    // Storage defaults
    pub fn result_db() -> String {
        "results/scan.db".into()
    }
}
