// src/models/mod.rs

//! Domain models for the scanner.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod report;
mod task;

// Re-export all public types
pub use config::{Config, DrainMode, HttpConfig, ScannerConfig, StorageConfig};
pub use report::{PageReport, ScanStats, ScanSummary};
pub use task::ScanTask;
