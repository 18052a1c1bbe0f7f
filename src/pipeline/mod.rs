//! Pipeline entry points for scan operations.
//!
//! - `run_scan`: Crawl seed URLs with the HTTP collaborators
//! - `ScanController`: The same run with caller-supplied collaborators

mod reporter;
mod scan;

pub use reporter::{LogReporter, ScanReporter, SkipReason};
pub use scan::{ScanController, run_scan};
