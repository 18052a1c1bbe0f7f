// src/pipeline/reporter.rs

//! Run-scoped reporting of scan outcomes.

use chrono::Utc;

use crate::error::AppError;
use crate::models::{ScanStats, ScanTask};

/// Why a dequeued task was not submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Result store already holds this URL (resume mode)
    AlreadyScanned,
    /// Per-run submission cap reached
    ScanLimit,
}

/// Receives scan events for one run.
///
/// Called from worker tasks concurrently; implementations must not assume
/// any ordering between workers.
pub trait ScanReporter: Send + Sync {
    fn history_cleared(&self) {}

    fn task_succeeded(&self, task: &ScanTask);

    fn task_failed(&self, task: &ScanTask, error: &AppError);

    fn task_skipped(&self, task: &ScanTask, reason: SkipReason);

    fn finished(&self, _stats: &ScanStats) {}
}

/// Reporter that writes through the `log` facade, tagged with a run id.
#[derive(Debug, Clone)]
pub struct LogReporter {
    run_id: String,
}

impl LogReporter {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
        }
    }

    /// Reporter whose run id is the current UTC time.
    pub fn for_new_run() -> Self {
        Self::new(Utc::now().format("%Y%m%dT%H%M%S").to_string())
    }
}

impl ScanReporter for LogReporter {
    fn history_cleared(&self) {
        log::info!("[{}] Cleared scan history", self.run_id);
    }

    fn task_succeeded(&self, task: &ScanTask) {
        log::info!("[{}] Scanned {} (depth {})", self.run_id, task.url, task.depth);
    }

    fn task_failed(&self, task: &ScanTask, error: &AppError) {
        log::error!("[{}] Failed {}: {}", self.run_id, task.url, error);
    }

    fn task_skipped(&self, task: &ScanTask, reason: SkipReason) {
        match reason {
            SkipReason::AlreadyScanned => {
                log::info!("[{}] Skipping already scanned {}", self.run_id, task.url)
            }
            SkipReason::ScanLimit => {
                log::debug!("[{}] Scan limit reached, dropping {}", self.run_id, task.url)
            }
        }
    }

    fn finished(&self, stats: &ScanStats) {
        log::info!(
            "[{}] Scan finished in {}s: {} submitted, {} succeeded, {} failed, {} skipped",
            self.run_id,
            stats.duration_secs(),
            stats.submitted,
            stats.succeeded,
            stats.failed,
            stats.skipped
        );
        if stats.stranded > 0 {
            log::warn!(
                "[{}] {} discovered tasks were never submitted",
                self.run_id,
                stats.stranded
            );
        }
    }
}
