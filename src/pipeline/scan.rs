// src/pipeline/scan.rs

//! Scan controller.
//!
//! One `start` call owns one task queue and one worker pool. The drain loop
//! is the only consumer of the queue; workers feed discovered links back
//! into it. Every submitted task is counted as in flight until its callback
//! runs, which is after any children were enqueued. In `settle` mode the
//! loop exits only when the queue is empty and nothing is in flight, so no
//! discovered link is left behind. `first_empty` mode exits the first time
//! the queue is seen empty; links found after that are counted as stranded.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use tokio::sync::Notify;

use crate::error::{AppError, Result};
use crate::models::{Config, DrainMode, ScanStats, ScanTask};
use crate::pipeline::{LogReporter, ScanReporter, SkipReason};
use crate::scheduler::{TaskQueue, WorkerPool};
use crate::services::{HtmlLinkExtractor, HttpRenderer, LinkExtractor, PageRenderer};
use crate::storage::ResultStore;

/// Run a scan with the HTTP renderer and link extractor.
pub async fn run_scan(
    config: Arc<Config>,
    store: Arc<dyn ResultStore>,
    client: &Client,
    urls: &[String],
) -> Result<ScanStats> {
    let controller = ScanController::new(
        config,
        Arc::new(HttpRenderer::new(client.clone())),
        Arc::new(HtmlLinkExtractor::new(client.clone())),
        store,
    );
    controller.start(urls).await
}

/// Drives a single crawl session end to end.
pub struct ScanController {
    config: Arc<Config>,
    renderer: Arc<dyn PageRenderer>,
    extractor: Arc<dyn LinkExtractor>,
    store: Arc<dyn ResultStore>,
    reporter: Arc<dyn ScanReporter>,
}

impl ScanController {
    pub fn new(
        config: Arc<Config>,
        renderer: Arc<dyn PageRenderer>,
        extractor: Arc<dyn LinkExtractor>,
        store: Arc<dyn ResultStore>,
    ) -> Self {
        Self {
            config,
            renderer,
            extractor,
            store,
            reporter: Arc::new(LogReporter::for_new_run()),
        }
    }

    /// Replace the default log reporter.
    pub fn with_reporter(mut self, reporter: Arc<dyn ScanReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Scan the seed URLs and everything reachable within the configured depth.
    ///
    /// Returns once every submitted task has completed. Fails only when the
    /// result store cannot be cleared on request; per-page failures are
    /// reported and counted.
    pub async fn start(&self, urls: &[String]) -> Result<ScanStats> {
        let started_at = Utc::now();
        let options = &self.config.scanner;

        if options.clear_history {
            self.store.clear_all().await?;
            self.reporter.history_cleared();
        }

        let context = Arc::new(ScanContext {
            queue: TaskQueue::new(),
            renderer: Arc::clone(&self.renderer),
            extractor: Arc::clone(&self.extractor),
            store: Arc::clone(&self.store),
            delay: Duration::from_millis(self.config.http.request_delay_ms),
        });
        let seeded = context.queue.enqueue_batch(urls.iter().cloned(), options.depth);

        log::info!(
            "Scanning {} seed URLs at depth {} with {} workers ({} drain)",
            seeded,
            options.depth,
            options.thread_count.max(1),
            options.drain_mode
        );

        let counters = Arc::new(RunCounters::default());
        let pool = WorkerPool::new(options.thread_count);

        let process = {
            let context = Arc::clone(&context);
            move |task: ScanTask| {
                let context = Arc::clone(&context);
                async move { context.scan_page(task).await }
            }
        };
        let callback = {
            let counters = Arc::clone(&counters);
            let reporter = Arc::clone(&self.reporter);
            move |task: &ScanTask, error: Option<&AppError>| {
                // Settle before reporting so a failing reporter cannot pin the drain loop.
                counters.finish(error.is_none());
                match error {
                    None => reporter.task_succeeded(task),
                    Some(e) => reporter.task_failed(task, e),
                }
            }
        };
        pool.start(process, callback)?;

        let drained = self.drain(&context.queue, &pool, &counters).await;
        pool.close();
        pool.wait().await;
        let (submitted, skipped) = drained?;

        let stats = ScanStats {
            started_at,
            finished_at: Utc::now(),
            seeded,
            submitted,
            skipped,
            succeeded: counters.succeeded.load(Ordering::SeqCst),
            failed: counters.failed.load(Ordering::SeqCst),
            stranded: context.queue.len(),
        };
        self.reporter.finished(&stats);
        Ok(stats)
    }

    /// Move tasks from the queue into the pool until the drain mode says stop.
    async fn drain(
        &self,
        queue: &TaskQueue,
        pool: &WorkerPool,
        counters: &RunCounters,
    ) -> Result<(usize, usize)> {
        let options = &self.config.scanner;
        let mut submitted = 0;
        let mut skipped = 0;

        loop {
            let Some(task) = queue.dequeue() else {
                if options.drain_mode == DrainMode::FirstEmpty {
                    break;
                }
                if counters.is_idle() {
                    // Nothing in flight can enqueue any more.
                    if queue.is_empty() {
                        break;
                    }
                    continue;
                }
                counters.settled.notified().await;
                continue;
            };

            if options.max_scan_count > 0 && submitted >= options.max_scan_count {
                skipped += 1;
                self.reporter.task_skipped(&task, SkipReason::ScanLimit);
                continue;
            }

            if options.resume && self.already_scanned(&task.url).await {
                skipped += 1;
                self.reporter.task_skipped(&task, SkipReason::AlreadyScanned);
                continue;
            }

            counters.begin();
            if let Err(e) = pool.submit(task).await {
                counters.abandon();
                return Err(e);
            }
            submitted += 1;
        }

        Ok((submitted, skipped))
    }

    async fn already_scanned(&self, url: &str) -> bool {
        match self.store.has_scanned(url).await {
            Ok(found) => found,
            Err(e) => {
                log::warn!("Resume lookup failed for {}: {}", url, e);
                false
            }
        }
    }
}

/// Everything a worker needs to process one task.
struct ScanContext {
    queue: TaskQueue,
    renderer: Arc<dyn PageRenderer>,
    extractor: Arc<dyn LinkExtractor>,
    store: Arc<dyn ResultStore>,
    delay: Duration,
}

impl ScanContext {
    async fn scan_page(&self, task: ScanTask) -> Result<()> {
        let outcome = self.render_and_expand(&task).await;

        // Politeness delay, applied whether or not the page succeeded.
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        outcome
    }

    async fn render_and_expand(&self, task: &ScanTask) -> Result<()> {
        let report = self.renderer.render(&task.url).await?;
        self.store.save(&report).await?;

        if !task.expands() {
            return Ok(());
        }

        let links = self.extractor.extract_links(&task.url).await;
        let found = links.len();
        let depth = task.child_depth();
        let added = links
            .into_iter()
            .filter(|link| !self.queue.seen(link))
            .filter(|link| self.queue.enqueue(ScanTask::new(link.as_str(), depth)))
            .count();

        log::debug!("{}: {} links, {} new at depth {}", task.url, found, added, depth);
        Ok(())
    }
}

/// In-flight and outcome counters for one run.
#[derive(Default)]
struct RunCounters {
    in_flight: AtomicUsize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    settled: Notify,
}

impl RunCounters {
    fn begin(&self) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
    }

    fn finish(&self, succeeded: bool) {
        if succeeded {
            self.succeeded.fetch_add(1, Ordering::SeqCst);
        } else {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.settled.notify_one();
    }

    fn abandon(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    fn is_idle(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) == 0
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::models::{PageReport, ScanSummary};

    #[derive(Default)]
    struct FakeRenderer {
        failing: HashSet<String>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PageRenderer for FakeRenderer {
        async fn render(&self, url: &str) -> Result<PageReport> {
            self.calls.lock().push(url.to_string());
            if self.failing.contains(url) {
                return Err(AppError::render(url, "connection refused"));
            }
            Ok(PageReport::new(url, 200))
        }
    }

    #[derive(Default)]
    struct FakeExtractor {
        links: HashMap<String, Vec<String>>,
        delay: Duration,
        calls: Mutex<Vec<String>>,
    }

    impl FakeExtractor {
        fn with(mut self, page: &str, links: &[&str]) -> Self {
            self.links.insert(
                page.to_string(),
                links.iter().map(|l| l.to_string()).collect(),
            );
            self
        }
    }

    #[async_trait]
    impl LinkExtractor for FakeExtractor {
        async fn extract_links(&self, url: &str) -> Vec<String> {
            self.calls.lock().push(url.to_string());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.links.get(url).cloned().unwrap_or_default()
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        reports: Mutex<HashMap<String, PageReport>>,
        saves: Mutex<Vec<String>>,
        fail_clear: bool,
    }

    impl MemoryStore {
        fn preloaded(urls: &[&str]) -> Self {
            let store = Self::default();
            for url in urls {
                store
                    .reports
                    .lock()
                    .insert(url.to_string(), PageReport::new(*url, 200));
            }
            store
        }
    }

    #[async_trait]
    impl ResultStore for MemoryStore {
        async fn has_scanned(&self, url: &str) -> Result<bool> {
            Ok(self.reports.lock().contains_key(url))
        }

        async fn save(&self, report: &PageReport) -> Result<()> {
            self.saves.lock().push(report.url.clone());
            self.reports
                .lock()
                .entry(report.url.clone())
                .or_insert_with(|| report.clone());
            Ok(())
        }

        async fn clear_all(&self) -> Result<()> {
            if self.fail_clear {
                return Err(AppError::config("database is locked"));
            }
            self.reports.lock().clear();
            Ok(())
        }

        async fn list_scans(&self) -> Result<Vec<ScanSummary>> {
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct RecordingReporter {
        succeeded: Mutex<Vec<String>>,
        failed: Mutex<Vec<String>>,
        skipped: Mutex<Vec<(String, SkipReason)>>,
        cleared: AtomicUsize,
    }

    impl ScanReporter for RecordingReporter {
        fn history_cleared(&self) {
            self.cleared.fetch_add(1, Ordering::SeqCst);
        }

        fn task_succeeded(&self, task: &ScanTask) {
            self.succeeded.lock().push(task.url.clone());
        }

        fn task_failed(&self, task: &ScanTask, _error: &AppError) {
            self.failed.lock().push(task.url.clone());
        }

        fn task_skipped(&self, task: &ScanTask, reason: SkipReason) {
            self.skipped.lock().push((task.url.clone(), reason));
        }
    }

    struct Harness {
        renderer: Arc<FakeRenderer>,
        extractor: Arc<FakeExtractor>,
        store: Arc<MemoryStore>,
        reporter: Arc<RecordingReporter>,
        controller: ScanController,
    }

    fn harness(
        config: Config,
        renderer: FakeRenderer,
        extractor: FakeExtractor,
        store: MemoryStore,
    ) -> Harness {
        let renderer = Arc::new(renderer);
        let extractor = Arc::new(extractor);
        let store = Arc::new(store);
        let reporter = Arc::new(RecordingReporter::default());
        let controller = ScanController::new(
            Arc::new(config),
            renderer.clone(),
            extractor.clone(),
            store.clone(),
        )
        .with_reporter(reporter.clone());
        Harness {
            renderer,
            extractor,
            store,
            reporter,
            controller,
        }
    }

    fn config(depth: u32) -> Config {
        let mut config = Config::default();
        config.scanner.depth = depth;
        config.scanner.thread_count = 2;
        config.http.request_delay_ms = 0;
        config
    }

    fn urls(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn sorted(mut items: Vec<String>) -> Vec<String> {
        items.sort();
        items
    }

    #[tokio::test]
    async fn test_two_level_crawl_saves_each_page_once() {
        let h = harness(
            config(2),
            FakeRenderer::default(),
            FakeExtractor::default()
                .with("https://a.test", &["https://b.test"])
                .with("https://b.test", &[]),
            MemoryStore::default(),
        );

        let stats = h.controller.start(&urls(&["https://a.test"])).await.unwrap();

        assert_eq!(
            sorted(h.store.saves.lock().clone()),
            ["https://a.test", "https://b.test"]
        );
        // b.test sits at depth 1 and is never expanded.
        assert_eq!(*h.extractor.calls.lock(), ["https://a.test"]);
        assert_eq!(stats.seeded, 1);
        assert_eq!(stats.submitted, 2);
        assert_eq!(stats.succeeded, 2);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.stranded, 0);
    }

    #[tokio::test]
    async fn test_depth_one_and_zero_never_extract() {
        for depth in [0, 1] {
            let h = harness(
                config(depth),
                FakeRenderer::default(),
                FakeExtractor::default().with("https://a.test", &["https://b.test"]),
                MemoryStore::default(),
            );

            h.controller
                .start(&urls(&["https://a.test", "https://c.test"]))
                .await
                .unwrap();

            assert!(h.extractor.calls.lock().is_empty());
            assert_eq!(
                sorted(h.renderer.calls.lock().clone()),
                ["https://a.test", "https://c.test"]
            );
        }
    }

    #[tokio::test]
    async fn test_resume_skips_scanned_urls_without_submitting() {
        let mut cfg = config(1);
        cfg.scanner.resume = true;
        let h = harness(
            cfg,
            FakeRenderer::default(),
            FakeExtractor::default(),
            MemoryStore::preloaded(&["https://x"]),
        );

        let stats = h
            .controller
            .start(&urls(&["https://x", "https://y"]))
            .await
            .unwrap();

        assert_eq!(*h.renderer.calls.lock(), ["https://y"]);
        assert_eq!(
            *h.reporter.skipped.lock(),
            vec![("https://x".to_string(), SkipReason::AlreadyScanned)]
        );
        assert_eq!(stats.submitted, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.stranded, 0);
    }

    #[tokio::test]
    async fn test_without_resume_scanned_urls_are_rescanned() {
        let h = harness(
            config(1),
            FakeRenderer::default(),
            FakeExtractor::default(),
            MemoryStore::preloaded(&["https://x"]),
        );

        h.controller.start(&urls(&["https://x"])).await.unwrap();

        assert_eq!(*h.renderer.calls.lock(), ["https://x"]);
    }

    #[tokio::test]
    async fn test_clear_history_runs_before_resume_check() {
        let mut cfg = config(1);
        cfg.scanner.resume = true;
        cfg.scanner.clear_history = true;
        let h = harness(
            cfg,
            FakeRenderer::default(),
            FakeExtractor::default(),
            MemoryStore::preloaded(&["https://x"]),
        );

        let stats = h.controller.start(&urls(&["https://x"])).await.unwrap();

        assert_eq!(h.reporter.cleared.load(Ordering::SeqCst), 1);
        assert_eq!(*h.renderer.calls.lock(), ["https://x"]);
        assert_eq!(stats.skipped, 0);
    }

    #[tokio::test]
    async fn test_clear_failure_aborts_run() {
        let mut cfg = config(1);
        cfg.scanner.clear_history = true;
        let store = MemoryStore {
            fail_clear: true,
            ..MemoryStore::default()
        };
        let h = harness(cfg, FakeRenderer::default(), FakeExtractor::default(), store);

        assert!(h.controller.start(&urls(&["https://x"])).await.is_err());
        assert!(h.renderer.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_failed_render_is_reported_and_not_expanded() {
        let renderer = FakeRenderer {
            failing: HashSet::from(["https://a.test".to_string()]),
            ..FakeRenderer::default()
        };
        let h = harness(
            config(3),
            renderer,
            FakeExtractor::default().with("https://a.test", &["https://b.test"]),
            MemoryStore::default(),
        );

        let stats = h
            .controller
            .start(&urls(&["https://a.test", "https://c.test"]))
            .await
            .unwrap();

        assert_eq!(*h.reporter.failed.lock(), ["https://a.test"]);
        assert_eq!(*h.reporter.succeeded.lock(), ["https://c.test"]);
        assert_eq!(*h.extractor.calls.lock(), ["https://c.test"]);
        assert_eq!(*h.store.saves.lock(), ["https://c.test"]);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.succeeded, 1);
    }

    #[tokio::test]
    async fn test_cyclic_links_scanned_once() {
        let h = harness(
            config(4),
            FakeRenderer::default(),
            FakeExtractor::default()
                .with("https://a.test", &["https://b.test", "https://c.test"])
                .with("https://b.test", &["https://c.test", "https://a.test"])
                .with("https://c.test", &["https://b.test", "https://d.test"]),
            MemoryStore::default(),
        );

        let stats = h.controller.start(&urls(&["https://a.test"])).await.unwrap();

        assert_eq!(
            sorted(h.renderer.calls.lock().clone()),
            ["https://a.test", "https://b.test", "https://c.test", "https://d.test"]
        );
        assert_eq!(stats.submitted, 4);
    }

    #[tokio::test]
    async fn test_settle_mode_waits_for_late_children() {
        let extractor = FakeExtractor {
            delay: Duration::from_millis(30),
            ..FakeExtractor::default()
        }
        .with("https://a.test", &["https://b.test"]);
        let h = harness(
            config(2),
            FakeRenderer::default(),
            extractor,
            MemoryStore::default(),
        );

        let stats = h.controller.start(&urls(&["https://a.test"])).await.unwrap();

        assert_eq!(
            sorted(h.renderer.calls.lock().clone()),
            ["https://a.test", "https://b.test"]
        );
        assert_eq!(stats.stranded, 0);
    }

    #[tokio::test]
    async fn test_first_empty_mode_strands_late_children() {
        let mut cfg = config(2);
        cfg.scanner.drain_mode = DrainMode::FirstEmpty;
        let extractor = FakeExtractor {
            delay: Duration::from_millis(30),
            ..FakeExtractor::default()
        }
        .with("https://a.test", &["https://b.test"]);
        let h = harness(cfg, FakeRenderer::default(), extractor, MemoryStore::default());

        let stats = h.controller.start(&urls(&["https://a.test"])).await.unwrap();

        assert_eq!(*h.renderer.calls.lock(), ["https://a.test"]);
        assert_eq!(stats.submitted, 1);
        assert_eq!(stats.stranded, 1);
    }

    #[tokio::test]
    async fn test_max_scan_count_caps_submissions() {
        let mut cfg = config(1);
        cfg.scanner.max_scan_count = 2;
        let h = harness(
            cfg,
            FakeRenderer::default(),
            FakeExtractor::default(),
            MemoryStore::default(),
        );

        let stats = h
            .controller
            .start(&urls(&["https://a.test", "https://b.test", "https://c.test"]))
            .await
            .unwrap();

        assert_eq!(
            sorted(h.renderer.calls.lock().clone()),
            ["https://a.test", "https://b.test"]
        );
        assert_eq!(
            *h.reporter.skipped.lock(),
            vec![("https://c.test".to_string(), SkipReason::ScanLimit)]
        );
        assert_eq!(stats.submitted, 2);
        assert_eq!(stats.skipped, 1);
    }

    #[tokio::test]
    async fn test_duplicate_seeds_collapse() {
        let h = harness(
            config(1),
            FakeRenderer::default(),
            FakeExtractor::default(),
            MemoryStore::default(),
        );

        let stats = h
            .controller
            .start(&urls(&["https://a.test", "https://a.test"]))
            .await
            .unwrap();

        assert_eq!(stats.seeded, 1);
        assert_eq!(*h.renderer.calls.lock(), ["https://a.test"]);
    }

    struct PanickingReporter;

    impl ScanReporter for PanickingReporter {
        fn task_succeeded(&self, _task: &ScanTask) {
            panic!("reporter bug");
        }

        fn task_failed(&self, _task: &ScanTask, _error: &AppError) {}

        fn task_skipped(&self, _task: &ScanTask, _reason: SkipReason) {}
    }

    #[tokio::test]
    async fn test_panicking_reporter_does_not_hang_settle() {
        let mut cfg = config(2);
        cfg.scanner.thread_count = 1;
        let store = Arc::new(MemoryStore::default());
        let controller = ScanController::new(
            Arc::new(cfg),
            Arc::new(FakeRenderer::default()),
            Arc::new(FakeExtractor::default().with("https://a.test", &["https://b.test"])),
            store.clone(),
        )
        .with_reporter(Arc::new(PanickingReporter));

        let stats = tokio::time::timeout(
            Duration::from_secs(3),
            controller.start(&urls(&["https://a.test"])),
        )
        .await
        .expect("scan should settle")
        .unwrap();

        // The single worker survives the first panic and scans the child too.
        assert_eq!(
            sorted(store.saves.lock().clone()),
            ["https://a.test", "https://b.test"]
        );
        assert_eq!(stats.succeeded, 2);
        assert_eq!(stats.stranded, 0);
    }

    #[tokio::test]
    async fn test_empty_seed_list_finishes_immediately() {
        let h = harness(
            config(2),
            FakeRenderer::default(),
            FakeExtractor::default(),
            MemoryStore::default(),
        );

        let stats = h.controller.start(&[]).await.unwrap();

        assert_eq!(stats.seeded, 0);
        assert_eq!(stats.submitted, 0);
        assert!(h.renderer.calls.lock().is_empty());
    }
}
