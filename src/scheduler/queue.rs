// src/scheduler/queue.rs

//! Deduplicating FIFO task queue.
//!
//! Pending tasks and the seen-set live behind a single lock so that the
//! membership check and the append are one atomic step. A URL is accepted at
//! most once per queue lifetime, even after it has been dequeued.

use std::collections::{HashSet, VecDeque};

use parking_lot::Mutex;

use crate::models::ScanTask;

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<ScanTask>,
    seen: HashSet<String>,
}

/// Ordered worklist shared by the drain loop and the workers.
#[derive(Debug, Default)]
pub struct TaskQueue {
    state: Mutex<QueueState>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a task unless its URL was ever enqueued before.
    ///
    /// Returns `true` if the task was accepted. The first depth recorded for a
    /// URL wins; later discoveries at other depths are ignored.
    pub fn enqueue(&self, task: ScanTask) -> bool {
        let mut state = self.state.lock();
        if state.seen.contains(&task.url) {
            return false;
        }
        state.seen.insert(task.url.clone());
        state.pending.push_back(task);
        true
    }

    /// Enqueue every URL at the same depth, preserving input order.
    pub fn enqueue_batch<I, S>(&self, urls: I, depth: u32) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        urls.into_iter()
            .map(|url| self.enqueue(ScanTask::new(url, depth)))
            .filter(|accepted| *accepted)
            .count()
    }

    /// Remove and return the oldest pending task.
    pub fn dequeue(&self) -> Option<ScanTask> {
        self.state.lock().pending.pop_front()
    }

    /// Whether the URL was ever accepted.
    ///
    /// Only a hint for producers; `enqueue` is the authoritative gate.
    pub fn seen(&self, url: &str) -> bool {
        self.state.lock().seen.contains(url)
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_fifo_order() {
        let queue = TaskQueue::new();
        queue.enqueue(ScanTask::new("https://a.test", 1));
        queue.enqueue(ScanTask::new("https://b.test", 1));
        queue.enqueue(ScanTask::new("https://c.test", 1));

        let order: Vec<String> = std::iter::from_fn(|| queue.dequeue())
            .map(|t| t.url)
            .collect();
        assert_eq!(order, ["https://a.test", "https://b.test", "https://c.test"]);
    }

    #[test]
    fn test_duplicate_ignored_first_depth_wins() {
        let queue = TaskQueue::new();
        assert!(queue.enqueue(ScanTask::new("https://a.test", 3)));
        assert!(!queue.enqueue(ScanTask::new("https://a.test", 1)));
        assert!(!queue.enqueue(ScanTask::new("https://a.test", 5)));

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.dequeue().unwrap().depth, 3);
        assert!(queue.dequeue().is_none());
    }

    #[test]
    fn test_seen_survives_dequeue() {
        let queue = TaskQueue::new();
        queue.enqueue(ScanTask::new("https://a.test", 2));
        queue.dequeue();

        assert!(queue.is_empty());
        assert!(queue.seen("https://a.test"));
        assert!(!queue.enqueue(ScanTask::new("https://a.test", 2)));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_depth_zero_is_accepted() {
        let queue = TaskQueue::new();
        assert!(queue.enqueue(ScanTask::new("https://a.test", 0)));
        assert_eq!(queue.dequeue(), Some(ScanTask::new("https://a.test", 0)));
    }

    #[test]
    fn test_enqueue_batch_counts_and_keeps_order() {
        let queue = TaskQueue::new();
        let accepted = queue.enqueue_batch(
            ["https://a.test", "https://b.test", "https://a.test", "https://c.test"],
            2,
        );
        assert_eq!(accepted, 3);

        let tasks: Vec<ScanTask> = std::iter::from_fn(|| queue.dequeue()).collect();
        assert_eq!(
            tasks,
            vec![
                ScanTask::new("https://a.test", 2),
                ScanTask::new("https://b.test", 2),
                ScanTask::new("https://c.test", 2),
            ]
        );
    }

    #[test]
    fn test_concurrent_producers_dedup() {
        let queue = Arc::new(TaskQueue::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    for i in 0..200 {
                        queue.enqueue(ScanTask::new(format!("https://site.test/{i}"), 1));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(queue.len(), 200);
        let mut urls: Vec<String> = std::iter::from_fn(|| queue.dequeue())
            .map(|t| t.url)
            .collect();
        urls.sort();
        urls.dedup();
        assert_eq!(urls.len(), 200);
    }
}
