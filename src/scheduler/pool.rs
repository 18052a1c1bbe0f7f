// src/scheduler/pool.rs

//! Fixed-size worker pool with a blocking hand-off.
//!
//! Tasks travel over a bounded channel of capacity one, so `submit` suspends
//! the caller until the previous hand-off has been picked up by a worker.
//! Each worker runs `process` and then `callback` on its own task. Failures,
//! panics included, are passed to the callback and never end the worker loop.
//! A panicking callback is logged and the worker moves on.
//!
//! Shutdown comes in two flavors: `close` lets workers finish everything that
//! was already handed off, `stop` makes them exit after their current task.

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures::FutureExt;
use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::{AppError, Result};
use crate::models::ScanTask;

type SharedReceiver = Arc<AsyncMutex<mpsc::Receiver<ScanTask>>>;

/// Concurrent executor pool for scan tasks.
pub struct WorkerPool {
    size: usize,
    sender: Mutex<Option<mpsc::Sender<ScanTask>>>,
    receiver: Mutex<Option<mpsc::Receiver<ScanTask>>>,
    stop_tx: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Create an idle pool. A size of zero is treated as one.
    pub fn new(size: usize) -> Self {
        let (sender, receiver) = mpsc::channel(1);
        let (stop_tx, _) = watch::channel(false);
        Self {
            size: size.max(1),
            sender: Mutex::new(Some(sender)),
            receiver: Mutex::new(Some(receiver)),
            stop_tx,
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Spawn the workers. Must be called from within a Tokio runtime.
    pub fn start<P, Fut, C>(&self, process: P, callback: C) -> Result<()>
    where
        P: Fn(ScanTask) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
        C: Fn(&ScanTask, Option<&AppError>) + Send + Sync + 'static,
    {
        let receiver = self.receiver.lock().take().ok_or(AppError::PoolStarted)?;
        let receiver: SharedReceiver = Arc::new(AsyncMutex::new(receiver));
        let process = Arc::new(process);
        let callback = Arc::new(callback);

        let mut handles = self.handles.lock();
        for id in 0..self.size {
            handles.push(tokio::spawn(run_worker(
                id,
                Arc::clone(&receiver),
                self.stop_tx.subscribe(),
                Arc::clone(&process),
                Arc::clone(&callback),
            )));
        }

        log::debug!("Started {} workers", self.size);
        Ok(())
    }

    /// Hand a task to the pool, waiting until the hand-off slot is free.
    pub async fn submit(&self, task: ScanTask) -> Result<()> {
        if *self.stop_tx.borrow() {
            return Err(AppError::PoolClosed);
        }
        let sender = self.sender.lock().clone().ok_or(AppError::PoolClosed)?;
        sender.send(task).await.map_err(|_| AppError::PoolClosed)
    }

    /// Refuse further submissions; workers exit once the hand-off is drained.
    pub fn close(&self) {
        self.sender.lock().take();
    }

    /// Signal workers to exit after their current task.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
        self.close();
    }

    /// Wait until every spawned worker has left its loop.
    ///
    /// Returns only after `close` or `stop` has been called.
    pub async fn wait(&self) {
        let handles = std::mem::take(&mut *self.handles.lock());
        for result in join_all(handles).await {
            if let Err(e) = result {
                log::error!("Worker task ended abnormally: {}", e);
            }
        }
    }
}

async fn run_worker<P, Fut, C>(
    id: usize,
    receiver: SharedReceiver,
    mut stop: watch::Receiver<bool>,
    process: Arc<P>,
    callback: Arc<C>,
) where
    P: Fn(ScanTask) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
    C: Fn(&ScanTask, Option<&AppError>) + Send + Sync + 'static,
{
    loop {
        let next = tokio::select! {
            biased;
            _ = async {
                let _ = stop.wait_for(|stopped| *stopped).await;
            } => None,
            task = async { receiver.lock().await.recv().await } => task,
        };

        let Some(task) = next else {
            break;
        };

        log::debug!("Worker {} picked up {}", id, task.url);
        let outcome = AssertUnwindSafe(process(task.clone()))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(AppError::TaskPanicked(task.url.clone())));
        let reported = panic::catch_unwind(AssertUnwindSafe(|| {
            callback(&task, outcome.as_ref().err())
        }));
        if reported.is_err() {
            log::error!("Worker {} callback panicked for {}", id, task.url);
        }
    }

    log::debug!("Worker {} exited", id);
}
