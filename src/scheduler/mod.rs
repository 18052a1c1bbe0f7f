//! Task scheduling primitives.
//!
//! - `TaskQueue`: FIFO of pending tasks with a per-run seen set
//! - `WorkerPool`: Fixed number of workers behind a blocking hand-off

mod pool;
mod queue;

pub use pool::WorkerPool;
pub use queue::TaskQueue;
