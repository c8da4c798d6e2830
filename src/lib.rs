/*!
 * pc-sync Library
 * Concurrency synchronizers and thread pool executors built on OS threads
 */

pub mod core;
pub mod executor;
pub mod monitoring;

// Re-exports
pub use crate::core::errors::{SyncError, SyncResult};
pub use crate::core::sync::{
    BoundedLazy, BroadcastBox, Deadline, Exchanger, LockFreeQueue, SafeBoundedLazy,
    TransferQueue,
};
pub use executor::{
    CompletionHandle, PoolConfig, SimpleThreadPool, TaskStatus, ThreadPool,
};
pub use monitoring::init_tracing;
