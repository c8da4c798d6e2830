/*!
 * Executors
 *
 * Two thread pools over OS threads:
 * - `SimpleThreadPool`: fire-and-forget, submitters block while the pool is
 *   saturated
 * - `ThreadPool<T>`: queued submission through a dispatcher thread, each task
 *   reported through a `CompletionHandle`
 *
 * Both grow on demand up to `PoolConfig::max_pool_size` and let idle workers
 * retire after the keep-alive.
 */

pub mod config;
mod handle;
mod pool;
mod simple;

pub use config::PoolConfig;
pub use handle::{CompletionHandle, TaskStatus};
pub use pool::ThreadPool;
pub use simple::SimpleThreadPool;

use std::any::Any;

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
