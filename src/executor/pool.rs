/*!
 * Thread Pool
 *
 * Queue-backed executor: `execute` never blocks, it appends a work item and
 * returns a `CompletionHandle`. A dedicated dispatcher thread drains the
 * queue, handing each item to an idle worker or spawning a new worker while
 * the pool is below its maximum.
 *
 * Workers serve themselves from the queue after every task and only park in
 * the idle list when the queue is empty, so the dispatcher mostly matters
 * for growing the pool and for waking parked workers.
 *
 * # Locks
 *
 * Taken in this order, never reversed:
 * 1. work queue (also guards the `dispatch` and `terminated` conditions)
 * 2. worker set
 * 3. a worker's mailbox
 *
 * Every state change the dispatcher waits for happens with the queue lock
 * held, so its single condition cannot miss a wakeup.
 */

use super::config::PoolConfig;
use super::handle::{CompletionHandle, Task, WorkItem};
use crate::core::errors::{SyncError, SyncResult};
use crate::core::limits::DISPATCHER_THREAD_NAME;
use crate::core::sync::deadline::{self, Deadline};
use crate::monitoring::span_task;
use ahash::AHashSet;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, instrument};

struct Slot<T> {
    item: Option<Arc<WorkItem<T>>>,
    closed: bool,
}

struct Mailbox<T> {
    worker_id: u64,
    slot: Mutex<Slot<T>>,
    ready: Condvar,
}

impl<T> Mailbox<T> {
    fn new(worker_id: u64) -> Self {
        Self {
            worker_id,
            slot: Mutex::new(Slot {
                item: None,
                closed: false,
            }),
            ready: Condvar::new(),
        }
    }
}

struct QueueState<T> {
    work: VecDeque<Arc<WorkItem<T>>>,
    shutdown: bool,
}

struct WorkerSet<T> {
    live: AHashSet<u64>,
    idle: VecDeque<Arc<Mailbox<T>>>,
    next_id: u64,
}

/// Starts a named OS thread running the given body
type SpawnFn = fn(String, Box<dyn FnOnce() + Send + 'static>) -> io::Result<()>;

fn spawn_os_thread(name: String, body: Box<dyn FnOnce() + Send + 'static>) -> io::Result<()> {
    thread::Builder::new().name(name).spawn(body).map(drop)
}

struct Shared<T> {
    config: PoolConfig,
    spawn: SpawnFn,
    queue: Mutex<QueueState<T>>,
    /// Dispatcher wake-up: work queued, a worker idled or retired, shutdown
    dispatch: Condvar,
    /// Signalled when the last worker retires
    terminated: Condvar,
    workers: Mutex<WorkerSet<T>>,
}

/// Future-returning thread pool
///
/// Every task returns `anyhow::Result<T>`; its outcome is read through the
/// `CompletionHandle` returned by `execute`.
///
/// # Example
///
/// ```
/// use pc_sync::{PoolConfig, ThreadPool};
/// use std::time::Duration;
///
/// let pool = ThreadPool::new(PoolConfig::new(2, Duration::from_secs(1))).unwrap();
/// let handle = pool.execute(|| Ok(6 * 7)).unwrap();
/// assert_eq!(handle.get(Some(Duration::from_secs(5))).unwrap(), Some(42));
/// ```
pub struct ThreadPool<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Send + 'static> ThreadPool<T> {
    /// Create the pool and start its dispatcher thread
    pub fn new(config: PoolConfig) -> SyncResult<Self> {
        Self::with_spawner(config, spawn_os_thread)
    }

    /// Create the pool with a custom worker spawner
    pub(crate) fn with_spawner(config: PoolConfig, spawn: SpawnFn) -> SyncResult<Self> {
        config.validate()?;

        let shared = Arc::new(Shared {
            config,
            spawn,
            queue: Mutex::new(QueueState {
                work: VecDeque::new(),
                shutdown: false,
            }),
            dispatch: Condvar::new(),
            terminated: Condvar::new(),
            workers: Mutex::new(WorkerSet {
                live: AHashSet::new(),
                idle: VecDeque::new(),
                next_id: 0,
            }),
        });

        let dispatcher = shared.clone();
        thread::Builder::new()
            .name(DISPATCHER_THREAD_NAME.to_string())
            .spawn(move || dispatcher.dispatch_loop())?;

        info!(
            max_pool_size = shared.config.max_pool_size,
            keep_alive_ms = shared.config.keep_alive.as_millis() as u64,
            "Thread pool started"
        );
        Ok(Self { shared })
    }

    /// Queue `task` and return a handle to its outcome
    pub fn execute<F>(&self, task: F) -> SyncResult<CompletionHandle<T>>
    where
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        let boxed: Task<T> = Box::new(task);
        let item = Arc::new(WorkItem::new(boxed));

        let mut queue = self.shared.queue.lock();
        if queue.shutdown {
            return Err(SyncError::Rejected);
        }
        queue.work.push_back(item.clone());
        self.shared.dispatch.notify_one();

        Ok(CompletionHandle::new(item))
    }
}

impl<T> ThreadPool<T> {
    /// Stop accepting work
    ///
    /// Already queued items still run; workers and the dispatcher exit once
    /// the queue has drained.
    pub fn shutdown(&self) {
        let mut queue = self.shared.queue.lock();
        if queue.shutdown {
            return;
        }
        queue.shutdown = true;
        self.shared.dispatch.notify_one();

        let workers = self.shared.workers.lock();
        for mailbox in &workers.idle {
            mailbox.slot.lock().closed = true;
            mailbox.ready.notify_one();
        }

        info!(
            live = workers.live.len(),
            queued = queue.work.len(),
            "Thread pool shutting down"
        );
    }

    /// Wait until the queue is empty and no worker is alive
    pub fn await_termination(&self, timeout: Option<Duration>) -> bool {
        let deadline = Deadline::start(timeout);
        let mut queue = self.shared.queue.lock();

        loop {
            if queue.work.is_empty() && self.shared.workers.lock().live.is_empty() {
                return true;
            }
            if deadline.is_expired() {
                return false;
            }
            deadline::wait_until(&self.shared.terminated, &mut queue, deadline);
        }
    }

    /// Number of live worker threads
    pub fn pool_size(&self) -> usize {
        self.shared.workers.lock().live.len()
    }

    /// Number of items waiting for a worker
    pub fn queued(&self) -> usize {
        self.shared.queue.lock().work.len()
    }

    /// Whether `shutdown` has been called
    pub fn is_shutdown(&self) -> bool {
        self.shared.queue.lock().shutdown
    }
}

impl<T> Drop for ThreadPool<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<T: Send + 'static> Shared<T> {
    #[instrument(skip_all, name = "dispatcher")]
    fn dispatch_loop(self: Arc<Self>) {
        debug!("Dispatcher started");
        let mut queue = self.queue.lock();

        loop {
            if queue.work.is_empty() {
                if queue.shutdown {
                    break;
                }
                self.dispatch.wait(&mut queue);
                continue;
            }

            let mut workers = self.workers.lock();

            if let Some(mailbox) = workers.idle.pop_front() {
                if let Some(item) = queue.work.pop_front() {
                    let mut slot = mailbox.slot.lock();
                    debug_assert!(slot.item.is_none(), "idle worker already has work");
                    slot.item = Some(item);
                    mailbox.ready.notify_one();
                }
                continue;
            }

            if workers.live.len() < self.config.max_pool_size {
                if let Some(item) = queue.work.pop_front() {
                    self.spawn_worker(&mut workers, item);
                }
                // A failed spawn settles its item without any worker retiring
                if queue.work.is_empty() && workers.live.is_empty() {
                    self.terminated.notify_all();
                }
                continue;
            }

            // Saturated: wait for a worker to idle or retire
            drop(workers);
            self.dispatch.wait(&mut queue);
        }

        debug!("Dispatcher exiting");
    }

    fn spawn_worker(self: &Arc<Self>, workers: &mut WorkerSet<T>, first: Arc<WorkItem<T>>) {
        let worker_id = workers.next_id;
        workers.next_id += 1;

        let mailbox = Arc::new(Mailbox::new(worker_id));
        let shared = self.clone();
        let item = first.clone();
        let spawned = (self.spawn)(
            self.config.thread_name(worker_id),
            Box::new(move || shared.worker_loop(mailbox, item)),
        );

        match spawned {
            Ok(()) => {
                workers.live.insert(worker_id);
                debug!(worker_id, live = workers.live.len(), "Worker spawned");
            }
            Err(err) => {
                error!(worker_id, error = %err, "Failed to spawn worker");
                first.fail(SyncError::from(err));
            }
        }
    }

    fn worker_loop(&self, mailbox: Arc<Mailbox<T>>, first: Arc<WorkItem<T>>) {
        let mut next = Some(first);
        while let Some(item) = next.take() {
            let span = span_task("pool", mailbox.worker_id);
            let status = {
                let _entered = span.enter();
                item.run()
            };
            span.record_outcome(status.as_str());
            drop(span);

            next = self.next_item(&mailbox);
        }
    }

    /// Next item for this worker; `None` means the worker has retired
    fn next_item(&self, mailbox: &Arc<Mailbox<T>>) -> Option<Arc<WorkItem<T>>> {
        {
            let mut queue = self.queue.lock();
            if let Some(item) = queue.work.pop_front() {
                return Some(item);
            }

            let mut workers = self.workers.lock();
            if queue.shutdown {
                self.retire(&mut workers, mailbox.worker_id);
                return None;
            }
            workers.idle.push_back(mailbox.clone());
            self.dispatch.notify_one();
        }

        let deadline = Deadline::start(Some(self.config.keep_alive));
        {
            let mut slot = mailbox.slot.lock();
            loop {
                if let Some(item) = slot.item.take() {
                    return Some(item);
                }
                if slot.closed || deadline.is_expired() {
                    break;
                }
                deadline::wait_until(&mailbox.ready, &mut slot, deadline);
            }
        }

        // Re-check under all three locks before leaving the pool
        let mut queue = self.queue.lock();
        let mut workers = self.workers.lock();
        let mut slot = mailbox.slot.lock();
        if let Some(item) = slot.item.take() {
            return Some(item);
        }
        workers.idle.retain(|idle| !Arc::ptr_eq(idle, mailbox));
        if let Some(item) = queue.work.pop_front() {
            return Some(item);
        }
        slot.closed = true;
        drop(slot);

        self.retire(&mut workers, mailbox.worker_id);
        None
    }

    /// Deregister a worker; caller holds the queue and worker-set locks
    fn retire(&self, workers: &mut WorkerSet<T>, worker_id: u64) {
        workers.live.remove(&worker_id);
        debug!(worker_id, live = workers.live.len(), "Worker retired");

        // A slot opened up for the dispatcher
        self.dispatch.notify_one();
        if workers.live.is_empty() {
            self.terminated.notify_all();
        }
    }
}
