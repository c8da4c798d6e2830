/*!
 * Simple Thread Pool
 *
 * Fire-and-forget executor. A submission goes straight to an idle worker,
 * or to a freshly spawned one while the pool is below its maximum; at
 * capacity the submitter waits for a worker to free up.
 *
 * # Design: Mailbox Per Worker
 *
 * Every worker owns a one-slot mailbox (mutex + condvar). Idle workers sit
 * in a FIFO list of mailboxes guarded by the pool mutex. Handing over work
 * means popping a mailbox and filling its slot while the pool mutex is
 * still held, so a worker that timed out can tell, under the same two
 * locks, whether a job raced in before it retires.
 *
 * Lock order: pool state → mailbox.
 */

use super::config::PoolConfig;
use super::panic_message;
use crate::core::errors::{SyncError, SyncResult};
use crate::core::sync::deadline::{self, Deadline};
use crate::monitoring::span_task;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Slot {
    job: Option<Job>,
    closed: bool,
}

struct Mailbox {
    worker_id: u64,
    slot: Mutex<Slot>,
    ready: Condvar,
}

impl Mailbox {
    fn new(worker_id: u64) -> Self {
        Self {
            worker_id,
            slot: Mutex::new(Slot {
                job: None,
                closed: false,
            }),
            ready: Condvar::new(),
        }
    }

    /// Fill the slot and wake the owner; caller holds the pool lock
    fn deliver(&self, job: Job) {
        let mut slot = self.slot.lock();
        debug_assert!(slot.job.is_none(), "idle worker already has a job");
        slot.job = Some(job);
        self.ready.notify_one();
    }

    fn close(&self) {
        self.slot.lock().closed = true;
        self.ready.notify_one();
    }
}

struct PoolState {
    live: usize,
    idle: VecDeque<Arc<Mailbox>>,
    shutdown: bool,
    next_id: u64,
}

struct Shared {
    config: PoolConfig,
    state: Mutex<PoolState>,
    /// Signalled when a worker joins the idle list, and on shutdown
    worker_freed: Condvar,
    /// Signalled when the live count drops to zero
    terminated: Condvar,
}

/// Fire-and-forget thread pool
///
/// # Example
///
/// ```
/// use pc_sync::{PoolConfig, SimpleThreadPool};
/// use std::time::Duration;
///
/// let pool = SimpleThreadPool::new(PoolConfig::new(2, Duration::from_secs(1))).unwrap();
/// assert!(pool.execute(|| println!("hello"), None).unwrap());
/// pool.shutdown();
/// assert!(pool.await_termination(Some(Duration::from_secs(5))));
/// ```
pub struct SimpleThreadPool {
    shared: Arc<Shared>,
}

impl SimpleThreadPool {
    /// Create an empty pool; workers are spawned on demand
    pub fn new(config: PoolConfig) -> SyncResult<Self> {
        config.validate()?;
        info!(
            max_pool_size = config.max_pool_size,
            keep_alive_ms = config.keep_alive.as_millis() as u64,
            "Simple thread pool created"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(PoolState {
                    live: 0,
                    idle: VecDeque::new(),
                    shutdown: false,
                    next_id: 0,
                }),
                worker_freed: Condvar::new(),
                terminated: Condvar::new(),
            }),
        })
    }

    /// Run `task` on a pool thread
    ///
    /// Returns `Ok(false)` if the pool stayed saturated for the whole
    /// timeout, `Err(Rejected)` if the pool is (or becomes, while waiting)
    /// shut down.
    pub fn execute<F>(&self, task: F, timeout: Option<Duration>) -> SyncResult<bool>
    where
        F: FnOnce() + Send + 'static,
    {
        let deadline = Deadline::start(timeout);
        let job: Job = Box::new(task);
        let mut state = self.shared.state.lock();

        loop {
            if state.shutdown {
                return Err(SyncError::Rejected);
            }

            if let Some(mailbox) = state.idle.pop_front() {
                mailbox.deliver(job);
                return Ok(true);
            }

            if state.live < self.shared.config.max_pool_size {
                let worker_id = state.next_id;
                state.next_id += 1;
                state.live += 1;

                return match Shared::spawn_worker(&self.shared, worker_id, job) {
                    Ok(()) => {
                        debug!(worker_id, live = state.live, "Worker spawned");
                        Ok(true)
                    }
                    Err(err) => {
                        state.live -= 1;
                        if state.live == 0 {
                            self.shared.terminated.notify_all();
                        }
                        Err(err)
                    }
                };
            }

            if deadline.is_expired() {
                return Ok(false);
            }
            deadline::wait_until(&self.shared.worker_freed, &mut state, deadline);
        }
    }

    /// Stop accepting work
    ///
    /// Idle workers are told to exit, busy ones exit after their current
    /// task, and submitters blocked in `execute` return `Err(Rejected)`.
    pub fn shutdown(&self) {
        let mut state = self.shared.state.lock();
        if state.shutdown {
            return;
        }
        state.shutdown = true;

        for mailbox in &state.idle {
            mailbox.close();
        }
        self.shared.worker_freed.notify_all();

        info!(live = state.live, idle = state.idle.len(), "Simple thread pool shutting down");
    }

    /// Wait until no worker is alive
    pub fn await_termination(&self, timeout: Option<Duration>) -> bool {
        let deadline = Deadline::start(timeout);
        let mut state = self.shared.state.lock();

        loop {
            if state.live == 0 {
                return true;
            }
            if deadline.is_expired() {
                return false;
            }
            deadline::wait_until(&self.shared.terminated, &mut state, deadline);
        }
    }

    /// Number of live worker threads
    pub fn pool_size(&self) -> usize {
        self.shared.state.lock().live
    }

    /// Number of workers waiting for a job
    pub fn idle_count(&self) -> usize {
        self.shared.state.lock().idle.len()
    }

    /// Whether `shutdown` has been called
    pub fn is_shutdown(&self) -> bool {
        self.shared.state.lock().shutdown
    }
}

impl Drop for SimpleThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Shared {
    fn spawn_worker(shared: &Arc<Self>, worker_id: u64, first: Job) -> SyncResult<()> {
        let name = shared.config.thread_name(worker_id);
        let mailbox = Arc::new(Mailbox::new(worker_id));
        let shared = shared.clone();

        thread::Builder::new()
            .name(name)
            .spawn(move || shared.worker_loop(mailbox, first))?;
        Ok(())
    }

    fn worker_loop(&self, mailbox: Arc<Mailbox>, first: Job) {
        let mut next = Some(first);
        while let Some(job) = next.take() {
            run_job(mailbox.worker_id, job);
            next = self.next_job(&mailbox);
        }
    }

    /// Park in the idle list until a job arrives; `None` means retire
    fn next_job(&self, mailbox: &Arc<Mailbox>) -> Option<Job> {
        {
            let mut state = self.state.lock();
            if state.shutdown {
                self.retire(&mut state, mailbox.worker_id);
                return None;
            }
            state.idle.push_back(mailbox.clone());
            self.worker_freed.notify_one();
        }

        let deadline = Deadline::start(Some(self.config.keep_alive));
        {
            let mut slot = mailbox.slot.lock();
            loop {
                if let Some(job) = slot.job.take() {
                    return Some(job);
                }
                if slot.closed || deadline.is_expired() {
                    break;
                }
                deadline::wait_until(&mailbox.ready, &mut slot, deadline);
            }
        }

        // Re-check under both locks: a submitter may have popped this mailbox
        // between the timeout and now
        let mut state = self.state.lock();
        let mut slot = mailbox.slot.lock();
        if let Some(job) = slot.job.take() {
            return Some(job);
        }
        slot.closed = true;
        drop(slot);

        state.idle.retain(|idle| !Arc::ptr_eq(idle, mailbox));
        self.retire(&mut state, mailbox.worker_id);
        None
    }

    fn retire(&self, state: &mut PoolState, worker_id: u64) {
        state.live -= 1;
        debug!(worker_id, live = state.live, "Worker retired");
        if state.live == 0 {
            self.terminated.notify_all();
        }
    }
}

fn run_job(worker_id: u64, job: Job) {
    let span = span_task("simple", worker_id);
    let _entered = span.enter();

    match catch_unwind(AssertUnwindSafe(job)) {
        Ok(()) => span.record_outcome("completed"),
        Err(payload) => {
            span.record_outcome("panicked");
            warn!(
                worker_id,
                panic = %panic_message(&*payload),
                "Task panicked; worker continues"
            );
        }
    }
}
