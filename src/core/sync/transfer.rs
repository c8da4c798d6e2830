/*!
 * Transfer Queue
 *
 * Blocking FIFO with two ways to send:
 * - `put`: fire-and-forget, returns immediately
 * - `transfer`: rendezvous, returns once a taker actually received the value
 *
 * One mutex guards the message list. Takers wait on a shared "available"
 * condition; each `transfer` additionally waits on a private gate that only
 * the thread popping its message signals.
 */

use super::deadline::{self, Deadline};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Private wake-up channel of one `transfer` call
///
/// `consumed` is only written and read with the queue mutex held; the
/// atomic merely makes the gate shareable.
struct Gate {
    cond: Condvar,
    consumed: AtomicBool,
}

impl Gate {
    fn new() -> Self {
        Self {
            cond: Condvar::new(),
            consumed: AtomicBool::new(false),
        }
    }

    fn is_consumed(&self) -> bool {
        self.consumed.load(Ordering::Relaxed)
    }
}

struct Message<T> {
    id: u64,
    value: T,
    gate: Option<Arc<Gate>>,
}

struct Inner<T> {
    messages: VecDeque<Message<T>>,
    next_id: u64,
}

impl<T> Inner<T> {
    fn push(&mut self, value: T, gate: Option<Arc<Gate>>) -> u64 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        self.messages.push_back(Message { id, value, gate });
        id
    }

    /// Pop the oldest message and release its producer, if any
    fn consume(&mut self) -> Option<T> {
        let message = self.messages.pop_front()?;
        if let Some(gate) = message.gate {
            gate.consumed.store(true, Ordering::Relaxed);
            gate.cond.notify_one();
        }
        Some(message.value)
    }

    fn evict(&mut self, id: u64) -> Option<T> {
        let index = self.messages.iter().position(|m| m.id == id)?;
        self.messages.remove(index).map(|m| m.value)
    }
}

/// Blocking transfer queue
///
/// # Example
///
/// ```
/// use pc_sync::TransferQueue;
/// use std::time::Duration;
///
/// let queue = TransferQueue::new();
/// queue.put("hello");
/// assert_eq!(queue.take(Some(Duration::ZERO)), Some("hello"));
/// ```
pub struct TransferQueue<T> {
    inner: Mutex<Inner<T>>,
    available: Condvar,
}

impl<T> TransferQueue<T> {
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                messages: VecDeque::new(),
                next_id: 0,
            }),
            available: Condvar::new(),
        }
    }

    /// Enqueue a value without waiting for it to be taken
    ///
    /// The value stays available to `take` until consumed; it never expires.
    pub fn put(&self, value: T) {
        let mut inner = self.inner.lock();
        inner.push(value, None);
        self.available.notify_one();
    }

    /// Enqueue a value and wait until a taker has received it
    ///
    /// Returns `false` if nobody took it before the timeout; the value is
    /// then withdrawn from the queue and dropped.
    pub fn transfer(&self, value: T, timeout: Option<Duration>) -> bool {
        let deadline = Deadline::start(timeout);
        let gate = Arc::new(Gate::new());

        let mut inner = self.inner.lock();
        let id = inner.push(value, Some(gate.clone()));
        self.available.notify_one();

        loop {
            if gate.is_consumed() {
                return true;
            }
            if deadline.is_expired() {
                let evicted = inner.evict(id);
                debug_assert!(evicted.is_some(), "unconsumed message missing from queue");
                return false;
            }
            deadline::wait_until(&gate.cond, &mut inner, deadline);
        }
    }

    /// Take the oldest value, waiting up to `timeout` for one to arrive
    pub fn take(&self, timeout: Option<Duration>) -> Option<T> {
        let deadline = Deadline::start(timeout);
        let mut inner = self.inner.lock();

        loop {
            if let Some(value) = inner.consume() {
                return Some(value);
            }
            if deadline.is_expired() {
                return None;
            }
            deadline::wait_until(&self.available, &mut inner, deadline);
        }
    }

    /// Take the oldest value if one is queued, without waiting
    pub fn try_take(&self) -> Option<T> {
        self.inner.lock().consume()
    }

    /// Number of queued, unconsumed messages
    pub fn len(&self) -> usize {
        self.inner.lock().messages.len()
    }

    /// Check whether no messages are queued
    pub fn is_empty(&self) -> bool {
        self.inner.lock().messages.is_empty()
    }
}

impl<T> Default for TransferQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
