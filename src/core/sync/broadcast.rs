/*!
 * Broadcast Box
 *
 * Delivers one message to every thread waiting at the moment of delivery,
 * in "generations". Threads that arrive after a delivery enter the next
 * generation and never see the earlier message.
 *
 * # Design: Numbered Generations Under One Lock
 *
 * The current generation is just a counter plus its entrant count. A
 * delivery stamps the message on the current generation, moves it into the
 * `delivered` table with one pending read per entrant, and opens the next
 * generation, all under the mutex. Receivers remember the number of the
 * generation they entered; the last reader removes the table entry.
 */

use super::deadline::{self, Deadline};
use ahash::AHashMap;
use parking_lot::{Condvar, Mutex};
use std::time::Duration;
use tracing::trace;

/// A delivered generation still being read
struct Delivery<T> {
    message: T,
    unread: usize,
}

struct Inner<T> {
    generation: u64,
    entrants: usize,
    delivered: AHashMap<u64, Delivery<T>>,
}

/// Generational broadcast box
pub struct BroadcastBox<T> {
    inner: Mutex<Inner<T>>,
    delivered: Condvar,
}

impl<T: Clone> BroadcastBox<T> {
    /// Create a box with an empty first generation
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                generation: 0,
                entrants: 0,
                delivered: AHashMap::new(),
            }),
            delivered: Condvar::new(),
        }
    }

    /// Wait for the next delivery
    ///
    /// Returns `None` if no delivery reaches this caller's generation before
    /// the timeout; the caller then leaves the generation so the delivery
    /// count stays exact.
    pub fn receive(&self, timeout: Option<Duration>) -> Option<T> {
        let deadline = Deadline::start(timeout);
        let mut inner = self.inner.lock();

        let entered = inner.generation;
        inner.entrants += 1;

        loop {
            if let Some(message) = inner.read(entered) {
                return Some(message);
            }
            if deadline.is_expired() {
                // Not delivered, so we are still in the current generation
                debug_assert_eq!(inner.generation, entered);
                inner.entrants -= 1;
                return None;
            }
            deadline::wait_until(&self.delivered, &mut inner, deadline);
        }
    }

    /// Deliver `message` to every current waiter
    ///
    /// Returns how many threads were in the delivered generation; exactly
    /// that many `receive` calls will return this message.
    pub fn deliver_to_all(&self, message: T) -> usize {
        let mut inner = self.inner.lock();

        let generation = inner.generation;
        let receivers = std::mem::take(&mut inner.entrants);
        inner.generation = generation.wrapping_add(1);

        if receivers > 0 {
            inner.delivered.insert(
                generation,
                Delivery {
                    message,
                    unread: receivers,
                },
            );
            self.delivered.notify_all();
        }

        trace!(generation, receivers, "broadcast delivered");
        receivers
    }

    /// Number of threads waiting in the current generation
    pub fn waiting(&self) -> usize {
        self.inner.lock().entrants
    }
}

impl<T: Clone> Inner<T> {
    fn read(&mut self, generation: u64) -> Option<T> {
        let delivery = self.delivered.get_mut(&generation)?;
        delivery.unread -= 1;

        if delivery.unread == 0 {
            self.delivered.remove(&generation).map(|d| d.message)
        } else {
            Some(delivery.message.clone())
        }
    }
}

impl<T: Clone> Default for BroadcastBox<T> {
    fn default() -> Self {
        Self::new()
    }
}
