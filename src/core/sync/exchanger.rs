/*!
 * Exchanger
 * Two-party rendezvous that swaps the values offered by a pair of threads
 */

use super::deadline::{self, Deadline};
use ahash::AHashMap;
use parking_lot::{Condvar, Mutex};
use std::time::Duration;
use tracing::trace;

struct Inner<T> {
    /// Number of the round currently accepting a first offer
    round: u64,
    /// Value parked by the first arrival of `round`
    offer: Option<T>,
    /// Second arrivals' values, waiting for their first arrival to collect
    answers: AHashMap<u64, T>,
}

/// Two-party value exchanger
///
/// Each round is identified by a number, so a waiter from an earlier round
/// still collects its own answer even if later rounds complete before it
/// wakes up.
pub struct Exchanger<T> {
    inner: Mutex<Inner<T>>,
    paired: Condvar,
}

impl<T> Exchanger<T> {
    /// Create an exchanger with no pending offer
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                round: 0,
                offer: None,
                answers: AHashMap::new(),
            }),
            paired: Condvar::new(),
        }
    }

    /// Offer `value` and receive the partner's value
    ///
    /// Returns `None` if no partner arrives before the timeout; the offer is
    /// withdrawn so a later arrival cannot pair with it.
    pub fn exchange(&self, value: T, timeout: Option<Duration>) -> Option<T> {
        let mut inner = self.inner.lock();

        // Second arrival: complete the round and open a fresh one
        if let Some(partner) = inner.offer.take() {
            let round = inner.round;
            inner.answers.insert(round, value);
            inner.round = round.wrapping_add(1);
            self.paired.notify_all();
            trace!(round, "exchange paired");
            return Some(partner);
        }

        // First arrival: park the value and wait for this round's answer
        let deadline = Deadline::start(timeout);
        let round = inner.round;
        inner.offer = Some(value);

        loop {
            if let Some(answer) = inner.answers.remove(&round) {
                return Some(answer);
            }
            if deadline.is_expired() {
                // Unanswered, so the parked offer is still ours
                debug_assert_eq!(inner.round, round);
                inner.offer = None;
                return None;
            }
            deadline::wait_until(&self.paired, &mut inner, deadline);
        }
    }
}

impl<T> Default for Exchanger<T> {
    fn default() -> Self {
        Self::new()
    }
}
