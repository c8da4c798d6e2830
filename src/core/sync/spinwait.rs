/*!
 * Adaptive Backoff for Spinning Waiters
 *
 * Lock-free waiters never sleep on a condition, so they need a polite way
 * to poll. The backoff runs in three phases:
 *
 * 1. **Tight spin phase** (0-10 iterations): Just `spin_loop()` hint
 * 2. **Yield phase** (10-50 iterations): `yield_now()` every iteration
 * 3. **Park phase** (50+ iterations): Exponentially increasing sleep, capped
 */

use crate::core::limits::{
    BACKOFF_INITIAL_SLEEP, BACKOFF_MAX_SLEEP, SPIN_PHASE_LIMIT, YIELD_PHASE_LIMIT,
};
use std::thread;
use std::time::Duration;

/// Exponential backoff state for one waiting thread
///
/// Create one per wait and call [`Backoff::snooze`] each time the awaited
/// state is still unchanged. Never shared between threads.
#[derive(Debug)]
pub struct Backoff {
    step: u32,
    sleep: Duration,
}

impl Backoff {
    /// Create a fresh backoff starting in the spin phase
    #[inline]
    pub fn new() -> Self {
        Self {
            step: 0,
            sleep: BACKOFF_INITIAL_SLEEP,
        }
    }

    /// Back off once, escalating from spinning to yielding to sleeping
    #[inline]
    pub fn snooze(&mut self) {
        if self.step < SPIN_PHASE_LIMIT {
            std::hint::spin_loop();
        } else if self.step < YIELD_PHASE_LIMIT {
            thread::yield_now();
        } else {
            thread::sleep(self.sleep);
            self.sleep = (self.sleep * 2).min(BACKOFF_MAX_SLEEP);
        }
        self.step = self.step.saturating_add(1);
    }

    /// Start over from the spin phase
    #[inline]
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Whether the backoff has escalated to sleeping
    #[inline]
    pub fn is_parking(&self) -> bool {
        self.step >= YIELD_PHASE_LIMIT
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}
