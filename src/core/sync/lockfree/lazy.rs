/*!
 * Bounded Lazy (lock-free)
 *
 * Same contract as the lock-based `BoundedLazy`, but the cell is one atomic
 * reference swapped with CAS and nobody ever sleeps on a condition. Threads
 * that find a computation in flight back off (spin, yield, short sleeps)
 * until the state moves on.
 *
 * ## States
 *
 * ```text
 *   Unset ──CAS──▶ Computing ──store──▶ Ready(value, uses) ──last use──▶ Unset
 *                      │
 *                      └──store──▶ Failed (terminal)
 * ```
 *
 * Every state transition replaces the `Arc`, so a CAS against an observed
 * snapshot fails if anything happened in between.
 */

use crate::core::errors::{SyncError, SyncResult};
use crate::core::sync::spinwait::Backoff;
use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::trace;

enum Slot<T> {
    Unset,
    Computing,
    Ready { value: T, uses: AtomicUsize },
    Failed(SyncError),
}

/// Lock-free bounded lazy value
///
/// # When to Use
///
/// ✅ **Use when**:
/// - The factory is fast relative to the retrieval rate
/// - Callers must never block on a mutex
///
/// ❌ **Don't use when**:
/// - The factory is slow (waiters burn CPU while backing off)
/// - Callers need a timeout; use the lock-based `BoundedLazy`
pub struct SafeBoundedLazy<T, F> {
    factory: F,
    max_uses: usize,
    state: ArcSwap<Slot<T>>,
}

impl<T, F> SafeBoundedLazy<T, F>
where
    T: Clone,
    F: Fn() -> anyhow::Result<T>,
{
    /// Create a lazy whose values may each be retrieved `max_uses` times
    pub fn new(factory: F, max_uses: usize) -> SyncResult<Self> {
        if max_uses == 0 {
            return Err(SyncError::InvalidConfig(
                "bounded lazy needs at least one use per value".into(),
            ));
        }

        Ok(Self {
            factory,
            max_uses,
            state: ArcSwap::from_pointee(Slot::Unset),
        })
    }

    /// Retrieve the value, computing it if no uses are left
    pub fn get(&self) -> SyncResult<T> {
        let mut backoff = Backoff::new();

        loop {
            let observed = self.state.load_full();

            match &*observed {
                Slot::Failed(err) => return Err(err.clone()),
                Slot::Unset => {
                    if self.try_transition(&observed, Slot::Computing) {
                        return self.compute();
                    }
                }
                Slot::Computing => backoff.snooze(),
                Slot::Ready { value, uses } => {
                    if let Some(left) = take_use(uses) {
                        if left == 0 {
                            // Last use of this generation: let the next caller recompute
                            self.try_transition(&observed, Slot::Unset);
                        }
                        return Ok(value.clone());
                    }

                    // Exhausted but not yet reset: help whoever took the last use
                    self.try_transition(&observed, Slot::Unset);
                }
            }
        }
    }

    /// Maximum number of retrievals per computed value
    pub fn max_uses(&self) -> usize {
        self.max_uses
    }

    /// Whether the factory has failed and the error is cached
    pub fn is_failed(&self) -> bool {
        matches!(**self.state.load(), Slot::Failed(_))
    }

    /// Run the factory; only the thread that won `Unset -> Computing` gets here
    fn compute(&self) -> SyncResult<T> {
        trace!("lock-free bounded lazy computing value");
        let mut reset = ResetOnUnwind {
            state: &self.state,
            armed: true,
        };
        let outcome = (self.factory)();
        reset.armed = false;

        match outcome {
            Ok(value) => {
                // The computing thread keeps one use for itself
                let left = self.max_uses - 1;
                if left == 0 {
                    self.state.store(Arc::new(Slot::Unset));
                } else {
                    self.state.store(Arc::new(Slot::Ready {
                        value: value.clone(),
                        uses: AtomicUsize::new(left),
                    }));
                }
                Ok(value)
            }
            Err(err) => {
                let err = SyncError::factory(err);
                self.state.store(Arc::new(Slot::Failed(err.clone())));
                Err(err)
            }
        }
    }

    /// CAS the state from the observed snapshot to `next`
    fn try_transition(&self, observed: &Arc<Slot<T>>, next: Slot<T>) -> bool {
        let previous = self.state.compare_and_swap(observed, Arc::new(next));
        Arc::ptr_eq(&*previous, observed)
    }
}

/// Decrement the use counter; returns the uses left, or `None` if exhausted
fn take_use(uses: &AtomicUsize) -> Option<usize> {
    let mut current = uses.load(Ordering::Acquire);
    loop {
        if current == 0 {
            return None;
        }
        match uses.compare_exchange_weak(
            current,
            current - 1,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => return Some(current - 1),
            Err(actual) => current = actual,
        }
    }
}

/// Puts the state back to `Unset` if the factory unwinds
struct ResetOnUnwind<'a, T> {
    state: &'a ArcSwap<Slot<T>>,
    armed: bool,
}

impl<T> Drop for ResetOnUnwind<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            self.state.store(Arc::new(Slot::Unset));
        }
    }
}
