/*!
 * Bounded Lazy (lock-based)
 *
 * Single-flight computation of a value that may be handed out a fixed
 * number of times before it is recomputed.
 *
 * # Design
 *
 * One mutex guards a four-state cell. The computing thread runs the factory
 * outside the lock and publishes the outcome with `notify_all`, so every
 * waiter re-evaluates the cell. A waiter that wakes to find the cell neither
 * computing nor holding uses (the last use was taken while it slept) becomes
 * the next computer itself.
 */

use super::deadline::{self, Deadline};
use crate::core::errors::{SyncError, SyncResult};
use parking_lot::{Condvar, Mutex};
use std::time::Duration;
use tracing::trace;

/// State of the cached cell
enum Cell<T> {
    Unset,
    Computing,
    Ready { value: T, remaining: usize },
    Failed(SyncError),
}

/// Lock-based bounded lazy value
///
/// # Example
///
/// ```
/// use pc_sync::BoundedLazy;
/// use std::time::Duration;
///
/// let lazy = BoundedLazy::new(|| Ok(7), 2).unwrap();
/// assert_eq!(lazy.get(Some(Duration::from_secs(1))).unwrap(), Some(7));
/// ```
pub struct BoundedLazy<T, F> {
    factory: F,
    max_uses: usize,
    cell: Mutex<Cell<T>>,
    computed: Condvar,
}

impl<T, F> BoundedLazy<T, F>
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
            cell: Mutex::new(Cell::Unset),
            computed: Condvar::new(),
        })
    }

    /// Retrieve the value, computing it if no uses are left
    ///
    /// Returns `Ok(None)` if another thread is computing and the timeout
    /// elapses first; the computation itself is not disturbed. Returns the
    /// cached error once the factory has failed.
    pub fn get(&self, timeout: Option<Duration>) -> SyncResult<Option<T>> {
        let deadline = Deadline::start(timeout);
        let mut cell = self.cell.lock();

        loop {
            match &mut *cell {
                Cell::Failed(err) => return Err(err.clone()),
                Cell::Ready { value, remaining } if *remaining > 0 => {
                    *remaining -= 1;
                    let value = value.clone();
                    if *remaining == 0 {
                        *cell = Cell::Unset;
                    }
                    return Ok(Some(value));
                }
                Cell::Computing => {
                    if deadline.is_expired() {
                        return Ok(None);
                    }
                    deadline::wait_until(&self.computed, &mut cell, deadline);
                }
                Cell::Unset | Cell::Ready { .. } => {
                    *cell = Cell::Computing;
                    break;
                }
            }
        }
        drop(cell);

        trace!("bounded lazy computing value");
        let mut reset = ResetOnUnwind {
            lazy: self,
            armed: true,
        };
        let outcome = (self.factory)();
        reset.armed = false;

        let mut cell = self.cell.lock();
        let result = match outcome {
            Ok(value) => {
                let remaining = self.max_uses - 1;
                *cell = if remaining == 0 {
                    Cell::Unset
                } else {
                    Cell::Ready {
                        value: value.clone(),
                        remaining,
                    }
                };
                Ok(Some(value))
            }
            Err(err) => {
                let err = SyncError::factory(err);
                *cell = Cell::Failed(err.clone());
                Err(err)
            }
        };
        self.computed.notify_all();
        result
    }

    /// Maximum number of retrievals per computed value
    pub fn max_uses(&self) -> usize {
        self.max_uses
    }

    /// Whether the factory has failed and the error is cached
    pub fn is_failed(&self) -> bool {
        matches!(*self.cell.lock(), Cell::Failed(_))
    }
}

/// Puts the cell back to `Unset` if the factory unwinds
struct ResetOnUnwind<'a, T, F> {
    lazy: &'a BoundedLazy<T, F>,
    armed: bool,
}

impl<T, F> Drop for ResetOnUnwind<'_, T, F> {
    fn drop(&mut self) {
        if self.armed {
            *self.lazy.cell.lock() = Cell::Unset;
            self.lazy.computed.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    const AMPLE: Option<Duration> = Some(Duration::from_secs(5));

    #[test]
    fn test_zero_uses_rejected() {
        let result = BoundedLazy::new(|| Ok(1), 0);
        assert!(matches!(result, Err(SyncError::InvalidConfig(_))));
    }

    #[test]
    fn test_recomputes_after_uses_exhausted() {
        let calls = AtomicUsize::new(0);
        let lazy = BoundedLazy::new(
            || Ok(7 + calls.fetch_add(1, Ordering::SeqCst) as i32 * 100),
            2,
        )
        .unwrap();

        assert_eq!(lazy.get(AMPLE).unwrap(), Some(7));
        assert_eq!(lazy.get(AMPLE).unwrap(), Some(7));
        assert_eq!(lazy.get(AMPLE).unwrap(), Some(107));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_single_use_always_recomputes() {
        let calls = AtomicUsize::new(0);
        let lazy = BoundedLazy::new(|| Ok(calls.fetch_add(1, Ordering::SeqCst)), 1).unwrap();

        assert_eq!(lazy.get(AMPLE).unwrap(), Some(0));
        assert_eq!(lazy.get(AMPLE).unwrap(), Some(1));
        assert_eq!(lazy.get(AMPLE).unwrap(), Some(2));
    }

    #[test]
    fn test_failure_is_cached() {
        let calls = AtomicUsize::new(0);
        let lazy = BoundedLazy::new(
            || -> anyhow::Result<u32> {
                calls.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("factory exploded")
            },
            3,
        )
        .unwrap();

        let errors: Vec<_> = (0..3).map(|_| lazy.get(AMPLE).unwrap_err()).collect();
        for err in &errors {
            assert!(err.to_string().contains("factory exploded"));
        }
        // Every caller sees the one cached failure
        match (&errors[0], &errors[2]) {
            (SyncError::FactoryFailed(a), SyncError::FactoryFailed(b)) => {
                assert!(Arc::ptr_eq(a, b));
            }
            _ => panic!("expected factory errors"),
        }
        assert!(lazy.is_failed());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_waiter_times_out_while_computing() {
        let lazy = Arc::new(
            BoundedLazy::new(
                || {
                    thread::sleep(Duration::from_millis(300));
                    Ok(42)
                },
                5,
            )
            .unwrap(),
        );

        let computer = {
            let lazy = lazy.clone();
            thread::spawn(move || lazy.get(AMPLE).unwrap())
        };
        thread::sleep(Duration::from_millis(50));

        // Computation in flight: a short wait gives up, an ample one succeeds
        assert_eq!(lazy.get(Some(Duration::from_millis(20))).unwrap(), None);
        assert_eq!(lazy.get(AMPLE).unwrap(), Some(42));
        assert_eq!(computer.join().unwrap(), Some(42));
    }

    #[test]
    fn test_concurrent_single_flight() {
        const USES: usize = 4;
        const THREADS: usize = 16;

        let calls = Arc::new(AtomicUsize::new(0));
        let lazy = {
            let calls = calls.clone();
            Arc::new(
                BoundedLazy::new(
                    move || {
                        thread::sleep(Duration::from_millis(5));
                        Ok(calls.fetch_add(1, Ordering::SeqCst))
                    },
                    USES,
                )
                .unwrap(),
            )
        };

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let lazy = lazy.clone();
                thread::spawn(move || lazy.get(None).unwrap().unwrap())
            })
            .collect();

        let mut seen = vec![0usize; THREADS];
        for handle in handles {
            seen[handle.join().unwrap()] += 1;
        }

        assert_eq!(calls.load(Ordering::SeqCst), THREADS.div_ceil(USES));
        assert!(seen.iter().all(|&n| n == 0 || n == USES));
    }

    #[test]
    fn test_panicking_factory_lets_waiters_recompute() {
        let calls = Arc::new(AtomicUsize::new(0));
        let lazy = {
            let calls = calls.clone();
            Arc::new(
                BoundedLazy::new(
                    move || {
                        if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                            thread::sleep(Duration::from_millis(50));
                            panic!("first computation panics");
                        }
                        Ok(9)
                    },
                    2,
                )
                .unwrap(),
            )
        };

        let panicker = {
            let lazy = lazy.clone();
            thread::spawn(move || lazy.get(AMPLE))
        };
        thread::sleep(Duration::from_millis(10));

        assert_eq!(lazy.get(AMPLE).unwrap(), Some(9));
        assert!(panicker.join().is_err());
        assert!(!lazy.is_failed());
    }
}
