/*!
 * Deadline Helper
 *
 * Converts a caller-supplied relative timeout into an absolute point in
 * monotonic time, then answers "time remaining" and "expired" queries.
 *
 * Blocking operations derive one `Deadline` when they start and consult it
 * on every wake, so repeated spurious wakeups can never stretch the total
 * wait beyond the caller's budget.
 */

use parking_lot::{Condvar, MutexGuard};
use std::time::{Duration, Instant};

/// Absolute deadline for a blocking operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    /// Wait forever
    Unbounded,
    /// Wait until this instant
    At(Instant),
}

impl Deadline {
    /// Start a deadline from a relative timeout (`None` = unbounded)
    ///
    /// A timeout too large to represent as an `Instant` is unbounded.
    #[inline]
    pub fn start(timeout: Option<Duration>) -> Self {
        match timeout {
            None => Self::Unbounded,
            Some(timeout) => Instant::now()
                .checked_add(timeout)
                .map_or(Self::Unbounded, Self::At),
        }
    }

    /// Time left before the deadline
    ///
    /// `None` for unbounded deadlines, `Some(Duration::ZERO)` once elapsed.
    #[inline]
    pub fn remaining(&self) -> Option<Duration> {
        match self {
            Self::Unbounded => None,
            Self::At(at) => Some(at.saturating_duration_since(Instant::now())),
        }
    }

    /// Check whether the deadline has passed
    #[inline]
    pub fn is_expired(&self) -> bool {
        is_expired(self.remaining())
    }

    /// The absolute instant, if bounded
    #[inline]
    pub fn instant(&self) -> Option<Instant> {
        match self {
            Self::Unbounded => None,
            Self::At(at) => Some(*at),
        }
    }
}

/// Check whether a remaining budget is used up
#[inline(always)]
pub fn is_expired(remaining: Option<Duration>) -> bool {
    matches!(remaining, Some(d) if d.is_zero())
}

/// Wait once on `cond`, bounded by `deadline`
///
/// Returns `true` if the deadline had passed when the wait returned. A
/// `false` result may still be a spurious wakeup, so callers must re-check
/// their predicate in a loop.
#[inline]
pub fn wait_until<T: ?Sized>(
    cond: &Condvar,
    guard: &mut MutexGuard<'_, T>,
    deadline: Deadline,
) -> bool {
    match deadline {
        Deadline::Unbounded => {
            cond.wait(guard);
            false
        }
        Deadline::At(at) => cond.wait_until(guard, at).timed_out(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_unbounded_never_expires() {
        let deadline = Deadline::start(None);
        assert_eq!(deadline, Deadline::Unbounded);
        assert_eq!(deadline.remaining(), None);
        assert!(!deadline.is_expired());
        assert!(deadline.instant().is_none());
    }

    #[test]
    fn test_zero_timeout_is_expired_immediately() {
        let deadline = Deadline::start(Some(Duration::ZERO));
        assert!(deadline.is_expired());
        assert_eq!(deadline.remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn test_remaining_is_monotonic() {
        let deadline = Deadline::start(Some(Duration::from_millis(100)));

        let first = deadline.remaining().unwrap();
        assert!(first <= Duration::from_millis(100));
        assert!(first > Duration::from_millis(50));

        thread::sleep(Duration::from_millis(20));
        let second = deadline.remaining().unwrap();
        assert!(second <= first);

        thread::sleep(Duration::from_millis(100));
        assert_eq!(deadline.remaining(), Some(Duration::ZERO));
        assert!(deadline.is_expired());
    }

    #[test]
    fn test_huge_timeout_is_unbounded() {
        let deadline = Deadline::start(Some(Duration::MAX));
        assert_eq!(deadline, Deadline::Unbounded);
    }

    #[test]
    fn test_is_expired_on_remaining() {
        assert!(is_expired(Some(Duration::ZERO)));
        assert!(!is_expired(Some(Duration::from_nanos(1))));
        assert!(!is_expired(None));
    }

    #[test]
    fn test_wait_until_times_out() {
        let mutex = Mutex::new(());
        let cond = Condvar::new();
        let deadline = Deadline::start(Some(Duration::from_millis(30)));
        let start = Instant::now();

        let mut guard = mutex.lock();
        while !wait_until(&cond, &mut guard, deadline) {}

        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_wait_until_woken() {
        let pair = Arc::new((Mutex::new(false), Condvar::new()));
        let pair_clone = pair.clone();

        let handle = thread::spawn(move || {
            let (flag, cond) = &*pair_clone;
            let deadline = Deadline::start(Some(Duration::from_secs(2)));
            let mut guard = flag.lock();
            while !*guard {
                if wait_until(cond, &mut guard, deadline) {
                    return false;
                }
            }
            true
        });

        thread::sleep(Duration::from_millis(20));
        *pair.0.lock() = true;
        pair.1.notify_all();

        assert!(handle.join().unwrap());
    }
}
