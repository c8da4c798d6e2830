/*!
 * Lock-Free Queue
 * Unbounded MPMC FIFO (Michael-Scott) using epoch-based reclamation
 */

use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use std::mem::MaybeUninit;
use std::sync::atomic::Ordering;

/// List node; the payload is uninitialized for the sentinel
struct Node<T> {
    data: MaybeUninit<T>,
    next: Atomic<Node<T>>,
}

impl<T> Node<T> {
    fn sentinel() -> Self {
        Self {
            data: MaybeUninit::uninit(),
            next: Atomic::null(),
        }
    }
}

/// Unbounded lock-free FIFO
///
/// `head` always points at a sentinel whose payload has already been moved
/// out (or never existed); the first live value sits in `head.next`. `tail`
/// points at the last node or lags one step behind it, and any thread that
/// sees it lagging helps swing it forward.
///
/// # Safety
///
/// Unlinked nodes are handed to crossbeam-epoch and freed only after every
/// thread pinned at unlink time has unpinned, so a concurrent reader never
/// dereferences freed memory and a recycled address cannot cause ABA.
pub struct LockFreeQueue<T> {
    head: Atomic<Node<T>>,
    tail: Atomic<Node<T>>,
}

unsafe impl<T: Send> Send for LockFreeQueue<T> {}
unsafe impl<T: Send> Sync for LockFreeQueue<T> {}

impl<T> LockFreeQueue<T> {
    /// Create an empty queue
    pub fn new() -> Self {
        let queue = Self {
            head: Atomic::null(),
            tail: Atomic::null(),
        };

        // Not yet shared with any other thread
        let sentinel = Owned::new(Node::sentinel());
        unsafe {
            let guard = epoch::unprotected();
            let sentinel = sentinel.into_shared(guard);
            queue.head.store(sentinel, Ordering::Relaxed);
            queue.tail.store(sentinel, Ordering::Relaxed);
        }

        queue
    }

    /// Append a value at the tail
    pub fn enqueue(&self, value: T) {
        let guard = &epoch::pin();
        let new = Owned::new(Node {
            data: MaybeUninit::new(value),
            next: Atomic::null(),
        })
        .into_shared(guard);

        loop {
            let tail = self.tail.load(Ordering::Acquire, guard);
            // Tail is never null and cannot be freed while we are pinned
            let tail_ref = unsafe { tail.deref() };
            let next = tail_ref.next.load(Ordering::Acquire, guard);

            if !next.is_null() {
                // Tail lags the real end: help advance it, then retry
                let _ = self.tail.compare_exchange(
                    tail,
                    next,
                    Ordering::Release,
                    Ordering::Relaxed,
                    guard,
                );
                continue;
            }

            if tail_ref
                .next
                .compare_exchange(
                    Shared::null(),
                    new,
                    Ordering::Release,
                    Ordering::Relaxed,
                    guard,
                )
                .is_ok()
            {
                // Best effort: a failure means another thread already helped
                let _ = self.tail.compare_exchange(
                    tail,
                    new,
                    Ordering::Release,
                    Ordering::Relaxed,
                    guard,
                );
                return;
            }
        }
    }

    /// Remove the oldest value, or `None` if the queue is empty
    pub fn dequeue(&self) -> Option<T> {
        let guard = &epoch::pin();
        self.pop(guard)
    }

    /// Check whether the queue currently holds no values
    ///
    /// Only a snapshot: concurrent producers may change it immediately.
    pub fn is_empty(&self) -> bool {
        let guard = &epoch::pin();
        let head = self.head.load(Ordering::Acquire, guard);
        unsafe { head.deref() }
            .next
            .load(Ordering::Acquire, guard)
            .is_null()
    }

    fn pop(&self, guard: &Guard) -> Option<T> {
        loop {
            let head = self.head.load(Ordering::Acquire, guard);
            let next = unsafe { head.deref() }.next.load(Ordering::Acquire, guard);
            let next_ref = unsafe { next.as_ref() }?;

            if self
                .head
                .compare_exchange(head, next, Ordering::Release, Ordering::Relaxed, guard)
                .is_ok()
            {
                // Never leave tail pointing at a node we are about to retire
                let tail = self.tail.load(Ordering::Relaxed, guard);
                if head == tail {
                    let _ = self.tail.compare_exchange(
                        tail,
                        next,
                        Ordering::Release,
                        Ordering::Relaxed,
                        guard,
                    );
                }

                // Winning the head CAS grants exclusive ownership of next's
                // payload; next becomes the new sentinel.
                unsafe {
                    guard.defer_destroy(head);
                    return Some(next_ref.data.assume_init_read());
                }
            }
        }
    }
}

impl<T> Default for LockFreeQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for LockFreeQueue<T> {
    fn drop(&mut self) {
        unsafe {
            // Exclusive access: no other thread can hold a reference
            let guard = epoch::unprotected();
            while self.pop(guard).is_some() {}

            let sentinel = self.head.load(Ordering::Relaxed, guard);
            drop(sentinel.into_owned());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::collections::{HashSet, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_empty_queue() {
        let queue = LockFreeQueue::<u32>::new();
        assert!(queue.is_empty());
        assert_eq!(queue.dequeue(), None);
    }

    #[test]
    fn test_fifo_order() {
        let queue = LockFreeQueue::new();
        for i in 0..10 {
            queue.enqueue(i);
        }
        assert!(!queue.is_empty());

        let drained: Vec<_> = std::iter::from_fn(|| queue.dequeue()).collect();
        assert_eq!(drained, (0..10).collect::<Vec<_>>());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_drop_releases_remaining_values() {
        struct Tracked(Arc<AtomicUsize>);
        impl Drop for Tracked {
            fn drop(&mut self) {
                self.0.fetch_add(1, AtomicOrdering::SeqCst);
            }
        }

        let drops = Arc::new(AtomicUsize::new(0));
        {
            let queue = LockFreeQueue::new();
            for _ in 0..5 {
                queue.enqueue(Tracked(drops.clone()));
            }
            drop(queue.dequeue());
            assert_eq!(drops.load(AtomicOrdering::SeqCst), 1);
        }
        assert_eq!(drops.load(AtomicOrdering::SeqCst), 5);
    }

    #[test]
    fn test_concurrent_producers_consumers() {
        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 5_000;

        let queue = Arc::new(LockFreeQueue::new());
        let consumed = Arc::new(AtomicUsize::new(0));

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let queue = queue.clone();
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        queue.enqueue((p, i));
                    }
                })
            })
            .collect();

        let consumers: Vec<_> = (0..PRODUCERS)
            .map(|_| {
                let queue = queue.clone();
                let consumed = consumed.clone();
                thread::spawn(move || {
                    let mut taken = Vec::new();
                    while consumed.load(AtomicOrdering::SeqCst) < PRODUCERS * PER_PRODUCER {
                        match queue.dequeue() {
                            Some(item) => {
                                consumed.fetch_add(1, AtomicOrdering::SeqCst);
                                taken.push(item);
                            }
                            None => thread::yield_now(),
                        }
                    }
                    taken
                })
            })
            .collect();

        for handle in producers {
            handle.join().unwrap();
        }

        let mut all = HashSet::new();
        for handle in consumers {
            let taken = handle.join().unwrap();

            // Per-producer order is preserved within each consumer's view
            let mut last = vec![None; PRODUCERS];
            for &(p, i) in &taken {
                if let Some(prev) = last[p] {
                    assert!(i > prev, "producer {} went backwards: {} after {}", p, i, prev);
                }
                last[p] = Some(i);
            }

            for item in taken {
                assert!(all.insert(item), "value {:?} dequeued twice", item);
            }
        }

        assert_eq!(all.len(), PRODUCERS * PER_PRODUCER);
        assert!(queue.is_empty());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Enqueue(u16),
        Dequeue,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![any::<u16>().prop_map(Op::Enqueue), Just(Op::Dequeue)]
    }

    proptest! {
        #[test]
        fn prop_matches_vecdeque_model(ops in prop::collection::vec(op_strategy(), 0..200)) {
            let queue = LockFreeQueue::new();
            let mut model = VecDeque::new();

            for op in ops {
                match op {
                    Op::Enqueue(v) => {
                        queue.enqueue(v);
                        model.push_back(v);
                    }
                    Op::Dequeue => {
                        prop_assert_eq!(queue.dequeue(), model.pop_front());
                    }
                }
                prop_assert_eq!(queue.is_empty(), model.is_empty());
            }
        }
    }
}
