/*!
 * Synchronization Primitives
 *
 * Synchronizers that coordinate OS threads around shared state:
 * - Bounded lazies (lock-based and lock-free) for single-flight reuse
 * - Lock-free Michael-Scott queue
 * - Transfer queue with fire-and-forget and rendezvous sends
 * - Generational broadcast box
 * - Two-party exchanger
 *
 * # Architecture
 *
 * Every blocking primitive guards its state with one `parking_lot::Mutex`
 * and waits on `parking_lot::Condvar`s inside predicate re-check loops
 * bounded by a [`Deadline`]. The lock-free primitives use CAS loops
 * (`crossbeam-epoch`, `arc-swap`) and never sleep on a condition.
 *
 * # Timeouts
 *
 * Blocking operations take `Option<Duration>`: `None` waits forever,
 * `Some(Duration::ZERO)` only inspects the current state.
 */

mod broadcast;
pub mod deadline;
mod exchanger;
mod lazy;
pub mod lockfree;
pub mod spinwait;
mod transfer;

pub use broadcast::BroadcastBox;
pub use deadline::Deadline;
pub use exchanger::Exchanger;
pub use lazy::BoundedLazy;
pub use lockfree::{LockFreeQueue, SafeBoundedLazy};
pub use spinwait::Backoff;
pub use transfer::TransferQueue;
