/*!
 * Lock-Free Synchronization Primitives
 *
 * Non-blocking data structures whose linearization points are CAS operations:
 * - Michael-Scott queue with epoch-based reclamation
 * - Bounded lazy driven by a CAS state machine over an atomic reference
 */

mod lazy;
mod queue;

// Re-export public API
pub use lazy::SafeBoundedLazy;
pub use queue::LockFreeQueue;
