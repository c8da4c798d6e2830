/*!
 * Limits and Defaults
 *
 * Centralized location for tunables used by the synchronizers and pools.
 * Performance-critical constants are marked with [PERF].
 */

use std::time::Duration;

// =============================================================================
// THREAD POOLS
// =============================================================================

/// Idle worker keep-alive before self-termination (60s)
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(60);

/// Short keep-alive used by the low-latency preset (100ms)
pub const SHORT_KEEP_ALIVE: Duration = Duration::from_millis(100);

/// Long keep-alive used by the long-lived preset (10 minutes)
pub const LONG_KEEP_ALIVE: Duration = Duration::from_secs(600);

/// Pool size used when the CPU count cannot be detected
pub const FALLBACK_POOL_SIZE: usize = 8;

/// Upper bound for a configured pool size
/// Guards against accidental `usize::MAX` pools exhausting OS threads
pub const MAX_POOL_SIZE: usize = 4096;

/// Prefix for worker thread names (`<prefix>-<id>`)
pub const WORKER_THREAD_PREFIX: &str = "pc-worker";

/// Tasks running longer than this are logged at `warn`
pub const SLOW_TASK_THRESHOLD: Duration = Duration::from_secs(1);

/// Name of the future-returning pool's dispatcher thread
pub const DISPATCHER_THREAD_NAME: &str = "pc-dispatcher";

// =============================================================================
// BACKOFF (lock-free waiters)
// =============================================================================

/// Iterations of pure `spin_loop()` before yielding
/// [PERF] Covers handoffs that finish within a few hundred nanoseconds
pub const SPIN_PHASE_LIMIT: u32 = 10;

/// Iterations of `yield_now()` before sleeping
pub const YIELD_PHASE_LIMIT: u32 = 50;

/// First sleep of the park phase
pub const BACKOFF_INITIAL_SLEEP: Duration = Duration::from_micros(1);

/// Cap for the exponentially growing park-phase sleep (1ms)
/// [PERF] Bounds the extra latency a waiter sees after the state changes
pub const BACKOFF_MAX_SLEEP: Duration = Duration::from_millis(1);
