/*!
 * Tracing
 * Structured logging setup and per-task spans for the thread pools
 *
 * Features:
 * - EnvFilter driven by RUST_LOG
 * - JSON-formatted logs for structured parsing
 * - One span per executed task, carrying worker id, outcome and duration
 */

use crate::core::limits::SLOW_TASK_THRESHOLD;
use std::time::Instant;
use tracing::{info, span, trace, warn, Level, Span};
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - PC_SYNC_TRACE_JSON: Enable JSON output (default: false)
///
/// Does nothing if a global subscriber is already installed.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var("PC_SYNC_TRACE_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
            .is_ok()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_names(true)
                    .compact(),
            )
            .try_init()
            .is_ok()
    };

    if installed {
        info!(json = use_json, "Structured tracing initialized");
    }
}

/// Span around one task run by a pool worker
pub struct TaskSpan {
    span: Span,
    start: Instant,
    worker_id: u64,
}

impl TaskSpan {
    pub fn new(pool: &'static str, worker_id: u64) -> Self {
        let span = span!(
            Level::DEBUG,
            "task",
            pool = pool,
            worker_id = worker_id,
            outcome = tracing::field::Empty,
            duration_us = tracing::field::Empty,
        );

        Self {
            span,
            start: Instant::now(),
            worker_id,
        }
    }

    /// Record how the task ended (`completed`, `failed`, `panicked`, ...)
    pub fn record_outcome(&self, outcome: &str) {
        self.span.record("outcome", outcome);
    }

    /// Enter the span so events logged by the task are attributed to it
    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

impl Drop for TaskSpan {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        self.span.record("duration_us", duration.as_micros() as u64);

        let _entered = self.span.enter();
        if duration > SLOW_TASK_THRESHOLD {
            warn!(
                worker_id = self.worker_id,
                duration_ms = duration.as_millis() as u64,
                slow = true,
                "Slow task detected"
            );
        } else {
            trace!(
                worker_id = self.worker_id,
                duration_us = duration.as_micros() as u64,
                "Task finished"
            );
        }
    }
}

/// Helper to open a task span
#[inline]
pub fn span_task(pool: &'static str, worker_id: u64) -> TaskSpan {
    TaskSpan::new(pool, worker_id)
}
