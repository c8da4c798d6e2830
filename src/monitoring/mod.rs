/*!
 * Monitoring
 * Tracing setup and task spans
 */

mod tracer;

pub use tracer::{init_tracing, span_task, TaskSpan};
