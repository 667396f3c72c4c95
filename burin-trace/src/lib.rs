/*!
Orchestration for bitmap tracing.

Tracing engines turn a raster image into styled vector paths. This crate
does not implement any tracing algorithm; it provides the
[`TracingEngine`] plug-in interface and the asynchronous pipeline that runs
an engine on a worker thread with cancellable, throttled progress reporting
and delivers results back to the caller's main loop through a
[`channel`](burin_async::channel).
*/

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod engine;
mod task;

pub use engine::{SioxFilter, TraceItem, TraceResult, TracingEngine};
pub use task::{launch_preview, launch_trace, TraceError, TraceFuture, TraceSetup};
