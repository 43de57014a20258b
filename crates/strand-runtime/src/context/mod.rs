//! Per-coroutine context.
//!
//! - [`Context`]: identity, resources, connections, channel and bindings of one coroutine
//! - [`Bindings`]: typed values inherited from parent to child
//! - [`FullBacktrace`]: creation-site traces stitched across coroutines

mod backtrace;
mod bindings;
#[allow(clippy::module_inception)]
mod context;

pub use backtrace::{BacktraceFrame, FullBacktrace, TraceSegment};
pub use bindings::Bindings;
pub use context::Context;
