//! Per-coroutine resource tracking.
//!
//! Anything a coroutine acquires that must not outlive it (pooled
//! connections, locks, temp files) implements [`Resource`] and is
//! attached to the coroutine's [`Context`](crate::Context). The set is
//! force-released, last attached first, when the coroutine is torn down.

mod error;
mod resources;

pub use error::ResourceError;
pub use resources::{AsAnyArc, ReleaseReport, Resource, Resources};
