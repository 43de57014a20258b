//! Coroutine scheduling.
//!
//! A coroutine is a tokio task started by a [`CoroutineManager`], either
//! as a root ([`CoroutineManager::init`]) or as the child of the calling
//! coroutine ([`CoroutineManager::create`],
//! [`CoroutineManager::execute_multi`]).
//!
//! # Lifecycle of a child
//!
//! ```text
//! create ──► context built (bindings snapshotted, slot taken)
//!        ──► body runs under a panic boundary
//!        ──► envelope pushed to the parent's channel (best effort),
//!            release hooks run with the child still current
//!        ──► context destroyed (connections, resources, bindings, channel)
//!        ──► slot freed, parent's join resumes
//! ```

mod current;
mod error;
mod manager;
mod slots;

pub use current::{current, current_id, current_manager};
pub use error::{BoxError, ChildFailure, CoroutineError};
pub use manager::{CoroutineManager, CoroutineState, CoroutineStats};

pub(crate) use slots::SubcoroutineSlots;
