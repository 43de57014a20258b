//! Identity set of handles with LIFO teardown.

use super::ResourceError;
use serde::Serialize;
use std::any::Any;
use std::sync::Arc;
use tracing::{debug, warn};

/// Upcast helper so `Arc<dyn Resource>` can be downcast to a concrete type.
///
/// Implemented for every `Send + Sync + 'static` type; never implement it
/// by hand.
pub trait AsAnyArc {
    /// Converts into a type-erased `Arc`.
    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAnyArc for T {
    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// A handle owned by a coroutine that must be torn down with it.
///
/// # Example
///
/// ```
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use strand_runtime::{Resource, ResourceError};
///
/// struct PooledConnection {
///     returned: AtomicBool,
/// }
///
/// impl Resource for PooledConnection {
///     fn force_release(&self) -> Result<(), ResourceError> {
///         self.returned.store(true, Ordering::SeqCst);
///         Ok(())
///     }
/// }
/// ```
pub trait Resource: AsAnyArc + Send + Sync + 'static {
    /// Unconditionally tears the handle down.
    ///
    /// Called during cleanup even if the owner already released the
    /// handle through its normal path, so implementations must tolerate
    /// being called on an already-released handle.
    fn force_release(&self) -> Result<(), ResourceError>;

    /// Short name used in logs.
    fn kind(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

fn same_handle(a: &Arc<dyn Resource>, b: &Arc<dyn Resource>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Outcome of a [`Resources::release_all`] sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReleaseReport {
    /// Handles whose `force_release` succeeded.
    pub released: usize,
    /// Handles whose `force_release` failed (logged, not propagated).
    pub failed: usize,
}

impl ReleaseReport {
    /// Total handles swept.
    #[must_use]
    pub fn total(&self) -> usize {
        self.released + self.failed
    }
}

/// Ordered set of attached handles, unique by identity.
///
/// Identity is `Arc` pointer identity: two clones of the same `Arc`
/// are the same handle, two equal-looking values in different `Arc`s
/// are not.
#[derive(Default)]
pub struct Resources {
    handles: Vec<Arc<dyn Resource>>,
}

impl Resources {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches `handle` unless it is already present.
    ///
    /// Returns `true` if it was inserted.
    pub fn attach(&mut self, handle: Arc<dyn Resource>) -> bool {
        if self.contains(&handle) {
            return false;
        }
        self.handles.push(handle);
        true
    }

    /// Removes `handle`, keeping the order of the others.
    ///
    /// Returns `true` if it was present.
    pub fn detach(&mut self, handle: &Arc<dyn Resource>) -> bool {
        match self.handles.iter().position(|h| same_handle(h, handle)) {
            Some(index) => {
                self.handles.remove(index);
                true
            }
            None => false,
        }
    }

    /// Returns `true` if `handle` is attached.
    #[must_use]
    pub fn contains(&self, handle: &Arc<dyn Resource>) -> bool {
        self.handles.iter().any(|h| same_handle(h, handle))
    }

    /// Returns every attached handle of type `R`, in attach order.
    #[must_use]
    pub fn get_all<R: Resource>(&self) -> Vec<Arc<R>> {
        self.handles
            .iter()
            .filter_map(|h| Arc::clone(h).as_any_arc().downcast::<R>().ok())
            .collect()
    }

    /// Returns the first attached handle of type `R`.
    #[must_use]
    pub fn get_one<R: Resource>(&self) -> Option<Arc<R>> {
        self.handles
            .iter()
            .find_map(|h| Arc::clone(h).as_any_arc().downcast::<R>().ok())
    }

    /// Returns every attached handle, in attach order.
    #[must_use]
    pub fn all(&self) -> Vec<Arc<dyn Resource>> {
        self.handles.clone()
    }

    /// Number of attached handles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Returns `true` if nothing is attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Force-releases every handle, last attached first, until empty.
    ///
    /// A failing handle is logged and skipped; the sweep always drains
    /// the whole set.
    pub fn release_all(&mut self) -> ReleaseReport {
        let mut report = ReleaseReport::default();

        while let Some(handle) = self.handles.pop() {
            match handle.force_release() {
                Ok(()) => report.released += 1,
                Err(e) => {
                    warn!(kind = handle.kind(), error = %e, "force_release failed, continuing teardown");
                    report.failed += 1;
                }
            }
        }

        if report.total() > 0 {
            debug!(
                released = report.released,
                failed = report.failed,
                "Released resources"
            );
        }
        report
    }
}

impl std::fmt::Debug for Resources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.handles.iter().map(|h| h.kind()))
            .finish()
    }
}
