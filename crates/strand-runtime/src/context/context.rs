//! Per-coroutine state container.

use super::{Bindings, TraceSegment};
use crate::channel::{Channel, Envelope};
use crate::coroutine::{CoroutineError, SubcoroutineSlots};
use crate::resource::{ReleaseReport, Resource, Resources};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use strand_types::CoroutineId;
use tracing::debug;

/// State owned by one coroutine.
///
/// A context is created by the [`CoroutineManager`](crate::CoroutineManager)
/// when a coroutine is spawned and destroyed exactly once, right after
/// the coroutine's body finishes. Every accessor fails with
/// [`CoroutineError::ContextDestroyed`] after that point.
///
/// # Contents
///
/// - identity, parent link and ancestor path (parent first, root last)
/// - ordered list of spawned children
/// - attached [`Resources`] and assigned connections, released LIFO at teardown
/// - a lazily created [`Channel`] that children report into
/// - typed [`Bindings`], snapshotted from the parent at creation
pub struct Context {
    id: CoroutineId,
    ancestors: Vec<CoroutineId>,
    channel_capacity: usize,
    slots: Arc<SubcoroutineSlots>,
    trace: Arc<TraceSegment>,
    children: Mutex<Vec<CoroutineId>>,
    resources: Mutex<Resources>,
    connections: Mutex<Resources>,
    channel: Mutex<Option<Arc<Channel<Envelope>>>>,
    bindings: RwLock<Bindings>,
    batch_running: AtomicBool,
    destroyed: AtomicBool,
}

impl Context {
    /// Creates the context of a root coroutine.
    pub(crate) fn new_root(
        id: CoroutineId,
        max_subcoroutines: usize,
        trace: Arc<TraceSegment>,
    ) -> Self {
        Self::build(
            id,
            Vec::new(),
            max_subcoroutines,
            Arc::new(SubcoroutineSlots::new(id, max_subcoroutines)),
            trace,
            Bindings::new(),
        )
    }

    /// Creates the context of a child of `parent`.
    ///
    /// Inheritable bindings are copied once, here.
    pub(crate) fn new_child(id: CoroutineId, parent: &Self, trace: Arc<TraceSegment>) -> Self {
        let mut ancestors = Vec::with_capacity(parent.ancestors.len() + 1);
        ancestors.push(parent.id);
        ancestors.extend_from_slice(&parent.ancestors);

        Self::build(
            id,
            ancestors,
            parent.channel_capacity,
            Arc::clone(&parent.slots),
            trace,
            parent.bindings.read().inheritable(),
        )
    }

    fn build(
        id: CoroutineId,
        ancestors: Vec<CoroutineId>,
        channel_capacity: usize,
        slots: Arc<SubcoroutineSlots>,
        trace: Arc<TraceSegment>,
        bindings: Bindings,
    ) -> Self {
        Self {
            id,
            ancestors,
            channel_capacity,
            slots,
            trace,
            children: Mutex::new(Vec::new()),
            resources: Mutex::new(Resources::new()),
            connections: Mutex::new(Resources::new()),
            channel: Mutex::new(None),
            bindings: RwLock::new(bindings),
            batch_running: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
        }
    }

    // === Identity ===

    /// Returns this coroutine's id.
    #[must_use]
    pub fn id(&self) -> CoroutineId {
        self.id
    }

    /// Returns the parent id, or `None` for a root.
    #[must_use]
    pub fn parent(&self) -> Option<CoroutineId> {
        self.ancestors.first().copied()
    }

    /// Returns the parent id, or [`CoroutineId::NO_PARENT`] for a root.
    #[must_use]
    pub fn parent_coroutine_id(&self) -> CoroutineId {
        self.parent().unwrap_or(CoroutineId::NO_PARENT)
    }

    /// Returns `true` if this coroutine has no parent.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.ancestors.is_empty()
    }

    /// Returns the id of the root of this coroutine's tree.
    #[must_use]
    pub fn root(&self) -> CoroutineId {
        self.ancestors.last().copied().unwrap_or(self.id)
    }

    /// Ancestors captured at creation: parent first, root last.
    #[must_use]
    pub fn ancestors(&self) -> &[CoroutineId] {
        &self.ancestors
    }

    /// Creation-site trace segment.
    #[must_use]
    pub fn creation_trace(&self) -> &Arc<TraceSegment> {
        &self.trace
    }

    /// Returns `true` once [`destroy`](Self::destroy) has run.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Fails with `ContextDestroyed` once the context is torn down.
    ///
    /// # Errors
    ///
    /// [`CoroutineError::ContextDestroyed`]
    pub fn ensure_alive(&self) -> Result<(), CoroutineError> {
        if self.is_destroyed() {
            Err(CoroutineError::ContextDestroyed(self.id))
        } else {
            Ok(())
        }
    }

    // === Children ===

    /// Ids of the children spawned so far, in spawn order.
    ///
    /// # Errors
    ///
    /// [`CoroutineError::ContextDestroyed`]
    pub fn children(&self) -> Result<Vec<CoroutineId>, CoroutineError> {
        self.ensure_alive()?;
        Ok(self.children.lock().clone())
    }

    pub(crate) fn add_child(&self, child: CoroutineId) {
        self.children.lock().push(child);
    }

    pub(crate) fn slots(&self) -> &Arc<SubcoroutineSlots> {
        &self.slots
    }

    /// Live sub-coroutines in this coroutine's whole root tree.
    #[must_use]
    pub fn live_subcoroutines(&self) -> usize {
        self.slots.live()
    }

    // === Resources ===

    /// Attaches `handle`; a no-op if it is already attached.
    ///
    /// # Errors
    ///
    /// [`CoroutineError::ContextDestroyed`]
    pub fn attach_resource(&self, handle: Arc<dyn Resource>) -> Result<bool, CoroutineError> {
        self.ensure_alive()?;
        Ok(self.resources.lock().attach(handle))
    }

    /// Detaches `handle` without releasing it.
    ///
    /// # Errors
    ///
    /// [`CoroutineError::ContextDestroyed`]
    pub fn detach_resource(&self, handle: &Arc<dyn Resource>) -> Result<bool, CoroutineError> {
        self.ensure_alive()?;
        Ok(self.resources.lock().detach(handle))
    }

    /// Attached resources of type `R`.
    ///
    /// # Errors
    ///
    /// [`CoroutineError::ContextDestroyed`]
    pub fn resources<R: Resource>(&self) -> Result<Vec<Arc<R>>, CoroutineError> {
        self.ensure_alive()?;
        Ok(self.resources.lock().get_all::<R>())
    }

    /// First attached resource of type `R`.
    ///
    /// # Errors
    ///
    /// [`CoroutineError::ContextDestroyed`]
    pub fn resource<R: Resource>(&self) -> Result<Option<Arc<R>>, CoroutineError> {
        self.ensure_alive()?;
        Ok(self.resources.lock().get_one::<R>())
    }

    /// Number of attached resources.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.resources.lock().len()
    }

    // === Connections ===

    /// Assigns a connection; a no-op if it is already assigned.
    ///
    /// # Errors
    ///
    /// [`CoroutineError::ContextDestroyed`]
    pub fn assign_connection(&self, conn: Arc<dyn Resource>) -> Result<bool, CoroutineError> {
        self.ensure_alive()?;
        Ok(self.connections.lock().attach(conn))
    }

    /// Unassigns a connection without releasing it.
    ///
    /// # Errors
    ///
    /// [`CoroutineError::ContextDestroyed`]
    pub fn unassign_connection(&self, conn: &Arc<dyn Resource>) -> Result<bool, CoroutineError> {
        self.ensure_alive()?;
        Ok(self.connections.lock().detach(conn))
    }

    /// Assigned connections of type `C`.
    ///
    /// # Errors
    ///
    /// [`CoroutineError::ContextDestroyed`]
    pub fn connections<C: Resource>(&self) -> Result<Vec<Arc<C>>, CoroutineError> {
        self.ensure_alive()?;
        Ok(self.connections.lock().get_all::<C>())
    }

    /// Every assigned connection, whatever its type.
    ///
    /// # Errors
    ///
    /// [`CoroutineError::ContextDestroyed`]
    pub fn all_connections(&self) -> Result<Vec<Arc<dyn Resource>>, CoroutineError> {
        self.ensure_alive()?;
        Ok(self.connections.lock().all())
    }

    /// First assigned connection of type `C`.
    ///
    /// # Errors
    ///
    /// [`CoroutineError::ContextDestroyed`]
    pub fn connection<C: Resource>(&self) -> Result<Option<Arc<C>>, CoroutineError> {
        self.ensure_alive()?;
        Ok(self.connections.lock().get_one::<C>())
    }

    /// Force-releases every connection still assigned.
    ///
    /// Safe to call when everything was already freed by hand; the
    /// sweep then finds nothing.
    ///
    /// # Errors
    ///
    /// [`CoroutineError::ContextDestroyed`]
    pub fn free_all_connections(&self) -> Result<ReleaseReport, CoroutineError> {
        self.ensure_alive()?;
        Ok(self.sweep_connections())
    }

    fn sweep_connections(&self) -> ReleaseReport {
        // Release outside the lock: force_release may log or block.
        let mut taken = std::mem::take(&mut *self.connections.lock());
        taken.release_all()
    }

    // === Bindings ===

    /// Binds `value` to this coroutine only.
    ///
    /// # Errors
    ///
    /// [`CoroutineError::ContextDestroyed`]
    pub fn bind<T: Send + Sync + 'static>(&self, value: T) -> Result<(), CoroutineError> {
        self.ensure_alive()?;
        self.bindings.write().insert(value, false);
        Ok(())
    }

    /// Binds `value` and marks it for copying into children spawned later.
    ///
    /// # Errors
    ///
    /// [`CoroutineError::ContextDestroyed`]
    pub fn bind_inherited<T: Send + Sync + 'static>(&self, value: T) -> Result<(), CoroutineError> {
        self.bind_shared(Arc::new(value), true)
    }

    /// Binds an already shared value.
    ///
    /// # Errors
    ///
    /// [`CoroutineError::ContextDestroyed`]
    pub fn bind_shared<T: Send + Sync + 'static>(
        &self,
        value: Arc<T>,
        inherit: bool,
    ) -> Result<(), CoroutineError> {
        self.ensure_alive()?;
        self.bindings.write().insert_shared(value, inherit);
        Ok(())
    }

    /// Returns the value bound for `T`, if any.
    ///
    /// # Errors
    ///
    /// [`CoroutineError::ContextDestroyed`]
    pub fn binding<T: Send + Sync + 'static>(&self) -> Result<Option<Arc<T>>, CoroutineError> {
        self.ensure_alive()?;
        Ok(self.bindings.read().get::<T>())
    }

    /// Returns `true` if a value is bound for `T`.
    #[must_use]
    pub fn has_binding<T: 'static>(&self) -> bool {
        self.bindings.read().contains::<T>()
    }

    /// Removes the value bound for `T`.
    ///
    /// # Errors
    ///
    /// [`CoroutineError::ContextDestroyed`]
    pub fn unbind<T: Send + Sync + 'static>(&self) -> Result<Option<Arc<T>>, CoroutineError> {
        self.ensure_alive()?;
        Ok(self.bindings.write().remove::<T>())
    }

    // === Channel ===

    /// Returns the channel children report into, creating it on first use.
    ///
    /// # Errors
    ///
    /// [`CoroutineError::ContextDestroyed`]
    pub fn channel(&self) -> Result<Arc<Channel<Envelope>>, CoroutineError> {
        self.ensure_alive()?;
        let mut slot = self.channel.lock();
        let channel = slot.get_or_insert_with(|| Arc::new(Channel::new(self.id, self.channel_capacity)));
        Ok(Arc::clone(channel))
    }

    // === Batches ===

    pub(crate) fn try_begin_batch(&self) -> bool {
        self.batch_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn end_batch(&self) {
        self.batch_running.store(false, Ordering::Release);
    }

    /// Returns `true` while an `execute_multi` call is waiting on this context.
    #[must_use]
    pub fn is_batch_running(&self) -> bool {
        self.batch_running.load(Ordering::Acquire)
    }

    // === Teardown ===

    /// Tears the context down.
    ///
    /// Frees connections, force-releases resources (LIFO), drops every
    /// binding and closes the channel. Returns `false` if the context
    /// was already destroyed, in which case nothing happens.
    pub fn destroy(&self) -> bool {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return false;
        }

        let connections = self.sweep_connections();
        let resources = {
            let mut taken = std::mem::take(&mut *self.resources.lock());
            taken.release_all()
        };

        // Take the table out first so value destructors run without the lock held.
        let bindings = std::mem::take(&mut *self.bindings.write());
        let binding_count = bindings.len();
        drop(bindings);

        if let Some(channel) = self.channel.lock().take() {
            channel.close();
        }

        debug!(
            coroutine = %self.id,
            connections = connections.total(),
            resources = resources.total(),
            bindings = binding_count,
            "Context destroyed"
        );
        true
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("parent", &self.parent_coroutine_id())
            .field("children", &self.children.lock().len())
            .field("resources", &self.resources.lock().len())
            .field("connections", &self.connections.lock().len())
            .field("destroyed", &self.is_destroyed())
            .finish_non_exhaustive()
    }
}
