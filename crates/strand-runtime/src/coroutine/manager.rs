//! Spawning, fan-out/join and teardown of coroutines.

use super::current::{self, Current};
use super::{BoxError, ChildFailure, CoroutineError};
use crate::channel::{Channel, ChannelError, Envelope, Payload, Rebind};
use crate::config::CoroutineConfig;
use crate::context::{Context, FullBacktrace, TraceSegment};
use parking_lot::RwLock;
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use strand_types::CoroutineId;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Lifecycle of a coroutine.
///
/// ```text
/// Created ──► Running ──┬──► Completed ──┬──► TornDown
///                       └──► Failed ─────┘
/// ```
///
/// Only observable while the coroutine is registered; a torn-down
/// coroutine is unregistered right away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoroutineState {
    Created,
    Running,
    Completed,
    Failed,
    TornDown,
}

/// Counters of one manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CoroutineStats {
    /// Registered coroutines (roots included).
    pub live: usize,
    /// Coroutines started so far.
    pub spawned: u64,
    /// Bodies that returned `Ok`.
    pub completed: u64,
    /// Bodies that returned an error or panicked.
    pub failed: u64,
}

struct Entry {
    context: Arc<Context>,
    state: CoroutineState,
}

struct Inner {
    config: CoroutineConfig,
    next_id: AtomicI64,
    next_key: AtomicU64,
    registry: RwLock<HashMap<CoroutineId, Entry>>,
    spawned: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Why a body did not produce a value.
enum BodyError {
    Failed(BoxError),
    Panicked(String),
    Aborted,
}

/// Schedules coroutines and owns everything they share.
///
/// Cloning is cheap; clones share the same registry and counters.
/// Separate managers share nothing.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use strand_runtime::{BoxError, CoroutineManager};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), strand_runtime::CoroutineError> {
/// let manager = CoroutineManager::default();
/// let worker = manager.clone();
///
/// let totals = manager
///     .init("GET /report", async move {
///         let bodies = (1..=3_u64).map(|n| async move {
///             tokio::time::sleep(Duration::from_millis(10 * (4 - n))).await;
///             Ok::<_, BoxError>(n * 100)
///         });
///         worker.execute_multi(bodies).await
///     })
///     .await?;
///
/// assert_eq!(totals, vec![100, 200, 300]);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct CoroutineManager {
    inner: Arc<Inner>,
}

impl Default for CoroutineManager {
    fn default() -> Self {
        Self::new(CoroutineConfig::default())
    }
}

impl CoroutineManager {
    /// Creates a manager with its own id counter and registry.
    #[must_use]
    pub fn new(config: CoroutineConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                next_id: AtomicI64::new(1),
                next_key: AtomicU64::new(0),
                registry: RwLock::new(HashMap::new()),
                spawned: AtomicU64::new(0),
                completed: AtomicU64::new(0),
                failed: AtomicU64::new(0),
            }),
        }
    }

    /// Limits this manager was built with.
    #[must_use]
    pub fn config(&self) -> &CoroutineConfig {
        &self.inner.config
    }

    // === Roots ===

    /// Runs `body` as a new root coroutine.
    ///
    /// `request` is bound as an inheritable binding, so every
    /// descendant can read it with [`Context::binding`]. The root is
    /// torn down as soon as `body` finishes.
    ///
    /// # Errors
    ///
    /// A body error that is a [`CoroutineError`] is returned as is;
    /// any other error, or a panic, becomes
    /// [`CoroutineError::ChildFailure`] with no key.
    pub async fn init<R, F, T, E>(&self, request: R, body: F) -> Result<T, CoroutineError>
    where
        R: Send + Sync + 'static,
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        let id = self.allocate_id();
        let trace = TraceSegment::new(id, None, self.inner.config.enable_complete_backtrace);
        let context = Arc::new(Context::new_root(
            id,
            self.inner.config.max_allowed_subcoroutines,
            trace,
        ));
        context.bind_inherited(request)?;
        self.register(&context);
        debug!(coroutine = %id, "Root coroutine started");

        let result = match self.run_body(&context, body).await {
            Ok(value) => Ok(value),
            Err(BodyError::Failed(err)) => match err.downcast::<CoroutineError>() {
                Ok(err) => Err(*err),
                Err(err) => Err(self.failure(&context, None, BodyError::Failed(err)).into()),
            },
            Err(other) => Err(self.failure(&context, None, other).into()),
        };

        self.finish(id, result.is_ok());
        self.teardown(&context);
        result
    }

    // === Spawning ===

    /// Spawns `body` as a child of the calling coroutine.
    ///
    /// Never blocks. When the body finishes, an [`Envelope`] is pushed
    /// to the caller's channel, where
    /// [`await_sub_coroutines`](Self::await_sub_coroutines) picks it up,
    /// and the child is torn down right after.
    ///
    /// # Errors
    ///
    /// - [`CoroutineError::NotInCoroutine`] outside a coroutine of this manager
    /// - [`CoroutineError::ResourceExhausted`] if the root already has
    ///   `max_allowed_subcoroutines` live descendants; nothing is spawned
    pub fn create<F, T, E>(&self, body: F) -> Result<CoroutineId, CoroutineError>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Rebind,
        E: Into<BoxError> + Send + 'static,
    {
        let parent = self.current_context()?;
        self.spawn_child(&parent, body).map(|(id, _)| id)
    }

    fn spawn_child<F, T, E>(
        &self,
        parent: &Arc<Context>,
        body: F,
    ) -> Result<(CoroutineId, u64), CoroutineError>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Rebind,
        E: Into<BoxError> + Send + 'static,
    {
        let channel = parent.channel()?;
        parent.slots().try_acquire()?;

        let id = self.allocate_id();
        let key = self.inner.next_key.fetch_add(1, Ordering::Relaxed);
        let trace = TraceSegment::new(
            id,
            Some(Arc::clone(parent.creation_trace())),
            self.inner.config.enable_complete_backtrace,
        );
        let context = Arc::new(Context::new_child(id, parent, trace));
        parent.add_child(id);
        self.register(&context);
        debug!(coroutine = %id, parent = %parent.id(), key, "Sub-coroutine created");

        let manager = self.clone();
        tokio::spawn(async move { manager.run_child(context, key, channel, body).await });
        Ok((id, key))
    }

    async fn run_child<F, T, E>(
        self,
        context: Arc<Context>,
        key: u64,
        parent_channel: Arc<Channel<Envelope>>,
        body: F,
    ) where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Rebind,
        E: Into<BoxError> + Send + 'static,
    {
        let outcome = match self.run_body(&context, body).await {
            Ok(value) => Ok(Payload::new(value)),
            Err(err) => Err(self.failure(&context, Some(key), err)),
        };
        self.finish(context.id(), outcome.is_ok());

        let (torn_down, signal) = oneshot::channel();
        let envelope = Envelope::new(key, context.id(), outcome).with_teardown_signal(signal);

        // Release hooks run during the push and must see the child's
        // context alive and current.
        let current = Current {
            manager: self.clone(),
            context: Arc::clone(&context),
        };
        current::scope(current, async {
            self.deliver(&parent_channel, envelope).await;
            self.teardown(&context);
        })
        .await;

        // The parent may already have dropped the envelope.
        let _ = torn_down.send(());
    }

    /// Runs `body` in its own task with `context` installed as current.
    ///
    /// The extra task is the panic boundary: a panic surfaces as a
    /// `JoinError` here instead of unwinding through the manager.
    async fn run_body<F, T, E>(&self, context: &Arc<Context>, body: F) -> Result<T, BodyError>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        self.set_state(context.id(), CoroutineState::Running);

        let current = Current {
            manager: self.clone(),
            context: Arc::clone(context),
        };
        let task = tokio::spawn(current::scope(current, async move {
            body.await.map_err(Into::<BoxError>::into)
        }));

        match task.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(BodyError::Failed(err)),
            Err(join) if join.is_panic() => Err(BodyError::Panicked(panic_message(join.into_panic()))),
            Err(_) => Err(BodyError::Aborted),
        }
    }

    fn failure(&self, context: &Context, key: Option<u64>, error: BodyError) -> ChildFailure {
        let id = context.id();
        let failure = match error {
            BodyError::Failed(err) => ChildFailure::new(key, id, err.to_string()),
            BodyError::Panicked(message) => ChildFailure::panicked(key, id, message),
            BodyError::Aborted => ChildFailure::new(key, id, "body was cancelled before completion"),
        };

        let backtrace = self
            .inner
            .config
            .enable_complete_backtrace
            .then(|| FullBacktrace::from_segment(context.creation_trace()));
        failure.with_backtrace(backtrace)
    }

    async fn deliver(&self, channel: &Channel<Envelope>, envelope: Envelope) {
        let (key, coroutine) = (envelope.key, envelope.coroutine);
        match channel.push(envelope, self.inner.config.exec_timeout()).await {
            Ok(()) => {
                debug!(coroutine = %coroutine, parent = %channel.owner(), key, "Result delivered");
            }
            Err(ChannelError::Closed) => {
                debug!(
                    coroutine = %coroutine,
                    parent = %channel.owner(),
                    key,
                    "Parent already torn down, result dropped"
                );
            }
            Err(e) => {
                warn!(
                    coroutine = %coroutine,
                    parent = %channel.owner(),
                    key,
                    error = %e,
                    "Result delivery failed, result dropped"
                );
            }
        }
    }

    fn finish(&self, id: CoroutineId, succeeded: bool) {
        let (state, counter) = if succeeded {
            (CoroutineState::Completed, &self.inner.completed)
        } else {
            (CoroutineState::Failed, &self.inner.failed)
        };
        self.set_state(id, state);
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn teardown(&self, context: &Context) {
        let id = context.id();
        if context.destroy() && !context.is_root() {
            context.slots().release();
        }

        self.set_state(id, CoroutineState::TornDown);
        self.inner.registry.write().remove(&id);
        debug!(coroutine = %id, "Coroutine torn down");
    }

    // === Fan-out / join ===

    /// Runs every body as a child of the calling coroutine and waits for
    /// all of them, using the configured `max_subcoroutine_exec_time`.
    ///
    /// Results come back in the order of `bodies`, whatever order the
    /// children finish in.
    ///
    /// # Errors
    ///
    /// See [`execute_multi_with_timeout`](Self::execute_multi_with_timeout).
    pub async fn execute_multi<I, F, T, E>(&self, bodies: I) -> Result<Vec<T>, CoroutineError>
    where
        I: IntoIterator<Item = F>,
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Rebind,
        E: Into<BoxError> + Send + 'static,
    {
        self.execute_multi_with_timeout(bodies, self.inner.config.exec_timeout())
            .await
    }

    /// [`execute_multi`](Self::execute_multi) with an explicit timeout.
    ///
    /// The first failed child aborts the wait. Its siblings keep
    /// running; their results are discarded when they arrive.
    ///
    /// # Errors
    ///
    /// - [`CoroutineError::NotInCoroutine`] outside a coroutine of this manager
    /// - [`CoroutineError::InvalidArgument`] if `bodies` is empty
    /// - [`CoroutineError::AlreadyRunning`] if the caller already waits on a batch
    /// - [`CoroutineError::ResourceExhausted`] if the ceiling is hit while spawning
    /// - [`CoroutineError::ChildFailure`] if a body failed or panicked
    /// - [`CoroutineError::Timeout`] if not every result arrived in time
    pub async fn execute_multi_with_timeout<I, F, T, E>(
        &self,
        bodies: I,
        timeout: Duration,
    ) -> Result<Vec<T>, CoroutineError>
    where
        I: IntoIterator<Item = F>,
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Rebind,
        E: Into<BoxError> + Send + 'static,
    {
        let context = self.current_context()?;
        let bodies: Vec<F> = bodies.into_iter().collect();
        if bodies.is_empty() {
            return Err(CoroutineError::InvalidArgument(
                "execute_multi needs at least one body".into(),
            ));
        }

        let _batch = BatchGuard::begin(&context)?;
        let channel = context.channel()?;
        let expected = bodies.len();
        let deadline = Instant::now() + timeout;

        // submission key -> position in `bodies`
        let mut positions = HashMap::with_capacity(expected);
        for (index, body) in bodies.into_iter().enumerate() {
            let (_, key) = self.spawn_child(&context, body)?;
            positions.insert(key, index);
        }
        debug!(coroutine = %context.id(), expected, "Batch spawned");

        let mut results: Vec<Option<T>> = std::iter::repeat_with(|| None).take(expected).collect();
        let mut received = 0;
        while received < expected {
            let mut envelope = pop_before(&channel, deadline)
                .await
                .map_err(|e| join_error(e, context.id(), expected, received, timeout))?;

            let key = envelope.key;
            let Some(index) = positions.remove(&key) else {
                debug!(coroutine = %context.id(), key, "Discarding result of an earlier batch");
                continue;
            };
            settle(&mut envelope, context.id(), deadline).await;

            let payload = envelope.outcome?;
            let type_name = payload.type_name();
            let value = payload.downcast::<T>().ok_or_else(|| {
                CoroutineError::InvalidArgument(format!(
                    "result of sub-coroutine #{key} has unexpected type {type_name}"
                ))
            })?;
            results[index] = Some(value);
            received += 1;
        }

        Ok(results.into_iter().flatten().collect())
    }

    /// Pops exactly `count` envelopes from the calling coroutine's channel.
    ///
    /// Envelopes are returned in arrival order, each one after its
    /// sender was torn down; failed children arrive as envelopes too,
    /// not as errors.
    ///
    /// # Errors
    ///
    /// - [`CoroutineError::NotInCoroutine`] outside a coroutine of this manager
    /// - [`CoroutineError::Timeout`] if fewer than `count` arrived before `timeout`
    pub async fn await_sub_coroutines(
        &self,
        count: usize,
        timeout: Duration,
    ) -> Result<Vec<Envelope>, CoroutineError> {
        let context = self.current_context()?;
        let channel = context.channel()?;
        let deadline = Instant::now() + timeout;

        let mut envelopes = Vec::with_capacity(count);
        while envelopes.len() < count {
            let mut envelope = pop_before(&channel, deadline)
                .await
                .map_err(|e| join_error(e, context.id(), count, envelopes.len(), timeout))?;
            settle(&mut envelope, context.id(), deadline).await;
            envelopes.push(envelope);
        }
        Ok(envelopes)
    }

    // === Lookup ===

    /// Context of a live coroutine.
    ///
    /// # Errors
    ///
    /// - [`CoroutineError::NotInCoroutine`] when not called from a coroutine
    /// - [`CoroutineError::ContextDestroyed`] if `cid` was torn down or never existed
    pub fn context(&self, cid: CoroutineId) -> Result<Arc<Context>, CoroutineError> {
        self.scoped_context()?;
        self.lookup(cid)
    }

    /// Registered context of `cid`; a context mid-teardown counts as gone.
    fn lookup(&self, cid: CoroutineId) -> Result<Arc<Context>, CoroutineError> {
        let context = self
            .inner
            .registry
            .read()
            .get(&cid)
            .map(|entry| Arc::clone(&entry.context))
            .ok_or(CoroutineError::ContextDestroyed(cid))?;
        context.ensure_alive()?;
        Ok(context)
    }

    /// Context installed by this manager for the calling task.
    fn scoped_context(&self) -> Result<Arc<Context>, CoroutineError> {
        current::with_current(|c| {
            Arc::ptr_eq(&c.manager.inner, &self.inner).then(|| Arc::clone(&c.context))
        })?
        .ok_or(CoroutineError::NotInCoroutine)
    }

    /// Context of the calling coroutine, if it belongs to this manager.
    fn current_context(&self) -> Result<Arc<Context>, CoroutineError> {
        let context = self.scoped_context()?;
        context.ensure_alive()?;
        Ok(context)
    }

    /// Id of the calling coroutine.
    ///
    /// # Errors
    ///
    /// [`CoroutineError::NotInCoroutine`] outside a coroutine of this manager.
    pub fn current_id(&self) -> Result<CoroutineId, CoroutineError> {
        self.current_context().map(|c| c.id())
    }

    /// State of a registered coroutine.
    #[must_use]
    pub fn state(&self, cid: CoroutineId) -> Option<CoroutineState> {
        self.inner.registry.read().get(&cid).map(|entry| entry.state)
    }

    /// `[cid, parent, …, root]`, root last. A root yields `[cid]`.
    ///
    /// # Errors
    ///
    /// [`CoroutineError::ContextDestroyed`] if `cid` is not registered.
    pub fn get_parent_coroutines(&self, cid: CoroutineId) -> Result<Vec<CoroutineId>, CoroutineError> {
        let context = self.lookup(cid)?;
        let mut chain = Vec::with_capacity(context.ancestors().len() + 1);
        chain.push(cid);
        chain.extend_from_slice(context.ancestors());
        Ok(chain)
    }

    /// Creation-site backtraces of `cid` and all its ancestors, joined
    /// into one logical trace.
    ///
    /// # Errors
    ///
    /// [`CoroutineError::ContextDestroyed`] if `cid` is not registered.
    pub fn get_full_backtrace(&self, cid: CoroutineId) -> Result<FullBacktrace, CoroutineError> {
        let context = self.lookup(cid)?;
        Ok(FullBacktrace::from_segment(context.creation_trace()))
    }

    /// Root of the tree `cid` belongs to.
    ///
    /// # Errors
    ///
    /// [`CoroutineError::ContextDestroyed`] if `cid` is not registered.
    pub fn root_of(&self, cid: CoroutineId) -> Result<CoroutineId, CoroutineError> {
        self.lookup(cid).map(|c| c.root())
    }

    /// Number of registered coroutines.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.inner.registry.read().len()
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> CoroutineStats {
        CoroutineStats {
            live: self.live_count(),
            spawned: self.inner.spawned.load(Ordering::Relaxed),
            completed: self.inner.completed.load(Ordering::Relaxed),
            failed: self.inner.failed.load(Ordering::Relaxed),
        }
    }

    // === Registry ===

    fn allocate_id(&self) -> CoroutineId {
        CoroutineId::from_raw(self.inner.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn register(&self, context: &Arc<Context>) {
        self.inner.registry.write().insert(
            context.id(),
            Entry {
                context: Arc::clone(context),
                state: CoroutineState::Created,
            },
        );
        self.inner.spawned.fetch_add(1, Ordering::Relaxed);
    }

    fn set_state(&self, cid: CoroutineId, state: CoroutineState) {
        if let Some(entry) = self.inner.registry.write().get_mut(&cid) {
            entry.state = state;
        }
    }
}

impl std::fmt::Debug for CoroutineManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoroutineManager")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Marks a context as waiting on a batch for as long as it lives.
struct BatchGuard<'a> {
    context: &'a Context,
}

impl<'a> BatchGuard<'a> {
    fn begin(context: &'a Context) -> Result<Self, CoroutineError> {
        if context.try_begin_batch() {
            Ok(Self { context })
        } else {
            Err(CoroutineError::AlreadyRunning(context.id()))
        }
    }
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        self.context.end_batch();
    }
}

/// Waits for the sender of `envelope` to finish its teardown.
async fn settle(envelope: &mut Envelope, owner: CoroutineId, deadline: Instant) {
    if !envelope.settle(deadline).await {
        debug!(
            coroutine = %owner,
            child = %envelope.coroutine,
            key = envelope.key,
            "Sub-coroutine still tearing down at deadline"
        );
    }
}

async fn pop_before(channel: &Channel<Envelope>, deadline: Instant) -> Result<Envelope, ChannelError> {
    channel
        .pop(deadline.saturating_duration_since(Instant::now()))
        .await
}

fn join_error(
    error: ChannelError,
    owner: CoroutineId,
    expected: usize,
    received: usize,
    timeout: Duration,
) -> CoroutineError {
    match error {
        ChannelError::Closed => CoroutineError::ContextDestroyed(owner),
        ChannelError::NotReady | ChannelError::Full { .. } => {
            warn!(coroutine = %owner, expected, received, ?timeout, "Join timed out");
            CoroutineError::Timeout {
                expected,
                received,
                timeout,
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::current_id;

    fn manager_with(limit: usize) -> CoroutineManager {
        CoroutineManager::new(CoroutineConfig {
            max_allowed_subcoroutines: limit,
            max_subcoroutine_exec_time: 2,
            enable_complete_backtrace: false,
        })
    }

    #[tokio::test]
    async fn ids_start_at_one_and_increase() {
        let manager = manager_with(4);
        let first = manager.init((), async { current_id() }).await.unwrap();
        let second = manager.init((), async { current_id() }).await.unwrap();

        assert_eq!(first, CoroutineId::from_raw(1));
        assert_eq!(second, CoroutineId::from_raw(2));
    }

    #[tokio::test]
    async fn managers_are_independent() {
        let a = manager_with(4);
        let b = manager_with(4);
        a.init((), async { Ok::<_, BoxError>(()) }).await.unwrap();

        let id = b.init((), async { current_id() }).await.unwrap();
        assert_eq!(id, CoroutineId::from_raw(1));
        assert_eq!(a.stats().spawned, 1);
        assert_eq!(b.stats().spawned, 1);
    }

    #[tokio::test]
    async fn state_is_running_inside_body() {
        let manager = manager_with(4);
        let inner = manager.clone();

        let state = manager
            .init((), async move {
                let id = inner.current_id()?;
                Ok::<_, CoroutineError>(inner.state(id))
            })
            .await
            .unwrap();

        assert_eq!(state, Some(CoroutineState::Running));
        assert_eq!(manager.state(CoroutineId::from_raw(1)), None);
        assert_eq!(manager.live_count(), 0);
    }

    #[tokio::test]
    async fn stats_count_outcomes() {
        let manager = manager_with(4);
        let inner = manager.clone();

        let _ = manager
            .init((), async move {
                let bodies = [1_u8, 0].map(|n| async move {
                    if n == 0 {
                        Err::<u8, BoxError>("zero".into())
                    } else {
                        Ok(n)
                    }
                });
                inner.execute_multi(bodies).await
            })
            .await;

        // Let the detached sibling finish.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let stats = manager.stats();
        assert_eq!(stats.spawned, 3);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.live, 0);
    }

    #[tokio::test]
    async fn other_managers_coroutine_is_not_current() {
        let a = manager_with(4);
        let b = manager_with(4);

        let err = a
            .init((), async move { b.create(async { Ok::<_, BoxError>(1_u8) }) })
            .await
            .unwrap_err();
        assert_eq!(err, CoroutineError::NotInCoroutine);
    }

    #[tokio::test]
    async fn context_lookup_needs_this_managers_scope() {
        let a = manager_with(4);
        let b = manager_with(4);
        let foreign = b.clone();

        let err = a
            .init((), async move {
                foreign
                    .context(CoroutineId::from_raw(1))
                    .map(|ctx| ctx.id())
            })
            .await
            .unwrap_err();
        assert_eq!(err, CoroutineError::NotInCoroutine);
    }

    #[tokio::test]
    async fn lookup_skips_destroyed_context() {
        let manager = manager_with(4);
        let inner = manager.clone();

        let err = manager
            .init((), async move {
                let ctx = current::with_current(|c| Arc::clone(&c.context))?;
                ctx.destroy();
                inner.context(ctx.id()).map(|c| c.id())
            })
            .await
            .unwrap_err();
        assert_eq!(err, CoroutineError::ContextDestroyed(CoroutineId::from_raw(1)));
    }

    #[tokio::test]
    async fn root_panic_becomes_keyless_failure() {
        let manager = manager_with(4);
        let err = manager
            .init((), async {
                if current_id()?.as_i64() == 1 {
                    panic!("template missing");
                }
                Ok::<_, CoroutineError>(())
            })
            .await
            .unwrap_err();

        let CoroutineError::ChildFailure(failure) = err else {
            panic!("expected ChildFailure, got {err:?}");
        };
        assert!(failure.is_panic());
        assert_eq!(failure.key(), None);
        assert_eq!(failure.message(), "template missing");
        assert!(failure.backtrace().is_none());
    }

    #[test]
    fn panic_messages() {
        assert_eq!(panic_message(Box::new("static")), "static");
        assert_eq!(panic_message(Box::new(String::from("owned"))), "owned");
        assert_eq!(panic_message(Box::new(7_u8)), "unknown panic payload");
    }

    #[test]
    fn join_error_mapping() {
        let owner = CoroutineId::from_raw(1);
        let timeout = Duration::from_millis(5);

        assert_eq!(
            join_error(ChannelError::NotReady, owner, 3, 1, timeout),
            CoroutineError::Timeout {
                expected: 3,
                received: 1,
                timeout
            }
        );
        assert_eq!(
            join_error(ChannelError::Closed, owner, 3, 1, timeout),
            CoroutineError::ContextDestroyed(owner)
        );
    }
}
