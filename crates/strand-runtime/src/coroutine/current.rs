//! The coroutine the calling code is running in.
//!
//! The manager installs a task-local scope around every body it runs.
//! Tasks spawned by other means (a bare `tokio::spawn`) are outside any
//! coroutine.

use super::{CoroutineError, CoroutineManager};
use crate::context::Context;
use std::future::Future;
use std::sync::Arc;
use strand_types::CoroutineId;

#[derive(Clone)]
pub(crate) struct Current {
    pub(crate) manager: CoroutineManager,
    pub(crate) context: Arc<Context>,
}

tokio::task_local! {
    static CURRENT: Current;
}

/// Runs `body` with `current` installed as the current coroutine.
pub(crate) async fn scope<F: Future>(current: Current, body: F) -> F::Output {
    CURRENT.scope(current, body).await
}

pub(crate) fn with_current<R>(f: impl FnOnce(&Current) -> R) -> Result<R, CoroutineError> {
    CURRENT
        .try_with(|current| f(current))
        .map_err(|_| CoroutineError::NotInCoroutine)
}

/// Context of the calling coroutine.
///
/// # Errors
///
/// - [`CoroutineError::NotInCoroutine`] outside a coroutine
/// - [`CoroutineError::ContextDestroyed`] if the context was already torn down
///
/// # Example
///
/// ```
/// use strand_runtime::{current, CoroutineError, CoroutineManager};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), CoroutineError> {
/// assert_eq!(current().unwrap_err(), CoroutineError::NotInCoroutine);
///
/// let manager = CoroutineManager::default();
/// let id = manager
///     .init((), async { current().map(|ctx| ctx.id()) })
///     .await?;
/// assert_eq!(id.as_i64(), 1);
/// # Ok(())
/// # }
/// ```
pub fn current() -> Result<Arc<Context>, CoroutineError> {
    let context = with_current(|c| Arc::clone(&c.context))?;
    context.ensure_alive()?;
    Ok(context)
}

/// Id of the calling coroutine.
///
/// # Errors
///
/// [`CoroutineError::NotInCoroutine`] outside a coroutine.
pub fn current_id() -> Result<CoroutineId, CoroutineError> {
    with_current(|c| c.context.id())
}

/// Manager that scheduled the calling coroutine.
///
/// # Errors
///
/// [`CoroutineError::NotInCoroutine`] outside a coroutine.
pub fn current_manager() -> Result<CoroutineManager, CoroutineError> {
    with_current(|c| c.manager.clone())
}
