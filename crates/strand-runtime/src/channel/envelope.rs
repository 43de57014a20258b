//! Completion envelopes sent from a child coroutine to its parent.

use super::Rebind;
use crate::coroutine::ChildFailure;
use std::any::Any;
use strand_types::CoroutineId;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Type-erased successful result of a coroutine body.
///
/// The concrete type is recovered with [`downcast`](Self::downcast).
pub struct Payload(Box<dyn ErasedValue>);

trait ErasedValue: Rebind {
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
    fn type_name(&self) -> &'static str;
}

impl<T: Rebind> ErasedValue for T {
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

impl Payload {
    /// Wraps a value.
    #[must_use]
    pub fn new<T: Rebind>(value: T) -> Self {
        Self(Box::new(value))
    }

    /// Recovers the concrete value, or `None` if `T` is not its type.
    #[must_use]
    pub fn downcast<T: Rebind>(self) -> Option<T> {
        self.0.into_any().downcast::<T>().ok().map(|boxed| *boxed)
    }

    /// Name of the wrapped type, for diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        (*self.0).type_name()
    }
}

impl Rebind for Payload {
    fn release(&mut self, from: CoroutineId) {
        (*self.0).release(from);
    }

    fn rebind(&mut self, new_owner: CoroutineId) {
        (*self.0).rebind(new_owner);
    }
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Payload").field(&self.type_name()).finish()
    }
}

/// `{key, result | error}` record pushed onto a parent's channel when a
/// child coroutine finishes.
///
/// The child pushes its envelope while its context is still alive and
/// tears down right after. Envelopes built by the manager carry a signal
/// for that teardown; the joins wait on it before handing results back.
#[derive(Debug)]
pub struct Envelope {
    /// Submission key assigned when the child was created.
    pub key: u64,
    /// Coroutine that produced this envelope.
    pub coroutine: CoroutineId,
    /// Body result, or the failure it raised.
    pub outcome: Result<Payload, ChildFailure>,
    torn_down: Option<oneshot::Receiver<()>>,
}

impl Envelope {
    /// Creates an envelope with no teardown signal attached.
    #[must_use]
    pub fn new(key: u64, coroutine: CoroutineId, outcome: Result<Payload, ChildFailure>) -> Self {
        Self {
            key,
            coroutine,
            outcome,
            torn_down: None,
        }
    }

    pub(crate) fn with_teardown_signal(mut self, torn_down: oneshot::Receiver<()>) -> Self {
        self.torn_down = Some(torn_down);
        self
    }

    /// Waits until the sender's teardown finished, or `deadline` passes.
    ///
    /// Returns `false` only on the deadline. A dropped signal counts as
    /// finished: the sending task is gone.
    pub(crate) async fn settle(&mut self, deadline: Instant) -> bool {
        match self.torn_down.take() {
            Some(signal) => tokio::time::timeout_at(deadline, signal).await.is_ok(),
            None => true,
        }
    }

    /// Returns `true` if the body failed.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.outcome.is_err()
    }

    /// Unwraps the successful value as `T`.
    ///
    /// Returns `None` for failed envelopes and for type mismatches.
    #[must_use]
    pub fn into_value<T: Rebind>(self) -> Option<T> {
        self.outcome.ok().and_then(Payload::downcast)
    }
}

impl Rebind for Envelope {
    fn release(&mut self, from: CoroutineId) {
        if let Ok(payload) = &mut self.outcome {
            payload.release(from);
        }
    }

    fn rebind(&mut self, new_owner: CoroutineId) {
        if let Ok(payload) = &mut self.outcome {
            payload.rebind(new_owner);
        }
    }
}
