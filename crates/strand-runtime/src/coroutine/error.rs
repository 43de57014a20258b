//! Coroutine errors.
//!
//! # Error Codes
//!
//! | Variant | Code | Recoverable |
//! |---------|------|-------------|
//! | [`CoroutineError::NotInCoroutine`] | `COROUTINE_NOT_IN_COROUTINE` | No |
//! | [`CoroutineError::ContextDestroyed`] | `COROUTINE_CONTEXT_DESTROYED` | No |
//! | [`CoroutineError::ResourceExhausted`] | `COROUTINE_RESOURCE_EXHAUSTED` | Yes |
//! | [`CoroutineError::InvalidArgument`] | `COROUTINE_INVALID_ARGUMENT` | No |
//! | [`CoroutineError::AlreadyRunning`] | `COROUTINE_ALREADY_RUNNING` | Yes |
//! | [`CoroutineError::Timeout`] | `COROUTINE_TIMEOUT` | Yes |
//! | [`CoroutineError::ChildFailure`] | `COROUTINE_CHILD_FAILURE` | No |

use crate::context::FullBacktrace;
use serde::Serialize;
use std::time::Duration;
use strand_types::{CoroutineId, ErrorCode};
use thiserror::Error;

/// Error type returned by coroutine bodies.
///
/// Anything implementing `std::error::Error + Send + Sync` converts into
/// it with `?`, and so does `anyhow::Error`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure of a coroutine operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoroutineError {
    /// The API was used outside a coroutine scheduled by the manager.
    #[error("not running inside a coroutine")]
    NotInCoroutine,

    /// The target context was torn down or never existed.
    #[error("context of {0} has been destroyed")]
    ContextDestroyed(CoroutineId),

    /// The root already has the maximum number of live descendants.
    #[error("root {root} already has {limit} live sub-coroutines")]
    ResourceExhausted { root: CoroutineId, limit: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The calling context already has an unfinished `execute_multi`.
    #[error("{0} already has a batch running")]
    AlreadyRunning(CoroutineId),

    /// A join did not receive every envelope before its deadline.
    #[error("received {received} of {expected} results within {timeout:?}")]
    Timeout {
        expected: usize,
        received: usize,
        timeout: Duration,
    },

    #[error(transparent)]
    ChildFailure(#[from] ChildFailure),
}

impl ErrorCode for CoroutineError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotInCoroutine => "COROUTINE_NOT_IN_COROUTINE",
            Self::ContextDestroyed(_) => "COROUTINE_CONTEXT_DESTROYED",
            Self::ResourceExhausted { .. } => "COROUTINE_RESOURCE_EXHAUSTED",
            Self::InvalidArgument(_) => "COROUTINE_INVALID_ARGUMENT",
            Self::AlreadyRunning(_) => "COROUTINE_ALREADY_RUNNING",
            Self::Timeout { .. } => "COROUTINE_TIMEOUT",
            Self::ChildFailure(_) => "COROUTINE_CHILD_FAILURE",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ResourceExhausted { .. } | Self::AlreadyRunning(_) | Self::Timeout { .. }
        )
    }
}

/// A coroutine body that returned an error or panicked.
///
/// Tagged with the submission key of the child (`None` for a root) so
/// the awaiting coroutine knows which of its bodies failed.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{} {coroutine} {}: {message}", key_label(.key), verb(.panicked))]
pub struct ChildFailure {
    key: Option<u64>,
    coroutine: CoroutineId,
    message: String,
    panicked: bool,
    #[serde(skip)]
    backtrace: Option<FullBacktrace>,
}

fn verb(panicked: &bool) -> &'static str {
    if *panicked {
        "panicked"
    } else {
        "failed"
    }
}

fn key_label(key: &Option<u64>) -> String {
    match key {
        Some(key) => format!("sub-coroutine #{key}"),
        None => String::from("root"),
    }
}

impl ChildFailure {
    /// Failure returned by a body as an error value.
    #[must_use]
    pub fn new(key: Option<u64>, coroutine: CoroutineId, message: impl Into<String>) -> Self {
        Self {
            key,
            coroutine,
            message: message.into(),
            panicked: false,
            backtrace: None,
        }
    }

    /// Failure caused by a panic inside a body.
    #[must_use]
    pub fn panicked(key: Option<u64>, coroutine: CoroutineId, message: impl Into<String>) -> Self {
        Self {
            panicked: true,
            ..Self::new(key, coroutine, message)
        }
    }

    #[must_use]
    pub(crate) fn with_backtrace(mut self, backtrace: Option<FullBacktrace>) -> Self {
        self.backtrace = backtrace;
        self
    }

    /// Submission key of the failing child, `None` for a root.
    #[must_use]
    pub fn key(&self) -> Option<u64> {
        self.key
    }

    /// Coroutine whose body failed.
    #[must_use]
    pub fn coroutine(&self) -> CoroutineId {
        self.coroutine
    }

    /// Rendered error or panic message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns `true` if the body panicked.
    #[must_use]
    pub fn is_panic(&self) -> bool {
        self.panicked
    }

    /// Creation-site backtrace of the failing coroutine, when capture is enabled.
    #[must_use]
    pub fn backtrace(&self) -> Option<&FullBacktrace> {
        self.backtrace.as_ref()
    }
}
