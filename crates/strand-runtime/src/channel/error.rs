//! Channel errors.
//!
//! # Error Codes
//!
//! | Variant | Code | Recoverable |
//! |---------|------|-------------|
//! | [`ChannelError::NotReady`] | `CHANNEL_NOT_READY` | Yes |
//! | [`ChannelError::Full`] | `CHANNEL_FULL` | Yes |
//! | [`ChannelError::Closed`] | `CHANNEL_CLOSED` | No |
//!
//! # Example
//!
//! ```
//! use strand_runtime::ChannelError;
//! use strand_types::ErrorCode;
//!
//! let err = ChannelError::NotReady;
//! assert_eq!(err.code(), "CHANNEL_NOT_READY");
//! assert!(err.is_recoverable());
//! ```

use std::time::Duration;
use strand_types::ErrorCode;
use thiserror::Error;

/// Failure of a [`Channel`](super::Channel) operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// No value arrived before the pop timeout elapsed.
    ///
    /// This is the "not ready" result of a pop. It is never produced
    /// for a value that was actually sent, whatever that value is.
    #[error("no value available before timeout")]
    NotReady,

    /// The channel stayed at capacity for the whole push timeout.
    #[error("channel full for {timeout:?}")]
    Full {
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The channel was closed by its owner.
    ///
    /// Pushes fail immediately. Pops still drain buffered values and
    /// report `Closed` once the buffer is empty.
    #[error("channel closed")]
    Closed,
}

impl ErrorCode for ChannelError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotReady => "CHANNEL_NOT_READY",
            Self::Full { .. } => "CHANNEL_FULL",
            Self::Closed => "CHANNEL_CLOSED",
        }
    }

    fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Closed)
    }
}
