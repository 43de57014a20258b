//! Resource errors.

use strand_types::ErrorCode;
use thiserror::Error;

/// Failure reported by [`Resource::force_release`](super::Resource::force_release).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    /// The handle could not be torn down.
    #[error("failed to release {kind}: {message}")]
    ReleaseFailed {
        /// Kind of the handle (usually its type name).
        kind: String,
        /// What went wrong.
        message: String,
    },
}

impl ResourceError {
    /// Creates a release failure.
    pub fn release_failed(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ReleaseFailed {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl ErrorCode for ResourceError {
    fn code(&self) -> &'static str {
        match self {
            Self::ReleaseFailed { .. } => "RESOURCE_RELEASE_FAILED",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_types::assert_error_codes;

    #[test]
    fn all_error_codes_valid() {
        assert_error_codes(
            &[ResourceError::release_failed("conn", "socket gone")],
            "RESOURCE_",
        );
    }

    #[test]
    fn display_names_the_kind() {
        let err = ResourceError::release_failed("mysql", "broken pipe");
        assert_eq!(err.to_string(), "failed to release mysql: broken pipe");
    }
}
