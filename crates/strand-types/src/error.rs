//! Error-code interface shared by every strand error enum.
//!
//! Each crate defines its own `thiserror` enum and implements
//! [`ErrorCode`] on it, so collaborators (HTTP layer, ORM, SQL layer)
//! can branch on a stable code instead of matching concrete types.
//!
//! # Example
//!
//! ```
//! use strand_types::ErrorCode;
//!
//! #[derive(Debug)]
//! enum PoolError {
//!     Exhausted,
//!     Closed,
//! }
//!
//! impl ErrorCode for PoolError {
//!     fn code(&self) -> &'static str {
//!         match self {
//!             Self::Exhausted => "POOL_EXHAUSTED",
//!             Self::Closed => "POOL_CLOSED",
//!         }
//!     }
//!
//!     fn is_recoverable(&self) -> bool {
//!         matches!(self, Self::Exhausted)
//!     }
//! }
//!
//! assert_eq!(PoolError::Exhausted.code(), "POOL_EXHAUSTED");
//! assert!(!PoolError::Closed.is_recoverable());
//! ```

/// Machine-readable classification of an error.
///
/// # Code Format
///
/// - **UPPER_SNAKE_CASE**, e.g. `"COROUTINE_TIMEOUT"`
/// - **Prefixed by the owning layer**: `COROUTINE_`, `CHANNEL_`, `RESOURCE_`, `CONFIG_`
/// - **Stable**: a published code is part of the API
///
/// # Recoverability
///
/// An error is recoverable when retrying the same call later may succeed
/// (a join timed out, the spawn ceiling was momentarily full). Errors
/// caused by misuse or by a torn-down context are not.
pub trait ErrorCode {
    /// Returns the stable error code.
    fn code(&self) -> &'static str;

    /// Returns whether a retry may succeed.
    fn is_recoverable(&self) -> bool;
}

/// Asserts that `err` carries a well-formed code starting with `expected_prefix`.
///
/// Intended for tests of error enums.
///
/// # Panics
///
/// Panics if the code is empty, lacks the prefix, or is not UPPER_SNAKE_CASE.
///
/// ```
/// use strand_types::{assert_error_code, ErrorCode};
///
/// struct Stalled;
///
/// impl ErrorCode for Stalled {
///     fn code(&self) -> &'static str { "JOIN_STALLED" }
///     fn is_recoverable(&self) -> bool { true }
/// }
///
/// assert_error_code(&Stalled, "JOIN_");
/// ```
pub fn assert_error_code<E: ErrorCode>(err: &E, expected_prefix: &str) {
    let code = err.code();

    assert!(!code.is_empty(), "Error code must not be empty");
    assert!(
        code.starts_with(expected_prefix),
        "Error code '{code}' must start with prefix '{expected_prefix}'"
    );
    assert!(
        is_upper_snake_case(code),
        "Error code '{code}' must be UPPER_SNAKE_CASE"
    );
}

/// Runs [`assert_error_code`] over every variant in `errors`.
///
/// # Panics
///
/// Panics on the first malformed code.
pub fn assert_error_codes<E: ErrorCode>(errors: &[E], expected_prefix: &str) {
    for err in errors {
        assert_error_code(err, expected_prefix);
    }
}

fn is_upper_snake_case(s: &str) -> bool {
    !s.is_empty()
        && !s.starts_with('_')
        && !s.ends_with('_')
        && !s.contains("__")
        && s.chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    enum JoinError {
        Stalled,
        Poisoned,
    }

    impl ErrorCode for JoinError {
        fn code(&self) -> &'static str {
            match self {
                Self::Stalled => "JOIN_STALLED",
                Self::Poisoned => "JOIN_POISONED",
            }
        }

        fn is_recoverable(&self) -> bool {
            matches!(self, Self::Stalled)
        }
    }

    #[test]
    fn codes_and_recoverability() {
        assert_eq!(JoinError::Stalled.code(), "JOIN_STALLED");
        assert!(JoinError::Stalled.is_recoverable());
        assert!(!JoinError::Poisoned.is_recoverable());
    }

    #[test]
    fn all_variants_pass_validation() {
        assert_error_codes(&[JoinError::Stalled, JoinError::Poisoned], "JOIN_");
    }

    #[test]
    #[should_panic(expected = "must start with prefix")]
    fn wrong_prefix_panics() {
        assert_error_code(&JoinError::Stalled, "CHANNEL_");
    }

    #[test]
    fn snake_case_detection() {
        assert!(is_upper_snake_case("COROUTINE_TIMEOUT"));
        assert!(is_upper_snake_case("ERROR_123"));
        assert!(!is_upper_snake_case(""));
        assert!(!is_upper_snake_case("timeout"));
        assert!(!is_upper_snake_case("_LEADING"));
        assert!(!is_upper_snake_case("TRAILING_"));
        assert!(!is_upper_snake_case("DOUBLE__UNDERSCORE"));
    }
}
