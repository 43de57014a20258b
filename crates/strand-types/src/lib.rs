//! Strand Types - shared identifiers and error codes.
//!
//! This crate is the leaf of the strand workspace. It holds the types
//! that both the runtime and its collaborators (HTTP, ORM, SQL layers)
//! need to agree on:
//!
//! - [`CoroutineId`]: identity of a coroutine, with the `-1` root sentinel
//! - [`ErrorCode`]: machine-readable error classification

mod error;
mod id;

pub use error::{assert_error_code, assert_error_codes, ErrorCode};
pub use id::CoroutineId;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coroutine_id_display() {
        assert_eq!(CoroutineId::from_raw(42).to_string(), "co:42");
        assert_eq!(CoroutineId::NO_PARENT.to_string(), "co:-1");
    }

    #[test]
    fn coroutine_id_ordering_follows_allocation() {
        let first = CoroutineId::from_raw(1);
        let second = CoroutineId::from_raw(2);
        assert!(first < second);
        assert!(!first.is_no_parent());
    }

    #[test]
    fn coroutine_id_serializes_as_integer() {
        let json = serde_json::to_string(&CoroutineId::from_raw(9)).unwrap();
        assert_eq!(json, "9");

        let back: CoroutineId = serde_json::from_str("9").unwrap();
        assert_eq!(back, CoroutineId::from_raw(9));
    }

    #[test]
    fn coroutine_id_into_raw() {
        let raw: i64 = CoroutineId::NO_PARENT.into();
        assert_eq!(raw, -1);
    }
}
