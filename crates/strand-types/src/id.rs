//! Identifier types for strand.
//!
//! Coroutine ids are small integers handed out by a
//! `CoroutineManager`; they are unique per manager, not per process.

use serde::{Deserialize, Serialize};

/// Identifier of a coroutine.
///
/// Ids are allocated by the owning manager, starting at `1` and
/// strictly increasing. The value `-1` is reserved as the "no parent"
/// sentinel and is never allocated to a running coroutine.
///
/// # Example
///
/// ```
/// use strand_types::CoroutineId;
///
/// let id = CoroutineId::from_raw(7);
/// assert_eq!(id.as_i64(), 7);
/// assert_eq!(id.to_string(), "co:7");
/// assert!(CoroutineId::NO_PARENT.is_no_parent());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoroutineId(i64);

impl CoroutineId {
    /// Parent id recorded on a root coroutine.
    pub const NO_PARENT: Self = Self(-1);

    /// Wraps a raw id.
    #[must_use]
    pub const fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    /// Returns the raw id.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self.0
    }

    /// Returns `true` for the [`NO_PARENT`](Self::NO_PARENT) sentinel.
    #[must_use]
    pub const fn is_no_parent(self) -> bool {
        self.0 == Self::NO_PARENT.0
    }
}

impl std::fmt::Display for CoroutineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "co:{}", self.0)
    }
}

impl From<CoroutineId> for i64 {
    fn from(id: CoroutineId) -> Self {
        id.0
    }
}
