//! Typed binding registry carried by a [`Context`](super::Context).
//!
//! Collaborators store shared objects here (the inbound request, an
//! authenticated user, a DB pool handle) keyed by their type. Entries
//! marked inheritable are copied into every child context at spawn time.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone)]
struct Binding {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
    inherit: bool,
}

/// Map from type to a shared value of that type.
///
/// # Example
///
/// ```
/// use strand_runtime::Bindings;
///
/// struct RequestPath(String);
/// struct Locale(&'static str);
///
/// let mut parent = Bindings::new();
/// parent.insert(RequestPath("/users".into()), true);
/// parent.insert(Locale("en"), false);
///
/// let child = parent.inheritable();
/// assert_eq!(child.get::<RequestPath>().unwrap().0, "/users");
/// assert!(child.get::<Locale>().is_none());
/// ```
#[derive(Clone, Default)]
pub struct Bindings {
    entries: HashMap<TypeId, Binding>,
}

impl Bindings {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value`, replacing any previous value of the same type.
    ///
    /// When `inherit` is true the value is copied into child contexts.
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T, inherit: bool) -> Option<Arc<T>> {
        self.insert_shared(Arc::new(value), inherit)
    }

    /// Same as [`insert`](Self::insert) for an already shared value.
    pub fn insert_shared<T: Send + Sync + 'static>(
        &mut self,
        value: Arc<T>,
        inherit: bool,
    ) -> Option<Arc<T>> {
        let previous = self.entries.insert(
            TypeId::of::<T>(),
            Binding {
                value,
                type_name: std::any::type_name::<T>(),
                inherit,
            },
        );
        previous.and_then(|b| b.value.downcast::<T>().ok())
    }

    /// Returns the value bound for `T`.
    #[must_use]
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.entries
            .get(&TypeId::of::<T>())
            .and_then(|b| Arc::clone(&b.value).downcast::<T>().ok())
    }

    /// Returns `true` if a value is bound for `T`.
    #[must_use]
    pub fn contains<T: 'static>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }

    /// Removes and returns the value bound for `T`.
    pub fn remove<T: Send + Sync + 'static>(&mut self) -> Option<Arc<T>> {
        self.entries
            .remove(&TypeId::of::<T>())
            .and_then(|b| b.value.downcast::<T>().ok())
    }

    /// Point-in-time copy of the inheritable entries.
    ///
    /// The copy shares the values (same `Arc`s) but not the table:
    /// later inserts or removals on either side are invisible to the other.
    #[must_use]
    pub fn inheritable(&self) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|(_, b)| b.inherit)
                .map(|(k, b)| (*k, b.clone()))
                .collect(),
        }
    }

    /// Drops every entry, returning how many there were.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    /// Number of bound types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names of the bound types, sorted.
    #[must_use]
    pub fn type_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.entries.values().map(|b| b.type_name).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for Bindings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.type_names()).finish()
    }
}
