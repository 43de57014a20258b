//! Ownership hand-over for values crossing a coroutine boundary.
//!
//! Some values are bound to the coroutine that created them (a pooled
//! database connection, a statement cursor). When such a value travels
//! through a [`Channel`](super::Channel) it is released on the sending
//! side, while the sender's context is still alive, and rebound to the
//! receiving coroutine on the other side.

use strand_types::CoroutineId;

/// Capability of a value that can move between coroutines.
///
/// Both hooks default to no-ops, so plain data only needs an empty
/// `impl Rebind for MyType {}`.
///
/// # Example
///
/// ```
/// use strand_runtime::Rebind;
/// use strand_types::CoroutineId;
///
/// struct Cursor {
///     owner: Option<CoroutineId>,
/// }
///
/// impl Rebind for Cursor {
///     fn release(&mut self, _from: CoroutineId) {
///         self.owner = None;
///     }
///
///     fn rebind(&mut self, new_owner: CoroutineId) {
///         self.owner = Some(new_owner);
///     }
/// }
/// ```
pub trait Rebind: Send + 'static {
    /// Runs on the sending coroutine `from` right before the value is pushed.
    ///
    /// A child's context is still alive here, so a handle attached to it
    /// can be detached before teardown force-releases it.
    fn release(&mut self, _from: CoroutineId) {}

    /// Runs on the receiving side right after the value is popped.
    fn rebind(&mut self, _new_owner: CoroutineId) {}
}

macro_rules! plain_rebind {
    ($($ty:ty),* $(,)?) => {
        $(impl Rebind for $ty {})*
    };
}

plain_rebind!(
    (),
    bool,
    char,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    f32,
    f64,
    String,
    &'static str,
    serde_json::Value,
);

impl<T: Rebind> Rebind for Option<T> {
    fn release(&mut self, from: CoroutineId) {
        if let Some(value) = self {
            value.release(from);
        }
    }

    fn rebind(&mut self, new_owner: CoroutineId) {
        if let Some(value) = self {
            value.rebind(new_owner);
        }
    }
}

impl<T: Rebind> Rebind for Vec<T> {
    fn release(&mut self, from: CoroutineId) {
        for value in self {
            value.release(from);
        }
    }

    fn rebind(&mut self, new_owner: CoroutineId) {
        for value in self {
            value.rebind(new_owner);
        }
    }
}

impl<T: Rebind + ?Sized> Rebind for Box<T> {
    fn release(&mut self, from: CoroutineId) {
        (**self).release(from);
    }

    fn rebind(&mut self, new_owner: CoroutineId) {
        (**self).rebind(new_owner);
    }
}

impl<A: Rebind, B: Rebind> Rebind for (A, B) {
    fn release(&mut self, from: CoroutineId) {
        self.0.release(from);
        self.1.release(from);
    }

    fn rebind(&mut self, new_owner: CoroutineId) {
        self.0.rebind(new_owner);
        self.1.rebind(new_owner);
    }
}

impl<A: Rebind, B: Rebind, C: Rebind> Rebind for (A, B, C) {
    fn release(&mut self, from: CoroutineId) {
        self.0.release(from);
        self.1.release(from);
        self.2.release(from);
    }

    fn rebind(&mut self, new_owner: CoroutineId) {
        self.0.rebind(new_owner);
        self.1.rebind(new_owner);
        self.2.rebind(new_owner);
    }
}
