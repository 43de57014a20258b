//! Live-descendant accounting for one root coroutine tree.

use super::CoroutineError;
use std::sync::atomic::{AtomicUsize, Ordering};
use strand_types::CoroutineId;

/// Counter shared by every context of one root tree.
///
/// A slot is taken when a sub-coroutine is created and given back when
/// its context is torn down.
#[derive(Debug)]
pub(crate) struct SubcoroutineSlots {
    root: CoroutineId,
    limit: usize,
    live: AtomicUsize,
}

impl SubcoroutineSlots {
    pub(crate) fn new(root: CoroutineId, limit: usize) -> Self {
        Self {
            root,
            limit,
            live: AtomicUsize::new(0),
        }
    }

    /// Takes a slot, or fails without side effects if none is free.
    pub(crate) fn try_acquire(&self) -> Result<(), CoroutineError> {
        self.live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                (live < self.limit).then_some(live + 1)
            })
            .map(|_| ())
            .map_err(|_| CoroutineError::ResourceExhausted {
                root: self.root,
                limit: self.limit,
            })
    }

    pub(crate) fn release(&self) {
        // Saturating: a double release must not wrap around.
        let _ = self
            .live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| live.checked_sub(1));
    }

    pub(crate) fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }
}
