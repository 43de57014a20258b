//! Bounded blocking channel owned by one coroutine.

use super::{ChannelError, Rebind};
use parking_lot::Mutex;
use std::time::Duration;
use strand_types::CoroutineId;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{SendTimeoutError, TryRecvError};

/// Fixed-capacity queue that a coroutine's children report into.
///
/// Any coroutine may push; only the owner is expected to pop. Values
/// pass through [`Rebind::release`] (with the pushing coroutine's id)
/// before they are enqueued and [`Rebind::rebind`] (with the owner's id)
/// after they are dequeued.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use strand_runtime::{Channel, ChannelError};
/// use strand_types::CoroutineId;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let channel = Channel::new(CoroutineId::from_raw(1), 4);
///
/// channel.push(7_u32, Duration::from_millis(10)).await.unwrap();
/// assert_eq!(channel.pop(Duration::from_millis(10)).await, Ok(7));
///
/// // Nothing left: the not-ready result, not a value.
/// assert_eq!(
///     channel.pop(Duration::from_millis(10)).await,
///     Err(ChannelError::NotReady)
/// );
/// # }
/// ```
pub struct Channel<T> {
    owner: CoroutineId,
    capacity: usize,
    tx: Mutex<Option<mpsc::Sender<T>>>,
    rx: tokio::sync::Mutex<mpsc::Receiver<T>>,
}

impl<T: Rebind> Channel<T> {
    /// Creates a channel owned by `owner`.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn new(owner: CoroutineId, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            owner,
            capacity,
            tx: Mutex::new(Some(tx)),
            rx: tokio::sync::Mutex::new(rx),
        }
    }

    /// Pushes `value`, waiting up to `timeout` for free space.
    ///
    /// The release hook sees the calling coroutine's id, or
    /// [`CoroutineId::NO_PARENT`] when pushed from outside any coroutine.
    ///
    /// # Errors
    ///
    /// - [`ChannelError::Closed`] if the owner closed the channel
    /// - [`ChannelError::Full`] if no slot freed up in time
    pub async fn push(&self, mut value: T, timeout: Duration) -> Result<(), ChannelError> {
        let tx = self.tx.lock().clone().ok_or(ChannelError::Closed)?;

        let from = crate::coroutine::current_id().unwrap_or(CoroutineId::NO_PARENT);
        value.release(from);
        match tx.send_timeout(value, timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(ChannelError::Full { timeout }),
            Err(SendTimeoutError::Closed(_)) => Err(ChannelError::Closed),
        }
    }

    /// Pops the next value, waiting up to `timeout`.
    ///
    /// # Errors
    ///
    /// - [`ChannelError::NotReady`] if nothing arrived in time
    /// - [`ChannelError::Closed`] if the channel is closed and drained
    pub async fn pop(&self, timeout: Duration) -> Result<T, ChannelError> {
        let received = tokio::time::timeout(timeout, async {
            let mut rx = self.rx.lock().await;
            rx.recv().await
        })
        .await;

        match received {
            Ok(Some(value)) => Ok(self.adopt(value)),
            Ok(None) => Err(ChannelError::Closed),
            Err(_) => Err(ChannelError::NotReady),
        }
    }

    /// Pops a value only if one is buffered right now.
    ///
    /// # Errors
    ///
    /// Same as [`pop`](Self::pop); `NotReady` is also returned while
    /// another task is blocked in `pop`.
    pub fn try_pop(&self) -> Result<T, ChannelError> {
        let mut rx = self.rx.try_lock().map_err(|_| ChannelError::NotReady)?;
        match rx.try_recv() {
            Ok(value) => Ok(self.adopt(value)),
            Err(TryRecvError::Empty) => Err(ChannelError::NotReady),
            Err(TryRecvError::Disconnected) => Err(ChannelError::Closed),
        }
    }

    fn adopt(&self, mut value: T) -> T {
        value.rebind(self.owner);
        value
    }
}

impl<T> Channel<T> {
    /// Closes the channel. Returns `false` if it was already closed.
    ///
    /// Buffered values stay poppable; new pushes fail.
    pub fn close(&self) -> bool {
        self.tx.lock().take().is_some()
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.lock().is_none()
    }

    /// Number of buffered values.
    ///
    /// Approximate under concurrent use. Reads 0 while the owner is
    /// blocked in `pop` on a closed channel.
    #[must_use]
    pub fn len(&self) -> usize {
        if let Some(tx) = self.tx.lock().as_ref() {
            return tx.max_capacity() - tx.capacity();
        }
        self.rx.try_lock().map_or(0, |rx| rx.len())
    }

    /// Returns `true` if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the fixed capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the coroutine that owns (pops from) this channel.
    #[must_use]
    pub fn owner(&self) -> CoroutineId {
        self.owner
    }
}

impl<T> std::fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("owner", &self.owner)
            .field("capacity", &self.capacity)
            .field("closed", &self.is_closed())
            .finish()
    }
}
