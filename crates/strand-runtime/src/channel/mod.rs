//! Channels carrying values between coroutines.
//!
//! - [`Channel`]: bounded blocking queue owned by one coroutine
//! - [`Rebind`]: release/rebind hooks for coroutine-affine values
//! - [`Envelope`]: completion record a child pushes to its parent

#[allow(clippy::module_inception)]
mod channel;
mod envelope;
mod error;
mod rebind;

pub use channel::Channel;
pub use envelope::{Envelope, Payload};
pub use error::ChannelError;
pub use rebind::Rebind;
