//! Strand Runtime - coroutine orchestration core.
//!
//! Hierarchical coroutines on top of tokio: every coroutine gets a
//! [`Context`] holding its resources, connections, typed bindings and
//! a [`Channel`] its children report into. The [`CoroutineManager`]
//! spawns them, enforces the per-root ceiling, joins fan-outs back into
//! caller order and tears every context down exactly once.
//!
//! # Architecture
//!
//! ```text
//! CoroutineManager
//!   ├── root Context (co:1)          init(request, body)
//!   │     ├── Resources / connections
//!   │     ├── Bindings (request, inheritable)
//!   │     └── Channel<Envelope>  ◄───────────────┐
//!   │                                             │ {key, outcome}
//!   ├── child Context (co:2)  parent = co:1  ─────┤
//!   └── child Context (co:3)  parent = co:1  ─────┘
//! ```
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use strand_runtime::{current, BoxError, CoroutineManager, Resource, ResourceError};
//!
//! struct Conn;
//!
//! impl Resource for Conn {
//!     fn force_release(&self) -> Result<(), ResourceError> {
//!         Ok(())
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), strand_runtime::CoroutineError> {
//! let manager = CoroutineManager::default();
//! let worker = manager.clone();
//!
//! let rows = manager
//!     .init(String::from("/users"), async move {
//!         worker
//!             .execute_multi((0..2_u32).map(|shard| async move {
//!                 let ctx = current()?;
//!                 ctx.assign_connection(Arc::new(Conn))?;
//!                 let path = ctx.binding::<String>()?.map(|p| p.len()).unwrap_or(0);
//!                 Ok::<_, BoxError>(shard * 10 + path as u32)
//!             }))
//!             .await
//!     })
//!     .await?;
//!
//! assert_eq!(rows, vec![6, 16]);
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod config;
pub mod context;
pub mod coroutine;
pub mod resource;

pub use channel::{Channel, ChannelError, Envelope, Payload, Rebind};
pub use config::{ConfigError, ConfigLoader, CoroutineConfig, StrandConfig};
pub use context::{BacktraceFrame, Bindings, Context, FullBacktrace, TraceSegment};
pub use coroutine::{
    current, current_id, current_manager, BoxError, ChildFailure, CoroutineError,
    CoroutineManager, CoroutineState, CoroutineStats,
};
pub use resource::{AsAnyArc, ReleaseReport, Resource, ResourceError, Resources};
