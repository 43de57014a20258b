//! Layered configuration.
//!
//! Sources, lowest priority first:
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │  4. Environment variables (STRAND_*)      │
//! ├───────────────────────────────────────────┤
//! │  3. Project file (.strand/config.toml)    │
//! ├───────────────────────────────────────────┤
//! │  2. Global file (~/.strand/config.toml)   │
//! ├───────────────────────────────────────────┤
//! │  1. Compile-time defaults                 │
//! └───────────────────────────────────────────┘
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Field | Type |
//! |----------|-------|------|
//! | `STRAND_DEBUG` | `debug` | bool |
//! | `STRAND_MAX_ALLOWED_SUBCOROUTINES` | `coroutine.max_allowed_subcoroutines` | usize |
//! | `STRAND_MAX_SUBCOROUTINE_EXEC_TIME` | `coroutine.max_subcoroutine_exec_time` | seconds |
//! | `STRAND_ENABLE_COMPLETE_BACKTRACE` | `coroutine.enable_complete_backtrace` | bool |
//!
//! # Example
//!
//! ```toml
//! debug = false
//!
//! [coroutine]
//! max_allowed_subcoroutines = 20
//! max_subcoroutine_exec_time = 10
//! enable_complete_backtrace = true
//! ```

mod error;
mod loader;
mod types;

pub use error::ConfigError;
pub use loader::{save_global_config, ConfigLoader};
pub use types::{CoroutineConfig, StrandConfig};

/// Default global config directory (`~/.strand`).
#[must_use]
pub fn default_config_dir() -> std::path::PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".strand")
}

/// Default global config file path.
#[must_use]
pub fn default_config_path() -> std::path::PathBuf {
    default_config_dir().join(PROJECT_CONFIG_FILE)
}

/// Project config directory name.
pub const PROJECT_CONFIG_DIR: &str = ".strand";

/// Config file name, in both the global and the project directory.
pub const PROJECT_CONFIG_FILE: &str = "config.toml";
