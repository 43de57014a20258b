//! Configuration types.
//!
//! Every type implements [`Default`] with the compile-time fallback values.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Merged configuration after all layers have been applied.
///
/// Every field is optional in a config file.
///
/// ```
/// use strand_runtime::config::StrandConfig;
///
/// let config = StrandConfig::from_toml("[coroutine]\nmax_allowed_subcoroutines = 4").unwrap();
/// assert_eq!(config.coroutine.max_allowed_subcoroutines, 4);
/// assert_eq!(config.coroutine.max_subcoroutine_exec_time, 10);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StrandConfig {
    /// Debug mode (verbose logging).
    pub debug: bool,

    /// Coroutine manager limits.
    pub coroutine: CoroutineConfig,
}

impl StrandConfig {
    /// Creates a config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serializes to a TOML string.
    ///
    /// # Errors
    ///
    /// Returns the serializer error.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Parses a TOML string.
    ///
    /// # Errors
    ///
    /// Returns the parse error.
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Overlays `other` onto `self`.
    ///
    /// A field of `other` wins only when it differs from its default,
    /// so a sparse file does not reset values set by a lower layer.
    pub fn merge(&mut self, other: &Self) {
        if other.debug != Self::default().debug {
            self.debug = other.debug;
        }
        self.coroutine.merge(&other.coroutine);
    }
}

/// Limits applied by a [`CoroutineManager`](crate::CoroutineManager).
///
/// ```toml
/// [coroutine]
/// max_allowed_subcoroutines = 20
/// max_subcoroutine_exec_time = 10
/// enable_complete_backtrace = true
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CoroutineConfig {
    /// Ceiling on live descendants per root coroutine. Also the
    /// capacity of every context's channel.
    pub max_allowed_subcoroutines: usize,

    /// Default join timeout, in seconds.
    pub max_subcoroutine_exec_time: u64,

    /// Capture a backtrace wherever a coroutine is created.
    pub enable_complete_backtrace: bool,
}

impl Default for CoroutineConfig {
    fn default() -> Self {
        Self {
            max_allowed_subcoroutines: 20,
            max_subcoroutine_exec_time: 10,
            enable_complete_backtrace: true,
        }
    }
}

impl CoroutineConfig {
    /// Join timeout as a [`Duration`].
    #[must_use]
    pub fn exec_timeout(&self) -> Duration {
        Duration::from_secs(self.max_subcoroutine_exec_time)
    }

    fn merge(&mut self, other: &Self) {
        let default = Self::default();

        if other.max_allowed_subcoroutines != default.max_allowed_subcoroutines {
            self.max_allowed_subcoroutines = other.max_allowed_subcoroutines;
        }
        if other.max_subcoroutine_exec_time != default.max_subcoroutine_exec_time {
            self.max_subcoroutine_exec_time = other.max_subcoroutine_exec_time;
        }
        if other.enable_complete_backtrace != default.enable_complete_backtrace {
            self.enable_complete_backtrace = other.enable_complete_backtrace;
        }
    }
}
