//! Layered config loading.

use super::{
    default_config_path, ConfigError, StrandConfig, PROJECT_CONFIG_DIR, PROJECT_CONFIG_FILE,
};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Reads `$var` and, if set, stores it parsed into `$field`.
macro_rules! parse_env {
    ($field:expr, $var:literal, $parse:expr, $expected:literal) => {
        if let Ok(val) = std::env::var($var) {
            $field = $parse(&val).ok_or_else(|| ConfigError::invalid_env_var($var, $expected))?;
        }
    };
}

/// Builder that merges defaults, files and environment overrides.
///
/// ```no_run
/// use strand_runtime::config::ConfigLoader;
///
/// let config = ConfigLoader::new()
///     .with_project_root("/srv/app")
///     .load()?;
/// # Ok::<(), strand_runtime::config::ConfigError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    /// Overrides `~/.strand/config.toml`.
    global_config_path: Option<PathBuf>,
    project_root: Option<PathBuf>,
    skip_env: bool,
    skip_global: bool,
    skip_project: bool,
}

impl ConfigLoader {
    /// Creates a loader that reads every layer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the global layer from `path` instead of the home directory.
    #[must_use]
    pub fn with_global_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.global_config_path = Some(path.into());
        self
    }

    /// Reads the project layer from `<path>/.strand/config.toml`.
    #[must_use]
    pub fn with_project_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.project_root = Some(path.into());
        self
    }

    /// Ignores `STRAND_*` variables.
    #[must_use]
    pub fn skip_env_vars(mut self) -> Self {
        self.skip_env = true;
        self
    }

    #[must_use]
    pub fn skip_global_config(mut self) -> Self {
        self.skip_global = true;
        self
    }

    #[must_use]
    pub fn skip_project_config(mut self) -> Self {
        self.skip_project = true;
        self
    }

    /// Loads and merges every enabled layer.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a file exists but cannot be read or
    /// parsed, or when an environment override is malformed. Missing
    /// files are skipped.
    pub fn load(&self) -> Result<StrandConfig, ConfigError> {
        let mut config = StrandConfig::default();

        if !self.skip_global {
            let path = self
                .global_config_path
                .clone()
                .unwrap_or_else(default_config_path);

            if let Some(global) = load_file(&path)? {
                debug!(path = %path.display(), "Loaded global config");
                config.merge(&global);
            }
        }

        if !self.skip_project {
            if let Some(root) = &self.project_root {
                let path = root.join(PROJECT_CONFIG_DIR).join(PROJECT_CONFIG_FILE);
                if let Some(project) = load_file(&path)? {
                    debug!(path = %path.display(), "Loaded project config");
                    config.merge(&project);
                }
            }
        }

        if !self.skip_env {
            apply_env_vars(&mut config)?;
        }

        Ok(config)
    }
}

fn load_file(path: &Path) -> Result<Option<StrandConfig>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
    let config = StrandConfig::from_toml(&content).map_err(|e| ConfigError::parse_toml(path, e))?;
    Ok(Some(config))
}

fn apply_env_vars(config: &mut StrandConfig) -> Result<(), ConfigError> {
    parse_env!(config.debug, "STRAND_DEBUG", parse_bool, "expected bool");
    parse_env!(
        config.coroutine.enable_complete_backtrace,
        "STRAND_ENABLE_COMPLETE_BACKTRACE",
        parse_bool,
        "expected bool"
    );
    parse_env!(
        config.coroutine.max_allowed_subcoroutines,
        "STRAND_MAX_ALLOWED_SUBCOROUTINES",
        parse_number::<usize>,
        "expected non-negative integer"
    );
    parse_env!(
        config.coroutine.max_subcoroutine_exec_time,
        "STRAND_MAX_SUBCOROUTINE_EXEC_TIME",
        parse_number::<u64>,
        "expected seconds as non-negative integer"
    );
    Ok(())
}

/// Accepts true/false, 1/0, yes/no, on/off in any case.
fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_number<T: FromStr>(s: &str) -> Option<T> {
    s.trim().parse().ok()
}

/// Writes `config` to `~/.strand/config.toml`, creating the directory.
///
/// # Errors
///
/// Returns [`ConfigError`] if the directory or file cannot be written.
pub fn save_global_config(config: &StrandConfig) -> Result<PathBuf, ConfigError> {
    let path = default_config_path();
    write_config(config, &path)?;
    Ok(path)
}

fn write_config(config: &StrandConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }
    }

    let toml = config.to_toml()?;
    std::fs::write(path, toml).map_err(|e| ConfigError::write_file(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoroutineConfig;
    use strand_types::ErrorCode;
    use tempfile::TempDir;

    fn write(dir: &Path, content: &str) -> PathBuf {
        let path = dir.join(PROJECT_CONFIG_FILE);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn files_only() -> ConfigLoader {
        ConfigLoader::new().skip_env_vars()
    }

    #[test]
    fn defaults_only() {
        let config = files_only()
            .skip_global_config()
            .skip_project_config()
            .load()
            .unwrap();
        assert_eq!(config, StrandConfig::default());
    }

    #[test]
    fn global_file_is_applied() {
        let temp = TempDir::new().unwrap();
        let path = write(temp.path(), "[coroutine]\nmax_subcoroutine_exec_time = 2\n");

        let config = files_only()
            .with_global_config(&path)
            .skip_project_config()
            .load()
            .unwrap();
        assert_eq!(config.coroutine.max_subcoroutine_exec_time, 2);
    }

    #[test]
    fn project_overrides_global() {
        let global = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        let project_dir = project.path().join(PROJECT_CONFIG_DIR);
        std::fs::create_dir_all(&project_dir).unwrap();

        let global_path = write(
            global.path(),
            "debug = true\n[coroutine]\nmax_allowed_subcoroutines = 50\n",
        );
        write(&project_dir, "[coroutine]\nmax_allowed_subcoroutines = 5\n");

        let config = files_only()
            .with_global_config(&global_path)
            .with_project_root(project.path())
            .load()
            .unwrap();

        assert!(config.debug);
        assert_eq!(config.coroutine.max_allowed_subcoroutines, 5);
    }

    #[test]
    fn missing_files_are_skipped() {
        let config = files_only()
            .with_global_config("/nonexistent/strand/config.toml")
            .with_project_root("/nonexistent/project")
            .load()
            .unwrap();
        assert_eq!(config, StrandConfig::default());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = write(temp.path(), "[coroutine\n");

        let err = files_only()
            .with_global_config(&path)
            .skip_project_config()
            .load()
            .unwrap_err();
        assert_eq!(err.code(), "CONFIG_PARSE_TOML");
    }

    #[test]
    fn write_then_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join(PROJECT_CONFIG_FILE);
        let config = StrandConfig {
            debug: true,
            coroutine: CoroutineConfig {
                enable_complete_backtrace: false,
                ..Default::default()
            },
        };

        write_config(&config, &path).unwrap();
        let loaded = files_only()
            .with_global_config(&path)
            .skip_project_config()
            .load()
            .unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn parse_bool_values() {
        for yes in ["true", "TRUE", "1", "yes", "on", " true "] {
            assert_eq!(parse_bool(yes), Some(true), "{yes}");
        }
        for no in ["false", "0", "No", "off"] {
            assert_eq!(parse_bool(no), Some(false), "{no}");
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_number_values() {
        assert_eq!(parse_number::<usize>("20"), Some(20));
        assert_eq!(parse_number::<u64>(" 7 "), Some(7));
        assert_eq!(parse_number::<usize>("-1"), None);
        assert_eq!(parse_number::<u64>("ten"), None);
    }

    // Only test touching STRAND_* variables, so it cannot race the others.
    #[test]
    fn env_vars_override_files() {
        std::env::set_var("STRAND_MAX_ALLOWED_SUBCOROUTINES", "3");
        std::env::set_var("STRAND_ENABLE_COMPLETE_BACKTRACE", "off");

        let loaded = ConfigLoader::new()
            .skip_global_config()
            .skip_project_config()
            .load();

        std::env::set_var("STRAND_MAX_SUBCOROUTINE_EXEC_TIME", "soon");
        let malformed = ConfigLoader::new()
            .skip_global_config()
            .skip_project_config()
            .load();

        std::env::remove_var("STRAND_MAX_ALLOWED_SUBCOROUTINES");
        std::env::remove_var("STRAND_ENABLE_COMPLETE_BACKTRACE");
        std::env::remove_var("STRAND_MAX_SUBCOROUTINE_EXEC_TIME");

        let config = loaded.unwrap();
        assert_eq!(config.coroutine.max_allowed_subcoroutines, 3);
        assert!(!config.coroutine.enable_complete_backtrace);

        let err = malformed.unwrap_err();
        assert_eq!(err.code(), "CONFIG_INVALID_ENV_VAR");
        assert!(err.to_string().contains("STRAND_MAX_SUBCOROUTINE_EXEC_TIME"));
    }
}
