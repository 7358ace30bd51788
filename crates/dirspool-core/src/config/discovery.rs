//! Configuration discovery and resolution

use super::types::Config;
use crate::queue::QueueKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Explicitly requested config file does not exist
    #[error("Configuration not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// Environment variable holds an unusable value
    #[error("Invalid value for {name}: {value:?}")]
    InvalidEnv { name: &'static str, value: String },
}

/// Caller-supplied overrides (e.g. command-line flags)
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    /// Path to config file override
    pub config_path: Option<PathBuf>,
    /// Override queue variant
    pub kind: Option<QueueKind>,
    /// Override queue root
    pub path: Option<PathBuf>,
    /// Override bucket capacity
    pub max_elements: Option<usize>,
    /// Override consumer token
    pub consumer: Option<String>,
}

/// Resolve configuration from all sources
///
/// Priority (highest to lowest):
/// 1. Caller overrides
/// 2. Environment variables (`DIRSPOOL_PATH`, `DIRSPOOL_KIND`,
///    `DIRSPOOL_MAX_ELEMENTS`, `DIRSPOOL_CONSUMER`)
/// 3. Config file (`overrides.config_path`, else the default location)
/// 4. Defaults
///
/// A default-location file that fails to parse is skipped with a warning.
/// An explicit `config_path` must exist and parse.
pub fn resolve_config(overrides: &ConfigOverrides) -> Result<Config, ConfigError> {
    let mut config = Config::default();

    // 3. Config file
    match &overrides.config_path {
        Some(path) => {
            if !path.exists() {
                return Err(ConfigError::NotFound { path: path.clone() });
            }
            config = load_config_file(path)?;
        }
        None => match crate::home::default_config_path() {
            Ok(path) if path.exists() => match load_config_file(&path) {
                Ok(file_config) => config = file_config,
                Err(e) => warn!("Failed to parse config at {path:?}: {e}"),
            },
            Ok(_) => {}
            Err(e) => debug!("No default config location: {e:#}"),
        },
    }

    // 2. Environment
    apply_env_overrides(&mut config)?;

    // 1. Overrides
    apply_overrides(&mut config, overrides);

    Ok(config)
}

/// Load config from a TOML file
pub fn load_config_file(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    Ok(config)
}

fn env_value(name: &str) -> Option<String> {
    let value = std::env::var(name).ok()?;
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Apply environment variable overrides
fn apply_env_overrides(config: &mut Config) -> Result<(), ConfigError> {
    if let Some(path) = env_value("DIRSPOOL_PATH") {
        config.queue.path = Some(PathBuf::from(path));
    }

    if let Some(kind) = env_value("DIRSPOOL_KIND") {
        config.queue.kind = kind.parse().map_err(|_| ConfigError::InvalidEnv {
            name: "DIRSPOOL_KIND",
            value: kind.clone(),
        })?;
    }

    if let Some(max) = env_value("DIRSPOOL_MAX_ELEMENTS") {
        config.queue.max_elements = max.parse().map_err(|_| ConfigError::InvalidEnv {
            name: "DIRSPOOL_MAX_ELEMENTS",
            value: max.clone(),
        })?;
    }

    if let Some(consumer) = env_value("DIRSPOOL_CONSUMER") {
        config.queue.consumer = Some(consumer);
    }

    Ok(())
}

fn apply_overrides(config: &mut Config, overrides: &ConfigOverrides) {
    if let Some(kind) = overrides.kind {
        config.queue.kind = kind;
    }

    if let Some(ref path) = overrides.path {
        config.queue.path = Some(path.clone());
    }

    if let Some(max) = overrides.max_elements {
        config.queue.max_elements = max;
    }

    if let Some(ref consumer) = overrides.consumer {
        config.queue.consumer = Some(consumer.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tempfile::TempDir;

    const VARS: [&str; 5] = [
        "DIRSPOOL_HOME",
        "DIRSPOOL_PATH",
        "DIRSPOOL_KIND",
        "DIRSPOOL_MAX_ELEMENTS",
        "DIRSPOOL_CONSUMER",
    ];

    /// Point DIRSPOOL_HOME at a fresh directory and clear the rest.
    fn isolated_env() -> TempDir {
        let home = TempDir::new().unwrap();
        unsafe {
            for var in VARS {
                env::remove_var(var);
            }
            env::set_var("DIRSPOOL_HOME", home.path());
        }
        home
    }

    fn clear_env() {
        unsafe {
            for var in VARS {
                env::remove_var(var);
            }
        }
    }

    #[test]
    #[serial]
    fn test_config_defaults() {
        let _home = isolated_env();

        let config = resolve_config(&ConfigOverrides::default()).unwrap();
        assert_eq!(config, Config::default());

        clear_env();
    }

    #[test]
    #[serial]
    fn test_home_config_file_loaded() {
        let home = isolated_env();
        std::fs::write(
            home.path().join("config.toml"),
            "[queue]\nkind = \"simple\"\nmax_elements = 10\n",
        )
        .unwrap();

        let config = resolve_config(&ConfigOverrides::default()).unwrap();
        assert_eq!(config.queue.kind, QueueKind::Simple);
        assert_eq!(config.queue.max_elements, 10);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_malformed_home_config_skipped() {
        let home = isolated_env();
        std::fs::write(home.path().join("config.toml"), "invalid toml [[[").unwrap();

        let config = resolve_config(&ConfigOverrides::default()).unwrap();
        assert_eq!(config, Config::default());

        clear_env();
    }

    #[test]
    #[serial]
    fn test_explicit_config_path() {
        let _home = isolated_env();
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("spool.toml");
        std::fs::write(&config_path, "[queue]\nconsumer = \"from-file\"\n").unwrap();

        let overrides = ConfigOverrides {
            config_path: Some(config_path),
            ..ConfigOverrides::default()
        };
        let config = resolve_config(&overrides).unwrap();
        assert_eq!(config.queue.consumer.as_deref(), Some("from-file"));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_explicit_config_path_errors() {
        let _home = isolated_env();
        let temp_dir = TempDir::new().unwrap();

        let missing = ConfigOverrides {
            config_path: Some(temp_dir.path().join("missing.toml")),
            ..ConfigOverrides::default()
        };
        assert!(matches!(
            resolve_config(&missing),
            Err(ConfigError::NotFound { .. })
        ));

        let bad_path = temp_dir.path().join("bad.toml");
        std::fs::write(&bad_path, "[queue\n").unwrap();
        let malformed = ConfigOverrides {
            config_path: Some(bad_path),
            ..ConfigOverrides::default()
        };
        assert!(matches!(
            resolve_config(&malformed),
            Err(ConfigError::TomlParse(_))
        ));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        let home = isolated_env();
        std::fs::write(
            home.path().join("config.toml"),
            "[queue]\nkind = \"simple\"\npath = \"/from/file\"\n",
        )
        .unwrap();

        unsafe {
            env::set_var("DIRSPOOL_PATH", "/from/env");
            env::set_var("DIRSPOOL_KIND", "dqn");
            env::set_var("DIRSPOOL_MAX_ELEMENTS", "42");
            env::set_var("DIRSPOOL_CONSUMER", "env-worker");
        }

        let config = resolve_config(&ConfigOverrides::default()).unwrap();
        assert_eq!(config.queue.path, Some(PathBuf::from("/from/env")));
        assert_eq!(config.queue.kind, QueueKind::Normal);
        assert_eq!(config.queue.max_elements, 42);
        assert_eq!(config.queue.consumer.as_deref(), Some("env-worker"));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_env_value() {
        let _home = isolated_env();
        unsafe {
            env::set_var("DIRSPOOL_MAX_ELEMENTS", "lots");
        }

        let err = resolve_config(&ConfigOverrides::default()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnv { name: "DIRSPOOL_MAX_ELEMENTS", .. }
        ));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_overrides_beat_env() {
        let _home = isolated_env();
        unsafe {
            env::set_var("DIRSPOOL_PATH", "/from/env");
            env::set_var("DIRSPOOL_KIND", "simple");
        }

        let overrides = ConfigOverrides {
            kind: Some(QueueKind::Null),
            path: Some(PathBuf::from("/from/cli")),
            max_elements: Some(7),
            consumer: Some("cli".to_string()),
            config_path: None,
        };
        let config = resolve_config(&overrides).unwrap();
        assert_eq!(config.queue.kind, QueueKind::Null);
        assert_eq!(config.queue.path, Some(PathBuf::from("/from/cli")));
        assert_eq!(config.queue.max_elements, 7);
        assert_eq!(config.queue.consumer.as_deref(), Some("cli"));

        clear_env();
    }
}
