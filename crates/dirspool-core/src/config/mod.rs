//! Configuration resolution
//!
//! Resolves configuration from multiple sources with priority:
//! 1. Caller overrides (passed as parameters)
//! 2. Environment variables
//! 3. Config file (`$DIRSPOOL_HOME/config.toml` or the platform config dir)
//! 4. Defaults

mod discovery;
mod types;

pub use discovery::{load_config_file, resolve_config, ConfigError, ConfigOverrides};
pub use types::{parse_duration, Config, MessageConfig, PurgeConfig, QueueConfig};
