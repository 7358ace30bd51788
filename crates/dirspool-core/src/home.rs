//! Default locations for configuration and queue data
//!
//! # Precedence
//!
//! 1. `DIRSPOOL_HOME` environment variable (if set and non-empty). The
//!    config file is `$DIRSPOOL_HOME/config.toml` and the default queue
//!    root is `$DIRSPOOL_HOME/queue`.
//! 2. Platform directories from `dirs`: `<config dir>/dirspool/config.toml`
//!    and `<local data dir>/dirspool/queue`.
//!
//! Tests should point `DIRSPOOL_HOME` at a temporary directory so they never
//! touch the user's real spool.

use anyhow::{Context, Result};
use std::path::PathBuf;

const APP_DIR: &str = "dirspool";
const CONFIG_FILE: &str = "config.toml";
const QUEUE_DIR: &str = "queue";

/// `DIRSPOOL_HOME`, if set to a non-empty value.
pub fn spool_home() -> Option<PathBuf> {
    let home = std::env::var("DIRSPOOL_HOME").ok()?;
    let trimmed = home.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(PathBuf::from(trimmed))
    }
}

/// Path of the config file used when none is given explicitly.
///
/// The file may not exist.
pub fn default_config_path() -> Result<PathBuf> {
    if let Some(home) = spool_home() {
        return Ok(home.join(CONFIG_FILE));
    }
    let dir = dirs::config_dir().context("Could not determine config directory")?;
    Ok(dir.join(APP_DIR).join(CONFIG_FILE))
}

/// Queue root used when the configuration names no path.
pub fn default_queue_root() -> Result<PathBuf> {
    if let Some(home) = spool_home() {
        return Ok(home.join(QUEUE_DIR));
    }
    let dir = dirs::data_local_dir().context("Could not determine local data directory")?;
    Ok(dir.join(APP_DIR).join(QUEUE_DIR))
}
