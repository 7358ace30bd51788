//! Configuration types

use crate::message::{Compression, SerializeOptions};
use crate::queue::{
    PurgeOptions, QueueError, QueueKind, DEFAULT_MAX_ELEMENTS, DEFAULT_MAX_LOCK_AGE,
    DEFAULT_MAX_TEMP_AGE,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Queue selection and layout
    #[serde(default)]
    pub queue: QueueConfig,
    /// Purge thresholds
    #[serde(default)]
    pub purge: PurgeConfig,
    /// Message serialization
    #[serde(default)]
    pub message: MessageConfig,
}

/// Queue configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Queue variant
    #[serde(default)]
    pub kind: QueueKind,
    /// Queue root (default: see [`crate::home::default_queue_root`])
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Bucket capacity for the normal queue
    #[serde(default = "default_max_elements")]
    pub max_elements: usize,
    /// Stable consumer token; a random one is generated per handle if unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer: Option<String>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            kind: QueueKind::default(),
            path: None,
            max_elements: DEFAULT_MAX_ELEMENTS,
            consumer: None,
        }
    }
}

impl QueueConfig {
    /// Configured queue root, or the platform default.
    pub fn root(&self) -> Result<PathBuf, QueueError> {
        match &self.path {
            Some(path) => Ok(path.clone()),
            None => crate::home::default_queue_root().map_err(|e| QueueError::InvalidConfig {
                message: format!("{e:#}"),
            }),
        }
    }
}

fn default_max_elements() -> usize {
    DEFAULT_MAX_ELEMENTS
}

/// Purge configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeConfig {
    /// Age after which a locked element is unlocked ("10m", "1h", ...)
    #[serde(default = "default_max_lock_age")]
    pub max_lock_age: String,
    /// Age after which a temporary element is removed
    #[serde(default = "default_max_temp_age")]
    pub max_temp_age: String,
}

impl Default for PurgeConfig {
    fn default() -> Self {
        Self {
            max_lock_age: default_max_lock_age(),
            max_temp_age: default_max_temp_age(),
        }
    }
}

impl PurgeConfig {
    /// Parse the duration strings into purge options.
    pub fn options(&self) -> Result<PurgeOptions> {
        Ok(PurgeOptions {
            max_lock_age: parse_duration(&self.max_lock_age)
                .context("Invalid purge.max_lock_age")?,
            max_temp_age: parse_duration(&self.max_temp_age)
                .context("Invalid purge.max_temp_age")?,
        })
    }
}

fn default_max_lock_age() -> String {
    format!("{}s", DEFAULT_MAX_LOCK_AGE.as_secs())
}

fn default_max_temp_age() -> String {
    format!("{}s", DEFAULT_MAX_TEMP_AGE.as_secs())
}

/// Message configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageConfig {
    /// Body compression for `add_message`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<Compression>,
}

impl MessageConfig {
    pub fn serialize_options(&self) -> SerializeOptions {
        SerializeOptions {
            compression: self.compression,
        }
    }
}

/// Parse a duration string like "30s", "10m", "24h" or "7d".
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        anyhow::bail!("Empty duration string");
    }

    let (num_part, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => (&s[..idx], &s[idx..]),
        None => anyhow::bail!("Duration must have a unit (s, m, h or d): {s}"),
    };

    let num: u64 = num_part
        .parse()
        .with_context(|| format!("Invalid number in duration: {s}"))?;

    let scale = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        _ => anyhow::bail!("Unknown duration unit '{unit}'. Use 's', 'm', 'h' or 'd'"),
    };
    let secs = num
        .checked_mul(scale)
        .with_context(|| format!("Duration out of range: {s}"))?;
    Ok(Duration::from_secs(secs))
}
