//! Configuration management
//!
//! Loads the node and path layout from config.toml at startup:
//!
//! ```toml
//! [global]
//! stats = 1.0            # seconds between periodic stats, 0 disables
//! log_dir = "logs"
//! log_level = "info"
//!
//! [nodes.gen]
//! type = "signal"
//! rate = 100.0
//!
//! [nodes.lo]
//! type = "loopback"
//!
//! [[paths]]
//! in = "gen"
//! out = ["lo"]
//! queuelen = 1024
//! hooks = [{ type = "decimate", ratio = 10 }]
//! ```

use crate::hot_path::hook::HookRegistry;
use crate::hot_path::path::{PathConfig, DEFAULT_QUEUELEN};
use crate::nodes::NodeRegistry;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::{Path as FsPath, PathBuf};

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: GlobalConfig,

    /// Node instances by name, each with a `type` key
    #[serde(default)]
    pub nodes: BTreeMap<String, toml::Table>,

    #[serde(default)]
    pub paths: Vec<PathSection>,
}

/// Process-wide settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GlobalConfig {
    /// Interval of periodic hook callbacks in seconds, 0 disables them
    #[serde(default = "default_stats")]
    pub stats: f64,

    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// One `[[paths]]` entry
#[derive(Debug, Clone, Deserialize)]
pub struct PathSection {
    /// Source node
    #[serde(rename = "in")]
    pub input: String,

    /// Destination nodes, a single name or a list
    #[serde(deserialize_with = "one_or_many")]
    pub out: Vec<String>,

    #[serde(default = "default_queuelen")]
    pub queuelen: usize,

    #[serde(default)]
    pub pool_size: Option<usize>,

    #[serde(default = "default_true")]
    pub builtin: bool,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Hook tables, each with a `type` key
    #[serde(default)]
    pub hooks: Vec<toml::Table>,
}

impl PathSection {
    pub fn path_config(&self) -> PathConfig {
        PathConfig {
            queuelen: self.queuelen,
            pool_size: self.pool_size,
            builtin: self.builtin,
            enabled: self.enabled,
        }
    }
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            stats: default_stats(),
            log_dir: default_log_dir(),
            log_level: default_log_level(),
        }
    }
}

fn default_stats() -> f64 {
    1.0
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_queuelen() -> usize {
    DEFAULT_QUEUELEN
}

fn default_true() -> bool {
    true
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

/// `type` key of a node or hook table
pub fn type_of(table: &toml::Table) -> Option<&str> {
    table.get("type").and_then(|v| v.as_str())
}

impl Config {
    /// Load configuration from the file named by `CONFIG_PATH`
    /// (default `config.toml`)
    ///
    /// If the file doesn't exist, returns default configuration.
    /// # Errors
    /// Returns error if file exists but cannot be parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());

        match Self::from_file(&config_path) {
            Err(ConfigError::IoError(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(target: "engine", "No configuration at {}, starting unconfigured", config_path);
                Ok(Config::default())
            }
            other => other,
        }
    }

    pub fn from_file(path: impl AsRef<FsPath>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::IoError)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Check references and type names against the registries
    ///
    /// Type-specific settings are checked later, when the instances are
    /// created.
    pub fn validate(&self, nodes: &NodeRegistry, hooks: &HookRegistry) -> Result<(), ConfigError> {
        if !self.global.stats.is_finite() || self.global.stats < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "global.stats must be a non-negative number of seconds, got {}",
                self.global.stats
            )));
        }

        for (name, table) in &self.nodes {
            let kind = type_of(table)
                .ok_or_else(|| ConfigError::Invalid(format!("node '{name}' is missing a 'type'")))?;
            if !nodes.contains(kind) {
                return Err(ConfigError::Invalid(format!(
                    "node '{name}' has unknown type '{kind}'"
                )));
            }
        }

        for (i, path) in self.paths.iter().enumerate() {
            for node in std::iter::once(&path.input).chain(&path.out) {
                if !self.nodes.contains_key(node) {
                    return Err(ConfigError::Invalid(format!(
                        "path #{i} references unknown node '{node}'"
                    )));
                }
            }
            if path.out.is_empty() {
                return Err(ConfigError::Invalid(format!("path #{i} has no destinations")));
            }
            for hook in &path.hooks {
                let kind = type_of(hook)
                    .ok_or_else(|| ConfigError::Invalid(format!("hook of path #{i} is missing a 'type'")))?;
                if hooks.lookup(kind).is_none() {
                    return Err(ConfigError::Invalid(format!(
                        "path #{i} uses unknown hook type '{kind}'"
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading file
    IoError(std::io::Error),
    /// Parse error (invalid TOML)
    ParseError(String),
    /// Valid TOML describing an invalid setup
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::ParseError(e) => write!(f, "Failed to parse config: {}", e),
            ConfigError::Invalid(e) => write!(f, "Invalid config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::IoError(e) => Some(e),
            ConfigError::ParseError(_) | ConfigError::Invalid(_) => None,
        }
    }
}
