//! Database configuration.
//!
//! Precedence: explicit values > environment (`NEXUS_LINQ_*`) > config file > defaults.

use crate::errors::DbError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Install the log4rs configuration when the database opens.
    pub enabled: bool,
    /// Base directory for log files; current directory when unset.
    pub dir: Option<PathBuf>,
    /// error|warn|info|debug|trace
    pub level: String,
    /// Number of rolled files to keep.
    pub retention: u32,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { enabled: false, dir: None, level: "info".into(), retention: 7 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Executions at or above this many milliseconds log a warning; 0 disables.
    pub slow_query_ms: u64,
    /// Log each assembled query plan at debug level.
    pub log_plans: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self { slow_query_ms: 250, log_plans: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub name: String,
    pub log: LogConfig,
    pub query: QueryConfig,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { name: "nexus_linq".into(), log: LogConfig::default(), query: QueryConfig::default() }
    }
}

impl DatabaseConfig {
    /// # Errors
    /// Returns an error if `s` is not valid TOML for this structure.
    pub fn from_toml_str(s: &str) -> Result<Self, DbError> {
        Ok(toml::from_str(s)?)
    }

    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, DbError> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    /// Loads `path` when it exists (defaults otherwise), then applies the process environment.
    ///
    /// # Errors
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, DbError> {
        let cfg = match path {
            Some(p) if p.exists() => Self::from_file(p)?,
            _ => Self::default(),
        };
        Ok(cfg.with_env(|k| std::env::var(k).ok()))
    }

    /// Overlays values found through `lookup`; unparsable values are ignored.
    #[must_use]
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(s) = lookup("NEXUS_LINQ_NAME") {
            self.name = s;
        }
        if let Some(s) = lookup("NEXUS_LINQ_LOG_DIR") {
            self.log.dir = Some(PathBuf::from(s));
        }
        if let Some(s) = lookup("NEXUS_LINQ_LOG_LEVEL") {
            self.log.level = s;
        }
        if let Some(n) = lookup("NEXUS_LINQ_LOG_RETENTION").and_then(|s| s.parse().ok()) {
            self.log.retention = n;
        }
        if let Some(s) = lookup("NEXUS_LINQ_LOG_ENABLED") {
            self.log.enabled = matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(n) = lookup("NEXUS_LINQ_SLOW_QUERY_MS").and_then(|s| s.parse().ok()) {
            self.query.slow_query_ms = n;
        }
        self
    }
}
