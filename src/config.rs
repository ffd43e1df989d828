//! Layered configuration for the issue tracker.
//!
//! Values are resolved file → environment → CLI. The file is
//! `issue-tracker.toml` in the working directory unless `--config` names
//! another one; a missing file means defaults.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 3000
//! cors_permissive = false
//!
//! [storage]
//! backend = "sqlite"   # or "memory"
//! path = ".issue-tracker/issues.db"
//!
//! [api]
//! legacy_status_codes = true
//! ```
//!
//! # Environment
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `ISSUE_TRACKER_HOST` | `server.host` |
//! | `ISSUE_TRACKER_PORT`, then `PORT` | `server.port` |
//! | `ISSUE_TRACKER_BACKEND` | `storage.backend` |
//! | `ISSUE_TRACKER_DB_PATH` | `storage.path` |

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "issue-tracker.toml";

/// Where issues are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-lifetime collections, empty at every start.
    #[default]
    Memory,
    /// A single SQLite file.
    Sqlite,
}

impl StorageBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            _ => Err(format!(
                "Invalid storage backend '{}'. Valid values: memory, sqlite",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
    /// Allow any origin (for local front-end development).
    pub cors_permissive: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            cors_permissive: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub backend: StorageBackend,
    /// SQLite file, ignored by the memory backend.
    pub path: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: PathBuf::from(".issue-tracker/issues.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSection {
    /// Answer validation and not-found errors with HTTP 200.
    pub legacy_status_codes: bool,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            legacy_status_codes: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub api: ApiSection,
}

impl TrackerConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse issue-tracker.toml")
    }

    /// Load `path`, or the default file if present, otherwise defaults.
    ///
    /// An explicitly named file must exist.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::load(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any variable lookup.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(host) = lookup("ISSUE_TRACKER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("ISSUE_TRACKER_PORT").or_else(|| lookup("PORT")) {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid port '{}'", port))?;
        }
        if let Some(backend) = lookup("ISSUE_TRACKER_BACKEND") {
            self.storage.backend = backend.parse().map_err(|e: String| anyhow::anyhow!(e))?;
        }
        if let Some(path) = lookup("ISSUE_TRACKER_DB_PATH") {
            self.storage.path = PathBuf::from(path);
        }
        Ok(())
    }

    /// Address the server binds to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
