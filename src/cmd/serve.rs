use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;

use issue_tracker::config::{StorageBackend, TrackerConfig};
use issue_tracker::issues::db::IssueDb;

/// CLI flags that override the loaded configuration.
#[derive(Debug, Default)]
pub struct ServeOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub backend: Option<StorageBackend>,
    pub db_path: Option<PathBuf>,
    pub dev: bool,
}

impl ServeOverrides {
    pub fn apply(self, config: &mut TrackerConfig) {
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(backend) = self.backend {
            config.storage.backend = backend;
        }
        if let Some(path) = self.db_path {
            config.storage.path = path;
        }
        if self.dev {
            config.server.cors_permissive = true;
        }
    }
}

pub async fn cmd_serve(mut config: TrackerConfig, overrides: ServeOverrides) -> Result<()> {
    overrides.apply(&mut config);
    issue_tracker::issues::server::start_server(config).await
}

/// Create the SQLite database without starting the server.
pub fn cmd_init(config: &TrackerConfig, db_path: Option<PathBuf>) -> Result<()> {
    let db_path = db_path.unwrap_or_else(|| config.storage.path.clone());
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    IssueDb::new(&db_path)
        .with_context(|| format!("Failed to initialize database at {}", db_path.display()))?;
    info!(path = %db_path.display(), "Initialized issue database");
    println!("Issue database initialized at {}", db_path.display());
    Ok(())
}
