//! Record store abstraction.
//!
//! `IssueStore` is the seam between the issue service and persistence. Two
//! backends implement it:
//!
//! - [`InMemoryStore`](super::memory::InMemoryStore): per-project collections
//!   held for the lifetime of the process
//! - [`SqliteStore`](super::db::SqliteStore): a single SQLite file
//!
//! Backends own their records; every method hands back copies.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;

use super::db::SqliteStore;
use super::memory::InMemoryStore;
use super::models::{Issue, IssueFilter, IssuePatch, NewIssue};
use crate::config::StorageBackend;
use crate::errors::StoreResult;

#[async_trait]
pub trait IssueStore: Send + Sync {
    /// Persist a new issue under `project` with a fresh id and timestamps.
    async fn create(&self, project: &str, fields: NewIssue) -> StoreResult<Issue>;

    /// All issues of `project` matching `filter`, in insertion order.
    async fn find(&self, project: &str, filter: &IssueFilter) -> StoreResult<Vec<Issue>>;

    /// Apply `patch` to the issue `id` in `project`.
    ///
    /// Fails with `StoreError::NotFound` when no such issue exists.
    async fn update_by_id(&self, project: &str, id: &str, patch: &IssuePatch)
    -> StoreResult<Issue>;

    /// Remove the issue `id` from `project`.
    ///
    /// Fails with `StoreError::NotFound` when no such issue exists.
    async fn delete_by_id(&self, project: &str, id: &str) -> StoreResult<()>;
}

pub type SharedStore = Arc<dyn IssueStore>;

/// Open the configured backend.
pub fn open_store(backend: StorageBackend, path: &Path) -> anyhow::Result<SharedStore> {
    match backend {
        StorageBackend::Memory => Ok(Arc::new(InMemoryStore::new())),
        StorageBackend::Sqlite => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).context("Failed to create database directory")?;
            }
            let store = SqliteStore::open(path)
                .with_context(|| format!("Failed to open issue database at {}", path.display()))?;
            Ok(Arc::new(store))
        }
    }
}
