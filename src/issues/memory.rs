//! In-memory storage backend.
//!
//! Issues live in a map of project name to collection. Each collection sits
//! behind its own `RwLock`, so mutations are serialized per project while
//! reads of any project proceed concurrently. The outer map is only
//! write-locked to add a project.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::models::{self, Issue, IssueFilter, IssuePatch, NewIssue};
use super::store::IssueStore;
use crate::errors::{StoreError, StoreResult};

type Collection = Arc<RwLock<Vec<Issue>>>;

#[derive(Default)]
pub struct InMemoryStore {
    projects: RwLock<HashMap<String, Collection>>,
}

fn poisoned(what: &str) -> StoreError {
    StoreError::Fault(anyhow::anyhow!("{} lock poisoned", what))
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn collection(&self, project: &str) -> StoreResult<Option<Collection>> {
        let projects = self.projects.read().map_err(|_| poisoned("project map"))?;
        Ok(projects.get(project).cloned())
    }

    fn collection_or_insert(&self, project: &str) -> StoreResult<Collection> {
        if let Some(existing) = self.collection(project)? {
            return Ok(existing);
        }
        let mut projects = self.projects.write().map_err(|_| poisoned("project map"))?;
        Ok(projects.entry(project.to_string()).or_default().clone())
    }
}

#[async_trait]
impl IssueStore for InMemoryStore {
    async fn create(&self, project: &str, fields: NewIssue) -> StoreResult<Issue> {
        let collection = self.collection_or_insert(project)?;
        let mut issues = collection.write().map_err(|_| poisoned(project))?;
        let issue = Issue::create(project, fields, models::now());
        issues.push(issue.clone());
        Ok(issue)
    }

    async fn find(&self, project: &str, filter: &IssueFilter) -> StoreResult<Vec<Issue>> {
        let Some(collection) = self.collection(project)? else {
            return Ok(Vec::new());
        };
        let issues = collection.read().map_err(|_| poisoned(project))?;
        Ok(issues.iter().filter(|i| filter.matches(i)).cloned().collect())
    }

    async fn update_by_id(
        &self,
        project: &str,
        id: &str,
        patch: &IssuePatch,
    ) -> StoreResult<Issue> {
        let collection = self
            .collection(project)?
            .ok_or_else(|| StoreError::not_found(id))?;
        let mut issues = collection.write().map_err(|_| poisoned(project))?;
        let issue = issues
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| StoreError::not_found(id))?;
        issue.apply_patch(patch, models::now());
        Ok(issue.clone())
    }

    async fn delete_by_id(&self, project: &str, id: &str) -> StoreResult<()> {
        let collection = self
            .collection(project)?
            .ok_or_else(|| StoreError::not_found(id))?;
        let mut issues = collection.write().map_err(|_| poisoned(project))?;
        let pos = issues
            .iter()
            .position(|i| i.id == id)
            .ok_or_else(|| StoreError::not_found(id))?;
        issues.remove(pos);
        Ok(())
    }
}
