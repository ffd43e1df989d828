//! Request validation and translation between payloads and store calls.

use tracing::{debug, error, info, warn};

use super::models::{
    CreateIssueRequest, DeleteIssueRequest, Issue, IssueFilter, IssuePatch, MutationReceipt,
    NewIssue, UpdateIssueRequest,
};
use super::store::SharedStore;
use crate::errors::{ServiceError, StoreError};

/// Keep a string only if it is present and non-empty.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[derive(Clone)]
pub struct IssueService {
    store: SharedStore,
}

impl IssueService {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// List the issues of `project` matching the raw query parameters.
    pub async fn list<I, K, V>(&self, project: &str, query: I) -> Result<Vec<Issue>, ServiceError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let filter = IssueFilter::from_query(query);
        let issues = self
            .store
            .find(project, &filter)
            .await
            .map_err(|e| fault(project, "list", e))?;
        debug!(project, matched = issues.len(), "Listed issues");
        Ok(issues)
    }

    pub async fn create(
        &self,
        project: &str,
        req: CreateIssueRequest,
    ) -> Result<Issue, ServiceError> {
        let (Some(issue_title), Some(issue_text), Some(created_by)) = (
            non_empty(req.issue_title),
            non_empty(req.issue_text),
            non_empty(req.created_by),
        ) else {
            warn!(project, "Rejected create: required field(s) missing");
            return Err(ServiceError::validation(ServiceError::REQUIRED_FIELDS_MISSING));
        };

        let fields = NewIssue {
            issue_title,
            issue_text,
            created_by,
            assigned_to: req.assigned_to.unwrap_or_default(),
            status_text: req.status_text.unwrap_or_default(),
        };
        let issue = self
            .store
            .create(project, fields)
            .await
            .map_err(|e| fault(project, "create", e))?;
        info!(project, id = %issue.id, "Created issue");
        Ok(issue)
    }

    pub async fn update(
        &self,
        project: &str,
        req: UpdateIssueRequest,
    ) -> Result<MutationReceipt, ServiceError> {
        let Some(id) = non_empty(req.id) else {
            warn!(project, "Rejected update: missing _id");
            return Err(ServiceError::validation(ServiceError::MISSING_ID));
        };

        let patch = IssuePatch {
            issue_title: non_empty(req.issue_title),
            issue_text: non_empty(req.issue_text),
            created_by: non_empty(req.created_by),
            assigned_to: non_empty(req.assigned_to),
            status_text: non_empty(req.status_text),
            open: req.open.map(|flag| flag.as_bool()),
        };
        if patch.is_empty() {
            warn!(project, id = %id, "Rejected update: no update field(s) sent");
            return Err(ServiceError::validation_for(ServiceError::NO_UPDATE_FIELDS, id));
        }

        match self.store.update_by_id(project, &id, &patch).await {
            Ok(_) => {
                info!(project, id = %id, "Updated issue");
                Ok(MutationReceipt::updated(id))
            }
            Err(e) => Err(mutation_error(project, "update", e, ServiceError::COULD_NOT_UPDATE, &id)),
        }
    }

    pub async fn delete(
        &self,
        project: &str,
        req: DeleteIssueRequest,
    ) -> Result<MutationReceipt, ServiceError> {
        let Some(id) = non_empty(req.id) else {
            warn!(project, "Rejected delete: missing _id");
            return Err(ServiceError::validation(ServiceError::MISSING_ID));
        };

        match self.store.delete_by_id(project, &id).await {
            Ok(()) => {
                info!(project, id = %id, "Deleted issue");
                Ok(MutationReceipt::deleted(id))
            }
            Err(e) => Err(mutation_error(project, "delete", e, ServiceError::COULD_NOT_DELETE, &id)),
        }
    }
}

fn fault(project: &str, op: &str, err: StoreError) -> ServiceError {
    error!(project, op, error = %err, "Store fault");
    err.into()
}

fn mutation_error(
    project: &str,
    op: &str,
    err: StoreError,
    message: &'static str,
    id: &str,
) -> ServiceError {
    match err {
        StoreError::NotFound { .. } => {
            warn!(project, id, "Could not {}: issue not found", op);
        }
        StoreError::Fault(ref source) => {
            error!(project, op, id, error = %source, "Store fault");
        }
    }
    ServiceError::from_store(err, message, id)
}
