use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};

use super::models::{self, FieldValue, Issue, IssueField, IssueFilter, IssuePatch, NewIssue};
use super::store::IssueStore;
use crate::errors::{StoreError, StoreResult};

/// Async-safe handle to the issue database.
///
/// `rusqlite::Connection` is not `Sync`, while `IssueStore` backends are
/// shared across request tasks as `Arc<dyn IssueStore>`.
///
/// Wraps `IssueDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, keeping synchronous SQLite
/// I/O off the async worker threads. The mutex also serializes every
/// mutation, so readers never see a half-applied update.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<IssueDb>>,
}

impl DbHandle {
    pub fn new(db: IssueDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&IssueDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }
}

pub struct IssueDb {
    conn: Connection,
}

const ISSUE_COLUMNS: &str = "id, project, issue_title, issue_text, created_by, assigned_to, status_text, created_on, updated_on, open";

impl IssueDb {
    /// Open (or create) a SQLite database at the given path and create the schema.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS issues (
                    id TEXT PRIMARY KEY NOT NULL,
                    project TEXT NOT NULL,
                    issue_title TEXT NOT NULL,
                    issue_text TEXT NOT NULL,
                    created_by TEXT NOT NULL,
                    assigned_to TEXT NOT NULL DEFAULT '',
                    status_text TEXT NOT NULL DEFAULT '',
                    created_on TEXT NOT NULL,
                    updated_on TEXT NOT NULL,
                    open INTEGER NOT NULL DEFAULT 1
                );

                CREATE INDEX IF NOT EXISTS idx_issues_project ON issues(project);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Issue CRUD ────────────────────────────────────────────────────

    pub fn create_issue(&self, project: &str, fields: NewIssue) -> Result<Issue> {
        let issue = Issue::create(project, fields, models::now());
        self.conn
            .execute(
                &format!("INSERT INTO issues ({ISSUE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"),
                params![
                    issue.id,
                    issue.project,
                    issue.issue_title,
                    issue.issue_text,
                    issue.created_by,
                    issue.assigned_to,
                    issue.status_text,
                    models::format_timestamp(&issue.created_on),
                    models::format_timestamp(&issue.updated_on),
                    issue.open,
                ],
            )
            .context("Failed to insert issue")?;
        Ok(issue)
    }

    pub fn find_issues(&self, project: &str, filter: &IssueFilter) -> Result<Vec<Issue>> {
        if filter.is_unsatisfiable() {
            return Ok(Vec::new());
        }

        let mut sql = format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE project = ?1");
        let mut values = vec![Value::Text(project.to_string())];
        for (field, value) in filter.criteria() {
            let Some(value) = column_value(*field, value) else {
                return Ok(Vec::new());
            };
            values.push(value);
            sql.push_str(&format!(" AND {} = ?{}", field.column(), values.len()));
        }
        sql.push_str(" ORDER BY rowid");

        let mut stmt = self.conn.prepare(&sql).context("Failed to prepare find_issues")?;
        let rows = stmt
            .query_map(params_from_iter(values), IssueRow::from_row)
            .context("Failed to query issues")?;
        let mut issues = Vec::new();
        for row in rows {
            let r = row.context("Failed to read issue row")?;
            issues.push(r.into_issue()?);
        }
        Ok(issues)
    }

    pub fn get_issue(&self, project: &str, id: &str) -> Result<Option<Issue>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE project = ?1 AND id = ?2"),
                params![project, id],
                IssueRow::from_row,
            )
            .optional()
            .context("Failed to query issue")?;
        row.map(IssueRow::into_issue).transpose()
    }

    /// Returns `None` when the issue does not exist in `project`.
    pub fn update_issue(&self, project: &str, id: &str, patch: &IssuePatch) -> Result<Option<Issue>> {
        // Safety: DbHandle's Mutex already guarantees single-threaded access.
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;

        let Some(mut issue) = self.get_issue(project, id)? else {
            return Ok(None);
        };
        issue.apply_patch(patch, models::now());

        tx.execute(
            "UPDATE issues SET issue_title = ?1, issue_text = ?2, created_by = ?3, assigned_to = ?4,
                 status_text = ?5, open = ?6, updated_on = ?7
             WHERE project = ?8 AND id = ?9",
            params![
                issue.issue_title,
                issue.issue_text,
                issue.created_by,
                issue.assigned_to,
                issue.status_text,
                issue.open,
                models::format_timestamp(&issue.updated_on),
                project,
                id,
            ],
        )
        .context("Failed to update issue")?;

        tx.commit().context("Failed to commit issue update")?;
        Ok(Some(issue))
    }

    pub fn delete_issue(&self, project: &str, id: &str) -> Result<bool> {
        let count = self
            .conn
            .execute(
                "DELETE FROM issues WHERE project = ?1 AND id = ?2",
                params![project, id],
            )
            .context("Failed to delete issue")?;
        Ok(count > 0)
    }
}

/// Convert a filter value to the form `field` is stored in.
///
/// `None` means no stored row can hold the value.
fn column_value(field: IssueField, value: &FieldValue) -> Option<Value> {
    match (field, value) {
        (IssueField::Open, FieldValue::Bool(b)) => Some(Value::Integer(i64::from(*b))),
        (IssueField::Open, FieldValue::Text(t)) => match t.as_str() {
            "true" => Some(Value::Integer(1)),
            "false" => Some(Value::Integer(0)),
            _ => None,
        },
        (IssueField::Open, FieldValue::Instant(_)) => None,
        (IssueField::CreatedOn | IssueField::UpdatedOn, FieldValue::Instant(ts)) => {
            stored_instant(ts)
        }
        (IssueField::CreatedOn | IssueField::UpdatedOn, FieldValue::Text(t)) => {
            models::parse_timestamp(t).and_then(|ts| stored_instant(&ts))
        }
        (IssueField::CreatedOn | IssueField::UpdatedOn, FieldValue::Bool(_)) => None,
        (_, FieldValue::Text(t)) => Some(Value::Text(t.clone())),
        (_, FieldValue::Bool(b)) => Some(Value::Text(b.to_string())),
        (_, FieldValue::Instant(ts)) => Some(Value::Text(models::format_timestamp(ts))),
    }
}

/// Timestamps are stored at millisecond precision, so a finer instant
/// matches no row.
fn stored_instant(ts: &DateTime<Utc>) -> Option<Value> {
    (ts.trunc_subsecs(3) == *ts).then(|| Value::Text(models::format_timestamp(ts)))
}

/// Intermediate row struct for issues.
struct IssueRow {
    id: String,
    project: String,
    issue_title: String,
    issue_text: String,
    created_by: String,
    assigned_to: String,
    status_text: String,
    created_on: String,
    updated_on: String,
    open: bool,
}

impl IssueRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            project: row.get(1)?,
            issue_title: row.get(2)?,
            issue_text: row.get(3)?,
            created_by: row.get(4)?,
            assigned_to: row.get(5)?,
            status_text: row.get(6)?,
            created_on: row.get(7)?,
            updated_on: row.get(8)?,
            open: row.get(9)?,
        })
    }

    fn into_issue(self) -> Result<Issue> {
        let created_on = models::parse_timestamp(&self.created_on)
            .with_context(|| format!("Failed to parse created_on '{}'", self.created_on))?;
        let updated_on = models::parse_timestamp(&self.updated_on)
            .with_context(|| format!("Failed to parse updated_on '{}'", self.updated_on))?;
        Ok(Issue {
            id: self.id,
            project: self.project,
            issue_title: self.issue_title,
            issue_text: self.issue_text,
            created_by: self.created_by,
            assigned_to: self.assigned_to,
            status_text: self.status_text,
            created_on,
            updated_on,
            open: self.open,
        })
    }
}

// ── IssueStore backend ────────────────────────────────────────────────

/// Persistent `IssueStore` over a single SQLite file.
#[derive(Clone)]
pub struct SqliteStore {
    db: DbHandle,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::from_db(IssueDb::new(path)?))
    }

    pub fn from_db(db: IssueDb) -> Self {
        Self {
            db: DbHandle::new(db),
        }
    }
}

#[async_trait]
impl IssueStore for SqliteStore {
    async fn create(&self, project: &str, fields: NewIssue) -> StoreResult<Issue> {
        let project = project.to_string();
        Ok(self
            .db
            .call(move |db| db.create_issue(&project, fields))
            .await?)
    }

    async fn find(&self, project: &str, filter: &IssueFilter) -> StoreResult<Vec<Issue>> {
        let project = project.to_string();
        let filter = filter.clone();
        Ok(self
            .db
            .call(move |db| db.find_issues(&project, &filter))
            .await?)
    }

    async fn update_by_id(
        &self,
        project: &str,
        id: &str,
        patch: &IssuePatch,
    ) -> StoreResult<Issue> {
        let (project, owned_id, patch) = (project.to_string(), id.to_string(), patch.clone());
        self.db
            .call(move |db| db.update_issue(&project, &owned_id, &patch))
            .await?
            .ok_or_else(|| StoreError::not_found(id))
    }

    async fn delete_by_id(&self, project: &str, id: &str) -> StoreResult<()> {
        let (project, owned_id) = (project.to_string(), id.to_string());
        let deleted = self
            .db
            .call(move |db| db.delete_issue(&project, &owned_id))
            .await?;
        if deleted {
            Ok(())
        } else {
            Err(StoreError::not_found(id))
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────
