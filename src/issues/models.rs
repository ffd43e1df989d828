use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// Current time at the millisecond precision issues are stored with.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Wire format for issue timestamps, e.g. `2024-05-01T12:00:00.123Z`.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

mod timestamp {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_timestamp(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("Invalid timestamp: {}", raw)))
    }
}

// ── Stored record ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    #[serde(rename = "_id")]
    pub id: String,
    pub project: String,
    pub issue_title: String,
    pub issue_text: String,
    pub created_by: String,
    pub assigned_to: String,
    pub status_text: String,
    #[serde(with = "timestamp")]
    pub created_on: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_on: DateTime<Utc>,
    pub open: bool,
}

impl Issue {
    /// Build a freshly created issue: new id, both timestamps at `now`, open.
    pub fn create(project: &str, fields: NewIssue, now: DateTime<Utc>) -> Self {
        Self {
            id: new_issue_id(),
            project: project.to_string(),
            issue_title: fields.issue_title,
            issue_text: fields.issue_text,
            created_by: fields.created_by,
            assigned_to: fields.assigned_to,
            status_text: fields.status_text,
            created_on: now,
            updated_on: now,
            open: true,
        }
    }

    /// Apply the present, non-empty fields of `patch` and refresh `updated_on`.
    pub fn apply_patch(&mut self, patch: &IssuePatch, now: DateTime<Utc>) {
        let text_fields = [
            (&mut self.issue_title, &patch.issue_title),
            (&mut self.issue_text, &patch.issue_text),
            (&mut self.created_by, &patch.created_by),
            (&mut self.assigned_to, &patch.assigned_to),
            (&mut self.status_text, &patch.status_text),
        ];
        for (field, value) in text_fields {
            if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
                *field = v.to_string();
            }
        }
        if let Some(open) = patch.open {
            self.open = open;
        }
        self.updated_on = now.max(self.created_on);
    }

    pub fn field_value(&self, field: IssueField) -> FieldValue {
        match field {
            IssueField::Id => FieldValue::Text(self.id.clone()),
            IssueField::IssueTitle => FieldValue::Text(self.issue_title.clone()),
            IssueField::IssueText => FieldValue::Text(self.issue_text.clone()),
            IssueField::CreatedBy => FieldValue::Text(self.created_by.clone()),
            IssueField::AssignedTo => FieldValue::Text(self.assigned_to.clone()),
            IssueField::StatusText => FieldValue::Text(self.status_text.clone()),
            IssueField::Open => FieldValue::Bool(self.open),
            IssueField::CreatedOn => FieldValue::Instant(self.created_on),
            IssueField::UpdatedOn => FieldValue::Instant(self.updated_on),
        }
    }
}

fn new_issue_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Validated fields for a new issue.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewIssue {
    pub issue_title: String,
    pub issue_text: String,
    pub created_by: String,
    pub assigned_to: String,
    pub status_text: String,
}

/// The subset of updatable fields present in an update request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IssuePatch {
    pub issue_title: Option<String>,
    pub issue_text: Option<String>,
    pub created_by: Option<String>,
    pub assigned_to: Option<String>,
    pub status_text: Option<String>,
    pub open: Option<bool>,
}

impl IssuePatch {
    pub fn is_empty(&self) -> bool {
        self.issue_title.is_none()
            && self.issue_text.is_none()
            && self.created_by.is_none()
            && self.assigned_to.is_none()
            && self.status_text.is_none()
            && self.open.is_none()
    }
}

// ── Filtering ─────────────────────────────────────────────────────────

/// Issue fields a list query may filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IssueField {
    Id,
    IssueTitle,
    IssueText,
    CreatedBy,
    AssignedTo,
    StatusText,
    Open,
    CreatedOn,
    UpdatedOn,
}

impl IssueField {
    /// Key used in JSON bodies and query strings.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Id => "_id",
            Self::IssueTitle => "issue_title",
            Self::IssueText => "issue_text",
            Self::CreatedBy => "created_by",
            Self::AssignedTo => "assigned_to",
            Self::StatusText => "status_text",
            Self::Open => "open",
            Self::CreatedOn => "created_on",
            Self::UpdatedOn => "updated_on",
        }
    }

    /// Column name in the SQLite `issues` table.
    pub fn column(&self) -> &'static str {
        match self {
            Self::Id => "id",
            other => other.as_str(),
        }
    }

    /// Coerce a raw query-string value to the type this field is compared as.
    ///
    /// `open` is `true` only for the literal `"true"`. Timestamps that do not
    /// parse yield `None`, which can never match a stored issue.
    pub fn coerce(&self, raw: &str) -> Option<FieldValue> {
        match self {
            Self::Open => Some(FieldValue::Bool(raw == "true")),
            Self::CreatedOn | Self::UpdatedOn => parse_timestamp(raw).map(FieldValue::Instant),
            _ => Some(FieldValue::Text(raw.to_string())),
        }
    }
}

impl fmt::Display for IssueField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssueField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "_id" => Ok(Self::Id),
            "issue_title" => Ok(Self::IssueTitle),
            "issue_text" => Ok(Self::IssueText),
            "created_by" => Ok(Self::CreatedBy),
            "assigned_to" => Ok(Self::AssignedTo),
            "status_text" => Ok(Self::StatusText),
            "open" => Ok(Self::Open),
            "created_on" => Ok(Self::CreatedOn),
            "updated_on" => Ok(Self::UpdatedOn),
            _ => Err(format!("Invalid issue field: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Bool(bool),
    Instant(DateTime<Utc>),
}

impl FieldValue {
    /// Exact equality; text compared against a typed value uses its wire form.
    pub fn matches(&self, stored: &FieldValue) -> bool {
        match (self, stored) {
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Instant(a), Self::Instant(b)) => a == b,
            (Self::Text(t), Self::Bool(b)) | (Self::Bool(b), Self::Text(t)) => {
                t == if *b { "true" } else { "false" }
            }
            (Self::Text(t), Self::Instant(ts)) | (Self::Instant(ts), Self::Text(t)) => {
                parse_timestamp(t).is_some_and(|parsed| parsed == *ts)
            }
            _ => false,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Conjunction of exact-match criteria for a list query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IssueFilter {
    criteria: Vec<(IssueField, FieldValue)>,
    unsatisfiable: bool,
}

impl IssueFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: IssueField, value: impl Into<FieldValue>) -> Self {
        self.criteria.push((field, value.into()));
        self
    }

    /// Build a filter from raw query parameters.
    ///
    /// `project` is skipped since the path already scopes the query. Keys
    /// that name no issue field make the filter match nothing.
    pub fn from_query<I, K, V>(params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut filter = Self::new();
        for (key, value) in params {
            let key = key.as_ref();
            if key == "project" {
                continue;
            }
            let criterion = IssueField::from_str(key)
                .ok()
                .and_then(|field| field.coerce(value.as_ref()).map(|v| (field, v)));
            match criterion {
                Some(criterion) => filter.criteria.push(criterion),
                None => filter.unsatisfiable = true,
            }
        }
        filter
    }

    pub fn criteria(&self) -> &[(IssueField, FieldValue)] {
        &self.criteria
    }

    pub fn is_unsatisfiable(&self) -> bool {
        self.unsatisfiable
    }

    pub fn matches(&self, issue: &Issue) -> bool {
        !self.unsatisfiable
            && self
                .criteria
                .iter()
                .all(|(field, value)| value.matches(&issue.field_value(*field)))
    }
}

// ── Request payload types ─────────────────────────────────────────────

/// Text fields that also accept JSON scalars.
///
/// Numbers and `true` are kept in their text form. `false`, zero and
/// `null` count as absent.
mod loose_text {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Text(String),
        Int(i64),
        UInt(u64),
        Float(f64),
        Bool(bool),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<String>, D::Error> {
        let text = match Option::<Scalar>::deserialize(deserializer)? {
            None | Some(Scalar::Bool(false)) | Some(Scalar::Int(0)) | Some(Scalar::UInt(0)) => None,
            Some(Scalar::Float(f)) if f == 0.0 || f.is_nan() => None,
            Some(Scalar::Text(s)) => Some(s),
            Some(Scalar::Int(n)) => Some(n.to_string()),
            Some(Scalar::UInt(n)) => Some(n.to_string()),
            Some(Scalar::Float(f)) => Some(f.to_string()),
            Some(Scalar::Bool(true)) => Some("true".to_string()),
        };
        Ok(text)
    }
}

/// `open` as sent by clients: a JSON boolean or a form string.
///
/// Any other scalar is accepted and reads as `false`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OpenFlag {
    Bool(bool),
    Text(String),
    Number(serde_json::Number),
}

impl OpenFlag {
    pub fn as_bool(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Text(s) => s == "true",
            Self::Number(_) => false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateIssueRequest {
    #[serde(default, with = "loose_text")]
    pub issue_title: Option<String>,
    #[serde(default, with = "loose_text")]
    pub issue_text: Option<String>,
    #[serde(default, with = "loose_text")]
    pub created_by: Option<String>,
    #[serde(default, with = "loose_text")]
    pub assigned_to: Option<String>,
    #[serde(default, with = "loose_text")]
    pub status_text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateIssueRequest {
    #[serde(rename = "_id", default, with = "loose_text")]
    pub id: Option<String>,
    #[serde(default, with = "loose_text")]
    pub issue_title: Option<String>,
    #[serde(default, with = "loose_text")]
    pub issue_text: Option<String>,
    #[serde(default, with = "loose_text")]
    pub created_by: Option<String>,
    #[serde(default, with = "loose_text")]
    pub assigned_to: Option<String>,
    #[serde(default, with = "loose_text")]
    pub status_text: Option<String>,
    pub open: Option<OpenFlag>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeleteIssueRequest {
    #[serde(rename = "_id", default, with = "loose_text")]
    pub id: Option<String>,
}

// ── Response types ────────────────────────────────────────────────────

/// Body returned for a successful update or delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationReceipt {
    pub result: String,
    #[serde(rename = "_id")]
    pub id: String,
}

impl MutationReceipt {
    pub fn updated(id: impl Into<String>) -> Self {
        Self {
            result: "successfully updated".to_string(),
            id: id.into(),
        }
    }

    pub fn deleted(id: impl Into<String>) -> Self {
        Self {
            result: "successfully deleted".to_string(),
            id: id.into(),
        }
    }
}
