//! Typed error hierarchy for the issue tracker.
//!
//! Two enums cover the two layers:
//! - `StoreError`: record store failures (missing record vs. backend fault)
//! - `ServiceError`: request outcomes reported back to the caller

use thiserror::Error;

/// Errors from an `IssueStore` backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Issue {id} not found")]
    NotFound { id: String },

    #[error("Store fault: {0}")]
    Fault(#[source] anyhow::Error),
}

impl StoreError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }
}

impl From<anyhow::Error> for StoreError {
    fn from(err: anyhow::Error) -> Self {
        Self::Fault(err)
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors from the issue service, one per way a request can fail.
///
/// `Validation` and `NotFound` are client-caused and carry the exact message
/// returned to the caller. `StoreFault` is never collapsed into `NotFound`.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{message}")]
    Validation {
        message: &'static str,
        id: Option<String>,
    },

    #[error("{message}: {id}")]
    NotFound { message: &'static str, id: String },

    #[error("Store fault: {0}")]
    StoreFault(#[source] anyhow::Error),
}

impl ServiceError {
    pub const REQUIRED_FIELDS_MISSING: &'static str = "required field(s) missing";
    pub const MISSING_ID: &'static str = "missing _id";
    pub const NO_UPDATE_FIELDS: &'static str = "no update field(s) sent";
    pub const COULD_NOT_UPDATE: &'static str = "could not update";
    pub const COULD_NOT_DELETE: &'static str = "could not delete";

    pub fn validation(message: &'static str) -> Self {
        Self::Validation { message, id: None }
    }

    pub fn validation_for(message: &'static str, id: impl Into<String>) -> Self {
        Self::Validation {
            message,
            id: Some(id.into()),
        }
    }

    /// Map a store error for an operation on `id`, keeping faults distinct.
    pub fn from_store(err: StoreError, message: &'static str, id: &str) -> Self {
        match err {
            StoreError::NotFound { .. } => Self::NotFound {
                message,
                id: id.to_string(),
            },
            StoreError::Fault(source) => Self::StoreFault(source),
        }
    }

    /// The message reported to the client.
    pub fn message(&self) -> &'static str {
        match self {
            Self::Validation { message, .. } | Self::NotFound { message, .. } => message,
            Self::StoreFault(_) => "server error",
        }
    }

    /// The `_id` echoed back to the client, if any.
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Validation { id, .. } => id.as_deref(),
            Self::NotFound { id, .. } => Some(id),
            Self::StoreFault(_) => None,
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { id } => Self::StoreFault(anyhow::anyhow!(
                "unexpected missing issue {} outside an id lookup",
                id
            )),
            StoreError::Fault(source) => Self::StoreFault(source),
        }
    }
}
