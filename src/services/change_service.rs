//! Detection of changes made directly in the directory.
//!
//! Results depend on `whenChanged`, which domain controllers do not replicate
//! uniformly; changes may show up late or twice across polls.

use thiserror::Error;

use crate::api::types::{ChangeDto, ChangesQuery, ChangesResponse};
use crate::directory::{DirectoryChange, DirectoryError};
use crate::domain::ChangeType;
use crate::services::audit_service::AuditError;

pub const DEFAULT_HOURS: i64 = 24;
pub const MAX_HOURS: i64 = 720;

/// Performer recorded on audit entries written by the change monitor.
pub const CHANGE_MONITOR_OPERATOR: &str = "directory";

#[derive(Debug, Error)]
pub enum ChangeError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Directory(String),

    #[error("Audit log write failed: {0}")]
    Audit(String),
}

impl From<DirectoryError> for ChangeError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::Unreachable(_) | DirectoryError::AuthenticationFailed(_) => {
                Self::Unavailable(err.to_string())
            }
            other => Self::Directory(other.to_string()),
        }
    }
}

impl From<AuditError> for ChangeError {
    fn from(err: AuditError) -> Self {
        Self::Audit(err.to_string())
    }
}

#[must_use]
pub fn change_dto(change: DirectoryChange) -> ChangeDto {
    let change_type = ChangeType::classify(&change.when_created, &change.when_changed);
    ChangeDto {
        object_type: change.object_type.as_str().to_string(),
        sam_account_name: change.sam_account_name,
        display_name: change.display_name,
        distinguished_name: change.distinguished_name.to_string(),
        when_changed: change.when_changed,
        when_created: change.when_created,
        change_type: match change_type {
            ChangeType::Created => "created",
            ChangeType::Modified => "modified",
        }
        .to_string(),
    }
}

#[async_trait::async_trait]
pub trait ChangeService: Send + Sync {
    /// Objects changed within the last `hours`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`ChangeError::Validation`] for `hours` outside `1..=720` or an
    /// unknown `object_type`.
    async fn list_recent(&self, query: ChangesQuery) -> Result<ChangesResponse, ChangeError>;

    /// One change-monitor pass. Records an audit entry for every change not
    /// seen by an earlier pass and returns how many were recorded.
    async fn detect_changes(&self) -> Result<usize, ChangeError>;
}
