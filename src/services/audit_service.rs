//! Domain service for the audit trail.
//!
//! Every directory mutation and every detected external change is recorded
//! here. Entries are append-only.

use crate::api::types::{AuditLogDto, AuditLogQuery, AuditLogsResponse, AuditStatistics};
use chrono::{DateTime, Utc};
use crate::domain::{AuditAction, AuditSource, ObjectType};
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_LIMIT: u64 = 100;
pub const MAX_LIMIT: u64 = 500;
pub const RECENT_ACTIVITY_LIMIT: u64 = 10;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sea_orm::DbErr> for AuditError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for AuditError {
    fn from(err: anyhow::Error) -> Self {
        Self::Database(format!("{err:#}"))
    }
}

/// An audit entry before it is stored.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub action: AuditAction,
    pub source: AuditSource,
    pub performed_by: String,
    pub target_object: String,
    pub target_type: ObjectType,
    pub details: Value,
    pub success: bool,
    pub error_message: Option<String>,
}

impl AuditEntry {
    /// A successful operator action with empty details.
    pub fn new(
        action: AuditAction,
        performed_by: impl Into<String>,
        target_object: impl Into<String>,
        target_type: ObjectType,
    ) -> Self {
        Self {
            action,
            source: AuditSource::WebApp,
            performed_by: performed_by.into(),
            target_object: target_object.into(),
            target_type,
            details: Value::Object(serde_json::Map::new()),
            success: true,
            error_message: None,
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    #[must_use]
    pub const fn with_source(mut self, source: AuditSource) -> Self {
        self.source = source;
        self
    }

    #[must_use]
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error_message = Some(error.into());
        self
    }
}

/// Domain service trait for audit operations.
#[async_trait::async_trait]
pub trait AuditService: Send + Sync {
    /// Appends one entry.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Database`] if the entry could not be stored.
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditError>;

    /// Filtered, newest-first listing.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Validation`] for out-of-range paging, unknown
    /// action types or sources, and malformed dates.
    async fn list(&self, query: AuditLogQuery) -> Result<AuditLogsResponse, AuditError>;

    /// Aggregates over the whole audit table.
    async fn statistics(&self) -> Result<AuditStatistics, AuditError>;

    /// Every entry from `source` recorded at or after `since`, oldest first.
    async fn entries_since(
        &self,
        source: AuditSource,
        since: DateTime<Utc>,
    ) -> Result<Vec<AuditLogDto>, AuditError>;
}
