use anyhow::{Context, Result};
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Select, TransactionTrait,
};

use crate::entities::{audit_logs, prelude::*};

/// Column filters for audit listings. String bounds compare against the
/// RFC 3339 `timestamp` column.
#[derive(Debug, Clone, Default)]
pub struct AuditLogFilter {
    pub action_type: Option<String>,
    pub target_object: Option<String>,
    pub target_type: Option<String>,
    pub performed_by: Option<String>,
    pub source: Option<String>,
    /// Inclusive lower bound.
    pub from: Option<String>,
    /// Exclusive upper bound.
    pub until: Option<String>,
    pub search: Option<String>,
}

impl AuditLogFilter {
    fn apply(&self, mut query: Select<AuditLogs>) -> Select<AuditLogs> {
        if let Some(action_type) = &self.action_type {
            query = query.filter(audit_logs::Column::ActionType.eq(action_type.as_str()));
        }
        if let Some(target) = &self.target_object {
            query = query.filter(audit_logs::Column::TargetObject.contains(target.as_str()));
        }
        if let Some(target_type) = &self.target_type {
            query = query.filter(audit_logs::Column::TargetType.eq(target_type.as_str()));
        }
        if let Some(performed_by) = &self.performed_by {
            query = query.filter(audit_logs::Column::PerformedBy.contains(performed_by.as_str()));
        }
        if let Some(source) = &self.source {
            query = query.filter(audit_logs::Column::Source.eq(source.as_str()));
        }
        if let Some(from) = &self.from {
            query = query.filter(audit_logs::Column::Timestamp.gte(from.as_str()));
        }
        if let Some(until) = &self.until {
            query = query.filter(audit_logs::Column::Timestamp.lt(until.as_str()));
        }
        if let Some(search) = &self.search {
            query = query.filter(
                Condition::any()
                    .add(audit_logs::Column::TargetObject.contains(search.as_str()))
                    .add(audit_logs::Column::PerformedBy.contains(search.as_str()))
                    .add(audit_logs::Column::ActionType.contains(search.as_str())),
            );
        }
        query
    }
}

/// Aggregates over the whole audit table taken at one point in time.
#[derive(Debug, Clone, Default)]
pub struct AuditSnapshot {
    pub total: u64,
    pub successful: u64,
    pub by_action: Vec<(String, i64)>,
    pub by_source: Vec<(String, i64)>,
    pub by_performer: Vec<(String, i64)>,
    pub recent: Vec<audit_logs::Model>,
}

pub struct AuditRepository {
    conn: DatabaseConnection,
}

impl AuditRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn insert(&self, entry: audit_logs::Model) -> Result<()> {
        let active_model: audit_logs::ActiveModel = entry.into();
        AuditLogs::insert(active_model)
            .exec(&self.conn)
            .await
            .context("Failed to insert audit log entry")?;
        Ok(())
    }

    /// Newest-first page of entries plus the total matching `filter`.
    pub async fn list(
        &self,
        filter: &AuditLogFilter,
        limit: u64,
        offset: u64,
    ) -> Result<(Vec<audit_logs::Model>, u64)> {
        let total = filter
            .apply(AuditLogs::find())
            .count(&self.conn)
            .await
            .context("Failed to count audit log entries")?;

        let items = filter
            .apply(AuditLogs::find())
            .order_by_desc(audit_logs::Column::Timestamp)
            .order_by_desc(audit_logs::Column::Id)
            .offset(offset)
            .limit(limit)
            .all(&self.conn)
            .await
            .context("Failed to query audit log entries")?;

        Ok((items, total))
    }

    /// All entries matching `filter`, oldest first.
    pub async fn all(&self, filter: &AuditLogFilter) -> Result<Vec<audit_logs::Model>> {
        filter
            .apply(AuditLogs::find())
            .order_by_asc(audit_logs::Column::Timestamp)
            .order_by_asc(audit_logs::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to query audit log entries")
    }

    /// Every aggregate the statistics view needs, read inside one transaction
    /// so the totals agree with each other.
    pub async fn snapshot(&self, recent_limit: u64) -> Result<AuditSnapshot> {
        let txn = self
            .conn
            .begin()
            .await
            .context("Failed to open audit snapshot transaction")?;

        let total = AuditLogs::find().count(&txn).await?;
        let successful = AuditLogs::find()
            .filter(audit_logs::Column::Success.eq(true))
            .count(&txn)
            .await?;
        let by_action = count_by(&txn, audit_logs::Column::ActionType).await?;
        let by_source = count_by(&txn, audit_logs::Column::Source).await?;
        let by_performer = count_by(&txn, audit_logs::Column::PerformedBy).await?;
        let recent = AuditLogs::find()
            .order_by_desc(audit_logs::Column::Timestamp)
            .order_by_desc(audit_logs::Column::Id)
            .limit(recent_limit)
            .all(&txn)
            .await?;

        txn.commit().await?;

        Ok(AuditSnapshot {
            total,
            successful,
            by_action,
            by_source,
            by_performer,
            recent,
        })
    }
}

/// `(value, count)` pairs grouped by `column`.
async fn count_by<C: ConnectionTrait>(
    conn: &C,
    column: audit_logs::Column,
) -> Result<Vec<(String, i64)>> {
    let rows: Vec<(String, i64)> = AuditLogs::find()
        .select_only()
        .column(column)
        .column_as(audit_logs::Column::Id.count(), "count")
        .group_by(column)
        .into_tuple()
        .all(conn)
        .await
        .context("Failed to aggregate audit log entries")?;
    Ok(rows)
}
