//! `SeaORM` implementation of the `AuditService` trait.

use crate::api::types::{AuditLogDto, AuditLogQuery, AuditLogsResponse, AuditStatistics};
use crate::db::{AuditLogFilter, AuditLogRow, Store};
use crate::domain::{AuditAction, AuditSource};
use crate::services::audit_service::{
    AuditEntry, AuditError, AuditService, DEFAULT_LIMIT, MAX_LIMIT, RECENT_ACTIVITY_LIMIT,
};
use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, SecondsFormat, Utc};
use std::collections::BTreeMap;
use tracing::info;
use uuid::Uuid;

pub struct SeaOrmAuditService {
    store: Store,
}

impl SeaOrmAuditService {
    #[must_use]
    pub const fn new(store: Store) -> Self {
        Self { store }
    }

    fn to_dto(row: AuditLogRow) -> AuditLogDto {
        let details = serde_json::from_str(&row.details)
            .unwrap_or_else(|_| serde_json::Value::String(row.details.clone()));

        AuditLogDto {
            id: row.id,
            timestamp: row.timestamp,
            action_type: row.action_type,
            source: row.source,
            performed_by: row.performed_by,
            target_object: row.target_object,
            target_type: row.target_type,
            success: row.success,
            details,
            error_message: row.error_message,
        }
    }

    fn build_filter(query: &AuditLogQuery) -> Result<AuditLogFilter, AuditError> {
        let non_empty = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let action_type = non_empty(&query.action_type)
            .map(|v| v.parse::<AuditAction>().map(|a| a.as_str().to_string()))
            .transpose()
            .map_err(AuditError::Validation)?;

        let source = non_empty(&query.source)
            .map(|v| v.parse::<AuditSource>().map(|s| s.as_str().to_string()))
            .transpose()
            .map_err(AuditError::Validation)?;

        let start = non_empty(&query.start_date)
            .map(|v| parse_date(&v, "start_date"))
            .transpose()?;
        let end = non_empty(&query.end_date)
            .map(|v| parse_date(&v, "end_date"))
            .transpose()?;

        if let (Some(start), Some(end)) = (start, end)
            && start > end
        {
            return Err(AuditError::Validation(
                "start_date must not be after end_date".to_string(),
            ));
        }

        // end_date covers its whole calendar day.
        let until = end
            .map(|d| {
                d.checked_add_days(Days::new(1))
                    .ok_or_else(|| AuditError::Validation("end_date out of range".to_string()))
            })
            .transpose()?;

        Ok(AuditLogFilter {
            action_type,
            target_object: non_empty(&query.target_object),
            target_type: non_empty(&query.target_type),
            performed_by: non_empty(&query.performed_by),
            source,
            from: start.map(day_start),
            until: until.map(day_start),
            search: non_empty(&query.search),
        })
    }
}

fn parse_date(value: &str, field: &str) -> Result<NaiveDate, AuditError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        AuditError::Validation(format!("Invalid {field} '{value}', expected YYYY-MM-DD"))
    })
}

fn day_start(date: NaiveDate) -> String {
    format!("{}T00:00:00", date.format("%Y-%m-%d"))
}

/// Percentage rounded to two decimals; zero when `total` is zero.
#[allow(clippy::cast_precision_loss)]
fn success_rate(successful: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let rate = successful as f64 / total as f64 * 100.0;
    (rate * 100.0).round() / 100.0
}

#[async_trait]
impl AuditService for SeaOrmAuditService {
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditError> {
        let row = AuditLogRow {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            action_type: entry.action.as_str().to_string(),
            source: entry.source.as_str().to_string(),
            performed_by: entry.performed_by,
            target_object: entry.target_object,
            target_type: entry.target_type.as_str().to_string(),
            details: entry.details.to_string(),
            success: entry.success,
            error_message: entry.error_message,
        };

        info!(
            event = "audit_recorded",
            action = %row.action_type,
            source = %row.source,
            target = %row.target_object,
            performed_by = %row.performed_by,
            success = row.success,
        );

        self.store.add_audit_log(row).await?;
        Ok(())
    }

    async fn list(&self, query: AuditLogQuery) -> Result<AuditLogsResponse, AuditError> {
        let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(AuditError::Validation(format!(
                "limit must be between 1 and {MAX_LIMIT}"
            )));
        }
        let offset = query.offset.unwrap_or(0);

        let filter = Self::build_filter(&query)?;
        let (rows, total_count) = self.store.list_audit_logs(&filter, limit, offset).await?;

        Ok(AuditLogsResponse {
            logs: rows.into_iter().map(Self::to_dto).collect(),
            total_count,
            limit,
            offset,
        })
    }

    async fn statistics(&self) -> Result<AuditStatistics, AuditError> {
        let snapshot = self.store.audit_snapshot(RECENT_ACTIVITY_LIMIT).await?;
        let total_actions = snapshot.total;
        let successful = snapshot.successful;

        let by_type: BTreeMap<String, i64> = snapshot.by_action.into_iter().collect();
        let by_source: BTreeMap<String, i64> = snapshot.by_source.into_iter().collect();
        let by_user: BTreeMap<String, i64> = snapshot.by_performer.into_iter().collect();
        let recent_activity = snapshot.recent.into_iter().map(Self::to_dto).collect();

        Ok(AuditStatistics {
            total_actions,
            actions_by_type: by_type,
            actions_by_source: by_source,
            actions_by_user: by_user,
            success_rate: success_rate(successful, total_actions),
            recent_activity,
        })
    }

    async fn entries_since(
        &self,
        source: AuditSource,
        since: DateTime<Utc>,
    ) -> Result<Vec<AuditLogDto>, AuditError> {
        let filter = AuditLogFilter {
            source: Some(source.as_str().to_string()),
            from: Some(since.to_rfc3339_opts(SecondsFormat::Micros, true)),
            ..Default::default()
        };
        let rows = self.store.all_audit_logs(&filter).await?;
        Ok(rows.into_iter().map(Self::to_dto).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ObjectType;
    use serde_json::json;

    async fn service() -> SeaOrmAuditService {
        SeaOrmAuditService::new(Store::new("sqlite::memory:").await.unwrap())
    }

    #[test]
    fn test_success_rate_rounding() {
        assert!((success_rate(2, 3) - 66.67).abs() < f64::EPSILON);
        assert!(success_rate(0, 0).abs() < f64::EPSILON);
        assert!((success_rate(5, 5) - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_end_date_is_inclusive() {
        let filter = SeaOrmAuditService::build_filter(&AuditLogQuery {
            start_date: Some("2024-01-15".to_string()),
            end_date: Some("2024-01-15".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(filter.from.as_deref(), Some("2024-01-15T00:00:00"));
        assert_eq!(filter.until.as_deref(), Some("2024-01-16T00:00:00"));
    }

    #[test]
    fn test_rejects_unknown_action_and_bad_dates() {
        let unknown = SeaOrmAuditService::build_filter(&AuditLogQuery {
            action_type: Some("format_disk".to_string()),
            ..Default::default()
        });
        assert!(matches!(unknown, Err(AuditError::Validation(_))));

        let bad_date = SeaOrmAuditService::build_filter(&AuditLogQuery {
            start_date: Some("15/01/2024".to_string()),
            ..Default::default()
        });
        assert!(matches!(bad_date, Err(AuditError::Validation(_))));
    }

    #[tokio::test]
    async fn test_record_and_list() {
        let service = service().await;

        service
            .record(
                AuditEntry::new(AuditAction::GroupAdd, "alice", "john.doe", ObjectType::User)
                    .with_details(json!({ "group_name": "Finance" })),
            )
            .await
            .unwrap();
        service
            .record(
                AuditEntry::new(
                    AuditAction::PasswordReset,
                    "bob",
                    "jane.smith",
                    ObjectType::User,
                )
                .failed("Password does not meet the password policy"),
            )
            .await
            .unwrap();

        let all = service.list(AuditLogQuery::default()).await.unwrap();
        assert_eq!(all.total_count, 2);
        assert_eq!(all.limit, DEFAULT_LIMIT);
        assert_eq!(all.logs[0].action_type, "password_reset");
        assert!(!all.logs[0].success);
        assert_eq!(all.logs[1].details["group_name"], "Finance");

        let searched = service
            .list(AuditLogQuery {
                search: Some("alic".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(searched.total_count, 1);
        assert_eq!(searched.logs[0].target_object, "john.doe");

        let stats = service.statistics().await.unwrap();
        assert_eq!(stats.total_actions, 2);
        assert!((stats.success_rate - 50.0).abs() < f64::EPSILON);
        assert_eq!(stats.actions_by_user.get("alice"), Some(&1));
        assert_eq!(stats.actions_by_source.get("web_app"), Some(&2));
        assert_eq!(stats.recent_activity.len(), 2);

        let since = Utc::now() - chrono::Duration::hours(1);
        let web = service.entries_since(AuditSource::WebApp, since).await.unwrap();
        assert_eq!(web.len(), 2);
        assert_eq!(web[0].target_object, "john.doe");
        assert!(
            service
                .entries_since(AuditSource::AdDetected, since)
                .await
                .unwrap()
                .is_empty()
        );
        assert!(
            service
                .entries_since(AuditSource::WebApp, Utc::now() + chrono::Duration::hours(1))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_statistics_agree_under_concurrent_writes() {
        let db_path = std::env::temp_dir().join(format!("adpulse-stats-{}.db", Uuid::new_v4()));
        let store = Store::new(&format!("sqlite:{}", db_path.display()))
            .await
            .unwrap();
        let service = std::sync::Arc::new(SeaOrmAuditService::new(store));

        let writer = {
            let service = std::sync::Arc::clone(&service);
            tokio::spawn(async move {
                for i in 0..40 {
                    let entry =
                        AuditEntry::new(AuditAction::GroupAdd, "alice", "john.doe", ObjectType::User);
                    let entry = if i % 3 == 0 { entry.failed("denied") } else { entry };
                    service.record(entry).await.unwrap();
                }
            })
        };

        for _ in 0..20 {
            let stats = service.statistics().await.unwrap();
            let by_type: i64 = stats.actions_by_type.values().sum();
            let by_user: i64 = stats.actions_by_user.values().sum();
            assert_eq!(u64::try_from(by_type).unwrap(), stats.total_actions);
            assert_eq!(u64::try_from(by_user).unwrap(), stats.total_actions);
        }
        writer.await.unwrap();

        let stats = service.statistics().await.unwrap();
        assert_eq!(stats.total_actions, 40);
        std::fs::remove_file(&db_path).ok();
    }

    #[tokio::test]
    async fn test_limit_bounds() {
        let service = service().await;
        let err = service
            .list(AuditLogQuery {
                limit: Some(501),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::Validation(_)));
    }
}
