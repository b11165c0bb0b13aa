use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::api::types::{AuditLogDto, ChangesQuery, ChangesResponse};
use crate::directory::{DirectoryBackend, DirectoryChange};
use crate::domain::{AuditAction, AuditSource, ChangeType, ObjectTypeFilter};
use crate::services::audit_service::{AuditEntry, AuditService};
use crate::services::change_service::{
    CHANGE_MONITOR_OPERATOR, ChangeError, ChangeService, DEFAULT_HOURS, MAX_HOURS, change_dto,
};

/// Each poll looks back this far past the previous one to absorb clock skew
/// between domain controllers.
const POLL_OVERLAP_MINUTES: i64 = 5;

/// A change this close to one of our own audited mutations on the same
/// object is attributed to that mutation.
const OWN_CHANGE_SKEW_SECONDS: i64 = 5;

#[derive(Default)]
struct MonitorState {
    last_poll: Option<DateTime<Utc>>,
    /// `(object key, whenChanged)` pairs already recorded.
    seen: HashMap<String, DateTime<Utc>>,
}

/// `whenChanged` has one-second resolution in the directory, so keys drop the
/// fraction.
fn seen_key(object_type: &str, name: &str, when_changed: DateTime<Utc>) -> String {
    format!(
        "{}:{}@{}",
        object_type,
        name.trim().to_lowercase(),
        when_changed.timestamp()
    )
}

fn change_key(change: &DirectoryChange) -> String {
    seen_key(
        change.object_type.as_str(),
        &change.sam_account_name,
        change.when_changed,
    )
}

/// Rebuilds the key of a change recorded by an earlier monitor run.
fn recorded_key(entry: &AuditLogDto) -> Option<(String, DateTime<Utc>)> {
    let when_changed = entry.details.get("when_changed")?.as_str()?;
    let when_changed = DateTime::parse_from_rfc3339(when_changed)
        .ok()?
        .with_timezone(&Utc);
    Some((
        seen_key(&entry.target_type, &entry.target_object, when_changed),
        when_changed,
    ))
}

/// Latest successful application mutation per touched object name. A
/// membership change touches both the member and the group.
fn own_mutations(entries: &[AuditLogDto]) -> HashMap<String, DateTime<Utc>> {
    let mut touched: HashMap<String, DateTime<Utc>> = HashMap::new();
    for entry in entries.iter().filter(|e| e.success) {
        let Ok(at) = DateTime::parse_from_rfc3339(&entry.timestamp) else {
            continue;
        };
        let at = at.with_timezone(&Utc);

        let related = ["group_name", "member"]
            .into_iter()
            .filter_map(|field| entry.details.get(field).and_then(|v| v.as_str()));
        for name in std::iter::once(entry.target_object.as_str()).chain(related) {
            let latest = touched.entry(name.trim().to_lowercase()).or_insert(at);
            if at > *latest {
                *latest = at;
            }
        }
    }
    touched
}

pub struct DirectoryChangeService {
    directory: Arc<dyn DirectoryBackend>,
    audit: Arc<dyn AuditService>,
    lookback: Duration,
    monitor: Mutex<MonitorState>,
}

impl DirectoryChangeService {
    /// `lookback_hours` bounds the first monitor pass.
    #[must_use]
    pub fn new(
        directory: Arc<dyn DirectoryBackend>,
        audit: Arc<dyn AuditService>,
        lookback_hours: i64,
    ) -> Self {
        Self {
            directory,
            audit,
            lookback: Duration::hours(lookback_hours.max(1)),
            monitor: Mutex::new(MonitorState::default()),
        }
    }
}

#[async_trait]
impl ChangeService for DirectoryChangeService {
    async fn list_recent(&self, query: ChangesQuery) -> Result<ChangesResponse, ChangeError> {
        let hours = query.hours.unwrap_or(DEFAULT_HOURS);
        if !(1..=MAX_HOURS).contains(&hours) {
            return Err(ChangeError::Validation(format!(
                "hours must be between 1 and {MAX_HOURS}"
            )));
        }
        let filter = query
            .object_type
            .as_deref()
            .map(str::parse::<ObjectTypeFilter>)
            .transpose()
            .map_err(ChangeError::Validation)?
            .unwrap_or_default();

        let since = Utc::now() - Duration::hours(hours);
        let mut changes = self.directory.changes_since(since, filter).await?;
        changes.sort_by(|a, b| {
            b.when_changed
                .cmp(&a.when_changed)
                .then_with(|| a.sam_account_name.cmp(&b.sam_account_name))
        });

        let changes: Vec<_> = changes.into_iter().map(change_dto).collect();
        Ok(ChangesResponse {
            total_count: changes.len(),
            changes,
            hours,
        })
    }

    async fn detect_changes(&self) -> Result<usize, ChangeError> {
        // Held for the whole pass so overlapping runs cannot double-record.
        let mut monitor = self.monitor.lock().await;
        let now = Utc::now();
        let since = monitor.last_poll.map_or(now - self.lookback, |last| {
            last - Duration::minutes(POLL_OVERLAP_MINUTES)
        });

        if monitor.last_poll.is_none() {
            let recorded = self
                .audit
                .entries_since(AuditSource::AdDetected, since)
                .await?;
            monitor.seen.extend(recorded.iter().filter_map(recorded_key));
            debug!(seeded = monitor.seen.len(), "Loaded previously recorded changes");
        }

        let skew = Duration::seconds(OWN_CHANGE_SKEW_SECONDS);
        let own = own_mutations(
            &self
                .audit
                .entries_since(AuditSource::WebApp, since - skew)
                .await?,
        );

        let mut changes = self
            .directory
            .changes_since(since, ObjectTypeFilter::All)
            .await?;
        changes.sort_by_key(|c| c.when_changed);

        let mut recorded = 0;
        let mut skipped_own = 0;
        for change in changes {
            let key = change_key(&change);
            if monitor.seen.contains_key(&key) {
                continue;
            }

            let made_here = own
                .get(&change.sam_account_name.trim().to_lowercase())
                .is_some_and(|at| *at >= change.when_changed - skew);
            if made_here {
                monitor.seen.insert(key, change.when_changed);
                skipped_own += 1;
                continue;
            }

            let change_type = ChangeType::classify(&change.when_created, &change.when_changed);
            let entry = AuditEntry::new(
                AuditAction::AdChangeDetected,
                CHANGE_MONITOR_OPERATOR,
                &change.sam_account_name,
                change.object_type,
            )
            .with_source(AuditSource::AdDetected)
            .with_details(json!({
                "change_type": change_type,
                "distinguished_name": change.distinguished_name.to_string(),
                "when_changed": change.when_changed.to_rfc3339_opts(SecondsFormat::Secs, true),
            }));
            self.audit.record(entry).await?;

            monitor.seen.insert(key, change.when_changed);
            recorded += 1;
        }

        monitor.seen.retain(|_, when_changed| *when_changed >= since);
        monitor.last_poll = Some(now);

        if recorded > 0 {
            info!(
                event = "directory_changes_detected",
                count = recorded,
                skipped_own,
                since = %since
            );
        } else {
            debug!(since = %since, skipped_own, "No new directory changes");
        }
        Ok(recorded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::AuditLogQuery;
    use crate::db::Store;
    use crate::directory::MemoryDirectory;
    use crate::domain::DistinguishedName;
    use crate::services::audit_service_impl::SeaOrmAuditService;

    async fn setup() -> (Arc<MemoryDirectory>, Arc<dyn AuditService>, DirectoryChangeService) {
        let directory = Arc::new(MemoryDirectory::seeded(
            DistinguishedName::parse("DC=example,DC=com").unwrap(),
        ));
        let store = Store::new("sqlite::memory:").await.unwrap();
        let audit: Arc<dyn AuditService> = Arc::new(SeaOrmAuditService::new(store));
        let service = DirectoryChangeService::new(directory.clone(), Arc::clone(&audit), 24);
        (directory, audit, service)
    }

    #[tokio::test]
    async fn test_list_recent_sorted_and_classified() {
        let (_, _, service) = setup().await;
        let response = service
            .list_recent(ChangesQuery {
                hours: Some(24),
                object_type: Some("user".to_string()),
            })
            .await
            .unwrap();

        assert_eq!(response.hours, 24);
        assert_eq!(response.total_count, response.changes.len());
        let names: Vec<&str> = response
            .changes
            .iter()
            .map(|c| c.sam_account_name.as_str())
            .collect();
        assert_eq!(names, vec!["temp.user", "john.doe"]);
        assert_eq!(response.changes[0].change_type, "created");
        assert_eq!(response.changes[1].change_type, "modified");
        assert!(
            response
                .changes
                .windows(2)
                .all(|w| w[0].when_changed >= w[1].when_changed)
        );
    }

    #[tokio::test]
    async fn test_list_recent_validation() {
        let (_, _, service) = setup().await;
        let err = service
            .list_recent(ChangesQuery {
                hours: Some(721),
                object_type: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ChangeError::Validation(_)));

        let err = service
            .list_recent(ChangesQuery {
                hours: None,
                object_type: Some("printer".to_string()),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ChangeError::Validation(_)));
    }

    #[tokio::test]
    async fn test_monitor_records_each_change_once() {
        let (directory, audit, service) = setup().await;

        let first = service.detect_changes().await.unwrap();
        assert_eq!(first, 2);
        assert_eq!(service.detect_changes().await.unwrap(), 0);

        let john = directory.get_user("john.doe").await.unwrap().unwrap();
        directory
            .set_account_status(&john.distinguished_name, crate::domain::AccountStatus::Disabled)
            .await
            .unwrap();
        assert_eq!(service.detect_changes().await.unwrap(), 1);

        let logs = audit.list(AuditLogQuery::default()).await.unwrap();
        assert_eq!(logs.total_count, 3);
        assert!(logs.logs.iter().all(|l| l.source == "ad_detected"));
        assert!(logs.logs.iter().all(|l| l.performed_by == "directory"));
        assert_eq!(logs.logs[0].action_type, "ad_change_detected");
    }

    #[tokio::test]
    async fn test_monitor_ignores_changes_made_through_the_api() {
        use crate::api::types::AccountStatusRequest;
        use crate::config::DirectoryConfig;
        use crate::services::directory_service::{DirectoryService, Operator};
        use crate::services::directory_service_impl::AuditedDirectoryService;

        let (directory, audit, service) = setup().await;
        assert_eq!(service.detect_changes().await.unwrap(), 2);

        let config = DirectoryConfig {
            base_dn: "DC=example,DC=com".to_string(),
            ..DirectoryConfig::default()
        };
        let api = AuditedDirectoryService::new(directory.clone(), Arc::clone(&audit), &config);
        let operator = Operator("alice".to_string());
        api.set_user_status(&operator, "jane.smith", AccountStatusRequest { enabled: false })
            .await
            .unwrap();
        api.add_user_to_group(&operator, "john.doe", "Finance")
            .await
            .unwrap();

        assert_eq!(service.detect_changes().await.unwrap(), 0);

        let admin = directory.get_user("admin.user").await.unwrap().unwrap();
        directory
            .set_account_status(&admin.distinguished_name, crate::domain::AccountStatus::Disabled)
            .await
            .unwrap();
        assert_eq!(service.detect_changes().await.unwrap(), 1);

        let detected = audit
            .list(AuditLogQuery {
                source: Some("ad_detected".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(detected.total_count, 3);
        assert_eq!(detected.logs[0].target_object, "admin.user");
        assert!(
            detected
                .logs
                .iter()
                .all(|l| l.target_object != "jane.smith" && l.target_object != "Finance")
        );
    }

    #[tokio::test]
    async fn test_monitor_does_not_replay_after_restart() {
        let (directory, audit, service) = setup().await;
        assert_eq!(service.detect_changes().await.unwrap(), 2);

        let restarted = DirectoryChangeService::new(directory.clone(), Arc::clone(&audit), 24);
        assert_eq!(restarted.detect_changes().await.unwrap(), 0);

        let detected = audit
            .list(AuditLogQuery {
                action_type: Some("ad_change_detected".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(detected.total_count, 2);
    }
}
