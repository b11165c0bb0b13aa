use anyhow::Result;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub mod migrator;
pub mod repositories;

pub use crate::entities::audit_logs::Model as AuditLogRow;
pub use repositories::audit::{AuditLogFilter, AuditSnapshot};
pub use repositories::settings::StoredConnection;

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        let in_memory = db_url.contains(":memory:");
        if !in_memory {
            let path_str = db_url
                .trim_start_matches("sqlite://")
                .trim_start_matches("sqlite:");
            let path_str = path_str.split('?').next().unwrap_or(path_str);
            if let Some(parent) = Path::new(path_str).parent()
                && !parent.as_os_str().is_empty()
            {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        // Every pooled connection to `sqlite::memory:` is a separate database.
        let (max_connections, min_connections) = if in_memory {
            (1, 1)
        } else {
            (max_connections, min_connections)
        };

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .sqlx_logging(false);
        if !in_memory {
            opt.max_lifetime(Duration::from_secs(600));
        }

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn audit_repo(&self) -> repositories::audit::AuditRepository {
        repositories::audit::AuditRepository::new(self.conn.clone())
    }

    fn settings_repo(&self) -> repositories::settings::SettingsRepository {
        repositories::settings::SettingsRepository::new(self.conn.clone())
    }

    pub async fn add_audit_log(&self, entry: AuditLogRow) -> Result<()> {
        self.audit_repo().insert(entry).await
    }

    pub async fn list_audit_logs(
        &self,
        filter: &AuditLogFilter,
        limit: u64,
        offset: u64,
    ) -> Result<(Vec<AuditLogRow>, u64)> {
        self.audit_repo().list(filter, limit, offset).await
    }

    pub async fn all_audit_logs(&self, filter: &AuditLogFilter) -> Result<Vec<AuditLogRow>> {
        self.audit_repo().all(filter).await
    }

    pub async fn audit_snapshot(&self, recent_limit: u64) -> Result<AuditSnapshot> {
        self.audit_repo().snapshot(recent_limit).await
    }

    pub async fn get_connection_settings(&self) -> Result<Option<StoredConnection>> {
        self.settings_repo().get().await
    }

    pub async fn save_connection_settings(&self, settings: &StoredConnection) -> Result<()> {
        self.settings_repo().save(settings).await
    }

    pub async fn clear_connection_settings(&self) -> Result<bool> {
        self.settings_repo().clear().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, timestamp: &str, action: &str, success: bool) -> AuditLogRow {
        AuditLogRow {
            id: id.to_string(),
            timestamp: timestamp.to_string(),
            action_type: action.to_string(),
            source: "web_app".to_string(),
            performed_by: "web_app_user".to_string(),
            target_object: "john.doe".to_string(),
            target_type: "user".to_string(),
            details: "{}".to_string(),
            success,
            error_message: None,
        }
    }

    #[tokio::test]
    async fn test_audit_round_trip_and_aggregates() {
        let store = Store::new("sqlite::memory:").await.unwrap();

        store
            .add_audit_log(row("a", "2024-01-15T10:00:00.000000Z", "password_reset", true))
            .await
            .unwrap();
        store
            .add_audit_log(row("b", "2024-01-16T10:00:00.000000Z", "group_add", false))
            .await
            .unwrap();
        store
            .add_audit_log(row("c", "2024-01-17T10:00:00.000000Z", "group_add", true))
            .await
            .unwrap();

        let (items, total) = store
            .list_audit_logs(&AuditLogFilter::default(), 2, 0)
            .await
            .unwrap();
        assert_eq!(total, 3);
        assert_eq!(items[0].id, "c");
        assert_eq!(items[1].id, "b");

        let filter = AuditLogFilter {
            action_type: Some("group_add".to_string()),
            until: Some("2024-01-17T00:00:00".to_string()),
            ..Default::default()
        };
        let (items, total) = store.list_audit_logs(&filter, 10, 0).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(items[0].id, "b");

        let snapshot = store.audit_snapshot(2).await.unwrap();
        assert_eq!(snapshot.total, 3);
        assert_eq!(snapshot.successful, 2);
        assert_eq!(snapshot.recent.len(), 2);
        assert_eq!(snapshot.recent[0].id, "c");
        let mut by_action = snapshot.by_action;
        by_action.sort();
        assert_eq!(
            by_action,
            vec![
                ("group_add".to_string(), 2),
                ("password_reset".to_string(), 1)
            ]
        );
    }

    #[tokio::test]
    async fn test_connection_settings_lifecycle() {
        let store = Store::new("sqlite::memory:").await.unwrap();
        assert!(store.get_connection_settings().await.unwrap().is_none());

        let mut settings = StoredConnection {
            server: "dc01.example.com".to_string(),
            domain: "example.com".to_string(),
            username: "admin".to_string(),
            base_dn: "DC=example,DC=com".to_string(),
            updated_at: "2024-01-15T10:00:00Z".to_string(),
        };
        store.save_connection_settings(&settings).await.unwrap();
        settings.server = "dc02.example.com".to_string();
        store.save_connection_settings(&settings).await.unwrap();

        assert_eq!(
            store.get_connection_settings().await.unwrap(),
            Some(settings)
        );
        assert!(store.clear_connection_settings().await.unwrap());
        assert!(!store.clear_connection_settings().await.unwrap());
    }
}
