use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use tracing::info;

use crate::api::types::{ConnectionSettingsDto, ConnectionSettingsRequest};
use crate::db::{Store, StoredConnection};
use crate::domain::DistinguishedName;
use crate::services::settings_service::{SettingsError, SettingsService};

pub struct SeaOrmSettingsService {
    store: Store,
}

impl SeaOrmSettingsService {
    #[must_use]
    pub const fn new(store: Store) -> Self {
        Self { store }
    }
}

fn to_dto(stored: StoredConnection) -> ConnectionSettingsDto {
    ConnectionSettingsDto {
        server: stored.server,
        domain: stored.domain,
        username: stored.username,
        base_dn: stored.base_dn,
        updated_at: stored.updated_at,
    }
}

#[async_trait]
impl SettingsService for SeaOrmSettingsService {
    async fn get_connection(&self) -> Result<Option<ConnectionSettingsDto>, SettingsError> {
        Ok(self.store.get_connection_settings().await?.map(to_dto))
    }

    async fn save_connection(
        &self,
        request: ConnectionSettingsRequest,
    ) -> Result<ConnectionSettingsDto, SettingsError> {
        let server = request.server.trim();
        if server.is_empty() {
            return Err(SettingsError::Validation("server is required".to_string()));
        }
        let base_dn = DistinguishedName::parse(request.base_dn.trim())
            .map_err(|e| SettingsError::Validation(format!("Invalid base_dn: {e}")))?;

        let stored = StoredConnection {
            server: server.to_string(),
            domain: request.domain.trim().to_string(),
            username: request.username.trim().to_string(),
            base_dn: base_dn.to_string(),
            updated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        };
        self.store.save_connection_settings(&stored).await?;

        info!(event = "connection_settings_saved", server = %stored.server);
        Ok(to_dto(stored))
    }

    async fn clear_connection(&self) -> Result<bool, SettingsError> {
        let cleared = self.store.clear_connection_settings().await?;
        if cleared {
            info!(event = "connection_settings_cleared");
        }
        Ok(cleared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn service() -> SeaOrmSettingsService {
        SeaOrmSettingsService::new(Store::new("sqlite::memory:").await.unwrap())
    }

    fn request(base_dn: &str) -> ConnectionSettingsRequest {
        ConnectionSettingsRequest {
            server: " dc01.example.com ".to_string(),
            domain: "example.com".to_string(),
            username: "svc-adpulse".to_string(),
            base_dn: base_dn.to_string(),
        }
    }

    #[tokio::test]
    async fn test_save_load_clear() {
        let service = service().await;
        assert!(service.get_connection().await.unwrap().is_none());

        let saved = service
            .save_connection(request("DC=example,DC=com"))
            .await
            .unwrap();
        assert_eq!(saved.server, "dc01.example.com");

        let loaded = service.get_connection().await.unwrap().unwrap();
        assert_eq!(loaded.base_dn, "DC=example,DC=com");

        assert!(service.clear_connection().await.unwrap());
        assert!(!service.clear_connection().await.unwrap());
        assert!(service.get_connection().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejects_bad_base_dn() {
        let service = service().await;
        let err = service
            .save_connection(request("not a dn"))
            .await
            .unwrap_err();
        assert!(matches!(err, SettingsError::Validation(_)));
    }
}
