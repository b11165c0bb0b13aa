use anyhow::{Context, Result};
use sea_orm::{DatabaseConnection, EntityTrait, Set};

use crate::entities::{connection_settings, prelude::*};

const SETTINGS_ROW: i32 = 1;

/// Non-secret connection fields as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredConnection {
    pub server: String,
    pub domain: String,
    pub username: String,
    pub base_dn: String,
    pub updated_at: String,
}

impl From<connection_settings::Model> for StoredConnection {
    fn from(model: connection_settings::Model) -> Self {
        Self {
            server: model.server,
            domain: model.domain,
            username: model.username,
            base_dn: model.base_dn,
            updated_at: model.updated_at,
        }
    }
}

pub struct SettingsRepository {
    conn: DatabaseConnection,
}

impl SettingsRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn get(&self) -> Result<Option<StoredConnection>> {
        let row = ConnectionSettings::find_by_id(SETTINGS_ROW)
            .one(&self.conn)
            .await
            .context("Failed to load connection settings")?;
        Ok(row.map(StoredConnection::from))
    }

    pub async fn save(&self, settings: &StoredConnection) -> Result<()> {
        let active_model = connection_settings::ActiveModel {
            id: Set(SETTINGS_ROW),
            server: Set(settings.server.clone()),
            domain: Set(settings.domain.clone()),
            username: Set(settings.username.clone()),
            base_dn: Set(settings.base_dn.clone()),
            updated_at: Set(settings.updated_at.clone()),
        };

        ConnectionSettings::insert(active_model)
            .on_conflict(
                sea_orm::sea_query::OnConflict::column(connection_settings::Column::Id)
                    .update_columns([
                        connection_settings::Column::Server,
                        connection_settings::Column::Domain,
                        connection_settings::Column::Username,
                        connection_settings::Column::BaseDn,
                        connection_settings::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec(&self.conn)
            .await
            .context("Failed to save connection settings")?;
        Ok(())
    }

    /// Returns whether a row was removed.
    pub async fn clear(&self) -> Result<bool> {
        let result = ConnectionSettings::delete_by_id(SETTINGS_ROW)
            .exec(&self.conn)
            .await
            .context("Failed to clear connection settings")?;
        Ok(result.rows_affected > 0)
    }
}
