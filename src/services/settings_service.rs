//! Saved directory connection settings.
//!
//! Only non-secret fields are kept. The bind password stays in the process
//! configuration and is supplied again for every connection test.

use thiserror::Error;

use crate::api::types::{ConnectionSettingsDto, ConnectionSettingsRequest};

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<anyhow::Error> for SettingsError {
    fn from(err: anyhow::Error) -> Self {
        Self::Database(format!("{err:#}"))
    }
}

#[async_trait::async_trait]
pub trait SettingsService: Send + Sync {
    async fn get_connection(&self) -> Result<Option<ConnectionSettingsDto>, SettingsError>;

    /// # Errors
    ///
    /// Returns [`SettingsError::Validation`] when `server` or `base_dn` is
    /// empty or `base_dn` is not a distinguished name.
    async fn save_connection(
        &self,
        request: ConnectionSettingsRequest,
    ) -> Result<ConnectionSettingsDto, SettingsError>;

    /// Returns whether anything was stored.
    async fn clear_connection(&self) -> Result<bool, SettingsError>;
}
