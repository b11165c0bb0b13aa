use axum::{
    Router,
    http::{HeaderValue, Uri},
    middleware,
    routing::{get, post},
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::{Config, DirectoryConfig};
use crate::db::Store;
use crate::directory::{BindSettings, DirectoryBackend, LdapDirectory, MemoryDirectory};
use crate::domain::DistinguishedName;
use crate::services::{
    AuditService, AuditedDirectoryService, ChangeService, ConnectionService,
    DirectoryChangeService, DirectoryReportService, DirectoryService, LdapConnectionService,
    ReportService, SeaOrmAuditService, SeaOrmSettingsService, SettingsService,
};

mod audit;
mod changes;
mod computers;
mod connection;
mod dashboard;
mod error;
mod groups;
mod observability;
mod ous;
mod reports;
mod system;
pub mod types;
mod users;
mod validation;

pub use error::{ApiError, ErrorBody};
pub use types::*;

use metrics_exporter_prometheus::PrometheusHandle;

/// Base DN of the sample directory used in mock mode.
pub const MOCK_BASE_DN: &str = "DC=example,DC=com";

pub struct AppState {
    pub config: Config,

    pub store: Store,

    pub directory: Arc<dyn DirectoryService>,

    pub audit: Arc<dyn AuditService>,

    pub reports: Arc<dyn ReportService>,

    pub changes: Arc<dyn ChangeService>,

    pub connection: Arc<dyn ConnectionService>,

    pub settings: Arc<dyn SettingsService>,

    pub start_time: std::time::Instant,

    pub prometheus_handle: Option<PrometheusHandle>,
}

impl AppState {
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    #[must_use]
    pub fn mock_mode(&self) -> bool {
        self.config.directory.mock_mode
    }
}

/// The directory the configuration points at: the sample directory in mock
/// mode, otherwise the LDAP server.
///
/// # Errors
///
/// Fails when the mock base DN cannot be parsed.
pub fn directory_backend(config: &DirectoryConfig) -> anyhow::Result<Arc<dyn DirectoryBackend>> {
    if config.mock_mode {
        let base = if config.base_dn.trim().is_empty() {
            MOCK_BASE_DN
        } else {
            config.base_dn.trim()
        };
        let base = DistinguishedName::parse(base)
            .map_err(|e| anyhow::anyhow!("Invalid base DN '{base}': {e}"))?;
        info!("Mock mode: serving the sample directory at {}", base);
        Ok(Arc::new(MemoryDirectory::seeded(base)))
    } else {
        Ok(Arc::new(LdapDirectory::new(BindSettings::from_config(config))))
    }
}

pub async fn create_app_state(
    config: Config,
    store: Store,
    backend: Arc<dyn DirectoryBackend>,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let audit: Arc<dyn AuditService> = Arc::new(SeaOrmAuditService::new(store.clone()));

    let directory: Arc<dyn DirectoryService> = Arc::new(AuditedDirectoryService::new(
        Arc::clone(&backend),
        Arc::clone(&audit),
        &config.directory,
    ));

    let reports: Arc<dyn ReportService> = Arc::new(DirectoryReportService::new(
        Arc::clone(&backend),
        config.directory.max_password_age_days,
    ));

    let changes: Arc<dyn ChangeService> = Arc::new(DirectoryChangeService::new(
        Arc::clone(&backend),
        Arc::clone(&audit),
        config.change_detection.lookback_hours,
    ));

    let connection: Arc<dyn ConnectionService> = Arc::new(LdapConnectionService::new(
        Duration::from_secs(config.directory.connect_timeout_seconds.max(1)),
    ));

    let settings: Arc<dyn SettingsService> = Arc::new(SeaOrmSettingsService::new(store.clone()));

    Ok(Arc::new(AppState {
        config,
        store,
        directory,
        audit,
        reports,
        changes,
        connection,
        settings,
        start_time: std::time::Instant::now(),
        prometheus_handle,
    }))
}

pub async fn create_app_state_from_config(
    mut config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    if config.directory.mock_mode && config.directory.base_dn.trim().is_empty() {
        config.directory.base_dn = MOCK_BASE_DN.to_string();
    }

    let store = Store::with_pool_options(
        &config.general.database_path,
        config.general.max_db_connections,
        config.general.min_db_connections,
    )
    .await?;
    let backend = directory_backend(&config.directory)?;

    create_app_state(config, store, backend, prometheus_handle).await
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors_origins = state.config.server.cors_allowed_origins.clone();
    let frontend_dir = state.config.server.frontend_dir.clone();

    let api_router = create_api_router()
        .fallback(api_not_found)
        .with_state(state);

    let cors_layer = if cors_origins.contains(&"*".to_string()) {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins)
    };

    let mut app = Router::new().nest("/api", api_router);

    if Path::new(&frontend_dir).is_dir() {
        let index = Path::new(&frontend_dir).join("index.html");
        app = app.fallback_service(ServeDir::new(&frontend_dir).fallback(ServeFile::new(index)));
    }

    app.layer(cors_layer.allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(observability::track_metrics))
}

/// Unknown `/api` paths stay JSON 404s instead of reaching the SPA fallback.
async fn api_not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(format!("No API route for {}", uri.path()))
}

fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/status", get(system::get_status))
        .route("/health", get(system::health))
        .route("/health/live", get(system::liveness))
        .route("/health/ready", get(system::readiness))
        .route("/users", get(users::list_users))
        .route("/users/paginated", get(users::list_users_paginated))
        .route("/users/{sam}", get(users::get_user))
        .route("/users/{sam}/reset-password", post(users::reset_password))
        .route("/users/{sam}/account-status", post(users::set_account_status))
        .route("/users/{sam}/groups/add", post(users::add_to_group))
        .route("/users/{sam}/groups/remove", post(users::remove_from_group))
        .route("/groups", get(groups::list_groups).post(groups::create_group))
        .route(
            "/groups/{name}",
            get(groups::get_group).delete(groups::delete_group),
        )
        .route("/groups/{name}/members", get(groups::list_members))
        .route("/groups/{name}/members/add", post(groups::add_member))
        .route("/groups/{name}/members/remove", post(groups::remove_member))
        .route("/computers", get(computers::list_computers))
        .route(
            "/computers/paginated",
            get(computers::list_computers_paginated),
        )
        .route("/computers/{sam}", get(computers::get_computer))
        .route(
            "/computers/{sam}/account-status",
            post(computers::set_account_status),
        )
        .route("/computers/{sam}/groups/add", post(computers::add_to_group))
        .route(
            "/computers/{sam}/groups/remove",
            post(computers::remove_from_group),
        )
        .route("/computers/{sam}/move", post(computers::move_computer))
        .route("/ous", get(ous::list_ous))
        .route("/test-connection", post(connection::test_connection))
        .route(
            "/settings/connection",
            get(connection::get_settings)
                .put(connection::save_settings)
                .delete(connection::clear_settings),
        )
        .route("/dashboard/stats", get(dashboard::get_stats))
        .route("/audit/logs", get(audit::list_logs))
        .route("/audit/statistics", get(audit::get_statistics))
        .route("/changes/recent", get(changes::list_recent))
        .route("/reports/password-expiry", get(reports::password_expiry))
        .route(
            "/reports/inactive-computers",
            get(reports::inactive_computers),
        )
        .route(
            "/reports/computer-inventory",
            get(reports::computer_inventory),
        )
        .route("/metrics", get(observability::get_metrics))
}
