use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub directory: DirectoryConfig,

    pub audit: AuditConfig,

    pub change_detection: ChangeDetectionConfig,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    pub max_db_connections: u32,

    pub min_db_connections: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/adpulse.db".to_string(),
            log_level: "info".to_string(),
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,

    pub port: u16,

    pub cors_allowed_origins: Vec<String>,

    /// Directory holding the built frontend. Served with an `index.html`
    /// fallback when it exists.
    pub frontend_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8000,
            cors_allowed_origins: vec![
                "http://localhost:5173".to_string(),
                "http://127.0.0.1:5173".to_string(),
                "http://localhost:8000".to_string(),
            ],
            frontend_dir: "frontend/dist".to_string(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// `ldap://host:389` or `ldaps://host:636`. A bare host name gets `ldap://`.
    pub server: String,

    pub domain: String,

    pub username: String,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub password: String,

    pub base_dn: String,

    /// Serve an in-memory directory seeded with sample objects instead of a
    /// live server.
    pub mock_mode: bool,

    pub connect_timeout_seconds: u64,

    /// Page size for the paged-results control on directory searches.
    pub page_size: i32,

    /// Domain `maxPwdAge` in days, used to compute password expiry.
    pub max_password_age_days: i64,

    /// Container for new groups when no OU is given. Relative to `base_dn`.
    pub default_group_container: String,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            server: String::new(),
            domain: String::new(),
            username: String::new(),
            password: String::new(),
            base_dn: String::new(),
            mock_mode: false,
            connect_timeout_seconds: 10,
            page_size: 500,
            max_password_age_days: 90,
            default_group_container: "CN=Users".to_string(),
        }
    }
}

impl std::fmt::Debug for DirectoryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryConfig")
            .field("server", &self.server)
            .field("domain", &self.domain)
            .field("username", &self.username)
            .field("password", &"********")
            .field("base_dn", &self.base_dn)
            .field("mock_mode", &self.mock_mode)
            .field("connect_timeout_seconds", &self.connect_timeout_seconds)
            .field("page_size", &self.page_size)
            .field("max_password_age_days", &self.max_password_age_days)
            .field("default_group_container", &self.default_group_container)
            .finish()
    }
}

impl DirectoryConfig {
    /// Full DN of the default group container.
    #[must_use]
    pub fn group_container_dn(&self) -> String {
        if self.base_dn.is_empty() {
            self.default_group_container.clone()
        } else {
            format!("{},{}", self.default_group_container, self.base_dn)
        }
    }

    fn apply_env(&mut self) {
        let read = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());

        if let Some(v) = read("LDAP_SERVER") {
            self.server = v;
        }
        if let Some(v) = read("LDAP_DOMAIN") {
            self.domain = v;
        }
        if let Some(v) = read("LDAP_USERNAME") {
            self.username = v;
        }
        if let Some(v) = read("LDAP_PASSWORD") {
            self.password = v;
        }
        if let Some(v) = read("LDAP_BASE_DN") {
            self.base_dn = v;
        }
        if let Some(v) = read("MOCK_MODE") {
            self.mock_mode = matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Recorded as `performed_by` when the request carries no `X-Operator` header.
    pub default_operator: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            default_operator: "web_app_user".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeDetectionConfig {
    pub enabled: bool,

    pub interval_minutes: u32,

    pub cron_expression: Option<String>,

    /// How far back the first poll looks after startup.
    pub lookback_hours: i64,
}

impl Default for ChangeDetectionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_minutes: 15,
            cron_expression: None,
            lookback_hours: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,

    pub loki_enabled: bool,

    pub loki_url: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            loki_enabled: false,
            loki_url: "http://localhost:3100".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            server: ServerConfig::default(),
            directory: DirectoryConfig::default(),
            audit: AuditConfig::default(),
            change_detection: ChangeDetectionConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Config {
    /// Loads the first config file found, then applies `.env` and `LDAP_*`
    /// overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_file()?;

        if dotenvy::dotenv().is_ok() {
            info!("Loaded environment overrides from .env");
        }
        config.directory.apply_env();

        Ok(config)
    }

    fn load_file() -> Result<Self> {
        for path in &Self::config_paths() {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("adpulse").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".adpulse").join("config.toml"));
        }

        paths
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_config_path();
        if path.exists() {
            Ok(false)
        } else {
            let config = Self::default();
            config.save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.directory.mock_mode {
            if self.directory.server.trim().is_empty() {
                anyhow::bail!("directory.server must be set unless mock_mode is enabled");
            }
            if self.directory.base_dn.trim().is_empty() {
                anyhow::bail!("directory.base_dn must be set unless mock_mode is enabled");
            }
        }

        if self.directory.max_password_age_days <= 0 {
            anyhow::bail!("directory.max_password_age_days must be positive");
        }

        if self.directory.page_size <= 0 {
            anyhow::bail!("directory.page_size must be positive");
        }

        if self.change_detection.enabled
            && self.change_detection.interval_minutes == 0
            && self.change_detection.cron_expression.is_none()
        {
            anyhow::bail!("Change detection interval must be > 0 or cron expression must be set");
        }

        Ok(())
    }
}
