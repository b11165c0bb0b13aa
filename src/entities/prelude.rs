pub use super::audit_logs::Entity as AuditLogs;
pub use super::connection_settings::Entity as ConnectionSettings;
