pub mod locks;
pub use locks::{LockKey, ObjectLocks};

pub mod audit_service;
pub mod audit_service_impl;
pub use audit_service::{AuditEntry, AuditError, AuditService};
pub use audit_service_impl::SeaOrmAuditService;

pub mod directory_service;
pub mod directory_service_impl;
pub use directory_service::{DirectoryService, DirectoryServiceError, Operator};
pub use directory_service_impl::AuditedDirectoryService;

pub mod report_service;
pub mod report_service_impl;
pub use report_service::{ReportError, ReportService};
pub use report_service_impl::DirectoryReportService;

pub mod change_service;
pub mod change_service_impl;
pub use change_service::{ChangeError, ChangeService};
pub use change_service_impl::DirectoryChangeService;

pub mod connection_service;
pub use connection_service::{ConnectionService, LdapConnectionService};

pub mod settings_service;
pub mod settings_service_impl;
pub use settings_service::{SettingsError, SettingsService};
pub use settings_service_impl::SeaOrmSettingsService;

pub mod scheduler;
pub use scheduler::Scheduler;
