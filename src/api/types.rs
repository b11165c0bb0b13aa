use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize)]
pub struct AttributeDto {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserDto {
    pub sam_account_name: String,
    pub display_name: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub title: Option<String>,
    pub department: Option<String>,
    pub groups: Vec<String>,
    pub password_last_set: Option<DateTime<Utc>>,
    pub password_expires: Option<DateTime<Utc>>,
    pub account_enabled: bool,
    pub account_disabled: bool,
    pub last_logon: Option<DateTime<Utc>>,
    pub when_created: Option<DateTime<Utc>>,
    pub when_changed: Option<DateTime<Utc>>,
    pub distinguished_name: String,
    pub attributes: Vec<AttributeDto>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComputerDto {
    pub sam_account_name: String,
    pub name: String,
    pub dns_host_name: Option<String>,
    pub operating_system: Option<String>,
    pub operating_system_version: Option<String>,
    pub operating_system_service_pack: Option<String>,
    pub distinguished_name: String,
    /// OU names from outermost to innermost, joined with `/`.
    pub organizational_unit: Option<String>,
    pub container_dn: Option<String>,
    pub groups: Vec<String>,
    pub account_enabled: bool,
    pub account_disabled: bool,
    pub last_logon: Option<DateTime<Utc>>,
    pub when_created: Option<DateTime<Utc>>,
    pub when_changed: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub managed_by: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupDto {
    pub name: String,
    pub distinguished_name: String,
    pub description: Option<String>,
    pub member_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupMemberDto {
    pub sam_account_name: String,
    pub display_name: String,
    pub email: Option<String>,
    pub distinguished_name: String,
    pub object_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrganizationalUnitDto {
    pub name: String,
    pub distinguished_name: String,
    pub description: Option<String>,
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageInfo {
    pub page: u64,
    pub page_size: u64,
    pub total_count: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

#[derive(Debug, Serialize)]
pub struct UsersPage {
    pub users: Vec<UserDto>,
    #[serde(flatten)]
    pub page: PageInfo,
}

#[derive(Debug, Serialize)]
pub struct ComputersPage {
    pub computers: Vec<ComputerDto>,
    #[serde(flatten)]
    pub page: PageInfo,
}

#[derive(Debug, Serialize)]
pub struct MutationResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

impl MutationResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            enabled: None,
        }
    }

    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditLogDto {
    pub id: String,
    pub timestamp: String,
    pub action_type: String,
    pub source: String,
    pub performed_by: String,
    pub target_object: String,
    pub target_type: String,
    pub success: bool,
    pub details: serde_json::Value,
    pub error_message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuditLogsResponse {
    pub logs: Vec<AuditLogDto>,
    pub total_count: u64,
    pub limit: u64,
    pub offset: u64,
}

#[derive(Debug, Serialize)]
pub struct AuditStatistics {
    pub total_actions: u64,
    pub actions_by_type: BTreeMap<String, i64>,
    pub actions_by_source: BTreeMap<String, i64>,
    pub actions_by_user: BTreeMap<String, i64>,
    /// Percentage of successful actions, two decimals.
    pub success_rate: f64,
    pub recent_activity: Vec<AuditLogDto>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangeDto {
    pub object_type: String,
    pub sam_account_name: String,
    pub display_name: String,
    pub distinguished_name: String,
    pub when_changed: DateTime<Utc>,
    pub when_created: DateTime<Utc>,
    pub change_type: String,
}

#[derive(Debug, Serialize)]
pub struct ChangesResponse {
    pub changes: Vec<ChangeDto>,
    pub total_count: usize,
    pub hours: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpiringPasswordDto {
    pub sam_account_name: String,
    pub display_name: String,
    pub days_left: i64,
    pub password_expires: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct PasswordExpiryReport {
    pub users: Vec<ExpiringPasswordDto>,
    pub total_count: usize,
    pub days_threshold: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct InactiveComputerDto {
    pub name: String,
    pub sam_account_name: String,
    pub last_logon: Option<DateTime<Utc>>,
    pub operating_system: Option<String>,
    pub organizational_unit: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InactiveComputersReport {
    pub computers: Vec<InactiveComputerDto>,
    pub total_count: usize,
    pub days_threshold: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct InventoryEntry {
    pub count: usize,
    pub computers: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ComputerInventory {
    pub inventory: BTreeMap<String, InventoryEntry>,
    pub total_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentLoginDto {
    pub sam_account_name: String,
    pub display_name: String,
    pub last_logon: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub total_users: usize,
    pub active_users: usize,
    pub disabled_users: usize,
    pub total_computers: usize,
    pub active_computers: usize,
    pub disabled_computers: usize,
    pub total_groups: usize,
    pub users_by_department: BTreeMap<String, usize>,
    pub computers_by_os: BTreeMap<String, usize>,
    pub recent_logins: Vec<RecentLoginDto>,
    pub expiring_passwords: Vec<ExpiringPasswordDto>,
}

#[derive(Debug, Serialize)]
pub struct TestConnectionResponse {
    pub success: bool,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Saved connection fields. Never carries a password.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSettingsDto {
    pub server: String,
    pub domain: String,
    pub username: String,
    pub base_dn: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub message: String,
    pub version: String,
    pub mock_mode: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub mock_mode: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
}

// Request bodies

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub new_password: String,
    #[serde(default = "default_must_change")]
    pub must_change: bool,
}

const fn default_must_change() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct AccountStatusRequest {
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct GroupMembershipRequest {
    pub group_name: String,
}

#[derive(Debug, Deserialize)]
pub struct GroupMemberRequest {
    pub sam_account_name: String,
}

#[derive(Debug, Deserialize)]
pub struct MoveComputerRequest {
    pub target_ou_dn: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    pub description: Option<String>,
    pub ou_path: Option<String>,
}

#[derive(Deserialize)]
pub struct ConnectionTestRequest {
    #[serde(default)]
    pub server: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub base_dn: String,
}

impl std::fmt::Debug for ConnectionTestRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionTestRequest")
            .field("server", &self.server)
            .field("domain", &self.domain)
            .field("username", &self.username)
            .field("base_dn", &self.base_dn)
            .finish_non_exhaustive()
    }
}

/// Body of `PUT /settings/connection`. A `password` field is accepted and
/// dropped.
#[derive(Debug, Deserialize)]
pub struct ConnectionSettingsRequest {
    pub server: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub username: String,
    pub base_dn: String,
}

// Query strings

#[derive(Debug, Default, Deserialize)]
pub struct UserListQuery {
    pub group: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ComputerListQuery {
    pub search: Option<String>,
    pub ou: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PaginationQuery {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    pub search: Option<String>,
    pub group: Option<String>,
    pub ou: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AuditLogQuery {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub action_type: Option<String>,
    pub target_object: Option<String>,
    pub target_type: Option<String>,
    pub performed_by: Option<String>,
    pub source: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChangesQuery {
    pub hours: Option<i64>,
    pub object_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DaysQuery {
    pub days: Option<i64>,
}
