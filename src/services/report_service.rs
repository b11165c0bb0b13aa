//! Reports and dashboard aggregates.
//!
//! Every report is computed from one directory snapshot against one `now`,
//! by the pure functions below.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::api::types::{
    ComputerInventory, DashboardStats, DaysQuery, ExpiringPasswordDto, InactiveComputerDto,
    InactiveComputersReport, InventoryEntry, PasswordExpiryReport, RecentLoginDto,
};
use crate::directory::{DirectoryComputer, DirectoryError, DirectoryGroup, DirectoryUser};

pub const DEFAULT_EXPIRY_DAYS: i64 = 7;
pub const MAX_EXPIRY_DAYS: i64 = 90;
pub const DEFAULT_INACTIVE_DAYS: i64 = 30;
pub const MAX_INACTIVE_DAYS: i64 = 365;

const DASHBOARD_LIST_LIMIT: usize = 10;
const UNKNOWN_OS: &str = "Unknown";
const UNSPECIFIED_DEPARTMENT: &str = "Unspecified";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Directory(String),
}

impl From<DirectoryError> for ReportError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::Unreachable(_) | DirectoryError::AuthenticationFailed(_) => {
                Self::Unavailable(err.to_string())
            }
            other => Self::Directory(other.to_string()),
        }
    }
}

/// Domain service trait for reports.
#[async_trait::async_trait]
pub trait ReportService: Send + Sync {
    /// # Errors
    ///
    /// Returns [`ReportError::Validation`] unless `1 <= days <= 90`.
    async fn password_expiry(&self, query: DaysQuery) -> Result<PasswordExpiryReport, ReportError>;

    /// # Errors
    ///
    /// Returns [`ReportError::Validation`] unless `1 <= days <= 365`.
    async fn inactive_computers(
        &self,
        query: DaysQuery,
    ) -> Result<InactiveComputersReport, ReportError>;

    async fn computer_inventory(&self) -> Result<ComputerInventory, ReportError>;

    async fn dashboard(&self) -> Result<DashboardStats, ReportError>;
}

/// Resolves `days`, applying the default and the allowed range.
///
/// # Errors
///
/// Returns [`ReportError::Validation`] when `days` is out of range.
pub fn days_param(days: Option<i64>, default: i64, max: i64) -> Result<i64, ReportError> {
    let days = days.unwrap_or(default);
    if (1..=max).contains(&days) {
        Ok(days)
    } else {
        Err(ReportError::Validation(format!(
            "days must be between 1 and {max}"
        )))
    }
}

/// Trims an OS string and collapses inner whitespace; empty becomes `Unknown`.
#[must_use]
pub fn normalize_os(os: Option<&str>) -> String {
    let normalized = os
        .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default();
    if normalized.is_empty() {
        UNKNOWN_OS.to_string()
    } else {
        normalized
    }
}

/// Whole days until `expires`, rounded up.
fn days_until(expires: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let seconds = (expires - now).num_seconds();
    let day = Duration::days(1).num_seconds();
    (seconds + day - 1).div_euclid(day)
}

/// Enabled users whose password expires within `[now, now + days]`, soonest
/// first. Users flagged to change their password at next logon have no
/// `password_last_set` and are skipped.
#[must_use]
pub fn expiring_passwords(
    users: &[DirectoryUser],
    max_password_age: Duration,
    days: i64,
    now: DateTime<Utc>,
) -> Vec<ExpiringPasswordDto> {
    let horizon = now + Duration::days(days);

    let mut expiring: Vec<ExpiringPasswordDto> = users
        .iter()
        .filter(|u| u.status.is_enabled())
        .filter_map(|u| {
            let expires = u.password_last_set? + max_password_age;
            (expires >= now && expires <= horizon).then(|| ExpiringPasswordDto {
                sam_account_name: u.sam_account_name.clone(),
                display_name: u.display_name.clone(),
                days_left: days_until(expires, now),
                password_expires: expires,
            })
        })
        .collect();

    expiring.sort_by(|a, b| {
        a.password_expires
            .cmp(&b.password_expires)
            .then_with(|| a.sam_account_name.cmp(&b.sam_account_name))
    });
    expiring
}

/// Computers that have not logged on since `now - days`, never-seen first,
/// then oldest logon first.
#[must_use]
pub fn inactive_computers(
    computers: &[DirectoryComputer],
    days: i64,
    now: DateTime<Utc>,
) -> Vec<InactiveComputerDto> {
    let cutoff = now - Duration::days(days);

    let mut inactive: Vec<&DirectoryComputer> = computers
        .iter()
        .filter(|c| c.last_logon.is_none_or(|logon| logon < cutoff))
        .collect();
    // None sorts before Some.
    inactive.sort_by(|a, b| a.last_logon.cmp(&b.last_logon).then_with(|| a.name.cmp(&b.name)));

    inactive
        .into_iter()
        .map(|c| InactiveComputerDto {
            name: c.name.clone(),
            sam_account_name: c.sam_account_name.clone(),
            last_logon: c.last_logon,
            operating_system: c.operating_system.clone(),
            organizational_unit: c.distinguished_name.ou_path(),
        })
        .collect()
}

#[must_use]
pub fn inventory(computers: &[DirectoryComputer]) -> ComputerInventory {
    let mut inventory: BTreeMap<String, InventoryEntry> = BTreeMap::new();

    for computer in computers {
        let entry = inventory
            .entry(normalize_os(computer.operating_system.as_deref()))
            .or_default();
        entry.count += 1;
        entry.computers.push(computer.name.clone());
    }
    for entry in inventory.values_mut() {
        entry.computers.sort_by_key(|name| name.to_lowercase());
    }

    ComputerInventory {
        inventory,
        total_count: computers.len(),
    }
}

#[must_use]
pub fn dashboard(
    users: &[DirectoryUser],
    computers: &[DirectoryComputer],
    groups: &[DirectoryGroup],
    max_password_age: Duration,
    now: DateTime<Utc>,
) -> DashboardStats {
    let active_users = users.iter().filter(|u| u.status.is_enabled()).count();
    let active_computers = computers.iter().filter(|c| c.status.is_enabled()).count();

    let mut users_by_department: BTreeMap<String, usize> = BTreeMap::new();
    for user in users {
        let department = user
            .department
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or(UNSPECIFIED_DEPARTMENT);
        *users_by_department.entry(department.to_string()).or_default() += 1;
    }

    let mut computers_by_os: BTreeMap<String, usize> = BTreeMap::new();
    for computer in computers {
        *computers_by_os
            .entry(normalize_os(computer.operating_system.as_deref()))
            .or_default() += 1;
    }

    let mut recent_logins: Vec<RecentLoginDto> = users
        .iter()
        .filter_map(|u| {
            u.last_logon.map(|last_logon| RecentLoginDto {
                sam_account_name: u.sam_account_name.clone(),
                display_name: u.display_name.clone(),
                last_logon,
            })
        })
        .collect();
    recent_logins.sort_by(|a, b| b.last_logon.cmp(&a.last_logon));
    recent_logins.truncate(DASHBOARD_LIST_LIMIT);

    let mut expiring = expiring_passwords(users, max_password_age, DEFAULT_EXPIRY_DAYS, now);
    expiring.truncate(DASHBOARD_LIST_LIMIT);

    DashboardStats {
        total_users: users.len(),
        active_users,
        disabled_users: users.len() - active_users,
        total_computers: computers.len(),
        active_computers,
        disabled_computers: computers.len() - active_computers,
        total_groups: groups.len(),
        users_by_department,
        computers_by_os,
        recent_logins,
        expiring_passwords: expiring,
    }
}
