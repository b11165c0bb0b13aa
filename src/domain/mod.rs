//! Domain primitives for directory administration.
//!
//! Object kinds, the collapsed account status, audit vocabularies and the
//! structured distinguished name live here so that every layer speaks the same
//! closed set of values instead of loose strings.

pub mod dn;

pub use dn::{DistinguishedName, DnParseError, Rdn};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Bit in `userAccountControl` marking a disabled account.
pub const UAC_ACCOUNTDISABLE: u32 = 0x0002;

/// `userAccountControl` of a freshly created, enabled user account.
pub const UAC_NORMAL_ACCOUNT: u32 = 0x0200;

/// `userAccountControl` of a freshly created, enabled computer account.
pub const UAC_WORKSTATION_TRUST_ACCOUNT: u32 = 0x1000;

/// Kind of directory object an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    User,
    Computer,
    Group,
}

impl ObjectType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Computer => "computer",
            Self::Group => "group",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Object kinds selectable when listing recent changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectTypeFilter {
    #[default]
    All,
    User,
    Computer,
    Group,
}

impl ObjectTypeFilter {
    #[must_use]
    pub const fn includes(self, object_type: ObjectType) -> bool {
        matches!(
            (self, object_type),
            (Self::All, _)
                | (Self::User, ObjectType::User)
                | (Self::Computer, ObjectType::Computer)
                | (Self::Group, ObjectType::Group)
        )
    }
}

impl FromStr for ObjectTypeFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "all" => Ok(Self::All),
            "user" => Ok(Self::User),
            "computer" => Ok(Self::Computer),
            "group" => Ok(Self::Group),
            other => Err(format!(
                "Invalid object_type '{other}'. Expected all, user, computer or group"
            )),
        }
    }
}

/// Whether an account may authenticate.
///
/// The directory stores this as one bit of `userAccountControl`; the wire
/// format carries it twice (`account_enabled` and `account_disabled`). Inside
/// the service it is always this single value.
///
/// # Examples
///
/// ```rust
/// use adpulse::domain::AccountStatus;
///
/// let status = AccountStatus::from_uac(514);
/// assert_eq!(status, AccountStatus::Disabled);
/// assert_eq!(AccountStatus::Enabled.apply_to_uac(514), 512);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Enabled,
    Disabled,
}

impl AccountStatus {
    #[must_use]
    pub const fn from_enabled(enabled: bool) -> Self {
        if enabled {
            Self::Enabled
        } else {
            Self::Disabled
        }
    }

    #[must_use]
    pub const fn from_uac(uac: u32) -> Self {
        if uac & UAC_ACCOUNTDISABLE == 0 {
            Self::Enabled
        } else {
            Self::Disabled
        }
    }

    #[must_use]
    pub const fn is_enabled(self) -> bool {
        matches!(self, Self::Enabled)
    }

    /// Returns `uac` with the disable bit set or cleared; other flags are kept.
    #[must_use]
    pub const fn apply_to_uac(self, uac: u32) -> u32 {
        match self {
            Self::Enabled => uac & !UAC_ACCOUNTDISABLE,
            Self::Disabled => uac | UAC_ACCOUNTDISABLE,
        }
    }
}

/// Closed set of audited actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    PasswordReset,
    AccountEnable,
    AccountDisable,
    GroupAdd,
    GroupRemove,
    ComputerEnable,
    ComputerDisable,
    ComputerGroupAdd,
    ComputerGroupRemove,
    MemberAdd,
    MemberRemove,
    GroupCreate,
    GroupDelete,
    ComputerMove,
    AdChangeDetected,
}

impl AuditAction {
    pub const ALL: [Self; 15] = [
        Self::PasswordReset,
        Self::AccountEnable,
        Self::AccountDisable,
        Self::GroupAdd,
        Self::GroupRemove,
        Self::ComputerEnable,
        Self::ComputerDisable,
        Self::ComputerGroupAdd,
        Self::ComputerGroupRemove,
        Self::MemberAdd,
        Self::MemberRemove,
        Self::GroupCreate,
        Self::GroupDelete,
        Self::ComputerMove,
        Self::AdChangeDetected,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PasswordReset => "password_reset",
            Self::AccountEnable => "account_enable",
            Self::AccountDisable => "account_disable",
            Self::GroupAdd => "group_add",
            Self::GroupRemove => "group_remove",
            Self::ComputerEnable => "computer_enable",
            Self::ComputerDisable => "computer_disable",
            Self::ComputerGroupAdd => "computer_group_add",
            Self::ComputerGroupRemove => "computer_group_remove",
            Self::MemberAdd => "member_add",
            Self::MemberRemove => "member_remove",
            Self::GroupCreate => "group_create",
            Self::GroupDelete => "group_delete",
            Self::ComputerMove => "computer_move",
            Self::AdChangeDetected => "ad_change_detected",
        }
    }

    /// Action recorded for an enable/disable request on `object_type`.
    #[must_use]
    pub const fn for_status(object_type: ObjectType, status: AccountStatus) -> Self {
        match (object_type, status) {
            (ObjectType::Computer, AccountStatus::Enabled) => Self::ComputerEnable,
            (ObjectType::Computer, AccountStatus::Disabled) => Self::ComputerDisable,
            (_, AccountStatus::Enabled) => Self::AccountEnable,
            (_, AccountStatus::Disabled) => Self::AccountDisable,
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| format!("Unknown action_type '{s}'"))
    }
}

/// Where an audit entry originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSource {
    WebApp,
    AdDetected,
}

impl AuditSource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WebApp => "web_app",
            Self::AdDetected => "ad_detected",
        }
    }
}

impl fmt::Display for AuditSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "web_app" => Ok(Self::WebApp),
            "ad_detected" => Ok(Self::AdDetected),
            other => Err(format!("Unknown source '{other}'")),
        }
    }
}

/// Classification of a detected directory change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Created,
    Modified,
}

impl ChangeType {
    /// An object whose `whenChanged` equals its `whenCreated` has not been
    /// touched since creation.
    #[must_use]
    pub fn classify<T: PartialEq>(when_created: &T, when_changed: &T) -> Self {
        if when_created == when_changed {
            Self::Created
        } else {
            Self::Modified
        }
    }
}

/// Normalizes a computer account name to its `sAMAccountName` form
/// (trailing `$`).
#[must_use]
pub fn computer_sam(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.ends_with('$') {
        trimmed.to_string()
    } else {
        format!("{trimmed}$")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_status_preserves_other_flags() {
        // 0x10200: normal account + password never expires
        let uac = 0x1_0200;
        let disabled = AccountStatus::Disabled.apply_to_uac(uac);
        assert_eq!(disabled, 0x1_0202);
        assert_eq!(AccountStatus::from_uac(disabled), AccountStatus::Disabled);
        assert_eq!(AccountStatus::Enabled.apply_to_uac(disabled), uac);
    }

    #[test]
    fn test_audit_action_parse() {
        for action in AuditAction::ALL {
            assert_eq!(action.as_str().parse::<AuditAction>(), Ok(action));
        }
        assert!("drop_table".parse::<AuditAction>().is_err());
    }

    #[test]
    fn test_status_action_mapping() {
        assert_eq!(
            AuditAction::for_status(ObjectType::Computer, AccountStatus::Disabled),
            AuditAction::ComputerDisable
        );
        assert_eq!(
            AuditAction::for_status(ObjectType::User, AccountStatus::Enabled),
            AuditAction::AccountEnable
        );
    }

    #[test]
    fn test_object_type_filter() {
        let filter: ObjectTypeFilter = "Computer".parse().unwrap();
        assert!(filter.includes(ObjectType::Computer));
        assert!(!filter.includes(ObjectType::User));
        assert!(ObjectTypeFilter::All.includes(ObjectType::Group));
        assert!("printer".parse::<ObjectTypeFilter>().is_err());
    }

    #[test]
    fn test_change_type_classify() {
        assert_eq!(ChangeType::classify(&1, &1), ChangeType::Created);
        assert_eq!(ChangeType::classify(&1, &2), ChangeType::Modified);
    }

    #[test]
    fn test_computer_sam() {
        assert_eq!(computer_sam("PC-001"), "PC-001$");
        assert_eq!(computer_sam("PC-001$"), "PC-001$");
    }
}
