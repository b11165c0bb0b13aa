//! Access to the directory that owns users, computers, groups and OUs.
//!
//! [`DirectoryBackend`] is the seam between the services and the directory.
//! [`LdapDirectory`] talks to Active Directory over LDAP; [`MemoryDirectory`]
//! keeps a seeded directory in process for mock mode and tests.

pub mod ldap;
pub mod memory;
pub mod policy;

pub use ldap::{BindSettings, LdapDirectory};
pub use memory::MemoryDirectory;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{AccountStatus, DistinguishedName, ObjectType, ObjectTypeFilter};

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    #[error("{0}")]
    Conflict(String),

    #[error("Password does not meet the password policy: {0}")]
    PolicyViolation(String),

    #[error("{0}")]
    Invalid(String),

    #[error("Cannot reach directory server: {0}")]
    Unreachable(String),

    #[error("Directory authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Directory operation failed (code {code}): {message}")]
    Protocol { code: u32, message: String },
}

impl DirectoryError {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }
}

pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// A named attribute shown on detail pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryAttribute {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct DirectoryUser {
    pub sam_account_name: String,
    pub display_name: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub title: Option<String>,
    pub department: Option<String>,
    pub distinguished_name: DistinguishedName,
    /// Names of the groups the user is a direct member of.
    pub groups: Vec<String>,
    pub status: AccountStatus,
    /// `None` when the password was never set or must change at next logon.
    pub password_last_set: Option<DateTime<Utc>>,
    pub last_logon: Option<DateTime<Utc>>,
    pub when_created: Option<DateTime<Utc>>,
    pub when_changed: Option<DateTime<Utc>>,
    pub attributes: Vec<DirectoryAttribute>,
}

#[derive(Debug, Clone)]
pub struct DirectoryComputer {
    pub sam_account_name: String,
    pub name: String,
    pub dns_host_name: Option<String>,
    pub operating_system: Option<String>,
    pub operating_system_version: Option<String>,
    pub operating_system_service_pack: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub managed_by: Option<String>,
    pub distinguished_name: DistinguishedName,
    pub groups: Vec<String>,
    pub status: AccountStatus,
    pub last_logon: Option<DateTime<Utc>>,
    pub when_created: Option<DateTime<Utc>>,
    pub when_changed: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct DirectoryGroup {
    pub name: String,
    pub distinguished_name: DistinguishedName,
    pub description: Option<String>,
    pub members: Vec<DistinguishedName>,
    pub when_created: Option<DateTime<Utc>>,
    pub when_changed: Option<DateTime<Utc>>,
}

impl DirectoryGroup {
    #[must_use]
    pub fn has_member(&self, dn: &DistinguishedName) -> bool {
        self.members.iter().any(|m| m == dn)
    }
}

/// An OU or well-known container that objects can be placed in.
#[derive(Debug, Clone)]
pub struct DirectoryContainer {
    pub name: String,
    pub distinguished_name: DistinguishedName,
    pub description: Option<String>,
}

/// A user or computer as it appears in a group's member list.
#[derive(Debug, Clone)]
pub struct DirectoryMember {
    pub sam_account_name: String,
    pub display_name: String,
    pub email: Option<String>,
    pub distinguished_name: DistinguishedName,
    pub object_type: ObjectType,
}

impl From<&DirectoryUser> for DirectoryMember {
    fn from(user: &DirectoryUser) -> Self {
        Self {
            sam_account_name: user.sam_account_name.clone(),
            display_name: user.display_name.clone(),
            email: user.email.clone(),
            distinguished_name: user.distinguished_name.clone(),
            object_type: ObjectType::User,
        }
    }
}

impl From<&DirectoryComputer> for DirectoryMember {
    fn from(computer: &DirectoryComputer) -> Self {
        Self {
            sam_account_name: computer.sam_account_name.clone(),
            display_name: computer.name.clone(),
            email: None,
            distinguished_name: computer.distinguished_name.clone(),
            object_type: ObjectType::Computer,
        }
    }
}

/// An object whose `whenChanged` falls inside a change window.
#[derive(Debug, Clone)]
pub struct DirectoryChange {
    pub object_type: ObjectType,
    pub sam_account_name: String,
    pub display_name: String,
    pub distinguished_name: DistinguishedName,
    pub when_created: DateTime<Utc>,
    pub when_changed: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewGroup {
    pub name: String,
    pub description: Option<String>,
    pub container: DistinguishedName,
}

/// Filters for user listings.
#[derive(Debug, Clone, Default)]
pub struct UserQuery {
    pub search: Option<String>,
    pub group: Option<String>,
}

impl UserQuery {
    /// Case-insensitive substring match on display name, account name or
    /// mail, combined with exact (case-insensitive) group membership.
    #[must_use]
    pub fn matches(&self, user: &DirectoryUser) -> bool {
        if let Some(group) = self.group.as_deref()
            && !user.groups.iter().any(|g| g.eq_ignore_ascii_case(group))
        {
            return false;
        }

        let Some(needle) = normalized_search(self.search.as_deref()) else {
            return true;
        };

        contains_ci(&user.display_name, &needle)
            || contains_ci(&user.sam_account_name, &needle)
            || user.email.as_deref().is_some_and(|e| contains_ci(e, &needle))
    }
}

/// Filters for computer listings.
#[derive(Debug, Clone, Default)]
pub struct ComputerQuery {
    pub search: Option<String>,
    /// Substring of the computer's OU path.
    pub ou: Option<String>,
}

impl ComputerQuery {
    #[must_use]
    pub fn matches(&self, computer: &DirectoryComputer) -> bool {
        if let Some(ou) = normalized_search(self.ou.as_deref()) {
            let path = computer.distinguished_name.ou_path().unwrap_or_default();
            if !contains_ci(&path, &ou) {
                return false;
            }
        }

        let Some(needle) = normalized_search(self.search.as_deref()) else {
            return true;
        };

        contains_ci(&computer.name, &needle)
            || contains_ci(&computer.sam_account_name, &needle)
            || computer
                .dns_host_name
                .as_deref()
                .is_some_and(|h| contains_ci(h, &needle))
    }
}

fn normalized_search(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_lowercase)
}

fn contains_ci(haystack: &str, lowered_needle: &str) -> bool {
    haystack.to_lowercase().contains(lowered_needle)
}

/// Operations the services need from a directory.
///
/// Lookups by account name are case-insensitive. Mutations address objects by
/// DN; callers resolve names first so that not-found errors name the object
/// the operator asked for.
#[async_trait::async_trait]
pub trait DirectoryBackend: Send + Sync {
    /// Verifies the directory is reachable with the configured credentials.
    async fn ping(&self) -> DirectoryResult<()>;

    async fn list_users(&self, query: &UserQuery) -> DirectoryResult<Vec<DirectoryUser>>;

    async fn get_user(&self, sam_account_name: &str) -> DirectoryResult<Option<DirectoryUser>>;

    async fn list_computers(&self, query: &ComputerQuery)
    -> DirectoryResult<Vec<DirectoryComputer>>;

    /// `sam_account_name` must already carry the trailing `$`.
    async fn get_computer(&self, sam_account_name: &str)
    -> DirectoryResult<Option<DirectoryComputer>>;

    async fn list_groups(&self) -> DirectoryResult<Vec<DirectoryGroup>>;

    async fn get_group(&self, name: &str) -> DirectoryResult<Option<DirectoryGroup>>;

    /// Resolves the members of `group` that are users or computers.
    async fn list_group_members(
        &self,
        group: &DirectoryGroup,
    ) -> DirectoryResult<Vec<DirectoryMember>>;

    /// OUs plus the well-known `Users` and `Computers` containers.
    async fn list_containers(&self) -> DirectoryResult<Vec<DirectoryContainer>>;

    async fn get_container(
        &self,
        dn: &DistinguishedName,
    ) -> DirectoryResult<Option<DirectoryContainer>>;

    /// Finds a user, or failing that a computer, by account name.
    async fn find_member(&self, sam_account_name: &str)
    -> DirectoryResult<Option<DirectoryMember>>;

    async fn set_password(
        &self,
        dn: &DistinguishedName,
        new_password: &str,
        must_change: bool,
    ) -> DirectoryResult<()>;

    async fn set_account_status(
        &self,
        dn: &DistinguishedName,
        status: AccountStatus,
    ) -> DirectoryResult<()>;

    async fn add_member(
        &self,
        group: &DistinguishedName,
        member: &DistinguishedName,
    ) -> DirectoryResult<()>;

    async fn remove_member(
        &self,
        group: &DistinguishedName,
        member: &DistinguishedName,
    ) -> DirectoryResult<()>;

    /// Re-parents an object in one operation and returns its new DN.
    async fn move_object(
        &self,
        dn: &DistinguishedName,
        new_parent: &DistinguishedName,
    ) -> DirectoryResult<DistinguishedName>;

    async fn create_group(&self, group: &NewGroup) -> DirectoryResult<DistinguishedName>;

    async fn delete_object(&self, dn: &DistinguishedName) -> DirectoryResult<()>;

    /// Objects created or modified at or after `since`.
    async fn changes_since(
        &self,
        since: DateTime<Utc>,
        filter: ObjectTypeFilter,
    ) -> DirectoryResult<Vec<DirectoryChange>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(sam: &str, display: &str, email: Option<&str>, groups: &[&str]) -> DirectoryUser {
        DirectoryUser {
            sam_account_name: sam.to_string(),
            display_name: display.to_string(),
            email: email.map(str::to_string),
            first_name: None,
            last_name: None,
            title: None,
            department: None,
            distinguished_name: DistinguishedName::parse(&format!(
                "CN={display},CN=Users,DC=example,DC=com"
            ))
            .unwrap(),
            groups: groups.iter().map(ToString::to_string).collect(),
            status: AccountStatus::Enabled,
            password_last_set: None,
            last_logon: None,
            when_created: None,
            when_changed: None,
            attributes: Vec::new(),
        }
    }

    #[test]
    fn test_user_query_requires_group_and_search() {
        let query = UserQuery {
            search: Some("SMITH".to_string()),
            group: Some("Finance".to_string()),
        };

        let in_both = user("jsmith", "John Smith", None, &["Finance"]);
        let wrong_group = user("asmith", "Anna Smith", None, &["HR"]);
        let no_match = user("jdoe", "John Doe", Some("jdoe@example.com"), &["Finance"]);
        let by_mail = user("bob", "Bob", Some("bob.smith@example.com"), &["finance"]);

        assert!(query.matches(&in_both));
        assert!(!query.matches(&wrong_group));
        assert!(!query.matches(&no_match));
        assert!(query.matches(&by_mail));
    }

    #[test]
    fn test_blank_search_matches_all() {
        let query = UserQuery {
            search: Some("   ".to_string()),
            group: None,
        };
        assert!(query.matches(&user("x", "X", None, &[])));
    }
}
