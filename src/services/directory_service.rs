//! Domain service for directory queries and audited mutations.
//!
//! Queries return wire DTOs already sorted and paginated. Every mutation is
//! serialized per target object and produces exactly one audit entry,
//! whether it succeeds, fails, or turns out to be a no-op.

use crate::api::types::{
    AccountStatusRequest, ComputerDto, ComputerListQuery, ComputersPage, CreateGroupRequest,
    GroupDto, GroupMemberDto, MutationResponse, OrganizationalUnitDto, PaginationQuery,
    ResetPasswordRequest, UserDto, UserListQuery, UsersPage,
};
use crate::directory::DirectoryError;
use crate::services::audit_service::AuditError;
use thiserror::Error;

pub const DEFAULT_PAGE_SIZE: u64 = 50;
pub const MAX_PAGE_SIZE: u64 = 100;

/// Errors specific to directory operations.
#[derive(Debug, Error)]
pub enum DirectoryServiceError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    PolicyViolation(String),

    /// The configured directory cannot be reached or rejected the bind.
    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Directory(String),

    #[error("Audit log write failed: {0}")]
    Audit(String),
}

impl From<DirectoryError> for DirectoryServiceError {
    fn from(err: DirectoryError) -> Self {
        let message = err.to_string();
        match err {
            DirectoryError::NotFound { .. } => Self::NotFound(message),
            DirectoryError::Conflict(_) => Self::Conflict(message),
            DirectoryError::PolicyViolation(_) => Self::PolicyViolation(message),
            DirectoryError::Invalid(_) => Self::Validation(message),
            DirectoryError::Unreachable(_) | DirectoryError::AuthenticationFailed(_) => {
                Self::Unavailable(message)
            }
            DirectoryError::Protocol { .. } => Self::Directory(message),
        }
    }
}

impl From<AuditError> for DirectoryServiceError {
    fn from(err: AuditError) -> Self {
        Self::Audit(err.to_string())
    }
}

/// Longest object name or operator accepted.
pub const MAX_NAME_LEN: usize = 256;

/// Checks an object name supplied by a caller and returns it trimmed.
///
/// # Errors
///
/// Returns [`DirectoryServiceError::Validation`] for empty, oversized or
/// control-character names.
pub fn validate_name<'a>(kind: &str, name: &'a str) -> Result<&'a str, DirectoryServiceError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(DirectoryServiceError::Validation(format!(
            "{kind} cannot be empty"
        )));
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(DirectoryServiceError::Validation(format!(
            "{kind} must be at most {MAX_NAME_LEN} characters"
        )));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(DirectoryServiceError::Validation(format!(
            "{kind} contains control characters"
        )));
    }
    Ok(trimmed)
}

/// Who is performing a mutation; recorded as `performed_by`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operator(pub String);

impl Operator {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Domain service trait for directory operations.
#[async_trait::async_trait]
pub trait DirectoryService: Send + Sync {
    /// Checks that the directory answers.
    async fn ping(&self) -> Result<(), DirectoryServiceError>;

    /// All users matching the optional group and search filters, sorted by
    /// display name.
    async fn list_users(&self, query: UserListQuery) -> Result<Vec<UserDto>, DirectoryServiceError>;

    /// # Errors
    ///
    /// Returns [`DirectoryServiceError::Validation`] unless `page >= 1` and
    /// `1 <= page_size <= 100`.
    async fn list_users_paginated(
        &self,
        query: PaginationQuery,
    ) -> Result<UsersPage, DirectoryServiceError>;

    async fn get_user(&self, sam_account_name: &str) -> Result<UserDto, DirectoryServiceError>;

    async fn list_computers(
        &self,
        query: ComputerListQuery,
    ) -> Result<Vec<ComputerDto>, DirectoryServiceError>;

    async fn list_computers_paginated(
        &self,
        query: PaginationQuery,
    ) -> Result<ComputersPage, DirectoryServiceError>;

    /// Accepts the account name with or without the trailing `$`.
    async fn get_computer(&self, sam_account_name: &str)
    -> Result<ComputerDto, DirectoryServiceError>;

    async fn list_groups(&self) -> Result<Vec<GroupDto>, DirectoryServiceError>;

    async fn get_group(&self, name: &str) -> Result<GroupDto, DirectoryServiceError>;

    async fn list_group_members(
        &self,
        name: &str,
    ) -> Result<Vec<GroupMemberDto>, DirectoryServiceError>;

    /// OUs and the well-known containers, sorted by name.
    async fn list_ous(&self) -> Result<Vec<OrganizationalUnitDto>, DirectoryServiceError>;

    /// # Errors
    ///
    /// Returns [`DirectoryServiceError::PolicyViolation`] when the directory
    /// rejects the password.
    async fn reset_password(
        &self,
        operator: &Operator,
        sam_account_name: &str,
        request: ResetPasswordRequest,
    ) -> Result<MutationResponse, DirectoryServiceError>;

    async fn set_user_status(
        &self,
        operator: &Operator,
        sam_account_name: &str,
        request: AccountStatusRequest,
    ) -> Result<MutationResponse, DirectoryServiceError>;

    async fn set_computer_status(
        &self,
        operator: &Operator,
        sam_account_name: &str,
        request: AccountStatusRequest,
    ) -> Result<MutationResponse, DirectoryServiceError>;

    async fn add_user_to_group(
        &self,
        operator: &Operator,
        sam_account_name: &str,
        group_name: &str,
    ) -> Result<MutationResponse, DirectoryServiceError>;

    async fn remove_user_from_group(
        &self,
        operator: &Operator,
        sam_account_name: &str,
        group_name: &str,
    ) -> Result<MutationResponse, DirectoryServiceError>;

    async fn add_computer_to_group(
        &self,
        operator: &Operator,
        sam_account_name: &str,
        group_name: &str,
    ) -> Result<MutationResponse, DirectoryServiceError>;

    async fn remove_computer_from_group(
        &self,
        operator: &Operator,
        sam_account_name: &str,
        group_name: &str,
    ) -> Result<MutationResponse, DirectoryServiceError>;

    /// Group-side add. The member may be a user or a computer.
    async fn add_group_member(
        &self,
        operator: &Operator,
        group_name: &str,
        member: &str,
    ) -> Result<MutationResponse, DirectoryServiceError>;

    async fn remove_group_member(
        &self,
        operator: &Operator,
        group_name: &str,
        member: &str,
    ) -> Result<MutationResponse, DirectoryServiceError>;

    /// Moves a computer into another OU or container with one modify-DN.
    async fn move_computer(
        &self,
        operator: &Operator,
        sam_account_name: &str,
        target_ou_dn: &str,
    ) -> Result<MutationResponse, DirectoryServiceError>;

    async fn create_group(
        &self,
        operator: &Operator,
        request: CreateGroupRequest,
    ) -> Result<MutationResponse, DirectoryServiceError>;

    /// # Errors
    ///
    /// Returns [`DirectoryServiceError::Conflict`] while the group still has
    /// members.
    async fn delete_group(
        &self,
        operator: &Operator,
        name: &str,
    ) -> Result<MutationResponse, DirectoryServiceError>;
}
