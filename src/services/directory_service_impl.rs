//! Directory service backed by a [`DirectoryBackend`] with an audit trail.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use serde_json::json;
use tracing::{error, info};

use crate::api::types::{
    AccountStatusRequest, AttributeDto, ComputerDto, ComputerListQuery, ComputersPage,
    CreateGroupRequest, GroupDto, GroupMemberDto, MutationResponse, OrganizationalUnitDto,
    PageInfo, PaginationQuery, ResetPasswordRequest, UserDto, UserListQuery, UsersPage,
};
use crate::config::DirectoryConfig;
use crate::directory::{
    ComputerQuery, DirectoryBackend, DirectoryComputer, DirectoryContainer, DirectoryError,
    DirectoryGroup, DirectoryMember, DirectoryUser, NewGroup, UserQuery,
};
use crate::domain::{AccountStatus, AuditAction, DistinguishedName, ObjectType, computer_sam};
use crate::services::audit_service::{AuditEntry, AuditService};
use crate::services::directory_service::{
    DEFAULT_PAGE_SIZE, DirectoryService, DirectoryServiceError, MAX_PAGE_SIZE, Operator,
    validate_name,
};
use crate::services::locks::{LockKey, ObjectLocks};

const SAM_FIELD: &str = "sAMAccountName";
const GROUP_FIELD: &str = "Group name";

/// Result of a mutation that reached the directory, or was skipped because
/// the object was already in the requested state.
struct Outcome {
    message: String,
    changed: bool,
}

impl Outcome {
    fn changed(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            changed: true,
        }
    }

    fn unchanged(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            changed: false,
        }
    }
}

/// Which side of a membership change the request names.
#[derive(Clone, Copy)]
enum MemberSide {
    User,
    Computer,
    Group,
}

pub struct AuditedDirectoryService {
    directory: Arc<dyn DirectoryBackend>,
    audit: Arc<dyn AuditService>,
    locks: ObjectLocks,
    max_password_age: Duration,
    group_container: String,
}

impl AuditedDirectoryService {
    #[must_use]
    pub fn new(
        directory: Arc<dyn DirectoryBackend>,
        audit: Arc<dyn AuditService>,
        config: &DirectoryConfig,
    ) -> Self {
        Self {
            directory,
            audit,
            locks: ObjectLocks::new(),
            max_password_age: Duration::days(config.max_password_age_days),
            group_container: config.group_container_dn(),
        }
    }

    fn user_dto(&self, user: DirectoryUser) -> UserDto {
        let password_expires = user.password_last_set.map(|set| set + self.max_password_age);
        let enabled = user.status.is_enabled();

        UserDto {
            sam_account_name: user.sam_account_name,
            display_name: user.display_name,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            title: user.title,
            department: user.department,
            groups: user.groups,
            password_last_set: user.password_last_set,
            password_expires,
            account_enabled: enabled,
            account_disabled: !enabled,
            last_logon: user.last_logon,
            when_created: user.when_created,
            when_changed: user.when_changed,
            distinguished_name: user.distinguished_name.to_string(),
            attributes: user
                .attributes
                .into_iter()
                .map(|a| AttributeDto {
                    name: a.name,
                    value: a.value,
                })
                .collect(),
        }
    }

    async fn require_user(&self, sam: &str) -> Result<DirectoryUser, DirectoryServiceError> {
        self.directory
            .get_user(sam.trim())
            .await?
            .ok_or_else(|| DirectoryError::not_found("User", sam.trim()).into())
    }

    async fn require_computer(
        &self,
        sam: &str,
    ) -> Result<DirectoryComputer, DirectoryServiceError> {
        let sam = computer_sam(sam);
        self.directory
            .get_computer(&sam)
            .await?
            .ok_or_else(|| DirectoryError::not_found("Computer", sam).into())
    }

    async fn require_group(&self, name: &str) -> Result<DirectoryGroup, DirectoryServiceError> {
        self.directory
            .get_group(name.trim())
            .await?
            .ok_or_else(|| DirectoryError::not_found("Group", name.trim()).into())
    }

    async fn require_container(
        &self,
        dn: &str,
    ) -> Result<DirectoryContainer, DirectoryServiceError> {
        let parsed = DistinguishedName::parse(dn.trim()).map_err(|e| {
            DirectoryServiceError::Validation(format!("Invalid container DN '{dn}': {e}"))
        })?;
        self.directory
            .get_container(&parsed)
            .await?
            .ok_or_else(|| DirectoryError::not_found("Organizational unit", dn.trim()).into())
    }

    /// Records the audit entry for a finished mutation and turns the outcome
    /// into the response.
    async fn finish(
        &self,
        entry: AuditEntry,
        result: Result<Outcome, DirectoryServiceError>,
    ) -> Result<MutationResponse, DirectoryServiceError> {
        let action = entry.action;
        let target = entry.target_object.clone();

        match result {
            Ok(outcome) => {
                let mut entry = entry;
                if let serde_json::Value::Object(map) = &mut entry.details {
                    map.insert("changed".to_string(), json!(outcome.changed));
                }
                self.audit.record(entry).await?;

                info!(
                    event = "directory_mutation",
                    action = %action,
                    target = %target,
                    changed = outcome.changed,
                    success = true,
                );
                Ok(MutationResponse::ok(outcome.message))
            }
            Err(err) => {
                info!(
                    event = "directory_mutation",
                    action = %action,
                    target = %target,
                    success = false,
                    error = %err,
                );
                if let Err(audit_err) = self.audit.record(entry.failed(err.to_string())).await {
                    error!(
                        action = %action,
                        target = %target,
                        error = %audit_err,
                        "Failed to record audit entry for failed mutation"
                    );
                    return Err(audit_err.into());
                }
                Err(err)
            }
        }
    }

    async fn try_reset_password(
        &self,
        sam: &str,
        request: &ResetPasswordRequest,
    ) -> Result<Outcome, DirectoryServiceError> {
        if request.new_password.is_empty() {
            return Err(DirectoryServiceError::Validation(
                "new_password must not be empty".to_string(),
            ));
        }

        let user = self.require_user(sam).await?;
        self.directory
            .set_password(
                &user.distinguished_name,
                &request.new_password,
                request.must_change,
            )
            .await?;

        Ok(Outcome::changed(format!(
            "Password reset for '{}'",
            user.sam_account_name
        )))
    }

    async fn try_set_status(
        &self,
        object_type: ObjectType,
        sam: &str,
        status: AccountStatus,
    ) -> Result<Outcome, DirectoryServiceError> {
        let (dn, current, name) = match object_type {
            ObjectType::Computer => {
                let computer = self.require_computer(sam).await?;
                (
                    computer.distinguished_name,
                    computer.status,
                    computer.sam_account_name,
                )
            }
            _ => {
                let user = self.require_user(sam).await?;
                (user.distinguished_name, user.status, user.sam_account_name)
            }
        };

        let verb = if status.is_enabled() {
            "enabled"
        } else {
            "disabled"
        };
        if current == status {
            return Ok(Outcome::unchanged(format!("Account '{name}' is already {verb}")));
        }

        self.directory.set_account_status(&dn, status).await?;
        Ok(Outcome::changed(format!("Account '{name}' {verb}")))
    }

    async fn set_status(
        &self,
        operator: &Operator,
        object_type: ObjectType,
        sam: &str,
        enabled: bool,
    ) -> Result<MutationResponse, DirectoryServiceError> {
        let status = AccountStatus::from_enabled(enabled);
        let target = match object_type {
            ObjectType::Computer => computer_sam(sam),
            _ => sam.trim().to_string(),
        };

        let _guard = self
            .locks
            .acquire(&[LockKey::new(object_type, &target)])
            .await;

        let result = match validate_name(SAM_FIELD, sam) {
            Ok(_) => self.try_set_status(object_type, &target, status).await,
            Err(err) => Err(err),
        };
        let entry = AuditEntry::new(
            AuditAction::for_status(object_type, status),
            operator.as_str(),
            &target,
            object_type,
        )
        .with_details(json!({ "enabled": enabled }));

        self.finish(entry, result)
            .await
            .map(|response| response.with_enabled(enabled))
    }

    async fn resolve_member(
        &self,
        side: MemberSide,
        sam: &str,
    ) -> Result<DirectoryMember, DirectoryServiceError> {
        match side {
            MemberSide::User => Ok(DirectoryMember::from(&self.require_user(sam).await?)),
            MemberSide::Computer => {
                Ok(DirectoryMember::from(&self.require_computer(sam).await?))
            }
            MemberSide::Group => self
                .directory
                .find_member(sam.trim())
                .await?
                .ok_or_else(|| DirectoryError::not_found("User or computer", sam.trim()).into()),
        }
    }

    async fn try_change_membership(
        &self,
        group: &DirectoryGroup,
        member: &DirectoryMember,
        add: bool,
    ) -> Result<Outcome, DirectoryServiceError> {
        let present = group.has_member(&member.distinguished_name);
        let (member_name, group_name) = (&member.sam_account_name, &group.name);

        if add && present {
            return Ok(Outcome::unchanged(format!(
                "'{member_name}' is already a member of '{group_name}'"
            )));
        }
        if !add && !present {
            return Ok(Outcome::unchanged(format!(
                "'{member_name}' is not a member of '{group_name}'"
            )));
        }

        let result = if add {
            self.directory
                .add_member(&group.distinguished_name, &member.distinguished_name)
                .await
        } else {
            self.directory
                .remove_member(&group.distinguished_name, &member.distinguished_name)
                .await
        };

        match result {
            Ok(()) if add => Ok(Outcome::changed(format!(
                "Added '{member_name}' to '{group_name}'"
            ))),
            Ok(()) => Ok(Outcome::changed(format!(
                "Removed '{member_name}' from '{group_name}'"
            ))),
            // Membership changed between the read and the write.
            Err(DirectoryError::Conflict(_)) => Ok(Outcome::unchanged(format!(
                "Membership of '{member_name}' in '{group_name}' already as requested"
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn change_membership(
        &self,
        operator: &Operator,
        side: MemberSide,
        member_sam: &str,
        group_name: &str,
        add: bool,
    ) -> Result<MutationResponse, DirectoryServiceError> {
        let action = match (side, add) {
            (MemberSide::User, true) => AuditAction::GroupAdd,
            (MemberSide::User, false) => AuditAction::GroupRemove,
            (MemberSide::Computer, true) => AuditAction::ComputerGroupAdd,
            (MemberSide::Computer, false) => AuditAction::ComputerGroupRemove,
            (MemberSide::Group, true) => AuditAction::MemberAdd,
            (MemberSide::Group, false) => AuditAction::MemberRemove,
        };
        let raw_member = member_sam;
        let group_name = group_name.trim();
        let member_sam = match side {
            MemberSide::Computer => computer_sam(member_sam),
            _ => member_sam.trim().to_string(),
        };

        let entry = match side {
            MemberSide::Group => {
                AuditEntry::new(action, operator.as_str(), group_name, ObjectType::Group)
                    .with_details(json!({ "member": member_sam }))
            }
            MemberSide::User => {
                AuditEntry::new(action, operator.as_str(), &member_sam, ObjectType::User)
                    .with_details(json!({ "group_name": group_name }))
            }
            MemberSide::Computer => {
                AuditEntry::new(action, operator.as_str(), &member_sam, ObjectType::Computer)
                    .with_details(json!({ "group_name": group_name }))
            }
        };

        let names = validate_name(GROUP_FIELD, group_name)
            .and_then(|_| validate_name(SAM_FIELD, raw_member));
        if let Err(err) = names {
            return self.finish(entry, Err(err)).await;
        }

        let member = match self.resolve_member(side, &member_sam).await {
            Ok(member) => member,
            Err(err) => return self.finish(entry, Err(err)).await,
        };

        let _guard = self
            .locks
            .acquire(&[
                LockKey::new(member.object_type, &member.sam_account_name),
                LockKey::new(ObjectType::Group, group_name),
            ])
            .await;

        // Re-read the group under the lock so the membership check is current.
        let result = match self.require_group(group_name).await {
            Ok(group) => self.try_change_membership(&group, &member, add).await,
            Err(err) => Err(err),
        };
        self.finish(entry, result).await
    }

    async fn try_move_computer(
        &self,
        sam: &str,
        target_ou_dn: &str,
    ) -> Result<Outcome, DirectoryServiceError> {
        if target_ou_dn.trim().is_empty() {
            return Err(DirectoryServiceError::Validation(
                "target_ou_dn must not be empty".to_string(),
            ));
        }
        let container = self.require_container(target_ou_dn).await?;
        let computer = self.require_computer(sam).await?;

        if computer.distinguished_name.parent().as_ref() == Some(&container.distinguished_name) {
            return Ok(Outcome::unchanged(format!(
                "'{}' is already in '{}'",
                computer.sam_account_name, container.distinguished_name
            )));
        }

        let new_dn = self
            .directory
            .move_object(&computer.distinguished_name, &container.distinguished_name)
            .await?;

        Ok(Outcome::changed(format!(
            "Moved '{}' to '{}'",
            computer.sam_account_name,
            new_dn.parent().unwrap_or(container.distinguished_name)
        )))
    }

    async fn try_create_group(
        &self,
        request: &CreateGroupRequest,
    ) -> Result<Outcome, DirectoryServiceError> {
        let name = validate_name(GROUP_FIELD, &request.name)?;

        let container = match request.ou_path.as_deref().map(str::trim) {
            Some(path) if !path.is_empty() => self.require_container(path).await?.distinguished_name,
            _ => DistinguishedName::parse(&self.group_container).map_err(|e| {
                DirectoryServiceError::Validation(format!(
                    "Invalid default group container '{}': {e}",
                    self.group_container
                ))
            })?,
        };

        if self.directory.get_group(name).await?.is_some() {
            return Err(DirectoryServiceError::Conflict(format!(
                "Group '{name}' already exists"
            )));
        }

        let dn = self
            .directory
            .create_group(&NewGroup {
                name: name.to_string(),
                description: request
                    .description
                    .as_deref()
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .map(str::to_string),
                container,
            })
            .await?;

        Ok(Outcome::changed(format!("Group '{name}' created at '{dn}'")))
    }

    async fn try_delete_group(&self, name: &str) -> Result<Outcome, DirectoryServiceError> {
        let group = self.require_group(name).await?;
        if !group.members.is_empty() {
            return Err(DirectoryServiceError::Conflict(format!(
                "Group '{}' still has {} member(s); remove them first",
                group.name,
                group.members.len()
            )));
        }

        self.directory
            .delete_object(&group.distinguished_name)
            .await?;
        Ok(Outcome::changed(format!("Group '{}' deleted", group.name)))
    }
}

/// Validates paging parameters and cuts one page out of `items`.
pub fn paginate<T>(
    items: Vec<T>,
    page: Option<u64>,
    page_size: Option<u64>,
) -> Result<(Vec<T>, PageInfo), DirectoryServiceError> {
    let page = page.unwrap_or(1);
    let page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE);

    if page < 1 {
        return Err(DirectoryServiceError::Validation(
            "page must be at least 1".to_string(),
        ));
    }
    if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
        return Err(DirectoryServiceError::Validation(format!(
            "page_size must be between 1 and {MAX_PAGE_SIZE}"
        )));
    }

    let total_count = items.len() as u64;
    let total_pages = total_count.div_ceil(page_size);
    let start = usize::try_from((page - 1).saturating_mul(page_size)).unwrap_or(usize::MAX);
    let take = usize::try_from(page_size).unwrap_or(usize::MAX);

    let slice: Vec<T> = items.into_iter().skip(start).take(take).collect();

    Ok((
        slice,
        PageInfo {
            page,
            page_size,
            total_count,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
        },
    ))
}

fn sort_key(primary: &str, secondary: &str) -> (String, String) {
    (primary.to_lowercase(), secondary.to_lowercase())
}

#[must_use]
pub fn computer_dto(computer: DirectoryComputer) -> ComputerDto {
    let enabled = computer.status.is_enabled();
    let organizational_unit = computer.distinguished_name.ou_path();
    let container_dn = computer.distinguished_name.parent().map(|p| p.to_string());

    ComputerDto {
        sam_account_name: computer.sam_account_name,
        name: computer.name,
        dns_host_name: computer.dns_host_name,
        operating_system: computer.operating_system,
        operating_system_version: computer.operating_system_version,
        operating_system_service_pack: computer.operating_system_service_pack,
        distinguished_name: computer.distinguished_name.to_string(),
        organizational_unit,
        container_dn,
        groups: computer.groups,
        account_enabled: enabled,
        account_disabled: !enabled,
        last_logon: computer.last_logon,
        when_created: computer.when_created,
        when_changed: computer.when_changed,
        description: computer.description,
        location: computer.location,
        managed_by: computer.managed_by,
    }
}

fn group_dto(group: DirectoryGroup) -> GroupDto {
    GroupDto {
        member_count: group.members.len(),
        name: group.name,
        distinguished_name: group.distinguished_name.to_string(),
        description: group.description,
    }
}

#[async_trait]
impl DirectoryService for AuditedDirectoryService {
    async fn ping(&self) -> Result<(), DirectoryServiceError> {
        Ok(self.directory.ping().await?)
    }

    async fn list_users(&self, query: UserListQuery) -> Result<Vec<UserDto>, DirectoryServiceError> {
        let mut users = self
            .directory
            .list_users(&UserQuery {
                search: query.search,
                group: query.group,
            })
            .await?;
        users.sort_by_cached_key(|u| sort_key(&u.display_name, &u.sam_account_name));
        Ok(users.into_iter().map(|u| self.user_dto(u)).collect())
    }

    async fn list_users_paginated(
        &self,
        query: PaginationQuery,
    ) -> Result<UsersPage, DirectoryServiceError> {
        let (page, page_size) = (query.page, query.page_size);
        // Validate before querying the directory.
        paginate(Vec::<()>::new(), page, page_size)?;

        let users = self
            .list_users(UserListQuery {
                group: query.group,
                search: query.search,
            })
            .await?;
        let (users, page) = paginate(users, page, page_size)?;
        Ok(UsersPage { users, page })
    }

    async fn get_user(&self, sam_account_name: &str) -> Result<UserDto, DirectoryServiceError> {
        Ok(self.user_dto(self.require_user(sam_account_name).await?))
    }

    async fn list_computers(
        &self,
        query: ComputerListQuery,
    ) -> Result<Vec<ComputerDto>, DirectoryServiceError> {
        let mut computers = self
            .directory
            .list_computers(&ComputerQuery {
                search: query.search,
                ou: query.ou,
            })
            .await?;
        computers.sort_by_cached_key(|c| sort_key(&c.name, &c.sam_account_name));
        Ok(computers.into_iter().map(computer_dto).collect())
    }

    async fn list_computers_paginated(
        &self,
        query: PaginationQuery,
    ) -> Result<ComputersPage, DirectoryServiceError> {
        let (page, page_size) = (query.page, query.page_size);
        paginate(Vec::<()>::new(), page, page_size)?;

        let computers = self
            .list_computers(ComputerListQuery {
                search: query.search,
                ou: query.ou,
            })
            .await?;
        let (computers, page) = paginate(computers, page, page_size)?;
        Ok(ComputersPage { computers, page })
    }

    async fn get_computer(
        &self,
        sam_account_name: &str,
    ) -> Result<ComputerDto, DirectoryServiceError> {
        Ok(computer_dto(self.require_computer(sam_account_name).await?))
    }

    async fn list_groups(&self) -> Result<Vec<GroupDto>, DirectoryServiceError> {
        let mut groups = self.directory.list_groups().await?;
        groups.sort_by_cached_key(|g| sort_key(&g.name, ""));
        Ok(groups.into_iter().map(group_dto).collect())
    }

    async fn get_group(&self, name: &str) -> Result<GroupDto, DirectoryServiceError> {
        Ok(group_dto(self.require_group(name).await?))
    }

    async fn list_group_members(
        &self,
        name: &str,
    ) -> Result<Vec<GroupMemberDto>, DirectoryServiceError> {
        let group = self.require_group(name).await?;
        let mut members = self.directory.list_group_members(&group).await?;
        members.sort_by_cached_key(|m| sort_key(&m.display_name, &m.sam_account_name));

        Ok(members
            .into_iter()
            .map(|m| GroupMemberDto {
                sam_account_name: m.sam_account_name,
                display_name: m.display_name,
                email: m.email,
                distinguished_name: m.distinguished_name.to_string(),
                object_type: m.object_type.as_str().to_string(),
            })
            .collect())
    }

    async fn list_ous(&self) -> Result<Vec<OrganizationalUnitDto>, DirectoryServiceError> {
        let mut containers = self.directory.list_containers().await?;
        containers
            .sort_by_cached_key(|c| sort_key(&c.name, &c.distinguished_name.to_string()));

        Ok(containers
            .into_iter()
            .map(|c| {
                let dn = c.distinguished_name.to_string();
                OrganizationalUnitDto {
                    name: c.name,
                    path: dn.clone(),
                    distinguished_name: dn,
                    description: c.description,
                }
            })
            .collect())
    }

    async fn reset_password(
        &self,
        operator: &Operator,
        sam_account_name: &str,
        request: ResetPasswordRequest,
    ) -> Result<MutationResponse, DirectoryServiceError> {
        let sam = sam_account_name.trim();
        let _guard = self
            .locks
            .acquire(&[LockKey::new(ObjectType::User, sam)])
            .await;

        let result = match validate_name(SAM_FIELD, sam) {
            Ok(_) => self.try_reset_password(sam, &request).await,
            Err(err) => Err(err),
        };
        let entry = AuditEntry::new(
            AuditAction::PasswordReset,
            operator.as_str(),
            sam,
            ObjectType::User,
        )
        .with_details(json!({ "must_change": request.must_change }));

        self.finish(entry, result).await
    }

    async fn set_user_status(
        &self,
        operator: &Operator,
        sam_account_name: &str,
        request: AccountStatusRequest,
    ) -> Result<MutationResponse, DirectoryServiceError> {
        self.set_status(operator, ObjectType::User, sam_account_name, request.enabled)
            .await
    }

    async fn set_computer_status(
        &self,
        operator: &Operator,
        sam_account_name: &str,
        request: AccountStatusRequest,
    ) -> Result<MutationResponse, DirectoryServiceError> {
        self.set_status(
            operator,
            ObjectType::Computer,
            sam_account_name,
            request.enabled,
        )
        .await
    }

    async fn add_user_to_group(
        &self,
        operator: &Operator,
        sam_account_name: &str,
        group_name: &str,
    ) -> Result<MutationResponse, DirectoryServiceError> {
        self.change_membership(operator, MemberSide::User, sam_account_name, group_name, true)
            .await
    }

    async fn remove_user_from_group(
        &self,
        operator: &Operator,
        sam_account_name: &str,
        group_name: &str,
    ) -> Result<MutationResponse, DirectoryServiceError> {
        self.change_membership(operator, MemberSide::User, sam_account_name, group_name, false)
            .await
    }

    async fn add_computer_to_group(
        &self,
        operator: &Operator,
        sam_account_name: &str,
        group_name: &str,
    ) -> Result<MutationResponse, DirectoryServiceError> {
        self.change_membership(
            operator,
            MemberSide::Computer,
            sam_account_name,
            group_name,
            true,
        )
        .await
    }

    async fn remove_computer_from_group(
        &self,
        operator: &Operator,
        sam_account_name: &str,
        group_name: &str,
    ) -> Result<MutationResponse, DirectoryServiceError> {
        self.change_membership(
            operator,
            MemberSide::Computer,
            sam_account_name,
            group_name,
            false,
        )
        .await
    }

    async fn add_group_member(
        &self,
        operator: &Operator,
        group_name: &str,
        member: &str,
    ) -> Result<MutationResponse, DirectoryServiceError> {
        self.change_membership(operator, MemberSide::Group, member, group_name, true)
            .await
    }

    async fn remove_group_member(
        &self,
        operator: &Operator,
        group_name: &str,
        member: &str,
    ) -> Result<MutationResponse, DirectoryServiceError> {
        self.change_membership(operator, MemberSide::Group, member, group_name, false)
            .await
    }

    async fn move_computer(
        &self,
        operator: &Operator,
        sam_account_name: &str,
        target_ou_dn: &str,
    ) -> Result<MutationResponse, DirectoryServiceError> {
        let sam = computer_sam(sam_account_name);
        let _guard = self
            .locks
            .acquire(&[LockKey::new(ObjectType::Computer, &sam)])
            .await;

        let result = match validate_name(SAM_FIELD, sam_account_name) {
            Ok(_) => self.try_move_computer(&sam, target_ou_dn).await,
            Err(err) => Err(err),
        };
        let entry = AuditEntry::new(
            AuditAction::ComputerMove,
            operator.as_str(),
            &sam,
            ObjectType::Computer,
        )
        .with_details(json!({ "target_ou": target_ou_dn.trim() }));

        self.finish(entry, result).await
    }

    async fn create_group(
        &self,
        operator: &Operator,
        request: CreateGroupRequest,
    ) -> Result<MutationResponse, DirectoryServiceError> {
        let name = request.name.trim().to_string();
        let _guard = self
            .locks
            .acquire(&[LockKey::new(ObjectType::Group, &name)])
            .await;

        let result = self.try_create_group(&request).await;
        let entry = AuditEntry::new(
            AuditAction::GroupCreate,
            operator.as_str(),
            &name,
            ObjectType::Group,
        )
        .with_details(json!({
            "description": request.description,
            "ou_path": request.ou_path,
        }));

        self.finish(entry, result).await
    }

    async fn delete_group(
        &self,
        operator: &Operator,
        name: &str,
    ) -> Result<MutationResponse, DirectoryServiceError> {
        let name = name.trim();
        let _guard = self
            .locks
            .acquire(&[LockKey::new(ObjectType::Group, name)])
            .await;

        let result = match validate_name(GROUP_FIELD, name) {
            Ok(_) => self.try_delete_group(name).await,
            Err(err) => Err(err),
        };
        let entry = AuditEntry::new(
            AuditAction::GroupDelete,
            operator.as_str(),
            name,
            ObjectType::Group,
        );

        self.finish(entry, result).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::AuditLogQuery;
    use crate::db::Store;
    use crate::directory::memory::MemoryDirectory;
    use crate::services::audit_service_impl::SeaOrmAuditService;

    async fn service() -> (AuditedDirectoryService, Arc<dyn AuditService>) {
        let config = DirectoryConfig {
            base_dn: "DC=example,DC=com".to_string(),
            ..DirectoryConfig::default()
        };
        let directory = Arc::new(MemoryDirectory::seeded(
            DistinguishedName::parse(&config.base_dn).unwrap(),
        ));
        let store = Store::new("sqlite::memory:").await.unwrap();
        let audit: Arc<dyn AuditService> = Arc::new(SeaOrmAuditService::new(store));
        (
            AuditedDirectoryService::new(directory, Arc::clone(&audit), &config),
            audit,
        )
    }

    fn operator() -> Operator {
        Operator("alice".to_string())
    }

    async fn audit_count(audit: &Arc<dyn AuditService>) -> u64 {
        audit.list(AuditLogQuery::default()).await.unwrap().total_count
    }

    #[tokio::test]
    async fn test_search_within_group() {
        let (service, _) = service().await;
        let users = service
            .list_users(UserListQuery {
                group: Some("Finance".to_string()),
                search: Some("smith".to_string()),
            })
            .await
            .unwrap();
        let names: Vec<&str> = users.iter().map(|u| u.sam_account_name.as_str()).collect();
        assert_eq!(names, vec!["jane.smith"]);
    }

    #[tokio::test]
    async fn test_disable_is_idempotent_and_audited() {
        let (service, audit) = service().await;
        let request = || AccountStatusRequest { enabled: false };

        let first = service
            .set_user_status(&operator(), "john.doe", request())
            .await
            .unwrap();
        let second = service
            .set_user_status(&operator(), "john.doe", request())
            .await
            .unwrap();
        assert_eq!(first.enabled, Some(false));
        assert_eq!(second.enabled, Some(false));

        let user = service.get_user("john.doe").await.unwrap();
        assert!(user.account_disabled);
        assert!(!user.account_enabled);

        let logs = audit.list(AuditLogQuery::default()).await.unwrap();
        assert_eq!(logs.total_count, 2);
        assert_eq!(logs.logs[0].action_type, "account_disable");
        assert_eq!(logs.logs[0].details["changed"], false);
        assert_eq!(logs.logs[1].details["changed"], true);
    }

    #[tokio::test]
    async fn test_failed_mutation_is_audited() {
        let (service, audit) = service().await;

        let err = service
            .reset_password(
                &operator(),
                "jane.smith",
                ResetPasswordRequest {
                    new_password: "short".to_string(),
                    must_change: true,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DirectoryServiceError::PolicyViolation(_)));

        let err = service
            .set_user_status(&operator(), "nobody", AccountStatusRequest { enabled: true })
            .await
            .unwrap_err();
        assert!(matches!(err, DirectoryServiceError::NotFound(_)));

        let logs = audit.list(AuditLogQuery::default()).await.unwrap();
        assert_eq!(logs.total_count, 2);
        assert!(logs.logs.iter().all(|l| !l.success));
        assert!(logs.logs.iter().all(|l| l.error_message.is_some()));
    }

    #[tokio::test]
    async fn test_invalid_names_are_audited() {
        let (service, audit) = service().await;

        let err = service
            .add_group_member(&operator(), "Finance", "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, DirectoryServiceError::Validation(_)));

        let err = service
            .delete_group(&operator(), &"x".repeat(300))
            .await
            .unwrap_err();
        assert!(matches!(err, DirectoryServiceError::Validation(_)));

        let err = service
            .set_user_status(&operator(), "", AccountStatusRequest { enabled: false })
            .await
            .unwrap_err();
        assert!(matches!(err, DirectoryServiceError::Validation(_)));

        let logs = audit.list(AuditLogQuery::default()).await.unwrap();
        assert_eq!(logs.total_count, 3);
        assert!(logs.logs.iter().all(|l| !l.success));
        assert!(logs.logs.iter().any(|l| l.action_type == "member_add"
            && l.target_object == "Finance"));
    }

    #[tokio::test]
    async fn test_membership_round_trip() {
        let (service, audit) = service().await;

        service
            .add_user_to_group(&operator(), "john.doe", "Finance")
            .await
            .unwrap();
        let user = service.get_user("john.doe").await.unwrap();
        assert!(user.groups.iter().any(|g| g == "Finance"));
        assert_eq!(service.get_group("Finance").await.unwrap().member_count, 2);

        // Adding again is a no-op, not an error.
        service
            .add_group_member(&operator(), "Finance", "john.doe")
            .await
            .unwrap();

        service
            .remove_user_from_group(&operator(), "john.doe", "finance")
            .await
            .unwrap();
        let user = service.get_user("john.doe").await.unwrap();
        assert!(!user.groups.iter().any(|g| g == "Finance"));

        assert_eq!(audit_count(&audit).await, 3);
    }

    #[tokio::test]
    async fn test_computer_membership_accepts_name_without_dollar() {
        let (service, _) = service().await;
        service
            .add_computer_to_group(&operator(), "PC-001", "IT Department")
            .await
            .unwrap();
        let computer = service.get_computer("pc-001").await.unwrap();
        assert!(computer.groups.iter().any(|g| g == "IT Department"));
    }

    #[tokio::test]
    async fn test_move_computer_round_trip() {
        let (service, audit) = service().await;
        let before = service.get_computer("PC-001$").await.unwrap();
        let original = before.container_dn.clone().unwrap();

        service
            .move_computer(&operator(), "PC-001", "OU=Servers,DC=example,DC=com")
            .await
            .unwrap();
        let moved = service.get_computer("PC-001$").await.unwrap();
        assert_eq!(
            moved.container_dn.as_deref(),
            Some("OU=Servers,DC=example,DC=com")
        );
        assert_eq!(moved.organizational_unit.as_deref(), Some("Servers"));

        service
            .move_computer(&operator(), "PC-001$", &original)
            .await
            .unwrap();
        let back = service.get_computer("PC-001$").await.unwrap();
        assert_eq!(back.distinguished_name, before.distinguished_name);

        let err = service
            .move_computer(&operator(), "PC-001$", "OU=Nowhere,DC=example,DC=com")
            .await
            .unwrap_err();
        assert!(matches!(err, DirectoryServiceError::NotFound(_)));

        assert_eq!(audit_count(&audit).await, 3);
    }

    #[tokio::test]
    async fn test_group_lifecycle() {
        let (service, _) = service().await;

        service
            .create_group(
                &operator(),
                CreateGroupRequest {
                    name: "Contractors".to_string(),
                    description: Some("External staff".to_string()),
                    ou_path: None,
                },
            )
            .await
            .unwrap();
        let group = service.get_group("Contractors").await.unwrap();
        assert_eq!(
            group.distinguished_name,
            "CN=Contractors,CN=Users,DC=example,DC=com"
        );

        let err = service
            .create_group(
                &operator(),
                CreateGroupRequest {
                    name: "contractors".to_string(),
                    description: None,
                    ou_path: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DirectoryServiceError::Conflict(_)));

        let err = service
            .delete_group(&operator(), "Finance")
            .await
            .unwrap_err();
        assert!(matches!(err, DirectoryServiceError::Conflict(_)));

        service
            .delete_group(&operator(), "Contractors")
            .await
            .unwrap();
        assert!(matches!(
            service.get_group("Contractors").await,
            Err(DirectoryServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_password_expiry_is_derived() {
        let (service, _) = service().await;
        let john = service.get_user("john.doe").await.unwrap();
        let set = john.password_last_set.unwrap();
        assert_eq!(john.password_expires, Some(set + Duration::days(90)));

        let temp = service.get_user("temp.user").await.unwrap();
        assert!(temp.password_expires.is_none());
    }

    #[test]
    fn test_paginate_bounds() {
        let items: Vec<u32> = (1..=7).collect();

        let (slice, info) = paginate(items.clone(), Some(2), Some(3)).unwrap();
        assert_eq!(slice, vec![4, 5, 6]);
        assert_eq!(info.total_pages, 3);
        assert!(info.has_next && info.has_prev);

        let (slice, info) = paginate(items.clone(), Some(3), Some(3)).unwrap();
        assert_eq!(slice, vec![7]);
        assert!(!info.has_next);

        let (slice, info) = paginate(items.clone(), Some(9), Some(3)).unwrap();
        assert!(slice.is_empty());
        assert_eq!(info.total_count, 7);

        assert!(paginate(items.clone(), Some(0), None).is_err());
        assert!(paginate(items.clone(), None, Some(0)).is_err());
        assert!(paginate(items, None, Some(101)).is_err());
    }

    #[test]
    fn test_paginate_slice_length_property() {
        for total in 0..25u64 {
            let items: Vec<u64> = (0..total).collect();
            for page_size in 1..=10u64 {
                for page in 1..=6u64 {
                    let (slice, info) =
                        paginate(items.clone(), Some(page), Some(page_size)).unwrap();
                    let before = (page - 1) * page_size;
                    let expected = page_size.min(total.saturating_sub(before));
                    assert_eq!(slice.len() as u64, expected);
                    assert_eq!(info.total_pages, total.div_ceil(page_size));
                }
            }
        }
    }

    #[test]
    fn test_directory_error_mapping() {
        let err: DirectoryServiceError = DirectoryError::Unreachable("timeout".into()).into();
        assert!(matches!(err, DirectoryServiceError::Unavailable(_)));

        let err: DirectoryServiceError =
            DirectoryError::PolicyViolation("too short".into()).into();
        assert!(matches!(err, DirectoryServiceError::PolicyViolation(_)));
    }
}
