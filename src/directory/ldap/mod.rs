//! Active Directory over LDAP.
//!
//! Each operation opens a fresh connection, binds, runs and unbinds. Searches
//! use the paged-results control so listings are not truncated at the
//! server's size limit.

pub mod convert;
pub mod filter;

use chrono::{DateTime, Utc};
use ldap3::adapters::{Adapter, EntriesOnly, PagedResults};
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapError, LdapResult, Mod, Scope, SearchEntry};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use super::{
    ComputerQuery, DirectoryBackend, DirectoryChange, DirectoryComputer, DirectoryContainer,
    DirectoryError, DirectoryGroup, DirectoryMember, DirectoryResult, DirectoryUser, NewGroup,
    UserQuery,
};
use crate::config::DirectoryConfig;
use crate::domain::{AccountStatus, DistinguishedName, ObjectTypeFilter};

const RC_NO_SUCH_ATTRIBUTE: u32 = 16;
const RC_CONSTRAINT_VIOLATION: u32 = 19;
const RC_ATTRIBUTE_OR_VALUE_EXISTS: u32 = 20;
const RC_NO_SUCH_OBJECT: u32 = 32;
const RC_INVALID_DN_SYNTAX: u32 = 34;
const RC_INVALID_CREDENTIALS: u32 = 49;
const RC_BUSY: u32 = 51;
const RC_UNAVAILABLE: u32 = 52;
const RC_UNWILLING_TO_PERFORM: u32 = 53;
const RC_NOT_ALLOWED_ON_NON_LEAF: u32 = 66;
const RC_ENTRY_ALREADY_EXISTS: u32 = 68;

const USER_ATTRS: &[&str] = &[
    "sAMAccountName",
    "displayName",
    "mail",
    "givenName",
    "sn",
    "title",
    "department",
    "memberOf",
    "userAccountControl",
    "pwdLastSet",
    "lastLogon",
    "lastLogonTimestamp",
    "whenCreated",
    "whenChanged",
    "userPrincipalName",
    "telephoneNumber",
    "mobile",
    "physicalDeliveryOfficeName",
    "company",
    "manager",
    "description",
];

const COMPUTER_ATTRS: &[&str] = &[
    "sAMAccountName",
    "name",
    "cn",
    "dNSHostName",
    "operatingSystem",
    "operatingSystemVersion",
    "operatingSystemServicePack",
    "description",
    "location",
    "managedBy",
    "memberOf",
    "userAccountControl",
    "lastLogon",
    "lastLogonTimestamp",
    "whenCreated",
    "whenChanged",
];

const GROUP_ATTRS: &[&str] = &[
    "cn",
    "sAMAccountName",
    "description",
    "member",
    "whenCreated",
    "whenChanged",
];

const CONTAINER_ATTRS: &[&str] = &["ou", "cn", "description"];

const MEMBER_ATTRS: &[&str] = &["sAMAccountName", "displayName", "name", "mail", "objectClass"];

const CHANGE_ATTRS: &[&str] = &[
    "sAMAccountName",
    "displayName",
    "name",
    "objectClass",
    "whenCreated",
    "whenChanged",
];

/// Connection parameters for one directory. The password is never printed.
#[derive(Clone)]
pub struct BindSettings {
    pub url: String,
    pub bind_name: String,
    pub password: String,
    pub base_dn: String,
    pub timeout: Duration,
    pub page_size: i32,
}

impl BindSettings {
    pub fn new(
        server: &str,
        domain: &str,
        username: &str,
        password: &str,
        base_dn: &str,
        timeout: Duration,
    ) -> Self {
        Self {
            url: server_url(server),
            bind_name: bind_name(username, domain),
            password: password.to_string(),
            base_dn: base_dn.trim().to_string(),
            timeout,
            page_size: 500,
        }
    }

    #[must_use]
    pub fn from_config(config: &DirectoryConfig) -> Self {
        let mut settings = Self::new(
            &config.server,
            &config.domain,
            &config.username,
            &config.password,
            &config.base_dn,
            Duration::from_secs(config.connect_timeout_seconds.max(1)),
        );
        settings.page_size = config.page_size;
        settings
    }
}

impl fmt::Debug for BindSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindSettings")
            .field("url", &self.url)
            .field("bind_name", &self.bind_name)
            .field("password", &"********")
            .field("base_dn", &self.base_dn)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// `host` becomes `ldap://host`; explicit URLs are kept.
fn server_url(server: &str) -> String {
    let server = server.trim();
    if server.contains("://") {
        server.to_string()
    } else {
        format!("ldap://{server}")
    }
}

/// Active Directory accepts `user@domain` for simple binds. Names already in
/// UPN, down-level or DN form are used as given.
fn bind_name(username: &str, domain: &str) -> String {
    let username = username.trim();
    let domain = domain.trim();
    if domain.is_empty() || username.contains(['@', '\\', '=']) {
        username.to_string()
    } else {
        format!("{username}@{domain}")
    }
}

impl From<LdapError> for DirectoryError {
    fn from(err: LdapError) -> Self {
        match err {
            LdapError::LdapResult { result } => Self::from(result),
            other => Self::Unreachable(other.to_string()),
        }
    }
}

impl From<LdapResult> for DirectoryError {
    fn from(result: LdapResult) -> Self {
        let message = if result.text.is_empty() {
            format!("result code {}", result.rc)
        } else {
            result.text.trim_end_matches('\0').trim().to_string()
        };

        match result.rc {
            RC_INVALID_CREDENTIALS => Self::AuthenticationFailed(message),
            RC_NO_SUCH_OBJECT => Self::not_found("Object", result.matched),
            RC_INVALID_DN_SYNTAX => Self::Invalid(message),
            RC_ENTRY_ALREADY_EXISTS | RC_ATTRIBUTE_OR_VALUE_EXISTS => Self::Conflict(message),
            RC_NOT_ALLOWED_ON_NON_LEAF => Self::Conflict(message),
            RC_BUSY | RC_UNAVAILABLE => Self::Unreachable(message),
            code => Self::Protocol { code, message },
        }
    }
}

pub struct LdapDirectory {
    settings: BindSettings,
}

impl LdapDirectory {
    #[must_use]
    pub const fn new(settings: BindSettings) -> Self {
        Self { settings }
    }

    /// Connects, binds and reads the base DN entry. Used to validate
    /// connection settings before they are saved.
    pub async fn verify_bind(settings: &BindSettings) -> DirectoryResult<()> {
        let directory = Self {
            settings: settings.clone(),
        };
        let mut ldap = directory.connect().await?;
        let result = directory.read_base(&mut ldap).await;
        release(ldap).await;
        result
    }

    async fn connect(&self) -> DirectoryResult<Ldap> {
        let conn_settings = LdapConnSettings::new().set_conn_timeout(self.settings.timeout);

        debug!(url = %self.settings.url, "Connecting to directory");
        let (conn, mut ldap) = LdapConnAsync::with_settings(conn_settings, &self.settings.url)
            .await
            .map_err(|e| DirectoryError::Unreachable(format!("{}: {e}", self.settings.url)))?;
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "Directory connection closed with error");
            }
        });

        ldap.with_timeout(self.settings.timeout)
            .simple_bind(&self.settings.bind_name, &self.settings.password)
            .await?
            .success()?;

        Ok(ldap)
    }

    async fn read_base(&self, ldap: &mut Ldap) -> DirectoryResult<()> {
        let (entries, _) = ldap
            .with_timeout(self.settings.timeout)
            .search(
                &self.settings.base_dn,
                Scope::Base,
                "(objectClass=*)",
                vec!["distinguishedName"],
            )
            .await?
            .success()?;

        if entries.is_empty() {
            return Err(DirectoryError::not_found(
                "Base DN",
                self.settings.base_dn.clone(),
            ));
        }
        Ok(())
    }

    /// Subtree search below the base DN with paging.
    async fn search(
        &self,
        ldap: &mut Ldap,
        filter: &str,
        attrs: &[&str],
    ) -> DirectoryResult<Vec<SearchEntry>> {
        let adapters: Vec<Box<dyn Adapter<_, _>>> = vec![
            Box::new(EntriesOnly::new()),
            Box::new(PagedResults::new(self.settings.page_size)),
        ];

        let mut stream = ldap
            .streaming_search_with(
                adapters,
                &self.settings.base_dn,
                Scope::Subtree,
                filter,
                attrs.to_vec(),
            )
            .await?;

        let mut entries = Vec::new();
        while let Some(entry) = stream.next().await? {
            entries.push(SearchEntry::construct(entry));
        }
        stream.finish().await.success()?;

        debug!(filter, count = entries.len(), "Directory search finished");
        Ok(entries)
    }

    /// Reads one entry by DN. A missing entry is `Ok(None)`.
    async fn read_entry(
        &self,
        ldap: &mut Ldap,
        dn: &DistinguishedName,
        filter: &str,
        attrs: &[&str],
    ) -> DirectoryResult<Option<SearchEntry>> {
        let response = ldap
            .with_timeout(self.settings.timeout)
            .search(&dn.to_string(), Scope::Base, filter, attrs.to_vec())
            .await?;

        match response.success() {
            Ok((entries, _)) => Ok(entries.into_iter().next().map(SearchEntry::construct)),
            Err(LdapError::LdapResult { result }) if result.rc == RC_NO_SUCH_OBJECT => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn search_users(&self, query: &UserQuery) -> DirectoryResult<Vec<DirectoryUser>> {
        let mut ldap = self.connect().await?;
        let result: DirectoryResult<Vec<DirectoryUser>> = async {
            let group_dn = match query.group.as_deref() {
                Some(name) => {
                    let groups = self
                        .search(&mut ldap, &filter::group_by_name(name), &["cn"])
                        .await?;
                    match groups.first() {
                        Some(entry) => Some(
                            DistinguishedName::parse(&entry.dn)
                                .map_err(|e| DirectoryError::Invalid(e.to_string()))?,
                        ),
                        None => return Ok(Vec::new()),
                    }
                }
                None => None,
            };

            let filter = filter::users(query.search.as_deref(), group_dn.as_ref());
            let entries = self.search(&mut ldap, &filter, USER_ATTRS).await?;
            Ok(entries
                .iter()
                .filter_map(convert::user_from_entry)
                .filter(|user| query.matches(user))
                .collect())
        }
        .await;
        release(ldap).await;
        result
    }

    async fn first_match<T>(
        &self,
        filter: &str,
        attrs: &[&str],
        convert: fn(&SearchEntry) -> Option<T>,
    ) -> DirectoryResult<Option<T>> {
        let mut ldap = self.connect().await?;
        let result = self.search(&mut ldap, filter, attrs).await;
        release(ldap).await;
        Ok(result?.iter().find_map(convert))
    }

    async fn search_all<T>(
        &self,
        filter: &str,
        attrs: &[&str],
        convert: fn(&SearchEntry) -> Option<T>,
    ) -> DirectoryResult<Vec<T>> {
        let mut ldap = self.connect().await?;
        let result = self.search(&mut ldap, filter, attrs).await;
        release(ldap).await;
        Ok(result?.iter().filter_map(convert).collect())
    }

    async fn modify(
        &self,
        dn: &DistinguishedName,
        mods: Vec<Mod<Vec<u8>>>,
    ) -> DirectoryResult<()> {
        let mut ldap = self.connect().await?;
        let result = ldap
            .with_timeout(self.settings.timeout)
            .modify(&dn.to_string(), mods)
            .await
            .map_err(DirectoryError::from)
            .and_then(|r| r.success().map_err(DirectoryError::from));
        release(ldap).await;
        result.map(|_| ())
    }
}

async fn release(mut ldap: Ldap) {
    if let Err(e) = ldap.unbind().await {
        debug!(error = %e, "Directory unbind failed");
    }
}

fn replace(attr: &str, value: impl Into<Vec<u8>>) -> Mod<Vec<u8>> {
    Mod::Replace(attr.as_bytes().to_vec(), HashSet::from([value.into()]))
}

#[async_trait::async_trait]
impl DirectoryBackend for LdapDirectory {
    async fn ping(&self) -> DirectoryResult<()> {
        Self::verify_bind(&self.settings).await
    }

    async fn list_users(&self, query: &UserQuery) -> DirectoryResult<Vec<DirectoryUser>> {
        self.search_users(query).await
    }

    async fn get_user(&self, sam_account_name: &str) -> DirectoryResult<Option<DirectoryUser>> {
        self.first_match(
            &filter::user_by_sam(sam_account_name),
            USER_ATTRS,
            convert::user_from_entry,
        )
        .await
    }

    async fn list_computers(
        &self,
        query: &ComputerQuery,
    ) -> DirectoryResult<Vec<DirectoryComputer>> {
        let computers = self
            .search_all(
                &filter::computers(query.search.as_deref()),
                COMPUTER_ATTRS,
                convert::computer_from_entry,
            )
            .await?;
        Ok(computers.into_iter().filter(|c| query.matches(c)).collect())
    }

    async fn get_computer(
        &self,
        sam_account_name: &str,
    ) -> DirectoryResult<Option<DirectoryComputer>> {
        self.first_match(
            &filter::computer_by_sam(sam_account_name),
            COMPUTER_ATTRS,
            convert::computer_from_entry,
        )
        .await
    }

    async fn list_groups(&self) -> DirectoryResult<Vec<DirectoryGroup>> {
        self.search_all(filter::GROUP, GROUP_ATTRS, convert::group_from_entry)
            .await
    }

    async fn get_group(&self, name: &str) -> DirectoryResult<Option<DirectoryGroup>> {
        self.first_match(
            &filter::group_by_name(name),
            GROUP_ATTRS,
            convert::group_from_entry,
        )
        .await
    }

    async fn list_group_members(
        &self,
        group: &DirectoryGroup,
    ) -> DirectoryResult<Vec<DirectoryMember>> {
        self.search_all(
            &filter::members_of(&group.distinguished_name),
            MEMBER_ATTRS,
            convert::member_from_entry,
        )
        .await
    }

    async fn list_containers(&self) -> DirectoryResult<Vec<DirectoryContainer>> {
        self.search_all(
            filter::CONTAINER,
            CONTAINER_ATTRS,
            convert::container_from_entry,
        )
        .await
    }

    async fn get_container(
        &self,
        dn: &DistinguishedName,
    ) -> DirectoryResult<Option<DirectoryContainer>> {
        let mut ldap = self.connect().await?;
        let result = self
            .read_entry(&mut ldap, dn, filter::CONTAINER, CONTAINER_ATTRS)
            .await;
        release(ldap).await;
        Ok(result?.as_ref().and_then(convert::container_from_entry))
    }

    async fn find_member(
        &self,
        sam_account_name: &str,
    ) -> DirectoryResult<Option<DirectoryMember>> {
        let members = self
            .search_all(
                &filter::member_by_sam(sam_account_name),
                MEMBER_ATTRS,
                convert::member_from_entry,
            )
            .await?;

        // An exact match wins over the `$`-suffixed computer form.
        Ok(members
            .iter()
            .find(|m| m.sam_account_name.eq_ignore_ascii_case(sam_account_name))
            .or_else(|| members.first())
            .cloned())
    }

    async fn set_password(
        &self,
        dn: &DistinguishedName,
        new_password: &str,
        must_change: bool,
    ) -> DirectoryResult<()> {
        // pwdLastSet accepts only 0 (expire now) or -1 (set to current time).
        let pwd_last_set = if must_change { "0" } else { "-1" };
        let mods = vec![
            replace("unicodePwd", convert::encode_password(new_password)),
            replace("pwdLastSet", pwd_last_set),
        ];

        self.modify(dn, mods).await.map_err(|err| match err {
            DirectoryError::Protocol { code, message }
                if code == RC_CONSTRAINT_VIOLATION || code == RC_UNWILLING_TO_PERFORM =>
            {
                DirectoryError::PolicyViolation(message)
            }
            other => other,
        })
    }

    async fn set_account_status(
        &self,
        dn: &DistinguishedName,
        status: AccountStatus,
    ) -> DirectoryResult<()> {
        let mut ldap = self.connect().await?;
        let current = self
            .read_entry(&mut ldap, dn, "(objectClass=*)", &["userAccountControl"])
            .await;
        release(ldap).await;

        let entry = current?.ok_or_else(|| DirectoryError::not_found("Account", dn.to_string()))?;
        let uac: u32 = entry
            .attrs
            .get("userAccountControl")
            .and_then(|v| v.first())
            .and_then(|v| v.parse::<i64>().ok())
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| {
                DirectoryError::Invalid(format!("'{dn}' has no userAccountControl attribute"))
            })?;

        let updated = status.apply_to_uac(uac);
        if updated == uac {
            return Ok(());
        }
        self.modify(dn, vec![replace("userAccountControl", updated.to_string())])
            .await
    }

    async fn add_member(
        &self,
        group: &DistinguishedName,
        member: &DistinguishedName,
    ) -> DirectoryResult<()> {
        let mods = vec![Mod::Add(
            b"member".to_vec(),
            HashSet::from([member.to_string().into_bytes()]),
        )];
        self.modify(group, mods).await
    }

    async fn remove_member(
        &self,
        group: &DistinguishedName,
        member: &DistinguishedName,
    ) -> DirectoryResult<()> {
        let mods = vec![Mod::Delete(
            b"member".to_vec(),
            HashSet::from([member.to_string().into_bytes()]),
        )];
        self.modify(group, mods).await.map_err(|err| match err {
            // AD answers a removal of a non-member with one of these.
            DirectoryError::Protocol { code, message }
                if code == RC_NO_SUCH_ATTRIBUTE || code == RC_UNWILLING_TO_PERFORM =>
            {
                DirectoryError::Conflict(message)
            }
            other => other,
        })
    }

    async fn move_object(
        &self,
        dn: &DistinguishedName,
        new_parent: &DistinguishedName,
    ) -> DirectoryResult<DistinguishedName> {
        let leaf = dn
            .leaf()
            .ok_or_else(|| DirectoryError::Invalid(format!("Cannot move '{dn}'")))?;
        let new_dn = dn
            .moved_to(new_parent)
            .ok_or_else(|| DirectoryError::Invalid(format!("Cannot move '{dn}'")))?;

        let mut ldap = self.connect().await?;
        let result = ldap
            .with_timeout(self.settings.timeout)
            .modifydn(
                &dn.to_string(),
                &leaf.to_string(),
                true,
                Some(&new_parent.to_string()),
            )
            .await
            .map_err(DirectoryError::from)
            .and_then(|r| r.success().map_err(DirectoryError::from));
        release(ldap).await;

        result.map(|_| new_dn)
    }

    async fn create_group(&self, group: &NewGroup) -> DirectoryResult<DistinguishedName> {
        let dn = group.container.child("CN", &group.name);

        let mut attrs: Vec<(&str, HashSet<&str>)> = vec![
            ("objectClass", HashSet::from(["top", "group"])),
            ("cn", HashSet::from([group.name.as_str()])),
            ("sAMAccountName", HashSet::from([group.name.as_str()])),
            // Global security group.
            ("groupType", HashSet::from(["-2147483646"])),
        ];
        if let Some(description) = group.description.as_deref().filter(|d| !d.is_empty()) {
            attrs.push(("description", HashSet::from([description])));
        }

        let mut ldap = self.connect().await?;
        let result = ldap
            .with_timeout(self.settings.timeout)
            .add(&dn.to_string(), attrs)
            .await
            .map_err(DirectoryError::from)
            .and_then(|r| r.success().map_err(DirectoryError::from));
        release(ldap).await;

        result.map(|_| dn)
    }

    async fn delete_object(&self, dn: &DistinguishedName) -> DirectoryResult<()> {
        let mut ldap = self.connect().await?;
        let result = ldap
            .with_timeout(self.settings.timeout)
            .delete(&dn.to_string())
            .await
            .map_err(DirectoryError::from)
            .and_then(|r| r.success().map_err(DirectoryError::from));
        release(ldap).await;
        result.map(|_| ())
    }

    async fn changes_since(
        &self,
        since: DateTime<Utc>,
        filter: ObjectTypeFilter,
    ) -> DirectoryResult<Vec<DirectoryChange>> {
        let mut ldap = self.connect().await?;
        let result = self
            .search(&mut ldap, &filter::changed_since(since, filter), CHANGE_ATTRS)
            .await;
        release(ldap).await;

        let changes = result?
            .iter()
            .filter_map(|entry| {
                let member = convert::member_from_entry(entry)?;
                let when_changed = entry
                    .attrs
                    .get("whenChanged")
                    .and_then(|v| v.first())
                    .and_then(|v| convert::parse_generalized_time(v))?;
                let when_created = entry
                    .attrs
                    .get("whenCreated")
                    .and_then(|v| v.first())
                    .and_then(|v| convert::parse_generalized_time(v))
                    .unwrap_or(when_changed);

                Some(DirectoryChange {
                    object_type: convert::object_type(entry),
                    sam_account_name: member.sam_account_name,
                    display_name: member.display_name,
                    distinguished_name: member.distinguished_name,
                    when_created,
                    when_changed,
                })
            })
            .collect();

        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_name() {
        assert_eq!(bind_name("admin", "example.com"), "admin@example.com");
        assert_eq!(bind_name("admin@corp.local", "example.com"), "admin@corp.local");
        assert_eq!(bind_name(r"EXAMPLE\admin", "example.com"), r"EXAMPLE\admin");
        assert_eq!(
            bind_name("CN=admin,CN=Users,DC=example,DC=com", "example.com"),
            "CN=admin,CN=Users,DC=example,DC=com"
        );
        assert_eq!(bind_name("admin", ""), "admin");
    }

    #[test]
    fn test_server_url() {
        assert_eq!(server_url("dc01.example.com"), "ldap://dc01.example.com");
        assert_eq!(server_url("ldaps://dc01:636"), "ldaps://dc01:636");
    }

    #[test]
    fn test_debug_masks_password() {
        let settings = BindSettings::new(
            "dc01",
            "example.com",
            "admin",
            "s3cret!",
            "DC=example,DC=com",
            Duration::from_secs(5),
        );
        let printed = format!("{settings:?}");
        assert!(!printed.contains("s3cret!"));
        assert!(printed.contains("********"));
    }

    #[test]
    fn test_result_code_mapping() {
        let result = |rc: u32| LdapResult {
            rc,
            matched: "CN=x".to_string(),
            text: "80090308: LdapErr".to_string(),
            refs: Vec::new(),
            ctrls: Vec::new(),
        };

        assert!(matches!(
            DirectoryError::from(result(49)),
            DirectoryError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            DirectoryError::from(result(32)),
            DirectoryError::NotFound { .. }
        ));
        assert!(matches!(
            DirectoryError::from(result(68)),
            DirectoryError::Conflict(_)
        ));
        assert!(matches!(
            DirectoryError::from(result(50)),
            DirectoryError::Protocol { code: 50, .. }
        ));
    }
}
