//! In-process directory used for mock mode and tests.
//!
//! Objects live behind a single lock and every mutation keeps both sides of
//! group membership (the group's member DNs and the member's group names) in
//! step, the way the directory's back-link attributes behave.

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use super::{
    ComputerQuery, DirectoryAttribute, DirectoryBackend, DirectoryChange, DirectoryComputer,
    DirectoryContainer, DirectoryError, DirectoryGroup, DirectoryMember, DirectoryResult,
    DirectoryUser, NewGroup, UserQuery, policy,
};
use crate::domain::{AccountStatus, DistinguishedName, ObjectType, ObjectTypeFilter};

#[derive(Debug, Default)]
struct MemoryState {
    users: Vec<DirectoryUser>,
    computers: Vec<DirectoryComputer>,
    groups: Vec<DirectoryGroup>,
    containers: Vec<DirectoryContainer>,
}

impl MemoryState {
    fn group_by_dn_mut(&mut self, dn: &DistinguishedName) -> Option<&mut DirectoryGroup> {
        self.groups.iter_mut().find(|g| &g.distinguished_name == dn)
    }

    fn member_groups_mut(&mut self, dn: &DistinguishedName) -> Option<&mut Vec<String>> {
        if let Some(user) = self.users.iter_mut().find(|u| &u.distinguished_name == dn) {
            user.when_changed = Some(Utc::now());
            return Some(&mut user.groups);
        }
        self.computers
            .iter_mut()
            .find(|c| &c.distinguished_name == dn)
            .map(|computer| {
                computer.when_changed = Some(Utc::now());
                &mut computer.groups
            })
    }

    fn container_exists(&self, dn: &DistinguishedName) -> bool {
        self.containers.iter().any(|c| &c.distinguished_name == dn)
    }
}

pub struct MemoryDirectory {
    base_dn: DistinguishedName,
    state: RwLock<MemoryState>,
}

impl MemoryDirectory {
    /// An empty directory rooted at `base_dn` holding only the well-known
    /// `Users` and `Computers` containers.
    #[must_use]
    pub fn empty(base_dn: DistinguishedName) -> Self {
        let containers = ["Users", "Computers"]
            .into_iter()
            .map(|name| DirectoryContainer {
                name: name.to_string(),
                distinguished_name: base_dn.child("CN", name),
                description: None,
            })
            .collect();

        Self {
            base_dn,
            state: RwLock::new(MemoryState {
                containers,
                ..MemoryState::default()
            }),
        }
    }

    /// A directory populated with sample users, computers, groups and OUs.
    /// Timestamps are relative to the current time so reports stay meaningful.
    #[must_use]
    pub fn seeded(base_dn: DistinguishedName) -> Self {
        let Self { base_dn, state } = Self::empty(base_dn);
        let state = fixtures(&base_dn, Utc::now(), state.into_inner());
        Self {
            base_dn,
            state: RwLock::new(state),
        }
    }

    #[must_use]
    pub const fn base_dn(&self) -> &DistinguishedName {
        &self.base_dn
    }

    /// Inserts a user and links it into the groups it names.
    pub async fn insert_user(&self, mut user: DirectoryUser) {
        sort_names(&mut user.groups);
        let mut state = self.state.write().await;
        link_groups(&mut state.groups, &user.distinguished_name, &user.groups);
        state.users.push(user);
    }

    pub async fn insert_computer(&self, mut computer: DirectoryComputer) {
        sort_names(&mut computer.groups);
        let mut state = self.state.write().await;
        link_groups(&mut state.groups, &computer.distinguished_name, &computer.groups);
        state.computers.push(computer);
    }

    pub async fn insert_group(&self, group: DirectoryGroup) {
        self.state.write().await.groups.push(group);
    }

    pub async fn insert_container(&self, container: DirectoryContainer) {
        self.state.write().await.containers.push(container);
    }
}

fn link_groups(groups: &mut [DirectoryGroup], member: &DistinguishedName, names: &[String]) {
    for group in groups
        .iter_mut()
        .filter(|g| names.iter().any(|n| n.eq_ignore_ascii_case(&g.name)))
    {
        if !group.has_member(member) {
            group.members.push(member.clone());
        }
    }
}

#[async_trait::async_trait]
impl DirectoryBackend for MemoryDirectory {
    async fn ping(&self) -> DirectoryResult<()> {
        Ok(())
    }

    async fn list_users(&self, query: &UserQuery) -> DirectoryResult<Vec<DirectoryUser>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .iter()
            .filter(|u| query.matches(u))
            .cloned()
            .collect())
    }

    async fn get_user(&self, sam_account_name: &str) -> DirectoryResult<Option<DirectoryUser>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .iter()
            .find(|u| u.sam_account_name.eq_ignore_ascii_case(sam_account_name))
            .cloned())
    }

    async fn list_computers(
        &self,
        query: &ComputerQuery,
    ) -> DirectoryResult<Vec<DirectoryComputer>> {
        let state = self.state.read().await;
        Ok(state
            .computers
            .iter()
            .filter(|c| query.matches(c))
            .cloned()
            .collect())
    }

    async fn get_computer(
        &self,
        sam_account_name: &str,
    ) -> DirectoryResult<Option<DirectoryComputer>> {
        let state = self.state.read().await;
        Ok(state
            .computers
            .iter()
            .find(|c| c.sam_account_name.eq_ignore_ascii_case(sam_account_name))
            .cloned())
    }

    async fn list_groups(&self) -> DirectoryResult<Vec<DirectoryGroup>> {
        Ok(self.state.read().await.groups.clone())
    }

    async fn get_group(&self, name: &str) -> DirectoryResult<Option<DirectoryGroup>> {
        let state = self.state.read().await;
        Ok(state
            .groups
            .iter()
            .find(|g| g.name.eq_ignore_ascii_case(name))
            .cloned())
    }

    async fn list_group_members(
        &self,
        group: &DirectoryGroup,
    ) -> DirectoryResult<Vec<DirectoryMember>> {
        let state = self.state.read().await;
        let users = state
            .users
            .iter()
            .filter(|u| group.has_member(&u.distinguished_name))
            .map(DirectoryMember::from);
        let computers = state
            .computers
            .iter()
            .filter(|c| group.has_member(&c.distinguished_name))
            .map(DirectoryMember::from);
        Ok(users.chain(computers).collect())
    }

    async fn list_containers(&self) -> DirectoryResult<Vec<DirectoryContainer>> {
        Ok(self.state.read().await.containers.clone())
    }

    async fn get_container(
        &self,
        dn: &DistinguishedName,
    ) -> DirectoryResult<Option<DirectoryContainer>> {
        let state = self.state.read().await;
        Ok(state
            .containers
            .iter()
            .find(|c| &c.distinguished_name == dn)
            .cloned())
    }

    async fn find_member(
        &self,
        sam_account_name: &str,
    ) -> DirectoryResult<Option<DirectoryMember>> {
        let state = self.state.read().await;
        if let Some(user) = state
            .users
            .iter()
            .find(|u| u.sam_account_name.eq_ignore_ascii_case(sam_account_name))
        {
            return Ok(Some(DirectoryMember::from(user)));
        }
        let computer_sam = crate::domain::computer_sam(sam_account_name);
        Ok(state
            .computers
            .iter()
            .find(|c| c.sam_account_name.eq_ignore_ascii_case(&computer_sam))
            .map(DirectoryMember::from))
    }

    async fn set_password(
        &self,
        dn: &DistinguishedName,
        new_password: &str,
        must_change: bool,
    ) -> DirectoryResult<()> {
        let mut state = self.state.write().await;
        let user = state
            .users
            .iter_mut()
            .find(|u| &u.distinguished_name == dn)
            .ok_or_else(|| DirectoryError::not_found("User", dn.to_string()))?;

        policy::check_password(new_password, &user.sam_account_name)
            .map_err(DirectoryError::PolicyViolation)?;

        let now = Utc::now();
        user.password_last_set = if must_change { None } else { Some(now) };
        user.when_changed = Some(now);
        Ok(())
    }

    async fn set_account_status(
        &self,
        dn: &DistinguishedName,
        status: AccountStatus,
    ) -> DirectoryResult<()> {
        let mut state = self.state.write().await;
        let now = Utc::now();

        if let Some(user) = state.users.iter_mut().find(|u| &u.distinguished_name == dn) {
            user.status = status;
            user.when_changed = Some(now);
            return Ok(());
        }
        if let Some(computer) = state
            .computers
            .iter_mut()
            .find(|c| &c.distinguished_name == dn)
        {
            computer.status = status;
            computer.when_changed = Some(now);
            return Ok(());
        }

        Err(DirectoryError::not_found("Account", dn.to_string()))
    }

    async fn add_member(
        &self,
        group: &DistinguishedName,
        member: &DistinguishedName,
    ) -> DirectoryResult<()> {
        let mut state = self.state.write().await;

        let group_entry = state
            .group_by_dn_mut(group)
            .ok_or_else(|| DirectoryError::not_found("Group", group.to_string()))?;
        if group_entry.has_member(member) {
            return Err(DirectoryError::Conflict(format!(
                "{} is already a member of {}",
                member.name(),
                group_entry.name
            )));
        }
        let group_name = group_entry.name.clone();

        let groups = state
            .member_groups_mut(member)
            .ok_or_else(|| DirectoryError::not_found("Member", member.to_string()))?;
        groups.push(group_name);
        sort_names(groups);

        if let Some(group_entry) = state.group_by_dn_mut(group) {
            group_entry.members.push(member.clone());
            group_entry.when_changed = Some(Utc::now());
        }
        Ok(())
    }

    async fn remove_member(
        &self,
        group: &DistinguishedName,
        member: &DistinguishedName,
    ) -> DirectoryResult<()> {
        let mut state = self.state.write().await;

        let group_entry = state
            .group_by_dn_mut(group)
            .ok_or_else(|| DirectoryError::not_found("Group", group.to_string()))?;
        let before = group_entry.members.len();
        group_entry.members.retain(|m| m != member);
        if group_entry.members.len() == before {
            return Err(DirectoryError::Conflict(format!(
                "{} is not a member of {}",
                member.name(),
                group_entry.name
            )));
        }
        group_entry.when_changed = Some(Utc::now());
        let group_name = group_entry.name.clone();

        if let Some(groups) = state.member_groups_mut(member) {
            groups.retain(|g| !g.eq_ignore_ascii_case(&group_name));
        }
        Ok(())
    }

    async fn move_object(
        &self,
        dn: &DistinguishedName,
        new_parent: &DistinguishedName,
    ) -> DirectoryResult<DistinguishedName> {
        let mut state = self.state.write().await;

        if !state.container_exists(new_parent) {
            return Err(DirectoryError::not_found(
                "Organizational unit",
                new_parent.to_string(),
            ));
        }
        let new_dn = dn
            .moved_to(new_parent)
            .ok_or_else(|| DirectoryError::Invalid(format!("Cannot move '{dn}'")))?;
        let now = Utc::now();

        if let Some(computer) = state
            .computers
            .iter_mut()
            .find(|c| &c.distinguished_name == dn)
        {
            computer.distinguished_name = new_dn.clone();
            computer.when_changed = Some(now);
        } else if let Some(user) = state.users.iter_mut().find(|u| &u.distinguished_name == dn) {
            user.distinguished_name = new_dn.clone();
            user.when_changed = Some(now);
        } else {
            return Err(DirectoryError::not_found("Object", dn.to_string()));
        }

        for group in &mut state.groups {
            for member in &mut group.members {
                if member == dn {
                    *member = new_dn.clone();
                }
            }
        }

        Ok(new_dn)
    }

    async fn create_group(&self, group: &NewGroup) -> DirectoryResult<DistinguishedName> {
        let mut state = self.state.write().await;

        if !state.container_exists(&group.container) {
            return Err(DirectoryError::not_found(
                "Organizational unit",
                group.container.to_string(),
            ));
        }
        if state
            .groups
            .iter()
            .any(|g| g.name.eq_ignore_ascii_case(&group.name))
        {
            return Err(DirectoryError::Conflict(format!(
                "Group '{}' already exists",
                group.name
            )));
        }

        let dn = group.container.child("CN", &group.name);
        let now = Utc::now();
        state.groups.push(DirectoryGroup {
            name: group.name.clone(),
            distinguished_name: dn.clone(),
            description: group.description.clone(),
            members: Vec::new(),
            when_created: Some(now),
            when_changed: Some(now),
        });
        Ok(dn)
    }

    async fn delete_object(&self, dn: &DistinguishedName) -> DirectoryResult<()> {
        let mut state = self.state.write().await;

        let index = state
            .groups
            .iter()
            .position(|g| &g.distinguished_name == dn)
            .ok_or_else(|| DirectoryError::not_found("Group", dn.to_string()))?;
        let removed = state.groups.remove(index);

        for member in &removed.members {
            if let Some(groups) = state.member_groups_mut(member) {
                groups.retain(|g| !g.eq_ignore_ascii_case(&removed.name));
            }
        }
        Ok(())
    }

    async fn changes_since(
        &self,
        since: DateTime<Utc>,
        filter: ObjectTypeFilter,
    ) -> DirectoryResult<Vec<DirectoryChange>> {
        let state = self.state.read().await;
        let mut changes = Vec::new();

        let in_window = |created: Option<DateTime<Utc>>, changed: Option<DateTime<Utc>>| {
            let changed = changed.or(created)?;
            (changed >= since).then(|| (created.unwrap_or(changed), changed))
        };

        if filter.includes(ObjectType::User) {
            for user in &state.users {
                if let Some((when_created, when_changed)) =
                    in_window(user.when_created, user.when_changed)
                {
                    changes.push(DirectoryChange {
                        object_type: ObjectType::User,
                        sam_account_name: user.sam_account_name.clone(),
                        display_name: user.display_name.clone(),
                        distinguished_name: user.distinguished_name.clone(),
                        when_created,
                        when_changed,
                    });
                }
            }
        }

        if filter.includes(ObjectType::Computer) {
            for computer in &state.computers {
                if let Some((when_created, when_changed)) =
                    in_window(computer.when_created, computer.when_changed)
                {
                    changes.push(DirectoryChange {
                        object_type: ObjectType::Computer,
                        sam_account_name: computer.sam_account_name.clone(),
                        display_name: computer.name.clone(),
                        distinguished_name: computer.distinguished_name.clone(),
                        when_created,
                        when_changed,
                    });
                }
            }
        }

        if filter.includes(ObjectType::Group) {
            for group in &state.groups {
                if let Some((when_created, when_changed)) =
                    in_window(group.when_created, group.when_changed)
                {
                    changes.push(DirectoryChange {
                        object_type: ObjectType::Group,
                        sam_account_name: group.name.clone(),
                        display_name: group.name.clone(),
                        distinguished_name: group.distinguished_name.clone(),
                        when_created,
                        when_changed,
                    });
                }
            }
        }

        Ok(changes)
    }
}

/// `memberOf` names are kept in case-insensitive order.
fn sort_names(names: &mut [String]) {
    names.sort_by_key(|n| n.to_lowercase());
}

struct UserSeed {
    sam: &'static str,
    first: &'static str,
    last: &'static str,
    department: Option<&'static str>,
    title: &'static str,
    groups: &'static [&'static str],
    enabled: bool,
    password_age_days: Option<i64>,
    last_logon_hours: Option<i64>,
    created_days: i64,
    changed_hours: i64,
}

struct ComputerSeed {
    name: &'static str,
    container: (&'static str, &'static str),
    os: Option<&'static str>,
    os_version: Option<&'static str>,
    description: Option<&'static str>,
    enabled: bool,
    last_logon_days: Option<i64>,
}

const USERS: &[UserSeed] = &[
    UserSeed {
        sam: "john.doe",
        first: "John",
        last: "Doe",
        department: Some("IT"),
        title: "System Administrator",
        groups: &["Domain Users", "IT Department"],
        enabled: true,
        password_age_days: Some(85),
        last_logon_hours: Some(20),
        created_days: 400,
        changed_hours: 2,
    },
    UserSeed {
        sam: "jane.smith",
        first: "Jane",
        last: "Smith",
        department: Some("HR"),
        title: "HR Specialist",
        groups: &["Domain Users", "HR Department", "Finance"],
        enabled: true,
        password_age_days: Some(60),
        last_logon_hours: Some(3),
        created_days: 300,
        changed_hours: 24 * 20,
    },
    UserSeed {
        sam: "admin.user",
        first: "Admin",
        last: "User",
        department: Some("IT"),
        title: "Domain Administrator",
        groups: &["Domain Users", "Domain Admins", "IT Department"],
        enabled: true,
        password_age_days: Some(88),
        last_logon_hours: Some(1),
        created_days: 900,
        changed_hours: 24 * 45,
    },
    UserSeed {
        sam: "bob.smith",
        first: "Bob",
        last: "Smith",
        department: Some("Finance"),
        title: "Accountant",
        groups: &["Domain Users"],
        enabled: false,
        password_age_days: Some(89),
        last_logon_hours: Some(24 * 70),
        created_days: 200,
        changed_hours: 24 * 60,
    },
    UserSeed {
        sam: "temp.user",
        first: "Temp",
        last: "User",
        department: None,
        title: "Contractor",
        groups: &["Domain Users"],
        enabled: true,
        password_age_days: None,
        last_logon_hours: None,
        created_days: 0,
        changed_hours: 0,
    },
];

const COMPUTERS: &[ComputerSeed] = &[
    ComputerSeed {
        name: "PC-001",
        container: ("OU", "Workstations"),
        os: Some("Windows 11 Enterprise"),
        os_version: Some("10.0 (22621)"),
        description: Some("IT Department Computer"),
        enabled: true,
        last_logon_days: Some(2),
    },
    ComputerSeed {
        name: "LAPTOP-002",
        container: ("OU", "Laptops"),
        os: Some("Windows 10 Pro"),
        os_version: Some("10.0 (19045)"),
        description: Some("HR Department Laptop"),
        enabled: true,
        last_logon_days: Some(45),
    },
    ComputerSeed {
        name: "SRV-001",
        container: ("OU", "Servers"),
        os: Some("Windows Server 2022 Standard"),
        os_version: Some("10.0 (20348)"),
        description: Some("File server"),
        enabled: true,
        last_logon_days: Some(0),
    },
    ComputerSeed {
        name: "PC-OLD",
        container: ("CN", "Computers"),
        os: Some(" Windows  10 Pro "),
        os_version: None,
        description: None,
        enabled: false,
        last_logon_days: None,
    },
];

const GROUPS: &[(&str, &str)] = &[
    ("Domain Users", "All domain users"),
    ("Domain Admins", "Designated administrators of the domain"),
    ("Domain Computers", "All workstations and servers joined to the domain"),
    ("IT Department", "IT staff"),
    ("HR Department", "Human resources staff"),
    ("Finance", "Finance and accounting"),
];

const OUS: &[(&str, &str)] = &[
    ("Workstations", "Desktop computers"),
    ("Laptops", "Portable computers"),
    ("Servers", "Member servers"),
];

fn fixtures(base: &DistinguishedName, now: DateTime<Utc>, mut state: MemoryState) -> MemoryState {
    let users_container = base.child("CN", "Users");
    let long_ago = now - Duration::days(1000);

    for (name, description) in OUS {
        state.containers.push(DirectoryContainer {
            name: (*name).to_string(),
            distinguished_name: base.child("OU", name),
            description: Some((*description).to_string()),
        });
    }

    for (name, description) in GROUPS {
        state.groups.push(DirectoryGroup {
            name: (*name).to_string(),
            distinguished_name: users_container.child("CN", name),
            description: Some((*description).to_string()),
            members: Vec::new(),
            when_created: Some(long_ago),
            when_changed: Some(long_ago),
        });
    }

    for seed in USERS {
        let display_name = format!("{} {}", seed.first, seed.last);
        let created = now - Duration::days(seed.created_days);
        let changed = if seed.changed_hours == 0 {
            created
        } else {
            now - Duration::hours(seed.changed_hours)
        };
        let mut groups: Vec<String> = seed.groups.iter().map(ToString::to_string).collect();
        sort_names(&mut groups);
        let dn = users_container.child("CN", &display_name);
        link_groups(&mut state.groups, &dn, &groups);

        state.users.push(DirectoryUser {
            sam_account_name: seed.sam.to_string(),
            email: Some(format!("{}@example.com", seed.sam)),
            first_name: Some(seed.first.to_string()),
            last_name: Some(seed.last.to_string()),
            title: Some(seed.title.to_string()),
            department: seed.department.map(str::to_string),
            distinguished_name: dn,
            groups,
            status: AccountStatus::from_enabled(seed.enabled),
            password_last_set: seed.password_age_days.map(|d| now - Duration::days(d)),
            last_logon: seed.last_logon_hours.map(|h| now - Duration::hours(h)),
            when_created: Some(created),
            when_changed: Some(changed),
            attributes: vec![DirectoryAttribute {
                name: "userPrincipalName".to_string(),
                value: format!("{}@example.com", seed.sam),
            }],
            display_name,
        });
    }

    for seed in COMPUTERS {
        let (attr, container) = seed.container;
        let dn = base.child(attr, container).child("CN", seed.name);
        let groups = vec!["Domain Computers".to_string()];
        link_groups(&mut state.groups, &dn, &groups);

        state.computers.push(DirectoryComputer {
            sam_account_name: format!("{}$", seed.name),
            name: seed.name.to_string(),
            dns_host_name: Some(format!("{}.example.com", seed.name.to_lowercase())),
            operating_system: seed.os.map(str::to_string),
            operating_system_version: seed.os_version.map(str::to_string),
            operating_system_service_pack: None,
            description: seed.description.map(str::to_string),
            location: None,
            managed_by: None,
            distinguished_name: dn,
            groups,
            status: AccountStatus::from_enabled(seed.enabled),
            last_logon: seed.last_logon_days.map(|d| now - Duration::days(d)),
            when_created: Some(long_ago),
            when_changed: Some(now - Duration::days(30)),
        });
    }

    state
}
