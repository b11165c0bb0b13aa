//! Conversions between Active Directory attribute encodings and Rust types.

use chrono::{DateTime, NaiveDateTime, Utc};
use ldap3::SearchEntry;

use crate::directory::{
    DirectoryAttribute, DirectoryComputer, DirectoryContainer, DirectoryGroup, DirectoryMember,
    DirectoryUser,
};
use crate::domain::{AccountStatus, DistinguishedName, ObjectType};

/// 100ns intervals between 1601-01-01 and 1970-01-01.
const FILETIME_UNIX_EPOCH: i64 = 116_444_736_000_000_000;
const FILETIME_TICKS_PER_SECOND: i64 = 10_000_000;

/// Converts an AD `FILETIME` integer (`pwdLastSet`, `lastLogon`, ...).
///
/// `0` means "never" and `i64::MAX` means "not set"; both map to `None`.
#[must_use]
pub fn filetime_to_datetime(ticks: i64) -> Option<DateTime<Utc>> {
    if ticks <= 0 || ticks == i64::MAX {
        return None;
    }
    let unix_ticks = ticks - FILETIME_UNIX_EPOCH;
    let secs = unix_ticks.div_euclid(FILETIME_TICKS_PER_SECOND);
    let nanos = u32::try_from(unix_ticks.rem_euclid(FILETIME_TICKS_PER_SECOND) * 100).ok()?;
    DateTime::from_timestamp(secs, nanos)
}

/// Parses LDAP generalized time such as `20240115103000.0Z`.
#[must_use]
pub fn parse_generalized_time(value: &str) -> Option<DateTime<Utc>> {
    let digits = value.get(..14)?;
    NaiveDateTime::parse_from_str(digits, "%Y%m%d%H%M%S")
        .ok()
        .map(|naive| naive.and_utc())
}

#[must_use]
pub fn format_generalized_time(value: DateTime<Utc>) -> String {
    value.format("%Y%m%d%H%M%S.0Z").to_string()
}

/// Encodes a password for `unicodePwd`: the quoted string as UTF-16LE.
#[must_use]
pub fn encode_password(password: &str) -> Vec<u8> {
    format!("\"{password}\"")
        .encode_utf16()
        .flat_map(u16::to_le_bytes)
        .collect()
}

fn first<'a>(entry: &'a SearchEntry, attr: &str) -> Option<&'a str> {
    entry
        .attrs
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(attr))
        .and_then(|(_, v)| v.first())
        .map(String::as_str)
        .filter(|v| !v.is_empty())
}

fn text(entry: &SearchEntry, attr: &str) -> Option<String> {
    first(entry, attr).map(str::to_string)
}

fn values<'a>(entry: &'a SearchEntry, attr: &str) -> impl Iterator<Item = &'a String> {
    let prefix = format!("{};", attr.to_ascii_lowercase());
    entry
        .attrs
        .iter()
        .filter(move |(k, _)| {
            let key = k.to_ascii_lowercase();
            key == attr.to_ascii_lowercase() || key.starts_with(&prefix)
        })
        .flat_map(|(_, v)| v.iter())
}

fn filetime(entry: &SearchEntry, attr: &str) -> Option<DateTime<Utc>> {
    first(entry, attr)
        .and_then(|v| v.parse::<i64>().ok())
        .and_then(filetime_to_datetime)
}

fn generalized(entry: &SearchEntry, attr: &str) -> Option<DateTime<Utc>> {
    first(entry, attr).and_then(parse_generalized_time)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn uac(entry: &SearchEntry) -> u32 {
    first(entry, "userAccountControl")
        .and_then(|v| v.parse::<i64>().ok())
        // The attribute is a signed 32-bit integer on the wire.
        .map_or(0, |v| v as u32)
}

fn dn(entry: &SearchEntry) -> Option<DistinguishedName> {
    DistinguishedName::parse(&entry.dn).ok()
}

/// Names (leaf RDN values) of the groups listed in `memberOf`.
fn group_names(entry: &SearchEntry) -> Vec<String> {
    let mut names: Vec<String> = values(entry, "memberOf")
        .filter_map(|v| DistinguishedName::parse(v).ok())
        .map(|dn| dn.name().to_string())
        .collect();
    names.sort_by_key(|n| n.to_lowercase());
    names
}

/// Most recent of the replicated and per-DC logon timestamps.
fn last_logon(entry: &SearchEntry) -> Option<DateTime<Utc>> {
    filetime(entry, "lastLogon").max(filetime(entry, "lastLogonTimestamp"))
}

const DETAIL_ATTRIBUTES: &[&str] = &[
    "userPrincipalName",
    "telephoneNumber",
    "mobile",
    "physicalDeliveryOfficeName",
    "company",
    "manager",
    "description",
];

pub fn user_from_entry(entry: &SearchEntry) -> Option<DirectoryUser> {
    let sam_account_name = text(entry, "sAMAccountName")?;
    let distinguished_name = dn(entry)?;

    let attributes = DETAIL_ATTRIBUTES
        .iter()
        .filter_map(|name| {
            text(entry, name).map(|value| DirectoryAttribute {
                name: (*name).to_string(),
                value,
            })
        })
        .collect();

    Some(DirectoryUser {
        display_name: text(entry, "displayName").unwrap_or_else(|| sam_account_name.clone()),
        email: text(entry, "mail"),
        first_name: text(entry, "givenName"),
        last_name: text(entry, "sn"),
        title: text(entry, "title"),
        department: text(entry, "department"),
        groups: group_names(entry),
        status: AccountStatus::from_uac(uac(entry)),
        password_last_set: filetime(entry, "pwdLastSet"),
        last_logon: last_logon(entry),
        when_created: generalized(entry, "whenCreated"),
        when_changed: generalized(entry, "whenChanged"),
        attributes,
        distinguished_name,
        sam_account_name,
    })
}

pub fn computer_from_entry(entry: &SearchEntry) -> Option<DirectoryComputer> {
    let sam_account_name = text(entry, "sAMAccountName")?;
    let distinguished_name = dn(entry)?;

    Some(DirectoryComputer {
        name: text(entry, "name")
            .or_else(|| text(entry, "cn"))
            .unwrap_or_else(|| sam_account_name.trim_end_matches('$').to_string()),
        dns_host_name: text(entry, "dNSHostName"),
        operating_system: text(entry, "operatingSystem"),
        operating_system_version: text(entry, "operatingSystemVersion"),
        operating_system_service_pack: text(entry, "operatingSystemServicePack"),
        description: text(entry, "description"),
        location: text(entry, "location"),
        managed_by: text(entry, "managedBy"),
        groups: group_names(entry),
        status: AccountStatus::from_uac(uac(entry)),
        last_logon: last_logon(entry),
        when_created: generalized(entry, "whenCreated"),
        when_changed: generalized(entry, "whenChanged"),
        distinguished_name,
        sam_account_name,
    })
}

pub fn group_from_entry(entry: &SearchEntry) -> Option<DirectoryGroup> {
    let distinguished_name = dn(entry)?;
    let name = text(entry, "cn")
        .or_else(|| text(entry, "sAMAccountName"))
        .unwrap_or_else(|| distinguished_name.name().to_string());

    Some(DirectoryGroup {
        name,
        description: text(entry, "description"),
        members: values(entry, "member")
            .filter_map(|v| DistinguishedName::parse(v).ok())
            .collect(),
        when_created: generalized(entry, "whenCreated"),
        when_changed: generalized(entry, "whenChanged"),
        distinguished_name,
    })
}

pub fn container_from_entry(entry: &SearchEntry) -> Option<DirectoryContainer> {
    let distinguished_name = dn(entry)?;
    Some(DirectoryContainer {
        name: text(entry, "ou")
            .or_else(|| text(entry, "cn"))
            .unwrap_or_else(|| distinguished_name.name().to_string()),
        description: text(entry, "description"),
        distinguished_name,
    })
}

/// Classifies an entry by `objectClass`. Computers also carry `user`, so
/// they are checked first.
pub fn object_type(entry: &SearchEntry) -> ObjectType {
    let has = |class: &str| values(entry, "objectClass").any(|v| v.eq_ignore_ascii_case(class));
    if has("computer") {
        ObjectType::Computer
    } else if has("group") {
        ObjectType::Group
    } else {
        ObjectType::User
    }
}

pub fn member_from_entry(entry: &SearchEntry) -> Option<DirectoryMember> {
    let sam_account_name = text(entry, "sAMAccountName")?;
    let object_type = object_type(entry);
    let display_name = text(entry, "displayName")
        .or_else(|| text(entry, "name"))
        .unwrap_or_else(|| sam_account_name.clone());

    Some(DirectoryMember {
        display_name,
        email: text(entry, "mail"),
        distinguished_name: dn(entry)?,
        object_type,
        sam_account_name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike};
    use std::collections::HashMap;

    fn entry(dn: &str, attrs: &[(&str, &[&str])]) -> SearchEntry {
        SearchEntry {
            dn: dn.to_string(),
            attrs: attrs
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.iter().map(ToString::to_string).collect()))
                .collect::<HashMap<_, _>>(),
            bin_attrs: HashMap::new(),
        }
    }

    #[test]
    fn test_filetime_conversion() {
        // 2024-01-15T10:30:00Z
        let dt = filetime_to_datetime(133_497_882_000_000_000).unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap());
        assert_eq!(filetime_to_datetime(0), None);
        assert_eq!(filetime_to_datetime(i64::MAX), None);
    }

    #[test]
    fn test_generalized_time_round_trip_format() {
        let dt = parse_generalized_time("20240115103000.0Z").unwrap();
        assert_eq!(dt.year(), 2024);
        assert_eq!(dt.hour(), 10);
        assert_eq!(format_generalized_time(dt), "20240115103000.0Z");
        assert!(parse_generalized_time("2024").is_none());
    }

    #[test]
    fn test_encode_password() {
        assert_eq!(encode_password("ab"), vec![b'"', 0, b'a', 0, b'b', 0, b'"', 0]);
    }

    #[test]
    fn test_user_from_entry() {
        let e = entry(
            "CN=John Doe,OU=Staff,DC=example,DC=com",
            &[
                ("sAMAccountName", &["john.doe"]),
                ("displayName", &["John Doe"]),
                ("userAccountControl", &["514"]),
                ("pwdLastSet", &["0"]),
                ("lastLogon", &["133497882000000000"]),
                ("lastLogonTimestamp", &["133497000000000000"]),
                (
                    "memberOf",
                    &[
                        "CN=IT Department,CN=Users,DC=example,DC=com",
                        "CN=Domain Admins,CN=Users,DC=example,DC=com",
                    ],
                ),
                ("whenCreated", &["20230101000000.0Z"]),
            ],
        );

        let user = user_from_entry(&e).unwrap();
        assert_eq!(user.status, AccountStatus::Disabled);
        assert_eq!(user.password_last_set, None);
        assert_eq!(user.groups, vec!["Domain Admins", "IT Department"]);
        assert_eq!(user.last_logon, filetime_to_datetime(133_497_882_000_000_000));
        assert_eq!(user.distinguished_name.ou_path().as_deref(), Some("Staff"));
    }

    #[test]
    fn test_group_members_with_range() {
        let e = entry(
            "CN=Big,CN=Users,DC=example,DC=com",
            &[
                ("cn", &["Big"]),
                ("member;range=0-1499", &["CN=A,DC=example,DC=com", "CN=B,DC=example,DC=com"]),
            ],
        );
        let group = group_from_entry(&e).unwrap();
        assert_eq!(group.members.len(), 2);
    }

    #[test]
    fn test_object_type_prefers_computer() {
        let e = entry(
            "CN=PC-001,CN=Computers,DC=example,DC=com",
            &[("objectClass", &["top", "person", "user", "computer"])],
        );
        assert_eq!(object_type(&e), ObjectType::Computer);
    }
}
