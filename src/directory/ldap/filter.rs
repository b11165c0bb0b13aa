//! LDAP search filter construction. Every user-supplied value goes through
//! [`ldap_escape`].

use chrono::{DateTime, Utc};
use ldap3::ldap_escape;

use super::convert::format_generalized_time;
use crate::domain::{DistinguishedName, ObjectType, ObjectTypeFilter};

pub const PERSON: &str = "(&(objectCategory=person)(objectClass=user))";
pub const COMPUTER: &str = "(objectClass=computer)";
pub const GROUP: &str = "(objectClass=group)";
pub const CONTAINER: &str = "(|(objectClass=organizationalUnit)(&(objectClass=container)(|(cn=Users)(cn=Computers))))";

fn substring_any(attrs: &[&str], needle: &str) -> String {
    let escaped = ldap_escape(needle.trim());
    let parts: String = attrs
        .iter()
        .map(|attr| format!("({attr}=*{escaped}*)"))
        .collect();
    format!("(|{parts})")
}

fn search_term(search: Option<&str>) -> Option<&str> {
    search.map(str::trim).filter(|s| !s.is_empty())
}

/// Users matching an optional substring search and group DN.
pub fn users(search: Option<&str>, group: Option<&DistinguishedName>) -> String {
    let mut filter = String::from("(&");
    filter.push_str(PERSON);
    if let Some(term) = search_term(search) {
        filter.push_str(&substring_any(&["displayName", "sAMAccountName", "mail"], term));
    }
    if let Some(group) = group {
        filter.push_str(&format!("(memberOf={})", ldap_escape(group.to_string())));
    }
    filter.push(')');
    filter
}

pub fn user_by_sam(sam: &str) -> String {
    format!("(&{PERSON}(sAMAccountName={}))", ldap_escape(sam))
}

pub fn computers(search: Option<&str>) -> String {
    match search_term(search) {
        Some(term) => format!(
            "(&{COMPUTER}{})",
            substring_any(&["name", "sAMAccountName", "dNSHostName"], term)
        ),
        None => COMPUTER.to_string(),
    }
}

pub fn computer_by_sam(sam: &str) -> String {
    format!("(&{COMPUTER}(sAMAccountName={}))", ldap_escape(sam))
}

pub fn group_by_name(name: &str) -> String {
    let escaped = ldap_escape(name);
    format!("(&{GROUP}(|(cn={escaped})(sAMAccountName={escaped})))")
}

/// Users and computers whose account name is `sam` or `sam$`.
pub fn member_by_sam(sam: &str) -> String {
    let escaped = ldap_escape(sam.trim_end_matches('$'));
    format!("(&(|{PERSON}{COMPUTER})(|(sAMAccountName={escaped})(sAMAccountName={escaped}$)))")
}

/// Users and computers that are direct members of `group`.
pub fn members_of(group: &DistinguishedName) -> String {
    format!(
        "(&(|{PERSON}{COMPUTER})(memberOf={}))",
        ldap_escape(group.to_string())
    )
}

/// Objects of the selected kinds changed at or after `since`.
pub fn changed_since(since: DateTime<Utc>, filter: ObjectTypeFilter) -> String {
    let classes: String = [ObjectType::User, ObjectType::Computer, ObjectType::Group]
        .into_iter()
        .filter(|t| filter.includes(*t))
        .map(|t| match t {
            // Computers are also `objectClass=user` but never `objectCategory=person`.
            ObjectType::User => PERSON,
            ObjectType::Computer => COMPUTER,
            ObjectType::Group => GROUP,
        })
        .collect();

    format!(
        "(&(|{classes})(whenChanged>={}))",
        format_generalized_time(since)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_users_filter_escapes_input() {
        let group = DistinguishedName::parse("CN=Finance (EU),CN=Users,DC=example,DC=com").unwrap();
        let filter = users(Some("smith*"), Some(&group));
        assert!(filter.contains(r"(displayName=*smith\2a*)"));
        assert!(filter.contains(r"(memberOf=CN=Finance \28EU\29,CN=Users,DC=example,DC=com)"));
        assert!(filter.starts_with("(&(&(objectCategory=person)"));
    }

    #[test]
    fn test_users_filter_without_terms() {
        assert_eq!(users(Some("  "), None), format!("(&{PERSON})"));
    }

    #[test]
    fn test_member_by_sam_handles_dollar() {
        let filter = member_by_sam("PC-001$");
        assert!(filter.contains("(sAMAccountName=PC-001)"));
        assert!(filter.contains("(sAMAccountName=PC-001$)"));
    }

    #[test]
    fn test_changed_since() {
        let since = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        let filter = changed_since(since, ObjectTypeFilter::Group);
        assert_eq!(
            filter,
            "(&(|(objectClass=group))(whenChanged>=20240115103000.0Z))"
        );
    }
}
