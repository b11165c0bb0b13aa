//! Structured distinguished names.
//!
//! Directory objects are addressed by DN. Parent containers, OU paths and
//! moves are all derived from the parsed RDN sequence, never from splitting
//! the raw string on commas, so escaped separators such as
//! `CN=Smith\, John` are handled correctly.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DnParseError {
    #[error("distinguished name is empty")]
    Empty,

    #[error("missing '=' in RDN '{0}'")]
    MissingEquals(String),

    #[error("empty attribute type in '{0}'")]
    EmptyAttribute(String),

    #[error("dangling escape at end of distinguished name")]
    DanglingEscape,

    #[error("invalid escaped byte sequence in distinguished name")]
    InvalidEscape,
}

/// One `type=value` component of a DN. Comparison ignores case, as the
/// directory does.
#[derive(Debug, Clone)]
pub struct Rdn {
    attr: String,
    value: String,
}

impl Rdn {
    #[must_use]
    pub fn new(attr: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attr: attr.into(),
            value: value.into(),
        }
    }

    #[must_use]
    pub fn attr(&self) -> &str {
        &self.attr
    }

    /// Unescaped value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    #[must_use]
    pub fn is(&self, attr: &str) -> bool {
        self.attr.eq_ignore_ascii_case(attr)
    }
}

impl PartialEq for Rdn {
    fn eq(&self, other: &Self) -> bool {
        self.attr.eq_ignore_ascii_case(&other.attr)
            && self.value.to_lowercase() == other.value.to_lowercase()
    }
}

impl Eq for Rdn {}

impl Hash for Rdn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.attr.to_ascii_lowercase().hash(state);
        self.value.to_lowercase().hash(state);
    }
}

impl fmt::Display for Rdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.attr, escape_value(&self.value))
    }
}

/// A parsed distinguished name, leaf RDN first.
///
/// # Examples
///
/// ```rust
/// use adpulse::domain::DistinguishedName;
///
/// let dn: DistinguishedName = "CN=PC-001,OU=Laptops,OU=IT,DC=example,DC=com".parse().unwrap();
/// assert_eq!(dn.name(), "PC-001");
/// assert_eq!(dn.ou_path().as_deref(), Some("IT/Laptops"));
/// assert_eq!(
///     dn.parent().unwrap().to_string(),
///     "OU=Laptops,OU=IT,DC=example,DC=com"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DistinguishedName {
    rdns: Vec<Rdn>,
}

impl DistinguishedName {
    pub fn parse(input: &str) -> Result<Self, DnParseError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(DnParseError::Empty);
        }

        let mut rdns = Vec::new();
        let mut chars = input.chars().peekable();

        loop {
            let mut attr = String::new();
            let mut found_equals = false;
            for c in chars.by_ref() {
                match c {
                    '=' => {
                        found_equals = true;
                        break;
                    }
                    ',' | ';' => break,
                    _ => attr.push(c),
                }
            }
            if !found_equals {
                return Err(DnParseError::MissingEquals(attr.trim().to_string()));
            }
            let attr = attr.trim().to_string();
            if attr.is_empty() {
                return Err(DnParseError::EmptyAttribute(input.to_string()));
            }

            while chars.peek() == Some(&' ') {
                chars.next();
            }

            let mut bytes: Vec<u8> = Vec::new();
            let mut trailing_spaces = 0usize;
            let mut more = false;

            while let Some(c) = chars.next() {
                match c {
                    ',' | ';' => {
                        more = true;
                        break;
                    }
                    '\\' => {
                        let next = chars.next().ok_or(DnParseError::DanglingEscape)?;
                        if next.is_ascii_hexdigit() {
                            let low = chars
                                .next()
                                .filter(char::is_ascii_hexdigit)
                                .ok_or(DnParseError::InvalidEscape)?;
                            let hex = [next as u8, low as u8];
                            let text =
                                std::str::from_utf8(&hex).map_err(|_| DnParseError::InvalidEscape)?;
                            let byte = u8::from_str_radix(text, 16)
                                .map_err(|_| DnParseError::InvalidEscape)?;
                            bytes.push(byte);
                        } else {
                            let mut buf = [0u8; 4];
                            bytes.extend_from_slice(next.encode_utf8(&mut buf).as_bytes());
                        }
                        trailing_spaces = 0;
                    }
                    ' ' => {
                        bytes.push(b' ');
                        trailing_spaces += 1;
                    }
                    other => {
                        let mut buf = [0u8; 4];
                        bytes.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
                        trailing_spaces = 0;
                    }
                }
            }

            bytes.truncate(bytes.len() - trailing_spaces);
            let value = String::from_utf8(bytes).map_err(|_| DnParseError::InvalidEscape)?;
            rdns.push(Rdn::new(attr, value));

            if !more {
                break;
            }
        }

        Ok(Self { rdns })
    }

    #[must_use]
    pub fn from_rdns(rdns: Vec<Rdn>) -> Self {
        Self { rdns }
    }

    #[must_use]
    pub fn rdns(&self) -> &[Rdn] {
        &self.rdns
    }

    #[must_use]
    pub fn leaf(&self) -> Option<&Rdn> {
        self.rdns.first()
    }

    /// Value of the leaf RDN, e.g. the `CN` of a user.
    #[must_use]
    pub fn name(&self) -> &str {
        self.leaf().map_or("", Rdn::value)
    }

    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.rdns.len() < 2 {
            return None;
        }
        Some(Self {
            rdns: self.rdns[1..].to_vec(),
        })
    }

    /// DN of a direct child of `self`.
    #[must_use]
    pub fn child(&self, attr: &str, value: &str) -> Self {
        let mut rdns = Vec::with_capacity(self.rdns.len() + 1);
        rdns.push(Rdn::new(attr, value));
        rdns.extend(self.rdns.iter().cloned());
        Self { rdns }
    }

    /// The same leaf re-parented under `parent`.
    #[must_use]
    pub fn moved_to(&self, parent: &Self) -> Option<Self> {
        let leaf = self.leaf()?;
        Some(parent.child(leaf.attr(), leaf.value()))
    }

    /// OU names from outermost to innermost joined with `/`, or `None` when
    /// the object does not sit below any OU.
    #[must_use]
    pub fn ou_path(&self) -> Option<String> {
        let ous: Vec<&str> = self
            .rdns
            .iter()
            .rev()
            .filter(|rdn| rdn.is("OU"))
            .map(Rdn::value)
            .collect();

        if ous.is_empty() {
            None
        } else {
            Some(ous.join("/"))
        }
    }

    /// True when `self` equals `ancestor` or lies below it.
    #[must_use]
    pub fn is_within(&self, ancestor: &Self) -> bool {
        self.rdns.len() >= ancestor.rdns.len()
            && self.rdns[self.rdns.len() - ancestor.rdns.len()..] == ancestor.rdns[..]
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, rdn) in self.rdns.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{rdn}")?;
        }
        Ok(())
    }
}

impl FromStr for DistinguishedName {
    type Err = DnParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for DistinguishedName {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DistinguishedName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Escapes an attribute value for use inside a DN string.
#[must_use]
pub fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 4);
    let last = value.chars().count().saturating_sub(1);

    for (i, ch) in value.chars().enumerate() {
        match ch {
            ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=' => {
                out.push('\\');
                out.push(ch);
            }
            '\0' => out.push_str("\\00"),
            ' ' if i == 0 || i == last => out.push_str("\\20"),
            '#' if i == 0 => out.push_str("\\23"),
            _ => out.push(ch),
        }
    }

    out
}
