//! Security identifiers and the two access-control models
//!
//! The directory side mirrors `ActiveDirectoryAccessRule`, the SYSVOL side
//! mirrors `FileSystemAccessRule`. Only explicit (non-inherited) rules are
//! modelled.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

/// Security identifier in its `S-1-...` string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sid(String);

impl Sid {
    pub const AUTHENTICATED_USERS: &'static str = "S-1-5-11";
    pub const ENTERPRISE_DOMAIN_CONTROLLERS: &'static str = "S-1-5-9";
    pub const LOCAL_SYSTEM: &'static str = "S-1-5-18";
    pub const CREATOR_OWNER: &'static str = "S-1-3-0";

    pub fn authenticated_users() -> Self {
        Sid(Self::AUTHENTICATED_USERS.to_string())
    }

    /// One of the `Sid::*` constants, which are already canonical.
    pub fn well_known(sid: &'static str) -> Self {
        Sid(sid.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `<domain SID>-<rid>`
    pub fn with_rid(&self, rid: u32) -> Self {
        Sid(format!("{}-{}", self.0, rid))
    }
}

impl FromStr for Sid {
    type Err = AppError;

    fn from_str(s: &str) -> AppResult<Self> {
        let s = s.trim();
        let mut parts = s.split('-');
        let well_formed = parts.next().is_some_and(|p| p.eq_ignore_ascii_case("S"))
            && parts.next() == Some("1")
            && {
                let rest: Vec<&str> = parts.collect();
                !rest.is_empty() && rest.iter().all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
            };
        if !well_formed {
            return Err(AppError::InvalidArgument(format!("'{}' is not a SID", s)));
        }
        Ok(Sid(format!("S{}", &s[1..])))
    }
}

impl TryFrom<String> for Sid {
    type Error = AppError;

    fn try_from(value: String) -> AppResult<Self> {
        value.parse()
    }
}

impl From<Sid> for String {
    fn from(sid: Sid) -> Self {
        sid.0
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `ActiveDirectoryRights` bitmask
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DirectoryRights(pub u32);

impl DirectoryRights {
    pub const CREATE_CHILD: Self = Self(0x1);
    pub const DELETE_CHILD: Self = Self(0x2);
    pub const LIST_CHILDREN: Self = Self(0x4);
    pub const SELF: Self = Self(0x8);
    pub const READ_PROPERTY: Self = Self(0x10);
    pub const WRITE_PROPERTY: Self = Self(0x20);
    pub const DELETE_TREE: Self = Self(0x40);
    pub const LIST_OBJECT: Self = Self(0x80);
    pub const EXTENDED_RIGHT: Self = Self(0x100);
    pub const DELETE: Self = Self(0x10000);
    pub const READ_CONTROL: Self = Self(0x20000);
    pub const WRITE_DACL: Self = Self(0x40000);
    pub const WRITE_OWNER: Self = Self(0x80000);
    pub const GENERIC_EXECUTE: Self = Self(0x20004);
    pub const GENERIC_READ: Self = Self(0x20094);
    pub const GENERIC_ALL: Self = Self(0xF01FF);

    /// CreateChild | DeleteChild | Self | WriteProperty | DeleteTree |
    /// Delete | GenericRead | WriteDacl | WriteOwner (983295)
    pub const FULL_CONTROL: Self = Self(0xF00FF);

    /// What security filtering grants to a principal.
    pub const APPLY_POLICY: Self = Self(0x20114);

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }
}

impl BitOr for DirectoryRights {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// `FileSystemRights` bitmask
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileSystemRights(pub u32);

impl FileSystemRights {
    pub const FULL_CONTROL: Self = Self(0x1F01FF);
    pub const READ_AND_EXECUTE: Self = Self(0x1200A9);
}

/// `InheritanceFlags` bitmask
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InheritanceFlags(pub u32);

impl InheritanceFlags {
    pub const NONE: Self = Self(0);
    pub const CONTAINER_INHERIT: Self = Self(0x1);
    pub const OBJECT_INHERIT: Self = Self(0x2);
    pub const CONTAINER_AND_OBJECT: Self = Self(0x3);
}

/// `PropagationFlags` bitmask
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropagationFlags(pub u32);

impl PropagationFlags {
    pub const NONE: Self = Self(0);
    pub const NO_PROPAGATE_INHERIT: Self = Self(0x1);
    pub const INHERIT_ONLY: Self = Self(0x2);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessControlType {
    Allow,
    Deny,
}

impl fmt::Display for AccessControlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessControlType::Allow => write!(f, "Allow"),
            AccessControlType::Deny => write!(f, "Deny"),
        }
    }
}

/// `ActiveDirectorySecurityInheritance`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DirectoryInheritance {
    #[default]
    None,
    All,
    Descendents,
    SelfAndChildren,
    Children,
}

/// One explicit directory ACE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryAccessRule {
    pub principal: Sid,
    pub rights: DirectoryRights,
    pub access: AccessControlType,
    #[serde(default)]
    pub inheritance: DirectoryInheritance,
    /// Extended-right or property GUID the ACE is restricted to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
}

impl DirectoryAccessRule {
    pub fn allow(principal: Sid, rights: DirectoryRights) -> Self {
        Self {
            principal,
            rights,
            access: AccessControlType::Allow,
            inheritance: DirectoryInheritance::None,
            object_type: None,
        }
    }

    pub fn with_inheritance(mut self, inheritance: DirectoryInheritance) -> Self {
        self.inheritance = inheritance;
        self
    }
}

/// Owner, group and explicit DACL of a directory object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectorySecurity {
    pub owner: Sid,
    pub group: Sid,
    pub rules: Vec<DirectoryAccessRule>,
}

impl DirectorySecurity {
    /// Replace every rule for the same principal and access type with `rule`.
    pub fn set_access_rule(&mut self, rule: DirectoryAccessRule) {
        self.rules
            .retain(|r| !(r.principal == rule.principal && r.access == rule.access));
        self.rules.push(rule);
    }

    /// Clear `rights` from every rule for `principal`/`access`; rules left
    /// without any bits are dropped. Returns whether the DACL changed.
    pub fn remove_access_rule(
        &mut self,
        principal: &Sid,
        access: AccessControlType,
        rights: DirectoryRights,
    ) -> bool {
        let mut changed = false;
        for rule in self
            .rules
            .iter_mut()
            .filter(|r| &r.principal == principal && r.access == access)
        {
            let remaining = rule.rights.without(rights);
            if remaining != rule.rights {
                rule.rights = remaining;
                changed = true;
            }
        }
        self.rules.retain(|r| !r.rights.is_empty());
        changed
    }

    pub fn rules_for<'a>(&'a self, principal: &'a Sid) -> impl Iterator<Item = &'a DirectoryAccessRule> {
        self.rules.iter().filter(move |r| &r.principal == principal)
    }
}

/// One explicit file-system ACE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAccessRule {
    pub principal: Sid,
    pub rights: FileSystemRights,
    pub inheritance: InheritanceFlags,
    pub propagation: PropagationFlags,
    pub access: AccessControlType,
}

/// Security descriptor of a SYSVOL folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSecurity {
    pub owner: Option<Sid>,
    pub group: Option<Sid>,
    /// Inheritance from the parent folder is blocked.
    pub protected: bool,
    pub rules: Vec<FileAccessRule>,
}

impl FileSecurity {
    /// Empty descriptor with inheritance from the parent disabled.
    pub fn protected(owner: Sid, group: Sid) -> Self {
        Self {
            owner: Some(owner),
            group: Some(group),
            protected: true,
            rules: Vec::new(),
        }
    }

    /// Replace every rule for the same principal and access type with `rule`.
    pub fn set_access_rule(&mut self, rule: FileAccessRule) {
        self.rules
            .retain(|r| !(r.principal == rule.principal && r.access == rule.access));
        self.rules.push(rule);
    }
}
