//! Directory → SYSVOL permission translation
//!
//! A policy's SYSVOL folder must grant the same principals what its
//! directory object grants them. Directory rights have no general mapping to
//! file-system rights, so translation is driven by a small ordered rule
//! table; the first rule whose pattern matches an ACE decides its fate.
//! ACEs matching no rule are reported and left out of the mirror.

use super::security::{
    AccessControlType, DirectoryAccessRule, DirectoryRights, DirectorySecurity, FileAccessRule,
    FileSecurity, FileSystemRights, InheritanceFlags, PropagationFlags, Sid,
};
use serde::Serialize;
use thiserror::Error;

/// How a rule tests the rights of a directory ACE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RightsPattern {
    /// The mask equals this value exactly.
    Exactly(DirectoryRights),
    /// Every bit of this value is set in the mask.
    ContainsAll(DirectoryRights),
}

impl RightsPattern {
    pub fn matches(&self, rights: DirectoryRights) -> bool {
        match self {
            RightsPattern::Exactly(expected) => rights == *expected,
            RightsPattern::ContainsAll(required) => rights.contains(*required),
        }
    }
}

/// What a matching ACE becomes on the SYSVOL folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mapping {
    Grant(FileSystemRights),
    /// Directory-only semantics, nothing to mirror.
    Drop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslationRule {
    pub name: &'static str,
    pub pattern: RightsPattern,
    pub mapping: Mapping,
}

/// Full control first, then read/execute, then the apply-policy marker.
pub const DEFAULT_RULES: &[TranslationRule] = &[
    TranslationRule {
        name: "full-control",
        pattern: RightsPattern::Exactly(DirectoryRights::FULL_CONTROL),
        mapping: Mapping::Grant(FileSystemRights::FULL_CONTROL),
    },
    TranslationRule {
        name: "read-and-execute",
        pattern: RightsPattern::ContainsAll(DirectoryRights(
            DirectoryRights::READ_PROPERTY.0 | DirectoryRights::GENERIC_EXECUTE.0,
        )),
        mapping: Mapping::Grant(FileSystemRights::READ_AND_EXECUTE),
    },
    TranslationRule {
        name: "apply-policy-marker",
        pattern: RightsPattern::Exactly(DirectoryRights::EXTENDED_RIGHT),
        mapping: Mapping::Drop,
    },
];

/// A directory ACE the rule table has no answer for.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "camelCase")]
#[error("no file-system mapping for rights 0x{:X} ({access}) granted to {principal}", .rights.0)]
pub struct UnmappedPermission {
    pub principal: Sid,
    pub rights: DirectoryRights,
    pub access: AccessControlType,
}

/// Translated descriptor plus whatever could not be mapped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    pub security: FileSecurity,
    pub unmapped: Vec<UnmappedPermission>,
}

#[derive(Debug, Clone, Copy)]
pub struct AccessTranslator<'r> {
    rules: &'r [TranslationRule],
}

impl Default for AccessTranslator<'static> {
    fn default() -> Self {
        Self { rules: DEFAULT_RULES }
    }
}

impl<'r> AccessTranslator<'r> {
    pub fn with_rules(rules: &'r [TranslationRule]) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &'r [TranslationRule] {
        self.rules
    }

    /// First rule matching `rights`, if any.
    pub fn rule_for(&self, rights: DirectoryRights) -> Option<&'r TranslationRule> {
        self.rules.iter().find(|rule| rule.pattern.matches(rights))
    }

    /// Build a protected file descriptor equivalent to `source`.
    ///
    /// Owner and group carry over unchanged; the resulting DACL replaces
    /// whatever the folder had.
    pub fn translate(&self, source: &DirectorySecurity) -> Translation {
        let mut security = FileSecurity::protected(source.owner.clone(), source.group.clone());
        let mut unmapped = Vec::new();

        for ace in &source.rules {
            match self.rule_for(ace.rights).map(|rule| rule.mapping) {
                Some(Mapping::Grant(rights)) => security.set_access_rule(file_rule(ace, rights)),
                Some(Mapping::Drop) => {}
                None => {
                    let miss = UnmappedPermission {
                        principal: ace.principal.clone(),
                        rights: ace.rights,
                        access: ace.access,
                    };
                    tracing::warn!(
                        principal = %miss.principal,
                        rights = format!("0x{:X}", miss.rights.0),
                        access = %miss.access,
                        "Unknown mapping from directory rights to file-system rights"
                    );
                    unmapped.push(miss);
                }
            }
        }

        Translation { security, unmapped }
    }
}

fn file_rule(ace: &DirectoryAccessRule, rights: FileSystemRights) -> FileAccessRule {
    FileAccessRule {
        principal: ace.principal.clone(),
        rights,
        inheritance: InheritanceFlags::CONTAINER_AND_OBJECT,
        propagation: PropagationFlags::NONE,
        access: ace.access,
    }
}
