//! `gPLink` codec
//!
//! A scope object's `gPLink` attribute is a flat concatenation of bracketed
//! entries, newest first:
//!
//! ```text
//! [LDAP://CN={GUID-1},CN=Policies,CN=System,DC=x,DC=y;0][LDAP://CN={GUID-2},...;2]
//! ```
//!
//! The codec only relies on each entry being closed by `]`. Segments are kept
//! verbatim so that anything this tool did not write survives a round trip.

use super::guid::PolicyGuid;
use crate::error::{AppError, AppResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static GUID_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{.*?\}").expect("GUID token pattern is valid"));

const ENTRY_CLOSE: char = ']';

/// Per-link option bits carried after the `;` of an entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkOptions(pub u32);

impl LinkOptions {
    pub const DISABLED: u32 = 0x1;
    pub const ENFORCED: u32 = 0x2;

    pub fn enabled(&self) -> bool {
        self.0 & Self::DISABLED == 0
    }

    pub fn enforced(&self) -> bool {
        self.0 & Self::ENFORCED != 0
    }
}

/// Decoded view of one bracketed entry. `guids` holds every brace token in
/// the entry, normally exactly one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkEntry {
    pub locator: String,
    pub guids: Vec<PolicyGuid>,
    pub options: LinkOptions,
}

/// What the caller should do with the attribute after a removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkUpdate {
    Set(String),
    Clear,
}

/// Ordered list of link segments, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GpLink {
    segments: Vec<String>,
}

impl GpLink {
    pub fn decode(raw: Option<&str>) -> Self {
        let segments = raw
            .unwrap_or_default()
            .split_inclusive(ENTRY_CLOSE)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        Self { segments }
    }

    /// `None` means the attribute should be cleared rather than set empty.
    pub fn encode(&self) -> Option<String> {
        if self.segments.is_empty() {
            None
        } else {
            Some(self.segments.concat())
        }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn contains(&self, guid: &PolicyGuid) -> bool {
        self.segments.iter().any(|s| guid.is_in(s))
    }

    /// Every brace-delimited token in order of appearance.
    pub fn referenced_guids(&self) -> Vec<PolicyGuid> {
        self.segments
            .iter()
            .flat_map(|s| GUID_TOKEN.find_iter(s))
            .map(|m| PolicyGuid::canonical(m.as_str()))
            .collect()
    }

    pub fn entries(&self) -> Vec<LinkEntry> {
        self.segments.iter().map(|s| decode_entry(s)).collect()
    }

    /// Prepend an entry for `guid` with default options.
    pub fn prepend(&mut self, policies_dn: &str, guid: &PolicyGuid) {
        let entry = format!("[{};0]", link_locator(policies_dn, guid));
        self.segments.insert(0, entry);
    }

    /// Drop every segment mentioning `guid`; returns how many went.
    pub fn remove(&mut self, guid: &PolicyGuid) -> usize {
        let before = self.segments.len();
        self.segments.retain(|s| !guid.is_in(s));
        before - self.segments.len()
    }
}

/// `LDAP://CN={GUID},<policies container>` locator used inside entries.
pub fn link_locator(policies_dn: &str, guid: &PolicyGuid) -> String {
    format!("LDAP://CN={},{}", guid, policies_dn)
}

/// GUIDs referenced by a raw attribute value, in order.
pub fn parse_links(raw: Option<&str>) -> Vec<PolicyGuid> {
    GpLink::decode(raw).referenced_guids()
}

/// New attribute value with a link to `guid` in front of the existing ones.
pub fn insert_link(
    raw: Option<&str>,
    scope_dn: &str,
    policies_dn: &str,
    guid: &PolicyGuid,
) -> AppResult<String> {
    if raw.is_some_and(|r| guid.is_in(r)) {
        return Err(AppError::AlreadyLinked {
            scope: scope_dn.to_string(),
            guid: guid.to_string(),
        });
    }
    let mut links = GpLink::decode(raw);
    links.prepend(policies_dn, guid);
    Ok(links.encode().unwrap_or_default())
}

/// Attribute update that drops every link to `guid`.
pub fn remove_link(raw: Option<&str>, scope_dn: &str, guid: &PolicyGuid) -> AppResult<LinkUpdate> {
    let mut links = GpLink::decode(raw);
    if links.remove(guid) == 0 {
        return Err(AppError::NotLinked {
            scope: scope_dn.to_string(),
            guid: guid.to_string(),
        });
    }
    Ok(match links.encode() {
        Some(value) => LinkUpdate::Set(value),
        None => LinkUpdate::Clear,
    })
}

fn decode_entry(segment: &str) -> LinkEntry {
    let body = segment
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(ENTRY_CLOSE);
    let (locator, options) = match body.rsplit_once(';') {
        Some((locator, options)) => (locator, options.trim().parse().unwrap_or(0)),
        None => (body, 0),
    };
    LinkEntry {
        locator: locator.to_string(),
        guids: GUID_TOKEN
            .find_iter(body)
            .map(|m| PolicyGuid::canonical(m.as_str()))
            .collect(),
        options: LinkOptions(options),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICIES: &str = "CN=Policies,CN=System,DC=x,DC=y";
    const SCOPE: &str = "OU=IT,DC=x,DC=y";

    fn guid(s: &str) -> PolicyGuid {
        PolicyGuid::canonical(s)
    }

    #[test]
    fn test_parse_absent_and_empty() {
        assert!(parse_links(None).is_empty());
        assert!(parse_links(Some("")).is_empty());
    }

    #[test]
    fn test_parse_keeps_order() {
        let raw = format!(
            "[LDAP://CN={{B}},{POLICIES};0][LDAP://cn={{a}},{POLICIES};2]"
        );
        assert_eq!(parse_links(Some(&raw)), vec![guid("B"), guid("A")]);
    }

    #[test]
    fn test_insert_prepends_with_default_options() {
        let existing = format!("[LDAP://CN={{B}},{POLICIES};2]");
        let updated = insert_link(Some(&existing), SCOPE, POLICIES, &guid("A")).unwrap();
        assert_eq!(
            updated,
            format!("[LDAP://CN={{A}},{POLICIES};0]{existing}")
        );
        let links = GpLink::decode(Some(&updated));
        assert_eq!(links.referenced_guids().iter().filter(|g| **g == guid("A")).count(), 1);
    }

    #[test]
    fn test_insert_twice_is_already_linked() {
        let once = insert_link(None, SCOPE, POLICIES, &guid("A")).unwrap();
        let err = insert_link(Some(&once), SCOPE, POLICIES, &guid("a")).unwrap_err();
        assert!(matches!(err, AppError::AlreadyLinked { .. }));
    }

    #[test]
    fn test_remove_restores_original() {
        let originals = [
            String::new(),
            format!("[LDAP://CN={{B}},{POLICIES};0]"),
            format!("[LDAP://CN={{B}},{POLICIES};1][LDAP://CN={{C}},{POLICIES};0]"),
            "[odd entry without guid;0]".to_string(),
        ];
        for raw in originals {
            let raw_opt = if raw.is_empty() { None } else { Some(raw.as_str()) };
            let inserted = insert_link(raw_opt, SCOPE, POLICIES, &guid("A")).unwrap();
            let removed = remove_link(Some(&inserted), SCOPE, &guid("A")).unwrap();
            match removed {
                LinkUpdate::Set(value) => assert_eq!(value, raw),
                LinkUpdate::Clear => assert!(raw.is_empty()),
            }
        }
    }

    #[test]
    fn test_remove_last_entry_clears() {
        let raw = format!("[LDAP://CN={{A}},{POLICIES};0]");
        assert_eq!(remove_link(Some(&raw), SCOPE, &guid("A")).unwrap(), LinkUpdate::Clear);
    }

    #[test]
    fn test_remove_missing_is_not_linked() {
        let raw = format!("[LDAP://CN={{B}},{POLICIES};0]");
        let err = remove_link(Some(&raw), SCOPE, &guid("A")).unwrap_err();
        assert!(matches!(err, AppError::NotLinked { .. }));
        assert!(matches!(remove_link(None, SCOPE, &guid("A")), Err(AppError::NotLinked { .. })));
    }

    #[test]
    fn test_entries_decode_options() {
        let raw = format!("[LDAP://CN={{A}},{POLICIES};3][LDAP://CN={{B}},{POLICIES};0]");
        let entries = GpLink::decode(Some(&raw)).entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].guids, vec![guid("A")]);
        assert!(!entries[0].options.enabled());
        assert!(entries[0].options.enforced());
        assert!(entries[1].options.enabled());
        assert!(!entries[1].options.enforced());
    }

    #[test]
    fn test_entries_keep_every_brace_token() {
        let raw = format!("[LDAP://CN={{A}},CN={{B}},{POLICIES};1][no guid here;0]");
        let entries = GpLink::decode(Some(&raw)).entries();
        assert_eq!(entries[0].guids, vec![guid("A"), guid("B")]);
        assert!(!entries[0].options.enabled());
        assert!(entries[1].guids.is_empty());
        assert_eq!(parse_links(Some(&raw)), vec![guid("A"), guid("B")]);
    }
}
