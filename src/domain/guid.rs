//! Canonical policy GUIDs
//!
//! A policy object is keyed by its brace-delimited GUID, which doubles as the
//! `CN=` of its directory entry, the name of its SYSVOL folder and the match
//! key inside `gPLink` values.

use serde::{Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use uuid::Uuid;

/// A brace-delimited policy GUID, compared case-insensitively.
#[derive(Debug, Clone, Eq)]
pub struct PolicyGuid(String);

impl PolicyGuid {
    /// Wrap `raw` in braces unless it already starts with one.
    ///
    /// No format validation happens here: a malformed GUID simply fails to
    /// match anything downstream.
    pub fn canonical(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.starts_with('{') {
            PolicyGuid(raw.to_string())
        } else {
            PolicyGuid(format!("{{{}}}", raw))
        }
    }

    /// Fresh uppercase GUID for a new policy object.
    pub fn generate() -> Self {
        PolicyGuid(format!("{{{}}}", Uuid::new_v4()).to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive substring test against a raw attribute value.
    pub fn is_in(&self, haystack: &str) -> bool {
        haystack
            .to_ascii_uppercase()
            .contains(&self.0.to_ascii_uppercase())
    }
}

impl PartialEq for PolicyGuid {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Hash for PolicyGuid {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_ascii_uppercase().hash(state);
    }
}

impl fmt::Display for PolicyGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for PolicyGuid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}
