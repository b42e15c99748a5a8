use super::guid::PolicyGuid;
use super::gplink::LinkOptions;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// LDAP search scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    Base,
    OneLevel,
    Subtree,
}

/// A directory object as returned by a search: its DN plus the requested
/// attributes. Attribute names are stored lowercased.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub dn: String,
    #[serde(default)]
    pub attributes: HashMap<String, Vec<String>>,
}

impl DirectoryEntry {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn get(&self, attr: &str) -> Option<&String> {
        self.attributes.get(&attr.to_lowercase()).and_then(|v| v.first())
    }

    pub fn get_all(&self, attr: &str) -> Option<&Vec<String>> {
        self.attributes.get(&attr.to_lowercase())
    }

    pub fn set(&mut self, attr: &str, values: Vec<String>) {
        self.attributes.insert(attr.to_lowercase(), values);
    }

    pub fn clear(&mut self, attr: &str) {
        self.attributes.remove(&attr.to_lowercase());
    }

    /// Case-insensitive `objectClass` membership.
    pub fn has_class(&self, class: &str) -> bool {
        self.get_all("objectClass")
            .is_some_and(|classes| classes.iter().any(|c| c.eq_ignore_ascii_case(class)))
    }

    /// `name`, falling back to the value of the leading RDN.
    pub fn name(&self) -> String {
        self.get("name")
            .cloned()
            .unwrap_or_else(|| rdn_value(&self.dn).to_string())
    }
}

/// Domain information from the directory connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainInfo {
    pub domain_dn: String,
    pub dns_root: String,
    pub domain_controller: String,
}

impl DomainInfo {
    pub fn new(dns_root: &str, domain_controller: &str) -> Self {
        Self {
            domain_dn: dns_to_domain_dn(dns_root),
            dns_root: dns_root.to_string(),
            domain_controller: domain_controller.to_string(),
        }
    }

    /// Container holding every groupPolicyContainer.
    pub fn policies_dn(&self) -> String {
        format!("CN=Policies,CN=System,{}", self.domain_dn)
    }

    pub fn policy_dn(&self, guid: &PolicyGuid) -> String {
        format!("CN={},{}", guid, self.policies_dn())
    }

    pub fn sites_dn(&self) -> String {
        format!("CN=Sites,CN=Configuration,{}", self.domain_dn)
    }

    /// `\\<dc>\SYSVOL\<domain>\Policies\<GUID>`
    pub fn sysvol_policy_path(&self, guid: &PolicyGuid) -> String {
        format!(
            r"\\{}\SYSVOL\{}\Policies\{}",
            self.domain_controller, self.dns_root, guid
        )
    }
}

/// A groupPolicyContainer
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyObject {
    pub guid: PolicyGuid,
    pub display_name: String,
    pub distinguished_name: String,
    pub file_sys_path: Option<String>,
    pub version: u32,
    pub flags: u32,
    pub functionality_version: Option<u32>,
}

impl PolicyObject {
    pub const ATTRIBUTES: &'static [&'static str] = &[
        "cn",
        "displayName",
        "gPCFileSysPath",
        "versionNumber",
        "flags",
        "gPCFunctionalityVersion",
    ];

    pub fn from_entry(entry: &DirectoryEntry) -> Self {
        let guid = PolicyGuid::canonical(
            entry.get("cn").map(String::as_str).unwrap_or_else(|| rdn_value(&entry.dn)),
        );
        let number = |attr: &str| entry.get(attr).and_then(|v| v.parse::<u32>().ok());
        Self {
            guid,
            display_name: entry.get("displayName").cloned().unwrap_or_default(),
            distinguished_name: entry.dn.clone(),
            file_sys_path: entry.get("gPCFileSysPath").cloned(),
            version: number("versionNumber").unwrap_or(0),
            flags: number("flags").unwrap_or(0),
            functionality_version: number("gPCFunctionalityVersion"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScopeKind {
    Domain,
    OrganizationalUnit,
    Site,
    Other,
}

/// Anything that can carry a `gPLink`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeObject {
    pub distinguished_name: String,
    pub name: String,
    pub kind: ScopeKind,
    pub gp_link: Option<String>,
}

impl ScopeObject {
    pub const ATTRIBUTES: &'static [&'static str] = &["name", "objectClass", "gPLink"];

    pub fn from_entry(entry: &DirectoryEntry) -> Self {
        let kind = if entry.has_class("domainDNS") {
            ScopeKind::Domain
        } else if entry.has_class("organizationalUnit") {
            ScopeKind::OrganizationalUnit
        } else if entry.has_class("site") {
            ScopeKind::Site
        } else {
            ScopeKind::Other
        };
        Self {
            distinguished_name: entry.dn.clone(),
            name: entry.name(),
            kind,
            gp_link: entry.get("gPLink").cloned(),
        }
    }
}

/// A resolved link on a scope
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedPolicy {
    pub guid: PolicyGuid,
    pub display_name: String,
    pub enabled: bool,
    pub enforced: bool,
}

impl LinkedPolicy {
    pub fn new(policy: &PolicyObject, options: LinkOptions) -> Self {
        Self {
            guid: policy.guid.clone(),
            display_name: policy.display_name.clone(),
            enabled: options.enabled(),
            enforced: options.enforced(),
        }
    }
}

/// Organizational unit summary
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationalUnit {
    pub name: String,
    pub distinguished_name: String,
    pub description: Option<String>,
}

impl OrganizationalUnit {
    pub const ATTRIBUTES: &'static [&'static str] = &["ou", "name", "description"];

    pub fn from_entry(entry: &DirectoryEntry) -> Self {
        Self {
            name: entry.get("ou").cloned().unwrap_or_else(|| entry.name()),
            distinguished_name: entry.dn.clone(),
            description: entry.get("description").cloned(),
        }
    }
}

/// Value of the leading RDN: `OU=IT,DC=x` -> `IT`
pub fn rdn_value(dn: &str) -> &str {
    let first = dn.split(',').next().unwrap_or(dn);
    first.split_once('=').map(|(_, v)| v).unwrap_or(first).trim()
}

/// Everything after the leading RDN.
pub fn parent_dn(dn: &str) -> Option<&str> {
    dn.split_once(',').map(|(_, parent)| parent.trim())
}

/// `contoso.com` -> `DC=contoso,DC=com`
pub fn dns_to_domain_dn(dns: &str) -> String {
    dns.split('.')
        .filter(|label| !label.is_empty())
        .map(|label| format!("DC={}", label))
        .collect::<Vec<_>>()
        .join(",")
}

/// `DC=contoso,DC=com` -> `contoso.com`
pub fn domain_dn_to_dns(dn: &str) -> String {
    dn.split(',')
        .map(str::trim)
        .filter(|s| s.len() > 3 && s.get(..3).is_some_and(|p| p.eq_ignore_ascii_case("DC=")))
        .map(|s| &s[3..])
        .collect::<Vec<_>>()
        .join(".")
}
