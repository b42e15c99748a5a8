//! Principal name to SID resolution
//!
//! Domain accounts resolve through a directory search on `sAMAccountName`;
//! platform accounts resolve locally without a directory round trip.

use super::backend::DirectoryService;
use crate::domain::{Filter, SearchScope, Sid};
use crate::error::{AppError, AppResult};
use serde::Serialize;
use std::fmt;

/// Well-known principals that have no directory object.
const WELL_KNOWN_ACCOUNTS: &[(&str, &str)] = &[
    ("Authenticated Users", Sid::AUTHENTICATED_USERS),
    ("Everyone", "S-1-1-0"),
    ("SYSTEM", Sid::LOCAL_SYSTEM),
    ("Administrators", "S-1-5-32-544"),
    ("Users", "S-1-5-32-545"),
    ("CREATOR OWNER", Sid::CREATOR_OWNER),
    ("ENTERPRISE DOMAIN CONTROLLERS", Sid::ENTERPRISE_DOMAIN_CONTROLLERS),
];

const ACCOUNT_PREFIXES: &[&str] = &["NT AUTHORITY\\", "BUILTIN\\"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PrincipalKind {
    User,
    Computer,
    Group,
    PlatformAccount,
}

impl fmt::Display for PrincipalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrincipalKind::User => write!(f, "user"),
            PrincipalKind::Computer => write!(f, "computer"),
            PrincipalKind::Group => write!(f, "group"),
            PrincipalKind::PlatformAccount => write!(f, "account"),
        }
    }
}

/// The four ways a caller can name a principal. Blank values count as absent.
#[derive(Debug, Clone, Default)]
pub struct PrincipalSelector {
    pub user: Option<String>,
    pub computer: Option<String>,
    pub group: Option<String>,
    pub platform_account: Option<String>,
}

impl PrincipalSelector {
    /// First populated selector in priority order: user, computer, group,
    /// platform account.
    pub fn first(&self) -> Option<(PrincipalKind, &str)> {
        [
            (PrincipalKind::User, &self.user),
            (PrincipalKind::Computer, &self.computer),
            (PrincipalKind::Group, &self.group),
            (PrincipalKind::PlatformAccount, &self.platform_account),
        ]
        .into_iter()
        .find_map(|(kind, value)| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| (kind, v))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedPrincipal {
    pub kind: PrincipalKind,
    pub name: String,
    pub sid: Sid,
}

pub struct IdentityResolver<'a> {
    directory: &'a dyn DirectoryService,
}

impl<'a> IdentityResolver<'a> {
    pub fn new(directory: &'a dyn DirectoryService) -> Self {
        Self { directory }
    }

    pub fn resolve_user(&self, name: &str) -> AppResult<Sid> {
        let filter = Filter::and([
            Filter::eq("objectClass", "user"),
            Filter::not(Filter::eq("objectClass", "computer")),
            Filter::eq("sAMAccountName", name),
        ]);
        self.lookup(&filter, PrincipalKind::User, name)
    }

    /// Machine accounts carry a trailing `$`; it is added when missing.
    pub fn resolve_computer(&self, name: &str) -> AppResult<Sid> {
        let account = if name.ends_with('$') {
            name.to_string()
        } else {
            format!("{}$", name)
        };
        let filter = Filter::and([
            Filter::eq("objectClass", "computer"),
            Filter::eq("sAMAccountName", account.as_str()),
        ]);
        self.lookup(&filter, PrincipalKind::Computer, &account)
    }

    pub fn resolve_group(&self, name: &str) -> AppResult<Sid> {
        let filter = Filter::and([
            Filter::eq("objectClass", "group"),
            Filter::eq("sAMAccountName", name),
        ]);
        self.lookup(&filter, PrincipalKind::Group, name)
    }

    pub fn resolve_platform_account(&self, name: &str) -> AppResult<Sid> {
        resolve_platform_account(name)
    }

    pub fn resolve_any(&self, selector: &PrincipalSelector) -> AppResult<ResolvedPrincipal> {
        let (kind, name) = selector.first().ok_or_else(|| {
            AppError::MissingSelector(
                "a domain user, domain computer, domain group or account name".to_string(),
            )
        })?;
        let sid = match kind {
            PrincipalKind::User => self.resolve_user(name)?,
            PrincipalKind::Computer => self.resolve_computer(name)?,
            PrincipalKind::Group => self.resolve_group(name)?,
            PrincipalKind::PlatformAccount => self.resolve_platform_account(name)?,
        };
        tracing::debug!(kind = %kind, name, sid = %sid, "Resolved principal");
        Ok(ResolvedPrincipal {
            kind,
            name: name.to_string(),
            sid,
        })
    }

    /// Reverse lookup for display: `sAMAccountName`, else a well-known name,
    /// else the SID itself.
    pub fn account_name(&self, sid: &Sid) -> AppResult<String> {
        let entries = self.directory.search(
            self.directory.domain_dn(),
            &Filter::eq("objectSid", sid.as_str()),
            &["sAMAccountName"],
            SearchScope::Subtree,
        )?;
        if let Some(name) = entries.iter().find_map(|e| e.get("sAMAccountName")) {
            return Ok(name.clone());
        }
        Ok(well_known_name(sid)
            .map(str::to_string)
            .unwrap_or_else(|| sid.to_string()))
    }

    fn lookup(&self, filter: &Filter, kind: PrincipalKind, name: &str) -> AppResult<Sid> {
        let entries = self.directory.search(
            self.directory.domain_dn(),
            filter,
            &["objectSid"],
            SearchScope::Subtree,
        )?;
        entries
            .iter()
            .find_map(|e| e.get("objectSid"))
            .ok_or_else(|| AppError::ObjectNotFound(format!("{} '{}'", kind, name)))?
            .parse()
    }
}

/// Literal SID, well-known name, then the local security authority.
pub fn resolve_platform_account(name: &str) -> AppResult<Sid> {
    let name = name.trim();
    if let Ok(sid) = name.parse::<Sid>() {
        return Ok(sid);
    }

    let bare = ACCOUNT_PREFIXES
        .iter()
        .find_map(|prefix| strip_prefix_ignore_case(name, prefix))
        .unwrap_or(name);
    if let Some((_, sid)) = WELL_KNOWN_ACCOUNTS
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(bare))
    {
        return sid.parse();
    }

    match lookup_account_name(name)? {
        Some(sid) => Ok(sid),
        None => Err(AppError::ObjectNotFound(format!("account '{}'", name))),
    }
}

pub fn well_known_name(sid: &Sid) -> Option<&'static str> {
    WELL_KNOWN_ACCOUNTS
        .iter()
        .find(|(_, known)| *known == sid.as_str())
        .map(|(name, _)| *name)
}

fn strip_prefix_ignore_case<'n>(name: &'n str, prefix: &str) -> Option<&'n str> {
    let head = name.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &name[prefix.len()..])
}

#[cfg(windows)]
fn lookup_account_name(name: &str) -> AppResult<Option<Sid>> {
    use windows::core::{HSTRING, PCWSTR, PWSTR};
    use windows::Win32::Foundation::{LocalFree, HLOCAL, PSID};
    use windows::Win32::Security::Authorization::ConvertSidToStringSidW;
    use windows::Win32::Security::{LookupAccountNameW, SID_NAME_USE};

    let account = HSTRING::from(name);
    let mut sid_len = 0u32;
    let mut domain_len = 0u32;
    let mut sid_use = SID_NAME_USE::default();

    unsafe {
        // First call only sizes the buffers.
        let _ = LookupAccountNameW(
            PCWSTR::null(),
            PCWSTR(account.as_ptr()),
            PSID::default(),
            &mut sid_len,
            PWSTR::null(),
            &mut domain_len,
            &mut sid_use,
        );
        if sid_len == 0 {
            return Ok(None);
        }

        let mut sid_buf = vec![0u8; sid_len as usize];
        let mut domain_buf = vec![0u16; domain_len as usize];
        LookupAccountNameW(
            PCWSTR::null(),
            PCWSTR(account.as_ptr()),
            PSID(sid_buf.as_mut_ptr() as *mut _),
            &mut sid_len,
            PWSTR(domain_buf.as_mut_ptr()),
            &mut domain_len,
            &mut sid_use,
        )
        .map_err(|e| AppError::WindowsError(format!("LookupAccountName failed: {}", e)))?;

        let mut string_sid = PWSTR::null();
        ConvertSidToStringSidW(PSID(sid_buf.as_mut_ptr() as *mut _), &mut string_sid)
            .map_err(|e| AppError::WindowsError(format!("ConvertSidToStringSid failed: {}", e)))?;
        let text = string_sid.to_string();
        let _ = LocalFree(HLOCAL(string_sid.0 as *mut _));
        let text = text.map_err(|_| AppError::WindowsError("Invalid UTF-16 string".to_string()))?;
        text.parse().map(Some)
    }
}

#[cfg(not(windows))]
fn lookup_account_name(_name: &str) -> AppResult<Option<Sid>> {
    Ok(None)
}
