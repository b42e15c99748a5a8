//! Organizational unit management

use super::context::GpoContext;
use crate::domain::{
    DirectoryAccessRule, DirectoryRights, Filter, OrganizationalUnit, SearchScope, Sid,
};
use crate::error::{AppError, AppResult};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedOu {
    pub ou: OrganizationalUnit,
    /// Account granted full control over the new OU, if it resolved.
    pub granted_to: Option<Sid>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MovedObject {
    pub from: String,
    pub to: String,
}

/// OUs whose name matches `pattern` (`*` wildcards allowed).
pub fn find_ous(ctx: &GpoContext, pattern: &str) -> AppResult<Vec<OrganizationalUnit>> {
    search_ous(ctx, Filter::like("name", pattern))
}

fn search_ous(ctx: &GpoContext, filter: Filter) -> AppResult<Vec<OrganizationalUnit>> {
    let filter = Filter::and([Filter::eq("objectClass", "organizationalUnit"), filter]);
    let entries = ctx.directory.search(
        &ctx.domain.domain_dn,
        &filter,
        OrganizationalUnit::ATTRIBUTES,
        SearchScope::Subtree,
    )?;
    Ok(entries.iter().map(OrganizationalUnit::from_entry).collect())
}

/// The OU at `dn`; anything else at that DN is refused.
pub fn get_ou(ctx: &GpoContext, dn: &str) -> AppResult<OrganizationalUnit> {
    let mut attributes = OrganizationalUnit::ATTRIBUTES.to_vec();
    attributes.push("objectClass");
    let entry = ctx
        .directory
        .read_entry(dn, &attributes)?
        .ok_or_else(|| AppError::ObjectNotFound(dn.to_string()))?;
    if !entry.has_class("organizationalUnit") {
        return Err(AppError::InvalidArgument(format!(
            "{} is not an organizational unit",
            dn
        )));
    }
    Ok(OrganizationalUnit::from_entry(&entry))
}

/// The single OU named exactly `name`.
pub fn resolve_ou_by_name(ctx: &GpoContext, name: &str) -> AppResult<OrganizationalUnit> {
    let mut matches = search_ous(ctx, Filter::eq("name", name))?;
    match matches.len() {
        0 => Err(AppError::ObjectNotFound(format!("organizational unit '{}'", name))),
        1 => Ok(matches.remove(0)),
        count => Err(AppError::AmbiguousName {
            name: name.to_string(),
            count,
        }),
    }
}

/// Create `OU=<name>` under `base_dn` (the domain root by default) and give
/// `acting_user` full control over it.
pub fn create_ou(
    ctx: &GpoContext,
    name: &str,
    base_dn: Option<&str>,
    acting_user: Option<&str>,
) -> AppResult<CreatedOu> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::InvalidArgument("OU name is empty".to_string()));
    }
    let base_dn = base_dn.unwrap_or(&ctx.domain.domain_dn);
    if ctx.directory.read_entry(base_dn, &["objectClass"])?.is_none() {
        return Err(AppError::ObjectNotFound(base_dn.to_string()));
    }
    let target = format!("OU={},{}", name, base_dn);
    if ctx.directory.read_entry(&target, &["objectClass"])?.is_some() {
        return Err(AppError::AlreadyExists(target));
    }

    let dn = ctx
        .directory
        .create_entry(base_dn, &format!("OU={}", name), "organizationalUnit", &[])?;
    tracing::info!(dn = %dn, "Created organizational unit");

    let granted_to = match acting_user {
        Some(user) => grant_full_control(ctx, &dn, user)?,
        None => {
            tracing::warn!(dn = %dn, "No acting user known, skipping full-control grant");
            None
        }
    };

    Ok(CreatedOu {
        ou: get_ou(ctx, &dn)?,
        granted_to,
    })
}

fn grant_full_control(ctx: &GpoContext, dn: &str, user: &str) -> AppResult<Option<Sid>> {
    let sid = match ctx.identities().resolve_user(user) {
        Ok(sid) => sid,
        Err(AppError::ObjectNotFound(_)) => {
            tracing::warn!(dn, user, "Acting user not found in the directory, skipping full-control grant");
            return Ok(None);
        }
        Err(e) => return Err(e),
    };
    let mut security = ctx.directory.read_security(dn)?;
    security.set_access_rule(DirectoryAccessRule::allow(sid.clone(), DirectoryRights::GENERIC_ALL));
    ctx.directory.write_security(dn, &security)?;
    tracing::debug!(dn, sid = %sid, "Granted full control");
    Ok(Some(sid))
}

/// Delete the OU and everything below it.
pub fn remove_ou(ctx: &GpoContext, ou: &OrganizationalUnit) -> AppResult<()> {
    ctx.directory.delete_tree(&ou.distinguished_name)?;
    tracing::info!(dn = %ou.distinguished_name, "Removed organizational unit");
    Ok(())
}

/// Re-parent any object under `destination_dn`.
pub fn move_object(ctx: &GpoContext, source_dn: &str, destination_dn: &str) -> AppResult<MovedObject> {
    for dn in [source_dn, destination_dn] {
        if ctx.directory.read_entry(dn, &["objectClass"])?.is_none() {
            return Err(AppError::ObjectNotFound(dn.to_string()));
        }
    }
    let moved = ctx.directory.move_entry(source_dn, destination_dn)?;
    tracing::info!(from = source_dn, to = %moved, "Moved object");
    Ok(MovedObject {
        from: source_dn.to_string(),
        to: moved,
    })
}
