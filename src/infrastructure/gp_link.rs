//! Policy links on domains, OUs and sites
//!
//! Every change reads the scope's current `gPLink`, runs it through the codec
//! and writes the result back in one commit.

use super::backend::AttributeChange;
use super::context::GpoContext;
use super::gpo_management::find_policy;
use crate::domain::gplink::{insert_link, remove_link};
use crate::domain::{
    Filter, GpLink, LinkUpdate, LinkedPolicy, PolicyGuid, ScopeObject, SearchScope,
};
use crate::error::{AppError, AppResult};
use serde::Serialize;
use std::collections::HashSet;

/// A scope and the policies its `gPLink` resolves to.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeLinks {
    pub scope: ScopeObject,
    pub links: Vec<LinkedPolicy>,
}

pub fn read_scope(ctx: &GpoContext, dn: &str) -> AppResult<ScopeObject> {
    ctx.directory
        .read_entry(dn, ScopeObject::ATTRIBUTES)?
        .map(|entry| ScopeObject::from_entry(&entry))
        .ok_or_else(|| AppError::ObjectNotFound(dn.to_string()))
}

/// Links on one scope, newest first. Every brace token of every entry is
/// looked up; references to policies that no longer exist are skipped.
pub fn links_for_scope(ctx: &GpoContext, dn: &str) -> AppResult<ScopeLinks> {
    let scope = read_scope(ctx, dn)?;
    resolve_links(ctx, scope)
}

fn resolve_links(ctx: &GpoContext, scope: ScopeObject) -> AppResult<ScopeLinks> {
    let mut links = Vec::new();
    for entry in GpLink::decode(scope.gp_link.as_deref()).entries() {
        if entry.guids.is_empty() {
            tracing::debug!(scope = %scope.distinguished_name, locator = %entry.locator, "Link without GUID");
        }
        for guid in &entry.guids {
            match find_policy(ctx, guid)? {
                Some(policy) => links.push(LinkedPolicy::new(&policy, entry.options)),
                None => {
                    tracing::debug!(scope = %scope.distinguished_name, guid = %guid, "Skipping dangling link");
                }
            }
        }
    }
    Ok(ScopeLinks { scope, links })
}

/// The domain root, every OU and every site.
pub fn all_scope_links(ctx: &GpoContext) -> AppResult<Vec<ScopeLinks>> {
    let mut scopes = vec![read_scope(ctx, &ctx.domain.domain_dn)?];
    scopes.extend(
        ctx.directory
            .search(
                &ctx.domain.domain_dn,
                &Filter::eq("objectClass", "organizationalUnit"),
                ScopeObject::ATTRIBUTES,
                SearchScope::Subtree,
            )?
            .iter()
            .map(ScopeObject::from_entry),
    );
    scopes.extend(
        ctx.directory
            .search(
                &ctx.domain.sites_dn(),
                &Filter::eq("objectClass", "site"),
                ScopeObject::ATTRIBUTES,
                SearchScope::OneLevel,
            )?
            .iter()
            .map(ScopeObject::from_entry),
    );
    scopes
        .into_iter()
        .map(|scope| resolve_links(ctx, scope))
        .collect()
}

/// Every domain, OU or site whose `gPLink` mentions `guid`.
pub fn scopes_linking(ctx: &GpoContext, guid: &PolicyGuid) -> AppResult<Vec<ScopeObject>> {
    let filter = Filter::like("gPLink", format!("*{}*", guid));
    let mut seen = HashSet::new();
    let mut scopes = Vec::new();

    for (base, scope) in [
        (ctx.domain.domain_dn.clone(), SearchScope::Subtree),
        (ctx.domain.sites_dn(), SearchScope::OneLevel),
    ] {
        for entry in ctx
            .directory
            .search(&base, &filter, ScopeObject::ATTRIBUTES, scope)?
        {
            if seen.insert(entry.dn.to_lowercase()) {
                scopes.push(ScopeObject::from_entry(&entry));
            }
        }
    }
    Ok(scopes)
}

/// Prepend a link to `guid` on `scope_dn`. Fails with `AlreadyLinked` if the
/// scope already references it.
pub fn link_policy(ctx: &GpoContext, scope_dn: &str, guid: &PolicyGuid) -> AppResult<String> {
    let scope = read_scope(ctx, scope_dn)?;
    let value = insert_link(
        scope.gp_link.as_deref(),
        &scope.distinguished_name,
        &ctx.domain.policies_dn(),
        guid,
    )?;
    ctx.directory
        .modify(scope_dn, &[AttributeChange::replace("gPLink", value.as_str())])?;
    tracing::info!(scope = scope_dn, guid = %guid, "Linked policy");
    Ok(value)
}

/// Drop every link to `guid` from `scope_dn`, clearing the attribute when
/// nothing is left. Fails with `NotLinked` if there was no link.
pub fn unlink_policy(ctx: &GpoContext, scope_dn: &str, guid: &PolicyGuid) -> AppResult<LinkUpdate> {
    let scope = read_scope(ctx, scope_dn)?;
    let update = remove_link(scope.gp_link.as_deref(), &scope.distinguished_name, guid)?;
    let change = match &update {
        LinkUpdate::Set(value) => AttributeChange::replace("gPLink", value.as_str()),
        LinkUpdate::Clear => AttributeChange::clear("gPLink"),
    };
    ctx.directory.modify(scope_dn, &[change])?;
    tracing::info!(scope = scope_dn, guid = %guid, "Unlinked policy");
    Ok(update)
}
