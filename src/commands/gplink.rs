//! GPO links on domains, OUs and sites

use std::fmt;

use clap::Args;
use serde::Serialize;

use super::action::{Action, ActionContext};
use super::selectors::PolicyArgs;
use crate::domain::{LinkUpdate, PolicyObject, ScopeObject};
use crate::error::AppResult;
use crate::infrastructure::{
    all_scope_links, link_policy, links_for_scope, resolve_policy, scopes_linking, unlink_policy,
    ScopeLinks,
};

/// Show links on one scope, the scopes linking one GPO, or everything
#[derive(Args, Debug, Clone)]
pub struct GetGpLink {
    /// Distinguished name of a domain, OU or site
    #[arg(long)]
    pub dn: Option<String>,

    #[command(flatten)]
    pub policy: PolicyArgs,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum LinkListing {
    Scopes(Vec<ScopeLinks>),
    #[serde(rename_all = "camelCase")]
    LinkedFrom {
        policy: PolicyObject,
        scopes: Vec<ScopeObject>,
    },
}

impl Action for GetGpLink {
    type Output = LinkListing;

    fn execute(&self, ctx: &ActionContext) -> AppResult<Self::Output> {
        if let Some(dn) = self.dn.as_deref() {
            return Ok(LinkListing::Scopes(vec![links_for_scope(&ctx.gpo, dn)?]));
        }
        if self.policy.is_empty() {
            return Ok(LinkListing::Scopes(all_scope_links(&ctx.gpo)?));
        }
        let policy = resolve_policy(&ctx.gpo, &self.policy.reference()?)?;
        let scopes = scopes_linking(&ctx.gpo, &policy.guid)?;
        Ok(LinkListing::LinkedFrom { policy, scopes })
    }
}

impl fmt::Display for ScopeLinks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.scope.distinguished_name)?;
        if self.links.is_empty() {
            return write!(f, "\n  (no links)");
        }
        for link in &self.links {
            write!(
                f,
                "\n  {} {}  enabled={} enforced={}",
                link.guid, link.display_name, link.enabled, link.enforced
            )?;
        }
        Ok(())
    }
}

impl fmt::Display for LinkListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkListing::Scopes(scopes) => {
                for (i, scope) in scopes.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}", scope)?;
                }
                Ok(())
            }
            LinkListing::LinkedFrom { policy, scopes } => {
                write!(f, "{} {}", policy.guid, policy.display_name)?;
                if scopes.is_empty() {
                    return write!(f, "\n  (not linked)");
                }
                for scope in scopes {
                    write!(f, "\n  linked to {}", scope.distinguished_name)?;
                }
                Ok(())
            }
        }
    }
}

/// Link a GPO to a scope
#[derive(Args, Debug, Clone)]
pub struct NewGpLink {
    #[command(flatten)]
    pub policy: PolicyArgs,

    /// Distinguished name of the domain, OU or site
    #[arg(long)]
    pub dn: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkChange {
    pub scope: String,
    pub guid: String,
    pub display_name: String,
    pub linked: bool,
    /// `gPLink` after the change; `None` once the attribute is cleared.
    pub gp_link: Option<String>,
}

impl Action for NewGpLink {
    type Output = LinkChange;

    fn execute(&self, ctx: &ActionContext) -> AppResult<Self::Output> {
        let policy = resolve_policy(&ctx.gpo, &self.policy.reference()?)?;
        let value = link_policy(&ctx.gpo, &self.dn, &policy.guid)?;
        Ok(LinkChange {
            scope: self.dn.clone(),
            guid: policy.guid.to_string(),
            display_name: policy.display_name,
            linked: true,
            gp_link: Some(value),
        })
    }
}

/// Remove a GPO link from a scope
#[derive(Args, Debug, Clone)]
pub struct RemoveGpLink {
    #[command(flatten)]
    pub policy: PolicyArgs,

    /// Distinguished name of the domain, OU or site
    #[arg(long)]
    pub dn: String,
}

impl Action for RemoveGpLink {
    type Output = LinkChange;

    fn execute(&self, ctx: &ActionContext) -> AppResult<Self::Output> {
        let policy = resolve_policy(&ctx.gpo, &self.policy.reference()?)?;
        let gp_link = match unlink_policy(&ctx.gpo, &self.dn, &policy.guid)? {
            LinkUpdate::Set(value) => Some(value),
            LinkUpdate::Clear => None,
        };
        Ok(LinkChange {
            scope: self.dn.clone(),
            guid: policy.guid.to_string(),
            display_name: policy.display_name,
            linked: false,
            gp_link,
        })
    }
}

impl fmt::Display for LinkChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = if self.linked { "Linked" } else { "Unlinked" };
        let preposition = if self.linked { "to" } else { "from" };
        write!(
            f,
            "{} GPO '{}' {} {} {}",
            verb, self.display_name, self.guid, preposition, self.scope
        )
    }
}
