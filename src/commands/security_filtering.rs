//! Security filtering on GPOs

use std::fmt;

use clap::Args;
use serde::Serialize;

use super::action::{write_unmapped, Action, ActionContext};
use super::selectors::{PolicyArgs, PrincipalArgs};
use crate::error::AppResult;
use crate::infrastructure::{
    add_security_filtering, get_security_filtering, remove_security_filtering, resolve_policy,
    FilteringChange, FilteringEntry, ResolvedPrincipal,
};

/// List the principals a GPO applies to
#[derive(Args, Debug, Clone)]
pub struct GetSecurityFiltering {
    #[command(flatten)]
    pub policy: PolicyArgs,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteringListing {
    pub guid: String,
    pub display_name: String,
    pub entries: Vec<FilteringEntry>,
}

impl Action for GetSecurityFiltering {
    type Output = FilteringListing;

    fn execute(&self, ctx: &ActionContext) -> AppResult<Self::Output> {
        let policy = resolve_policy(&ctx.gpo, &self.policy.reference()?)?;
        let entries = get_security_filtering(&ctx.gpo, &policy)?;
        Ok(FilteringListing {
            guid: policy.guid.to_string(),
            display_name: policy.display_name,
            entries,
        })
    }
}

impl fmt::Display for FilteringListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.guid, self.display_name)?;
        if self.entries.is_empty() {
            return write!(f, "\n  (applies to nobody)");
        }
        for entry in &self.entries {
            write!(
                f,
                "\n  {} {} ({}) rights=0x{:X}",
                entry.access,
                entry.account,
                entry.sid,
                entry.rights.bits()
            )?;
        }
        Ok(())
    }
}

/// Restrict a GPO to a principal
#[derive(Args, Debug, Clone)]
pub struct NewSecurityFiltering {
    #[command(flatten)]
    pub policy: PolicyArgs,

    #[command(flatten)]
    pub principal: PrincipalArgs,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteringOutcome {
    pub display_name: String,
    pub account: ResolvedPrincipal,
    pub added: bool,
    #[serde(flatten)]
    pub change: FilteringChange,
}

impl Action for NewSecurityFiltering {
    type Output = FilteringOutcome;

    fn execute(&self, ctx: &ActionContext) -> AppResult<Self::Output> {
        let policy = resolve_policy(&ctx.gpo, &self.policy.reference()?)?;
        let principal = ctx.gpo.identities().resolve_any(&self.principal.selector())?;
        let change = add_security_filtering(&ctx.gpo, &policy, &principal.sid)?;
        Ok(FilteringOutcome {
            display_name: policy.display_name,
            account: principal,
            added: true,
            change,
        })
    }
}

/// Stop a GPO applying to a principal
#[derive(Args, Debug, Clone)]
pub struct RemoveSecurityFiltering {
    #[command(flatten)]
    pub policy: PolicyArgs,

    #[command(flatten)]
    pub principal: PrincipalArgs,
}

impl Action for RemoveSecurityFiltering {
    type Output = FilteringOutcome;

    fn execute(&self, ctx: &ActionContext) -> AppResult<Self::Output> {
        let policy = resolve_policy(&ctx.gpo, &self.policy.reference()?)?;
        let principal = ctx.gpo.identities().resolve_any(&self.principal.selector())?;
        let change = remove_security_filtering(&ctx.gpo, &policy, &principal.sid)?;
        Ok(FilteringOutcome {
            display_name: policy.display_name,
            account: principal,
            added: false,
            change,
        })
    }
}

impl fmt::Display for FilteringOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let principal = format!("{} {} ({})", self.account.kind, self.account.name, self.account.sid);
        match (self.added, self.change.changed) {
            (true, _) => write!(f, "GPO '{}' {} now applies to {}", self.display_name, self.change.guid, principal)?,
            (false, true) => write!(
                f,
                "GPO '{}' {} no longer applies to {}",
                self.display_name, self.change.guid, principal
            )?,
            (false, false) => write!(
                f,
                "GPO '{}' {} was not filtered to {}; nothing to remove",
                self.display_name, self.change.guid, principal
            )?,
        }
        write_unmapped(f, &self.change.unmapped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DomainInfo;
    use crate::error::AppError;
    use crate::infrastructure::memory::{MemoryDirectory, MemorySysvol};
    use crate::infrastructure::{create_policy, GpoContext};

    fn stores() -> (MemoryDirectory, MemorySysvol) {
        let domain = DomainInfo::new("x.y", "dc01.x.y");
        (MemoryDirectory::new(&domain).unwrap(), MemorySysvol::new())
    }

    fn context<'a>(dir: &'a MemoryDirectory, sysvol: &'a MemorySysvol) -> ActionContext<'a> {
        ActionContext {
            gpo: GpoContext::new(dir, sysvol, dir.domain().clone()),
            acting_user: None,
        }
    }

    fn by_name(name: &str) -> PolicyArgs {
        PolicyArgs {
            gpo_name: Some(name.to_string()),
            guid: None,
        }
    }

    #[test]
    fn test_filter_to_group_then_remove() {
        let (dir, sysvol) = stores();
        let helpdesk = dir.add_group("Helpdesk");
        let ctx = context(&dir, &sysvol);
        create_policy(&ctx.gpo, "Baseline", false).unwrap();
        let principal = PrincipalArgs {
            domain_group: Some("Helpdesk".to_string()),
            ..Default::default()
        };

        let added = NewSecurityFiltering { policy: by_name("Baseline"), principal: principal.clone() }
            .execute(&ctx)
            .unwrap();
        assert_eq!(added.account.sid, helpdesk);
        assert!(added.to_string().contains("now applies to group Helpdesk"));

        let listing = GetSecurityFiltering { policy: by_name("Baseline") }.execute(&ctx).unwrap();
        assert_eq!(listing.entries.len(), 1);
        assert!(listing.to_string().contains("Allow Helpdesk"));

        let removed = RemoveSecurityFiltering { policy: by_name("Baseline"), principal: principal.clone() }
            .execute(&ctx)
            .unwrap();
        assert!(removed.change.changed);
        assert!(removed.to_string().contains("no longer applies"));

        let listing = GetSecurityFiltering { policy: by_name("Baseline") }.execute(&ctx).unwrap();
        assert!(listing.to_string().ends_with("(applies to nobody)"));

        let noop = RemoveSecurityFiltering { policy: by_name("Baseline"), principal }
            .execute(&ctx)
            .unwrap();
        assert!(noop.to_string().contains("nothing to remove"));
    }

    #[test]
    fn test_missing_principal_selector() {
        let (dir, sysvol) = stores();
        let ctx = context(&dir, &sysvol);
        create_policy(&ctx.gpo, "Baseline", false).unwrap();
        let result = NewSecurityFiltering {
            policy: by_name("Baseline"),
            principal: PrincipalArgs::default(),
        }
        .execute(&ctx);
        assert!(matches!(result, Err(AppError::MissingSelector(_))));
    }

    #[test]
    fn test_outcome_serializes_flat() {
        let (dir, sysvol) = stores();
        dir.add_user("alice");
        let ctx = context(&dir, &sysvol);
        create_policy(&ctx.gpo, "Baseline", false).unwrap();
        let outcome = NewSecurityFiltering {
            policy: by_name("Baseline"),
            principal: PrincipalArgs {
                domain_user: Some("alice".to_string()),
                domain_group: Some("Helpdesk".to_string()),
                ..Default::default()
            },
        }
        .execute(&ctx)
        .unwrap();

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["displayName"], "Baseline");
        assert_eq!(json["account"]["kind"], "User");
        assert_eq!(json["principal"], json["account"]["sid"]);
        assert_eq!(json["changed"], true);
        assert!(json["unmapped"].as_array().unwrap().is_empty());
    }
}
