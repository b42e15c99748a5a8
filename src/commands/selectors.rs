//! Argument groups shared by several actions

use clap::Args;

use crate::error::AppResult;
use crate::infrastructure::{PolicyRef, PrincipalSelector};

/// Names a policy by GUID or display name; the GUID wins when both are given.
#[derive(Args, Debug, Clone, Default)]
pub struct PolicyArgs {
    /// Display name of the GPO
    #[arg(long)]
    pub gpo_name: Option<String>,

    /// GUID of the GPO, with or without braces
    #[arg(long)]
    pub guid: Option<String>,
}

impl PolicyArgs {
    pub fn reference(&self) -> AppResult<PolicyRef> {
        PolicyRef::from_parts(self.guid.as_deref(), self.gpo_name.as_deref())
    }

    /// Neither option carries a non-blank value.
    pub fn is_empty(&self) -> bool {
        [&self.guid, &self.gpo_name]
            .iter()
            .all(|v| v.as_deref().map_or(true, |v| v.trim().is_empty()))
    }
}

/// Names a principal. When several are given the first of user, computer,
/// group, NT account is used.
#[derive(Args, Debug, Clone, Default)]
pub struct PrincipalArgs {
    /// sAMAccountName of a domain user
    #[arg(long)]
    pub domain_user: Option<String>,

    /// Name of a domain computer (trailing `$` optional)
    #[arg(long)]
    pub domain_computer: Option<String>,

    /// sAMAccountName of a domain group
    #[arg(long)]
    pub domain_group: Option<String>,

    /// Well-known or local account name, or a literal SID
    #[arg(long)]
    pub nt_account: Option<String>,
}

impl PrincipalArgs {
    pub fn selector(&self) -> PrincipalSelector {
        PrincipalSelector {
            user: self.domain_user.clone(),
            computer: self.domain_computer.clone(),
            group: self.domain_group.clone(),
            platform_account: self.nt_account.clone(),
        }
    }
}
