//! GPO lookup, creation and removal

use std::fmt;

use clap::Args;
use serde::Serialize;

use super::action::{write_unmapped, Action, ActionContext};
use super::selectors::PolicyArgs;
use crate::domain::PolicyObject;
use crate::error::AppResult;
use crate::infrastructure::{
    create_policy, find_policies, remove_policy, resolve_policy, CreatedPolicy, PolicyRef,
    RemovalReport,
};

/// List GPOs by display name or look one up by GUID
#[derive(Args, Debug, Clone)]
pub struct GetGpo {
    /// Display name; `*` matches any run of characters
    #[arg(long, default_value = "*")]
    pub gpo_name: String,

    /// GUID of a single GPO
    #[arg(long)]
    pub guid: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct PolicyList(pub Vec<PolicyObject>);

impl Action for GetGpo {
    type Output = PolicyList;

    fn execute(&self, ctx: &ActionContext) -> AppResult<Self::Output> {
        let policies = match self.guid.as_deref() {
            Some(guid) => {
                let reference = PolicyRef::from_parts(Some(guid), None)?;
                vec![resolve_policy(&ctx.gpo, &reference)?]
            }
            None => find_policies(&ctx.gpo, &self.gpo_name)?,
        };
        Ok(PolicyList(policies))
    }
}

impl fmt::Display for PolicyList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "No GPOs found");
        }
        for (i, policy) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
                writeln!(f)?;
            }
            writeln!(f, "DisplayName : {}", policy.display_name)?;
            writeln!(f, "GUID        : {}", policy.guid)?;
            writeln!(f, "Path        : {}", policy.file_sys_path.as_deref().unwrap_or(""))?;
            write!(f, "Version     : {}", policy.version)?;
        }
        Ok(())
    }
}

/// Create a GPO
#[derive(Args, Debug, Clone)]
pub struct NewGpo {
    /// Display name of the new GPO
    #[arg(long)]
    pub gpo_name: String,

    /// Create even if a GPO with this name already exists
    #[arg(long)]
    pub force: bool,
}

impl Action for NewGpo {
    type Output = CreatedPolicy;

    fn execute(&self, ctx: &ActionContext) -> AppResult<Self::Output> {
        create_policy(&ctx.gpo, &self.gpo_name, self.force)
    }
}

impl fmt::Display for CreatedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Created GPO '{}' {}\nSYSVOL: {}",
            self.policy.display_name, self.policy.guid, self.sysvol_path
        )?;
        write_unmapped(f, &self.unmapped)
    }
}

/// Unlink a GPO everywhere and delete it
#[derive(Args, Debug, Clone)]
pub struct RemoveGpo {
    #[command(flatten)]
    pub policy: PolicyArgs,
}

impl Action for RemoveGpo {
    type Output = RemovalReport;

    fn execute(&self, ctx: &ActionContext) -> AppResult<Self::Output> {
        let policy = resolve_policy(&ctx.gpo, &self.policy.reference()?)?;
        remove_policy(&ctx.gpo, &policy)
    }
}

impl fmt::Display for RemovalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Removed GPO '{}' {}", self.display_name, self.guid)?;
        for scope in &self.unlinked_from {
            write!(f, "\n  unlinked from {}", scope)?;
        }
        if !self.sysvol_removed {
            write!(f, "\n  SYSVOL folder was already absent")?;
        }
        Ok(())
    }
}
