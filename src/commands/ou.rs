//! Organizational units and object moves

use std::fmt;

use clap::Args;
use serde::Serialize;

use super::action::{Action, ActionContext};
use crate::domain::OrganizationalUnit;
use crate::error::{AppError, AppResult};
use crate::infrastructure::{
    create_ou, find_ous, get_ou, move_object, remove_ou, resolve_ou_by_name, CreatedOu,
    MovedObject,
};

/// List OUs by name
#[derive(Args, Debug, Clone)]
pub struct GetOu {
    /// OU name; `*` matches any run of characters
    #[arg(long, default_value = "*")]
    pub ou_name: String,
}

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct OuList(pub Vec<OrganizationalUnit>);

impl Action for GetOu {
    type Output = OuList;

    fn execute(&self, ctx: &ActionContext) -> AppResult<Self::Output> {
        Ok(OuList(find_ous(&ctx.gpo, &self.ou_name)?))
    }
}

impl fmt::Display for OrganizationalUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Name              : {}", self.name)?;
        writeln!(f, "DistinguishedName : {}", self.distinguished_name)?;
        write!(f, "Description       : {}", self.description.as_deref().unwrap_or(""))
    }
}

impl fmt::Display for OuList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "No OUs found");
        }
        for (i, ou) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "\n\n")?;
            }
            write!(f, "{}", ou)?;
        }
        Ok(())
    }
}

/// Create an OU
#[derive(Args, Debug, Clone)]
pub struct NewOu {
    /// Name of the new OU
    #[arg(long)]
    pub ou_name: String,

    /// Parent container; defaults to the domain root
    #[arg(long)]
    pub base_dn: Option<String>,
}

impl Action for NewOu {
    type Output = CreatedOu;

    fn execute(&self, ctx: &ActionContext) -> AppResult<Self::Output> {
        create_ou(
            &ctx.gpo,
            &self.ou_name,
            self.base_dn.as_deref(),
            ctx.acting_user.as_deref(),
        )
    }
}

impl fmt::Display for CreatedOu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Created OU {}", self.ou.distinguished_name)?;
        match &self.granted_to {
            Some(sid) => write!(f, "\nFull control granted to {}", sid),
            None => write!(f, "\nWARNING: acting user not found; no full-control grant was added"),
        }
    }
}

/// Delete an OU and everything in it
#[derive(Args, Debug, Clone)]
pub struct RemoveOu {
    /// Distinguished name of the OU
    #[arg(long)]
    pub dn: Option<String>,

    /// Name of the OU; must be unique
    #[arg(long)]
    pub ou_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovedOu {
    pub removed: OrganizationalUnit,
}

impl Action for RemoveOu {
    type Output = RemovedOu;

    fn execute(&self, ctx: &ActionContext) -> AppResult<Self::Output> {
        let ou = match (self.dn.as_deref(), self.ou_name.as_deref()) {
            (Some(dn), _) => get_ou(&ctx.gpo, dn)?,
            (None, Some(name)) => resolve_ou_by_name(&ctx.gpo, name)?,
            (None, None) => {
                return Err(AppError::InvalidArgument(
                    "an OU distinguished name or name is required".to_string(),
                ))
            }
        };
        remove_ou(&ctx.gpo, &ou)?;
        Ok(RemovedOu { removed: ou })
    }
}

impl fmt::Display for RemovedOu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Removed OU {}", self.removed.distinguished_name)
    }
}

/// Move a directory object under a new parent
#[derive(Args, Debug, Clone)]
pub struct MoveObject {
    /// Distinguished name of the object to move
    #[arg(long)]
    pub src_dn: String,

    /// Distinguished name of the new parent
    #[arg(long)]
    pub dst_dn: String,
}

impl Action for MoveObject {
    type Output = MovedObject;

    fn execute(&self, ctx: &ActionContext) -> AppResult<Self::Output> {
        move_object(&ctx.gpo, &self.src_dn, &self.dst_dn)
    }
}

impl fmt::Display for MovedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Moved {} to {}", self.from, self.to)
    }
}
