//! CLI actions
//!
//! Each action is a clap argument struct that runs against an
//! [`ActionContext`] and returns a report printable as text or JSON.

pub mod action;
pub mod gpo;
pub mod gplink;
pub mod ou;
pub mod security_filtering;
pub mod selectors;

pub use action::{Action, ActionContext};
pub use selectors::{PolicyArgs, PrincipalArgs};

crate::action_enum! {
    /// List GPOs by display name or GUID
    (GetGpo, gpo::GetGpo),
    /// Create a GPO
    (NewGpo, gpo::NewGpo),
    /// Unlink a GPO everywhere and delete it
    (RemoveGpo, gpo::RemoveGpo),
    /// Show GPO links on a scope, for a GPO, or everywhere
    (GetGpLink, gplink::GetGpLink),
    /// Link a GPO to a domain, OU or site
    (NewGpLink, gplink::NewGpLink),
    /// Remove a GPO link
    (RemoveGpLink, gplink::RemoveGpLink),
    /// List the principals a GPO applies to
    (GetSecurityFiltering, security_filtering::GetSecurityFiltering),
    /// Restrict a GPO to a principal
    (NewSecurityFiltering, security_filtering::NewSecurityFiltering),
    /// Stop a GPO applying to a principal
    (RemoveSecurityFiltering, security_filtering::RemoveSecurityFiltering),
    /// List OUs by name
    (GetOu, ou::GetOu),
    /// Create an OU
    (NewOu, ou::NewOu),
    /// Delete an OU and its contents
    (RemoveOu, ou::RemoveOu),
    /// Move a directory object under a new parent
    (MoveObject, ou::MoveObject),
}
