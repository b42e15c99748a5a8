//! Security filtering
//!
//! A policy applies to whoever holds the Apply Group Policy extended right
//! on its container. New policies grant it to Authenticated Users; filtering
//! replaces that grant with explicit principals. Each descriptor commit is
//! followed by a SYSVOL ACL refresh.

use super::context::GpoContext;
use super::gpo_management::mirror_sysvol_acl;
use crate::domain::{
    AccessControlType, DirectoryAccessRule, DirectoryRights, PolicyObject, Sid,
    UnmappedPermission,
};
use crate::error::{AppResult, StepContext};
use serde::Serialize;

/// A principal the policy applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteringEntry {
    pub sid: Sid,
    pub account: String,
    pub rights: DirectoryRights,
    pub access: AccessControlType,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteringChange {
    pub guid: String,
    pub principal: Sid,
    /// False when the principal held no apply right to remove.
    pub changed: bool,
    pub unmapped: Vec<UnmappedPermission>,
}

/// Explicit entries that include the extended right.
pub fn get_security_filtering(ctx: &GpoContext, policy: &PolicyObject) -> AppResult<Vec<FilteringEntry>> {
    let security = ctx.directory.read_security(&policy.distinguished_name)?;
    let identities = ctx.identities();
    security
        .rules
        .iter()
        .filter(|rule| rule.rights.contains(DirectoryRights::EXTENDED_RIGHT))
        .map(|rule| {
            Ok(FilteringEntry {
                account: identities.account_name(&rule.principal)?,
                sid: rule.principal.clone(),
                rights: rule.rights,
                access: rule.access,
            })
        })
        .collect()
}

/// Scope the policy to `sid`: drop the Authenticated Users apply right and
/// grant read, execute and apply to `sid`.
pub fn add_security_filtering(ctx: &GpoContext, policy: &PolicyObject, sid: &Sid) -> AppResult<FilteringChange> {
    let dn = &policy.distinguished_name;
    let mut security = ctx.directory.read_security(dn).step("Read policy descriptor")?;

    security.remove_access_rule(
        &Sid::authenticated_users(),
        AccessControlType::Allow,
        DirectoryRights::EXTENDED_RIGHT,
    );
    security.set_access_rule(DirectoryAccessRule::allow(sid.clone(), DirectoryRights::APPLY_POLICY));

    ctx.directory
        .write_security(dn, &security)
        .step("Commit policy descriptor")?;
    tracing::info!(guid = %policy.guid, sid = %sid, "Added security filtering");

    let unmapped = mirror_sysvol_acl(ctx, dn, &ctx.sysvol_path(policy))?;
    Ok(FilteringChange {
        guid: policy.guid.to_string(),
        principal: sid.clone(),
        changed: true,
        unmapped,
    })
}

/// Take the apply right away from `sid`; its read access stays.
pub fn remove_security_filtering(
    ctx: &GpoContext,
    policy: &PolicyObject,
    sid: &Sid,
) -> AppResult<FilteringChange> {
    let dn = &policy.distinguished_name;
    let mut security = ctx.directory.read_security(dn).step("Read policy descriptor")?;

    let changed = security.remove_access_rule(sid, AccessControlType::Allow, DirectoryRights::EXTENDED_RIGHT);
    if changed {
        ctx.directory
            .write_security(dn, &security)
            .step("Commit policy descriptor")?;
        tracing::info!(guid = %policy.guid, sid = %sid, "Removed security filtering");
    } else {
        tracing::warn!(guid = %policy.guid, sid = %sid, "Principal holds no apply right on this policy");
    }

    let unmapped = mirror_sysvol_acl(ctx, dn, &ctx.sysvol_path(policy))?;
    Ok(FilteringChange {
        guid: policy.guid.to_string(),
        principal: sid.clone(),
        changed,
        unmapped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DomainInfo, FileSystemRights};
    use crate::error::AppError;
    use crate::infrastructure::backend::{DirectoryService, SysvolStore};
    use crate::infrastructure::gpo_management::{create_policy, CreatedPolicy};
    use crate::infrastructure::memory::{MemoryDirectory, MemorySysvol};

    fn stores() -> (MemoryDirectory, MemorySysvol) {
        let domain = DomainInfo::new("x.y", "dc01.x.y");
        (MemoryDirectory::new(&domain).unwrap(), MemorySysvol::new())
    }

    fn apply_rules(dir: &MemoryDirectory, created: &CreatedPolicy, sid: &Sid) -> Vec<DirectoryAccessRule> {
        dir.read_security(&created.policy.distinguished_name)
            .unwrap()
            .rules_for(sid)
            .cloned()
            .collect()
    }

    #[test]
    fn test_add_filtering_scenario() {
        let (dir, sysvol) = stores();
        let alice = dir.add_user("alice");
        let ctx = GpoContext::new(&dir, &sysvol, dir.domain().clone());
        let created = create_policy(&ctx, "Test", false).unwrap();

        let change = add_security_filtering(&ctx, &created.policy, &alice).unwrap();
        assert!(change.unmapped.is_empty());

        let au = apply_rules(&dir, &created, &Sid::authenticated_users());
        assert!(au.iter().all(|r| !r.rights.contains(DirectoryRights::EXTENDED_RIGHT)));
        assert_eq!(au.len(), 1);

        let granted = apply_rules(&dir, &created, &alice);
        assert_eq!(granted.len(), 1);
        assert_eq!(granted[0].rights, DirectoryRights::APPLY_POLICY);
        assert_eq!(granted[0].access, AccessControlType::Allow);

        let acl = sysvol.read_security(&created.sysvol_path).unwrap();
        let mirrored: Vec<_> = acl.rules.iter().filter(|r| r.principal == alice).collect();
        assert_eq!(mirrored.len(), 1);
        assert_eq!(mirrored[0].rights, FileSystemRights::READ_AND_EXECUTE);
    }

    #[test]
    fn test_list_filtering() {
        let (dir, sysvol) = stores();
        let helpdesk = dir.add_group("Helpdesk");
        let ctx = GpoContext::new(&dir, &sysvol, dir.domain().clone());
        let created = create_policy(&ctx, "Test", false).unwrap();

        let before = get_security_filtering(&ctx, &created.policy).unwrap();
        assert_eq!(before.len(), 1);
        assert_eq!(before[0].account, "Authenticated Users");

        add_security_filtering(&ctx, &created.policy, &helpdesk).unwrap();
        let after = get_security_filtering(&ctx, &created.policy).unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].sid, helpdesk);
        assert_eq!(after[0].account, "Helpdesk");
    }

    #[test]
    fn test_remove_filtering_keeps_read() {
        let (dir, sysvol) = stores();
        let alice = dir.add_user("alice");
        let ctx = GpoContext::new(&dir, &sysvol, dir.domain().clone());
        let created = create_policy(&ctx, "Test", false).unwrap();
        add_security_filtering(&ctx, &created.policy, &alice).unwrap();

        let change = remove_security_filtering(&ctx, &created.policy, &alice).unwrap();
        assert!(change.changed);
        let remaining = apply_rules(&dir, &created, &alice);
        assert_eq!(remaining.len(), 1);
        assert_eq!(
            remaining[0].rights,
            DirectoryRights::READ_PROPERTY | DirectoryRights::GENERIC_EXECUTE
        );
        assert!(get_security_filtering(&ctx, &created.policy).unwrap().is_empty());

        let acl = sysvol.read_security(&created.sysvol_path).unwrap();
        assert!(acl
            .rules
            .iter()
            .any(|r| r.principal == alice && r.rights == FileSystemRights::READ_AND_EXECUTE));

        let again = remove_security_filtering(&ctx, &created.policy, &alice).unwrap();
        assert!(!again.changed);
    }

    #[test]
    fn test_commit_failure_skips_refresh() {
        let (dir, sysvol) = stores();
        let alice = dir.add_user("alice");
        let ctx = GpoContext::new(&dir, &sysvol, dir.domain().clone());
        let created = create_policy(&ctx, "Test", false).unwrap();
        let acl_before = sysvol.read_security(&created.sysvol_path).unwrap();
        dir.set_fail_security_writes(true);

        let err = add_security_filtering(&ctx, &created.policy, &alice).unwrap_err();
        assert!(matches!(&err, AppError::StepFailed { step, .. } if step == "Commit policy descriptor"));
        assert_eq!(sysvol.read_security(&created.sysvol_path).unwrap(), acl_before);
    }

    #[test]
    fn test_mirror_failure_is_reported() {
        let (dir, sysvol) = stores();
        let alice = dir.add_user("alice");
        let ctx = GpoContext::new(&dir, &sysvol, dir.domain().clone());
        let created = create_policy(&ctx, "Test", false).unwrap();
        sysvol.set_fail_writes(true);

        let err = add_security_filtering(&ctx, &created.policy, &alice).unwrap_err();
        assert!(matches!(&err, AppError::StepFailed { step, .. } if step == "Apply SYSVOL ACL"));
        assert_eq!(apply_rules(&dir, &created, &alice).len(), 1);
    }

    #[test]
    fn test_unmapped_rights_surface_as_warnings() {
        let (dir, sysvol) = stores();
        let alice = dir.add_user("alice");
        let ctx = GpoContext::new(&dir, &sysvol, dir.domain().clone());
        let created = create_policy(&ctx, "Test", false).unwrap();

        let mut security = dir.read_security(&created.policy.distinguished_name).unwrap();
        security.rules.push(DirectoryAccessRule::allow(
            "S-1-5-21-1-2-3-4000".parse().unwrap(),
            DirectoryRights::WRITE_PROPERTY,
        ));
        dir.write_security(&created.policy.distinguished_name, &security).unwrap();

        let change = add_security_filtering(&ctx, &created.policy, &alice).unwrap();
        assert_eq!(change.unmapped.len(), 1);
        assert_eq!(change.unmapped[0].rights, DirectoryRights::WRITE_PROPERTY);
    }
}
