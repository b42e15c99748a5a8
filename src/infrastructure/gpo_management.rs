//! Group Policy Object lifecycle
//!
//! A policy lives twice: as a `groupPolicyContainer` under
//! `CN=Policies,CN=System` and as a folder on SYSVOL, both keyed by the same
//! GUID. Creation and removal touch both stores in a fixed order with no
//! transaction around them; a failure part-way leaves whatever was already
//! written and reports the step that failed.

use super::backend::{join_path, AttributeChange};
use super::context::GpoContext;
use super::gp_link::{scopes_linking, unlink_policy};
use crate::domain::{Filter, PolicyGuid, PolicyObject, SearchScope, UnmappedPermission};
use crate::error::{AppError, AppResult, StepContext};
use serde::Serialize;

pub const GPT_INI: &str = "GPT.ini";
pub const GPT_INI_CONTENTS: &str = "[General]\r\nVersion=0\r\n";
const FUNCTIONALITY_VERSION: &str = "2";
const SCOPE_CONTAINERS: [&str; 2] = ["Machine", "User"];

/// How a caller names a policy. The GUID wins when both are given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyRef {
    Guid(PolicyGuid),
    Name(String),
}

impl PolicyRef {
    pub fn from_parts(guid: Option<&str>, name: Option<&str>) -> AppResult<Self> {
        fn non_blank(v: Option<&str>) -> Option<&str> {
            v.map(str::trim).filter(|v| !v.is_empty())
        }
        match (non_blank(guid), non_blank(name)) {
            (Some(guid), _) => Ok(PolicyRef::Guid(PolicyGuid::canonical(guid))),
            (None, Some(name)) => Ok(PolicyRef::Name(name.to_string())),
            (None, None) => Err(AppError::InvalidArgument(
                "a policy GUID or display name is required".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedPolicy {
    pub policy: PolicyObject,
    pub sysvol_path: String,
    pub unmapped: Vec<UnmappedPermission>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovalReport {
    pub guid: String,
    pub display_name: String,
    pub unlinked_from: Vec<String>,
    pub directory_removed: bool,
    pub sysvol_removed: bool,
}

/// Policies whose display name matches `pattern` (`*` wildcards allowed).
pub fn find_policies(ctx: &GpoContext, pattern: &str) -> AppResult<Vec<PolicyObject>> {
    search_policies(ctx, Filter::like("displayName", pattern))
}

/// Policies whose display name is exactly `name`, ignoring case.
pub fn find_policies_named(ctx: &GpoContext, name: &str) -> AppResult<Vec<PolicyObject>> {
    search_policies(ctx, Filter::eq("displayName", name))
}

pub fn find_policy(ctx: &GpoContext, guid: &PolicyGuid) -> AppResult<Option<PolicyObject>> {
    Ok(search_policies(ctx, Filter::eq("cn", guid.as_str()))?.into_iter().next())
}

fn search_policies(ctx: &GpoContext, filter: Filter) -> AppResult<Vec<PolicyObject>> {
    let filter = Filter::and([Filter::eq("objectClass", "groupPolicyContainer"), filter]);
    let entries = ctx.directory.search(
        &ctx.domain.policies_dn(),
        &filter,
        PolicyObject::ATTRIBUTES,
        SearchScope::OneLevel,
    )?;
    Ok(entries.iter().map(PolicyObject::from_entry).collect())
}

/// Exactly one policy, or `ObjectNotFound` / `AmbiguousName`.
pub fn resolve_policy(ctx: &GpoContext, reference: &PolicyRef) -> AppResult<PolicyObject> {
    match reference {
        PolicyRef::Guid(guid) => find_policy(ctx, guid)?
            .ok_or_else(|| AppError::ObjectNotFound(format!("policy {}", guid))),
        PolicyRef::Name(name) => {
            let mut matches = find_policies_named(ctx, name)?;
            match matches.len() {
                0 => Err(AppError::ObjectNotFound(format!("policy '{}'", name))),
                1 => Ok(matches.remove(0)),
                count => Err(AppError::AmbiguousName {
                    name: name.clone(),
                    count,
                }),
            }
        }
    }
}

/// Create a policy in the directory and on SYSVOL.
///
/// A second policy with an existing display name is refused unless `force`.
pub fn create_policy(ctx: &GpoContext, display_name: &str, force: bool) -> AppResult<CreatedPolicy> {
    let display_name = display_name.trim();
    if display_name.is_empty() {
        return Err(AppError::InvalidArgument("policy name is empty".to_string()));
    }
    if !force && !find_policies_named(ctx, display_name)?.is_empty() {
        return Err(AppError::AlreadyExists(format!("policy '{}'", display_name)));
    }

    let guid = PolicyGuid::generate();
    let sysvol_path = ctx.domain.sysvol_policy_path(&guid);
    tracing::info!(guid = %guid, name = display_name, "Creating policy");

    let dn = ctx
        .directory
        .create_entry(
            &ctx.domain.policies_dn(),
            &format!("CN={}", guid),
            "groupPolicyContainer",
            &[AttributeChange::replace("displayName", display_name)],
        )
        .step("Create policy container")?;
    for container in SCOPE_CONTAINERS {
        ctx.directory
            .create_entry(&dn, &format!("CN={}", container), "container", &[])
            .step(&format!("Create {} container", container))?;
    }

    ctx.sysvol
        .create_dir_all(&sysvol_path)
        .step("Create SYSVOL folder")?;
    for container in SCOPE_CONTAINERS {
        ctx.sysvol
            .create_dir_all(&join_path(&sysvol_path, container))
            .step(&format!("Create SYSVOL {} folder", container))?;
    }
    ctx.sysvol
        .write_file(&join_path(&sysvol_path, GPT_INI), GPT_INI_CONTENTS)
        .step("Write GPT.ini")?;

    let unmapped = mirror_sysvol_acl(ctx, &dn, &sysvol_path)?;

    ctx.directory
        .modify(
            &dn,
            &[
                AttributeChange::replace("flags", "0"),
                AttributeChange::replace("gPCFileSysPath", sysvol_path.as_str()),
                AttributeChange::replace("versionNumber", "0"),
                AttributeChange::replace("gPCFunctionalityVersion", FUNCTIONALITY_VERSION),
            ],
        )
        .step("Set policy attributes")?;

    tracing::info!(guid = %guid, dn = %dn, "Policy created");
    Ok(CreatedPolicy {
        policy: PolicyObject {
            guid,
            display_name: display_name.to_string(),
            distinguished_name: dn,
            file_sys_path: Some(sysvol_path.clone()),
            version: 0,
            flags: 0,
            functionality_version: Some(2),
        },
        sysvol_path,
        unmapped,
    })
}

/// Make the SYSVOL folder's ACL match the policy container's descriptor.
///
/// Runs after every descriptor commit; permissions without a file-system
/// equivalent are returned rather than failing the refresh.
pub fn mirror_sysvol_acl(
    ctx: &GpoContext,
    policy_dn: &str,
    sysvol_path: &str,
) -> AppResult<Vec<UnmappedPermission>> {
    let source = ctx
        .directory
        .read_security(policy_dn)
        .step("Read policy descriptor")?;
    let translation = ctx.translator.translate(&source);
    ctx.sysvol
        .write_security(sysvol_path, &translation.security)
        .step("Apply SYSVOL ACL")?;
    tracing::debug!(
        path = sysvol_path,
        rules = translation.security.rules.len(),
        unmapped = translation.unmapped.len(),
        "SYSVOL ACL refreshed"
    );
    Ok(translation.unmapped)
}

/// Unlink everywhere, delete the container, delete the SYSVOL folder.
///
/// A failure while unlinking stops before anything is deleted. The two
/// deletions are attempted independently; the first failure is returned
/// after both have run.
pub fn remove_policy(ctx: &GpoContext, policy: &PolicyObject) -> AppResult<RemovalReport> {
    let guid = &policy.guid;
    let mut report = RemovalReport {
        guid: guid.to_string(),
        display_name: policy.display_name.clone(),
        ..Default::default()
    };
    tracing::info!(guid = %guid, name = %policy.display_name, "Removing policy");

    let scopes = scopes_linking(ctx, guid).step("Find linked scopes")?;
    for scope in scopes {
        let dn = scope.distinguished_name;
        unlink_policy(ctx, &dn, guid).step(&format!("Remove link from {}", dn))?;
        report.unlinked_from.push(dn);
    }

    let mut first_failure = None;

    match ctx
        .directory
        .delete_tree(&policy.distinguished_name)
        .step("Delete policy container")
    {
        Ok(()) => report.directory_removed = true,
        Err(e) => {
            tracing::error!(guid = %guid, error = %e, "Policy container not removed");
            first_failure = Some(e);
        }
    }

    let sysvol_path = ctx.sysvol_path(policy);
    let sysvol_result = ctx.sysvol.exists(&sysvol_path).and_then(|exists| {
        if exists {
            ctx.sysvol.remove_dir_all(&sysvol_path).map(|_| true)
        } else {
            tracing::warn!(path = %sysvol_path, "SYSVOL folder already absent");
            Ok(false)
        }
    });
    match sysvol_result.step("Delete SYSVOL folder") {
        Ok(removed) => report.sysvol_removed = removed,
        Err(e) => {
            tracing::error!(guid = %guid, error = %e, "SYSVOL folder not removed");
            first_failure.get_or_insert(e);
        }
    }

    match first_failure {
        Some(e) => Err(e),
        None => {
            tracing::info!(guid = %guid, unlinked = report.unlinked_from.len(), "Policy removed");
            Ok(report)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DomainInfo, FileSystemRights, Sid};
    use crate::infrastructure::backend::{DirectoryService, SysvolStore};
    use crate::infrastructure::gp_link::{link_policy, links_for_scope};
    use crate::infrastructure::memory::{MemoryDirectory, MemorySysvol};

    fn stores() -> (MemoryDirectory, MemorySysvol) {
        let domain = DomainInfo::new("x.y", "dc01.x.y");
        (MemoryDirectory::new(&domain).unwrap(), MemorySysvol::new())
    }

    #[test]
    fn test_create_policy_in_both_stores() {
        let (dir, sysvol) = stores();
        let ctx = GpoContext::new(&dir, &sysvol, dir.domain().clone());

        let created = create_policy(&ctx, "Test", false).unwrap();
        let guid = &created.policy.guid;
        let dn = ctx.policy_dn(guid);
        assert!(dir.exists(&dn));
        assert!(dir.exists(&format!("CN=Machine,{}", dn)));
        assert!(dir.exists(&format!("CN=User,{}", dn)));

        let root = format!(r"\\dc01.x.y\SYSVOL\x.y\Policies\{}", guid);
        assert_eq!(created.sysvol_path, root);
        assert!(sysvol.is_dir(&join_path(&root, "Machine")));
        assert!(sysvol.is_dir(&join_path(&root, "User")));
        assert_eq!(
            sysvol.contents(&join_path(&root, "GPT.ini")).as_deref(),
            Some("[General]\r\nVersion=0\r\n")
        );

        let entry = dir.entry(&dn).unwrap();
        assert_eq!(entry.get("displayName").unwrap(), "Test");
        assert_eq!(entry.get("flags").unwrap(), "0");
        assert_eq!(entry.get("versionNumber").unwrap(), "0");
        assert_eq!(entry.get("gPCFunctionalityVersion").unwrap(), "2");
        assert_eq!(entry.get("gPCFileSysPath").unwrap(), &root);
        assert!(created.unmapped.is_empty());
    }

    #[test]
    fn test_new_policy_acl_mirrors_directory() {
        let (dir, sysvol) = stores();
        let ctx = GpoContext::new(&dir, &sysvol, dir.domain().clone());
        let created = create_policy(&ctx, "Test", false).unwrap();

        let acl = sysvol.read_security(&created.sysvol_path).unwrap();
        assert!(acl.protected);
        assert_eq!(acl.owner, Some(dir.domain_sid().with_rid(512)));
        let au: Vec<_> = acl
            .rules
            .iter()
            .filter(|r| r.principal == Sid::authenticated_users())
            .collect();
        assert_eq!(au.len(), 1);
        assert_eq!(au[0].rights, FileSystemRights::READ_AND_EXECUTE);
        assert!(acl
            .rules
            .iter()
            .any(|r| r.principal == dir.domain_sid().with_rid(512) && r.rights == FileSystemRights::FULL_CONTROL));
    }

    #[test]
    fn test_duplicate_name_needs_force() {
        let (dir, sysvol) = stores();
        let ctx = GpoContext::new(&dir, &sysvol, dir.domain().clone());
        create_policy(&ctx, "Baseline", false).unwrap();
        assert!(matches!(
            create_policy(&ctx, "baseline", false),
            Err(AppError::AlreadyExists(_))
        ));
        create_policy(&ctx, "Baseline", true).unwrap();

        let err = resolve_policy(&ctx, &PolicyRef::Name("Baseline".to_string())).unwrap_err();
        assert!(matches!(err, AppError::AmbiguousName { count: 2, .. }));
    }

    #[test]
    fn test_resolve_policy() {
        let (dir, sysvol) = stores();
        let ctx = GpoContext::new(&dir, &sysvol, dir.domain().clone());
        let created = create_policy(&ctx, "Workstations", false).unwrap();
        let guid = created.policy.guid.clone();

        let bare = guid.as_str().trim_matches(|c| c == '{' || c == '}').to_lowercase();
        let by_guid = PolicyRef::from_parts(Some(&bare), Some("ignored")).unwrap();
        assert_eq!(resolve_policy(&ctx, &by_guid).unwrap().guid, guid);

        let by_name = PolicyRef::from_parts(None, Some("Workstations")).unwrap();
        let policy = resolve_policy(&ctx, &by_name).unwrap();
        assert_eq!(policy.version, 0);
        assert_eq!(policy.functionality_version, Some(2));

        assert!(matches!(
            resolve_policy(&ctx, &PolicyRef::Name("Servers".to_string())),
            Err(AppError::ObjectNotFound(_))
        ));
        assert!(matches!(
            resolve_policy(&ctx, &PolicyRef::Guid(PolicyGuid::canonical("not-a-guid"))),
            Err(AppError::ObjectNotFound(_))
        ));
        assert!(matches!(
            PolicyRef::from_parts(None, Some(" ")),
            Err(AppError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_find_policies_wildcard() {
        let (dir, sysvol) = stores();
        let ctx = GpoContext::new(&dir, &sysvol, dir.domain().clone());
        create_policy(&ctx, "Server Baseline", false).unwrap();
        create_policy(&ctx, "Server Hardening", false).unwrap();
        create_policy(&ctx, "Kiosk", false).unwrap();
        assert_eq!(find_policies(&ctx, "*").unwrap().len(), 3);
        assert_eq!(find_policies(&ctx, "Server*").unwrap().len(), 2);
    }

    #[test]
    fn test_names_and_guids_match_literally() {
        let (dir, sysvol) = stores();
        let ctx = GpoContext::new(&dir, &sysvol, dir.domain().clone());
        create_policy(&ctx, "Server Baseline", false).unwrap();

        let starred = create_policy(&ctx, "Server*", false).unwrap();
        assert_eq!(starred.policy.display_name, "Server*");
        assert!(matches!(
            create_policy(&ctx, "Server*", false),
            Err(AppError::AlreadyExists(_))
        ));

        let by_name = resolve_policy(&ctx, &PolicyRef::Name("Server*".to_string())).unwrap();
        assert_eq!(by_name.guid, starred.policy.guid);
        assert!(matches!(
            resolve_policy(&ctx, &PolicyRef::Name("*".to_string())),
            Err(AppError::ObjectNotFound(_))
        ));

        for wildcard in ["*", "{*}"] {
            let reference = PolicyRef::from_parts(Some(wildcard), None).unwrap();
            assert!(matches!(
                resolve_policy(&ctx, &reference),
                Err(AppError::ObjectNotFound(_))
            ));
        }
    }

    #[test]
    fn test_failed_step_is_named_and_not_rolled_back() {
        let (dir, sysvol) = stores();
        let ctx = GpoContext::new(&dir, &sysvol, dir.domain().clone());
        sysvol.set_fail_writes(true);

        let err = create_policy(&ctx, "Test", false).unwrap_err();
        match &err {
            AppError::StepFailed { step, .. } => assert_eq!(step, "Create SYSVOL folder"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.error_code(), "SYSVOL_ERROR");
        assert_eq!(find_policies(&ctx, "Test").unwrap().len(), 1);
    }

    #[test]
    fn test_remove_linked_policy() {
        let (dir, sysvol) = stores();
        let it = dir.add_ou("IT", "DC=x,DC=y");
        let hr = dir.add_ou("HR", "DC=x,DC=y");
        let ctx = GpoContext::new(&dir, &sysvol, dir.domain().clone());
        let created = create_policy(&ctx, "Test", false).unwrap();
        let guid = created.policy.guid.clone();
        link_policy(&ctx, &it, &guid).unwrap();
        link_policy(&ctx, &hr, &guid).unwrap();

        let report = remove_policy(&ctx, &created.policy).unwrap();
        assert_eq!(report.unlinked_from.len(), 2);
        assert!(report.directory_removed);
        assert!(report.sysvol_removed);

        assert!(links_for_scope(&ctx, &it).unwrap().links.is_empty());
        assert!(dir.entry(&it).unwrap().get("gPLink").is_none());
        assert!(dir.entry(&hr).unwrap().get("gPLink").is_none());
        assert!(!dir.exists(&ctx.policy_dn(&guid)));
        assert!(!sysvol.exists(&created.sysvol_path).unwrap());
    }

    #[test]
    fn test_remove_keeps_other_links() {
        let (dir, sysvol) = stores();
        let it = dir.add_ou("IT", "DC=x,DC=y");
        let ctx = GpoContext::new(&dir, &sysvol, dir.domain().clone());
        let keep = create_policy(&ctx, "Keep", false).unwrap().policy;
        let drop = create_policy(&ctx, "Drop", false).unwrap().policy;
        link_policy(&ctx, &it, &keep.guid).unwrap();
        link_policy(&ctx, &it, &drop.guid).unwrap();

        remove_policy(&ctx, &drop).unwrap();
        let links = links_for_scope(&ctx, &it).unwrap().links;
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].guid, keep.guid);
    }

    #[test]
    fn test_remove_still_cleans_sysvol_when_directory_delete_fails() {
        let (dir, sysvol) = stores();
        let ctx = GpoContext::new(&dir, &sysvol, dir.domain().clone());
        let created = create_policy(&ctx, "Test", false).unwrap();
        dir.set_fail_deletes(true);

        let err = remove_policy(&ctx, &created.policy).unwrap_err();
        assert!(matches!(&err, AppError::StepFailed { step, .. } if step == "Delete policy container"));
        assert!(dir.exists(&created.policy.distinguished_name));
        assert!(!sysvol.exists(&created.sysvol_path).unwrap());
    }

    #[test]
    fn test_remove_tolerates_missing_sysvol_folder() {
        let (dir, sysvol) = stores();
        let ctx = GpoContext::new(&dir, &sysvol, dir.domain().clone());
        let created = create_policy(&ctx, "Test", false).unwrap();
        sysvol.remove_dir_all(&created.sysvol_path).unwrap();

        let report = remove_policy(&ctx, &created.policy).unwrap();
        assert!(report.directory_removed);
        assert!(!report.sysvol_removed);
        let remaining = dir
            .search(
                &dir.domain().policies_dn(),
                &Filter::eq("objectClass", "groupPolicyContainer"),
                &["cn"],
                SearchScope::OneLevel,
            )
            .unwrap();
        assert!(remaining.is_empty());
    }
}
