//! SYSVOL share access
//!
//! Folders and files go through `std::fs` on the UNC path, ACLs through
//! `Get-Acl`/`Set-Acl`.

use super::backend::SysvolStore;
use super::powershell::{quote, PowerShell};
use crate::domain::FileSecurity;
use crate::error::{AppError, AppResult};
use std::path::Path;

pub struct SysvolShare {
    shell: PowerShell,
}

impl SysvolShare {
    pub fn new(shell: PowerShell) -> Self {
        Self { shell }
    }
}

fn io_fault(action: &str, path: &str, e: std::io::Error) -> AppError {
    AppError::FileSystemError(format!("{} {}: {}", action, path, e))
}

impl SysvolStore for SysvolShare {
    fn exists(&self, path: &str) -> AppResult<bool> {
        Ok(Path::new(path).exists())
    }

    fn create_dir_all(&self, path: &str) -> AppResult<()> {
        tracing::debug!(path, "Creating SYSVOL directory");
        std::fs::create_dir_all(path).map_err(|e| io_fault("cannot create", path, e))
    }

    fn remove_dir_all(&self, path: &str) -> AppResult<()> {
        tracing::debug!(path, "Removing SYSVOL directory");
        std::fs::remove_dir_all(path).map_err(|e| io_fault("cannot remove", path, e))
    }

    fn write_file(&self, path: &str, contents: &str) -> AppResult<()> {
        std::fs::write(path, contents).map_err(|e| io_fault("cannot write", path, e))
    }

    fn read_security(&self, path: &str) -> AppResult<FileSecurity> {
        let script = format!(
            r#"
$acl = Get-Acl -LiteralPath {path}
$sidType = [System.Security.Principal.SecurityIdentifier]
$rules = foreach ($r in $acl.GetAccessRules($true, $false, $sidType)) {{
    [pscustomobject]@{{
        principal = $r.IdentityReference.Value
        rights = ([int64]$r.FileSystemRights.value__) -band 4294967295
        inheritance = [int]$r.InheritanceFlags
        propagation = [int]$r.PropagationFlags
        access = [string]$r.AccessControlType
    }}
}}
$owner = $acl.GetOwner($sidType)
$group = $acl.GetGroup($sidType)
ConvertTo-Json -Compress -Depth 4 -InputObject ([pscustomobject]@{{
    owner = if ($owner) {{ $owner.Value }} else {{ $null }}
    group = if ($group) {{ $group.Value }} else {{ $null }}
    protected = $acl.AreAccessRulesProtected
    rules = @($rules)
}})
"#,
            path = quote(path)
        );
        self.shell.run_json(&script, AppError::FileSystemError)
    }

    fn write_security(&self, path: &str, security: &FileSecurity) -> AppResult<()> {
        let descriptor = serde_json::to_string(security)?;
        tracing::debug!(path, rules = security.rules.len(), "Writing SYSVOL ACL");
        let script = format!(
            r#"
$descriptor = ConvertFrom-Json {descriptor}
$acl = New-Object System.Security.AccessControl.DirectorySecurity
$acl.SetAccessRuleProtection([bool]$descriptor.protected, $false)
if ($descriptor.owner) {{ $acl.SetOwner((New-Object System.Security.Principal.SecurityIdentifier($descriptor.owner))) }}
if ($descriptor.group) {{ $acl.SetGroup((New-Object System.Security.Principal.SecurityIdentifier($descriptor.group))) }}
foreach ($r in $descriptor.rules) {{
    $acl.AddAccessRule((New-Object System.Security.AccessControl.FileSystemAccessRule(
        (New-Object System.Security.Principal.SecurityIdentifier($r.principal)),
        [System.Security.AccessControl.FileSystemRights][int]$r.rights,
        [System.Security.AccessControl.InheritanceFlags][int]$r.inheritance,
        [System.Security.AccessControl.PropagationFlags][int]$r.propagation,
        [System.Security.AccessControl.AccessControlType]$r.access)))
}}
Set-Acl -LiteralPath {path} -AclObject $acl
"#,
            descriptor = quote(&descriptor),
            path = quote(path),
        );
        self.shell.run(&script, AppError::FileSystemError).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_tree_operations() {
        let dir = tempfile::tempdir().unwrap();
        let share = SysvolShare::new(PowerShell::default());
        let root = dir.path().join("Policies").join("{A}");
        let root = root.to_string_lossy().to_string();

        share.create_dir_all(&root).unwrap();
        assert!(share.exists(&root).unwrap());
        let ini = Path::new(&root).join("GPT.ini").to_string_lossy().to_string();
        share.write_file(&ini, "[General]\r\nVersion=0\r\n").unwrap();
        assert_eq!(std::fs::read_to_string(&ini).unwrap(), "[General]\r\nVersion=0\r\n");

        share.remove_dir_all(&root).unwrap();
        assert!(!share.exists(&root).unwrap());
        assert!(matches!(
            share.remove_dir_all(&root),
            Err(AppError::FileSystemError(_))
        ));
    }
}
