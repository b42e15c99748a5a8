//! Active Directory connection using Windows ADSI
//!
//! Every directory operation is one PowerShell invocation driving
//! `System.DirectoryServices` against a single bound domain controller.
//! Results come back as JSON.

use super::backend::{AttributeChange, DirectoryService};
use super::powershell::{quote, quote_list, PowerShell};
use crate::config::GpoConfig;
use crate::domain::{DirectoryEntry, DirectorySecurity, DomainInfo, Filter, SearchScope};
use crate::error::{AppError, AppResult};
use serde::Deserialize;

/// Active Directory connection handle
pub struct AdConnection {
    domain: DomainInfo,
    shell: PowerShell,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(not(windows), allow(dead_code))]
struct RootDse {
    default_naming_context: String,
    dns_host_name: Option<String>,
}

impl AdConnection {
    /// Bind to RootDSE and learn the naming context of the domain.
    #[cfg(windows)]
    pub fn connect(config: &GpoConfig) -> AppResult<Self> {
        let shell = PowerShell::new(config.credentials()?);
        let server = config
            .domain_controller
            .as_deref()
            .or(config.domain.as_deref());
        let root_path = match server {
            Some(server) => format!("LDAP://{}/RootDSE", server),
            None => "LDAP://RootDSE".to_string(),
        };

        let script = format!(
            r#"
$root = Open-Entry {path}
$root.RefreshCache()
ConvertTo-Json -Compress -InputObject ([pscustomobject]@{{
    defaultNamingContext = [string]$root.Properties['defaultNamingContext'].Value
    dnsHostName = [string]$root.Properties['dnsHostName'].Value
}})
"#,
            path = quote(&root_path)
        );
        let root: RootDse = shell.run_json(&script, AppError::AuthenticationFailed)?;
        if root.default_naming_context.is_empty() {
            return Err(AppError::NotConnected);
        }

        let dns_root = config
            .domain
            .clone()
            .unwrap_or_else(|| crate::domain::domain_dn_to_dns(&root.default_naming_context));
        let domain_controller = config
            .domain_controller
            .clone()
            .or(root.dns_host_name.filter(|h| !h.is_empty()))
            .unwrap_or_else(|| dns_root.clone());

        let domain = DomainInfo {
            domain_dn: root.default_naming_context,
            dns_root,
            domain_controller,
        };
        tracing::info!(
            domain_dn = %domain.domain_dn,
            domain_controller = %domain.domain_controller,
            "Connected to Active Directory"
        );
        Ok(Self { domain, shell })
    }

    /// Non-Windows fallback - returns error
    #[cfg(not(windows))]
    pub fn connect(_config: &GpoConfig) -> AppResult<Self> {
        Err(AppError::NotConnected)
    }

    pub fn domain(&self) -> &DomainInfo {
        &self.domain
    }

    pub fn shell(&self) -> &PowerShell {
        &self.shell
    }

    fn ldap_path(&self, dn: &str) -> String {
        format!("LDAP://{}/{}", self.domain.domain_controller, dn)
    }

    fn run(&self, script: &str) -> AppResult<()> {
        self.shell.run(script, AppError::LdapError).map(|_| ())
    }
}

impl DirectoryService for AdConnection {
    fn domain_dn(&self) -> &str {
        &self.domain.domain_dn
    }

    fn search(
        &self,
        base_dn: &str,
        filter: &Filter,
        attributes: &[&str],
        scope: SearchScope,
    ) -> AppResult<Vec<DirectoryEntry>> {
        let mut load = vec!["distinguishedName"];
        load.extend_from_slice(attributes);
        let scope = match scope {
            SearchScope::Base => "Base",
            SearchScope::OneLevel => "OneLevel",
            SearchScope::Subtree => "Subtree",
        };

        tracing::debug!(base_dn, filter = %filter, scope, "LDAP search");
        let script = format!(
            r#"
$searcher = New-Object System.DirectoryServices.DirectorySearcher(Open-Entry {base})
$searcher.Filter = {filter}
$searcher.SearchScope = {scope}
$searcher.PageSize = 1000
{load} | ForEach-Object {{ [void]$searcher.PropertiesToLoad.Add($_) }}
$results = foreach ($r in $searcher.FindAll()) {{
    $attrs = @{{}}
    foreach ($name in $r.Properties.PropertyNames) {{
        if ($name -eq 'adspath') {{ continue }}
        $attrs[$name] = @($r.Properties[$name] | ForEach-Object {{ ConvertTo-GpoValue $name $_ }})
    }}
    [pscustomobject]@{{ dn = [string]$r.Properties['distinguishedname'][0]; attributes = $attrs }}
}}
ConvertTo-Json -Compress -Depth 5 -InputObject @($results)
"#,
            base = quote(&self.ldap_path(base_dn)),
            filter = quote(&filter.to_string()),
            scope = quote(scope),
            load = quote_list(&load),
        );
        self.shell.run_json(&script, AppError::LdapError)
    }

    fn read_entry(&self, dn: &str, attributes: &[&str]) -> AppResult<Option<DirectoryEntry>> {
        let script = format!(
            "if (Test-Entry {}) {{ 'true' }} else {{ 'false' }}",
            quote(&self.ldap_path(dn))
        );
        if self.shell.run(&script, AppError::LdapError)? != "true" {
            return Ok(None);
        }
        let mut entries = self.search(dn, &Filter::present("objectClass"), attributes, SearchScope::Base)?;
        Ok(entries.pop())
    }

    fn create_entry(
        &self,
        parent_dn: &str,
        rdn: &str,
        object_class: &str,
        attributes: &[AttributeChange],
    ) -> AppResult<String> {
        let dn = format!("{},{}", rdn, parent_dn);
        tracing::debug!(dn = %dn, object_class, "Creating directory object");
        let script = format!(
            r#"
$parent = Open-Entry {parent}
$child = $parent.Children.Add({rdn}, {class})
{changes}
$child.CommitChanges()
"#,
            parent = quote(&self.ldap_path(parent_dn)),
            rdn = quote(rdn),
            class = quote(object_class),
            changes = render_changes("$child", attributes),
        );
        self.run(&script)?;
        Ok(dn)
    }

    fn modify(&self, dn: &str, changes: &[AttributeChange]) -> AppResult<()> {
        tracing::debug!(dn, changes = changes.len(), "Modifying directory object");
        let script = format!(
            "$entry = Open-Entry {path}\n{changes}\n$entry.CommitChanges()",
            path = quote(&self.ldap_path(dn)),
            changes = render_changes("$entry", changes),
        );
        self.run(&script)
    }

    fn delete_tree(&self, dn: &str) -> AppResult<()> {
        tracing::debug!(dn, "Deleting directory subtree");
        self.run(&format!("(Open-Entry {}).DeleteTree()", quote(&self.ldap_path(dn))))
    }

    fn move_entry(&self, dn: &str, new_parent_dn: &str) -> AppResult<String> {
        let rdn = dn.split(',').next().unwrap_or(dn).trim();
        let script = format!(
            "(Open-Entry {src}).MoveTo((Open-Entry {dst}))",
            src = quote(&self.ldap_path(dn)),
            dst = quote(&self.ldap_path(new_parent_dn)),
        );
        self.run(&script)?;
        Ok(format!("{},{}", rdn, new_parent_dn))
    }

    fn read_security(&self, dn: &str) -> AppResult<DirectorySecurity> {
        let script = format!(
            r#"
$entry = Open-Entry {path}
$sidType = [System.Security.Principal.SecurityIdentifier]
$sd = $entry.ObjectSecurity
$rules = foreach ($r in $sd.GetAccessRules($true, $false, $sidType)) {{
    $objectType = $null
    if ($r.ObjectType -ne [guid]::Empty) {{ $objectType = $r.ObjectType.ToString() }}
    [pscustomobject]@{{
        principal = $r.IdentityReference.Value
        rights = [int]$r.ActiveDirectoryRights
        access = [string]$r.AccessControlType
        inheritance = [string]$r.InheritanceType
        objectType = $objectType
    }}
}}
ConvertTo-Json -Compress -Depth 4 -InputObject ([pscustomobject]@{{
    owner = $sd.GetOwner($sidType).Value
    group = $sd.GetGroup($sidType).Value
    rules = @($rules)
}})
"#,
            path = quote(&self.ldap_path(dn))
        );
        self.shell.run_json(&script, AppError::LdapError)
    }

    fn write_security(&self, dn: &str, security: &DirectorySecurity) -> AppResult<()> {
        let descriptor = serde_json::to_string(security)?;
        tracing::debug!(dn, rules = security.rules.len(), "Writing directory descriptor");
        let script = format!(
            r#"
$entry = Open-Entry {path}
$entry.Options.SecurityMasks = 'Owner,Group,Dacl'
$sidType = [System.Security.Principal.SecurityIdentifier]
$descriptor = ConvertFrom-Json {descriptor}
$sd = $entry.ObjectSecurity
foreach ($r in @($sd.GetAccessRules($true, $false, $sidType))) {{ $sd.RemoveAccessRuleSpecific($r) }}
$sd.SetOwner((New-Object System.Security.Principal.SecurityIdentifier($descriptor.owner)))
$sd.SetGroup((New-Object System.Security.Principal.SecurityIdentifier($descriptor.group)))
foreach ($r in $descriptor.rules) {{
    $sid = New-Object System.Security.Principal.SecurityIdentifier($r.principal)
    $rights = [System.DirectoryServices.ActiveDirectoryRights]$r.rights
    $type = [System.Security.AccessControl.AccessControlType]$r.access
    $inheritance = [System.DirectoryServices.ActiveDirectorySecurityInheritance]$r.inheritance
    if ($r.objectType) {{
        $rule = New-Object System.DirectoryServices.ActiveDirectoryAccessRule($sid, $rights, $type, [guid]$r.objectType, $inheritance)
    }} else {{
        $rule = New-Object System.DirectoryServices.ActiveDirectoryAccessRule($sid, $rights, $type, $inheritance)
    }}
    $sd.AddAccessRule($rule)
}}
$entry.ObjectSecurity = $sd
$entry.CommitChanges()
"#,
            path = quote(&self.ldap_path(dn)),
            descriptor = quote(&descriptor),
        );
        self.run(&script)
    }
}

/// ADSI property-cache updates for `target`; applied by the next commit.
fn render_changes(target: &str, changes: &[AttributeChange]) -> String {
    changes
        .iter()
        .map(|change| match change {
            AttributeChange::Replace(attr, values) => {
                let rendered: Vec<String> = values.iter().map(|v| render_value(v)).collect();
                let value = if rendered.len() == 1 {
                    rendered[0].clone()
                } else {
                    format!("@({})", rendered.join(","))
                };
                format!("{}.Properties[{}].Value = {}", target, quote(attr), value)
            }
            AttributeChange::Clear(attr) => format!("{}.Properties[{}].Clear()", target, quote(attr)),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Integer-syntax attributes (`flags`, `versionNumber`) must be sent as numbers.
fn render_value(value: &str) -> String {
    match value.parse::<i32>() {
        Ok(n) if n.to_string() == value => n.to_string(),
        _ => quote(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_changes() {
        let script = render_changes(
            "$entry",
            &[
                AttributeChange::replace("gPLink", "[LDAP://CN={A},CN=Policies;0]"),
                AttributeChange::replace("flags", "0"),
                AttributeChange::clear("description"),
            ],
        );
        let lines: Vec<&str> = script.lines().collect();
        assert_eq!(lines[0], "$entry.Properties['gPLink'].Value = '[LDAP://CN={A},CN=Policies;0]'");
        assert_eq!(lines[1], "$entry.Properties['flags'].Value = 0");
        assert_eq!(lines[2], "$entry.Properties['description'].Clear()");
    }

    #[test]
    fn test_render_value_keeps_padded_numbers_as_strings() {
        assert_eq!(render_value("2"), "2");
        assert_eq!(render_value("007"), "'007'");
        assert_eq!(render_value("O'Neil"), "'O''Neil'");
    }

    #[cfg(not(windows))]
    #[test]
    fn test_connect_fails_off_windows() {
        assert!(matches!(
            AdConnection::connect(&GpoConfig::default()),
            Err(AppError::NotConnected)
        ));
    }
}
