//! In-memory directory and SYSVOL
//!
//! Single-threaded stand-ins for a domain controller, used to exercise the
//! GPO services without a domain. Both stores key objects case-insensitively
//! and can be told to fail specific operations.

use super::backend::{join_path, AttributeChange, DirectoryService, SysvolStore};
use crate::domain::{
    parent_dn, rdn_value, DirectoryAccessRule, DirectoryEntry, DirectoryInheritance,
    DirectoryRights, DirectorySecurity, DomainInfo, FileSecurity, Filter, SearchScope, Sid,
};
use crate::error::{AppError, AppResult};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

const DEFAULT_DOMAIN_SID: &str = "S-1-5-21-1004336348-1177238915-682003330";

struct StoredObject {
    entry: DirectoryEntry,
    security: DirectorySecurity,
}

/// Directory tree held in a map keyed by normalized DN.
pub struct MemoryDirectory {
    domain: DomainInfo,
    domain_sid: Sid,
    objects: RefCell<BTreeMap<String, StoredObject>>,
    next_rid: Cell<u32>,
    fail_deletes: Cell<bool>,
    fail_security_writes: Cell<bool>,
}

impl MemoryDirectory {
    /// A domain with the containers a fresh forest has.
    pub fn new(domain: &DomainInfo) -> AppResult<Self> {
        let domain_sid: Sid = DEFAULT_DOMAIN_SID.parse()?;
        let directory = Self {
            domain: domain.clone(),
            domain_sid,
            objects: RefCell::new(BTreeMap::new()),
            next_rid: Cell::new(1103),
            fail_deletes: Cell::new(false),
            fail_security_writes: Cell::new(false),
        };

        let root = &domain.domain_dn;
        directory.insert(root, &["top", "domain", "domainDNS"], &[]);
        directory.insert(&format!("CN=Users,{}", root), &["top", "container"], &[]);
        directory.insert(&format!("CN=Computers,{}", root), &["top", "container"], &[]);
        directory.insert(&format!("CN=System,{}", root), &["top", "container"], &[]);
        directory.insert(&domain.policies_dn(), &["top", "container"], &[]);
        directory.insert(&format!("CN=Configuration,{}", root), &["top", "configuration"], &[]);
        directory.insert(&domain.sites_dn(), &["top", "sitesContainer"], &[]);

        for (name, rid) in [("Domain Admins", 512), ("Domain Users", 513), ("Enterprise Admins", 519)] {
            let sid = directory.domain_sid.with_rid(rid);
            directory.insert(
                &format!("CN={},CN=Users,{}", name, root),
                &["top", "group"],
                &[("sAMAccountName", name), ("objectSid", sid.as_str())],
            );
        }
        Ok(directory)
    }

    pub fn domain(&self) -> &DomainInfo {
        &self.domain
    }

    pub fn domain_sid(&self) -> &Sid {
        &self.domain_sid
    }

    pub fn add_user(&self, sam_account_name: &str) -> Sid {
        let sid = self.allocate_sid();
        self.insert(
            &format!("CN={},CN=Users,{}", sam_account_name, self.domain.domain_dn),
            &["top", "person", "organizationalPerson", "user"],
            &[("sAMAccountName", sam_account_name), ("objectSid", sid.as_str())],
        );
        sid
    }

    /// `name` without the trailing `$`.
    pub fn add_computer(&self, name: &str) -> Sid {
        let sid = self.allocate_sid();
        let sam = format!("{}$", name);
        self.insert(
            &format!("CN={},CN=Computers,{}", name, self.domain.domain_dn),
            &["top", "person", "organizationalPerson", "user", "computer"],
            &[("sAMAccountName", sam.as_str()), ("objectSid", sid.as_str())],
        );
        sid
    }

    pub fn add_group(&self, name: &str) -> Sid {
        let sid = self.allocate_sid();
        self.insert(
            &format!("CN={},CN=Users,{}", name, self.domain.domain_dn),
            &["top", "group"],
            &[("sAMAccountName", name), ("objectSid", sid.as_str())],
        );
        sid
    }

    pub fn add_ou(&self, name: &str, parent_dn: &str) -> String {
        let dn = format!("OU={},{}", name, parent_dn);
        self.insert(&dn, &["top", "organizationalUnit"], &[("ou", name)]);
        dn
    }

    pub fn add_site(&self, name: &str) -> String {
        let dn = format!("CN={},{}", name, self.domain.sites_dn());
        self.insert(&dn, &["top", "site"], &[]);
        dn
    }

    pub fn exists(&self, dn: &str) -> bool {
        self.objects.borrow().contains_key(&normalize_dn(dn))
    }

    /// Full copy of a stored entry, every attribute included.
    pub fn entry(&self, dn: &str) -> Option<DirectoryEntry> {
        self.objects
            .borrow()
            .get(&normalize_dn(dn))
            .map(|o| o.entry.clone())
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.set(fail);
    }

    pub fn set_fail_security_writes(&self, fail: bool) {
        self.fail_security_writes.set(fail);
    }

    fn allocate_sid(&self) -> Sid {
        let rid = self.next_rid.get();
        self.next_rid.set(rid + 1);
        self.domain_sid.with_rid(rid)
    }

    fn insert(&self, dn: &str, classes: &[&str], attributes: &[(&str, &str)]) {
        let mut entry = DirectoryEntry::new(dn);
        entry.set("objectClass", classes.iter().map(|c| c.to_string()).collect());
        entry.set("name", vec![rdn_value(dn).to_string()]);
        entry.set("distinguishedName", vec![dn.to_string()]);
        for (attr, value) in attributes {
            entry.set(attr, vec![value.to_string()]);
        }
        let object_class = classes.last().copied().unwrap_or("top");
        let security = self.default_security(object_class);
        self.objects
            .borrow_mut()
            .insert(normalize_dn(dn), StoredObject { entry, security });
    }

    /// Descriptor the schema would assign to a new object of `object_class`.
    fn default_security(&self, object_class: &str) -> DirectorySecurity {
        let domain_admins = self.domain_sid.with_rid(512);
        let enterprise_admins = self.domain_sid.with_rid(519);
        let system = Sid::well_known(Sid::LOCAL_SYSTEM);

        let mut rules = vec![
            DirectoryAccessRule::allow(domain_admins.clone(), DirectoryRights::FULL_CONTROL),
            DirectoryAccessRule::allow(enterprise_admins, DirectoryRights::FULL_CONTROL),
            DirectoryAccessRule::allow(system, DirectoryRights::FULL_CONTROL),
        ];
        if object_class.eq_ignore_ascii_case("groupPolicyContainer") {
            rules.push(DirectoryAccessRule::allow(
                Sid::authenticated_users(),
                DirectoryRights::GENERIC_READ,
            ));
            rules.push(
                DirectoryAccessRule::allow(Sid::authenticated_users(), DirectoryRights::EXTENDED_RIGHT)
                    .with_inheritance(DirectoryInheritance::All),
            );
            rules.push(DirectoryAccessRule::allow(
                Sid::well_known(Sid::ENTERPRISE_DOMAIN_CONTROLLERS),
                DirectoryRights::GENERIC_READ,
            ));
        }
        DirectorySecurity {
            owner: domain_admins.clone(),
            group: domain_admins,
            rules,
        }
    }

    fn no_such_object(dn: &str) -> AppError {
        AppError::LdapError(format!("There is no such object on the server: {}", dn))
    }
}

impl DirectoryService for MemoryDirectory {
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
        let base = normalize_dn(base_dn);
        let objects = self.objects.borrow();
        if !objects.contains_key(&base) {
            return Err(Self::no_such_object(base_dn));
        }
        let suffix = format!(",{}", base);

        Ok(objects
            .iter()
            .filter(|(key, _)| match scope {
                SearchScope::Base => **key == base,
                SearchScope::OneLevel => parent_dn(key) == Some(base.as_str()),
                SearchScope::Subtree => **key == base || key.ends_with(&suffix),
            })
            .filter(|(_, object)| filter.matches(&object.entry))
            .map(|(_, object)| project(&object.entry, attributes))
            .collect())
    }

    fn read_entry(&self, dn: &str, attributes: &[&str]) -> AppResult<Option<DirectoryEntry>> {
        Ok(self
            .objects
            .borrow()
            .get(&normalize_dn(dn))
            .map(|object| project(&object.entry, attributes)))
    }

    fn create_entry(
        &self,
        parent_dn: &str,
        rdn: &str,
        object_class: &str,
        attributes: &[AttributeChange],
    ) -> AppResult<String> {
        if !self.exists(parent_dn) {
            return Err(Self::no_such_object(parent_dn));
        }
        let dn = format!("{},{}", rdn, parent_dn);
        if self.exists(&dn) {
            return Err(AppError::AlreadyExists(dn));
        }
        let (rdn_attr, _) = rdn.split_once('=').unwrap_or(("cn", rdn));
        let rdn_attr = rdn_attr.to_ascii_lowercase();
        let value = rdn_value(rdn);
        self.insert(&dn, &["top", object_class], &[(rdn_attr.as_str(), value)]);
        self.modify(&dn, attributes)?;
        Ok(dn)
    }

    fn modify(&self, dn: &str, changes: &[AttributeChange]) -> AppResult<()> {
        let mut objects = self.objects.borrow_mut();
        let object = objects
            .get_mut(&normalize_dn(dn))
            .ok_or_else(|| Self::no_such_object(dn))?;
        for change in changes {
            match change {
                AttributeChange::Replace(attr, values) => object.entry.set(attr, values.clone()),
                AttributeChange::Clear(attr) => object.entry.clear(attr),
            }
        }
        Ok(())
    }

    fn delete_tree(&self, dn: &str) -> AppResult<()> {
        if self.fail_deletes.get() {
            return Err(AppError::LdapError(format!("Access is denied: {}", dn)));
        }
        let key = normalize_dn(dn);
        let suffix = format!(",{}", key);
        let mut objects = self.objects.borrow_mut();
        if !objects.contains_key(&key) {
            return Err(Self::no_such_object(dn));
        }
        objects.retain(|k, _| *k != key && !k.ends_with(&suffix));
        Ok(())
    }

    fn move_entry(&self, dn: &str, new_parent_dn: &str) -> AppResult<String> {
        if !self.exists(new_parent_dn) {
            return Err(Self::no_such_object(new_parent_dn));
        }
        let key = normalize_dn(dn);
        let depth = key.split(',').count();
        let rdn = dn.split(',').next().unwrap_or(dn).trim();
        let new_dn = format!("{},{}", rdn, new_parent_dn);

        let mut objects = self.objects.borrow_mut();
        if !objects.contains_key(&key) {
            return Err(Self::no_such_object(dn));
        }
        let suffix = format!(",{}", key);
        let moving: Vec<String> = objects
            .keys()
            .filter(|k| **k == key || k.ends_with(&suffix))
            .cloned()
            .collect();
        for old_key in moving {
            if let Some(mut object) = objects.remove(&old_key) {
                let components: Vec<&str> = object.entry.dn.split(',').map(str::trim).collect();
                let head = components[..components.len().saturating_sub(depth)].join(",");
                object.entry.dn = if head.is_empty() {
                    new_dn.clone()
                } else {
                    format!("{},{}", head, new_dn)
                };
                object.entry.set("distinguishedName", vec![object.entry.dn.clone()]);
                objects.insert(normalize_dn(&object.entry.dn), object);
            }
        }
        Ok(new_dn)
    }

    fn read_security(&self, dn: &str) -> AppResult<DirectorySecurity> {
        self.objects
            .borrow()
            .get(&normalize_dn(dn))
            .map(|object| object.security.clone())
            .ok_or_else(|| Self::no_such_object(dn))
    }

    fn write_security(&self, dn: &str, security: &DirectorySecurity) -> AppResult<()> {
        if self.fail_security_writes.get() {
            return Err(AppError::LdapError(format!("Insufficient rights to write nTSecurityDescriptor: {}", dn)));
        }
        let mut objects = self.objects.borrow_mut();
        let object = objects
            .get_mut(&normalize_dn(dn))
            .ok_or_else(|| Self::no_such_object(dn))?;
        object.security = security.clone();
        Ok(())
    }
}

enum Node {
    Directory(Option<FileSecurity>),
    File(String),
}

/// SYSVOL share held in a map keyed by lowercased path.
#[derive(Default)]
pub struct MemorySysvol {
    nodes: RefCell<BTreeMap<String, Node>>,
    fail_writes: Cell<bool>,
}

impl MemorySysvol {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_dir(&self, path: &str) -> bool {
        matches!(self.nodes.borrow().get(&path_key(path)), Some(Node::Directory(_)))
    }

    pub fn contents(&self, path: &str) -> Option<String> {
        match self.nodes.borrow().get(&path_key(path)) {
            Some(Node::File(contents)) => Some(contents.clone()),
            _ => None,
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }

    fn check_writable(&self, path: &str) -> AppResult<()> {
        if self.fail_writes.get() {
            return Err(AppError::FileSystemError(format!("The network path was not found: {}", path)));
        }
        Ok(())
    }

    fn not_found(path: &str) -> AppError {
        AppError::FileSystemError(format!("Could not find a part of the path '{}'", path))
    }
}

impl SysvolStore for MemorySysvol {
    fn exists(&self, path: &str) -> AppResult<bool> {
        Ok(self.nodes.borrow().contains_key(&path_key(path)))
    }

    fn create_dir_all(&self, path: &str) -> AppResult<()> {
        self.check_writable(path)?;
        let mut nodes = self.nodes.borrow_mut();
        let trimmed = path.trim_start_matches('\\');
        let mut current = String::from("\\\\");
        for (i, segment) in trimmed.split('\\').filter(|s| !s.is_empty()).enumerate() {
            if i > 0 {
                current.push('\\');
            }
            current.push_str(segment);
            let key = path_key(&current);
            match nodes.get(&key) {
                Some(Node::File(_)) => {
                    return Err(AppError::FileSystemError(format!("'{}' is a file", current)))
                }
                Some(Node::Directory(_)) => {}
                None => {
                    nodes.insert(key, Node::Directory(None));
                }
            }
        }
        Ok(())
    }

    fn remove_dir_all(&self, path: &str) -> AppResult<()> {
        self.check_writable(path)?;
        let key = path_key(path);
        let prefix = format!("{}\\", key);
        let mut nodes = self.nodes.borrow_mut();
        if !matches!(nodes.get(&key), Some(Node::Directory(_))) {
            return Err(Self::not_found(path));
        }
        nodes.retain(|k, _| *k != key && !k.starts_with(&prefix));
        Ok(())
    }

    fn write_file(&self, path: &str, contents: &str) -> AppResult<()> {
        self.check_writable(path)?;
        let parent = path.rsplit_once('\\').map(|(parent, _)| parent).unwrap_or("");
        if !self.is_dir(parent) {
            return Err(Self::not_found(path));
        }
        self.nodes
            .borrow_mut()
            .insert(path_key(path), Node::File(contents.to_string()));
        Ok(())
    }

    fn read_security(&self, path: &str) -> AppResult<FileSecurity> {
        match self.nodes.borrow().get(&path_key(path)) {
            Some(Node::Directory(Some(security))) => Ok(security.clone()),
            Some(Node::Directory(None)) => Ok(FileSecurity {
                owner: None,
                group: None,
                protected: false,
                rules: Vec::new(),
            }),
            _ => Err(Self::not_found(path)),
        }
    }

    fn write_security(&self, path: &str, security: &FileSecurity) -> AppResult<()> {
        self.check_writable(path)?;
        match self.nodes.borrow_mut().get_mut(&path_key(path)) {
            Some(Node::Directory(slot)) => {
                *slot = Some(security.clone());
                Ok(())
            }
            _ => Err(Self::not_found(path)),
        }
    }
}

/// Only the requested attributes, like a real search would return.
fn project(entry: &DirectoryEntry, attributes: &[&str]) -> DirectoryEntry {
    let mut projected = DirectoryEntry::new(entry.dn.clone());
    for attr in attributes {
        if let Some(values) = entry.get_all(attr) {
            projected.set(attr, values.clone());
        }
    }
    projected
}

fn normalize_dn(dn: &str) -> String {
    dn.split(',')
        .map(str::trim)
        .collect::<Vec<_>>()
        .join(",")
        .to_lowercase()
}

fn path_key(path: &str) -> String {
    let trimmed = path.trim_start_matches('\\').trim_end_matches('\\');
    join_path("\\", trimmed).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> MemoryDirectory {
        MemoryDirectory::new(&DomainInfo::new("x.y", "dc01.x.y")).unwrap()
    }

    #[test]
    fn test_seeded_containers() {
        let dir = directory();
        assert!(dir.exists("DC=x,DC=y"));
        assert!(dir.exists("cn=policies, cn=system, dc=x, dc=y"));
        assert!(dir.exists("CN=Sites,CN=Configuration,DC=x,DC=y"));
    }

    #[test]
    fn test_search_scopes() {
        let dir = directory();
        let it = dir.add_ou("IT", "DC=x,DC=y");
        dir.add_ou("Dev", &it);
        let ous = Filter::eq("objectClass", "organizationalUnit");

        let subtree = dir.search("DC=x,DC=y", &ous, &["name"], SearchScope::Subtree).unwrap();
        assert_eq!(subtree.len(), 2);
        let one = dir.search("DC=x,DC=y", &ous, &["name"], SearchScope::OneLevel).unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].get("name").unwrap(), "IT");
        assert!(one[0].get("objectClass").is_none());
        assert!(dir.search("OU=Nope,DC=x,DC=y", &ous, &[], SearchScope::Base).is_err());
    }

    #[test]
    fn test_create_modify_delete_tree() {
        let dir = directory();
        let dn = dir
            .create_entry(
                "DC=x,DC=y",
                "OU=Ops",
                "organizationalUnit",
                &[AttributeChange::replace("description", "ops team")],
            )
            .unwrap();
        assert_eq!(dn, "OU=Ops,DC=x,DC=y");
        assert!(matches!(
            dir.create_entry("DC=x,DC=y", "OU=Ops", "organizationalUnit", &[]),
            Err(AppError::AlreadyExists(_))
        ));
        dir.create_entry(&dn, "CN=Child", "container", &[]).unwrap();
        dir.modify(&dn, &[AttributeChange::clear("description")]).unwrap();
        assert!(dir.entry(&dn).unwrap().get("description").is_none());
        assert_eq!(dir.entry(&dn).unwrap().get("ou").unwrap(), "Ops");

        dir.delete_tree(&dn).unwrap();
        assert!(!dir.exists(&dn));
        assert!(!dir.exists("CN=Child,OU=Ops,DC=x,DC=y"));
    }

    #[test]
    fn test_move_rekeys_subtree() {
        let dir = directory();
        let it = dir.add_ou("IT", "DC=x,DC=y");
        let dev = dir.add_ou("Dev", "DC=x,DC=y");
        dir.add_ou("Build", &dev);
        let moved = dir.move_entry(&dev, &it).unwrap();
        assert_eq!(moved, "OU=Dev,OU=IT,DC=x,DC=y");
        assert!(dir.exists("OU=Build,OU=Dev,OU=IT,DC=x,DC=y"));
        assert!(!dir.exists("OU=Dev,DC=x,DC=y"));
    }

    #[test]
    fn test_policy_container_gets_default_descriptor() {
        let dir = directory();
        let dn = dir
            .create_entry(&dir.domain().policies_dn(), "CN={A}", "groupPolicyContainer", &[])
            .unwrap();
        let sd = dir.read_security(&dn).unwrap();
        let authenticated_users = Sid::authenticated_users();
        let au: Vec<_> = sd.rules_for(&authenticated_users).collect();
        assert_eq!(au.len(), 2);
        assert!(au.iter().any(|r| r.rights == DirectoryRights::EXTENDED_RIGHT));
    }

    #[test]
    fn test_sysvol_tree() {
        let sysvol = MemorySysvol::new();
        let root = r"\\dc01\SYSVOL\x.y\Policies\{A}";
        sysvol.create_dir_all(&join_path(root, "Machine")).unwrap();
        assert!(sysvol.is_dir(root));
        assert!(sysvol.exists(r"\\DC01\sysvol\X.Y\policies\{a}\machine").unwrap());
        sysvol.write_file(&join_path(root, "GPT.ini"), "[General]\r\n").unwrap();
        assert!(sysvol.write_file(r"\\dc01\SYSVOL\missing\GPT.ini", "").is_err());
        assert!(!sysvol.read_security(root).unwrap().protected);

        sysvol.remove_dir_all(root).unwrap();
        assert!(!sysvol.exists(root).unwrap());
        assert!(!sysvol.exists(&join_path(root, "GPT.ini")).unwrap());
        assert!(sysvol.remove_dir_all(root).is_err());
    }
}
