//! Collaborator seams
//!
//! Everything the GPO services need from the directory and from SYSVOL. Each
//! call is one blocking round trip; a `modify` is one commit. There is no
//! transaction spanning the two stores.

use crate::domain::{DirectoryEntry, DirectorySecurity, FileSecurity, Filter, SearchScope};
use crate::error::AppResult;

/// One attribute change within a `modify` commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeChange {
    Replace(String, Vec<String>),
    Clear(String),
}

impl AttributeChange {
    pub fn replace(attr: &str, value: impl Into<String>) -> Self {
        AttributeChange::Replace(attr.to_string(), vec![value.into()])
    }

    pub fn clear(attr: &str) -> Self {
        AttributeChange::Clear(attr.to_string())
    }
}

pub trait DirectoryService {
    /// Naming context of the bound domain, e.g. `DC=contoso,DC=com`.
    fn domain_dn(&self) -> &str;

    fn search(
        &self,
        base_dn: &str,
        filter: &Filter,
        attributes: &[&str],
        scope: SearchScope,
    ) -> AppResult<Vec<DirectoryEntry>>;

    /// Base-scope read; `None` when the DN does not exist.
    fn read_entry(&self, dn: &str, attributes: &[&str]) -> AppResult<Option<DirectoryEntry>>;

    /// Create `rdn` under `parent_dn` and return the new DN.
    fn create_entry(
        &self,
        parent_dn: &str,
        rdn: &str,
        object_class: &str,
        attributes: &[AttributeChange],
    ) -> AppResult<String>;

    fn modify(&self, dn: &str, changes: &[AttributeChange]) -> AppResult<()>;

    /// Delete `dn` and everything below it.
    fn delete_tree(&self, dn: &str) -> AppResult<()>;

    /// Re-parent `dn` under `new_parent_dn`; returns the new DN.
    fn move_entry(&self, dn: &str, new_parent_dn: &str) -> AppResult<String>;

    fn read_security(&self, dn: &str) -> AppResult<DirectorySecurity>;

    /// Replace the explicit DACL, owner and group of `dn`.
    fn write_security(&self, dn: &str, security: &DirectorySecurity) -> AppResult<()>;
}

/// The SYSVOL share, addressed by UNC-style paths.
pub trait SysvolStore {
    fn exists(&self, path: &str) -> AppResult<bool>;

    fn create_dir_all(&self, path: &str) -> AppResult<()>;

    fn remove_dir_all(&self, path: &str) -> AppResult<()>;

    fn write_file(&self, path: &str, contents: &str) -> AppResult<()>;

    fn read_security(&self, path: &str) -> AppResult<FileSecurity>;

    /// Replace the folder's descriptor wholesale.
    fn write_security(&self, path: &str, security: &FileSecurity) -> AppResult<()>;
}

/// Join UNC path segments with `\`.
pub fn join_path(base: &str, child: &str) -> String {
    format!("{}\\{}", base.trim_end_matches('\\'), child.trim_start_matches('\\'))
}
