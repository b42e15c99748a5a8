//! Shared state for one action invocation
//!
//! The directory binding and the SYSVOL share are established once by the
//! caller and borrowed by every service for the life of the action.

use super::backend::{DirectoryService, SysvolStore};
use super::identity::IdentityResolver;
use crate::domain::{AccessTranslator, DomainInfo, PolicyGuid, PolicyObject};

pub struct GpoContext<'a> {
    pub directory: &'a dyn DirectoryService,
    pub sysvol: &'a dyn SysvolStore,
    pub domain: DomainInfo,
    pub translator: AccessTranslator<'static>,
}

impl<'a> GpoContext<'a> {
    pub fn new(
        directory: &'a dyn DirectoryService,
        sysvol: &'a dyn SysvolStore,
        domain: DomainInfo,
    ) -> Self {
        Self {
            directory,
            sysvol,
            domain,
            translator: AccessTranslator::default(),
        }
    }

    pub fn identities(&self) -> IdentityResolver<'a> {
        IdentityResolver::new(self.directory)
    }

    /// SYSVOL folder of a policy: its `gPCFileSysPath`, else the conventional path.
    pub fn sysvol_path(&self, policy: &PolicyObject) -> String {
        policy
            .file_sys_path
            .clone()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| self.domain.sysvol_policy_path(&policy.guid))
    }

    pub fn policy_dn(&self, guid: &PolicyGuid) -> String {
        self.domain.policy_dn(guid)
    }
}
