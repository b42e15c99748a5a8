pub mod ad_objects;
pub mod filter;
pub mod gplink;
pub mod guid;
pub mod security;
pub mod translator;

pub use ad_objects::*;
pub use filter::Filter;
pub use gplink::{GpLink, LinkEntry, LinkOptions, LinkUpdate};
pub use guid::PolicyGuid;
pub use security::*;
pub use translator::{AccessTranslator, Translation, UnmappedPermission};
