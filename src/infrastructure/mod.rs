pub mod ad_connection;
pub mod backend;
pub mod context;
pub mod gp_link;
pub mod gpo_management;
pub mod identity;
pub mod memory;
pub mod ou_management;
pub mod powershell;
pub mod security_filtering;
pub mod sysvol;

pub use ad_connection::*;
pub use backend::*;
pub use context::*;
pub use gp_link::*;
pub use gpo_management::*;
pub use identity::*;
pub use ou_management::*;
pub use security_filtering::*;
pub use sysvol::*;
