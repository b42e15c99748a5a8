//! Group Policy Object management over Active Directory and SYSVOL

pub mod commands;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod logging;

pub use error::{AppError, AppResult};
