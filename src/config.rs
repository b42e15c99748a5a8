//! Configuration loading
//!
//! # Load Order
//!
//! 1. Default values
//! 2. Config file (`--config`, else `gpoctl.toml` beside the executable)
//! 3. Environment variables (`GPOCTL_*`)
//! 4. Command-line flags
//!
//! Each layer overrides the previous.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "gpoctl.toml";

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpoConfig {
    /// DNS name of the domain, e.g. `contoso.com`
    pub domain: Option<String>,
    /// Host to bind to; defaults to whatever the locator picks
    pub domain_controller: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub level: String,
    /// Where `gpoctl.log` goes; the executable's directory when unset
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
        }
    }
}

/// Explicit bind credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

impl fmt::Debug for GpoConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpoConfig")
            .field("domain", &self.domain)
            .field("domain_controller", &self.domain_controller)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("logging", &self.logging)
            .finish()
    }
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub domain: Option<String>,
    pub domain_controller: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl GpoConfig {
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if overrides.domain.is_some() {
            self.domain = overrides.domain;
        }
        if overrides.domain_controller.is_some() {
            self.domain_controller = overrides.domain_controller;
        }
        if overrides.username.is_some() {
            self.username = overrides.username;
        }
        if overrides.password.is_some() {
            self.password = overrides.password;
        }
    }

    /// Username and password must come as a pair.
    pub fn credentials(&self) -> AppResult<Option<Credentials>> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Ok(Some(Credentials {
                username: username.clone(),
                password: password.clone(),
            })),
            (None, None) => Ok(None),
            _ => Err(AppError::ConfigError(
                "username and password must be given together".to_string(),
            )),
        }
    }

    /// Account that acts on the directory: the bind user, else the logged-on user.
    ///
    /// Strips `DOMAIN\` and `@realm` so the result can be looked up by
    /// `sAMAccountName`.
    pub fn acting_user(&self) -> Option<String> {
        let raw = self
            .username
            .clone()
            .or_else(|| std::env::var("USERNAME").ok())?;
        let name = raw.rsplit('\\').next().unwrap_or(&raw);
        let name = name.split('@').next().unwrap_or(name).trim();
        (!name.is_empty()).then(|| name.to_string())
    }
}

/// Configuration loader with builder pattern.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    config_file: Option<PathBuf>,
    skip_env: bool,
    skip_default_file: bool,
}

impl ConfigLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `path` instead of the default file; it must exist.
    #[must_use]
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    #[must_use]
    pub fn skip_env_vars(mut self) -> Self {
        self.skip_env = true;
        self
    }

    #[must_use]
    pub fn skip_default_file(mut self) -> Self {
        self.skip_default_file = true;
        self
    }

    pub fn load(&self) -> AppResult<GpoConfig> {
        let mut config = GpoConfig::default();

        if let Some(path) = &self.config_file {
            if !path.exists() {
                return Err(AppError::ConfigError(format!(
                    "config file {} does not exist",
                    path.display()
                )));
            }
            config = load_file(path)?;
            tracing::debug!(path = %path.display(), "Loaded config file");
        } else if !self.skip_default_file {
            let path = executable_dir().join(CONFIG_FILE_NAME);
            if path.exists() {
                config = load_file(&path)?;
                tracing::debug!(path = %path.display(), "Loaded default config file");
            }
        }

        if !self.skip_env {
            apply_env_vars(&mut config);
        }

        Ok(config)
    }
}

fn load_file(path: &Path) -> AppResult<GpoConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| AppError::ConfigError(format!("cannot read {}: {}", path.display(), e)))?;
    GpoConfig::from_toml(&content)
        .map_err(|e| AppError::ConfigError(format!("invalid TOML in {}: {}", path.display(), e)))
}

fn apply_env_vars(config: &mut GpoConfig) {
    let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

    if let Some(val) = var("GPOCTL_DOMAIN") {
        config.domain = Some(val);
    }
    if let Some(val) = var("GPOCTL_DOMAIN_CONTROLLER") {
        config.domain_controller = Some(val);
    }
    if let Some(val) = var("GPOCTL_USERNAME") {
        config.username = Some(val);
    }
    if let Some(val) = var("GPOCTL_PASSWORD") {
        config.password = Some(val);
    }
    if let Some(val) = var("GPOCTL_LOG_LEVEL") {
        config.logging.level = val;
    }
    if let Some(val) = var("GPOCTL_LOG_DIR") {
        config.logging.directory = Some(PathBuf::from(val));
    }
}

/// Get the directory containing the executable
pub fn executable_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ConfigLoader::new()
            .skip_env_vars()
            .skip_default_file()
            .load()
            .unwrap();
        assert_eq!(config, GpoConfig::default());
        assert_eq!(config.logging.level, "info");
        assert!(config.credentials().unwrap().is_none());
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
domain = "xlab.sec"
domain_controller = "dc01.xlab.sec"
username = "XLAB\\admin"
password = "P@ss"

[logging]
level = "gpoctl=debug"
"#
        )
        .unwrap();

        let config = ConfigLoader::new()
            .with_config_file(file.path())
            .skip_env_vars()
            .load()
            .unwrap();
        assert_eq!(config.domain.as_deref(), Some("xlab.sec"));
        assert_eq!(config.logging.level, "gpoctl=debug");
        assert!(config.logging.directory.is_none());
        assert_eq!(config.credentials().unwrap().unwrap().username, "XLAB\\admin");
        assert_eq!(config.acting_user().as_deref(), Some("admin"));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ConfigLoader::new()
            .with_config_file(dir.path().join("nope.toml"))
            .skip_env_vars()
            .load()
            .unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[test]
    fn test_malformed_toml_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "domain = ").unwrap();
        let err = ConfigLoader::new()
            .with_config_file(file.path())
            .skip_env_vars()
            .load()
            .unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[test]
    fn test_overrides_win() {
        let mut config = GpoConfig {
            domain: Some("a.local".to_string()),
            ..Default::default()
        };
        config.apply_overrides(ConfigOverrides {
            domain: Some("b.local".to_string()),
            username: Some("bob@b.local".to_string()),
            ..Default::default()
        });
        assert_eq!(config.domain.as_deref(), Some("b.local"));
        assert!(matches!(config.credentials(), Err(AppError::ConfigError(_))));
        assert_eq!(config.acting_user().as_deref(), Some("bob"));
    }

    #[test]
    fn test_debug_hides_password() {
        let config = GpoConfig {
            username: Some("admin".to_string()),
            password: Some("hunter2".to_string()),
            ..Default::default()
        };
        let shown = format!("{:?}", config);
        assert!(!shown.contains("hunter2"));
        assert!(!format!("{:?}", config.credentials().unwrap().unwrap()).contains("hunter2"));
    }
}
