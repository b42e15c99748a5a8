use serde::Serialize;
use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not connected to Active Directory")]
    NotConnected,

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("LDAP error: {0}")]
    LdapError(String),

    #[error("SYSVOL error: {0}")]
    FileSystemError(String),

    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("gPLink to {guid} already exists on {scope}")]
    AlreadyLinked { scope: String, guid: String },

    #[error("gPLink to {guid} does not exist on {scope}")]
    NotLinked { scope: String, guid: String },

    #[error("More than one object is named '{name}' ({count} matches); specify it by GUID or DN")]
    AmbiguousName { name: String, count: usize },

    #[error("No principal given: use one of {0}")]
    MissingSelector(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("{step} failed: {source}")]
    StepFailed {
        step: String,
        #[source]
        source: Box<AppError>,
    },

    #[error("Windows API error: {0}")]
    WindowsError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Serializable error for `--json` output
#[derive(Debug, Serialize)]
pub struct CommandError {
    pub code: String,
    pub message: String,
}

impl From<&AppError> for CommandError {
    fn from(err: &AppError) -> Self {
        CommandError {
            code: err.error_code().to_string(),
            message: err.to_string(),
        }
    }
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        CommandError::from(self).serialize(serializer)
    }
}

impl AppError {
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::NotConnected => "NOT_CONNECTED",
            AppError::AuthenticationFailed(_) => "AUTH_FAILED",
            AppError::LdapError(_) => "LDAP_ERROR",
            AppError::FileSystemError(_) => "SYSVOL_ERROR",
            AppError::ObjectNotFound(_) => "NOT_FOUND",
            AppError::AlreadyExists(_) => "ALREADY_EXISTS",
            AppError::AlreadyLinked { .. } => "ALREADY_LINKED",
            AppError::NotLinked { .. } => "NOT_LINKED",
            AppError::AmbiguousName { .. } => "AMBIGUOUS_NAME",
            AppError::MissingSelector(_) => "MISSING_SELECTOR",
            AppError::InvalidArgument(_) => "INVALID_ARGUMENT",
            AppError::ConfigError(_) => "CONFIG_ERROR",
            AppError::StepFailed { source, .. } => source.error_code(),
            AppError::WindowsError(_) => "WINDOWS_ERROR",
            AppError::IoError(_) => "IO_ERROR",
            AppError::SerializationError(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Tag an error with the sub-step of a multi-step operation it came from.
    pub fn in_step(self, step: impl Into<String>) -> Self {
        AppError::StepFailed {
            step: step.into(),
            source: Box::new(self),
        }
    }

    /// Outcomes the CLI reports without failing the invocation.
    pub fn is_benign(&self) -> bool {
        matches!(self, AppError::NotLinked { .. })
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// `map_err` shorthand for tagging lifecycle sub-steps.
pub trait StepContext<T> {
    fn step(self, step: &str) -> AppResult<T>;
}

impl<T> StepContext<T> for AppResult<T> {
    fn step(self, step: &str) -> AppResult<T> {
        self.map_err(|e| e.in_step(step))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_failed_keeps_inner_code() {
        let err = AppError::FileSystemError("access denied".to_string()).in_step("Create SYSVOL directory");
        assert_eq!(err.error_code(), "SYSVOL_ERROR");
        assert_eq!(
            err.to_string(),
            "Create SYSVOL directory failed: SYSVOL error: access denied"
        );
    }

    #[test]
    fn test_serializes_as_command_error() {
        let err = AppError::AmbiguousName {
            name: "Baseline".to_string(),
            count: 2,
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "AMBIGUOUS_NAME");
        assert!(json["message"].as_str().unwrap().contains("Baseline"));
    }

    #[test]
    fn test_only_not_linked_is_benign() {
        let not_linked = AppError::NotLinked {
            scope: "OU=IT,DC=x,DC=y".to_string(),
            guid: "{A}".to_string(),
        };
        assert!(not_linked.is_benign());
        assert!(!AppError::ObjectNotFound("x".to_string()).is_benign());
    }
}
