//! PowerShell script runner
//!
//! The Windows backends drive ADSI and `Get-Acl`/`Set-Acl` through
//! `powershell -NoProfile -ExecutionPolicy Bypass -Command` and read JSON back
//! from stdout. Credentials travel in the child's environment, never on the
//! command line.

use crate::config::Credentials;
use crate::error::{AppError, AppResult};
use serde::de::DeserializeOwned;
use std::process::Command;

const USERNAME_VAR: &str = "GPOCTL_PS_USERNAME";
const PASSWORD_VAR: &str = "GPOCTL_PS_PASSWORD";

/// Helpers prepended to every script.
const PRELUDE: &str = r#"
$ErrorActionPreference = 'Stop'
$gpoUser = $env:GPOCTL_PS_USERNAME
$gpoPass = $env:GPOCTL_PS_PASSWORD

function Open-Entry([string]$path) {
    if ($gpoUser) {
        New-Object System.DirectoryServices.DirectoryEntry($path, $gpoUser, $gpoPass)
    } else {
        New-Object System.DirectoryServices.DirectoryEntry($path)
    }
}

function Test-Entry([string]$path) {
    try {
        (Open-Entry $path).RefreshCache()
        $true
    } catch {
        $inner = $_.Exception.InnerException
        if ($_.Exception.ErrorCode -eq -2147016656 -or ($inner -and $inner.ErrorCode -eq -2147016656)) {
            $false
        } else {
            throw
        }
    }
}

function ConvertTo-GpoValue([string]$name, $value) {
    if ($value -is [byte[]]) {
        if ($name -eq 'objectsid') {
            (New-Object System.Security.Principal.SecurityIdentifier($value, 0)).Value
        } else {
            [Convert]::ToBase64String($value)
        }
    } else {
        [string]$value
    }
}
"#;

#[derive(Clone, Default)]
pub struct PowerShell {
    credentials: Option<Credentials>,
}

impl PowerShell {
    pub fn new(credentials: Option<Credentials>) -> Self {
        Self { credentials }
    }

    /// Run `script` and return its stdout. `fault` builds the error for a
    /// script that fails, so callers keep their own error kind.
    pub fn run(&self, script: &str, fault: fn(String) -> AppError) -> AppResult<String> {
        let full_script = format!("{}\n{}", PRELUDE, script);

        let mut command = Command::new("powershell");
        command.args(["-NoProfile", "-ExecutionPolicy", "Bypass", "-Command", &full_script]);
        if let Some(credentials) = &self.credentials {
            command
                .env(USERNAME_VAR, &credentials.username)
                .env(PASSWORD_VAR, &credentials.password);
        } else {
            command.env_remove(USERNAME_VAR).env_remove(PASSWORD_VAR);
        }

        let output = command.output().map_err(|e| {
            tracing::error!(error = %e, "Failed to execute PowerShell");
            fault(format!("Failed to execute PowerShell: {}", e))
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        tracing::trace!(stdout = %stdout, "PowerShell output");

        if !output.status.success() {
            tracing::debug!(stderr = %stderr, "PowerShell stderr");
            return Err(fault(first_error_line(&stderr)));
        }
        if !stderr.is_empty() {
            tracing::warn!(stderr = %stderr, "PowerShell stderr");
        }
        Ok(stdout)
    }

    pub fn run_json<T: DeserializeOwned>(
        &self,
        script: &str,
        fault: fn(String) -> AppError,
    ) -> AppResult<T> {
        let stdout = self.run(script, fault)?;
        serde_json::from_str(&stdout).map_err(|e| {
            tracing::error!(stdout = %stdout, "Failed to parse PowerShell JSON output");
            AppError::SerializationError(e)
        })
    }
}

/// Single-quoted PowerShell literal.
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// `@('a','b')`
pub fn quote_list<S: AsRef<str>>(values: &[S]) -> String {
    let items: Vec<String> = values.iter().map(|v| quote(v.as_ref())).collect();
    format!("@({})", items.join(","))
}

/// PowerShell prints the message first, followed by position info.
fn first_error_line(stderr: &str) -> String {
    stderr
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("PowerShell exited with an error")
        .to_string()
}
