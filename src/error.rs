//! Error types for fantasma

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FantasmaError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration rejected before any OS change was made
    #[error("Invalid configuration: {0}")]
    Validation(String),

    /// A session is already running; stop it first
    #[error("Sharing is already active ({mode} {source_interface} -> {target_interface}); stop it first")]
    AlreadyActive {
        mode: String,
        source_interface: String,
        target_interface: String,
    },

    /// No adapter matches the running platform
    #[error("Platform not supported: {0}")]
    UnsupportedPlatform(String),

    /// An external command failed or could not be launched
    #[error("{}", format_tool_failure(.cmd, .code, .stderr))]
    ToolInvocation {
        cmd: String,
        code: Option<i32>,
        stderr: String,
    },

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Adapter key already registered with a different factory
    #[error("Adapter '{0}' is already registered with a different factory")]
    RegistrationConflict(String),

    /// Unknown lifecycle hook name
    #[error("Unknown hook: {0}")]
    UnknownHook(String),

    /// Interface not found
    #[error("Interface not found: {0}")]
    InterfaceNotFound(String),

    /// Configuration file error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Timeout
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),
}

fn format_tool_failure(cmd: &str, code: &Option<i32>, stderr: &str) -> String {
    match code {
        Some(code) => format!("Command '{}' failed with code {}: {}", cmd, code, stderr.trim()),
        None => format!("Command '{}' failed: {}", cmd, stderr.trim()),
    }
}

impl From<serde_json::Error> for FantasmaError {
    fn from(error: serde_json::Error) -> Self {
        FantasmaError::Parse(error.to_string())
    }
}

pub type FantasmaResult<T> = Result<T, FantasmaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_failure_message() {
        let err = FantasmaError::ToolInvocation {
            cmd: "iptables -t nat -A POSTROUTING".to_string(),
            code: Some(4),
            stderr: "Permission denied (you must be root)\n".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Command 'iptables -t nat -A POSTROUTING' failed with code 4: Permission denied (you must be root)"
        );

        let err = FantasmaError::ToolInvocation {
            cmd: "hostapd".to_string(),
            code: None,
            stderr: "No such file or directory".to_string(),
        };
        assert_eq!(err.to_string(), "Command 'hostapd' failed: No such file or directory");
    }

    #[test]
    fn test_already_active_message() {
        let err = FantasmaError::AlreadyActive {
            mode: "hotspot".to_string(),
            source_interface: "eth0".to_string(),
            target_interface: "wlan0".to_string(),
        };
        assert!(err.to_string().contains("eth0 -> wlan0"));
    }
}
