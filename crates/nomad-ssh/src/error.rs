// ABOUTME: Error types for key provisioning using thiserror.
// ABOUTME: Separates account resolution, permission and generic I/O failures.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while provisioning authorized keys.
#[derive(Error, Debug)]
pub enum SshError {
    /// The target account or its home directory could not be determined.
    #[error("cannot resolve home directory for account {account}: {reason}")]
    Resolution { account: String, reason: String },

    /// No account name was given and none could be read from the environment.
    #[error("no target account given and none found in the environment")]
    NoAccount,

    /// The filesystem refused an operation on the key directory or file.
    #[error("permission denied while trying to {action} {path}: {source}")]
    Permission {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Any other filesystem failure.
    #[error("failed to {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The prune prefix was empty, which would match every legacy key.
    #[error("prune prefix must not be empty")]
    EmptyPrunePrefix,

    /// The key line to provision was empty or spanned several lines.
    #[error("invalid key line: {0}")]
    InvalidKeyLine(String),
}

impl SshError {
    /// Classify an I/O error, splitting permission failures from the rest.
    pub(crate) fn io(
        action: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::PermissionDenied {
            SshError::Permission {
                action,
                path,
                source,
            }
        } else {
            SshError::Io {
                action,
                path,
                source,
            }
        }
    }

    /// Whether this error came from a permission check.
    pub fn is_permission(&self) -> bool {
        matches!(self, SshError::Permission { .. })
    }
}

/// Result type alias using SshError.
pub type Result<T> = std::result::Result<T, SshError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_resolution_error_display() {
        let err = SshError::Resolution {
            account: "pi".to_string(),
            reason: "no passwd entry".to_string(),
        };
        let display = format!("{}", err);
        assert!(display.contains("cannot resolve home directory"));
        assert!(display.contains("pi"));
        assert!(display.contains("no passwd entry"));
    }

    #[test]
    fn test_io_classifies_permission_denied() {
        let err = SshError::io(
            "write",
            "/home/pi/.ssh/authorized_keys",
            io::Error::new(io::ErrorKind::PermissionDenied, "access denied"),
        );
        assert!(err.is_permission());
        let display = format!("{}", err);
        assert!(display.contains("permission denied while trying to write"));
        assert!(display.contains("/home/pi/.ssh/authorized_keys"));
    }

    #[test]
    fn test_io_keeps_other_kinds() {
        let err = SshError::io(
            "read",
            "/tmp/keys",
            io::Error::new(io::ErrorKind::InvalidData, "bad bytes"),
        );
        assert!(!err.is_permission());
        assert!(matches!(err, SshError::Io { action: "read", .. }));
    }

    #[test]
    fn test_error_source_is_preserved() {
        use std::error::Error;

        let err = SshError::io(
            "create directory",
            "/path",
            io::Error::new(io::ErrorKind::NotFound, "not found"),
        );
        assert!(err.source().is_some());
    }

    #[test]
    fn test_error_debug() {
        let err = SshError::InvalidKeyLine("empty".to_string());
        let debug_str = format!("{:?}", err);
        assert!(debug_str.contains("InvalidKeyLine"));
        assert!(debug_str.contains("empty"));
    }
}
