//! VFS error types.
//!
//! Variants keep the internal reason for logging; the conversion to
//! [`io::Error`] is what a remote peer gets to see, and it deliberately
//! folds "unauthenticated" and "outside your sandbox" into plain NotFound.

use std::io;
use thiserror::Error;

use crate::registry::RegistryError;

/// VFS error type.
#[derive(Debug, Error)]
pub enum VfsError {
    /// File or directory not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The session has no resolved identity.
    #[error("session is not authenticated")]
    Unauthenticated,

    /// Path escapes the caller's sandbox (security violation).
    #[error("path escapes sandbox: {0}")]
    OutOfSandbox(String),

    /// Operation not allowed on this path or handle.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Expected a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Expected a file.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// The configuration document written to `/config` did not decode.
    #[error("malformed configuration document: {0}")]
    MalformedConfig(String),

    /// Handle was already closed.
    #[error("handle already closed")]
    Closed,

    /// Registry could not be read or written.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl VfsError {
    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create an OutOfSandbox error.
    pub fn out_of_sandbox(path: impl Into<String>) -> Self {
        Self::OutOfSandbox(path.into())
    }

    /// Create a PermissionDenied error.
    pub fn permission_denied(path: impl Into<String>) -> Self {
        Self::PermissionDenied(path.into())
    }

    /// Create a NotADirectory error.
    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::NotADirectory(path.into())
    }

    /// Create a MalformedConfig error.
    pub fn malformed_config(msg: impl Into<String>) -> Self {
        Self::MalformedConfig(msg.into())
    }

    /// Whether a remote peer sees this as "no such file".
    pub fn is_not_found(&self) -> bool {
        match self {
            VfsError::NotFound(_) | VfsError::Unauthenticated | VfsError::OutOfSandbox(_) => true,
            VfsError::Io(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Convert VfsError to std::io::Error, hiding sandbox and session details.
impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        match e {
            VfsError::NotFound(_) | VfsError::Unauthenticated | VfsError::OutOfSandbox(_) => {
                io::Error::from(io::ErrorKind::NotFound)
            }
            VfsError::PermissionDenied(msg) => {
                io::Error::new(io::ErrorKind::PermissionDenied, msg)
            }
            VfsError::NotADirectory(msg) => io::Error::new(io::ErrorKind::NotADirectory, msg),
            VfsError::IsADirectory(msg) => io::Error::new(io::ErrorKind::IsADirectory, msg),
            VfsError::MalformedConfig(msg) => io::Error::new(io::ErrorKind::InvalidData, msg),
            VfsError::Closed => io::Error::other("handle already closed"),
            VfsError::Registry(e) => io::Error::other(e.to_string()),
            VfsError::Io(e) => e,
        }
    }
}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_errors_look_identical() {
        let unauth: io::Error = VfsError::Unauthenticated.into();
        let escape: io::Error = VfsError::out_of_sandbox("/storage/../x").into();
        let missing: io::Error = VfsError::not_found("/nope").into();

        for e in [&unauth, &escape, &missing] {
            assert_eq!(e.kind(), io::ErrorKind::NotFound);
        }
        assert_eq!(unauth.to_string(), missing.to_string());
        assert_eq!(escape.to_string(), missing.to_string());
    }

    #[test]
    fn test_is_not_found() {
        assert!(VfsError::Unauthenticated.is_not_found());
        assert!(VfsError::Io(io::Error::from(io::ErrorKind::NotFound)).is_not_found());
        assert!(!VfsError::permission_denied("/").is_not_found());
        assert!(!VfsError::malformed_config("eof").is_not_found());
    }

    #[test]
    fn test_malformed_config_is_invalid_data() {
        let e: io::Error = VfsError::malformed_config("expected `[`").into();
        assert_eq!(e.kind(), io::ErrorKind::InvalidData);
    }
}
