//! Error taxonomy for the VFS adapter.
//!
//! Backend-specific failure codes (FTP reply codes, socket errors) are
//! translated into these filesystem-style kinds at the VFS operation
//! boundary. No raw reply code crosses that boundary.

use crate::transport::TransportError;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, VfsError>;

/// Filesystem-style error kinds surfaced to VFS callers.
#[derive(Debug, Error)]
pub enum VfsError {
    /// Path has no entry, or the parent listing lookup failed.
    #[error("ENOENT - no such file or directory: {0}")]
    NotFound(String),

    /// Target already exists (directory creation, extension redefinition).
    #[error("EEXIST - already exists: {0}")]
    AlreadyExists(String),

    /// Read requested on a path that is a directory.
    #[error("EISDIR - is a directory: {0}")]
    IsADirectory(String),

    /// Operation not meaningful for this backend.
    #[error("ENOTSUPPORTED - FTP cannot {0}")]
    NotSupported(&'static str),

    /// Caller error: bad or missing option.
    #[error("EINVAL - {0}")]
    InvalidArgument(String),

    /// The adapter was destroyed; the session handle is gone.
    #[error("session closed")]
    SessionClosed,

    /// Socket or control connection unusable after negotiation.
    #[error("protocol failure: {0}")]
    Protocol(String),

    /// Transfer-socket I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl VfsError {
    /// True for the NotFound kind; used by callers short-circuiting on
    /// missing paths.
    pub fn is_not_found(&self) -> bool {
        matches!(self, VfsError::NotFound(_))
    }
}

/// Map a transport failure on a path-addressed command to the taxonomy.
///
/// Officially only FTP codes 450, 550 and 451 strictly mean the path does
/// not exist, but if the server refused a path-addressed command at all,
/// assume the path is not there.
pub(crate) fn map_missing(err: TransportError, path: &str) -> VfsError {
    match err {
        TransportError::Closed => VfsError::SessionClosed,
        TransportError::Io(e) => VfsError::Io(e),
        TransportError::Reply { .. } => VfsError::NotFound(path.to_string()),
    }
}

/// Strict mapping for commands where a refusal is a protocol failure, not a
/// missing path (e.g. a socket that died after negotiation).
pub(crate) fn map_protocol(err: TransportError) -> VfsError {
    match err {
        TransportError::Closed => VfsError::SessionClosed,
        TransportError::Io(e) => VfsError::Io(e),
        TransportError::Reply { code, message } => {
            VfsError::Protocol(format!("{} {}", code, message))
        }
    }
}
