// ============================================================================
// src/errors.rs – error taxonomy for the boot environment engine
// ============================================================================

use std::io;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure modes surfaced by the core. Workflow code maps these to a fatal
/// message and a non-zero exit; warnings never travel through this type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The external dataset backend (or another allowlisted command) failed.
    #[error("backend failure: {0}")]
    Backend(String),

    /// The destination of a create/move already exists.
    #[error("'{0}' already exists")]
    Conflict(String),

    /// A referenced boot environment or snapshot is absent.
    #[error("'{0}' not found")]
    NotFound(String),

    /// A plugin configuration option failed schema validation.
    #[error("invalid value for property '{key}': {reason}")]
    InvalidProperty { key: String, reason: String },

    /// A filesystem write was denied.
    #[error("insufficient privileges to write {}", .path.display())]
    Permission { path: PathBuf },

    /// The fstab boot-mount pattern matched zero or multiple lines.
    #[error("fstab pattern matched {matched} line(s) in {}, expected exactly one", .path.display())]
    ConfigIntegrity { path: PathBuf, matched: usize },

    #[error("i/o error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// Wrap an `io::Error` with the path it concerns, promoting permission
    /// denials to their own variant so workflows can report them precisely.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::PermissionDenied {
            Error::Permission { path }
        } else {
            Error::Io { path, source }
        }
    }
}
