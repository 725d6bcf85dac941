//! # Design
//!
//! - Messages are the stable strings shown to RPC clients; context lives in fields.
//! - Directory failures carry the numeric code clients branch on.
//! - Source errors are preserved rather than interpolated.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Directory could not be reached (network share offline, mount timed out).
pub const CODE_PATH_UNREACHABLE: i32 = 4001;
/// A metainfo file could not be read.
pub const CODE_METAINFO_READ: i32 = 4002;
/// Directory could not be created or is not writable.
pub const CODE_PERMISSION_DENIED: i32 = 4003;

/// Result type for filesystem operations.
pub type FsResult<T> = Result<T, FsError>;

/// Errors produced by filesystem helpers.
#[derive(Debug, Error)]
pub enum FsError {
    /// Target lives on a network location that did not respond.
    #[error("path-unreachable")]
    PathUnreachable {
        /// Path being prepared.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Target could not be created or is not a directory.
    #[error("permission denied")]
    PermissionDenied {
        /// Path being prepared.
        path: PathBuf,
        /// Static description used when no IO error exists.
        reason: &'static str,
        /// Underlying IO error when one was raised.
        #[source]
        source: Option<io::Error>,
    },
    /// Path does not exist.
    #[error("path does not exist")]
    NotFound {
        /// Missing path.
        path: PathBuf,
    },
    /// Path exists but is not a directory.
    #[error("path is not a directory")]
    NotADirectory {
        /// Offending path.
        path: PathBuf,
    },
    /// Path was relative where an absolute one is required.
    #[error("path must be absolute")]
    RelativePath {
        /// Offending path.
        path: PathBuf,
    },
    /// Path has no parent component.
    #[error("invalid path")]
    InvalidPath {
        /// Offending path.
        path: PathBuf,
    },
    /// Parent directory of a write target is missing.
    #[error("parent directory not found")]
    ParentMissing {
        /// Missing parent.
        path: PathBuf,
    },
    /// Parent of a write target is not a directory.
    #[error("parent path is not a directory")]
    ParentNotDirectory {
        /// Offending parent.
        path: PathBuf,
    },
    /// Write target is a symbolic link.
    #[error("refusing to overwrite symbolic link")]
    SymlinkTarget {
        /// Link path.
        path: PathBuf,
    },
    /// Write target exists and the caller asked not to replace it.
    #[error("file exists")]
    FileExists {
        /// Existing path.
        path: PathBuf,
    },
    /// Writing or renaming the staged file failed.
    #[error("unable to write file")]
    Write {
        /// Target path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Querying filesystem capacity failed.
    #[error("unable to query space")]
    SpaceQuery {
        /// Queried path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Any other IO failure.
    #[error("filesystem operation failed")]
    Io {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Path involved.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

impl FsError {
    /// Numeric code attached to directory preparation failures.
    #[must_use]
    pub const fn code(&self) -> Option<i32> {
        match self {
            Self::PathUnreachable { .. } => Some(CODE_PATH_UNREACHABLE),
            Self::PermissionDenied { .. } => Some(CODE_PERMISSION_DENIED),
            _ => None,
        }
    }

    /// Text of the underlying failure, if any.
    #[must_use]
    pub fn detail(&self) -> Option<String> {
        match self {
            Self::PathUnreachable { source, .. }
            | Self::Write { source, .. }
            | Self::SpaceQuery { source, .. }
            | Self::Io { source, .. } => Some(source.to_string()),
            Self::PermissionDenied { source, reason, .. } => Some(
                source
                    .as_ref()
                    .map_or_else(|| (*reason).to_string(), ToString::to_string),
            ),
            _ => None,
        }
    }
}
