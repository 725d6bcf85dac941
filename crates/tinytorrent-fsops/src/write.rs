//! Atomic file writes staged through a sibling temporary file.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::Builder;
use tracing::debug;

use crate::dirs::normalize_lexically;
use crate::error::{FsError, FsResult};

/// Prefix of staging files created next to the target.
const STAGING_PREFIX: &str = ".tt-write-";

/// Behaviour when the target already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Replace the existing file.
    #[default]
    Overwrite,
    /// Refuse to touch an existing file.
    FailIfExists,
}

impl WriteMode {
    /// Parse the wire spelling (`overwrite` or `fail-if-exists`).
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "overwrite" => Some(Self::Overwrite),
            "fail-if-exists" => Some(Self::FailIfExists),
            _ => None,
        }
    }
}

fn target_state(target: &Path) -> FsResult<Option<fs::Metadata>> {
    match fs::symlink_metadata(target) {
        Ok(meta) => Ok(Some(meta)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(FsError::Io {
            operation: "inspect_target",
            path: target.to_path_buf(),
            source,
        }),
    }
}

/// Write `bytes` to the absolute path `target`, replacing it atomically.
///
/// Returns the number of bytes written.
///
/// # Errors
///
/// Rejects relative targets, missing or non-directory parents, symbolic link
/// targets, and existing files under [`WriteMode::FailIfExists`].
pub fn write_file_atomic(target: &Path, bytes: &[u8], mode: WriteMode) -> FsResult<u64> {
    if !target.is_absolute() {
        return Err(FsError::RelativePath {
            path: target.to_path_buf(),
        });
    }
    let target = normalize_lexically(target);
    let parent = target
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .ok_or_else(|| FsError::InvalidPath {
            path: target.clone(),
        })?
        .to_path_buf();
    match fs::metadata(&parent) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => return Err(FsError::ParentNotDirectory { path: parent }),
        Err(_) => return Err(FsError::ParentMissing { path: parent }),
    }

    let check_target = |target: &Path| -> FsResult<()> {
        match target_state(target)? {
            Some(meta) if meta.file_type().is_symlink() => Err(FsError::SymlinkTarget {
                path: target.to_path_buf(),
            }),
            Some(_) if mode == WriteMode::FailIfExists => Err(FsError::FileExists {
                path: target.to_path_buf(),
            }),
            _ => Ok(()),
        }
    };
    check_target(&target)?;

    let write_err = |source| FsError::Write {
        path: target.clone(),
        source,
    };
    let mut staged = Builder::new()
        .prefix(STAGING_PREFIX)
        .suffix(".tmp")
        .tempfile_in(&parent)
        .map_err(write_err)?;
    staged.write_all(bytes).map_err(write_err)?;
    staged.as_file().sync_all().map_err(write_err)?;

    // The target may have appeared while the payload was being written.
    check_target(&target)?;
    let persisted = match mode {
        WriteMode::Overwrite => staged.persist(&target),
        WriteMode::FailIfExists => staged.persist_noclobber(&target),
    };
    persisted.map_err(|err| match err.error.kind() {
        io::ErrorKind::AlreadyExists => FsError::FileExists {
            path: target.clone(),
        },
        _ => write_err(err.error),
    })?;

    debug!(path = %target.display(), bytes = bytes.len(), "file written");
    Ok(bytes.len() as u64)
}
