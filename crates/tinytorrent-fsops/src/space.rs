//! Free and total capacity of the filesystem holding a path.

use std::path::Path;

use crate::error::{FsError, FsResult};

/// Capacity figures in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpaceInfo {
    /// Bytes available to unprivileged writers.
    pub free: u64,
    /// Total size of the filesystem.
    pub total: u64,
}

/// Query capacity for the filesystem containing `path`.
///
/// # Errors
///
/// Returns [`FsError::SpaceQuery`] when the path cannot be inspected.
#[cfg(unix)]
pub fn query_space(path: &Path) -> FsResult<SpaceInfo> {
    use nix::sys::statvfs::statvfs;

    let stats = statvfs(path).map_err(|errno| FsError::SpaceQuery {
        path: path.to_path_buf(),
        source: std::io::Error::from(errno),
    })?;
    let fragment = u64::from(stats.fragment_size());
    Ok(SpaceInfo {
        free: u64::from(stats.blocks_available()).saturating_mul(fragment),
        total: u64::from(stats.blocks()).saturating_mul(fragment),
    })
}

/// Query capacity for the filesystem containing `path`.
///
/// # Errors
///
/// Always fails on platforms without `statvfs`.
#[cfg(not(unix))]
pub fn query_space(path: &Path) -> FsResult<SpaceInfo> {
    Err(FsError::SpaceQuery {
        path: path.to_path_buf(),
        source: std::io::Error::from(std::io::ErrorKind::Unsupported),
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn reports_capacity_for_temp_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let info = query_space(dir.path()).expect("space");
        assert!(info.total >= info.free);
        assert!(info.total > 0);
    }

    #[test]
    fn missing_path_fails() {
        let err = query_space(Path::new("/definitely/not/here")).expect_err("missing");
        assert_eq!(err.to_string(), "unable to query space");
    }
}
