//! Directory preparation and path normalisation.

use std::env;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::error::{FsError, FsResult};

const CREATE_FAILED: &str = "unable to create directory";

fn is_network_failure(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::NetworkUnreachable
            | io::ErrorKind::HostUnreachable
            | io::ErrorKind::TimedOut
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionRefused
    )
}

fn classify(path: &Path, source: io::Error, reason: &'static str) -> FsError {
    if is_network_failure(source.kind()) {
        FsError::PathUnreachable {
            path: path.to_path_buf(),
            source,
        }
    } else {
        FsError::PermissionDenied {
            path: path.to_path_buf(),
            reason,
            source: Some(source),
        }
    }
}

/// Create `path` and its parents, then confirm it is a writable directory.
///
/// # Errors
///
/// Returns [`FsError::PathUnreachable`] for network failures and
/// [`FsError::PermissionDenied`] for everything else, including an empty path.
pub fn ensure_directory_exists(path: &Path) -> FsResult<()> {
    if path.as_os_str().is_empty() {
        return Err(FsError::PermissionDenied {
            path: PathBuf::new(),
            reason: "empty path",
            source: None,
        });
    }
    if let Err(source) = fs::create_dir_all(path) {
        debug!(path = %path.display(), error = %source, "directory creation failed");
        return Err(classify(path, source, CREATE_FAILED));
    }
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => {
            return Err(FsError::PermissionDenied {
                path: path.to_path_buf(),
                reason: "destination exists and is not a directory",
                source: None,
            });
        }
        Err(source) => return Err(classify(path, source, CREATE_FAILED)),
    }
    // The scratch file is unlinked on creation and never outlives this call.
    tempfile::tempfile_in(path).map(drop).map_err(|source| {
        debug!(path = %path.display(), error = %source, "directory is not writable");
        classify(path, source, "directory is not writable")
    })
}

/// Resolve `.` and `..` components without touching the filesystem.
#[must_use]
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                Some(Component::CurDir | Component::ParentDir) | None => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() && !path.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Make `path` absolute against the current directory and normalise it.
///
/// # Errors
///
/// Returns an error when the current directory cannot be determined.
pub fn absolute_normalized(path: &Path) -> FsResult<PathBuf> {
    if path.is_absolute() {
        return Ok(normalize_lexically(path));
    }
    let cwd = env::current_dir().map_err(|source| FsError::Io {
        operation: "current_dir",
        path: path.to_path_buf(),
        source,
    })?;
    Ok(normalize_lexically(&cwd.join(path)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CODE_PATH_UNREACHABLE, CODE_PERMISSION_DENIED};

    #[test]
    fn creates_nested_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("a").join("b");
        ensure_directory_exists(&target).expect("create");
        assert!(target.is_dir());
        ensure_directory_exists(&target).expect("idempotent");
    }

    #[test]
    fn empty_path_is_permission_denied() {
        let err = ensure_directory_exists(Path::new("")).expect_err("empty path");
        assert_eq!(err.code(), Some(CODE_PERMISSION_DENIED));
        assert_eq!(err.to_string(), "permission denied");
    }

    #[test]
    fn file_in_the_way_is_permission_denied() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("occupied");
        fs::write(&file, b"x").expect("write");
        let err = ensure_directory_exists(&file).expect_err("file blocks directory");
        assert_eq!(err.code(), Some(CODE_PERMISSION_DENIED));
        assert!(err.detail().is_some());
    }

    #[cfg(unix)]
    #[test]
    fn read_only_directory_is_permission_denied() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let locked = dir.path().join("locked");
        fs::create_dir(&locked).expect("mkdir");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).expect("chmod");
        // Privileged users write through the mode bits; nothing to observe.
        if fs::write(locked.join("canary"), b"x").is_ok() {
            return;
        }
        let err = ensure_directory_exists(&locked).expect_err("read-only directory");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).expect("restore");
        assert_eq!(err.code(), Some(CODE_PERMISSION_DENIED));
        assert!(matches!(
            err,
            FsError::PermissionDenied {
                reason: "directory is not writable",
                ..
            }
        ));
    }

    #[test]
    fn network_errors_are_unreachable() {
        let err = classify(
            Path::new("/mnt/share"),
            io::Error::from(io::ErrorKind::TimedOut),
            CREATE_FAILED,
        );
        assert_eq!(err.code(), Some(CODE_PATH_UNREACHABLE));
        assert_eq!(err.to_string(), "path-unreachable");

        let err = classify(
            Path::new("/root"),
            io::Error::from(io::ErrorKind::PermissionDenied),
            CREATE_FAILED,
        );
        assert_eq!(err.code(), Some(CODE_PERMISSION_DENIED));
    }

    #[test]
    fn lexical_normalisation_folds_dots() {
        assert_eq!(
            normalize_lexically(Path::new("/data/./movies/../music")),
            PathBuf::from("/data/music")
        );
        assert_eq!(normalize_lexically(Path::new("/../etc")), PathBuf::from("/etc"));
        assert_eq!(normalize_lexically(Path::new("a/..")), PathBuf::from("."));
        assert_eq!(normalize_lexically(Path::new("../x")), PathBuf::from("../x"));
    }

    #[test]
    fn relative_paths_become_absolute() {
        let resolved = absolute_normalized(Path::new("downloads/./new")).expect("absolute");
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("downloads/new"));
    }
}
