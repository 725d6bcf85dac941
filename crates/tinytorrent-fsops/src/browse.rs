//! Directory listings for the file picker.

use std::fs;
use std::path::{MAIN_SEPARATOR, Path};

use serde::Serialize;

use crate::dirs::normalize_lexically;
use crate::error::{FsError, FsResult};

/// Kind of a listed entry; the declaration order is the listing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Directory,
    File,
    Other,
}

/// One child of a browsed directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub size: u64,
}

/// Result of browsing a directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryListing {
    pub path: String,
    pub parent: String,
    pub separator: String,
    pub entries: Vec<DirectoryEntry>,
}

/// List the children of `path`, directories first, then by name.
///
/// Unreadable entries are reported as `other` with size zero.
///
/// # Errors
///
/// Returns [`FsError::NotFound`], [`FsError::NotADirectory`] or an IO failure
/// when the directory cannot be read.
pub fn browse(path: &Path) -> FsResult<DirectoryListing> {
    let normalized = normalize_lexically(path);
    let meta = fs::metadata(&normalized).map_err(|_| FsError::NotFound {
        path: normalized.clone(),
    })?;
    if !meta.is_dir() {
        return Err(FsError::NotADirectory { path: normalized });
    }

    let reader = fs::read_dir(&normalized).map_err(|source| FsError::Io {
        operation: "read_dir",
        path: normalized.clone(),
        source,
    })?;
    let mut entries: Vec<DirectoryEntry> = reader
        .filter_map(Result::ok)
        .map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            match entry.metadata() {
                Ok(meta) if meta.is_dir() => DirectoryEntry {
                    name,
                    kind: EntryKind::Directory,
                    size: 0,
                },
                Ok(meta) if meta.is_file() => DirectoryEntry {
                    name,
                    kind: EntryKind::File,
                    size: meta.len(),
                },
                _ => DirectoryEntry {
                    name,
                    kind: EntryKind::Other,
                    size: 0,
                },
            }
        })
        .collect();
    entries.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.name.cmp(&b.name)));

    let parent = normalized
        .parent()
        .map(|parent| parent.display().to_string())
        .unwrap_or_default();
    Ok(DirectoryListing {
        path: normalized.display().to_string(),
        parent,
        separator: MAIN_SEPARATOR.to_string(),
        entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lists_directories_before_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("b.txt"), b"hello").expect("write");
        fs::write(dir.path().join("a.txt"), b"").expect("write");
        fs::create_dir(dir.path().join("zeta")).expect("mkdir");

        let listing = browse(dir.path()).expect("browse");
        let names: Vec<&str> = listing.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "a.txt", "b.txt"]);
        assert_eq!(listing.entries[2].size, 5);
        assert_eq!(listing.separator, MAIN_SEPARATOR.to_string());
        assert_eq!(
            listing.parent,
            dir.path().parent().expect("parent").display().to_string()
        );

        let value = serde_json::to_value(&listing.entries[0]).expect("json");
        assert_eq!(value, json!({"name": "zeta", "type": "directory", "size": 0}));
    }

    #[test]
    fn missing_and_file_paths_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("nope");
        assert_eq!(
            browse(&missing).expect_err("missing").to_string(),
            "path does not exist"
        );
        let file = dir.path().join("file");
        fs::write(&file, b"x").expect("write");
        assert_eq!(
            browse(&file).expect_err("file").to_string(),
            "path is not a directory"
        );
    }
}
