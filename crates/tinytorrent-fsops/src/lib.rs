#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links
)]
#![allow(clippy::module_name_repetitions)]

//! Filesystem helpers backing the path-mutating RPC methods.
//!
//! Every function here blocks; callers on the async runtime go through
//! `spawn_blocking`.

pub mod browse;
pub mod dirs;
pub mod error;
pub mod space;
pub mod write;

pub use browse::{DirectoryEntry, DirectoryListing, EntryKind, browse};
pub use dirs::{absolute_normalized, ensure_directory_exists, normalize_lexically};
pub use error::{
    CODE_METAINFO_READ, CODE_PATH_UNREACHABLE, CODE_PERMISSION_DENIED, FsError, FsResult,
};
pub use space::{SpaceInfo, query_space};
pub use write::{WriteMode, write_file_atomic};
