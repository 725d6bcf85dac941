#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links
)]
#![allow(clippy::module_name_repetitions)]

//! Torrent engine abstraction consumed by the control plane.
//!
//! # Design
//! - The engine is reached through the synchronous [`TorrentEngine`] trait; calls queue
//!   work and return immediately.
//! - State is observed through immutable [`EngineSnapshot`] values shared via `Arc`.
//! - [`InMemoryEngine`] backs the binary and the test suites.

pub mod error;
pub mod memory;
pub mod model;
pub mod service;

pub use error::{EngineError, EngineResult};
pub use memory::InMemoryEngine;
pub use model::{
    AddTorrentRequest, AddTorrentStatus, CoreSettings, EncryptionMode,
    EngineSnapshot, HistoryBucket, HistoryConfig, PeerSnapshot, QueueMove, SessionStats,
    SessionUpdate, SpeedLimitUpdate, TorrentBandwidthLimits, TorrentDetail, TorrentFile,
    TorrentId, TorrentSeedLimits, TorrentSnapshot, TorrentSource, TorrentStatus, TrackerEntry,
    TransferStats,
};
pub use service::TorrentEngine;
