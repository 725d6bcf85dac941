//! Engine trait consulted by the RPC layer and the live-update broadcaster.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{EngineError, EngineResult};
use crate::model::{
    AddTorrentRequest, AddTorrentStatus, CoreSettings, EngineSnapshot, HistoryBucket,
    HistoryConfig, QueueMove, SessionUpdate, SpeedLimitUpdate, TorrentBandwidthLimits,
    TorrentDetail, TorrentId, TorrentSeedLimits, TrackerEntry,
};

fn unsupported<T>(operation: &'static str) -> EngineResult<T> {
    Err(EngineError::Unsupported { operation })
}

/// Command and query surface of the torrent engine.
///
/// Calls are expected to return quickly: commands are queued inside the engine and
/// their effects surface in a later [`EngineSnapshot`]. Only `snapshot`, `settings`,
/// and `add_torrent` are mandatory; every other operation reports lack of support.
pub trait TorrentEngine: Send + Sync {
    /// Latest published snapshot. Unchanged state must return the same `Arc`.
    fn snapshot(&self) -> Arc<EngineSnapshot>;

    /// Effective session settings.
    fn settings(&self) -> CoreSettings;

    /// Queue a torrent for admission.
    ///
    /// # Errors
    ///
    /// Returns an error when the engine refuses the request outright.
    fn add_torrent(&self, request: AddTorrentRequest) -> EngineResult<AddTorrentStatus>;

    /// Expanded view of a single torrent.
    ///
    /// # Errors
    ///
    /// Defaults to [`EngineError::Unsupported`].
    fn torrent_detail(&self, id: TorrentId) -> EngineResult<Option<TorrentDetail>> {
        let _ = id;
        unsupported("torrent_detail")
    }

    /// Start torrents; `now` bypasses the download queue.
    ///
    /// # Errors
    ///
    /// Defaults to [`EngineError::Unsupported`].
    fn start_torrents(&self, ids: &[TorrentId], now: bool) -> EngineResult<()> {
        let _ = (ids, now);
        unsupported("start_torrents")
    }

    /// Stop torrents.
    ///
    /// # Errors
    ///
    /// Defaults to [`EngineError::Unsupported`].
    fn stop_torrents(&self, ids: &[TorrentId]) -> EngineResult<()> {
        let _ = ids;
        unsupported("stop_torrents")
    }

    /// Verify local data of torrents.
    ///
    /// # Errors
    ///
    /// Defaults to [`EngineError::Unsupported`].
    fn verify_torrents(&self, ids: &[TorrentId]) -> EngineResult<()> {
        let _ = ids;
        unsupported("verify_torrents")
    }

    /// Remove torrents, optionally deleting downloaded data.
    ///
    /// # Errors
    ///
    /// Defaults to [`EngineError::Unsupported`].
    fn remove_torrents(&self, ids: &[TorrentId], delete_data: bool) -> EngineResult<()> {
        let _ = (ids, delete_data);
        unsupported("remove_torrents")
    }

    /// Force a tracker announce.
    ///
    /// # Errors
    ///
    /// Defaults to [`EngineError::Unsupported`].
    fn reannounce_torrents(&self, ids: &[TorrentId]) -> EngineResult<()> {
        let _ = ids;
        unsupported("reannounce_torrents")
    }

    /// Reorder torrents within the queue.
    ///
    /// # Errors
    ///
    /// Defaults to [`EngineError::Unsupported`].
    fn queue_move(&self, ids: &[TorrentId], direction: QueueMove) -> EngineResult<()> {
        let _ = (ids, direction);
        unsupported("queue_move")
    }

    /// Stop every torrent.
    ///
    /// # Errors
    ///
    /// Defaults to [`EngineError::Unsupported`].
    fn pause_all(&self) -> EngineResult<()> {
        unsupported("pause_all")
    }

    /// Start every torrent.
    ///
    /// # Errors
    ///
    /// Defaults to [`EngineError::Unsupported`].
    fn resume_all(&self) -> EngineResult<()> {
        unsupported("resume_all")
    }

    /// Mark files as wanted or unwanted.
    ///
    /// # Errors
    ///
    /// Defaults to [`EngineError::Unsupported`].
    fn toggle_file_selection(
        &self,
        ids: &[TorrentId],
        files: &[i32],
        wanted: bool,
    ) -> EngineResult<()> {
        let _ = (ids, files, wanted);
        unsupported("toggle_file_selection")
    }

    /// Append trackers.
    ///
    /// # Errors
    ///
    /// Defaults to [`EngineError::Unsupported`].
    fn add_trackers(&self, ids: &[TorrentId], trackers: &[TrackerEntry]) -> EngineResult<()> {
        let _ = (ids, trackers);
        unsupported("add_trackers")
    }

    /// Remove trackers by announce URL.
    ///
    /// # Errors
    ///
    /// Defaults to [`EngineError::Unsupported`].
    fn remove_trackers(&self, ids: &[TorrentId], announces: &[String]) -> EngineResult<()> {
        let _ = (ids, announces);
        unsupported("remove_trackers")
    }

    /// Replace the tracker list.
    ///
    /// # Errors
    ///
    /// Defaults to [`EngineError::Unsupported`].
    fn replace_trackers(&self, ids: &[TorrentId], trackers: &[TrackerEntry]) -> EngineResult<()> {
        let _ = (ids, trackers);
        unsupported("replace_trackers")
    }

    /// Set bandwidth priority (0 low, 1 normal, 2 high).
    ///
    /// # Errors
    ///
    /// Defaults to [`EngineError::Unsupported`].
    fn set_bandwidth_priority(&self, ids: &[TorrentId], priority: i32) -> EngineResult<()> {
        let _ = (ids, priority);
        unsupported("set_bandwidth_priority")
    }

    /// Apply per-torrent transfer limits.
    ///
    /// # Errors
    ///
    /// Defaults to [`EngineError::Unsupported`].
    fn set_bandwidth_limits(
        &self,
        ids: &[TorrentId],
        limits: TorrentBandwidthLimits,
    ) -> EngineResult<()> {
        let _ = (ids, limits);
        unsupported("set_bandwidth_limits")
    }

    /// Apply per-torrent seeding stop criteria.
    ///
    /// # Errors
    ///
    /// Defaults to [`EngineError::Unsupported`].
    fn set_seed_limits(&self, ids: &[TorrentId], limits: TorrentSeedLimits) -> EngineResult<()> {
        let _ = (ids, limits);
        unsupported("set_seed_limits")
    }

    /// Replace torrent labels.
    ///
    /// # Errors
    ///
    /// Defaults to [`EngineError::Unsupported`].
    fn set_labels(&self, ids: &[TorrentId], labels: &[String]) -> EngineResult<()> {
        let _ = (ids, labels);
        unsupported("set_labels")
    }

    /// Toggle sequential piece picking.
    ///
    /// # Errors
    ///
    /// Defaults to [`EngineError::Unsupported`].
    fn set_sequential(&self, ids: &[TorrentId], enabled: bool) -> EngineResult<()> {
        let _ = (ids, enabled);
        unsupported("set_sequential")
    }

    /// Toggle super-seeding.
    ///
    /// # Errors
    ///
    /// Defaults to [`EngineError::Unsupported`].
    fn set_super_seeding(&self, ids: &[TorrentId], enabled: bool) -> EngineResult<()> {
        let _ = (ids, enabled);
        unsupported("set_super_seeding")
    }

    /// Relocate torrent storage, optionally moving existing data.
    ///
    /// # Errors
    ///
    /// Defaults to [`EngineError::Unsupported`].
    fn move_location(&self, ids: &[TorrentId], destination: &Path, move_data: bool) -> EngineResult<()> {
        let _ = (ids, destination, move_data);
        unsupported("move_location")
    }

    /// Rename a file or directory inside a torrent. Returns `false` when the path is unknown.
    ///
    /// # Errors
    ///
    /// Defaults to [`EngineError::Unsupported`].
    fn rename_path(&self, id: TorrentId, path: &str, name: &str) -> EngineResult<bool> {
        let _ = (id, path, name);
        unsupported("rename_path")
    }

    /// Change the default download directory.
    ///
    /// # Errors
    ///
    /// Defaults to [`EngineError::Unsupported`].
    fn set_download_dir(&self, path: PathBuf) -> EngineResult<()> {
        let _ = path;
        unsupported("set_download_dir")
    }

    /// Rebind the peer listen port.
    ///
    /// # Errors
    ///
    /// Defaults to [`EngineError::Unsupported`].
    fn set_listen_port(&self, port: u16) -> EngineResult<()> {
        let _ = port;
        unsupported("set_listen_port")
    }

    /// Apply session speed limits.
    ///
    /// # Errors
    ///
    /// Defaults to [`EngineError::Unsupported`].
    fn set_speed_limits(&self, limits: SpeedLimitUpdate) -> EngineResult<()> {
        let _ = limits;
        unsupported("set_speed_limits")
    }

    /// Apply global and per-torrent peer limits.
    ///
    /// # Errors
    ///
    /// Defaults to [`EngineError::Unsupported`].
    fn set_peer_limits(&self, global: Option<i32>, per_torrent: Option<i32>) -> EngineResult<()> {
        let _ = (global, per_torrent);
        unsupported("set_peer_limits")
    }

    /// Apply the remaining session settings.
    ///
    /// # Errors
    ///
    /// Defaults to [`EngineError::Unsupported`].
    fn update_session(&self, update: SessionUpdate) -> EngineResult<()> {
        let _ = update;
        unsupported("update_session")
    }

    /// Reload the peer blocklist. Returns `false` when no blocklist is configured.
    ///
    /// # Errors
    ///
    /// Defaults to [`EngineError::Unsupported`].
    fn request_blocklist_reload(&self) -> EngineResult<bool> {
        unsupported("request_blocklist_reload")
    }

    /// Number of loaded blocklist rules.
    fn blocklist_entry_count(&self) -> u64 {
        0
    }

    /// Time of the last successful blocklist load.
    fn blocklist_last_update(&self) -> Option<DateTime<Utc>> {
        None
    }

    /// Transfer history recording configuration.
    fn history_config(&self) -> HistoryConfig {
        self.settings().history
    }

    /// Aggregated transfer history between `start` and `end` (unix seconds).
    ///
    /// # Errors
    ///
    /// Defaults to [`EngineError::Unsupported`].
    fn history_data(&self, start: i64, end: i64, step: i64) -> EngineResult<Vec<HistoryBucket>> {
        let _ = (start, end, step);
        unsupported("history_data")
    }

    /// Drop history older than the given unix timestamp, or everything.
    ///
    /// # Errors
    ///
    /// Defaults to [`EngineError::Unsupported`].
    fn history_clear(&self, older_than: Option<i64>) -> EngineResult<()> {
        let _ = older_than;
        unsupported("history_clear")
    }

    /// Result of the last incoming-port probe.
    fn port_is_open(&self) -> bool {
        false
    }

    /// Whether persisted torrent state finished loading.
    fn state_store_loaded(&self) -> bool {
        true
    }

    /// Last listen socket failure, if any.
    fn listen_error(&self) -> Option<String> {
        None
    }

    /// Halt the engine; later commands may fail with [`EngineError::Stopped`].
    fn stop(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TorrentSource;

    #[derive(Default)]
    struct StubEngine {
        snapshot: Arc<EngineSnapshot>,
    }

    impl TorrentEngine for StubEngine {
        fn snapshot(&self) -> Arc<EngineSnapshot> {
            Arc::clone(&self.snapshot)
        }

        fn settings(&self) -> CoreSettings {
            CoreSettings::default()
        }

        fn add_torrent(&self, request: AddTorrentRequest) -> EngineResult<AddTorrentStatus> {
            let _ = request;
            Ok(AddTorrentStatus::Queued)
        }
    }

    fn assert_unsupported<T: std::fmt::Debug>(result: EngineResult<T>, operation: &str) {
        match result {
            Err(EngineError::Unsupported { operation: op }) => assert_eq!(op, operation),
            other => panic!("expected unsupported {operation}, got {other:?}"),
        }
    }

    #[test]
    fn default_operations_report_unsupported() {
        let engine = StubEngine::default();
        assert_unsupported(engine.torrent_detail(1), "torrent_detail");
        assert_unsupported(engine.start_torrents(&[1], false), "start_torrents");
        assert_unsupported(engine.queue_move(&[1], QueueMove::Top), "queue_move");
        assert_unsupported(engine.rename_path(1, "a", "b"), "rename_path");
        assert_unsupported(engine.set_listen_port(51413), "set_listen_port");
        assert_unsupported(engine.history_data(0, 60, 60), "history_data");
        assert_unsupported(engine.request_blocklist_reload(), "request_blocklist_reload");
    }

    #[test]
    fn default_queries_are_benign() {
        let engine = StubEngine::default();
        assert_eq!(engine.blocklist_entry_count(), 0);
        assert!(engine.blocklist_last_update().is_none());
        assert!(engine.state_store_loaded());
        assert!(!engine.port_is_open());
        assert_eq!(engine.history_config(), HistoryConfig::default());
        assert!(Arc::ptr_eq(&engine.snapshot(), &engine.snapshot()));
        let status = engine
            .add_torrent(AddTorrentRequest {
                source: TorrentSource::Uri("magnet:?xt=urn:btih:abc".into()),
                download_dir: PathBuf::from("/tmp"),
                paused: false,
                labels: Vec::new(),
            })
            .expect("add torrent");
        assert_eq!(status, AddTorrentStatus::Queued);
    }
}
