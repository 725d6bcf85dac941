//! Snapshot, settings, and command DTOs exchanged with the torrent engine.
//!
//! # Design
//! - Snapshots are immutable once published; the engine replaces them wholesale.
//! - Field names on the wire follow Transmission RPC spelling.
//! - Every torrent snapshot carries a `revision` that moves whenever an observable field does.

use std::path::PathBuf;

use serde::{Serialize, Serializer};

/// Numeric identifier assigned to a torrent by the engine.
pub type TorrentId = i64;

/// Transmission-compatible torrent activity state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TorrentStatus {
    /// Torrent is stopped.
    #[default]
    Stopped,
    /// Queued for local data verification.
    CheckWait,
    /// Verifying local data.
    Checking,
    /// Queued for download.
    DownloadWait,
    /// Downloading.
    Downloading,
    /// Queued for seeding.
    SeedWait,
    /// Seeding.
    Seeding,
}

impl TorrentStatus {
    /// Numeric status code used by Transmission clients.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Stopped => 0,
            Self::CheckWait => 1,
            Self::Checking => 2,
            Self::DownloadWait => 3,
            Self::Downloading => 4,
            Self::SeedWait => 5,
            Self::Seeding => 6,
        }
    }

    /// Whether the torrent is doing transfer work (not stopped).
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Stopped)
    }
}

impl Serialize for TorrentStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

/// Point-in-time view of a single torrent.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TorrentSnapshot {
    pub id: TorrentId,
    #[serde(rename = "hashString")]
    pub hash: String,
    pub name: String,
    pub total_size: i64,
    #[serde(rename = "percentDone")]
    pub progress: f64,
    pub status: TorrentStatus,
    #[serde(rename = "rateDownload")]
    pub download_rate: u64,
    #[serde(rename = "rateUpload")]
    pub upload_rate: u64,
    pub peers_connected: i32,
    pub peers_sending_to_us: i32,
    pub peers_getting_from_us: i32,
    pub eta: i64,
    #[serde(rename = "addedDate")]
    pub added_time: i64,
    pub queue_position: i32,
    #[serde(rename = "uploadRatio")]
    pub ratio: f64,
    #[serde(rename = "uploadedEver")]
    pub uploaded: i64,
    #[serde(rename = "downloadedEver")]
    pub downloaded: i64,
    pub download_dir: String,
    pub left_until_done: i64,
    pub size_when_done: i64,
    pub error: i32,
    pub error_string: String,
    pub sequential_download: bool,
    pub super_seeding: bool,
    pub is_finished: bool,
    pub labels: Vec<String>,
    pub bandwidth_priority: i32,
    /// Monotonic counter bumped whenever an observable field changes.
    pub revision: u64,
}

/// File entry within a torrent detail view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TorrentFile {
    pub index: i32,
    pub name: String,
    pub length: u64,
    pub bytes_completed: u64,
    pub progress: f64,
    pub priority: i32,
    pub wanted: bool,
}

/// Tracker entry supplied by clients or reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackerEntry {
    pub announce: String,
    pub tier: i32,
}

/// Connected peer within a torrent detail view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerSnapshot {
    pub address: String,
    pub client_is_choking: bool,
    pub client_is_interested: bool,
    pub peer_is_choking: bool,
    pub peer_is_interested: bool,
    pub client_name: String,
    pub rate_to_client: u64,
    pub rate_to_peer: u64,
    pub progress: f64,
    pub flag_str: String,
}

/// Expanded torrent view served when clients ask for files, trackers, peers, or pieces.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TorrentDetail {
    #[serde(flatten)]
    pub summary: TorrentSnapshot,
    pub files: Vec<TorrentFile>,
    pub trackers: Vec<TrackerEntry>,
    pub peers: Vec<PeerSnapshot>,
    pub piece_count: u64,
    pub piece_size: u64,
    pub piece_states: Vec<u8>,
    pub piece_availability: Vec<i32>,
}

impl TorrentDetail {
    /// Build a detail view with no file, tracker, peer, or piece information.
    #[must_use]
    pub const fn bare(summary: TorrentSnapshot) -> Self {
        Self {
            summary,
            files: Vec::new(),
            trackers: Vec::new(),
            peers: Vec::new(),
            piece_count: 0,
            piece_size: 0,
            piece_states: Vec::new(),
            piece_availability: Vec::new(),
        }
    }
}

/// Transfer counters reported under `cumulativeStats` and `currentStats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TransferStats {
    pub uploaded_bytes: u64,
    pub downloaded_bytes: u64,
    pub files_added: u64,
    pub seconds_active: u64,
    pub session_count: u64,
}

/// Aggregate session figures compared when deciding whether a patch carries session changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    #[serde(rename = "downloadSpeed")]
    pub download_rate: u64,
    #[serde(rename = "uploadSpeed")]
    pub upload_rate: u64,
    pub torrent_count: u64,
    pub active_torrent_count: u64,
    pub paused_torrent_count: u64,
    pub seeding_torrent_count: u64,
    pub error_torrent_count: u64,
    pub dht_nodes: u64,
}

/// Immutable view of the whole session published by the engine.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EngineSnapshot {
    pub stats: SessionStats,
    pub torrents: Vec<TorrentSnapshot>,
    pub cumulative_stats: TransferStats,
    pub current_stats: TransferStats,
}

impl EngineSnapshot {
    /// Derive aggregate counters from the supplied torrent list.
    #[must_use]
    pub fn from_torrents(
        torrents: Vec<TorrentSnapshot>,
        dht_nodes: u64,
        cumulative_stats: TransferStats,
        current_stats: TransferStats,
    ) -> Self {
        let mut stats = SessionStats {
            dht_nodes,
            ..SessionStats::default()
        };
        for torrent in &torrents {
            stats.download_rate += torrent.download_rate;
            stats.upload_rate += torrent.upload_rate;
            stats.torrent_count += 1;
            if torrent.status.is_active() {
                stats.active_torrent_count += 1;
            } else {
                stats.paused_torrent_count += 1;
            }
            if matches!(torrent.status, TorrentStatus::Seeding) {
                stats.seeding_torrent_count += 1;
            }
            if torrent.error != 0 {
                stats.error_torrent_count += 1;
            }
        }
        Self {
            stats,
            torrents,
            cumulative_stats,
            current_stats,
        }
    }

    /// Look up a torrent by identifier.
    #[must_use]
    pub fn torrent(&self, id: TorrentId) -> Option<&TorrentSnapshot> {
        self.torrents.iter().find(|torrent| torrent.id == id)
    }
}

/// Peer-connection encryption policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncryptionMode {
    /// Accept both encrypted and plain connections.
    #[default]
    Tolerated,
    /// Prefer encrypted connections.
    Preferred,
    /// Only allow encrypted connections.
    Required,
}

impl EncryptionMode {
    /// Transmission numeric encoding.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Tolerated => 0,
            Self::Preferred => 1,
            Self::Required => 2,
        }
    }
}

/// Effective engine settings reported by `session-get`.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreSettings {
    pub download_dir: PathBuf,
    pub listen_interface: String,
    pub download_rate_limit_kbps: i32,
    pub download_rate_limit_enabled: bool,
    pub upload_rate_limit_kbps: i32,
    pub upload_rate_limit_enabled: bool,
    pub peer_limit: i32,
    pub peer_limit_per_torrent: i32,
    pub alt_download_rate_limit_kbps: i32,
    pub alt_upload_rate_limit_kbps: i32,
    pub alt_speed_enabled: bool,
    pub alt_speed_time_enabled: bool,
    pub alt_speed_time_begin: i32,
    pub alt_speed_time_end: i32,
    pub alt_speed_time_day: i32,
    pub encryption: EncryptionMode,
    pub dht_enabled: bool,
    pub pex_enabled: bool,
    pub lpd_enabled: bool,
    pub utp_enabled: bool,
    pub download_queue_size: i32,
    pub seed_queue_size: i32,
    pub queue_stalled_enabled: bool,
    pub incomplete_dir: Option<PathBuf>,
    pub incomplete_dir_enabled: bool,
    pub watch_dir: Option<PathBuf>,
    pub watch_dir_enabled: bool,
    pub rename_partial_files: bool,
    pub seed_ratio_limit: f64,
    pub seed_ratio_enabled: bool,
    pub seed_idle_limit: i32,
    pub seed_idle_enabled: bool,
    pub proxy_type: i32,
    pub proxy_hostname: Option<String>,
    pub proxy_port: i32,
    pub proxy_auth_enabled: bool,
    pub proxy_username: Option<String>,
    pub proxy_password: Option<String>,
    pub proxy_peer_connections: bool,
    pub blocklist_enabled: bool,
    pub blocklist_path: Option<PathBuf>,
    pub history: HistoryConfig,
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("downloads"),
            listen_interface: "0.0.0.0:6881".to_string(),
            download_rate_limit_kbps: 0,
            download_rate_limit_enabled: false,
            upload_rate_limit_kbps: 0,
            upload_rate_limit_enabled: false,
            peer_limit: 200,
            peer_limit_per_torrent: 50,
            alt_download_rate_limit_kbps: 50,
            alt_upload_rate_limit_kbps: 50,
            alt_speed_enabled: false,
            alt_speed_time_enabled: false,
            alt_speed_time_begin: 540,
            alt_speed_time_end: 1020,
            alt_speed_time_day: 127,
            encryption: EncryptionMode::Tolerated,
            dht_enabled: true,
            pex_enabled: true,
            lpd_enabled: false,
            utp_enabled: true,
            download_queue_size: 5,
            seed_queue_size: 10,
            queue_stalled_enabled: true,
            incomplete_dir: None,
            incomplete_dir_enabled: false,
            watch_dir: None,
            watch_dir_enabled: false,
            rename_partial_files: true,
            seed_ratio_limit: 2.0,
            seed_ratio_enabled: false,
            seed_idle_limit: 30,
            seed_idle_enabled: false,
            proxy_type: 0,
            proxy_hostname: None,
            proxy_port: 0,
            proxy_auth_enabled: false,
            proxy_username: None,
            proxy_password: None,
            proxy_peer_connections: false,
            blocklist_enabled: false,
            blocklist_path: None,
            history: HistoryConfig::default(),
        }
    }
}

/// Session speed limit patch; absent fields are left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpeedLimitUpdate {
    pub download_kbps: Option<i32>,
    pub download_enabled: Option<bool>,
    pub upload_kbps: Option<i32>,
    pub upload_enabled: Option<bool>,
}

impl SpeedLimitUpdate {
    /// Whether any field is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.download_kbps.is_none()
            && self.download_enabled.is_none()
            && self.upload_kbps.is_none()
            && self.upload_enabled.is_none()
    }
}

/// Session-wide settings patch applied by `session-set`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionUpdate {
    pub alt_speed_down_kbps: Option<i32>,
    pub alt_speed_up_kbps: Option<i32>,
    pub alt_speed_enabled: Option<bool>,
    pub alt_speed_time_enabled: Option<bool>,
    pub alt_speed_time_begin: Option<i32>,
    pub alt_speed_time_end: Option<i32>,
    pub alt_speed_time_day: Option<i32>,
    pub encryption: Option<EncryptionMode>,
    pub dht_enabled: Option<bool>,
    pub pex_enabled: Option<bool>,
    pub lpd_enabled: Option<bool>,
    pub utp_enabled: Option<bool>,
    pub download_queue_size: Option<i32>,
    pub seed_queue_size: Option<i32>,
    pub queue_stalled_enabled: Option<bool>,
    pub incomplete_dir: Option<PathBuf>,
    pub incomplete_dir_enabled: Option<bool>,
    pub watch_dir: Option<PathBuf>,
    pub watch_dir_enabled: Option<bool>,
    pub rename_partial_files: Option<bool>,
    pub seed_ratio_limit: Option<f64>,
    pub seed_ratio_enabled: Option<bool>,
    pub seed_idle_limit: Option<i32>,
    pub seed_idle_enabled: Option<bool>,
    pub proxy_type: Option<i32>,
    pub proxy_hostname: Option<String>,
    pub proxy_port: Option<i32>,
    pub proxy_auth_enabled: Option<bool>,
    pub proxy_username: Option<String>,
    pub proxy_password: Option<String>,
    pub proxy_peer_connections: Option<bool>,
    pub history_enabled: Option<bool>,
    pub history_interval_seconds: Option<i32>,
    pub history_retention_days: Option<i32>,
}

/// Per-torrent bandwidth limits applied by `torrent-set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TorrentBandwidthLimits {
    pub download_kbps: Option<i32>,
    pub download_limited: Option<bool>,
    pub upload_kbps: Option<i32>,
    pub upload_limited: Option<bool>,
}

/// Per-torrent seeding stop criteria applied by `torrent-set`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TorrentSeedLimits {
    pub ratio_limit: Option<f64>,
    pub ratio_enabled: Option<bool>,
    pub ratio_mode: Option<i32>,
    /// Idle limit in seconds.
    pub idle_limit: Option<i32>,
    pub idle_enabled: Option<bool>,
    pub idle_mode: Option<i32>,
}

/// Queue reordering direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueMove {
    Top,
    Bottom,
    Up,
    Down,
}

/// Source describing how a torrent should be added to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TorrentSource {
    /// Magnet or remote URI.
    Uri(String),
    /// Raw `.torrent` metainfo bytes.
    Metainfo(Vec<u8>),
}

/// Request payload for admitting a torrent into the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddTorrentRequest {
    pub source: TorrentSource,
    pub download_dir: PathBuf,
    pub paused: bool,
    pub labels: Vec<String>,
}

/// Outcome of queueing a torrent addition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddTorrentStatus {
    /// Torrent was queued for admission.
    Queued,
    /// The supplied URI was not a usable magnet link.
    InvalidUri,
}

/// Recording configuration for the transfer history sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryConfig {
    pub enabled: bool,
    pub interval_seconds: i32,
    pub retention_days: i32,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 60,
            retention_days: 30,
        }
    }
}

/// Aggregated transfer totals for one history step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryBucket {
    pub timestamp: i64,
    pub downloaded: u64,
    pub uploaded: u64,
    pub peak_down: u64,
    pub peak_up: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn torrent(id: TorrentId, status: TorrentStatus) -> TorrentSnapshot {
        TorrentSnapshot {
            id,
            name: format!("t{id}"),
            status,
            download_rate: 10,
            upload_rate: 5,
            ..TorrentSnapshot::default()
        }
    }

    #[test]
    fn snapshot_aggregates_counts_and_rates() {
        let snapshot = EngineSnapshot::from_torrents(
            vec![
                torrent(1, TorrentStatus::Downloading),
                torrent(2, TorrentStatus::Stopped),
                torrent(3, TorrentStatus::Seeding),
            ],
            7,
            TransferStats::default(),
            TransferStats::default(),
        );
        assert_eq!(snapshot.stats.torrent_count, 3);
        assert_eq!(snapshot.stats.active_torrent_count, 2);
        assert_eq!(snapshot.stats.paused_torrent_count, 1);
        assert_eq!(snapshot.stats.seeding_torrent_count, 1);
        assert_eq!(snapshot.stats.download_rate, 30);
        assert_eq!(snapshot.stats.dht_nodes, 7);
        assert!(snapshot.torrent(2).is_some());
        assert!(snapshot.torrent(5).is_none());
    }

    #[test]
    fn torrent_snapshot_uses_transmission_field_names() {
        let value = serde_json::to_value(torrent(4, TorrentStatus::Seeding))
            .expect("serialize torrent");
        assert_eq!(value["id"], json!(4));
        assert_eq!(value["status"], json!(6));
        assert_eq!(value["rateDownload"], json!(10));
        assert!(value.get("hashString").is_some());
        assert!(value.get("percentDone").is_some());
        assert!(value.get("isFinished").is_some());
    }

    #[test]
    fn detail_flattens_summary_fields() {
        let detail = TorrentDetail::bare(torrent(8, TorrentStatus::Stopped));
        let value = serde_json::to_value(&detail).expect("serialize detail");
        assert_eq!(value["id"], json!(8));
        assert_eq!(value["files"], json!([]));
        assert_eq!(value["pieceCount"], json!(0));
    }
}
