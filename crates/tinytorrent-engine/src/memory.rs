//! In-process engine used by the binary and by tests.
//!
//! # Design
//! - All state sits behind a single mutex held only for the duration of one call.
//! - The published snapshot is rebuilt lazily after a mutation; untouched state hands
//!   out the same `Arc` so pointer identity doubles as change detection.
//! - Every mutation that alters an observable field bumps the torrent `revision`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use url::Url;

use crate::error::{EngineError, EngineResult};
use crate::model::{
    AddTorrentRequest, AddTorrentStatus, CoreSettings, EngineSnapshot, HistoryBucket, QueueMove,
    SessionUpdate, SpeedLimitUpdate, TorrentBandwidthLimits, TorrentDetail, TorrentFile,
    TorrentId, TorrentSeedLimits, TorrentSnapshot, TorrentSource, TorrentStatus, TrackerEntry,
    TransferStats,
};
use crate::service::TorrentEngine;

const MAGNET_PREFIX: &str = "magnet:?";
const BTIH_PREFIX: &str = "urn:btih:";
const DEFAULT_PIECE_SIZE: u64 = 256 * 1024;

#[derive(Debug, Clone, PartialEq)]
struct TorrentEntry {
    summary: TorrentSnapshot,
    trackers: Vec<TrackerEntry>,
    files_wanted: BTreeMap<i32, bool>,
}

#[derive(Debug, Clone, Copy)]
struct HistorySample {
    timestamp: i64,
    downloaded: u64,
    uploaded: u64,
}

#[derive(Debug)]
struct MemoryState {
    torrents: BTreeMap<TorrentId, TorrentEntry>,
    next_id: TorrentId,
    settings: CoreSettings,
    blocklist_entries: u64,
    blocklist_updated: Option<DateTime<Utc>>,
    history: Vec<HistorySample>,
    files_added: u64,
    stopped: bool,
    published: Option<Arc<EngineSnapshot>>,
}

impl MemoryState {
    fn ensure_running(&self) -> EngineResult<()> {
        if self.stopped {
            Err(EngineError::Stopped)
        } else {
            Ok(())
        }
    }

    fn touch<F>(&mut self, ids: &[TorrentId], mut apply: F)
    where
        F: FnMut(&mut TorrentEntry),
    {
        let mut changed = false;
        for id in ids {
            if let Some(entry) = self.torrents.get_mut(id) {
                let before = entry.clone();
                apply(entry);
                if *entry != before {
                    entry.summary.revision += 1;
                    changed = true;
                }
            }
        }
        if changed {
            self.published = None;
        }
    }

    fn touch_all<F>(&mut self, apply: F)
    where
        F: FnMut(&mut TorrentEntry),
    {
        let ids: Vec<TorrentId> = self.torrents.keys().copied().collect();
        self.touch(&ids, apply);
    }

    fn renumber_queue(&mut self, order: &[TorrentId]) {
        for (position, id) in order.iter().enumerate() {
            if let Some(entry) = self.torrents.get_mut(id) {
                let position = i32::try_from(position).unwrap_or(i32::MAX);
                if entry.summary.queue_position != position {
                    entry.summary.queue_position = position;
                    entry.summary.revision += 1;
                }
            }
        }
        self.published = None;
    }

    fn queue_order(&self) -> Vec<TorrentId> {
        let mut order: Vec<(i32, TorrentId)> = self
            .torrents
            .values()
            .map(|entry| (entry.summary.queue_position, entry.summary.id))
            .collect();
        order.sort_unstable();
        order.into_iter().map(|(_, id)| id).collect()
    }
}

/// Engine keeping every torrent in memory without touching the network.
#[derive(Debug)]
pub struct InMemoryEngine {
    state: Mutex<MemoryState>,
    started: Instant,
}

impl Default for InMemoryEngine {
    fn default() -> Self {
        Self::new(CoreSettings::default())
    }
}

impl InMemoryEngine {
    /// Construct an engine seeded with the given settings.
    #[must_use]
    pub fn new(settings: CoreSettings) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                torrents: BTreeMap::new(),
                next_id: 1,
                settings,
                blocklist_entries: 0,
                blocklist_updated: None,
                history: Vec::new(),
                files_added: 0,
                stopped: false,
                published: None,
            }),
            started: Instant::now(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mutate<F>(&self, ids: &[TorrentId], apply: F) -> EngineResult<()>
    where
        F: FnMut(&mut TorrentEntry),
    {
        let mut state = self.lock();
        state.ensure_running()?;
        state.touch(ids, apply);
        Ok(())
    }

    /// Update download progress; reaching 1.0 marks the torrent finished and seeding.
    pub fn set_progress(&self, id: TorrentId, progress: f64) {
        let progress = progress.clamp(0.0, 1.0);
        let mut state = self.lock();
        state.touch(&[id], |entry| {
            let summary = &mut entry.summary;
            summary.progress = progress;
            #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
            let done = (summary.total_size as f64 * progress) as i64;
            summary.downloaded = done;
            summary.left_until_done = summary.total_size - done;
            if progress >= 1.0 {
                summary.is_finished = true;
                if summary.status.is_active() {
                    summary.status = TorrentStatus::Seeding;
                }
            }
        });
    }

    /// Mark a torrent complete.
    pub fn finish(&self, id: TorrentId) {
        self.set_progress(id, 1.0);
    }

    /// Set transfer rates for a torrent.
    pub fn set_rates(&self, id: TorrentId, download: u64, upload: u64) {
        self.lock().touch(&[id], |entry| {
            entry.summary.download_rate = download;
            entry.summary.upload_rate = upload;
        });
    }

    /// Report a torrent level error.
    pub fn set_error(&self, id: TorrentId, code: i32, message: &str) {
        self.lock().touch(&[id], |entry| {
            entry.summary.error = code;
            entry.summary.error_string = message.to_string();
        });
    }

    /// Replace the blocklist rule count and stamp the update time.
    pub fn set_blocklist_entries(&self, count: u64) {
        let mut state = self.lock();
        state.blocklist_entries = count;
        state.blocklist_updated = Some(Utc::now());
    }

    /// Append a transfer history sample.
    pub fn record_history(&self, timestamp: i64, downloaded: u64, uploaded: u64) {
        self.lock().history.push(HistorySample {
            timestamp,
            downloaded,
            uploaded,
        });
    }

    /// Whether `stop` has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.lock().stopped
    }
}

fn parse_magnet(uri: &str) -> Option<(String, Option<String>)> {
    if !uri.starts_with(MAGNET_PREFIX) {
        return None;
    }
    let parsed = Url::parse(uri).ok()?;
    let mut hash = None;
    let mut name = None;
    for (key, value) in parsed.query_pairs() {
        match key.as_ref() {
            "xt" => {
                if let Some(rest) = value.strip_prefix(BTIH_PREFIX) {
                    if !rest.is_empty() {
                        hash = Some(rest.to_ascii_lowercase());
                    }
                }
            }
            "dn" if !value.is_empty() => name = Some(value.into_owned()),
            _ => {}
        }
    }
    hash.map(|hash| (hash, name))
}

fn metainfo_digest(bytes: &[u8]) -> String {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    format!("{hash:040x}")
}

fn detail_for(entry: &TorrentEntry) -> TorrentDetail {
    let summary = entry.summary.clone();
    let length = u64::try_from(summary.total_size).unwrap_or(0);
    let completed = u64::try_from(summary.downloaded).unwrap_or(0);
    let piece_count = length.div_ceil(DEFAULT_PIECE_SIZE);
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss, clippy::cast_sign_loss)]
    let done_pieces = (piece_count as f64 * summary.progress) as u64;
    let mut detail = TorrentDetail::bare(summary);
    detail.files = vec![TorrentFile {
        index: 0,
        name: detail.summary.name.clone(),
        length,
        bytes_completed: completed,
        progress: detail.summary.progress,
        priority: detail.summary.bandwidth_priority - 1,
        wanted: entry.files_wanted.get(&0).copied().unwrap_or(true),
    }];
    detail.trackers.clone_from(&entry.trackers);
    detail.piece_count = piece_count;
    detail.piece_size = DEFAULT_PIECE_SIZE;
    detail.piece_states = (0..piece_count).map(|index| u8::from(index < done_pieces)).collect();
    detail.piece_availability = vec![0; usize::try_from(piece_count).unwrap_or(0)];
    detail
}

impl TorrentEngine for InMemoryEngine {
    fn snapshot(&self) -> Arc<EngineSnapshot> {
        let mut state = self.lock();
        if let Some(published) = &state.published {
            return Arc::clone(published);
        }
        let torrents = state
            .torrents
            .values()
            .map(|entry| entry.summary.clone())
            .collect();
        let seconds_active = self.started.elapsed().as_secs();
        let (downloaded, uploaded) = state.torrents.values().fold((0u64, 0u64), |acc, entry| {
            (
                acc.0 + u64::try_from(entry.summary.downloaded).unwrap_or(0),
                acc.1 + u64::try_from(entry.summary.uploaded).unwrap_or(0),
            )
        });
        let current = TransferStats {
            uploaded_bytes: uploaded,
            downloaded_bytes: downloaded,
            files_added: state.files_added,
            seconds_active,
            session_count: 1,
        };
        let snapshot = Arc::new(EngineSnapshot::from_torrents(torrents, 0, current, current));
        state.published = Some(Arc::clone(&snapshot));
        snapshot
    }

    fn settings(&self) -> CoreSettings {
        self.lock().settings.clone()
    }

    fn add_torrent(&self, request: AddTorrentRequest) -> EngineResult<AddTorrentStatus> {
        let (hash, name) = match &request.source {
            TorrentSource::Uri(uri) => match parse_magnet(uri) {
                Some((hash, name)) => {
                    let name = name.unwrap_or_else(|| hash.clone());
                    (hash, name)
                }
                None => return Ok(AddTorrentStatus::InvalidUri),
            },
            TorrentSource::Metainfo(bytes) => {
                let hash = metainfo_digest(bytes);
                let name = format!("torrent-{}", &hash[hash.len() - 8..]);
                (hash, name)
            }
        };

        let mut state = self.lock();
        state.ensure_running()?;
        if state
            .torrents
            .values()
            .any(|entry| entry.summary.hash == hash)
        {
            debug!(hash = %hash, "torrent already present");
            return Ok(AddTorrentStatus::Queued);
        }

        let id = state.next_id;
        state.next_id += 1;
        state.files_added += 1;
        let queue_position = i32::try_from(state.torrents.len()).unwrap_or(i32::MAX);
        let summary = TorrentSnapshot {
            id,
            hash,
            name,
            status: if request.paused {
                TorrentStatus::Stopped
            } else {
                TorrentStatus::Downloading
            },
            eta: -1,
            added_time: Utc::now().timestamp(),
            queue_position,
            download_dir: request.download_dir.display().to_string(),
            labels: request.labels,
            bandwidth_priority: 1,
            revision: 1,
            ..TorrentSnapshot::default()
        };
        info!(torrent_id = id, name = %summary.name, "torrent admitted");
        state.torrents.insert(
            id,
            TorrentEntry {
                summary,
                trackers: Vec::new(),
                files_wanted: BTreeMap::new(),
            },
        );
        state.published = None;
        Ok(AddTorrentStatus::Queued)
    }

    fn torrent_detail(&self, id: TorrentId) -> EngineResult<Option<TorrentDetail>> {
        Ok(self.lock().torrents.get(&id).map(detail_for))
    }

    fn start_torrents(&self, ids: &[TorrentId], now: bool) -> EngineResult<()> {
        debug!(count = ids.len(), now, "starting torrents");
        self.mutate(ids, |entry| {
            entry.summary.status = if entry.summary.is_finished {
                TorrentStatus::Seeding
            } else {
                TorrentStatus::Downloading
            };
        })
    }

    fn stop_torrents(&self, ids: &[TorrentId]) -> EngineResult<()> {
        self.mutate(ids, |entry| {
            entry.summary.status = TorrentStatus::Stopped;
            entry.summary.download_rate = 0;
            entry.summary.upload_rate = 0;
        })
    }

    fn verify_torrents(&self, ids: &[TorrentId]) -> EngineResult<()> {
        self.mutate(ids, |entry| entry.summary.status = TorrentStatus::CheckWait)
    }

    fn remove_torrents(&self, ids: &[TorrentId], delete_data: bool) -> EngineResult<()> {
        let mut state = self.lock();
        state.ensure_running()?;
        for id in ids {
            if state.torrents.remove(id).is_some() {
                info!(torrent_id = id, delete_data, "torrent removed");
            }
        }
        let order = state.queue_order();
        state.renumber_queue(&order);
        Ok(())
    }

    fn reannounce_torrents(&self, ids: &[TorrentId]) -> EngineResult<()> {
        let state = self.lock();
        state.ensure_running()?;
        debug!(count = ids.len(), "reannounce requested");
        Ok(())
    }

    fn queue_move(&self, ids: &[TorrentId], direction: QueueMove) -> EngineResult<()> {
        let mut state = self.lock();
        state.ensure_running()?;
        let mut order = state.queue_order();
        match direction {
            QueueMove::Top => {
                let (moved, rest): (Vec<_>, Vec<_>) =
                    order.into_iter().partition(|id| ids.contains(id));
                order = moved.into_iter().chain(rest).collect();
            }
            QueueMove::Bottom => {
                let (moved, rest): (Vec<_>, Vec<_>) =
                    order.into_iter().partition(|id| ids.contains(id));
                order = rest.into_iter().chain(moved).collect();
            }
            QueueMove::Up => {
                for index in 1..order.len() {
                    if ids.contains(&order[index]) && !ids.contains(&order[index - 1]) {
                        order.swap(index, index - 1);
                    }
                }
            }
            QueueMove::Down => {
                for index in (0..order.len().saturating_sub(1)).rev() {
                    if ids.contains(&order[index]) && !ids.contains(&order[index + 1]) {
                        order.swap(index, index + 1);
                    }
                }
            }
        }
        state.renumber_queue(&order);
        Ok(())
    }

    fn pause_all(&self) -> EngineResult<()> {
        let mut state = self.lock();
        state.ensure_running()?;
        state.touch_all(|entry| {
            entry.summary.status = TorrentStatus::Stopped;
            entry.summary.download_rate = 0;
            entry.summary.upload_rate = 0;
        });
        Ok(())
    }

    fn resume_all(&self) -> EngineResult<()> {
        let mut state = self.lock();
        state.ensure_running()?;
        state.touch_all(|entry| {
            entry.summary.status = if entry.summary.is_finished {
                TorrentStatus::Seeding
            } else {
                TorrentStatus::Downloading
            };
        });
        Ok(())
    }

    fn toggle_file_selection(
        &self,
        ids: &[TorrentId],
        files: &[i32],
        wanted: bool,
    ) -> EngineResult<()> {
        self.mutate(ids, |entry| {
            for file in files {
                entry.files_wanted.insert(*file, wanted);
            }
        })
    }

    fn add_trackers(&self, ids: &[TorrentId], trackers: &[TrackerEntry]) -> EngineResult<()> {
        self.mutate(ids, |entry| {
            for tracker in trackers {
                if !entry
                    .trackers
                    .iter()
                    .any(|existing| existing.announce == tracker.announce)
                {
                    entry.trackers.push(tracker.clone());
                }
            }
        })
    }

    fn remove_trackers(&self, ids: &[TorrentId], announces: &[String]) -> EngineResult<()> {
        self.mutate(ids, |entry| {
            entry
                .trackers
                .retain(|tracker| !announces.contains(&tracker.announce));
        })
    }

    fn replace_trackers(&self, ids: &[TorrentId], trackers: &[TrackerEntry]) -> EngineResult<()> {
        self.mutate(ids, |entry| entry.trackers = trackers.to_vec())
    }

    fn set_bandwidth_priority(&self, ids: &[TorrentId], priority: i32) -> EngineResult<()> {
        self.mutate(ids, |entry| entry.summary.bandwidth_priority = priority)
    }

    fn set_bandwidth_limits(
        &self,
        ids: &[TorrentId],
        limits: TorrentBandwidthLimits,
    ) -> EngineResult<()> {
        debug!(count = ids.len(), ?limits, "torrent bandwidth limits updated");
        self.mutate(ids, |_| {})
    }

    fn set_seed_limits(&self, ids: &[TorrentId], limits: TorrentSeedLimits) -> EngineResult<()> {
        debug!(count = ids.len(), ?limits, "torrent seed limits updated");
        self.mutate(ids, |_| {})
    }

    fn set_labels(&self, ids: &[TorrentId], labels: &[String]) -> EngineResult<()> {
        self.mutate(ids, |entry| entry.summary.labels = labels.to_vec())
    }

    fn set_sequential(&self, ids: &[TorrentId], enabled: bool) -> EngineResult<()> {
        self.mutate(ids, |entry| entry.summary.sequential_download = enabled)
    }

    fn set_super_seeding(&self, ids: &[TorrentId], enabled: bool) -> EngineResult<()> {
        self.mutate(ids, |entry| entry.summary.super_seeding = enabled)
    }

    fn move_location(
        &self,
        ids: &[TorrentId],
        destination: &Path,
        move_data: bool,
    ) -> EngineResult<()> {
        let destination = destination.display().to_string();
        debug!(count = ids.len(), destination = %destination, move_data, "relocating torrents");
        self.mutate(ids, |entry| entry.summary.download_dir.clone_from(&destination))
    }

    fn rename_path(&self, id: TorrentId, path: &str, name: &str) -> EngineResult<bool> {
        let mut state = self.lock();
        state.ensure_running()?;
        let known = state
            .torrents
            .get(&id)
            .is_some_and(|entry| entry.summary.name == path);
        if known {
            state.touch(&[id], |entry| entry.summary.name = name.to_string());
        }
        Ok(known)
    }

    fn set_download_dir(&self, path: PathBuf) -> EngineResult<()> {
        let mut state = self.lock();
        state.ensure_running()?;
        state.settings.download_dir = path;
        Ok(())
    }

    fn set_listen_port(&self, port: u16) -> EngineResult<()> {
        let mut state = self.lock();
        state.ensure_running()?;
        let host = state
            .settings
            .listen_interface
            .rsplit_once(':')
            .map_or("0.0.0.0", |(host, _)| host)
            .to_string();
        state.settings.listen_interface = format!("{host}:{port}");
        Ok(())
    }

    fn set_speed_limits(&self, limits: SpeedLimitUpdate) -> EngineResult<()> {
        let mut state = self.lock();
        state.ensure_running()?;
        let settings = &mut state.settings;
        if let Some(value) = limits.download_kbps {
            settings.download_rate_limit_kbps = value;
        }
        if let Some(value) = limits.download_enabled {
            settings.download_rate_limit_enabled = value;
        }
        if let Some(value) = limits.upload_kbps {
            settings.upload_rate_limit_kbps = value;
        }
        if let Some(value) = limits.upload_enabled {
            settings.upload_rate_limit_enabled = value;
        }
        Ok(())
    }

    fn set_peer_limits(&self, global: Option<i32>, per_torrent: Option<i32>) -> EngineResult<()> {
        let mut state = self.lock();
        state.ensure_running()?;
        if let Some(value) = global {
            state.settings.peer_limit = value;
        }
        if let Some(value) = per_torrent {
            state.settings.peer_limit_per_torrent = value;
        }
        Ok(())
    }

    fn update_session(&self, update: SessionUpdate) -> EngineResult<()> {
        let mut state = self.lock();
        state.ensure_running()?;
        apply_session_update(&mut state.settings, update);
        Ok(())
    }

    fn request_blocklist_reload(&self) -> EngineResult<bool> {
        let mut state = self.lock();
        state.ensure_running()?;
        if state.settings.blocklist_path.is_none() {
            return Ok(false);
        }
        state.blocklist_updated = Some(Utc::now());
        Ok(true)
    }

    fn blocklist_entry_count(&self) -> u64 {
        self.lock().blocklist_entries
    }

    fn blocklist_last_update(&self) -> Option<DateTime<Utc>> {
        self.lock().blocklist_updated
    }

    fn history_data(&self, start: i64, end: i64, step: i64) -> EngineResult<Vec<HistoryBucket>> {
        let step = step.max(1);
        let state = self.lock();
        let mut buckets: BTreeMap<i64, HistoryBucket> = BTreeMap::new();
        for sample in state
            .history
            .iter()
            .filter(|sample| sample.timestamp >= start && sample.timestamp <= end)
        {
            // Widened so extreme bounds cannot overflow; the result lies in
            // `start..=sample.timestamp` and always fits back into an i64.
            let offset = i128::from(sample.timestamp) - i128::from(start);
            let aligned = i128::from(start) + offset / i128::from(step) * i128::from(step);
            let timestamp = i64::try_from(aligned).unwrap_or(sample.timestamp);
            let bucket = buckets.entry(timestamp).or_insert(HistoryBucket {
                timestamp,
                downloaded: 0,
                uploaded: 0,
                peak_down: 0,
                peak_up: 0,
            });
            bucket.downloaded = bucket.downloaded.saturating_add(sample.downloaded);
            bucket.uploaded = bucket.uploaded.saturating_add(sample.uploaded);
            bucket.peak_down = bucket.peak_down.max(sample.downloaded);
            bucket.peak_up = bucket.peak_up.max(sample.uploaded);
        }
        Ok(buckets.into_values().collect())
    }

    fn history_clear(&self, older_than: Option<i64>) -> EngineResult<()> {
        let mut state = self.lock();
        match older_than {
            Some(cutoff) => state.history.retain(|sample| sample.timestamp >= cutoff),
            None => state.history.clear(),
        }
        Ok(())
    }

    fn port_is_open(&self) -> bool {
        false
    }

    fn state_store_loaded(&self) -> bool {
        true
    }

    fn stop(&self) {
        let mut state = self.lock();
        if !state.stopped {
            info!("in-memory engine stopped");
            state.stopped = true;
        }
    }
}

fn apply_session_update(settings: &mut CoreSettings, update: SessionUpdate) {
    macro_rules! assign {
        ($($field:ident => $target:ident),* $(,)?) => {
            $(if let Some(value) = update.$field {
                settings.$target = value;
            })*
        };
    }
    assign!(
        alt_speed_down_kbps => alt_download_rate_limit_kbps,
        alt_speed_up_kbps => alt_upload_rate_limit_kbps,
        alt_speed_enabled => alt_speed_enabled,
        alt_speed_time_enabled => alt_speed_time_enabled,
        alt_speed_time_begin => alt_speed_time_begin,
        alt_speed_time_end => alt_speed_time_end,
        alt_speed_time_day => alt_speed_time_day,
        encryption => encryption,
        dht_enabled => dht_enabled,
        pex_enabled => pex_enabled,
        lpd_enabled => lpd_enabled,
        utp_enabled => utp_enabled,
        download_queue_size => download_queue_size,
        seed_queue_size => seed_queue_size,
        queue_stalled_enabled => queue_stalled_enabled,
        incomplete_dir_enabled => incomplete_dir_enabled,
        watch_dir_enabled => watch_dir_enabled,
        rename_partial_files => rename_partial_files,
        seed_ratio_limit => seed_ratio_limit,
        seed_ratio_enabled => seed_ratio_enabled,
        seed_idle_limit => seed_idle_limit,
        seed_idle_enabled => seed_idle_enabled,
        proxy_type => proxy_type,
        proxy_port => proxy_port,
        proxy_auth_enabled => proxy_auth_enabled,
        proxy_peer_connections => proxy_peer_connections,
    );
    if let Some(dir) = update.incomplete_dir {
        settings.incomplete_dir = Some(dir);
    }
    if let Some(dir) = update.watch_dir {
        settings.watch_dir = Some(dir);
    }
    if let Some(host) = update.proxy_hostname {
        settings.proxy_hostname = Some(host);
    }
    if let Some(user) = update.proxy_username {
        settings.proxy_username = Some(user);
    }
    if let Some(password) = update.proxy_password {
        settings.proxy_password = Some(password);
    }
    if let Some(enabled) = update.history_enabled {
        settings.history.enabled = enabled;
    }
    if let Some(interval) = update.history_interval_seconds {
        settings.history.interval_seconds = interval;
    }
    if let Some(days) = update.history_retention_days {
        settings.history.retention_days = days;
    }
}
