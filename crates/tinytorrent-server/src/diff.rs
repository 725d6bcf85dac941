//! Snapshot comparison feeding `sync-patch` frames.

use std::collections::HashMap;

use tinytorrent_engine::{EngineSnapshot, TorrentId, TorrentSnapshot};
use tinytorrent_events::{Event, PatchPayload, TorrentDelta};

/// Changes between two engine snapshots.
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct SnapshotDiff {
    pub(crate) removed: Vec<TorrentId>,
    pub(crate) added: Vec<TorrentSnapshot>,
    pub(crate) updated: Vec<TorrentSnapshot>,
    pub(crate) finished: Vec<TorrentId>,
    pub(crate) session_changed: bool,
}

impl SnapshotDiff {
    /// Compare `current` against `previous`. A torrent counts as updated when
    /// its revision moved; it finishes when `is_finished` flips to true.
    pub(crate) fn between(previous: &EngineSnapshot, current: &EngineSnapshot) -> Self {
        let before: HashMap<TorrentId, &TorrentSnapshot> = previous
            .torrents
            .iter()
            .map(|torrent| (torrent.id, torrent))
            .collect();
        let after: HashMap<TorrentId, &TorrentSnapshot> = current
            .torrents
            .iter()
            .map(|torrent| (torrent.id, torrent))
            .collect();

        let mut diff = Self {
            session_changed: previous.stats != current.stats,
            ..Self::default()
        };
        diff.removed = previous
            .torrents
            .iter()
            .filter(|torrent| !after.contains_key(&torrent.id))
            .map(|torrent| torrent.id)
            .collect();
        for torrent in &current.torrents {
            match before.get(&torrent.id) {
                None => diff.added.push(torrent.clone()),
                Some(old) => {
                    if old.revision != torrent.revision {
                        diff.updated.push(torrent.clone());
                    }
                    if !old.is_finished && torrent.is_finished {
                        diff.finished.push(torrent.id);
                    }
                }
            }
        }
        diff
    }

    pub(crate) fn has_changes(&self) -> bool {
        self.session_changed
            || !self.added.is_empty()
            || !self.updated.is_empty()
            || !self.removed.is_empty()
    }

    /// Named events implied by the change: additions first, then completions.
    pub(crate) fn events(&self) -> Vec<Event> {
        self.added
            .iter()
            .map(|torrent| Event::TorrentAdded { id: torrent.id })
            .chain(self.finished.iter().map(|id| Event::TorrentFinished { id: *id }))
            .collect()
    }

    /// Patch body bringing a client from the previous snapshot to `current`.
    pub(crate) fn into_patch(self, current: &EngineSnapshot) -> PatchPayload {
        PatchPayload {
            session: current.stats,
            torrents: TorrentDelta {
                added: self.added,
                updated: self.updated,
                removed: self.removed,
            },
        }
    }
}
