//! WebSocket client registry and the rate-limited live-update broadcaster.
//!
//! # Design
//! - The event loop owns both [`ClientTable`] and [`Broadcaster`]; nothing here is shared.
//! - Each client carries a cursor: the snapshot it last received in full or by patch.
//!   Clients whose cursor is the broadcast baseline get patches, anyone else a fresh
//!   `sync-snapshot`.
//! - Change detection uses `Arc::ptr_eq`; the engine hands out the same `Arc` until its
//!   state moves.
//! - `torrent-added` and `torrent-finished` track their own baseline and go out on the
//!   tick that observes them; only `sync-patch` waits for [`PATCH_INTERVAL`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tinytorrent_engine::EngineSnapshot;
use tinytorrent_events::{Event, Frame, SnapshotPayload};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, trace};

use crate::diff::SnapshotDiff;

/// Minimum spacing between two `sync-patch` frames.
pub(crate) const PATCH_INTERVAL: Duration = Duration::from_millis(500);
/// Keep-alive ping spacing.
pub(crate) const PING_INTERVAL: Duration = Duration::from_secs(15);

pub(crate) type ClientId = u64;

/// Work queued for a socket task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outbound {
    Text(String),
    Ping,
    Close,
}

/// Render the full-state frame for `snapshot`.
pub(crate) fn snapshot_frame(snapshot: &EngineSnapshot) -> String {
    Frame::SyncSnapshot {
        data: SnapshotPayload::from_snapshot(snapshot),
    }
    .to_text()
}

struct Client {
    outbound: UnboundedSender<Outbound>,
    cursor: Arc<EngineSnapshot>,
}

/// Open WebSocket clients. A client whose socket task is gone is dropped on
/// the next send.
#[derive(Default)]
pub(crate) struct ClientTable {
    clients: BTreeMap<ClientId, Client>,
}

impl ClientTable {
    /// Send the initial snapshot and register the client at that cursor.
    pub(crate) fn open(
        &mut self,
        id: ClientId,
        outbound: UnboundedSender<Outbound>,
        snapshot: Arc<EngineSnapshot>,
    ) {
        if outbound.send(Outbound::Text(snapshot_frame(&snapshot))).is_err() {
            debug!(client = id, "websocket closed before the first snapshot");
            return;
        }
        debug!(client = id, "websocket client attached");
        self.clients.insert(
            id,
            Client {
                outbound,
                cursor: snapshot,
            },
        );
    }

    pub(crate) fn close(&mut self, id: ClientId) {
        if self.clients.remove(&id).is_some() {
            debug!(client = id, "websocket client detached");
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.clients.len()
    }

    /// Send `message` to every client.
    pub(crate) fn broadcast(&mut self, message: &Outbound) {
        self.clients
            .retain(|id, client| deliver(*id, client, message.clone()));
    }

    /// Send an event frame to every client.
    pub(crate) fn broadcast_event(&mut self, event: Event) {
        trace!(event = event.kind(), "broadcasting event");
        self.broadcast(&Outbound::Text(event.into_frame().to_text()));
    }

    /// Move every cursor to `target`: patch clients sitting on `baseline`
    /// (when a patch is given), resend full state to the rest.
    fn advance(
        &mut self,
        baseline: &Arc<EngineSnapshot>,
        target: &Arc<EngineSnapshot>,
        patch: Option<&str>,
    ) {
        let mut full_frame: Option<String> = None;
        self.clients.retain(|id, client| {
            if Arc::ptr_eq(&client.cursor, target) {
                return true;
            }
            let delivered = if Arc::ptr_eq(&client.cursor, baseline) {
                patch.is_none_or(|text| deliver(*id, client, Outbound::Text(text.to_string())))
            } else {
                let text = full_frame.get_or_insert_with(|| snapshot_frame(target));
                deliver(*id, client, Outbound::Text(text.clone()))
            };
            if delivered {
                client.cursor = Arc::clone(target);
            }
            delivered
        });
    }
}

fn deliver(id: ClientId, client: &Client, message: Outbound) -> bool {
    let sent = client.outbound.send(message).is_ok();
    if !sent {
        debug!(client = id, "dropping websocket client with closed channel");
    }
    sent
}

/// Baselines, pending snapshot and timers of the live-update channel.
pub(crate) struct Broadcaster {
    baseline: Arc<EngineSnapshot>,
    event_baseline: Arc<EngineSnapshot>,
    pending: Option<Arc<EngineSnapshot>>,
    blocklist_entries: u64,
    last_patch: Option<Instant>,
    last_ping: Instant,
    sequence: u64,
    patch_interval: Duration,
    ping_interval: Duration,
}

impl Broadcaster {
    pub(crate) fn new(baseline: Arc<EngineSnapshot>, blocklist_entries: u64, now: Instant) -> Self {
        Self::with_intervals(baseline, blocklist_entries, now, PATCH_INTERVAL, PING_INTERVAL)
    }

    pub(crate) fn with_intervals(
        baseline: Arc<EngineSnapshot>,
        blocklist_entries: u64,
        now: Instant,
        patch_interval: Duration,
        ping_interval: Duration,
    ) -> Self {
        Self {
            event_baseline: Arc::clone(&baseline),
            baseline,
            pending: None,
            blocklist_entries,
            last_patch: None,
            last_ping: now,
            sequence: 0,
            patch_interval,
            ping_interval,
        }
    }

    fn patch_due(&self, now: Instant) -> bool {
        self.last_patch
            .is_none_or(|sent| now.saturating_duration_since(sent) >= self.patch_interval)
    }

    /// One loop iteration of the live-update channel.
    pub(crate) fn tick(
        &mut self,
        now: Instant,
        snapshot: Arc<EngineSnapshot>,
        blocklist_entries: u64,
        clients: &mut ClientTable,
    ) {
        if clients.is_empty() {
            self.pending = None;
            self.baseline = Arc::clone(&snapshot);
            self.event_baseline = Arc::clone(&snapshot);
        } else if !Arc::ptr_eq(&self.baseline, &snapshot) {
            self.pending = Some(Arc::clone(&snapshot));
        }

        if !clients.is_empty() && self.patch_due(now) {
            if let Some(pending) = self.pending.take() {
                self.publish(now, pending, clients);
            }
        }

        if !Arc::ptr_eq(&self.event_baseline, &snapshot) {
            for event in SnapshotDiff::between(&self.event_baseline, &snapshot).events() {
                clients.broadcast_event(event);
            }
            self.event_baseline = snapshot;
        }

        if blocklist_entries != self.blocklist_entries {
            self.blocklist_entries = blocklist_entries;
            clients.broadcast_event(Event::BlocklistUpdated {
                count: blocklist_entries,
            });
        }

        if now.saturating_duration_since(self.last_ping) >= self.ping_interval {
            self.last_ping = now;
            clients.broadcast(&Outbound::Ping);
        }
    }

    fn publish(&mut self, now: Instant, pending: Arc<EngineSnapshot>, clients: &mut ClientTable) {
        let diff = SnapshotDiff::between(&self.baseline, &pending);
        if diff.has_changes() {
            self.sequence += 1;
            let frame = Frame::SyncPatch {
                sequence: self.sequence,
                data: diff.into_patch(&pending),
            }
            .to_text();
            debug!(sequence = self.sequence, clients = clients.len(), "sending sync-patch");
            clients.advance(&self.baseline, &pending, Some(&frame));
            self.last_patch = Some(now);
        } else {
            clients.advance(&self.baseline, &pending, None);
        }
        self.baseline = pending;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tinytorrent_engine::{TorrentId, TorrentSnapshot, TransferStats};
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn snapshot(torrents: &[(TorrentId, u64)]) -> Arc<EngineSnapshot> {
        let torrents = torrents
            .iter()
            .map(|(id, revision)| TorrentSnapshot {
                id: *id,
                revision: *revision,
                ..TorrentSnapshot::default()
            })
            .collect();
        Arc::new(EngineSnapshot::from_torrents(
            torrents,
            0,
            TransferStats::default(),
            TransferStats::default(),
        ))
    }

    fn drain(rx: &mut UnboundedReceiver<Outbound>) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(message) = rx.try_recv() {
            if let Outbound::Text(text) = message {
                frames.push(serde_json::from_str(&text).expect("json"));
            }
        }
        frames
    }

    fn kinds(frames: &[Value]) -> Vec<String> {
        frames
            .iter()
            .map(|frame| match frame["type"].as_str() {
                Some("event") => format!("event:{}", frame["event"].as_str().unwrap_or_default()),
                other => other.unwrap_or_default().to_string(),
            })
            .collect()
    }

    struct Fixture {
        start: Instant,
        broadcaster: Broadcaster,
        clients: ClientTable,
        rx: UnboundedReceiver<Outbound>,
    }

    fn fixture(initial: Arc<EngineSnapshot>) -> Fixture {
        let start = Instant::now();
        let broadcaster = Broadcaster::new(Arc::clone(&initial), 0, start);
        let mut clients = ClientTable::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        clients.open(1, tx, initial);
        assert_eq!(kinds(&drain(&mut rx)), vec!["sync-snapshot"]);
        Fixture {
            start,
            broadcaster,
            clients,
            rx,
        }
    }

    impl Fixture {
        fn tick(&mut self, at_ms: u64, snapshot: &Arc<EngineSnapshot>) -> Vec<Value> {
            let now = self.start + Duration::from_millis(at_ms);
            self.broadcaster
                .tick(now, Arc::clone(snapshot), 0, &mut self.clients);
            drain(&mut self.rx)
        }
    }

    #[test]
    fn unchanged_snapshots_send_nothing() {
        let initial = snapshot(&[(1, 1)]);
        let mut fx = fixture(Arc::clone(&initial));
        assert!(fx.tick(10, &initial).is_empty());
        assert!(fx.tick(600, &initial).is_empty());
    }

    #[test]
    fn patches_are_rate_limited_and_cumulative() {
        let initial = snapshot(&[(1, 1)]);
        let mut fx = fixture(initial);

        let first = snapshot(&[(1, 2)]);
        let frames = fx.tick(10, &first);
        assert_eq!(kinds(&frames), vec!["sync-patch"]);
        assert_eq!(frames[0]["sequence"], 1);

        // Two changes inside the interval hold the patch back but not their events.
        let second = snapshot(&[(1, 3), (2, 1)]);
        let frames = fx.tick(100, &second);
        assert_eq!(kinds(&frames), vec!["event:torrent-added"]);
        assert_eq!(frames[0]["data"]["id"], 2);
        let third = snapshot(&[(1, 3), (2, 1), (3, 1)]);
        let frames = fx.tick(200, &third);
        assert_eq!(kinds(&frames), vec!["event:torrent-added"]);
        assert_eq!(frames[0]["data"]["id"], 3);

        let frames = fx.tick(520, &third);
        assert_eq!(kinds(&frames), vec!["sync-patch"]);
        let added: Vec<_> = frames[0]["data"]["torrents"]["added"]
            .as_array()
            .expect("added")
            .iter()
            .map(|torrent| torrent["id"].as_i64().expect("id"))
            .collect();
        assert_eq!(added, vec![2, 3]);
        assert_eq!(frames[0]["data"]["torrents"]["updated"][0]["id"], 1);
        assert_eq!(frames[0]["sequence"], 2);

        assert!(fx.tick(1_100, &third).is_empty());
    }

    #[test]
    fn named_events_skip_the_patch_rate_limit() {
        let initial = snapshot(&[(1, 1)]);
        let mut fx = fixture(initial);

        let added = snapshot(&[(1, 1), (2, 1)]);
        let frames = fx.tick(10, &added);
        assert_eq!(kinds(&frames), vec!["sync-patch", "event:torrent-added"]);

        let mut torrents = added.torrents.clone();
        torrents[0].revision = 2;
        torrents[0].is_finished = true;
        let finished = Arc::new(EngineSnapshot::from_torrents(
            torrents,
            0,
            TransferStats::default(),
            TransferStats::default(),
        ));
        let frames = fx.tick(60, &finished);
        assert_eq!(kinds(&frames), vec!["event:torrent-finished"]);
        assert_eq!(frames[0]["data"]["id"], 1);

        let frames = fx.tick(510, &finished);
        assert_eq!(kinds(&frames), vec!["sync-patch"]);
        assert_eq!(frames[0]["data"]["torrents"]["updated"][0]["id"], 1);
        assert!(fx.tick(1_100, &finished).is_empty());
    }

    #[test]
    fn lagging_clients_receive_full_snapshot() {
        let initial = snapshot(&[(1, 1)]);
        let mut fx = fixture(Arc::clone(&initial));
        let newer = snapshot(&[(1, 2)]);

        // A late joiner starts at a snapshot the baseline has not reached.
        let (tx, mut late) = mpsc::unbounded_channel();
        let ahead = snapshot(&[(1, 5)]);
        fx.clients.open(2, tx, Arc::clone(&ahead));
        drain(&mut late);

        let frames = fx.tick(10, &newer);
        assert_eq!(kinds(&frames), vec!["sync-patch"]);
        let frames = drain(&mut late);
        assert_eq!(kinds(&frames), vec!["sync-snapshot"]);
        assert_eq!(frames[0]["data"]["torrents"][0]["id"], 1);
        assert_eq!(fx.clients.len(), 2);
    }

    #[test]
    fn closed_clients_are_pruned() {
        let initial = snapshot(&[]);
        let mut fx = fixture(Arc::clone(&initial));
        let (tx, rx) = mpsc::unbounded_channel();
        fx.clients.open(2, tx, Arc::clone(&initial));
        drop(rx);
        fx.tick(10, &snapshot(&[(9, 1)]));
        assert_eq!(fx.clients.len(), 1);
        fx.clients.close(1);
        assert!(fx.clients.is_empty());
    }

    #[test]
    fn blocklist_changes_and_pings_are_immediate() {
        let initial = snapshot(&[]);
        let start = Instant::now();
        let mut broadcaster = Broadcaster::with_intervals(
            Arc::clone(&initial),
            0,
            start,
            PATCH_INTERVAL,
            Duration::from_secs(1),
        );
        let mut clients = ClientTable::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        clients.open(1, tx, Arc::clone(&initial));
        drain(&mut rx);

        broadcaster.tick(start, Arc::clone(&initial), 42, &mut clients);
        let frames = drain(&mut rx);
        assert_eq!(kinds(&frames), vec!["event:blocklist-updated"]);
        assert_eq!(frames[0]["data"]["count"], 42);

        broadcaster.tick(start + Duration::from_secs(2), initial, 42, &mut clients);
        assert_eq!(rx.try_recv().ok(), Some(Outbound::Ping));
    }

    #[test]
    fn without_clients_baseline_tracks_engine() {
        let start = Instant::now();
        let mut broadcaster = Broadcaster::new(snapshot(&[]), 0, start);
        let mut clients = ClientTable::default();
        let current = snapshot(&[(1, 1)]);
        broadcaster.tick(start, Arc::clone(&current), 0, &mut clients);
        assert!(Arc::ptr_eq(&broadcaster.baseline, &current));
        assert!(Arc::ptr_eq(&broadcaster.event_baseline, &current));
        assert!(broadcaster.pending.is_none());
    }
}
