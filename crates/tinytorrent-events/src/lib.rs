#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links
)]

//! Live-update frames and discrete notifications pushed to WebSocket clients.
//!
//! Frames are serialized once per broadcast and fanned out as text. Discrete
//! events raised outside the broadcast loop (for example a UI focus request
//! coming from an RPC call) travel over a [`EventBus`] built on
//! `tokio::broadcast`; when a subscriber lags, the oldest events are dropped.

use serde::Serialize;
use serde_json::{Value, json};
use tinytorrent_engine::{EngineSnapshot, SessionStats, TorrentId, TorrentSnapshot};
use tokio::sync::broadcast::{self, Receiver, Sender};
use tracing::debug;

/// Default capacity of the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// Discrete notifications delivered as `{"type":"event"}` frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A torrent appeared in the session.
    TorrentAdded { id: TorrentId },
    /// A torrent completed its download.
    TorrentFinished { id: TorrentId },
    /// The blocklist was reloaded with a new rule count.
    BlocklistUpdated { count: u64 },
    /// The daemon is stopping cleanly.
    AppShutdown,
    /// A second launch asked the UI to come to the foreground.
    UiFocus,
    /// Out-of-band failure surfaced to the UI.
    Error { message: String, code: i32 },
}

impl Event {
    /// Wire name carried in the `event` field.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::TorrentAdded { .. } => "torrent-added",
            Self::TorrentFinished { .. } => "torrent-finished",
            Self::BlocklistUpdated { .. } => "blocklist-updated",
            Self::AppShutdown => "app-shutdown",
            Self::UiFocus => "ui-focus",
            Self::Error { .. } => "error",
        }
    }

    /// Payload carried in the `data` field.
    #[must_use]
    pub fn data(&self) -> Value {
        match self {
            Self::TorrentAdded { id } | Self::TorrentFinished { id } => json!({ "id": id }),
            Self::BlocklistUpdated { count } => json!({ "count": count }),
            Self::AppShutdown | Self::UiFocus => Value::Null,
            Self::Error { message, code } => json!({ "message": message, "code": code }),
        }
    }

    /// Frame wrapping this event.
    #[must_use]
    pub fn into_frame(self) -> Frame {
        Frame::Event {
            data: self.data(),
            event: self.kind(),
        }
    }
}

/// Full session view sent when a client connects or falls behind.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotPayload {
    #[serde(flatten)]
    pub session: SessionStats,
    pub torrents: Vec<TorrentSnapshot>,
}

impl SnapshotPayload {
    #[must_use]
    pub fn from_snapshot(snapshot: &EngineSnapshot) -> Self {
        Self {
            session: snapshot.stats,
            torrents: snapshot.torrents.clone(),
        }
    }
}

/// Torrent level changes between two snapshots.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TorrentDelta {
    pub added: Vec<TorrentSnapshot>,
    pub updated: Vec<TorrentSnapshot>,
    pub removed: Vec<TorrentId>,
}

/// Incremental update relative to the previous broadcast baseline.
#[derive(Debug, Clone, Serialize)]
pub struct PatchPayload {
    pub session: SessionStats,
    pub torrents: TorrentDelta,
}

/// Every server to client WebSocket frame.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Frame {
    SyncSnapshot {
        data: SnapshotPayload,
    },
    SyncPatch {
        sequence: u64,
        data: PatchPayload,
    },
    Event {
        event: &'static str,
        data: Value,
    },
}

impl Frame {
    /// Serialize to the JSON text sent on the socket.
    #[must_use]
    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|err| {
            debug!(error = %err, "frame serialization failed");
            String::from("{}")
        })
    }
}

/// Shared fan-out channel for discrete events.
#[derive(Clone)]
pub struct EventBus {
    sender: Sender<Event>,
}

impl EventBus {
    /// Construct a bus with the provided broadcast capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "event bus capacity must be positive");
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Construct a bus with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Publish an event; returns the number of live subscribers that will see it.
    pub fn publish(&self, event: Event) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribe to events published after this call.
    #[must_use]
    pub fn subscribe(&self) -> EventStream {
        EventStream {
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving half of an [`EventBus`] subscription.
pub struct EventStream {
    receiver: Receiver<Event>,
}

impl EventStream {
    /// Receive the next event; `None` once every publisher is gone.
    pub async fn next(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tinytorrent_engine::TransferStats;
    use tokio::time::timeout;

    #[test]
    fn event_frames_use_kebab_names() {
        let frame = Event::TorrentAdded { id: 7 }.into_frame();
        let value: Value = serde_json::from_str(&frame.to_text()).expect("json");
        assert_eq!(value, json!({"type": "event", "event": "torrent-added", "data": {"id": 7}}));

        let value: Value =
            serde_json::from_str(&Event::AppShutdown.into_frame().to_text()).expect("json");
        assert_eq!(value["event"], "app-shutdown");
        assert!(value["data"].is_null());

        let error = Event::Error {
            message: "disk full".into(),
            code: 28,
        };
        assert_eq!(error.data(), json!({"message": "disk full", "code": 28}));
    }

    #[test]
    fn snapshot_frame_flattens_session_fields() {
        let snapshot = EngineSnapshot::from_torrents(
            vec![TorrentSnapshot {
                id: 1,
                name: "one".into(),
                ..TorrentSnapshot::default()
            }],
            4,
            TransferStats::default(),
            TransferStats::default(),
        );
        let frame = Frame::SyncSnapshot {
            data: SnapshotPayload::from_snapshot(&snapshot),
        };
        let value: Value = serde_json::from_str(&frame.to_text()).expect("json");
        assert_eq!(value["type"], "sync-snapshot");
        assert_eq!(value["data"]["torrentCount"], 1);
        assert_eq!(value["data"]["dhtNodes"], 4);
        assert_eq!(value["data"]["torrents"][0]["name"], "one");
    }

    #[test]
    fn patch_frame_nests_torrent_delta() {
        let frame = Frame::SyncPatch {
            sequence: 3,
            data: PatchPayload {
                session: SessionStats::default(),
                torrents: TorrentDelta {
                    removed: vec![9],
                    ..TorrentDelta::default()
                },
            },
        };
        let value: Value = serde_json::from_str(&frame.to_text()).expect("json");
        assert_eq!(value["type"], "sync-patch");
        assert_eq!(value["sequence"], 3);
        assert_eq!(value["data"]["torrents"]["removed"], json!([9]));
        assert_eq!(value["data"]["torrents"]["added"], json!([]));
        assert!(value["data"]["session"].is_object());
    }

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::with_capacity(4);
        assert_eq!(bus.publish(Event::UiFocus), 0);

        let mut stream = bus.subscribe();
        assert_eq!(bus.publish(Event::BlocklistUpdated { count: 12 }), 1);
        let received = timeout(Duration::from_secs(1), stream.next())
            .await
            .expect("event timed out");
        assert_eq!(received, Some(Event::BlocklistUpdated { count: 12 }));
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_to_newest() {
        let bus = EventBus::with_capacity(2);
        let mut stream = bus.subscribe();
        for id in 0..5 {
            bus.publish(Event::TorrentFinished { id });
        }
        let first = timeout(Duration::from_secs(1), stream.next())
            .await
            .expect("event timed out");
        assert_eq!(first, Some(Event::TorrentFinished { id: 3 }));
    }
}
