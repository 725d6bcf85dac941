//! The single task owning WebSocket clients, pending RPC replies and the
//! broadcast state.
//!
//! Connection tasks talk to it through [`LoopHandle`]. Handler completions
//! come back as `(request id, body)` pairs on an unbounded queue; a reply
//! whose connection already went away is discarded when drained.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use tinytorrent_engine::TorrentEngine;
use tinytorrent_events::{Event, EventStream};
use tinytorrent_rpc::Dispatcher;
use tokio::sync::mpsc::{self, Receiver, Sender, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::broadcast::{Broadcaster, ClientId, ClientTable, Outbound};

/// Loop cadence: completion draining and snapshot polling.
pub(crate) const TICK_INTERVAL: Duration = Duration::from_millis(50);
/// Queue depth between connection tasks and the loop.
pub(crate) const COMMAND_CAPACITY: usize = 1024;

type Completion = (u64, String);

pub(crate) enum LoopCommand {
    Rpc {
        payload: Bytes,
        reply: oneshot::Sender<String>,
    },
    Open {
        id: ClientId,
        outbound: UnboundedSender<Outbound>,
    },
    Close {
        id: ClientId,
    },
}

/// Cloneable sender side used by the HTTP and WebSocket handlers.
#[derive(Clone)]
pub(crate) struct LoopHandle {
    commands: Sender<LoopCommand>,
}

impl LoopHandle {
    /// Dispatch an RPC payload; `None` when the loop has stopped.
    pub(crate) async fn call(&self, payload: Bytes) -> Option<String> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(LoopCommand::Rpc { payload, reply })
            .await
            .ok()?;
        response.await.ok()
    }

    pub(crate) async fn open(&self, id: ClientId, outbound: UnboundedSender<Outbound>) -> bool {
        self.commands
            .send(LoopCommand::Open { id, outbound })
            .await
            .is_ok()
    }

    pub(crate) async fn close(&self, id: ClientId) {
        if self.commands.send(LoopCommand::Close { id }).await.is_err() {
            debug!(client = id, "event loop already stopped");
        }
    }
}

pub(crate) fn channel() -> (LoopHandle, Receiver<LoopCommand>) {
    let (commands, receiver) = mpsc::channel(COMMAND_CAPACITY);
    (LoopHandle { commands }, receiver)
}

pub(crate) struct EventLoop {
    dispatcher: Arc<Dispatcher>,
    engine: Arc<dyn TorrentEngine>,
    broadcaster: Broadcaster,
    clients: ClientTable,
    pending: HashMap<u64, oneshot::Sender<String>>,
    next_request: u64,
    completions: UnboundedSender<Completion>,
}

impl EventLoop {
    pub(crate) fn new(
        dispatcher: Arc<Dispatcher>,
        engine: Arc<dyn TorrentEngine>,
    ) -> (Self, UnboundedReceiver<Completion>) {
        let (completions, drained) = mpsc::unbounded_channel();
        let broadcaster = Broadcaster::new(
            engine.snapshot(),
            engine.blocklist_entry_count(),
            Instant::now().into_std(),
        );
        let event_loop = Self {
            dispatcher,
            engine,
            broadcaster,
            clients: ClientTable::default(),
            pending: HashMap::new(),
            next_request: 0,
            completions,
        };
        (event_loop, drained)
    }

    /// Run until `shutdown` fires, then answer completed requests and
    /// notify and close every client.
    pub(crate) async fn run(
        mut self,
        mut commands: Receiver<LoopCommand>,
        mut completions: UnboundedReceiver<Completion>,
        mut events: EventStream,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("rpc event loop started");
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                // Ticks win over queued commands.
                _ = ticker.tick() => {
                    self.drain(&mut completions);
                    self.broadcast_updates();
                }
                Some(command) = commands.recv() => self.handle(command),
                Some((id, body)) = completions.recv() => self.complete(id, body),
                Some(event) = events.next() => self.clients.broadcast_event(event),
            }
        }
        self.drain(&mut completions);
        self.finish();
    }

    fn drain(&mut self, completions: &mut UnboundedReceiver<Completion>) {
        while let Ok((id, body)) = completions.try_recv() {
            self.complete(id, body);
        }
    }

    fn handle(&mut self, command: LoopCommand) {
        match command {
            LoopCommand::Rpc { payload, reply } => self.dispatch(&payload, reply),
            LoopCommand::Open { id, outbound } => {
                self.clients.open(id, outbound, self.engine.snapshot());
            }
            LoopCommand::Close { id } => self.clients.close(id),
        }
    }

    fn dispatch(&mut self, payload: &[u8], reply: oneshot::Sender<String>) {
        let id = self.next_request;
        self.next_request += 1;
        self.pending.insert(id, reply);
        let completions = self.completions.clone();
        self.dispatcher.dispatch(payload, move |body| {
            if completions.send((id, body)).is_err() {
                debug!(request_id = id, "event loop gone; dropping rpc response");
            }
        });
    }

    fn complete(&mut self, id: u64, body: String) {
        let Some(reply) = self.pending.remove(&id) else {
            debug!(request_id = id, "completion without a pending request");
            return;
        };
        if reply.send(body).is_err() {
            debug!(request_id = id, "connection closed before response was ready");
        }
    }

    fn broadcast_updates(&mut self) {
        let snapshot = self.engine.snapshot();
        let blocklist = self.engine.blocklist_entry_count();
        self.broadcaster.tick(
            Instant::now().into_std(),
            snapshot,
            blocklist,
            &mut self.clients,
        );
    }

    fn finish(&mut self) {
        info!(
            clients = self.clients.len(),
            pending = self.pending.len(),
            "rpc event loop stopping"
        );
        self.clients.broadcast_event(Event::AppShutdown);
        self.clients.broadcast(&Outbound::Close);
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use tinytorrent_engine::{AddTorrentRequest, InMemoryEngine, TorrentSource};
    use tinytorrent_events::EventBus;
    use tinytorrent_rpc::{RpcContext, build_dispatcher};
    use tokio::time::timeout;

    struct Running {
        handle: LoopHandle,
        engine: Arc<InMemoryEngine>,
        bus: EventBus,
        stop: oneshot::Sender<()>,
        task: tokio::task::JoinHandle<()>,
    }

    fn spawn() -> Running {
        let engine = Arc::new(InMemoryEngine::default());
        let bus = EventBus::new();
        let ctx = Arc::new(RpcContext::new(engine.clone(), bus.clone()));
        let dispatcher = Arc::new(build_dispatcher(ctx));
        let (event_loop, completions) = EventLoop::new(dispatcher, engine.clone());
        let (handle, commands) = channel();
        let (stop, shutdown) = oneshot::channel();
        let task = tokio::spawn(event_loop.run(commands, completions, bus.subscribe(), shutdown));
        Running {
            handle,
            engine,
            bus,
            stop,
            task,
        }
    }

    async fn next_frame(rx: &mut UnboundedReceiver<Outbound>) -> Value {
        loop {
            let message = timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("frame timed out")
                .expect("channel open");
            if let Outbound::Text(text) = message {
                return serde_json::from_str(&text).expect("json");
            }
        }
    }

    #[tokio::test]
    async fn rpc_calls_round_trip_through_the_loop() {
        let running = spawn();
        let body = running
            .handle
            .call(Bytes::from_static(br#"{"method":"session-stats","tag":4}"#))
            .await
            .expect("response");
        let value: Value = serde_json::from_str(&body).expect("json");
        assert_eq!(value["result"], "success");
        assert_eq!(value["tag"], 4);

        let body = running
            .handle
            .call(Bytes::from_static(b"not json"))
            .await
            .expect("response");
        assert!(body.contains("\"error\""));
        running.stop.send(()).expect("stop");
        running.task.await.expect("join");
    }

    #[tokio::test]
    async fn websocket_clients_get_snapshot_patch_and_events() {
        let running = spawn();
        let (tx, mut rx) = mpsc::unbounded_channel();
        assert!(running.handle.open(7, tx).await);
        assert_eq!(next_frame(&mut rx).await["type"], "sync-snapshot");

        running
            .engine
            .add_torrent(AddTorrentRequest {
                source: TorrentSource::Uri(
                    "magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567&dn=demo".into(),
                ),
                download_dir: "/data".into(),
                paused: false,
                labels: Vec::new(),
            })
            .expect("add");

        let patch = next_frame(&mut rx).await;
        assert_eq!(patch["type"], "sync-patch");
        assert_eq!(patch["data"]["torrents"]["added"][0]["name"], "demo");
        let event = next_frame(&mut rx).await;
        assert_eq!(event, json!({"type": "event", "event": "torrent-added", "data": {"id": 1}}));

        running.bus.publish(Event::UiFocus);
        assert_eq!(next_frame(&mut rx).await["event"], "ui-focus");

        running.stop.send(()).expect("stop");
        assert_eq!(next_frame(&mut rx).await["event"], "app-shutdown");
        assert_eq!(rx.recv().await, Some(Outbound::Close));
        running.task.await.expect("join");
    }

    #[tokio::test]
    async fn patches_keep_flowing_under_a_command_flood() {
        let running = spawn();
        let (tx, mut rx) = mpsc::unbounded_channel();
        assert!(running.handle.open(3, tx).await);
        assert_eq!(next_frame(&mut rx).await["type"], "sync-snapshot");

        let commands = running.handle.commands.clone();
        let flood = tokio::spawn(async move {
            loop {
                let (reply, _) = oneshot::channel();
                let payload = Bytes::from_static(br#"{"method":"session-stats"}"#);
                if commands.send(LoopCommand::Rpc { payload, reply }).await.is_err() {
                    break;
                }
            }
        });
        tokio::task::yield_now().await;
        running
            .engine
            .add_torrent(AddTorrentRequest {
                source: TorrentSource::Uri("magnet:?xt=urn:btih:ffff&dn=busy".into()),
                download_dir: "/data".into(),
                paused: false,
                labels: Vec::new(),
            })
            .expect("add");

        let patch = next_frame(&mut rx).await;
        assert_eq!(patch["type"], "sync-patch");
        assert_eq!(patch["data"]["torrents"]["added"][0]["name"], "busy");

        flood.abort();
        running.stop.send(()).expect("stop");
        running.task.await.expect("join");
    }

    #[tokio::test]
    async fn stopped_loop_answers_nothing() {
        let running = spawn();
        running.stop.send(()).expect("stop");
        running.task.await.expect("join");
        assert!(running.handle.call(Bytes::from_static(b"{}")).await.is_none());
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(!running.handle.open(1, tx).await);
    }
}
