#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links
)]
#![allow(clippy::module_name_repetitions)]

//! HTTP and WebSocket transport for the Transmission-compatible RPC surface.
//!
//! # Design
//! - Every request passes the security gate (host, origin, credentials,
//!   CSRF session header, body limit) before reaching the [`Dispatcher`].
//! - One event-loop task owns WebSocket clients, pending RPC replies and the
//!   snapshot baseline; connection tasks talk to it over channels.
//! - Live updates poll the engine snapshot, diff it against the baseline and
//!   publish at most one `sync-patch` per patch interval.

mod broadcast;
mod diff;
mod error;
mod event_loop;
mod router;
mod security;
mod ws;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tinytorrent_config::ServerOptions;
use tinytorrent_engine::TorrentEngine;
use tinytorrent_events::EventBus;
use tinytorrent_rpc::Dispatcher;
use tinytorrent_telemetry::record_listen_port;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub use error::{ServerError, ServerResult};

use crate::event_loop::EventLoop;
use crate::router::{ServerState, build_router};
use crate::security::SecurityPolicy;

/// Time allowed for in-flight HTTP connections to drain on stop.
const HTTP_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Details a local client needs to reach a started server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Configured auth token, empty when none is set.
    pub token: String,
    /// Port the listener bound.
    pub port: u16,
}

struct Running {
    info: ConnectionInfo,
    local_addr: SocketAddr,
    stop_loop: oneshot::Sender<()>,
    stop_http: oneshot::Sender<()>,
    event_loop: JoinHandle<()>,
    http: JoinHandle<()>,
}

/// Control-plane server wrapping a [`Dispatcher`].
pub struct Server {
    options: ServerOptions,
    session_id: String,
    dispatcher: Arc<Dispatcher>,
    engine: Arc<dyn TorrentEngine>,
    events: EventBus,
    running: Option<Running>,
}

impl Server {
    /// Build a stopped server with a fresh CSRF session token.
    #[must_use]
    pub fn new(
        options: ServerOptions,
        dispatcher: Dispatcher,
        engine: Arc<dyn TorrentEngine>,
        events: EventBus,
    ) -> Self {
        let session_id = format!("{:032x}", rand::rng().random::<u128>());
        Self {
            options,
            session_id,
            dispatcher: Arc::new(dispatcher),
            engine,
            events,
            running: None,
        }
    }

    /// Value clients must echo in the session header.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Bound listener address while running.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|running| running.local_addr)
    }

    /// Connection details while running.
    #[must_use]
    pub fn connection_info(&self) -> Option<ConnectionInfo> {
        self.running.as_ref().map(|running| running.info.clone())
    }

    /// Bind the listener and spawn the event loop and HTTP tasks.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::AlreadyRunning`] on a second call, a
    /// [`ServerError::Config`] for invalid options, and bind failures.
    pub async fn start(&mut self) -> ServerResult<ConnectionInfo> {
        if self.running.is_some() {
            return Err(ServerError::AlreadyRunning);
        }
        self.options.validate()?;
        let policy = SecurityPolicy::new(&self.options, self.session_id.clone())?;

        let listener = TcpListener::bind(self.options.bind)
            .await
            .map_err(|source| ServerError::Bind {
                addr: self.options.bind,
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::LocalAddr { source })?;
        record_listen_port(local_addr.port());

        let (event_loop, completions) =
            EventLoop::new(Arc::clone(&self.dispatcher), Arc::clone(&self.engine));
        let (handle, commands) = event_loop::channel();
        let (stop_loop, loop_shutdown) = oneshot::channel();
        let event_loop = tokio::spawn(event_loop.run(
            commands,
            completions,
            self.events.subscribe(),
            loop_shutdown,
        ));

        let state = Arc::new(ServerState::new(
            policy,
            self.options.rpc_path.clone(),
            self.options.ws_path.clone(),
            handle,
        ));
        let router = build_router(state);
        let (stop_http, http_shutdown) = oneshot::channel::<()>();
        let http = tokio::spawn(async move {
            let serve = axum::serve(listener, router.into_make_service())
                .with_graceful_shutdown(async move {
                    let _ = http_shutdown.await;
                });
            if let Err(err) = serve.await {
                warn!(error = %err, "rpc listener stopped with error");
            }
        });

        let info = ConnectionInfo {
            token: self.options.token.clone().unwrap_or_default(),
            port: local_addr.port(),
        };
        info!(
            addr = %local_addr,
            rpc_path = %self.options.rpc_path,
            ws_path = %self.options.ws_path,
            auth = self.options.requires_auth(),
            "rpc server listening"
        );
        self.running = Some(Running {
            info: info.clone(),
            local_addr,
            stop_loop,
            stop_http,
            event_loop,
            http,
        });
        Ok(info)
    }

    /// Notify clients with `app-shutdown`, close sockets, stop accepting and
    /// join the background tasks. A no-op when not running.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        if running.stop_loop.send(()).is_err() {
            warn!("event loop exited before stop");
        }
        if let Err(err) = running.event_loop.await {
            warn!(error = %err, "event loop task failed");
        }
        if running.stop_http.send(()).is_err() {
            warn!("http task exited before stop");
        }
        let mut http = running.http;
        if tokio::time::timeout(HTTP_DRAIN_TIMEOUT, &mut http).await.is_err() {
            warn!("http connections did not drain; aborting");
            http.abort();
        }
        info!(addr = %running.local_addr, "rpc server stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use serde_json::Value;
    use tinytorrent_engine::{AddTorrentRequest, InMemoryEngine, TorrentSource};
    use tinytorrent_rpc::{RpcContext, build_dispatcher};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::time::timeout;
    use tokio_tungstenite::tungstenite::Message;

    const WAIT: Duration = Duration::from_secs(5);

    fn server(options: ServerOptions) -> (Server, Arc<InMemoryEngine>) {
        let engine = Arc::new(InMemoryEngine::default());
        let bus = EventBus::new();
        let ctx = Arc::new(RpcContext::new(engine.clone(), bus.clone()));
        let server = Server::new(options, build_dispatcher(ctx), engine.clone(), bus);
        (server, engine)
    }

    async fn next_json<S>(stream: &mut S) -> Value
    where
        S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        loop {
            let message = timeout(WAIT, stream.next())
                .await
                .expect("frame timed out")
                .expect("stream open")
                .expect("frame");
            if let Message::Text(text) = message {
                return serde_json::from_str(text.as_str()).expect("json");
            }
        }
    }

    #[tokio::test]
    async fn websocket_client_sees_snapshot_patch_and_shutdown() {
        let (mut server, engine) = server(ServerOptions::default());
        let info = server.start().await.expect("start");
        assert!(info.token.is_empty());
        assert_eq!(server.local_addr().map(|addr| addr.port()), Some(info.port));

        let url = format!("ws://127.0.0.1:{}/ws", info.port);
        let (socket, _) = timeout(WAIT, tokio_tungstenite::connect_async(url))
            .await
            .expect("connect timed out")
            .expect("connect");
        let (mut sink, mut stream) = socket.split();

        let snapshot = next_json(&mut stream).await;
        assert_eq!(snapshot["type"], "sync-snapshot");
        assert_eq!(snapshot["data"]["torrents"], Value::Array(Vec::new()));

        sink.send(Message::Text("ignored".into())).await.expect("send");
        engine
            .add_torrent(AddTorrentRequest {
                source: TorrentSource::Uri(
                    "magnet:?xt=urn:btih:89abcdef0123456789abcdef0123456789abcdef&dn=ubuntu".into(),
                ),
                download_dir: "/downloads".into(),
                paused: false,
                labels: Vec::new(),
            })
            .expect("add");

        let patch = next_json(&mut stream).await;
        assert_eq!(patch["type"], "sync-patch");
        assert_eq!(patch["data"]["torrents"]["added"][0]["name"], "ubuntu");
        let added = next_json(&mut stream).await;
        assert_eq!(added["event"], "torrent-added");
        assert_eq!(added["data"]["id"], 1);

        server.stop().await;
        let shutdown = next_json(&mut stream).await;
        assert_eq!(shutdown["event"], "app-shutdown");
        assert!(server.connection_info().is_none());
    }

    #[tokio::test]
    async fn http_rpc_requires_the_session_header() {
        let (mut server, _engine) = server(ServerOptions::default());
        let info = server.start().await.expect("start");
        let body = r#"{"method":"session-get","tag":1}"#;

        let first = raw_post(info.port, body, None).await;
        assert!(first.starts_with("HTTP/1.1 409"), "{first}");
        assert!(first.contains(server.session_id()));

        let second = raw_post(info.port, body, Some(server.session_id())).await;
        assert!(second.starts_with("HTTP/1.1 200"), "{second}");
        assert!(second.contains("\"result\":\"success\""));
        server.stop().await;
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let (mut server, _engine) = server(ServerOptions::default());
        server.start().await.expect("start");
        assert!(matches!(server.start().await, Err(ServerError::AlreadyRunning)));
        server.stop().await;
        server.stop().await;
    }

    #[tokio::test]
    async fn invalid_options_fail_before_binding() {
        let options = ServerOptions {
            rpc_path: "/same".into(),
            ws_path: "/same".into(),
            ..ServerOptions::default()
        };
        let (mut server, _engine) = server(options);
        assert!(matches!(server.start().await, Err(ServerError::Config { .. })));
        assert!(server.local_addr().is_none());
    }

    async fn raw_post(port: u16, body: &str, session: Option<&str>) -> String {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.expect("connect");
        let session = session
            .map(|id| format!("X-Transmission-Session-Id: {id}\r\n"))
            .unwrap_or_default();
        let request = format!(
            "POST /transmission/rpc HTTP/1.1\r\nHost: 127.0.0.1:{port}\r\n{session}\
             Content-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(request.as_bytes()).await.expect("write");
        let mut response = Vec::new();
        timeout(WAIT, stream.read_to_end(&mut response))
            .await
            .expect("read timed out")
            .expect("read");
        String::from_utf8_lossy(&response).into_owned()
    }
}
