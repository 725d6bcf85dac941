//! Shared state reachable from every method handler.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use once_cell::sync::OnceCell;
use tinytorrent_config::{
    ConfigResult, DEFAULT_WS_PATH, MemoryPreferenceStore, PreferenceStore, UiPreferences,
};
use tinytorrent_engine::TorrentEngine;
use tinytorrent_events::EventBus;
use tracing::info;

use crate::shell::{HeadlessShell, ShellIntegration};

/// Callback asking the host process to exit.
pub type ShutdownHook = Arc<dyn Fn() + Send + Sync>;

/// Collaborators and session-scoped state for the handlers.
pub struct RpcContext {
    engine: Arc<dyn TorrentEngine>,
    events: EventBus,
    preferences: Arc<dyn PreferenceStore>,
    ui: Mutex<UiPreferences>,
    ui_attached: AtomicBool,
    shell: Arc<dyn ShellIntegration>,
    shutdown: Option<ShutdownHook>,
    ws_path: String,
    rpc_endpoint: OnceCell<SocketAddr>,
}

impl fmt::Debug for RpcContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcContext")
            .field("ui_attached", &self.ui_attached())
            .field("ws_path", &self.ws_path)
            .field("rpc_endpoint", &self.rpc_endpoint.get())
            .finish_non_exhaustive()
    }
}

impl RpcContext {
    /// Context with in-memory preferences and no desktop shell.
    #[must_use]
    pub fn new(engine: Arc<dyn TorrentEngine>, events: EventBus) -> Self {
        Self {
            engine,
            events,
            preferences: Arc::new(MemoryPreferenceStore::default()),
            ui: Mutex::new(UiPreferences::default()),
            ui_attached: AtomicBool::new(false),
            shell: Arc::new(HeadlessShell),
            shutdown: None,
            ws_path: DEFAULT_WS_PATH.to_string(),
            rpc_endpoint: OnceCell::new(),
        }
    }

    /// Use `store` for UI preferences, loading its current values.
    #[must_use]
    pub fn with_preferences(mut self, store: Arc<dyn PreferenceStore>) -> Self {
        self.ui = Mutex::new(UiPreferences::load(store.as_ref()));
        self.preferences = store;
        self
    }

    /// Use `shell` for the `system-*` methods.
    #[must_use]
    pub fn with_shell(mut self, shell: Arc<dyn ShellIntegration>) -> Self {
        self.shell = shell;
        self
    }

    /// Invoke `hook` when a client requests `app-shutdown`.
    #[must_use]
    pub fn with_shutdown_hook(mut self, hook: ShutdownHook) -> Self {
        self.shutdown = Some(hook);
        self
    }

    /// WebSocket path advertised by `tt-get-capabilities`.
    #[must_use]
    pub fn with_ws_path(mut self, path: impl Into<String>) -> Self {
        self.ws_path = path.into();
        self
    }

    pub(crate) fn engine(&self) -> &dyn TorrentEngine {
        self.engine.as_ref()
    }

    pub(crate) const fn events(&self) -> &EventBus {
        &self.events
    }

    pub(crate) fn shell(&self) -> Arc<dyn ShellIntegration> {
        Arc::clone(&self.shell)
    }

    pub(crate) fn ws_path(&self) -> &str {
        &self.ws_path
    }

    /// Record the address the RPC listener bound; the first call wins.
    pub fn set_rpc_endpoint(&self, addr: SocketAddr) {
        if self.rpc_endpoint.set(addr).is_err() {
            tracing::debug!(%addr, "rpc endpoint already recorded");
        }
    }

    /// Address reported as `rpc-bind-address` / `rpc-port`.
    #[must_use]
    pub fn rpc_endpoint(&self) -> Option<SocketAddr> {
        self.rpc_endpoint.get().copied()
    }

    /// Current UI preferences.
    #[must_use]
    pub fn ui_preferences(&self) -> UiPreferences {
        self.ui.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Replace the cached preferences and persist them.
    ///
    /// # Errors
    ///
    /// Returns the store failure; the cache is updated regardless.
    pub fn store_ui_preferences(&self, preferences: UiPreferences) -> ConfigResult<()> {
        *self.ui.lock().unwrap_or_else(PoisonError::into_inner) = preferences.clone();
        preferences.persist(self.preferences.as_ref())
    }

    /// Whether a desktop UI has announced itself.
    #[must_use]
    pub fn ui_attached(&self) -> bool {
        self.ui_attached.load(Ordering::Acquire)
    }

    pub(crate) fn set_ui_attached(&self, attached: bool) {
        self.ui_attached.store(attached, Ordering::Release);
    }

    pub(crate) fn request_shutdown(&self) {
        match &self.shutdown {
            Some(hook) => {
                info!("process shutdown requested over rpc");
                hook();
            }
            None => info!("shutdown requested but no hook is installed"),
        }
    }
}
