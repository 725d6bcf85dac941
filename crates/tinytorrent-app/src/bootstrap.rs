use std::env;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use tinytorrent_config::{FilePreferenceStore, ServerOptions};
use tinytorrent_engine::{InMemoryEngine, TorrentEngine};
use tinytorrent_events::EventBus;
use tinytorrent_rpc::{RpcContext, build_dispatcher};
use tinytorrent_server::{ConnectionInfo, Server};
use tinytorrent_telemetry::{GlobalContextGuard, LogFormat, LoggingConfig, init_logging};
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};

/// Selects JSON or pretty log output.
pub const LOG_FORMAT_VAR: &str = "TT_LOG_FORMAT";
/// Optional JSON file backing the UI preferences.
pub const PREFERENCES_PATH_VAR: &str = "TT_PREFERENCES_PATH";

/// Everything the boot sequence needs, resolved up front.
pub struct BootstrapDependencies {
    log_format: LogFormat,
    options: ServerOptions,
    preferences_path: Option<PathBuf>,
    engine: Arc<dyn TorrentEngine>,
}

impl BootstrapDependencies {
    /// Construct production dependencies from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error when a server option variable is malformed.
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Resolve dependencies through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error when a server option variable is malformed.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let options = ServerOptions::from_lookup(&lookup)
            .map_err(|err| AppError::config("server_options.load", err))?;
        let log_format = LogFormat::from_setting(lookup(LOG_FORMAT_VAR).as_deref());
        let preferences_path = lookup(PREFERENCES_PATH_VAR)
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
            .map(PathBuf::from);
        Ok(Self {
            log_format,
            options,
            preferences_path,
            engine: Arc::new(InMemoryEngine::default()),
        })
    }

    /// Replace the engine handed to the RPC layer.
    #[must_use]
    pub fn with_engine(mut self, engine: Arc<dyn TorrentEngine>) -> Self {
        self.engine = engine;
        self
    }

    /// Options the server will be started with.
    #[must_use]
    pub const fn options(&self) -> &ServerOptions {
        &self.options
    }
}

/// Entry point for the boot sequence: install logging, serve until ctrl-c or
/// an `app-shutdown` request, then stop.
///
/// # Errors
///
/// Returns an error if configuration, logging or the listener fails.
pub async fn run_app() -> AppResult<()> {
    let dependencies = BootstrapDependencies::from_env()?;
    let logging = LoggingConfig {
        format: dependencies.log_format,
        ..LoggingConfig::default()
    };
    init_logging(&logging).map_err(|err| AppError::telemetry("telemetry.init", err))?;
    let _context = GlobalContextGuard::new("tinytorrent");
    info!("tinytorrent bootstrap starting");

    let app = RunningApp::start(dependencies).await?;
    app.run_until(async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "ctrl-c handler unavailable; waiting for rpc shutdown");
            std::future::pending::<()>().await;
        }
    })
    .await;
    Ok(())
}

/// A started server plus the hook the RPC layer fires on `app-shutdown`.
pub struct RunningApp {
    server: Server,
    engine: Arc<dyn TorrentEngine>,
    info: ConnectionInfo,
    shutdown: Arc<Notify>,
}

impl RunningApp {
    /// Wire the RPC context, dispatcher and server, then start listening.
    ///
    /// # Errors
    ///
    /// Returns an error when the server cannot start.
    pub async fn start(dependencies: BootstrapDependencies) -> AppResult<Self> {
        let BootstrapDependencies {
            log_format: _,
            options,
            preferences_path,
            engine,
        } = dependencies;

        let shutdown = Arc::new(Notify::new());
        let hook = {
            let shutdown = Arc::clone(&shutdown);
            Arc::new(move || shutdown.notify_one())
        };
        let events = EventBus::new();
        let mut context = RpcContext::new(Arc::clone(&engine), events.clone())
            .with_ws_path(options.ws_path.clone())
            .with_shutdown_hook(hook);
        if let Some(path) = preferences_path {
            info!(path = %path.display(), "ui preferences backed by file");
            context = context.with_preferences(Arc::new(FilePreferenceStore::open(path)));
        }
        let context = Arc::new(context);

        let mut server = Server::new(
            options,
            build_dispatcher(Arc::clone(&context)),
            Arc::clone(&engine),
            events,
        );
        let info = server
            .start()
            .await
            .map_err(|err| AppError::server("server.start", err))?;
        if let Some(addr) = server.local_addr() {
            context.set_rpc_endpoint(addr);
        }
        info!(port = info.port, "control plane ready");
        Ok(Self {
            server,
            engine,
            info,
            shutdown,
        })
    }

    /// Port and token clients connect with.
    #[must_use]
    pub const fn connection_info(&self) -> &ConnectionInfo {
        &self.info
    }

    /// CSRF session token of the running server.
    #[must_use]
    pub fn session_id(&self) -> &str {
        self.server.session_id()
    }

    /// Serve until `signal` resolves or a client asks to shut down, then
    /// stop the server and the engine.
    pub async fn run_until<F>(mut self, signal: F)
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            () = signal => info!("shutdown signal received"),
            () = self.shutdown.notified() => info!("shutdown requested over rpc"),
        }
        self.server.stop().await;
        self.engine.stop();
        info!("tinytorrent stopped");
    }
}
