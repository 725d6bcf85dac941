//! Session-wide methods: settings, statistics, UI presence and shutdown.

use std::net::SocketAddr;
use std::path::PathBuf;

use serde_json::{Map, Value, json};
use tinytorrent_config::UiPreferences;
use tinytorrent_engine::{CoreSettings, EngineResult, SessionUpdate, SpeedLimitUpdate};
use tinytorrent_events::Event;
use tinytorrent_fsops::absolute_normalized;
use tracing::{debug, info, warn};

use super::{ensure_directory, success};
use crate::args::{self, bool_flag, double_value, field, first_field, int_value};
use crate::context::RpcContext;
use crate::error::{RpcError, RpcResult};

/// Placeholder echoed instead of the configured proxy password.
const REDACTED: &str = "<REDACTED>";

fn listen_port(interface: &str) -> Option<u16> {
    interface.rsplit_once(':')?.1.trim().parse().ok()
}

fn rpc_bind_address(addr: SocketAddr) -> String {
    let ip = addr.ip();
    if ip.is_unspecified() && ip.is_ipv4() {
        "127.0.0.1".to_string()
    } else {
        ip.to_string()
    }
}

fn path_text(path: Option<&PathBuf>) -> Value {
    path.map_or(Value::Null, |path| Value::from(path.display().to_string()))
}

fn settings_json(
    settings: &CoreSettings,
    ctx: &RpcContext,
    ui: &UiPreferences,
) -> Map<String, Value> {
    let engine = ctx.engine();
    let json = json!({
        "version": super::capabilities::SERVER_VERSION,
        "rpc-version": super::capabilities::RPC_VERSION,
        "rpc-version-min": super::capabilities::RPC_VERSION_MIN,
        "download-dir": settings.download_dir.display().to_string(),
        "speed-limit-down": settings.download_rate_limit_kbps,
        "speed-limit-down-enabled": settings.download_rate_limit_enabled,
        "speed-limit-up": settings.upload_rate_limit_kbps,
        "speed-limit-up-enabled": settings.upload_rate_limit_enabled,
        "peer-limit": settings.peer_limit,
        "peer-limit-per-torrent": settings.peer_limit_per_torrent,
        "alt-speed-down": settings.alt_download_rate_limit_kbps,
        "alt-speed-up": settings.alt_upload_rate_limit_kbps,
        "alt-speed-enabled": settings.alt_speed_enabled,
        "alt-speed-time-enabled": settings.alt_speed_time_enabled,
        "alt-speed-time-begin": settings.alt_speed_time_begin,
        "alt-speed-time-end": settings.alt_speed_time_end,
        "alt-speed-time-day": settings.alt_speed_time_day,
        "encryption": settings.encryption.code(),
        "dht-enabled": settings.dht_enabled,
        "pex-enabled": settings.pex_enabled,
        "lpd-enabled": settings.lpd_enabled,
        "utp-enabled": settings.utp_enabled,
        "download-queue-size": settings.download_queue_size,
        "seed-queue-size": settings.seed_queue_size,
        "queue-stalled-enabled": settings.queue_stalled_enabled,
        "incomplete-dir": path_text(settings.incomplete_dir.as_ref()),
        "incomplete-dir-enabled": settings.incomplete_dir_enabled,
        "watch-dir": path_text(settings.watch_dir.as_ref()),
        "watch-dir-enabled": settings.watch_dir_enabled,
        "rename-partial-files": settings.rename_partial_files,
        "seed-ratio-limit": settings.seed_ratio_limit,
        "seed-ratio-limited": settings.seed_ratio_enabled,
        "seed-idle-limit": settings.seed_idle_limit,
        "seed-idle-limited": settings.seed_idle_enabled,
        "proxy-type": settings.proxy_type,
        "proxy-host": settings.proxy_hostname,
        "proxy-port": settings.proxy_port,
        "proxy-auth-enabled": settings.proxy_auth_enabled,
        "proxy-username": settings.proxy_username,
        "proxy-password": settings.proxy_password.as_ref().map(|_| REDACTED),
        "proxy-peer-connections": settings.proxy_peer_connections,
        "blocklist-enabled": settings.blocklist_enabled,
        "blocklist-size": engine.blocklist_entry_count(),
        "history-enabled": settings.history.enabled,
        "history-interval": settings.history.interval_seconds,
        "history-retention-days": settings.history.retention_days,
        "ui": ui,
    });
    let Value::Object(mut map) = json else {
        return Map::new();
    };
    if let Some(updated) = engine.blocklist_last_update() {
        map.insert("blocklist-last-updated".into(), json!(updated.timestamp()));
    }
    if settings.blocklist_enabled {
        map.insert(
            "blocklist-path".into(),
            path_text(settings.blocklist_path.as_ref()),
        );
    }
    if let Some(port) = listen_port(&settings.listen_interface) {
        map.insert("peer-port".into(), json!(port));
    }
    if let Some(error) = engine.listen_error() {
        map.insert("listen-error".into(), json!(error));
    }
    if let Some(addr) = ctx.rpc_endpoint() {
        map.insert("rpc-bind-address".into(), json!(rpc_bind_address(addr)));
        map.insert("rpc-port".into(), json!(addr.port()));
    }
    map
}

pub(super) fn get(ctx: &RpcContext, _arguments: &Value) -> RpcResult<Value> {
    let settings = ctx.engine().settings();
    let ui = ctx.ui_preferences();
    Ok(Value::Object(settings_json(&settings, ctx, &ui)))
}

/// Absolute, normalized `download-dir`, when a non-empty string was supplied.
pub(super) fn download_dir(arguments: &Value) -> RpcResult<Option<PathBuf>> {
    match args::string(arguments, "download-dir") {
        Some(raw) if !raw.is_empty() => absolute_normalized(raw.as_ref())
            .map(Some)
            .map_err(RpcError::from),
        _ => Ok(None),
    }
}

/// Directory-valued session field; non-empty paths are created first.
fn directory_field(arguments: &Value, key: &str) -> RpcResult<Option<PathBuf>> {
    let Some(raw) = args::string(arguments, key) else {
        return Ok(None);
    };
    let path = PathBuf::from(raw);
    if !raw.is_empty() {
        ensure_directory(&path)?;
    }
    Ok(Some(path))
}

fn string_field(arguments: &Value, key: &str) -> Option<String> {
    args::string(arguments, key).map(str::to_string)
}

fn session_update(arguments: &Value) -> RpcResult<SessionUpdate> {
    let mut update = SessionUpdate {
        alt_speed_down_kbps: int_value(field(arguments, "alt-speed-down")),
        alt_speed_up_kbps: int_value(field(arguments, "alt-speed-up")),
        alt_speed_enabled: bool_flag(field(arguments, "alt-speed-enabled")),
        alt_speed_time_enabled: bool_flag(field(arguments, "alt-speed-time-enabled")),
        alt_speed_time_begin: int_value(first_field(
            arguments,
            &["alt-speed-time-begin", "alt-speed-begin"],
        )),
        alt_speed_time_end: int_value(first_field(
            arguments,
            &["alt-speed-time-end", "alt-speed-end"],
        )),
        alt_speed_time_day: int_value(field(arguments, "alt-speed-time-day")),
        encryption: args::encryption(field(arguments, "encryption")),
        dht_enabled: bool_flag(field(arguments, "dht-enabled")),
        pex_enabled: bool_flag(field(arguments, "pex-enabled")),
        lpd_enabled: bool_flag(field(arguments, "lpd-enabled")),
        utp_enabled: bool_flag(field(arguments, "utp-enabled")),
        download_queue_size: int_value(field(arguments, "download-queue-size")),
        seed_queue_size: int_value(field(arguments, "seed-queue-size")),
        queue_stalled_enabled: bool_flag(field(arguments, "queue-stalled-enabled")),
        incomplete_dir: directory_field(arguments, "incomplete-dir")?,
        incomplete_dir_enabled: bool_flag(field(arguments, "incomplete-dir-enabled")),
        watch_dir: directory_field(arguments, "watch-dir")?,
        watch_dir_enabled: bool_flag(field(arguments, "watch-dir-enabled")),
        rename_partial_files: bool_flag(field(arguments, "rename-partial-files")),
        seed_ratio_limit: double_value(first_field(
            arguments,
            &["seedRatioLimit", "seed-ratio-limit"],
        )),
        seed_ratio_enabled: bool_flag(first_field(
            arguments,
            &["seedRatioLimited", "seed-ratio-limited"],
        )),
        seed_idle_limit: int_value(first_field(
            arguments,
            &["idle-seeding-limit", "seed-idle-limit"],
        )),
        seed_idle_enabled: bool_flag(first_field(
            arguments,
            &["idle-seeding-limit-enabled", "seed-idle-limited"],
        )),
        proxy_type: int_value(field(arguments, "proxy-type")),
        proxy_hostname: string_field(arguments, "proxy-host"),
        proxy_port: int_value(field(arguments, "proxy-port")),
        proxy_auth_enabled: bool_flag(field(arguments, "proxy-auth-enabled")),
        proxy_username: string_field(arguments, "proxy-username"),
        proxy_password: string_field(arguments, "proxy-password")
            .filter(|password| password != REDACTED),
        proxy_peer_connections: bool_flag(field(arguments, "proxy-peer-connections")),
        history_enabled: bool_flag(field(arguments, "history-enabled")),
        history_interval_seconds: int_value(field(arguments, "history-interval")),
        history_retention_days: int_value(field(arguments, "history-retention-days")),
    };
    if let Some((host, port)) = args::proxy_address(field(arguments, "proxy-url")) {
        update.proxy_hostname = Some(host);
        update.proxy_port = Some(port);
    }
    Ok(update)
}

fn apply_ui_preferences(ctx: &RpcContext, arguments: &Value) {
    let Some(ui) = field(arguments, "ui").filter(|ui| ui.is_object()) else {
        return;
    };
    let current = ctx.ui_preferences();
    let next = UiPreferences {
        auto_open: args::bool_value(field(ui, "autoOpen"), current.auto_open),
        autorun_hidden: args::bool_value(field(ui, "autorunHidden"), current.autorun_hidden),
        show_splash: args::bool_value(field(ui, "showSplash"), current.show_splash),
        splash_message: args::string(ui, "splashMessage")
            .map_or_else(|| current.splash_message.clone(), str::to_string),
    };
    if next == current {
        return;
    }
    if let Err(err) = ctx.store_ui_preferences(next) {
        warn!(error = %err, "failed to persist ui preferences");
    }
}

fn note_failure(failed: &mut bool, step: &'static str, outcome: EngineResult<()>) {
    if let Err(err) = outcome {
        warn!(step, error = %err, "session-set step failed");
        *failed = true;
    }
}

pub(super) fn set(ctx: &RpcContext, arguments: &Value) -> RpcResult<Value> {
    let outcome = apply_session_settings(ctx, arguments);
    apply_ui_preferences(ctx, arguments);
    outcome
}

fn apply_session_settings(ctx: &RpcContext, arguments: &Value) -> RpcResult<Value> {
    let download = download_dir(arguments)?;
    if let Some(path) = &download {
        ensure_directory(path)?;
    }
    let update = session_update(arguments)?;

    let engine = ctx.engine();
    let mut failed = false;
    if let Some(path) = download {
        debug!(path = %path.display(), "session-set download-dir");
        note_failure(&mut failed, "download-dir", engine.set_download_dir(path));
    }
    if let Some(port) = args::port_value(field(arguments, "peer-port")) {
        debug!(port, "session-set peer-port");
        note_failure(&mut failed, "peer-port", engine.set_listen_port(port));
    }
    let limits = SpeedLimitUpdate {
        download_kbps: int_value(field(arguments, "speed-limit-down")),
        download_enabled: bool_flag(field(arguments, "speed-limit-down-enabled")),
        upload_kbps: int_value(field(arguments, "speed-limit-up")),
        upload_enabled: bool_flag(field(arguments, "speed-limit-up-enabled")),
    };
    if !limits.is_empty() {
        note_failure(&mut failed, "speed-limits", engine.set_speed_limits(limits));
    }
    let peer_limit = int_value(first_field(arguments, &["peer-limit-global", "peer-limit"]));
    let per_torrent = int_value(field(arguments, "peer-limit-per-torrent"));
    if peer_limit.is_some() || per_torrent.is_some() {
        note_failure(
            &mut failed,
            "peer-limits",
            engine.set_peer_limits(peer_limit, per_torrent),
        );
    }
    if update != SessionUpdate::default() {
        note_failure(&mut failed, "session-update", engine.update_session(update));
    }

    if failed {
        return Err(RpcError::new("failed to update session settings"));
    }
    Ok(success())
}

pub(super) fn test(ctx: &RpcContext, _arguments: &Value) -> RpcResult<Value> {
    Ok(json!({ "portIsOpen": ctx.engine().port_is_open() }))
}

pub(super) fn stats(ctx: &RpcContext, _arguments: &Value) -> RpcResult<Value> {
    let snapshot = ctx.engine().snapshot();
    let stats = snapshot.stats;
    Ok(json!({
        "downloadSpeed": stats.download_rate,
        "uploadSpeed": stats.upload_rate,
        "torrentCount": stats.torrent_count,
        "activeTorrentCount": stats.active_torrent_count,
        "pausedTorrentCount": stats.paused_torrent_count,
        "dhtNodes": stats.dht_nodes,
        "cumulativeStats": snapshot.cumulative_stats,
        "currentStats": snapshot.current_stats,
    }))
}

pub(super) fn close(ctx: &RpcContext, _arguments: &Value) -> RpcResult<Value> {
    info!("session-close requested");
    ctx.engine().stop();
    Ok(success())
}

pub(super) fn store_status(ctx: &RpcContext, _arguments: &Value) -> RpcResult<Value> {
    Ok(json!({ "ready": ctx.engine().state_store_loaded() }))
}

pub(super) fn tray_status(ctx: &RpcContext, _arguments: &Value) -> RpcResult<Value> {
    let engine = ctx.engine();
    let snapshot = engine.snapshot();
    let stats = snapshot.stats;
    Ok(json!({
        "downloadKbps": stats.download_rate / 1024,
        "uploadKbps": stats.upload_rate / 1024,
        "activeTorrentCount": stats.active_torrent_count,
        "seedingCount": stats.seeding_torrent_count,
        "anyError": stats.error_torrent_count > 0,
        "allPaused": stats.torrent_count > 0 && stats.active_torrent_count == 0,
        "downloadDir": engine.settings().download_dir.display().to_string(),
        "uiAttached": ctx.ui_attached(),
        "autoOpen": ctx.ui_preferences().auto_open,
    }))
}

pub(super) fn ui_status(ctx: &RpcContext, _arguments: &Value) -> RpcResult<Value> {
    let ui = ctx.ui_preferences();
    Ok(json!({
        "uiAttached": ctx.ui_attached(),
        "autoOpen": ui.auto_open,
        "autorunHidden": ui.autorun_hidden,
        "showSplash": ui.show_splash,
        "splashMessage": ui.splash_message,
    }))
}

pub(super) fn attach(ctx: &RpcContext, attached: bool) -> RpcResult<Value> {
    debug!(attached, "ui presence changed");
    ctx.set_ui_attached(attached);
    Ok(success())
}

pub(super) fn ui_focus(ctx: &RpcContext, _arguments: &Value) -> RpcResult<Value> {
    if !ctx.ui_attached() {
        return Err(RpcError::new("UI is not attached"));
    }
    if ctx.events().publish(Event::UiFocus) == 0 {
        ctx.set_ui_attached(false);
        return Err(RpcError::new("UI unavailable"));
    }
    Ok(success())
}

pub(super) fn pause_all(ctx: &RpcContext, _arguments: &Value) -> RpcResult<Value> {
    ctx.engine().pause_all()?;
    Ok(success())
}

pub(super) fn resume_all(ctx: &RpcContext, _arguments: &Value) -> RpcResult<Value> {
    ctx.engine().resume_all()?;
    Ok(success())
}

pub(super) fn blocklist_update(ctx: &RpcContext, _arguments: &Value) -> RpcResult<Value> {
    let engine = ctx.engine();
    if !engine.request_blocklist_reload()? {
        return Err(RpcError::new("blocklist update failed"));
    }
    let mut response = json!({ "blocklist-size": engine.blocklist_entry_count() });
    if let Some(updated) = engine.blocklist_last_update() {
        response["blocklist-last-updated"] = json!(updated.timestamp());
    }
    Ok(response)
}

pub(super) fn app_shutdown(ctx: &RpcContext, _arguments: &Value) -> RpcResult<Value> {
    ctx.engine().stop();
    ctx.request_shutdown();
    Ok(success())
}
