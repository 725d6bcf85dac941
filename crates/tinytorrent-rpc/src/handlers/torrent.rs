//! Torrent lifecycle, selection and relocation methods.

use std::fs;
use std::path::PathBuf;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use tinytorrent_engine::{
    AddTorrentRequest, AddTorrentStatus, EngineResult, QueueMove, TorrentBandwidthLimits,
    TorrentId, TorrentSeedLimits, TorrentSource,
};
use tinytorrent_fsops::{CODE_METAINFO_READ, absolute_normalized};
use tracing::{debug, info, warn};

use super::{ensure_directory, require_ids, session, success};
use crate::args::{self, bool_flag, bool_value, double_value, field, int_value};
use crate::context::RpcContext;
use crate::error::{RpcError, RpcResult};

/// Fields that can only be served from the per-torrent detail view.
const DETAIL_FIELDS: &[&str] = &[
    "files",
    "trackers",
    "peers",
    "pieceStates",
    "pieceAvailability",
];

fn wants_detail(arguments: &Value) -> bool {
    field(arguments, "fields")
        .and_then(Value::as_array)
        .is_some_and(|fields| {
            fields
                .iter()
                .filter_map(Value::as_str)
                .any(|name| DETAIL_FIELDS.contains(&name))
        })
}

pub(super) fn get(ctx: &RpcContext, arguments: &Value) -> RpcResult<Value> {
    let engine = ctx.engine();
    let ids = args::ids(arguments);
    let snapshot = engine.snapshot();

    let torrents = if wants_detail(arguments) {
        let targets: Vec<TorrentId> = if ids.is_empty() {
            snapshot.torrents.iter().map(|torrent| torrent.id).collect()
        } else {
            ids
        };
        let mut details = Vec::with_capacity(targets.len());
        for id in targets {
            if let Some(detail) = engine.torrent_detail(id)? {
                details.push(json!(detail));
            }
        }
        details
    } else {
        snapshot
            .torrents
            .iter()
            .filter(|torrent| ids.is_empty() || ids.contains(&torrent.id))
            .map(|torrent| json!(torrent))
            .collect()
    };
    Ok(json!({ "torrents": torrents }))
}

fn read_metainfo(path: &str) -> RpcResult<Vec<u8>> {
    let path = absolute_normalized(path.as_ref())?;
    let bytes = fs::read(&path).map_err(|err| {
        RpcError::new("metainfo-read-failure")
            .with_code(CODE_METAINFO_READ)
            .with_detail(format!("unable to read {}: {err}", path.display()))
    })?;
    if bytes.is_empty() {
        return Err(RpcError::new("metainfo-read-failure")
            .with_code(CODE_METAINFO_READ)
            .with_detail(format!("metainfo file {} is empty", path.display())));
    }
    Ok(bytes)
}

fn torrent_source(arguments: &Value) -> RpcResult<TorrentSource> {
    if let Some(path) = args::string(arguments, "metainfo-path").filter(|path| !path.is_empty()) {
        return read_metainfo(path).map(TorrentSource::Metainfo);
    }
    if let Some(encoded) = args::string(arguments, "metainfo") {
        return STANDARD
            .decode(encoded.trim())
            .ok()
            .filter(|bytes| !bytes.is_empty())
            .map(TorrentSource::Metainfo)
            .ok_or_else(|| RpcError::new("invalid metainfo content"));
    }
    args::string(arguments, "uri")
        .or_else(|| args::string(arguments, "filename"))
        .map(|uri| TorrentSource::Uri(uri.to_string()))
        .ok_or_else(|| RpcError::new("uri or filename required"))
}

pub(super) fn add(ctx: &RpcContext, arguments: &Value) -> RpcResult<Value> {
    if !arguments.is_object() {
        return Err(RpcError::new("arguments object missing for torrent-add"));
    }
    let source = torrent_source(arguments)?;
    let engine = ctx.engine();
    let download_dir: PathBuf = match session::download_dir(arguments)? {
        Some(path) => path,
        None => engine.settings().download_dir,
    };
    ensure_directory(&download_dir)?;

    let request = AddTorrentRequest {
        source,
        download_dir,
        paused: bool_value(field(arguments, "paused"), false),
        labels: args::labels(field(arguments, "labels")).unwrap_or_default(),
    };
    debug!(dir = %request.download_dir.display(), paused = request.paused, "torrent-add");
    match engine.add_torrent(request)? {
        AddTorrentStatus::Queued => Ok(json!({ "message": "torrent queued" })),
        AddTorrentStatus::InvalidUri => Err(RpcError::new("invalid magnet URI")),
    }
}

pub(super) fn start(ctx: &RpcContext, arguments: &Value, now: bool) -> RpcResult<Value> {
    let ids = require_ids(arguments)?;
    ctx.engine().start_torrents(&ids, now)?;
    Ok(success())
}

pub(super) fn stop(ctx: &RpcContext, arguments: &Value) -> RpcResult<Value> {
    let ids = require_ids(arguments)?;
    ctx.engine().stop_torrents(&ids)?;
    Ok(success())
}

pub(super) fn verify(ctx: &RpcContext, arguments: &Value) -> RpcResult<Value> {
    let ids = require_ids(arguments)?;
    ctx.engine().verify_torrents(&ids)?;
    Ok(success())
}

pub(super) fn remove(ctx: &RpcContext, arguments: &Value) -> RpcResult<Value> {
    let ids = require_ids(arguments)?;
    let delete_data = bool_value(field(arguments, "delete-local-data"), false);
    info!(count = ids.len(), delete_data, "removing torrents");
    ctx.engine().remove_torrents(&ids, delete_data)?;
    Ok(success())
}

pub(super) fn reannounce(ctx: &RpcContext, arguments: &Value) -> RpcResult<Value> {
    let ids = require_ids(arguments)?;
    ctx.engine().reannounce_torrents(&ids)?;
    Ok(success())
}

pub(super) fn queue_move(
    ctx: &RpcContext,
    arguments: &Value,
    direction: QueueMove,
) -> RpcResult<Value> {
    let ids = require_ids(arguments)?;
    ctx.engine().queue_move(&ids, direction)?;
    Ok(success())
}

/// Applies each present `torrent-set` field, remembering whether any was.
struct TorrentSetter<'a> {
    ctx: &'a RpcContext,
    ids: Vec<TorrentId>,
    applied: bool,
}

impl TorrentSetter<'_> {
    fn apply(&mut self, outcome: EngineResult<()>) -> RpcResult<()> {
        self.applied = true;
        outcome.map_err(RpcError::from)
    }

    fn file_selection(&mut self, arguments: &Value) -> RpcResult<()> {
        for (key, wanted) in [("files-wanted", true), ("files-unwanted", false)] {
            let files = args::int_array(arguments, key);
            if !files.is_empty() {
                let outcome = self
                    .ctx
                    .engine()
                    .toggle_file_selection(&self.ids, &files, wanted);
                self.apply(outcome)?;
            }
        }
        Ok(())
    }

    fn trackers(&mut self, arguments: &Value) -> RpcResult<()> {
        let engine = self.ctx.engine();
        let added = args::tracker_entries(field(arguments, "trackerAdd"));
        if !added.is_empty() {
            let outcome = engine.add_trackers(&self.ids, &added);
            self.apply(outcome)?;
        }
        let removed = args::tracker_announces(field(arguments, "trackerRemove"));
        if !removed.is_empty() {
            let outcome = engine.remove_trackers(&self.ids, &removed);
            self.apply(outcome)?;
        }
        let replaced = args::tracker_entries(field(arguments, "trackerReplace"));
        if !replaced.is_empty() {
            let outcome = engine.replace_trackers(&self.ids, &replaced);
            self.apply(outcome)?;
        }
        Ok(())
    }

    fn limits(&mut self, arguments: &Value) -> RpcResult<()> {
        let engine = self.ctx.engine();
        if let Some(priority) = args::bandwidth_priority(field(arguments, "bandwidthPriority")) {
            let outcome = engine.set_bandwidth_priority(&self.ids, priority);
            self.apply(outcome)?;
        }

        let bandwidth = TorrentBandwidthLimits {
            download_kbps: int_value(field(arguments, "downloadLimit")),
            download_limited: bool_flag(field(arguments, "downloadLimited")),
            upload_kbps: int_value(field(arguments, "uploadLimit")),
            upload_limited: bool_flag(field(arguments, "uploadLimited")),
        };
        if bandwidth != TorrentBandwidthLimits::default() {
            let outcome = engine.set_bandwidth_limits(&self.ids, bandwidth);
            self.apply(outcome)?;
        }

        let seed = TorrentSeedLimits {
            ratio_limit: double_value(field(arguments, "seedRatioLimit")),
            ratio_enabled: bool_flag(field(arguments, "seedRatioLimited")),
            ratio_mode: int_value(field(arguments, "seedRatioMode")),
            idle_limit: int_value(field(arguments, "seedIdleLimit"))
                .map(|minutes| minutes.max(0).saturating_mul(60)),
            idle_enabled: bool_flag(field(arguments, "seedIdleLimited")),
            idle_mode: int_value(field(arguments, "seedIdleMode")),
        };
        if seed != TorrentSeedLimits::default() {
            let outcome = engine.set_seed_limits(&self.ids, seed);
            self.apply(outcome)?;
        }
        Ok(())
    }

    fn flags(&mut self, arguments: &Value) -> RpcResult<()> {
        let engine = self.ctx.engine();
        if let Some(labels) = args::labels(field(arguments, "labels")) {
            let outcome = engine.set_labels(&self.ids, &labels);
            self.apply(outcome)?;
        }
        if let Some(enabled) = bool_flag(field(arguments, "sequential-download")) {
            let outcome = engine.set_sequential(&self.ids, enabled);
            self.apply(outcome)?;
        }
        if let Some(enabled) = bool_flag(field(arguments, "super-seeding")) {
            let outcome = engine.set_super_seeding(&self.ids, enabled);
            self.apply(outcome)?;
        }
        if let Some(recheck) = bool_flag(field(arguments, "force-recheck")) {
            let outcome = if recheck {
                engine.verify_torrents(&self.ids)
            } else {
                Ok(())
            };
            self.apply(outcome)?;
        }
        if bool_value(field(arguments, "force-reannounce"), false) {
            let outcome = engine.reannounce_torrents(&self.ids);
            self.apply(outcome)?;
        }
        Ok(())
    }
}

pub(super) fn set(ctx: &RpcContext, arguments: &Value) -> RpcResult<Value> {
    let mut setter = TorrentSetter {
        ctx,
        ids: require_ids(arguments)?,
        applied: false,
    };
    setter.file_selection(arguments)?;
    setter.trackers(arguments)?;
    setter.limits(arguments)?;
    setter.flags(arguments)?;
    if !setter.applied {
        return Err(RpcError::new("unsupported torrent-set arguments"));
    }
    Ok(success())
}

pub(super) fn set_location(ctx: &RpcContext, arguments: &Value) -> RpcResult<Value> {
    let ids = args::ids(arguments);
    let Some(location) = args::string(arguments, "location").filter(|_| !ids.is_empty()) else {
        return Err(RpcError::new("location and ids required"));
    };
    if location.is_empty() {
        return Err(RpcError::new("location cannot be empty"));
    }
    let destination = PathBuf::from(location);
    ensure_directory(&destination)?;
    let move_data = bool_value(field(arguments, "move"), true);
    ctx.engine().move_location(&ids, &destination, move_data)?;
    Ok(success())
}

pub(super) fn rename_path(ctx: &RpcContext, arguments: &Value) -> RpcResult<Value> {
    let ids = args::ids(arguments);
    let (Some(path), Some(name), Some(&first)) = (
        args::string(arguments, "path"),
        args::string(arguments, "name"),
        ids.first(),
    ) else {
        return Err(RpcError::new("ids, path and name required"));
    };
    let engine = ctx.engine();
    for &id in &ids {
        if engine.rename_path(id, path, name)? {
            return Ok(json!({ "id": first, "name": name, "path": path }));
        }
    }
    warn!(path, name, "rename matched no torrent");
    Err(RpcError::new("rename failed"))
}
