//! Method handlers and their registration table.

use std::path::Path;
use std::sync::Arc;

use serde_json::{Value, json};
use tinytorrent_engine::{QueueMove, TorrentId};
use tinytorrent_fsops::ensure_directory_exists;

use crate::args;
use crate::context::RpcContext;
use crate::dispatcher::Dispatcher;
use crate::error::{RpcError, RpcResult};

mod capabilities;
mod fs;
mod history;
mod session;
mod system;
mod torrent;

type SyncHandler = fn(&RpcContext, &Value) -> RpcResult<Value>;

fn bind(
    ctx: &Arc<RpcContext>,
    handler: SyncHandler,
) -> impl Fn(&Value) -> RpcResult<Value> + Send + Sync + 'static {
    let ctx = Arc::clone(ctx);
    move |arguments| handler(&ctx, arguments)
}

fn bind_blocking(
    ctx: &Arc<RpcContext>,
    handler: SyncHandler,
) -> impl Fn(Value) -> RpcResult<Value> + Send + Sync + 'static {
    let ctx = Arc::clone(ctx);
    move |arguments| handler(&ctx, &arguments)
}

/// Build a dispatcher answering every supported method against `ctx`.
#[must_use]
pub fn build_dispatcher(ctx: Arc<RpcContext>) -> Dispatcher {
    let mut dispatcher = Dispatcher::new();
    register_all(&mut dispatcher, &ctx);
    dispatcher
}

/// Register every supported method on `dispatcher`.
pub fn register_all(dispatcher: &mut Dispatcher, ctx: &Arc<RpcContext>) {
    let sync: &[(&'static str, SyncHandler)] = &[
        ("tt-get-capabilities", capabilities::get),
        ("session-get", session::get),
        ("session-set", session::set),
        ("session-test", session::test),
        ("session-stats", session::stats),
        ("session-close", session::close),
        ("session-store-status", session::store_status),
        ("session-tray-status", session::tray_status),
        ("session-ui-status", session::ui_status),
        ("session-ui-attach", |ctx, _| session::attach(ctx, true)),
        ("session-ui-detach", |ctx, _| session::attach(ctx, false)),
        ("session-ui-ready", |ctx, _| session::attach(ctx, true)),
        ("session-ui-focus", session::ui_focus),
        ("session-pause-all", session::pause_all),
        ("session-resume-all", session::resume_all),
        ("blocklist-update", session::blocklist_update),
        ("app-shutdown", session::app_shutdown),
        ("history-clear", history::clear),
        ("torrent-get", torrent::get),
        ("torrent-add", torrent::add),
        ("torrent-start", |ctx, arguments| torrent::start(ctx, arguments, false)),
        ("torrent-start-now", |ctx, arguments| torrent::start(ctx, arguments, true)),
        ("torrent-stop", torrent::stop),
        ("torrent-verify", torrent::verify),
        ("torrent-remove", torrent::remove),
        ("torrent-reannounce", torrent::reannounce),
        ("queue-move-top", |ctx, arguments| torrent::queue_move(ctx, arguments, QueueMove::Top)),
        ("queue-move-bottom", |ctx, arguments| {
            torrent::queue_move(ctx, arguments, QueueMove::Bottom)
        }),
        ("queue-move-up", |ctx, arguments| torrent::queue_move(ctx, arguments, QueueMove::Up)),
        ("queue-move-down", |ctx, arguments| {
            torrent::queue_move(ctx, arguments, QueueMove::Down)
        }),
        ("torrent-set", torrent::set),
        ("torrent-set-location", torrent::set_location),
        ("torrent-rename-path", torrent::rename_path),
        ("group-set", |_, _| Ok(json!({}))),
    ];
    for &(method, handler) in sync {
        dispatcher.register_sync(method, bind(ctx, handler));
    }

    // Handlers that touch the disk.
    let blocking: &[(&'static str, SyncHandler)] = &[
        ("history-get", history::get),
        ("free-space", fs::free_space),
        ("fs-browse", fs::browse),
        ("fs-space", fs::space),
        ("fs-create-dir", fs::create_dir),
        ("fs-write-file", fs::write_file),
    ];
    for &(method, handler) in blocking {
        dispatcher.register_blocking(method, bind_blocking(ctx, handler));
    }

    system::register(dispatcher, ctx);
}

/// Non-empty id list, or `"ids required"`.
pub(crate) fn require_ids(arguments: &Value) -> RpcResult<Vec<TorrentId>> {
    let ids = args::ids(arguments);
    if ids.is_empty() {
        return Err(RpcError::new("ids required"));
    }
    Ok(ids)
}

/// Create `path` if needed, mapping failures to coded RPC errors.
pub(crate) fn ensure_directory(path: &Path) -> RpcResult<()> {
    ensure_directory_exists(path).map_err(RpcError::from)
}

pub(crate) fn success() -> Value {
    json!({})
}
