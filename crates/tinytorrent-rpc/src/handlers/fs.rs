//! Filesystem helpers for the path picker and file drops. Every handler here
//! touches the disk and runs on the blocking pool.

use std::env;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use tinytorrent_fsops::{WriteMode, normalize_lexically, query_space, write_file_atomic};
use tracing::debug;

use super::{ensure_directory, success};
use crate::args::{field, request_path};
use crate::context::RpcContext;
use crate::error::{RpcError, RpcResult};

fn current_dir() -> RpcResult<PathBuf> {
    env::current_dir().map_err(RpcError::internal)
}

fn path_or_cwd(arguments: &Value) -> RpcResult<PathBuf> {
    request_path(field(arguments, "path")).map_or_else(current_dir, Ok)
}

pub(super) fn free_space(_ctx: &RpcContext, arguments: &Value) -> RpcResult<Value> {
    let Some(path) = field(arguments, "path").and_then(Value::as_str) else {
        return Err(RpcError::new("path argument required"));
    };
    let info = query_space(Path::new(path))?;
    Ok(json!({
        "path": path,
        "sizeBytes": info.free,
        "totalSize": info.total,
    }))
}

pub(super) fn browse(_ctx: &RpcContext, arguments: &Value) -> RpcResult<Value> {
    let path = path_or_cwd(arguments)?;
    let listing = tinytorrent_fsops::browse(&path)?;
    debug!(path = %listing.path, entries = listing.entries.len(), "fs-browse");
    Ok(json!(listing))
}

pub(super) fn space(_ctx: &RpcContext, arguments: &Value) -> RpcResult<Value> {
    let path = path_or_cwd(arguments)?;
    let info = query_space(&path)?;
    Ok(json!({
        "path": path.display().to_string(),
        "freeBytes": info.free,
        "totalBytes": info.total,
    }))
}

pub(super) fn create_dir(_ctx: &RpcContext, arguments: &Value) -> RpcResult<Value> {
    let Some(path) = request_path(field(arguments, "path")) else {
        return Err(RpcError::new("path required"));
    };
    let path = normalize_lexically(&path);
    ensure_directory(&path)?;
    Ok(success())
}

pub(super) fn write_file(_ctx: &RpcContext, arguments: &Value) -> RpcResult<Value> {
    if arguments.is_null() {
        return Err(RpcError::new("arguments required for fs-write-file"));
    }
    let Some(path) = field(arguments, "path").and_then(Value::as_str) else {
        return Err(RpcError::new("path argument required"));
    };
    if path.is_empty() {
        return Err(RpcError::new("path required"));
    }
    let target = Path::new(path);
    if !target.is_absolute() {
        return Err(RpcError::new("path must be absolute"));
    }
    let Some(data) = field(arguments, "data").and_then(Value::as_str) else {
        return Err(RpcError::new("data argument required"));
    };
    let bytes = STANDARD
        .decode(data)
        .map_err(|err| RpcError::new("invalid base64 payload").with_detail(err.to_string()))?;
    let mode = match field(arguments, "mode") {
        None => WriteMode::default(),
        Some(Value::String(mode)) => {
            WriteMode::parse(mode).ok_or_else(|| RpcError::new("invalid mode"))?
        }
        Some(_) => return Err(RpcError::new("mode must be a string")),
    };
    let written = write_file_atomic(target, &bytes, mode)?;
    Ok(json!({ "bytesWritten": written }))
}
