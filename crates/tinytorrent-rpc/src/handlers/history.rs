//! Transfer history queries.

use chrono::Utc;
use serde_json::{Value, json};

use super::success;
use crate::args::{field, int64_value};
use crate::context::RpcContext;
use crate::error::{RpcError, RpcResult};

/// Bucket width used when the engine reports no recording interval.
const FALLBACK_INTERVAL_SECS: i64 = 60;

/// Round `requested` up to a positive multiple of `base`, never below `base`.
/// `None` when the aligned step does not fit in an `i64`.
fn aligned_step(requested: Option<i64>, base: i64) -> Option<i64> {
    let step = requested.filter(|step| *step > 0).unwrap_or(base).max(base);
    match step % base {
        0 => Some(step),
        remainder => step.checked_add(base - remainder),
    }
}

pub(super) fn get(ctx: &RpcContext, arguments: &Value) -> RpcResult<Value> {
    if arguments.is_null() {
        return Err(RpcError::new("arguments required"));
    }
    let start = match field(arguments, "start") {
        None => return Err(RpcError::new("start required")),
        Some(raw) => int64_value(Some(raw)).ok_or_else(|| RpcError::new("invalid start"))?,
    };
    let end = match field(arguments, "end") {
        None => Utc::now().timestamp(),
        Some(raw) => int64_value(Some(raw)).ok_or_else(|| RpcError::new("invalid end"))?,
    }
    .max(start);

    let engine = ctx.engine();
    let interval = i64::from(engine.history_config().interval_seconds);
    let base = if interval > 0 {
        interval
    } else {
        FALLBACK_INTERVAL_SECS
    };
    let step = aligned_step(int64_value(field(arguments, "step")), base)
        .ok_or_else(|| RpcError::new("invalid step"))?;
    let buckets = engine.history_data(start, end, step)?;
    Ok(json!({
        "step": step,
        "recordingInterval": base,
        "buckets": buckets,
    }))
}

pub(super) fn clear(ctx: &RpcContext, arguments: &Value) -> RpcResult<Value> {
    let older_than = match field(arguments, "older-than") {
        None => None,
        Some(raw) => {
            Some(int64_value(Some(raw)).ok_or_else(|| RpcError::new("invalid older-than"))?)
        }
    };
    ctx.engine()
        .history_clear(older_than)
        .map_err(|err| RpcError::new("history clear failed").with_detail(err.to_string()))?;
    Ok(success())
}
