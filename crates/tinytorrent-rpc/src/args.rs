//! Defensive argument parsing.
//!
//! Clients send numbers as integers, reals or strings and lists as scalars or
//! arrays. Every helper here accepts the loose forms and returns `None` (or an
//! empty collection) instead of failing on malformed input.

use std::path::PathBuf;

use serde_json::Value;
use tinytorrent_engine::{EncryptionMode, TorrentId, TrackerEntry};

/// Longest path accepted from a request.
pub const MAX_REQUEST_PATH_LEN: usize = 4096;

/// Look up `key` when `arguments` is an object.
#[must_use]
pub fn field<'a>(arguments: &'a Value, key: &str) -> Option<&'a Value> {
    arguments.as_object().and_then(|object| object.get(key))
}

/// First present key among `keys`, for arguments with legacy spellings.
#[must_use]
pub fn first_field<'a>(arguments: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| field(arguments, key))
}

/// String value of `key`.
#[must_use]
pub fn string<'a>(arguments: &'a Value, key: &str) -> Option<&'a str> {
    field(arguments, key).and_then(Value::as_str)
}

fn parse_numeric_text(text: &str) -> Option<i64> {
    let text = text.trim();
    text.parse::<i64>().ok().or_else(|| {
        text.parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .map(truncate)
    })
}

#[allow(clippy::cast_possible_truncation)]
fn truncate(value: f64) -> i64 {
    value.trunc() as i64
}

/// Parse a signed, unsigned, real or numeric-string value as `i64`.
#[must_use]
pub fn int64_value(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_u64().and_then(|raw| i64::try_from(raw).ok()))
            .or_else(|| number.as_f64().filter(|raw| raw.is_finite()).map(truncate)),
        Value::String(text) => parse_numeric_text(text),
        _ => None,
    }
}

/// Like [`int64_value`] but narrowed to `i32`; out-of-range values are rejected.
#[must_use]
pub fn int_value(value: Option<&Value>) -> Option<i32> {
    int64_value(value).and_then(|raw| i32::try_from(raw).ok())
}

/// Parse a real number from any numeric or numeric-string encoding.
#[must_use]
pub fn double_value(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok().filter(|raw| raw.is_finite()),
        _ => None,
    }
}

/// Interpret booleans, non-zero numbers and `"true"/"false"/"1"/"0"`.
#[must_use]
pub fn bool_value(value: Option<&Value>, default: bool) -> bool {
    match value {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(number)) => number
            .as_i64()
            .map(|raw| raw != 0)
            .or_else(|| number.as_u64().map(|raw| raw != 0))
            .unwrap_or(default),
        Some(Value::String(text)) => match text.as_str() {
            "true" | "1" => true,
            "false" | "0" => false,
            _ => default,
        },
        _ => default,
    }
}

/// Present flags parse through [`bool_value`] defaulting to `false`.
#[must_use]
pub fn bool_flag(value: Option<&Value>) -> Option<bool> {
    value.map(|value| bool_value(Some(value), false))
}

/// The `ids` argument as a list; scalars become single-element lists and
/// non-integer entries are skipped.
#[must_use]
pub fn ids(arguments: &Value) -> Vec<TorrentId> {
    match field(arguments, "ids") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| int64_value(Some(item)))
            .collect(),
        Some(scalar) => int64_value(Some(scalar)).into_iter().collect(),
        None => Vec::new(),
    }
}

/// Integer array under `key`; anything but an array yields an empty list.
#[must_use]
pub fn int_array(arguments: &Value, key: &str) -> Vec<i32> {
    field(arguments, key)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(|item| int_value(Some(item))).collect())
        .unwrap_or_default()
}

/// Port number that fits in `u16`.
#[must_use]
pub fn port_value(value: Option<&Value>) -> Option<u16> {
    int64_value(value).and_then(|raw| u16::try_from(raw).ok())
}

/// Non-empty string path of at most [`MAX_REQUEST_PATH_LEN`] bytes without NUL.
#[must_use]
pub fn request_path(value: Option<&Value>) -> Option<PathBuf> {
    let text = value?.as_str()?;
    if text.is_empty() || text.len() > MAX_REQUEST_PATH_LEN || text.contains('\0') {
        return None;
    }
    Some(PathBuf::from(text))
}

/// Bandwidth priority clamped to `0..=2`; `low`/`normal`/`high` are accepted.
#[must_use]
pub fn bandwidth_priority(value: Option<&Value>) -> Option<i32> {
    let value = value?;
    if let Some(raw) = int64_value(Some(value)) {
        #[allow(clippy::cast_possible_truncation)]
        return Some(raw.clamp(0, 2) as i32);
    }
    match value.as_str()?.to_ascii_lowercase().as_str() {
        "low" => Some(0),
        "normal" => Some(1),
        "high" => Some(2),
        _ => None,
    }
}

/// Labels given as one string or an array of strings; other entries are skipped.
#[must_use]
pub fn labels(value: Option<&Value>) -> Option<Vec<String>> {
    match value? {
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
        ),
        Value::String(label) => Some(vec![label.clone()]),
        _ => Some(Vec::new()),
    }
}

/// Encryption preference from a numeric code or its name.
#[must_use]
pub fn encryption(value: Option<&Value>) -> Option<EncryptionMode> {
    let from_code = |code: i64| match code {
        1 => EncryptionMode::Preferred,
        2 => EncryptionMode::Required,
        _ => EncryptionMode::Tolerated,
    };
    match value? {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_u64().map(|_| 0))
            .map(from_code),
        Value::String(text) => Some(match text.to_ascii_lowercase().as_str() {
            "preferred" | "prefer" | "1" => EncryptionMode::Preferred,
            "required" | "2" => EncryptionMode::Required,
            _ => EncryptionMode::Tolerated,
        }),
        _ => None,
    }
}

fn tracker_entry(value: &Value) -> Option<TrackerEntry> {
    let (announce, tier) = match value {
        Value::String(announce) => (announce.as_str(), 0),
        Value::Object(object) => (
            object.get("announce").and_then(Value::as_str)?,
            int_value(object.get("tier")).unwrap_or(0),
        ),
        _ => return None,
    };
    (!announce.is_empty()).then(|| TrackerEntry {
        announce: announce.to_string(),
        tier,
    })
}

/// Tracker entries given as announce strings or `{announce, tier}` objects.
#[must_use]
pub fn tracker_entries(value: Option<&Value>) -> Vec<TrackerEntry> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(tracker_entry).collect(),
        Some(single) => tracker_entry(single).into_iter().collect(),
        None => Vec::new(),
    }
}

/// Announce URLs named for removal, as strings or `{announce}` objects.
#[must_use]
pub fn tracker_announces(value: Option<&Value>) -> Vec<String> {
    tracker_entries(value)
        .into_iter()
        .map(|entry| entry.announce)
        .collect()
}

/// Split a `host:port` proxy address; the port must fit `u16`.
#[must_use]
pub fn proxy_address(value: Option<&Value>) -> Option<(String, i32)> {
    let text = value?.as_str()?.trim();
    let (host, port) = if let Some(rest) = text.strip_prefix('[') {
        let (host, tail) = rest.split_once(']')?;
        (host, tail.strip_prefix(':')?)
    } else {
        text.rsplit_once(':')?
    };
    let port = port.parse::<u16>().ok()?;
    (!host.is_empty()).then(|| (host.to_string(), i32::from(port)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn integers_accept_loose_encodings() {
        assert_eq!(int_value(Some(&json!(7))), Some(7));
        assert_eq!(int_value(Some(&json!(-3))), Some(-3));
        assert_eq!(int_value(Some(&json!(4.9))), Some(4));
        assert_eq!(int_value(Some(&json!(" 12 "))), Some(12));
        assert_eq!(int_value(Some(&json!("2.5"))), Some(2));
        assert_eq!(int_value(Some(&json!("abc"))), None);
        assert_eq!(int_value(Some(&json!(null))), None);
        assert_eq!(int_value(Some(&json!(u64::MAX))), None);
        assert_eq!(int_value(None), None);
    }

    #[test]
    fn ids_accept_scalars_and_skip_garbage() {
        assert_eq!(ids(&json!({"ids": 5})), vec![5]);
        assert_eq!(ids(&json!({"ids": "9"})), vec![9]);
        assert_eq!(ids(&json!({"ids": [1, "2", "x", null, 3.0]})), vec![1, 2, 3]);
        assert!(ids(&json!({})).is_empty());
        assert!(ids(&Value::Null).is_empty());
    }

    #[test]
    fn booleans_follow_loose_rules() {
        assert!(bool_value(Some(&json!(true)), false));
        assert!(bool_value(Some(&json!(2)), false));
        assert!(!bool_value(Some(&json!(0)), true));
        assert!(bool_value(Some(&json!("1")), false));
        assert!(!bool_value(Some(&json!("false")), true));
        assert!(bool_value(Some(&json!("maybe")), true));
        assert_eq!(bool_flag(None), None);
        assert_eq!(bool_flag(Some(&json!("yes"))), Some(false));
    }

    #[test]
    fn ports_must_fit_u16() {
        assert_eq!(port_value(Some(&json!(51413))), Some(51413));
        assert_eq!(port_value(Some(&json!(65536))), None);
        assert_eq!(port_value(Some(&json!(-1))), None);
    }

    #[test]
    fn request_paths_are_bounded() {
        assert_eq!(
            request_path(Some(&json!("/data"))),
            Some(PathBuf::from("/data"))
        );
        assert_eq!(request_path(Some(&json!(""))), None);
        assert_eq!(request_path(Some(&json!("a\0b"))), None);
        assert_eq!(request_path(Some(&json!(7))), None);
        let long = "x".repeat(MAX_REQUEST_PATH_LEN + 1);
        assert_eq!(request_path(Some(&json!(long))), None);
    }

    #[test]
    fn bandwidth_priority_clamps() {
        assert_eq!(bandwidth_priority(Some(&json!(9))), Some(2));
        assert_eq!(bandwidth_priority(Some(&json!(-4))), Some(0));
        assert_eq!(bandwidth_priority(Some(&json!("High"))), Some(2));
        assert_eq!(bandwidth_priority(Some(&json!("low"))), Some(0));
        assert_eq!(bandwidth_priority(Some(&json!("urgent"))), None);
    }

    #[test]
    fn labels_and_trackers_accept_both_shapes() {
        assert_eq!(labels(Some(&json!("tv"))), Some(vec!["tv".to_string()]));
        assert_eq!(
            labels(Some(&json!(["a", 1, "b"]))),
            Some(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(labels(None), None);

        let trackers = tracker_entries(Some(&json!([
            "udp://one",
            {"announce": "udp://two", "tier": 2},
            {"tier": 1},
            ""
        ])));
        assert_eq!(trackers.len(), 2);
        assert_eq!(trackers[1].tier, 2);
        assert_eq!(
            tracker_announces(Some(&json!({"announce": "udp://x"}))),
            vec!["udp://x".to_string()]
        );
    }

    #[test]
    fn encryption_names_and_codes() {
        assert_eq!(encryption(Some(&json!(1))), Some(EncryptionMode::Preferred));
        assert_eq!(encryption(Some(&json!("Required"))), Some(EncryptionMode::Required));
        assert_eq!(encryption(Some(&json!("whatever"))), Some(EncryptionMode::Tolerated));
        assert_eq!(encryption(Some(&json!(true))), None);
    }

    #[test]
    fn proxy_addresses_split_host_and_port() {
        assert_eq!(
            proxy_address(Some(&json!("proxy.lan:1080"))),
            Some(("proxy.lan".to_string(), 1080))
        );
        assert_eq!(
            proxy_address(Some(&json!("[::1]:9050"))),
            Some(("::1".to_string(), 9050))
        );
        assert_eq!(proxy_address(Some(&json!("proxy.lan"))), None);
        assert_eq!(proxy_address(Some(&json!(":80"))), None);
    }
}
