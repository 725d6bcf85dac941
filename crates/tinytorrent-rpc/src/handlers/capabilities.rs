use serde_json::{Value, json};

use crate::context::RpcContext;
use crate::error::RpcResult;

pub(super) const SERVER_VERSION: &str = "TinyTorrent 1.0.0";
pub(super) const RPC_VERSION: i32 = 17;
pub(super) const RPC_VERSION_MIN: i32 = 1;

/// Optional behaviours clients may probe for before using them.
const FEATURES: &[&str] = &[
    "fs-browse",
    "system-integration",
    "system-reveal",
    "system-open",
    "proxy-configuration",
    "proxy-support",
    "sequential-download",
    "labels",
];

pub(super) fn get(ctx: &RpcContext, _arguments: &Value) -> RpcResult<Value> {
    Ok(json!({
        "server-version": SERVER_VERSION,
        "version": SERVER_VERSION,
        "rpc-version": RPC_VERSION,
        "rpc-version-min": RPC_VERSION_MIN,
        "websocket-endpoint": ctx.ws_path(),
        "websocket-path": ctx.ws_path(),
        "platform": std::env::consts::OS,
        "features": FEATURES,
    }))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::harness;
    use serde_json::Value;

    #[test]
    fn capabilities_advertise_websocket_and_features() {
        let h = harness();
        let response = h.call("tt-get-capabilities", Value::Null);
        let args = &response["arguments"];
        assert_eq!(args["server-version"], "TinyTorrent 1.0.0");
        assert_eq!(args["rpc-version"], 17);
        assert_eq!(args["websocket-path"], "/ws");
        assert_eq!(args["platform"], std::env::consts::OS);
        let features = args["features"].as_array().expect("features");
        assert!(features.iter().any(|feature| feature == "fs-browse"));
        assert!(features.iter().any(|feature| feature == "labels"));
    }
}
