//! Typed server options supplied at construction time.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// Default RPC endpoint path.
pub const DEFAULT_RPC_PATH: &str = "/transmission/rpc";
/// Default WebSocket endpoint path.
pub const DEFAULT_WS_PATH: &str = "/ws";
/// Default CSRF session header.
pub const DEFAULT_SESSION_HEADER: &str = "X-Transmission-Session-Id";
/// Default token header.
pub const DEFAULT_TOKEN_HEADER: &str = "X-TT-Auth";
/// Legacy token header still honoured for older clients.
pub const LEGACY_TOKEN_HEADER: &str = "X-TinyTorrent-Token";
/// Default Basic authentication realm.
pub const DEFAULT_BASIC_REALM: &str = "TinyTorrent RPC";
/// Default listener address; port 0 lets the OS pick.
pub const DEFAULT_BIND: &str = "127.0.0.1:0";

/// HTTP Basic credential pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

/// Listener, path, header and credential settings for the control-plane server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerOptions {
    /// Socket address to bind.
    pub bind: SocketAddr,
    /// Path serving the JSON RPC endpoint.
    pub rpc_path: String,
    /// Path serving the WebSocket endpoint.
    pub ws_path: String,
    /// Header carrying the CSRF session token.
    pub session_header: String,
    /// Header carrying the optional bearer token.
    pub token_header: String,
    /// Realm announced in `WWW-Authenticate`.
    pub basic_realm: String,
    /// Origins allowed to call the API; empty accepts every origin.
    pub trusted_origins: Vec<String>,
    /// Optional HTTP Basic credentials.
    pub basic_auth: Option<BasicCredentials>,
    /// Optional token accepted through the token headers or `?token=`.
    pub token: Option<String>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 0)),
            rpc_path: DEFAULT_RPC_PATH.to_string(),
            ws_path: DEFAULT_WS_PATH.to_string(),
            session_header: DEFAULT_SESSION_HEADER.to_string(),
            token_header: DEFAULT_TOKEN_HEADER.to_string(),
            basic_realm: DEFAULT_BASIC_REALM.to_string(),
            trusted_origins: vec!["tt://app".to_string(), "http://localhost:3000".to_string()],
            basic_auth: None,
            token: None,
        }
    }
}

impl ServerOptions {
    /// Whether any credential check is configured.
    #[must_use]
    pub const fn requires_auth(&self) -> bool {
        self.basic_auth.is_some() || self.token.is_some()
    }
}
