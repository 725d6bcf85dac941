//! Environment loader for [`ServerOptions`].

use std::env;
use std::net::SocketAddr;

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::model::{BasicCredentials, ServerOptions};

/// Environment variable names understood by the loader.
pub mod vars {
    pub const BIND: &str = "TT_RPC_BIND";
    pub const RPC_PATH: &str = "TT_RPC_PATH";
    pub const WS_PATH: &str = "TT_WS_PATH";
    pub const SESSION_HEADER: &str = "TT_SESSION_HEADER";
    pub const TOKEN_HEADER: &str = "TT_TOKEN_HEADER";
    pub const BASIC_REALM: &str = "TT_BASIC_REALM";
    pub const TRUSTED_ORIGINS: &str = "TT_TRUSTED_ORIGINS";
    pub const USERNAME: &str = "TT_RPC_USERNAME";
    pub const PASSWORD: &str = "TT_RPC_PASSWORD";
    pub const TOKEN: &str = "TT_RPC_TOKEN";
}

impl ServerOptions {
    /// Load options from the process environment, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns an error when a variable is malformed or the result fails validation.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load options through an arbitrary lookup function.
    ///
    /// # Errors
    ///
    /// Returns an error when a value is malformed or the result fails validation.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut options = Self::default();
        if let Some(raw) = get(vars::BIND) {
            options.bind = raw
                .parse::<SocketAddr>()
                .map_err(|_| ConfigError::InvalidBindAddr { value: raw })?;
        }
        if let Some(path) = get(vars::RPC_PATH) {
            options.rpc_path = path;
        }
        if let Some(path) = get(vars::WS_PATH) {
            options.ws_path = path;
        }
        if let Some(header) = get(vars::SESSION_HEADER) {
            options.session_header = header;
        }
        if let Some(header) = get(vars::TOKEN_HEADER) {
            options.token_header = header;
        }
        if let Some(realm) = get(vars::BASIC_REALM) {
            options.basic_realm = realm;
        }
        if let Some(origins) = lookup(vars::TRUSTED_ORIGINS) {
            options.trusted_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(str::to_string)
                .collect();
        }
        options.basic_auth = match (get(vars::USERNAME), get(vars::PASSWORD)) {
            (Some(username), Some(password)) => Some(BasicCredentials { username, password }),
            (None, None) => None,
            _ => return Err(ConfigError::IncompleteCredentials),
        };
        options.token = get(vars::TOKEN);

        options.validate()?;
        debug!(
            bind = %options.bind,
            rpc_path = %options.rpc_path,
            ws_path = %options.ws_path,
            auth = options.requires_auth(),
            "server options loaded"
        );
        Ok(options)
    }
}
