//! Validation rules applied to [`ServerOptions`].

use crate::error::{ConfigError, ConfigResult};
use crate::model::ServerOptions;

fn check_path(field: &'static str, value: &str) -> ConfigResult<()> {
    if value.starts_with('/') {
        Ok(())
    } else {
        Err(ConfigError::InvalidField {
            field,
            value: Some(value.to_string()),
            reason: "must start with '/'",
        })
    }
}

fn check_header(field: &'static str, value: &str) -> ConfigResult<()> {
    let valid = !value.is_empty()
        && value
            .bytes()
            .all(|byte| byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_');
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidField {
            field,
            value: Some(value.to_string()),
            reason: "must be a non-empty header name",
        })
    }
}

impl ServerOptions {
    /// Check paths, header names and credentials for consistency.
    ///
    /// # Errors
    ///
    /// Returns the first rule violation found.
    pub fn validate(&self) -> ConfigResult<()> {
        check_path("rpc_path", &self.rpc_path)?;
        check_path("ws_path", &self.ws_path)?;
        if self.rpc_path == self.ws_path {
            return Err(ConfigError::InvalidField {
                field: "ws_path",
                value: Some(self.ws_path.clone()),
                reason: "must differ from rpc_path",
            });
        }
        check_header("session_header", &self.session_header)?;
        check_header("token_header", &self.token_header)?;
        if let Some(creds) = &self.basic_auth {
            if creds.username.is_empty() || creds.password.is_empty() {
                return Err(ConfigError::IncompleteCredentials);
            }
        }
        if self.token.as_deref().is_some_and(str::is_empty) {
            return Err(ConfigError::InvalidField {
                field: "token",
                value: None,
                reason: "must not be empty",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BasicCredentials;

    #[test]
    fn defaults_are_valid() {
        ServerOptions::default().validate().expect("defaults validate");
    }

    #[test]
    fn relative_and_colliding_paths_fail() {
        let options = ServerOptions {
            rpc_path: "rpc".into(),
            ..ServerOptions::default()
        };
        assert!(matches!(
            options.validate(),
            Err(ConfigError::InvalidField { field: "rpc_path", .. })
        ));

        let options = ServerOptions {
            ws_path: "/transmission/rpc".into(),
            ..ServerOptions::default()
        };
        assert!(matches!(
            options.validate(),
            Err(ConfigError::InvalidField { field: "ws_path", reason, .. }) if reason.contains("differ")
        ));
    }

    #[test]
    fn header_names_are_checked() {
        let options = ServerOptions {
            session_header: "Bad Header".into(),
            ..ServerOptions::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn blank_credentials_fail() {
        let options = ServerOptions {
            basic_auth: Some(BasicCredentials {
                username: "admin".into(),
                password: String::new(),
            }),
            ..ServerOptions::default()
        };
        assert!(matches!(
            options.validate(),
            Err(ConfigError::IncompleteCredentials)
        ));
    }
}
