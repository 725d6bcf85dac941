//! Desktop shell integration seam.

use std::path::Path;

use async_trait::async_trait;

/// Result of a shell action, reported as `{action, success, message}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellOutcome {
    pub success: bool,
    pub message: String,
}

impl ShellOutcome {
    /// Successful action without a message.
    #[must_use]
    pub const fn done() -> Self {
        Self {
            success: true,
            message: String::new(),
        }
    }

    /// Failed action with a client-facing explanation.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Operating-system hooks used by the `system-*` methods.
#[async_trait]
pub trait ShellIntegration: Send + Sync {
    /// Show `path` in the platform file manager.
    async fn reveal(&self, path: &Path) -> ShellOutcome;

    /// Open `path` with its default application.
    async fn open(&self, path: &Path) -> ShellOutcome;

    /// Register this application as the magnet and `.torrent` handler.
    async fn register_handler(&self) -> ShellOutcome;
}

/// Integration for hosts without a desktop shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadlessShell;

#[async_trait]
impl ShellIntegration for HeadlessShell {
    async fn reveal(&self, _path: &Path) -> ShellOutcome {
        ShellOutcome::failed("unable to reveal path")
    }

    async fn open(&self, _path: &Path) -> ShellOutcome {
        ShellOutcome::failed("unable to open path")
    }

    async fn register_handler(&self) -> ShellOutcome {
        ShellOutcome::failed("system register handler unsupported")
    }
}
