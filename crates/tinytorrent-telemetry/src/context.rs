//! Process-wide span carrying service identity.

use tracing::{Span, span::Entered};

use crate::init::build_sha;

/// Keeps the application span entered for the lifetime of the guard.
pub struct GlobalContextGuard {
    _guard: Entered<'static>,
}

impl GlobalContextGuard {
    /// Enter the `app` span tagged with the service name and build SHA.
    #[must_use]
    pub fn new(service: &str) -> Self {
        let span: &'static Span = Box::leak(Box::new(tracing::info_span!(
            "app",
            service = %service,
            build_sha = %build_sha(),
            port = tracing::field::Empty
        )));
        Self {
            _guard: span.enter(),
        }
    }
}

/// Record the bound listener port on the current span.
pub fn record_listen_port(port: u16) {
    Span::current().record("port", port);
}
