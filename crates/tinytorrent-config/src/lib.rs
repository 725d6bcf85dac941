#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links
)]

//! Server options and UI preference persistence.
//!
//! Layout: `model.rs` (typed options and defaults), `loader.rs` (environment
//! loader), `validate.rs` (consistency rules), `preferences.rs` (UI toggles
//! behind the [`PreferenceStore`] trait).

pub mod error;
pub mod loader;
pub mod model;
pub mod preferences;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use model::{
    BasicCredentials, DEFAULT_BASIC_REALM, DEFAULT_BIND, DEFAULT_RPC_PATH, DEFAULT_SESSION_HEADER,
    DEFAULT_TOKEN_HEADER, DEFAULT_WS_PATH, LEGACY_TOKEN_HEADER, ServerOptions,
};
pub use preferences::{FilePreferenceStore, MemoryPreferenceStore, PreferenceStore, UiPreferences};
