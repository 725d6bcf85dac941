//! UI preferences persisted through a key-value settings store.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, ConfigResult};

const KEY_AUTO_OPEN: &str = "uiAutoOpen";
const KEY_AUTORUN_HIDDEN: &str = "uiAutorunHidden";
const KEY_SHOW_SPLASH: &str = "uiShowSplash";
const KEY_SPLASH_MESSAGE: &str = "uiSplashMessage";

/// Key-value settings store shared with the engine.
pub trait PreferenceStore: Send + Sync {
    /// Read a stored value.
    fn get(&self, key: &str) -> Option<String>;

    /// Store a value.
    ///
    /// # Errors
    ///
    /// Returns an error when the backing store rejects the write.
    fn set(&self, key: &'static str, value: &str) -> ConfigResult<()>;

    /// Delete a value.
    ///
    /// # Errors
    ///
    /// Returns an error when the backing store rejects the delete.
    fn remove(&self, key: &'static str) -> ConfigResult<()>;
}

/// Store keeping values in process memory.
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    values: Mutex<HashMap<String, String>>,
}

impl PreferenceStore for MemoryPreferenceStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &'static str, value: &str) -> ConfigResult<()> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &'static str) -> ConfigResult<()> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

/// Store backed by a JSON object on disk, rewritten on every change.
#[derive(Debug)]
pub struct FilePreferenceStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl FilePreferenceStore {
    /// Open the store, starting empty when the file is missing or unreadable.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|err| {
                warn!(path = %path.display(), error = %err, "ignoring unreadable preference file");
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };
        Self {
            path,
            values: Mutex::new(values),
        }
    }

    /// Location of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, key: &'static str, values: &BTreeMap<String, String>) -> ConfigResult<()> {
        let write = || -> io::Result<()> {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent)?;
            }
            let body = serde_json::to_vec_pretty(values).map_err(io::Error::other)?;
            let staging = self.path.with_extension("tmp");
            fs::write(&staging, body)?;
            fs::rename(&staging, &self.path)
        };
        write().map_err(|source| ConfigError::PreferenceWrite { key, source })
    }
}

impl PreferenceStore for FilePreferenceStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &'static str, value: &str) -> ConfigResult<()> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_string(), value.to_string());
        self.flush(key, &values)
    }

    fn remove(&self, key: &'static str) -> ConfigResult<()> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        if values.remove(key).is_some() {
            self.flush(key, &values)?;
        }
        Ok(())
    }
}

/// Desktop UI behaviour toggles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiPreferences {
    pub auto_open: bool,
    pub autorun_hidden: bool,
    pub show_splash: bool,
    pub splash_message: String,
}

impl Default for UiPreferences {
    fn default() -> Self {
        Self {
            auto_open: true,
            autorun_hidden: false,
            show_splash: true,
            splash_message: String::new(),
        }
    }
}

fn parse_flag(value: Option<String>, fallback: bool) -> bool {
    let Some(value) = value else {
        return fallback;
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => true,
        "0" | "false" | "no" => false,
        _ => fallback,
    }
}

const fn flag(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}

impl UiPreferences {
    /// Read preferences, keeping defaults for absent or unreadable keys.
    #[must_use]
    pub fn load(store: &dyn PreferenceStore) -> Self {
        let defaults = Self::default();
        Self {
            auto_open: parse_flag(store.get(KEY_AUTO_OPEN), defaults.auto_open),
            autorun_hidden: parse_flag(store.get(KEY_AUTORUN_HIDDEN), defaults.autorun_hidden),
            show_splash: parse_flag(store.get(KEY_SHOW_SPLASH), defaults.show_splash),
            splash_message: store.get(KEY_SPLASH_MESSAGE).unwrap_or_default(),
        }
    }

    /// Write every preference; an empty splash message removes the key.
    ///
    /// # Errors
    ///
    /// Returns the first store failure.
    pub fn persist(&self, store: &dyn PreferenceStore) -> ConfigResult<()> {
        store.set(KEY_AUTO_OPEN, flag(self.auto_open))?;
        store.set(KEY_AUTORUN_HIDDEN, flag(self.autorun_hidden))?;
        store.set(KEY_SHOW_SPLASH, flag(self.show_splash))?;
        if self.splash_message.is_empty() {
            store.remove(KEY_SPLASH_MESSAGE)
        } else {
            store.set(KEY_SPLASH_MESSAGE, &self.splash_message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_store_yields_defaults() {
        let store = MemoryPreferenceStore::default();
        assert_eq!(UiPreferences::load(&store), UiPreferences::default());
    }

    #[test]
    fn flags_accept_loose_spellings() {
        let store = MemoryPreferenceStore::default();
        store.set(KEY_AUTO_OPEN, "No").expect("set");
        store.set(KEY_AUTORUN_HIDDEN, "yes").expect("set");
        store.set(KEY_SHOW_SPLASH, "maybe").expect("set");
        let prefs = UiPreferences::load(&store);
        assert!(!prefs.auto_open);
        assert!(prefs.autorun_hidden);
        assert!(prefs.show_splash);
    }

    #[test]
    fn persist_round_trips_and_clears_message() {
        let store = MemoryPreferenceStore::default();
        let prefs = UiPreferences {
            auto_open: false,
            autorun_hidden: true,
            show_splash: false,
            splash_message: "hello".into(),
        };
        prefs.persist(&store).expect("persist");
        assert_eq!(store.get(KEY_AUTO_OPEN).as_deref(), Some("0"));
        assert_eq!(UiPreferences::load(&store), prefs);

        let cleared = UiPreferences {
            splash_message: String::new(),
            ..prefs
        };
        cleared.persist(&store).expect("persist");
        assert!(store.get(KEY_SPLASH_MESSAGE).is_none());
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state").join("prefs.json");
        {
            let store = FilePreferenceStore::open(&path);
            let prefs = UiPreferences {
                auto_open: false,
                ..UiPreferences::default()
            };
            prefs.persist(&store).expect("persist");
        }
        let reopened = FilePreferenceStore::open(&path);
        assert_eq!(reopened.path(), path.as_path());
        assert!(!UiPreferences::load(&reopened).auto_open);
    }

    #[test]
    fn file_store_write_failure_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").expect("write blocker");
        let store = FilePreferenceStore::open(blocker.join("prefs.json"));
        let err = store.set(KEY_AUTO_OPEN, "1").expect_err("write should fail");
        assert!(matches!(err, ConfigError::PreferenceWrite { key: KEY_AUTO_OPEN, .. }));
    }

    #[test]
    fn preferences_serialize_with_camel_case() {
        let value = serde_json::to_value(UiPreferences::default()).expect("json");
        assert_eq!(value["autoOpen"], true);
        assert_eq!(value["splashMessage"], "");
    }
}
