//! crates/reading_session_core/src/settings_store.rs
//!
//! Device-scoped persistence of the reader's display preferences.

use std::sync::Arc;
use tracing::warn;

use crate::ports::KeyValueStore;
use crate::settings::ReaderSettings;

/// The single key the settings record lives under.
pub const SETTINGS_KEY: &str = "reader_settings";

#[derive(Clone)]
pub struct SettingsStore {
    storage: Arc<dyn KeyValueStore>,
}

impl SettingsStore {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self { storage }
    }

    /// Always returns a complete record: whatever was persisted, merged over the defaults.
    pub async fn load(&self) -> ReaderSettings {
        let defaults = ReaderSettings::default();
        let raw = match self.storage.get(SETTINGS_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return defaults,
            Err(e) => {
                warn!(error = %e, "Failed to load reader settings; using defaults.");
                return defaults;
            }
        };
        match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(stored) => defaults.merged_with(&stored),
            Err(e) => {
                warn!(error = %e, "Persisted reader settings are not valid JSON; using defaults.");
                defaults
            }
        }
    }

    /// Best effort: a failed write is logged and otherwise ignored.
    pub async fn save(&self, settings: &ReaderSettings) {
        let raw = match serde_json::to_string(settings) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Failed to serialize reader settings.");
                return;
            }
        };
        if let Err(e) = self.storage.set(SETTINGS_KEY, &raw).await {
            warn!(error = %e, "Failed to save reader settings.");
        }
    }
}
