//! Store configuration.

use std::time::Duration;

use serde::Deserialize;

/// Default prefix for persistence keys.
pub const DEFAULT_STORAGE_PREFIX: &str = "ng_store";

/// Default quiet window before a persistence write.
pub const DEFAULT_DEBOUNCE_MS: u64 = 100;

/// Settings shared by every store resolved from one container.
///
/// Missing keys fall back to their defaults, so `{}` is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Persistence keys are `<storage_prefix>_<storage_key>`.
    pub storage_prefix: String,

    /// Quiet window, in milliseconds, before the trailing write.
    pub debounce_ms: u64,
}

impl StoreConfig {
    /// Parse a config from a JSON document.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// The full persistence key for a store-specific key.
    pub fn slot_key(&self, storage_key: &str) -> String {
        format!("{}_{}", self.storage_prefix, storage_key)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            storage_prefix: DEFAULT_STORAGE_PREFIX.to_owned(),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}
