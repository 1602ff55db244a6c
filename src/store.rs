use std::fs;
use std::path::PathBuf;

use log::{debug, warn};
use serde::{de::DeserializeOwned, Serialize};

/// Storage key for [`crate::GenerationSettings`].
pub const SETTINGS_KEY: &str = "generation-settings";

/// Storage key for [`crate::GenerationUiState`].
pub const UI_STATE_KEY: &str = "generation-ui-state";

/// Durable key-value persistence for session state, one JSON file per key.
///
/// Writes are best-effort: a failed save is logged and swallowed, never
/// surfaced to the caller. Single-writer by assumption; concurrent sessions
/// race and the last write wins.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: Option<PathBuf>,
}

impl SessionStore {
    /// Persist under the given directory (created on first save).
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    /// A store that never persists. Useful for tests and one-off sessions.
    pub fn in_memory() -> Self {
        Self { dir: None }
    }

    fn path_for(&self, key: &str) -> Option<PathBuf> {
        self.dir.as_ref().map(|d| d.join(format!("{key}.json")))
    }

    /// Write `value` under `key`. Failures are logged and swallowed.
    pub fn save<T: Serialize>(&self, key: &str, value: &T) {
        let Some(path) = self.path_for(key) else {
            return;
        };
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!("failed to create session store dir {}: {}", parent.display(), e);
                return;
            }
        }
        let json = match serde_json::to_string_pretty(value) {
            Ok(j) => j,
            Err(e) => {
                warn!("failed to serialize session key {key}: {e}");
                return;
            }
        };
        if let Err(e) = fs::write(&path, json) {
            warn!("failed to persist session key {key}: {e}");
        }
    }

    /// Read the value under `key`. Returns `None` when absent or corrupt.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let path = self.path_for(key)?;
        let raw = match fs::read_to_string(&path) {
            Ok(r) => r,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("failed to read session key {key}: {e}");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                // A corrupt file falls back to defaults rather than failing
                // the session load.
                warn!("discarding corrupt session key {key}: {e}");
                None
            }
        }
    }

    /// Remove the value under `key`, if any.
    pub fn clear(&self, key: &str) {
        if let Some(path) = self.path_for(key) {
            match fs::remove_file(&path) {
                Ok(()) => debug!("cleared session key {key}"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("failed to clear session key {key}: {e}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::GenerationSettings;
    use crate::state::GenerationUiState;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp = tempdir().unwrap();
        let store = SessionStore::new(temp.path());

        let mut settings = GenerationSettings::default();
        settings.prompt = "a lighthouse at dusk".to_string();
        store.save(SETTINGS_KEY, &settings);

        let loaded: GenerationSettings = store.load(SETTINGS_KEY).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_load_missing_returns_none() {
        let temp = tempdir().unwrap();
        let store = SessionStore::new(temp.path());
        let loaded: Option<GenerationUiState> = store.load(UI_STATE_KEY);
        assert!(loaded.is_none());
    }

    #[test]
    fn test_corrupt_file_returns_none() {
        let temp = tempdir().unwrap();
        let store = SessionStore::new(temp.path());
        fs::write(temp.path().join(format!("{UI_STATE_KEY}.json")), "{not json").unwrap();
        let loaded: Option<GenerationUiState> = store.load(UI_STATE_KEY);
        assert!(loaded.is_none());
    }

    #[test]
    fn test_in_memory_never_persists() {
        let store = SessionStore::in_memory();
        store.save(SETTINGS_KEY, &GenerationSettings::default());
        let loaded: Option<GenerationSettings> = store.load(SETTINGS_KEY);
        assert!(loaded.is_none());
    }

    #[test]
    fn test_last_write_wins() {
        let temp = tempdir().unwrap();
        let store = SessionStore::new(temp.path());

        let mut first = GenerationUiState::default();
        first.show_magic_text = true;
        store.save(UI_STATE_KEY, &first);

        let second = GenerationUiState::default();
        store.save(UI_STATE_KEY, &second);

        let loaded: GenerationUiState = store.load(UI_STATE_KEY).unwrap();
        assert!(!loaded.show_magic_text);
    }

    #[test]
    fn test_clear_removes_key() {
        let temp = tempdir().unwrap();
        let store = SessionStore::new(temp.path());
        store.save(SETTINGS_KEY, &GenerationSettings::default());
        store.clear(SETTINGS_KEY);
        let loaded: Option<GenerationSettings> = store.load(SETTINGS_KEY);
        assert!(loaded.is_none());
    }
}
