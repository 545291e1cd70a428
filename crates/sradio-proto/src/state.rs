//! Persisted component state, stored as one JSON object keyed by component.
//!
//! ```json
//! { "radio": { "last_channel_index": 2 } }
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Component key of the radio state.
pub const RADIO: &str = "radio";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadioState {
    /// 0-based index of the channel last played, `-1` for none.
    #[serde(default = "no_channel")]
    pub last_channel_index: i64,
}

fn no_channel() -> i64 {
    -1
}

impl Default for RadioState {
    fn default() -> Self {
        Self {
            last_channel_index: no_channel(),
        }
    }
}

impl RadioState {
    pub fn last_channel(&self) -> Option<usize> {
        usize::try_from(self.last_channel_index).ok()
    }

    pub fn with_channel(idx: Option<usize>) -> Self {
        Self {
            last_channel_index: idx.map(|i| i as i64).unwrap_or(-1),
        }
    }
}

pub struct StateStore {
    components: Map<String, Value>,
    state_file: PathBuf,
}

impl StateStore {
    /// Load the snapshot.  A missing or unreadable file yields an empty store.
    pub fn load(state_file: PathBuf) -> Self {
        let components = Self::load_persistent(&state_file);
        Self {
            components,
            state_file,
        }
    }

    pub fn path(&self) -> &Path {
        &self.state_file
    }

    /// State of one component, or its default when absent or malformed.
    pub fn get<T: DeserializeOwned + Default>(&self, component: &str) -> T {
        match self.components.get(component) {
            Some(value) => serde_json::from_value(value.clone()).unwrap_or_else(|e| {
                warn!("state: ignoring malformed '{}' entry: {}", component, e);
                T::default()
            }),
            None => T::default(),
        }
    }

    pub fn set<T: Serialize>(&mut self, component: &str, value: &T) -> anyhow::Result<()> {
        self.components
            .insert(component.to_string(), serde_json::to_value(value)?);
        Ok(())
    }

    pub async fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.state_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(&self.components)?;
        tokio::fs::write(&self.state_file, json).await?;
        debug!("state: saved to {:?}", self.state_file);
        Ok(())
    }

    fn load_persistent(state_file: &Path) -> Map<String, Value> {
        if let Ok(content) = std::fs::read_to_string(state_file) {
            match serde_json::from_str::<Map<String, Value>>(&content) {
                Ok(map) => return map,
                Err(e) => warn!("state: {:?} unreadable, using defaults: {}", state_file, e),
            }
        }
        Map::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radio_state_conversion() {
        assert_eq!(RadioState::default().last_channel(), None);
        assert_eq!(RadioState::with_channel(Some(4)).last_channel_index, 4);
        assert_eq!(RadioState::with_channel(None).last_channel_index, -1);
        assert_eq!(RadioState::with_channel(Some(2)).last_channel(), Some(2));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::load(dir.path().join("state.json"));
        let radio: RadioState = store.get(RADIO);
        assert_eq!(radio, RadioState::default());
    }

    #[test]
    fn test_malformed_entry_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, r#"{"radio": {"last_channel_index": "two"}}"#).unwrap();
        let store = StateStore::load(path);
        let radio: RadioState = store.get(RADIO);
        assert_eq!(radio.last_channel(), None);
    }
}
