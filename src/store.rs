use crate::MyError;
use crate::types::Config;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Everything the store file holds. Reads and writes are always whole-document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct StoredConfigs {
    #[serde(default)]
    pub(crate) configs: Vec<Config>,
    #[serde(default)]
    pub(crate) last_applied_index: u32,
}

impl StoredConfigs {
    pub(crate) fn position(&self, name: &str) -> Option<usize> {
        self.configs.iter().position(|c| c.name == name)
    }

    pub(crate) fn last_applied(&self) -> usize {
        self.last_applied_index as usize
    }

    pub(crate) fn set_last_applied(&mut self, index: usize) {
        self.last_applied_index = u32::try_from(index).unwrap_or(u32::MAX);
    }

    pub(crate) fn rename(&mut self, old: &str, new: &str) -> Result<(), Box<dyn Error>> {
        let new = new.trim();
        if new.is_empty() {
            return Err(MyError("Configuration name must not be empty.".to_string()).into());
        }
        if old != new && self.position(new).is_some() {
            return Err(MyError(format!("A configuration named {} already exists.", new)).into());
        }
        let index = self
            .position(old)
            .ok_or_else(|| MyError(format!("No saved configuration named {}.", old)))?;
        self.configs[index].name = new.to_string();
        Ok(())
    }

    /// Deletes the first config called `name`, keeping `last_applied_index`
    /// pointed at the same config where possible.
    pub(crate) fn remove(&mut self, name: &str) -> Result<Config, Box<dyn Error>> {
        let index = self
            .position(name)
            .ok_or_else(|| MyError(format!("No saved configuration named {}.", name)))?;
        let removed = self.configs.remove(index);
        let last = self.last_applied();
        if index < last {
            self.set_last_applied(last - 1);
        } else if index == last {
            self.set_last_applied(0);
        }
        Ok(removed)
    }
}

pub(crate) struct ConfigStore {
    path: PathBuf,
    last_seen: Option<SystemTime>,
    changes: broadcast::Sender<()>,
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

impl ConfigStore {
    pub(crate) fn new(path: PathBuf) -> Self {
        let (changes, _) = broadcast::channel(8);
        ConfigStore {
            path,
            last_seen: None,
            changes,
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the store. A missing file is an empty store. Hashes are recomputed.
    pub(crate) fn load(&mut self) -> Result<StoredConfigs, Box<dyn Error>> {
        self.last_seen = modified(&self.path);
        if !self.path.exists() {
            debug!(path = %self.path.display(), "config store does not exist yet");
            return Ok(StoredConfigs::default());
        }

        let contents = std::fs::read_to_string(&self.path)?;
        let mut stored: StoredConfigs = serde_json::from_str(&contents).map_err(|e| {
            MyError(format!(
                "Failed to parse config store {}: {}",
                self.path.display(),
                e
            ))
        })?;
        for config in stored.configs.iter_mut() {
            config.refresh_hash();
        }
        debug!(
            path = %self.path.display(),
            configs = stored.configs.len(),
            "loaded config store"
        );
        Ok(stored)
    }

    /// Replaces the whole store through a temp file and a rename.
    pub(crate) fn save(&mut self, stored: &StoredConfigs) -> Result<(), Box<dyn Error>> {
        let mut stored = stored.clone();
        for config in stored.configs.iter_mut() {
            config.refresh_hash();
        }
        let json = serde_json::to_string_pretty(&stored)
            .map_err(|e| MyError(format!("Failed to serialize config store: {}", e)))?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;

        self.last_seen = modified(&self.path);
        info!(
            path = %self.path.display(),
            configs = stored.configs.len(),
            "saved config store"
        );
        Ok(())
    }

    /// Checks whether something else rewrote the file since the last load or
    /// save, and tells subscribers if so.
    pub(crate) fn poll_external_change(&mut self) -> bool {
        let now = modified(&self.path);
        if now == self.last_seen {
            return false;
        }
        self.last_seen = now;
        debug!(path = %self.path.display(), "config store changed on disk");
        let _ = self.changes.send(());
        true
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<()> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::DisplayRecord;
    use crate::snapshot::DisplayState;
    use crate::snapshot::fixtures::desk;
    use std::time::Duration;

    fn desk_config(name: &str) -> Config {
        DisplayState::from_current(desk(1, "DP-1", "HDMI-1")).to_config(name)
    }

    #[test]
    fn missing_file_is_an_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ConfigStore::new(dir.path().join("configs.json"));
        let stored = store.load().unwrap();
        assert!(stored.configs.is_empty());
        assert_eq!(stored.last_applied_index, 0);
    }

    #[test]
    fn save_then_load_keeps_configs_and_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("configs.json");
        let mut store = ConfigStore::new(path.clone());

        let mut stored = StoredConfigs::default();
        stored.configs.push(desk_config("Desk"));
        stored.configs.push(desk_config("Couch"));
        stored.set_last_applied(1);
        store.save(&stored).unwrap();

        assert!(path.exists());
        assert!(!dir.path().join("nested").join("configs.json.tmp").exists());
        let loaded = ConfigStore::new(path).load().unwrap();
        assert_eq!(loaded, stored);
        assert_eq!(loaded.position("Couch"), Some(1));
    }

    #[test]
    fn stale_hashes_are_recomputed_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("configs.json");
        let expected = desk_config("Desk");
        let mut stale = expected.clone();
        stale.hash = 12345;
        let json = serde_json::json!({ "configs": [stale], "last_applied_index": 0 });
        std::fs::write(&path, json.to_string()).unwrap();

        let loaded = ConfigStore::new(path).load().unwrap();
        assert_eq!(loaded.configs[0].hash, expected.hash);
    }

    #[test]
    fn legacy_display_records_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("configs.json");
        std::fs::write(
            &path,
            r#"{"configs":[["Old",0,[[0,0,1.0,0,true,[["DP-1","1920x1080@60",{}]]]],{},[["DP-1","GSM","LG","0001"]]]]}"#,
        )
        .unwrap();

        let loaded = ConfigStore::new(path).load().unwrap();
        assert_eq!(loaded.last_applied_index, 0);
        assert!(matches!(
            loaded.configs[0].physical_displays[0],
            DisplayRecord::Legacy { .. }
        ));
        assert_ne!(loaded.configs[0].hash, 0);
    }

    #[test]
    fn malformed_store_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("configs.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = ConfigStore::new(path).load().unwrap_err();
        assert!(err.to_string().contains("configs.json"));
    }

    #[test]
    fn rename_rejects_clashes_and_unknown_names() {
        let mut stored = StoredConfigs::default();
        stored.configs.push(desk_config("Desk"));
        stored.configs.push(desk_config("Couch"));

        stored.rename("Desk", "Office").unwrap();
        assert_eq!(stored.configs[0].name, "Office");
        assert!(stored.rename("Office", "Couch").is_err());
        assert!(stored.rename("Missing", "Other").is_err());
        assert!(stored.rename("Office", "  ").is_err());
    }

    #[test]
    fn remove_keeps_last_applied_on_the_same_config() {
        let mut stored = StoredConfigs::default();
        for name in ["A", "B", "C"] {
            stored.configs.push(desk_config(name));
        }
        stored.set_last_applied(2);

        assert_eq!(stored.remove("A").unwrap().name, "A");
        assert_eq!(stored.last_applied(), 1);
        assert_eq!(stored.configs[stored.last_applied()].name, "C");

        stored.remove("C").unwrap();
        assert_eq!(stored.last_applied(), 0);
        assert!(stored.remove("C").is_err());
    }

    #[test]
    fn external_writes_are_detected_but_own_saves_are_not() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("configs.json");
        let mut store = ConfigStore::new(path.clone());
        let mut changes = store.subscribe();

        store.save(&StoredConfigs::default()).unwrap();
        assert!(!store.poll_external_change());

        let mut stored = StoredConfigs::default();
        stored.configs.push(desk_config("Desk"));
        std::fs::write(&path, serde_json::to_string(&stored).unwrap()).unwrap();
        let file = std::fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(60))
            .unwrap();

        assert!(store.poll_external_change());
        assert!(changes.try_recv().is_ok());
        assert!(!store.poll_external_change());
    }
}
