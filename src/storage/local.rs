//! Local filesystem storage implementation.
//!
//! Keeps the whole state in one JSON file. Saves go through a sibling
//! temporary file that is synced and renamed over the target, so a crash
//! mid-write never leaves a truncated state behind.
//!
//! ```text
//! {dir}/
//! ├── events_data.json       # Known events
//! └── events_data.json.tmp   # Present only while a save is in flight
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::KnownEvents;
use crate::storage::{EventStore, StateDataRef, StateFile, StoreInfo};

/// JSON file storage backend.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    path: PathBuf,
}

impl LocalStorage {
    /// Create a LocalStorage backed by the given state file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the state file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the temporary file used while saving.
    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("state"));
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, bytes: &[u8]) -> Result<()> {
        self.ensure_dir().await?;

        let tmp = self.tmp_path();
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(AppError::Io(e));
        }
        Ok(())
    }

    /// Write JSON data.
    async fn write_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(&bytes).await
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(&self) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Read and decode the state file in whichever layout it uses.
    async fn read_state(&self) -> Result<Option<StateFile>> {
        let bytes = self
            .read_bytes()
            .await
            .map_err(|e| AppError::store_corruption(self.path.display(), e))?;

        match bytes {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| AppError::store_corruption(self.path.display(), e)),
            None => Ok(None),
        }
    }

    /// Describe the current state file.
    pub async fn info(&self) -> Result<StoreInfo> {
        let location = self.path.display().to_string();
        let Some(state) = self.read_state().await? else {
            return Ok(StoreInfo {
                location,
                exists: false,
                count: 0,
                updated_at: None,
                legacy: false,
            });
        };

        let updated_at = match &state {
            StateFile::Current(data) => Some(data.updated_at),
            StateFile::Legacy(_) => None,
        };
        let legacy = state.is_legacy();
        Ok(StoreInfo {
            location,
            exists: true,
            count: state.into_events().len(),
            updated_at,
            legacy,
        })
    }
}

#[async_trait]
impl EventStore for LocalStorage {
    async fn load(&self) -> Result<KnownEvents> {
        match self.read_state().await? {
            Some(state) => {
                if state.is_legacy() {
                    log::info!(
                        "{} uses the list layout; it will be rewritten on next save",
                        self.path.display()
                    );
                }
                let events = state.into_events();
                log::debug!("Loaded {} known events from {}", events.len(), self.path.display());
                Ok(events)
            }
            None => {
                log::info!("No state file at {}; starting fresh", self.path.display());
                Ok(KnownEvents::new())
            }
        }
    }

    async fn save(&self, events: &KnownEvents) -> Result<()> {
        self.write_json(&StateDataRef::new(events))
            .await
            .map_err(|e| AppError::store_persist(self.path.display(), e))?;
        log::info!("Saved {} events to {}", events.len(), self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventRecord;
    use tempfile::TempDir;

    fn sample_events() -> KnownEvents {
        [
            EventRecord::new("Satsang", "2024-01-01", Some("Evening satsang"), None),
            EventRecord::new("Retreat", "2024-02-01", None, Some("https://omswami.org/events")),
        ]
        .into_iter()
        .map(|r| (r.identity.clone(), r))
        .collect()
    }

    #[tokio::test]
    async fn test_load_missing_is_empty() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path().join("events_data.json"));

        let events = storage.load().await.unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path().join("state/events_data.json"));
        let events = sample_events();

        storage.save(&events).await.unwrap();
        let loaded = storage.load().await.unwrap();

        assert_eq!(loaded, events);
        assert!(!storage.tmp_path().exists());
    }

    #[tokio::test]
    async fn test_save_replaces_previous_state() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path().join("events_data.json"));

        storage.save(&sample_events()).await.unwrap();
        storage.save(&KnownEvents::new()).await.unwrap();

        assert!(storage.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reported() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("events_data.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let storage = LocalStorage::new(&path);
        let err = storage.load().await.unwrap_err();
        assert!(matches!(err, AppError::StoreCorruption { .. }));
    }

    #[tokio::test]
    async fn test_save_failure_is_persist_error() {
        let tmp = TempDir::new().unwrap();
        // the target's parent is a regular file, so the directory cannot be created
        let blocker = tmp.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();
        let storage = LocalStorage::new(blocker.join("events_data.json"));

        let err = storage.save(&sample_events()).await.unwrap_err();
        assert!(matches!(err, AppError::StorePersist { .. }));
    }

    #[tokio::test]
    async fn test_legacy_file_loads() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("events_data.json");
        std::fs::write(
            &path,
            r#"[{"id": "abc", "title": "Satsang", "date": "2024-01-01",
                 "description": "No description available",
                 "url": "https://omswami.org/events",
                 "discovered_at": "2024-01-01T08:30:00.123456"}]"#,
        )
        .unwrap();

        let storage = LocalStorage::new(&path);
        let info = storage.info().await.unwrap();
        assert!(info.exists && info.legacy);
        assert_eq!(info.count, 1);

        let events = storage.load().await.unwrap();
        storage.save(&events).await.unwrap();

        let info = storage.info().await.unwrap();
        assert!(!info.legacy);
        assert!(info.updated_at.is_some());
        assert_eq!(storage.load().await.unwrap(), events);
    }

    #[tokio::test]
    async fn test_info_without_state() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path().join("events_data.json"));

        let info = storage.info().await.unwrap();
        assert!(!info.exists);
        assert_eq!(info.count, 0);
    }
}
