//! Settings store persisted as a single JSON document
//!
//! The document is a flat object of key → value where values are JSON
//! booleans or strings, so flags written by either encoding survive a
//! restart unchanged.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{SettingValue, SettingsStore};
use crate::error::{WmprError, WmprResult};

pub struct FileSettingsStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, SettingValue>>,
}

impl FileSettingsStore {
    /// Open the store, starting empty when the file does not exist yet
    pub async fn open<P: AsRef<Path>>(path: P) -> WmprResult<Self> {
        let path = path.as_ref().to_path_buf();

        let values = match tokio::fs::read_to_string(&path).await {
            Ok(contents) if contents.trim().is_empty() => BTreeMap::new(),
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                WmprError::settings_store(format!(
                    "Failed to parse settings file {}: {}",
                    path.display(),
                    e
                ))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        info!(
            "Opened settings file {} with {} entries",
            path.display(),
            values.len()
        );

        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, values: &BTreeMap<String, SettingValue>) -> WmprResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let contents = serde_json::to_string_pretty(values)?;
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, contents).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;

        debug!("Persisted {} settings to {}", values.len(), self.path.display());
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for FileSettingsStore {
    async fn get(&self, key: &str) -> WmprResult<Option<SettingValue>> {
        let values = self.values.lock().await;
        Ok(values.get(key).cloned())
    }

    async fn put(&self, key: &str, value: SettingValue) -> WmprResult<()> {
        let mut values = self.values.lock().await;
        let mut staged = values.clone();
        staged.insert(key.to_string(), value);
        self.persist(&staged).await?;
        *values = staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSettingsStore::open(dir.path().join("settings.json"))
            .await
            .unwrap();
        assert_eq!(store.get("wmpr.settings.ABC.jql").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let store = FileSettingsStore::open(&path).await.unwrap();
        store
            .put("wmpr.settings.ABC.useCustom", SettingValue::flag(true))
            .await
            .unwrap();
        store
            .put(
                "wmpr.settings.ABC.jql",
                SettingValue::Text("project = ABC".to_string()),
            )
            .await
            .unwrap();
        drop(store);

        let reopened = FileSettingsStore::open(&path).await.unwrap();
        assert_eq!(
            reopened.get("wmpr.settings.ABC.useCustom").await.unwrap(),
            Some(SettingValue::Text("true".to_string()))
        );
        assert_eq!(
            reopened.get("wmpr.settings.ABC.jql").await.unwrap(),
            Some(SettingValue::Text("project = ABC".to_string()))
        );
    }

    #[tokio::test]
    async fn test_native_boolean_in_file_is_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"wmpr.settings.XYZ.useCustom": true}"#).unwrap();

        let store = FileSettingsStore::open(&path).await.unwrap();
        assert_eq!(
            store.get("wmpr.settings.XYZ.useCustom").await.unwrap(),
            Some(SettingValue::Bool(true))
        );
    }

    #[tokio::test]
    async fn test_failed_write_leaves_previous_value() {
        let dir = tempfile::tempdir().unwrap();
        let parent = dir.path().join("state");
        let store = FileSettingsStore::open(parent.join("settings.json"))
            .await
            .unwrap();
        store
            .put(
                "wmpr.settings.ABC.jql",
                SettingValue::Text("project = ABC".to_string()),
            )
            .await
            .unwrap();

        std::fs::remove_dir_all(&parent).unwrap();
        std::fs::write(&parent, "not a directory").unwrap();

        let result = store
            .put(
                "wmpr.settings.ABC.jql",
                SettingValue::Text("project = XYZ".to_string()),
            )
            .await;
        assert!(result.is_err());
        assert_eq!(
            store.get("wmpr.settings.ABC.jql").await.unwrap(),
            Some(SettingValue::Text("project = ABC".to_string()))
        );
    }

    #[tokio::test]
    async fn test_corrupt_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not json").unwrap();

        let err = FileSettingsStore::open(&path).await.err().unwrap();
        assert_eq!(err.category(), "settings_store");
    }
}
