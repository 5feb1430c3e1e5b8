//! Per-project query settings and the key/value store they live in
//!
//! Settings are kept as two independent keys per project under a shared
//! namespace prefix:
//! - `<prefix>.<projectKey>.jql` holds the query text
//! - `<prefix>.<projectKey>.useCustom` holds the custom-query flag
//!
//! Older writers stored the flag as a native boolean while current writers
//! store the strings `"true"`/`"false"`, so values are read as a
//! [`SettingValue`] and decoded tolerantly here rather than in the store.

pub mod file_store;

pub use file_store::FileSettingsStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, trace};

use crate::error::{WmprError, WmprResult};

/// A raw value held by the settings store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Text(String),
}

impl SettingValue {
    /// Decode a flag stored either as a boolean or as the literal string "true"
    pub fn as_flag(&self) -> bool {
        match self {
            SettingValue::Bool(value) => *value,
            SettingValue::Text(value) => value == "true",
        }
    }

    /// String content, if this value is string-typed
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SettingValue::Text(value) => Some(value),
            SettingValue::Bool(_) => None,
        }
    }

    /// Encode a flag the way the settings page persists it
    pub fn flag(value: bool) -> Self {
        SettingValue::Text(value.to_string())
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Bool(value) => write!(f, "{}", value),
            SettingValue::Text(value) => write!(f, "{}", value),
        }
    }
}

/// Builds the persisted keys for a project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsKeys {
    prefix: String,
}

impl SettingsKeys {
    pub fn new<S: Into<String>>(prefix: S) -> Self {
        let prefix = prefix.into();
        let prefix = prefix.trim_end_matches('.').to_string();
        Self { prefix }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Key holding the query text for a project
    pub fn query_key(&self, project_key: &str) -> String {
        format!("{}.{}.jql", self.prefix, project_key)
    }

    /// Key holding the custom-query flag for a project
    pub fn use_custom_key(&self, project_key: &str) -> String {
        format!("{}.{}.useCustom", self.prefix, project_key)
    }
}

impl Default for SettingsKeys {
    fn default() -> Self {
        Self::new(crate::SETTINGS_KEY_PREFIX)
    }
}

/// Process-wide query defaults, fixed at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryDefaults {
    /// Query used when no valid project query is configured
    pub default_query: String,
    /// Key layout for persisted settings
    pub keys: SettingsKeys,
}

impl QueryDefaults {
    pub fn new<Q: Into<String>, P: Into<String>>(default_query: Q, key_prefix: P) -> Self {
        Self {
            default_query: default_query.into(),
            keys: SettingsKeys::new(key_prefix),
        }
    }
}

impl Default for QueryDefaults {
    fn default() -> Self {
        Self::new(crate::DEFAULT_QUERY, crate::SETTINGS_KEY_PREFIX)
    }
}

/// Opaque key/value persistence for plugin settings.
///
/// Implementations make no promise about value types beyond returning what
/// was put; decoding is the caller's concern. There are no transactions:
/// concurrent writers to the same key race and the last one wins.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Read a value, `None` when the key was never written
    async fn get(&self, key: &str) -> WmprResult<Option<SettingValue>>;

    /// Write a value, replacing any previous one
    async fn put(&self, key: &str, value: SettingValue) -> WmprResult<()>;
}

/// The query settings of one project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectQuerySettings {
    pub project_key: String,
    pub use_custom_query: bool,
    /// Stored query text; `None` when nothing (or a non-string) was stored
    pub custom_query_text: Option<String>,
}

impl ProjectQuerySettings {
    /// Read a project's settings, decoding the flag tolerantly
    pub async fn read(
        store: &dyn SettingsStore,
        keys: &SettingsKeys,
        project_key: &str,
    ) -> WmprResult<Self> {
        let custom_query_text = store
            .get(&keys.query_key(project_key))
            .await?
            .and_then(|value| value.as_text().map(str::to_string));

        let use_custom_query = store
            .get(&keys.use_custom_key(project_key))
            .await?
            .map(|value| value.as_flag())
            .unwrap_or(false);

        trace!(
            "Read settings for project {}: use_custom={}, has_text={}",
            project_key,
            use_custom_query,
            custom_query_text.is_some()
        );

        Ok(Self {
            project_key: project_key.to_string(),
            use_custom_query,
            custom_query_text,
        })
    }

    /// Overwrite both settings keys; the flag is always written as a string
    pub async fn write(&self, store: &dyn SettingsStore, keys: &SettingsKeys) -> WmprResult<()> {
        // Text before flag: a failed text write must not enable a stale query
        if let Some(ref text) = self.custom_query_text {
            store
                .put(
                    &keys.query_key(&self.project_key),
                    SettingValue::Text(text.clone()),
                )
                .await?;
        }

        store
            .put(
                &keys.use_custom_key(&self.project_key),
                SettingValue::flag(self.use_custom_query),
            )
            .await?;

        debug!(
            "Saved settings for project {}: use_custom={}",
            self.project_key, self.use_custom_query
        );
        Ok(())
    }

    /// The custom query, if enabled and non-blank
    pub fn effective_custom_query(&self) -> Option<&str> {
        if !self.use_custom_query {
            return None;
        }
        self.custom_query_text
            .as_deref()
            .filter(|text| !text.trim().is_empty())
    }
}

/// In-memory settings store
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    values: RwLock<HashMap<String, SettingValue>>,
    fail: AtomicBool,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with values
    pub fn with_values<I, K>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, SettingValue)>,
        K: Into<String>,
    {
        let values = values.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Self {
            values: RwLock::new(values),
            fail: AtomicBool::new(false),
        }
    }

    /// Make every subsequent operation fail (for exercising error paths)
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn check_available(&self) -> WmprResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(WmprError::settings_store("settings store unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn get(&self, key: &str) -> WmprResult<Option<SettingValue>> {
        self.check_available()?;
        Ok(self.values.read().get(key).cloned())
    }

    async fn put(&self, key: &str, value: SettingValue) -> WmprResult<()> {
        self.check_available()?;
        self.values.write().insert(key.to_string(), value);
        Ok(())
    }
}
