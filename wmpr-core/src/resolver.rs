//! Effective query resolution for a project
//!
//! Resolution never fails: if the project has no usable custom query, or its
//! settings cannot be read at all, the configured default query is used so
//! the feed keeps rendering.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::settings::{ProjectQuerySettings, QueryDefaults, SettingsStore};

/// Where a resolved query came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuerySource {
    /// The default query, chosen during resolution
    ConfiguredDefault,
    /// The project's own custom query
    ProjectCustom,
    /// The default query, substituted after the resolved query failed to parse
    FallbackDefault,
}

impl fmt::Display for QuerySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            QuerySource::ConfiguredDefault => "CONFIGURED_DEFAULT",
            QuerySource::ProjectCustom => "PROJECT_CUSTOM",
            QuerySource::FallbackDefault => "FALLBACK_DEFAULT",
        };
        f.write_str(label)
    }
}

/// The query chosen for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedQuery {
    pub text: String,
    pub source: QuerySource,
}

impl ResolvedQuery {
    pub fn new<S: Into<String>>(text: S, source: QuerySource) -> Self {
        Self {
            text: text.into(),
            source,
        }
    }
}

/// Chooses the query to run for a project
#[derive(Clone)]
pub struct QueryResolver {
    store: Arc<dyn SettingsStore>,
    defaults: Arc<QueryDefaults>,
}

impl QueryResolver {
    pub fn new(store: Arc<dyn SettingsStore>, defaults: Arc<QueryDefaults>) -> Self {
        Self { store, defaults }
    }

    pub fn defaults(&self) -> &QueryDefaults {
        &self.defaults
    }

    /// The default query, tagged with the given source
    pub fn default_query(&self, source: QuerySource) -> ResolvedQuery {
        ResolvedQuery::new(self.defaults.default_query.clone(), source)
    }

    /// Resolve the effective query for `project_key`.
    ///
    /// A missing or blank key selects the default without touching the
    /// store, since the default must work across all projects.
    pub async fn resolve(&self, project_key: Option<&str>) -> ResolvedQuery {
        let project_key = match project_key.map(str::trim).filter(|key| !key.is_empty()) {
            Some(key) => key,
            None => {
                debug!("No project key provided, using default JQL");
                return self.default_query(QuerySource::ConfiguredDefault);
            }
        };

        let settings =
            match ProjectQuerySettings::read(self.store.as_ref(), &self.defaults.keys, project_key)
                .await
            {
                Ok(settings) => settings,
                Err(e) => {
                    warn!(
                        "Error loading JQL settings for project {}, using default: {}",
                        project_key, e
                    );
                    return self.default_query(QuerySource::ConfiguredDefault);
                }
            };

        match settings.effective_custom_query() {
            Some(text) => {
                debug!("Found custom JQL for project {}: {}", project_key, text);
                ResolvedQuery::new(text, QuerySource::ProjectCustom)
            }
            None => {
                debug!("Using default JQL for project {}", project_key);
                self.default_query(QuerySource::ConfiguredDefault)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{MemorySettingsStore, SettingValue};

    fn resolver_with(store: MemorySettingsStore) -> QueryResolver {
        QueryResolver::new(Arc::new(store), Arc::new(QueryDefaults::default()))
    }

    #[tokio::test]
    async fn test_custom_flag_set_but_text_missing_uses_default() {
        let store = MemorySettingsStore::with_values([(
            "wmpr.settings.ABC.useCustom",
            SettingValue::flag(true),
        )]);
        let resolved = resolver_with(store).resolve(Some("ABC")).await;
        assert_eq!(resolved.source, QuerySource::ConfiguredDefault);
        assert_eq!(resolved.text, crate::DEFAULT_QUERY);
    }

    #[tokio::test]
    async fn test_custom_text_with_flag_off_uses_default() {
        let store = MemorySettingsStore::with_values([
            ("wmpr.settings.ABC.useCustom", SettingValue::flag(false)),
            (
                "wmpr.settings.ABC.jql",
                SettingValue::Text("project = ABC".to_string()),
            ),
        ]);
        let resolved = resolver_with(store).resolve(Some("ABC")).await;
        assert_eq!(resolved.source, QuerySource::ConfiguredDefault);
    }

    #[tokio::test]
    async fn test_blank_project_key_is_treated_as_absent() {
        let store = MemorySettingsStore::new();
        store.set_failing(true);
        let resolved = resolver_with(store).resolve(Some("   ")).await;
        assert_eq!(resolved.source, QuerySource::ConfiguredDefault);
    }

    #[test]
    fn test_source_labels() {
        assert_eq!(QuerySource::FallbackDefault.to_string(), "FALLBACK_DEFAULT");
        assert_eq!(
            serde_json::to_value(QuerySource::ProjectCustom).unwrap(),
            "PROJECT_CUSTOM"
        );
    }
}
