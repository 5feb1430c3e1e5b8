use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::time::Duration;

/// Search backend used to run feed queries
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SearchBackend {
    /// The host's REST search API
    Jira,
    /// In-memory sample issues, for local runs
    Mock,
}

/// Configuration for the feed service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Address to bind the HTTP server to
    pub bind_address: String,

    /// Query defaults and execution limits
    pub query: QueryConfig,

    /// Settings persistence
    pub settings: SettingsConfig,

    /// Search backend connection
    pub search: SearchConfig,

    /// Caller identification
    pub auth: AuthConfig,

    /// Settings page templates
    pub templates: TemplateConfig,

    /// Known projects (key → display name) when not looked up in the host
    pub projects: HashMap<String, String>,
}

/// Query defaults and execution limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Query used when a project has no usable custom query
    pub default_query: String,

    /// Upper bound on parse + execute in milliseconds
    pub query_timeout_ms: u64,

    /// `Cache-Control: max-age` for feed responses
    pub cache_max_age_seconds: u64,
}

/// Settings persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    /// Namespace prefix for persisted keys
    pub key_prefix: String,

    /// JSON settings file; settings are kept in memory when unset
    pub store_path: Option<String>,
}

/// Search backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub backend: SearchBackend,

    /// Base URL of the host, e.g. `https://jira.example.com`
    pub base_url: String,

    /// Username for basic authentication
    pub username: Option<String>,

    /// API token or password for basic authentication
    pub api_token: Option<String>,

    /// HTTP connect timeout in milliseconds
    pub connect_timeout_ms: u64,
}

/// Caller identification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Header carrying the authenticated user, set by the fronting host
    pub user_header: String,
}

/// Settings page template configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TemplateConfig {
    /// Directory holding `wmpr-settings.html`; the built-in page is used when unset
    pub template_dir: Option<String>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8090".to_string(),
            query: QueryConfig::default(),
            settings: SettingsConfig::default(),
            search: SearchConfig::default(),
            auth: AuthConfig::default(),
            templates: TemplateConfig::default(),
            projects: HashMap::new(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_query: wmpr_core::DEFAULT_QUERY.to_string(),
            query_timeout_ms: 10_000,
            cache_max_age_seconds: 30,
        }
    }
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            key_prefix: wmpr_core::SETTINGS_KEY_PREFIX.to_string(),
            store_path: None,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            backend: SearchBackend::Jira,
            base_url: "http://localhost:8080".to_string(),
            username: None,
            api_token: None,
            connect_timeout_ms: 5000,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            user_header: "X-Remote-User".to_string(),
        }
    }
}

impl FeedConfig {
    /// Load configuration from file, environment variables, and defaults
    pub fn load() -> Result<Self> {
        let mut config = if let Ok(config_path) = env::var("CONFIG_PATH") {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        if let Ok(bind_addr) = env::var("WMPR_BIND_ADDRESS") {
            config.bind_address = bind_addr;
        }

        if let Ok(default_query) = env::var("WMPR_DEFAULT_JQL") {
            config.query.default_query = default_query;
        }

        if let Ok(query_timeout) = env::var("WMPR_QUERY_TIMEOUT_MS") {
            config.query.query_timeout_ms = query_timeout
                .parse()
                .context("WMPR_QUERY_TIMEOUT_MS must be a number of milliseconds")?;
        }

        if let Ok(max_age) = env::var("WMPR_CACHE_MAX_AGE_SECONDS") {
            config.query.cache_max_age_seconds = max_age
                .parse()
                .context("WMPR_CACHE_MAX_AGE_SECONDS must be a number of seconds")?;
        }

        if let Ok(prefix) = env::var("WMPR_SETTINGS_KEY_PREFIX") {
            config.settings.key_prefix = prefix;
        }

        if let Ok(store_path) = env::var("WMPR_SETTINGS_PATH") {
            config.settings.store_path = Some(store_path);
        }

        if let Ok(backend) = env::var("WMPR_SEARCH_BACKEND") {
            config.search.backend = match backend.to_lowercase().as_str() {
                "jira" => SearchBackend::Jira,
                "mock" => SearchBackend::Mock,
                _ => {
                    return Err(anyhow::anyhow!(
                        "Invalid search backend: {}. Valid options: jira, mock",
                        backend
                    ))
                }
            };
        }

        if let Ok(base_url) = env::var("WMPR_JIRA_BASE_URL") {
            config.search.base_url = base_url;
        }

        if let Ok(username) = env::var("WMPR_JIRA_USERNAME") {
            config.search.username = Some(username);
        }

        if let Ok(api_token) = env::var("WMPR_JIRA_API_TOKEN") {
            config.search.api_token = Some(api_token);
        }

        if let Ok(user_header) = env::var("WMPR_USER_HEADER") {
            config.auth.user_header = user_header;
        }

        if let Ok(template_dir) = env::var("WMPR_TEMPLATE_DIR") {
            config.templates.template_dir = Some(template_dir);
        }

        // KEY=Name pairs, comma separated
        if let Ok(projects) = env::var("WMPR_PROJECTS") {
            for pair in projects.split(',').filter(|p| !p.trim().is_empty()) {
                let (key, name) = pair
                    .split_once('=')
                    .map(|(k, n)| (k.trim(), n.trim()))
                    .unwrap_or((pair.trim(), pair.trim()));
                config.projects.insert(key.to_string(), name.to_string());
            }
        }

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a YAML file
    pub fn load_from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: Self = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.query.default_query.trim().is_empty() {
            return Err(anyhow::anyhow!("Default query cannot be empty"));
        }

        if self.query.query_timeout_ms == 0 {
            return Err(anyhow::anyhow!("Query timeout must be greater than 0"));
        }

        if self.settings.key_prefix.trim().is_empty() {
            return Err(anyhow::anyhow!("Settings key prefix cannot be empty"));
        }

        if self.auth.user_header.trim().is_empty() {
            return Err(anyhow::anyhow!("User header name cannot be empty"));
        }

        if self.search.backend == SearchBackend::Jira && self.search.base_url.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "A base URL is required for the jira search backend"
            ));
        }

        Ok(())
    }

    /// Get the query timeout as a Duration
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query.query_timeout_ms)
    }

    /// Get the search connect timeout as a Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.search.connect_timeout_ms)
    }

    /// Copy safe to log, with the API token masked
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.search.api_token.is_some() {
            config.search.api_token = Some("***".to_string());
        }
        config
    }

    /// Query defaults handed to the resolver and the settings page
    pub fn query_defaults(&self) -> wmpr_core::QueryDefaults {
        wmpr_core::QueryDefaults::new(
            self.query.default_query.clone(),
            self.settings.key_prefix.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ENV_VARS: &[&str] = &[
        "CONFIG_PATH",
        "WMPR_BIND_ADDRESS",
        "WMPR_QUERY_TIMEOUT_MS",
        "WMPR_SEARCH_BACKEND",
        "WMPR_PROJECTS",
        "WMPR_DEFAULT_JQL",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = FeedConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.query.default_query, "project = WMPR ORDER BY created DESC");
        assert_eq!(config.query.cache_max_age_seconds, 30);
        assert_eq!(config.query_defaults().keys.prefix(), "wmpr.settings");
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let mut config = FeedConfig::default();
        config.query.query_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_redacted_masks_token() {
        let mut config = FeedConfig::default();
        config.search.api_token = Some("secret".to_string());
        assert_eq!(config.redacted().search.api_token.as_deref(), Some("***"));
        assert!(!format!("{:?}", config.redacted()).contains("secret"));
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        env::set_var("WMPR_BIND_ADDRESS", "127.0.0.1:9999");
        env::set_var("WMPR_QUERY_TIMEOUT_MS", "2500");
        env::set_var("WMPR_SEARCH_BACKEND", "mock");
        env::set_var("WMPR_PROJECTS", "WMPR=Web Portal Requests, ABC");

        let config = FeedConfig::load().unwrap();
        clear_env();

        assert_eq!(config.bind_address, "127.0.0.1:9999");
        assert_eq!(config.query_timeout(), Duration::from_millis(2500));
        assert_eq!(config.search.backend, SearchBackend::Mock);
        assert_eq!(config.projects["WMPR"], "Web Portal Requests");
        assert_eq!(config.projects["ABC"], "ABC");
    }

    #[test]
    #[serial]
    fn test_invalid_backend_is_rejected() {
        clear_env();
        env::set_var("WMPR_SEARCH_BACKEND", "solr");
        let result = FeedConfig::load();
        clear_env();
        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn test_yaml_file_with_partial_sections() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wmpr.yaml");
        std::fs::write(
            &path,
            "bind_address: 127.0.0.1:7000\nquery:\n  default_query: project = HELP\nsearch:\n  backend: mock\n",
        )
        .unwrap();
        env::set_var("CONFIG_PATH", path.to_str().unwrap());

        let config = FeedConfig::load().unwrap();
        clear_env();

        assert_eq!(config.bind_address, "127.0.0.1:7000");
        assert_eq!(config.query.default_query, "project = HELP");
        assert_eq!(config.query.query_timeout_ms, 10_000);
        assert_eq!(config.search.backend, SearchBackend::Mock);
    }
}
