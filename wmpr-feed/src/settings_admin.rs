//! Per-project query settings form

use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};
use wmpr_core::{
    error::{WmprError, WmprResult},
    query::{ProjectDirectory, UserId},
    settings::{ProjectQuerySettings, QueryDefaults, SettingsStore},
};

use crate::metrics::FeedMetricsCollector;
use crate::render::SettingsPageRenderer;

/// Form option selecting the project's custom query
pub const CUSTOM_OPTION: &str = "custom";

/// What the settings page shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormModel {
    pub project_key: String,
    pub project_name: String,
    /// Stored query text, or the default when none is stored
    pub current_query: String,
    pub default_query: String,
    pub use_custom: bool,
    pub show_success: bool,
}

impl FormModel {
    /// Text for the custom query box; empty unless custom mode is selected
    pub fn custom_text(&self) -> &str {
        if self.use_custom {
            &self.current_query
        } else {
            ""
        }
    }

    /// The project's configuration page
    pub fn cancel_url(&self) -> String {
        format!("/plugins/servlet/project-config/{}", self.project_key)
    }
}

/// Submitted settings form
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsForm {
    pub project_key: Option<String>,
    pub jql_option: Option<String>,
    pub custom_jql: Option<String>,
}

pub struct SettingsAdmin {
    store: Arc<dyn SettingsStore>,
    directory: Arc<dyn ProjectDirectory>,
    defaults: Arc<QueryDefaults>,
    renderer: SettingsPageRenderer,
    metrics: Arc<FeedMetricsCollector>,
}

impl SettingsAdmin {
    pub fn new(
        store: Arc<dyn SettingsStore>,
        directory: Arc<dyn ProjectDirectory>,
        defaults: Arc<QueryDefaults>,
        renderer: SettingsPageRenderer,
        metrics: Arc<FeedMetricsCollector>,
    ) -> Self {
        Self {
            store,
            directory,
            defaults,
            renderer,
            metrics,
        }
    }

    /// Build the form for a project.
    ///
    /// Fails with `Validation` without a project key, `Unauthorized` without
    /// a user and `NotFound` for an unknown project. Settings that cannot be
    /// read are shown as the defaults.
    pub async fn load_form(
        &self,
        project_key: Option<&str>,
        user: Option<&UserId>,
        saved: bool,
    ) -> WmprResult<FormModel> {
        let project_key = required_project_key(project_key)?;
        let user = user.ok_or(WmprError::Unauthorized)?;

        let project_name = self
            .directory
            .project_name(project_key)
            .await?
            .ok_or_else(|| WmprError::not_found(format!("Project {} not found", project_key)))?;

        let model = match ProjectQuerySettings::read(
            self.store.as_ref(),
            &self.defaults.keys,
            project_key,
        )
        .await
        {
            Ok(settings) => FormModel {
                project_key: project_key.to_string(),
                project_name,
                current_query: settings
                    .custom_query_text
                    .unwrap_or_else(|| self.defaults.default_query.clone()),
                default_query: self.defaults.default_query.clone(),
                use_custom: settings.use_custom_query,
                show_success: saved,
            },
            Err(e) => {
                warn!(
                    "Cannot read settings for project {}, showing defaults: {}",
                    project_key, e
                );
                FormModel {
                    project_key: project_key.to_string(),
                    project_name,
                    current_query: self.defaults.default_query.clone(),
                    default_query: self.defaults.default_query.clone(),
                    use_custom: false,
                    show_success: false,
                }
            }
        };

        info!("Settings page for {} requested by {}", project_key, user);
        Ok(model)
    }

    pub fn render(&self, model: &FormModel) -> WmprResult<String> {
        self.renderer.render(model)
    }

    /// Persist a submitted form and return the location to redirect to.
    ///
    /// Choosing the default option overwrites any stored custom text with the
    /// default query.
    pub async fn save_form(&self, form: &SettingsForm, user: Option<&UserId>) -> WmprResult<String> {
        let project_key = required_project_key(form.project_key.as_deref())?;
        let user = user.ok_or(WmprError::Unauthorized)?;

        let use_custom = form.jql_option.as_deref() == Some(CUSTOM_OPTION);
        let text = form
            .custom_jql
            .as_deref()
            .map(str::trim)
            .filter(|text| use_custom && !text.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.defaults.default_query.clone());

        let settings = ProjectQuerySettings {
            project_key: project_key.to_string(),
            use_custom_query: use_custom,
            custom_query_text: Some(text),
        };

        settings
            .write(self.store.as_ref(), &self.defaults.keys)
            .await
            .map_err(|e| WmprError::settings_store(format!("Error saving settings: {}", e)))?;

        self.metrics.record_settings_save();
        info!(
            "Settings for {} saved by {}: use_custom={}",
            project_key, user, use_custom
        );

        Ok(settings_location(project_key))
    }
}

fn required_project_key(project_key: Option<&str>) -> WmprResult<&str> {
    project_key
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .ok_or_else(|| WmprError::validation("Project key is required"))
}

/// The settings view with the success banner
pub fn settings_location(project_key: &str) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("projectKey", project_key)
        .append_pair("saved", "true")
        .finish();
    format!("/settings?{}", query)
}
