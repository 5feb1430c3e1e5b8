//! Settings page rendering
//!
//! Two renderers produce the same form: the host's runtime template (a file
//! an administrator can restyle without rebuilding) and the page compiled
//! into the binary. [`SettingsPageRenderer`] probes them in that order on
//! every render, so a template that appears or disappears at runtime is
//! picked up without a restart.

use askama::Template;
use regex::{Captures, Regex};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use wmpr_core::error::{WmprError, WmprResult};

use crate::settings_admin::FormModel;

/// File name of the host template inside the template directory
pub const HOST_TEMPLATE_FILE: &str = "wmpr-settings.html";

/// A way of turning a [`FormModel`] into an HTML page
pub trait FormRenderer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this renderer can be used right now
    fn is_available(&self) -> bool;

    fn render(&self, model: &FormModel) -> WmprResult<String>;
}

/// Renders the host's runtime template.
///
/// The template uses `${name}` placeholders. Values are HTML-escaped except
/// `successBanner`, which is markup. Unknown placeholders are left as they are.
pub struct HostTemplateRenderer {
    template_path: PathBuf,
    placeholder: Regex,
}

impl HostTemplateRenderer {
    pub fn new<P: AsRef<Path>>(template_dir: P) -> WmprResult<Self> {
        let placeholder = Regex::new(r"\$\{([A-Za-z][A-Za-z0-9_]*)\}")
            .map_err(|e| WmprError::template(format!("invalid placeholder pattern: {}", e)))?;

        Ok(Self {
            template_path: template_dir.as_ref().join(HOST_TEMPLATE_FILE),
            placeholder,
        })
    }

    pub fn template_path(&self) -> &Path {
        &self.template_path
    }

    fn value_of(model: &FormModel, name: &str) -> Option<String> {
        let checked = |on: bool| {
            let attribute = if on { "checked" } else { "" };
            attribute.to_string()
        };

        let value = match name {
            "projectKey" => escape_html(&model.project_key),
            "projectName" => escape_html(&model.project_name),
            "currentJql" => escape_html(&model.current_query),
            "customJql" => escape_html(model.custom_text()),
            "defaultJql" => escape_html(&model.default_query),
            "useCustomJql" => model.use_custom.to_string(),
            "showSuccess" => model.show_success.to_string(),
            "defaultChecked" => checked(!model.use_custom),
            "customChecked" => checked(model.use_custom),
            "cancelUrl" => escape_html(&model.cancel_url()),
            "successBanner" => {
                if model.show_success {
                    "<div class='wmpr-success'><strong>Settings saved successfully!</strong> \
                     Changes will take effect immediately.</div>"
                        .to_string()
                } else {
                    String::new()
                }
            }
            _ => return None,
        };
        Some(value)
    }
}

impl FormRenderer for HostTemplateRenderer {
    fn name(&self) -> &'static str {
        "host-template"
    }

    fn is_available(&self) -> bool {
        self.template_path.is_file()
    }

    fn render(&self, model: &FormModel) -> WmprResult<String> {
        let template = std::fs::read_to_string(&self.template_path).map_err(|e| {
            WmprError::template(format!(
                "cannot read {}: {}",
                self.template_path.display(),
                e
            ))
        })?;

        let page = self.placeholder.replace_all(&template, |caps: &Captures| {
            Self::value_of(model, &caps[1]).unwrap_or_else(|| caps[0].to_string())
        });
        Ok(page.into_owned())
    }
}

#[derive(Template)]
#[template(path = "settings.html")]
struct SettingsPage<'a> {
    model: &'a FormModel,
}

/// The settings page compiled into the binary; always available
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinRenderer;

impl FormRenderer for BuiltinRenderer {
    fn name(&self) -> &'static str {
        "builtin"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn render(&self, model: &FormModel) -> WmprResult<String> {
        SettingsPage { model }
            .render()
            .map_err(|e| WmprError::template(e.to_string()))
    }
}

/// Picks the first available renderer, falling through on render errors
pub struct SettingsPageRenderer {
    renderers: Vec<Box<dyn FormRenderer>>,
}

impl SettingsPageRenderer {
    pub fn new(renderers: Vec<Box<dyn FormRenderer>>) -> Self {
        Self { renderers }
    }

    /// Host template from `template_dir` when configured, then the built-in page
    pub fn from_template_dir(template_dir: Option<&str>) -> WmprResult<Self> {
        let mut renderers: Vec<Box<dyn FormRenderer>> = Vec::new();
        if let Some(dir) = template_dir {
            renderers.push(Box::new(HostTemplateRenderer::new(dir)?));
        }
        renderers.push(Box::new(BuiltinRenderer));
        Ok(Self::new(renderers))
    }

    pub fn render(&self, model: &FormModel) -> WmprResult<String> {
        for renderer in &self.renderers {
            if !renderer.is_available() {
                debug!("Renderer {} unavailable", renderer.name());
                continue;
            }
            match renderer.render(model) {
                Ok(page) => {
                    debug!("Rendered settings page with {}", renderer.name());
                    return Ok(page);
                }
                Err(e) => warn!("{} renderer failed, trying next: {}", renderer.name(), e),
            }
        }
        Err(WmprError::template("no renderer could produce the settings page"))
    }
}

impl Default for SettingsPageRenderer {
    fn default() -> Self {
        Self::new(vec![Box::new(BuiltinRenderer)])
    }
}

fn escape_html(s: &str) -> String {
    askama::MarkupDisplay::new_unsafe(s, askama::Html).to_string()
}
