//! Template engine
//!
//! Page templates are compiled into the binary from `templates/` and
//! rendered with Tera. A directory configured as `templates.override_path`
//! may replace any of them by file name, so the site can be restyled
//! without a rebuild.

use anyhow::{Context, Result};
use rust_embed::RustEmbed;
use serde::Serialize;
use std::error::Error as StdError;
use std::fs;
use std::path::{Path, PathBuf};
use tera::{Context as TeraContext, Tera};

use crate::config::TemplateConfig;

mod error;
pub mod filters;

pub use error::ThemeError;

#[derive(RustEmbed)]
#[folder = "templates/"]
#[include = "*.html"]
struct EmbeddedTemplates;

/// Template engine for rendering pages
pub struct ThemeEngine {
    tera: Tera,
    override_path: Option<PathBuf>,
}

impl ThemeEngine {
    /// Load the embedded templates and apply disk overrides
    pub fn new(config: &TemplateConfig) -> Result<Self> {
        let mut engine = Self {
            tera: Tera::default(),
            override_path: config.override_path.clone(),
        };
        engine.reload()?;
        Ok(engine)
    }

    /// Rebuild the template set, picking up edited override files
    pub fn reload(&mut self) -> Result<()> {
        let mut templates = embedded_templates()?;

        if let Some(dir) = &self.override_path {
            if dir.is_dir() {
                let mut overrides = Vec::new();
                collect_templates_from_dir(dir, dir, &mut overrides)?;
                for (name, content) in overrides {
                    tracing::debug!(template = %name, "Using template override");
                    match templates.iter_mut().find(|(existing, _)| *existing == name) {
                        Some(slot) => slot.1 = content,
                        None => templates.push((name, content)),
                    }
                }
            } else {
                tracing::warn!(path = ?dir, "Template override directory not found, using embedded templates");
            }
        }

        let mut tera = Tera::default();
        tera.autoescape_on(vec![".html"]);
        filters::register(&mut tera);
        tera.add_raw_templates(templates)
            .map_err(|e| ThemeError::TemplateError(describe(&e)))?;

        tracing::info!(count = tera.get_template_names().count(), "Templates loaded");
        self.tera = tera;
        Ok(())
    }

    pub fn render(&self, template: &str, context: &TeraContext) -> Result<String> {
        self.tera.render(template, context).map_err(|e| {
            ThemeError::TemplateError(format!("Failed to render '{}': {}", template, describe(&e))).into()
        })
    }

    /// Render a template; on failure log the error and return a bare error page
    pub fn render_with_fallback(&self, template: &str, context: &TeraContext) -> String {
        match self.render(template, context) {
            Ok(html) => html,
            Err(e) => {
                tracing::error!("{}", e);
                simple_error_page(500, "Внутренняя ошибка сервера")
            }
        }
    }

    pub fn has_template(&self, template: &str) -> bool {
        self.tera.get_template_names().any(|name| name == template)
    }
}

/// Variables every page template receives
#[derive(Debug, Clone, Serialize)]
pub struct StandardTemplateVars {
    pub site_name: String,
    pub request_path: String,
    /// Current year, for the footer
    pub year: i32,
    pub current_user: Option<CurrentUser>,
}

/// Logged-in user as exposed to templates
#[derive(Debug, Clone, Serialize)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
    pub avatar_url: String,
    pub is_staff: bool,
}

impl From<&crate::models::User> for CurrentUser {
    fn from(user: &crate::models::User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            avatar_url: user.avatar_url(),
            is_staff: user.is_staff(),
        }
    }
}

impl StandardTemplateVars {
    pub fn insert_into(&self, context: &mut TeraContext) {
        context.insert("site_name", &self.site_name);
        context.insert("request_path", &self.request_path);
        context.insert("year", &self.year);
        context.insert("current_user", &self.current_user);
    }
}

fn embedded_templates() -> Result<Vec<(String, String)>> {
    let mut templates = Vec::new();
    for name in EmbeddedTemplates::iter() {
        let Some(file) = EmbeddedTemplates::get(&name) else {
            continue;
        };
        let content = String::from_utf8(file.data.into_owned())
            .map_err(|_| ThemeError::InvalidEncoding(name.to_string()))?;
        templates.push((name.to_string(), content));
    }
    Ok(templates)
}

fn collect_templates_from_dir(base: &Path, current: &Path, templates: &mut Vec<(String, String)>) -> Result<()> {
    for entry in fs::read_dir(current).with_context(|| format!("Failed to read {:?}", current))? {
        let path = entry?.path();
        if path.is_dir() {
            collect_templates_from_dir(base, &path, templates)?;
        } else if path.extension().is_some_and(|ext| ext == "html") {
            let relative = path
                .strip_prefix(base)
                .map_err(|_| ThemeError::TemplateError("Failed to get relative path".to_string()))?;
            let name = relative.to_string_lossy().replace('\\', "/");
            let content =
                fs::read_to_string(&path).with_context(|| format!("Failed to read template: {:?}", path))?;
            templates.push((name, content));
        }
    }
    Ok(())
}

/// Flatten a Tera error with its causes
fn describe(error: &tera::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(&format!("\n  Caused by: {}", cause));
        source = cause.source();
    }
    message
}

/// Last-resort HTML page used when templates themselves fail
pub fn simple_error_page(status: u16, message: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="ru">
<head>
    <meta charset="UTF-8">
    <title>{status}</title>
    <style>
        body {{ font-family: sans-serif; max-width: 600px; margin: 50px auto; padding: 20px; }}
        h1 {{ color: #c0392b; }}
    </style>
</head>
<body>
    <h1>{status}</h1>
    <p>{message}</p>
    <p><a href="/">На главную</a></p>
</body>
</html>"#,
        status = status,
        message = message
    )
}

#[cfg(test)]
mod tests;
