//! Template engine
//!
//! Tera templates are compiled into the binary from `templates/`. A
//! configured override directory may replace any of them file by file
//! (same relative name). Autoescaping is on for `.html`, and a `timesince`
//! filter renders how long ago a timestamp was.

use chrono::{DateTime, Utc};
use rust_embed::RustEmbed;
use std::collections::{BTreeMap, HashMap};
use std::error::Error as StdError;
use std::fs;
use std::path::{Path, PathBuf};
use tera::{Context as TeraContext, Tera, Value};

mod error;

pub use error::ThemeError;

/// Templates shipped with the binary
#[derive(RustEmbed)]
#[folder = "templates/"]
#[include = "*.html"]
struct EmbeddedTemplates;

/// Renders the site's pages
pub struct ThemeEngine {
    tera: Tera,
    override_path: Option<PathBuf>,
}

impl ThemeEngine {
    /// Build the engine from the embedded templates plus optional overrides
    pub fn new(override_path: Option<&Path>) -> Result<Self, ThemeError> {
        let override_path = override_path.map(Path::to_path_buf);
        let tera = load_tera(override_path.as_deref())?;
        Ok(Self {
            tera,
            override_path,
        })
    }

    /// Re-read the override directory and recompile every template
    pub fn reload(&mut self) -> Result<(), ThemeError> {
        self.tera = load_tera(self.override_path.as_deref())?;
        Ok(())
    }

    pub fn render(&self, template: &str, context: &TeraContext) -> Result<String, ThemeError> {
        self.tera.render(template, context).map_err(|e| {
            let mut error_msg = format!("Failed to render '{}': {}", template, e);
            let mut source = e.source();
            while let Some(s) = source {
                error_msg.push_str(&format!("\n  Caused by: {}", s));
                source = s.source();
            }
            ThemeError::TemplateError(error_msg)
        })
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.tera.get_template_names().any(|n| n == name)
    }

    pub fn template_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tera.get_template_names().map(String::from).collect();
        names.sort();
        names
    }
}

fn load_tera(override_path: Option<&Path>) -> Result<Tera, ThemeError> {
    let mut templates: BTreeMap<String, String> = BTreeMap::new();

    for name in EmbeddedTemplates::iter() {
        let Some(file) = EmbeddedTemplates::get(&name) else {
            continue;
        };
        let content = String::from_utf8(file.data.into_owned()).map_err(|e| {
            ThemeError::TemplateError(format!("Template {} is not UTF-8: {}", name, e))
        })?;
        templates.insert(name.replace('\\', "/"), content);
    }

    if let Some(dir) = override_path {
        if dir.is_dir() {
            let mut overrides = Vec::new();
            collect_templates_from_dir(dir, dir, &mut overrides)?;
            for (name, content) in overrides {
                tracing::debug!(template = %name, "template overridden");
                templates.insert(name, content);
            }
        } else {
            tracing::warn!(path = %dir.display(), "template override directory not found");
        }
    }

    let mut tera = Tera::default();
    tera.autoescape_on(vec![".html"]);
    tera.register_filter("timesince", timesince_filter);
    tera.add_raw_templates(templates)
        .map_err(|e| ThemeError::TemplateError(format!("Failed to compile templates: {}", describe(&e))))?;

    tracing::debug!(count = tera.get_template_names().count(), "templates loaded");
    Ok(tera)
}

fn describe(e: &tera::Error) -> String {
    let mut msg = e.to_string();
    let mut source = e.source();
    while let Some(s) = source {
        msg.push_str(&format!(": {}", s));
        source = s.source();
    }
    msg
}

/// Collect `.html` files below `current_path`, named relative to `base_path`
fn collect_templates_from_dir(
    base_path: &Path,
    current_path: &Path,
    templates: &mut Vec<(String, String)>,
) -> Result<(), ThemeError> {
    for entry in fs::read_dir(current_path)? {
        let path = entry?.path();

        if path.is_dir() {
            collect_templates_from_dir(base_path, &path, templates)?;
        } else if path.extension().is_some_and(|ext| ext == "html") {
            let relative_path = path
                .strip_prefix(base_path)
                .map_err(|_| ThemeError::TemplateError("Failed to get relative path".to_string()))?;
            let name = relative_path.to_string_lossy().replace('\\', "/");
            templates.push((name, fs::read_to_string(&path)?));
        }
    }
    Ok(())
}

/// The largest whole unit between `then` and `now`: "3 days", "1 hour".
///
/// Timestamps in the future read as "0 minutes".
pub fn timesince(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    const UNITS: [(i64, &str, &str); 6] = [
        (60 * 60 * 24 * 365, "year", "years"),
        (60 * 60 * 24 * 30, "month", "months"),
        (60 * 60 * 24 * 7, "week", "weeks"),
        (60 * 60 * 24, "day", "days"),
        (60 * 60, "hour", "hours"),
        (60, "minute", "minutes"),
    ];

    let seconds = (now - then).num_seconds().max(0);
    for (unit_seconds, singular, plural) in UNITS {
        let count = seconds / unit_seconds;
        if count > 0 {
            return format!("{} {}", count, if count == 1 { singular } else { plural });
        }
    }
    "0 minutes".to_string()
}

fn timesince_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let raw = value
        .as_str()
        .ok_or_else(|| tera::Error::msg("timesince expects a timestamp string"))?;
    let then = DateTime::parse_from_rfc3339(raw)
        .map_err(|e| tera::Error::msg(format!("timesince: invalid timestamp '{}': {}", raw, e)))?
        .with_timezone(&Utc);
    Ok(Value::String(timesince(then, Utc::now())))
}

#[cfg(test)]
mod tests;
