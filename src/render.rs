//! Template rendering.
//!
//! The pipeline only needs one capability from a template engine: render a
//! named template against a [`PageContext`]. [`Renderer`] is that seam; the
//! production implementation is [`TeraRenderer`], which loads every `.html`
//! file under the templates directory.
//!
//! Rendering is strict: a template that references a key missing from the
//! context fails with [`RenderError`] instead of producing a page with a hole
//! in it. Values are HTML-escaped (Tera autoescapes `.html` templates), so
//! dataset text cannot inject markup.

use crate::compose::PageContext;
use std::error::Error as _;
use std::path::{Path, PathBuf};
use tera::{Context, Tera};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("template '{0}' not found")]
    UnknownTemplate(String),
    #[error("rendering '{template}' failed: {message}")]
    Engine { template: String, message: String },
}

#[derive(Error, Debug)]
pub enum TemplateLoadError {
    #[error("templates directory not found: {0}")]
    MissingDir(PathBuf),
    #[error("failed to load templates from {dir}: {}", describe(.source))]
    Tera { dir: PathBuf, source: tera::Error },
    #[error("invalid template '{name}': {}", describe(.source))]
    Raw { name: String, source: tera::Error },
}

/// Binds a page context to a named template.
///
/// Implementations must be shareable across the rendering thread pool.
pub trait Renderer: Sync {
    fn render(&self, template: &str, context: &PageContext) -> Result<String, RenderError>;

    /// Whether `template` can be rendered at all. Checked once before a run.
    fn has_template(&self, template: &str) -> bool;
}

/// Tera-backed renderer.
#[derive(Debug)]
pub struct TeraRenderer {
    tera: Tera,
}

impl TeraRenderer {
    /// Load every `.html` template below `dir`, registered by relative path.
    pub fn load(dir: &Path) -> Result<Self, TemplateLoadError> {
        if !dir.is_dir() {
            return Err(TemplateLoadError::MissingDir(dir.to_path_buf()));
        }
        let glob = dir.join("**").join("*.html").to_string_lossy().to_string();
        let tera = Tera::new(&glob).map_err(|source| TemplateLoadError::Tera {
            dir: dir.to_path_buf(),
            source,
        })?;
        tracing::debug!(
            dir = %dir.display(),
            templates = tera.get_template_names().count(),
            "templates loaded"
        );
        Ok(Self { tera })
    }

    /// Build a renderer from a single in-memory template.
    pub fn from_raw(name: &str, source: &str) -> Result<Self, TemplateLoadError> {
        let mut tera = Tera::default();
        tera.add_raw_template(name, source)
            .map_err(|source| TemplateLoadError::Raw {
                name: name.to_string(),
                source,
            })?;
        Ok(Self { tera })
    }

    /// Registered template names, sorted.
    pub fn template_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tera.get_template_names().collect();
        names.sort_unstable();
        names
    }
}

impl Renderer for TeraRenderer {
    fn render(&self, template: &str, context: &PageContext) -> Result<String, RenderError> {
        if !self.has_template(template) {
            return Err(RenderError::UnknownTemplate(template.to_string()));
        }
        let engine_err = |e: tera::Error| RenderError::Engine {
            template: template.to_string(),
            message: describe(&e),
        };
        let ctx = Context::from_serialize(context.as_map()).map_err(engine_err)?;
        self.tera.render(template, &ctx).map_err(engine_err)
    }

    fn has_template(&self, template: &str) -> bool {
        self.tera.get_template_names().any(|name| name == template)
    }
}

/// Flatten a Tera error and its causes into one line.
///
/// Tera's top-level message is generic ("Failed to render 'x'"); the useful
/// diagnostic (missing variable, bad filter) lives in the source chain.
fn describe(err: &tera::Error) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        parts.push(cause.to_string());
        source = cause.source();
    }
    parts.join(": ")
}
