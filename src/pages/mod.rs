//! SPA shell serving.
//!
//! # Data Flow
//! ```text
//! production:  ServeDir(bundle) ──miss──▶ render index.hbs (compiled once)
//! development: fresh_bundle → history_fallback → transform_html → ServeDir(output)
//! ```
//!
//! Both modes render with per-request parameters from `template.rs`.

pub mod development;
pub mod fallback;
pub mod production;
pub mod template;
pub mod transform;

use axum::Router;
use thiserror::Error;

use crate::config::settings::PageSettings;

pub use template::{TemplateContext, TemplateFn};

#[derive(Debug, Error)]
pub enum PageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bundle error: {0}")]
    Bundle(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),
}

/// Router for the pages of the active mode.
pub fn router(settings: &PageSettings, context: TemplateContext) -> Result<Router, PageError> {
    match settings {
        PageSettings::Production { bundle_root } => production::router(bundle_root, context),
        PageSettings::Development(dev) => development::router(dev.clone(), context),
    }
}
