//! Template parameters and rendering.
//!
//! Parameters are a flat JSON object built per request:
//!
//! | auth     | session | custom fn | parameters            |
//! |----------|---------|-----------|-----------------------|
//! | disabled | any     | yes / no  | `fn(None)` / `{}`     |
//! | enabled  | none    | any       | `{}`                  |
//! | enabled  | present | yes / no  | `fn(user)` / identity |

use handlebars::Handlebars;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::auth::{Session, UserInfo};
use crate::pages::PageError;

/// Custom parameter builder supplied by the embedding application.
pub type TemplateFn = Arc<dyn Fn(Option<&UserInfo>) -> Map<String, Value> + Send + Sync>;

const INDEX: &str = "index";

/// Decides which parameters a request renders with.
#[derive(Clone)]
pub struct TemplateContext {
    auth_enabled: bool,
    template_fn: Option<TemplateFn>,
}

impl std::fmt::Debug for TemplateContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateContext")
            .field("auth_enabled", &self.auth_enabled)
            .field("template_fn", &self.template_fn.is_some())
            .finish()
    }
}

impl TemplateContext {
    pub fn new(auth_enabled: bool, template_fn: Option<TemplateFn>) -> Self {
        Self {
            auth_enabled,
            template_fn,
        }
    }

    pub fn params(&self, session: Option<&Session>) -> Map<String, Value> {
        match (self.auth_enabled, session, &self.template_fn) {
            (false, _, Some(f)) => f(None),
            (false, _, None) | (true, None, _) => Map::new(),
            (true, Some(session), Some(f)) => f(Some(session.user())),
            (true, Some(session), None) => identity_params(session.user()),
        }
    }
}

fn identity_params(user: &UserInfo) -> Map<String, Value> {
    let mut params = Map::new();
    params.insert("email".to_string(), Value::from(user.email.clone()));
    params.insert("name".to_string(), Value::from(user.name.clone()));
    params.insert("picture".to_string(), Value::from(user.picture.clone()));
    params
}

/// The production index template, compiled once.
#[derive(Debug)]
pub struct IndexTemplate {
    registry: Handlebars<'static>,
}

impl IndexTemplate {
    pub fn compile(source: &str) -> Result<Self, PageError> {
        let mut registry = Handlebars::new();
        registry
            .register_template_string(INDEX, source)
            .map_err(|e| PageError::Template(e.to_string()))?;
        Ok(Self { registry })
    }

    pub fn render(&self, params: &Map<String, Value>) -> Result<String, PageError> {
        self.registry
            .render(INDEX, params)
            .map_err(|e| PageError::Render(e.to_string()))
    }
}

/// Render an HTML document produced at request time.
pub fn render_html(source: &str, params: &Map<String, Value>) -> Result<String, PageError> {
    Handlebars::new()
        .render_template(source, params)
        .map_err(|e| PageError::Render(e.to_string()))
}
