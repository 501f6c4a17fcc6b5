//! Production page serving.
//!
//! # Responsibilities
//! - Locate the bundle directory under the bundle root
//! - Compile the index template once at startup
//! - Serve static files, rendering the index for everything else
//!
//! # Design Decisions
//! - The bundle is the first subdirectory in sorted order; no bundle is a
//!   startup error
//! - `index.hbs` wins over `index.html`
//! - Directory requests never fall through to a raw `index.html`

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::services::ServeDir;

use crate::auth::SessionHandle;
use crate::pages::template::{IndexTemplate, TemplateContext};
use crate::pages::PageError;

const INDEX_CANDIDATES: [&str; 2] = ["index.hbs", "index.html"];

/// Pick the bundle directory under `root`.
pub fn discover_bundle(root: &Path) -> Result<PathBuf, PageError> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(root)
        .map_err(|e| PageError::Bundle(format!("{}: {}", root.display(), e)))?
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
        .map(|entry| entry.path())
        .collect();
    dirs.sort();
    dirs.into_iter()
        .next()
        .ok_or_else(|| PageError::Bundle(format!("no bundle directory in {}", root.display())))
}

/// Load and compile the bundle's index template.
pub fn load_index(dist: &Path) -> Result<IndexTemplate, PageError> {
    for name in INDEX_CANDIDATES {
        let path = dist.join(name);
        match fs::read_to_string(&path) {
            Ok(source) => {
                tracing::debug!(template = %path.display(), "Compiling index template");
                return IndexTemplate::compile(&source);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(PageError::Bundle(format!("no index template in {}", dist.display())))
}

struct ProductionPages {
    index: IndexTemplate,
    context: TemplateContext,
}

async fn render_index(State(pages): State<Arc<ProductionPages>>, req: Request<Body>) -> Response {
    let session = req.extensions().get::<SessionHandle>();
    let params = pages.context.params(session.map(|h| h.0.as_ref()));
    match pages.index.render(&params) {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::error!(path = %req.uri().path(), error = %e, "Failed to render index");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to render page").into_response()
        }
    }
}

/// Router serving the production bundle.
pub fn router(bundle_root: &Path, context: TemplateContext) -> Result<Router, PageError> {
    let dist = discover_bundle(bundle_root)?;
    let index = load_index(&dist)?;
    tracing::info!(bundle = %dist.display(), "Serving production bundle");

    let pages = Arc::new(ProductionPages { index, context });
    let index_route = get(render_index).with_state(pages.clone());
    let files = ServeDir::new(&dist)
        .append_index_html_on_directories(false)
        .fallback(index_route.clone());

    Ok(Router::new()
        .route("/index.html", index_route.clone())
        .route("/index.hbs", index_route)
        .fallback_service(files))
}
