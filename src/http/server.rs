//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with all handlers
//! - Wire up middleware (request ID, tracing, health short-circuit,
//!   hardening headers, auth gate)
//! - Dispatch requests to the proxy or the page service
//! - Run background session sweeping alongside the listener
//!
//! # Layer Order (outermost first)
//! ```text
//! SetRequestId → Trace → PropagateRequestId → internal health check
//!     → hardening headers (production) → auth gate → routes / dispatch
//! ```

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceExt;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::auth::{self, gate::auth_gate, AuthContext, IdentityProvider, OidcProvider};
use crate::config::Settings;
use crate::http::health::{healthz, internal_health_check};
use crate::http::proxy;
use crate::http::request::{request_id, RequestKind};
use crate::lifecycle::startup::StartupError;
use crate::observability::metrics;
use crate::pages::{self, TemplateContext, TemplateFn};
use crate::routing::ApiRouter;
use crate::security::headers::harden;

/// How often expired sessions and pending logins are swept.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub api_router: Arc<ApiRouter>,
    pub client: reqwest::Client,
    pub auth: Option<Arc<AuthContext>>,
    pub pages: Router,
}

/// Assembles a `FrontendServer` from settings and optional overrides.
pub struct FrontendServerBuilder {
    settings: Settings,
    provider: Option<Arc<dyn IdentityProvider>>,
    template_fn: Option<TemplateFn>,
}

impl FrontendServerBuilder {
    /// Use `provider` instead of discovering the configured issuer.
    pub fn identity_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Build template parameters with `template_fn`.
    pub fn template_fn(mut self, template_fn: TemplateFn) -> Self {
        self.template_fn = Some(template_fn);
        self
    }

    /// Discover the provider and the bundle; everything that can fail at
    /// startup fails here, before a listener exists.
    pub async fn build(self) -> Result<FrontendServer, StartupError> {
        let settings = Arc::new(self.settings);

        let auth = match &settings.auth {
            Some(auth_settings) => {
                let provider: Arc<dyn IdentityProvider> = match self.provider {
                    Some(provider) => provider,
                    None => Arc::new(
                        OidcProvider::discover(
                            auth_settings,
                            settings.public_url(auth::CALLBACK_PATH),
                        )
                        .await?,
                    ),
                };
                Some(Arc::new(AuthContext::new(&settings, auth_settings.clone(), provider)?))
            }
            None => None,
        };

        let context = TemplateContext::new(auth.is_some(), self.template_fn);
        let pages = pages::router(&settings.pages, context)?;

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        let api_router = Arc::new(ApiRouter::new(settings.apis.clone()));
        for route in api_router.routes() {
            tracing::info!(
                prefix = %route.prefix,
                service = %route.service,
                upstream = %route.base,
                source = ?route.source,
                "API route"
            );
        }

        let state = AppState {
            settings: settings.clone(),
            api_router,
            client,
            auth: auth.clone(),
            pages,
        };

        Ok(FrontendServer {
            router: build_router(state),
            settings,
            auth,
        })
    }
}

/// The edge server, ready to accept connections.
pub struct FrontendServer {
    router: Router,
    settings: Arc<Settings>,
    auth: Option<Arc<AuthContext>>,
}

impl FrontendServer {
    pub fn builder(settings: Settings) -> FrontendServerBuilder {
        FrontendServerBuilder {
            settings,
            provider: None,
            template_fn: None,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Authentication state, when auth is enabled.
    pub fn auth(&self) -> Option<&Arc<AuthContext>> {
        self.auth.as_ref()
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            mode = %self.settings.mode,
            auth = self.auth.is_some(),
            "HTTP server starting"
        );

        let sweeper = self
            .auth
            .clone()
            .map(|auth| tokio::spawn(sweep(auth, shutdown.resubscribe())));

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn sweep(auth: Arc<AuthContext>, mut shutdown: broadcast::Receiver<()>) {
    let mut interval = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        tokio::select! {
            _ = interval.tick() => auth.sweep(Instant::now()),
            _ = shutdown.recv() => break,
        }
    }
}

/// Build the Axum router with all middleware layers.
fn build_router(state: AppState) -> Router {
    let auth = state.auth.clone();
    let production = state.settings.is_production();

    let mut app = Router::new()
        .route("/healthz", get(healthz))
        .route("/_/healthz", get(healthz))
        .fallback(dispatch)
        .with_state(state);

    if let Some(auth) = auth {
        app = app
            .merge(auth::routes(auth.clone()))
            .layer(middleware::from_fn_with_state(auth, auth_gate));
    }

    if production {
        app = harden(app);
    }

    app.layer(middleware::from_fn(internal_health_check))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
            tracing::info_span!(
                "request",
                method = %req.method(),
                path = %req.uri().path(),
                request_id = %request_id(req.headers()),
            )
        }))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

/// Proxy API prefixes; everything else goes to the page service.
async fn dispatch(State(state): State<AppState>, req: Request<Body>) -> Response {
    let path = req.uri().path().to_string();
    if let Some(matched) = state.api_router.match_path(&path) {
        return proxy::forward(
            &state.client,
            state.auth.as_deref(),
            matched.route,
            matched.remainder,
            req,
        )
        .await;
    }

    let start = Instant::now();
    let response = state.pages.clone().oneshot(req).await.into_response();
    metrics::record_request(RequestKind::Page, response.status().as_u16(), start);
    response
}
