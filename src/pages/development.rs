//! Development page serving.
//!
//! # Responsibilities
//! - Run the build command at start and again whenever sources change
//! - Hold requests while a build is in flight
//! - Serve the build output with cache busting and the history fallback
//! - Push bundle changes to browsers over `/__livereload`
//!
//! # Data Flow
//! ```text
//! notify watcher ──events──▶ Compiler task (debounce, build)
//!                                │
//!                                ▼ watch::Sender<BuildStatus>
//! request ─▶ fresh_bundle (wait while Building, no-cache)
//!         ─▶ history_fallback ─▶ transform_html ─▶ ServeDir(output)
//! ```
//!
//! # Design Decisions
//! - Single writer: only the compiler task updates the build status
//! - A failed build still serves the last output; browsers get `failed`
//! - Without a build command the output directory itself is watched and
//!   every change bumps the bundle generation

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request},
    middleware::{self, Next},
    response::{
        sse::{Event, KeepAlive, Sse},
        Response,
    },
    routing::get,
    Router,
};
use futures_util::stream::{self, Stream};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::process::Command;
use tokio::sync::{mpsc, watch};
use tokio::task::AbortHandle;
use tower_http::services::ServeDir;

use crate::config::settings::DevSettings;
use crate::observability::metrics;
use crate::pages::fallback::history_fallback;
use crate::pages::template::TemplateContext;
use crate::pages::transform::transform_html;
use crate::pages::PageError;

pub const LIVERELOAD_PATH: &str = "/__livereload";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPhase {
    Building,
    Ready,
    Failed,
}

/// Current state of the development bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildStatus {
    pub phase: BuildPhase,
    /// Number of completed builds (or output changes).
    pub generation: u64,
}

impl BuildStatus {
    fn event_name(&self) -> &'static str {
        match self.phase {
            BuildPhase::Building => "building",
            BuildPhase::Ready => "reload",
            BuildPhase::Failed => "failed",
        }
    }
}

/// Rebuilds the bundle; the only writer of the build status.
struct Compiler {
    settings: DevSettings,
    status: watch::Sender<BuildStatus>,
    generation: u64,
}

impl Compiler {
    async fn run(mut self, mut changes: mpsc::UnboundedReceiver<()>) {
        if !self.settings.build_command.is_empty() {
            self.build().await;
        }

        while changes.recv().await.is_some() {
            // Wait for the burst of events to settle.
            loop {
                match tokio::time::timeout(self.settings.debounce, changes.recv()).await {
                    Ok(Some(())) => continue,
                    Ok(None) => return,
                    Err(_) => break,
                }
            }
            self.build().await;
        }
    }

    async fn build(&mut self) {
        let Some((program, args)) = self.settings.build_command.split_first() else {
            self.generation += 1;
            tracing::debug!(generation = self.generation, "Bundle output changed");
            self.status.send_replace(BuildStatus {
                phase: BuildPhase::Ready,
                generation: self.generation,
            });
            return;
        };

        self.status.send_replace(BuildStatus {
            phase: BuildPhase::Building,
            generation: self.generation,
        });
        tracing::info!(command = ?self.settings.build_command, "Building bundle");

        let started = Instant::now();
        let outcome = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .status()
            .await;

        let phase = match outcome {
            Ok(status) if status.success() => {
                tracing::info!(elapsed_ms = started.elapsed().as_millis() as u64, "Bundle built");
                metrics::record_bundle_build("success");
                BuildPhase::Ready
            }
            Ok(status) => {
                tracing::warn!(status = %status, "Bundle build failed");
                metrics::record_bundle_build("failure");
                BuildPhase::Failed
            }
            Err(e) => {
                tracing::error!(program = %program, error = %e, "Could not run build command");
                metrics::record_bundle_build("failure");
                BuildPhase::Failed
            }
        };

        self.generation += 1;
        self.status.send_replace(BuildStatus {
            phase,
            generation: self.generation,
        });
    }
}

/// A watched development bundle. Dropping it stops watching and building.
pub struct DevBundle {
    status: watch::Receiver<BuildStatus>,
    _watcher: RecommendedWatcher,
    compiler: AbortHandle,
}

impl std::fmt::Debug for DevBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevBundle")
            .field("status", &*self.status.borrow())
            .finish_non_exhaustive()
    }
}

impl Drop for DevBundle {
    fn drop(&mut self) {
        self.compiler.abort();
    }
}

impl DevBundle {
    /// Start watching and (if configured) run the first build.
    pub fn start(settings: DevSettings) -> Result<Self, PageError> {
        std::fs::create_dir_all(&settings.output_dir)?;
        let building = !settings.build_command.is_empty();
        let output_dir = settings.output_dir.canonicalize()?;

        let (changes_tx, changes_rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) if is_source_change(&event, building.then_some(output_dir.as_path())) => {
                    let _ = changes_tx.send(());
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Watch error"),
            }
        })?;
        watcher.watch(&settings.watch_dir, RecursiveMode::Recursive)?;
        tracing::info!(
            watch = %settings.watch_dir.display(),
            output = %settings.output_dir.display(),
            "Watching development bundle"
        );

        let initial = BuildStatus {
            phase: if building { BuildPhase::Building } else { BuildPhase::Ready },
            generation: 0,
        };
        let (status_tx, status_rx) = watch::channel(initial);
        let compiler = Compiler {
            settings,
            status: status_tx,
            generation: 0,
        };
        let compiler = tokio::spawn(compiler.run(changes_rx)).abort_handle();

        Ok(Self {
            status: status_rx,
            _watcher: watcher,
            compiler,
        })
    }

    pub fn status(&self) -> BuildStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<BuildStatus> {
        self.status.clone()
    }

    /// Wait until no build is in flight.
    pub async fn ready(&self) -> BuildStatus {
        let mut status = self.status.clone();
        let waited = status
            .wait_for(|s| s.phase != BuildPhase::Building)
            .await
            .map(|current| *current);
        match waited {
            Ok(current) => current,
            // Compiler gone; serve whatever is on disk.
            Err(_) => *status.borrow(),
        }
    }
}

/// Whether a watcher event should trigger a rebuild. Writes into the build
/// output are ignored while a build command owns that directory.
fn is_source_change(event: &notify::Event, ignored_output: Option<&Path>) -> bool {
    if matches!(event.kind, EventKind::Access(_)) {
        return false;
    }
    match ignored_output {
        Some(output) => event.paths.iter().any(|p| !p.starts_with(output)),
        None => true,
    }
}

async fn fresh_bundle(State(bundle): State<Arc<DevBundle>>, mut req: Request<Body>, next: Next) -> Response {
    if req.uri().path() != LIVERELOAD_PATH {
        let status = bundle.ready().await;
        tracing::trace!(generation = status.generation, "Serving development bundle");
    }

    req.headers_mut().remove(header::IF_MODIFIED_SINCE);
    req.headers_mut().remove(header::IF_NONE_MATCH);

    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    headers.remove(header::ETAG);
    headers.remove(header::LAST_MODIFIED);
    response
}

async fn livereload(
    State(bundle): State<Arc<DevBundle>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = stream::unfold(bundle.subscribe(), |mut status| async move {
        status.changed().await.ok()?;
        let current = *status.borrow_and_update();
        let event = Event::default()
            .event(current.event_name())
            .data(current.generation.to_string());
        Some((Ok(event), status))
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}

/// Router serving the development bundle.
pub fn router(settings: DevSettings, context: TemplateContext) -> Result<Router, PageError> {
    let output_dir: PathBuf = settings.output_dir.clone();
    let bundle = Arc::new(DevBundle::start(settings)?);

    Ok(Router::new()
        .route(LIVERELOAD_PATH, get(livereload))
        .fallback_service(ServeDir::new(output_dir))
        .layer(middleware::from_fn_with_state(context, transform_html))
        .layer(middleware::map_request(history_fallback))
        .layer(middleware::from_fn_with_state(bundle.clone(), fresh_bundle))
        .with_state(bundle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind};
    use std::time::Duration;

    fn event(kind: EventKind, path: &str) -> notify::Event {
        notify::Event::new(kind).add_path(PathBuf::from(path))
    }

    fn dev_settings(dir: &Path, build_command: Vec<String>) -> DevSettings {
        DevSettings {
            output_dir: dir.join("dist"),
            watch_dir: dir.join("dist"),
            build_command,
            debounce: Duration::from_millis(20),
        }
    }

    #[test]
    fn test_source_change_filter() {
        let output = Path::new("/work/dist");
        let modify = EventKind::Modify(ModifyKind::Any);

        assert!(is_source_change(&event(modify, "/work/src/app.tsx"), Some(output)));
        assert!(!is_source_change(&event(modify, "/work/dist/main.js"), Some(output)));
        assert!(is_source_change(&event(modify, "/work/dist/main.js"), None));
        assert!(!is_source_change(
            &event(EventKind::Access(AccessKind::Any), "/work/src/app.tsx"),
            None
        ));
        assert!(is_source_change(&event(EventKind::Create(CreateKind::File), "/work/src/new.ts"), None));
    }

    #[tokio::test]
    async fn test_output_change_bumps_generation() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = DevBundle::start(dev_settings(dir.path(), Vec::new())).unwrap();
        assert_eq!(bundle.status().phase, BuildPhase::Ready);

        let mut status = bundle.subscribe();
        std::fs::write(dir.path().join("dist/index.html"), "<html></html>").unwrap();

        tokio::time::timeout(Duration::from_secs(10), status.changed())
            .await
            .expect("no bundle change observed")
            .unwrap();
        assert!(bundle.status().generation >= 1);
        assert_eq!(bundle.ready().await.phase, BuildPhase::Ready);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_build_command_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();

        let mut ok = dev_settings(dir.path(), vec!["true".to_string()]);
        ok.watch_dir = dir.path().join("src");
        let bundle = DevBundle::start(ok).unwrap();
        let status = tokio::time::timeout(Duration::from_secs(10), bundle.ready()).await.unwrap();
        assert_eq!(status, BuildStatus { phase: BuildPhase::Ready, generation: 1 });

        let mut failing = dev_settings(dir.path(), vec!["false".to_string()]);
        failing.watch_dir = dir.path().join("src");
        let bundle = DevBundle::start(failing).unwrap();
        let status = tokio::time::timeout(Duration::from_secs(10), bundle.ready()).await.unwrap();
        assert_eq!(status.phase, BuildPhase::Failed);
    }
}
