//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the server (provider discovery, bundle discovery or first build)
//! - Bind the listener and serve until a shutdown signal
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The listener binds last, after every fallible step succeeded

use thiserror::Error;
use tokio::net::TcpListener;

use crate::auth::AuthError;
use crate::config::{ConfigError, Settings};
use crate::http::FrontendServer;
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::forward_signals;
use crate::pages::PageError;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Authentication setup failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Page setup failed: {0}")]
    Pages(#[from] PageError),

    #[error("HTTP client setup failed: {0}")]
    Client(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Build, bind and serve until SIGINT or SIGTERM.
pub async fn run(settings: Settings) -> Result<(), StartupError> {
    let bind_address = settings.bind_address;
    let server = FrontendServer::builder(settings).build().await?;

    let listener = TcpListener::bind(bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let serve = server.run(listener, shutdown.subscribe());
    tokio::pin!(serve);

    tokio::select! {
        result = &mut serve => return result.map_err(StartupError::from),
        _ = forward_signals(&shutdown) => {}
    }

    // Drain in-flight requests.
    serve.await?;
    Ok(())
}
