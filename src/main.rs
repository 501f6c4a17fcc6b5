//! Frontend edge server.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────┐
//!                      │               FRONTEND EDGE                  │
//!   Browser request    │  ┌───────────┐   ┌──────────┐   ┌─────────┐  │
//!   ───────────────────┼─▶│ request id│──▶│  health  │──▶│  auth   │  │
//!                      │  │  + trace  │   │ shortcut │   │  gate   │  │
//!                      │  └───────────┘   └──────────┘   └────┬────┘  │
//!                      │                                      ▼       │
//!                      │            ┌───────────────┬──────────────┐  │
//!                      │            │  API prefix   │  everything  │  │
//!                      │            │  → proxy      │  else → SPA  │  │
//!                      │            └──────┬────────┴──────┬───────┘  │
//!                      └───────────────────┼───────────────┼──────────┘
//!                                          ▼               ▼
//!                                   backend service   bundle / index
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use frontend_edge::config::loader::load_or_default;
use frontend_edge::config::{EnvSnapshot, Settings};
use frontend_edge::lifecycle::startup;
use frontend_edge::observability::{logging, metrics};

#[derive(Debug, Parser)]
#[command(name = "frontend-edge", version, about = "Frontend edge server")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "frontend.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Resolve before logging exists; configuration errors go to stderr.
    let settings = match load_or_default(&cli.config)
        .and_then(|config| Settings::resolve(config, &EnvSnapshot::from_process()))
    {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("frontend-edge: {}", e);
            return ExitCode::FAILURE;
        }
    };

    logging::init(settings.mode, &settings.observability.log_filter);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        mode = %settings.mode,
        bind_address = %settings.bind_address,
        apis = settings.apis.len(),
        "frontend-edge starting"
    );

    if settings.observability.metrics_enabled {
        match settings.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %settings.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    match startup::run(settings).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            ExitCode::FAILURE
        }
    }
}
