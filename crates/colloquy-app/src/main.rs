//! Colloquy service entry point.
//!
//! Loads configuration, builds the context manager, starts the cleanup
//! scheduler and serves the HTTP API until Ctrl-C.

mod cli;

use std::sync::Arc;

use clap::Parser;

use colloquy_api::{start_server, AppState};
use colloquy_context::{ContextManager, DryRunExecutor};
use colloquy_core::ColloquyConfig;

use cli::CliArgs;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = ColloquyConfig::load_or_default(&config_file);
    config.api.port = args.resolve_port(config.api.port);
    let log_level = args.resolve_log_level(&config.general.log_level);

    // Tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .init();

    tracing::info!("Starting Colloquy v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration resolved");

    // Context engine. Tools run in dry-run mode until a real executor is wired.
    let manager = match ContextManager::new(&config.conversation, Arc::new(DryRunExecutor)) {
        Ok(manager) => Arc::new(manager),
        Err(e) => {
            tracing::error!(error = %e, "Invalid conversation configuration");
            return Err(e.into());
        }
    };
    tracing::info!(
        ttl_secs = config.conversation.context_ttl_secs,
        cleanup_interval_secs = config.conversation.cleanup_interval_secs,
        "Context manager ready"
    );

    let cleanup = manager.spawn_cleanup();

    // === API server ===

    let state = AppState::new(Arc::clone(&manager), config.api.clone());
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
        tracing::info!("Shutdown requested");
    };

    let served = start_server(&config.api, state, shutdown).await;

    cleanup.stop().await;
    tracing::info!("Colloquy stopped");

    if let Err(e) = served {
        tracing::error!(error = %e, "API server failed");
        return Err(e.into());
    }
    Ok(())
}
