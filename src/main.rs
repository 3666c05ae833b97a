//! DIALS REST API - HTTP façade over DIALS spot-finding and image export.
//!
//! This binary starts the HTTP server or mints access tokens.

use clap::Parser;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dials_rest::{
    auth::TokenAuth,
    backend::SubprocessBackend,
    config::{Cli, Command, ServeConfig, TokenConfig},
    server::{create_router, RouterConfig},
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve(config) => run_serve(config).await,
        Command::Token(config) => run_token(config),
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("DIALS REST API v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Spot-finding helper: {}", config.find_spots_cmd);
    info!("  Bitmap helper: {}", config.export_bitmap_cmd);

    // Auth status with warning if disabled
    if config.auth_enabled {
        info!("  Auth: enabled");
    } else {
        warn!("  Auth: DISABLED - analysis endpoints are publicly accessible");
        warn!("        Enable for production: --auth-enabled --jwt-secret=<secret>");
    }

    let backend = SubprocessBackend::new(&config.find_spots_cmd, &config.export_bitmap_cmd);

    let router_config = match build_router_config(&config) {
        Ok(router_config) => router_config,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let router = create_router(backend, router_config);

    let addr = config.bind_address();
    info!("Server listening on http://{}", addr);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Build RouterConfig from the application ServeConfig.
fn build_router_config(config: &ServeConfig) -> Result<RouterConfig, String> {
    let mut router_config = if config.auth_enabled {
        RouterConfig::new(config.secret.resolve()?)
    } else {
        RouterConfig::without_auth()
    };

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config = router_config.with_tracing(!config.no_tracing);

    Ok(router_config)
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "dials_rest=debug,tower_http=debug"
    } else {
        "dials_rest=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

// =============================================================================
// Token Command
// =============================================================================

fn run_token(config: TokenConfig) -> ExitCode {
    let secret = match config.secret.resolve() {
        Ok(secret) => secret,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let expires_at = match config.expires_at() {
        Ok(expires_at) => expires_at,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let auth = TokenAuth::new(secret);
    let ttl = config.ttl.map(Duration::from_secs);

    match auth.issue(Default::default(), expires_at, ttl) {
        Ok(token) => {
            println!("{}", token);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: failed to issue token: {}", e);
            ExitCode::FAILURE
        }
    }
}
