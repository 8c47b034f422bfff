//! portal-sso server
//!
//! # Usage
//!
//! ```bash
//! # Run the server (default command)
//! portal-sso serve
//!
//! # Load and validate configuration, then exit
//! portal-sso --config ./config.toml check-config
//! ```

use acton_reactive::prelude::ActonApp;
use anyhow::{Context, Result};
use axum::{extract::Request, middleware::Next, routing::get, Json, Router};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tower_http::trace::TraceLayer;

use portal_sso::{
    auth::{Authenticated, SessionClaims},
    config::PortalConfig,
    middleware::{AuthMiddleware, SessionLayer},
    observability,
    router::auth_router,
    state::PortalState,
};

#[derive(Parser)]
#[command(name = "portal-sso")]
#[command(version)]
#[command(about = "OAuth2 single sign-on portal", long_about = None)]
struct Cli {
    /// Configuration file, instead of the standard search path
    #[arg(long, short, env = "PORTAL_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve,
    /// Load and validate configuration, then exit
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    observability::init()?;

    let config = match &cli.config {
        Some(path) => PortalConfig::load_from(path),
        None => PortalConfig::load(),
    }
    .context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::CheckConfig => {
            println!("{config:#?}");
            println!("Configuration OK");
            Ok(())
        }
    }
}

async fn serve(config: PortalConfig) -> Result<()> {
    let bind_addr = config.server.bind_addr.clone();
    let login_path = config.provider.login_path();
    let landing_path = config.session.landing_path.clone();

    let mut runtime = ActonApp::launch();
    let state = PortalState::build(&mut runtime, config).await?;

    let gate = AuthMiddleware::with_login_path(login_path);
    let protected = Router::new()
        .route(&landing_path, get(landing))
        .route_layer(axum::middleware::from_fn(move |req: Request, next: Next| {
            gate.clone().handle_with_config(req, next)
        }))
        .with_state(state.clone());

    let app = auth_router(state.clone())
        .merge(protected)
        .layer(SessionLayer::new(state.validator().clone()))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "portal-sso listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down agents");
    runtime.shutdown_all().await?;

    Ok(())
}

/// Landing page after login
async fn landing(Authenticated(claims): Authenticated) -> Json<SessionClaims> {
    Json(claims)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
