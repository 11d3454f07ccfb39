//! Theraphosid Inference Server
//!
//! HTTP API serving single-image species predictions from a trained
//! checkpoint. The model is loaded once at startup, verified against its
//! catalog, and shared read-only across requests.

mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::state::{AppState, ServerConfig};

/// Theraphosid Inference Server
#[derive(Parser, Debug)]
#[command(name = "theraphosid-server")]
#[command(author = "Warre Snaet")]
#[command(version)]
#[command(about = "HTTP API for tarantula species classification")]
struct Cli {
    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Checkpoint stem to serve (without .mpk/.json)
    #[arg(short, long, env = "THERAPHOSID_CHECKPOINT")]
    checkpoint: PathBuf,

    /// Fetch the checkpoint weights from this URL if absent
    #[arg(long, env = "THERAPHOSID_MODEL_URL")]
    model_url: Option<String>,

    /// Maximum upload size in megabytes
    #[arg(long, default_value = "10")]
    max_upload_mb: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let config = ServerConfig {
        checkpoint_stem: cli.checkpoint,
        model_url: cli.model_url,
        max_upload_bytes: cli.max_upload_mb * 1024 * 1024,
    };

    info!("Theraphosid Inference Server v{}", env!("CARGO_PKG_VERSION"));
    info!("  Checkpoint: {:?}", config.checkpoint_stem);

    // Loading the model here means a bad checkpoint fails the process
    // before the port is ever bound.
    let max_upload_bytes = config.max_upload_bytes;
    let state = Arc::new(AppState::new(config)?);
    info!(
        "  Serving {} classes at {}x{} input",
        state.predictor.catalog().len(),
        state.predictor.input_size(),
        state.predictor.input_size()
    );

    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/species", get(routes::species::list_species))
        .route("/predict", post(routes::predict::predict))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port).parse()?;
    info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
