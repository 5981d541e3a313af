mod analyzer;
mod api;
mod auth;
mod buckets;
mod config;
mod error;
mod ingest;
mod pagination;
mod rollup;
mod state;
mod store;

use axum::Router;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn app(state: state::AppState) -> Router {
    api::router(state.clone()).merge(ingest::router(state))
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let args = config::Args::parse();
    init_tracing(&args.log_level);

    let store = Arc::new(store::Store::open(&args.db_path)?);
    let http_addr = config::normalize_listen_addr(&args.listen)?;

    let app_state = state::AppState {
        store,
        auth: Arc::new(auth::AdminAuth::new(args.admin_token.as_deref())),
        max_page_size: args.max_page_size.max(1),
    };
    let http_listener = tokio::net::TcpListener::bind(http_addr).await?;
    let http_server = axum::serve(http_listener, app(app_state)).with_graceful_shutdown(shutdown_signal());

    tracing::info!(http = %http_addr, db = %args.db_path, "quill-stats listening");

    http_server.await?;
    tracing::info!("shut down");
    Ok(())
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
