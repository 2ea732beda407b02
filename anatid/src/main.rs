use anatid::{server, AppState, Fetcher, Settings};
use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_filter()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting anatid");

    let tribunes = Arc::new(settings.load_tribunes().context("invalid tribune table")?);
    info!("Relaying {} tribunes: {}", tribunes.len(), tribunes.names().join(", "));

    let fetcher = Fetcher::new(settings.fetch_config()).context("cannot build HTTP client")?;
    let state = AppState::start(tribunes, fetcher, &settings.server_options());

    let listener = TcpListener::bind(settings.listen)
        .await
        .with_context(|| format!("cannot listen on {}", settings.listen))?;

    server::serve(listener, state).await?;
    Ok(())
}
