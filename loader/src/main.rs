use std::sync::Arc;

use clap::Parser;
use loader::{engine, LoaderConfig, LoaderState};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let config = LoaderConfig::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!(
        n_workers = config.n_workers,
        queue_depth = config.queue_depth,
        reorder = config.reorder,
        "starting loader"
    );

    let state = Arc::new(LoaderState::new(config)?);
    engine::start(state);
}
