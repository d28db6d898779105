//! ratefeed - build one rates snapshot and exit

use anyhow::{Context, Result};
use tracing::info;

use ratefeed::config::AppConfig;
use ratefeed::persistence::SnapshotWriter;
use ratefeed::runner::{Runner, RunnerSettings};
use ratefeed::sources::HttpFetcher;
use ratefeed::types::load_mapping;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    ratefeed::logging::init(&config.logging)?;
    info!(config = %config, "🚀 ratefeed starting");

    let pairs = load_mapping(&config.mapping_path)?;
    info!(pairs = pairs.len(), path = %config.mapping_path, "Mapping loaded");

    let fetcher = HttpFetcher::from_config(&config).context("Failed to set up page fetcher")?;
    let runner = Runner::new(fetcher, RunnerSettings::from_config(&config));
    let snapshot = runner.run(&pairs).await;

    let writer = SnapshotWriter::new(config.output.out_path(), config.output.write_viewer);
    let path = writer.write(&snapshot)?;

    info!(
        path = %path.display(),
        priced = snapshot.priced_count(),
        failed = snapshot.failed_count(),
        "Done"
    );
    Ok(())
}
