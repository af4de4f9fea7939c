use clap::Parser;
use graphiti_nodelink::{pipeline, Cli, Config};
use tracing::{debug, info};
use tracing_subscriber::{filter::EnvFilter, FmtSubscriber};

fn main() -> anyhow::Result<()> {
    // stdout carries the document, so logs go to stderr
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("graphiti_nodelink=info,warn"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {}", e))?;

    let config = Config::from(Cli::parse());
    debug!("Configuration: {:?}", config);

    pipeline::run(&config).map_err(|e| anyhow::anyhow!("Conversion failed: {}", e))?;
    info!("Done");

    Ok(())
}
