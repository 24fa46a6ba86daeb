//! IQV passive market maker - Entry Point

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// IQV passive market maker
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "PMM_CONFIG", default_value = "config/default.toml")]
    config: String,

    /// Validate the configuration and exit
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    pmm_telemetry::init_logging()?;

    info!("Starting pmm-bot v{}", env!("CARGO_PKG_VERSION"));
    info!(config_path = %args.config, "Loading configuration");

    let config = pmm_bot::AppConfig::from_file(&args.config)?;
    config.validate()?;
    info!(
        pair = %config.market.pair(),
        mode = %config.strategy.mode,
        "Configuration loaded"
    );

    if args.check_config {
        info!("Configuration is valid");
        return Ok(());
    }

    let mut app = pmm_bot::Application::paper(config)?;

    info!("Running preflight...");
    app.preflight().await?;

    app.run().await?;

    Ok(())
}
