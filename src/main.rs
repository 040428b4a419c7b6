use clap::Parser;
use color_eyre::Result;
use homedeck::{logging, Config, Dashboard};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "homedeck")]
#[command(about = "Keeps the homedeck store and remote polling running headless")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/homedeck/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let _log_guard = logging::init(&logging::default_log_dir()?)?;
  let config = Config::load(args.config.as_deref())?;

  let mut dashboard = Dashboard::from_config(&config)?;
  let status = dashboard.initialize().await;
  tracing::info!(status = %status, base_url = %config.remote.base_url, "connection initialized");

  dashboard.start();
  tokio::signal::ctrl_c().await?;

  tracing::info!("interrupt received, shutting down");
  dashboard.shutdown().await;

  Ok(())
}
