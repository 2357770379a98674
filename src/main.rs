mod artifacts;
mod cli;
mod config;
mod downstream;
mod error;
mod events;
mod hooks;
mod merge_requests;
mod providers;
mod relay;
mod server;
#[cfg(test)]
mod testing;
mod tracker;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    info!("Starting cirelay {}", env!("CARGO_PKG_VERSION"));
    cli.execute().await?;

    Ok(())
}
