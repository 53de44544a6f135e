mod auth;
mod cli;
mod config;
mod error;
mod inventory;
mod migration_state;
mod naming;
mod output;
mod platform;
mod providers;
mod retry;
mod scheduler;
mod steps;

#[cfg(test)]
mod testing;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::{info, warn};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    output::print_banner();

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted; cancelling in-flight migrations...");
                cancel.cancel();
            }
        }
    });

    info!("Starting ado2gh");
    cli.execute(cancel).await?;

    Ok(())
}
