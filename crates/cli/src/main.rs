mod cli;
mod commands;

use clap::Parser;

use atrium_extensions::{HostPaths, LifecycleManager};

use crate::cli::Commands;
use crate::commands::handle_extension_command;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let root = match cli.root {
        Some(root) => root,
        None => HostPaths::default_root()?,
    };

    let mut manager = LifecycleManager::new(HostPaths::new(root)).await?;
    manager.startup().await?;

    match cli.command {
        Commands::Extensions { command } => {
            handle_extension_command(command, &mut manager).await?;
        }
    }

    Ok(())
}
