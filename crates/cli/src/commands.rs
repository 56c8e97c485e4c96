use std::path::PathBuf;

use atrium_extensions::LifecycleManager;
use tracing::error;

use crate::cli::ExtensionCommands;

pub async fn handle_extension_command(
    command: ExtensionCommands,
    manager: &mut LifecycleManager,
) -> eyre::Result<()> {
    match command {
        ExtensionCommands::Enable { extension } => enable(manager, &extension).await,
        ExtensionCommands::Disable { extension } => disable(manager, &extension).await,
        ExtensionCommands::List => list(manager).await,
        ExtensionCommands::Import { archive, enable } => import(manager, archive, enable).await,
        ExtensionCommands::Export { extension, output } => {
            export(manager, &extension, output).await
        }
        ExtensionCommands::Uninstall { extension, force } => {
            uninstall(manager, &extension, force).await
        }
    }
}

async fn enable(manager: &mut LifecycleManager, extension: &str) -> eyre::Result<()> {
    println!("Enabling extension: {extension}");

    match manager.enable(extension).await {
        Ok(()) => {
            println!("Extension '{extension}' has been enabled successfully.");
            Ok(())
        }
        Err(e) => {
            error!("Failed to enable extension: {e}");
            Err(eyre::eyre!("Failed to enable extension: {e}"))
        }
    }
}

async fn disable(manager: &mut LifecycleManager, extension: &str) -> eyre::Result<()> {
    println!("Disabling extension: {extension}");

    match manager.disable(extension).await {
        Ok(()) => {
            println!("Extension '{extension}' has been disabled successfully.");
            Ok(())
        }
        Err(e) => {
            error!("Failed to disable extension: {e}");
            Err(eyre::eyre!("Failed to disable extension: {e}"))
        }
    }
}

async fn list(manager: &LifecycleManager) -> eyre::Result<()> {
    let statuses = manager.list_status().await?;

    if statuses.is_empty() {
        println!("No extensions found.");
        return Ok(());
    }

    println!(
        "{:<24} {:<28} {:<10} {:<10} {:<9}",
        "ID", "Name", "Version", "Status", "Installed"
    );
    for status in statuses {
        println!(
            "{:<24} {:<28} {:<10} {:<10} {:<9}",
            status.id,
            status.name,
            status.version,
            if status.enabled { "Enabled" } else { "Disabled" },
            if status.installed { "Yes" } else { "No" },
        );
    }

    Ok(())
}

async fn import(
    manager: &mut LifecycleManager,
    archive: PathBuf,
    enable: bool,
) -> eyre::Result<()> {
    println!("Importing extension from: {}", archive.display());

    match manager.import(&archive, enable).await {
        Ok(outcome) => {
            println!("{} ({})", outcome.message, outcome.extension_id);
            if outcome.is_update {
                println!("The previous version was uninstalled before the update.");
            }
            Ok(())
        }
        Err(e) => {
            error!("Import failed: {e}");
            Err(eyre::eyre!("Import failed: {e}"))
        }
    }
}

async fn export(
    manager: &LifecycleManager,
    extension: &str,
    output: Option<PathBuf>,
) -> eyre::Result<()> {
    match manager.export(extension, output.as_deref()).await {
        Ok(exported) => {
            println!("Exported to: {}", exported.path.display());
            println!("SHA-256: {}", exported.sha256);
            Ok(())
        }
        Err(e) => {
            error!("Export failed: {e}");
            Err(eyre::eyre!("Export failed: {e}"))
        }
    }
}

async fn uninstall(
    manager: &mut LifecycleManager,
    extension: &str,
    force: bool,
) -> eyre::Result<()> {
    if !force {
        return Err(eyre::eyre!(
            "Uninstalling '{extension}' deletes its files and ledger record permanently. \
             Re-run with --force to confirm."
        ));
    }

    match manager.uninstall(extension).await {
        Ok(()) => {
            println!("Extension '{extension}' has been uninstalled.");
            Ok(())
        }
        Err(e) => {
            error!("Failed to uninstall extension: {e}");
            Err(eyre::eyre!("Failed to uninstall extension: {e}"))
        }
    }
}
