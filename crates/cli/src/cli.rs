use std::path::PathBuf;

#[derive(clap::Parser, Debug)]
pub struct Cli {
    /// Host root directory (defaults to the OS data directory)
    #[clap(long)]
    pub root: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Manage extensions
    Extensions {
        #[clap(subcommand)]
        command: ExtensionCommands,
    },
}

#[derive(clap::Subcommand, Debug)]
pub enum ExtensionCommands {
    /// Enable an extension
    Enable {
        /// The extension ID to enable
        extension: String,
    },
    /// Disable an extension
    Disable {
        /// The extension ID to disable
        extension: String,
    },
    /// List all discovered extensions
    List,
    /// Import an extension from a .tar.gz archive
    Import {
        /// Path to the archive
        archive: PathBuf,
        /// Enable the extension after importing
        #[clap(long)]
        enable: bool,
    },
    /// Export an extension's source tree to a .tar.gz archive
    Export {
        /// The extension ID to export
        extension: String,
        /// Directory to write the archive into
        #[clap(long)]
        output: Option<PathBuf>,
    },
    /// Completely remove an extension: files, ledger record, everything
    Uninstall {
        /// The extension ID to uninstall
        extension: String,
        /// Confirm the destructive operation
        #[clap(long)]
        force: bool,
    },
}
