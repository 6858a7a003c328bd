//! # seqsite CLI
//!
//! Command-line interface for publishing the public pages of a Logseq
//! graph as a static site.

mod commands;
mod images;
mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "seqsite")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(long, global = true, default_value = "seqsite.yml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the static site (default)
    Build {
        /// Graph root (overrides paths.input)
        #[arg(long)]
        input: Option<PathBuf>,

        /// Output directory (overrides paths.output)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Check the graph and print diagnostics without writing anything
    Verify {
        /// Graph root (overrides paths.input)
        #[arg(long)]
        input: Option<PathBuf>,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; logs go to stderr so stdout stays machine-readable
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(if cli.verbose {
                tracing::Level::DEBUG.into()
            } else {
                tracing::Level::INFO.into()
            }),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        None => commands::build_site(&cli.config, commands::BuildOverrides::default()),
        Some(Commands::Build { input, output }) => {
            commands::build_site(&cli.config, commands::BuildOverrides { input, output })
        }
        Some(Commands::Verify { input, json }) => {
            commands::verify_site(&cli.config, input, json)
        }
    }
}
