//! watershed-mosaic CLI - Command-line interface
//!
//! This binary provides a command-line interface to the watershed-mosaic
//! library.

mod commands;
mod error;
mod runner;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use error::CliError;
use runner::{CliRunner, GlobalOptions};

#[derive(Parser)]
#[command(name = "watershed-mosaic")]
#[command(version = watershed_mosaic::VERSION)]
#[command(about = "Run a per-watershed model globally and stitch its outputs into mosaics", long_about = None)]
struct Cli {
    /// Config file (default: ~/.watershed-mosaic/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging regardless of RUST_LOG
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a commented default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Partition the watersheds into jobs without running them
    Partition,

    /// List the dispatch queue in dispatch order
    Jobs {
        /// Show at most this many jobs
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Partition, run every job, and stitch outputs into the mosaics
    Run,

    /// Show a mosaic's metadata and how many tiles have been written
    MosaicInfo {
        /// Mosaic name as used in [outputs]
        name: String,
    },

    /// Show how every [catalog] entry resolves
    Catalog,
}

fn main() {
    let cli = Cli::parse();
    let options = GlobalOptions {
        config: cli.config,
        debug: cli.debug,
    };

    if let Err(e) = dispatch(cli.command, &options) {
        e.exit();
    }
}

fn dispatch(command: Commands, options: &GlobalOptions) -> Result<(), CliError> {
    match command {
        Commands::Init { force } => commands::init::run(&options.config_path(), force),
        Commands::Partition => commands::partition::run(&CliRunner::new(options)?),
        Commands::Jobs { limit } => commands::jobs::run(&options.load_config()?, limit),
        Commands::Run => commands::run::run(&CliRunner::new(options)?),
        Commands::MosaicInfo { name } => commands::mosaic_info::run(&options.load_config()?, &name),
        Commands::Catalog => commands::catalog::run(&options.load_config()?),
    }
}
