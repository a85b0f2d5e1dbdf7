//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::path::PathBuf;
use std::process;
use watershed_mosaic::config::ConfigFileError;
use watershed_mosaic::executor::ExecutorError;
use watershed_mosaic::partition::PartitionError;
use watershed_mosaic::pipeline::PipelineError;
use watershed_mosaic::raster::RasterError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration error
    Config(String),
    /// Configuration file could not be read or written
    ConfigFile(ConfigFileError),
    /// Refused to overwrite an existing file
    AlreadyExists(PathBuf),
    /// Partitioning failed
    Partition(PartitionError),
    /// Mosaic could not be opened
    Mosaic { name: String, error: RasterError },
    /// The run stopped with an error
    Run(PipelineError),
    /// Failed to start the async runtime
    Runtime(std::io::Error),
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        // Print additional help for specific errors
        match self {
            CliError::Config(_) | CliError::ConfigFile(ConfigFileError::InvalidValue { .. }) => {
                eprintln!();
                eprintln!("Run 'watershed-mosaic init' to write a commented default configuration,");
                eprintln!("or pass --config <path> to use a different file.");
            }
            CliError::AlreadyExists(_) => {
                eprintln!();
                eprintln!("Use --force to overwrite it.");
            }
            CliError::Run(PipelineError::Executor(ExecutorError::Model { .. })) => {
                eprintln!();
                eprintln!("The failed job's workspace was kept for inspection.");
                eprintln!("Completed jobs are recorded; rerun 'watershed-mosaic run' to resume.");
            }
            CliError::Run(_) => {
                eprintln!();
                eprintln!("Mosaics and completed jobs are kept; rerun to resume.");
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::ConfigFile(e) => write!(f, "{}", e),
            CliError::AlreadyExists(path) => write!(f, "File already exists: {}", path.display()),
            CliError::Partition(e) => write!(f, "Partitioning failed: {}", e),
            CliError::Mosaic { name, error } => write!(f, "Failed to open mosaic '{}': {}", name, error),
            CliError::Run(e) => write!(f, "Run failed: {}", e),
            CliError::Runtime(e) => write!(f, "Failed to start runtime: {}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::ConfigFile(e) => Some(e),
            CliError::Partition(e) => Some(e),
            CliError::Mosaic { error, .. } => Some(error),
            CliError::Run(e) => Some(e),
            CliError::Runtime(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::ConfigFile(e)
    }
}

impl From<PipelineError> for CliError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::Config(msg) => CliError::Config(msg),
            other => CliError::Run(other),
        }
    }
}

impl From<PartitionError> for CliError {
    fn from(e: PartitionError) -> Self {
        CliError::Partition(e)
    }
}
