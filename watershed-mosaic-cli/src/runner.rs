//! CLI runner for common setup and operations.
//!
//! Encapsulates config loading, logging initialization and pipeline
//! construction to reduce duplication across command handlers.

use crate::error::CliError;
use std::path::{Path, PathBuf};
use tracing::info;
use watershed_mosaic::config::{config_file_path, ConfigFile};
use watershed_mosaic::executor::CommandModel;
use watershed_mosaic::logging::{init_logging, LoggingGuard};
use watershed_mosaic::pipeline::PipelineConfig;

/// Global options shared by every command.
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    /// Explicit config file; the default location when absent
    pub config: Option<PathBuf>,
    /// Force debug-level logging
    pub debug: bool,
}

impl GlobalOptions {
    /// Config file this invocation reads.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(config_file_path)
    }

    /// Loads the config file, or defaults when it does not exist.
    pub fn load_config(&self) -> Result<ConfigFile, CliError> {
        Ok(ConfigFile::load_from(&self.config_path())?)
    }
}

/// Runner that manages CLI lifecycle and common operations.
pub struct CliRunner {
    /// Logging guard - keeps logging active while runner exists
    #[allow(dead_code)]
    logging_guard: LoggingGuard,
    /// Loaded configuration file
    config: ConfigFile,
    config_path: PathBuf,
}

impl CliRunner {
    /// Create a new CLI runner, loading config and initializing logging.
    ///
    /// The log file lives in the run workspace unless the config names one.
    pub fn new(options: &GlobalOptions) -> Result<Self, CliError> {
        let config_path = options.config_path();
        let config = ConfigFile::load_from(&config_path)?;

        let logging_guard = init_logging(&config.log_file(), &config.logging.level, options.debug)
            .map_err(|e| CliError::LoggingInit(e.to_string()))?;

        Ok(Self {
            logging_guard,
            config,
            config_path,
        })
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Log startup information for a command.
    pub fn log_startup(&self, command: &str) {
        info!("watershed-mosaic v{}", watershed_mosaic::VERSION);
        info!(
            config = %self.config_path.display(),
            workspace = %self.config.workspace.directory.display(),
            "watershed-mosaic CLI: {} command",
            command
        );
    }

    /// Build the run configuration from the loaded file.
    pub fn pipeline_config(&self) -> Result<PipelineConfig, CliError> {
        Ok(PipelineConfig::from_config_file(&self.config)?)
    }

    /// Build the external model from `[executor] model_program`.
    pub fn model(&self) -> Result<CommandModel, CliError> {
        let program = self.config.executor.model_program.as_deref().ok_or_else(|| {
            CliError::Config(format!(
                "No model program configured. Set model_program in the [executor] section of {}",
                self.config_path.display()
            ))
        })?;
        info!(program, args = ?self.config.executor.model_args, "Using external model");
        Ok(CommandModel::new(program).with_args(self.config.executor.model_args.iter().cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_config_loads_defaults() {
        let dir = TempDir::new().unwrap();
        let options = GlobalOptions {
            config: Some(dir.path().join("absent.ini")),
            debug: false,
        };
        assert_eq!(options.load_config().unwrap(), ConfigFile::default());
    }

    #[test]
    fn test_explicit_config_path_wins() {
        let options = GlobalOptions {
            config: Some(PathBuf::from("/tmp/custom.ini")),
            debug: true,
        };
        assert_eq!(options.config_path(), PathBuf::from("/tmp/custom.ini"));
        assert_eq!(GlobalOptions::default().config_path(), config_file_path());
    }
}
