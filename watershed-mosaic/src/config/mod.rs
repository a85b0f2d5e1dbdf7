//! Configuration file loading and saving.
//!
//! A single INI file is read once at process start into a [`ConfigFile`];
//! the pipeline derives its read-only run configuration from it.
//!
//! # Example
//!
//! ```no_run
//! use watershed_mosaic::config::ConfigFile;
//!
//! let config = ConfigFile::load().unwrap();
//! println!("workspace: {}", config.workspace.directory.display());
//! ```

mod defaults;
mod file;
mod parser;
mod settings;
mod writer;

pub use defaults::*;
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::*;
