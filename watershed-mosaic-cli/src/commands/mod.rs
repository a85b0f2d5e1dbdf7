//! CLI command implementations.
//!
//! Each subcommand has its own module with argument definitions and handlers.
//!
//! # Command Modules
//!
//! - [`catalog`] - Show how every catalog entry resolves
//! - [`init`] - Configuration initialization
//! - [`jobs`] - List the dispatch queue
//! - [`mosaic_info`] - Mosaic metadata and stitching progress
//! - [`partition`] - Partition watersheds into jobs without running them
//! - [`run`] - Main command (partition, dispatch, stitch, reclaim)

pub mod catalog;
pub mod common;
pub mod init;
pub mod jobs;
pub mod mosaic_info;
pub mod partition;
pub mod run;
