//! Command-line front end over the MPRIS service.
//!
//! Every command starts its own service instance, waits for discovery to
//! settle, does its work and shuts the service down again.

mod commands;
pub mod formatting;

pub use commands::{Cli, CliCommand};

use thiserror::Error;

use crate::core::IndicatorError;
use crate::services::MediaError;

/// Errors that can occur during CLI command execution.
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] IndicatorError),

    /// The media service failed to start or accept a command.
    #[error("Media service error: {0}")]
    Service(#[from] MediaError),

    /// Output could not be encoded.
    #[error("Failed to encode output: {0}")]
    Encode(#[from] serde_json::Error),

    /// Writing output failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Type alias for command execution results.
pub type CommandResult = Result<(), CliError>;
