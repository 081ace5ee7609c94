//! Configuration schema and loading.
//!
//! The configuration is a single TOML file that may pull in other files
//! through `@` imports. Every section and field has a default, so a missing
//! or empty file yields a working configuration.

mod general;
mod loading;
mod media;
mod paths;


pub use general::{GeneralConfig, LogLevel};
pub use media::MediaConfig;
pub use paths::ConfigPaths;

use serde::{Deserialize, Serialize};

/// Main configuration structure for the indicator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    /// General application settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Media player discovery and display settings.
    #[serde(default)]
    pub media: MediaConfig,
}
