use std::{
    env,
    io::{Error, ErrorKind},
    path::PathBuf,
};

/// Directory name used under the XDG base directories
const APP_DIR: &str = "mpris-indicator";

/// Locates configuration and log directories following the XDG Base
/// Directory specification
pub struct ConfigPaths;

impl ConfigPaths {
    /// Returns the configuration directory
    ///
    /// `$XDG_CONFIG_HOME/mpris-indicator`, falling back to
    /// `$HOME/.config/mpris-indicator`.
    ///
    /// # Errors
    /// Returns an error if neither `XDG_CONFIG_HOME` nor `HOME` is set
    pub fn config_dir() -> Result<PathBuf, Error> {
        let config_home = env::var("XDG_CONFIG_HOME")
            .or_else(|_| env::var("HOME").map(|home| format!("{home}/.config")))
            .map_err(|_| {
                Error::new(
                    ErrorKind::NotFound,
                    "Neither XDG_CONFIG_HOME nor HOME environment variable found",
                )
            })?;

        Ok(PathBuf::from(config_home).join(APP_DIR))
    }

    /// Returns the log directory, creating it if needed
    ///
    /// `$XDG_STATE_HOME/mpris-indicator/logs`, falling back to
    /// `$HOME/.local/state/mpris-indicator/logs`.
    ///
    /// # Errors
    /// Returns error if no home is known or the directory cannot be created
    pub fn log_dir() -> Result<PathBuf, Error> {
        let state_home = env::var("XDG_STATE_HOME")
            .or_else(|_| env::var("HOME").map(|home| format!("{home}/.local/state")))
            .map_err(|_| {
                Error::new(
                    ErrorKind::NotFound,
                    "Neither XDG_STATE_HOME nor HOME environment variable found",
                )
            })?;

        let log_dir = PathBuf::from(state_home).join(APP_DIR).join("logs");
        if !log_dir.exists() {
            std::fs::create_dir_all(&log_dir)?;
        }
        Ok(log_dir)
    }

    /// Returns the path to the main configuration file
    ///
    /// # Errors
    /// Returns an error if neither `XDG_CONFIG_HOME` nor `HOME` is set
    pub fn main_config() -> Result<PathBuf, Error> {
        Ok(Self::config_dir()?.join("config.toml"))
    }
}
