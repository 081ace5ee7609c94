//! mpris-indicator binary.

use std::process;

use clap::Parser;
use mpris_indicator::{
    cli::{Cli, CliCommand},
    config::{Config, ConfigPaths},
    tracing_config,
};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config_path = match cli.config.clone().map_or_else(ConfigPaths::main_config, Ok) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("Failed to locate configuration: {e}");
            process::exit(1);
        }
    };
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };

    let command = cli.command.unwrap_or(CliCommand::Watch { json: false });
    let level = config.general.log_level;

    // Only the long-running watcher keeps a log file.
    let _log_guard = match command {
        CliCommand::Watch { .. } => tracing_config::init_with_file(level)
            .map_err(|e| eprintln!("Failed to initialise logging: {e}"))
            .ok(),
        _ => {
            if let Err(e) = tracing_config::init(level) {
                eprintln!("Failed to initialise logging: {e}");
            }
            None
        }
    };

    if let Err(e) = command.execute(&config).await {
        eprintln!("{e}");
        process::exit(1);
    }
}
