use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use tracing::{info, instrument};

use super::{CommandResult, formatting};
use crate::config::Config;
use crate::services::mpris::{MprisConfig, MprisService, registry::DEFAULT_PLAYER_SETTLE};

/// Time for a fire-and-forget command to reach the player before shutdown
const COMMAND_FLUSH: Duration = Duration::from_millis(200);

/// Command-line arguments
#[derive(Debug, Parser)]
#[command(name = "mpris-indicator")]
#[command(about = "Follow and control MPRIS media players")]
pub struct Cli {
    /// Configuration file, defaults to the XDG location
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// What to do, `watch` when omitted
    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

/// Available commands
#[derive(Debug, Clone, Subcommand)]
pub enum CliCommand {
    /// Print the current player every time it changes
    Watch {
        /// Print one JSON document per line
        #[arg(long)]
        json: bool,
    },
    /// List every running player
    List,
    /// Skip the current player to its next track
    Next,
    /// Return the current player to its previous track
    Previous,
    /// Toggle the current player
    PlayPause,
}

impl CliCommand {
    /// Run the command to completion
    ///
    /// # Errors
    ///
    /// Returns error if the service cannot start or output cannot be written
    #[instrument(skip(config))]
    pub async fn execute(self, config: &Config) -> CommandResult {
        let service = MprisService::start(MprisConfig::from(&config.media)).await?;
        let result = match self {
            CliCommand::Watch { json } => watch(&service, &config.media.status_text, json).await,
            CliCommand::List => list(&service).await,
            CliCommand::Next => control(&service, MprisService::next).await,
            CliCommand::Previous => control(&service, MprisService::previous).await,
            CliCommand::PlayPause => control(&service, MprisService::play_pause).await,
        };
        service.shutdown().await;
        result
    }
}

async fn watch(service: &MprisService, template: &str, json: bool) -> CommandResult {
    let selections = service.selected_monitored();
    tokio::pin!(selections);
    let mut stdout = std::io::stdout();

    loop {
        let selection = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            Some(selection) = selections.next() => selection,
            else => break,
        };

        if json {
            serde_json::to_writer(&mut stdout, &selection)?;
            writeln!(stdout)?;
        } else {
            writeln!(
                stdout,
                "{}",
                formatting::format_selection(selection.as_ref(), template)
            )?;
        }
        stdout.flush()?;
    }
    Ok(())
}

async fn list(service: &MprisService) -> CommandResult {
    tokio::time::sleep(DEFAULT_PLAYER_SETTLE).await;
    let players = service.players();
    let selected = service.selected().map(|player| player.id);
    let mut stdout = std::io::stdout();

    if players.is_empty() {
        writeln!(stdout, "No media players found")?;
    } else {
        writeln!(
            stdout,
            "{}\n",
            formatting::format_header(&format!("Found {} media player(s):", players.len()))
        )?;
        for (index, player) in players.iter().enumerate() {
            let row = formatting::format_player_row(index + 1, player, selected == Some(player.id));
            writeln!(stdout, "{row}")?;
        }
    }
    if let Some(default) = service.default_player() {
        writeln!(stdout, "{}", formatting::format_default_player(&default))?;
    }
    Ok(())
}

async fn control<F>(service: &MprisService, command: F) -> CommandResult
where
    F: FnOnce(&MprisService) -> Result<(), crate::services::MediaError>,
{
    tokio::time::sleep(DEFAULT_PLAYER_SETTLE).await;
    command(service)?;
    tokio::time::sleep(COMMAND_FLUSH).await;
    Ok(())
}
