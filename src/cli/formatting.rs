//! Formatting utilities for CLI output.

use crate::services::mpris::{DefaultPlayerInfo, PlaybackState, SessionSnapshot, format_time};

/// ANSI color codes for terminal output
pub struct Colors;

impl Colors {
    /// Reset all formatting
    pub const RESET: &'static str = "\x1b[0m";
    /// Bold text
    pub const BOLD: &'static str = "\x1b[1m";
    /// Dim text
    pub const DIM: &'static str = "\x1b[2m";
    /// Cyan color
    pub const CYAN: &'static str = "\x1b[36m";
}

/// Formats section headers with styling
pub fn format_header(text: &str) -> String {
    format!("{}{}{}{}", Colors::BOLD, Colors::CYAN, text, Colors::RESET)
}

/// Icon and label for a playback state
pub fn format_status(status: PlaybackState) -> &'static str {
    match status {
        PlaybackState::Playing => "▶ Playing",
        PlaybackState::Paused => "⏸ Paused",
        PlaybackState::Stopped => "⏹ Stopped",
    }
}

/// One-line summary of the selected player, or of its absence
pub fn format_selection(selection: Option<&SessionSnapshot>, template: &str) -> String {
    let Some(player) = selection else {
        return format!("{}No player{}", Colors::DIM, Colors::RESET);
    };

    let mut line = format!(
        "{} {}: {}",
        format_status(player.status),
        player.identity,
        player.status_text(template)
    );
    if player.show_position {
        line.push_str(&format!(
            " [{} / {}]",
            player.position.label,
            format_time(player.position.length_us)
        ));
    }
    if player.show_volume {
        if let Some(volume) = player.volume {
            line.push_str(&format!(" {}%", volume.percentage()));
        }
    }
    line
}

/// Numbered table row for `list`
pub fn format_player_row(index: usize, player: &SessionSnapshot, selected: bool) -> String {
    let marker = if selected { " (current)" } else { "" };
    format!(
        "{index:2}. {identity:<24} {status:>12}  {title} by {artist}{marker}",
        identity = player.identity,
        status = format_status(player.status),
        title = player.title,
        artist = player.artist,
    )
}

/// Row for the synthetic default player
pub fn format_default_player(info: &DefaultPlayerInfo) -> String {
    format!(
        "{}    {} (not running, {}){}",
        Colors::DIM,
        info.identity,
        info.desktop_id,
        Colors::RESET
    )
}
