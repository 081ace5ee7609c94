use serde::{Deserialize, Serialize};

/// Media service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// List of player bus name patterns to ignore during discovery
    pub ignored_players: Vec<String>,

    /// Show and control the volume of the current player
    pub show_volume: bool,

    /// Show and control the playback position of the current player
    pub show_position: bool,

    /// Offer the current player's playlists
    pub show_playlists: bool,

    /// Show the rating of the current track
    pub show_rating: bool,

    /// Offer the desktop's default audio application while no player runs
    pub run_default: bool,

    /// Desktop id used instead of the desktop's default audio application.
    ///
    /// Empty means ask the desktop.
    pub default_player: String,

    /// Label template: `%a` artist, `%t` title, `%b` album
    pub status_text: String,

    /// How long an artwork download may take, in milliseconds
    pub artwork_timeout_ms: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ignored_players: Vec::new(),
            show_volume: true,
            show_position: true,
            show_playlists: false,
            show_rating: false,
            run_default: false,
            default_player: String::new(),
            status_text: "%a - %t".to_string(),
            artwork_timeout_ms: 5000,
        }
    }
}
