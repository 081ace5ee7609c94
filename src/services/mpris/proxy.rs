#![allow(missing_docs)]

use std::collections::HashMap;
use zbus::{
    Result, proxy,
    zvariant::{ObjectPath, OwnedObjectPath, OwnedValue},
};

/// MPRIS MediaPlayer2 interface proxy
///
/// Provides access to the base MPRIS interface for media player control
#[proxy(
    interface = "org.mpris.MediaPlayer2",
    default_service = "org.mpris.MediaPlayer2",
    default_path = "/org/mpris/MediaPlayer2"
)]
pub trait MediaPlayer2 {
    /// Quit the media player application
    fn quit(&self) -> Result<()>;

    /// Raise the media player window to the foreground
    fn raise(&self) -> Result<()>;

    /// Whether the player can be quit
    #[zbus(property)]
    fn can_quit(&self) -> Result<bool>;

    /// Whether the player window can be raised
    #[zbus(property)]
    fn can_raise(&self) -> Result<bool>;

    /// Human-readable name of the player
    #[zbus(property)]
    fn identity(&self) -> Result<String>;

    /// Desktop entry name for the player
    #[zbus(property)]
    fn desktop_entry(&self) -> Result<String>;
}

/// MPRIS MediaPlayer2.Player interface proxy
///
/// Provides access to the playback control interface for media players
#[proxy(
    interface = "org.mpris.MediaPlayer2.Player",
    default_service = "org.mpris.MediaPlayer2",
    default_path = "/org/mpris/MediaPlayer2"
)]
pub trait MediaPlayer2Player {
    /// Start playback
    fn play(&self) -> Result<()>;

    /// Pause playback
    fn pause(&self) -> Result<()>;

    /// Toggle play/pause state
    fn play_pause(&self) -> Result<()>;

    /// Stop playback
    fn stop(&self) -> Result<()>;

    /// Skip to next track
    fn next(&self) -> Result<()>;

    /// Skip to previous track
    fn previous(&self) -> Result<()>;

    /// Set absolute playback position in microseconds
    fn set_position(&self, track_id: &ObjectPath<'_>, position: i64) -> Result<()>;

    /// Signal emitted when playback position jumps
    #[zbus(signal)]
    fn seeked(&self, position: i64) -> Result<()>;

    /// Current playback status (Playing, Paused, Stopped)
    #[zbus(property)]
    fn playback_status(&self) -> Result<String>;

    /// Current track metadata
    #[zbus(property)]
    fn metadata(&self) -> Result<HashMap<String, OwnedValue>>;

    /// Current volume level (0.0 to 1.0)
    #[zbus(property)]
    fn volume(&self) -> Result<f64>;

    /// Set volume level
    #[zbus(property)]
    fn set_volume(&self, volume: f64) -> Result<()>;

    /// Current playback position in microseconds
    #[zbus(property(emits_changed_signal = "false"))]
    fn position(&self) -> Result<i64>;

    /// Whether the player can skip to next track
    #[zbus(property)]
    fn can_go_next(&self) -> Result<bool>;

    /// Whether the player can skip to previous track
    #[zbus(property)]
    fn can_go_previous(&self) -> Result<bool>;

    /// Whether the player can pause playback
    #[zbus(property)]
    fn can_pause(&self) -> Result<bool>;

    /// Whether the player supports seeking
    #[zbus(property)]
    fn can_seek(&self) -> Result<bool>;
}

/// MPRIS MediaPlayer2.Playlists interface proxy
#[proxy(
    interface = "org.mpris.MediaPlayer2.Playlists",
    default_service = "org.mpris.MediaPlayer2",
    default_path = "/org/mpris/MediaPlayer2"
)]
pub trait MediaPlayer2Playlists {
    /// Start playing the given playlist
    fn activate_playlist(&self, playlist_id: &ObjectPath<'_>) -> Result<()>;

    /// Fetch a page of playlists as `(id, name, icon)`
    fn get_playlists(
        &self,
        index: u32,
        max_count: u32,
        order: &str,
        reverse_order: bool,
    ) -> Result<Vec<(OwnedObjectPath, String, String)>>;

    /// `(valid, (id, name, icon))` for the currently active playlist
    #[zbus(property)]
    fn active_playlist(&self) -> Result<OwnedValue>;
}
