//! Capabilities the MPRIS service consumes from the outside world.
//!
//! The state machine only talks to these traits. The zbus implementation
//! lives in [`super::dbus`], artwork downloads in [`super::cover`] and
//! application launching in [`super::default_player`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use super::{MediaError, Playlist};

/// Ownership transition of a bus name
///
/// Empty owner strings reported by the bus are normalised to `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerChange {
    /// Bus name whose ownership changed
    pub name: String,
    /// Connection that held the name before
    pub old_owner: Option<String>,
    /// Connection that holds the name now
    pub new_owner: Option<String>,
}

impl OwnerChange {
    /// Build a change from raw bus strings, treating empty owners as absent
    pub fn from_raw(name: &str, old_owner: &str, new_owner: &str) -> Self {
        let non_empty = |owner: &str| (!owner.is_empty()).then(|| owner.to_string());
        Self {
            name: name.to_string(),
            old_owner: non_empty(old_owner),
            new_owner: non_empty(new_owner),
        }
    }
}

/// A single value of an MPRIS metadata dictionary
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    /// String or object path
    Text(String),
    /// String array
    TextList(Vec<String>),
    /// Signed integer
    Integer(i64),
    /// Unsigned integer
    Unsigned(u64),
    /// Floating point number
    Float(f64),
    /// Boolean flag
    Boolean(bool),
}

impl MetadataValue {
    /// The value as a single string, if it is textual
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::TextList(list) => list.first().map(String::as_str),
            _ => None,
        }
    }

    /// The value as a list of strings, if it is textual
    pub fn as_text_list(&self) -> Option<Vec<String>> {
        match self {
            Self::Text(text) => Some(vec![text.clone()]),
            Self::TextList(list) => Some(list.clone()),
            _ => None,
        }
    }

    /// The value as an integer, if it is numeric
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            Self::Unsigned(value) => i64::try_from(*value).ok(),
            Self::Float(value) if value.is_finite() => Some(*value as i64),
            _ => None,
        }
    }

    /// The value as a float, if it is numeric
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(value) => Some(*value as f64),
            Self::Unsigned(value) => Some(*value as f64),
            Self::Float(value) => Some(*value),
            _ => None,
        }
    }
}

/// Transport-neutral image of an MPRIS `a{sv}` metadata dictionary
pub type MetadataMap = HashMap<String, MetadataValue>;

/// Change notification from a remote player
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteSignal {
    /// `PlaybackStatus` changed
    PlaybackStatus(String),
    /// `Metadata` changed
    Metadata(MetadataMap),
    /// `Volume` changed
    Volume(f64),
    /// `ActivePlaylist` changed
    ActivePlaylist(Option<Playlist>),
    /// One of the capability flags changed; they should be re-queried
    ControlsChanged,
    /// `Identity` changed
    Identity(String),
    /// The `Seeked` signal fired with the new position in microseconds
    Seeked(i64),
}

/// Capability flag with a documented value to use when the read fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlProperty {
    /// `CanPause`
    CanPause,
    /// `CanGoNext`
    CanGoNext,
    /// `CanGoPrevious`
    CanGoPrevious,
    /// `CanSeek`
    CanSeek,
}

impl ControlProperty {
    /// Value assumed when the remote does not answer
    pub fn fallback(self) -> bool {
        !matches!(self, Self::CanSeek)
    }

    /// MPRIS property name
    pub fn name(self) -> &'static str {
        match self {
            Self::CanPause => "CanPause",
            Self::CanGoNext => "CanGoNext",
            Self::CanGoPrevious => "CanGoPrevious",
            Self::CanSeek => "CanSeek",
        }
    }

    /// Collapse a read result onto its fallback, logging the failure
    pub fn resolve(self, result: Result<bool, MediaError>) -> bool {
        result.unwrap_or_else(|error| {
            tracing::debug!(property = self.name(), %error, "using fallback");
            self.fallback()
        })
    }
}

/// Bus-level discovery of MPRIS players
#[async_trait]
pub trait MediaBus: Send + Sync {
    /// Every name currently registered on the bus
    async fn list_names(&self) -> Result<Vec<String>, MediaError>;

    /// Unique connection currently owning `name`
    async fn name_owner(&self, name: &str) -> Result<String, MediaError>;

    /// Stream of ownership changes for every name on the bus
    async fn owner_changes(&self) -> Result<BoxStream<'static, OwnerChange>, MediaError>;

    /// Handle to the player registered under `bus_name`
    fn player(&self, bus_name: &str) -> Arc<dyn RemotePlayer>;
}

/// One remote MPRIS player
#[async_trait]
#[allow(missing_docs)]
pub trait RemotePlayer: Send + Sync {
    async fn raise(&self) -> Result<(), MediaError>;
    async fn quit(&self) -> Result<(), MediaError>;
    async fn next(&self) -> Result<(), MediaError>;
    async fn previous(&self) -> Result<(), MediaError>;
    async fn pause(&self) -> Result<(), MediaError>;
    async fn play_pause(&self) -> Result<(), MediaError>;
    async fn stop(&self) -> Result<(), MediaError>;
    async fn play(&self) -> Result<(), MediaError>;
    async fn set_position(&self, track_id: &str, position_us: i64) -> Result<(), MediaError>;
    async fn get_playlists(
        &self,
        index: u32,
        count: u32,
        order: &str,
        reverse: bool,
    ) -> Result<Vec<Playlist>, MediaError>;
    async fn activate_playlist(&self, playlist_id: &str) -> Result<(), MediaError>;

    async fn identity(&self) -> Result<String, MediaError>;
    async fn desktop_entry(&self) -> Result<String, MediaError>;
    async fn can_raise(&self) -> Result<bool, MediaError>;
    async fn can_quit(&self) -> Result<bool, MediaError>;
    async fn can_seek(&self) -> Result<bool, MediaError>;
    async fn can_pause(&self) -> Result<bool, MediaError>;
    async fn can_go_next(&self) -> Result<bool, MediaError>;
    async fn can_go_previous(&self) -> Result<bool, MediaError>;
    async fn volume(&self) -> Result<f64, MediaError>;
    async fn set_volume(&self, volume: f64) -> Result<(), MediaError>;
    async fn playback_status(&self) -> Result<String, MediaError>;
    async fn metadata(&self) -> Result<MetadataMap, MediaError>;
    async fn position(&self) -> Result<i64, MediaError>;
    async fn active_playlist(&self) -> Result<Option<Playlist>, MediaError>;

    /// Property changes and `Seeked` signals, in bus order
    async fn signals(&self) -> Result<BoxStream<'static, RemoteSignal>, MediaError>;

    /// Read a capability flag by name
    async fn control(&self, property: ControlProperty) -> Result<bool, MediaError> {
        match property {
            ControlProperty::CanPause => self.can_pause().await,
            ControlProperty::CanGoNext => self.can_go_next().await,
            ControlProperty::CanGoPrevious => self.can_go_previous().await,
            ControlProperty::CanSeek => self.can_seek().await,
        }
    }
}

/// Fetches the bytes behind a remote artwork reference
#[async_trait]
pub trait ArtworkSource: Send + Sync {
    /// Read the whole resource identified by `uri`
    async fn read(&self, uri: &str) -> Result<Vec<u8>, MediaError>;
}

/// Desktop integration for the default-player substitution
#[async_trait]
pub trait AppLauncher: Send + Sync {
    /// Desktop id of the application handling audio files, if any
    async fn default_audio_app(&self) -> Option<String>;

    /// Launch an application by desktop id
    async fn launch(&self, desktop_id: &str) -> Result<(), MediaError>;
}
