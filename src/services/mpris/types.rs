use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use super::player::{PositionSnapshot, SessionSnapshot};

/// Well-known bus name prefix shared by every MPRIS player
pub const MPRIS_BUS_PREFIX: &str = "org.mpris.MediaPlayer2";

/// Unique bus connection currently holding a player's bus name
///
/// This is the registry key: a player restarting under a new connection
/// gets a new owner, while a renamed player keeps its owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct PlayerOwner(String);

impl PlayerOwner {
    /// Wrap a unique connection name such as `:1.50`
    pub fn new(owner: impl Into<String>) -> Self {
        Self(owner.into())
    }

    /// The raw connection name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PlayerOwner {
    fn from(owner: &str) -> Self {
        Self::new(owner)
    }
}

/// Creation-ordered identifier of a live session
///
/// Ids are never reused, so a message tagged with an id that is no longer
/// registered belongs to a destroyed session and can be dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Numeric value of the id
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Naming convention a player registered its bus name under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusNameKind {
    /// `org.mpris.MediaPlayer2.<app>`
    Master,
    /// `org.mpris.MediaPlayer2.<app>.<instance>` or VLC's `vlc-<pid>`
    Instance,
}

static VLC_INSTANCE: OnceLock<Option<Regex>> = OnceLock::new();

fn is_vlc_instance(name: &str) -> bool {
    VLC_INSTANCE
        .get_or_init(|| Regex::new(r"^org\.mpris\.MediaPlayer2\.vlc-\d+$").ok())
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(name))
}

/// Classify a bus name as a master or instance registration.
pub fn classify_bus_name(name: &str) -> BusNameKind {
    if name.split('.').count() > 4 || is_vlc_instance(name) {
        BusNameKind::Instance
    } else {
        BusNameKind::Master
    }
}

/// Whether a bus name belongs to an MPRIS player
pub fn is_mpris_name(name: &str) -> bool {
    name.strip_prefix(MPRIS_BUS_PREFIX)
        .is_some_and(|rest| rest.starts_with('.') && rest.len() > 1)
}

/// Display name derived from the bus name until the player reports one.
///
/// `org.mpris.MediaPlayer2.banshee` becomes `Banshee`.
pub fn identity_from_bus_name(name: &str) -> String {
    let segment = name.split('.').nth(3).unwrap_or(name);
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Current playback state of a media player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum PlaybackState {
    /// Player is currently playing
    Playing,

    /// Player is paused
    Paused,

    /// Player is stopped
    #[default]
    Stopped,
}

impl From<&str> for PlaybackState {
    fn from(status: &str) -> Self {
        match status {
            "Playing" => Self::Playing,
            "Paused" => Self::Paused,
            _ => Self::Stopped,
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Playing => "Playing",
            Self::Paused => "Paused",
            Self::Stopped => "Stopped",
        };
        f.write_str(label)
    }
}

/// Volume level clamped to `0.0..=1.0`
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize)]
#[serde(transparent)]
pub struct Volume(f64);

impl Volume {
    /// Create a volume, clamping out-of-range and non-finite input
    pub fn new(level: f64) -> Self {
        if level.is_finite() {
            Self(level.clamp(0.0, 1.0))
        } else {
            Self(0.0)
        }
    }

    /// Volume as a fraction
    pub fn fraction(self) -> f64 {
        self.0
    }

    /// Volume as a whole percentage
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn percentage(self) -> u8 {
        (self.0 * 100.0).round() as u8
    }
}

impl From<f64> for Volume {
    fn from(level: f64) -> Self {
        Self::new(level)
    }
}

/// One entry of a player's playlist interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Playlist {
    /// Object path identifying the playlist
    pub id: String,
    /// Display name
    pub name: String,
}

/// Events emitted by the MPRIS service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PlayerEvent {
    /// A new session was created
    SessionAdded(SessionSnapshot),

    /// A session was destroyed
    SessionRemoved(PlayerOwner),

    /// A session moved to a new bus connection
    OwnerChanged {
        /// Previous registry key
        old_owner: PlayerOwner,
        /// New registry key
        new_owner: PlayerOwner,
    },

    /// A session was upgraded from its master to an instance bus name
    BusNameUpgraded {
        /// Session owner
        owner: PlayerOwner,
        /// Instance bus name now in use
        bus_name: String,
    },

    /// Track metadata changed
    MetadataChanged(SessionSnapshot),

    /// Published playback status changed
    StatusChanged(SessionSnapshot),

    /// Resolved artwork changed
    CoverChanged(SessionSnapshot),

    /// Position estimate moved
    PositionChanged {
        /// Session owner
        owner: PlayerOwner,
        /// New position
        position: PositionSnapshot,
    },

    /// A different session, or none, is now the current player
    SelectionChanged(Option<SessionSnapshot>),
}
