use super::PlayerOwner;

/// Errors that can occur while talking to media players
#[derive(thiserror::Error, Debug)]
pub enum MediaError {
    /// No live session is registered for the given owner
    #[error("Player {0} not found")]
    PlayerNotFound(PlayerOwner),

    /// D-Bus communication error
    #[error("D-Bus operation failed: {0}")]
    DbusError(#[from] zbus::Error),

    /// Failed to initialize the media service
    #[error("Failed to initialize media service: {0}")]
    InitializationFailed(String),

    /// Failed to control the player
    #[error("Failed to control player: {0}")]
    ControlFailed(String),

    /// A property read did not produce a usable value
    #[error("Property {property} unavailable: {reason}")]
    PropertyUnavailable {
        /// MPRIS property name
        property: &'static str,
        /// Why the value could not be obtained
        reason: String,
    },

    /// Artwork could not be retrieved or cached
    #[error("Failed to fetch artwork from {uri}: {reason}")]
    ArtworkFetch {
        /// Artwork reference as reported by the player
        uri: String,
        /// Underlying failure
        reason: String,
    },

    /// Local filesystem error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<zbus::fdo::Error> for MediaError {
    fn from(error: zbus::fdo::Error) -> Self {
        Self::DbusError(error.into())
    }
}
