/// Current-player selection
pub mod aggregator;
/// Artwork resolution and download deduplication
pub mod cover;
/// zbus implementation of the remote traits
pub mod dbus;
/// Default audio application substitution
pub mod default_player;
pub(crate) mod dispatch;
/// Media player error types
pub mod error;
/// Per-player session state
pub mod player;
/// D-Bus proxy trait definitions
pub mod proxy;
/// Player discovery and lifecycle
pub mod registry;
/// Remote capabilities consumed by the service
pub mod remote;
/// Public service façade
pub mod service;
/// Identifiers, states and events
pub mod types;

#[cfg(test)]
mod tests;

pub use aggregator::StatusAggregator;
pub use default_player::DefaultPlayerInfo;
pub use error::*;
pub use player::{
    PlayerAction, PlayerOptions, PositionSnapshot, SessionSnapshot, TrackMetadata, format_time,
};
pub use remote::{
    AppLauncher, ArtworkSource, ControlProperty, MediaBus, MetadataMap, MetadataValue,
    OwnerChange, RemotePlayer, RemoteSignal,
};
pub use service::*;
pub use types::*;
