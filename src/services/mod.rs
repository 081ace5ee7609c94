/// Shared building blocks for services
pub mod common;
/// MPRIS media player discovery and control service
pub mod mpris;

pub use mpris::{MediaError, MprisService, PlayerEvent, SessionSnapshot};
