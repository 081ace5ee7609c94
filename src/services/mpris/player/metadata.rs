use serde::Serialize;

use crate::services::mpris::{MetadataMap, MetadataValue};

/// Placeholder shown when a track has no title
pub const UNKNOWN_TITLE: &str = "Unknown Title";
/// Placeholder shown when a track has no artist
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
/// Placeholder shown when a track has no album
pub const UNKNOWN_ALBUM: &str = "Unknown Album";

/// Metadata for a media track
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrackMetadata {
    /// Track title
    pub title: Option<String>,

    /// Track artists in the order the player reported them
    pub artists: Vec<String>,

    /// Album name
    pub album: Option<String>,

    /// Opaque track identifier (`mpris:trackid`)
    pub track_id: Option<String>,

    /// Artwork reference (`mpris:artUrl`)
    pub art_url: Option<String>,

    /// Location of the media file (`xesam:url`)
    pub url: Option<String>,

    /// Track length in microseconds, 0 when unknown
    pub length_us: i64,

    /// Rating on a 0-5 scale, if the player reports one
    pub rating: Option<u8>,
}

impl TrackMetadata {
    /// Parse a metadata dictionary.
    ///
    /// Returns `None` for dictionaries with at most one entry; some players
    /// send those on stop and they carry no track.
    pub fn from_map(metadata: &MetadataMap) -> Option<Self> {
        if metadata.len() <= 1 {
            return None;
        }

        let text = |key: &str| {
            metadata
                .get(key)
                .and_then(MetadataValue::as_text)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        let artists = metadata
            .get("xesam:artist")
            .and_then(MetadataValue::as_text_list)
            .unwrap_or_default()
            .into_iter()
            .filter(|artist| !artist.is_empty())
            .collect();

        Some(Self {
            title: text("xesam:title"),
            artists,
            album: text("xesam:album"),
            track_id: text("mpris:trackid"),
            art_url: text("mpris:artUrl"),
            url: text("xesam:url"),
            length_us: metadata
                .get("mpris:length")
                .and_then(MetadataValue::as_i64)
                .unwrap_or(0)
                .max(0),
            rating: rating(metadata),
        })
    }

    /// Title, or the placeholder
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(UNKNOWN_TITLE)
    }

    /// Artists joined by `", "`, or the placeholder
    pub fn display_artist(&self) -> String {
        if self.artists.is_empty() {
            UNKNOWN_ARTIST.to_string()
        } else {
            self.artists.join(", ")
        }
    }

    /// Album, or the placeholder
    pub fn display_album(&self) -> &str {
        self.album.as_deref().unwrap_or(UNKNOWN_ALBUM)
    }

    /// Whether this track differs from the one identified by `previous_track_id`.
    ///
    /// A track without an id always counts as new.
    pub fn is_new_track(&self, previous_track_id: Option<&str>) -> bool {
        match (self.track_id.as_deref(), previous_track_id) {
            (Some(current), Some(previous)) => current != previous,
            _ => true,
        }
    }
}

// Clementine's `rating` (0-5) wins over the standard `xesam:userRating` (0-1).
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn rating(metadata: &MetadataMap) -> Option<u8> {
    let stars = metadata
        .get("rating")
        .and_then(MetadataValue::as_f64)
        .or_else(|| {
            metadata
                .get("xesam:userRating")
                .and_then(MetadataValue::as_f64)
                .map(|rating| rating * 5.0)
        })?;

    if !stars.is_finite() {
        return None;
    }
    Some(stars.trunc().clamp(0.0, 5.0) as u8)
}
