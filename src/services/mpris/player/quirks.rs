use std::time::Duration;

/// Players that report `Stopped` right before announcing the next track
const SENDS_STOP_ON_TRACK_CHANGE: &[&str] = &[
    "org.mpris.MediaPlayer2.banshee",
    "org.mpris.MediaPlayer2.pragha",
];

/// Delay before a quirky player's status is published
pub const STATUS_SETTLE: Duration = Duration::from_millis(300);

/// Delay before a quirky player's sliders are refreshed after a track change
pub const SLIDER_SETTLE: Duration = Duration::from_secs(1);

/// Workarounds needed for a particular bus name
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayerQuirks {
    /// Status and slider refreshes must wait for a spurious `Stopped` to pass
    pub sends_stop_on_track_change: bool,
}

impl PlayerQuirks {
    /// Look up the quirks for a bus name
    pub fn for_bus_name(bus_name: &str) -> Self {
        Self {
            sends_stop_on_track_change: SENDS_STOP_ON_TRACK_CHANGE.contains(&bus_name),
        }
    }

    /// How long to wait before publishing a status change
    pub fn status_delay(self) -> Option<Duration> {
        self.sends_stop_on_track_change.then_some(STATUS_SETTLE)
    }

    /// How long to wait before refreshing sliders after a track change
    pub fn slider_delay(self) -> Option<Duration> {
        self.sends_stop_on_track_change.then_some(SLIDER_SETTLE)
    }
}
