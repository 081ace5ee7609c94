//! One MPRIS session and its protocol state machine.

/// Track metadata parsing and display placeholders
pub mod metadata;
/// Local position interpolation
pub mod position;
/// Workarounds for non-conforming players
pub mod quirks;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::AbortHandle;
use tracing::{debug, instrument, warn};

pub use metadata::{TrackMetadata, UNKNOWN_ALBUM, UNKNOWN_ARTIST, UNKNOWN_TITLE};
pub use position::{PositionSnapshot, PositionTracker, TICK_INTERVAL, format_time};
pub use quirks::PlayerQuirks;

use super::{
    MediaError, MetadataMap, PlaybackState, PlayerOwner, Playlist, SessionId, Volume,
    cover::{CoverArtFetcher, CoverFetch},
    dispatch::{Dispatch, DispatchSender},
    identity_from_bus_name,
    remote::{AppLauncher, ArtworkSource, ControlProperty, RemotePlayer, RemoteSignal},
};

/// Page requested from `GetPlaylists`
const PLAYLIST_PAGE: u32 = 100;
/// Ordering requested from `GetPlaylists`
const PLAYLIST_ORDER: &str = "Alphabetical";

/// Optional features a session tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerOptions {
    /// Show and control the volume
    pub show_volume: bool,
    /// Show and control the position
    pub show_position: bool,
    /// Fetch the player's playlists
    pub show_playlists: bool,
    /// Report the track rating
    pub show_rating: bool,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            show_volume: true,
            show_position: true,
            show_playlists: false,
            show_rating: false,
        }
    }
}

/// Commands a display collaborator can issue to one player
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerAction {
    /// Toggle play/pause, or just play when the track cannot be paused
    PlayPause,
    /// Start playback
    Play,
    /// Pause playback
    Pause,
    /// Stop playback
    Stop,
    /// Skip to next track
    Next,
    /// Go to previous track
    Previous,
    /// Set the volume (`0.0..=1.0`)
    SetVolume(f64),
    /// Seek to a fraction of the track length
    SeekTo(f64),
    /// Start the playlist with the given id
    ActivatePlaylist(String),
    /// Bring the player to the front, launching it if it cannot be raised
    RaiseOrLaunch,
    /// Ask the player to quit
    Quit,
}

/// Results of remote work and timers, fed back into the session
#[derive(Debug, Clone)]
pub(crate) enum PlayerInput {
    Signal(RemoteSignal),
    Identity(String),
    DesktopEntry(Option<String>),
    Capabilities { can_raise: bool, can_quit: bool },
    Status(PlaybackState),
    Metadata(MetadataMap),
    Position(Option<i64>),
    Volume(Option<f64>),
    Controls {
        can_pause: bool,
        can_go_next: bool,
        can_go_previous: bool,
    },
    CanSeek(bool),
    Playlists(Vec<Playlist>),
    ActivePlaylist(Option<Playlist>),
    Tick(u64),
    PublishStatus,
    RefreshSliders,
    Cover {
        uri: String,
        path: Option<PathBuf>,
    },
}

/// What a handled input changed, for event emission
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct PlayerChanges {
    pub metadata: bool,
    pub status: bool,
    pub cover: bool,
    pub position: bool,
}

impl PlayerChanges {
    fn merge(&mut self, other: Self) {
        self.metadata |= other.metadata;
        self.status |= other.status;
        self.cover |= other.cover;
        self.position |= other.position;
    }
}

/// Display-ready view of one session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    /// Creation-ordered session id
    pub id: SessionId,
    /// Registry key
    pub owner: PlayerOwner,
    /// Bus name the player is reached under
    pub bus_name: String,
    /// Human-readable player name
    pub identity: String,
    /// Desktop entry, if reported
    pub desktop_entry: Option<String>,
    /// Published playback status
    pub status: PlaybackState,
    /// Title or placeholder
    pub title: String,
    /// Joined artists or placeholder
    pub artist: String,
    /// Album or placeholder
    pub album: String,
    /// Raw track metadata
    pub track: TrackMetadata,
    /// Resolved artwork file
    pub cover_path: Option<PathBuf>,
    /// Position estimate
    pub position: PositionSnapshot,
    /// Whether the position slider should be shown
    pub show_position: bool,
    /// Volume, `None` when the player does not expose one
    pub volume: Option<Volume>,
    /// Whether the volume slider should be shown
    pub show_volume: bool,
    /// Whether seeking is possible for the current track
    pub can_seek: bool,
    /// Whether play/pause toggles rather than only plays
    pub can_pause: bool,
    /// Whether `Next` is available
    pub can_go_next: bool,
    /// Whether `Previous` is available
    pub can_go_previous: bool,
    /// Whether the player window can be raised
    pub can_raise: bool,
    /// Whether the player can be asked to quit
    pub can_quit: bool,
    /// Playlists, without video playlists
    pub playlists: Vec<Playlist>,
    /// Id of the active playlist
    pub active_playlist: Option<String>,
}

impl SessionSnapshot {
    /// Fill a label template: `%a` artist, `%t` title, `%b` album.
    pub fn status_text(&self, template: &str) -> String {
        template
            .replacen("%a", &self.artist, 1)
            .replacen("%t", &self.title, 1)
            .replacen("%b", &self.album, 1)
    }
}

/// One live MPRIS player.
///
/// All state changes happen through [`Player::handle`] on the dispatcher.
/// Remote reads, calls and timers run as spawned tasks that report back
/// through the dispatch channel tagged with this session's id.
pub struct Player {
    id: SessionId,
    owner: PlayerOwner,
    bus_name: String,
    identity: String,
    desktop_entry: Option<String>,
    remote: Arc<dyn RemotePlayer>,
    tx: DispatchSender,
    options: PlayerOptions,
    quirks: PlayerQuirks,

    status: PlaybackState,
    published_status: PlaybackState,
    metadata: TrackMetadata,
    tracker: PositionTracker,
    pending_seek: i64,
    position_supported: bool,
    volume: Option<Volume>,

    can_seek: bool,
    can_pause: bool,
    can_go_next: bool,
    can_go_previous: bool,
    can_raise: bool,
    can_quit: bool,

    playlists: Vec<Playlist>,
    active_playlist: Option<String>,

    cover: CoverArtFetcher,
    cover_path: Option<PathBuf>,
    cover_task: Option<AbortHandle>,
    status_timer: Option<AbortHandle>,
    slider_timer: Option<AbortHandle>,
    tasks: Vec<AbortHandle>,
}

impl Player {
    /// Create a session and start following the remote player
    #[instrument(skip_all, fields(id = %id, owner = %owner, bus_name = %bus_name))]
    pub(crate) fn new(
        id: SessionId,
        owner: PlayerOwner,
        bus_name: &str,
        remote: Arc<dyn RemotePlayer>,
        artwork: Arc<dyn ArtworkSource>,
        tx: DispatchSender,
        options: PlayerOptions,
    ) -> Self {
        debug!("Creating player session");
        let mut player = Self {
            id,
            owner,
            bus_name: bus_name.to_string(),
            identity: identity_from_bus_name(bus_name),
            desktop_entry: None,
            remote,
            tx,
            options,
            quirks: PlayerQuirks::for_bus_name(bus_name),
            status: PlaybackState::Stopped,
            published_status: PlaybackState::Stopped,
            metadata: TrackMetadata::default(),
            tracker: PositionTracker::new(TICK_INTERVAL),
            pending_seek: 0,
            position_supported: true,
            volume: None,
            can_seek: false,
            can_pause: ControlProperty::CanPause.fallback(),
            can_go_next: ControlProperty::CanGoNext.fallback(),
            can_go_previous: ControlProperty::CanGoPrevious.fallback(),
            can_raise: false,
            can_quit: false,
            playlists: Vec::new(),
            active_playlist: None,
            cover: CoverArtFetcher::new(artwork),
            cover_path: None,
            cover_task: None,
            status_timer: None,
            slider_timer: None,
            tasks: Vec::new(),
        };
        player.init();
        player
    }

    fn init(&mut self) {
        self.listen();

        self.spawn_query(|remote| async move {
            Some(PlayerInput::Volume(remote.volume().await.ok()))
        });

        let tx = self.tx.clone();
        let id = self.id;
        self.spawn_task(|remote| async move {
            let send = |input| tx.send(Dispatch::Session(id, input)).is_ok();
            if let Ok(identity) = remote.identity().await {
                if !identity.is_empty() && !send(PlayerInput::Identity(identity)) {
                    return;
                }
            }
            let entry = remote.desktop_entry().await.ok().filter(|e| !e.is_empty());
            let can_raise = remote.can_raise().await.unwrap_or(false);
            let can_quit = remote.can_quit().await.unwrap_or(false);
            send(PlayerInput::DesktopEntry(entry));
            send(PlayerInput::Capabilities { can_raise, can_quit });
        });

        // Metadata, position and status are read in that order so that the
        // track reset triggered by the first metadata never clobbers the
        // position read after it.
        let tx = self.tx.clone();
        self.spawn_task(|remote| async move {
            let send = |input| tx.send(Dispatch::Session(id, input)).is_ok();
            if let Ok(metadata) = remote.metadata().await {
                if !send(PlayerInput::Metadata(metadata)) {
                    return;
                }
            }
            send(PlayerInput::Position(remote.position().await.ok()));
            if let Ok(status) = remote.playback_status().await {
                send(PlayerInput::Status(PlaybackState::from(status.as_str())));
            }
        });

        if self.options.show_playlists {
            self.fetch_playlists();
        }
        self.update_sliders();
    }

    /// Forward remote signals into the dispatcher
    fn listen(&mut self) {
        let tx = self.tx.clone();
        let id = self.id;
        let bus_name = self.bus_name.clone();
        self.spawn_task(|remote| async move {
            use futures::StreamExt;

            let mut signals = match remote.signals().await {
                Ok(signals) => signals,
                Err(e) => {
                    warn!(%bus_name, "Failed to subscribe to player signals: {e}");
                    return;
                }
            };
            while let Some(signal) = signals.next().await {
                if tx
                    .send(Dispatch::Session(id, PlayerInput::Signal(signal)))
                    .is_err()
                {
                    break;
                }
            }
        });
    }

    /// Session id
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Registry key
    pub fn owner(&self) -> &PlayerOwner {
        &self.owner
    }

    /// Bus name the player is reached under
    pub fn bus_name(&self) -> &str {
        &self.bus_name
    }

    /// Status as seen by collaborators
    pub fn published_status(&self) -> PlaybackState {
        self.published_status
    }

    /// Status as last reported by the remote
    pub fn status(&self) -> PlaybackState {
        self.status
    }

    /// Current track
    pub fn metadata(&self) -> &TrackMetadata {
        &self.metadata
    }

    /// Position estimate in microseconds
    pub fn position_us(&self) -> i64 {
        self.tracker.position_us()
    }

    /// Whether the position ticker is running
    pub fn is_ticking(&self) -> bool {
        self.tracker.is_running()
    }

    /// Seek value sent but not yet confirmed by a `Seeked` signal
    pub fn pending_seek(&self) -> i64 {
        self.pending_seek
    }

    /// Resolved artwork file
    pub fn cover_path(&self) -> Option<&PathBuf> {
        self.cover_path.as_ref()
    }

    pub(crate) fn set_owner(&mut self, owner: PlayerOwner) {
        self.owner = owner;
    }

    pub(crate) fn set_bus_name(&mut self, bus_name: &str) {
        self.bus_name = bus_name.to_string();
        self.quirks = PlayerQuirks::for_bus_name(bus_name);
    }

    /// Apply the result of remote work or a timer
    pub(crate) fn handle(&mut self, input: PlayerInput) -> PlayerChanges {
        match input {
            PlayerInput::Signal(signal) => self.handle_signal(signal),
            PlayerInput::Identity(identity) => {
                self.identity = identity;
                PlayerChanges::default()
            }
            PlayerInput::DesktopEntry(entry) => {
                self.desktop_entry = entry;
                PlayerChanges::default()
            }
            PlayerInput::Capabilities {
                can_raise,
                can_quit,
            } => {
                self.can_raise = can_raise;
                self.can_quit = can_quit;
                PlayerChanges::default()
            }
            PlayerInput::Status(status) => self.apply_status(status),
            PlayerInput::Metadata(metadata) => self.apply_metadata(&metadata),
            PlayerInput::Position(position) => self.apply_position(position),
            PlayerInput::Volume(volume) => {
                self.volume = volume.map(Volume::new);
                PlayerChanges::default()
            }
            PlayerInput::Controls {
                can_pause,
                can_go_next,
                can_go_previous,
            } => {
                self.can_pause = can_pause;
                self.can_go_next = can_go_next;
                self.can_go_previous = can_go_previous;
                PlayerChanges::default()
            }
            PlayerInput::CanSeek(can_seek) => {
                self.can_seek =
                    can_seek && self.position_supported && self.tracker.length_us() > 0;
                PlayerChanges::default()
            }
            PlayerInput::Playlists(playlists) => {
                self.playlists = playlists
                    .into_iter()
                    .filter(|playlist| !playlist.id.contains("Video"))
                    .collect();
                PlayerChanges::default()
            }
            PlayerInput::ActivePlaylist(playlist) => {
                self.active_playlist = playlist.map(|playlist| playlist.id);
                PlayerChanges::default()
            }
            PlayerInput::Tick(generation) => PlayerChanges {
                position: self.tracker.tick(generation),
                ..PlayerChanges::default()
            },
            PlayerInput::PublishStatus => {
                self.status_timer = None;
                self.refresh_status()
            }
            PlayerInput::RefreshSliders => {
                self.slider_timer = None;
                self.update_sliders();
                PlayerChanges::default()
            }
            PlayerInput::Cover { uri, path } => self.apply_cover(&uri, path),
        }
    }

    fn handle_signal(&mut self, signal: RemoteSignal) -> PlayerChanges {
        match signal {
            RemoteSignal::PlaybackStatus(status) => {
                self.apply_status(PlaybackState::from(status.as_str()))
            }
            RemoteSignal::Metadata(metadata) => self.apply_metadata(&metadata),
            RemoteSignal::Volume(volume) => self.handle(PlayerInput::Volume(Some(volume))),
            RemoteSignal::ActivePlaylist(playlist) => {
                self.handle(PlayerInput::ActivePlaylist(playlist))
            }
            RemoteSignal::ControlsChanged => {
                self.update_controls();
                self.update_sliders();
                PlayerChanges::default()
            }
            RemoteSignal::Identity(identity) if !identity.is_empty() => {
                self.handle(PlayerInput::Identity(identity))
            }
            RemoteSignal::Identity(_) => PlayerChanges::default(),
            RemoteSignal::Seeked(position) => self.apply_seek(position),
        }
    }

    fn apply_status(&mut self, status: PlaybackState) -> PlayerChanges {
        if status == self.status {
            return PlayerChanges::default();
        }
        debug!(owner = %self.owner, %status, "Playback status changed");
        self.status = status;

        match status {
            PlaybackState::Playing => {
                let tx = self.tx.clone();
                let id = self.id;
                self.tracker.start(move |generation| {
                    let _ = tx.send(Dispatch::Session(id, PlayerInput::Tick(generation)));
                });
            }
            PlaybackState::Paused => self.tracker.pause(),
            PlaybackState::Stopped => self.tracker.stop(),
        }

        let mut changes = PlayerChanges {
            position: true,
            ..PlayerChanges::default()
        };
        match self.quirks.status_delay() {
            Some(delay) => {
                let timer = self.schedule(delay, PlayerInput::PublishStatus);
                replace_task(&mut self.status_timer, timer);
            }
            None => changes.merge(self.refresh_status()),
        }
        changes
    }

    fn refresh_status(&mut self) -> PlayerChanges {
        self.update_sliders();
        self.update_controls();
        let changed = self.published_status != self.status;
        self.published_status = self.status;
        PlayerChanges {
            status: changed,
            ..PlayerChanges::default()
        }
    }

    fn apply_metadata(&mut self, metadata: &MetadataMap) -> PlayerChanges {
        let Some(mut track) = TrackMetadata::from_map(metadata) else {
            debug!(owner = %self.owner, "Ignoring near-empty metadata");
            return PlayerChanges::default();
        };
        if !self.options.show_rating {
            track.rating = None;
        }

        let mut changes = PlayerChanges::default();
        if track.is_new_track(self.metadata.track_id.as_deref()) {
            self.tracker.reset_track(track.length_us);
            match self.quirks.slider_delay() {
                Some(delay) => {
                    let timer = self.schedule(delay, PlayerInput::RefreshSliders);
                    replace_task(&mut self.slider_timer, timer);
                }
                None => self.update_sliders(),
            }
            self.update_controls();
            changes.position = true;
        }

        if track.track_id.is_none() {
            track.track_id = self.metadata.track_id.clone();
        }
        if track.art_url != self.metadata.art_url {
            changes.merge(self.request_cover(track.art_url.clone()));
        }

        changes.metadata = track != self.metadata;
        self.metadata = track;
        changes
    }

    fn apply_position(&mut self, position: Option<i64>) -> PlayerChanges {
        match position {
            Some(position) => {
                self.position_supported = true;
                self.tracker.set_position(position);
            }
            None => {
                self.position_supported = false;
                self.can_seek = false;
            }
        }
        PlayerChanges {
            position: true,
            ..PlayerChanges::default()
        }
    }

    fn apply_seek(&mut self, position: i64) -> PlayerChanges {
        let resolved = if position > 0 {
            position
        } else if self.pending_seek > 0 {
            // Some players always report 0 after a seek; trust what we asked for.
            self.pending_seek
        } else {
            position
        };
        self.pending_seek = 0;
        self.tracker.set_position(resolved);
        PlayerChanges {
            position: true,
            ..PlayerChanges::default()
        }
    }

    fn request_cover(&mut self, reference: Option<String>) -> PlayerChanges {
        if let Some(task) = self.cover_task.take() {
            task.abort();
        }

        match (self.cover.fetch(reference.as_deref()), reference) {
            (CoverFetch::Ready(path), _) => self.set_cover(path),
            (CoverFetch::Pending(download), Some(uri)) => {
                let tx = self.tx.clone();
                let id = self.id;
                let handle = tokio::spawn(async move {
                    let path = download.await;
                    let _ = tx.send(Dispatch::Session(id, PlayerInput::Cover { uri, path }));
                });
                self.cover_task = Some(handle.abort_handle());
                self.set_cover(None)
            }
            (CoverFetch::Pending(_), None) => self.set_cover(None),
        }
    }

    fn apply_cover(&mut self, uri: &str, path: Option<PathBuf>) -> PlayerChanges {
        if self.metadata.art_url.as_deref() != Some(uri) {
            return PlayerChanges::default();
        }
        self.cover_task = None;
        self.set_cover(path)
    }

    fn set_cover(&mut self, path: Option<PathBuf>) -> PlayerChanges {
        let changed = self.cover_path != path;
        self.cover_path = path;
        PlayerChanges {
            cover: changed,
            ..PlayerChanges::default()
        }
    }

    fn update_sliders(&mut self) {
        self.spawn_query(|remote| async move {
            let can_seek = read_control(&*remote, ControlProperty::CanSeek).await;
            Some(PlayerInput::CanSeek(can_seek))
        });
    }

    fn update_controls(&mut self) {
        self.spawn_query(|remote| async move {
            let can_pause = read_control(&*remote, ControlProperty::CanPause).await;
            let can_go_next = read_control(&*remote, ControlProperty::CanGoNext).await;
            let can_go_previous = read_control(&*remote, ControlProperty::CanGoPrevious).await;
            Some(PlayerInput::Controls {
                can_pause,
                can_go_next,
                can_go_previous,
            })
        });
    }

    fn fetch_playlists(&mut self) {
        self.spawn_query(|remote| async move {
            match remote
                .get_playlists(0, PLAYLIST_PAGE, PLAYLIST_ORDER, false)
                .await
            {
                Ok(playlists) => Some(PlayerInput::Playlists(playlists)),
                Err(e) => {
                    debug!("Playlists unavailable: {e}");
                    None
                }
            }
        });
        self.spawn_query(|remote| async move {
            remote
                .active_playlist()
                .await
                .ok()
                .map(PlayerInput::ActivePlaylist)
        });
    }

    /// Execute a collaborator command
    pub(crate) fn perform(&mut self, action: PlayerAction, launcher: &Arc<dyn AppLauncher>) {
        debug!(owner = %self.owner, ?action, "Player action");
        match action {
            PlayerAction::PlayPause if self.can_pause => self.toggle(),
            PlayerAction::PlayPause | PlayerAction::Play => {
                self.command("Play", |remote| async move { remote.play().await });
            }
            PlayerAction::Pause => {
                self.command("Pause", |remote| async move { remote.pause().await });
            }
            PlayerAction::Stop => {
                self.command("Stop", |remote| async move { remote.stop().await });
            }
            PlayerAction::Next => {
                self.command("Next", |remote| async move { remote.next().await });
            }
            PlayerAction::Previous => {
                self.command("Previous", |remote| async move { remote.previous().await });
            }
            PlayerAction::SetVolume(volume) => {
                let volume = Volume::new(volume).fraction();
                self.command("SetVolume", move |remote| async move {
                    remote.set_volume(volume).await
                });
            }
            PlayerAction::SeekTo(fraction) => self.seek_to(fraction),
            PlayerAction::ActivatePlaylist(playlist_id) => {
                self.command("ActivatePlaylist", move |remote| async move {
                    remote.activate_playlist(&playlist_id).await
                });
            }
            PlayerAction::RaiseOrLaunch => self.raise_or_launch(launcher),
            PlayerAction::Quit if self.can_quit => {
                self.command("Quit", |remote| async move { remote.quit().await });
            }
            PlayerAction::Quit => debug!(owner = %self.owner, "Player cannot quit"),
        }
    }

    /// Send `PlayPause` regardless of the pause capability
    pub(crate) fn toggle(&mut self) {
        self.command("PlayPause", |remote| async move { remote.play_pause().await });
    }

    /// Seek to a fraction of the track, remembering the target for
    /// players that report 0 afterwards
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn seek_to(&mut self, fraction: f64) {
        let length = self.tracker.length_us();
        if length <= 0 || !fraction.is_finite() {
            return;
        }
        let target = (fraction.clamp(0.0, 1.0) * length as f64).round() as i64;
        self.pending_seek = target;

        let track_id = self
            .metadata
            .track_id
            .clone()
            .unwrap_or_else(|| "/".to_string());
        self.command("SetPosition", move |remote| async move {
            remote.set_position(&track_id, target).await
        });
    }

    fn raise_or_launch(&mut self, launcher: &Arc<dyn AppLauncher>) {
        if self.can_raise {
            self.command("Raise", |remote| async move { remote.raise().await });
            return;
        }
        let Some(entry) = self.desktop_entry.clone() else {
            debug!(owner = %self.owner, "Player can neither be raised nor launched");
            return;
        };
        let launcher = Arc::clone(launcher);
        self.command("Launch", move |_| async move { launcher.launch(&entry).await });
    }

    /// Build the display view
    pub fn snapshot(&self) -> SessionSnapshot {
        let active = self.published_status != PlaybackState::Stopped;
        let position = self.tracker.snapshot();
        SessionSnapshot {
            id: self.id,
            owner: self.owner.clone(),
            bus_name: self.bus_name.clone(),
            identity: self.identity.clone(),
            desktop_entry: self.desktop_entry.clone(),
            status: self.published_status,
            title: self.metadata.display_title().to_string(),
            artist: self.metadata.display_artist(),
            album: self.metadata.display_album().to_string(),
            track: self.metadata.clone(),
            cover_path: self.cover_path.clone(),
            show_position: active && self.can_seek && self.options.show_position && position.visible,
            position,
            volume: self.volume,
            show_volume: active && self.options.show_volume && self.volume.is_some(),
            can_seek: self.can_seek,
            can_pause: self.can_pause,
            can_go_next: self.can_go_next,
            can_go_previous: self.can_go_previous,
            can_raise: self.can_raise,
            can_quit: self.can_quit,
            playlists: self.playlists.clone(),
            active_playlist: self.active_playlist.clone(),
        }
    }

    /// Cancel every timer, query and download belonging to this session
    pub(crate) fn destroy(&mut self) {
        self.tracker.pause();
        self.cover.cancel();
        for task in self
            .tasks
            .drain(..)
            .chain(self.cover_task.take())
            .chain(self.status_timer.take())
            .chain(self.slider_timer.take())
        {
            task.abort();
        }
    }

    fn schedule(&self, delay: Duration, input: PlayerInput) -> AbortHandle {
        let tx = self.tx.clone();
        let id = self.id;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Dispatch::Session(id, input));
        })
        .abort_handle()
    }

    fn spawn_task<F, Fut>(&mut self, task: F)
    where
        F: FnOnce(Arc<dyn RemotePlayer>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task(Arc::clone(&self.remote)));
        self.tasks.retain(|task| !task.is_finished());
        self.tasks.push(handle.abort_handle());
    }

    fn spawn_query<F, Fut>(&mut self, query: F)
    where
        F: FnOnce(Arc<dyn RemotePlayer>) -> Fut,
        Fut: Future<Output = Option<PlayerInput>> + Send + 'static,
    {
        let tx = self.tx.clone();
        let id = self.id;
        self.spawn_task(move |remote| {
            let query = query(remote);
            async move {
                if let Some(input) = query.await {
                    let _ = tx.send(Dispatch::Session(id, input));
                }
            }
        });
    }

    fn command<F, Fut>(&mut self, name: &'static str, call: F)
    where
        F: FnOnce(Arc<dyn RemotePlayer>) -> Fut,
        Fut: Future<Output = Result<(), MediaError>> + Send + 'static,
    {
        let bus_name = self.bus_name.clone();
        self.spawn_task(move |remote| {
            let call = call(remote);
            async move {
                if let Err(e) = call.await {
                    warn!(%bus_name, command = name, "Player command failed: {e}");
                }
            }
        });
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.destroy();
    }
}

async fn read_control(remote: &dyn RemotePlayer, property: ControlProperty) -> bool {
    property.resolve(remote.control(property).await)
}

fn replace_task(slot: &mut Option<AbortHandle>, task: AbortHandle) {
    if let Some(previous) = slot.replace(task) {
        previous.abort();
    }
}
