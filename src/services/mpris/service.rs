use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{info, instrument};

use crate::config::MediaConfig;
use crate::services::common::Property;

use super::{
    MediaError, PlayerEvent, PlayerOwner,
    cover::HttpArtworkSource,
    dbus::DbusMediaBus,
    default_player::{DefaultPlayerInfo, XdgLauncher},
    dispatch::{ControlRequest, Dispatch, DispatchSender, Dispatcher, Outputs},
    player::{PlayerAction, PlayerOptions, SessionSnapshot},
    registry::{PlayerRegistry, RegistryConfig},
    remote::{AppLauncher, ArtworkSource, MediaBus},
};

/// Buffered events per subscriber before it starts lagging
const EVENT_CAPACITY: usize = 256;

/// Configuration for the MPRIS service
#[derive(Debug, Clone)]
pub struct MprisConfig {
    /// Patterns to ignore when discovering players
    pub ignored_players: Vec<String>,
    /// Features every session tracks
    pub options: PlayerOptions,
    /// Substitute the default audio application while no player runs
    pub run_default: bool,
    /// Desktop id overriding the desktop's default audio application
    pub default_player: Option<String>,
    /// How long an artwork download may take
    pub artwork_timeout: Duration,
}

impl Default for MprisConfig {
    fn default() -> Self {
        Self {
            ignored_players: Vec::new(),
            options: PlayerOptions::default(),
            run_default: false,
            default_player: None,
            artwork_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&MediaConfig> for MprisConfig {
    fn from(media: &MediaConfig) -> Self {
        Self {
            ignored_players: media.ignored_players.clone(),
            options: PlayerOptions {
                show_volume: media.show_volume,
                show_position: media.show_position,
                show_playlists: media.show_playlists,
                show_rating: media.show_rating,
            },
            run_default: media.run_default,
            default_player: (!media.default_player.is_empty())
                .then(|| media.default_player.clone()),
            artwork_timeout: Duration::from_millis(media.artwork_timeout_ms),
        }
    }
}

impl From<&MprisConfig> for RegistryConfig {
    fn from(config: &MprisConfig) -> Self {
        Self {
            ignored_players: config.ignored_players.clone(),
            options: config.options,
            run_default: config.run_default,
            default_player: config.default_player.clone(),
        }
    }
}

/// MPRIS service with reactive property-based architecture.
///
/// Discovers players on the session bus, tracks each one, and publishes the
/// player list plus the single selected "current" player.
#[derive(Clone)]
pub struct MprisService {
    tx: DispatchSender,
    selected: Property<Option<SessionSnapshot>>,
    player_list: Property<Vec<SessionSnapshot>>,
    default_player: Property<Option<DefaultPlayerInfo>>,
    events: broadcast::Sender<PlayerEvent>,
}

impl MprisService {
    /// Start the MPRIS service on the session bus.
    ///
    /// # Errors
    ///
    /// Returns `MediaError::InitializationFailed` if the D-Bus connection or
    /// the HTTP client cannot be set up
    #[instrument(skip(config))]
    pub async fn start(config: MprisConfig) -> Result<Self, MediaError> {
        info!("Starting MPRIS service");
        let bus = DbusMediaBus::session().await?;
        let artwork = HttpArtworkSource::new(config.artwork_timeout)?;
        Ok(Self::start_with(
            Arc::new(bus),
            Arc::new(artwork),
            Arc::new(XdgLauncher),
            &config,
        ))
    }

    /// Start the service over explicit collaborators.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_with(
        bus: Arc<dyn MediaBus>,
        artwork: Arc<dyn ArtworkSource>,
        launcher: Arc<dyn AppLauncher>,
        config: &MprisConfig,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let outputs = Outputs::new(EVENT_CAPACITY);
        let registry = PlayerRegistry::new(bus, artwork, tx.clone(), RegistryConfig::from(config));

        let mut dispatcher = Dispatcher::new(registry, launcher, outputs.clone());
        dispatcher.start();
        tokio::spawn(dispatcher.run(rx));

        Self {
            tx,
            selected: outputs.selected,
            player_list: outputs.players,
            default_player: outputs.default_player,
            events: outputs.events,
        }
    }

    /// Get the current list of players in creation order.
    pub fn players(&self) -> Vec<SessionSnapshot> {
        self.player_list.get()
    }

    /// Get a stream that emits the player list whenever any player changes.
    pub fn players_monitored(&self) -> impl Stream<Item = Vec<SessionSnapshot>> + Send {
        self.player_list.watch()
    }

    /// Get the player currently surfaced as "the" current player.
    pub fn selected(&self) -> Option<SessionSnapshot> {
        self.selected.get()
    }

    /// Get a stream that emits whenever the selected player or its state
    /// changes.
    pub fn selected_monitored(&self) -> impl Stream<Item = Option<SessionSnapshot>> + Send {
        self.selected.watch()
    }

    /// Get the synthetic default player, shown only while no player runs.
    pub fn default_player(&self) -> Option<DefaultPlayerInfo> {
        self.default_player.get()
    }

    /// Get a stream that emits whenever the default player appears or goes.
    pub fn default_player_monitored(
        &self,
    ) -> impl Stream<Item = Option<DefaultPlayerInfo>> + Send {
        self.default_player.watch()
    }

    /// Subscribe to fine-grained player events.
    pub fn events(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    /// Skip the selected player to its next track, if it is playing.
    ///
    /// # Errors
    ///
    /// Returns `MediaError::ControlFailed` if the service has shut down
    pub fn next(&self) -> Result<(), MediaError> {
        self.send(ControlRequest::Next)
    }

    /// Return the selected player to its previous track, if it is playing.
    ///
    /// # Errors
    ///
    /// Returns `MediaError::ControlFailed` if the service has shut down
    pub fn previous(&self) -> Result<(), MediaError> {
        self.send(ControlRequest::Previous)
    }

    /// Toggle the selected player, if it is playing or paused.
    ///
    /// # Errors
    ///
    /// Returns `MediaError::ControlFailed` if the service has shut down
    pub fn play_pause(&self) -> Result<(), MediaError> {
        self.send(ControlRequest::PlayPause)
    }

    /// Send a command to a specific player.
    ///
    /// # Errors
    ///
    /// Returns `MediaError::PlayerNotFound` if no player has that owner.
    /// Returns `MediaError::ControlFailed` if the service has shut down
    pub fn control(&self, owner: &PlayerOwner, action: PlayerAction) -> Result<(), MediaError> {
        let known = self
            .player_list
            .get()
            .iter()
            .any(|snapshot| &snapshot.owner == owner);
        if !known {
            return Err(MediaError::PlayerNotFound(owner.clone()));
        }
        self.send(ControlRequest::Player {
            owner: owner.clone(),
            action,
        })
    }

    /// Launch the application behind the default player.
    ///
    /// # Errors
    ///
    /// Returns `MediaError::ControlFailed` if the service has shut down
    pub fn launch_default(&self) -> Result<(), MediaError> {
        self.send(ControlRequest::LaunchDefault)
    }

    /// Tear down every session and stop discovery.
    ///
    /// Safe to call more than once.
    pub async fn shutdown(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Dispatch::Shutdown(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    fn send(&self, request: ControlRequest) -> Result<(), MediaError> {
        self.tx
            .send(Dispatch::Control(request))
            .map_err(|_| MediaError::ControlFailed("MPRIS service has shut down".to_string()))
    }
}
