use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc::{UnboundedSender, unbounded};
use futures::stream::BoxStream;
use tokio::sync::{Notify, mpsc};
use tokio::time::{sleep, timeout};

use super::{
    AppLauncher, ArtworkSource, MediaBus, MediaError, MetadataMap, MetadataValue, MprisConfig,
    MprisService, OwnerChange, PlaybackState, PlayerAction, PlayerEvent, PlayerOwner, Playlist,
    RemotePlayer, RemoteSignal, SessionId,
    dispatch::{ControlRequest, Dispatch, DispatchReceiver, Dispatcher, Outputs},
    player::{Player, PlayerInput},
    registry::{PlayerRegistry, RegistryConfig},
};

const PUMP_IDLE: Duration = Duration::from_millis(50);
const BANSHEE: &str = "org.mpris.MediaPlayer2.banshee";
const VLC: &str = "org.mpris.MediaPlayer2.vlc";

#[derive(Clone)]
struct RemoteState {
    status: String,
    metadata: MetadataMap,
    position: Option<i64>,
    volume: Option<f64>,
    can_pause: bool,
    can_seek: bool,
    can_raise: bool,
    can_quit: bool,
    desktop_entry: Option<String>,
}

impl Default for RemoteState {
    fn default() -> Self {
        Self {
            status: "Stopped".to_string(),
            metadata: MetadataMap::new(),
            position: Some(0),
            volume: Some(0.5),
            can_pause: true,
            can_seek: true,
            can_raise: false,
            can_quit: false,
            desktop_entry: None,
        }
    }
}

#[derive(Default)]
struct MockPlayer {
    state: Mutex<RemoteState>,
    calls: Mutex<Vec<String>>,
    listeners: Mutex<Vec<UnboundedSender<RemoteSignal>>>,
}

impl MockPlayer {
    fn new(status: &str, metadata: MetadataMap, position: i64) -> Arc<Self> {
        let player = Self::default();
        {
            let mut state = player.state.lock().unwrap();
            state.status = status.to_string();
            state.metadata = metadata;
            state.position = Some(position);
        }
        Arc::new(player)
    }

    fn stopped() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn update(&self, change: impl FnOnce(&mut RemoteState)) {
        change(&mut self.state.lock().unwrap());
    }

    fn emit(&self, signal: RemoteSignal) {
        for listener in self.listeners.lock().unwrap().iter() {
            let _ = listener.unbounded_send(signal.clone());
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) -> Result<(), MediaError> {
        self.calls.lock().unwrap().push(call.into());
        Ok(())
    }

    fn read<T>(&self, field: impl FnOnce(&RemoteState) -> T) -> T {
        field(&self.state.lock().unwrap())
    }
}

fn unavailable(property: &'static str) -> MediaError {
    MediaError::PropertyUnavailable {
        property,
        reason: "not exposed".to_string(),
    }
}

#[async_trait]
impl RemotePlayer for MockPlayer {
    async fn raise(&self) -> Result<(), MediaError> {
        self.record("Raise")
    }
    async fn quit(&self) -> Result<(), MediaError> {
        self.record("Quit")
    }
    async fn next(&self) -> Result<(), MediaError> {
        self.record("Next")
    }
    async fn previous(&self) -> Result<(), MediaError> {
        self.record("Previous")
    }
    async fn pause(&self) -> Result<(), MediaError> {
        self.record("Pause")
    }
    async fn play_pause(&self) -> Result<(), MediaError> {
        self.record("PlayPause")
    }
    async fn stop(&self) -> Result<(), MediaError> {
        self.record("Stop")
    }
    async fn play(&self) -> Result<(), MediaError> {
        self.record("Play")
    }
    async fn set_position(&self, track_id: &str, position_us: i64) -> Result<(), MediaError> {
        self.record(format!("SetPosition {track_id} {position_us}"))
    }
    async fn get_playlists(
        &self,
        _index: u32,
        _count: u32,
        _order: &str,
        _reverse: bool,
    ) -> Result<Vec<Playlist>, MediaError> {
        Ok(vec![
            Playlist {
                id: "/pl/Music".to_string(),
                name: "Music".to_string(),
            },
            Playlist {
                id: "/pl/Video".to_string(),
                name: "Clips".to_string(),
            },
        ])
    }
    async fn activate_playlist(&self, playlist_id: &str) -> Result<(), MediaError> {
        self.record(format!("ActivatePlaylist {playlist_id}"))
    }
    async fn identity(&self) -> Result<String, MediaError> {
        Err(unavailable("Identity"))
    }
    async fn desktop_entry(&self) -> Result<String, MediaError> {
        self.read(|s| s.desktop_entry.clone())
            .ok_or_else(|| unavailable("DesktopEntry"))
    }
    async fn can_raise(&self) -> Result<bool, MediaError> {
        Ok(self.read(|s| s.can_raise))
    }
    async fn can_quit(&self) -> Result<bool, MediaError> {
        Ok(self.read(|s| s.can_quit))
    }
    async fn can_seek(&self) -> Result<bool, MediaError> {
        Ok(self.read(|s| s.can_seek))
    }
    async fn can_pause(&self) -> Result<bool, MediaError> {
        Ok(self.read(|s| s.can_pause))
    }
    async fn can_go_next(&self) -> Result<bool, MediaError> {
        Ok(true)
    }
    async fn can_go_previous(&self) -> Result<bool, MediaError> {
        Ok(true)
    }
    async fn volume(&self) -> Result<f64, MediaError> {
        self.read(|s| s.volume).ok_or_else(|| unavailable("Volume"))
    }
    async fn set_volume(&self, volume: f64) -> Result<(), MediaError> {
        self.record(format!("SetVolume {volume}"))
    }
    async fn playback_status(&self) -> Result<String, MediaError> {
        Ok(self.read(|s| s.status.clone()))
    }
    async fn metadata(&self) -> Result<MetadataMap, MediaError> {
        Ok(self.read(|s| s.metadata.clone()))
    }
    async fn position(&self) -> Result<i64, MediaError> {
        self.read(|s| s.position).ok_or_else(|| unavailable("Position"))
    }
    async fn active_playlist(&self) -> Result<Option<Playlist>, MediaError> {
        Ok(None)
    }
    async fn signals(&self) -> Result<BoxStream<'static, RemoteSignal>, MediaError> {
        let (tx, rx) = unbounded();
        self.listeners.lock().unwrap().push(tx);
        Ok(rx.boxed())
    }
}

#[derive(Default)]
struct MockBus {
    names: Mutex<Vec<(String, String)>>,
    remotes: Mutex<HashMap<String, Arc<MockPlayer>>>,
    changes: Mutex<Option<UnboundedSender<OwnerChange>>>,
}

impl MockBus {
    /// A player already on the bus when discovery starts
    fn register(&self, name: &str, owner: &str, remote: Arc<MockPlayer>) {
        self.names
            .lock()
            .unwrap()
            .push((name.to_string(), owner.to_string()));
        self.install(name, remote);
    }

    /// The remote answering under `name` once it appears
    fn install(&self, name: &str, remote: Arc<MockPlayer>) {
        self.remotes.lock().unwrap().insert(name.to_string(), remote);
    }

    fn remote(&self, name: &str) -> Arc<MockPlayer> {
        Arc::clone(
            self.remotes
                .lock()
                .unwrap()
                .entry(name.to_string())
                .or_insert_with(MockPlayer::stopped),
        )
    }

    fn owner_change(&self, name: &str, old_owner: &str, new_owner: &str) {
        let changes = self.changes.lock().unwrap();
        let tx = changes.as_ref().expect("owner changes subscribed");
        tx.unbounded_send(OwnerChange::from_raw(name, old_owner, new_owner))
            .unwrap();
    }
}

#[async_trait]
impl MediaBus for MockBus {
    async fn list_names(&self) -> Result<Vec<String>, MediaError> {
        let mut names: Vec<String> = self
            .names
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect();
        names.push("org.freedesktop.Notifications".to_string());
        Ok(names)
    }

    async fn name_owner(&self, name: &str) -> Result<String, MediaError> {
        self.names
            .lock()
            .unwrap()
            .iter()
            .find(|(known, owner)| known == name && !owner.is_empty())
            .map(|(_, owner)| owner.clone())
            .ok_or_else(|| MediaError::ControlFailed(format!("{name} has no owner")))
    }

    async fn owner_changes(&self) -> Result<BoxStream<'static, OwnerChange>, MediaError> {
        let (tx, rx) = unbounded();
        *self.changes.lock().unwrap() = Some(tx);
        Ok(rx.boxed())
    }

    fn player(&self, bus_name: &str) -> Arc<dyn RemotePlayer> {
        self.remote(bus_name)
    }
}

#[derive(Default)]
struct MockArtwork {
    reads: AtomicUsize,
    gated: bool,
    gate: Notify,
}

impl MockArtwork {
    fn gated() -> Self {
        Self {
            gated: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl ArtworkSource for MockArtwork {
    async fn read(&self, _uri: &str) -> Result<Vec<u8>, MediaError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.gated {
            self.gate.notified().await;
        }
        Ok(b"cover-bytes".to_vec())
    }
}

#[derive(Default)]
struct MockLauncher {
    default_app: Option<String>,
    launched: Mutex<Vec<String>>,
}

#[async_trait]
impl AppLauncher for MockLauncher {
    async fn default_audio_app(&self) -> Option<String> {
        self.default_app.clone()
    }

    async fn launch(&self, desktop_id: &str) -> Result<(), MediaError> {
        self.launched.lock().unwrap().push(desktop_id.to_string());
        Ok(())
    }
}

/// Drives a dispatcher by hand so tests observe every state in between
struct Harness {
    dispatcher: Dispatcher,
    rx: DispatchReceiver,
    outputs: Outputs,
    bus: Arc<MockBus>,
    artwork: Arc<MockArtwork>,
    launcher: Arc<MockLauncher>,
}

impl Harness {
    fn new(bus: Arc<MockBus>) -> Self {
        Self::with_parts(
            bus,
            MockArtwork::default(),
            MockLauncher::default(),
            RegistryConfig::default(),
        )
    }

    fn with_parts(
        bus: Arc<MockBus>,
        artwork: MockArtwork,
        launcher: MockLauncher,
        config: RegistryConfig,
    ) -> Self {
        let artwork = Arc::new(artwork);
        let launcher = Arc::new(launcher);
        let (tx, rx) = mpsc::unbounded_channel();
        let registry = PlayerRegistry::new(
            Arc::clone(&bus) as Arc<dyn MediaBus>,
            Arc::clone(&artwork) as Arc<dyn ArtworkSource>,
            tx,
            config,
        );
        let outputs = Outputs::new(64);
        let dispatcher = Dispatcher::new(
            registry,
            Arc::clone(&launcher) as Arc<dyn AppLauncher>,
            outputs.clone(),
        );
        Self {
            dispatcher,
            rx,
            outputs,
            bus,
            artwork,
            launcher,
        }
    }

    async fn start(&mut self) {
        self.dispatcher.start();
        self.pump().await;
    }

    /// Handle messages until the channel has been quiet for a moment
    async fn pump(&mut self) {
        while let Ok(Some(message)) = timeout(PUMP_IDLE, self.rx.recv()).await {
            let _ = self.dispatcher.handle(message);
        }
    }

    async fn pump_until(&mut self, done: impl Fn(&Self) -> bool) -> bool {
        for _ in 0..40 {
            if done(self) {
                return true;
            }
            self.pump().await;
        }
        done(self)
    }

    async fn advance(&mut self, duration: Duration) {
        sleep(duration).await;
        self.pump().await;
    }

    async fn control(&mut self, request: ControlRequest) {
        let _ = self.dispatcher.handle(Dispatch::Control(request));
        self.pump().await;
    }

    async fn owner_change(&mut self, name: &str, old_owner: &str, new_owner: &str) {
        self.bus.owner_change(name, old_owner, new_owner);
        self.pump().await;
    }

    fn registry(&self) -> &PlayerRegistry {
        self.dispatcher.registry()
    }

    fn player(&self, owner: &str) -> &Player {
        self.registry()
            .get(&PlayerOwner::new(owner))
            .unwrap_or_else(|| panic!("no session for {owner}"))
    }

    fn selected_owner(&self) -> Option<String> {
        self.outputs
            .selected
            .get()
            .map(|snapshot| snapshot.owner.to_string())
    }
}

fn track(track_id: &str, title: &str, length_us: i64) -> MetadataMap {
    HashMap::from([
        (
            "mpris:trackid".to_string(),
            MetadataValue::Text(track_id.to_string()),
        ),
        (
            "xesam:title".to_string(),
            MetadataValue::Text(title.to_string()),
        ),
        (
            "xesam:artist".to_string(),
            MetadataValue::TextList(vec!["Someone".to_string()]),
        ),
        ("mpris:length".to_string(), MetadataValue::Integer(length_us)),
    ])
}

fn with_art(mut metadata: MetadataMap, art_url: &str) -> MetadataMap {
    metadata.insert(
        "mpris:artUrl".to_string(),
        MetadataValue::Text(art_url.to_string()),
    );
    metadata
}

fn drain(events: &mut tokio::sync::broadcast::Receiver<PlayerEvent>) -> Vec<PlayerEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

#[tokio::test(start_paused = true)]
async fn discovers_existing_players_in_listing_order() {
    let bus = Arc::new(MockBus::default());
    bus.register(VLC, ":1.10", MockPlayer::stopped());
    bus.register("org.mpris.MediaPlayer2.rhythmbox", ":1.11", MockPlayer::stopped());
    bus.register("org.mpris.MediaPlayer2.ghost", "", MockPlayer::stopped());

    let mut harness = Harness::new(bus);
    harness.start().await;

    let players = harness.outputs.players.get();
    let names: Vec<&str> = players.iter().map(|p| p.bus_name.as_str()).collect();
    assert_eq!(names, [VLC, "org.mpris.MediaPlayer2.rhythmbox"]);
    assert_eq!(players[0].identity, "Vlc");
    assert!(players[0].id < players[1].id);
}

#[tokio::test(start_paused = true)]
async fn ignored_players_never_become_sessions() {
    let bus = Arc::new(MockBus::default());
    bus.register(
        "org.mpris.MediaPlayer2.chromium.instance4242",
        ":1.20",
        MockPlayer::stopped(),
    );
    bus.register(VLC, ":1.21", MockPlayer::stopped());

    let config = RegistryConfig {
        ignored_players: vec!["chromium".to_string()],
        ..RegistryConfig::default()
    };
    let mut harness =
        Harness::with_parts(bus, MockArtwork::default(), MockLauncher::default(), config);
    harness.start().await;
    harness
        .owner_change("org.mpris.MediaPlayer2.chromium.instance99", "", ":1.30")
        .await;

    assert_eq!(harness.registry().len(), 1);
    assert!(harness.registry().get(&PlayerOwner::new(":1.21")).is_some());
}

#[tokio::test(start_paused = true)]
async fn session_count_follows_owner_changes() {
    let bus = Arc::new(MockBus::default());
    let mut harness = Harness::new(bus);
    harness.start().await;

    let names: Vec<String> = ["amarok", "clementine", "mpd", "spotify"]
        .iter()
        .map(|app| format!("org.mpris.MediaPlayer2.{app}"))
        .collect();
    let mut model: HashMap<&str, String> = HashMap::new();
    let mut vanished: Vec<(&str, String)> = Vec::new();
    let mut next_owner = 100;
    let mut seed: u64 = 0x2545_F491_4F6C_DD1D;
    let mut random = move || {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        seed
    };

    for _ in 0..200 {
        let name = names[(random() % 4) as usize].as_str();
        let other = names[(random() % 4) as usize].as_str();
        match (random() % 8, model.get(name).cloned()) {
            (_, None) => {
                next_owner += 1;
                let owner = format!(":1.{next_owner}");
                harness.owner_change(name, "", &owner).await;
                model.insert(name, owner);
            }
            (0 | 1, Some(old)) => {
                harness.owner_change(name, &old, "").await;
                model.remove(name);
                vanished.push((name, old));
            }
            (2 | 3, Some(old)) => {
                next_owner += 1;
                let owner = format!(":1.{next_owner}");
                harness.owner_change(name, &old, &owner).await;
                model.insert(name, owner);
                vanished.push((name, old));
            }
            // Repeated appearance of a live owner
            (4, Some(owner)) => harness.owner_change(name, "", &owner).await,
            // Disappearance of an owner nobody knows
            (5, Some(_)) => {
                next_owner += 1;
                harness
                    .owner_change(name, &format!(":1.{next_owner}"), "")
                    .await;
            }
            // Replacement naming a different player than the owner's session
            (6, Some(owner)) if other != name => {
                next_owner += 1;
                harness
                    .owner_change(other, &owner, &format!(":1.{next_owner}"))
                    .await;
            }
            // Lookup answer arriving after its owner went away
            (_, Some(_)) => {
                if let Some((gone_name, gone_owner)) = vanished.last() {
                    let _ = harness.dispatcher.handle(Dispatch::NameResolved {
                        name: (*gone_name).to_string(),
                        owner: gone_owner.clone(),
                    });
                }
            }
        }

        assert_eq!(harness.registry().len(), model.len());
        for owner in model.values() {
            assert!(harness.registry().get(&PlayerOwner::new(owner.as_str())).is_some());
        }
    }
}

#[tokio::test(start_paused = true)]
async fn startup_lookup_for_a_released_name_is_dropped() {
    let bus = Arc::new(MockBus::default());
    let mut harness = Harness::new(bus);

    let _ = harness
        .dispatcher
        .handle(Dispatch::OwnerChanged(OwnerChange::from_raw(VLC, ":1.5", "")));
    let _ = harness.dispatcher.handle(Dispatch::NameResolved {
        name: VLC.to_string(),
        owner: ":1.5".to_string(),
    });
    assert!(harness.registry().is_empty());

    let _ = harness.dispatcher.handle(Dispatch::NameResolved {
        name: BANSHEE.to_string(),
        owner: ":1.6".to_string(),
    });
    assert_eq!(harness.registry().len(), 1);

    let _ = harness.dispatcher.handle(Dispatch::DiscoveryComplete);
    let _ = harness.dispatcher.handle(Dispatch::NameResolved {
        name: "org.mpris.MediaPlayer2.mpd".to_string(),
        owner: ":1.7".to_string(),
    });
    assert_eq!(harness.registry().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn owner_lost_during_startup_lookup_leaves_no_session() {
    let bus = Arc::new(MockBus::default());
    bus.register(VLC, ":1.5", MockPlayer::stopped());
    let mut harness = Harness::new(Arc::clone(&bus));

    harness.dispatcher.start();
    tokio::task::yield_now().await;
    bus.owner_change(VLC, ":1.5", "");
    harness.pump().await;

    assert!(harness.registry().is_empty());
    assert!(harness.outputs.players.get().is_empty());
}

#[tokio::test(start_paused = true)]
async fn instance_name_upgrades_the_session_in_place() {
    let bus = Arc::new(MockBus::default());
    bus.install(VLC, MockPlayer::new("Paused", track("/t/1", "Intro", 90_000_000), 5_000_000));
    let mut harness = Harness::new(Arc::clone(&bus));
    harness.start().await;
    let mut events = harness.outputs.events.subscribe();

    harness.owner_change(VLC, "", ":1.5").await;
    let id = harness.player(":1.5").id();

    let instance = "org.mpris.MediaPlayer2.vlc.instance1234";
    harness.owner_change(instance, "", ":1.5").await;

    assert_eq!(harness.registry().len(), 1);
    let player = harness.player(":1.5");
    assert_eq!(player.id(), id);
    assert_eq!(player.bus_name(), instance);
    assert_eq!(player.metadata().title.as_deref(), Some("Intro"));
    assert_eq!(player.position_us(), 5_000_000);
    assert_eq!(player.snapshot().identity, "Vlc");
    assert!(drain(&mut events).contains(&PlayerEvent::BusNameUpgraded {
        owner: PlayerOwner::new(":1.5"),
        bus_name: instance.to_string(),
    }));

    // The master name showing up again never downgrades.
    harness.owner_change(VLC, "", ":1.5").await;
    assert_eq!(harness.player(":1.5").bus_name(), instance);
}

#[tokio::test(start_paused = true)]
async fn same_track_id_keeps_the_position() {
    let bus = Arc::new(MockBus::default());
    let remote = MockPlayer::new("Paused", track("/t/1", "One", 200_000_000), 30_000_000);
    bus.register(VLC, ":1.7", Arc::clone(&remote));
    let mut harness = Harness::new(bus);
    harness.start().await;
    assert_eq!(harness.player(":1.7").position_us(), 30_000_000);

    remote.emit(RemoteSignal::Metadata(track("/t/1", "One (Live)", 200_000_000)));
    harness.pump().await;
    let player = harness.player(":1.7");
    assert_eq!(player.position_us(), 30_000_000);
    assert_eq!(player.metadata().title.as_deref(), Some("One (Live)"));

    let near_empty = HashMap::from([(
        "mpris:trackid".to_string(),
        MetadataValue::Text("/t/x".to_string()),
    )]);
    remote.emit(RemoteSignal::Metadata(near_empty));
    harness.pump().await;
    assert_eq!(
        harness.player(":1.7").metadata().title.as_deref(),
        Some("One (Live)")
    );

    remote.emit(RemoteSignal::Metadata(track("/t/2", "Two", 100_000_000)));
    harness.pump().await;
    let snapshot = harness.player(":1.7").snapshot();
    assert_eq!(snapshot.position.position_us, 0);
    assert_eq!(snapshot.position.length_us, 100_000_000);
    assert_eq!(snapshot.title, "Two");
}

#[tokio::test(start_paused = true)]
async fn seeked_to_zero_trusts_the_requested_position() {
    let bus = Arc::new(MockBus::default());
    let remote = MockPlayer::new("Paused", track("/t/1", "One", 12_300_000), 0);
    bus.register(VLC, ":1.8", Arc::clone(&remote));
    let mut harness = Harness::new(bus);
    harness.start().await;

    harness
        .control(ControlRequest::Player {
            owner: PlayerOwner::new(":1.8"),
            action: PlayerAction::SeekTo(0.1),
        })
        .await;
    assert_eq!(harness.player(":1.8").pending_seek(), 1_230_000);
    assert!(remote.calls().contains(&"SetPosition /t/1 1230000".to_string()));

    remote.emit(RemoteSignal::Seeked(0));
    harness.pump().await;
    assert_eq!(harness.player(":1.8").position_us(), 1_230_000);
    assert_eq!(harness.player(":1.8").pending_seek(), 0);

    remote.emit(RemoteSignal::Seeked(0));
    harness.pump().await;
    assert_eq!(harness.player(":1.8").position_us(), 0);
}

#[tokio::test(start_paused = true)]
async fn playing_player_ticks_and_pausing_freezes_it() {
    let bus = Arc::new(MockBus::default());
    let remote = MockPlayer::new("Playing", track("/t/1", "One", 200_000_000), 10_000_000);
    bus.register(VLC, ":1.9", Arc::clone(&remote));
    let mut harness = Harness::new(bus);
    harness.start().await;
    assert!(harness.player(":1.9").is_ticking());

    harness.advance(Duration::from_millis(3_000)).await;
    let ticked = harness.player(":1.9").position_us();
    assert!(ticked >= 12_000_000, "position {ticked}");

    remote.emit(RemoteSignal::PlaybackStatus("Paused".to_string()));
    harness.pump().await;
    let frozen = harness.player(":1.9").position_us();
    harness.advance(Duration::from_millis(3_000)).await;
    assert!(!harness.player(":1.9").is_ticking());
    assert_eq!(harness.player(":1.9").position_us(), frozen);

    remote.emit(RemoteSignal::PlaybackStatus("Stopped".to_string()));
    harness.pump().await;
    assert_eq!(harness.player(":1.9").position_us(), 0);
}

#[tokio::test(start_paused = true)]
async fn tick_from_before_a_pause_is_ignored_after_resuming() {
    let bus = Arc::new(MockBus::default());
    let remote = MockPlayer::new("Playing", track("/t/1", "One", 200_000_000), 10_000_000);
    bus.register(VLC, ":1.9", Arc::clone(&remote));
    let mut harness = Harness::new(bus);
    harness.start().await;
    let id = harness.player(":1.9").id();

    remote.emit(RemoteSignal::PlaybackStatus("Paused".to_string()));
    harness.pump().await;
    remote.emit(RemoteSignal::PlaybackStatus("Playing".to_string()));
    harness.pump().await;
    assert!(harness.player(":1.9").is_ticking());
    let resumed = harness.player(":1.9").position_us();

    let _ = harness.dispatcher.handle(Dispatch::Session(id, PlayerInput::Tick(1)));
    assert_eq!(harness.player(":1.9").position_us(), resumed);
}

#[tokio::test(start_paused = true)]
async fn selection_prefers_playing_then_paused_then_stopped() {
    let bus = Arc::new(MockBus::default());
    bus.register("org.mpris.MediaPlayer2.a", ":1.1", MockPlayer::stopped());
    bus.register(
        "org.mpris.MediaPlayer2.b",
        ":1.2",
        MockPlayer::new("Playing", track("/b/1", "B", 100_000_000), 0),
    );
    bus.register(
        "org.mpris.MediaPlayer2.c",
        ":1.3",
        MockPlayer::new("Paused", track("/c/1", "C", 100_000_000), 0),
    );
    let mut harness = Harness::new(bus);
    harness.start().await;
    assert_eq!(harness.selected_owner().as_deref(), Some(":1.2"));

    let mut events = harness.outputs.events.subscribe();
    harness.owner_change("org.mpris.MediaPlayer2.b", ":1.2", "").await;
    assert_eq!(harness.selected_owner().as_deref(), Some(":1.3"));
    let selection = drain(&mut events).into_iter().find_map(|event| match event {
        PlayerEvent::SelectionChanged(selected) => Some(selected),
        _ => None,
    });
    assert_eq!(
        selection.flatten().map(|snapshot| snapshot.owner),
        Some(PlayerOwner::new(":1.3"))
    );

    harness.owner_change("org.mpris.MediaPlayer2.c", ":1.3", "").await;
    assert_eq!(harness.selected_owner().as_deref(), Some(":1.1"));

    harness.owner_change("org.mpris.MediaPlayer2.a", ":1.1", "").await;
    assert_eq!(harness.selected_owner(), None);
}

#[tokio::test(start_paused = true)]
async fn transport_controls_respect_the_selected_status() {
    let bus = Arc::new(MockBus::default());
    let mut harness = Harness::new(Arc::clone(&bus));
    harness.start().await;

    // Nothing selected: nothing to call.
    harness.control(ControlRequest::PlayPause).await;
    harness.control(ControlRequest::Next).await;

    let remote = MockPlayer::stopped();
    bus.install(VLC, Arc::clone(&remote));
    harness.owner_change(VLC, "", ":1.40").await;
    harness.control(ControlRequest::PlayPause).await;
    harness.control(ControlRequest::Next).await;
    assert!(remote.calls().is_empty());

    remote.emit(RemoteSignal::PlaybackStatus("Paused".to_string()));
    harness.pump().await;
    harness.control(ControlRequest::PlayPause).await;
    harness.control(ControlRequest::Next).await;
    assert_eq!(remote.calls(), ["PlayPause"]);

    remote.update(|state| state.can_pause = false);
    remote.emit(RemoteSignal::ControlsChanged);
    harness.pump().await;
    harness.control(ControlRequest::PlayPause).await;
    harness
        .control(ControlRequest::Player {
            owner: PlayerOwner::new(":1.40"),
            action: PlayerAction::PlayPause,
        })
        .await;
    assert_eq!(remote.calls(), ["PlayPause", "PlayPause", "Play"]);

    remote.emit(RemoteSignal::PlaybackStatus("Playing".to_string()));
    harness.pump().await;
    harness.control(ControlRequest::Next).await;
    harness.control(ControlRequest::Previous).await;
    assert_eq!(
        remote.calls(),
        ["PlayPause", "PlayPause", "Play", "Next", "Previous"]
    );
}

#[tokio::test(start_paused = true)]
async fn raise_falls_back_to_launching_the_desktop_entry() {
    let bus = Arc::new(MockBus::default());
    let remote = MockPlayer::stopped();
    remote.update(|state| state.desktop_entry = Some("vlc".to_string()));
    bus.register(VLC, ":1.44", Arc::clone(&remote));
    let mut harness = Harness::new(Arc::clone(&bus));
    harness.start().await;

    let owner = PlayerOwner::new(":1.44");
    harness
        .control(ControlRequest::Player {
            owner: owner.clone(),
            action: PlayerAction::RaiseOrLaunch,
        })
        .await;
    harness
        .control(ControlRequest::Player {
            owner,
            action: PlayerAction::Quit,
        })
        .await;

    assert!(remote.calls().is_empty());
    assert_eq!(*harness.launcher.launched.lock().unwrap(), ["vlc"]);
}

#[tokio::test(start_paused = true)]
async fn volume_and_playlists_are_tracked() {
    let bus = Arc::new(MockBus::default());
    let remote = MockPlayer::new("Playing", track("/t/1", "One", 100_000_000), 0);
    bus.register(VLC, ":1.45", Arc::clone(&remote));
    let config = RegistryConfig {
        options: super::PlayerOptions {
            show_playlists: true,
            ..super::PlayerOptions::default()
        },
        ..RegistryConfig::default()
    };
    let mut harness =
        Harness::with_parts(bus, MockArtwork::default(), MockLauncher::default(), config);
    harness.start().await;

    let snapshot = harness.player(":1.45").snapshot();
    assert_eq!(snapshot.volume.map(|v| v.percentage()), Some(50));
    assert!(snapshot.show_volume);
    let ids: Vec<&str> = snapshot.playlists.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, ["/pl/Music"]);

    remote.emit(RemoteSignal::Volume(0.8));
    harness.pump().await;
    let volume = harness.player(":1.45").snapshot().volume;
    assert_eq!(volume.map(|v| v.percentage()), Some(80));

    harness
        .control(ControlRequest::Player {
            owner: PlayerOwner::new(":1.45"),
            action: PlayerAction::SetVolume(1.7),
        })
        .await;
    assert!(remote.calls().contains(&"SetVolume 1".to_string()));
}

#[tokio::test]
async fn artwork_is_downloaded_once_per_reference() {
    let bus = Arc::new(MockBus::default());
    let art = "https://covers.example/one.png";
    let remote = MockPlayer::new("Paused", with_art(track("/t/1", "One", 1), art), 0);
    bus.register(VLC, ":1.60", Arc::clone(&remote));
    let mut harness = Harness::with_parts(
        bus,
        MockArtwork::gated(),
        MockLauncher::default(),
        RegistryConfig::default(),
    );
    harness.start().await;
    let mut events = harness.outputs.events.subscribe();
    assert_eq!(harness.artwork.reads.load(Ordering::SeqCst), 1);
    assert!(harness.player(":1.60").cover_path().is_none());

    remote.emit(RemoteSignal::Metadata(with_art(track("/t/1", "One (edit)", 1), art)));
    harness.pump().await;
    harness.artwork.gate.notify_one();

    let resolved = harness
        .pump_until(|h| h.player(":1.60").cover_path().is_some())
        .await;
    assert!(resolved);
    assert_eq!(harness.artwork.reads.load(Ordering::SeqCst), 1);

    let path = harness.player(":1.60").cover_path().cloned().unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), b"cover-bytes");
    assert!(
        drain(&mut events)
            .iter()
            .any(|event| matches!(event, PlayerEvent::CoverChanged(_)))
    );
}

#[tokio::test(start_paused = true)]
async fn local_artwork_resolves_without_download() {
    let bus = Arc::new(MockBus::default());
    let remote = MockPlayer::new(
        "Paused",
        with_art(track("/t/1", "One", 1), "file:///tmp/album/cover.png"),
        0,
    );
    bus.register(VLC, ":1.61", remote);
    let mut harness = Harness::new(bus);
    harness.start().await;

    assert_eq!(
        harness.player(":1.61").cover_path().map(|p| p.to_string_lossy().into_owned()),
        Some("/tmp/album/cover.png".to_string())
    );
    assert_eq!(harness.artwork.reads.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn quirky_player_publishes_status_after_settling() {
    let bus = Arc::new(MockBus::default());
    let remote = MockPlayer::new("Playing", track("/t/1", "One", 100_000_000), 0);
    bus.register(BANSHEE, ":1.50", Arc::clone(&remote));
    let mut harness = Harness::new(bus);
    harness.start().await;

    assert_eq!(harness.player(":1.50").status(), PlaybackState::Playing);
    assert_eq!(
        harness.player(":1.50").published_status(),
        PlaybackState::Stopped
    );
    harness.advance(Duration::from_millis(300)).await;
    assert_eq!(
        harness.player(":1.50").published_status(),
        PlaybackState::Playing
    );

    // A stop immediately followed by the next track is never published.
    let mut events = harness.outputs.events.subscribe();
    remote.emit(RemoteSignal::PlaybackStatus("Stopped".to_string()));
    harness.pump().await;
    remote.emit(RemoteSignal::Metadata(track("/t/2", "Two", 100_000_000)));
    remote.emit(RemoteSignal::PlaybackStatus("Playing".to_string()));
    harness.pump().await;
    assert_eq!(
        harness.player(":1.50").published_status(),
        PlaybackState::Playing
    );
    harness.advance(Duration::from_millis(400)).await;

    assert_eq!(
        harness.player(":1.50").published_status(),
        PlaybackState::Playing
    );
    assert!(
        !drain(&mut events)
            .iter()
            .any(|event| matches!(event, PlayerEvent::StatusChanged(_)))
    );
    assert_eq!(harness.selected_owner().as_deref(), Some(":1.50"));
}

#[tokio::test(start_paused = true)]
async fn banshee_survives_an_owner_migration() {
    let bus = Arc::new(MockBus::default());
    let remote = MockPlayer::new("Playing", track("/t/1", "One", 100_000_000), 0);
    bus.register(BANSHEE, ":1.50", Arc::clone(&remote));
    let mut harness = Harness::new(bus);
    harness.start().await;
    harness.advance(Duration::from_millis(400)).await;
    let id = harness.player(":1.50").id();
    let mut events = harness.outputs.events.subscribe();

    harness.owner_change(BANSHEE, ":1.99", ":1.100").await;
    assert!(harness.registry().get(&PlayerOwner::new(":1.50")).is_some());

    harness.owner_change(BANSHEE, ":1.50", ":1.77").await;
    assert_eq!(harness.registry().len(), 1);
    assert!(harness.registry().get(&PlayerOwner::new(":1.50")).is_none());
    let player = harness.player(":1.77");
    assert_eq!(player.id(), id);
    assert_eq!(player.published_status(), PlaybackState::Playing);
    assert_eq!(player.metadata().title.as_deref(), Some("One"));
    assert_eq!(harness.selected_owner().as_deref(), Some(":1.77"));
    assert!(drain(&mut events).contains(&PlayerEvent::OwnerChanged {
        old_owner: PlayerOwner::new(":1.50"),
        new_owner: PlayerOwner::new(":1.77"),
    }));

    harness
        .control(ControlRequest::Player {
            owner: PlayerOwner::new(":1.77"),
            action: PlayerAction::Next,
        })
        .await;
    harness.control(ControlRequest::Next).await;
    assert_eq!(remote.calls(), ["Next", "Next"]);

    // Signals keep flowing to the migrated session.
    remote.emit(RemoteSignal::Metadata(track("/t/2", "Two", 100_000_000)));
    harness.pump().await;
    assert_eq!(harness.player(":1.77").metadata().title.as_deref(), Some("Two"));

    harness.owner_change(BANSHEE, ":1.77", "").await;
    assert!(harness.registry().is_empty());
    assert_eq!(harness.selected_owner(), None);
}

#[tokio::test(start_paused = true)]
async fn default_player_appears_once_the_bus_is_quiet() {
    let bus = Arc::new(MockBus::default());
    let launcher = MockLauncher {
        default_app: Some("org.gnome.Rhythmbox3.desktop".to_string()),
        ..MockLauncher::default()
    };
    let config = RegistryConfig {
        run_default: true,
        ..RegistryConfig::default()
    };
    let mut harness =
        Harness::with_parts(Arc::clone(&bus), MockArtwork::default(), launcher, config);
    harness.start().await;
    assert_eq!(harness.outputs.default_player.get(), None);

    harness.advance(Duration::from_millis(600)).await;
    let shown = harness.outputs.default_player.get().unwrap();
    assert_eq!(shown.identity, "Rhythmbox3");
    assert_eq!(harness.selected_owner(), None);

    harness.control(ControlRequest::LaunchDefault).await;
    assert_eq!(
        *harness.launcher.launched.lock().unwrap(),
        ["org.gnome.Rhythmbox3.desktop"]
    );

    harness.owner_change(VLC, "", ":1.70").await;
    assert_eq!(harness.outputs.default_player.get(), None);
    assert_eq!(harness.registry().len(), 1);

    harness.owner_change(VLC, ":1.70", "").await;
    assert_eq!(harness.outputs.default_player.get(), None);
    harness.advance(Duration::from_millis(600)).await;
    assert!(harness.outputs.default_player.get().is_some());
}

#[tokio::test(start_paused = true)]
async fn configured_default_player_skips_the_desktop_lookup() {
    let bus = Arc::new(MockBus::default());
    let config = RegistryConfig {
        run_default: true,
        default_player: Some("audacious.desktop".to_string()),
        ..RegistryConfig::default()
    };
    let mut harness =
        Harness::with_parts(bus, MockArtwork::default(), MockLauncher::default(), config);
    harness.start().await;
    harness.advance(Duration::from_millis(600)).await;

    let shown = harness.outputs.default_player.get().unwrap();
    assert_eq!(shown.desktop_id, "audacious.desktop");
    assert_eq!(shown.identity, "Audacious");
}

#[tokio::test(start_paused = true)]
async fn destroy_ignores_late_messages() {
    let bus = Arc::new(MockBus::default());
    bus.register(VLC, ":1.80", MockPlayer::stopped());
    let mut harness = Harness::new(bus);
    harness.start().await;
    let id = harness.player(":1.80").id();

    let (done_tx, done_rx) = tokio::sync::oneshot::channel();
    assert!(harness.dispatcher.handle(Dispatch::Shutdown(done_tx)).is_break());
    assert!(done_rx.await.is_ok());
    assert!(harness.registry().is_disabling());
    assert!(harness.outputs.players.get().is_empty());

    let _ = harness.dispatcher.handle(Dispatch::Session(id, PlayerInput::Tick(1)));
    let _ = harness.dispatcher.handle(Dispatch::NameResolved {
        name: VLC.to_string(),
        owner: ":1.81".to_string(),
    });
    assert!(harness.registry().is_empty());
}

#[tokio::test(start_paused = true)]
async fn input_for_a_dead_session_is_dropped() {
    let bus = Arc::new(MockBus::default());
    let mut harness = Harness::new(bus);
    harness.start().await;

    let flow = harness
        .dispatcher
        .handle(Dispatch::Session(SessionId::new(999), PlayerInput::Tick(1)));
    assert!(flow.is_continue());
    assert!(harness.registry().is_empty());
}

#[tokio::test(start_paused = true)]
async fn service_facade_publishes_and_controls() {
    let bus = Arc::new(MockBus::default());
    let remote = MockPlayer::new("Playing", track("/t/1", "One", 100_000_000), 0);
    bus.register(VLC, ":1.90", Arc::clone(&remote));

    let service = MprisService::start_with(
        bus,
        Arc::new(MockArtwork::default()),
        Arc::new(MockLauncher::default()),
        &MprisConfig::default(),
    );
    sleep(Duration::from_millis(100)).await;

    let players = service.players();
    assert_eq!(players.len(), 1);
    assert_eq!(players[0].title, "One");
    assert_eq!(
        service.selected().map(|s| s.owner),
        Some(PlayerOwner::new(":1.90"))
    );

    let mut selected = Box::pin(service.selected_monitored());
    assert!(selected.next().await.flatten().is_some());

    let unknown = service.control(&PlayerOwner::new(":9.9"), PlayerAction::Next);
    assert!(matches!(unknown, Err(MediaError::PlayerNotFound(_))));

    service.next().unwrap();
    service
        .control(&PlayerOwner::new(":1.90"), PlayerAction::Pause)
        .unwrap();
    sleep(Duration::from_millis(100)).await;
    assert_eq!(remote.calls(), ["Next", "Pause"]);

    service.shutdown().await;
    assert!(service.players().is_empty());
    assert!(service.selected().is_none());
    sleep(Duration::from_millis(10)).await;
    assert!(matches!(service.next(), Err(MediaError::ControlFailed(_))));
    service.shutdown().await;
}
