//! Discovery and lifecycle of player sessions.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::future::join_all;
use tokio::task::AbortHandle;
use tracing::{debug, info, instrument, warn};

use super::{
    BusNameKind, PlayerEvent, PlayerOwner, SessionId, classify_bus_name,
    default_player::DefaultPlayerInfo,
    dispatch::{Dispatch, DispatchSender},
    is_mpris_name,
    player::{Player, PlayerOptions},
    remote::{AppLauncher, ArtworkSource, MediaBus, OwnerChange},
};

/// Quiet period after the last add/remove before the default player is
/// shown or hidden
pub const DEFAULT_PLAYER_SETTLE: Duration = Duration::from_millis(500);

/// Upper bound on a single startup owner lookup
const NAME_OWNER_TIMEOUT: Duration = Duration::from_secs(5);

/// Static registry settings
#[derive(Debug, Clone, Default)]
pub struct RegistryConfig {
    /// Substrings of bus names that never become sessions
    pub ignored_players: Vec<String>,
    /// Features every session tracks
    pub options: PlayerOptions,
    /// Substitute the default audio application while no player runs
    pub run_default: bool,
    /// Desktop id to use instead of asking the desktop for its default
    pub default_player: Option<String>,
}

/// Owns every live session, keyed by bus owner.
pub struct PlayerRegistry {
    bus: Arc<dyn MediaBus>,
    artwork: Arc<dyn ArtworkSource>,
    tx: DispatchSender,
    config: RegistryConfig,
    players: HashMap<PlayerOwner, Player>,
    default_app: Option<String>,
    default_player: Option<DefaultPlayerInfo>,
    next_id: u64,
    disabling: bool,
    discovering: bool,
    released: HashSet<(String, PlayerOwner)>,
    settle_timer: Option<AbortHandle>,
    tasks: Vec<AbortHandle>,
    events: Vec<PlayerEvent>,
}

impl PlayerRegistry {
    /// Create an empty registry
    pub(crate) fn new(
        bus: Arc<dyn MediaBus>,
        artwork: Arc<dyn ArtworkSource>,
        tx: DispatchSender,
        config: RegistryConfig,
    ) -> Self {
        Self {
            bus,
            artwork,
            tx,
            config,
            players: HashMap::new(),
            default_app: None,
            default_player: None,
            next_id: 1,
            disabling: false,
            discovering: true,
            released: HashSet::new(),
            settle_timer: None,
            tasks: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Begin discovery.
    ///
    /// Ownership changes are subscribed to before existing names are listed,
    /// so a player appearing in between is never missed. Listed MPRIS names
    /// are resolved to their owners concurrently and every resolution is
    /// delivered before the first buffered ownership change; a failed
    /// resolution drops that name.
    #[instrument(skip_all)]
    pub(crate) fn start(&mut self, launcher: &Arc<dyn AppLauncher>) {
        info!("Starting MPRIS player discovery");
        let bus = Arc::clone(&self.bus);
        let tx = self.tx.clone();
        let discovery = tokio::spawn(async move {
            let changes = match bus.owner_changes().await {
                Ok(changes) => Some(changes),
                Err(e) => {
                    warn!("Failed to watch bus name owners: {e}");
                    None
                }
            };

            let names = bus.list_names().await.unwrap_or_else(|e| {
                warn!("Failed to list bus names: {e}");
                Vec::new()
            });
            let lookups = names
                .into_iter()
                .filter(|name| is_mpris_name(name))
                .map(|name| resolve_owner(Arc::clone(&bus), name));
            for (name, owner) in join_all(lookups).await.into_iter().flatten() {
                let _ = tx.send(Dispatch::NameResolved { name, owner });
            }
            if tx.send(Dispatch::DiscoveryComplete).is_err() {
                return;
            }

            let Some(mut changes) = changes else {
                return;
            };
            while let Some(change) = changes.next().await {
                if tx.send(Dispatch::OwnerChanged(change)).is_err() {
                    break;
                }
            }
        });
        self.tasks.push(discovery.abort_handle());

        if self.config.run_default {
            match self.config.default_player.clone() {
                Some(desktop_id) => self.default_app = Some(desktop_id),
                None => {
                    let launcher = Arc::clone(launcher);
                    let tx = self.tx.clone();
                    let lookup = tokio::spawn(async move {
                        let app = launcher.default_audio_app().await;
                        let _ = tx.send(Dispatch::DefaultAppResolved(app));
                    });
                    self.tasks.push(lookup.abort_handle());
                }
            }
        }
        self.schedule_settle();
    }

    /// An owner lookup started by [`PlayerRegistry::start`] finished.
    ///
    /// Lookups are answered from a snapshot that may already be outdated;
    /// an owner seen releasing the name since then is not resurrected.
    pub(crate) fn name_resolved(&mut self, name: &str, owner: &str) {
        if self.disabling || !self.discovering {
            return;
        }
        let key = (name.to_string(), PlayerOwner::new(owner));
        if self.released.contains(&key) {
            debug!(%name, %owner, "Dropping resolution for a released name");
            return;
        }
        self.add_player(name, key.1);
    }

    /// Every startup lookup has been delivered
    pub(crate) fn discovery_complete(&mut self) {
        self.discovering = false;
        self.released.clear();
    }

    /// Apply one `NameOwnerChanged` notification
    pub(crate) fn owner_changed(&mut self, change: OwnerChange) {
        if self.disabling || !is_mpris_name(&change.name) {
            return;
        }

        if self.discovering {
            if let Some(old_owner) = &change.old_owner {
                self.released
                    .insert((change.name.clone(), PlayerOwner::new(old_owner.as_str())));
            }
            if let Some(new_owner) = &change.new_owner {
                self.released
                    .remove(&(change.name.clone(), PlayerOwner::new(new_owner.as_str())));
            }
        }

        match (change.old_owner, change.new_owner) {
            (None, Some(new_owner)) => self.add_player(&change.name, PlayerOwner::new(new_owner)),
            (Some(old_owner), None) => self.remove_player(&PlayerOwner::new(old_owner)),
            (Some(old_owner), Some(new_owner)) => self.change_owner(
                &change.name,
                &PlayerOwner::new(old_owner),
                PlayerOwner::new(new_owner),
            ),
            (None, None) => {}
        }
    }

    #[instrument(skip(self, owner), fields(owner = %owner))]
    fn add_player(&mut self, bus_name: &str, owner: PlayerOwner) {
        if self.is_ignored(bus_name) {
            info!("Ignoring player based on configuration");
            return;
        }

        if let Some(player) = self.players.get_mut(&owner) {
            let upgrade = classify_bus_name(bus_name) == BusNameKind::Instance
                && classify_bus_name(player.bus_name()) == BusNameKind::Master;
            if upgrade {
                info!(from = player.bus_name(), "Upgrading player to instance name");
                player.set_bus_name(bus_name);
                self.events.push(PlayerEvent::BusNameUpgraded {
                    owner,
                    bus_name: bus_name.to_string(),
                });
            } else {
                debug!(existing = player.bus_name(), "Rejecting duplicate player name");
            }
            return;
        }

        info!("Adding MPRIS player");
        let id = SessionId::new(self.next_id);
        self.next_id += 1;
        let player = Player::new(
            id,
            owner.clone(),
            bus_name,
            self.bus.player(bus_name),
            Arc::clone(&self.artwork),
            self.tx.clone(),
            self.config.options,
        );
        self.events
            .push(PlayerEvent::SessionAdded(player.snapshot()));
        self.players.insert(owner, player);

        self.default_player = None;
        self.schedule_settle();
    }

    #[instrument(skip(self, owner), fields(owner = %owner))]
    fn remove_player(&mut self, owner: &PlayerOwner) {
        let Some(mut player) = self.players.remove(owner) else {
            return;
        };
        info!(bus_name = player.bus_name(), "Removing MPRIS player");
        player.destroy();
        self.events.push(PlayerEvent::SessionRemoved(owner.clone()));
        self.schedule_settle();
    }

    fn change_owner(&mut self, bus_name: &str, old_owner: &PlayerOwner, new_owner: PlayerOwner) {
        let matches = self
            .players
            .get(old_owner)
            .is_some_and(|player| player.bus_name() == bus_name);
        if !matches {
            debug!(%bus_name, %old_owner, "Ignoring stale owner change");
            return;
        }
        let Some(mut player) = self.players.remove(old_owner) else {
            return;
        };

        info!(%bus_name, %old_owner, %new_owner, "Player changed owner");
        if let Some(mut displaced) = self.players.remove(&new_owner) {
            displaced.destroy();
            self.events.push(PlayerEvent::SessionRemoved(new_owner.clone()));
        }
        player.set_owner(new_owner.clone());
        self.players.insert(new_owner.clone(), player);
        self.events.push(PlayerEvent::OwnerChanged {
            old_owner: old_owner.clone(),
            new_owner,
        });
    }

    fn is_ignored(&self, bus_name: &str) -> bool {
        self.config
            .ignored_players
            .iter()
            .any(|pattern| !pattern.is_empty() && bus_name.contains(pattern.as_str()))
    }

    fn schedule_settle(&mut self) {
        if let Some(timer) = self.settle_timer.take() {
            timer.abort();
        }
        if self.disabling {
            return;
        }
        let tx = self.tx.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(DEFAULT_PLAYER_SETTLE).await;
            let _ = tx.send(Dispatch::SettleDefault);
        });
        self.settle_timer = Some(timer.abort_handle());
    }

    /// Show or hide the default player once add/remove bursts have settled
    pub(crate) fn settle_default(&mut self) {
        self.settle_timer = None;
        if self.disabling {
            return;
        }
        if !self.players.is_empty() || !self.config.run_default {
            self.default_player = None;
            return;
        }
        if self.default_player.is_none() {
            self.default_player = self
                .default_app
                .as_deref()
                .map(DefaultPlayerInfo::from_desktop_id);
        }
    }

    /// The desktop's default audio application was looked up
    pub(crate) fn set_default_app(&mut self, desktop_id: Option<String>) {
        match desktop_id {
            Some(desktop_id) => {
                self.default_app = Some(desktop_id);
                self.schedule_settle();
            }
            None => debug!("No default audio application"),
        }
    }

    /// Launch the application behind the default player
    pub(crate) fn launch_default(&mut self, launcher: &Arc<dyn AppLauncher>) {
        let Some(info) = self.default_player.clone() else {
            debug!("No default player to launch");
            return;
        };
        let launcher = Arc::clone(launcher);
        let task = tokio::spawn(async move {
            if let Err(e) = launcher.launch(&info.desktop_id).await {
                warn!(desktop_id = %info.desktop_id, "Failed to launch default player: {e}");
            }
        });
        self.tasks.retain(|task| !task.is_finished());
        self.tasks.push(task.abort_handle());
    }

    /// Tear down every session; later events are ignored
    #[instrument(skip_all)]
    pub(crate) fn destroy(&mut self) {
        if self.disabling {
            return;
        }
        info!("Stopping MPRIS player discovery");
        self.disabling = true;

        for task in self.tasks.drain(..).chain(self.settle_timer.take()) {
            task.abort();
        }
        let owners: Vec<PlayerOwner> = self.players.keys().cloned().collect();
        for owner in owners {
            self.remove_player(&owner);
        }
        self.default_player = None;
    }

    /// Whether [`PlayerRegistry::destroy`] has run
    pub fn is_disabling(&self) -> bool {
        self.disabling
    }

    /// Number of real sessions
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// Whether there are no real sessions
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Session registered under `owner`
    pub fn get(&self, owner: &PlayerOwner) -> Option<&Player> {
        self.players.get(owner)
    }

    /// Mutable session registered under `owner`
    pub(crate) fn get_mut(&mut self, owner: &PlayerOwner) -> Option<&mut Player> {
        self.players.get_mut(owner)
    }

    /// Session with the given id, if still alive
    pub fn session(&self, id: SessionId) -> Option<&Player> {
        self.players.values().find(|player| player.id() == id)
    }

    /// Mutable session with the given id, if still alive
    pub(crate) fn session_mut(&mut self, id: SessionId) -> Option<&mut Player> {
        self.players.values_mut().find(|player| player.id() == id)
    }

    /// Sessions in creation order
    pub fn sessions(&self) -> impl Iterator<Item = &Player> {
        let mut sessions: Vec<&Player> = self.players.values().collect();
        sessions.sort_by_key(|player| player.id());
        sessions.into_iter()
    }

    /// The synthetic default player, if shown
    pub fn default_player(&self) -> Option<&DefaultPlayerInfo> {
        self.default_player.as_ref()
    }

    /// Drain events produced since the last call
    pub(crate) fn take_events(&mut self) -> Vec<PlayerEvent> {
        std::mem::take(&mut self.events)
    }
}

async fn resolve_owner(bus: Arc<dyn MediaBus>, name: String) -> Option<(String, String)> {
    match tokio::time::timeout(NAME_OWNER_TIMEOUT, bus.name_owner(&name)).await {
        Ok(Ok(owner)) => Some((name, owner)),
        Ok(Err(e)) => {
            debug!(%name, "Dropping unresolved player: {e}");
            None
        }
        Err(_) => {
            debug!(%name, "Dropping player whose owner lookup timed out");
            None
        }
    }
}

impl Drop for PlayerRegistry {
    fn drop(&mut self) {
        self.destroy();
    }
}
