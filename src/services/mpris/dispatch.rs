//! The single loop that owns and mutates every session.

use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, instrument};

use crate::services::common::Property;

use super::{
    PlayerEvent, PlayerOwner, SessionId,
    aggregator::StatusAggregator,
    default_player::DefaultPlayerInfo,
    player::{PlayerAction, PlayerChanges, PlayerInput, SessionSnapshot},
    registry::PlayerRegistry,
    remote::{AppLauncher, OwnerChange},
};

/// Sending half of the dispatch channel
pub(crate) type DispatchSender = mpsc::UnboundedSender<Dispatch>;
/// Receiving half of the dispatch channel
pub(crate) type DispatchReceiver = mpsc::UnboundedReceiver<Dispatch>;

/// Everything the dispatcher reacts to
#[derive(Debug)]
pub(crate) enum Dispatch {
    NameResolved { name: String, owner: String },
    DiscoveryComplete,
    OwnerChanged(OwnerChange),
    Session(SessionId, PlayerInput),
    SettleDefault,
    DefaultAppResolved(Option<String>),
    Control(ControlRequest),
    Shutdown(oneshot::Sender<()>),
}

/// Commands from the display collaborator
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ControlRequest {
    Next,
    Previous,
    PlayPause,
    Player {
        owner: PlayerOwner,
        action: PlayerAction,
    },
    LaunchDefault,
}

/// Reactive outputs the dispatcher republishes after every message
#[derive(Clone)]
pub(crate) struct Outputs {
    pub selected: Property<Option<SessionSnapshot>>,
    pub players: Property<Vec<SessionSnapshot>>,
    pub default_player: Property<Option<DefaultPlayerInfo>>,
    pub events: broadcast::Sender<PlayerEvent>,
}

impl Outputs {
    pub fn new(event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity);
        Self {
            selected: Property::new(None),
            players: Property::new(Vec::new()),
            default_player: Property::new(None),
            events,
        }
    }
}

pub(crate) struct Dispatcher {
    registry: PlayerRegistry,
    aggregator: StatusAggregator,
    launcher: Arc<dyn AppLauncher>,
    outputs: Outputs,
}

impl Dispatcher {
    pub fn new(registry: PlayerRegistry, launcher: Arc<dyn AppLauncher>, outputs: Outputs) -> Self {
        Self {
            registry,
            aggregator: StatusAggregator::default(),
            launcher,
            outputs,
        }
    }

    /// Start discovery
    pub fn start(&mut self) {
        self.registry.start(&self.launcher);
        self.publish();
    }

    /// Handle messages until shutdown
    #[instrument(skip_all)]
    pub async fn run(mut self, mut rx: DispatchReceiver) {
        while let Some(message) = rx.recv().await {
            if self.handle(message).is_break() {
                break;
            }
        }
        self.registry.destroy();
        debug!("MPRIS dispatcher stopped");
    }

    /// Apply one message and republish
    pub fn handle(&mut self, message: Dispatch) -> ControlFlow<()> {
        match message {
            Dispatch::NameResolved { name, owner } => self.registry.name_resolved(&name, &owner),
            Dispatch::DiscoveryComplete => self.registry.discovery_complete(),
            Dispatch::OwnerChanged(change) => self.registry.owner_changed(change),
            Dispatch::Session(id, input) => self.session_input(id, input),
            Dispatch::SettleDefault => self.registry.settle_default(),
            Dispatch::DefaultAppResolved(app) => self.registry.set_default_app(app),
            Dispatch::Control(request) => self.control(request),
            Dispatch::Shutdown(done) => {
                self.registry.destroy();
                self.publish();
                let _ = done.send(());
                return ControlFlow::Break(());
            }
        }
        self.publish();
        ControlFlow::Continue(())
    }

    fn session_input(&mut self, id: SessionId, input: PlayerInput) {
        let Some(player) = self.registry.session_mut(id) else {
            return;
        };
        let changes = player.handle(input);
        if changes == PlayerChanges::default() {
            return;
        }

        let snapshot = player.snapshot();
        let emit = |event| {
            let _ = self.outputs.events.send(event);
        };
        if changes.metadata {
            emit(PlayerEvent::MetadataChanged(snapshot.clone()));
        }
        if changes.status {
            emit(PlayerEvent::StatusChanged(snapshot.clone()));
        }
        if changes.cover {
            emit(PlayerEvent::CoverChanged(snapshot.clone()));
        }
        if changes.position {
            emit(PlayerEvent::PositionChanged {
                owner: snapshot.owner,
                position: snapshot.position,
            });
        }
    }

    fn control(&mut self, request: ControlRequest) {
        match request {
            ControlRequest::Next => self.aggregator.next(&mut self.registry, &self.launcher),
            ControlRequest::Previous => {
                self.aggregator.previous(&mut self.registry, &self.launcher);
            }
            ControlRequest::PlayPause => self.aggregator.play_pause(&mut self.registry),
            ControlRequest::Player { owner, action } => match self.registry.get_mut(&owner) {
                Some(player) => player.perform(action, &self.launcher),
                None => debug!(%owner, "Control for unknown player"),
            },
            ControlRequest::LaunchDefault => self.registry.launch_default(&self.launcher),
        }
    }

    fn publish(&mut self) {
        for event in self.registry.take_events() {
            let _ = self.outputs.events.send(event);
        }

        let players: Vec<SessionSnapshot> =
            self.registry.sessions().map(|player| player.snapshot()).collect();
        let selection_changed = self.aggregator.recompute(&self.registry);
        let selected = self
            .aggregator
            .selected()
            .and_then(|id| players.iter().find(|snapshot| snapshot.id == id))
            .cloned();

        if selection_changed {
            let _ = self
                .outputs
                .events
                .send(PlayerEvent::SelectionChanged(selected.clone()));
        }
        self.outputs.selected.set(selected);
        self.outputs.players.set(players);
        self.outputs
            .default_player
            .set(self.registry.default_player().cloned());
    }

    /// Registry, for inspection
    pub fn registry(&self) -> &PlayerRegistry {
        &self.registry
    }
}
