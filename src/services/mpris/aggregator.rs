use std::sync::Arc;

use tracing::debug;

use super::{
    PlaybackState, SessionId,
    player::{Player, PlayerAction},
    registry::PlayerRegistry,
    remote::AppLauncher,
};

/// Picks the one session surfaced as "the" current player.
///
/// Preference is the first playing session, else the first paused one,
/// else the first stopped one, where "first" means lowest [`SessionId`],
/// i.e. creation order.
#[derive(Debug, Default)]
pub struct StatusAggregator {
    selected: Option<SessionId>,
}

fn rank(status: PlaybackState) -> u8 {
    match status {
        PlaybackState::Playing => 0,
        PlaybackState::Paused => 1,
        PlaybackState::Stopped => 2,
    }
}

impl StatusAggregator {
    /// Apply the selection rule to `(id, status)` pairs in any order
    pub fn select<I>(candidates: I) -> Option<SessionId>
    where
        I: IntoIterator<Item = (SessionId, PlaybackState)>,
    {
        candidates
            .into_iter()
            .min_by_key(|&(id, status)| (rank(status), id))
            .map(|(id, _)| id)
    }

    /// Re-evaluate the selection over the registry's published statuses.
    ///
    /// Returns whether the selected session changed.
    pub fn recompute(&mut self, registry: &PlayerRegistry) -> bool {
        let selected = Self::select(
            registry
                .sessions()
                .map(|player| (player.id(), player.published_status())),
        );
        let changed = selected != self.selected;
        self.selected = selected;
        changed
    }

    /// Currently selected session
    pub fn selected(&self) -> Option<SessionId> {
        self.selected
    }

    /// Skip the selected session to its next track, if it is playing
    pub fn next(&self, registry: &mut PlayerRegistry, launcher: &Arc<dyn AppLauncher>) {
        self.delegate(registry, "Next", &[PlaybackState::Playing], |player| {
            player.perform(PlayerAction::Next, launcher);
        });
    }

    /// Return the selected session to its previous track, if it is playing
    pub fn previous(&self, registry: &mut PlayerRegistry, launcher: &Arc<dyn AppLauncher>) {
        self.delegate(registry, "Previous", &[PlaybackState::Playing], |player| {
            player.perform(PlayerAction::Previous, launcher);
        });
    }

    /// Toggle the selected session, if it is playing or paused.
    ///
    /// Always sends `PlayPause`, even to players that claim they cannot pause.
    pub fn play_pause(&self, registry: &mut PlayerRegistry) {
        self.delegate(
            registry,
            "PlayPause",
            &[PlaybackState::Playing, PlaybackState::Paused],
            Player::toggle,
        );
    }

    fn delegate<F>(
        &self,
        registry: &mut PlayerRegistry,
        action: &'static str,
        allowed: &[PlaybackState],
        run: F,
    ) where
        F: FnOnce(&mut Player),
    {
        let Some(player) = self.selected.and_then(|id| registry.session_mut(id)) else {
            debug!(action, "No player selected");
            return;
        };
        if allowed.contains(&player.published_status()) {
            run(player);
        } else {
            debug!(action, status = %player.published_status(), "Selected player ignores action");
        }
    }
}
