//! The phase/round state machine.
//!
//! [`GameState`] owns the roster, the derived alive set, the regulation,
//! and the confirmation flags, and enforces the precondition lifecycle in
//! front of irreversible transitions (confirm regulation, confirm roster,
//! start game, assign roles).
//!
//! Mutations do not publish directly. Each one enqueues its domain events
//! on an internal queue; the driving facade drains the queue once the
//! mutation has returned and publishes in order. This keeps delivery
//! outside the mutable borrow so subscribers can read state (or issue
//! follow-up commands) while handling an event.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rand::{seq::SliceRandom, thread_rng};
use std::collections::{BTreeSet, VecDeque};
use thiserror::Error;

use super::constants::MAX_PLAYERS;
use super::entities::{Phase, Player, Regulation, Role, Team};
use crate::events::{EventPayload, EventSource, GameEvent};

/// A lifecycle precondition was not met. State is untouched when any of
/// these are returned.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum StateError {
    #[error("cannot confirm: no regulation set")]
    NoRegulation,
    #[error("cannot confirm: no players registered")]
    NoPlayers,
    #[error("cannot start: regulation not confirmed")]
    RegulationNotConfirmed,
    #[error("cannot start: players not confirmed")]
    PlayersNotConfirmed,
    #[error("cannot start: roster size {roster} does not match regulation total {expected}")]
    PlayerCountMismatch { roster: usize, expected: usize },
}

/// Point-in-time copy of the game state, captured after each mutation.
/// Retained for audit and debugging, not for rollback.
#[derive(Clone, Debug)]
pub struct GameSnapshot {
    pub phase: Phase,
    pub round: u32,
    pub alive_players: BTreeSet<String>,
    pub players: Vec<Player>,
    pub timestamp: DateTime<Utc>,
}

/// Alive counts per side. `werewolf` counts only the werewolf role; the
/// madman counts as village here even though it wins with the werewolves.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TeamCounts {
    pub village: usize,
    pub werewolf: usize,
}

/// The game session state machine.
#[derive(Debug)]
pub struct GameState {
    /// Roster in insertion order. Names are unique; role assignment pairs
    /// shuffled roles against this order.
    players: Vec<Player>,
    /// Derived set, always exactly the names of alive players.
    alive: BTreeSet<String>,
    phase: Phase,
    round: u32,
    regulation: Option<Regulation>,
    regulation_confirmed: bool,
    players_confirmed: bool,
    game_active: bool,
    snapshots: Vec<GameSnapshot>,
    /// Events produced by mutations, drained by the driving facade.
    events: VecDeque<GameEvent>,
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}

impl GameState {
    #[must_use]
    pub fn new() -> Self {
        info!("game state initialized");
        Self {
            players: Vec::with_capacity(MAX_PLAYERS),
            alive: BTreeSet::new(),
            phase: Phase::Setup,
            round: 0,
            regulation: None,
            regulation_confirmed: false,
            players_confirmed: false,
            game_active: false,
            snapshots: Vec::new(),
            events: VecDeque::new(),
        }
    }

    // ------------------------------------------------------------------
    // Read access
    // ------------------------------------------------------------------

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn round(&self) -> u32 {
        self.round
    }

    #[must_use]
    pub fn is_game_active(&self) -> bool {
        self.game_active
    }

    #[must_use]
    pub fn is_regulation_confirmed(&self) -> bool {
        self.regulation_confirmed
    }

    #[must_use]
    pub fn is_players_confirmed(&self) -> bool {
        self.players_confirmed
    }

    #[must_use]
    pub fn regulation(&self) -> Option<&Regulation> {
        self.regulation.as_ref()
    }

    #[must_use]
    pub fn players(&self) -> &[Player] {
        &self.players
    }

    #[must_use]
    pub fn player(&self, name: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.name == name)
    }

    #[must_use]
    pub fn is_alive(&self, name: &str) -> bool {
        self.alive.contains(name)
    }

    /// Alive player names, sorted.
    #[must_use]
    pub fn alive_players(&self) -> Vec<String> {
        self.alive.iter().cloned().collect()
    }

    /// Alive counts per side, counting only the werewolf role as werewolf.
    #[must_use]
    pub fn team_counts(&self) -> TeamCounts {
        let werewolf = self
            .alive
            .iter()
            .filter_map(|name| self.player(name))
            .filter(|p| p.role() == Some(Role::Werewolf))
            .count();
        TeamCounts {
            village: self.alive.len() - werewolf,
            werewolf,
        }
    }

    #[must_use]
    pub fn snapshots(&self) -> &[GameSnapshot] {
        &self.snapshots
    }

    /// Take all events produced since the last drain, oldest first.
    #[must_use]
    pub fn drain_events(&mut self) -> VecDeque<GameEvent> {
        std::mem::take(&mut self.events)
    }

    // ------------------------------------------------------------------
    // Roster management
    // ------------------------------------------------------------------

    /// Add a player to the roster. Duplicate names are a warn-level no-op.
    /// Any roster change invalidates a prior roster confirmation.
    pub fn add_player(&mut self, player: Player) -> bool {
        if self.player(&player.name).is_some() {
            warn!("player {} already exists", player.name);
            return false;
        }

        if player.is_alive() {
            self.alive.insert(player.name.clone());
        }
        self.emit(EventPayload::PlayerAdded {
            name: player.name.clone(),
            number: player.number,
        });
        info!("added player: {}", player.name);
        self.players.push(player);
        self.players_confirmed = false;
        self.save_snapshot("player_added");
        true
    }

    /// Remove a player from the roster. Unknown names are a warn-level
    /// no-op. Meaningful only while the roster is unconfirmed; after
    /// confirmation players persist for the session.
    pub fn remove_player(&mut self, name: &str) -> bool {
        let Some(index) = self.players.iter().position(|p| p.name == name) else {
            warn!("player {name} does not exist");
            return false;
        };

        self.players.remove(index);
        self.alive.remove(name);
        self.players_confirmed = false;
        self.emit(EventPayload::PlayerRemoved {
            name: name.to_string(),
        });
        self.save_snapshot("player_removed");
        info!("removed player: {name}");
        true
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    /// Replace the regulation. Invalidates a prior regulation confirmation.
    pub fn set_regulation(&mut self, regulation: Regulation) {
        self.emit(EventPayload::RegulationUpdated {
            regulation: regulation.clone(),
        });
        self.regulation = Some(regulation);
        self.regulation_confirmed = false;
        self.save_snapshot("regulation_set");
        info!("regulation set");
    }

    /// Confirm the current regulation.
    ///
    /// # Errors
    ///
    /// [`StateError::NoRegulation`] when none is set.
    pub fn confirm_regulation(&mut self) -> Result<(), StateError> {
        let Some(regulation) = self.regulation.clone() else {
            return Err(StateError::NoRegulation);
        };

        self.regulation_confirmed = true;
        self.emit(EventPayload::RegulationConfirmed { regulation });
        self.save_snapshot("regulation_confirmed");
        info!("regulation confirmed");
        Ok(())
    }

    /// Confirm the current roster.
    ///
    /// # Errors
    ///
    /// [`StateError::NoPlayers`] when the roster is empty.
    pub fn confirm_players(&mut self) -> Result<(), StateError> {
        if self.players.is_empty() {
            return Err(StateError::NoPlayers);
        }

        self.players_confirmed = true;
        self.emit(EventPayload::PlayersConfirmed {
            names: self.players.iter().map(|p| p.name.clone()).collect(),
        });
        self.save_snapshot("players_confirmed");
        info!("players confirmed");
        Ok(())
    }

    /// Empty the roster and alive set ahead of a wholesale roster
    /// replacement.
    pub(crate) fn clear_roster(&mut self) {
        self.players.clear();
        self.alive.clear();
        self.players_confirmed = false;
    }

    /// Crate-internal flag setters, used by the facade to mirror inbound
    /// confirmation events without re-running the confirmation lifecycle.
    pub(crate) fn set_regulation_confirmed(&mut self, status: bool) {
        self.regulation_confirmed = status;
    }

    pub(crate) fn set_players_confirmed(&mut self, status: bool) {
        self.players_confirmed = status;
    }

    pub(crate) fn set_game_active(&mut self, active: bool) {
        self.game_active = active;
    }

    pub(crate) fn sync_round(&mut self, round: u32) {
        self.round = round;
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Start the game.
    ///
    /// Preconditions, each with its own error and no partial mutation on
    /// failure: the regulation is confirmed, the roster is confirmed, and
    /// the roster size equals the regulation's total player count.
    ///
    /// On success the whole roster becomes alive, the round counter moves
    /// to 1, the phase moves to day discussion, roles are assigned, and a
    /// game-started event is enqueued.
    ///
    /// # Errors
    ///
    /// See [`StateError`].
    pub fn start_game(&mut self) -> Result<(), StateError> {
        if !self.regulation_confirmed {
            return Err(StateError::RegulationNotConfirmed);
        }
        if !self.players_confirmed {
            return Err(StateError::PlayersNotConfirmed);
        }
        let expected = self
            .regulation
            .as_ref()
            .map_or(0, |regulation| regulation.total_players);
        if self.players.len() != expected {
            return Err(StateError::PlayerCountMismatch {
                roster: self.players.len(),
                expected,
            });
        }

        self.alive = self.players.iter().map(|p| p.name.clone()).collect();
        self.round = 1;
        self.phase = Phase::DayDiscussion;
        self.game_active = true;

        self.assign_roles();

        self.emit(EventPayload::GameStarted {
            round: self.round,
            phase: self.phase,
            player_count: self.players.len(),
        });
        self.save_snapshot("game_started");
        info!("game started with {} players", self.players.len());
        Ok(())
    }

    /// Expand the regulation's role counts into a multiset, shuffle it
    /// uniformly, and pair it positionally with the roster.
    ///
    /// When the multiset size differs from the roster size, pairing stops
    /// at the shorter length and the leftover players keep no role. The
    /// start preconditions make that unreachable unless a regulation's
    /// role counts disagree with its own `total_players` field, so it is
    /// logged rather than treated as an error.
    fn assign_roles(&mut self) {
        let Some(regulation) = self.regulation.as_ref() else {
            return;
        };

        let mut roles: Vec<Role> = regulation
            .roles
            .iter()
            .flat_map(|(&role, &count)| std::iter::repeat_n(role, count as usize))
            .collect();
        if roles.len() != self.players.len() {
            warn!(
                "role count {} does not match roster size {}; pairing stops at the shorter",
                roles.len(),
                self.players.len()
            );
        }
        roles.shuffle(&mut thread_rng());

        let mut assignments = Vec::with_capacity(roles.len());
        for (player, role) in self.players.iter_mut().zip(roles) {
            let old_role = player.assign_role(role);
            info!("assigned role {role} to player {}", player.name);
            assignments.push((player.name.clone(), role, old_role));
        }
        for (name, role, old_role) in assignments {
            self.emit(EventPayload::PlayerRoleAssigned {
                name,
                role,
                old_role,
            });
        }
    }

    /// Change the current phase.
    ///
    /// Rejected (warn-level no-op) while the game is inactive. The engine
    /// deliberately performs no legality check on the transition itself:
    /// day/vote/night sequencing is the caller's responsibility.
    pub fn change_phase(&mut self, new_phase: Phase) -> bool {
        if !self.game_active {
            warn!("cannot change phase: game is not active");
            return false;
        }

        let old_phase = self.phase;
        self.phase = new_phase;
        self.emit(EventPayload::PhaseChanged {
            old_phase,
            new_phase,
            round: self.round,
        });
        self.save_snapshot("phase_changed");
        info!("phase changed: {old_phase} -> {new_phase}");
        true
    }

    /// Kill a player by name.
    ///
    /// Returns `false` without mutating anything when the game is
    /// inactive, the name is unknown, or the player is already dead.
    /// Otherwise the player dies, leaves the alive set, a player-died
    /// event is enqueued, and the win condition is evaluated.
    pub fn kill_player(&mut self, name: &str) -> bool {
        if !self.game_active {
            warn!("cannot kill player: game is not active");
            return false;
        }
        let Some(player) = self.players.iter_mut().find(|p| p.name == name) else {
            debug!("cannot kill unknown player {name}");
            return false;
        };
        if !player.kill() {
            return false;
        }

        let role = player.role();
        self.alive.remove(name);
        self.emit(EventPayload::PlayerDied {
            name: name.to_string(),
            role,
            phase: self.phase,
            round: self.round,
        });
        self.save_snapshot("player_killed");
        info!("player {name} died");

        self.check_win_condition();
        true
    }

    /// Bring a player back to life, primarily for recovery and testing.
    ///
    /// Returns `false` when the name is unknown or the player is already
    /// alive. The alive set is updated in the same step so it never
    /// disagrees with the player's own liveness.
    pub fn resurrect_player(&mut self, name: &str) -> bool {
        let Some(player) = self.players.iter_mut().find(|p| p.name == name) else {
            debug!("cannot resurrect unknown player {name}");
            return false;
        };
        if !player.resurrect() {
            return false;
        }

        let role = player.role();
        self.alive.insert(name.to_string());
        self.emit(EventPayload::PlayerStatusUpdated {
            name: name.to_string(),
            alive: true,
            role,
        });
        self.save_snapshot("player_resurrected");
        info!("player {name} resurrected");
        true
    }

    /// Evaluate the win condition over the alive set.
    ///
    /// The werewolf team wins when alive werewolves are at least as many
    /// as alive non-werewolves (ties favor the werewolves); the village
    /// wins when no werewolf is alive. A win enqueues a game-ended event
    /// carrying the winner and round, but deliberately does not flip
    /// `game_active`: stopping the session is the caller's decision.
    pub fn check_win_condition(&mut self) -> Option<Team> {
        if self.alive.is_empty() {
            return None;
        }

        let TeamCounts { village, werewolf } = self.team_counts();
        let winner = if werewolf >= village {
            Some(Team::Werewolf)
        } else if werewolf == 0 {
            Some(Team::Village)
        } else {
            None
        };

        if let Some(team) = winner {
            self.emit(EventPayload::GameEnded {
                winning_team: team,
                final_round: self.round,
                werewolf_count: werewolf,
                villager_count: village,
            });
            info!("win condition met: {team} team wins in round {}", self.round);
        }
        winner
    }

    /// Advance to the next round: increment the counter and return to day
    /// discussion. No upper bound is enforced.
    pub fn next_round(&mut self) {
        self.round += 1;
        self.phase = Phase::DayDiscussion;
        self.emit(EventPayload::RoundChanged {
            round: self.round,
            phase: self.phase,
        });
        self.save_snapshot("round_changed");
        info!("advanced to round {}", self.round);
    }

    /// Return to the initial lifecycle state while keeping roster
    /// identities: phase/round/flags back to their defaults, every player
    /// alive with no role, alive set, regulation, and snapshot history
    /// cleared.
    pub fn reset(&mut self) {
        self.game_active = false;
        self.regulation_confirmed = false;
        self.players_confirmed = false;
        self.phase = Phase::Setup;
        self.round = 0;

        for player in &mut self.players {
            player.reset_status();
        }
        self.alive.clear();
        self.regulation = None;
        self.snapshots.clear();

        self.emit(EventPayload::GameStateReset);
        self.save_snapshot("game_reset");
        info!("game state reset");
    }

    fn emit(&mut self, payload: EventPayload) {
        self.events
            .push_back(GameEvent::new(payload, EventSource::GameState));
    }

    fn save_snapshot(&mut self, reason: &str) {
        self.snapshots.push(GameSnapshot {
            phase: self.phase,
            round: self.round,
            alive_players: self.alive.clone(),
            players: self.players.clone(),
            timestamp: Utc::now(),
        });
        debug!("state snapshot saved: {reason}");
    }
}
