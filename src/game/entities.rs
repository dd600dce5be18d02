//! Core entities: roles, teams, phases, players, and regulations.

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt,
    hash::{Hash, Hasher},
    str::FromStr,
};
use thiserror::Error;

/// A role string that is not in the recognized set.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[error("invalid role: {0}")]
pub struct InvalidRoleError(pub String);

/// The closed set of assignable roles.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Villager,
    Werewolf,
    Seer,
    Medium,
    Guard,
    Madman,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Villager,
        Role::Werewolf,
        Role::Seer,
        Role::Medium,
        Role::Guard,
        Role::Madman,
    ];

    /// Which team the role wins with. The madman counts as werewolf-team
    /// for victory purposes even though it is not counted as a werewolf
    /// when evaluating the win condition.
    #[must_use]
    pub fn team(self) -> Team {
        match self {
            Role::Werewolf | Role::Madman => Team::Werewolf,
            Role::Villager | Role::Seer | Role::Medium | Role::Guard => Team::Village,
        }
    }

    /// Human-readable name for rendering.
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Role::Villager => "Villager",
            Role::Werewolf => "Werewolf",
            Role::Seer => "Seer",
            Role::Medium => "Medium",
            Role::Guard => "Guard",
            Role::Madman => "Madman",
        }
    }

    /// Stable identifier used in regulation documents and event payloads.
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Role::Villager => "villager",
            Role::Werewolf => "werewolf",
            Role::Seer => "seer",
            Role::Medium => "medium",
            Role::Guard => "guard",
            Role::Madman => "madman",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl FromStr for Role {
    type Err = InvalidRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "villager" => Ok(Role::Villager),
            "werewolf" => Ok(Role::Werewolf),
            "seer" => Ok(Role::Seer),
            "medium" => Ok(Role::Medium),
            "guard" => Ok(Role::Guard),
            "madman" => Ok(Role::Madman),
            other => Err(InvalidRoleError(other.to_string())),
        }
    }
}

/// The two victory sides.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    Village,
    Werewolf,
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Village => "village",
            Self::Werewolf => "werewolf",
        };
        write!(f, "{repr}")
    }
}

/// Game phases. The engine accepts any transition between non-setup
/// phases; sequencing discipline belongs to the caller.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Setup,
    DayDiscussion,
    DayVote,
    Night,
}

impl Phase {
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Phase::Setup => "Setup",
            Phase::DayDiscussion => "Day (discussion)",
            Phase::DayVote => "Day (vote)",
            Phase::Night => "Night",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Setup => "setup",
            Self::DayDiscussion => "day_discussion",
            Self::DayVote => "day_vote",
            Self::Night => "night",
        };
        write!(f, "{repr}")
    }
}

/// One entry in a player's append-only status history.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StatusRecord {
    pub alive: bool,
    pub role: Option<Role>,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// A participant in one session.
///
/// Identity is the (number, name) pair; everything else is mutable game
/// state. Every mutation appends a [`StatusRecord`]; the history is never
/// truncated or rewritten so timelines can be rendered after the fact.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Player {
    pub number: u32,
    pub name: String,
    role: Option<Role>,
    alive: bool,
    history: Vec<StatusRecord>,
}

impl Player {
    #[must_use]
    pub fn new(number: u32, name: impl Into<String>) -> Self {
        let mut player = Self {
            number,
            name: name.into(),
            role: None,
            alive: true,
            history: Vec::new(),
        };
        player.record_status("initialized");
        player
    }

    #[must_use]
    pub fn role(&self) -> Option<Role> {
        self.role
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    #[must_use]
    pub fn status_history(&self) -> &[StatusRecord] {
        &self.history
    }

    /// Replace the player's role, returning the previous one.
    pub fn assign_role(&mut self, role: Role) -> Option<Role> {
        let old_role = self.role.replace(role);
        self.record_status(&format!("role assigned: {}", role.display_name()));
        old_role
    }

    /// Mark the player dead. Killing an already-dead player is a no-op;
    /// returns whether the state changed.
    pub fn kill(&mut self) -> bool {
        if !self.alive {
            warn!("player {} is already dead", self.name);
            return false;
        }
        self.alive = false;
        self.record_status("died");
        true
    }

    /// Mark the player alive again, primarily for recovery and testing.
    /// Symmetric to [`Player::kill`]; returns whether the state changed.
    pub fn resurrect(&mut self) -> bool {
        if self.alive {
            warn!("player {} is already alive", self.name);
            return false;
        }
        self.alive = true;
        self.record_status("resurrected");
        true
    }

    /// Dispatch to [`Player::kill`] or [`Player::resurrect`].
    pub fn set_alive(&mut self, alive: bool) -> bool {
        if alive { self.resurrect() } else { self.kill() }
    }

    /// Reset role and liveness to their initial values without touching
    /// identity. The history keeps growing; it records the reset too.
    pub(crate) fn reset_status(&mut self) {
        self.role = None;
        self.alive = true;
        self.record_status("reset");
    }

    fn record_status(&mut self, reason: &str) {
        self.history.push(StatusRecord {
            alive: self.alive,
            role: self.role,
            timestamp: Utc::now(),
            reason: reason.to_string(),
        });
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let role = self.role.map_or("unassigned", Role::display_name);
        let status = if self.alive { "alive" } else { "dead" };
        write!(
            f,
            "Player(number={}, name={}, role={role}, status={status})",
            self.number, self.name
        )
    }
}

impl PartialEq for Player {
    fn eq(&self, other: &Self) -> bool {
        self.number == other.number && self.name == other.name
    }
}

impl Eq for Player {}

impl Hash for Player {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.number.hash(state);
        self.name.hash(state);
    }
}

/// Per-round time limit, in seconds.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RoundTime {
    pub round: u32,
    pub time: u32,
}

/// Session configuration: how many of each role, per-round time limits,
/// and the expected roster size.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Regulation {
    pub roles: BTreeMap<Role, u32>,
    pub round_times: Vec<RoundTime>,
    pub total_players: usize,
}

impl Regulation {
    /// Sum of all role counts. When this differs from `total_players` the
    /// regulation is internally inconsistent and role assignment will
    /// leave players unassigned.
    #[must_use]
    pub fn total_roles(&self) -> usize {
        self.roles.values().map(|&count| count as usize).sum()
    }
}

/// One record in the free-form game log: what happened, tagged with the
/// phase and round it happened in.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GameLogEntry {
    pub phase: Phase,
    pub round: u32,
    pub action: String,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

impl GameLogEntry {
    #[must_use]
    pub fn new(phase: Phase, round: u32, action: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            phase,
            round,
            action: action.into(),
            detail: detail.into(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trips_through_str() {
        for role in Role::ALL {
            assert_eq!(role.id().parse::<Role>().unwrap(), role);
        }
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        let err = "vampire".parse::<Role>().unwrap_err();
        assert_eq!(err, InvalidRoleError("vampire".to_string()));
    }

    #[test]
    fn test_role_teams() {
        assert_eq!(Role::Werewolf.team(), Team::Werewolf);
        assert_eq!(Role::Madman.team(), Team::Werewolf);
        assert_eq!(Role::Villager.team(), Team::Village);
        assert_eq!(Role::Seer.team(), Team::Village);
    }

    #[test]
    fn test_new_player_is_alive_and_unassigned() {
        let player = Player::new(1, "alice");
        assert!(player.is_alive());
        assert_eq!(player.role(), None);
        // Construction seeds the history.
        assert_eq!(player.status_history().len(), 1);
    }

    #[test]
    fn test_kill_is_idempotent() {
        let mut player = Player::new(1, "alice");
        assert!(player.kill());
        assert!(!player.kill());
        assert!(!player.is_alive());
        // One record from construction, one from the single effective kill.
        assert_eq!(player.status_history().len(), 2);
    }

    #[test]
    fn test_resurrect_is_idempotent() {
        let mut player = Player::new(1, "alice");
        assert!(!player.resurrect());
        player.kill();
        assert!(player.resurrect());
        assert!(player.is_alive());
    }

    #[test]
    fn test_set_alive_dispatches() {
        let mut player = Player::new(1, "alice");
        assert!(player.set_alive(false));
        assert!(!player.is_alive());
        assert!(player.set_alive(true));
        assert!(player.is_alive());
        assert!(!player.set_alive(true));
    }

    #[test]
    fn test_assign_role_returns_previous() {
        let mut player = Player::new(1, "alice");
        assert_eq!(player.assign_role(Role::Villager), None);
        assert_eq!(player.assign_role(Role::Werewolf), Some(Role::Villager));
        assert_eq!(player.role(), Some(Role::Werewolf));
    }

    #[test]
    fn test_player_identity() {
        let a = Player::new(1, "alice");
        let mut a2 = Player::new(1, "alice");
        a2.kill();
        let b = Player::new(2, "alice");
        assert_eq!(a, a2);
        assert_ne!(a, b);
    }

    #[test]
    fn test_regulation_total_roles() {
        let regulation = Regulation {
            roles: BTreeMap::from([(Role::Villager, 3), (Role::Werewolf, 1)]),
            round_times: vec![RoundTime { round: 1, time: 180 }],
            total_players: 4,
        };
        assert_eq!(regulation.total_roles(), 4);
    }
}
