//! Event model for the werewolf engine.
//!
//! Every state change in the engine is described by a [`GameEvent`]: an
//! immutable record of a typed payload, the component that produced it, a
//! timestamp, and a unique id. Events are delivered synchronously through
//! the [`EventBus`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::game::entities::{GameLogEntry, Phase, Regulation, Role, Team};

pub mod bus;

pub use bus::{BusError, EventBus, EventObserver, SubscriberId};

/// Closed set of event kinds, used for subscription slots and history
/// queries. One kind per [`EventPayload`] variant.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    PlayerAdded,
    PlayerRemoved,
    PlayerRoleAssigned,
    PlayerDied,
    PlayerStatusUpdated,
    PlayersConfirmed,
    PlayersUpdated,
    PlayersStatusUpdated,
    GameStarted,
    GameEnded,
    GameStateReset,
    PhaseChanged,
    RoundChanged,
    RegulationUpdated,
    RegulationConfirmed,
    RegulationSaved,
    RegulationStatusUpdated,
    GameLogUpdated,
    Error,
}

impl EventKind {
    /// Every kind, in declaration order. Used to register whole-bus
    /// observers and to zero-initialize per-kind counters.
    pub const ALL: [EventKind; 19] = [
        EventKind::PlayerAdded,
        EventKind::PlayerRemoved,
        EventKind::PlayerRoleAssigned,
        EventKind::PlayerDied,
        EventKind::PlayerStatusUpdated,
        EventKind::PlayersConfirmed,
        EventKind::PlayersUpdated,
        EventKind::PlayersStatusUpdated,
        EventKind::GameStarted,
        EventKind::GameEnded,
        EventKind::GameStateReset,
        EventKind::PhaseChanged,
        EventKind::RoundChanged,
        EventKind::RegulationUpdated,
        EventKind::RegulationConfirmed,
        EventKind::RegulationSaved,
        EventKind::RegulationStatusUpdated,
        EventKind::GameLogUpdated,
        EventKind::Error,
    ];
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::PlayerAdded => "player_added",
            Self::PlayerRemoved => "player_removed",
            Self::PlayerRoleAssigned => "player_role_assigned",
            Self::PlayerDied => "player_died",
            Self::PlayerStatusUpdated => "player_status_updated",
            Self::PlayersConfirmed => "players_confirmed",
            Self::PlayersUpdated => "players_updated",
            Self::PlayersStatusUpdated => "players_status_updated",
            Self::GameStarted => "game_started",
            Self::GameEnded => "game_ended",
            Self::GameStateReset => "game_state_reset",
            Self::PhaseChanged => "phase_changed",
            Self::RoundChanged => "round_changed",
            Self::RegulationUpdated => "regulation_updated",
            Self::RegulationConfirmed => "regulation_confirmed",
            Self::RegulationSaved => "regulation_saved",
            Self::RegulationStatusUpdated => "regulation_status_updated",
            Self::GameLogUpdated => "game_log_updated",
            Self::Error => "error",
        };
        write!(f, "{repr}")
    }
}

/// Which component produced an event.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Player,
    GameState,
    Store,
    EventBus,
    /// Events injected from outside the engine (UI commands, tests).
    External,
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Player => "player",
            Self::GameState => "game_state",
            Self::Store => "store",
            Self::EventBus => "event_bus",
            Self::External => "external",
        };
        write!(f, "{repr}")
    }
}

/// Typed payload, one variant per event kind. Consumers match on the
/// variant instead of digging fields out of an untyped map.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum EventPayload {
    PlayerAdded {
        name: String,
        number: u32,
    },
    PlayerRemoved {
        name: String,
    },
    PlayerRoleAssigned {
        name: String,
        role: Role,
        old_role: Option<Role>,
    },
    PlayerDied {
        name: String,
        role: Option<Role>,
        phase: Phase,
        round: u32,
    },
    PlayerStatusUpdated {
        name: String,
        alive: bool,
        role: Option<Role>,
    },
    PlayersConfirmed {
        names: Vec<String>,
    },
    PlayersUpdated {
        names: Vec<String>,
    },
    PlayersStatusUpdated {
        status: bool,
    },
    GameStarted {
        round: u32,
        phase: Phase,
        player_count: usize,
    },
    GameEnded {
        winning_team: Team,
        final_round: u32,
        werewolf_count: usize,
        villager_count: usize,
    },
    GameStateReset,
    PhaseChanged {
        old_phase: Phase,
        new_phase: Phase,
        round: u32,
    },
    RoundChanged {
        round: u32,
        phase: Phase,
    },
    RegulationUpdated {
        regulation: Regulation,
    },
    RegulationConfirmed {
        regulation: Regulation,
    },
    RegulationSaved {
        name: String,
    },
    RegulationStatusUpdated {
        status: bool,
    },
    GameLogUpdated {
        entry: GameLogEntry,
    },
    Error {
        error_kind: String,
        message: String,
        original_kind: EventKind,
        original_payload: String,
        subscriber: String,
    },
}

impl EventPayload {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::PlayerAdded { .. } => EventKind::PlayerAdded,
            Self::PlayerRemoved { .. } => EventKind::PlayerRemoved,
            Self::PlayerRoleAssigned { .. } => EventKind::PlayerRoleAssigned,
            Self::PlayerDied { .. } => EventKind::PlayerDied,
            Self::PlayerStatusUpdated { .. } => EventKind::PlayerStatusUpdated,
            Self::PlayersConfirmed { .. } => EventKind::PlayersConfirmed,
            Self::PlayersUpdated { .. } => EventKind::PlayersUpdated,
            Self::PlayersStatusUpdated { .. } => EventKind::PlayersStatusUpdated,
            Self::GameStarted { .. } => EventKind::GameStarted,
            Self::GameEnded { .. } => EventKind::GameEnded,
            Self::GameStateReset => EventKind::GameStateReset,
            Self::PhaseChanged { .. } => EventKind::PhaseChanged,
            Self::RoundChanged { .. } => EventKind::RoundChanged,
            Self::RegulationUpdated { .. } => EventKind::RegulationUpdated,
            Self::RegulationConfirmed { .. } => EventKind::RegulationConfirmed,
            Self::RegulationSaved { .. } => EventKind::RegulationSaved,
            Self::RegulationStatusUpdated { .. } => EventKind::RegulationStatusUpdated,
            Self::GameLogUpdated { .. } => EventKind::GameLogUpdated,
            Self::Error { .. } => EventKind::Error,
        }
    }
}

/// A single event. Immutable once constructed.
#[derive(Clone, Debug, Serialize)]
pub struct GameEvent {
    pub payload: EventPayload,
    pub timestamp: DateTime<Utc>,
    pub source: EventSource,
    pub id: Uuid,
}

impl GameEvent {
    #[must_use]
    pub fn new(payload: EventPayload, source: EventSource) -> Self {
        Self {
            payload,
            timestamp: Utc::now(),
            source,
            id: Uuid::new_v4(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

impl fmt::Display for GameEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GameEvent(kind={}, source={}, timestamp={})",
            self.kind(),
            self.source,
            self.timestamp.to_rfc3339()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_payload() {
        let event = GameEvent::new(
            EventPayload::PlayerAdded {
                name: "alice".to_string(),
                number: 1,
            },
            EventSource::GameState,
        );
        assert_eq!(event.kind(), EventKind::PlayerAdded);
        assert_eq!(event.source, EventSource::GameState);
    }

    #[test]
    fn test_all_kinds_covers_every_variant() {
        // ALL is used to wire up subscription slots, so a missing entry
        // would silently drop events of that kind.
        let mut seen = std::collections::HashSet::new();
        for kind in EventKind::ALL {
            assert!(seen.insert(kind), "duplicate kind in ALL: {kind}");
        }
        assert_eq!(seen.len(), EventKind::ALL.len());
    }

    #[test]
    fn test_event_ids_are_unique() {
        let a = GameEvent::new(EventPayload::GameStateReset, EventSource::Store);
        let b = GameEvent::new(EventPayload::GameStateReset, EventSource::Store);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_kind_display_is_snake_case() {
        assert_eq!(EventKind::PlayerRoleAssigned.to_string(), "player_role_assigned");
        assert_eq!(EventKind::Error.to_string(), "error");
    }
}
