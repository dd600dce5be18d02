//! # Werewolf Engine
//!
//! An in-process, event-driven game-state engine for werewolf-style
//! social deduction games.
//!
//! The engine tracks players, phases, rounds, role assignment, and
//! win-condition evaluation, and propagates every state change through a
//! synchronous publish/subscribe bus consumed by independent observers.
//! UI layers are external collaborators: they issue commands against the
//! [`Store`] facade and render whatever events they receive.
//!
//! ## Architecture
//!
//! - [`events`]: the typed event model and the [`EventBus`], with bounded
//!   history, registration-order delivery, per-subscriber failure
//!   isolation, and re-entrancy-safe nested publishing.
//! - [`game`]: entities (roles, teams, phases, players, regulations) and
//!   the [`GameState`] phase/round state machine with its precondition
//!   lifecycle (confirm regulation, confirm roster, start, assign roles).
//! - [`store`]: the [`Store`] mediator: command surface, generic typed
//!   accessor, regulation validation and preset persistence, game log,
//!   and event-driven cache synchronization.
//! - [`config`]: engine settings.
//!
//! Everything is single-threaded and single-writer: one [`GameState`] per
//! process, mutated only through its [`Store`], with events delivered
//! synchronously on the invoking thread.
//!
//! ## Example
//!
//! ```
//! use std::rc::Rc;
//! use werewolf_engine::{EventBus, Player, Settings, Store};
//! use serde_json::json;
//!
//! let bus = Rc::new(EventBus::new());
//! let store = Store::new(Rc::clone(&bus), Settings::default());
//!
//! for (number, name) in [(1, "alice"), (2, "bob"), (3, "carol"), (4, "dave")] {
//!     store.add_player(Player::new(number, name));
//! }
//! store
//!     .set_regulation(&json!({
//!         "roles": {"villager": 3, "werewolf": 1},
//!         "round_times": [{"round": 1, "time": 180}],
//!         "total_players": 4
//!     }))
//!     .unwrap();
//! store.confirm_regulation().unwrap();
//! store.confirm_players().unwrap();
//! store.start_game().unwrap();
//! assert!(store.state().is_game_active());
//! ```

/// Engine settings.
pub mod config;
pub use config::Settings;

/// Event model and the publish/subscribe bus.
pub mod events;
pub use events::{
    BusError, EventBus, EventKind, EventObserver, EventPayload, EventSource, GameEvent,
    SubscriberId,
};

/// Core entities and the phase/round state machine.
pub mod game;
pub use game::{
    GameLogEntry, GameSnapshot, GameState, InvalidRoleError, Phase, Player, Regulation, Role,
    RoundTime, StateError, StatusRecord, Team, TeamCounts,
    constants::{self, MAX_EVENT_HISTORY, MAX_PLAYERS, MIN_PLAYERS},
};

/// Mediating facade, accessor keys, validation, and persistence.
pub mod store;
pub use store::{StateValue, Store, StoreError, StoreKey, ValidationError, Watcher, WatcherId};
