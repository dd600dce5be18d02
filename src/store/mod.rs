//! Mediating facade over the game state.
//!
//! The [`Store`] is the single external writer of a [`GameState`]: every
//! command validates its input, delegates to the state machine, then
//! drains the events the mutation produced and publishes them on the bus.
//! The store also subscribes itself to every event kind to keep derived
//! caches (confirmation flags, the free-form game log) synchronized, and
//! translates some inbound events into state mutations of their own.
//!
//! There is deliberately no global instance: construct one with
//! [`Store::new`] and hand the `Rc` to every consumer.

use log::{debug, error, info, warn};
use serde_json::Value;
use std::cell::{Cell, Ref, RefCell};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;
use thiserror::Error;

use crate::config::Settings;
use crate::events::{
    BusError, EventBus, EventObserver, EventPayload, EventSource, GameEvent,
};
use crate::game::entities::{GameLogEntry, Phase, Player, Regulation, Role};
use crate::game::state_machine::{GameState, StateError};

pub mod validate;

pub use validate::ValidationError;

/// Errors surfaced by store commands.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error("regulation persistence failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("regulation document is malformed: {0}")]
    Json(#[from] serde_json::Error),
}

/// The closed key set of the generic state accessor.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum StoreKey {
    Players,
    PlayersStatus,
    RegulationStatus,
    AlivePlayers,
    CurrentPhase,
    CurrentRound,
    Regulation,
    RoleDistribution,
    GameLog,
    SessionPlayers,
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Players => "players",
            Self::PlayersStatus => "players_status",
            Self::RegulationStatus => "regulation_status",
            Self::AlivePlayers => "alive_players",
            Self::CurrentPhase => "current_phase",
            Self::CurrentRound => "current_round",
            Self::Regulation => "regulation",
            Self::RoleDistribution => "role_distribution",
            Self::GameLog => "game_log",
            Self::SessionPlayers => "session_players",
        };
        write!(f, "{repr}")
    }
}

/// Typed values returned by [`Store::get`] and accepted by [`Store::set`].
#[derive(Clone, Debug)]
pub enum StateValue {
    Players(Vec<Player>),
    Flag(bool),
    Names(Vec<String>),
    Phase(Phase),
    Round(u32),
    Regulation(Option<Regulation>),
    RoleDistribution(BTreeMap<String, Role>),
    GameLog(Vec<GameLogEntry>),
}

/// Handle returned by [`Store::register_watcher`].
pub type WatcherId = u64;

/// Callback told which key changed. Failures are isolated like subscriber
/// failures on the bus: logged, never propagated to the command.
pub type Watcher = Rc<dyn Fn(StoreKey) -> anyhow::Result<()>>;

#[derive(Debug, Default)]
struct SessionData {
    /// Every player registered during the process lifetime, by name.
    all_players: BTreeMap<String, Player>,
    /// Names participating in the current session.
    session_players: BTreeSet<String>,
}

/// Mediating facade: command surface, generic accessor, preset
/// persistence, game log, and event-driven cache synchronization.
pub struct Store {
    bus: Rc<EventBus>,
    settings: Settings,
    game: RefCell<GameState>,
    game_log: RefCell<Vec<GameLogEntry>>,
    session: RefCell<SessionData>,
    watchers: RefCell<Vec<(WatcherId, Watcher)>>,
    next_watcher: Cell<WatcherId>,
}

impl Store {
    /// Build a store over the given bus and subscribe it to every event
    /// kind.
    #[must_use]
    pub fn new(bus: Rc<EventBus>, settings: Settings) -> Rc<Self> {
        let store = Rc::new(Self {
            bus: Rc::clone(&bus),
            settings,
            game: RefCell::new(GameState::new()),
            game_log: RefCell::new(Vec::new()),
            session: RefCell::new(SessionData::default()),
            watchers: RefCell::new(Vec::new()),
            next_watcher: Cell::new(0),
        });
        bus.subscribe_all(Rc::clone(&store) as Rc<dyn EventObserver>);
        info!("store initialized");
        store
    }

    #[must_use]
    pub fn bus(&self) -> &Rc<EventBus> {
        &self.bus
    }

    /// Read-only view of the underlying game state.
    ///
    /// # Panics
    ///
    /// Panics if called while a store command is mid-mutation, which
    /// cannot happen from event handlers: events are published only after
    /// the mutable borrow is released.
    #[must_use]
    pub fn state(&self) -> Ref<'_, GameState> {
        self.game.borrow()
    }

    // ------------------------------------------------------------------
    // Generic accessor
    // ------------------------------------------------------------------

    /// Read one state projection by key.
    #[must_use]
    pub fn get(&self, key: StoreKey) -> StateValue {
        let game = self.game.borrow();
        match key {
            StoreKey::Players => StateValue::Players(game.players().to_vec()),
            StoreKey::PlayersStatus => StateValue::Flag(game.is_players_confirmed()),
            StoreKey::RegulationStatus => StateValue::Flag(game.is_regulation_confirmed()),
            StoreKey::AlivePlayers => StateValue::Names(game.alive_players()),
            StoreKey::CurrentPhase => StateValue::Phase(game.phase()),
            StoreKey::CurrentRound => StateValue::Round(game.round()),
            StoreKey::Regulation => StateValue::Regulation(game.regulation().cloned()),
            StoreKey::RoleDistribution => StateValue::RoleDistribution(
                game.players()
                    .iter()
                    .filter_map(|p| p.role().map(|role| (p.name.clone(), role)))
                    .collect(),
            ),
            StoreKey::GameLog => StateValue::GameLog(self.game_log.borrow().clone()),
            StoreKey::SessionPlayers => StateValue::Names(
                self.session
                    .borrow()
                    .session_players
                    .iter()
                    .cloned()
                    .collect(),
            ),
        }
    }

    /// Write one state projection by key.
    ///
    /// Only `Regulation`, `Players`, `RegulationStatus`, and
    /// `PlayersStatus` are writable; anything else, or a value whose shape
    /// does not fit the key, is logged and ignored.
    pub fn set(&self, key: StoreKey, value: StateValue) {
        match (key, value) {
            (StoreKey::Regulation, StateValue::Regulation(Some(regulation))) => {
                self.game.borrow_mut().set_regulation(regulation);
                self.flush_events();
                self.notify_watchers(StoreKey::Regulation);
            }
            (StoreKey::Players, StateValue::Players(players)) => {
                self.replace_players(players);
            }
            (StoreKey::RegulationStatus, StateValue::Flag(status)) => {
                self.game.borrow_mut().set_regulation_confirmed(status);
                self.publish(EventPayload::RegulationStatusUpdated { status });
                self.notify_watchers(StoreKey::RegulationStatus);
            }
            (StoreKey::PlayersStatus, StateValue::Flag(status)) => {
                self.game.borrow_mut().set_players_confirmed(status);
                self.publish(EventPayload::PlayersStatusUpdated { status });
                self.notify_watchers(StoreKey::PlayersStatus);
            }
            (key, _) => {
                warn!("state key {key} is not writable with that value; ignored");
            }
        }
    }

    /// Replace the whole roster, registering each player in the session.
    fn replace_players(&self, players: Vec<Player>) {
        {
            let mut game = self.game.borrow_mut();
            game.clear_roster();
            for player in players {
                let name = player.name.clone();
                if game.add_player(player.clone()) {
                    self.register_session_player(&player);
                } else {
                    warn!("duplicate player {name} dropped from roster update");
                }
            }
        }
        self.flush_events();
        let names: Vec<String> = self
            .game
            .borrow()
            .players()
            .iter()
            .map(|p| p.name.clone())
            .collect();
        self.publish(EventPayload::PlayersUpdated { names });
        self.notify_watchers(StoreKey::Players);
        self.notify_watchers(StoreKey::AlivePlayers);
    }

    // ------------------------------------------------------------------
    // Command surface
    // ------------------------------------------------------------------

    /// Add one player to the roster.
    pub fn add_player(&self, player: Player) -> bool {
        let added = {
            let mut game = self.game.borrow_mut();
            game.add_player(player.clone())
        };
        if added {
            self.register_session_player(&player);
        }
        self.flush_events();
        if added {
            self.notify_watchers(StoreKey::Players);
            self.notify_watchers(StoreKey::AlivePlayers);
        }
        added
    }

    /// Remove one player from the roster.
    pub fn remove_player(&self, name: &str) -> bool {
        let removed = self.game.borrow_mut().remove_player(name);
        self.flush_events();
        if removed {
            self.notify_watchers(StoreKey::Players);
            self.notify_watchers(StoreKey::AlivePlayers);
        }
        removed
    }

    /// Validate a raw regulation document and install it.
    ///
    /// # Errors
    ///
    /// [`ValidationError`] when the document is malformed; state is
    /// untouched in that case.
    pub fn set_regulation(&self, document: &Value) -> Result<(), ValidationError> {
        let regulation = validate::parse_regulation(document)?;
        self.game.borrow_mut().set_regulation(regulation);
        self.flush_events();
        self.notify_watchers(StoreKey::Regulation);
        Ok(())
    }

    /// Confirm the installed regulation.
    ///
    /// # Errors
    ///
    /// [`StateError::NoRegulation`] when none is installed.
    pub fn confirm_regulation(&self) -> Result<(), StoreError> {
        self.game.borrow_mut().confirm_regulation()?;
        self.flush_events();
        self.notify_watchers(StoreKey::RegulationStatus);
        Ok(())
    }

    /// Confirm the roster.
    ///
    /// # Errors
    ///
    /// [`StateError::NoPlayers`] when the roster is empty.
    pub fn confirm_players(&self) -> Result<(), StoreError> {
        self.game.borrow_mut().confirm_players()?;
        self.flush_events();
        self.notify_watchers(StoreKey::PlayersStatus);
        Ok(())
    }

    /// Start the game.
    ///
    /// # Errors
    ///
    /// The first unmet precondition as a [`StateError`]; no partial state
    /// change occurs.
    pub fn start_game(&self) -> Result<(), StoreError> {
        self.game.borrow_mut().start_game()?;
        self.flush_events();
        self.notify_watchers(StoreKey::CurrentPhase);
        self.notify_watchers(StoreKey::CurrentRound);
        self.notify_watchers(StoreKey::RoleDistribution);
        self.notify_watchers(StoreKey::AlivePlayers);
        Ok(())
    }

    /// Kill a player. Returns `false` (without mutation) when the game is
    /// inactive, the name is unknown, or the player is already dead.
    pub fn kill_player(&self, name: &str) -> bool {
        let killed = self.game.borrow_mut().kill_player(name);
        self.flush_events();
        if killed {
            self.notify_watchers(StoreKey::AlivePlayers);
        }
        killed
    }

    /// Bring a player back to life, primarily for recovery flows.
    pub fn resurrect_player(&self, name: &str) -> bool {
        let resurrected = self.game.borrow_mut().resurrect_player(name);
        self.flush_events();
        if resurrected {
            self.notify_watchers(StoreKey::AlivePlayers);
        }
        resurrected
    }

    /// Change the phase. Accepts any transition while the game is active.
    pub fn change_phase(&self, phase: Phase) -> bool {
        let changed = self.game.borrow_mut().change_phase(phase);
        self.flush_events();
        if changed {
            self.notify_watchers(StoreKey::CurrentPhase);
        }
        changed
    }

    /// Advance to the next round.
    pub fn next_round(&self) {
        self.game.borrow_mut().next_round();
        self.flush_events();
        self.notify_watchers(StoreKey::CurrentRound);
        self.notify_watchers(StoreKey::CurrentPhase);
    }

    /// Reset the session: lifecycle back to setup, roster identities
    /// preserved, game log cleared.
    pub fn reset_game(&self) {
        self.game.borrow_mut().reset();
        self.flush_events();
    }

    // ------------------------------------------------------------------
    // Game log
    // ------------------------------------------------------------------

    /// Append a free-form record to the game log, tagged with the current
    /// phase and round.
    pub fn add_game_log(&self, action: impl Into<String>, detail: impl Into<String>) {
        let entry = {
            let game = self.game.borrow();
            GameLogEntry::new(game.phase(), game.round(), action, detail)
        };
        self.game_log.borrow_mut().push(entry.clone());
        self.publish(EventPayload::GameLogUpdated { entry });
        self.notify_watchers(StoreKey::GameLog);
    }

    // ------------------------------------------------------------------
    // Regulation presets
    // ------------------------------------------------------------------

    fn regulations_path(&self) -> PathBuf {
        self.settings.data_dir.join(&self.settings.regulations_file)
    }

    /// Persist a named regulation preset.
    ///
    /// The on-disk document maps preset names to regulation objects;
    /// saving merges into it, overwriting a same-named entry and leaving
    /// the rest untouched.
    ///
    /// # Errors
    ///
    /// [`ValidationError`] for a malformed document, or an I/O error from
    /// the write.
    pub fn save_regulation(&self, name: &str, document: &Value) -> Result<(), StoreError> {
        let regulation = validate::parse_regulation(document)?;

        let mut presets = self.load_regulations()?;
        presets.insert(name.to_string(), regulation);

        fs::create_dir_all(&self.settings.data_dir)?;
        let serialized = serde_json::to_string_pretty(&presets)?;
        fs::write(self.regulations_path(), serialized)?;

        self.publish(EventPayload::RegulationSaved {
            name: name.to_string(),
        });
        info!("regulation preset saved: {name}");
        Ok(())
    }

    /// Load every saved preset, or an empty map when none have been saved.
    ///
    /// # Errors
    ///
    /// I/O or parse errors on an existing document.
    pub fn load_regulations(&self) -> Result<BTreeMap<String, Regulation>, StoreError> {
        let path = self.regulations_path();
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    // ------------------------------------------------------------------
    // Watchers
    // ------------------------------------------------------------------

    /// Register a callback told which key changed. Used by UI projections
    /// that re-read through [`Store::get`]. A failing watcher is logged
    /// and skipped; the remaining watchers still run.
    pub fn register_watcher(&self, watcher: Watcher) -> WatcherId {
        let id = self.next_watcher.get();
        self.next_watcher.set(id + 1);
        self.watchers.borrow_mut().push((id, watcher));
        debug!("watcher {id} registered");
        id
    }

    pub fn unregister_watcher(&self, id: WatcherId) {
        self.watchers.borrow_mut().retain(|(wid, _)| *wid != id);
        debug!("watcher {id} unregistered");
    }

    fn notify_watchers(&self, key: StoreKey) {
        // Snapshot so a watcher can (un)register without invalidating the
        // iteration.
        let snapshot: Vec<Watcher> = self
            .watchers
            .borrow()
            .iter()
            .map(|(_, w)| Rc::clone(w))
            .collect();
        for watcher in snapshot {
            if let Err(failure) = watcher(key) {
                error!("watcher failed for key {key}: {failure:#}");
            }
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn register_session_player(&self, player: &Player) {
        let mut session = self.session.borrow_mut();
        session
            .all_players
            .insert(player.name.clone(), player.clone());
        session.session_players.insert(player.name.clone());
        debug!("registered session player: {}", player.name);
    }

    /// Publish everything the last mutation enqueued, in order. Must be
    /// called only after the mutable borrow of the game state is released.
    fn flush_events(&self) {
        let events: VecDeque<GameEvent> = self.game.borrow_mut().drain_events();
        for event in events {
            if let Err(bus_error) = self.bus.publish(event) {
                error!("failed to publish drained event: {bus_error}");
            }
        }
    }

    fn publish(&self, payload: EventPayload) {
        let event = GameEvent::new(payload, EventSource::Store);
        if let Err(bus_error) = self.bus.publish(event) {
            error!("failed to publish store event: {bus_error}");
        }
    }
}

impl EventObserver for Store {
    /// Keep derived caches in sync and translate inbound events into
    /// mutations. Every kind has an explicit arm so a new event kind
    /// cannot be silently dropped.
    fn handle_event(&self, event: &GameEvent) -> anyhow::Result<()> {
        debug!("store handling event: {event}");
        match &event.payload {
            EventPayload::RegulationConfirmed { .. } => {
                self.game.borrow_mut().set_regulation_confirmed(true);
                self.notify_watchers(StoreKey::RegulationStatus);
            }
            EventPayload::PlayersConfirmed { .. } => {
                self.game.borrow_mut().set_players_confirmed(true);
                self.notify_watchers(StoreKey::PlayersStatus);
            }
            EventPayload::PlayerDied { name, .. } => {
                // An externally announced death (vote result, night kill)
                // still has the player alive here; route it through the
                // engine so the alive set, history, and win condition all
                // update and a follow-up event goes out. Deaths the engine
                // itself produced are already applied and stop here.
                if self.game.borrow().is_alive(name) {
                    self.kill_player(name);
                    self.notify_watchers(StoreKey::AlivePlayers);
                }
            }
            EventPayload::PhaseChanged { .. } => {
                self.notify_watchers(StoreKey::CurrentPhase);
            }
            EventPayload::RoundChanged { round, .. } => {
                self.game.borrow_mut().sync_round(*round);
                self.notify_watchers(StoreKey::CurrentRound);
            }
            EventPayload::GameStarted { .. } => {
                self.game.borrow_mut().set_game_active(true);
            }
            EventPayload::GameEnded { winning_team, .. } => {
                info!("game ended: {winning_team} team wins");
                self.game.borrow_mut().set_game_active(false);
            }
            EventPayload::GameStateReset => {
                self.game_log.borrow_mut().clear();
                self.notify_watchers(StoreKey::GameLog);
            }
            EventPayload::RegulationStatusUpdated { status } => {
                self.game.borrow_mut().set_regulation_confirmed(*status);
                self.notify_watchers(StoreKey::RegulationStatus);
            }
            EventPayload::PlayersStatusUpdated { status } => {
                self.game.borrow_mut().set_players_confirmed(*status);
                self.notify_watchers(StoreKey::PlayersStatus);
            }
            EventPayload::Error { message, .. } => {
                error!("error event received: {message}");
            }
            // Informational kinds: nothing derived to update.
            EventPayload::PlayerAdded { .. }
            | EventPayload::PlayerRemoved { .. }
            | EventPayload::PlayerRoleAssigned { .. }
            | EventPayload::PlayerStatusUpdated { .. }
            | EventPayload::PlayersUpdated { .. }
            | EventPayload::RegulationUpdated { .. }
            | EventPayload::RegulationSaved { .. }
            | EventPayload::GameLogUpdated { .. } => {}
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "store"
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("game", &self.game.borrow())
            .field("game_log_len", &self.game_log.borrow().len())
            .finish_non_exhaustive()
    }
}
