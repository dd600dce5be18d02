//! Full end-to-end game flow integration tests.
//!
//! Drives complete sessions through the `Store` facade, from roster setup
//! through confirmations, start, kills, win conditions, and reset, and
//! checks the events observers receive along the way.

use serde_json::json;
use std::cell::RefCell;
use std::rc::Rc;
use werewolf_engine::{
    EventBus, EventKind, EventPayload, EventSource, GameEvent, Phase, Player, Role, Settings,
    StateError, Store, StoreError, Team,
};

fn standard_regulation() -> serde_json::Value {
    json!({
        "roles": {"villager": 3, "werewolf": 1},
        "round_times": [{"round": 1, "time": 180}],
        "total_players": 4
    })
}

fn setup_store() -> (Rc<EventBus>, Rc<Store>) {
    let bus = Rc::new(EventBus::new());
    let store = Store::new(Rc::clone(&bus), Settings::default());
    (bus, store)
}

fn add_four_players(store: &Store) {
    for (number, name) in [(1, "alice"), (2, "bob"), (3, "carol"), (4, "dave")] {
        assert!(store.add_player(Player::new(number, name)));
    }
}

fn ready_store() -> (Rc<EventBus>, Rc<Store>) {
    let (bus, store) = setup_store();
    add_four_players(&store);
    store.set_regulation(&standard_regulation()).unwrap();
    store.confirm_regulation().unwrap();
    store.confirm_players().unwrap();
    (bus, store)
}

// ============================================================================
// Lifecycle preconditions
// ============================================================================

#[test]
fn test_start_requires_regulation_confirmation() {
    let (_bus, store) = setup_store();
    add_four_players(&store);
    store.set_regulation(&standard_regulation()).unwrap();

    let err = store.start_game().unwrap_err();
    assert!(matches!(
        err,
        StoreError::State(StateError::RegulationNotConfirmed)
    ));
    assert_eq!(store.state().phase(), Phase::Setup);
    assert!(!store.state().is_game_active());
}

#[test]
fn test_start_requires_players_confirmation() {
    let (_bus, store) = setup_store();
    add_four_players(&store);
    store.set_regulation(&standard_regulation()).unwrap();
    store.confirm_regulation().unwrap();

    let err = store.start_game().unwrap_err();
    assert!(matches!(
        err,
        StoreError::State(StateError::PlayersNotConfirmed)
    ));
    assert!(!store.state().is_game_active());
}

#[test]
fn test_start_requires_exact_roster_size() {
    let (_bus, store) = setup_store();
    add_four_players(&store);
    store.add_player(Player::new(5, "eve"));
    store.set_regulation(&standard_regulation()).unwrap();
    store.confirm_regulation().unwrap();
    store.confirm_players().unwrap();

    let err = store.start_game().unwrap_err();
    assert!(matches!(
        err,
        StoreError::State(StateError::PlayerCountMismatch {
            roster: 5,
            expected: 4
        })
    ));
    assert_eq!(store.state().phase(), Phase::Setup);
}

#[test]
fn test_confirmation_requires_data() {
    let (_bus, store) = setup_store();
    let err = store.confirm_regulation().unwrap_err();
    assert!(matches!(err, StoreError::State(StateError::NoRegulation)));
    let err = store.confirm_players().unwrap_err();
    assert!(matches!(err, StoreError::State(StateError::NoPlayers)));
}

#[test]
fn test_roster_change_invalidates_confirmation() {
    let (_bus, store) = ready_store();
    assert!(store.state().is_players_confirmed());
    store.add_player(Player::new(5, "eve"));
    assert!(!store.state().is_players_confirmed());
}

// ============================================================================
// Start and role assignment
// ============================================================================

#[test]
fn test_start_game_distributes_roles_exactly() {
    let (_bus, store) = ready_store();
    store.start_game().unwrap();

    let state = store.state();
    assert!(state.is_game_active());
    assert_eq!(state.phase(), Phase::DayDiscussion);
    assert_eq!(state.round(), 1);
    assert_eq!(state.alive_players().len(), 4);

    let werewolves = state
        .players()
        .iter()
        .filter(|p| p.role() == Some(Role::Werewolf))
        .count();
    let villagers = state
        .players()
        .iter()
        .filter(|p| p.role() == Some(Role::Villager))
        .count();
    assert_eq!(werewolves, 1);
    assert_eq!(villagers, 3);
}

#[test]
fn test_start_game_emits_role_and_start_events() {
    let (bus, store) = ready_store();
    let seen: Rc<RefCell<Vec<EventKind>>> = Rc::new(RefCell::new(Vec::new()));
    for kind in [EventKind::PlayerRoleAssigned, EventKind::GameStarted] {
        let seen = Rc::clone(&seen);
        bus.subscribe_fn(kind, "recorder", move |event| {
            seen.borrow_mut().push(event.kind());
            Ok(())
        });
    }

    store.start_game().unwrap();

    let seen = seen.borrow();
    assert_eq!(
        seen.iter()
            .filter(|&&k| k == EventKind::PlayerRoleAssigned)
            .count(),
        4
    );
    // Roles are assigned before the game-started notification goes out.
    assert_eq!(seen.last(), Some(&EventKind::GameStarted));
}

// ============================================================================
// Kills and win conditions
// ============================================================================

#[test]
fn test_kill_player_is_idempotent_through_store() {
    let (bus, store) = ready_store();
    store.start_game().unwrap();

    assert!(store.kill_player("alice"));
    assert!(!store.kill_player("alice"));
    assert!(!store.state().player("alice").unwrap().is_alive());
    assert!(!store.state().is_alive("alice"));

    let deaths = bus.recent_events(None, Some(EventKind::PlayerDied));
    assert_eq!(deaths.len(), 1);
}

#[test]
fn test_kill_before_start_is_rejected() {
    let (_bus, store) = ready_store();
    assert!(!store.kill_player("alice"));
    assert!(store.state().is_alive("alice"));
}

#[test]
fn test_tie_favors_werewolf_team() {
    let (bus, store) = ready_store();
    store.start_game().unwrap();

    // Kill villagers until one werewolf and one villager remain.
    let villagers: Vec<String> = store
        .state()
        .players()
        .iter()
        .filter(|p| p.role() == Some(Role::Villager))
        .map(|p| p.name.clone())
        .collect();
    store.kill_player(&villagers[0]);
    store.kill_player(&villagers[1]);

    let endings = bus.recent_events(None, Some(EventKind::GameEnded));
    assert_eq!(endings.len(), 1);
    match &endings[0].payload {
        EventPayload::GameEnded {
            winning_team,
            werewolf_count,
            villager_count,
            ..
        } => {
            assert_eq!(*winning_team, Team::Werewolf);
            assert_eq!(*werewolf_count, 1);
            assert_eq!(*villager_count, 1);
        }
        other => panic!("unexpected payload: {other:?}"),
    }
}

#[test]
fn test_village_wins_when_werewolves_die_out() {
    let (bus, store) = ready_store();
    store.start_game().unwrap();

    let werewolf = store
        .state()
        .players()
        .iter()
        .find(|p| p.role() == Some(Role::Werewolf))
        .map(|p| p.name.clone())
        .unwrap();
    store.kill_player(&werewolf);

    let endings = bus.recent_events(None, Some(EventKind::GameEnded));
    assert_eq!(endings.len(), 1);
    match &endings[0].payload {
        EventPayload::GameEnded { winning_team, .. } => {
            assert_eq!(*winning_team, Team::Village);
        }
        other => panic!("unexpected payload: {other:?}"),
    }
}

// ============================================================================
// Phases and rounds
// ============================================================================

#[test]
fn test_phase_changes_are_unchecked_while_active() {
    let (bus, store) = ready_store();
    assert!(!store.change_phase(Phase::Night));

    store.start_game().unwrap();
    assert!(store.change_phase(Phase::Night));
    assert!(store.change_phase(Phase::DayVote));
    assert!(store.change_phase(Phase::DayDiscussion));

    let changes = bus.recent_events(None, Some(EventKind::PhaseChanged));
    assert_eq!(changes.len(), 3);
    match &changes[0].payload {
        EventPayload::PhaseChanged {
            old_phase,
            new_phase,
            ..
        } => {
            assert_eq!(*old_phase, Phase::DayDiscussion);
            assert_eq!(*new_phase, Phase::Night);
        }
        other => panic!("unexpected payload: {other:?}"),
    }
}

#[test]
fn test_next_round_returns_to_day_discussion() {
    let (bus, store) = ready_store();
    store.start_game().unwrap();
    store.change_phase(Phase::Night);

    store.next_round();
    assert_eq!(store.state().round(), 2);
    assert_eq!(store.state().phase(), Phase::DayDiscussion);

    store.next_round();
    assert_eq!(store.state().round(), 3);
    assert_eq!(
        bus.recent_events(None, Some(EventKind::RoundChanged)).len(),
        2
    );
}

// ============================================================================
// Reset
// ============================================================================

#[test]
fn test_reset_preserves_roster_and_clears_lifecycle() {
    let (_bus, store) = ready_store();
    store.start_game().unwrap();
    store.kill_player("alice");
    store.add_game_log("vote", "alice was executed");

    let names_before: Vec<String> = store
        .state()
        .players()
        .iter()
        .map(|p| p.name.clone())
        .collect();

    store.reset_game();

    let state = store.state();
    assert_eq!(state.phase(), Phase::Setup);
    assert_eq!(state.round(), 0);
    assert!(!state.is_game_active());
    assert!(!state.is_regulation_confirmed());
    assert!(!state.is_players_confirmed());
    assert!(state.regulation().is_none());
    assert!(state.alive_players().is_empty());

    let names_after: Vec<String> = state.players().iter().map(|p| p.name.clone()).collect();
    assert_eq!(names_before, names_after);
    for player in state.players() {
        assert!(player.is_alive());
        assert_eq!(player.role(), None);
    }
}

// ============================================================================
// Event-driven observers
// ============================================================================

#[test]
fn test_external_death_event_is_translated_into_a_kill() {
    let (bus, store) = ready_store();
    store.start_game().unwrap();
    assert!(store.state().is_alive("bob"));

    // An external collaborator (e.g. a vote manager) announces a death it
    // has not applied; the store routes it through the engine.
    bus.publish(GameEvent::new(
        EventPayload::PlayerDied {
            name: "bob".to_string(),
            role: None,
            phase: Phase::DayVote,
            round: 1,
        },
        EventSource::External,
    ))
    .unwrap();

    assert!(!store.state().is_alive("bob"));
    assert!(!store.state().player("bob").unwrap().is_alive());
    // Exactly one follow-up death event from the engine, plus the external
    // announcement itself.
    let deaths = bus.recent_events(None, Some(EventKind::PlayerDied));
    assert_eq!(deaths.len(), 2);
    assert_eq!(deaths[0].source, EventSource::External);
    assert_eq!(deaths[1].source, EventSource::GameState);
}

#[test]
fn test_failing_observer_does_not_break_the_session() {
    let (bus, store) = ready_store();
    bus.subscribe_fn(EventKind::GameStarted, "broken_ui", |_| {
        Err(anyhow::anyhow!("widget exploded"))
    });

    store.start_game().unwrap();
    assert!(store.state().is_game_active());
    assert_eq!(bus.recent_events(None, Some(EventKind::Error)).len(), 1);
}
