//! Werewolf game engine - entities and the phase/round state machine.
//!
//! This module provides the foundational game implementation including:
//! - Roles, teams, phases, players, and regulations
//! - The [`GameState`] lifecycle (confirmations, start, kill, rounds, reset)
//! - Role assignment and win-condition evaluation
//! - Event generation for every mutation

pub mod constants;
pub mod entities;
pub mod state_machine;

pub use entities::{
    GameLogEntry, InvalidRoleError, Phase, Player, Regulation, Role, RoundTime, StatusRecord,
    Team,
};
pub use state_machine::{GameSnapshot, GameState, StateError, TeamCounts};
