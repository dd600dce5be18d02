//! Regulation document validation.
//!
//! Regulations arrive from the outside world as JSON (preset files, UI
//! forms). Validation happens here, before anything touches game state:
//! a document that fails any check is rejected wholesale.

use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::game::entities::{InvalidRoleError, Regulation, Role, RoundTime};

/// A regulation document failed validation. State is untouched.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum ValidationError {
    #[error("regulation must be an object")]
    NotAnObject,
    #[error("regulation is missing required field `{0}`")]
    MissingField(&'static str),
    #[error(transparent)]
    UnknownRole(#[from] InvalidRoleError),
    #[error("role count for `{role}` must be a non-negative integer")]
    InvalidRoleCount { role: Role },
    #[error("round time at index {index} must be a non-negative integer")]
    InvalidRoundTime { index: usize },
    #[error("`total_players` must be a non-negative integer")]
    InvalidTotalPlayers,
}

/// Parse and validate a raw regulation document.
///
/// Checks, in order: the document is an object with `roles`,
/// `round_times`, and `total_players`; every role id is recognized;
/// every count and time is a non-negative integer.
///
/// # Errors
///
/// The first failed check, as a [`ValidationError`].
pub fn parse_regulation(document: &Value) -> Result<Regulation, ValidationError> {
    let object = document.as_object().ok_or(ValidationError::NotAnObject)?;

    let raw_roles = object
        .get("roles")
        .and_then(Value::as_object)
        .ok_or(ValidationError::MissingField("roles"))?;
    let raw_times = object
        .get("round_times")
        .and_then(Value::as_array)
        .ok_or(ValidationError::MissingField("round_times"))?;
    let total_players = object
        .get("total_players")
        .ok_or(ValidationError::MissingField("total_players"))?
        .as_u64()
        .ok_or(ValidationError::InvalidTotalPlayers)? as usize;

    let mut roles = BTreeMap::new();
    for (id, count) in raw_roles {
        let role: Role = id.parse()?;
        let count = count
            .as_u64()
            .ok_or(ValidationError::InvalidRoleCount { role })?;
        roles.insert(role, count as u32);
    }

    let mut round_times = Vec::with_capacity(raw_times.len());
    for (index, entry) in raw_times.iter().enumerate() {
        let time = entry
            .get("time")
            .and_then(Value::as_u64)
            .ok_or(ValidationError::InvalidRoundTime { index })?;
        let round = entry
            .get("round")
            .and_then(Value::as_u64)
            .unwrap_or((index + 1) as u64);
        round_times.push(RoundTime {
            round: round as u32,
            time: time as u32,
        });
    }

    Ok(Regulation {
        roles,
        round_times,
        total_players,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_document() -> Value {
        json!({
            "roles": {"villager": 3, "werewolf": 1},
            "round_times": [{"round": 1, "time": 180}, {"round": 2, "time": 120}],
            "total_players": 4
        })
    }

    #[test]
    fn test_valid_document_parses() {
        let regulation = parse_regulation(&valid_document()).unwrap();
        assert_eq!(regulation.roles[&Role::Villager], 3);
        assert_eq!(regulation.roles[&Role::Werewolf], 1);
        assert_eq!(regulation.round_times.len(), 2);
        assert_eq!(regulation.total_players, 4);
        assert_eq!(regulation.total_roles(), 4);
    }

    #[test]
    fn test_missing_fields_are_rejected() {
        let mut doc = valid_document();
        doc.as_object_mut().unwrap().remove("roles");
        assert_eq!(
            parse_regulation(&doc),
            Err(ValidationError::MissingField("roles"))
        );

        let mut doc = valid_document();
        doc.as_object_mut().unwrap().remove("round_times");
        assert_eq!(
            parse_regulation(&doc),
            Err(ValidationError::MissingField("round_times"))
        );

        let mut doc = valid_document();
        doc.as_object_mut().unwrap().remove("total_players");
        assert_eq!(
            parse_regulation(&doc),
            Err(ValidationError::MissingField("total_players"))
        );
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        let doc = json!({
            "roles": {"vampire": 1},
            "round_times": [],
            "total_players": 1
        });
        assert_eq!(
            parse_regulation(&doc),
            Err(ValidationError::UnknownRole(InvalidRoleError(
                "vampire".to_string()
            )))
        );
    }

    #[test]
    fn test_non_integer_time_is_rejected() {
        let doc = json!({
            "roles": {"villager": 1},
            "round_times": [{"round": 1, "time": "long"}],
            "total_players": 1
        });
        assert_eq!(
            parse_regulation(&doc),
            Err(ValidationError::InvalidRoundTime { index: 0 })
        );
    }

    #[test]
    fn test_non_object_is_rejected() {
        assert_eq!(
            parse_regulation(&json!([1, 2, 3])),
            Err(ValidationError::NotAnObject)
        );
    }

    #[test]
    fn test_round_defaults_to_position() {
        let doc = json!({
            "roles": {"villager": 1},
            "round_times": [{"time": 60}, {"time": 90}],
            "total_players": 1
        });
        let regulation = parse_regulation(&doc).unwrap();
        assert_eq!(regulation.round_times[0].round, 1);
        assert_eq!(regulation.round_times[1].round, 2);
    }
}
