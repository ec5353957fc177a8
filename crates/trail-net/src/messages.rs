//! Wire message types.
//!
//! Two shapes cross the wire: clients send [`Action`]s, the server sends
//! [`Snapshot`]s. Both travel inside [`Message`], serialized with
//! [`postcard`] behind a protocol version byte.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use trail_multiplayer::{GameState, Player, PlayerCommand, Weather};

/// Current wire-protocol version. Prepended to every serialized message.
pub const PROTOCOL_VERSION: u8 = 1;

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Top-level network message. The enum discriminant is the type tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Client → server: a player's requested action.
    Action(Action),
    /// Server → client: the full canonical state.
    Snapshot(Snapshot),
}

/// A player's requested action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Acting player's name.
    pub player: String,
    /// What the player wants to do. `EventChoice` carries the choice.
    pub command: PlayerCommand,
    /// Skill levels as the client believes them to be. Never trusted.
    pub skills: Option<BTreeMap<String, i32>>,
}

impl Action {
    /// An action without reported skills.
    pub fn new(player: impl Into<String>, command: PlayerCommand) -> Self {
        Self {
            player: player.into(),
            command,
            skills: None,
        }
    }
}

/// Full copy of the canonical game state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Every player, ordered by name.
    pub players: Vec<Player>,
    /// Trail length in steps.
    pub trail_length: u32,
    /// Landmarks keyed by position.
    pub landmarks: BTreeMap<u32, String>,
    /// Trail-wide weather.
    pub current_weather: Weather,
    /// Day counter.
    pub day: u32,
}

impl Snapshot {
    /// Looks up a player by name.
    pub fn player(&self, name: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.name == name)
    }
}

impl From<&GameState> for Snapshot {
    fn from(state: &GameState) -> Self {
        Self {
            players: state.players.values().cloned().collect(),
            trail_length: state.trail_length,
            landmarks: state.landmarks.clone(),
            current_weather: state.weather,
            day: state.day,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A payload that is not a valid message. Dropping the message and keeping
/// the connection is always safe.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// The payload was empty (no version byte).
    #[error("empty payload, no version byte")]
    EmptyPayload,

    /// The version byte does not match [`PROTOCOL_VERSION`].
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// Postcard could not decode (or encode) the body.
    #[error("postcard error: {0}")]
    Postcard(#[from] postcard::Error),

    /// The compression envelope is invalid.
    #[error("compression error: {0}")]
    Compression(#[from] crate::compression::CompressionError),

    /// Structurally valid, semantically not.
    #[error("invalid field {field}: {reason}")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

// ---------------------------------------------------------------------------
// Serialization helpers
// ---------------------------------------------------------------------------

/// Serializes a [`Message`] as `[version: u8] [postcard body]`.
pub fn serialize_message(msg: &Message) -> Result<Vec<u8>, MessageError> {
    Ok(postcard::to_extend(msg, vec![PROTOCOL_VERSION])?)
}

/// Parses a versioned payload and validates it.
///
/// Only the canonical encoding is accepted: overlong varints or trailing
/// bytes are rejected, so re-serializing a decoded message always yields
/// the input bytes.
pub fn deserialize_message(data: &[u8]) -> Result<Message, MessageError> {
    let (&version, body) = data.split_first().ok_or(MessageError::EmptyPayload)?;
    if version != PROTOCOL_VERSION {
        return Err(MessageError::UnsupportedVersion(version));
    }
    let msg: Message = postcard::from_bytes(body)?;
    if serialize_message(&msg)? != data {
        return Err(MessageError::InvalidField {
            field: "payload",
            reason: "non-canonical encoding",
        });
    }
    validate(&msg)?;
    Ok(msg)
}

fn validate(msg: &Message) -> Result<(), MessageError> {
    match msg {
        Message::Action(action) if action.player.trim().is_empty() => {
            Err(MessageError::InvalidField {
                field: "player",
                reason: "name is empty",
            })
        }
        Message::Action(_) => Ok(()),
        Message::Snapshot(snapshot) => {
            if snapshot.players.iter().any(|p| p.position > snapshot.trail_length) {
                return Err(MessageError::InvalidField {
                    field: "players",
                    reason: "position beyond trail length",
                });
            }
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use trail_multiplayer::{Event, EventKind};

    fn sample_snapshot() -> Snapshot {
        let mut state = GameState::default();
        let alice = state.player_or_insert("Alice");
        alice.position = 12;
        alice.active_effects.insert("illness".into());
        alice.event_log.push(
            Event::notice(EventKind::Illness, "A member of your party has fallen ill.", 7)
                .with_choice("rest", "Rest", Default::default()),
        );
        state.player_or_insert("Bob");
        Snapshot::from(&state)
    }

    #[test]
    fn test_action_roundtrip() {
        let msg = Message::Action(Action {
            player: "Alice".into(),
            command: PlayerCommand::EventChoice {
                event_time: 1_700_000_000_123,
                choice: "rest".into(),
            },
            skills: Some(BTreeMap::from([("hunting".into(), 3)])),
        });
        let bytes = serialize_message(&msg).unwrap();
        assert_eq!(bytes[0], PROTOCOL_VERSION);
        assert_eq!(deserialize_message(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_snapshot_roundtrip_is_byte_stable() {
        let msg = Message::Snapshot(sample_snapshot());
        let bytes = serialize_message(&msg).unwrap();
        let decoded = deserialize_message(&bytes).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(serialize_message(&decoded).unwrap(), bytes);
    }

    #[test]
    fn test_snapshot_mirrors_state() {
        let snapshot = sample_snapshot();
        assert_eq!(snapshot.players.len(), 2);
        assert_eq!(snapshot.players[0].name, "Alice");
        assert_eq!(snapshot.player("Alice").unwrap().position, 12);
        assert_eq!(snapshot.trail_length, 100);
        assert_eq!(snapshot.day, 1);
        assert_eq!(snapshot.landmarks.get(&25).map(String::as_str), Some("Fort Kearney"));
    }

    #[test]
    fn test_empty_player_name_is_malformed() {
        let msg = Message::Action(Action::new("  ", PlayerCommand::Move));
        let bytes = serialize_message(&msg).unwrap();
        assert!(matches!(
            deserialize_message(&bytes),
            Err(MessageError::InvalidField { field: "player", .. })
        ));
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let mut bytes = serialize_message(&Message::Action(Action::new("A", PlayerCommand::Hunt)))
            .unwrap();
        bytes[0] = 9;
        assert!(matches!(
            deserialize_message(&bytes),
            Err(MessageError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn test_truncated_and_garbage_payloads_rejected() {
        assert!(matches!(
            deserialize_message(&[]),
            Err(MessageError::EmptyPayload)
        ));
        assert!(matches!(
            deserialize_message(&[PROTOCOL_VERSION, 0x09, 0xFF]),
            Err(MessageError::Postcard(_))
        ));

        let bytes = serialize_message(&Message::Snapshot(sample_snapshot())).unwrap();
        assert!(deserialize_message(&bytes[..bytes.len() / 2]).is_err());
    }

    #[test]
    fn test_non_canonical_body_rejected() {
        let bytes = serialize_message(&Message::Action(Action::new("Bob", PlayerCommand::Hunt)))
            .unwrap();
        let mut padded = bytes.clone();
        padded.extend_from_slice(&[0x01, 0x02]);
        assert!(matches!(
            deserialize_message(&padded),
            Err(MessageError::InvalidField {
                reason: "non-canonical encoding",
                ..
            })
        ));
        assert!(deserialize_message(&bytes).is_ok());
    }
}
