// Wire protocol between the engine host and window clients.
//
// Every frame on the sync channel is a [`WireMessage`] envelope. Windows
// send `COMMAND` frames to mutate the game and receive `STATE_UPDATE`
// frames carrying the full canonical state; there is no field-level patching
// on the wire.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::entrant::EntrantDraft;
use crate::game::now_ms;
use crate::game::state::GameState;

/// Top-level envelope for every sync-channel frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WireMessage {
    /// Full-state broadcast. Receivers replace their local state wholesale.
    StateUpdate { timestamp: i64, payload: GameState },
    /// An operator window requesting an engine operation.
    Command { timestamp: i64, payload: GameCommand },
}

impl WireMessage {
    /// Wrap the current state in a timestamped broadcast envelope.
    pub fn state_update(state: GameState) -> Self {
        WireMessage::StateUpdate {
            timestamp: now_ms(),
            payload: state,
        }
    }

    /// Wrap a command in a timestamped envelope.
    pub fn command(command: GameCommand) -> Self {
        WireMessage::Command {
            timestamp: now_ms(),
            payload: command,
        }
    }
}

/// The operation vocabulary exposed to operator windows. Each variant maps
/// onto exactly one engine operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum GameCommand {
    RegisterParticipant { name: String },
    AddEntrant { entrant: EntrantDraft },
    /// Bulk pool load; checkpointed once for the whole batch.
    AddEntrants { entrants: Vec<EntrantDraft> },
    RemoveEntrant { id: Uuid },
    DraftPick { id: Uuid },
    EnterRing { id: Uuid },
    Eliminate { id: Uuid, eliminated_by: Vec<Uuid> },
    SetParticipantScore { id: Uuid, score: f64 },
    SetDrafting { drafting: bool },
    /// Free-form operator note appended to the event feed.
    AddLog { message: String },
    Undo,
    ResetGame,
    ImportState { json: String },
    ExportState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_update_envelope_has_wire_tag() {
        let msg = WireMessage::state_update(GameState::default());
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["type"], "STATE_UPDATE");
        assert!(v["timestamp"].as_i64().is_some());
        assert!(v["payload"]["isDrafting"].as_bool().unwrap());
    }

    #[test]
    fn command_envelope_round_trips() {
        let id = Uuid::new_v4();
        let other = Uuid::new_v4();
        let msg = WireMessage::command(GameCommand::Eliminate {
            id,
            eliminated_by: vec![other],
        });

        let json = serde_json::to_string(&msg).unwrap();
        let back: WireMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn command_ops_use_camel_case_names() {
        let msg = WireMessage::command(GameCommand::RegisterParticipant {
            name: "Alice".into(),
        });
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["type"], "COMMAND");
        assert_eq!(v["payload"]["op"], "registerParticipant");
        assert_eq!(v["payload"]["name"], "Alice");
    }

    #[test]
    fn hand_written_command_json_parses() {
        let text = r#"{"type":"COMMAND","timestamp":123,"payload":{"op":"setDrafting","drafting":false}}"#;
        let msg: WireMessage = serde_json::from_str(text).unwrap();
        assert_eq!(
            msg,
            WireMessage::Command {
                timestamp: 123,
                payload: GameCommand::SetDrafting { drafting: false },
            }
        );
    }
}
