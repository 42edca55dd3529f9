//! WebSocket protocol messages.
//!
//! Inbound frames are `{action, payload?}` envelopes. They are parsed into a
//! closed [`ClientMessage`] at the connection, so the game actor never sees an
//! untyped payload.

use monopoly_core::{ChatEntry, GameAction, GameState, PlayerId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Longest accepted chat line, in characters
pub const MAX_CHAT_LEN: usize = 500;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("invalid payload for {action}: {reason}")]
    InvalidPayload { action: String, reason: String },
}

/// Raw inbound frame
#[derive(Debug, Deserialize)]
struct Envelope {
    action: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinPayload {
    #[serde(default)]
    pub name: String,
    pub color: Option<String>,
    /// External account for reattaching on reconnect
    pub account: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddNpcPayload {
    pub name: Option<String>,
    /// Decision strategy, e.g. `easy`, `medium` or `hard`
    pub delegate: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddLocalPlayersPayload {
    pub names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPayload {
    #[serde(alias = "message")]
    pub text: String,
}

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// Take a seat, or reattach to the seat bound to an account
    Join(JoinPayload),
    /// Seat a non-human player
    AddNpc(AddNpcPayload),
    /// Seat several human players driven from this connection
    AddLocalPlayers(AddLocalPlayersPayload),
    Chat(ChatPayload),
    /// Anything the rules engine handles
    Game(GameAction),
    /// Keepalive, answered at the connection
    Ping,
}

impl ClientMessage {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let Envelope { action, payload } = serde_json::from_str(text)?;

        let invalid = |e: serde_json::Error| ProtocolError::InvalidPayload {
            action: action.clone(),
            reason: e.to_string(),
        };
        let payload_or_empty = || match &payload {
            Value::Null => Value::Object(Default::default()),
            other => other.clone(),
        };

        let message = match action.as_str() {
            "ping" => ClientMessage::Ping,
            "join" => ClientMessage::Join(
                serde_json::from_value(payload_or_empty()).map_err(invalid)?,
            ),
            "addNPC" | "addNpc" => ClientMessage::AddNpc(
                serde_json::from_value(payload_or_empty()).map_err(invalid)?,
            ),
            "addLocalPlayers" => ClientMessage::AddLocalPlayers(
                serde_json::from_value(payload_or_empty()).map_err(invalid)?,
            ),
            "chat" => {
                let chat: ChatPayload = serde_json::from_value(payload.clone()).map_err(invalid)?;
                if chat.text.trim().is_empty() {
                    return Err(ProtocolError::InvalidPayload {
                        action: action.clone(),
                        reason: "empty chat message".to_string(),
                    });
                }
                ClientMessage::Chat(ChatPayload {
                    text: chat.text.trim().chars().take(MAX_CHAT_LEN).collect(),
                })
            }
            other => ClientMessage::Game(parse_game_action(other, &payload).ok_or_else(|| {
                ProtocolError::UnknownAction(other.to_string())
            })??),
        };
        Ok(message)
    }
}

/// `None` when the action name is not a game action at all
fn parse_game_action(
    action: &str,
    payload: &Value,
) -> Option<Result<GameAction, ProtocolError>> {
    const GAME_ACTIONS: &[&str] = &[
        "rollDice",
        "buyProperty",
        "endTurn",
        "payJailFine",
        "useJailCard",
        "buildHouse",
        "sellHouse",
        "mortgage",
        "unmortgage",
        "giveMoney",
        "transferProperty",
        "proposeTrade",
        "acceptTrade",
        "rejectTrade",
        "startAuction",
        "placeBid",
    ];
    if !GAME_ACTIONS.contains(&action) {
        return None;
    }

    let mut envelope = serde_json::Map::new();
    envelope.insert("action".to_string(), Value::String(action.to_string()));
    // `{}` and `null` both mean "no arguments"
    let empty = payload.is_null() || payload.as_object().is_some_and(|o| o.is_empty());
    if !empty {
        envelope.insert("payload".to_string(), payload.clone());
    }
    Some(
        serde_json::from_value(Value::Object(envelope)).map_err(|e| {
            ProtocolError::InvalidPayload {
                action: action.to_string(),
                reason: e.to_string(),
            }
        }),
    )
}

/// Who is connected, for the presence summary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    /// Sessions controlling at least one player
    pub players: usize,
    /// Sessions watching without a seat
    pub spectators: usize,
    /// Players with at least one live session
    pub online: Vec<PlayerId>,
}

/// Full state broadcast payload
#[derive(Debug, Serialize)]
pub struct StateUpdate<'a> {
    #[serde(flatten)]
    pub game: &'a GameState,
    pub presence: Presence,
}

/// Messages sent from server to client.
#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage<'a> {
    /// Sent once to the joining session
    Welcome { id: PlayerId },

    GameStateUpdate(StateUpdate<'a>),

    ChatMessage(&'a ChatEntry),
}

impl ServerMessage<'_> {
    pub fn to_text(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Reply for malformed input and seat rejections
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub error: String,
}

impl ErrorReply {
    pub fn new(error: impl ToString) -> Self {
        Self {
            error: error.to_string(),
        }
    }

    pub fn to_text(&self) -> String {
        serde_json::json!({ "error": self.error }).to_string()
    }
}
