// Notification channel wire protocol.
//
// Inbound push messages are JSON objects tagged by `type`. They are decoded
// here, at the channel boundary, into the typed `InboundEvent` union; anything
// that fails validation becomes a `MalformedEvent` and never reaches the
// session state machine. Outbound join requests are built and serialized here
// as well.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::roster::Player;
use crate::session::{GameMode, Pairing};

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// A decoded matchmaking push event.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    TournamentPlayerJoined {
        players: Vec<Player>,
        /// The player whose join triggered this snapshot, when sent.
        joined: Option<Player>,
    },
    TournamentReady {
        pairings: Vec<Pairing>,
    },
    RandomMatchPlayerJoined {
        players: Vec<Player>,
        joined: Option<Player>,
    },
    RandomMatchReady {
        room_id: String,
    },
}

impl InboundEvent {
    /// Wire `type` tag of the event.
    pub fn kind(&self) -> &'static str {
        match self {
            InboundEvent::TournamentPlayerJoined { .. } => "tournament_player_joined",
            InboundEvent::TournamentReady { .. } => "tournament_ready",
            InboundEvent::RandomMatchPlayerJoined { .. } => "random_match_player_joined",
            InboundEvent::RandomMatchReady { .. } => "random_match_ready",
        }
    }
}

/// Why an inbound message was rejected.
#[derive(Debug, Error)]
pub enum MalformedEvent {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("message has no `type` field")]
    MissingType,

    #[error("server reported an error: {0}")]
    ServerError(String),

    #[error("unknown message type `{0}`")]
    UnknownType(String),

    #[error("invalid `{kind}` payload: {source}")]
    InvalidPayload {
        kind: String,
        source: serde_json::Error,
    },

    #[error("invalid `{kind}` payload: {reason}")]
    InvalidField { kind: String, reason: String },

    #[error("rejected `{kind}` snapshot: {source}")]
    Roster {
        kind: String,
        source: crate::roster::RosterError,
    },
}

/// Message types that share the notification channel but belong to other
/// features (notifications, invites, presence, tournament finals).
pub const FOREIGN_TYPES: &[&str] = &[
    "notification",
    "invite",
    "invite_accepted",
    "user_status_update",
    "tournament_final",
];

#[derive(Debug, Deserialize)]
struct WirePlayer {
    username: String,
    #[serde(default)]
    avatar: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireMessage {
    TournamentPlayerJoined {
        current_players: Vec<WirePlayer>,
        #[serde(default)]
        player: Option<WirePlayer>,
    },
    TournamentReady {
        pairings: Vec<[String; 2]>,
    },
    RandomMatchPlayerJoined {
        current_players: Vec<WirePlayer>,
        #[serde(default)]
        player: Option<WirePlayer>,
    },
    RandomMatchReady {
        #[serde(rename = "roomId")]
        room_id: String,
    },
}

/// Decode one raw channel message.
///
/// Returns `Ok(None)` for well-formed messages addressed to other features
/// on the shared channel (see [`FOREIGN_TYPES`]).
pub fn decode(text: &str) -> Result<Option<InboundEvent>, MalformedEvent> {
    let value: Value = serde_json::from_str(text).map_err(MalformedEvent::InvalidJson)?;

    let kind = match value.get("type").and_then(Value::as_str) {
        Some(kind) => kind.to_string(),
        None => {
            // The server answers unparseable frames with `{"error": "..."}`.
            if let Some(message) = value.get("error").and_then(Value::as_str) {
                return Err(MalformedEvent::ServerError(message.to_string()));
            }
            return Err(MalformedEvent::MissingType);
        }
    };

    if FOREIGN_TYPES.contains(&kind.as_str()) {
        return Ok(None);
    }

    let wire: WireMessage = match kind.as_str() {
        "tournament_player_joined"
        | "tournament_ready"
        | "random_match_player_joined"
        | "random_match_ready" => serde_json::from_value(value)
            .map_err(|source| MalformedEvent::InvalidPayload {
                kind: kind.clone(),
                source,
            })?,
        _ => return Err(MalformedEvent::UnknownType(kind)),
    };

    let event = match wire {
        WireMessage::TournamentPlayerJoined {
            current_players,
            player,
        } => InboundEvent::TournamentPlayerJoined {
            players: convert_players(&kind, current_players)?,
            joined: player.map(|p| convert_player(&kind, p)).transpose()?,
        },
        WireMessage::RandomMatchPlayerJoined {
            current_players,
            player,
        } => InboundEvent::RandomMatchPlayerJoined {
            players: convert_players(&kind, current_players)?,
            joined: player.map(|p| convert_player(&kind, p)).transpose()?,
        },
        WireMessage::TournamentReady { pairings } => InboundEvent::TournamentReady {
            pairings: pairings
                .into_iter()
                .map(|[first, second]| Pairing::new(first, second))
                .collect(),
        },
        WireMessage::RandomMatchReady { room_id } => {
            if room_id.trim().is_empty() {
                return Err(invalid_field(&kind, "empty roomId"));
            }
            InboundEvent::RandomMatchReady { room_id }
        }
    };

    Ok(Some(event))
}

fn convert_players(kind: &str, wire: Vec<WirePlayer>) -> Result<Vec<Player>, MalformedEvent> {
    wire.into_iter().map(|p| convert_player(kind, p)).collect()
}

fn convert_player(kind: &str, wire: WirePlayer) -> Result<Player, MalformedEvent> {
    if wire.username.is_empty() {
        return Err(invalid_field(kind, "player with empty username"));
    }
    Ok(Player {
        username: wire.username,
        avatar_url: wire.avatar.unwrap_or_default(),
    })
}

fn invalid_field(kind: &str, reason: &str) -> MalformedEvent {
    MalformedEvent::InvalidField {
        kind: kind.to_string(),
        reason: reason.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// A message sent to the server over the notification channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    TournamentJoin(JoinRequest),
    RandomMatch(JoinRequest),
    /// Ask the server for the current online-user list.
    GetOnlineUsers,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinRequest {
    pub username: String,
    pub title: String,
    pub message: String,
    pub data: JoinData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinData {
    pub game_mode: GameMode,
    pub username: String,
    pub avatar: String,
}

impl OutboundMessage {
    /// Build the join request for `mode` on behalf of the local user.
    pub fn join(mode: GameMode, username: &str, avatar: &str) -> Self {
        let data = JoinData {
            game_mode: mode,
            username: username.to_string(),
            avatar: avatar.to_string(),
        };
        match mode {
            GameMode::Tournament => OutboundMessage::TournamentJoin(JoinRequest {
                username: username.to_string(),
                title: "Tournament Entry".to_string(),
                message: format!("{username} joined the tournament"),
                data,
            }),
            GameMode::Random => OutboundMessage::RandomMatch(JoinRequest {
                username: username.to_string(),
                title: "Random Match".to_string(),
                message: format!("{username} is looking for a match"),
                data,
            }),
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
