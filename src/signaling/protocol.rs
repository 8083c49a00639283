#![forbid(unsafe_code)]

// Signaling protocol - message types for WebSocket communication

use crate::poker::{Role, RoomStatus};
use serde::{Deserialize, Serialize};

/// Client-to-Server messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Join a room under a display name
    #[serde(rename_all = "camelCase")]
    JoinRoom { room_id: String, player_name: String },
    /// Remove another player from the room (admin only)
    #[serde(rename_all = "camelCase")]
    KickPlayer { target_id: String },
    /// Rename self, or any player when acting as admin
    #[serde(rename_all = "camelCase")]
    ChangeName { target_id: String, new_name: String },
    /// Toggle a player's voting eligibility (admin only)
    #[serde(rename_all = "camelCase")]
    UpdateVotingStatus { target_id: String, can_vote: bool },
    /// Hand the admin role to another player (admin only)
    #[serde(rename_all = "camelCase")]
    TransferAdmin { target_id: String },
    /// Cast or change a vote for the current round
    ChooseCard { choice: String },
    /// Override a revealed vote (admin only)
    #[serde(rename_all = "camelCase")]
    AdminChangePlayerChoice { target_id: String, choice: String },
    /// Clear all votes and start a fresh round (admin only)
    #[serde(rename_all = "camelCase")]
    Reset { room_id: String },
    /// Disclose all votes (admin only)
    #[serde(rename_all = "camelCase")]
    RevealCards { room_id: String },
}

/// Server-to-Client messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Sanitized room state, pushed to the whole room on every change
    RoomUpdate {
        #[serde(flatten)]
        room: RoomSnapshot,
    },
    /// A player was removed by the admin
    #[serde(rename_all = "camelCase")]
    PlayerKicked { target_id: String },
    /// The room's admin disconnected (a successor is promoted right after)
    AdminDisconnected,
    /// Private error for a failed operation
    Error { message: String },
}

/// Outward room state. Vote values are sanitized by the snapshot builder:
/// hidden behind a has-voted flag until reveal. The statistics fields are
/// only present while the room is in REVEAL and at least one numeric vote
/// was cast.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub id: String,
    pub status: RoomStatus,
    pub players: Vec<PlayerView>,
    pub voted_players_count: usize,
    pub voting_players_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_choice: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_choice: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_choice: Option<f64>,
}

/// Per-player entry of the room snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub id: String,
    pub name: String,
    pub can_vote: bool,
    pub choice: ChoiceView,
    pub role: Role,
}

/// Wire shape of a player's vote: the literal value after reveal, a
/// has-voted flag before it, `false` for not-voted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChoiceView {
    Value(String),
    Voted(bool),
}
