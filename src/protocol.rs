//! Wire protocol: JSON messages exchanged over the room WebSocket.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::cards::Card;
use crate::engine::RoundOutcome;

/// Player identity as supplied by the client on join. Chips are optional;
/// the server assigns a default balance when absent.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JoinPlayer {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub chips: Option<i64>,
}

/// Public per-player summary: everything except the hand itself.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PlayerSummary {
    pub id: String,
    pub name: String,
    pub hand_size: usize,
    pub score: i64,
    pub chips: i64,
    pub ready: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RoomSummary {
    pub id: String,
    pub mode: String,
    pub multiplier: i64,
    pub min_chips: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReadyFlag {
    pub id: String,
    pub ready: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientToServer {
    Ping,
    ListRooms,
    Join {
        room_id: String,
        player: JoinPlayer,
    },
    Ready {
        room_id: String,
        player_id: String,
    },
    Move {
        room_id: String,
        player_id: String,
        discard: Vec<Card>,
    },
    Declare {
        room_id: String,
        player_id: String,
    },
    Chat {
        room_id: String,
        from: String,
        message: String,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerToClient {
    Pong,
    RoomList {
        rooms: Vec<RoomSummary>,
    },
    PlayerJoined {
        players: Vec<PlayerSummary>,
    },
    WaitingForPlayers {
        room_id: String,
    },
    ReadyStatus {
        players: Vec<ReadyFlag>,
    },
    CountdownToStart {
        seconds: u64,
    },
    RoundStarted {
        players: Vec<PlayerSummary>,
        discard_top: Option<Card>,
        deck_count: usize,
    },
    /// Sent privately to each seated player when a round starts.
    HandDealt {
        hand: Vec<Card>,
    },
    PlayerMoved {
        player_id: String,
        discard: Vec<Card>,
        hand: Vec<Card>,
        drawn_card: Card,
    },
    PlayerStates {
        players: Vec<PlayerSummary>,
    },
    Turn {
        player_id: String,
        name: String,
    },
    DeclarationResult {
        outcome: RoundOutcome,
        challenger: Option<String>,
        scores: HashMap<String, i64>,
        chip_deltas: HashMap<String, i64>,
    },
    RoundCountdown {
        seconds: u64,
    },
    /// Read-only snapshot for connections admitted as observers.
    SpectatorMode {
        room_id: String,
        discard_top: Option<Card>,
        deck_count: usize,
        players: Vec<PlayerSummary>,
    },
    JoinDenied {
        reason: String,
    },
    Denied {
        action: String,
        reason: String,
    },
    PlayerLeft {
        player_id: String,
    },
    Chat {
        from: String,
        message: String,
        at: i64,
    },
    Error {
        message: String,
    },
}
