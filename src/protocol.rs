//! Wire protocol types for the Sudoku duel realtime channel.
//!
//! Every realtime frame is a JSON text message shaped as
//! `{"event": "<name>", "data": {...}}`, where `<name>` is the snake_case
//! event name. Grids are arrays of nine arrays of nine integers; a grid that
//! is missing, `null`, or wrongly shaped inside a push payload is read as
//! absent rather than failing the whole frame.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error_codes::ErrorCode;
use crate::grid::{deserialize_lenient, Grid};
use crate::machine::MatchStatus;
use crate::presence::{OpponentInfo, Timers};

// ── Type aliases ────────────────────────────────────────────────────

/// Server-issued player identifier.
pub type PlayerId = String;

/// Six-character room identifier.
pub type RoomId = String;

// ── Enums ───────────────────────────────────────────────────────────

/// Seat held by a player in a room.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Created the room.
    #[default]
    Host,
    /// Joined an existing room.
    Guest,
}

impl Role {
    /// The other seat.
    pub fn opposite(self) -> Self {
        match self {
            Self::Host => Self::Guest,
            Self::Guest => Self::Host,
        }
    }
}

/// Puzzle difficulty.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
    VeryHard,
    Extreme,
}

impl Difficulty {
    /// Normalize free text the way the room service does: lowercase, spaces
    /// become underscores, anything unknown becomes [`Difficulty::Medium`].
    ///
    /// ```
    /// use sudoku_duel_client::protocol::Difficulty;
    ///
    /// assert_eq!(Difficulty::normalize("Very Hard"), Difficulty::VeryHard);
    /// assert_eq!(Difficulty::normalize("nightmare"), Difficulty::Medium);
    /// ```
    pub fn normalize(text: &str) -> Self {
        text.parse().unwrap_or_default()
    }

    /// The wire string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
            Self::VeryHard => "very_hard",
            Self::Extreme => "extreme",
        }
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(' ', "_").as_str() {
            "easy" => Ok(Self::Easy),
            "medium" => Ok(Self::Medium),
            "hard" => Ok(Self::Hard),
            "very_hard" => Ok(Self::VeryHard),
            "extreme" => Ok(Self::Extreme),
            other => Err(format!("unknown difficulty: {other}")),
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a match ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// The winner filled every blank cell.
    Completed,
    /// The loser reached the error limit.
    Errors,
}

// ── Payload structs ─────────────────────────────────────────────────

/// Payload for `game_start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameStartPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub puzzle_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub puzzle: Option<Grid>,
}

/// Payload for `state_sync`: the full authoritative view for this player.
/// Boxed in `ServerMessage` to reduce enum size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSyncPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
    pub status: MatchStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub puzzle_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub puzzle: Option<Grid>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub progress: Option<Grid>,
    #[serde(default)]
    pub errors: u32,
    #[serde(default)]
    pub timers: Option<Timers>,
    #[serde(default)]
    pub opponent: Option<OpponentInfo>,
}

/// Payload for `cell_result`: the authority's verdict on one fill attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellResult {
    pub row: usize,
    pub col: usize,
    pub value: u8,
    pub correct: bool,
    /// Authoritative error count after this attempt.
    pub errors: u32,
    /// Confirmed cell count for the local player, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filled: Option<u32>,
}

/// Payload for `game_over`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameResult {
    pub winner: Role,
    pub reason: FinishReason,
    #[serde(default)]
    pub timers: Timers,
}

// ── Messages ────────────────────────────────────────────────────────

/// Message types sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Bind this channel to a room seat. Sent automatically on every connect.
    JoinRoom {
        room_id: RoomId,
        player_token: String,
    },
    /// Signal readiness to start.
    Ready { player_token: String },
    /// Ask the authority to judge `value` at `(row, col)`. `0` erases.
    FillCell {
        player_token: String,
        row: usize,
        col: usize,
        value: u8,
    },
    /// Liveness ping.
    Heartbeat { player_token: String },
    /// Ask for the room to be reset to the waiting phase.
    RestartGame { player_token: String },
}

/// Message types pushed from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Socket accepted.
    Connected {
        #[serde(default)]
        ok: bool,
    },
    /// A player bound a channel to the room (the local player included).
    PlayerJoined {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        player_id: Option<PlayerId>,
        #[serde(default)]
        nickname: String,
    },
    /// A player signalled readiness.
    PlayerReady {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        player_id: Option<PlayerId>,
    },
    /// Both players are ready; the race begins.
    GameStart(GameStartPayload),
    /// Full authoritative state for this player (boxed to reduce enum size).
    StateSync(Box<StateSyncPayload>),
    /// Verdict on a `fill_cell` request.
    CellResult(CellResult),
    /// Opponent's confirmed cell count changed.
    OpponentProgress {
        #[serde(default)]
        filled: u32,
    },
    /// Periodic timer broadcast.
    TimerUpdate {
        #[serde(default)]
        timers: Option<Timers>,
    },
    /// A player's channel dropped. No id means the opponent.
    PlayerDisconnected {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        player_id: Option<PlayerId>,
    },
    /// A player's channel came back. No id means the opponent.
    PlayerReconnected {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        player_id: Option<PlayerId>,
    },
    /// The match ended.
    GameOver(GameResult),
    /// The room went back to the waiting phase.
    RoomReset {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room_id: Option<RoomId>,
    },
    /// The opponent's reconnect grace period expired.
    ReconnectTimeout {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        player_id: Option<PlayerId>,
    },
    /// The server refused a channel request.
    Error { message: String },
}

impl ServerMessage {
    /// The wire event name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::PlayerJoined { .. } => "player_joined",
            Self::PlayerReady { .. } => "player_ready",
            Self::GameStart(_) => "game_start",
            Self::StateSync(_) => "state_sync",
            Self::CellResult(_) => "cell_result",
            Self::OpponentProgress { .. } => "opponent_progress",
            Self::TimerUpdate { .. } => "timer_update",
            Self::PlayerDisconnected { .. } => "player_disconnected",
            Self::PlayerReconnected { .. } => "player_reconnected",
            Self::GameOver(_) => "game_over",
            Self::RoomReset { .. } => "room_reset",
            Self::ReconnectTimeout { .. } => "reconnect_timeout",
            Self::Error { .. } => "error",
        }
    }

    /// Structured code for a server `error` push naming a known condition.
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Error { message } => ErrorCode::from_detail(message),
            _ => None,
        }
    }
}

impl ClientMessage {
    /// The wire event name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinRoom { .. } => "join_room",
            Self::Ready { .. } => "ready",
            Self::FillCell { .. } => "fill_cell",
            Self::Heartbeat { .. } => "heartbeat",
            Self::RestartGame { .. } => "restart_game",
        }
    }
}
