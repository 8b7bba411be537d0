//! Error codes for structured error handling.
//!
//! The room service reports failures as short snake_case strings, either as
//! the `detail` field of a rejected HTTP request or as the `message` of an
//! `error` push. These codes serialize to the same strings.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Structured error codes reported by the room service.
///
/// Use [`description()`](ErrorCode::description) for a human-readable explanation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// No room exists with the requested id.
    RoomNotFound,
    /// The room already has a guest.
    RoomFull,
    /// The player token does not belong to the room.
    InvalidToken,
    /// Room creation was rejected without further detail.
    CreateFailed,
    /// Joining was rejected without further detail.
    JoinFailed,
}

impl ErrorCode {
    /// Map a server-supplied detail string onto a known code.
    ///
    /// Returns `None` for details this client does not recognize.
    pub fn from_detail(detail: &str) -> Option<Self> {
        match detail.trim() {
            "room_not_found" => Some(Self::RoomNotFound),
            "room_full" => Some(Self::RoomFull),
            "invalid_token" => Some(Self::InvalidToken),
            "create_failed" => Some(Self::CreateFailed),
            "join_failed" => Some(Self::JoinFailed),
            _ => None,
        }
    }

    /// The wire string for this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoomNotFound => "room_not_found",
            Self::RoomFull => "room_full",
            Self::InvalidToken => "invalid_token",
            Self::CreateFailed => "create_failed",
            Self::JoinFailed => "join_failed",
        }
    }

    /// Returns a human-readable description of this error code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::RoomNotFound => {
                "The requested room could not be found. It may have been closed or the id is incorrect."
            }
            Self::RoomFull => "The room already has two players. Ask for a different room id.",
            Self::InvalidToken => {
                "The stored player token is not valid for this room. Create or join a room again."
            }
            Self::CreateFailed => "The room service could not create a room. Please try again.",
            Self::JoinFailed => "The room service rejected the join request. Please try again.",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
