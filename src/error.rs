//! Error types for the Sudoku duel client.

use thiserror::Error;

use crate::error_codes::ErrorCode;

/// Errors that can occur when using the Sudoku duel client.
///
/// Only the two room request flows and the transport surface errors to
/// callers. Malformed persisted sessions and dropped client actions are
/// recovered locally and never show up here.
#[derive(Debug, Error)]
pub enum DuelError {
    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The room service rejected a create-room request.
    #[error("create_failed")]
    CreateFailed,

    /// The room service rejected a join-room request.
    ///
    /// Carries the server-supplied `detail` message, or `join_failed` when the
    /// response had none.
    #[error("{0}")]
    JoinFailed(String),

    /// A room service request returned a non-success status.
    #[error("request failed with status {status}")]
    RequestFailed {
        /// HTTP status code returned by the room service.
        status: u16,
    },

    /// The HTTP request could not be performed at all.
    #[error("http error: {0}")]
    Http(String),

    /// Caller-supplied input failed local validation before any request was made.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A presence event named a player that is neither us nor the known opponent.
    #[error("unknown player id: {0}")]
    UnknownPlayer(String),

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DuelError {
    /// Structured error code for errors that carry a room service condition.
    ///
    /// ```
    /// use sudoku_duel_client::{DuelError, ErrorCode};
    ///
    /// let err = DuelError::JoinFailed("room_full".into());
    /// assert_eq!(err.error_code(), Some(ErrorCode::RoomFull));
    /// assert_eq!(DuelError::Timeout.error_code(), None);
    /// ```
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Self::CreateFailed => Some(ErrorCode::CreateFailed),
            Self::JoinFailed(detail) => {
                Some(ErrorCode::from_detail(detail).unwrap_or(ErrorCode::JoinFailed))
            }
            _ => None,
        }
    }
}

/// A specialized [`Result`] type for Sudoku duel client operations.
pub type Result<T> = std::result::Result<T, DuelError>;
