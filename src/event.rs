//! Events delivered to the application from the realtime channel.

use crate::protocol::ServerMessage;

/// One item on the event stream returned by
/// [`ConnectionManager::new`](crate::connection::ConnectionManager::new).
///
/// Server pushes arrive as [`DuelEvent::Server`] unmodified; the connection
/// layer does not interpret them.
#[derive(Debug, Clone, PartialEq)]
pub enum DuelEvent {
    /// The channel is up and the rejoin request (if a session exists) was sent.
    /// Emitted on the first connect and after every recovered link drop.
    Connected,
    /// The link dropped; the transport is trying to restore it.
    ConnectionLost { reason: Option<String> },
    /// The channel is gone. Always delivered, even on a full event queue.
    Disconnected { reason: Option<String> },
    /// A server push.
    Server(ServerMessage),
}

impl From<ServerMessage> for DuelEvent {
    fn from(msg: ServerMessage) -> Self {
        Self::Server(msg)
    }
}

impl DuelEvent {
    /// The server push carried by this event, if any.
    pub fn server_message(&self) -> Option<&ServerMessage> {
        match self {
            Self::Server(msg) => Some(msg),
            _ => None,
        }
    }
}
