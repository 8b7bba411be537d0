//! Transport abstraction for the duel realtime channel.
//!
//! A [`Transport`] is one bidirectional text channel to the game server. It
//! may hide link-level recovery: a transport that re-dials after a network
//! blip reports [`Frame::Interrupted`] when the link drops and
//! [`Frame::Reconnected`] once it is back, and only returns `None` from
//! [`recv`](Transport::recv) when the channel is gone for good.
//!
//! A [`Connector`] builds fresh transports. The connection manager asks it for
//! a new one whenever no live channel exists.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use sudoku_duel_client::error::DuelError;
//! use sudoku_duel_client::transport::{Frame, Transport};
//! use tokio::sync::mpsc;
//!
//! struct ChannelTransport {
//!     outbound: mpsc::UnboundedSender<String>,
//!     inbound: mpsc::UnboundedReceiver<String>,
//! }
//!
//! #[async_trait]
//! impl Transport for ChannelTransport {
//!     async fn send(&mut self, message: String) -> Result<(), DuelError> {
//!         self.outbound
//!             .send(message)
//!             .map_err(|_| DuelError::TransportClosed)
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<Frame, DuelError>> {
//!         self.inbound.recv().await.map(|text| Ok(Frame::Text(text)))
//!     }
//!
//!     async fn close(&mut self) -> Result<(), DuelError> {
//!         self.inbound.close();
//!         Ok(())
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::DuelError;

/// One item read from a [`Transport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete JSON text message.
    Text(String),
    /// The link came back after an interruption.
    Reconnected,
    /// The link dropped and the transport is trying to restore it.
    Interrupted { reason: Option<String> },
}

/// A bidirectional text message transport.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) is used inside `tokio::select!` and **must** be
/// cancel-safe: dropping the future before it completes must not lose an
/// inbound message.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send one JSON text message.
    ///
    /// # Errors
    ///
    /// Returns [`DuelError::TransportSend`] or [`DuelError::TransportClosed`]
    /// when the message could not be written.
    async fn send(&mut self, message: String) -> Result<(), DuelError>;

    /// Receive the next frame.
    ///
    /// Returns `None` once the channel is permanently closed.
    async fn recv(&mut self) -> Option<Result<Frame, DuelError>>;

    /// Close the channel gracefully. Implementations release resources even
    /// when the close handshake fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails.
    async fn close(&mut self) -> Result<(), DuelError>;
}

/// Factory for connected transports.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a new channel to the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel cannot be established.
    async fn connect(&self) -> Result<Box<dyn Transport>, DuelError>;
}

