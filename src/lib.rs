//! # Sudoku Duel Client
//!
//! Client-side synchronization engine for two-player competitive Sudoku.
//!
//! Two players race to complete the same puzzle. A server is the authority
//! for correctness, timing, and match lifecycle; this crate keeps one
//! player's local view consistent with it across network interruptions,
//! process restarts, and out-of-order updates.
//!
//! ## Layout
//!
//! - [`session`]: the persisted record that lets a player rejoin after a restart
//! - [`connection`]: one realtime channel with automatic rejoin and heartbeat
//! - [`machine`]: the match phase state machine and inbound-push reducer
//! - [`grid`]: puzzle, confirmed progress, pending fills, and candidate notes
//! - [`presence`]: opponent status and match timers
//! - [`api`]: room creation and joining over HTTP
//! - [`client`]: [`DuelClient`], the facade tying it together
//!
//! ## Features
//!
//! - `transport-websocket` (default): [`WebSocketTransport`] and [`WebSocketConnector`]
//! - `http-api` (default): [`HttpRoomApi`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # #[cfg(all(feature = "transport-websocket", feature = "http-api"))]
//! # async fn example() -> Result<(), sudoku_duel_client::DuelError> {
//! use std::sync::Arc;
//! use sudoku_duel_client::{
//!     Difficulty, DuelClient, DuelConfig, DuelEvent, HttpRoomApi, MemoryStorage,
//!     WebSocketConnector,
//! };
//!
//! let config = DuelConfig::from_env();
//! let api = HttpRoomApi::new(config.api_base.clone(), config.request_timeout)?;
//! let connector = Arc::new(WebSocketConnector::from_config(&config));
//! let mut client = DuelClient::new(api, connector, MemoryStorage::new(), &config);
//!
//! client.create_room("Alice", Difficulty::Medium).await?;
//! client.connect().await?;
//! client.send_ready();
//!
//! while let Some(event) = client.next_event().await {
//!     if let DuelEvent::Disconnected { .. } = event? {
//!         break;
//!     }
//!     println!("status: {:?}", client.state().status());
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod error_codes;
pub mod event;
pub mod grid;
pub mod machine;
pub mod presence;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use api::{RoomApi, RoomInfo, RoomTicket};
pub use client::DuelClient;
pub use config::DuelConfig;
pub use connection::{ConnectionManager, ConnectionState};
pub use error::{DuelError, Result};
pub use error_codes::ErrorCode;
pub use event::DuelEvent;
pub use grid::{CandidateSet, Grid, GridReconciler, NotesOverlay};
pub use machine::{Identity, MatchState, MatchStatus, Participant, Transition};
pub use presence::{OpponentInfo, PresenceTracker, Timers};
pub use protocol::{
    CellResult, ClientMessage, Difficulty, FinishReason, GameResult, Role, ServerMessage,
};
pub use session::{FileStorage, MemoryStorage, SessionRecord, SessionStorage, SessionStore};
pub use transport::{Connector, Frame, Transport};

#[cfg(feature = "http-api")]
pub use api::HttpRoomApi;

#[cfg(feature = "transport-websocket")]
pub use transports::{ReconnectPolicy, WebSocketConnector, WebSocketTransport};
