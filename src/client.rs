//! High-level duel client.
//!
//! [`DuelClient`] ties the room service, the persisted session, the realtime
//! channel, and the match state together. Every mutation of match state
//! happens on the caller's task, either from a local action or from
//! [`DuelClient::next_event`], so no two handlers ever interleave.
//!
//! # Example
//!
//! ```rust,ignore
//! let config = DuelConfig::from_env();
//! let api = HttpRoomApi::new(&config.api_base, config.request_timeout)?;
//! let connector = Arc::new(WebSocketConnector::from_config(&config));
//! let mut client = DuelClient::new(api, connector, FileStorage::new(".duel"), &config);
//!
//! if !client.resume() {
//!     client.create_room("Alice", Difficulty::Medium).await?;
//! }
//! client.connect().await?;
//!
//! while let Some(event) = client.next_event().await {
//!     match event? {
//!         DuelEvent::Disconnected { .. } => break,
//!         _ => render(client.state()),
//!     }
//! }
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::api::{validate_nickname, validate_room_id, RoomApi, RoomInfo, RoomTicket};
use crate::config::DuelConfig;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::error::Result;
use crate::event::DuelEvent;
use crate::machine::{Identity, MatchState, Transition};
use crate::protocol::{CellResult, Difficulty};
use crate::session::{SessionRecord, SessionStorage, SessionStore};
use crate::transport::Connector;

/// One player's view of a duel.
pub struct DuelClient<A> {
    api: A,
    session: Arc<SessionStore>,
    connection: ConnectionManager,
    events: mpsc::Receiver<DuelEvent>,
    state: MatchState,
}

impl<A: RoomApi> DuelClient<A> {
    /// Build a client. Nothing is loaded or opened yet; see
    /// [`resume`](Self::resume) and [`connect`](Self::connect).
    pub fn new(
        api: A,
        connector: Arc<dyn Connector>,
        storage: impl SessionStorage,
        config: &DuelConfig,
    ) -> Self {
        let session = Arc::new(SessionStore::new(storage));
        let (connection, events) = ConnectionManager::new(connector, Arc::clone(&session), config);
        Self {
            api,
            session,
            connection,
            events,
            state: MatchState::new(),
        }
    }

    /// Restore identity from the stored session. Returns `true` when a
    /// session was found; the match is then `waiting` until the server's
    /// snapshot arrives after [`connect`](Self::connect).
    pub fn resume(&mut self) -> bool {
        match self.session.load() {
            Some(record) => {
                info!(room_id = %record.room_id, "resuming stored session");
                self.state
                    .enter_room(Identity::from(&record), record.difficulty);
                true
            }
            None => false,
        }
    }

    /// Create a room as host.
    ///
    /// # Errors
    ///
    /// [`DuelError::InvalidInput`](crate::DuelError::InvalidInput) for a bad
    /// nickname (no request is made), otherwise whatever the room service
    /// returns.
    pub async fn create_room(&mut self, nickname: &str, difficulty: Difficulty) -> Result<RoomTicket> {
        let nickname = validate_nickname(nickname)?;
        let ticket = self.api.create_room(nickname, difficulty).await?;
        self.enter(&ticket, nickname);
        Ok(ticket)
    }

    /// Join an existing room as guest.
    ///
    /// # Errors
    ///
    /// [`DuelError::InvalidInput`](crate::DuelError::InvalidInput) for a bad
    /// room id or nickname (no request is made), otherwise whatever the room
    /// service returns.
    pub async fn join_room(&mut self, room_id: &str, nickname: &str) -> Result<RoomTicket> {
        let room_id = validate_room_id(room_id)?;
        let nickname = validate_nickname(nickname)?;
        let ticket = self.api.join_room(room_id, nickname).await?;
        self.enter(&ticket, nickname);
        Ok(ticket)
    }

    /// Public summary of a room.
    ///
    /// # Errors
    ///
    /// [`DuelError::InvalidInput`](crate::DuelError::InvalidInput) for a bad
    /// room id, otherwise whatever the room service returns.
    pub async fn room_info(&self, room_id: &str) -> Result<RoomInfo> {
        let room_id = validate_room_id(room_id)?;
        self.api.room_info(room_id).await
    }

    fn enter(&mut self, ticket: &RoomTicket, nickname: &str) {
        let record = SessionRecord {
            room_id: ticket.room_id.clone(),
            player_token: ticket.player_token.clone(),
            player_id: ticket.player_id.clone(),
            nickname: nickname.to_owned(),
            role: ticket.role,
            difficulty: ticket.difficulty,
        };
        self.session.save(&record);
        self.state.enter_room(Identity::from(&record), record.difficulty);
    }

    /// Open the realtime channel. A no-op while one is live.
    ///
    /// # Errors
    ///
    /// Returns the connector's error if the channel cannot be opened.
    pub async fn connect(&mut self) -> Result<()> {
        self.connection.connect().await
    }

    // ── Actions ─────────────────────────────────────────────────────

    pub fn send_ready(&self) -> bool {
        self.connection.send_ready()
    }

    /// Ask the server to judge `value` at `(row, col)`; `0` erases. The
    /// attempt is remembered as pending only when it was queued.
    pub fn fill_cell(&mut self, row: usize, col: usize, value: u8) -> bool {
        if !self.state.can_fill(row, col, value) {
            debug!(row, col, value, "fill rejected locally");
            return false;
        }
        if !self.connection.send_fill_cell(row, col, value) {
            return false;
        }
        self.state.record_pending(row, col, value)
    }

    pub fn request_restart(&self) -> bool {
        self.connection.request_restart()
    }

    /// Toggle candidate `value` at `(row, col)`. Local only.
    pub fn toggle_note(&mut self, row: usize, col: usize, value: u8) -> bool {
        self.state.toggle_note(row, col, value)
    }

    pub fn clear_notes(&mut self, row: usize, col: usize) -> bool {
        self.state.clear_notes(row, col)
    }

    // ── Events ──────────────────────────────────────────────────────

    /// Await the next event and apply it to the match state.
    ///
    /// Returns `None` only if the event stream ends. A push that names an
    /// unknown player comes back as `Err` and leaves state untouched.
    pub async fn next_event(&mut self) -> Option<Result<DuelEvent>> {
        let event = self.events.recv().await?;
        Some(self.apply(&event).map(|_| event))
    }

    /// Apply one event to the match state.
    ///
    /// # Errors
    ///
    /// [`DuelError::UnknownPlayer`](crate::DuelError::UnknownPlayer) for a
    /// presence push naming a player that is neither us nor the opponent.
    pub fn apply(&mut self, event: &DuelEvent) -> Result<Option<Transition>> {
        match event {
            DuelEvent::Server(msg) => {
                if let Some(code) = msg.error_code() {
                    warn!(code = %code, "server error: {}", code.description());
                }
                self.state.apply(msg)
            }
            DuelEvent::Connected => {
                debug!("channel up");
                Ok(None)
            }
            DuelEvent::ConnectionLost { reason } => {
                debug!(reason = ?reason, "channel interrupted");
                Ok(None)
            }
            DuelEvent::Disconnected { reason } => {
                debug!(reason = ?reason, "channel closed");
                Ok(None)
            }
        }
    }

    /// Close the channel, forget the session, and return to the initial state.
    pub async fn leave(&mut self) {
        info!("leaving room");
        self.connection.disconnect().await;
        self.state = MatchState::new();
        // Drop whatever the closed channel left behind.
        while self.events.try_recv().is_ok() {}
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn state(&self) -> &MatchState {
        &self.state
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn session(&self) -> Option<SessionRecord> {
        self.session.load()
    }

    pub fn self_timer(&self) -> u64 {
        self.state.self_timer()
    }

    pub fn opponent_timer(&self) -> u64 {
        self.state.opponent_timer()
    }

    pub fn last_cell_result(&self) -> Option<&CellResult> {
        self.state.board().last_cell_result()
    }

    pub fn api(&self) -> &A {
        &self.api
    }
}

impl<A> std::fmt::Debug for DuelClient<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuelClient")
            .field("status", &self.state.status())
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}
