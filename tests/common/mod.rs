#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for Sudoku duel client integration tests.
//!
//! Provides a channel-driven [`MockTransport`] the test feeds through a
//! [`Wire`], a [`MockConnector`] that hands those transports out, a scripted
//! [`MockRoomApi`], and helpers that build server push JSON the way the room
//! service writes it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use serde_json::json;
use sudoku_duel_client::protocol::{ClientMessage, Difficulty, Role};
use sudoku_duel_client::{
    Connector, DuelError, Frame, RoomApi, RoomInfo, RoomTicket, Transport,
};
use tokio::sync::mpsc;

// ── MockTransport ───────────────────────────────────────────────────

/// A transport whose inbound side is fed by a [`Wire`].
///
/// A `None` pushed through the wire ends the stream. Once the wire is
/// dropped, `recv` pends forever so the channel stays up until shutdown.
pub struct MockTransport {
    inbound: mpsc::UnboundedReceiver<Option<Frame>>,
    sent: Arc<StdMutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), DuelError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<Frame, DuelError>> {
        match self.inbound.recv().await {
            Some(Some(frame)) => Some(Ok(frame)),
            Some(None) => None,
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), DuelError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

/// The test's end of a [`MockTransport`]: plays the server.
pub struct Wire {
    inbound: mpsc::UnboundedSender<Option<Frame>>,
    sent: Arc<StdMutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

impl Wire {
    pub fn push(&self, frame: Frame) {
        self.inbound.send(Some(frame)).unwrap();
    }

    pub fn push_json(&self, text: String) {
        self.push(Frame::Text(text));
    }

    /// End the stream as a server close would.
    pub fn close(&self) {
        self.inbound.send(None).unwrap();
    }

    /// Every message the client wrote, parsed.
    pub fn sent(&self) -> Vec<ClientMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|s| serde_json::from_str(s).expect("client wrote invalid JSON"))
            .collect()
    }

    pub fn sent_names(&self) -> Vec<&'static str> {
        self.sent().iter().map(ClientMessage::name).collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    /// Yield until the client has written at least `n` messages.
    pub async fn wait_for_sent(&self, n: usize) {
        for _ in 0..1000 {
            if self.sent.lock().unwrap().len() >= n {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!(
            "client wrote {} messages, expected at least {n}",
            self.sent.lock().unwrap().len()
        );
    }
}

/// Hands out scripted transports in order. Fails once none are left.
#[derive(Default)]
pub struct MockConnector {
    transports: StdMutex<VecDeque<MockTransport>>,
    connects: AtomicUsize,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a transport for the next `connect` and return its wire.
    pub fn wire(&self) -> Wire {
        let (tx, rx) = mpsc::unbounded_channel();
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        self.transports.lock().unwrap().push_back(MockTransport {
            inbound: rx,
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        });
        Wire {
            inbound: tx,
            sent,
            closed,
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>, DuelError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        match self.transports.lock().unwrap().pop_front() {
            Some(t) => Ok(Box::new(t)),
            None => Err(DuelError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "no scripted transport",
            ))),
        }
    }
}

// ── MockRoomApi ─────────────────────────────────────────────────────

/// A room service that answers from queues and counts requests.
#[derive(Default)]
pub struct MockRoomApi {
    pub create: StdMutex<VecDeque<Result<RoomTicket, DuelError>>>,
    pub join: StdMutex<VecDeque<Result<RoomTicket, DuelError>>>,
    pub info: StdMutex<Option<RoomInfo>>,
    pub calls: AtomicUsize,
}

impl MockRoomApi {
    pub fn creating(ticket: RoomTicket) -> Self {
        let api = Self::default();
        api.create.lock().unwrap().push_back(Ok(ticket));
        api
    }

    pub fn joining(result: Result<RoomTicket, DuelError>) -> Self {
        let api = Self::default();
        api.join.lock().unwrap().push_back(result);
        api
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RoomApi for MockRoomApi {
    async fn create_room(
        &self,
        _player_name: &str,
        _difficulty: Difficulty,
    ) -> Result<RoomTicket, DuelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.create
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(DuelError::CreateFailed))
    }

    async fn join_room(&self, _room_id: &str, _player_name: &str) -> Result<RoomTicket, DuelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.join
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(DuelError::JoinFailed("join_failed".into())))
    }

    async fn room_info(&self, _room_id: &str) -> Result<RoomInfo, DuelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.info
            .lock()
            .unwrap()
            .clone()
            .ok_or(DuelError::RequestFailed { status: 404 })
    }
}

// ── Fixtures ────────────────────────────────────────────────────────

pub const ROOM_ID: &str = "AB12CD";

pub fn host_ticket() -> RoomTicket {
    RoomTicket {
        room_id: ROOM_ID.into(),
        player_token: "tok-host".into(),
        player_id: "pid-host".into(),
        role: Role::Host,
        difficulty: Difficulty::Medium,
    }
}

pub fn guest_ticket() -> RoomTicket {
    RoomTicket {
        room_id: ROOM_ID.into(),
        player_token: "tok-guest".into(),
        player_id: "pid-guest".into(),
        role: Role::Guest,
        difficulty: Difficulty::Medium,
    }
}

/// A puzzle with givens in the first row: `5 3 _ _ 7 _ _ _ _`.
pub fn puzzle_rows() -> Vec<Vec<u8>> {
    let mut rows = vec![vec![0u8; 9]; 9];
    rows[0] = vec![5, 3, 0, 0, 7, 0, 0, 0, 0];
    rows[4] = vec![4, 0, 0, 8, 0, 3, 0, 0, 1];
    rows
}

// ── Server push JSON ────────────────────────────────────────────────

fn push(event: &str, data: serde_json::Value) -> String {
    json!({ "event": event, "data": data }).to_string()
}

pub fn connected_json() -> String {
    push("connected", json!({ "ok": true }))
}

pub fn player_joined_json(player_id: &str, nickname: &str) -> String {
    push(
        "player_joined",
        json!({ "player_id": player_id, "nickname": nickname }),
    )
}

pub fn player_ready_json(player_id: &str) -> String {
    push("player_ready", json!({ "player_id": player_id }))
}

pub fn game_start_json(puzzle_id: &str) -> String {
    push(
        "game_start",
        json!({
            "room_id": ROOM_ID,
            "difficulty": "medium",
            "puzzle_id": puzzle_id,
            "puzzle": puzzle_rows(),
        }),
    )
}

pub fn cell_result_json(row: usize, col: usize, value: u8, correct: bool, errors: u32) -> String {
    push(
        "cell_result",
        json!({
            "row": row,
            "col": col,
            "value": value,
            "correct": correct,
            "errors": errors,
        }),
    )
}

pub fn opponent_progress_json(filled: u32) -> String {
    push("opponent_progress", json!({ "filled": filled }))
}

pub fn timer_update_json(host: u64, guest: u64) -> String {
    push(
        "timer_update",
        json!({ "timers": { "host": host, "guest": guest } }),
    )
}

pub fn player_disconnected_json(player_id: &str) -> String {
    push("player_disconnected", json!({ "player_id": player_id }))
}

pub fn player_reconnected_json(player_id: &str) -> String {
    push("player_reconnected", json!({ "player_id": player_id }))
}

pub fn game_over_json(winner: &str, reason: &str) -> String {
    push(
        "game_over",
        json!({
            "winner": winner,
            "reason": reason,
            "timers": { "host": 120, "guest": 131 },
        }),
    )
}

pub fn room_reset_json() -> String {
    push("room_reset", json!({ "room_id": ROOM_ID }))
}

pub fn reconnect_timeout_json(player_id: &str) -> String {
    push("reconnect_timeout", json!({ "player_id": player_id }))
}

pub fn error_json(message: &str) -> String {
    push("error", json!({ "message": message }))
}

/// A `state_sync` for a match in `status` with one confirmed cell at
/// `(0, 2)` and the opponent's presence as given.
pub fn state_sync_json(status: &str, puzzle_id: &str, opponent_online: bool) -> String {
    let mut progress = vec![vec![0u8; 9]; 9];
    progress[0][2] = 4;
    push(
        "state_sync",
        json!({
            "room_id": ROOM_ID,
            "status": status,
            "difficulty": "medium",
            "puzzle_id": puzzle_id,
            "puzzle": puzzle_rows(),
            "progress": progress,
            "errors": 1,
            "timers": { "host": 30, "guest": 28 },
            "opponent": {
                "nickname": "Bob",
                "online": opponent_online,
                "progress": 6,
                "errors": 2,
            },
        }),
    )
}
