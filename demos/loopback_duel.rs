//! # Loopback Duel Example
//!
//! Runs a whole race in one process: a tiny referee stands in for the room
//! service and realtime server, and two bots play against it through their
//! own [`DuelClient`]s. It shows how to plug custom [`RoomApi`] and
//! [`Connector`] implementations into the client, which is also how the
//! client is exercised without a network in tests.
//!
//! ## Running
//!
//! ```sh
//! RUST_LOG=info cargo run --example loopback_duel
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use sudoku_duel_client::api::{RoomInfo, SeatInfo};
use sudoku_duel_client::protocol::{GameStartPayload, PlayerId};
use sudoku_duel_client::{
    CellResult, ClientMessage, Connector, Difficulty, DuelClient, DuelConfig, DuelError,
    DuelEvent, FinishReason, Frame, GameResult, Grid, MatchStatus, MemoryStorage, Role,
    RoomApi, RoomTicket, ServerMessage, Transport,
};
use tokio::sync::mpsc;

const ROOM_ID: &str = "LOOP01";
const MAX_ERRORS: u32 = 3;

const SOLUTION: [[u8; 9]; 9] = [
    [5, 3, 4, 6, 7, 8, 9, 1, 2],
    [6, 7, 2, 1, 9, 5, 3, 4, 8],
    [1, 9, 8, 3, 4, 2, 5, 6, 7],
    [8, 5, 9, 7, 6, 1, 4, 2, 3],
    [4, 2, 6, 8, 5, 3, 7, 9, 1],
    [7, 1, 3, 9, 2, 4, 8, 5, 6],
    [9, 6, 1, 5, 3, 7, 2, 8, 4],
    [2, 8, 7, 4, 1, 9, 6, 3, 5],
    [3, 4, 5, 2, 8, 6, 1, 7, 9],
];

const BLANKS: [(usize, usize); 4] = [(0, 2), (2, 6), (4, 4), (8, 8)];

fn solution(row: usize, col: usize) -> Option<u8> {
    SOLUTION.get(row).and_then(|r| r.get(col)).copied()
}

fn puzzle() -> Grid {
    let mut grid = Grid::from_rows(SOLUTION);
    for (row, col) in BLANKS {
        grid.set(row, col, 0);
    }
    grid
}

// ─────────────────────────────────────────────────────────────────────
// The referee
// ─────────────────────────────────────────────────────────────────────

struct Seat {
    token: String,
    player_id: PlayerId,
    nickname: String,
    role: Role,
    link: Option<u64>,
    ready: bool,
    solved: HashSet<(usize, usize)>,
    errors: u32,
}

/// One room, judged in memory.
#[derive(Default)]
struct Room {
    next_link: u64,
    links: HashMap<u64, mpsc::UnboundedSender<String>>,
    seats: Vec<Seat>,
    started: bool,
    finished: bool,
}

impl Room {
    fn seat(&self, token: &str) -> Option<usize> {
        self.seats.iter().position(|s| s.token == token)
    }

    fn send(&self, link: Option<u64>, msg: &ServerMessage) {
        let Some(tx) = link.and_then(|l| self.links.get(&l)) else {
            return;
        };
        if let Ok(text) = serde_json::to_string(msg) {
            let _ = tx.send(text);
        }
    }

    fn broadcast(&self, msg: &ServerMessage) {
        for seat in &self.seats {
            self.send(seat.link, msg);
        }
    }

    fn handle(&mut self, link: u64, msg: ClientMessage) {
        match msg {
            ClientMessage::JoinRoom { player_token, .. } => {
                let Some(seat) = self.seat(&player_token).and_then(|i| self.seats.get_mut(i)) else {
                    return;
                };
                seat.link = Some(link);
                let joined = ServerMessage::PlayerJoined {
                    player_id: Some(seat.player_id.clone()),
                    nickname: seat.nickname.clone(),
                };
                self.broadcast(&joined);
            }
            ClientMessage::Ready { player_token } => {
                let Some(seat) = self.seat(&player_token).and_then(|i| self.seats.get_mut(i)) else {
                    return;
                };
                seat.ready = true;
                let ready = ServerMessage::PlayerReady {
                    player_id: Some(seat.player_id.clone()),
                };
                self.broadcast(&ready);
                if !self.started && self.seats.len() == 2 && self.seats.iter().all(|s| s.ready) {
                    self.started = true;
                    tracing::info!("referee: both ready, starting");
                    self.broadcast(&ServerMessage::GameStart(GameStartPayload {
                        room_id: Some(ROOM_ID.into()),
                        difficulty: Some(Difficulty::Easy),
                        puzzle_id: Some("loop-1".into()),
                        puzzle: Some(puzzle()),
                    }));
                }
            }
            ClientMessage::FillCell {
                player_token,
                row,
                col,
                value,
            } => self.judge(&player_token, row, col, value),
            ClientMessage::Heartbeat { .. } | ClientMessage::RestartGame { .. } => {}
        }
    }

    fn judge(&mut self, token: &str, row: usize, col: usize, value: u8) {
        if !self.started || self.finished {
            return;
        }
        let Some(i) = self.seat(token) else {
            return;
        };
        let Some(seat) = self.seats.get_mut(i) else {
            return;
        };
        let correct = BLANKS.contains(&(row, col)) && solution(row, col) == Some(value);
        if correct {
            seat.solved.insert((row, col));
        } else {
            seat.errors += 1;
        }
        let (link, role, errors) = (seat.link, seat.role, seat.errors);
        let filled = u32::try_from(seat.solved.len()).unwrap_or(u32::MAX);

        self.send(
            link,
            &ServerMessage::CellResult(CellResult {
                row,
                col,
                value,
                correct,
                errors,
                filled: Some(filled),
            }),
        );
        let opponent = self.seats.iter().find(|s| s.role != role).and_then(|s| s.link);
        self.send(opponent, &ServerMessage::OpponentProgress { filled });

        let outcome = if filled as usize == BLANKS.len() {
            Some((role, FinishReason::Completed))
        } else if errors >= MAX_ERRORS {
            Some((role.opposite(), FinishReason::Errors))
        } else {
            None
        };
        if let Some((winner, reason)) = outcome {
            self.finished = true;
            tracing::info!("referee: {winner:?} wins ({reason:?})");
            self.broadcast(&ServerMessage::GameOver(GameResult {
                winner,
                reason,
                timers: Default::default(),
            }));
        }
    }
}

/// Handle on the referee: both the room service and the socket dialer.
#[derive(Clone)]
struct Loopback {
    room: Arc<Mutex<Room>>,
    inbound: mpsc::UnboundedSender<(u64, String)>,
}

impl Loopback {
    fn start() -> Self {
        let room = Arc::new(Mutex::new(Room::default()));
        let (inbound, mut rx) = mpsc::unbounded_channel::<(u64, String)>();
        let judged = Arc::clone(&room);
        tokio::spawn(async move {
            while let Some((link, text)) = rx.recv().await {
                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(msg) => judged
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .handle(link, msg),
                    Err(e) => tracing::warn!("referee: bad frame: {e}"),
                }
            }
        });
        Self { room, inbound }
    }

    fn seat(&self, nickname: &str, role: Role) -> RoomTicket {
        let mut room = self.room.lock().unwrap_or_else(PoisonError::into_inner);
        let n = room.seats.len();
        room.seats.push(Seat {
            token: format!("token-{n}"),
            player_id: format!("player-{n}"),
            nickname: nickname.to_owned(),
            role,
            link: None,
            ready: false,
            solved: HashSet::new(),
            errors: 0,
        });
        RoomTicket {
            room_id: ROOM_ID.into(),
            player_token: format!("token-{n}"),
            player_id: format!("player-{n}"),
            role,
            difficulty: Difficulty::Easy,
        }
    }
}

#[async_trait]
impl RoomApi for Loopback {
    async fn create_room(&self, player_name: &str, _difficulty: Difficulty) -> Result<RoomTicket, DuelError> {
        Ok(self.seat(player_name, Role::Host))
    }

    async fn join_room(&self, room_id: &str, player_name: &str) -> Result<RoomTicket, DuelError> {
        if room_id != ROOM_ID {
            return Err(DuelError::JoinFailed("room_not_found".into()));
        }
        if self.room.lock().unwrap_or_else(PoisonError::into_inner).seats.len() >= 2 {
            return Err(DuelError::JoinFailed("room_full".into()));
        }
        Ok(self.seat(player_name, Role::Guest))
    }

    async fn room_info(&self, _room_id: &str) -> Result<RoomInfo, DuelError> {
        let room = self.room.lock().unwrap_or_else(PoisonError::into_inner);
        let seat_info = |role| {
            room.seats.iter().find(|s| s.role == role).map(|s| SeatInfo {
                nickname: s.nickname.clone(),
                online: s.link.is_some(),
            })
        };
        Ok(RoomInfo {
            room_id: ROOM_ID.into(),
            status: if room.started { MatchStatus::Playing } else { MatchStatus::Waiting },
            difficulty: Difficulty::Easy,
            host: seat_info(Role::Host).unwrap_or_default(),
            guest: seat_info(Role::Guest),
            puzzle_id: room.started.then(|| "loop-1".into()),
            puzzle: room.started.then(puzzle),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────
// The socket
// ─────────────────────────────────────────────────────────────────────

struct LoopbackTransport {
    link: u64,
    to_referee: mpsc::UnboundedSender<(u64, String)>,
    from_referee: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, message: String) -> Result<(), DuelError> {
        self.to_referee
            .send((self.link, message))
            .map_err(|_| DuelError::TransportClosed)
    }

    async fn recv(&mut self) -> Option<Result<Frame, DuelError>> {
        self.from_referee.recv().await.map(|text| Ok(Frame::Text(text)))
    }

    async fn close(&mut self) -> Result<(), DuelError> {
        self.from_referee.close();
        Ok(())
    }
}

#[async_trait]
impl Connector for Loopback {
    async fn connect(&self) -> Result<Box<dyn Transport>, DuelError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut room = self.room.lock().unwrap_or_else(PoisonError::into_inner);
        room.next_link += 1;
        let link = room.next_link;
        room.links.insert(link, tx);
        Ok(Box::new(LoopbackTransport {
            link,
            to_referee: self.inbound.clone(),
            from_referee: rx,
        }))
    }
}

// ─────────────────────────────────────────────────────────────────────
// The bots
// ─────────────────────────────────────────────────────────────────────

/// Fill blanks one at a time, waiting for each verdict. A sloppy bot gets its
/// first attempt wrong.
async fn play(mut client: DuelClient<Loopback>, sloppy: bool) -> Result<Option<GameResult>, DuelError> {
    let name = client
        .state()
        .identity()
        .map(|id| id.nickname.clone())
        .unwrap_or_default();
    let mut blundered = !sloppy;
    client.connect().await?;

    while let Some(event) = client.next_event().await {
        match event? {
            DuelEvent::Connected => {
                client.send_ready();
            }
            DuelEvent::Server(ServerMessage::GameStart(_) | ServerMessage::CellResult(_)) => {
                let next = client
                    .state()
                    .progress()
                    .cells()
                    .find(|&(row, col, v)| {
                        v == 0 && client.state().puzzle().and_then(|p| p.get(row, col)) == Some(0)
                    });
                if let Some((row, col, _)) = next {
                    let answer = solution(row, col).unwrap_or(1);
                    let value = if blundered { answer } else { answer % 9 + 1 };
                    blundered = true;
                    tracing::info!("{name}: trying {value} at ({row}, {col})");
                    client.fill_cell(row, col, value);
                }
            }
            DuelEvent::Server(ServerMessage::OpponentProgress { filled }) => {
                tracing::info!("{name}: opponent at {filled}/{}", BLANKS.len());
            }
            DuelEvent::Server(ServerMessage::GameOver(result)) => {
                client.leave().await;
                return Ok(Some(result));
            }
            DuelEvent::Disconnected { .. } => break,
            _ => {}
        }
    }
    Ok(None)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let server = Loopback::start();
    let config = DuelConfig::default();
    let connector: Arc<dyn Connector> = Arc::new(server.clone());

    let mut alice = DuelClient::new(server.clone(), Arc::clone(&connector), MemoryStorage::new(), &config);
    let mut bob = DuelClient::new(server.clone(), Arc::clone(&connector), MemoryStorage::new(), &config);

    alice.create_room("Alice", Difficulty::Easy).await?;
    bob.join_room(ROOM_ID, "Bob").await?;
    let info = alice.room_info(ROOM_ID).await?;
    tracing::info!(
        "Room {}: {} vs {}",
        info.room_id,
        info.host.nickname,
        info.guest.map(|g| g.nickname).unwrap_or_default()
    );

    let alice = tokio::spawn(play(alice, false));
    let bob = tokio::spawn(play(bob, true));

    for (name, handle) in [("Alice", alice), ("Bob", bob)] {
        match handle.await? {
            Ok(Some(result)) => {
                tracing::info!("{name} saw {:?} win by {:?}", result.winner, result.reason)
            }
            Ok(None) => tracing::warn!("{name}: channel closed before the end"),
            Err(e) => tracing::error!("{name}: {e}"),
        }
    }
    Ok(())
}
