//! # Headless Duel Example
//!
//! Plays one seat of a duel against a running room service, logging every
//! phase change instead of drawing a board:
//!
//! 1. Resume a stored session, or create / join a room over HTTP
//! 2. Open the realtime channel and ready up
//! 3. Log pushes and transitions until the match ends, the channel closes,
//!    or Ctrl+C
//!
//! ## Running
//!
//! ```sh
//! # Host a room (prints the room id to share):
//! cargo run --example headless_duel -- create Alice hard
//!
//! # Join it from another terminal:
//! cargo run --example headless_duel -- join AB12CD Bob
//!
//! # Point at a different server:
//! SUDOKU_DUEL_API_BASE=http://duel.example:8000 \
//! SUDOKU_DUEL_SOCKET_URL=ws://duel.example:8000/ws \
//!     cargo run --example headless_duel -- create Alice
//! ```
//!
//! The session is kept under `.sudoku-duel/`, so killing the process and
//! running it again with no arguments rejoins the same seat.

use std::sync::Arc;

use sudoku_duel_client::{
    Difficulty, DuelClient, DuelConfig, DuelEvent, FileStorage, HttpRoomApi, MatchStatus,
    ServerMessage, WebSocketConnector,
};

const SESSION_DIR: &str = ".sudoku-duel";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let config = DuelConfig::from_env();
    tracing::info!(api = %config.api_base, socket = %config.socket_url, "using server");

    let api = HttpRoomApi::new(config.api_base.clone(), config.request_timeout)?;
    let connector = Arc::new(WebSocketConnector::from_config(&config));
    let mut client = DuelClient::new(api, connector, FileStorage::new(SESSION_DIR), &config);

    // ── Seat ────────────────────────────────────────────────────────
    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["create", nickname, rest @ ..] => {
            let difficulty = rest
                .first()
                .map(|d| Difficulty::normalize(d))
                .unwrap_or_default();
            let ticket = client.create_room(nickname, difficulty).await?;
            tracing::info!("Room {} created, share it with your opponent", ticket.room_id);
        }
        ["join", room_id, nickname] => {
            let ticket = client.join_room(room_id, nickname).await?;
            tracing::info!("Joined room {} as {:?}", ticket.room_id, ticket.role);
        }
        [] if client.resume() => {
            tracing::info!("Resumed stored session");
        }
        _ => {
            eprintln!("usage: headless_duel create <nickname> [difficulty]");
            eprintln!("       headless_duel join <room_id> <nickname>");
            eprintln!("       headless_duel            (resume stored session)");
            return Ok(());
        }
    }

    // ── Channel ─────────────────────────────────────────────────────
    client.connect().await?;

    loop {
        tokio::select! {
            event = client.next_event() => {
                let Some(event) = event else {
                    tracing::info!("Event stream ended");
                    break;
                };
                let event = match event {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::warn!("Ignored push: {e}");
                        continue;
                    }
                };

                match &event {
                    DuelEvent::Connected => {
                        if client.state().status() == MatchStatus::Waiting {
                            client.send_ready();
                            tracing::info!("Channel up, ready sent");
                        }
                    }
                    DuelEvent::ConnectionLost { reason } => {
                        tracing::warn!("Link lost ({}), waiting for it to return", reason.as_deref().unwrap_or("unknown"));
                    }
                    DuelEvent::Disconnected { reason } => {
                        tracing::warn!("Disconnected: {}", reason.as_deref().unwrap_or("closed by server"));
                        break;
                    }
                    DuelEvent::Server(ServerMessage::GameStart(_)) => {
                        tracing::info!(
                            "Puzzle {} started ({})",
                            client.state().puzzle_id().unwrap_or("?"),
                            client.state().difficulty()
                        );
                    }
                    DuelEvent::Server(ServerMessage::CellResult(result)) => {
                        tracing::info!(
                            "({}, {}) = {} was {} - errors: {}",
                            result.row,
                            result.col,
                            result.value,
                            if result.correct { "right" } else { "wrong" },
                            result.errors
                        );
                    }
                    DuelEvent::Server(ServerMessage::OpponentProgress { filled }) => {
                        tracing::info!("{} has {filled} cells", client.state().opponent().nickname);
                    }
                    DuelEvent::Server(ServerMessage::GameOver(result)) => {
                        let me = client.state().identity().map(|id| id.role);
                        let verdict = if me == Some(result.winner) { "You win" } else { "You lose" };
                        tracing::info!(
                            "{verdict} ({:?}) - you {}s, opponent {}s",
                            result.reason,
                            client.self_timer(),
                            client.opponent_timer()
                        );
                        break;
                    }
                    other => tracing::debug!("Event: {other:?}"),
                }

                if client.state().status() == MatchStatus::Paused {
                    tracing::info!("Paused by {:?}", client.state().paused_by());
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, keeping session for a later resume");
                return Ok(());
            }
        }
    }

    // ── Cleanup ─────────────────────────────────────────────────────
    client.leave().await;
    tracing::info!("Left room. Goodbye!");
    Ok(())
}
