#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Wire format tests for the Sudoku duel client.
//!
//! Every server push is parsed from a JSON fixture written the way the room
//! service emits it, and every client message is checked against the exact
//! envelope the server expects.

use serde_json::{json, Value};
use sudoku_duel_client::api::{RoomInfo, RoomTicket};
use sudoku_duel_client::protocol::{
    ClientMessage, Difficulty, FinishReason, Role, ServerMessage,
};
use sudoku_duel_client::session::SessionRecord;
use sudoku_duel_client::{ErrorCode, MatchStatus, Timers};

fn parse(value: Value) -> ServerMessage {
    serde_json::from_value(value).expect("fixture should parse")
}

fn envelope(msg: &ClientMessage) -> Value {
    serde_json::to_value(msg).expect("serialize")
}

fn grid_with(row: usize, col: usize, value: u8) -> Vec<Vec<u8>> {
    let mut rows = vec![vec![0u8; 9]; 9];
    rows[row][col] = value;
    rows
}

// ════════════════════════════════════════════════════════════════════
// Client messages
// ════════════════════════════════════════════════════════════════════

#[test]
fn join_room_envelope() {
    let msg = ClientMessage::JoinRoom {
        room_id: "AB12CD".into(),
        player_token: "tok".into(),
    };
    assert_eq!(
        envelope(&msg),
        json!({ "event": "join_room", "data": { "room_id": "AB12CD", "player_token": "tok" } })
    );
}

#[test]
fn ready_heartbeat_and_restart_carry_only_the_token() {
    let cases = [
        (
            ClientMessage::Ready {
                player_token: "tok".into(),
            },
            "ready",
        ),
        (
            ClientMessage::Heartbeat {
                player_token: "tok".into(),
            },
            "heartbeat",
        ),
        (
            ClientMessage::RestartGame {
                player_token: "tok".into(),
            },
            "restart_game",
        ),
    ];
    for (msg, name) in cases {
        assert_eq!(msg.name(), name);
        assert_eq!(
            envelope(&msg),
            json!({ "event": name, "data": { "player_token": "tok" } })
        );
    }
}

#[test]
fn fill_cell_envelope() {
    let msg = ClientMessage::FillCell {
        player_token: "tok".into(),
        row: 3,
        col: 8,
        value: 0,
    };
    assert_eq!(
        envelope(&msg),
        json!({
            "event": "fill_cell",
            "data": { "player_token": "tok", "row": 3, "col": 8, "value": 0 }
        })
    );
}

// ════════════════════════════════════════════════════════════════════
// Server pushes
// ════════════════════════════════════════════════════════════════════

#[test]
fn connected_push() {
    let msg = parse(json!({ "event": "connected", "data": { "ok": true } }));
    assert_eq!(msg, ServerMessage::Connected { ok: true });
    assert_eq!(msg.name(), "connected");
}

#[test]
fn player_joined_with_and_without_id() {
    let msg = parse(json!({
        "event": "player_joined",
        "data": { "player_id": "pid-1", "nickname": "Bob" }
    }));
    assert_eq!(
        msg,
        ServerMessage::PlayerJoined {
            player_id: Some("pid-1".into()),
            nickname: "Bob".into()
        }
    );

    let msg = parse(json!({ "event": "player_joined", "data": { "nickname": "Bob" } }));
    assert!(matches!(
        msg,
        ServerMessage::PlayerJoined { player_id: None, .. }
    ));
}

#[test]
fn player_ready_push() {
    let msg = parse(json!({ "event": "player_ready", "data": { "player_id": "pid-1" } }));
    assert_eq!(
        msg,
        ServerMessage::PlayerReady {
            player_id: Some("pid-1".into())
        }
    );
}

#[test]
fn game_start_push_carries_puzzle() {
    let msg = parse(json!({
        "event": "game_start",
        "data": {
            "room_id": "AB12CD",
            "difficulty": "very_hard",
            "puzzle_id": "pz-7",
            "puzzle": grid_with(0, 0, 5),
        }
    }));
    let ServerMessage::GameStart(payload) = msg else {
        panic!("expected GameStart, got {msg:?}");
    };
    assert_eq!(payload.difficulty, Some(Difficulty::VeryHard));
    assert_eq!(payload.puzzle_id.as_deref(), Some("pz-7"));
    assert_eq!(payload.puzzle.unwrap().get(0, 0), Some(5));
}

#[test]
fn state_sync_push_full() {
    let msg = parse(json!({
        "event": "state_sync",
        "data": {
            "room_id": "AB12CD",
            "status": "paused",
            "difficulty": "hard",
            "puzzle_id": "pz-7",
            "puzzle": grid_with(0, 0, 5),
            "progress": grid_with(0, 1, 3),
            "errors": 2,
            "timers": { "host": 61, "guest": 59 },
            "opponent": { "nickname": "Bob", "online": false, "progress": 12, "errors": 1 },
        }
    }));
    let ServerMessage::StateSync(payload) = msg else {
        panic!("expected StateSync, got {msg:?}");
    };
    assert_eq!(payload.status, MatchStatus::Paused);
    assert_eq!(payload.difficulty, Some(Difficulty::Hard));
    assert_eq!(payload.progress.unwrap().get(0, 1), Some(3));
    assert_eq!(payload.errors, 2);
    assert_eq!(payload.timers, Some(Timers { host: 61, guest: 59 }));
    let opponent = payload.opponent.unwrap();
    assert_eq!(opponent.nickname, "Bob");
    assert!(!opponent.online);
    assert_eq!(opponent.progress, 12);
}

#[test]
fn state_sync_for_waiting_room_has_no_grids() {
    let msg = parse(json!({
        "event": "state_sync",
        "data": { "status": "waiting", "puzzle": null, "progress": null }
    }));
    let ServerMessage::StateSync(payload) = msg else {
        panic!("expected StateSync, got {msg:?}");
    };
    assert_eq!(payload.status, MatchStatus::Waiting);
    assert!(payload.puzzle.is_none());
    assert!(payload.progress.is_none());
    assert_eq!(payload.errors, 0);
    assert!(payload.opponent.is_none());
}

#[test]
fn malformed_grid_is_read_as_absent() {
    for bad in [
        json!([[1, 2, 3]]),
        json!("not a grid"),
        json!(vec![vec![0u8; 8]; 9]),
        json!(vec![vec![0u16; 9]; 10]),
    ] {
        let msg = parse(json!({
            "event": "game_start",
            "data": { "puzzle_id": "pz-1", "puzzle": bad }
        }));
        let ServerMessage::GameStart(payload) = msg else {
            panic!("expected GameStart");
        };
        assert!(payload.puzzle.is_none(), "grid should be dropped");
        assert_eq!(payload.puzzle_id.as_deref(), Some("pz-1"));
    }
}

#[test]
fn cell_result_push() {
    let msg = parse(json!({
        "event": "cell_result",
        "data": { "row": 4, "col": 5, "value": 7, "correct": false, "errors": 3 }
    }));
    let ServerMessage::CellResult(result) = msg else {
        panic!("expected CellResult, got {msg:?}");
    };
    assert_eq!((result.row, result.col, result.value), (4, 5, 7));
    assert!(!result.correct);
    assert_eq!(result.errors, 3);
    assert_eq!(result.filled, None);
}

#[test]
fn opponent_progress_and_timer_update() {
    assert_eq!(
        parse(json!({ "event": "opponent_progress", "data": { "filled": 17 } })),
        ServerMessage::OpponentProgress { filled: 17 }
    );
    assert_eq!(
        parse(json!({ "event": "timer_update", "data": { "timers": { "host": 5, "guest": 4 } } })),
        ServerMessage::TimerUpdate {
            timers: Some(Timers { host: 5, guest: 4 })
        }
    );
}

#[test]
fn presence_pushes_without_id_name_nobody() {
    for event in ["player_disconnected", "player_reconnected", "reconnect_timeout"] {
        let msg = parse(json!({ "event": event, "data": {} }));
        assert_eq!(msg.name(), event);
        let id = match msg {
            ServerMessage::PlayerDisconnected { player_id }
            | ServerMessage::PlayerReconnected { player_id }
            | ServerMessage::ReconnectTimeout { player_id } => player_id,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(id, None);
    }
}

#[test]
fn game_over_push() {
    let msg = parse(json!({
        "event": "game_over",
        "data": { "winner": "guest", "reason": "errors", "timers": { "host": 300, "guest": 280 } }
    }));
    let ServerMessage::GameOver(result) = msg else {
        panic!("expected GameOver, got {msg:?}");
    };
    assert_eq!(result.winner, Role::Guest);
    assert_eq!(result.reason, FinishReason::Errors);
    assert_eq!(result.timers.guest, 280);
}

#[test]
fn room_reset_push() {
    assert_eq!(
        parse(json!({ "event": "room_reset", "data": { "room_id": "AB12CD" } })),
        ServerMessage::RoomReset {
            room_id: Some("AB12CD".into())
        }
    );
}

#[test]
fn error_push_maps_known_messages() {
    let msg = parse(json!({ "event": "error", "data": { "message": "room_not_found" } }));
    assert_eq!(msg.error_code(), Some(ErrorCode::RoomNotFound));
    let msg = parse(json!({ "event": "error", "data": { "message": "bad_request" } }));
    assert_eq!(msg.error_code(), None);
    assert_eq!(ServerMessage::Connected { ok: true }.error_code(), None);
}

#[test]
fn unknown_event_is_rejected() {
    let raw = json!({ "event": "chat", "data": { "text": "hi" } });
    assert!(serde_json::from_value::<ServerMessage>(raw).is_err());
}

#[test]
fn server_push_survives_a_round_trip() {
    let original = parse(json!({
        "event": "state_sync",
        "data": {
            "status": "playing",
            "puzzle_id": "pz-1",
            "puzzle": grid_with(8, 8, 9),
            "progress": grid_with(0, 0, 1),
            "errors": 1,
        }
    }));
    let text = serde_json::to_string(&original).unwrap();
    let back: ServerMessage = serde_json::from_str(&text).unwrap();
    assert_eq!(back, original);
}

// ════════════════════════════════════════════════════════════════════
// Difficulty
// ════════════════════════════════════════════════════════════════════

#[test]
fn difficulty_normalizes_free_text() {
    assert_eq!(Difficulty::normalize("EASY"), Difficulty::Easy);
    assert_eq!(Difficulty::normalize(" Very Hard "), Difficulty::VeryHard);
    assert_eq!(Difficulty::normalize("very_hard"), Difficulty::VeryHard);
    assert_eq!(Difficulty::normalize("Extreme"), Difficulty::Extreme);
    assert_eq!(Difficulty::normalize(""), Difficulty::Medium);
    assert_eq!(Difficulty::normalize("impossible"), Difficulty::Medium);
}

#[test]
fn difficulty_wire_strings() {
    for d in [
        Difficulty::Easy,
        Difficulty::Medium,
        Difficulty::Hard,
        Difficulty::VeryHard,
        Difficulty::Extreme,
    ] {
        assert_eq!(serde_json::to_value(d).unwrap(), json!(d.as_str()));
        assert_eq!(d.to_string(), d.as_str());
    }
}

// ════════════════════════════════════════════════════════════════════
// Room service bodies
// ════════════════════════════════════════════════════════════════════

#[test]
fn ticket_normalizes_difficulty() {
    let ticket: RoomTicket = serde_json::from_value(json!({
        "room_id": "AB12CD",
        "player_token": "tok",
        "player_id": "pid",
        "role": "guest",
        "difficulty": "Very Hard",
    }))
    .unwrap();
    assert_eq!(ticket.role, Role::Guest);
    assert_eq!(ticket.difficulty, Difficulty::VeryHard);

    let ticket: RoomTicket = serde_json::from_value(json!({
        "room_id": "AB12CD",
        "player_token": "tok",
        "player_id": "pid",
        "role": "host",
    }))
    .unwrap();
    assert_eq!(ticket.difficulty, Difficulty::Medium);
}

#[test]
fn room_info_before_and_after_start() {
    let waiting: RoomInfo = serde_json::from_value(json!({
        "room_id": "AB12CD",
        "status": "waiting",
        "difficulty": "easy",
        "host": { "nickname": "Alice", "online": true },
        "guest": null,
    }))
    .unwrap();
    assert_eq!(waiting.status, MatchStatus::Waiting);
    assert_eq!(waiting.host.nickname, "Alice");
    assert!(waiting.guest.is_none());
    assert!(waiting.puzzle.is_none());

    let playing: RoomInfo = serde_json::from_value(json!({
        "room_id": "AB12CD",
        "status": "playing",
        "difficulty": "easy",
        "host": { "nickname": "Alice", "online": true },
        "guest": { "nickname": "Bob", "online": false },
        "puzzle_id": "pz-1",
        "puzzle": grid_with(2, 2, 6),
    }))
    .unwrap();
    assert_eq!(playing.guest.unwrap().nickname, "Bob");
    assert_eq!(playing.puzzle.unwrap().get(2, 2), Some(6));
}

#[test]
fn session_record_uses_camel_case_keys() {
    let record = SessionRecord {
        room_id: "AB12CD".into(),
        player_token: "tok".into(),
        player_id: "pid".into(),
        nickname: "Alice".into(),
        role: Role::Host,
        difficulty: Difficulty::Hard,
    };
    assert_eq!(
        serde_json::to_value(&record).unwrap(),
        json!({
            "roomId": "AB12CD",
            "playerToken": "tok",
            "playerId": "pid",
            "nickname": "Alice",
            "role": "host",
            "difficulty": "hard",
        })
    );
}
