#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Integration tests for [`DuelClient`].
//!
//! The test plays the server: it answers room requests through
//! `MockRoomApi` and pushes frames through the `Wire` of each client's
//! transport, then checks what the client wrote and how its match state moved.

mod common;

use std::sync::Arc;
use std::time::Duration;

use sudoku_duel_client::protocol::ClientMessage;
use sudoku_duel_client::{
    Difficulty, DuelClient, DuelConfig, DuelError, DuelEvent, ErrorCode, FinishReason, Frame,
    MatchStatus, MemoryStorage, Participant, Role, ServerMessage, SessionStorage, Transition,
};
use tokio_test::{assert_err, assert_ok};

use common::{
    cell_result_json, error_json, game_over_json, game_start_json, guest_ticket, host_ticket,
    opponent_progress_json, player_disconnected_json, player_joined_json, player_ready_json,
    player_reconnected_json, reconnect_timeout_json, room_reset_json, state_sync_json,
    timer_update_json, MockConnector, MockRoomApi, Wire, ROOM_ID,
};

// ════════════════════════════════════════════════════════════════════
// Helpers
// ════════════════════════════════════════════════════════════════════

type Client = DuelClient<MockRoomApi>;

fn new_client(api: MockRoomApi, storage: impl SessionStorage) -> (Client, Arc<MockConnector>) {
    let connector = MockConnector::new();
    let client = DuelClient::new(
        api,
        Arc::clone(&connector) as Arc<dyn sudoku_duel_client::Connector>,
        storage,
        &DuelConfig::default(),
    );
    (client, connector)
}

/// Await the next event, failing the test if none arrives or it does not apply.
async fn next(client: &mut Client) -> DuelEvent {
    tokio::time::timeout(Duration::from_secs(5), client.next_event())
        .await
        .expect("timed out waiting for an event")
        .expect("event stream ended")
        .expect("event failed to apply")
}

async fn expect_connected(client: &mut Client) {
    let ev = next(client).await;
    assert_eq!(ev, DuelEvent::Connected, "expected Connected, got {ev:?}");
}

/// A host that created a room and holds an open channel.
async fn hosting() -> (Client, Wire) {
    let (mut client, connector) = new_client(MockRoomApi::creating(host_ticket()), MemoryStorage::new());
    assert_ok!(client.create_room("Alice", Difficulty::Medium).await);
    let wire = connector.wire();
    assert_ok!(client.connect().await);
    expect_connected(&mut client).await;
    (client, wire)
}

/// A host already racing against Bob on a fresh puzzle.
async fn playing() -> (Client, Wire) {
    let (mut client, wire) = hosting().await;
    wire.push_json(player_joined_json("pid-guest", "Bob"));
    next(&mut client).await;
    wire.push_json(game_start_json("pz-1"));
    next(&mut client).await;
    assert_eq!(client.state().status(), MatchStatus::Playing);
    (client, wire)
}

// ════════════════════════════════════════════════════════════════════
// End-to-end race
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn two_players_race_from_lobby_to_finish() {
    let (mut alice, alice_wire) = hosting().await;
    assert_eq!(alice.state().status(), MatchStatus::Waiting);
    assert_eq!(alice.state().identity().unwrap().role, Role::Host);

    let (mut bob, bob_conn) = new_client(
        MockRoomApi::joining(Ok(guest_ticket())),
        MemoryStorage::new(),
    );
    assert_ok!(bob.join_room(ROOM_ID, "Bob").await);
    let bob_wire = bob_conn.wire();
    assert_ok!(bob.connect().await);
    expect_connected(&mut bob).await;
    assert_eq!(bob.state().status(), MatchStatus::Waiting);

    // Both channels bound themselves to their seats.
    assert_eq!(
        alice_wire.sent()[0],
        ClientMessage::JoinRoom {
            room_id: ROOM_ID.into(),
            player_token: "tok-host".into()
        }
    );
    assert_eq!(
        bob_wire.sent()[0],
        ClientMessage::JoinRoom {
            room_id: ROOM_ID.into(),
            player_token: "tok-guest".into()
        }
    );

    // The server announces the guest to both sides.
    for wire in [&alice_wire, &bob_wire] {
        wire.push_json(player_joined_json("pid-guest", "Bob"));
    }
    next(&mut alice).await;
    next(&mut bob).await;
    assert_eq!(alice.state().opponent().nickname, "Bob");
    assert!(alice.state().opponent().online);
    assert_eq!(bob.state().opponent().nickname, "", "own join is not the opponent");

    // Host readies up; the guest sees the room move to ready.
    assert!(alice.send_ready());
    alice_wire.wait_for_sent(2).await;
    assert_eq!(
        alice_wire.sent()[1],
        ClientMessage::Ready {
            player_token: "tok-host".into()
        }
    );
    bob_wire.push_json(player_ready_json("pid-host"));
    next(&mut bob).await;
    assert_eq!(bob.state().status(), MatchStatus::Ready);

    // Both receive the puzzle.
    for wire in [&alice_wire, &bob_wire] {
        wire.push_json(game_start_json("pz-1"));
    }
    next(&mut alice).await;
    next(&mut bob).await;
    for client in [&alice, &bob] {
        assert_eq!(client.state().status(), MatchStatus::Playing);
        assert_eq!(client.state().puzzle_id(), Some("pz-1"));
        assert_eq!(client.state().puzzle().unwrap().get(0, 0), Some(5));
        assert_eq!(client.state().progress().filled_count(), 0);
    }

    // Alice fills a correct cell; Bob only sees her count move.
    assert!(alice.fill_cell(0, 2, 4));
    alice_wire.wait_for_sent(3).await;
    alice_wire.push_json(cell_result_json(0, 2, 4, true, 0));
    next(&mut alice).await;
    assert_eq!(alice.state().progress().get(0, 2), Some(4));
    bob_wire.push_json(opponent_progress_json(1));
    next(&mut bob).await;
    assert_eq!(bob.state().opponent().progress, 1);
    assert_eq!(bob.state().progress().get(0, 2), Some(0));

    // Alice finishes first.
    for wire in [&alice_wire, &bob_wire] {
        wire.push_json(game_over_json("host", "completed"));
    }
    next(&mut alice).await;
    next(&mut bob).await;
    for client in [&alice, &bob] {
        assert_eq!(client.state().status(), MatchStatus::Finished);
        let result = client.state().result().unwrap();
        assert_eq!(result.winner, Role::Host);
        assert_eq!(result.reason, FinishReason::Completed);
    }
    assert_eq!(alice.state().timers().host, 120);

    alice.leave().await;
    bob.leave().await;
}

// ════════════════════════════════════════════════════════════════════
// Room requests
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn invalid_nickname_makes_no_request() {
    let (mut client, _conn) = new_client(MockRoomApi::creating(host_ticket()), MemoryStorage::new());

    let err = assert_err!(client.create_room("   ", Difficulty::Easy).await);
    assert!(matches!(err, DuelError::InvalidInput(_)), "got {err:?}");
    let err = assert_err!(
        client
            .create_room("abcdefghijklmnopqrstu", Difficulty::Easy)
            .await
    );
    assert!(matches!(err, DuelError::InvalidInput(_)), "got {err:?}");

    assert_eq!(client.api().calls(), 0);
    assert_eq!(client.state().status(), MatchStatus::Idle);
    assert!(client.session().is_none());
}

#[tokio::test]
async fn invalid_room_id_makes_no_request() {
    let (mut client, _conn) = new_client(
        MockRoomApi::joining(Ok(guest_ticket())),
        MemoryStorage::new(),
    );

    for bad in ["", "ABC", "ABCDEFG"] {
        let err = assert_err!(client.join_room(bad, "Bob").await);
        assert!(matches!(err, DuelError::InvalidInput(_)), "{bad:?}: {err:?}");
    }
    let err = assert_err!(client.room_info("nope").await);
    assert!(matches!(err, DuelError::InvalidInput(_)));
    assert_eq!(client.api().calls(), 0);
}

#[tokio::test]
async fn nickname_is_trimmed_before_it_is_stored() {
    let (mut client, _conn) = new_client(MockRoomApi::creating(host_ticket()), MemoryStorage::new());
    assert_ok!(client.create_room("  Alice ", Difficulty::Hard).await);
    assert_eq!(client.session().unwrap().nickname, "Alice");
    assert_eq!(client.state().identity().unwrap().nickname, "Alice");
}

#[tokio::test]
async fn rejected_join_surfaces_detail_and_keeps_no_session() {
    let (mut client, _conn) = new_client(
        MockRoomApi::joining(Err(DuelError::JoinFailed("room_full".into()))),
        MemoryStorage::new(),
    );

    let err = assert_err!(client.join_room(ROOM_ID, "Bob").await);
    assert_eq!(err.to_string(), "room_full");
    assert_eq!(err.error_code(), Some(ErrorCode::RoomFull));
    assert!(client.session().is_none());
    assert_eq!(client.state().status(), MatchStatus::Idle);
    assert_eq!(client.api().calls(), 1);
}

#[tokio::test]
async fn successful_create_persists_session_and_enters_waiting() {
    let (mut client, _conn) = new_client(MockRoomApi::creating(host_ticket()), MemoryStorage::new());
    let ticket = assert_ok!(client.create_room("Alice", Difficulty::Medium).await);
    assert_eq!(ticket.room_id, ROOM_ID);

    let record = client.session().unwrap();
    assert_eq!(record.room_id, ROOM_ID);
    assert_eq!(record.player_token, "tok-host");
    assert_eq!(record.player_id, "pid-host");
    assert_eq!(record.role, Role::Host);
    assert_eq!(client.state().status(), MatchStatus::Waiting);
    assert_eq!(client.state().difficulty(), Difficulty::Medium);
}

// ════════════════════════════════════════════════════════════════════
// Session continuity
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn restart_resumes_stored_session_and_restores_snapshot() {
    let storage = Arc::new(MemoryStorage::new());

    {
        let (mut first, _conn) =
            new_client(MockRoomApi::creating(host_ticket()), Arc::clone(&storage));
        assert_ok!(first.create_room("Alice", Difficulty::Medium).await);
        // Process exits without leaving.
    }

    let (mut client, connector) = new_client(MockRoomApi::default(), Arc::clone(&storage));
    assert!(client.resume());
    assert_eq!(client.state().status(), MatchStatus::Waiting);
    assert_eq!(client.state().identity().unwrap().player_id, "pid-host");

    let wire = connector.wire();
    assert_ok!(client.connect().await);
    expect_connected(&mut client).await;
    assert_eq!(
        wire.sent()[0],
        ClientMessage::JoinRoom {
            room_id: ROOM_ID.into(),
            player_token: "tok-host".into()
        }
    );

    wire.push_json(state_sync_json("playing", "pz-1", true));
    let ev = next(&mut client).await;
    assert!(matches!(ev, DuelEvent::Server(ServerMessage::StateSync(_))));
    assert_eq!(client.state().status(), MatchStatus::Playing);
    assert_eq!(client.state().progress().get(0, 2), Some(4));
    assert_eq!(client.state().errors(), 1);
    assert_eq!(client.state().opponent().nickname, "Bob");
    assert_eq!(client.state().opponent().progress, 6);
    assert_eq!(client.self_timer(), 30);
    assert_eq!(client.opponent_timer(), 28);
    assert_eq!(client.api().calls(), 0, "resume never calls the room service");
}

#[tokio::test]
async fn resume_without_session_stays_idle() {
    let (mut client, _conn) = new_client(MockRoomApi::default(), MemoryStorage::new());
    assert!(!client.resume());
    assert_eq!(client.state().status(), MatchStatus::Idle);
}

#[tokio::test]
async fn resume_discards_malformed_record() {
    let storage = Arc::new(MemoryStorage::new());
    storage
        .set(sudoku_duel_client::session::SESSION_KEY, "{not json")
        .unwrap();

    let (mut client, _conn) = new_client(MockRoomApi::default(), Arc::clone(&storage));
    assert!(!client.resume());
    assert_eq!(
        storage.get(sudoku_duel_client::session::SESSION_KEY).unwrap(),
        None
    );
}

#[tokio::test]
async fn snapshot_while_paused_by_self_reports_me() {
    let (mut client, wire) = hosting().await;
    wire.push_json(state_sync_json("paused", "pz-1", true));
    next(&mut client).await;
    assert_eq!(client.state().status(), MatchStatus::Paused);
    assert_eq!(client.state().paused_by(), Some(Participant::Me));
}

#[tokio::test]
async fn leave_clears_session_and_state() {
    let (mut client, wire) = playing().await;

    client.leave().await;

    assert!(client.session().is_none());
    assert_eq!(client.state().status(), MatchStatus::Idle);
    assert!(client.state().identity().is_none());
    assert!(!client.connection_state().connected);
    assert!(wire.is_closed());
    assert!(!client.send_ready(), "no token after leaving");
}

// ════════════════════════════════════════════════════════════════════
// Channel lifecycle
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn interrupted_link_rejoins_on_restore() {
    let (mut client, wire) = hosting().await;

    wire.push(Frame::Interrupted {
        reason: Some("reset by peer".into()),
    });
    let ev = next(&mut client).await;
    assert_eq!(
        ev,
        DuelEvent::ConnectionLost {
            reason: Some("reset by peer".into())
        }
    );
    assert!(!client.connection_state().connected);

    wire.push(Frame::Reconnected);
    expect_connected(&mut client).await;
    assert!(client.connection_state().connected);
    assert_eq!(wire.sent_names(), ["join_room", "join_room"]);
}

#[tokio::test]
async fn server_close_keeps_session_for_a_fresh_connect() {
    let (mut client, connector) =
        new_client(MockRoomApi::creating(host_ticket()), MemoryStorage::new());
    assert_ok!(client.create_room("Alice", Difficulty::Medium).await);
    let first = connector.wire();
    assert_ok!(client.connect().await);
    expect_connected(&mut client).await;

    first.close();
    let ev = next(&mut client).await;
    assert_eq!(ev, DuelEvent::Disconnected { reason: None });
    assert!(!client.connection_state().connected);
    assert!(client.session().is_some());

    let second = connector.wire();
    assert_ok!(client.connect().await);
    expect_connected(&mut client).await;
    assert_eq!(second.sent_names(), ["join_room"]);
    assert_eq!(connector.connects(), 2);
}

#[tokio::test]
async fn connect_twice_opens_one_channel() {
    let (mut client, wire) = hosting().await;
    assert_ok!(client.connect().await);
    assert_eq!(wire.sent_names(), ["join_room"]);
    assert!(client.connection().has_channel());
}

#[tokio::test]
async fn connector_failure_is_returned() {
    let (mut client, _conn) = new_client(MockRoomApi::creating(host_ticket()), MemoryStorage::new());
    assert_ok!(client.create_room("Alice", Difficulty::Medium).await);
    // No transport scripted.
    let err = assert_err!(client.connect().await);
    assert!(matches!(err, DuelError::Io(_)), "got {err:?}");
    assert!(!client.connection().has_channel());
}

#[tokio::test]
async fn inbound_frame_refreshes_activity() {
    let (mut client, wire) = hosting().await;
    let before = client.connection_state().last_heartbeat_ack.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    wire.push_json(timer_update_json(1, 2));
    next(&mut client).await;
    let after = client.connection_state().last_heartbeat_ack.unwrap();
    assert!(after > before);
}

// ════════════════════════════════════════════════════════════════════
// Board actions
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn fill_before_game_start_is_not_sent() {
    let (mut client, wire) = hosting().await;
    assert!(!client.fill_cell(0, 2, 4));
    assert_eq!(wire.sent_names(), ["join_room"]);
}

#[tokio::test]
async fn fill_waits_for_authority_before_writing() {
    let (mut client, wire) = playing().await;

    assert!(client.fill_cell(0, 2, 4));
    wire.wait_for_sent(2).await;
    assert_eq!(
        wire.sent()[1],
        ClientMessage::FillCell {
            player_token: "tok-host".into(),
            row: 0,
            col: 2,
            value: 4
        }
    );
    assert_eq!(client.state().board().pending(0, 2), Some(4));
    assert_eq!(client.state().progress().get(0, 2), Some(0), "not written yet");

    wire.push_json(cell_result_json(0, 2, 4, true, 0));
    next(&mut client).await;
    assert_eq!(client.state().progress().get(0, 2), Some(4));
    assert_eq!(client.state().board().pending(0, 2), None);
    assert!(client.last_cell_result().unwrap().correct);
}

#[tokio::test]
async fn wrong_fill_counts_an_error_and_leaves_cell_blank() {
    let (mut client, wire) = playing().await;

    assert!(client.fill_cell(0, 3, 9));
    wire.wait_for_sent(2).await;
    wire.push_json(cell_result_json(0, 3, 9, false, 1));
    next(&mut client).await;

    assert_eq!(client.state().progress().get(0, 3), Some(0));
    assert_eq!(client.state().errors(), 1);
    assert!(!client.last_cell_result().unwrap().correct);
}

#[tokio::test]
async fn fills_on_givens_or_out_of_range_are_rejected_locally() {
    let (mut client, wire) = playing().await;

    assert!(!client.fill_cell(0, 0, 1), "given cell");
    assert!(!client.fill_cell(0, 2, 10), "value out of range");
    assert!(!client.fill_cell(9, 0, 1), "off the grid");
    assert_eq!(wire.sent_names(), ["join_room"]);
}

#[tokio::test]
async fn notes_are_local_and_cleared_by_a_confirmed_fill() {
    let (mut client, wire) = playing().await;

    assert!(client.toggle_note(0, 2, 4));
    assert!(client.toggle_note(0, 2, 6));
    assert!(!client.toggle_note(0, 0, 1), "no notes on givens");
    let notes = client.state().board().notes().get(0, 2).unwrap();
    assert_eq!(notes.to_vec(), [4, 6]);

    assert!(client.fill_cell(0, 2, 4));
    wire.wait_for_sent(2).await;
    wire.push_json(cell_result_json(0, 2, 4, true, 0));
    next(&mut client).await;

    assert!(client
        .state()
        .board()
        .notes()
        .get(0, 2)
        .unwrap_or_default()
        .is_empty());
    assert!(!client.toggle_note(0, 2, 5), "cell is confirmed");
    assert_eq!(wire.sent_names(), ["join_room", "fill_cell"], "notes never hit the wire");
}

// ════════════════════════════════════════════════════════════════════
// Presence
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn opponent_drop_pauses_and_return_resumes() {
    let (mut client, wire) = playing().await;

    wire.push_json(player_disconnected_json("pid-guest"));
    next(&mut client).await;
    assert_eq!(client.state().status(), MatchStatus::Paused);
    assert_eq!(client.state().paused_by(), Some(Participant::Opponent));
    assert!(!client.state().opponent().online);

    wire.push_json(player_reconnected_json("pid-guest"));
    next(&mut client).await;
    assert_eq!(client.state().status(), MatchStatus::Playing);
    assert_eq!(client.state().paused_by(), None);
    assert!(client.state().opponent().online);
}

#[tokio::test]
async fn unknown_player_is_an_error_and_state_is_untouched() {
    let (mut client, wire) = playing().await;

    wire.push_json(player_disconnected_json("pid-mallory"));
    let result = tokio::time::timeout(Duration::from_secs(5), client.next_event())
        .await
        .unwrap()
        .unwrap();
    let err = assert_err!(result);
    assert!(
        matches!(&err, DuelError::UnknownPlayer(id) if id == "pid-mallory"),
        "got {err:?}"
    );
    assert_eq!(client.state().status(), MatchStatus::Playing);
    assert!(client.state().opponent().online);
}

#[tokio::test]
async fn reconnect_timeout_is_flagged() {
    let (mut client, wire) = playing().await;
    wire.push_json(player_disconnected_json("pid-guest"));
    next(&mut client).await;
    wire.push_json(reconnect_timeout_json("pid-guest"));
    next(&mut client).await;
    assert!(client.state().reconnect_timeout());
}

#[tokio::test]
async fn timers_follow_own_seat() {
    let (mut bob, conn) = new_client(
        MockRoomApi::joining(Ok(guest_ticket())),
        MemoryStorage::new(),
    );
    assert_ok!(bob.join_room(ROOM_ID, "Bob").await);
    let wire = conn.wire();
    assert_ok!(bob.connect().await);
    expect_connected(&mut bob).await;

    wire.push_json(timer_update_json(42, 17));
    next(&mut bob).await;
    assert_eq!(bob.self_timer(), 17);
    assert_eq!(bob.opponent_timer(), 42);
}

// ════════════════════════════════════════════════════════════════════
// Match lifecycle
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn game_start_reports_transition() {
    let (mut client, _wire) = hosting().await;
    let ev = DuelEvent::Server(serde_json::from_str(&game_start_json("pz-9")).unwrap());
    let transition = assert_ok!(client.apply(&ev));
    assert_eq!(
        transition,
        Some(Transition {
            from: MatchStatus::Waiting,
            to: MatchStatus::Playing
        })
    );
}

#[tokio::test]
async fn restart_after_finish_returns_to_waiting() {
    let (mut client, wire) = playing().await;
    wire.push_json(game_over_json("guest", "errors"));
    next(&mut client).await;
    assert_eq!(client.state().status(), MatchStatus::Finished);

    assert!(client.request_restart());
    wire.wait_for_sent(2).await;
    assert_eq!(
        wire.sent()[1],
        ClientMessage::RestartGame {
            player_token: "tok-host".into()
        }
    );

    wire.push_json(room_reset_json());
    next(&mut client).await;
    assert_eq!(client.state().status(), MatchStatus::Waiting);
    assert!(client.state().puzzle().is_none());
    assert!(client.state().result().is_none());
    assert_eq!(client.state().opponent().nickname, "Bob", "opponent stays seated");
}

#[tokio::test]
async fn server_error_push_carries_code_and_changes_nothing() {
    let (mut client, wire) = playing().await;
    wire.push_json(error_json("invalid_token"));
    let ev = next(&mut client).await;
    let msg = ev.server_message().unwrap();
    assert_eq!(msg.error_code(), Some(ErrorCode::InvalidToken));
    assert_eq!(client.state().status(), MatchStatus::Playing);

    wire.push_json(error_json("something odd"));
    let ev = next(&mut client).await;
    assert_eq!(ev.server_message().unwrap().error_code(), None);
}

#[tokio::test]
async fn room_info_passes_through() {
    let (client, _conn) = new_client(MockRoomApi::default(), MemoryStorage::new());
    let err = assert_err!(client.room_info(ROOM_ID).await);
    assert!(matches!(err, DuelError::RequestFailed { status: 404 }));
    assert_eq!(client.api().calls(), 1);
}
