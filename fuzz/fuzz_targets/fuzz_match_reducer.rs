#![no_main]

use libfuzzer_sys::fuzz_target;
use sudoku_duel_client::machine::{Identity, MatchState};
use sudoku_duel_client::protocol::{Difficulty, Role, ServerMessage};

// Feed a newline-separated stream of pushes through the reducer. Whatever
// arrives, applying it must never panic or put an out-of-range value on the board.
fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let mut state = MatchState::new();
    state.enter_room(
        Identity {
            room_id: "123456".into(),
            player_id: "me".into(),
            nickname: "Alice".into(),
            role: Role::Host,
        },
        Difficulty::Medium,
    );
    for line in text.lines() {
        if let Ok(msg) = serde_json::from_str::<ServerMessage>(line) {
            let _ = state.apply(&msg);
        }
        let _ = state.toggle_note(4, 4, 5);
    }
    assert!(state.progress().cells().all(|(_, _, v)| v <= 9));
});
