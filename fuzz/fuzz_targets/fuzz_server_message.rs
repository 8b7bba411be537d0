#![no_main]

use libfuzzer_sys::fuzz_target;
use sudoku_duel_client::protocol::ServerMessage;

fuzz_target!(|data: &[u8]| {
    // Raw-byte path, including serde_json's UTF-8 validation.
    let _ = serde_json::from_slice::<ServerMessage>(data);

    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(msg) = serde_json::from_str::<ServerMessage>(s) {
            let _ = msg.name();
            let _ = msg.error_code();
        }
    }
});
