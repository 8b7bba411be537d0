//! Persisted session record for rejoining a room after a restart.
//!
//! The record lives under a single key as JSON. Storage failures and
//! malformed data never reach callers: a record that cannot be read is
//! erased and treated as "no session".

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::protocol::{Difficulty, PlayerId, Role, RoomId};

/// Storage key holding the session record.
pub const SESSION_KEY: &str = "sudoku_duel_session";

/// Minimal identity needed to rejoin a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub room_id: RoomId,
    pub player_token: String,
    pub player_id: PlayerId,
    pub nickname: String,
    pub role: Role,
    #[serde(default)]
    pub difficulty: Difficulty,
}

impl SessionRecord {
    /// Whether the record carries the credentials needed to rejoin.
    pub fn is_resumable(&self) -> bool {
        !self.room_id.trim().is_empty() && !self.player_token.trim().is_empty()
    }
}

// ── Storage backends ────────────────────────────────────────────────

/// A string key-value store that survives process restarts.
///
/// Implementations only move strings; [`SessionStore`] owns the record format.
pub trait SessionStorage: Send + Sync + 'static {
    /// Read the value under `key`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the backend could not be read.
    fn get(&self, key: &str) -> std::io::Result<Option<String>>;

    /// Write `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the backend could not be written.
    fn set(&self, key: &str, value: &str) -> std::io::Result<()>;

    /// Remove `key`. Removing an absent key succeeds.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the backend could not be written.
    fn remove(&self, key: &str) -> std::io::Result<()>;
}

impl<T: SessionStorage> SessionStorage for Arc<T> {
    fn get(&self, key: &str) -> std::io::Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> std::io::Result<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> std::io::Result<()> {
        (**self).remove(key)
    }
}

/// In-process storage. Nothing survives a restart; useful for tests and
/// embedders that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for MemoryStorage {
    fn get(&self, key: &str) -> std::io::Result<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> std::io::Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> std::io::Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

/// One file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Store keys under `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Directory holding the key files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl SessionStorage for FileStorage {
    fn get(&self, key: &str) -> std::io::Result<Option<String>> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn set(&self, key: &str, value: &str) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(tmp, path)
    }

    fn remove(&self, key: &str) -> std::io::Result<()> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

// ── Store ───────────────────────────────────────────────────────────

/// Reads and writes the [`SessionRecord`] under [`SESSION_KEY`].
pub struct SessionStore {
    storage: Box<dyn SessionStorage>,
}

impl SessionStore {
    pub fn new(storage: impl SessionStorage) -> Self {
        Self {
            storage: Box::new(storage),
        }
    }

    /// Persist `record`, replacing any earlier one. No-op when the room id or
    /// token is blank.
    pub fn save(&self, record: &SessionRecord) {
        if !record.is_resumable() {
            debug!("session: not saving record without room id or token");
            return;
        }
        let json = match serde_json::to_string(record) {
            Ok(json) => json,
            Err(e) => {
                warn!("session: failed to encode record: {e}");
                return;
            }
        };
        if let Err(e) = self.storage.set(SESSION_KEY, &json) {
            warn!("session: failed to write record: {e}");
        }
    }

    /// The stored record, or `None`. Unreadable, malformed, or
    /// non-resumable data is erased and reported as `None`.
    pub fn load(&self) -> Option<SessionRecord> {
        let raw = match self.storage.get(SESSION_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("session: failed to read record: {e}");
                self.clear();
                return None;
            }
        };
        match serde_json::from_str::<SessionRecord>(&raw) {
            Ok(record) if record.is_resumable() => Some(record),
            Ok(_) => {
                debug!("session: stored record lacks credentials, discarding");
                self.clear();
                None
            }
            Err(e) => {
                warn!("session: malformed record discarded: {e}");
                self.clear();
                None
            }
        }
    }

    /// Remove the record. Idempotent.
    pub fn clear(&self) {
        if let Err(e) = self.storage.remove(SESSION_KEY) {
            warn!("session: failed to clear record: {e}");
        }
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    fn record() -> SessionRecord {
        SessionRecord {
            room_id: "123456".into(),
            player_token: "tok-a".into(),
            player_id: "pid-a".into(),
            nickname: "Alice".into(),
            role: Role::Host,
            difficulty: Difficulty::Medium,
        }
    }

    #[test]
    fn save_then_load_returns_record() {
        let store = SessionStore::new(MemoryStorage::new());
        store.save(&record());
        assert_eq!(store.load(), Some(record()));
    }

    #[test]
    fn later_save_overwrites_earlier() {
        let store = SessionStore::new(MemoryStorage::new());
        store.save(&record());
        let mut next = record();
        next.room_id = "654321".into();
        store.save(&next);
        assert_eq!(store.load().unwrap().room_id, "654321");
    }

    #[test]
    fn save_without_credentials_is_noop() {
        let storage = Arc::new(MemoryStorage::new());
        let store = SessionStore::new(Arc::clone(&storage));
        let mut missing_token = record();
        missing_token.player_token.clear();
        store.save(&missing_token);
        let mut missing_room = record();
        missing_room.room_id = "  ".into();
        store.save(&missing_room);
        assert_eq!(storage.get(SESSION_KEY).unwrap(), None);
    }

    #[test]
    fn record_uses_camel_case_keys() {
        let json = serde_json::to_value(record()).unwrap();
        assert_eq!(json["roomId"], "123456");
        assert_eq!(json["playerToken"], "tok-a");
        assert_eq!(json["playerId"], "pid-a");
        assert_eq!(json["role"], "host");
        assert_eq!(json["difficulty"], "medium");
    }

    #[test]
    fn malformed_data_is_erased_and_reads_as_none() {
        for garbage in [
            "not json",
            "{}",
            "[1,2,3]",
            r#"{"roomId":"123456"}"#,
            r#"{"roomId":"","playerToken":"t","playerId":"p","nickname":"n","role":"host"}"#,
            r#"{"roomId":"1","playerToken":"t","playerId":"p","nickname":"n","role":"admin"}"#,
        ] {
            let storage = Arc::new(MemoryStorage::new());
            storage.set(SESSION_KEY, garbage).unwrap();
            let store = SessionStore::new(Arc::clone(&storage));
            assert_eq!(store.load(), None, "input: {garbage}");
            assert_eq!(storage.get(SESSION_KEY).unwrap(), None, "input: {garbage}");
            // A second load behaves exactly like a fresh start.
            assert_eq!(store.load(), None);
        }
    }

    #[test]
    fn clear_is_idempotent() {
        let store = SessionStore::new(MemoryStorage::new());
        store.clear();
        store.save(&record());
        store.clear();
        store.clear();
        assert_eq!(store.load(), None);
    }

    #[test]
    fn file_storage_survives_a_new_store() {
        let dir = tempfile::tempdir().unwrap();
        SessionStore::new(FileStorage::new(dir.path())).save(&record());
        let reopened = SessionStore::new(FileStorage::new(dir.path()));
        assert_eq!(reopened.load(), Some(record()));
        reopened.clear();
        assert!(!dir.path().join(format!("{SESSION_KEY}.json")).exists());
        reopened.clear();
    }

    #[test]
    fn file_storage_corruption_degrades_to_no_session() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        storage.set(SESSION_KEY, "{\"roomId\":").unwrap();
        let store = SessionStore::new(storage.clone());
        assert_eq!(store.load(), None);
        assert_eq!(storage.get(SESSION_KEY).unwrap(), None);
    }
}
