//! Match phase state machine.
//!
//! [`MatchState::apply`] is the single reducer for inbound pushes. It owns the
//! phase transitions and routes board and presence updates to the
//! [`GridReconciler`] and [`PresenceTracker`] it holds, gated on phase.
//!
//! ```text
//! idle ──enter_room──▶ waiting ──player_ready──▶ ready
//!                        │                         │
//!                        └──────game_start─────────┴──▶ playing ◀──player_reconnected──┐
//!                                                         │  │                        │
//!                                        game_over ◀──────┘  └──player_disconnected──▶ paused
//!                                            │
//!                                            ▼
//!                                         finished
//!
//! any ──room_reset──▶ waiting        any ──state_sync──▶ (status from payload)
//! ```
//!
//! Pause and resume follow the authority's presence reports: the client never
//! resumes on its own, and resumes only once the opponent is known to be online.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{DuelError, Result};
use crate::grid::{Grid, GridReconciler};
use crate::presence::{OpponentInfo, PresenceTracker, Timers};
use crate::protocol::{
    CellResult, Difficulty, GameResult, GameStartPayload, PlayerId, Role, RoomId, ServerMessage,
    StateSyncPayload,
};
use crate::session::SessionRecord;

/// Match phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    /// Not in a room.
    #[default]
    Idle,
    /// In a room, waiting for both players to ready up.
    Waiting,
    /// The other player signalled readiness.
    Ready,
    /// Race in progress.
    Playing,
    /// Race suspended while a player is away.
    Paused,
    /// Race over; a result is available.
    Finished,
}

impl MatchStatus {
    /// Whether a puzzle is on the board in this phase.
    pub fn has_board(self) -> bool {
        matches!(self, Self::Playing | Self::Paused | Self::Finished)
    }
}

/// A phase change produced by [`MatchState::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: MatchStatus,
    pub to: MatchStatus,
}

/// Who a presence push is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Participant {
    /// The local player.
    Me,
    /// The other player.
    Opponent,
}

/// The local player's seat in the current room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub room_id: RoomId,
    pub player_id: PlayerId,
    pub nickname: String,
    pub role: Role,
}

impl From<&SessionRecord> for Identity {
    fn from(record: &SessionRecord) -> Self {
        Self {
            room_id: record.room_id.clone(),
            player_id: record.player_id.clone(),
            nickname: record.nickname.clone(),
            role: record.role,
        }
    }
}

/// Client-side view of the match.
#[derive(Debug, Clone, Default)]
pub struct MatchState {
    status: MatchStatus,
    difficulty: Difficulty,
    identity: Option<Identity>,
    board: GridReconciler,
    presence: PresenceTracker,
    result: Option<GameResult>,
    reconnect_timeout: bool,
    paused_by: Option<Participant>,
}

impl MatchState {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Local actions ───────────────────────────────────────────────

    /// A room was created or joined (or restored from a session record).
    /// Replaces any previous match and moves to `waiting`.
    pub fn enter_room(&mut self, identity: Identity, difficulty: Difficulty) -> Transition {
        let from = self.status;
        info!(room_id = %identity.room_id, role = ?identity.role, "match: entered room");
        *self = Self {
            status: MatchStatus::Waiting,
            difficulty,
            identity: Some(identity),
            ..Self::default()
        };
        Transition {
            from,
            to: MatchStatus::Waiting,
        }
    }

    /// Toggle a candidate note. Only while a race is running or paused.
    pub fn toggle_note(&mut self, row: usize, col: usize, value: u8) -> bool {
        if !matches!(self.status, MatchStatus::Playing | MatchStatus::Paused) {
            return false;
        }
        self.board.toggle_note(row, col, value)
    }

    /// Empty a cell's candidate notes.
    pub fn clear_notes(&mut self, row: usize, col: usize) -> bool {
        self.board.clear_notes(row, col)
    }

    /// Record an in-flight fill. Only while playing.
    pub fn record_pending(&mut self, row: usize, col: usize, value: u8) -> bool {
        self.status == MatchStatus::Playing && self.board.record_pending(row, col, value)
    }

    /// Whether a fill attempt at `(row, col)` is worth sending.
    pub fn can_fill(&self, row: usize, col: usize, value: u8) -> bool {
        self.status == MatchStatus::Playing && self.board.can_fill(row, col, value)
    }

    // ── Reducer ─────────────────────────────────────────────────────

    /// Apply one inbound push.
    ///
    /// Returns the phase change, if any.
    ///
    /// # Errors
    ///
    /// Returns [`DuelError::UnknownPlayer`] when a presence push names a player
    /// id that is neither ours nor the known opponent's. State is unchanged.
    pub fn apply(&mut self, msg: &ServerMessage) -> Result<Option<Transition>> {
        let from = self.status;
        match msg {
            ServerMessage::PlayerJoined {
                player_id,
                nickname,
            } => {
                if !self.is_me(player_id.as_deref(), Some(nickname.as_str())) {
                    self.presence.opponent_joined(nickname, player_id.clone());
                }
            }
            ServerMessage::PlayerReady { .. } => {
                if self.status == MatchStatus::Waiting {
                    self.status = MatchStatus::Ready;
                }
            }
            ServerMessage::GameStart(payload) => self.start_match(payload),
            ServerMessage::StateSync(payload) => self.apply_snapshot(payload),
            ServerMessage::CellResult(result) => self.apply_cell_result(result),
            ServerMessage::OpponentProgress { filled } => {
                self.presence.apply_opponent_progress(*filled);
            }
            ServerMessage::TimerUpdate { timers } => {
                if let Some(timers) = timers {
                    self.presence.apply_timers(*timers);
                }
            }
            ServerMessage::PlayerDisconnected { player_id } => {
                let who = self.resolve(player_id.as_deref())?;
                if who == Participant::Opponent {
                    self.presence.set_opponent_online(false);
                }
                if self.status == MatchStatus::Playing {
                    self.status = MatchStatus::Paused;
                    self.paused_by = Some(who);
                }
            }
            ServerMessage::PlayerReconnected { player_id } => {
                let who = self.resolve(player_id.as_deref())?;
                if who == Participant::Opponent {
                    self.presence.set_opponent_online(true);
                }
                if self.status == MatchStatus::Paused && self.presence.opponent().online {
                    self.status = MatchStatus::Playing;
                    self.paused_by = None;
                }
            }
            ServerMessage::GameOver(result) => {
                if self.status == MatchStatus::Playing {
                    self.status = MatchStatus::Finished;
                    self.result = Some(result.clone());
                }
            }
            ServerMessage::RoomReset { .. } => {
                self.status = MatchStatus::Waiting;
                self.board.reset();
                self.presence.reset_match_stats();
                self.result = None;
                self.reconnect_timeout = false;
                self.paused_by = None;
            }
            ServerMessage::ReconnectTimeout { .. } => {
                self.reconnect_timeout = true;
            }
            ServerMessage::Error { message } => {
                warn!(message = %message, "match: server reported an error");
            }
            ServerMessage::Connected { .. } => {}
        }

        if self.status == from {
            debug!(event = msg.name(), status = ?from, "match: applied");
            return Ok(None);
        }
        info!(event = msg.name(), from = ?from, to = ?self.status, "match: transition");
        Ok(Some(Transition {
            from,
            to: self.status,
        }))
    }

    fn start_match(&mut self, payload: &GameStartPayload) {
        if !matches!(self.status, MatchStatus::Waiting | MatchStatus::Ready) {
            debug!(status = ?self.status, "match: game_start ignored");
            return;
        }
        if let Some(difficulty) = payload.difficulty {
            self.difficulty = difficulty;
        }
        self.board
            .start(payload.puzzle_id.clone(), payload.puzzle.unwrap_or_default());
        self.presence.reset_match_stats();
        self.status = MatchStatus::Playing;
        self.result = None;
        self.reconnect_timeout = false;
        self.paused_by = None;
    }

    /// Overwrite from an authoritative snapshot, in any phase.
    fn apply_snapshot(&mut self, payload: &StateSyncPayload) {
        self.status = payload.status;
        if let Some(difficulty) = payload.difficulty {
            self.difficulty = difficulty;
        }
        self.board.apply_snapshot(
            payload.puzzle_id.clone(),
            payload.puzzle,
            payload.progress,
            payload.errors,
        );
        self.presence.apply_timers(payload.timers.unwrap_or_default());
        if let Some(opponent) = &payload.opponent {
            self.presence.apply_opponent(opponent.clone());
        }
        self.paused_by = (self.status == MatchStatus::Paused).then(|| {
            if self.presence.opponent().online {
                Participant::Me
            } else {
                Participant::Opponent
            }
        });
    }

    fn apply_cell_result(&mut self, result: &CellResult) {
        if !self.status.has_board() {
            debug!(status = ?self.status, "match: cell_result without a board ignored");
            return;
        }
        self.board.apply_cell_result(result);
    }

    fn is_me(&self, player_id: Option<&str>, nickname: Option<&str>) -> bool {
        let Some(me) = &self.identity else {
            return false;
        };
        match player_id {
            Some(id) => id == me.player_id,
            None => nickname.is_some_and(|n| n == me.nickname),
        }
    }

    /// Decide who a presence push refers to. An unnamed push is about the
    /// opponent; an id is adopted as the opponent's when none is known yet.
    fn resolve(&mut self, player_id: Option<&str>) -> Result<Participant> {
        let Some(id) = player_id else {
            return Ok(Participant::Opponent);
        };
        if self.is_me(Some(id), None) {
            return Ok(Participant::Me);
        }
        match self.presence.opponent_id().map(str::to_owned) {
            Some(known) if known == id => Ok(Participant::Opponent),
            Some(_) => Err(DuelError::UnknownPlayer(id.to_owned())),
            None => {
                self.presence.set_opponent_id(id.to_owned());
                Ok(Participant::Opponent)
            }
        }
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn status(&self) -> MatchStatus {
        self.status
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn board(&self) -> &GridReconciler {
        &self.board
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    pub fn puzzle_id(&self) -> Option<&str> {
        self.board.puzzle_id()
    }

    pub fn puzzle(&self) -> Option<&Grid> {
        self.board.puzzle()
    }

    pub fn progress(&self) -> &Grid {
        self.board.progress()
    }

    pub fn errors(&self) -> u32 {
        self.board.errors()
    }

    pub fn timers(&self) -> Timers {
        self.presence.timers()
    }

    pub fn opponent(&self) -> &OpponentInfo {
        self.presence.opponent()
    }

    pub fn result(&self) -> Option<&GameResult> {
        self.result.as_ref()
    }

    /// Sticky flag: the opponent's reconnect grace period expired.
    pub fn reconnect_timeout(&self) -> bool {
        self.reconnect_timeout
    }

    /// Who caused the current pause, if paused.
    pub fn paused_by(&self) -> Option<Participant> {
        self.paused_by
    }

    /// Our elapsed seconds.
    pub fn self_timer(&self) -> u64 {
        let role = self.identity.as_ref().map(|i| i.role).unwrap_or_default();
        self.presence.timers().for_role(role)
    }

    /// The opponent's elapsed seconds.
    pub fn opponent_timer(&self) -> u64 {
        let role = self.identity.as_ref().map(|i| i.role).unwrap_or_default();
        self.presence.timers().for_role(role.opposite())
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
    use crate::protocol::FinishReason;

    const ME: &str = "me-id";
    const THEM: &str = "them-id";

    fn identity() -> Identity {
        Identity {
            room_id: "123456".into(),
            player_id: ME.into(),
            nickname: "Alice".into(),
            role: Role::Host,
        }
    }

    fn givens() -> Grid {
        let mut g = Grid::empty();
        g.set(0, 0, 5);
        g
    }

    fn game_start(puzzle_id: &str) -> ServerMessage {
        ServerMessage::GameStart(GameStartPayload {
            room_id: None,
            difficulty: None,
            puzzle_id: Some(puzzle_id.into()),
            puzzle: Some(givens()),
        })
    }

    fn disconnected(id: Option<&str>) -> ServerMessage {
        ServerMessage::PlayerDisconnected {
            player_id: id.map(Into::into),
        }
    }

    fn reconnected(id: Option<&str>) -> ServerMessage {
        ServerMessage::PlayerReconnected {
            player_id: id.map(Into::into),
        }
    }

    fn cell(row: usize, col: usize, value: u8, correct: bool, errors: u32) -> ServerMessage {
        ServerMessage::CellResult(CellResult {
            row,
            col,
            value,
            correct,
            errors,
            filled: None,
        })
    }

    fn sync(status: MatchStatus, puzzle_id: &str, opponent_online: bool) -> ServerMessage {
        ServerMessage::StateSync(Box::new(StateSyncPayload {
            room_id: None,
            status,
            difficulty: Some(Difficulty::Hard),
            puzzle_id: Some(puzzle_id.into()),
            puzzle: Some(givens()),
            progress: None,
            errors: 1,
            timers: Some(Timers { host: 30, guest: 25 }),
            opponent: Some(OpponentInfo {
                nickname: "Bob".into(),
                online: opponent_online,
                progress: 12,
                errors: 2,
            }),
        }))
    }

    /// A state in `playing` with a known opponent.
    fn playing() -> MatchState {
        let mut state = MatchState::new();
        state.enter_room(identity(), Difficulty::Medium);
        state
            .apply(&ServerMessage::PlayerJoined {
                player_id: Some(THEM.into()),
                nickname: "Bob".into(),
            })
            .unwrap();
        state.apply(&game_start("p1")).unwrap();
        assert_eq!(state.status(), MatchStatus::Playing);
        state
    }

    #[test]
    fn enter_room_moves_idle_to_waiting() {
        let mut state = MatchState::new();
        let t = state.enter_room(identity(), Difficulty::Easy);
        assert_eq!(t.from, MatchStatus::Idle);
        assert_eq!(state.status(), MatchStatus::Waiting);
        assert_eq!(state.difficulty(), Difficulty::Easy);
    }

    #[test]
    fn player_ready_only_from_waiting() {
        let mut state = MatchState::new();
        state.enter_room(identity(), Difficulty::Medium);
        let t = state
            .apply(&ServerMessage::PlayerReady { player_id: None })
            .unwrap();
        assert_eq!(
            t,
            Some(Transition {
                from: MatchStatus::Waiting,
                to: MatchStatus::Ready
            })
        );

        let mut state = playing();
        let t = state
            .apply(&ServerMessage::PlayerReady { player_id: None })
            .unwrap();
        assert_eq!(t, None);
        assert_eq!(state.status(), MatchStatus::Playing);
    }

    #[test]
    fn own_player_joined_does_not_touch_opponent() {
        let mut state = MatchState::new();
        state.enter_room(identity(), Difficulty::Medium);
        state
            .apply(&ServerMessage::PlayerJoined {
                player_id: Some(ME.into()),
                nickname: "Alice".into(),
            })
            .unwrap();
        assert!(!state.opponent().online);
        assert!(state.opponent().nickname.is_empty());
        state
            .apply(&ServerMessage::PlayerJoined {
                player_id: None,
                nickname: "Bob".into(),
            })
            .unwrap();
        assert!(state.opponent().online);
        assert_eq!(state.opponent().nickname, "Bob");
    }

    #[test]
    fn game_start_resets_board_and_counters() {
        let mut state = playing();
        state.apply(&cell(1, 1, 4, true, 0)).unwrap();
        state.apply(&cell(1, 2, 4, false, 2)).unwrap();
        state
            .apply(&ServerMessage::OpponentProgress { filled: 9 })
            .unwrap();
        state.toggle_note(3, 3, 1);
        state.apply(&ServerMessage::RoomReset { room_id: None }).unwrap();
        state.apply(&game_start("p2")).unwrap();
        assert_eq!(state.status(), MatchStatus::Playing);
        assert!(state.progress().is_empty());
        assert_eq!(state.errors(), 0);
        assert_eq!(state.opponent().progress, 0);
        assert!(state.board().notes().is_empty());
        assert_eq!(state.puzzle_id(), Some("p2"));
    }

    #[test]
    fn game_start_ignored_while_playing() {
        let mut state = playing();
        state.apply(&cell(1, 1, 4, true, 0)).unwrap();
        assert_eq!(state.apply(&game_start("p9")).unwrap(), None);
        assert_eq!(state.puzzle_id(), Some("p1"));
        assert_eq!(state.progress().get(1, 1), Some(4));
    }

    #[test]
    fn opponent_disconnect_and_reconnect_pause_and_resume() {
        let mut state = playing();
        state.apply(&disconnected(Some(THEM))).unwrap();
        assert_eq!(state.status(), MatchStatus::Paused);
        assert!(!state.opponent().online);
        assert_eq!(state.paused_by(), Some(Participant::Opponent));

        state.apply(&reconnected(Some(THEM))).unwrap();
        assert_eq!(state.status(), MatchStatus::Playing);
        assert!(state.opponent().online);
        assert_eq!(state.paused_by(), None);
    }

    #[test]
    fn own_disconnect_pauses_without_marking_opponent_offline() {
        let mut state = playing();
        state.apply(&disconnected(Some(ME))).unwrap();
        assert_eq!(state.status(), MatchStatus::Paused);
        assert!(state.opponent().online);
        assert_eq!(state.paused_by(), Some(Participant::Me));

        state.apply(&reconnected(Some(ME))).unwrap();
        assert_eq!(state.status(), MatchStatus::Playing);
    }

    #[test]
    fn own_reconnect_waits_for_opponent_online() {
        let mut state = playing();
        state.apply(&disconnected(Some(THEM))).unwrap();
        state.apply(&disconnected(Some(ME))).unwrap();
        state.apply(&reconnected(Some(ME))).unwrap();
        assert_eq!(state.status(), MatchStatus::Paused);
        state.apply(&reconnected(None)).unwrap();
        assert_eq!(state.status(), MatchStatus::Playing);
    }

    #[test]
    fn unnamed_presence_targets_opponent() {
        let mut state = playing();
        state.apply(&disconnected(None)).unwrap();
        assert!(!state.opponent().online);
        assert_eq!(state.status(), MatchStatus::Paused);
    }

    #[test]
    fn unknown_player_id_is_a_protocol_error() {
        let mut state = playing();
        let err = state.apply(&disconnected(Some("stranger"))).unwrap_err();
        assert!(matches!(err, DuelError::UnknownPlayer(ref id) if id == "stranger"));
        assert_eq!(state.status(), MatchStatus::Playing);
        assert!(state.opponent().online);
    }

    #[test]
    fn first_foreign_id_is_adopted_as_opponent() {
        let mut state = MatchState::new();
        state.enter_room(identity(), Difficulty::Medium);
        state.apply(&game_start("p1")).unwrap();
        state.apply(&disconnected(Some(THEM))).unwrap();
        assert_eq!(state.presence().opponent_id(), Some(THEM));
        assert!(state.apply(&disconnected(Some("other"))).is_err());
    }

    #[test]
    fn disconnect_outside_playing_only_updates_presence() {
        let mut state = MatchState::new();
        state.enter_room(identity(), Difficulty::Medium);
        state.apply(&disconnected(None)).unwrap();
        assert_eq!(state.status(), MatchStatus::Waiting);
        assert!(!state.opponent().online);
    }

    #[test]
    fn game_over_only_from_playing() {
        let result = GameResult {
            winner: Role::Guest,
            reason: FinishReason::Errors,
            timers: Timers { host: 100, guest: 90 },
        };
        let mut state = playing();
        state.apply(&ServerMessage::GameOver(result.clone())).unwrap();
        assert_eq!(state.status(), MatchStatus::Finished);
        assert_eq!(state.result(), Some(&result));

        let mut waiting = MatchState::new();
        waiting.enter_room(identity(), Difficulty::Medium);
        waiting.apply(&ServerMessage::GameOver(result)).unwrap();
        assert_eq!(waiting.status(), MatchStatus::Waiting);
        assert!(waiting.result().is_none());
    }

    #[test]
    fn room_reset_from_any_state_clears_match() {
        let mut state = playing();
        state.apply(&cell(2, 2, 3, true, 1)).unwrap();
        state
            .apply(&ServerMessage::GameOver(GameResult {
                winner: Role::Host,
                reason: FinishReason::Completed,
                timers: Timers::default(),
            }))
            .unwrap();
        state.apply(&ServerMessage::ReconnectTimeout { player_id: None }).unwrap();
        state.apply(&ServerMessage::RoomReset { room_id: None }).unwrap();
        assert_eq!(state.status(), MatchStatus::Waiting);
        assert!(state.puzzle().is_none());
        assert!(state.progress().is_empty());
        assert_eq!(state.errors(), 0);
        assert!(state.result().is_none());
        assert!(!state.reconnect_timeout());
    }

    #[test]
    fn reconnect_timeout_is_sticky_until_start_or_reset() {
        let mut state = playing();
        state.apply(&ServerMessage::ReconnectTimeout { player_id: None }).unwrap();
        assert!(state.reconnect_timeout());
        state.apply(&reconnected(None)).unwrap();
        state.apply(&ServerMessage::TimerUpdate { timers: None }).unwrap();
        assert!(state.reconnect_timeout());
        state.apply(&ServerMessage::RoomReset { room_id: None }).unwrap();
        assert!(!state.reconnect_timeout());
        state.apply(&ServerMessage::ReconnectTimeout { player_id: None }).unwrap();
        state.apply(&game_start("p3")).unwrap();
        assert!(!state.reconnect_timeout());
    }

    #[test]
    fn state_sync_overwrites_from_any_state() {
        let mut state = MatchState::new();
        let t = state.apply(&sync(MatchStatus::Paused, "p7", false)).unwrap();
        assert_eq!(t.map(|t| t.to), Some(MatchStatus::Paused));
        assert_eq!(state.difficulty(), Difficulty::Hard);
        assert_eq!(state.errors(), 1);
        assert_eq!(state.timers(), Timers { host: 30, guest: 25 });
        assert_eq!(state.opponent().progress, 12);
        assert_eq!(state.paused_by(), Some(Participant::Opponent));
    }

    #[test]
    fn state_sync_with_new_puzzle_wipes_notes() {
        let mut state = playing();
        state.toggle_note(4, 4, 4);
        state.apply(&sync(MatchStatus::Playing, "p1", true)).unwrap();
        assert!(!state.board().notes().is_empty());
        state.apply(&sync(MatchStatus::Playing, "other", true)).unwrap();
        assert!(state.board().notes().is_empty());
    }

    #[test]
    fn cell_result_is_phase_gated() {
        let mut state = MatchState::new();
        state.enter_room(identity(), Difficulty::Medium);
        state.apply(&cell(1, 1, 4, true, 3)).unwrap();
        assert!(state.progress().is_empty());
        assert_eq!(state.errors(), 0);
    }

    #[test]
    fn timers_follow_role() {
        let mut state = playing();
        state
            .apply(&ServerMessage::TimerUpdate {
                timers: Some(Timers { host: 7, guest: 11 }),
            })
            .unwrap();
        assert_eq!(state.self_timer(), 7);
        assert_eq!(state.opponent_timer(), 11);
    }

    #[test]
    fn notes_and_fills_gated_on_phase() {
        let mut state = MatchState::new();
        assert!(!state.toggle_note(1, 1, 1));
        assert!(!state.can_fill(1, 1, 1));
        let mut state = playing();
        assert!(state.can_fill(1, 1, 1));
        assert!(!state.can_fill(0, 0, 1));
        assert!(state.record_pending(1, 1, 1));
        assert_eq!(state.board().pending(1, 1), Some(1));
    }
}
