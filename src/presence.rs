//! Opponent presence and match timers.
//!
//! Purely reactive: every push overwrites the previous value. Nothing here
//! interpolates between updates.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::protocol::{PlayerId, Role};

/// Elapsed seconds for both seats, as reported by the authority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timers {
    #[serde(default)]
    pub host: u64,
    #[serde(default)]
    pub guest: u64,
}

impl Timers {
    /// Elapsed seconds for the seat held by `role`.
    pub fn for_role(&self, role: Role) -> u64 {
        match role {
            Role::Host => self.host,
            Role::Guest => self.guest,
        }
    }
}

/// What the client knows about the other player.
///
/// `progress` is an aggregate filled-cell count; the client never sees the
/// opponent's actual values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpponentInfo {
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub progress: u32,
    #[serde(default)]
    pub errors: u32,
}

/// Latest-wins tracker for [`Timers`] and [`OpponentInfo`].
#[derive(Debug, Clone, Default)]
pub struct PresenceTracker {
    timers: Timers,
    opponent: OpponentInfo,
    opponent_id: Option<PlayerId>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timers(&self) -> Timers {
        self.timers
    }

    pub fn opponent(&self) -> &OpponentInfo {
        &self.opponent
    }

    /// Player id of the opponent, once learned from a push.
    pub fn opponent_id(&self) -> Option<&str> {
        self.opponent_id.as_deref()
    }

    pub(crate) fn set_opponent_id(&mut self, id: PlayerId) {
        self.opponent_id = Some(id);
    }

    pub fn apply_timers(&mut self, timers: Timers) {
        self.timers = timers;
    }

    pub fn apply_opponent_progress(&mut self, filled: u32) {
        self.opponent.progress = filled;
    }

    /// Overwrite the opponent block from a snapshot. The learned id is kept.
    pub fn apply_opponent(&mut self, opponent: OpponentInfo) {
        self.opponent = opponent;
    }

    /// The opponent joined (or re-joined) the room.
    pub fn opponent_joined(&mut self, nickname: &str, id: Option<PlayerId>) {
        debug!(nickname, "presence: opponent joined");
        if !nickname.is_empty() {
            self.opponent.nickname = nickname.to_owned();
        }
        self.opponent.online = true;
        if id.is_some() {
            self.opponent_id = id;
        }
    }

    pub fn set_opponent_online(&mut self, online: bool) {
        self.opponent.online = online;
    }

    /// Zero the opponent's per-match counters.
    pub fn reset_match_stats(&mut self) {
        self.opponent.progress = 0;
        self.opponent.errors = 0;
    }
}
