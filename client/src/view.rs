//! Presentation port: what renderers consume.
//!
//! Renderers subscribe to [`GameEvent`]s and read [`SessionView`] snapshots;
//! neither holds anything the round state machine depends on.

use mines_common::models::{Cell, Player, PlayerBet};

use crate::{
    clock::ClockSync,
    profile::Stats,
    session::{RoundPhase, RoundState, Settlement},
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum LinkStatus {
    #[default]
    Connecting,
    Online {
        endpoint: String,
    },
    /// No endpoint reachable; simulated players only
    Offline,
    /// The link dropped after being established; nothing retries it
    Disconnected,
}

impl LinkStatus {
    pub fn is_online(&self) -> bool {
        matches!(self, LinkStatus::Online { .. })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Success,
    Error,
}

/// Transient message for a toast or status line
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Info,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            message: message.into(),
        }
    }
}

/// Events emitted by the mines game
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    /// The roster of online players changed
    RosterChanged { online: usize },
    RoundStarted { round_number: u64 },
    /// Round fields were patched by a `game_state` update
    RoundStateChanged,
    BetPlaced {
        bet: PlayerBet,
        /// Whether the bet belongs to the local player
        own: bool,
    },
    /// The mine was revealed; the round stays on screen until `RevealFinished`
    RoundResolved {
        mine_cell: Cell,
        settlement: Option<Settlement>,
        epoch: u64,
    },
    /// The reveal delay elapsed and the table is idle again
    RevealFinished,
    /// Balance or stats changed
    ProfileChanged,
    LinkChanged(LinkStatus),
    Notice(Notice),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerUrgency {
    Calm,
    Warning,
    Critical,
}

/// Read-only copy of the session for rendering
#[derive(Clone, Debug, PartialEq)]
pub struct SessionView {
    pub player_id: String,
    pub player_name: String,
    pub balance: f64,
    pub stats: Stats,
    pub phase: RoundPhase,
    pub round: RoundState,
    pub clock: ClockSync,
    pub players: Vec<Player>,
    pub bets: Vec<PlayerBet>,
    pub selected_cell: Option<Cell>,
    pub link: LinkStatus,
}

impl SessionView {
    /// Whole seconds until the round ends on the server clock, `None` when idle
    pub fn seconds_left(&self, local_now_ms: i64) -> Option<u64> {
        if self.phase != RoundPhase::Active {
            return None;
        }
        let server_now = self.clock.server_time_at(local_now_ms);
        let remaining = (self.round.end_time - server_now).max(0);
        Some((remaining / 1000) as u64)
    }

    pub fn urgency(&self, local_now_ms: i64) -> Option<TimerUrgency> {
        self.seconds_left(local_now_ms).map(|secs| match secs {
            0..=5 => TimerUrgency::Critical,
            6..=10 => TimerUrgency::Warning,
            _ => TimerUrgency::Calm,
        })
    }

    pub fn own_bet(&self) -> Option<&PlayerBet> {
        self.bets.iter().find(|bet| bet.player_id == self.player_id)
    }

    pub fn bet_of(&self, player_id: &str) -> Option<&PlayerBet> {
        self.bets.iter().find(|bet| bet.player_id == player_id)
    }
}
