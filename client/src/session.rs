//! Round state machine.
//!
//! A [`Session`] owns the whole client-side model: profile, roster, the
//! current round and its bets. It is mutated only through [`Session::apply`]
//! and the intent methods, one call at a time, and never touches the
//! network or a clock on its own; callers pass the local time in.

use std::collections::BTreeMap;

use mines_common::{
    models::{
        Cell, GameStatePatch, PlaceBet, Player, PlayerBet, PlayerJoin, Roster, RoundId,
        RoundResult, RoundStart,
    },
    protocol::{ClientMessage, ServerMessage},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    IntentError,
    clock::ClockSync,
    profile::{Profile, StatsExport},
    storage::{ROUND_STATE_KEY, Storage, StorageExt},
    view::{GameEvent, LinkStatus, Notice, SessionView},
};

/// A persisted round younger than this is resumed on startup
pub const RESUME_WINDOW_MS: i64 = 30_000;

/// Gross payout factor on a winning stake
pub const WIN_MULTIPLIER: f64 = 1.45;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RoundPhase {
    /// Waiting for the next round; cell selection is open
    #[default]
    Idle,
    /// Accepting one bet per player until the round ends
    Active,
    /// Mine revealed, no input until the display delay runs out
    Resolving,
}

/// Round fields as last reported by the server
#[derive(Clone, Debug, PartialEq)]
pub struct RoundState {
    pub round_id: Option<RoundId>,
    pub is_active: bool,
    /// Server clock, milliseconds
    pub start_time: i64,
    /// Server clock, milliseconds
    pub end_time: i64,
    pub round_number: u64,
}

impl Default for RoundState {
    fn default() -> Self {
        Self {
            round_id: None,
            is_active: false,
            start_time: 0,
            end_time: 0,
            round_number: 1,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoundSnapshot {
    round_id: Option<RoundId>,
    is_round_active: bool,
    start_time: i64,
    end_time: i64,
    round_number: u64,
    server_time_offset: i64,
    save_time: i64,
}

/// Outcome of the local player's bet once the mine is known
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Settlement {
    pub stake: f64,
    pub cell: Cell,
    pub mine_cell: Cell,
    pub won: bool,
}

impl Settlement {
    fn new(stake: f64, cell: Cell, mine_cell: Cell) -> Self {
        Self {
            stake,
            cell,
            mine_cell,
            won: cell != mine_cell,
        }
    }

    /// Amount credited back to the balance; the stake was already deducted
    pub fn payout(&self) -> f64 {
        if self.won {
            self.stake * WIN_MULTIPLIER
        } else {
            0.0
        }
    }

    /// Balance change over the whole round
    pub fn net(&self) -> f64 {
        self.payout() - self.stake
    }
}

pub struct Session {
    storage: Box<dyn Storage>,
    profile: Profile,
    players: BTreeMap<String, Player>,
    round: RoundState,
    phase: RoundPhase,
    bets: BTreeMap<String, PlayerBet>,
    selected_cell: Option<Cell>,
    clock: ClockSync,
    reveal_epoch: u64,
    link: LinkStatus,
}

impl Session {
    /// Loads identity and profile, then resumes a fresh enough persisted round.
    pub fn load(storage: Box<dyn Storage>, now_ms: i64) -> Self {
        let profile = Profile::load(storage.as_ref());
        info!(
            "Loaded profile {} ({}), balance {:.1}",
            profile.player_id, profile.player_name, profile.user_balance
        );

        let mut session = Self {
            storage,
            profile,
            players: BTreeMap::new(),
            round: RoundState::default(),
            phase: RoundPhase::Idle,
            bets: BTreeMap::new(),
            selected_cell: None,
            clock: ClockSync::default(),
            reveal_epoch: 0,
            link: LinkStatus::default(),
        };
        session.restore_round(now_ms);
        session
    }

    fn restore_round(&mut self, now_ms: i64) -> bool {
        let snapshot = match self.storage.get::<RoundSnapshot>(ROUND_STATE_KEY) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return false,
            Err(e) => {
                warn!("Discarding unreadable round snapshot: {}", e);
                return false;
            }
        };

        let age = now_ms - snapshot.save_time;
        if age >= RESUME_WINDOW_MS {
            debug!("Discarding round snapshot saved {}ms ago", age);
            self.forget_round();
            return false;
        }

        self.round = RoundState {
            round_id: snapshot.round_id,
            is_active: snapshot.is_round_active,
            start_time: snapshot.start_time,
            end_time: snapshot.end_time,
            round_number: snapshot.round_number,
        };
        self.clock = ClockSync::from_offset(snapshot.server_time_offset);
        self.phase = if snapshot.is_round_active {
            RoundPhase::Active
        } else {
            RoundPhase::Idle
        };

        info!(
            "Resumed round #{} saved {}ms ago (active: {})",
            self.round.round_number, age, self.round.is_active
        );
        true
    }

    fn persist_round(&self, now_ms: i64) {
        let snapshot = RoundSnapshot {
            round_id: self.round.round_id.clone(),
            is_round_active: self.round.is_active,
            start_time: self.round.start_time,
            end_time: self.round.end_time,
            round_number: self.round.round_number,
            server_time_offset: self.clock.offset_ms(),
            save_time: now_ms,
        };
        if let Err(e) = self.storage.set(ROUND_STATE_KEY, &snapshot) {
            warn!("Failed to persist round snapshot: {}", e);
        }
    }

    fn forget_round(&self) {
        if let Err(e) = self.storage.remove(ROUND_STATE_KEY) {
            warn!("Failed to clear round snapshot: {}", e);
        }
    }

    fn save_profile(&self) {
        self.profile.save(self.storage.as_ref());
    }

    /// Applies one authoritative server event.
    pub fn apply(&mut self, message: ServerMessage, now_ms: i64) -> Vec<GameEvent> {
        match message {
            ServerMessage::OnlinePlayers(roster) => self.on_roster(roster),
            ServerMessage::PlayerJoined(player) => self.on_player_joined(player),
            ServerMessage::PlayerLeft(player_id) => self.on_player_left(&player_id),
            ServerMessage::PlayerBet(bet) => self.on_player_bet(bet),
            ServerMessage::GameState(patch) => self.on_game_state(patch, now_ms),
            ServerMessage::RoundStart(start) => self.on_round_start(start, now_ms),
            ServerMessage::RoundResult(result) => self.on_round_result(result),
            ServerMessage::Error(error) => {
                warn!("Server error: {}", error.message);
                vec![GameEvent::Notice(Notice::error(format!(
                    "Error: {}",
                    error.message
                )))]
            }
        }
    }

    fn on_roster(&mut self, roster: Roster) -> Vec<GameEvent> {
        self.players = roster.into_players().into_iter().collect();
        debug!("Roster replaced: {} players online", self.players.len());
        vec![GameEvent::RosterChanged {
            online: self.players.len(),
        }]
    }

    fn on_player_joined(&mut self, player: Player) -> Vec<GameEvent> {
        debug!("Player joined: {} ({})", player.name, player.id);
        let notice = Notice::info(format!("{} joined", player.name));
        self.players.insert(player.id.clone(), player);
        vec![
            GameEvent::RosterChanged {
                online: self.players.len(),
            },
            GameEvent::Notice(notice),
        ]
    }

    fn on_player_left(&mut self, player_id: &str) -> Vec<GameEvent> {
        debug!("Player left: {}", player_id);
        self.players.remove(player_id);
        self.bets.remove(player_id);
        vec![GameEvent::RosterChanged {
            online: self.players.len(),
        }]
    }

    fn on_player_bet(&mut self, bet: PlayerBet) -> Vec<GameEvent> {
        if self.phase != RoundPhase::Active {
            debug!(
                "Dropping bet from {} outside an active round ({:?})",
                bet.player_id, self.phase
            );
            return Vec::new();
        }
        if self.bets.contains_key(&bet.player_id) {
            warn!(
                "Ignoring second bet from {} in round #{}",
                bet.player_id, self.round.round_number
            );
            return Vec::new();
        }

        let own = bet.player_id == self.profile.player_id;
        let mut events = Vec::new();

        if own {
            // Optimistic: nothing restores the stake if the server later drops the bet.
            self.profile.user_balance -= bet.bet;
            self.selected_cell = Some(bet.cell);
            self.save_profile();
            info!(
                "Own bet of {} on cell {} recorded, balance {:.1}",
                bet.bet, bet.cell, self.profile.user_balance
            );
            events.push(GameEvent::ProfileChanged);
            events.push(GameEvent::Notice(Notice::success(format!(
                "Bet {} TON on cell {}",
                bet.bet, bet.cell
            ))));
        } else {
            debug!("Bet of {} on cell {} by {}", bet.bet, bet.cell, bet.player_id);
        }

        self.bets.insert(bet.player_id.clone(), bet.clone());
        events.insert(0, GameEvent::BetPlaced { bet, own });
        events
    }

    fn on_game_state(&mut self, patch: GameStatePatch, now_ms: i64) -> Vec<GameEvent> {
        debug!("Merging game state patch: {:?}", patch);

        if let Some(offset) = patch.server_time_offset {
            self.clock = ClockSync::from_offset(offset);
        }
        if let Some(start_time) = patch.round_start_time {
            self.round.start_time = start_time;
        }
        if let Some(end_time) = patch.round_end_time {
            self.round.end_time = end_time;
        }
        if let Some(round_number) = patch.round_number {
            self.round.round_number = round_number;
        }
        if let Some(round_id) = patch.round_id {
            self.round.round_id = Some(round_id);
        }

        match (patch.is_round_active, self.phase) {
            (Some(true), RoundPhase::Idle) => {
                self.enter_active();
            }
            (Some(true), RoundPhase::Resolving) => {
                self.selected_cell = None;
                self.enter_active();
            }
            (Some(false), RoundPhase::Active) => {
                self.round.is_active = false;
                self.phase = RoundPhase::Idle;
                self.bets.clear();
            }
            _ => {}
        }

        self.persist_round(now_ms);
        vec![GameEvent::RoundStateChanged]
    }

    fn enter_active(&mut self) {
        self.round.is_active = true;
        self.phase = RoundPhase::Active;
        self.bets.clear();
        self.reveal_epoch += 1;
    }

    fn on_round_start(&mut self, start: RoundStart, now_ms: i64) -> Vec<GameEvent> {
        info!(
            "Round #{} ({}) started, ends at {}",
            start.round_number, start.round_id, start.end_time
        );
        self.clock.calibrate(start.server_time, now_ms);

        let end_time = if start.end_time < start.start_time {
            warn!(
                "Round #{} ends before it starts ({} < {}), clamping",
                start.round_number, start.end_time, start.start_time
            );
            start.start_time
        } else {
            start.end_time
        };

        self.round = RoundState {
            round_id: Some(start.round_id),
            is_active: true,
            start_time: start.start_time,
            end_time,
            round_number: start.round_number,
        };
        if self.phase == RoundPhase::Resolving {
            self.selected_cell = None;
        }
        self.enter_active();
        self.persist_round(now_ms);

        vec![
            GameEvent::RoundStarted {
                round_number: start.round_number,
            },
            GameEvent::Notice(Notice::info(format!(
                "Round #{} started",
                start.round_number
            ))),
        ]
    }

    fn on_round_result(&mut self, result: RoundResult) -> Vec<GameEvent> {
        if self.phase == RoundPhase::Resolving {
            debug!("Ignoring duplicate round result");
            return Vec::new();
        }

        info!(
            "Round #{} resolved, mine in cell {}",
            self.round.round_number, result.mine_cell
        );
        self.phase = RoundPhase::Resolving;
        self.round.is_active = false;
        self.reveal_epoch += 1;
        self.forget_round();

        let settlement = self
            .bets
            .get(&self.profile.player_id)
            .map(|bet| Settlement::new(bet.bet, bet.cell, result.mine_cell));
        self.bets.clear();

        let mut events = Vec::new();
        if let Some(settlement) = settlement {
            let stats = &mut self.profile.stats;
            stats.games_played += 1;
            stats.total_wagered += settlement.stake;
            if settlement.won {
                stats.wins += 1;
                self.profile.user_balance += settlement.payout();
                info!("Won {:.2}", settlement.payout());
            } else {
                stats.losses += 1;
                info!("Lost {}", settlement.stake);
            }
            self.save_profile();
            events.push(GameEvent::ProfileChanged);
        }

        events.insert(
            0,
            GameEvent::RoundResolved {
                mine_cell: result.mine_cell,
                settlement,
                epoch: self.reveal_epoch,
            },
        );
        events
    }

    /// Ends the reveal started by the `round_result` that produced `epoch`.
    ///
    /// Returns `None` for a stale timer: a newer round already moved the
    /// machine on.
    pub fn finish_reveal(&mut self, epoch: u64) -> Option<GameEvent> {
        if epoch != self.reveal_epoch || self.phase != RoundPhase::Resolving {
            debug!(
                "Ignoring stale reveal timer (epoch {}, current {})",
                epoch, self.reveal_epoch
            );
            return None;
        }
        self.phase = RoundPhase::Idle;
        self.selected_cell = None;
        Some(GameEvent::RevealFinished)
    }

    pub fn set_link(&mut self, link: LinkStatus) -> GameEvent {
        info!("Link status: {:?}", link);
        self.link = link.clone();
        GameEvent::LinkChanged(link)
    }

    /// Adds locally simulated players to the roster
    pub fn add_players(&mut self, players: Vec<Player>) -> GameEvent {
        for player in players {
            self.players.insert(player.id.clone(), player);
        }
        GameEvent::RosterChanged {
            online: self.players.len(),
        }
    }

    /// Roster players other than the local one
    pub fn opponents(&self) -> Vec<Player> {
        self.players
            .values()
            .filter(|player| player.id != self.profile.player_id)
            .cloned()
            .collect()
    }

    pub fn select_cell(&mut self, cell: Cell) -> Result<(), IntentError> {
        if self.phase != RoundPhase::Idle {
            return Err(IntentError::SelectionLocked);
        }
        debug!("Selected cell {}", cell);
        self.selected_cell = Some(cell);
        Ok(())
    }

    /// Validates a bet locally and builds the `place_bet` intent.
    ///
    /// Nothing changes here; the stake is only deducted once the server
    /// echoes the bet back.
    pub fn prepare_bet(&self, amount: f64) -> Result<ClientMessage, IntentError> {
        if self.phase != RoundPhase::Active {
            return Err(IntentError::RoundNotActive);
        }
        if !amount.is_finite() || amount <= 0.0 {
            return Err(IntentError::InvalidAmount);
        }
        if amount > self.profile.user_balance {
            return Err(IntentError::InsufficientBalance {
                balance: self.profile.user_balance,
                amount,
            });
        }
        let Some(cell) = self.selected_cell else {
            return Err(IntentError::NoCellSelected);
        };
        if self.bets.contains_key(&self.profile.player_id) {
            return Err(IntentError::AlreadyBet);
        }
        if !self.link.is_online() {
            return Err(IntentError::NotConnected);
        }

        Ok(ClientMessage::PlaceBet(PlaceBet {
            player_id: self.profile.player_id.clone(),
            bet: amount,
            cell,
        }))
    }

    pub fn join_message(&self) -> ClientMessage {
        ClientMessage::PlayerJoin(PlayerJoin {
            id: self.profile.player_id.clone(),
            name: self.profile.player_name.clone(),
            balance: self.profile.user_balance,
        })
    }

    pub fn reset_stats(&mut self) -> Vec<GameEvent> {
        self.profile.reset_stats();
        self.save_profile();
        vec![
            GameEvent::ProfileChanged,
            GameEvent::Notice(Notice::success("Stats reset")),
        ]
    }

    pub fn reset_game(&mut self) -> Vec<GameEvent> {
        self.profile.reset_game();
        self.save_profile();
        vec![
            GameEvent::ProfileChanged,
            GameEvent::Notice(Notice::success("New game started")),
        ]
    }

    pub fn export_stats(
        &self,
        exported_at: chrono::DateTime<chrono::Utc>,
    ) -> serde_json::Result<StatsExport> {
        self.profile.export(exported_at)
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn reveal_epoch(&self) -> u64 {
        self.reveal_epoch
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn link(&self) -> &LinkStatus {
        &self.link
    }

    pub fn player_id(&self) -> &str {
        &self.profile.player_id
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            player_id: self.profile.player_id.clone(),
            player_name: self.profile.player_name.clone(),
            balance: self.profile.user_balance,
            stats: self.profile.stats,
            phase: self.phase,
            round: self.round.clone(),
            clock: self.clock,
            players: self.players.values().cloned().collect(),
            bets: self.bets.values().cloned().collect(),
            selected_cell: self.selected_cell,
            link: self.link.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{GAME_DATA_KEY, MemoryStorage};
    use mines_common::models::ServerError;

    const NOW: i64 = 1_700_000_000_000;

    fn cell(n: u8) -> Cell {
        Cell::new(n).unwrap()
    }

    fn session_with(storage: &MemoryStorage) -> Session {
        let mut session = Session::load(Box::new(storage.clone()), NOW);
        session.set_link(LinkStatus::Online {
            endpoint: "ws://test/ws".into(),
        });
        session
    }

    fn round_start(number: u64) -> ServerMessage {
        ServerMessage::RoundStart(RoundStart {
            round_id: RoundId::Text(format!("round-{number}")),
            start_time: NOW,
            end_time: NOW + 30_000,
            round_number: number,
            server_time: NOW + 250,
        })
    }

    fn bet_by(player_id: &str, amount: f64, n: u8) -> ServerMessage {
        ServerMessage::PlayerBet(PlayerBet {
            player_id: player_id.to_string(),
            bet: amount,
            cell: cell(n),
            player_name: None,
        })
    }

    fn result(mine: u8) -> ServerMessage {
        ServerMessage::RoundResult(RoundResult {
            mine_cell: cell(mine),
        })
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn round_start_activates_and_calibrates_clock() {
        let storage = MemoryStorage::new();
        let mut session = session_with(&storage);

        let events = session.apply(round_start(3), NOW);

        assert_eq!(session.phase(), RoundPhase::Active);
        assert_eq!(events[0], GameEvent::RoundStarted { round_number: 3 });
        let view = session.view();
        assert_eq!(view.clock.offset_ms(), 250);
        assert_eq!(view.round.round_number, 3);
        assert!(storage.contains(ROUND_STATE_KEY));
    }

    #[test]
    fn winning_bet_pays_stake_times_multiplier() {
        let storage = MemoryStorage::new();
        let mut session = session_with(&storage);
        let me = session.player_id().to_string();

        session.apply(round_start(1), NOW);
        session.apply(bet_by(&me, 4.0, 3), NOW);
        assert_close(session.view().balance, 6.0);

        let events = session.apply(result(7), NOW);
        let GameEvent::RoundResolved { settlement, .. } = &events[0] else {
            panic!("expected RoundResolved, got {:?}", events[0]);
        };
        let settlement = settlement.expect("own bet settles");
        assert!(settlement.won);
        assert_close(settlement.net(), 1.8);

        let view = session.view();
        assert_close(view.balance, 11.8);
        assert_eq!(view.stats.wins, 1);
        assert_eq!(view.stats.games_played, 1);
        assert_close(view.stats.total_wagered, 4.0);
        assert_eq!(view.phase, RoundPhase::Resolving);
        assert!(!storage.contains(ROUND_STATE_KEY));
    }

    #[test]
    fn losing_bet_keeps_deducted_balance() {
        let storage = MemoryStorage::new();
        let mut session = session_with(&storage);
        let me = session.player_id().to_string();

        session.apply(round_start(1), NOW);
        session.apply(bet_by(&me, 4.0, 3), NOW);
        session.apply(result(3), NOW);

        let view = session.view();
        assert_close(view.balance, 6.0);
        assert_eq!(view.stats.losses, 1);
        assert_eq!(view.stats.wins, 0);
    }

    #[test]
    fn result_without_own_bet_changes_nothing_but_round_state() {
        let storage = MemoryStorage::new();
        let mut session = session_with(&storage);

        session.apply(round_start(1), NOW);
        session.apply(bet_by("someone_else", 2.0, 1), NOW);
        let events = session.apply(result(1), NOW);

        assert_eq!(
            events,
            vec![GameEvent::RoundResolved {
                mine_cell: cell(1),
                settlement: None,
                epoch: session.reveal_epoch(),
            }]
        );
        let view = session.view();
        assert_close(view.balance, 10.0);
        assert_eq!(view.stats.games_played, 0);
        assert!(view.bets.is_empty());
        assert!(!view.round.is_active);
    }

    #[test]
    fn round_start_clears_previous_bets() {
        let storage = MemoryStorage::new();
        let mut session = session_with(&storage);

        session.apply(round_start(1), NOW);
        session.apply(bet_by("bot_1", 2.0, 4), NOW);
        assert_eq!(session.view().bets.len(), 1);

        session.apply(round_start(2), NOW);
        assert!(session.view().bets.is_empty());

        session.apply(bet_by("bot_1", 3.0, 5), NOW);
        let view = session.view();
        assert_eq!(view.bets.len(), 1);
        assert_eq!(view.bet_of("bot_1").map(|bet| bet.bet), Some(3.0));
    }

    #[test]
    fn one_bet_per_player_per_round() {
        let storage = MemoryStorage::new();
        let mut session = session_with(&storage);
        let me = session.player_id().to_string();

        session.apply(round_start(1), NOW);
        session.apply(bet_by(&me, 2.0, 4), NOW);
        let events = session.apply(bet_by(&me, 2.0, 5), NOW);

        assert!(events.is_empty());
        assert_close(session.view().balance, 8.0);
        assert_eq!(session.view().selected_cell, Some(cell(4)));
    }

    #[test]
    fn bets_outside_active_round_are_dropped() {
        let storage = MemoryStorage::new();
        let mut session = session_with(&storage);

        assert!(session.apply(bet_by("bot_2", 1.0, 2), NOW).is_empty());
        assert!(session.view().bets.is_empty());
    }

    #[test]
    fn reveal_returns_to_idle_and_clears_selection() {
        let storage = MemoryStorage::new();
        let mut session = session_with(&storage);
        let me = session.player_id().to_string();

        session.select_cell(cell(6)).unwrap();
        session.apply(round_start(1), NOW);
        session.apply(bet_by(&me, 1.0, 6), NOW);
        session.apply(result(2), NOW);
        let epoch = session.reveal_epoch();

        assert_eq!(
            session.select_cell(cell(1)),
            Err(IntentError::SelectionLocked)
        );
        assert_eq!(session.finish_reveal(epoch), Some(GameEvent::RevealFinished));
        assert_eq!(session.phase(), RoundPhase::Idle);
        assert_eq!(session.view().selected_cell, None);
    }

    #[test]
    fn stale_reveal_timer_is_ignored() {
        let storage = MemoryStorage::new();
        let mut session = session_with(&storage);

        session.apply(round_start(1), NOW);
        session.apply(result(2), NOW);
        let stale = session.reveal_epoch();
        session.apply(round_start(2), NOW);

        assert_eq!(session.finish_reveal(stale), None);
        assert_eq!(session.phase(), RoundPhase::Active);
    }

    #[test]
    fn bet_rejected_without_active_round() {
        let storage = MemoryStorage::new();
        let mut session = session_with(&storage);
        session.select_cell(cell(2)).unwrap();

        assert_eq!(session.prepare_bet(1.0), Err(IntentError::RoundNotActive));
    }

    #[test]
    fn bet_rejected_for_non_positive_amount() {
        let storage = MemoryStorage::new();
        let mut session = session_with(&storage);
        session.select_cell(cell(2)).unwrap();
        session.apply(round_start(1), NOW);

        assert_eq!(session.prepare_bet(0.0), Err(IntentError::InvalidAmount));
        assert_eq!(session.prepare_bet(-3.0), Err(IntentError::InvalidAmount));
        assert_eq!(session.prepare_bet(f64::NAN), Err(IntentError::InvalidAmount));
    }

    #[test]
    fn bet_rejected_above_balance() {
        let storage = MemoryStorage::new();
        let mut session = session_with(&storage);
        session.select_cell(cell(2)).unwrap();
        session.apply(round_start(1), NOW);

        assert_eq!(
            session.prepare_bet(10.5),
            Err(IntentError::InsufficientBalance {
                balance: 10.0,
                amount: 10.5
            })
        );
    }

    #[test]
    fn bet_rejected_without_selected_cell() {
        let storage = MemoryStorage::new();
        let mut session = session_with(&storage);
        session.apply(round_start(1), NOW);

        assert_eq!(session.prepare_bet(1.0), Err(IntentError::NoCellSelected));
    }

    #[test]
    fn bet_rejected_while_offline() {
        let storage = MemoryStorage::new();
        let mut session = session_with(&storage);
        session.select_cell(cell(2)).unwrap();
        session.apply(round_start(1), NOW);
        session.set_link(LinkStatus::Offline);

        assert_eq!(session.prepare_bet(1.0), Err(IntentError::NotConnected));
    }

    #[test]
    fn valid_bet_builds_place_bet_intent() {
        let storage = MemoryStorage::new();
        let mut session = session_with(&storage);
        session.select_cell(cell(8)).unwrap();
        session.apply(round_start(1), NOW);

        let message = session.prepare_bet(2.5).unwrap();
        assert_eq!(
            message,
            ClientMessage::PlaceBet(PlaceBet {
                player_id: session.player_id().to_string(),
                bet: 2.5,
                cell: cell(8),
            })
        );
        assert_close(session.view().balance, 10.0);
    }

    #[test]
    fn fresh_snapshot_is_resumed() {
        let storage = MemoryStorage::new();
        let mut session = session_with(&storage);
        session.apply(round_start(5), NOW);

        let resumed = Session::load(Box::new(storage.clone()), NOW + 29_999);
        assert_eq!(resumed.phase(), RoundPhase::Active);
        let view = resumed.view();
        assert_eq!(view.round.round_number, 5);
        assert_eq!(view.clock.offset_ms(), 250);
        assert_eq!(view.round.round_id, Some(RoundId::Text("round-5".into())));
    }

    #[test]
    fn snapshot_exactly_at_window_is_discarded() {
        let storage = MemoryStorage::new();
        let mut session = session_with(&storage);
        session.apply(round_start(5), NOW);

        let resumed = Session::load(Box::new(storage.clone()), NOW + RESUME_WINDOW_MS);
        assert_eq!(resumed.phase(), RoundPhase::Idle);
        assert_eq!(resumed.view().round, RoundState::default());
        assert!(!storage.contains(ROUND_STATE_KEY));
    }

    #[test]
    fn malformed_snapshot_is_treated_as_absent() {
        let storage = MemoryStorage::new();
        storage.set_raw(ROUND_STATE_KEY, "{\"roundId\":").unwrap();

        let session = Session::load(Box::new(storage.clone()), NOW);
        assert_eq!(session.phase(), RoundPhase::Idle);
    }

    #[test]
    fn game_state_patch_merges_and_toggles_phase() {
        let storage = MemoryStorage::new();
        let mut session = session_with(&storage);

        session.apply(
            ServerMessage::GameState(GameStatePatch {
                is_round_active: Some(true),
                round_end_time: Some(NOW + 10_000),
                round_number: Some(12),
                ..GameStatePatch::default()
            }),
            NOW,
        );
        let view = session.view();
        assert_eq!(view.phase, RoundPhase::Active);
        assert_eq!(view.round.round_number, 12);
        assert_eq!(view.round.end_time, NOW + 10_000);

        session.apply(bet_by("bot_3", 1.0, 1), NOW);
        session.apply(
            ServerMessage::GameState(GameStatePatch {
                is_round_active: Some(false),
                ..GameStatePatch::default()
            }),
            NOW,
        );
        let view = session.view();
        assert_eq!(view.phase, RoundPhase::Idle);
        assert!(view.bets.is_empty());
        assert_eq!(view.round.round_number, 12);
    }

    #[test]
    fn roster_events_track_players_and_their_bets() {
        let storage = MemoryStorage::new();
        let mut session = session_with(&storage);
        let ann = Player {
            id: "p1".into(),
            name: "Ann".into(),
            balance: 5.0,
        };
        let bob = Player {
            id: "p2".into(),
            name: "Bob".into(),
            balance: 7.0,
        };

        session.apply(
            ServerMessage::OnlinePlayers(Roster::Entries(vec![("p1".into(), ann)])),
            NOW,
        );
        session.apply(ServerMessage::PlayerJoined(bob), NOW);
        assert_eq!(session.view().players.len(), 2);

        session.apply(round_start(1), NOW);
        session.apply(bet_by("p2", 1.0, 9), NOW);
        let events = session.apply(ServerMessage::PlayerLeft("p2".into()), NOW);

        assert_eq!(events, vec![GameEvent::RosterChanged { online: 1 }]);
        assert!(session.view().bet_of("p2").is_none());
    }

    #[test]
    fn opponents_exclude_the_local_player() {
        let storage = MemoryStorage::new();
        let mut session = session_with(&storage);
        let me = session.player_id().to_string();
        session.add_players(vec![
            Player {
                id: me,
                name: "Me".into(),
                balance: 10.0,
            },
            Player {
                id: "p3".into(),
                name: "Cid".into(),
                balance: 4.0,
            },
        ]);

        let ids: Vec<String> = session.opponents().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, ["p3"]);
    }

    #[test]
    fn server_error_becomes_notice() {
        let storage = MemoryStorage::new();
        let mut session = session_with(&storage);

        let events = session.apply(
            ServerMessage::Error(ServerError {
                message: "bet rejected".into(),
            }),
            NOW,
        );
        assert_eq!(
            events,
            vec![GameEvent::Notice(Notice::error("Error: bet rejected"))]
        );
    }

    #[test]
    fn settlement_is_persisted_with_profile() {
        let storage = MemoryStorage::new();
        let mut session = session_with(&storage);
        let me = session.player_id().to_string();

        session.apply(round_start(1), NOW);
        session.apply(bet_by(&me, 2.0, 1), NOW);
        session.apply(result(9), NOW);
        assert!(storage.contains(GAME_DATA_KEY));

        let reloaded = Session::load(Box::new(storage.clone()), NOW);
        assert_close(reloaded.view().balance, 10.9);
        assert_eq!(reloaded.view().stats.wins, 1);
        assert_eq!(reloaded.player_id(), me);
    }

    #[test]
    fn seconds_left_uses_server_clock() {
        let storage = MemoryStorage::new();
        let mut session = session_with(&storage);
        session.apply(round_start(1), NOW);

        let view = session.view();
        // offset +250ms, round ends NOW + 30s on the server clock
        assert_eq!(view.seconds_left(NOW), Some(29));
        assert_eq!(view.seconds_left(NOW + 40_000), Some(0));
        assert_eq!(
            view.urgency(NOW + 25_000),
            Some(crate::view::TimerUrgency::Critical)
        );
        assert_eq!(
            view.urgency(NOW),
            Some(crate::view::TimerUrgency::Calm)
        );
    }
}
