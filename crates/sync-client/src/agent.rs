//! Sync Agent - the client's model of the round
//!
//! Applies server snapshots, issues intents with local admission guards and
//! optimistic updates, and keeps the personal ledgers. No I/O: callers pass
//! the current time in Unix millis and send whatever intent comes back.

use crate::{
    ledger::{BetStatus, LedgerEntry, PersonalBet, PersonalHistory, StakeLedger},
    reconcile::{merge_phase, reconcile_user_bet, within_grace},
    SyncClientConfig,
};
use crash_protocol::{BetView, ClientMessage, GameState, HistoryEntry, Phase, ServerMessage};
use serde::Serialize;
use std::time::Duration;

/// Merged view handed to the UI
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameView {
    pub phase: Phase,
    pub multiplier: f64,
    pub next_game_at: Option<i64>,
    pub round_id: u64,
    pub bets: Vec<BetView>,
    pub history: Vec<HistoryEntry>,
    pub user_bet: Option<BetView>,
    pub user_bet_history: Vec<PersonalBet>,
    pub recent_bets: Vec<LedgerEntry>,
    pub is_connected: bool,
    pub reconnect_exhausted: bool,
}

impl Default for GameView {
    fn default() -> Self {
        let state = GameState::default();
        Self {
            phase: state.phase,
            multiplier: state.multiplier,
            next_game_at: state.next_game_at,
            round_id: state.round_id,
            bets: Vec::new(),
            history: Vec::new(),
            user_bet: None,
            user_bet_history: Vec::new(),
            recent_bets: Vec::new(),
            is_connected: false,
            reconnect_exhausted: false,
        }
    }
}

/// Client-side round model for one player
pub struct SyncAgent {
    user_id: String,
    grace: Duration,
    /// Last authoritative snapshot, phase possibly held by reconciliation
    state: GameState,
    user_bet: Option<BetView>,
    /// Round the player's stake belongs to
    bet_round: u64,
    last_intent_at: Option<i64>,
    personal: PersonalHistory,
    ledger: StakeLedger,
    connected: bool,
    reconnect_exhausted: bool,
}

impl SyncAgent {
    pub fn new(config: &SyncClientConfig) -> Self {
        Self {
            user_id: config.user_id.clone(),
            grace: config.grace,
            state: GameState::default(),
            user_bet: None,
            bet_round: 0,
            last_intent_at: None,
            personal: PersonalHistory::new(config.personal_history_cap),
            ledger: StakeLedger::new(config.ledger_cap),
            connected: false,
            reconnect_exhausted: false,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn user_bet(&self) -> Option<&BetView> {
        self.user_bet.as_ref()
    }

    pub fn personal_history(&self) -> &PersonalHistory {
        &self.personal
    }

    pub fn ledger(&self) -> &StakeLedger {
        &self.ledger
    }

    /// Apply a server frame
    pub fn handle_message(&mut self, message: ServerMessage, now: i64) {
        let incoming = message.into_state();
        let in_grace = within_grace(self.last_intent_at, now, self.grace);

        let mut local = self.user_bet.take();
        if local.is_some() && incoming.round_id != 0 && incoming.round_id != self.bet_round {
            tracing::debug!(
                "Dropping stake from round {}, server is at round {}",
                self.bet_round,
                incoming.round_id
            );
            local = None;
        }

        let server_bet = incoming.bet_of(&self.user_id).cloned();
        if let Some(bet) = server_bet.as_ref().filter(|bet| bet.is_cashed_out()) {
            self.personal.confirm_win(incoming.round_id, bet, now);
        }

        if self.state.phase != Phase::Crashed && incoming.phase == Phase::Crashed {
            self.settle_round(&incoming, server_bet.as_ref(), local.as_ref(), now);
        }

        self.user_bet = reconcile_user_bet(
            local.as_ref(),
            server_bet.as_ref(),
            incoming.phase,
            in_grace,
        );
        if server_bet.is_some() {
            self.bet_round = incoming.round_id;
        }

        let phase = merge_phase(
            self.state.phase,
            incoming.phase,
            self.user_bet.is_some(),
            in_grace,
        );
        if phase != incoming.phase {
            tracing::debug!("Holding {} over {} inside grace window", phase, incoming.phase);
        }

        self.ledger.merge(incoming.round_id, &incoming.bets);
        self.state = GameState { phase, ..incoming };
    }

    fn settle_round(
        &mut self,
        state: &GameState,
        server_bet: Option<&BetView>,
        local: Option<&BetView>,
        now: i64,
    ) {
        let crash_point = state.multiplier;

        match (server_bet, local) {
            (Some(bet), _) if bet.is_cashed_out() => {
                self.personal.confirm_win(state.round_id, bet, now);
            }
            (Some(bet), _) => self.record_loss(state, bet, now),
            (None, Some(bet)) => {
                // Never accepted, so an optimistic prize was never paid
                tracing::debug!(
                    "Round {} crashed without the server listing our stake",
                    state.round_id
                );
                self.ledger.discard(state.round_id, bet);
                self.record_loss(state, bet, now);
            }
            (None, None) => {}
        }

        self.personal.set_crash_point(state.round_id, crash_point);
    }

    fn record_loss(&mut self, state: &GameState, bet: &BetView, now: i64) {
        if self
            .personal
            .record_loss(state.round_id, bet, state.multiplier, now)
        {
            tracing::info!(
                "Round {} crashed at {:.2}x, lost {:.2}",
                state.round_id,
                state.multiplier,
                bet.amount
            );
        }
    }

    /// Place a stake. Returns the intent to send, or `None` when the local
    /// guards refuse it.
    pub fn place_bet(&mut self, amount: f64, cashout_at: Option<f64>, now: i64) -> Option<ClientMessage> {
        if self.state.phase != Phase::Betting || self.user_bet.is_some() {
            tracing::debug!("Bet refused locally in {}", self.state.phase);
            return None;
        }
        if !amount.is_finite() || amount <= 0.0 || cashout_at.is_some_and(|t| !t.is_finite()) {
            tracing::debug!("Bet refused locally: invalid amount {}", amount);
            return None;
        }

        self.user_bet = Some(BetView {
            user_id: self.user_id.clone(),
            amount,
            cashout_at: cashout_at.unwrap_or(0.0),
            prize: 0.0,
        });
        self.bet_round = self.state.round_id;
        self.last_intent_at = Some(now);

        Some(ClientMessage::bet(self.user_id.clone(), amount, cashout_at))
    }

    /// Cash out at the current multiplier
    pub fn cashout(&mut self, now: i64) -> Option<ClientMessage> {
        if self.state.phase != Phase::Running {
            return None;
        }
        let multiplier = self.state.multiplier;
        let bet = self.user_bet.as_mut().filter(|bet| !bet.is_cashed_out())?;

        bet.prize = bet.amount * multiplier;
        bet.cashout_at = multiplier;
        let bet = bet.clone();

        self.personal
            .record(PersonalBet::new(self.bet_round, &bet, BetStatus::Win, now));
        self.ledger.record(self.bet_round, &bet);
        self.last_intent_at = Some(now);

        Some(ClientMessage::cashout(self.user_id.clone()))
    }

    /// Withdraw the stake before the round starts. Sent as a zero-value bet.
    pub fn cancel_bet(&mut self, now: i64) -> Option<ClientMessage> {
        if self.state.phase != Phase::Betting {
            return None;
        }
        let bet = self.user_bet.take()?;

        self.personal
            .record(PersonalBet::new(self.bet_round, &bet, BetStatus::Cancelled, now));
        self.last_intent_at = Some(now);

        Some(ClientMessage::bet(self.user_id.clone(), 0.0, None))
    }

    /// Forget the personal outcomes. Nothing is sent to the server.
    pub fn clear_bet_history(&mut self) {
        tracing::debug!("Clearing {} personal history entries", self.personal.len());
        self.personal.clear();
    }

    /// Re-check an intent that could not be sent while disconnected against
    /// the freshly synced state. Returns it if it still applies.
    pub fn replay(&mut self, intent: ClientMessage, now: i64) -> Option<ClientMessage> {
        let on_server = self.state.bet_of(&self.user_id);
        let phase = self.state.phase;

        let admissible = match &intent {
            ClientMessage::Bet(req) if req.value > 0.0 => {
                phase == Phase::Betting && on_server.is_none()
            }
            ClientMessage::Bet(_) | ClientMessage::Cancel(_) => {
                phase == Phase::Betting && on_server.is_some()
            }
            ClientMessage::Cashout(_) => {
                phase == Phase::Running && on_server.is_some_and(|bet| !bet.is_cashed_out())
            }
        };

        if !admissible {
            tracing::debug!("Dropping pending {:?}, no longer applies in {}", intent, phase);
            return None;
        }

        if let ClientMessage::Bet(req) = &intent {
            if req.value > 0.0 && self.user_bet.is_none() {
                self.user_bet = Some(BetView {
                    user_id: self.user_id.clone(),
                    amount: req.value,
                    cashout_at: req.cashout_at.unwrap_or(0.0),
                    prize: 0.0,
                });
                self.bet_round = self.state.round_id;
            }
        }
        self.last_intent_at = Some(now);
        Some(intent)
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
        if connected {
            self.reconnect_exhausted = false;
        }
    }

    pub fn set_reconnect_exhausted(&mut self, exhausted: bool) {
        self.reconnect_exhausted = exhausted;
    }

    pub fn view(&self) -> GameView {
        GameView {
            phase: self.state.phase,
            multiplier: self.state.multiplier,
            next_game_at: self.state.next_game_at,
            round_id: self.state.round_id,
            bets: self.state.bets.clone(),
            history: self.state.history.clone(),
            user_bet: self.user_bet.clone(),
            user_bet_history: self.personal.to_vec(),
            recent_bets: self.ledger.to_vec(),
            is_connected: self.connected,
            reconnect_exhausted: self.reconnect_exhausted,
        }
    }
}
