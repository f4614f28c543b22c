//! Core round types

use crate::BASE_MULTIPLIER;
use crash_protocol::{BetView, ClientMessage, GameState, HistoryEntry, Phase};
use std::collections::VecDeque;

/// One player's commitment for the current round
#[derive(Debug, Clone, PartialEq)]
pub struct Stake {
    pub player_id: String,
    pub amount: f64,
    /// Auto-cashout target, `None` for manual cashout only
    pub cashout_at: Option<f64>,
    /// Set once when the stake is cashed out
    pub prize: Option<f64>,
}

impl Stake {
    pub fn new(player_id: String, amount: f64, cashout_at: Option<f64>) -> Self {
        Self {
            player_id,
            amount,
            cashout_at,
            prize: None,
        }
    }

    /// A stake is live until it has been cashed out
    pub fn is_live(&self) -> bool {
        self.prize.is_none()
    }

    /// Freeze the stake at the given multiplier
    pub fn settle(&mut self, multiplier: f64) -> f64 {
        let prize = self.amount * multiplier;
        self.prize = Some(prize);
        prize
    }

    pub fn to_view(&self) -> BetView {
        BetView {
            user_id: self.player_id.clone(),
            amount: self.amount,
            cashout_at: self.cashout_at.unwrap_or(0.0),
            prize: self.prize.unwrap_or(0.0),
        }
    }
}

/// Completed round record, appended once and never mutated
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outcome {
    pub crash_point: f64,
    /// Unix millis
    pub timestamp: i64,
}

impl From<Outcome> for HistoryEntry {
    fn from(outcome: Outcome) -> Self {
        HistoryEntry {
            crash_point: outcome.crash_point,
            timestamp: outcome.timestamp,
        }
    }
}

/// The authoritative round aggregate
#[derive(Debug, Clone)]
pub struct Round {
    /// Incremented on every new betting window
    pub id: u64,
    pub phase: Phase,
    pub multiplier: f64,
    /// Hidden from clients
    pub crash_point: f64,
    /// Unix millis of the scheduled round start
    pub next_phase_at: Option<i64>,
    /// Arrival order
    pub stakes: Vec<Stake>,
    /// Most recent last
    pub history: VecDeque<Outcome>,
}

impl Round {
    pub fn new() -> Self {
        Self {
            id: 0,
            phase: Phase::Betting,
            multiplier: BASE_MULTIPLIER,
            crash_point: BASE_MULTIPLIER,
            next_phase_at: None,
            stakes: Vec::new(),
            history: VecDeque::new(),
        }
    }

    pub fn stake_of(&self, player_id: &str) -> Option<&Stake> {
        self.stakes.iter().find(|stake| stake.player_id == player_id)
    }

    pub fn live_stake_mut(&mut self, player_id: &str) -> Option<&mut Stake> {
        self.stakes
            .iter_mut()
            .find(|stake| stake.player_id == player_id && stake.is_live())
    }

    /// Append an outcome, evicting the oldest beyond `retained`
    pub fn record_outcome(&mut self, outcome: Outcome, retained: usize) {
        self.history.push_back(outcome);
        while self.history.len() > retained {
            self.history.pop_front();
        }
    }

    /// Client-facing snapshot with the last `surfaced` outcomes
    pub fn snapshot(&self, surfaced: usize) -> GameState {
        let skip = self.history.len().saturating_sub(surfaced);
        GameState {
            phase: self.phase,
            multiplier: self.multiplier,
            next_game_at: match self.phase {
                Phase::Betting => self.next_phase_at,
                _ => None,
            },
            round_id: self.id,
            bets: self.stakes.iter().map(Stake::to_view).collect(),
            history: self
                .history
                .iter()
                .skip(skip)
                .copied()
                .map(HistoryEntry::from)
                .collect(),
        }
    }
}

impl Default for Round {
    fn default() -> Self {
        Self::new()
    }
}

/// Decoded player intent
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerIntent {
    PlaceStake {
        player_id: String,
        amount: f64,
        cashout_at: Option<f64>,
    },
    Cashout {
        player_id: String,
    },
    CancelStake {
        player_id: String,
    },
}

impl PlayerIntent {
    pub fn player_id(&self) -> &str {
        match self {
            PlayerIntent::PlaceStake { player_id, .. }
            | PlayerIntent::Cashout { player_id }
            | PlayerIntent::CancelStake { player_id } => player_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PlayerIntent::PlaceStake { .. } => "place-stake",
            PlayerIntent::Cashout { .. } => "cashout",
            PlayerIntent::CancelStake { .. } => "cancel-stake",
        }
    }
}

impl From<ClientMessage> for PlayerIntent {
    fn from(message: ClientMessage) -> Self {
        match message {
            // A zero-value bet is the wire encoding of a cancellation
            ClientMessage::Bet(req) if req.value == 0.0 => PlayerIntent::CancelStake {
                player_id: req.user_id,
            },
            ClientMessage::Bet(req) => PlayerIntent::PlaceStake {
                player_id: req.user_id,
                amount: req.value,
                cashout_at: req.cashout_at,
            },
            ClientMessage::Cashout(req) => PlayerIntent::Cashout {
                player_id: req.user_id,
            },
            ClientMessage::Cancel(req) => PlayerIntent::CancelStake {
                player_id: req.user_id,
            },
        }
    }
}
