//! Bet ledgers kept on the client
//!
//! - `PersonalHistory`: the player's own outcomes, most recent first
//! - `StakeLedger`: every stake seen in recent rounds, merged snapshot by snapshot

use crash_protocol::BetView;
use serde::Serialize;
use std::collections::VecDeque;

/// Outcome of one of the player's stakes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BetStatus {
    Win,
    Loss,
    Cancelled,
}

/// Personal history entry
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalBet {
    pub round_id: u64,
    pub user_id: String,
    pub amount: f64,
    pub cashout_at: f64,
    pub prize: f64,
    pub status: BetStatus,
    /// Crash point of the round, once known
    pub game_crash_point: Option<f64>,
    /// Unix millis
    pub timestamp: i64,
}

impl PersonalBet {
    pub fn new(round_id: u64, bet: &BetView, status: BetStatus, timestamp: i64) -> Self {
        Self {
            round_id,
            user_id: bet.user_id.clone(),
            amount: bet.amount,
            cashout_at: bet.cashout_at,
            prize: bet.prize,
            status,
            game_crash_point: None,
            timestamp,
        }
    }

    fn is_same_stake(&self, round_id: u64, bet: &BetView) -> bool {
        self.round_id == round_id && self.user_id == bet.user_id && self.amount == bet.amount
    }
}

/// The player's own outcomes, deduplicated per round
#[derive(Debug, Clone)]
pub struct PersonalHistory {
    entries: VecDeque<PersonalBet>,
    capacity: usize,
}

impl PersonalHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
        }
    }

    /// Prepend an entry. Returns false if the same round, player, amount and
    /// status is already recorded.
    pub fn record(&mut self, entry: PersonalBet) -> bool {
        let duplicate = self.entries.iter().any(|e| {
            e.round_id == entry.round_id
                && e.user_id == entry.user_id
                && e.amount == entry.amount
                && e.status == entry.status
        });
        if duplicate {
            return false;
        }

        self.entries.push_front(entry);
        self.entries.truncate(self.capacity);
        true
    }

    /// Settle an unpaid stake as lost. An optimistic win for the same stake
    /// is turned into the loss instead of keeping both.
    pub fn record_loss(&mut self, round_id: u64, bet: &BetView, crash_point: f64, now: i64) -> bool {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.status == BetStatus::Win && e.is_same_stake(round_id, bet))
        {
            entry.status = BetStatus::Loss;
            entry.prize = 0.0;
            entry.game_crash_point = Some(crash_point);
            return true;
        }

        let mut entry = PersonalBet::new(round_id, bet, BetStatus::Loss, now);
        entry.prize = 0.0;
        entry.game_crash_point = Some(crash_point);
        self.record(entry)
    }

    /// Make sure a paid stake shows as a win with the authoritative prize.
    /// Covers server-side auto-cashouts that never went through the agent.
    pub fn confirm_win(&mut self, round_id: u64, bet: &BetView, now: i64) {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.status == BetStatus::Win && e.is_same_stake(round_id, bet))
        {
            if entry.prize != bet.prize {
                tracing::debug!(
                    "Correcting round {} prize {:.2} -> {:.2}",
                    round_id,
                    entry.prize,
                    bet.prize
                );
                entry.prize = bet.prize;
            }
            return;
        }

        self.record(PersonalBet::new(round_id, bet, BetStatus::Win, now));
    }

    /// Attach the crash point to every entry of a finished round
    pub fn set_crash_point(&mut self, round_id: u64, crash_point: f64) {
        for entry in self.entries.iter_mut().filter(|e| e.round_id == round_id) {
            entry.game_crash_point.get_or_insert(crash_point);
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &PersonalBet> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<PersonalBet> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Stake seen in a recent round
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub round_id: u64,
    #[serde(flatten)]
    pub bet: BetView,
}

/// Recent stakes of every player, most recent first
#[derive(Debug, Clone)]
pub struct StakeLedger {
    entries: VecDeque<LedgerEntry>,
    capacity: usize,
}

impl StakeLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
        }
    }

    /// Merge a snapshot's stakes into the ledger.
    ///
    /// Entries match on `(userId, amount)` within the round. An unpaid entry
    /// is updated in place once its prize shows up, and a stale unpaid copy
    /// never shadows a known prize.
    pub fn merge(&mut self, round_id: u64, bets: &[BetView]) {
        for bet in bets.iter().filter(|b| !b.user_id.is_empty() && b.amount > 0.0) {
            self.upsert(round_id, bet);
        }
        self.entries.truncate(self.capacity);
    }

    /// Record a stake known locally before any snapshot carries it
    pub fn record(&mut self, round_id: u64, bet: &BetView) {
        self.upsert(round_id, bet);
        self.entries.truncate(self.capacity);
    }

    // One stake per player and round, so a match on amount is the same
    // stake; a later non-zero prize overwrites the stored one
    fn upsert(&mut self, round_id: u64, bet: &BetView) {
        let existing = self.entries.iter_mut().find(|e| {
            e.round_id == round_id && e.bet.user_id == bet.user_id && e.bet.amount == bet.amount
        });

        match existing {
            Some(entry) => {
                if bet.prize > 0.0 && entry.bet.prize != bet.prize {
                    entry.bet = bet.clone();
                }
            }
            None => self.entries.push_front(LedgerEntry {
                round_id,
                bet: bet.clone(),
            }),
        }
    }

    /// Drop a stake the server never listed
    pub fn discard(&mut self, round_id: u64, bet: &BetView) {
        self.entries.retain(|e| {
            !(e.round_id == round_id && e.bet.user_id == bet.user_id && e.bet.amount == bet.amount)
        });
    }

    pub fn to_vec(&self) -> Vec<LedgerEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bet(user: &str, amount: f64, prize: f64) -> BetView {
        BetView {
            user_id: user.to_string(),
            amount,
            cashout_at: 0.0,
            prize,
        }
    }

    #[test]
    fn test_record_suppresses_duplicates() {
        let mut history = PersonalHistory::new(100);
        let entry = PersonalBet::new(3, &bet("me", 10.0, 0.0), BetStatus::Loss, 1);

        assert!(history.record(entry.clone()));
        assert!(!history.record(entry.clone()));
        assert_eq!(history.len(), 1);

        // Same stake in another round is a new entry
        let mut next_round = entry;
        next_round.round_id = 4;
        assert!(history.record(next_round));
        assert_eq!(history.entries().next().map(|e| e.round_id), Some(4));
    }

    #[test]
    fn test_history_capped_most_recent_first() {
        let mut history = PersonalHistory::new(3);
        for round in 1..=5 {
            history.record(PersonalBet::new(round, &bet("me", 1.0, 0.0), BetStatus::Loss, 0));
        }

        let rounds: Vec<u64> = history.entries().map(|e| e.round_id).collect();
        assert_eq!(rounds, vec![5, 4, 3]);
    }

    #[test]
    fn test_loss_replaces_optimistic_win() {
        let mut history = PersonalHistory::new(100);
        history.record(PersonalBet::new(7, &bet("me", 10.0, 13.0), BetStatus::Win, 1));

        assert!(history.record_loss(7, &bet("me", 10.0, 0.0), 1.25, 2));
        let entries = history.to_vec();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, BetStatus::Loss);
        assert_eq!(entries[0].prize, 0.0);
        assert_eq!(entries[0].game_crash_point, Some(1.25));

        // Replaying the crash does not add another loss
        assert!(!history.record_loss(7, &bet("me", 10.0, 0.0), 1.25, 3));
    }

    #[test]
    fn test_confirm_win_corrects_prize_in_place() {
        let mut history = PersonalHistory::new(100);
        history.record(PersonalBet::new(2, &bet("me", 10.0, 15.0), BetStatus::Win, 1));

        history.confirm_win(2, &bet("me", 10.0, 15.1), 2);
        let entries = history.to_vec();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].prize, 15.1);

        // Auto-cashout with no local entry yet
        history.confirm_win(3, &bet("me", 5.0, 6.0), 3);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_ledger_updates_prize_in_place() {
        let mut ledger = StakeLedger::new(100);
        ledger.merge(1, &[bet("a", 10.0, 0.0), bet("b", 5.0, 0.0)]);
        ledger.merge(1, &[bet("a", 10.0, 0.0), bet("b", 5.0, 0.0)]);
        assert_eq!(ledger.len(), 2);

        ledger.merge(1, &[bet("a", 10.0, 12.0), bet("b", 5.0, 0.0)]);
        let entries = ledger.to_vec();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().any(|e| e.bet.user_id == "a" && e.bet.prize == 12.0));

        // A trailing unpaid copy does not add a second entry
        ledger.record(1, &bet("a", 10.0, 0.0));
        assert_eq!(ledger.len(), 2);
        assert!(ledger.to_vec().iter().any(|e| e.bet.prize == 12.0));
    }

    #[test]
    fn test_ledger_discard_only_touches_that_stake() {
        let mut ledger = StakeLedger::new(100);
        ledger.merge(1, &[bet("b", 5.0, 0.0)]);
        ledger.record(1, &bet("a", 10.0, 11.0));
        ledger.merge(2, &[bet("a", 10.0, 0.0)]);

        ledger.discard(1, &bet("a", 10.0, 0.0));
        let entries = ledger.to_vec();
        assert_eq!(entries.len(), 2);
        assert!(!entries.iter().any(|e| e.round_id == 1 && e.bet.user_id == "a"));
    }

    #[test]
    fn test_ledger_scopes_matches_to_round() {
        let mut ledger = StakeLedger::new(100);
        ledger.merge(1, &[bet("a", 10.0, 0.0)]);
        ledger.merge(2, &[bet("a", 10.0, 0.0)]);
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.to_vec()[0].round_id, 2);
    }

    #[test]
    fn test_ledger_skips_empty_stakes_and_caps() {
        let mut ledger = StakeLedger::new(2);
        ledger.merge(1, &[bet("", 10.0, 0.0), bet("a", 0.0, 0.0)]);
        assert!(ledger.is_empty());

        for round in 1..=4 {
            ledger.merge(round, &[bet("a", 1.0, 0.0)]);
        }
        let rounds: Vec<u64> = ledger.to_vec().iter().map(|e| e.round_id).collect();
        assert_eq!(rounds, vec![4, 3]);
    }

    #[test]
    fn test_ledger_entry_serializes_flat() {
        let entry = LedgerEntry {
            round_id: 9,
            bet: bet("a", 10.0, 15.0),
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["roundId"], 9);
        assert_eq!(value["userId"], "a");
        assert_eq!(value["prize"], 15.0);
    }
}
