//! Round State Machine
//!
//! `Betting → Running → Crashed → Betting …`, driven by clock events and
//! player intents through a single `handle` function. The machine owns no
//! timers and no I/O: it returns the snapshot to publish and the clock
//! effect to apply, so it runs the same under real and virtual time.

use crate::{
    clock::{ClockEffect, TimerKind},
    config::RoundConfig,
    crash_point::CrashPointSampler,
    error::RejectReason,
    round_multiplier,
    types::{Outcome, PlayerIntent, Round, Stake},
    BASE_MULTIPLIER,
};
use crash_protocol::{GameState, HistoryEntry, Phase};

/// Inputs to the state machine
#[derive(Debug, Clone, PartialEq)]
pub enum RoundEvent {
    /// Betting window timer expired
    BettingClosed,
    /// Multiplier tick
    Tick,
    /// Post-crash cooldown expired
    CooldownElapsed,
    /// Player intent from a transport session
    Intent(PlayerIntent),
}

impl From<TimerKind> for RoundEvent {
    fn from(kind: TimerKind) -> Self {
        match kind {
            TimerKind::BettingWindow => RoundEvent::BettingClosed,
            TimerKind::Tick => RoundEvent::Tick,
            TimerKind::Cooldown => RoundEvent::CooldownElapsed,
        }
    }
}

/// Result of handling one event
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// State changed: publish the snapshot, then apply the effect
    Changed {
        snapshot: GameState,
        effect: ClockEffect,
    },
    /// Intent refused, state untouched
    Rejected(RejectReason),
    /// Stale timer event for a phase that already ended
    Ignored,
}

/// Authoritative round state machine
pub struct RoundStateMachine {
    round: Round,
    config: RoundConfig,
    sampler: Box<dyn CrashPointSampler>,
}

impl RoundStateMachine {
    pub fn new(config: RoundConfig, sampler: Box<dyn CrashPointSampler>) -> Self {
        Self {
            round: Round::new(),
            config,
            sampler,
        }
    }

    pub fn round(&self) -> &Round {
        &self.round
    }

    pub fn phase(&self) -> Phase {
        self.round.phase
    }

    pub fn snapshot(&self) -> GameState {
        self.round.snapshot(self.config.history_surfaced)
    }

    /// All retained outcomes, oldest first
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.round
            .history
            .iter()
            .copied()
            .map(HistoryEntry::from)
            .collect()
    }

    /// Open a new betting window. Called once at startup and after every
    /// cooldown.
    pub fn open_betting(&mut self, now_ms: i64) -> Transition {
        let round = &mut self.round;
        round.id += 1;
        round.phase = Phase::Betting;
        round.multiplier = BASE_MULTIPLIER;
        round.stakes.clear();
        round.crash_point = self.sampler.sample(self.config.max_crash_point);
        round.next_phase_at = Some(now_ms + self.config.betting_window.as_millis() as i64);

        tracing::info!(
            "Round {} betting open for {}ms",
            round.id,
            self.config.betting_window.as_millis()
        );

        self.changed(ClockEffect::ArmBettingWindow)
    }

    /// Apply one event
    pub fn handle(&mut self, event: RoundEvent, now_ms: i64) -> Transition {
        match event {
            RoundEvent::BettingClosed => self.start_running(),
            RoundEvent::Tick => self.tick(now_ms),
            RoundEvent::CooldownElapsed => {
                if self.round.phase != Phase::Crashed {
                    return Transition::Ignored;
                }
                self.open_betting(now_ms)
            }
            RoundEvent::Intent(intent) => {
                let result = match intent {
                    PlayerIntent::PlaceStake {
                        player_id,
                        amount,
                        cashout_at,
                    } => self.place_stake(player_id, amount, cashout_at),
                    PlayerIntent::Cashout { player_id } => self.cashout(&player_id),
                    PlayerIntent::CancelStake { player_id } => self.cancel_stake(&player_id),
                };
                match result {
                    Ok(()) => self.changed(ClockEffect::Keep),
                    Err(reason) => Transition::Rejected(reason),
                }
            }
        }
    }

    fn start_running(&mut self) -> Transition {
        if self.round.phase != Phase::Betting {
            return Transition::Ignored;
        }
        self.round.phase = Phase::Running;
        self.round.next_phase_at = None;

        tracing::info!(
            "Round {} running with {} stakes",
            self.round.id,
            self.round.stakes.len()
        );

        self.changed(ClockEffect::StartTicking)
    }

    fn tick(&mut self, now_ms: i64) -> Transition {
        if self.round.phase != Phase::Running {
            return Transition::Ignored;
        }

        let round = &mut self.round;
        round.multiplier = round_multiplier(round.multiplier + self.config.multiplier_step);
        let multiplier = round.multiplier;
        let crash_point = round.crash_point;

        // Auto-cashouts settle before the crash check of the same tick
        for stake in round.stakes.iter_mut().filter(|stake| stake.is_live()) {
            let Some(target) = stake.cashout_at else {
                continue;
            };
            if target <= multiplier && target <= crash_point {
                let prize = stake.settle(multiplier);
                tracing::debug!(
                    "Auto-cashout {} at {:.2}x: prize {:.2}",
                    stake.player_id,
                    multiplier,
                    prize
                );
            }
        }

        if multiplier < crash_point {
            tracing::trace!("Round {} at {:.2}x", round.id, multiplier);
            return self.changed(ClockEffect::Keep);
        }

        round.phase = Phase::Crashed;
        round.record_outcome(
            Outcome {
                crash_point: multiplier,
                timestamp: now_ms,
            },
            self.config.history_retained,
        );

        let winners = round.stakes.iter().filter(|s| !s.is_live()).count();
        tracing::info!(
            "Round {} crashed at {:.2}x ({}/{} stakes cashed out)",
            round.id,
            multiplier,
            winners,
            round.stakes.len()
        );

        self.changed(ClockEffect::ArmCooldown)
    }

    fn place_stake(
        &mut self,
        player_id: String,
        amount: f64,
        cashout_at: Option<f64>,
    ) -> Result<(), RejectReason> {
        if player_id.is_empty() {
            return Err(RejectReason::EmptyPlayerId);
        }
        if self.round.phase != Phase::Betting {
            return Err(RejectReason::WrongPhase {
                intent: "place-stake",
                phase: self.round.phase,
            });
        }
        if !amount.is_finite() || amount <= 0.0 {
            return Err(RejectReason::InvalidAmount(amount));
        }
        let cashout_at = normalize_target(cashout_at)?;
        if self.round.stake_of(&player_id).is_some() {
            return Err(RejectReason::DuplicateStake);
        }

        tracing::debug!(
            "Round {}: stake {:.2} from {} (auto {:?})",
            self.round.id,
            amount,
            player_id,
            cashout_at
        );
        self.round
            .stakes
            .push(Stake::new(player_id, amount, cashout_at));
        Ok(())
    }

    fn cashout(&mut self, player_id: &str) -> Result<(), RejectReason> {
        if self.round.phase != Phase::Running {
            return Err(RejectReason::WrongPhase {
                intent: "cashout",
                phase: self.round.phase,
            });
        }
        let multiplier = self.round.multiplier;
        let stake = self
            .round
            .live_stake_mut(player_id)
            .ok_or(RejectReason::NoLiveStake)?;

        let prize = stake.settle(multiplier);
        tracing::debug!(
            "Cashout {} at {:.2}x: prize {:.2}",
            player_id,
            multiplier,
            prize
        );
        Ok(())
    }

    fn cancel_stake(&mut self, player_id: &str) -> Result<(), RejectReason> {
        if self.round.phase != Phase::Betting {
            return Err(RejectReason::WrongPhase {
                intent: "cancel-stake",
                phase: self.round.phase,
            });
        }
        let index = self
            .round
            .stakes
            .iter()
            .position(|stake| stake.player_id == player_id)
            .ok_or(RejectReason::NoLiveStake)?;

        self.round.stakes.remove(index);
        tracing::debug!("Round {}: {} cancelled stake", self.round.id, player_id);
        Ok(())
    }

    fn changed(&self, effect: ClockEffect) -> Transition {
        Transition::Changed {
            snapshot: self.snapshot(),
            effect,
        }
    }
}

/// `None`, zero or negative targets mean manual cashout only
fn normalize_target(target: Option<f64>) -> Result<Option<f64>, RejectReason> {
    match target {
        None => Ok(None),
        Some(t) if !t.is_finite() => Err(RejectReason::InvalidCashoutTarget(t)),
        Some(t) if t <= 0.0 => Ok(None),
        Some(t) if t < BASE_MULTIPLIER => Err(RejectReason::InvalidCashoutTarget(t)),
        Some(t) => Ok(Some(t)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crash_point::FixedSampler;

    const NOW: i64 = 1_700_000_000_000;

    fn machine(crash_points: Vec<f64>) -> RoundStateMachine {
        let mut machine =
            RoundStateMachine::new(RoundConfig::default(), Box::new(FixedSampler::new(crash_points)));
        machine.open_betting(NOW);
        machine
    }

    fn bet(player: &str, amount: f64, cashout_at: Option<f64>) -> RoundEvent {
        RoundEvent::Intent(PlayerIntent::PlaceStake {
            player_id: player.to_string(),
            amount,
            cashout_at,
        })
    }

    fn cashout(player: &str) -> RoundEvent {
        RoundEvent::Intent(PlayerIntent::Cashout {
            player_id: player.to_string(),
        })
    }

    fn ticks(machine: &mut RoundStateMachine, n: usize) -> Transition {
        let mut last = Transition::Ignored;
        for _ in 0..n {
            last = machine.handle(RoundEvent::Tick, NOW);
        }
        last
    }

    #[test]
    fn test_open_betting_schedules_round_start() {
        let machine = machine(vec![1.5]);
        let state = machine.snapshot();

        assert_eq!(state.phase, Phase::Betting);
        assert_eq!(state.round_id, 1);
        assert_eq!(state.multiplier, 1.0);
        assert_eq!(state.next_game_at, Some(NOW + 5_000));
        assert_eq!(machine.round().crash_point, 1.5);
    }

    #[test]
    fn test_duplicate_stake_rejected() {
        let mut machine = machine(vec![1.5]);

        assert!(matches!(
            machine.handle(bet("p1", 10.0, None), NOW),
            Transition::Changed { .. }
        ));
        assert_eq!(
            machine.handle(bet("p1", 20.0, None), NOW),
            Transition::Rejected(RejectReason::DuplicateStake)
        );
        assert_eq!(machine.snapshot().bets.len(), 1);
        assert_eq!(machine.snapshot().bets[0].amount, 10.0);
    }

    #[test]
    fn test_stake_validation() {
        let mut machine = machine(vec![1.5]);

        assert_eq!(
            machine.handle(bet("p1", 0.0, None), NOW),
            Transition::Rejected(RejectReason::InvalidAmount(0.0))
        );
        assert_eq!(
            machine.handle(bet("p1", 5.0, Some(0.5)), NOW),
            Transition::Rejected(RejectReason::InvalidCashoutTarget(0.5))
        );
        assert_eq!(
            machine.handle(bet("", 5.0, None), NOW),
            Transition::Rejected(RejectReason::EmptyPlayerId)
        );

        // A zero target is manual-only
        machine.handle(bet("p1", 5.0, Some(0.0)), NOW);
        assert_eq!(machine.round().stakes[0].cashout_at, None);
    }

    #[test]
    fn test_intents_rejected_in_wrong_phase() {
        let mut machine = machine(vec![1.5]);
        machine.handle(bet("p1", 10.0, None), NOW);

        assert!(matches!(
            machine.handle(cashout("p1"), NOW),
            Transition::Rejected(RejectReason::WrongPhase { phase: Phase::Betting, .. })
        ));

        machine.handle(RoundEvent::BettingClosed, NOW);
        assert!(matches!(
            machine.handle(bet("p2", 10.0, None), NOW),
            Transition::Rejected(RejectReason::WrongPhase { phase: Phase::Running, .. })
        ));
        assert!(matches!(
            machine.handle(
                RoundEvent::Intent(PlayerIntent::CancelStake {
                    player_id: "p1".to_string()
                }),
                NOW
            ),
            Transition::Rejected(RejectReason::WrongPhase { .. })
        ));
    }

    #[test]
    fn test_cancel_removes_stake() {
        let mut machine = machine(vec![1.5]);
        machine.handle(bet("p1", 10.0, None), NOW);
        machine.handle(
            RoundEvent::Intent(PlayerIntent::CancelStake {
                player_id: "p1".to_string(),
            }),
            NOW,
        );
        assert!(machine.snapshot().bets.is_empty());

        // Cancelled players may bet again in the same window
        assert!(matches!(
            machine.handle(bet("p1", 4.0, None), NOW),
            Transition::Changed { .. }
        ));
    }

    #[test]
    fn test_cashout_pays_current_multiplier_once() {
        let mut machine = machine(vec![1.9]);
        machine.handle(bet("p1", 10.0, None), NOW);
        machine.handle(RoundEvent::BettingClosed, NOW);
        ticks(&mut machine, 50);

        assert_eq!(machine.round().multiplier, 1.5);
        machine.handle(cashout("p1"), NOW);
        assert_eq!(machine.snapshot().bets[0].prize, 15.0);

        assert_eq!(
            machine.handle(cashout("p1"), NOW),
            Transition::Rejected(RejectReason::NoLiveStake)
        );
        ticks(&mut machine, 5);
        assert_eq!(machine.snapshot().bets[0].prize, 15.0);
    }

    #[test]
    fn test_crash_records_outcome_and_arms_cooldown() {
        let mut machine = machine(vec![1.2]);
        machine.handle(bet("p1", 10.0, None), NOW);
        machine.handle(RoundEvent::BettingClosed, NOW);

        let before = ticks(&mut machine, 19);
        assert!(matches!(
            before,
            Transition::Changed { effect: ClockEffect::Keep, .. }
        ));

        let crash = machine.handle(RoundEvent::Tick, NOW + 7_000);
        let Transition::Changed { snapshot, effect } = crash else {
            panic!("expected crash transition");
        };
        assert_eq!(effect, ClockEffect::ArmCooldown);
        assert_eq!(snapshot.phase, Phase::Crashed);
        assert_eq!(snapshot.multiplier, 1.2);
        assert_eq!(snapshot.history.len(), 1);
        assert_eq!(snapshot.history[0].crash_point, 1.2);
        assert_eq!(snapshot.history[0].timestamp, NOW + 7_000);
        assert_eq!(snapshot.bets[0].prize, 0.0);

        // Late ticks after the crash are stale
        assert_eq!(machine.handle(RoundEvent::Tick, NOW), Transition::Ignored);
    }

    #[test]
    fn test_auto_cashout_on_crash_tick_favours_player() {
        let mut machine = machine(vec![1.2]);
        machine.handle(bet("exact", 10.0, Some(1.2)), NOW);
        machine.handle(bet("early", 10.0, Some(1.1)), NOW);
        machine.handle(bet("late", 10.0, Some(1.21)), NOW);
        machine.handle(RoundEvent::BettingClosed, NOW);

        ticks(&mut machine, 20);
        let state = machine.snapshot();
        assert_eq!(state.phase, Phase::Crashed);

        let prize = |id: &str| state.bet_of(id).map(|b| b.prize);
        assert_eq!(prize("exact"), Some(10.0 * 1.2));
        assert_eq!(prize("early"), Some(10.0 * 1.1));
        assert_eq!(prize("late"), Some(0.0));
    }

    #[test]
    fn test_next_round_clears_stakes_and_resamples() {
        let mut machine = machine(vec![1.05, 1.7]);
        machine.handle(bet("p1", 10.0, None), NOW);
        machine.handle(RoundEvent::BettingClosed, NOW);
        ticks(&mut machine, 5);
        assert_eq!(machine.phase(), Phase::Crashed);

        let Transition::Changed { snapshot, effect } =
            machine.handle(RoundEvent::CooldownElapsed, NOW + 10_000)
        else {
            panic!("expected new betting window");
        };
        assert_eq!(effect, ClockEffect::ArmBettingWindow);
        assert_eq!(snapshot.round_id, 2);
        assert_eq!(snapshot.multiplier, 1.0);
        assert!(snapshot.bets.is_empty());
        assert_eq!(snapshot.history.len(), 1);
        assert_eq!(snapshot.next_game_at, Some(NOW + 15_000));
        assert_eq!(machine.round().crash_point, 1.7);
    }

    #[test]
    fn test_stale_timer_events_ignored() {
        let mut machine = machine(vec![1.5]);
        assert_eq!(
            machine.handle(RoundEvent::CooldownElapsed, NOW),
            Transition::Ignored
        );
        assert_eq!(machine.handle(RoundEvent::Tick, NOW), Transition::Ignored);

        machine.handle(RoundEvent::BettingClosed, NOW);
        assert_eq!(
            machine.handle(RoundEvent::BettingClosed, NOW),
            Transition::Ignored
        );
    }
}
