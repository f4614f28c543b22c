//! Reconciliation of optimistic local state with server snapshots
//!
//! The server is authoritative, but its snapshot can trail a fresh intent by
//! a frame or two. Inside the grace window the local view wins; after it,
//! the snapshot wins, except that a stake placed before `Running` is kept
//! until the server shows it or the round ends.

use crash_protocol::{BetView, Phase};
use std::time::Duration;

/// True while the last intent is younger than the grace window
pub fn within_grace(last_intent_at: Option<i64>, now: i64, grace: Duration) -> bool {
    last_intent_at.is_some_and(|at| now.saturating_sub(at) < grace.as_millis() as i64)
}

/// Whether the snapshot already shows what the player did locally
pub fn snapshot_reflects(local: Option<&BetView>, authoritative: Option<&BetView>) -> bool {
    match (local, authoritative) {
        (None, None) => true,
        (Some(local), Some(server)) => {
            local.amount == server.amount && (local.prize == 0.0 || server.prize > 0.0)
        }
        // Stake not arrived yet, or cancel not applied yet
        _ => false,
    }
}

/// Merge the player's stake
pub fn reconcile_user_bet(
    local: Option<&BetView>,
    authoritative: Option<&BetView>,
    phase: Phase,
    in_grace: bool,
) -> Option<BetView> {
    if in_grace && !snapshot_reflects(local, authoritative) {
        return local.cloned();
    }

    match authoritative {
        Some(server) => Some(server.clone()),
        None if phase == Phase::Running => local.cloned(),
        None => None,
    }
}

/// Merge the phase. A betting phase is held through the grace window when
/// the player just placed a stake and the snapshot already moved on.
pub fn merge_phase(current: Phase, incoming: Phase, has_bet: bool, in_grace: bool) -> Phase {
    if current == Phase::Betting && incoming != Phase::Betting && has_bet && in_grace {
        return current;
    }
    incoming
}
