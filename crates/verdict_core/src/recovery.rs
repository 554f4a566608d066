//! Startup reconciliation of a loaded run state.
//!
//! No runner survives a restart, so an item recorded as in flight and a phase
//! recorded as running or cancelling are both stale. Recovery reverts the
//! former to `Pending` and forces the latter to `Idle`.

use verdict_logging::{verdict_info, verdict_warn};

use crate::{Phase, StoreError, WorkItemStore};

/// What recovery had to repair. An empty report means the state was clean.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub reverted: Vec<usize>,
    pub stale_phase: Option<Phase>,
    pub cursor_clamped: bool,
}

impl RecoveryReport {
    pub fn is_clean(&self) -> bool {
        self.reverted.is_empty() && self.stale_phase.is_none() && !self.cursor_clamped
    }
}

/// Reconciles `store` so no item is in flight and the phase is `Idle`.
///
/// Idempotent: a second call on the same store returns a clean report.
pub fn recover(store: &mut WorkItemStore) -> Result<RecoveryReport, StoreError> {
    let mut report = RecoveryReport::default();

    let in_flight = store.state().in_flight_indices();
    if in_flight.len() > 1 {
        verdict_warn!(
            "Recovery found {} in-flight items; at most one is expected",
            in_flight.len()
        );
    }
    for index in in_flight {
        verdict_warn!("Recovery: item {} was in flight, reverting to pending", index);
        store.revert_to_pending(index)?;
        report.reverted.push(index);
    }

    let phase = store.phase();
    if phase != Phase::Idle {
        verdict_warn!("Recovery: persisted phase {:?} is stale, forcing idle", phase);
        store.force_idle()?;
        report.stale_phase = Some(phase);
    }

    report.cursor_clamped = store.clamp_cursor()?;

    if !report.is_clean() {
        verdict_info!("Recovery repaired run state: {:?}", report);
    }
    Ok(report)
}
