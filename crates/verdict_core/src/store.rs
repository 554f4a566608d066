use chrono::{DateTime, Utc};
use verdict_logging::{verdict_debug, verdict_info, verdict_warn};

use crate::recovery::{self, RecoveryReport};
use crate::{
    ItemOutcome, ItemState, ItemStatus, Label, Outcome, Phase, RunState, SourceItem,
    StateStorage, StoreError, Timing, WorkItem,
};

/// Storage key of the run state slot.
pub const STATE_KEY: &str = "verdict-run-state";

/// Owner of the single [`RunState`].
///
/// Every mutation is applied to a copy, written through to storage, and only
/// then swapped in. A failed write leaves memory and storage both at the
/// previous state.
pub struct WorkItemStore {
    state: RunState,
    storage: Box<dyn StateStorage>,
    key: String,
}

impl std::fmt::Debug for WorkItemStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkItemStore")
            .field("key", &self.key)
            .field("items", &self.state.items.len())
            .field("phase", &self.state.phase)
            .finish()
    }
}

impl WorkItemStore {
    /// Loads the persisted state (if any) and runs recovery on it. There is no
    /// other way to obtain a store, so no run can start on unrecovered state.
    pub fn open(storage: Box<dyn StateStorage>) -> Result<(Self, RecoveryReport), StoreError> {
        Self::open_with_key(storage, STATE_KEY)
    }

    pub fn open_with_key(
        storage: Box<dyn StateStorage>,
        key: impl Into<String>,
    ) -> Result<(Self, RecoveryReport), StoreError> {
        let key = key.into();
        let state = load_state(storage.as_ref(), &key)?;
        let mut store = Self {
            state,
            storage,
            key,
        };
        let report = recovery::recover(&mut store)?;
        Ok((store, report))
    }

    /// Loads the persisted state as stored, without recovery and without
    /// writing anything back. For reporting only; an interrupted run still
    /// shows its in-flight item.
    pub fn load_snapshot(storage: &dyn StateStorage) -> Result<RunState, StoreError> {
        load_state(storage, STATE_KEY)
    }

    /// Read-only view of the current state.
    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Owned copy of the current state.
    pub fn snapshot(&self) -> RunState {
        self.state.clone()
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    /// Replaces all items with fresh `Pending` ones, resetting cursor and timing.
    pub fn seed(&mut self, items: Vec<SourceItem>) -> Result<(), StoreError> {
        self.require_idle("seed")?;
        let count = items.len();
        self.commit(|state| {
            state.items = items.into_iter().map(WorkItem::from).collect();
            state.cursor = 0;
            state.timing = Timing::default();
            Ok(())
        })?;
        verdict_info!("Seeded {} work items", count);
        Ok(())
    }

    /// `Pending -> InFlight`. Rejected if any other item is already in flight.
    pub fn mark_in_flight(&mut self, index: usize) -> Result<(), StoreError> {
        self.commit(|state| {
            let busy = state
                .items
                .iter()
                .enumerate()
                .any(|(other, item)| other != index && item.status() == ItemStatus::InFlight);
            let item = item_mut(state, index)?;
            let from = item.status();
            if from != ItemStatus::Pending || busy {
                return Err(StoreError::InvalidTransition {
                    index,
                    from,
                    to: ItemStatus::InFlight,
                });
            }
            item.state = ItemState::InFlight;
            state.cursor = index;
            Ok(())
        })
    }

    /// `InFlight -> Succeeded`, computing `matches_expected` from the item's label.
    pub fn mark_succeeded(
        &mut self,
        index: usize,
        result: Outcome,
        derived: Label,
    ) -> Result<(), StoreError> {
        self.commit(|state| {
            let item = in_flight_item(state, index, ItemStatus::Succeeded)?;
            let matches_expected = item.expected_label.map(|expected| expected == derived);
            item.state = ItemState::Succeeded {
                outcome: ItemOutcome {
                    result,
                    derived,
                    matches_expected,
                },
            };
            state.cursor = state.cursor.max(index + 1);
            Ok(())
        })
    }

    /// `InFlight -> Failed`.
    pub fn mark_failed(&mut self, index: usize, reason: impl Into<String>) -> Result<(), StoreError> {
        let reason = reason.into();
        self.commit(|state| {
            let item = in_flight_item(state, index, ItemStatus::Failed)?;
            item.state = ItemState::Failed { reason };
            state.cursor = state.cursor.max(index + 1);
            Ok(())
        })
    }

    /// `InFlight -> Pending`. A no-op for an item that is already `Pending`.
    pub fn revert_to_pending(&mut self, index: usize) -> Result<(), StoreError> {
        let len = self.state.items.len();
        let status = self
            .state
            .items
            .get(index)
            .map(WorkItem::status)
            .ok_or(StoreError::IndexOutOfRange { index, len })?;
        if status == ItemStatus::Pending {
            return Ok(());
        }
        self.commit(|state| {
            let item = in_flight_item(state, index, ItemStatus::Pending)?;
            item.state = ItemState::Pending;
            Ok(())
        })?;
        verdict_debug!("Item {} reverted to pending", index);
        Ok(())
    }

    /// `Idle -> Running` with the cursor at `from`. Keeps an existing
    /// `started_at` so a resumed run reports time since the first start.
    pub fn begin_run(&mut self, from: usize, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.require_idle("begin run")?;
        self.commit(|state| {
            state.phase = Phase::Running;
            state.cursor = from;
            state.timing.started_at.get_or_insert(now);
            state.timing.ended_at = None;
            Ok(())
        })
    }

    /// `Running -> Cancelling`.
    pub fn request_cancel(&mut self) -> Result<(), StoreError> {
        if self.state.phase != Phase::Running {
            return Err(StoreError::InvalidState {
                operation: "cancel",
                phase: self.state.phase,
            });
        }
        self.commit(|state| {
            state.phase = Phase::Cancelling;
            Ok(())
        })
    }

    /// `Running | Cancelling -> Idle`, recording the end time.
    pub fn finish_run(&mut self, now: DateTime<Utc>) -> Result<(), StoreError> {
        if self.state.phase == Phase::Idle {
            return Err(StoreError::InvalidState {
                operation: "finish run",
                phase: Phase::Idle,
            });
        }
        self.commit(|state| {
            state.phase = Phase::Idle;
            state.timing.ended_at = Some(now);
            Ok(())
        })
    }

    /// Forces `Idle` in memory even if the write fails, reverting any in-flight
    /// item to pending. Used when a run dies on a store error; a stale durable
    /// copy is repaired by recovery on the next open.
    pub fn abandon_run(&mut self, now: DateTime<Utc>) -> Result<(), StoreError> {
        for item in &mut self.state.items {
            if item.state == ItemState::InFlight {
                item.state = ItemState::Pending;
            }
        }
        self.state.phase = Phase::Idle;
        self.state.timing.ended_at = Some(now);
        self.persist(&self.state)
    }

    /// Clears items, cursor and timing in one step and removes the durable slot.
    pub fn reset(&mut self) -> Result<(), StoreError> {
        self.require_idle("reset")?;
        self.storage.remove(&self.key)?;
        self.state = RunState::default();
        verdict_info!("Run state reset");
        Ok(())
    }

    pub(crate) fn force_idle(&mut self) -> Result<(), StoreError> {
        self.commit(|state| {
            state.phase = Phase::Idle;
            Ok(())
        })
    }

    pub(crate) fn clamp_cursor(&mut self) -> Result<bool, StoreError> {
        if self.state.cursor <= self.state.items.len() {
            return Ok(false);
        }
        self.commit(|state| {
            state.cursor = state.items.len();
            Ok(())
        })?;
        Ok(true)
    }

    fn require_idle(&self, operation: &'static str) -> Result<(), StoreError> {
        match self.state.phase {
            Phase::Idle => Ok(()),
            phase => Err(StoreError::InvalidState { operation, phase }),
        }
    }

    fn commit<T>(
        &mut self,
        apply: impl FnOnce(&mut RunState) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut next = self.state.clone();
        let value = apply(&mut next)?;
        self.persist(&next)?;
        self.state = next;
        Ok(value)
    }

    fn persist(&self, state: &RunState) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(state)?;
        self.storage.save(&self.key, &encoded)?;
        Ok(())
    }
}

fn load_state(storage: &dyn StateStorage, key: &str) -> Result<RunState, StoreError> {
    let Some(raw) = storage.load(key)? else {
        return Ok(RunState::default());
    };
    match serde_json::from_str::<RunState>(&raw) {
        Ok(state) => {
            verdict_info!(
                "Loaded persisted run state with {} items (phase {:?})",
                state.items.len(),
                state.phase
            );
            Ok(state)
        }
        Err(err) => {
            verdict_warn!(
                "Failed to parse persisted run state under {:?}, starting fresh: {}",
                key,
                err
            );
            Ok(RunState::default())
        }
    }
}

fn item_mut(state: &mut RunState, index: usize) -> Result<&mut WorkItem, StoreError> {
    let len = state.items.len();
    state
        .items
        .get_mut(index)
        .ok_or(StoreError::IndexOutOfRange { index, len })
}

fn in_flight_item(
    state: &mut RunState,
    index: usize,
    to: ItemStatus,
) -> Result<&mut WorkItem, StoreError> {
    let item = item_mut(state, index)?;
    match item.status() {
        ItemStatus::InFlight => Ok(item),
        from => Err(StoreError::InvalidTransition { index, from, to }),
    }
}
