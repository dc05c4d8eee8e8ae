//! Epoch gate: run a post-round action at most once per validation round.
//!
//! A round is identified by its `start_work_time`. After the round ends its
//! stake stays frozen for `stake_held_for` seconds; gated actions run only
//! inside that freeze window. The `start_work_time` of the last round an
//! action completed for is kept in the store under
//! `epochMarkers.<action>`, so a restart inside the freeze window does not
//! repeat the action.
//!
//! Each gated action is driven by a single periodic task, so the
//! check-then-mark sequence below never races with itself.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::chain::{StakingParams, ValidatorCore, ValidatorRound};
use crate::error::Result;
use crate::store::{Store, keys};

/// Seconds subtracted from the round end when checking validators, so the
/// check never races the round boundary.
pub const SLASHING_TIME_SKEW: u64 = 60;

/// Marker name used by the slashing check.
pub const SLASHING_ACTION: &str = "slashing";

/// Timing of one validation round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochWindow {
    pub start_work_time: u64,
    pub end_work_time: u64,
    pub stake_held_for: u64,
}

impl EpochWindow {
    pub fn new(round: ValidatorRound, staking: StakingParams) -> Self {
        Self {
            start_work_time: round.start_work_time,
            end_work_time: round.end_work_time,
            stake_held_for: staking.stake_held_for,
        }
    }

    /// End of the freeze window (exclusive).
    pub fn freeze_end(&self) -> u64 {
        self.end_work_time.saturating_add(self.stake_held_for)
    }

    /// Whether `now` lies in `[end_work_time, end_work_time + stake_held_for)`.
    pub fn in_freeze(&self, now: u64) -> bool {
        now >= self.end_work_time && now < self.freeze_end()
    }
}

/// Where a gated action stands for the current round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Outside the freeze window.
    Idle,
    /// Inside the freeze window, not yet done for this round.
    Due,
    /// Inside the freeze window, already done for this round.
    Processed,
}

/// What the gated action itself reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Performed,
    /// Nothing was done (role inactive, feature off); retry next tick.
    Skipped,
}

/// Result of one pass through the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    OutsideWindow,
    AlreadyProcessed,
    Executed,
    Inactive,
}

/// At-most-once-per-round gate for a named action.
#[derive(Debug, Clone, Copy)]
pub struct EpochGate {
    action: &'static str,
}

impl EpochGate {
    pub fn new(action: &'static str) -> Self {
        Self { action }
    }

    pub fn action(&self) -> &'static str {
        self.action
    }

    /// `start_work_time` of the last round this action completed for.
    pub fn marker(&self, store: &Store) -> Option<u64> {
        match store.get(keys::EPOCH_MARKERS) {
            Some(Value::Object(map)) => map.get(self.action).and_then(Value::as_u64),
            _ => None,
        }
    }

    fn set_marker(&self, store: &Store, start_work_time: u64) -> Result<()> {
        store.update(|db| {
            let markers = db
                .entry(keys::EPOCH_MARKERS)
                .or_insert_with(|| Value::Object(Map::new()));
            if !markers.is_object() {
                *markers = Value::Object(Map::new());
            }
            if let Value::Object(map) = markers {
                map.insert(self.action.to_string(), Value::from(start_work_time));
            }
        })
    }

    pub fn state(&self, store: &Store, window: &EpochWindow, now: u64) -> GateState {
        if !window.in_freeze(now) {
            GateState::Idle
        } else if self.marker(store) == Some(window.start_work_time) {
            GateState::Processed
        } else {
            GateState::Due
        }
    }

    /// Run `action` if it is due, and mark the round once it has performed.
    ///
    /// An action error or a [`ActionOutcome::Skipped`] result leaves the
    /// marker alone, so the next tick tries again.
    pub fn run(
        &self,
        store: &Store,
        window: &EpochWindow,
        now: u64,
        action: impl FnOnce(&EpochWindow) -> Result<ActionOutcome>,
    ) -> Result<GateOutcome> {
        match self.state(store, window, now) {
            GateState::Idle => Ok(GateOutcome::OutsideWindow),
            GateState::Processed => Ok(GateOutcome::AlreadyProcessed),
            GateState::Due => match action(window)? {
                ActionOutcome::Performed => {
                    self.set_marker(store, window.start_work_time)?;
                    Ok(GateOutcome::Executed)
                }
                ActionOutcome::Skipped => Ok(GateOutcome::Inactive),
            },
        }
    }
}

/// One slashing tick: check the finished round's validators once per
/// freeze window, when slashing is enabled and this node validates.
pub fn slashing_tick(core: &dyn ValidatorCore, store: &Store, now: u64) -> Result<GateOutcome> {
    let window = EpochWindow::new(core.validator_round()?, core.staking_params()?);
    let gate = EpochGate::new(SLASHING_ACTION);
    gate.run(store, &window, now, |w| {
        if !store.flag(keys::IS_SLASHING) || !core.using_validator()? {
            return Ok(ActionOutcome::Skipped);
        }
        let end = w.end_work_time.saturating_sub(SLASHING_TIME_SKEW);
        log::debug!(
            "slashing check: marker {:?}, start {}, end {}",
            gate.marker(store),
            w.start_work_time,
            end
        );
        core.check_validators(w.start_work_time, end)?;
        log::info!("validators of round {} checked", w.start_work_time);
        Ok(ActionOutcome::Performed)
    })
}
