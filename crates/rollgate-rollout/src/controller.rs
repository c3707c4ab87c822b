//! Runs the admission gate for stored releases and
//! reflects the decision in each release's `Blocked` condition.

use rollgate_core::{
    ConditionStatus, GateConfig, Release, ReleaseCondition, ReleaseConditionType,
};
use rollgate_state::{StateError, StateStore};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::gate::{AdmissionGate, GateOutcome};

/// Condition reason when unacknowledged rollout blocks halt a release.
pub const REASON_ROLLOUTS_BLOCKED: &str = "RolloutsBlocked";

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("release {0} not found")]
    NotFound(String),

    #[error(transparent)]
    State(#[from] StateError),
}

/// Reconciles releases held in a [`StateStore`].
///
/// The store serves as lister, writer, and event recorder for the gate.
pub struct ReleaseController {
    store: StateStore,
    gate: AdmissionGate<StateStore, StateStore, StateStore>,
}

impl ReleaseController {
    pub fn new(store: StateStore, config: GateConfig) -> Self {
        let gate = AdmissionGate::new(store.clone(), store.clone(), store.clone(), config);
        Self { store, gate }
    }

    /// Run one gate pass for the release at `key` (`namespace/name`) and
    /// record the result in its `Blocked` condition.
    ///
    /// A write conflict on the condition update is logged and left for
    /// the next pass; the gate's decision is still returned.
    pub fn sync_release(&self, key: &str) -> Result<GateOutcome, ControllerError> {
        let mut release = self
            .store
            .get_release(key)?
            .ok_or_else(|| ControllerError::NotFound(key.to_string()))?;

        let outcome = self.gate.process_rollout_blocks(&mut release);

        let condition = blocked_condition(&outcome);
        if release.condition(ReleaseConditionType::Blocked) == Some(&condition) {
            debug!(release = %key, "blocked condition unchanged");
            return Ok(outcome);
        }
        release.set_condition(condition);

        match self.store.update_release(&mut release) {
            Ok(()) => Ok(outcome),
            Err(StateError::Conflict { current, attempted, .. }) => {
                warn!(release = %key, current, attempted, "release changed concurrently, deferring condition update");
                Ok(outcome)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Sync every stored release. Releases that fail to sync are logged
    /// and left out of the result.
    pub fn sync_all(&self) -> Result<Vec<(String, GateOutcome)>, ControllerError> {
        let releases = self.store.list_releases()?;
        let mut outcomes = Vec::with_capacity(releases.len());
        for release in releases {
            let key = release.metadata.key();
            match self.sync_release(&key) {
                Ok(outcome) => outcomes.push((key, outcome)),
                Err(e) => error!(release = %key, error = %e, "failed to sync release"),
            }
        }
        Ok(outcomes)
    }
}

fn blocked_condition(outcome: &GateOutcome) -> ReleaseCondition {
    if outcome.should_block {
        ReleaseCondition {
            type_: ReleaseConditionType::Blocked,
            status: ConditionStatus::True,
            reason: Some(REASON_ROLLOUTS_BLOCKED.to_string()),
            message: Some(outcome.statement.clone()),
        }
    } else {
        ReleaseCondition {
            type_: ReleaseConditionType::Blocked,
            status: ConditionStatus::False,
            reason: None,
            message: None,
        }
    }
}

/// Whether a stored release is currently marked blocked.
pub fn is_blocked(release: &Release) -> bool {
    release
        .condition(ReleaseConditionType::Blocked)
        .is_some_and(|c| c.status == ConditionStatus::True)
}
