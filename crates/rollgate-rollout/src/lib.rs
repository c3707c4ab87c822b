//! rollgate rollout gating: rollout blocks, overrides, admission.
//!
//! Before a release progresses, the admission gate compares the rollout
//! blocks currently in force (in the release's namespace and the global
//! namespace) with the overrides recorded on the release. Any block
//! without an override halts the rollout. Overrides that point at
//! blocks which no longer exist are pruned from the release.
//!
//! # Components
//!
//! - **`override_set`** — Parse/serialize the override annotation
//! - **`gate`** — The admission decision (`process_rollout_blocks`)
//! - **`controller`** — Runs the gate for stored releases, sets `Blocked`

pub mod controller;
pub mod gate;
pub mod override_set;

pub use controller::{ControllerError, ReleaseController};
pub use gate::{AdmissionGate, GateOutcome};
pub use override_set::OverrideSet;
