//! Shared object types used across rollgate crates.
//!
//! Objects follow the usual control-plane shape: metadata (namespace,
//! name, annotations, resource version), a spec written by operators,
//! and for releases a status written by the controller.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Annotation holding the operator's comma-separated rollout block overrides.
pub const ROLLOUT_BLOCKS_OVERRIDE_ANNOTATION: &str = "rollgate.io/rollout-blocks-override";

/// Namespace whose rollout blocks apply to every release.
pub const GLOBAL_ROLLOUT_BLOCK_NAMESPACE: &str = "rollout-blocks-global";

// ── Metadata ──────────────────────────────────────────────────────

/// Metadata common to every stored object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    /// Bumped by the store on every successful write. Zero means never stored.
    #[serde(default)]
    pub resource_version: u64,
}

impl ObjectMeta {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// `{namespace}/{name}`.
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// An object with metadata and a kind.
pub trait Resource {
    const KIND: &'static str;

    fn meta(&self) -> &ObjectMeta;
    fn meta_mut(&mut self) -> &mut ObjectMeta;

    fn object_ref(&self) -> ObjectReference {
        ObjectReference {
            kind: Self::KIND.to_string(),
            namespace: self.meta().namespace.clone(),
            name: self.meta().name.clone(),
        }
    }
}

/// Points an event at the object it is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectReference {
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl fmt::Display for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

// ── Release ───────────────────────────────────────────────────────

/// A release of an application version, progressed by the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
    pub metadata: ObjectMeta,
    pub spec: ReleaseSpec,
    #[serde(default)]
    pub status: ReleaseStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReleaseSpec {
    pub application: String,
    /// Chart reference (e.g. `nginx`).
    pub chart: String,
    pub version: String,
    /// Rollout step the release should progress to.
    #[serde(default)]
    pub target_step: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReleaseStatus {
    #[serde(default)]
    pub conditions: Vec<ReleaseCondition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReleaseConditionType {
    /// Rollout blocks without an override halt the release.
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseCondition {
    #[serde(rename = "type")]
    pub type_: ReleaseConditionType,
    pub status: ConditionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Release {
    pub fn new(namespace: &str, name: &str, spec: ReleaseSpec) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec,
            status: ReleaseStatus::default(),
        }
    }

    pub fn condition(&self, type_: ReleaseConditionType) -> Option<&ReleaseCondition> {
        self.status.conditions.iter().find(|c| c.type_ == type_)
    }

    /// Insert or replace the condition of the same type.
    pub fn set_condition(&mut self, condition: ReleaseCondition) {
        match self
            .status
            .conditions
            .iter_mut()
            .find(|c| c.type_ == condition.type_)
        {
            Some(existing) => *existing = condition,
            None => self.status.conditions.push(condition),
        }
    }
}

impl Resource for Release {
    const KIND: &'static str = "Release";

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

// ── RolloutBlock ──────────────────────────────────────────────────

/// A declared condition that halts rollouts in its namespace (or
/// everywhere, when it lives in the global namespace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolloutBlock {
    pub metadata: ObjectMeta,
    pub spec: RolloutBlockSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RolloutBlockSpec {
    /// Why rollouts are blocked.
    pub message: String,
    pub author: Author,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Author {
    /// `user`, `team`, `automation`, ...
    #[serde(rename = "type")]
    pub type_: String,
    pub name: String,
}

impl RolloutBlock {
    pub fn new(namespace: &str, name: &str, spec: RolloutBlockSpec) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec,
        }
    }

    /// The identifier operators list in the override annotation.
    pub fn override_id(&self) -> String {
        self.metadata.key()
    }
}

impl Resource for RolloutBlock {
    const KIND: &'static str = "RolloutBlock";

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

// ── Events ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Normal,
    Warning,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Normal => f.pad("Normal"),
            EventType::Warning => f.pad("Warning"),
        }
    }
}

/// A recorded, human-readable event about an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub involved_object: ObjectReference,
    #[serde(rename = "type")]
    pub type_: EventType,
    pub reason: String,
    pub message: String,
    /// Store-assigned, increasing per involved object.
    pub sequence: u64,
    /// How many consecutive times this event was recorded.
    #[serde(default = "one")]
    pub count: u64,
    /// Unix timestamp (seconds) of the first occurrence.
    pub first_timestamp: u64,
    /// Unix timestamp (seconds) of the latest occurrence.
    pub timestamp: u64,
}

impl Event {
    /// Whether `self` reports the same thing as a new occurrence would.
    pub fn repeats(&self, type_: EventType, reason: &str, message: &str) -> bool {
        self.type_ == type_ && self.reason == reason && self.message == message
    }
}

fn one() -> u64 {
    1
}
