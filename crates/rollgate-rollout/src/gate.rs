//! Decides whether rollout blocks halt a release.
//!
//! Each call is a self-contained pass over one subject. The only memory
//! carried between passes is the override annotation on the subject,
//! which the gate repairs when it names blocks that no longer exist.

use rollgate_core::{
    EventRecorder, EventType, GateConfig, ListErrorPolicy, Resource, RolloutBlock,
    RolloutBlockLister, SubjectWriter,
};
use tracing::{debug, error, info, warn};

use crate::override_set::OverrideSet;

/// Event reason when overrides name rollout blocks that no longer exist.
pub const REASON_NON_EXISTING_ROLLOUT_BLOCK: &str = "NonExistingRolloutBlock";
/// Event reason when unacknowledged rollout blocks halt the subject.
pub const REASON_ROLLOUT_BLOCK: &str = "RolloutBlock";
/// Event reason when overrides let the subject through.
pub const REASON_OVERRIDING_ROLLOUT_BLOCK: &str = "OverridingRolloutBlock";
/// Event reason when listing failed under [`ListErrorPolicy::FailClosed`].
pub const REASON_ROLLOUT_BLOCKS_UNAVAILABLE: &str = "RolloutBlocksUnavailable";

/// Result of one gate pass.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct GateOutcome {
    /// Whether reconciliation of the subject must stop here.
    pub should_block: bool,
    /// Unacknowledged blocks in serialized form, or a note about unlistable
    /// namespaces when failing closed.
    pub statement: String,
    /// Live rollout blocks without an override.
    pub unacknowledged: OverrideSet,
    /// Overrides that were dropped because their block is gone.
    pub pruned: OverrideSet,
    /// Overrides still in effect after pruning.
    pub overrides: OverrideSet,
    /// Namespaces whose rollout blocks could not be listed.
    pub unlisted_namespaces: Vec<String>,
}

/// Rollout-block admission gate.
///
/// Collaborators are injected: `L` lists rollout blocks, `W` persists the
/// subject after an override repair, `E` receives events.
pub struct AdmissionGate<L, W, E> {
    lister: L,
    writer: W,
    recorder: E,
    config: GateConfig,
}

impl<L, W, E> AdmissionGate<L, W, E>
where
    L: RolloutBlockLister,
    E: EventRecorder,
{
    pub fn new(lister: L, writer: W, recorder: E, config: GateConfig) -> Self {
        Self {
            lister,
            writer,
            recorder,
            config,
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Run one admission pass over `subject`.
    ///
    /// Stale overrides are removed from the subject's annotation and the
    /// subject is persisted. Listing and persistence failures are logged,
    /// never returned: the gate always produces a decision.
    pub fn process_rollout_blocks<S>(&self, subject: &mut S) -> GateOutcome
    where
        S: Resource,
        W: SubjectWriter<S>,
    {
        let object = subject.object_ref();
        let key = subject.meta().key();
        let namespace = subject.meta().namespace.clone();

        let raw_overrides = subject
            .meta()
            .annotations
            .get(&self.config.override_annotation)
            .cloned()
            .unwrap_or_default();
        let mut claimed = OverrideSet::parse(&raw_overrides);
        let requested = claimed.clone();

        let mut unlisted = Vec::new();
        let mut blocks = self.list_or_log(&namespace, &key, &mut unlisted);
        if namespace != self.config.global_namespace {
            blocks.extend(self.list_or_log(&self.config.global_namespace, &key, &mut unlisted));
        }
        let live = OverrideSet::from_rollout_blocks(&blocks);

        let fail_closed =
            self.config.on_list_error == ListErrorPolicy::FailClosed && !unlisted.is_empty();

        let stale = claimed.diff(&live);
        let mut pruned = OverrideSet::new();
        if !stale.is_empty() {
            if fail_closed {
                debug!(release = %key, stale = %stale, "listing incomplete, keeping overrides");
            } else {
                for id in &stale {
                    claimed.delete(id);
                }
                subject
                    .meta_mut()
                    .annotations
                    .insert(self.config.override_annotation.clone(), claimed.to_string());
                if let Err(e) = self.writer.persist(subject) {
                    error!(release = %key, error = %e, "failed to persist pruned overrides");
                }
                warn!(release = %key, stale = %stale, "removed overrides for non-existing rollout blocks");
                self.recorder.record(
                    &object,
                    EventType::Warning,
                    REASON_NON_EXISTING_ROLLOUT_BLOCK,
                    &stale.to_string(),
                );
                pruned = stale;
            }
        }

        let unacknowledged = live.diff(&claimed);
        let mut statement = unacknowledged.to_string();

        if fail_closed {
            let note = format!("rollout blocks unavailable in {}", unlisted.join(","));
            warn!(release = %key, "failing closed: {note}");
            self.recorder.record(
                &object,
                EventType::Warning,
                REASON_ROLLOUT_BLOCKS_UNAVAILABLE,
                &note,
            );
            if statement.is_empty() {
                statement = note;
            }
        }

        if !unacknowledged.is_empty() {
            info!(release = %key, blocks = %unacknowledged, "rollout blocked");
            self.recorder.record(
                &object,
                EventType::Normal,
                REASON_ROLLOUT_BLOCK,
                &unacknowledged.to_string(),
            );
        } else if !fail_closed && !raw_overrides.is_empty() {
            // Names what the operator asked to override, pruned entries included.
            info!(release = %key, overrides = %claimed, requested = %requested, "rollout blocks overridden");
            self.recorder.record(
                &object,
                EventType::Normal,
                REASON_OVERRIDING_ROLLOUT_BLOCK,
                &requested.to_string(),
            );
        } else {
            debug!(release = %key, "no rollout blocks in effect");
        }

        GateOutcome {
            should_block: !unacknowledged.is_empty() || fail_closed,
            statement,
            unacknowledged,
            pruned,
            overrides: claimed,
            unlisted_namespaces: unlisted,
        }
    }

    fn list_or_log(
        &self,
        namespace: &str,
        key: &str,
        unlisted: &mut Vec<String>,
    ) -> Vec<RolloutBlock> {
        match self.lister.list(namespace) {
            Ok(blocks) => blocks,
            Err(e) => {
                error!(release = %key, error = %e, "failed to list rollout blocks");
                unlisted.push(namespace.to_string());
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    use rollgate_core::{
        ListError, ObjectReference, Release, ReleaseSpec, RolloutBlockSpec, UpdateError,
        GLOBAL_ROLLOUT_BLOCK_NAMESPACE, ROLLOUT_BLOCKS_OVERRIDE_ANNOTATION,
    };

    use super::*;

    #[derive(Default)]
    struct FakeLister {
        blocks: HashMap<String, Vec<RolloutBlock>>,
        failing: HashSet<String>,
    }

    impl FakeLister {
        fn with_blocks(ids: &[&str]) -> Self {
            let mut lister = Self::default();
            for id in ids {
                let (ns, name) = id.split_once('/').unwrap();
                lister
                    .blocks
                    .entry(ns.to_string())
                    .or_default()
                    .push(RolloutBlock::new(ns, name, RolloutBlockSpec::default()));
            }
            lister
        }

        fn failing(mut self, namespace: &str) -> Self {
            self.failing.insert(namespace.to_string());
            self
        }
    }

    impl RolloutBlockLister for FakeLister {
        fn list(&self, namespace: &str) -> Result<Vec<RolloutBlock>, ListError> {
            if self.failing.contains(namespace) {
                return Err(ListError {
                    namespace: namespace.to_string(),
                    reason: "connection refused".to_string(),
                });
            }
            Ok(self.blocks.get(namespace).cloned().unwrap_or_default())
        }
    }

    #[derive(Default)]
    struct FakeWriter {
        persisted: Mutex<Vec<Release>>,
        conflict: bool,
    }

    impl SubjectWriter<Release> for FakeWriter {
        fn persist(&self, release: &mut Release) -> Result<(), UpdateError> {
            if self.conflict {
                return Err(UpdateError::Conflict {
                    key: release.metadata.key(),
                    current: 7,
                    attempted: release.metadata.resource_version,
                });
            }
            release.metadata.resource_version += 1;
            self.persisted.lock().unwrap().push(release.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeRecorder {
        events: Mutex<Vec<(EventType, String, String)>>,
    }

    impl FakeRecorder {
        fn events(&self) -> Vec<(EventType, String, String)> {
            self.events.lock().unwrap().clone()
        }
    }

    impl EventRecorder for FakeRecorder {
        fn record(&self, _: &ObjectReference, type_: EventType, reason: &str, message: &str) {
            self.events
                .lock()
                .unwrap()
                .push((type_, reason.to_string(), message.to_string()));
        }
    }

    fn release(overrides: Option<&str>) -> Release {
        let mut rel = Release::new("default", "web-1", ReleaseSpec::default());
        if let Some(value) = overrides {
            rel.metadata.annotations.insert(
                ROLLOUT_BLOCKS_OVERRIDE_ANNOTATION.to_string(),
                value.to_string(),
            );
        }
        rel
    }

    fn annotation(rel: &Release) -> Option<&str> {
        rel.metadata
            .annotations
            .get(ROLLOUT_BLOCKS_OVERRIDE_ANNOTATION)
            .map(String::as_str)
    }

    fn gate<'a>(
        lister: &'a FakeLister,
        writer: &'a FakeWriter,
        recorder: &'a FakeRecorder,
    ) -> AdmissionGate<&'a FakeLister, &'a FakeWriter, &'a FakeRecorder> {
        AdmissionGate::new(lister, writer, recorder, GateConfig::default())
    }

    #[test]
    fn nothing_claimed_nothing_live() {
        let (lister, writer, recorder) = Default::default();
        let mut rel = release(None);

        let outcome = gate(&lister, &writer, &recorder).process_rollout_blocks(&mut rel);

        assert!(!outcome.should_block);
        assert_eq!(outcome.statement, "");
        assert!(recorder.events().is_empty());
        assert!(writer.persisted.lock().unwrap().is_empty());
        assert_eq!(annotation(&rel), None);
    }

    #[test]
    fn unacknowledged_block_halts_rollout() {
        let lister = FakeLister::with_blocks(&["default/freeze"]);
        let (writer, recorder) = Default::default();
        let mut rel = release(None);

        let outcome = gate(&lister, &writer, &recorder).process_rollout_blocks(&mut rel);

        assert!(outcome.should_block);
        assert_eq!(outcome.statement, "default/freeze");
        assert_eq!(
            recorder.events(),
            vec![(
                EventType::Normal,
                REASON_ROLLOUT_BLOCK.to_string(),
                "default/freeze".to_string()
            )]
        );
    }

    #[test]
    fn matching_override_lets_rollout_through() {
        let lister = FakeLister::with_blocks(&["default/a"]);
        let (writer, recorder) = Default::default();
        let mut rel = release(Some("default/a"));

        let outcome = gate(&lister, &writer, &recorder).process_rollout_blocks(&mut rel);

        assert!(!outcome.should_block);
        assert_eq!(
            recorder.events(),
            vec![(
                EventType::Normal,
                REASON_OVERRIDING_ROLLOUT_BLOCK.to_string(),
                "default/a".to_string()
            )]
        );
        assert!(writer.persisted.lock().unwrap().is_empty());
    }

    #[test]
    fn stale_override_is_pruned_and_remaining_block_reported() {
        let lister = FakeLister::with_blocks(&["default/b", "default/c"]);
        let (writer, recorder) = Default::default();
        let mut rel = release(Some("default/a,default/b"));

        let outcome = gate(&lister, &writer, &recorder).process_rollout_blocks(&mut rel);

        assert!(outcome.should_block);
        assert_eq!(outcome.pruned.to_string(), "default/a");
        assert_eq!(outcome.overrides.to_string(), "default/b");
        assert_eq!(outcome.statement, "default/c");
        assert_eq!(annotation(&rel), Some("default/b"));

        let persisted = writer.persisted.lock().unwrap();
        assert_eq!(persisted.len(), 1);
        assert_eq!(annotation(&persisted[0]), Some("default/b"));

        assert_eq!(
            recorder.events(),
            vec![
                (
                    EventType::Warning,
                    REASON_NON_EXISTING_ROLLOUT_BLOCK.to_string(),
                    "default/a".to_string()
                ),
                (
                    EventType::Normal,
                    REASON_ROLLOUT_BLOCK.to_string(),
                    "default/c".to_string()
                ),
            ]
        );
    }

    #[test]
    fn many_stale_overrides_yield_one_warning() {
        let (lister, writer, recorder) = Default::default();
        let mut rel = release(Some("default/x,default/y,other/z"));

        let outcome = gate(&lister, &writer, &recorder).process_rollout_blocks(&mut rel);

        assert!(!outcome.should_block);
        let warnings: Vec<_> = recorder
            .events()
            .into_iter()
            .filter(|(t, _, _)| *t == EventType::Warning)
            .collect();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].2, "default/x,default/y,other/z");
        assert_eq!(
            recorder.events().last(),
            Some(&(
                EventType::Normal,
                REASON_OVERRIDING_ROLLOUT_BLOCK.to_string(),
                "default/x,default/y,other/z".to_string()
            ))
        );
        assert_eq!(annotation(&rel), Some(""));
        assert_eq!(writer.persisted.lock().unwrap().len(), 1);
    }

    #[test]
    fn overriding_event_names_requested_overrides() {
        let lister = FakeLister::with_blocks(&["shop/freeze"]);
        let (writer, recorder) = Default::default();
        let mut rel = release(Some(" shop/gone , shop/freeze"));

        let outcome = gate(&lister, &writer, &recorder).process_rollout_blocks(&mut rel);

        assert!(!outcome.should_block);
        assert_eq!(outcome.overrides.to_string(), "shop/freeze");
        assert_eq!(
            recorder.events(),
            vec![
                (
                    EventType::Warning,
                    REASON_NON_EXISTING_ROLLOUT_BLOCK.to_string(),
                    "shop/gone".to_string()
                ),
                (
                    EventType::Normal,
                    REASON_OVERRIDING_ROLLOUT_BLOCK.to_string(),
                    "shop/freeze,shop/gone".to_string()
                ),
            ]
        );
    }

    #[test]
    fn global_blocks_apply_and_dedupe() {
        let global = format!("{GLOBAL_ROLLOUT_BLOCK_NAMESPACE}/freeze");
        let lister = FakeLister::with_blocks(&["default/freeze", global.as_str(), global.as_str()]);
        let (writer, recorder) = Default::default();
        let mut rel = release(Some("default/freeze"));

        let outcome = gate(&lister, &writer, &recorder).process_rollout_blocks(&mut rel);

        assert!(outcome.should_block);
        assert_eq!(outcome.unacknowledged.len(), 1);
        assert_eq!(outcome.statement, global);
    }

    #[test]
    fn override_found_only_in_global_scope_is_not_stale() {
        let global = format!("{GLOBAL_ROLLOUT_BLOCK_NAMESPACE}/freeze");
        let lister = FakeLister::with_blocks(&[global.as_str()]);
        let (writer, recorder) = Default::default();
        let mut rel = release(Some(global.as_str()));

        let outcome = gate(&lister, &writer, &recorder).process_rollout_blocks(&mut rel);

        assert!(!outcome.should_block);
        assert!(outcome.pruned.is_empty());
        assert_eq!(annotation(&rel), Some(global.as_str()));
    }

    #[test]
    fn global_listing_failure_fails_open() {
        let lister = FakeLister::default().failing(GLOBAL_ROLLOUT_BLOCK_NAMESPACE);
        let (writer, recorder) = Default::default();
        let mut rel = release(None);

        let outcome = gate(&lister, &writer, &recorder).process_rollout_blocks(&mut rel);

        assert!(!outcome.should_block);
        assert_eq!(
            outcome.unlisted_namespaces,
            vec![GLOBAL_ROLLOUT_BLOCK_NAMESPACE.to_string()]
        );
        assert!(recorder.events().is_empty());
    }

    #[test]
    fn namespace_listing_failure_still_sees_global_blocks() {
        let global = format!("{GLOBAL_ROLLOUT_BLOCK_NAMESPACE}/freeze");
        let lister = FakeLister::with_blocks(&[global.as_str()]).failing("default");
        let (writer, recorder) = Default::default();
        let mut rel = release(None);

        let outcome = gate(&lister, &writer, &recorder).process_rollout_blocks(&mut rel);

        assert!(outcome.should_block);
        assert_eq!(outcome.statement, global);
    }

    #[test]
    fn fail_closed_blocks_and_keeps_overrides() {
        let lister = FakeLister::default().failing(GLOBAL_ROLLOUT_BLOCK_NAMESPACE);
        let (writer, recorder): (FakeWriter, FakeRecorder) = Default::default();
        let config = GateConfig {
            on_list_error: ListErrorPolicy::FailClosed,
            ..Default::default()
        };
        let gate = AdmissionGate::new(&lister, &writer, &recorder, config);
        let global = format!("{GLOBAL_ROLLOUT_BLOCK_NAMESPACE}/freeze");
        let mut rel = release(Some(global.as_str()));

        let outcome = gate.process_rollout_blocks(&mut rel);

        assert!(outcome.should_block);
        assert_eq!(
            outcome.statement,
            format!("rollout blocks unavailable in {GLOBAL_ROLLOUT_BLOCK_NAMESPACE}")
        );
        assert!(outcome.pruned.is_empty());
        assert_eq!(annotation(&rel), Some(global.as_str()));
        assert!(writer.persisted.lock().unwrap().is_empty());
        assert_eq!(
            recorder.events(),
            vec![(
                EventType::Warning,
                REASON_ROLLOUT_BLOCKS_UNAVAILABLE.to_string(),
                format!("rollout blocks unavailable in {GLOBAL_ROLLOUT_BLOCK_NAMESPACE}")
            )]
        );
    }

    #[test]
    fn fail_closed_without_failures_behaves_normally() {
        let lister = FakeLister::with_blocks(&["default/a"]);
        let (writer, recorder): (FakeWriter, FakeRecorder) = Default::default();
        let config = GateConfig {
            on_list_error: ListErrorPolicy::FailClosed,
            ..Default::default()
        };
        let gate = AdmissionGate::new(&lister, &writer, &recorder, config);
        let mut rel = release(Some("default/a"));

        assert!(!gate.process_rollout_blocks(&mut rel).should_block);
    }

    #[test]
    fn persist_conflict_keeps_in_memory_correction() {
        let lister = FakeLister::with_blocks(&["default/b"]);
        let writer = FakeWriter {
            conflict: true,
            ..Default::default()
        };
        let recorder = FakeRecorder::default();
        let mut rel = release(Some("default/a,default/b"));

        let outcome = gate(&lister, &writer, &recorder).process_rollout_blocks(&mut rel);

        assert!(!outcome.should_block);
        assert_eq!(annotation(&rel), Some("default/b"));
        let reasons: Vec<_> = recorder.events().into_iter().map(|(_, r, _)| r).collect();
        assert_eq!(
            reasons,
            vec![
                REASON_NON_EXISTING_ROLLOUT_BLOCK.to_string(),
                REASON_OVERRIDING_ROLLOUT_BLOCK.to_string()
            ]
        );
    }

    #[test]
    fn subject_in_global_namespace_lists_once() {
        struct CountingLister(Mutex<Vec<String>>);
        impl RolloutBlockLister for CountingLister {
            fn list(&self, namespace: &str) -> Result<Vec<RolloutBlock>, ListError> {
                self.0.lock().unwrap().push(namespace.to_string());
                Ok(Vec::new())
            }
        }

        let lister = CountingLister(Mutex::new(Vec::new()));
        let (writer, recorder): (FakeWriter, FakeRecorder) = Default::default();
        let gate = AdmissionGate::new(&lister, &writer, &recorder, GateConfig::default());
        let mut rel = Release::new(GLOBAL_ROLLOUT_BLOCK_NAMESPACE, "ops", ReleaseSpec::default());

        gate.process_rollout_blocks(&mut rel);

        assert_eq!(lister.0.lock().unwrap().len(), 1);
    }
}
