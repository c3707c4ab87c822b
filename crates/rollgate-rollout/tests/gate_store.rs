//! Admission gate running against a real (in-memory) state store.

use rollgate_core::{
    Author, EventType, GateConfig, Release, ReleaseSpec, Resource, RolloutBlock,
    RolloutBlockSpec, GLOBAL_ROLLOUT_BLOCK_NAMESPACE, ROLLOUT_BLOCKS_OVERRIDE_ANNOTATION,
};
use rollgate_rollout::gate::{
    REASON_NON_EXISTING_ROLLOUT_BLOCK, REASON_OVERRIDING_ROLLOUT_BLOCK, REASON_ROLLOUT_BLOCK,
};
use rollgate_rollout::AdmissionGate;
use rollgate_state::StateStore;

fn block(store: &StateStore, namespace: &str, name: &str) {
    store
        .put_rollout_block(&mut RolloutBlock::new(
            namespace,
            name,
            RolloutBlockSpec {
                message: format!("{name} in progress"),
                author: Author {
                    type_: "user".to_string(),
                    name: "oncall".to_string(),
                },
            },
        ))
        .unwrap();
}

fn release(store: &StateStore, overrides: &str) -> Release {
    let mut rel = Release::new(
        "shop",
        "checkout-7",
        ReleaseSpec {
            application: "checkout".to_string(),
            chart: "checkout".to_string(),
            version: "7.0.0".to_string(),
            target_step: 2,
        },
    );
    rel.metadata.annotations.insert(
        ROLLOUT_BLOCKS_OVERRIDE_ANNOTATION.to_string(),
        overrides.to_string(),
    );
    store.create_release(&mut rel).unwrap();
    rel
}

fn gate(store: &StateStore) -> AdmissionGate<StateStore, StateStore, StateStore> {
    AdmissionGate::new(
        store.clone(),
        store.clone(),
        store.clone(),
        GateConfig::default(),
    )
}

fn override_annotation(rel: &Release) -> &str {
    rel.metadata.annotations[ROLLOUT_BLOCKS_OVERRIDE_ANNOTATION].as_str()
}

#[test]
fn prunes_stale_override_in_store_and_blocks_on_global() {
    let store = StateStore::open_in_memory().unwrap();
    block(&store, "shop", "sale-freeze");
    block(&store, GLOBAL_ROLLOUT_BLOCK_NAMESPACE, "datacenter-move");
    let mut rel = release(&store, "shop/sale-freeze,shop/old-incident");

    let outcome = gate(&store).process_rollout_blocks(&mut rel);

    assert!(outcome.should_block);
    assert_eq!(
        outcome.statement,
        format!("{GLOBAL_ROLLOUT_BLOCK_NAMESPACE}/datacenter-move")
    );

    let stored = store.get_release("shop/checkout-7").unwrap().unwrap();
    assert_eq!(override_annotation(&stored), "shop/sale-freeze");
    assert_eq!(stored.metadata.resource_version, 2);

    let events = store.list_events(&rel.object_ref()).unwrap();
    let summary: Vec<_> = events
        .iter()
        .map(|e| (e.type_, e.reason.as_str(), e.message.as_str()))
        .collect();
    let global = format!("{GLOBAL_ROLLOUT_BLOCK_NAMESPACE}/datacenter-move");
    assert_eq!(
        summary,
        vec![
            (
                EventType::Warning,
                REASON_NON_EXISTING_ROLLOUT_BLOCK,
                "shop/old-incident"
            ),
            (EventType::Normal, REASON_ROLLOUT_BLOCK, global.as_str()),
        ]
    );
}

#[test]
fn overriding_every_block_lets_release_through() {
    let store = StateStore::open_in_memory().unwrap();
    block(&store, "shop", "sale-freeze");
    block(&store, GLOBAL_ROLLOUT_BLOCK_NAMESPACE, "datacenter-move");
    let overrides = format!(
        "{GLOBAL_ROLLOUT_BLOCK_NAMESPACE}/datacenter-move, shop/sale-freeze"
    );
    let mut rel = release(&store, &overrides);

    let outcome = gate(&store).process_rollout_blocks(&mut rel);

    assert!(!outcome.should_block);
    assert_eq!(outcome.statement, "");

    let events = store.list_events(&rel.object_ref()).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].reason, REASON_OVERRIDING_ROLLOUT_BLOCK);
    // Nothing was stale, so the release was not rewritten.
    let stored = store.get_release("shop/checkout-7").unwrap().unwrap();
    assert_eq!(stored.metadata.resource_version, 1);
}

#[test]
fn conflicting_write_converges_on_next_pass() {
    let store = StateStore::open_in_memory().unwrap();
    block(&store, "shop", "sale-freeze");
    let mut rel = release(&store, "shop/sale-freeze,shop/gone");

    // Another writer updates the release after we read it.
    let mut concurrent = store.get_release("shop/checkout-7").unwrap().unwrap();
    concurrent.spec.target_step = 3;
    store.update_release(&mut concurrent).unwrap();

    let outcome = gate(&store).process_rollout_blocks(&mut rel);
    assert!(!outcome.should_block);
    assert_eq!(override_annotation(&rel), "shop/sale-freeze");
    let stored = store.get_release("shop/checkout-7").unwrap().unwrap();
    assert_eq!(override_annotation(&stored), "shop/sale-freeze,shop/gone");

    // Next pass works from a fresh read and repairs the stored object.
    let mut fresh = store.get_release("shop/checkout-7").unwrap().unwrap();
    let outcome = gate(&store).process_rollout_blocks(&mut fresh);
    assert!(!outcome.should_block);
    let stored = store.get_release("shop/checkout-7").unwrap().unwrap();
    assert_eq!(override_annotation(&stored), "shop/sale-freeze");
    assert_eq!(stored.spec.target_step, 3);
}
