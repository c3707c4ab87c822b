use rollgate_core::names::parse_key;
use rollgate_core::Resource;
use rollgate_rollout::ReleaseController;

use super::release::load;
use super::Context;

/// Run the gate once for `key`. Returns whether the release is blocked.
pub fn check(ctx: &Context, key: &str, format: &str) -> anyhow::Result<bool> {
    parse_key(key)?;
    let store = ctx.store()?;
    let controller = ReleaseController::new(store, ctx.config.gate.clone());
    let outcome = controller.sync_release(key)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&outcome)?),
        _ => {
            if !outcome.pruned.is_empty() {
                println!("⚠ Removed stale overrides: {}", outcome.pruned);
            }
            if outcome.should_block {
                println!("✗ {key} is blocked: {}", outcome.statement);
            } else if !outcome.overrides.is_empty() {
                println!("✓ {key} may proceed (overriding {})", outcome.overrides);
            } else {
                println!("✓ {key} may proceed");
            }
        }
    }
    Ok(outcome.should_block)
}

pub fn events(ctx: &Context, key: &str) -> anyhow::Result<()> {
    let store = ctx.store()?;
    let release = load(&store, key)?;
    let events = store.list_events(&release.object_ref())?;
    if events.is_empty() {
        println!("No events.");
    }
    for event in &events {
        println!(
            "{:>4} {:<8} {:<26} x{:<4} {}",
            event.sequence, event.type_, event.reason, event.count, event.message
        );
    }
    Ok(())
}
