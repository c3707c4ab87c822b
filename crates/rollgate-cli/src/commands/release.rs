use anyhow::{bail, Context as _};
use rollgate_core::names::parse_key;
use rollgate_core::{Release, ReleaseSpec};
use rollgate_rollout::controller::is_blocked;
use rollgate_rollout::OverrideSet;
use rollgate_state::StateStore;
use tracing::warn;

use super::Context;

pub fn create(
    ctx: &Context,
    key: &str,
    application: &str,
    chart: &str,
    version: &str,
    target_step: u32,
) -> anyhow::Result<()> {
    let (namespace, name) = parse_key(key)?;
    let mut release = Release::new(
        namespace,
        name,
        ReleaseSpec {
            application: application.to_string(),
            chart: chart.to_string(),
            version: version.to_string(),
            target_step,
        },
    );
    ctx.store()?.create_release(&mut release)?;
    println!("✓ Created release {key}");
    Ok(())
}

pub fn show(ctx: &Context, key: &str) -> anyhow::Result<()> {
    let release = load(&ctx.store()?, key)?;
    println!("{}", serde_json::to_string_pretty(&release)?);
    Ok(())
}

pub fn list(ctx: &Context, format: &str) -> anyhow::Result<()> {
    let releases = ctx.store()?.list_releases()?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&releases)?),
        _ => {
            if releases.is_empty() {
                println!("No releases.");
            }
            for release in &releases {
                let overrides = release
                    .metadata
                    .annotations
                    .get(&ctx.config.gate.override_annotation)
                    .map(String::as_str)
                    .unwrap_or("");
                println!(
                    "{:<40} {:<10} {:<8} {}",
                    release.metadata.key(),
                    release.spec.version,
                    if is_blocked(release) { "BLOCKED" } else { "-" },
                    overrides
                );
            }
        }
    }
    Ok(())
}

pub fn add_override(ctx: &Context, release_key: &str, block_key: &str) -> anyhow::Result<()> {
    parse_key(block_key)?;
    let store = ctx.store()?;
    if store.get_rollout_block(block_key)?.is_none() {
        warn!(block = %block_key, "rollout block does not exist; the override will be pruned on the next check");
    }
    let overrides = edit_overrides(ctx, &store, release_key, |set| set.insert(block_key))?;
    println!("✓ {release_key} overrides: {overrides}");
    Ok(())
}

pub fn remove_override(ctx: &Context, release_key: &str, block_key: &str) -> anyhow::Result<()> {
    let store = ctx.store()?;
    let mut found = false;
    let overrides = edit_overrides(ctx, &store, release_key, |set| {
        found = set.delete(block_key);
    })?;
    if !found {
        bail!("{release_key} does not override {block_key}");
    }
    println!("✓ {release_key} overrides: {overrides}");
    Ok(())
}

fn edit_overrides(
    ctx: &Context,
    store: &StateStore,
    key: &str,
    edit: impl FnOnce(&mut OverrideSet),
) -> anyhow::Result<OverrideSet> {
    let mut release = load(store, key)?;
    let annotation = &ctx.config.gate.override_annotation;

    let mut overrides = release
        .metadata
        .annotations
        .get(annotation)
        .map(|raw| OverrideSet::parse(raw))
        .unwrap_or_default();
    edit(&mut overrides);

    release
        .metadata
        .annotations
        .insert(annotation.clone(), overrides.to_string());
    store
        .update_release(&mut release)
        .with_context(|| format!("failed to update release {key}"))?;
    Ok(overrides)
}

pub(crate) fn load(store: &StateStore, key: &str) -> anyhow::Result<Release> {
    parse_key(key)?;
    match store.get_release(key)? {
        Some(release) => Ok(release),
        None => bail!("release {key} not found"),
    }
}
