use anyhow::bail;
use rollgate_core::names::parse_key;
use rollgate_core::{Author, RolloutBlock, RolloutBlockSpec};

use super::Context;

pub fn create(
    ctx: &Context,
    key: &str,
    message: &str,
    author: &str,
    author_type: &str,
) -> anyhow::Result<()> {
    let (namespace, name) = parse_key(key)?;
    let store = ctx.store()?;
    if store.get_rollout_block(key)?.is_some() {
        bail!("rollout block {key} already exists");
    }

    let mut block = RolloutBlock::new(
        namespace,
        name,
        RolloutBlockSpec {
            message: message.to_string(),
            author: Author {
                type_: author_type.to_string(),
                name: author.to_string(),
            },
        },
    );
    store.put_rollout_block(&mut block)?;

    if namespace == ctx.config.gate.global_namespace {
        println!("✓ Created global rollout block {key}");
    } else {
        println!("✓ Created rollout block {key}");
    }
    Ok(())
}

pub fn delete(ctx: &Context, key: &str) -> anyhow::Result<()> {
    parse_key(key)?;
    if !ctx.store()?.delete_rollout_block(key)? {
        bail!("rollout block {key} not found");
    }
    println!("✓ Deleted rollout block {key}");
    Ok(())
}

pub fn list(ctx: &Context, namespace: Option<&str>, format: &str) -> anyhow::Result<()> {
    let store = ctx.store()?;
    let blocks = match namespace {
        Some(ns) => store.list_rollout_blocks(ns)?,
        None => store.list_all_rollout_blocks()?,
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&blocks)?),
        _ => {
            if blocks.is_empty() {
                println!("No rollout blocks.");
            }
            for block in &blocks {
                println!(
                    "{:<40} {:<20} {}",
                    block.override_id(),
                    format!("{}:{}", block.spec.author.type_, block.spec.author.name),
                    block.spec.message
                );
            }
        }
    }
    Ok(())
}
