//! `rollgate run` — periodic reconcile loop.

use std::sync::Arc;
use std::time::Duration;

use rollgate_rollout::ReleaseController;
use tokio::sync::watch;
use tracing::{error, info};

use super::Context;

pub async fn run(ctx: &Context, interval: Option<u64>) -> anyhow::Result<()> {
    let interval_secs = interval.unwrap_or(ctx.config.reconcile.interval_secs).max(1);
    let store = ctx.store()?;
    let controller = Arc::new(ReleaseController::new(store, ctx.config.gate.clone()));

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    info!(interval = interval_secs, "reconcile loop started");
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                reconcile_once(&controller).await;
            }
            _ = shutdown_rx.changed() => break,
        }
    }

    info!("reconcile loop stopped");
    Ok(())
}

/// Run one `sync_all` pass on the blocking pool; store access is synchronous.
/// Returns `(releases, blocked)` when the pass completed.
async fn reconcile_once(controller: &Arc<ReleaseController>) -> Option<(usize, usize)> {
    let controller = Arc::clone(controller);
    let pass = tokio::task::spawn_blocking(move || controller.sync_all()).await;
    match pass {
        Ok(Ok(outcomes)) => {
            let blocked = outcomes.iter().filter(|(_, o)| o.should_block).count();
            info!(releases = outcomes.len(), blocked, "reconcile pass complete");
            Some((outcomes.len(), blocked))
        }
        Ok(Err(e)) => {
            error!(error = %e, "reconcile pass failed");
            None
        }
        Err(e) => {
            error!(error = %e, "reconcile task did not complete");
            None
        }
    }
}
