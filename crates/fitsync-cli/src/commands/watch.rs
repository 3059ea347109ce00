//! Watch command handler
//!
//! Runs the engine in the foreground, printing lifecycle events until
//! interrupted. Queued operations are flushed whenever the server is
//! reachable.

use anyhow::{Context, Result};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use fitsync_core::SyncEngine;

use crate::output::{describe_status, Output};

pub async fn run(engine: &SyncEngine, output: &Output) -> Result<()> {
    let mut events = engine.subscribe();
    engine.start();

    output.message(&format!(
        "Watching {} (pending: {}). Press Ctrl-C to stop.",
        engine.config().health_url(),
        engine.pending_sync_count()
    ));

    let result = loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                break signal.context("Failed to listen for Ctrl-C");
            }
            event = events.recv() => match event {
                Ok(event) => output.print_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event output fell behind");
                }
                Err(RecvError::Closed) => break Ok(()),
            }
        }
    };

    engine.shutdown().await;
    output.message(&format!(
        "Stopped. {} ({} waiting to sync)",
        describe_status(&engine.network_status()),
        engine.pending_sync_count()
    ));
    result
}
