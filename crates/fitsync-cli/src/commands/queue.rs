//! Queue command handlers

use anyhow::{bail, Context, Result};
use serde_json::Value;
use uuid::Uuid;

use fitsync_core::{OperationType, Submission, SyncEngine, SyncQueueEntry};

use crate::output::Output;

/// List queued operations
pub fn list(engine: &SyncEngine, failed_only: bool, output: &Output) -> Result<()> {
    let entries = if failed_only {
        engine.queue().failed_entries()
    } else {
        engine.queue().entries()
    };
    output.print_entries(&entries);
    Ok(())
}

/// Queue an operation without trying to send it
pub fn enqueue(
    engine: &SyncEngine,
    operation: String,
    payload: Option<String>,
    output: &Output,
) -> Result<()> {
    let (operation, payload) = parse_operation(&operation, payload.as_deref())?;
    let id = engine.enqueue(operation, payload);

    if output.is_quiet() {
        println!("{}", id);
    } else {
        output.success(&format!("Queued {} ({})", operation, &id.to_string()[..8]));
    }
    Ok(())
}

/// Send an operation now if the server is reachable, otherwise queue it
pub async fn submit(
    engine: &SyncEngine,
    operation: String,
    payload: Option<String>,
    output: &Output,
) -> Result<()> {
    let (operation, payload) = parse_operation(&operation, payload.as_deref())?;
    engine.refresh_status().await;

    let submission = engine
        .submit(operation, payload)
        .await
        .with_context(|| format!("Server rejected {}", operation))?;

    if output.is_quiet() {
        println!("{}", submission.id());
        return Ok(());
    }
    match submission {
        Submission::Sent(_) => output.success(&format!("Sent {}", operation)),
        Submission::Queued(id) => output.success(&format!(
            "Server unreachable, queued {} ({})",
            operation,
            &id.to_string()[..8]
        )),
    }
    Ok(())
}

/// Flush the queue now
pub async fn flush(engine: &SyncEngine, output: &Output) -> Result<()> {
    let status = engine.refresh_status().await;
    if !status.is_online {
        output.message("Server unreachable; nothing was sent.");
    }
    let report = engine.flush().await;
    output.print_report(&report);
    Ok(())
}

/// Retry a failed operation
pub async fn retry(engine: &SyncEngine, id: String, output: &Output) -> Result<()> {
    let entry = resolve(engine, &id)?;
    engine.refresh_status().await;
    let report = engine.retry_failed_entry(entry.id).await?;
    output.print_report(&report);
    Ok(())
}

/// Discard a queued operation
pub fn discard(engine: &SyncEngine, id: String, output: &Output) -> Result<()> {
    let entry = resolve(engine, &id)?;
    let removed = engine.discard_entry(entry.id)?;
    output.success(&format!(
        "Discarded {} ({})",
        removed.operation,
        &removed.id.to_string()[..8]
    ));
    Ok(())
}

fn parse_operation(operation: &str, payload: Option<&str>) -> Result<(OperationType, Value)> {
    let operation: OperationType = operation.parse().map_err(|e: String| {
        let known: Vec<_> = OperationType::ALL.iter().map(|op| op.as_str()).collect();
        anyhow::anyhow!("{}\nKnown operations: {}", e, known.join(", "))
    })?;
    let payload = match payload {
        Some(raw) => serde_json::from_str(raw).context("Payload is not valid JSON")?,
        None => Value::Object(Default::default()),
    };
    Ok((operation, payload))
}

/// Find an entry by full id or unique prefix
fn resolve(engine: &SyncEngine, id: &str) -> Result<SyncQueueEntry> {
    find_entry(&engine.queue().entries(), id)
}

fn find_entry(entries: &[SyncQueueEntry], id: &str) -> Result<SyncQueueEntry> {
    if let Ok(uuid) = Uuid::parse_str(id) {
        return entries
            .iter()
            .find(|e| e.id == uuid)
            .cloned()
            .with_context(|| format!("No queued operation with id {}", id));
    }

    let matches: Vec<_> = entries
        .iter()
        .filter(|e| e.id.to_string().starts_with(id))
        .collect();
    match matches.as_slice() {
        [] => bail!("No queued operation matching '{}'", id),
        [entry] => Ok((*entry).clone()),
        _ => bail!("'{}' matches {} operations; use a longer prefix", id, matches.len()),
    }
}
