//! Status command handler

use anyhow::Result;

use fitsync_core::SyncEngine;

use crate::output::{describe_status, Output, OutputFormat};

/// Probe the server once and show the result with queue totals
pub async fn show(engine: &SyncEngine, output: &Output) -> Result<()> {
    let status = engine.refresh_status().await;
    let config = engine.config();
    let queue = engine.queue();
    let failed = queue.failed_entries().len();

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "api_url": config.api_url,
                    "network": status,
                    "quality": status.connection_quality().to_string(),
                    "should_limit_data": status.should_limit_data(),
                    "queue": {
                        "pending_sync_count": engine.pending_sync_count(),
                        "pending": queue.pending_count(),
                        "failed": failed
                    }
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", if status.is_online { "online" } else { "offline" });
        }
        OutputFormat::Human => {
            println!("fitsync Status");
            println!("==============");
            println!();
            println!("Server:");
            println!("  API:    {}", config.api_url);
            println!("  Health: {}", config.health_url());
            println!("  Status: {}", describe_status(&status));
            if let Some(checked) = status.last_checked {
                println!("  Checked: {}", checked.format("%Y-%m-%d %H:%M:%S"));
            }
            println!();
            println!("Storage:");
            println!("  Backend:  {:?}", config.storage);
            println!("  Location: {}", config.data_dir.display());
            println!();
            println!("Queue:");
            println!("  Waiting to sync: {}", engine.pending_sync_count());
            println!("  Failed:          {}", failed);
            if failed > 0 {
                println!();
                println!("Run `fitsync queue list` to inspect failed operations.");
            }
        }
    }

    Ok(())
}
