//! Terminal rendering
//!
//! Every command prints through `Output`, which picks one of three shapes:
//! tables and sentences for people, JSON objects for tooling (`--json`),
//! or bare ids and nothing else (`--quiet`).

use fitsync_core::{FlushReport, NetworkStatus, SyncEvent, SyncQueueEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
    /// Ids only, for shell pipelines
    Quiet,
}

impl OutputFormat {
    /// `--quiet` wins over `--json`
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        match (json, quiet) {
            (_, true) => OutputFormat::Quiet,
            (true, false) => OutputFormat::Json,
            (false, false) => OutputFormat::Human,
        }
    }
}

pub struct Output {
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Output { format }
    }

    pub fn is_quiet(&self) -> bool {
        self.format == OutputFormat::Quiet
    }

    /// Print queue entries
    pub fn print_entries(&self, entries: &[SyncQueueEntry]) {
        match self.format {
            OutputFormat::Human => {
                if entries.is_empty() {
                    println!("Queue is empty.");
                    return;
                }
                for entry in entries {
                    println!(
                        "{} | {:<26} | {:<9} | {} attempt(s) | {}",
                        short_id(entry),
                        entry.operation,
                        entry.status,
                        entry.attempt_count,
                        entry.created_at.format("%Y-%m-%d %H:%M")
                    );
                    if let Some(ref error) = entry.last_error {
                        println!("         └ {}", truncate(error, 70));
                    }
                }
                println!("\n{} entr{}", entries.len(), plural_y(entries.len()));
            }
            OutputFormat::Json => print_json(&entries),
            OutputFormat::Quiet => {
                for entry in entries {
                    println!("{}", entry.id);
                }
            }
        }
    }

    /// Print the outcome of a flush
    pub fn print_report(&self, report: &FlushReport) {
        match self.format {
            OutputFormat::Human => {
                println!(
                    "Flush {:?}: {} sent, {} failed, {} retried",
                    report.outcome, report.completed, report.failed, report.retried
                );
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({
                        "outcome": format!("{:?}", report.outcome).to_lowercase(),
                        "completed": report.completed,
                        "failed": report.failed,
                        "retried": report.retried
                    })
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print one lifecycle event as it happens
    pub fn print_event(&self, event: &SyncEvent) {
        match self.format {
            OutputFormat::Human => match event {
                SyncEvent::StatusChanged(status) => println!("● {}", describe_status(status)),
                SyncEvent::QueueDrained => println!("✓ Queue drained"),
                SyncEvent::EntryCompleted { id, operation } => {
                    println!("✓ {} {}", &id.to_string()[..8], operation)
                }
                SyncEvent::EntryFailed {
                    id,
                    operation,
                    reason,
                } => println!("✗ {} {}: {}", &id.to_string()[..8], operation, reason),
            },
            OutputFormat::Json => {
                let value = match event {
                    SyncEvent::StatusChanged(status) => {
                        serde_json::json!({"event": "status_changed", "status": status})
                    }
                    SyncEvent::QueueDrained => serde_json::json!({"event": "queue_drained"}),
                    SyncEvent::EntryCompleted { id, operation } => serde_json::json!({
                        "event": "entry_completed", "id": id, "operation": operation
                    }),
                    SyncEvent::EntryFailed {
                        id,
                        operation,
                        reason,
                    } => serde_json::json!({
                        "event": "entry_failed", "id": id, "operation": operation, "reason": reason
                    }),
                };
                println!("{}", value);
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Confirmation that a command did what was asked
    pub fn success(&self, text: &str) {
        self.say("✓ ", text, true);
    }

    /// Neutral note; not an error
    pub fn message(&self, text: &str) {
        self.say("", text, false);
    }

    fn say(&self, prefix: &str, text: &str, ok: bool) {
        match self.format {
            OutputFormat::Human => println!("{}{}", prefix, text),
            OutputFormat::Json if ok => {
                println!("{}", serde_json::json!({"ok": true, "message": text}))
            }
            OutputFormat::Json => println!("{}", serde_json::json!({"message": text})),
            OutputFormat::Quiet => {}
        }
    }
}

/// One-line description of a network status
pub fn describe_status(status: &NetworkStatus) -> String {
    if !status.is_online {
        return format!(
            "offline ({} failed check{})",
            status.consecutive_failures,
            if status.consecutive_failures == 1 { "" } else { "s" }
        );
    }
    let mut line = format!("online, {} connection", status.connection_quality());
    if status.is_slow_connection {
        line.push_str(" (slow)");
    }
    line
}

pub fn print_json<T: serde::Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to serialise output: {}", e),
    }
}

fn short_id(entry: &SyncQueueEntry) -> String {
    entry.id.to_string()[..8].to_string()
}

fn plural_y(n: usize) -> &'static str {
    if n == 1 {
        "y"
    } else {
        "ies"
    }
}

/// Shorten to `width` characters, ending in "..." when cut
fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_owned();
    }
    let head: String = text.chars().take(width.saturating_sub(3)).collect();
    head + "..."
}
