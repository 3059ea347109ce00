//! State command handlers

use anyhow::Result;

use fitsync_core::SyncEngine;

use crate::output::{print_json, Output, OutputFormat};

/// Show the hydrated client state
pub fn show(engine: &SyncEngine, output: &Output) -> Result<()> {
    let state = engine.store().state();

    match output.format {
        OutputFormat::Json => print_json(&state),
        OutputFormat::Quiet => {
            println!("{}", state.navigation.last_route);
        }
        OutputFormat::Human => {
            let prefs = &state.preferences;
            println!("Preferences:");
            println!("  theme:         {:?}", prefs.theme);
            println!("  units:         {:?}", prefs.units);
            println!("  notifications: {}", prefs.notifications_enabled);
            println!("  sound:         {}", prefs.sound_enabled);
            println!("  session:       {} min", prefs.session_duration);
            println!();
            println!("Navigation:");
            println!("  last route: {}", state.navigation.last_route);
            println!();
            println!("Profile:");
            println!(
                "  name:       {}",
                state.profile.display_name.as_deref().unwrap_or("(not set)")
            );
            println!(
                "  goals:      {}",
                if state.profile.fitness_goals.is_empty() {
                    "(none)".to_string()
                } else {
                    state.profile.fitness_goals.join(", ")
                }
            );
            println!("  onboarded:  {}", state.profile.onboarding_complete);
            println!();
            println!("Waiting to sync: {}", state.pending_sync_count);

            let notifications = &state.ui.notifications;
            if !notifications.is_empty() {
                println!();
                println!("── Notifications ({}) ──", notifications.len());
                for n in notifications {
                    println!("[{:?}] {}", n.kind, n.message);
                }
            }
        }
    }

    Ok(())
}

/// Forget queued operations and the persisted snapshot
pub fn reset(engine: &SyncEngine, output: &Output) -> Result<()> {
    let dropped = engine.queue().len();
    engine.reset();
    output.success(&format!(
        "Reset sync state ({} queued operation(s) dropped)",
        dropped
    ));
    Ok(())
}
