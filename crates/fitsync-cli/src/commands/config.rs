//! `fitsync config`

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use fitsync_core::Config;

use crate::output::{print_json, Output, OutputFormat};

const SETTABLE_KEYS: &str = "data_dir, api_url, app_id, storage, log_file, \
                          monitor.health_path, monitor.poll_interval_secs, \
                          monitor.probe_timeout_secs, monitor.slow_downlink_mbps, \
                          backoff.base_delay_ms, backoff.max_exponent, \
                          queue.retry_ceiling, queue.request_timeout_secs";

/// Print settings after file and environment are applied
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config = Config::load_with_cli_override(config_path).context("could not load settings")?;

    match output.format {
        OutputFormat::Json => print_json(&config),
        OutputFormat::Quiet => {
            println!("{}", config.data_dir.display());
        }
        OutputFormat::Human => {
            let file = config_path.cloned().unwrap_or_else(Config::config_file_path);
            println!("Settings ({}):", file.display());
            println!("  data_dir:  {}", config.data_dir.display());
            println!("  api_url:   {}", config.api_url);
            println!("  app_id:    {}", config.app_id);
            println!("  storage:   {:?}", config.storage);
            println!(
                "  log_file:  {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!();
            println!("Monitor:");
            println!("  health:        {}", config.health_url());
            println!("  poll interval: {}s", config.monitor.poll_interval_secs);
            println!("  probe timeout: {}s", config.monitor.probe_timeout_secs);
            println!("  slow below:    {} Mbps", config.monitor.slow_downlink_mbps);
            println!();
            println!("Queue:");
            println!("  retry ceiling: {}", config.queue.retry_ceiling);
            println!("  base backoff:  {}ms", config.backoff.base_delay_ms);
        }
    }

    Ok(())
}

/// Change one setting and write the file back
pub fn set(
    key: String,
    value: String,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let mut config = Config::load_with_cli_override(config_path).context("could not load settings")?;
    apply(&mut config, &key, &value)?;

    let file = config_path.cloned().unwrap_or_else(Config::config_file_path);
    config.save_to_path(&file)?;
    output.success(&format!("{} = {} (saved to {})", key, value, file.display()));
    Ok(())
}

fn apply(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "data_dir" => config.data_dir = value.into(),
        "api_url" => config.api_url = value.to_string(),
        "app_id" => {
            if value.is_empty() {
                bail!("app_id cannot be empty");
            }
            config.app_id = value.to_string();
        }
        "storage" => config.storage = value.parse()?,
        "log_file" => {
            config.log_file = if value.is_empty() || value == "none" {
                None
            } else {
                Some(value.into())
            };
        }
        "monitor.health_path" => config.monitor.health_path = value.to_string(),
        "monitor.poll_interval_secs" => {
            config.monitor.poll_interval_secs = parse(key, value)?;
        }
        "monitor.probe_timeout_secs" => {
            config.monitor.probe_timeout_secs = parse(key, value)?;
        }
        "monitor.slow_downlink_mbps" => {
            config.monitor.slow_downlink_mbps = parse(key, value)?;
        }
        "backoff.base_delay_ms" => config.backoff.base_delay_ms = parse(key, value)?,
        "backoff.max_exponent" => config.backoff.max_exponent = parse(key, value)?,
        "queue.retry_ceiling" => config.queue.retry_ceiling = parse(key, value)?,
        "queue.request_timeout_secs" => {
            config.queue.request_timeout_secs = parse(key, value)?;
        }
        _ => {
            bail!(
                "`{}` is not a setting; choose one of: {}",
                key,
                SETTABLE_KEYS
            );
        }
    }
    Ok(())
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .ok()
        .with_context(|| format!("`{}` is not a valid {}", value, key))
}
