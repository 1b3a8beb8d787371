//! Config command handlers

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use chatsync_core::Config;

use crate::output::{Output, OutputFormat};

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;
    let token = config.token.as_deref().map(redact);

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "server_url": config.server_url,
                    "poll_interval_ms": config.poll_interval_ms,
                    "request_timeout_secs": config.request_timeout_secs,
                    "token": token,
                    "role": config.role,
                    "username": config.username,
                    "log_file": config.log_file
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.server_url);
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            println!("Configuration:");
            println!("  server_url:           {}", config.server_url);
            println!("  poll_interval_ms:     {}", config.poll_interval_ms);
            println!("  request_timeout_secs: {}", config.request_timeout_secs);
            println!(
                "  token:                {}",
                token.as_deref().unwrap_or("(not set)")
            );
            println!("  role:                 {}", config.role);
            println!(
                "  username:             {}",
                config.username.as_deref().unwrap_or("(not set)")
            );
            println!(
                "  log_file:             {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!();
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(
    key: String,
    value: String,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    match key.as_str() {
        "server_url" => {
            config.server_url = value.clone();
        }
        "poll_interval_ms" => {
            config.poll_interval_ms = value
                .parse()
                .context("Invalid value for poll_interval_ms. Use a number of milliseconds.")?;
        }
        "request_timeout_secs" => {
            config.request_timeout_secs = value
                .parse()
                .context("Invalid value for request_timeout_secs. Use a number of seconds.")?;
        }
        "token" => {
            config.token = optional(&value);
        }
        "role" => {
            config.role = value.parse().map_err(anyhow::Error::msg)?;
        }
        "username" => {
            config.username = optional(&value);
        }
        "log_file" => {
            config.log_file = optional(&value).map(PathBuf::from);
        }
        _ => {
            bail!(
                "Unknown configuration key: '{}'\n\
                 Valid keys: server_url, poll_interval_ms, request_timeout_secs, token, role, \
                 username, log_file",
                key
            );
        }
    }
    config.validate()?;

    // Save to the CLI-specified path or default
    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to_path(&save_path)
        .context("Failed to save configuration")?;

    let shown = if key == "token" { redact(&value) } else { value };
    output.success(&format!("Set {} = {}", key, shown));

    Ok(())
}

/// Empty or "none" clears an optional value
fn optional(value: &str) -> Option<String> {
    if value.is_empty() || value == "none" {
        None
    } else {
        Some(value.to_string())
    }
}

/// Keep only enough of a token to recognize it
fn redact(token: &str) -> String {
    let visible: String = token.chars().take(4).collect();
    if token.chars().count() <= 8 {
        "****".to_string()
    } else {
        format!("{}****", visible)
    }
}
