//! Handles loading configuration from files and applying it to the Config struct.

use super::{Config, ConfigFile};
use anyhow::Context;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Loads configuration settings from a TOML file.
pub(crate) fn load_config_file(file_path: &str) -> anyhow::Result<ConfigFile> {
    let path = Path::new(file_path);
    if !path.is_file() {
        return Err(anyhow::anyhow!(
            "File not found or is not a file: {}",
            file_path
        ));
    }
    tracing::debug!("Attempting to read config file: {}", file_path);
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file: {}", file_path))?;

    let config_file_content: ConfigFile = toml::from_str(&content)
        .with_context(|| format!("Failed to parse TOML configuration from {}", file_path))?;

    tracing::debug!("Successfully parsed configuration file: {}", file_path);
    Ok(config_file_content)
}

/// Applies every setting present in `file_config` onto `config`.
pub(crate) fn apply_file_config(config: &mut Config, file_config: &ConfigFile) {
    // DNS
    if let Some(enabled) = file_config.dns.enabled {
        config.dns_enabled = enabled;
    }
    if let Some(timeout) = file_config.dns.dns_timeout {
        config.dns_timeout = Duration::from_secs(timeout);
    }
    if let Some(ref servers) = file_config.dns.dns_servers {
        config.dns_servers = servers
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }

    // SMTP
    let smtp = &file_config.smtp;
    if let Some(enabled) = smtp.enabled {
        config.smtp_enabled = enabled;
    }
    if let Some(ref helo) = smtp.helo_name {
        config.helo_name = helo.trim().to_lowercase();
    }
    if let Some(timeout) = smtp.smtp_timeout {
        config.smtp_timeout = Duration::from_secs(timeout);
    }
    if let Some(attempts) = smtp.max_attempts_per_host {
        config.max_attempts_per_host = attempts;
    }
    if let Some(hosts) = smtp.max_mx_hosts {
        config.max_mx_hosts = hosts;
    }
    if let Some(backoff) = smtp.backoff_ms {
        config.smtp_backoff = Duration::from_millis(backoff);
    }
    if let Some(check) = smtp.catch_all_check {
        config.catch_all_check = check;
    }
    if let Some(ref providers) = smtp.definitive_providers {
        config.definitive_providers = providers.clone();
    }

    // Scoring
    if let Some(weight) = file_config.scoring.blend_weight {
        config.blend_weight = weight;
    }
    if let Some(top_n) = file_config.scoring.top_n_to_probe {
        config.top_n_to_probe = top_n;
    }
    if let Some(ref roles) = file_config.scoring.role_accounts {
        if !roles.is_empty() {
            config.role_accounts = roles.iter().map(|r| r.trim().to_lowercase()).collect();
        }
    }

    // Acceptance
    if let Some(threshold) = file_config.acceptance.mx_high_conf {
        config.mx_high_conf = threshold;
    }
    if let Some(threshold) = file_config.acceptance.purge_no_mx_below {
        config.purge_no_mx_below = threshold;
    }

    // Username enumeration
    let usernames = &file_config.usernames;
    if let Some(enabled) = usernames.enabled {
        config.usernames_enabled = enabled;
    }
    if let Some(max_checks) = usernames.max_checks {
        config.username_max_checks = max_checks;
    }
    if let Some(ref url) = usernames.profile_base_url {
        config.profile_base_url = url.trim().trim_end_matches('/').to_string();
    }
    if let Some(timeout) = usernames.request_timeout {
        config.request_timeout = Duration::from_secs(timeout);
    }
    if let Some(ref ua) = usernames.user_agent {
        config.user_agent = ua.clone();
    }

    // Engine
    if let Some(concurrency) = file_config.engine.max_concurrency {
        config.max_concurrency = concurrency;
    }

    // Reprobe
    if let Some(iterations) = file_config.reprobe.max_iterations {
        config.reprobe_max_iterations = iterations;
    }
    if let Some(ratio) = file_config.reprobe.target_ratio {
        config.reprobe_target_ratio = ratio;
    }
    if let Some(sleep) = file_config.reprobe.sleep_between_ms {
        config.reprobe_sleep = Duration::from_millis(sleep);
    }
}
