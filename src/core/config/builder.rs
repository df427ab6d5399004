//! Provides the `ConfigBuilder` for fluent configuration construction.

use super::loading::{apply_file_config, load_config_file};
use super::validation::validate_config;
use super::{Config, ConfigFile, Result};
use crate::AppError;
use std::path::Path;
use std::time::Duration;

/// Builder pattern for creating `Config` instances fluently.
///
/// Settings are layered as: built-in defaults, then a TOML file (explicit path or
/// one of the default locations), then the overrides set on the builder. The
/// result is validated before it is returned.
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
    config_file_path: Option<String>,
    skip_default_files: bool,
    overrides: ConfigFile,
}

impl ConfigBuilder {
    /// Creates a new builder with default configuration values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Specify an optional configuration file path to load.
    pub fn config_file(mut self, path: impl Into<String>) -> Self {
        self.config_file_path = Some(path.into());
        self
    }

    /// Do not look for `./mailprobe.toml` or `./config.toml` when no explicit file is set.
    pub fn skip_default_files(mut self) -> Self {
        self.skip_default_files = true;
        self
    }

    pub fn dns_enabled(mut self, enabled: bool) -> Self {
        self.overrides.dns.enabled = Some(enabled);
        self
    }
    pub fn dns_timeout(mut self, duration: Duration) -> Self {
        self.overrides.dns.dns_timeout = Some(duration.as_secs());
        self
    }
    pub fn dns_servers(mut self, servers: Vec<String>) -> Self {
        self.overrides.dns.dns_servers = Some(servers);
        self
    }
    pub fn smtp_enabled(mut self, enabled: bool) -> Self {
        self.overrides.smtp.enabled = Some(enabled);
        self
    }
    pub fn helo_name(mut self, value: impl Into<String>) -> Self {
        self.overrides.smtp.helo_name = Some(value.into());
        self
    }
    pub fn smtp_timeout(mut self, duration: Duration) -> Self {
        self.overrides.smtp.smtp_timeout = Some(duration.as_secs());
        self
    }
    pub fn max_attempts_per_host(mut self, value: u32) -> Self {
        self.overrides.smtp.max_attempts_per_host = Some(value);
        self
    }
    pub fn max_mx_hosts(mut self, value: usize) -> Self {
        self.overrides.smtp.max_mx_hosts = Some(value);
        self
    }
    /// Unit of the linear backoff between attempts against the same host.
    pub fn smtp_backoff(mut self, duration: Duration) -> Self {
        self.overrides.smtp.backoff_ms = Some(duration.as_millis() as u64);
        self
    }
    pub fn catch_all_check(mut self, enabled: bool) -> Self {
        self.overrides.smtp.catch_all_check = Some(enabled);
        self
    }
    pub fn definitive_providers(mut self, providers: Vec<String>) -> Self {
        self.overrides.smtp.definitive_providers = Some(providers);
        self
    }
    pub fn blend_weight(mut self, value: f64) -> Self {
        self.overrides.scoring.blend_weight = Some(value);
        self
    }
    pub fn top_n_to_probe(mut self, value: usize) -> Self {
        self.overrides.scoring.top_n_to_probe = Some(value);
        self
    }
    pub fn role_accounts(mut self, roles: Vec<String>) -> Self {
        self.overrides.scoring.role_accounts = Some(roles);
        self
    }
    pub fn mx_high_conf(mut self, value: f64) -> Self {
        self.overrides.acceptance.mx_high_conf = Some(value);
        self
    }
    pub fn purge_no_mx_below(mut self, value: f64) -> Self {
        self.overrides.acceptance.purge_no_mx_below = Some(value);
        self
    }
    pub fn usernames_enabled(mut self, enabled: bool) -> Self {
        self.overrides.usernames.enabled = Some(enabled);
        self
    }
    pub fn username_max_checks(mut self, value: usize) -> Self {
        self.overrides.usernames.max_checks = Some(value);
        self
    }
    pub fn profile_base_url(mut self, value: impl Into<String>) -> Self {
        self.overrides.usernames.profile_base_url = Some(value.into());
        self
    }
    pub fn request_timeout(mut self, duration: Duration) -> Self {
        self.overrides.usernames.request_timeout = Some(duration.as_secs());
        self
    }
    pub fn user_agent(mut self, value: impl Into<String>) -> Self {
        self.overrides.usernames.user_agent = Some(value.into());
        self
    }
    pub fn max_concurrency(mut self, value: usize) -> Self {
        self.overrides.engine.max_concurrency = Some(value);
        self
    }
    pub fn reprobe_max_iterations(mut self, value: u32) -> Self {
        self.overrides.reprobe.max_iterations = Some(value);
        self
    }
    pub fn reprobe_target_ratio(mut self, value: f64) -> Self {
        self.overrides.reprobe.target_ratio = Some(value);
        self
    }
    pub fn reprobe_sleep(mut self, duration: Duration) -> Self {
        self.overrides.reprobe.sleep_between_ms = Some(duration.as_millis() as u64);
        self
    }

    /// Builds the final `Config` object, applying defaults, file settings, overrides, and validation.
    pub fn build(mut self) -> Result<Config> {
        let mut loaded_path: Option<String> = None;

        if let Some(ref path) = self.config_file_path {
            match load_config_file(path) {
                Ok(file_config) => {
                    apply_file_config(&mut self.config, &file_config);
                    loaded_path = Some(path.clone());
                    tracing::info!("Loaded base configuration from specified file: {}", path);
                }
                Err(e) => {
                    tracing::error!("Failed to load specified config file '{}': {}", path, e);
                    return Err(AppError::Config(format!(
                        "Failed to load specified configuration file '{}': {}",
                        path, e
                    )));
                }
            }
        } else if !self.skip_default_files {
            tracing::debug!("No config file specified, checking default locations.");
            for path_str in ["./mailprobe.toml", "./config.toml"] {
                if !Path::new(path_str).exists() {
                    continue;
                }
                match load_config_file(path_str) {
                    Ok(file_config) => {
                        apply_file_config(&mut self.config, &file_config);
                        loaded_path = Some(path_str.to_string());
                        tracing::info!(
                            "Loaded base configuration from default location: {}",
                            path_str
                        );
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(
                            "Failed to load or parse default config '{}': {}",
                            path_str,
                            e
                        );
                    }
                }
            }
            if loaded_path.is_none() {
                tracing::debug!("No configuration file found. Using default values and overrides.");
            }
        }

        apply_file_config(&mut self.config, &self.overrides);
        self.config.loaded_config_path = loaded_path;
        validate_config(&mut self.config)?;

        tracing::debug!("Final configuration built successfully.");
        Ok(self.config)
    }
}
