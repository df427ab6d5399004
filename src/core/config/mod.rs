//! Runtime configuration, its TOML file representation, and per-call verification options.

mod builder;
mod loading;
mod validation;

pub use builder::ConfigBuilder;

pub(crate) use crate::core::error::Result;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub const DEFAULT_MX_HIGH_CONF: f64 = 0.75;
pub const DEFAULT_PURGE_NO_MX_BELOW: f64 = 0.6;
pub const DEFAULT_MAX_ATTEMPTS_PER_HOST: u32 = 2;
pub const DEFAULT_SMTP_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_TOP_N_TO_PROBE: usize = 7;
pub const MAX_USERNAME_CHECKS: usize = 12;

/// Providers whose 5xx RCPT replies are trusted without retry.
pub const DEFAULT_DEFINITIVE_PROVIDERS: &[&str] = &[
    "Microsoft 365",
    "Mimecast",
    "Google Workspace",
    "Yahoo",
    "Zoho",
    "iCloud",
    "FastMail",
];

pub const DEFAULT_ROLE_ACCOUNTS: &[&str] = &["info", "office", "admin", "contact", "support", "hello"];

/// Fully resolved runtime configuration.
///
/// Build it through [`ConfigBuilder`]; `Config::default()` gives the built-in defaults
/// without reading any file.
#[derive(Debug, Clone)]
pub struct Config {
    // DNS
    pub dns_enabled: bool,
    pub dns_timeout: Duration,
    pub dns_servers: Vec<String>,

    // SMTP
    pub smtp_enabled: bool,
    pub helo_name: String,
    pub smtp_timeout: Duration,
    pub max_attempts_per_host: u32,
    pub max_mx_hosts: usize,
    pub smtp_backoff: Duration,
    pub catch_all_check: bool,
    pub definitive_providers: Vec<String>,

    // Scoring
    pub blend_weight: f64,
    pub top_n_to_probe: usize,
    pub role_accounts: Vec<String>,

    // Acceptance
    pub mx_high_conf: f64,
    pub purge_no_mx_below: f64,

    // Username enumeration
    pub usernames_enabled: bool,
    pub username_max_checks: usize,
    pub profile_base_url: String,
    pub request_timeout: Duration,
    pub user_agent: String,

    // Engine
    pub max_concurrency: usize,

    // Reprobe loop
    pub reprobe_max_iterations: u32,
    pub reprobe_target_ratio: f64,
    pub reprobe_sleep: Duration,

    pub email_regex: Regex,
    pub loaded_config_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dns_enabled: true,
            dns_timeout: Duration::from_secs(8),
            dns_servers: Vec::new(),

            smtp_enabled: true,
            helo_name: "localhost".to_string(),
            smtp_timeout: Duration::from_secs(DEFAULT_SMTP_TIMEOUT_SECS),
            max_attempts_per_host: DEFAULT_MAX_ATTEMPTS_PER_HOST,
            max_mx_hosts: 3,
            smtp_backoff: Duration::from_secs(1),
            catch_all_check: true,
            definitive_providers: DEFAULT_DEFINITIVE_PROVIDERS
                .iter()
                .map(|s| s.to_string())
                .collect(),

            blend_weight: 0.0,
            top_n_to_probe: DEFAULT_TOP_N_TO_PROBE,
            role_accounts: DEFAULT_ROLE_ACCOUNTS.iter().map(|s| s.to_string()).collect(),

            mx_high_conf: DEFAULT_MX_HIGH_CONF,
            purge_no_mx_below: DEFAULT_PURGE_NO_MX_BELOW,

            usernames_enabled: false,
            username_max_checks: MAX_USERNAME_CHECKS,
            profile_base_url: "https://github.com".to_string(),
            request_timeout: Duration::from_secs(5),
            user_agent: concat!("mailprobe/", env!("CARGO_PKG_VERSION")).to_string(),

            max_concurrency: 8,

            reprobe_max_iterations: 10,
            reprobe_target_ratio: 0.99,
            reprobe_sleep: Duration::from_secs(1),

            email_regex: default_email_regex(),
            loaded_config_path: None,
        }
    }
}

impl Config {
    /// Per-call options seeded from this configuration.
    pub fn verify_options(&self) -> VerifyOptions {
        VerifyOptions {
            mx_high_conf: self.mx_high_conf,
            purge_no_mx_below: self.purge_no_mx_below,
            max_attempts_per_host: self.max_attempts_per_host,
            smtp_timeout_s: self.smtp_timeout.as_secs(),
            top_n_to_probe: self.top_n_to_probe,
            blend_weight: self.blend_weight,
            external_scores: HashMap::new(),
        }
    }
}

fn default_email_regex() -> Regex {
    Regex::new(r"^[a-z0-9._%+\-']+@[a-z0-9.\-]+\.[a-z]{2,}$").expect("static email regex compiles")
}

/// Options for one `verify_entity` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyOptions {
    pub mx_high_conf: f64,
    pub purge_no_mx_below: f64,
    pub max_attempts_per_host: u32,
    pub smtp_timeout_s: u64,
    pub top_n_to_probe: usize,
    pub blend_weight: f64,
    /// Out-of-band scores keyed by full email address.
    #[serde(default)]
    pub external_scores: HashMap<String, f64>,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            mx_high_conf: DEFAULT_MX_HIGH_CONF,
            purge_no_mx_below: DEFAULT_PURGE_NO_MX_BELOW,
            max_attempts_per_host: DEFAULT_MAX_ATTEMPTS_PER_HOST,
            smtp_timeout_s: DEFAULT_SMTP_TIMEOUT_SECS,
            top_n_to_probe: DEFAULT_TOP_N_TO_PROBE,
            blend_weight: 0.0,
            external_scores: HashMap::new(),
        }
    }
}

impl VerifyOptions {
    pub fn smtp_timeout(&self) -> Duration {
        Duration::from_secs(self.smtp_timeout_s)
    }
}

// Structures mirroring the TOML file layout. Every field is optional so a file
// may override only what it needs.

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConfigFile {
    pub dns: DnsSection,
    pub smtp: SmtpSection,
    pub scoring: ScoringSection,
    pub acceptance: AcceptanceSection,
    pub usernames: UsernamesSection,
    pub engine: EngineSection,
    pub reprobe: ReprobeSection,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DnsSection {
    pub enabled: Option<bool>,
    pub dns_timeout: Option<u64>,
    pub dns_servers: Option<Vec<String>>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SmtpSection {
    pub enabled: Option<bool>,
    pub helo_name: Option<String>,
    pub smtp_timeout: Option<u64>,
    pub max_attempts_per_host: Option<u32>,
    pub max_mx_hosts: Option<usize>,
    pub backoff_ms: Option<u64>,
    pub catch_all_check: Option<bool>,
    pub definitive_providers: Option<Vec<String>>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScoringSection {
    pub blend_weight: Option<f64>,
    pub top_n_to_probe: Option<usize>,
    pub role_accounts: Option<Vec<String>>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AcceptanceSection {
    pub mx_high_conf: Option<f64>,
    pub purge_no_mx_below: Option<f64>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UsernamesSection {
    pub enabled: Option<bool>,
    pub max_checks: Option<usize>,
    pub profile_base_url: Option<String>,
    pub request_timeout: Option<u64>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineSection {
    pub max_concurrency: Option<usize>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReprobeSection {
    pub max_iterations: Option<u32>,
    pub target_ratio: Option<f64>,
    pub sleep_between_ms: Option<u64>,
}
