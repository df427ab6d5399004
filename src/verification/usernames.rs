//! Username enumeration against a public profile host.
//!
//! A HEAD request per candidate handle; a success status means the profile exists.
//! Every failure (timeout, 404, rate limiting, network error) counts as "not found".

use crate::core::config::Config;
use crate::core::error::{AppError, Result};
use crate::utils::patterns::sanitize_name_part;

use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashSet;
use url::Url;

/// A service that can tell whether a public profile exists for a handle.
#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    fn name(&self) -> &'static str;
    async fn profile_exists(&self, username: &str) -> bool;
}

/// Checks `https://github.com/<username>` (or the configured base URL).
#[derive(Debug, Clone)]
pub struct GithubProfiles {
    client: Client,
    base_url: Url,
}

impl GithubProfiles {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout)
            .build()?;
        let base_url = Url::parse(&format!("{}/", config.profile_base_url.trim_end_matches('/')))
            .map_err(|e| {
                AppError::Config(format!(
                    "Invalid profile base URL '{}': {}",
                    config.profile_base_url, e
                ))
            })?;
        Ok(Self { client, base_url })
    }

    fn profile_url(&self, username: &str) -> Option<Url> {
        self.base_url.join(username).ok()
    }
}

#[async_trait]
impl ProfileDirectory for GithubProfiles {
    fn name(&self) -> &'static str {
        "github"
    }

    async fn profile_exists(&self, username: &str) -> bool {
        if username.is_empty() {
            return false;
        }
        let Some(url) = self.profile_url(username) else {
            tracing::debug!(target: "username_task", "Could not build profile URL for '{}'", username);
            return false;
        };

        tracing::debug!(target: "username_task", "Sending HEAD request to {}", url);
        match self.client.head(url.clone()).send().await {
            Ok(response) => {
                let status = response.status();
                tracing::debug!(target: "username_task", "{} returned {}", url, status);
                status.is_success()
            }
            Err(e) => {
                tracing::debug!(target: "username_task", "Profile check for {} failed: {}", url, e);
                false
            }
        }
    }
}

/// Handle variants derived from a name, most likely first, without duplicates.
pub fn username_variants(first_name: &str, last_name: &str) -> Vec<String> {
    let first = sanitize_name_part(first_name);
    let last = sanitize_name_part(last_name);
    let f = first.chars().next().map(String::from).unwrap_or_default();
    let l = last.chars().next().map(String::from).unwrap_or_default();

    let raw = if first.is_empty() || last.is_empty() {
        vec![first.clone(), last.clone()]
    } else {
        vec![
            format!("{f}{last}"),
            format!("{first}{l}"),
            format!("{first}{last}"),
            format!("{first}.{last}"),
            format!("{first}-{last}"),
            format!("{first}_{last}"),
            format!("{last}{first}"),
            format!("{last}.{first}"),
            format!("{f}.{last}"),
            format!("{last}{f}"),
            first.clone(),
            last.clone(),
        ]
    };

    let mut seen = HashSet::new();
    raw.into_iter()
        .filter(|v| !v.is_empty() && seen.insert(v.clone()))
        .collect()
}

/// Checks name-derived handles against `directory` and returns the ones that exist.
///
/// At most `max_checks` requests are made, however many variants there are.
pub async fn enumerate_usernames(
    directory: &dyn ProfileDirectory,
    first_name: &str,
    last_name: &str,
    max_checks: usize,
) -> Vec<String> {
    let mut found = Vec::new();
    for variant in username_variants(first_name, last_name)
        .into_iter()
        .take(max_checks)
    {
        if directory.profile_exists(&variant).await {
            tracing::info!(target: "username_task", "Found {} profile '{}'", directory.name(), variant);
            found.push(variant);
        }
    }
    tracing::debug!(target: "username_task",
        "Username enumeration for '{} {}' found {} handle(s)", first_name, last_name, found.len());
    found
}
