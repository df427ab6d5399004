//! Contains validation logic for the final Config struct.

use super::{Config, Result, MAX_USERNAME_CHECKS};
use crate::core::error::AppError;
use crate::utils::domain::is_valid_hostname;

fn clamp_unit(name: &str, value: &mut f64) {
    if !(0.0..=1.0).contains(&*value) {
        let clamped = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
        tracing::warn!("{} ({}) outside [0, 1]. Clamping to {}.", name, value, clamped);
        *value = clamped;
    }
}

fn at_least_one<T: PartialEq + From<u8>>(name: &str, value: &mut T) {
    if *value == T::from(0) {
        tracing::warn!("{} was set to 0. Setting to 1.", name);
        *value = T::from(1);
    }
}

/// Validates the configuration after loading and overrides.
/// Clamps out-of-range values where a sensible correction exists; rejects the rest.
pub(crate) fn validate_config(config: &mut Config) -> Result<()> {
    clamp_unit("mx_high_conf", &mut config.mx_high_conf);
    clamp_unit("purge_no_mx_below", &mut config.purge_no_mx_below);
    clamp_unit("blend_weight", &mut config.blend_weight);
    clamp_unit("reprobe_target_ratio", &mut config.reprobe_target_ratio);

    at_least_one("max_attempts_per_host", &mut config.max_attempts_per_host);
    at_least_one("top_n_to_probe", &mut config.top_n_to_probe);
    at_least_one("max_concurrency", &mut config.max_concurrency);
    at_least_one("max_mx_hosts", &mut config.max_mx_hosts);
    at_least_one("reprobe_max_iterations", &mut config.reprobe_max_iterations);

    if config.username_max_checks > MAX_USERNAME_CHECKS {
        tracing::warn!(
            "Username max checks ({}) exceeds cap. Clamping to {}.",
            config.username_max_checks,
            MAX_USERNAME_CHECKS
        );
        config.username_max_checks = MAX_USERNAME_CHECKS;
    }

    if config.helo_name != "localhost" && !is_valid_hostname(&config.helo_name) {
        return Err(AppError::Config(format!(
            "Invalid HELO name: {}",
            config.helo_name
        )));
    }

    if config.usernames_enabled && url::Url::parse(&config.profile_base_url).is_err() {
        return Err(AppError::Config(format!(
            "Invalid profile base URL: {}",
            config.profile_base_url
        )));
    }

    if config.dns_enabled && config.dns_servers.is_empty() {
        tracing::debug!("No DNS servers configured. Resolver will use system configuration.");
    }
    for server in &config.dns_servers {
        if server.parse::<std::net::IpAddr>().is_err() {
            return Err(AppError::Config(format!(
                "DNS server is not an IP address: {}",
                server
            )));
        }
    }

    if config.definitive_providers.is_empty() {
        tracing::warn!("Definitive provider table is empty. Every 5xx will be retried before it is trusted.");
    }
    Ok(())
}
