//! # Mailprobe Core Library
//!
//! Discovers likely mailbox addresses for a person at an organization and
//! verifies them over SMTP: domain normalization, DNS footprinting, candidate
//! generation, scoring, RCPT probing with catch-all detection, acceptance,
//! entity locking and per-provider probe metrics.
//!
//! It is designed to be used either directly as a library or via the `mailprobe`
//! command-line tool (which uses this library).

mod core;
mod store;
mod utils;
mod verification;

pub use crate::core::config::{Config, ConfigBuilder, ConfigFile, VerifyOptions};
pub use crate::core::engine::{EngineBuilder, VerificationEngine};
pub use crate::core::error::{AppError, Result};
pub use crate::core::models::{
    AttemptClass, DnsFootprint, EmailCandidate, EntityId, EntityResult, FinalStatus, MxRecord,
    ProbeAttempt, ProbeResult, ProbeStatus, SourceSignals, SpfInfo, VerificationStatus,
    VerifyRequest,
};
pub use crate::core::reprobe::{success_ratio, EntityState, ReprobeOptions, ReprobeSummary};
pub use crate::store::{
    InMemoryLockStore, InMemoryMetricsStore, LockGuard, LockManager, LockRecord, LockStore, MetricsDelta,
    MetricsStore, ProviderMetric, NO_MX_PROVIDER, REPROBE_GLOBAL_LOCK,
};
pub use crate::utils::dns::{DnsBackend, NoopDnsBackend, TrustDnsBackend};
pub use crate::utils::domain::{is_valid_hostname, normalize_domain};
pub use crate::utils::smtp::{LettreExchanger, MailExchanger, RcptReply};
pub use crate::verification::{GithubProfiles, ProfileDirectory};

use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;

/// Builds an engine with the default implementation behind every seam.
/// Use [`EngineBuilder`] to substitute any of them.
pub fn initialize_engine(config: &Config) -> Result<VerificationEngine> {
    EngineBuilder::new(config.clone()).build()
}

/// Verifies one request.
///
/// Requests without a domain or without any name are returned as skipped
/// instead of being run through the pipeline.
pub async fn verify_single_entity(
    engine: &VerificationEngine,
    request: VerifyRequest,
    opts: &VerifyOptions,
) -> EntityResult {
    let validated = match validate_request(&request) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(target: "engine_task",
                "[{} {} @ {}] Skipping record. Reason: {}",
                request.first_name, request.last_name, request.domain, e
            );
            let domain = normalize_domain(&request.domain);
            return EntityResult::skipped(request, domain, e.to_string());
        }
    };
    engine.verify_entity(&validated, opts).await
}

/// Verifies many requests with at most `max_concurrency` in flight.
///
/// Results come back in completion order. Each request still takes its own
/// entity lock, so duplicates in one batch may come back skipped.
pub async fn verify_entities(
    engine: Arc<VerificationEngine>,
    requests: Vec<VerifyRequest>,
    opts: Arc<VerifyOptions>,
) -> Vec<EntityResult> {
    let total_records = requests.len();
    if total_records == 0 {
        return Vec::new();
    }
    let max_concurrency = engine.config().max_concurrency.max(1);

    let mut tasks = FuturesUnordered::new();
    let mut results = Vec::with_capacity(total_records);

    for request in requests {
        while tasks.len() >= max_concurrency {
            if let Some(join_handle_result) = tasks.next().await {
                match join_handle_result {
                    Ok(entity_result) => results.push(entity_result),
                    Err(e) => tracing::error!("A verification task failed to join: {}", e),
                }
            } else {
                tracing::warn!("Task queue unexpectedly empty while limiting concurrency.");
                break;
            }
        }

        let engine_clone = Arc::clone(&engine);
        let opts_clone = Arc::clone(&opts);
        tasks.push(tokio::spawn(async move {
            verify_single_entity(&engine_clone, request, &opts_clone).await
        }));
    }

    while let Some(join_handle_result) = tasks.next().await {
        match join_handle_result {
            Ok(entity_result) => results.push(entity_result),
            Err(e) => {
                tracing::error!("A verification task failed to join during final drain: {}", e)
            }
        }
    }

    results
}

/// Trims the request and fills in a missing last name from a full name given as
/// the first name.
fn validate_request(request: &VerifyRequest) -> Result<VerifyRequest> {
    let mut first_name = request.first_name.trim().to_string();
    let mut last_name = request.last_name.trim().to_string();
    let domain = request.domain.trim().to_string();

    if last_name.is_empty() {
        let parts: Vec<&str> = first_name.split_whitespace().collect();
        if parts.len() >= 2 {
            last_name = parts[parts.len() - 1].to_string();
            first_name = parts[0].to_string();
        }
    }

    let mut missing_parts = Vec::new();
    if first_name.is_empty() && last_name.is_empty() {
        missing_parts.push("name");
    }
    if domain.is_empty() {
        missing_parts.push("domain");
    }
    if !missing_parts.is_empty() {
        return Err(AppError::InsufficientInput(format!(
            "Missing {}",
            missing_parts.join(", ")
        )));
    }

    if normalize_domain(&domain).is_empty() {
        return Err(AppError::InvalidHostname(domain));
    }

    Ok(VerifyRequest {
        first_name,
        last_name,
        domain,
        entity_id: request.entity_id.clone(),
    })
}
