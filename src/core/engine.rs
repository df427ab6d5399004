//! Orchestrates discovery and verification for one entity:
//! normalize, resolve, generate, score, lock, probe, accept, release.

use crate::core::acceptance::{apply_acceptance, AcceptanceThresholds};
use crate::core::config::{Config, VerifyOptions};
use crate::core::error::Result;
use crate::core::models::{
    DnsFootprint, EmailCandidate, EntityId, EntityResult, ProbeStatus, SourceSignals,
    VerificationStatus, VerifyRequest,
};
use crate::store::locks::{InMemoryLockStore, LockManager, LockStore};
use crate::store::metrics::{InMemoryMetricsStore, MetricsDelta, MetricsStore, NO_MX_PROVIDER};
use crate::utils::dns::{DnsBackend, FootprintResolver, NoopDnsBackend, TrustDnsBackend};
use crate::utils::domain::{is_valid_hostname, normalize_domain};
use crate::utils::patterns::{generate_candidates, sanitize_name_part};
use crate::utils::provider::provider_from_mx_host;
use crate::utils::scoring::{blend, heuristic_score, ScoreSignals};
use crate::utils::smtp::{LettreExchanger, MailExchanger, SmtpVerifier};
use crate::verification::usernames::{enumerate_usernames, GithubProfiles, ProfileDirectory};

use std::sync::Arc;
use std::time::Instant;

/// Selects the implementation behind each I/O seam and builds a [`VerificationEngine`].
///
/// Anything not set explicitly is derived from the [`Config`]:
/// trust-dns (or a no-op backend when DNS is disabled or unavailable), lettre over
/// port 25, GitHub profile checks when username enumeration is enabled, and
/// in-memory lock and metrics stores.
pub struct EngineBuilder {
    config: Config,
    dns_backend: Option<Arc<dyn DnsBackend>>,
    exchanger: Option<Arc<dyn MailExchanger>>,
    profiles: Option<Arc<dyn ProfileDirectory>>,
    lock_store: Option<Arc<dyn LockStore>>,
    metrics_store: Option<Arc<dyn MetricsStore>>,
    owner: Option<String>,
}

impl EngineBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            dns_backend: None,
            exchanger: None,
            profiles: None,
            lock_store: None,
            metrics_store: None,
            owner: None,
        }
    }

    pub fn dns_backend(mut self, backend: Arc<dyn DnsBackend>) -> Self {
        self.dns_backend = Some(backend);
        self
    }

    pub fn mail_exchanger(mut self, exchanger: Arc<dyn MailExchanger>) -> Self {
        self.exchanger = Some(exchanger);
        self
    }

    pub fn profile_directory(mut self, directory: Arc<dyn ProfileDirectory>) -> Self {
        self.profiles = Some(directory);
        self
    }

    pub fn lock_store(mut self, store: Arc<dyn LockStore>) -> Self {
        self.lock_store = Some(store);
        self
    }

    pub fn metrics_store(mut self, store: Arc<dyn MetricsStore>) -> Self {
        self.metrics_store = Some(store);
        self
    }

    /// Owner recorded on every lock this engine takes.
    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn build(self) -> Result<VerificationEngine> {
        let config = self.config;
        tracing::debug!("Initializing verification engine components...");

        let dns_backend: Arc<dyn DnsBackend> = match self.dns_backend {
            Some(backend) => backend,
            None if !config.dns_enabled => {
                tracing::info!("DNS lookups disabled; using no-op DNS backend.");
                Arc::new(NoopDnsBackend)
            }
            None => match TrustDnsBackend::from_config(&config) {
                Ok(backend) => Arc::new(backend),
                Err(e) => {
                    tracing::warn!("DNS resolver unavailable ({}); DNS signals will be empty.", e);
                    Arc::new(NoopDnsBackend)
                }
            },
        };
        let dns = FootprintResolver::new(dns_backend);
        tracing::debug!("DNS resolver initialized ({}).", dns.backend_name());

        let exchanger: Arc<dyn MailExchanger> = match self.exchanger {
            Some(exchanger) => exchanger,
            None => Arc::new(LettreExchanger::new(config.helo_name.clone())),
        };
        let verifier = SmtpVerifier::new(&config, exchanger);
        tracing::debug!("SMTP verifier initialized.");

        let profiles: Option<Arc<dyn ProfileDirectory>> = if config.usernames_enabled {
            match self.profiles {
                Some(directory) => Some(directory),
                None => Some(Arc::new(GithubProfiles::new(&config)?)),
            }
        } else {
            None
        };

        let lock_store: Arc<dyn LockStore> = match self.lock_store {
            Some(store) => store,
            None => Arc::new(InMemoryLockStore::new()),
        };
        let metrics: Arc<dyn MetricsStore> = match self.metrics_store {
            Some(store) => store,
            None => Arc::new(InMemoryMetricsStore::new()),
        };
        let locks = LockManager::new(lock_store);
        let owner = self
            .owner
            .unwrap_or_else(|| format!("mailprobe-{}", std::process::id()));

        tracing::info!("Verification engine initialized successfully.");
        Ok(VerificationEngine {
            config: Arc::new(config),
            dns,
            verifier,
            profiles,
            locks,
            metrics,
            owner,
        })
    }
}

/// The discovery and verification pipeline. Cheap to clone; clones share stores.
#[derive(Clone)]
pub struct VerificationEngine {
    config: Arc<Config>,
    dns: FootprintResolver,
    verifier: SmtpVerifier,
    profiles: Option<Arc<dyn ProfileDirectory>>,
    locks: LockManager,
    metrics: Arc<dyn MetricsStore>,
    owner: String,
}

impl VerificationEngine {
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    pub fn metrics(&self) -> &Arc<dyn MetricsStore> {
        &self.metrics
    }

    pub(crate) fn owner(&self) -> &str {
        &self.owner
    }

    /// Runs the full pipeline for one request. Never fails: absence of an answer is
    /// reported through candidate statuses, and lock contention through `skipped`.
    pub async fn verify_entity(&self, request: &VerifyRequest, opts: &VerifyOptions) -> EntityResult {
        let start_time = Instant::now();
        let domain = normalize_domain(&request.domain);
        let entity_id = request
            .entity_id
            .clone()
            .unwrap_or_else(|| default_entity_id(request, &domain));
        let task_label = format!("{} {} @ {}", request.first_name, request.last_name, domain);
        tracing::info!(target: "engine_task", "[{}] Starting verification (entity {})", task_label, entity_id);

        let footprint = self.resolve_footprint(&domain).await;
        let usernames = self.discover_usernames(request).await;

        let mut candidates = generate_candidates(
            &self.config,
            &request.first_name,
            &request.last_name,
            &domain,
            &usernames,
        );
        self.score_candidates(&mut candidates, &footprint, &usernames, opts);
        tracing::info!(target: "engine_task", "[{}] {} candidates scored", task_label, candidates.len());

        let Some(entity_lock) = self.locks.lock_entity(&entity_id, &self.owner).await else {
            tracing::info!(target: "engine_task", "[{}] Entity {} is locked by another worker; skipping", task_label, entity_id);
            return EntityResult {
                footprint,
                ..EntityResult::skipped(
                    request.clone(),
                    domain,
                    format!("entity lock {} held by another worker", entity_id),
                )
            };
        };

        let is_catch_all = self
            .verify_candidates(&mut candidates, &footprint, opts, &task_label)
            .await;
        let thresholds = thresholds(opts);
        for candidate in candidates.iter_mut() {
            apply_acceptance(candidate, footprint.has_mx(), is_catch_all, &thresholds);
        }

        drop(entity_lock);

        let accepted = candidates.iter().filter(|c| c.accepted).count();
        tracing::info!(target: "engine_task",
            "[{}] Finished in {:.2?}: {} accepted of {} (catch-all: {})",
            task_label, start_time.elapsed(), accepted, candidates.len(), is_catch_all
        );

        EntityResult {
            request: request.clone(),
            domain,
            footprint,
            is_catch_all,
            candidates,
            skipped: false,
            skip_reason: None,
        }
    }

    pub(crate) async fn resolve_footprint(&self, domain: &str) -> DnsFootprint {
        if !is_valid_hostname(domain) {
            tracing::warn!(target: "engine_task", "'{}' is not a valid hostname; skipping network checks", domain);
            return DnsFootprint::empty(domain);
        }
        self.dns.resolve(domain, self.config.dns_timeout).await
    }

    async fn discover_usernames(&self, request: &VerifyRequest) -> Vec<String> {
        match &self.profiles {
            Some(directory) => {
                enumerate_usernames(
                    directory.as_ref(),
                    &request.first_name,
                    &request.last_name,
                    self.config.username_max_checks,
                )
                .await
            }
            None => Vec::new(),
        }
    }

    /// Fills signals and scores, then sorts by blended score, highest first.
    /// Ties keep template order.
    fn score_candidates(
        &self,
        candidates: &mut [EmailCandidate],
        footprint: &DnsFootprint,
        usernames: &[String],
        opts: &VerifyOptions,
    ) {
        let provider = primary_provider(footprint);

        for candidate in candidates.iter_mut() {
            let signals = ScoreSignals {
                provider: provider.as_deref(),
                spf_includes: &footprint.spf.includes,
                username_hits: usernames,
                role_accounts: &self.config.role_accounts,
            };
            let heuristic = heuristic_score(&candidate.email, &signals);
            let external = opts.external_scores.get(&candidate.email).copied();

            candidate.heuristic_score = heuristic;
            candidate.external_score = external;
            candidate.blended_score = blend(heuristic, external, opts.blend_weight);
            candidate.source_signals = SourceSignals {
                spf_includes: footprint.spf.includes.clone(),
                mx_hosts: footprint.mx.clone(),
                provider: provider.clone(),
                username_hits: usernames.to_vec(),
                ..SourceSignals::default()
            };
        }
        candidates.sort_by(|a, b| b.blended_score.total_cmp(&a.blended_score));
    }

    /// Assigns pre-probe statuses and probes the top candidates in order until one
    /// validates. Returns whether the domain is catch-all.
    async fn verify_candidates(
        &self,
        candidates: &mut [EmailCandidate],
        footprint: &DnsFootprint,
        opts: &VerifyOptions,
        task_label: &str,
    ) -> bool {
        let has_mx = footprint.has_mx();
        let smtp_on = has_mx && self.config.smtp_enabled;
        let is_catch_all = self.check_catch_all(footprint, opts).await;

        let initial = if !has_mx {
            VerificationStatus::NoMx
        } else if is_catch_all {
            VerificationStatus::CatchAll
        } else {
            VerificationStatus::MxPresentUnverified
        };
        for candidate in candidates.iter_mut() {
            candidate.verification_status = initial;
            candidate.source_signals.is_catch_all = is_catch_all;
        }

        if !smtp_on {
            tracing::debug!(target: "engine_task", "[{}] SMTP probing skipped (MX present: {})", task_label, has_mx);
            return is_catch_all;
        }
        if is_catch_all {
            tracing::info!(target: "engine_task", "[{}] Domain is catch-all; RCPT results would not be diagnostic", task_label);
            return is_catch_all;
        }

        for candidate in candidates.iter_mut().take(opts.top_n_to_probe) {
            self.probe_candidate(candidate, footprint, opts).await;
            if candidate.verification_status == VerificationStatus::ValidatedSmtp {
                tracing::info!(target: "engine_task", "[{}] {} validated; stopping probes", task_label, candidate.email);
                break;
            }
        }
        is_catch_all
    }

    /// Sends RCPT for a random address at the domain. False without MX, with SMTP
    /// off, or with the catch-all check disabled.
    pub(crate) async fn check_catch_all(&self, footprint: &DnsFootprint, opts: &VerifyOptions) -> bool {
        if !footprint.has_mx() || !self.config.smtp_enabled || !self.config.catch_all_check {
            return false;
        }
        self.verifier
            .detect_catch_all(
                &footprint.mx_hosts(),
                &footprint.domain,
                opts.smtp_timeout(),
                opts.max_attempts_per_host,
            )
            .await
    }

    /// Probes one candidate, records provider metrics, and updates its status and signals.
    pub(crate) async fn probe_candidate(
        &self,
        candidate: &mut EmailCandidate,
        footprint: &DnsFootprint,
        opts: &VerifyOptions,
    ) {
        let result = self
            .verifier
            .probe(
                &candidate.email,
                &footprint.mx_hosts(),
                opts.smtp_timeout(),
                opts.max_attempts_per_host,
            )
            .await;

        let delta = MetricsDelta::for_probe(&result);
        for provider in metrics_providers(footprint) {
            self.metrics.merge(&provider, &delta).await;
        }

        candidate.verification_status = match result.status {
            ProbeStatus::Valid => VerificationStatus::ValidatedSmtp,
            ProbeStatus::Invalid => VerificationStatus::InvalidSmtp,
            ProbeStatus::Unknown => VerificationStatus::UnknownSmtp,
        };
        candidate.source_signals.smtp_code = result.code;
        candidate.source_signals.smtp_details = Some(result.details);
        candidate.probe_attempts.extend(result.attempts);
    }
}

/// Provider of the most preferred MX host.
pub(crate) fn primary_provider(footprint: &DnsFootprint) -> Option<String> {
    footprint.mx.first().map(|mx| provider_from_mx_host(&mx.host))
}

/// Distinct providers of a footprint's MX hosts, or the no-MX bucket.
fn metrics_providers(footprint: &DnsFootprint) -> Vec<String> {
    let mut providers: Vec<String> = Vec::new();
    for mx in &footprint.mx {
        let provider = provider_from_mx_host(&mx.host);
        if !providers.contains(&provider) {
            providers.push(provider);
        }
    }
    if providers.is_empty() {
        providers.push(NO_MX_PROVIDER.to_string());
    }
    providers
}

pub(crate) fn thresholds(opts: &VerifyOptions) -> AcceptanceThresholds {
    AcceptanceThresholds {
        mx_high_conf: opts.mx_high_conf,
        purge_no_mx_below: opts.purge_no_mx_below,
    }
}

/// `first.last@domain`, lowercased, when the caller gives no entity id.
pub(crate) fn default_entity_id(request: &VerifyRequest, domain: &str) -> EntityId {
    EntityId::from(format!(
        "{}.{}@{}",
        sanitize_name_part(&request.first_name),
        sanitize_name_part(&request.last_name),
        domain
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{FinalStatus, MxRecord};

    fn footprint(hosts: &[&str]) -> DnsFootprint {
        DnsFootprint {
            mx: hosts
                .iter()
                .enumerate()
                .map(|(i, h)| MxRecord::new(i as u16 * 10, *h))
                .collect(),
            ..DnsFootprint::empty("example.com")
        }
    }

    #[test]
    fn test_metrics_providers() {
        assert_eq!(metrics_providers(&DnsFootprint::empty("example.com")), vec!["no_mx"]);
        assert_eq!(
            metrics_providers(&footprint(&["aspmx.l.google.com", "alt1.aspmx.l.google.com", "mx.backup.net"])),
            vec!["Google Workspace".to_string(), "backup.net".to_string()]
        );
    }

    #[test]
    fn test_default_entity_id() {
        let request = VerifyRequest::new("Alice", "O'Smith", "Example.com");
        assert_eq!(default_entity_id(&request, "example.com").as_str(), "alice.osmith@example.com");
    }

    #[tokio::test]
    async fn test_no_dns_marks_everything_no_mx() {
        let config = Config {
            dns_enabled: false,
            ..Config::default()
        };
        let engine = EngineBuilder::new(config).build().unwrap();
        let opts = engine.config().verify_options();
        let result = engine
            .verify_entity(&VerifyRequest::new("Alice", "Smith", "example.com"), &opts)
            .await;

        assert!(!result.skipped);
        assert!(result
            .candidates
            .iter()
            .all(|c| c.verification_status == VerificationStatus::NoMx && !c.accepted));
        let info = result
            .candidates
            .iter()
            .find(|c| c.email == "info@example.com")
            .unwrap();
        assert_eq!(info.final_status, Some(FinalStatus::Purged));
        assert_eq!(result.candidates[0].email, "alice.smith@example.com");
        assert!(engine.locks().held().await.is_empty());
    }
}
