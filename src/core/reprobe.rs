//! Iterative re-verification of entities that have no accepted candidate yet.

use crate::core::acceptance::apply_acceptance;
use crate::core::config::{Config, VerifyOptions};
use crate::core::engine::{primary_provider, thresholds, VerificationEngine};
use crate::core::models::{EmailCandidate, EntityId, EntityResult, FinalStatus, VerificationStatus};
use crate::store::locks::REPROBE_GLOBAL_LOCK;

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Candidates for one entity as persisted by the caller between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub entity_id: EntityId,
    pub domain: String,
    pub candidates: Vec<EmailCandidate>,
}

impl EntityState {
    pub fn new(entity_id: impl Into<EntityId>, domain: impl Into<String>, candidates: Vec<EmailCandidate>) -> Self {
        Self {
            entity_id: entity_id.into(),
            domain: domain.into(),
            candidates,
        }
    }

    /// State for a finished verification. Purged candidates are left out.
    pub fn from_result(entity_id: impl Into<EntityId>, result: &EntityResult) -> Self {
        Self::new(
            entity_id,
            result.domain.clone(),
            result
                .candidates
                .iter()
                .filter(|c| c.final_status != Some(FinalStatus::Purged))
                .cloned()
                .collect(),
        )
    }

    pub fn has_accepted(&self) -> bool {
        self.candidates.iter().any(|c| c.accepted)
    }

    fn is_catch_all(&self) -> bool {
        self.candidates.iter().any(|c| c.source_signals.is_catch_all)
    }
}

/// Bounds for [`VerificationEngine::reprobe_entities`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReprobeOptions {
    pub max_iterations: u32,
    /// Stop once this fraction of entities has an accepted candidate.
    pub target_ratio: f64,
    pub sleep_between: Duration,
}

impl ReprobeOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_iterations: config.reprobe_max_iterations,
            target_ratio: config.reprobe_target_ratio,
            sleep_between: config.reprobe_sleep,
        }
    }
}

/// What a reprobe run did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReprobeSummary {
    /// False when another run held the global reprobe lock.
    pub started: bool,
    pub iterations: u32,
    pub success_ratio: f64,
    pub converged: bool,
    /// Entities skipped at least once because their lock was held.
    pub skipped_entities: Vec<EntityId>,
    pub probes: usize,
}

/// Fraction of entities with at least one accepted candidate. An empty set counts as done.
pub fn success_ratio(entities: &[EntityState]) -> f64 {
    if entities.is_empty() {
        return 1.0;
    }
    entities.iter().filter(|e| e.has_accepted()).count() as f64 / entities.len() as f64
}

impl VerificationEngine {
    /// Re-probes `unaccepted` candidates of entities that have nothing accepted,
    /// re-applies acceptance and drops purged candidates, until the success ratio
    /// reaches `target_ratio` or `max_iterations` passes have run.
    ///
    /// The whole run holds the `reprobe_global` lock; each entity is processed under
    /// its own entity lock and skipped when that lock is held elsewhere.
    pub async fn reprobe_entities(
        &self,
        entities: &mut [EntityState],
        opts: &VerifyOptions,
        reprobe: &ReprobeOptions,
    ) -> ReprobeSummary {
        let mut summary = ReprobeSummary {
            started: false,
            iterations: 0,
            success_ratio: success_ratio(entities),
            converged: false,
            skipped_entities: Vec::new(),
            probes: 0,
        };

        let Some(global_lock) = self.locks().lock_named(REPROBE_GLOBAL_LOCK, self.owner()).await else {
            tracing::info!(target: "engine_task", "Another reprobe run holds '{}'; aborting", REPROBE_GLOBAL_LOCK);
            return summary;
        };
        summary.started = true;
        tracing::info!(target: "engine_task",
            "Reprobe started for {} entities (success ratio {:.3})", entities.len(), summary.success_ratio);

        while summary.success_ratio < reprobe.target_ratio && summary.iterations < reprobe.max_iterations {
            summary.iterations += 1;

            for state in entities.iter_mut().filter(|s| !s.has_accepted()) {
                let Some(entity_lock) = self.locks().lock_entity(&state.entity_id, self.owner()).await else {
                    tracing::info!(target: "engine_task", "Skipping entity {}: lock held", state.entity_id);
                    if !summary.skipped_entities.contains(&state.entity_id) {
                        summary.skipped_entities.push(state.entity_id.clone());
                    }
                    continue;
                };
                summary.probes += self.reprobe_entity(state, opts).await;
                drop(entity_lock);
            }

            summary.success_ratio = success_ratio(entities);
            tracing::info!(target: "engine_task",
                "Reprobe iteration {}/{}: success ratio {:.3}",
                summary.iterations, reprobe.max_iterations, summary.success_ratio
            );
            if summary.success_ratio < reprobe.target_ratio
                && summary.iterations < reprobe.max_iterations
                && !reprobe.sleep_between.is_zero()
            {
                tokio::time::sleep(reprobe.sleep_between).await;
            }
        }

        summary.converged = summary.success_ratio >= reprobe.target_ratio;
        drop(global_lock);
        tracing::info!(target: "engine_task",
            "Reprobe finished after {} iteration(s): ratio {:.3}, converged {}, {} probe(s)",
            summary.iterations, summary.success_ratio, summary.converged, summary.probes
        );
        summary
    }

    /// One pass over one entity. Returns the number of candidate probes made.
    ///
    /// A domain that gained MX since the last pass is checked for catch-all before
    /// any candidate is probed. Once seen as catch-all it stays catch-all.
    async fn reprobe_entity(&self, state: &mut EntityState, opts: &VerifyOptions) -> usize {
        if !state.candidates.iter().any(is_pending) {
            return 0;
        }
        let footprint = self.resolve_footprint(&state.domain).await;
        let has_mx = footprint.has_mx();
        let is_catch_all = has_mx && (state.is_catch_all() || self.check_catch_all(&footprint, opts).await);
        if is_catch_all {
            tracing::info!(target: "engine_task", "Entity {}: {} is catch-all; not probing", state.entity_id, state.domain);
        }
        let can_probe = has_mx && self.config().smtp_enabled && !is_catch_all;
        let provider = primary_provider(&footprint);
        let thresholds = thresholds(opts);
        let mut probes = 0;
        let mut validated = false;

        for candidate in state.candidates.iter_mut().filter(|c| is_pending(c)) {
            candidate.source_signals.mx_hosts = footprint.mx.clone();
            candidate.source_signals.provider = provider.clone();
            candidate.source_signals.is_catch_all = is_catch_all;
            if !has_mx {
                candidate.verification_status = VerificationStatus::NoMx;
            } else if is_catch_all {
                candidate.verification_status = VerificationStatus::CatchAll;
            } else if can_probe && !validated {
                self.probe_candidate(candidate, &footprint, opts).await;
                probes += 1;
                validated = candidate.verification_status == VerificationStatus::ValidatedSmtp;
            } else if matches!(
                candidate.verification_status,
                VerificationStatus::Unverified | VerificationStatus::NoMx | VerificationStatus::CatchAll
            ) {
                candidate.verification_status = VerificationStatus::MxPresentUnverified;
            }
            apply_acceptance(candidate, has_mx, is_catch_all, &thresholds);
        }

        let before = state.candidates.len();
        state
            .candidates
            .retain(|c| c.final_status != Some(FinalStatus::Purged));
        if state.candidates.len() < before {
            tracing::debug!(target: "engine_task",
                "Entity {}: dropped {} purged candidate(s)", state.entity_id, before - state.candidates.len());
        }
        probes
    }
}

fn is_pending(candidate: &EmailCandidate) -> bool {
    matches!(candidate.final_status, None | Some(FinalStatus::Unaccepted))
}
