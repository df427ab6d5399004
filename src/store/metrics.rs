//! Per-provider probe counters.

use crate::core::models::{ProbeResult, ProbeStatus};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Metrics bucket for probes made when a domain has no MX hosts.
pub const NO_MX_PROVIDER: &str = "no_mx";

/// Histogram key for probes that produced no reply code.
const NO_CODE: &str = "none";

/// Accumulated counters for one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderMetric {
    pub provider: String,
    pub probes: u64,
    pub valid: u64,
    pub invalid: u64,
    /// Reply code (or `none`) to count.
    pub codes: BTreeMap<String, u64>,
    pub last_updated: DateTime<Utc>,
}

impl ProviderMetric {
    fn new(provider: &str) -> Self {
        Self {
            provider: provider.to_string(),
            probes: 0,
            valid: 0,
            invalid: 0,
            codes: BTreeMap::new(),
            last_updated: Utc::now(),
        }
    }
}

/// Increments to add to a provider's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsDelta {
    pub probes: u64,
    pub valid: u64,
    pub invalid: u64,
    pub codes: BTreeMap<String, u64>,
}

impl MetricsDelta {
    /// The delta for one completed probe.
    pub fn for_probe(result: &ProbeResult) -> Self {
        let code = result
            .code
            .map(|c| c.to_string())
            .unwrap_or_else(|| NO_CODE.to_string());
        Self {
            probes: 1,
            valid: u64::from(result.status == ProbeStatus::Valid),
            invalid: u64::from(result.status == ProbeStatus::Invalid),
            codes: BTreeMap::from([(code, 1)]),
        }
    }
}

/// Storage for provider metrics. `merge` is additive and never overwrites.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    async fn merge(&self, provider: &str, delta: &MetricsDelta);

    /// All rows, ordered by provider.
    async fn snapshot(&self) -> Vec<ProviderMetric>;
}

#[derive(Debug, Default)]
pub struct InMemoryMetricsStore {
    rows: RwLock<HashMap<String, ProviderMetric>>,
}

impl InMemoryMetricsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetricsStore for InMemoryMetricsStore {
    async fn merge(&self, provider: &str, delta: &MetricsDelta) {
        let mut rows = self.rows.write();
        let row = rows
            .entry(provider.to_string())
            .or_insert_with(|| ProviderMetric::new(provider));
        row.probes += delta.probes;
        row.valid += delta.valid;
        row.invalid += delta.invalid;
        for (code, count) in &delta.codes {
            *row.codes.entry(code.clone()).or_insert(0) += count;
        }
        row.last_updated = Utc::now();
    }

    async fn snapshot(&self) -> Vec<ProviderMetric> {
        let mut rows: Vec<ProviderMetric> = self.rows.read().values().cloned().collect();
        rows.sort_by(|a, b| a.provider.cmp(&b.provider));
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(status: ProbeStatus, code: Option<u16>) -> ProbeResult {
        ProbeResult {
            status,
            details: String::new(),
            code,
            mx_host: None,
            attempts: Vec::new(),
        }
    }

    #[test]
    fn test_delta_for_probe() {
        let delta = MetricsDelta::for_probe(&probe(ProbeStatus::Valid, Some(250)));
        assert_eq!(delta.probes, 1);
        assert_eq!(delta.valid, 1);
        assert_eq!(delta.invalid, 0);
        assert_eq!(delta.codes.get("250"), Some(&1));

        let unknown = MetricsDelta::for_probe(&probe(ProbeStatus::Unknown, None));
        assert_eq!(unknown.valid + unknown.invalid, 0);
        assert_eq!(unknown.codes.get("none"), Some(&1));
    }

    #[tokio::test]
    async fn test_merge_is_additive() {
        let store = InMemoryMetricsStore::new();
        store
            .merge("Google Workspace", &MetricsDelta::for_probe(&probe(ProbeStatus::Valid, Some(250))))
            .await;
        store
            .merge("Google Workspace", &MetricsDelta::for_probe(&probe(ProbeStatus::Invalid, Some(550))))
            .await;
        store
            .merge("Google Workspace", &MetricsDelta::for_probe(&probe(ProbeStatus::Invalid, Some(550))))
            .await;
        store
            .merge(NO_MX_PROVIDER, &MetricsDelta::for_probe(&probe(ProbeStatus::Unknown, None)))
            .await;

        let rows = store.snapshot().await;
        assert_eq!(rows.len(), 2);
        let google = &rows[0];
        assert_eq!(google.provider, "Google Workspace");
        assert_eq!((google.probes, google.valid, google.invalid), (3, 1, 2));
        assert_eq!(google.codes.get("550"), Some(&2));
        assert_eq!(rows[1].provider, NO_MX_PROVIDER);
    }

    #[tokio::test]
    async fn test_snapshot_serializes_codes_as_object() {
        let store = InMemoryMetricsStore::new();
        store
            .merge("Zoho", &MetricsDelta::for_probe(&probe(ProbeStatus::Valid, Some(250))))
            .await;
        let rows = store.snapshot().await;
        let json = serde_json::to_value(&rows[0]).unwrap();
        assert_eq!(json["codes"]["250"], 1);
        assert_eq!(json["probes"], 1);
    }
}
