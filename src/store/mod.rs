//! Shared state touched by concurrent workers: locks and provider metrics.

pub mod locks;
pub mod metrics;

pub use locks::{InMemoryLockStore, LockGuard, LockManager, LockRecord, LockStore, REPROBE_GLOBAL_LOCK};
pub use metrics::{InMemoryMetricsStore, MetricsDelta, MetricsStore, ProviderMetric, NO_MX_PROVIDER};
