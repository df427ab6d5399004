//! DNS footprint resolution (A, AAAA, MX, TXT, NS) and SPF parsing.
//!
//! The resolver never fails: each record type that cannot be looked up
//! (NXDOMAIN, no answer, timeout, no backend) simply comes back empty.

use crate::core::config::Config;
use crate::core::error::Result;
use crate::core::models::{DnsFootprint, MxRecord, SpfInfo};
use crate::utils::domain::is_valid_hostname;

use async_trait::async_trait;
use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use trust_dns_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use trust_dns_resolver::TokioAsyncResolver;

/// A source of raw DNS answers.
///
/// Implementations may return errors freely; [`FootprintResolver`] turns every
/// error into an empty answer.
#[async_trait]
pub trait DnsBackend: Send + Sync {
    fn name(&self) -> &'static str;
    async fn lookup_a(&self, domain: &str) -> Result<Vec<String>>;
    async fn lookup_aaaa(&self, domain: &str) -> Result<Vec<String>>;
    async fn lookup_mx(&self, domain: &str) -> Result<Vec<MxRecord>>;
    async fn lookup_txt(&self, domain: &str) -> Result<Vec<String>>;
    async fn lookup_ns(&self, domain: &str) -> Result<Vec<String>>;
}

/// Backend for hosts without usable DNS: every lookup answers with nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDnsBackend;

#[async_trait]
impl DnsBackend for NoopDnsBackend {
    fn name(&self) -> &'static str {
        "noop"
    }
    async fn lookup_a(&self, _domain: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
    async fn lookup_aaaa(&self, _domain: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
    async fn lookup_mx(&self, _domain: &str) -> Result<Vec<MxRecord>> {
        Ok(Vec::new())
    }
    async fn lookup_txt(&self, _domain: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
    async fn lookup_ns(&self, _domain: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Backend using `trust-dns-resolver` over the network.
pub struct TrustDnsBackend {
    resolver: TokioAsyncResolver,
}

impl TrustDnsBackend {
    /// Builds a resolver from the configured servers, or from the system
    /// configuration when no servers are set.
    pub fn from_config(config: &Config) -> Result<Self> {
        let (resolver_config, mut opts) = if config.dns_servers.is_empty() {
            trust_dns_resolver::system_conf::read_system_conf()?
        } else {
            let ips: Vec<IpAddr> = config
                .dns_servers
                .iter()
                .filter_map(|s| s.parse().ok())
                .collect();
            tracing::debug!(target: "dns_task", "Using configured DNS servers: {:?}", ips);
            let group = NameServerConfigGroup::from_ips_clear(&ips, 53, true);
            (
                ResolverConfig::from_parts(None, vec![], group),
                ResolverOpts::default(),
            )
        };
        opts.timeout = config.dns_timeout;
        opts.attempts = 2;

        Ok(Self {
            resolver: TokioAsyncResolver::tokio(resolver_config, opts),
        })
    }
}

fn fqdn(domain: &str) -> String {
    format!("{}.", domain.trim_end_matches('.'))
}

fn strip_root(name: &str) -> String {
    name.trim_end_matches('.').to_lowercase()
}

#[async_trait]
impl DnsBackend for TrustDnsBackend {
    fn name(&self) -> &'static str {
        "trust-dns"
    }

    async fn lookup_a(&self, domain: &str) -> Result<Vec<String>> {
        let answers = self.resolver.ipv4_lookup(fqdn(domain)).await?;
        Ok(answers.iter().map(|a| a.to_string()).collect())
    }

    async fn lookup_aaaa(&self, domain: &str) -> Result<Vec<String>> {
        let answers = self.resolver.ipv6_lookup(fqdn(domain)).await?;
        Ok(answers.iter().map(|a| a.to_string()).collect())
    }

    async fn lookup_mx(&self, domain: &str) -> Result<Vec<MxRecord>> {
        let answers = self.resolver.mx_lookup(fqdn(domain)).await?;
        Ok(answers
            .iter()
            .map(|mx| MxRecord::new(mx.preference(), strip_root(&mx.exchange().to_utf8())))
            .collect())
    }

    async fn lookup_txt(&self, domain: &str) -> Result<Vec<String>> {
        let answers = self.resolver.txt_lookup(fqdn(domain)).await?;
        Ok(answers
            .iter()
            .map(|txt| {
                txt.txt_data()
                    .iter()
                    .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
                    .collect::<String>()
            })
            .collect())
    }

    async fn lookup_ns(&self, domain: &str) -> Result<Vec<String>> {
        let answers = self.resolver.ns_lookup(fqdn(domain)).await?;
        Ok(answers.iter().map(|ns| strip_root(&ns.to_string())).collect())
    }
}

/// Builds [`DnsFootprint`]s on top of a [`DnsBackend`].
#[derive(Clone)]
pub struct FootprintResolver {
    backend: Arc<dyn DnsBackend>,
}

impl FootprintResolver {
    pub fn new(backend: Arc<dyn DnsBackend>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Resolves every record type for `domain`; each lookup is bounded by `timeout`.
    pub async fn resolve(&self, domain: &str, timeout: Duration) -> DnsFootprint {
        let domain = domain.trim().trim_end_matches('.').to_lowercase();
        if !is_valid_hostname(&domain) {
            tracing::warn!(target: "dns_task", "Skipping DNS lookups for invalid hostname '{}'", domain);
            return DnsFootprint::empty(domain);
        }
        tracing::debug!(target: "dns_task", "Resolving DNS footprint for {} via {}", domain, self.backend.name());

        let backend = &self.backend;
        let (a, aaaa, mx, txt, ns) = tokio::join!(
            bounded("A", &domain, timeout, backend.lookup_a(&domain)),
            bounded("AAAA", &domain, timeout, backend.lookup_aaaa(&domain)),
            bounded("MX", &domain, timeout, backend.lookup_mx(&domain)),
            bounded("TXT", &domain, timeout, backend.lookup_txt(&domain)),
            bounded("NS", &domain, timeout, backend.lookup_ns(&domain)),
        );

        let mx = usable_mx(mx);
        let spf = parse_spf(&txt);
        tracing::info!(target: "dns_task",
            "DNS footprint for {}: A={}, AAAA={}, MX={}, TXT={}, NS={}, SPF includes={}",
            domain, a.len(), aaaa.len(), mx.len(), txt.len(), ns.len(), spf.includes.len()
        );

        DnsFootprint {
            domain,
            a,
            aaaa,
            mx,
            txt,
            ns,
            spf,
        }
    }
}

async fn bounded<T, F>(kind: &str, domain: &str, timeout: Duration, lookup: F) -> Vec<T>
where
    F: Future<Output = Result<Vec<T>>>,
{
    match tokio::time::timeout(timeout, lookup).await {
        Ok(Ok(records)) => records,
        Ok(Err(e)) => {
            tracing::debug!(target: "dns_task", "{} lookup for {} returned nothing: {}", kind, domain, e);
            Vec::new()
        }
        Err(_) => {
            tracing::warn!(target: "dns_task", "{} lookup for {} timed out after {:?}", kind, domain, timeout);
            Vec::new()
        }
    }
}

/// Normalizes MX hosts, drops ones that fail hostname validation (including the
/// RFC 7505 null MX), and sorts by ascending preference.
fn usable_mx(records: Vec<MxRecord>) -> Vec<MxRecord> {
    let mut mx: Vec<MxRecord> = records
        .into_iter()
        .map(|m| MxRecord::new(m.preference, strip_root(&m.host)))
        .filter(|m| {
            let ok = is_valid_hostname(&m.host);
            if !ok {
                tracing::debug!(target: "dns_task", "Dropping unusable MX host '{}'", m.host);
            }
            ok
        })
        .collect();
    mx.sort_by_key(|m| m.preference);
    mx
}

/// Scans TXT records case-insensitively for `v=spf1` and collects `include:` targets.
pub fn parse_spf(txt_records: &[String]) -> SpfInfo {
    let mut info = SpfInfo::default();
    for record in txt_records {
        let lower = record.to_lowercase();
        if !lower.contains("v=spf1") {
            continue;
        }
        info.has_spf = true;
        info.includes.extend(
            lower
                .split_whitespace()
                .filter_map(|token| token.strip_prefix("include:"))
                .filter(|target| !target.is_empty())
                .map(str::to_string),
        );
    }
    info
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::AppError;

    struct ScriptedBackend;

    #[async_trait]
    impl DnsBackend for ScriptedBackend {
        fn name(&self) -> &'static str {
            "scripted"
        }
        async fn lookup_a(&self, _domain: &str) -> Result<Vec<String>> {
            Err(AppError::Initialization("simulated NXDOMAIN".into()))
        }
        async fn lookup_aaaa(&self, _domain: &str) -> Result<Vec<String>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(vec!["::1".into()])
        }
        async fn lookup_mx(&self, _domain: &str) -> Result<Vec<MxRecord>> {
            Ok(vec![
                MxRecord::new(20, "ALT1.ASPMX.L.GOOGLE.COM."),
                MxRecord::new(5, "aspmx.l.google.com."),
                MxRecord::new(0, "."),
                MxRecord::new(10, "bad_host.example.com"),
            ])
        }
        async fn lookup_txt(&self, _domain: &str) -> Result<Vec<String>> {
            Ok(vec![
                "google-site-verification=abc".into(),
                "V=SPF1 include:_spf.google.com INCLUDE:sendgrid.net ~all".into(),
            ])
        }
        async fn lookup_ns(&self, _domain: &str) -> Result<Vec<String>> {
            Ok(vec!["ns1.example.com".into()])
        }
    }

    #[tokio::test]
    async fn test_resolve_tolerates_failures_and_sorts_mx() {
        let resolver = FootprintResolver::new(Arc::new(ScriptedBackend));
        let footprint = resolver
            .resolve("Example.com", Duration::from_millis(50))
            .await;

        assert_eq!(footprint.domain, "example.com");
        assert!(footprint.a.is_empty());
        assert!(footprint.aaaa.is_empty());
        assert_eq!(
            footprint.mx,
            vec![
                MxRecord::new(5, "aspmx.l.google.com"),
                MxRecord::new(20, "alt1.aspmx.l.google.com"),
            ]
        );
        assert_eq!(footprint.ns, vec!["ns1.example.com".to_string()]);
        assert!(footprint.spf.has_spf);
        assert_eq!(
            footprint.spf.includes,
            vec!["_spf.google.com".to_string(), "sendgrid.net".to_string()]
        );
    }

    #[tokio::test]
    async fn test_noop_backend_yields_empty_footprint() {
        let resolver = FootprintResolver::new(Arc::new(NoopDnsBackend));
        let footprint = resolver.resolve("example.com", Duration::from_secs(1)).await;
        assert_eq!(footprint, DnsFootprint::empty("example.com"));
        assert!(!footprint.has_mx());
    }

    #[tokio::test]
    async fn test_invalid_hostname_skips_lookups() {
        let resolver = FootprintResolver::new(Arc::new(ScriptedBackend));
        let footprint = resolver.resolve("not a host", Duration::from_secs(1)).await;
        assert!(footprint.mx.is_empty());
        assert!(footprint.txt.is_empty());
    }

    #[test]
    fn test_parse_spf() {
        let none = parse_spf(&["hello world".to_string()]);
        assert!(!none.has_spf);
        assert!(none.includes.is_empty());

        let bare = parse_spf(&["v=spf1 -all".to_string()]);
        assert!(bare.has_spf);
        assert!(bare.includes.is_empty());

        // include: tokens outside an SPF record are ignored
        let stray = parse_spf(&["include:foo.com".to_string()]);
        assert!(!stray.has_spf);
        assert!(stray.includes.is_empty());
    }
}
