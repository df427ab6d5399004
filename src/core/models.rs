//! Data structures shared by the resolver, generator, verifier and acceptance stages.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single MX record. Lower `preference` means higher priority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MxRecord {
    pub preference: u16,
    pub host: String,
}

impl MxRecord {
    pub fn new(preference: u16, host: impl Into<String>) -> Self {
        Self {
            preference,
            host: host.into(),
        }
    }
}

/// SPF information derived from a domain's TXT records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpfInfo {
    pub has_spf: bool,
    pub includes: Vec<String>,
}

/// The DNS records gathered for one domain.
///
/// Every list may be empty: a failed lookup yields an empty list rather than an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsFootprint {
    pub domain: String,
    pub a: Vec<String>,
    pub aaaa: Vec<String>,
    /// Sorted by ascending preference.
    pub mx: Vec<MxRecord>,
    pub txt: Vec<String>,
    pub ns: Vec<String>,
    pub spf: SpfInfo,
}

impl DnsFootprint {
    /// A footprint with no records at all.
    pub fn empty(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            ..Default::default()
        }
    }

    pub fn has_mx(&self) -> bool {
        !self.mx.is_empty()
    }

    /// MX hostnames in priority order.
    pub fn mx_hosts(&self) -> Vec<String> {
        self.mx.iter().map(|m| m.host.clone()).collect()
    }
}

/// Verification state of a candidate, from generation through SMTP probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    #[default]
    Unverified,
    MxPresentUnverified,
    NoMx,
    CatchAll,
    ValidatedSmtp,
    InvalidSmtp,
    UnknownSmtp,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Unverified => "unverified",
            VerificationStatus::MxPresentUnverified => "mx_present_unverified",
            VerificationStatus::NoMx => "no_mx",
            VerificationStatus::CatchAll => "catch_all",
            VerificationStatus::ValidatedSmtp => "validated_smtp",
            VerificationStatus::InvalidSmtp => "invalid_smtp",
            VerificationStatus::UnknownSmtp => "unknown_smtp",
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal classification assigned by the acceptance rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalStatus {
    Validated,
    HighConfidence,
    Purged,
    Unaccepted,
}

impl FinalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinalStatus::Validated => "validated",
            FinalStatus::HighConfidence => "high_confidence",
            FinalStatus::Purged => "purged",
            FinalStatus::Unaccepted => "unaccepted",
        }
    }
}

impl fmt::Display for FinalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signals gathered about a candidate's domain and verification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceSignals {
    pub spf_includes: Vec<String>,
    pub mx_hosts: Vec<MxRecord>,
    /// Provider inferred from the primary MX host.
    pub provider: Option<String>,
    pub username_hits: Vec<String>,
    pub is_catch_all: bool,
    pub smtp_details: Option<String>,
    pub smtp_code: Option<u16>,
}

/// A mailbox hypothesis for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailCandidate {
    pub email: String,
    /// Template that produced the local part, e.g. `first.last`, `role`, `username`.
    pub pattern: String,
    pub heuristic_score: f64,
    pub external_score: Option<f64>,
    pub blended_score: f64,
    pub verification_status: VerificationStatus,
    pub source_signals: SourceSignals,
    pub accepted: bool,
    pub final_status: Option<FinalStatus>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub probe_attempts: Vec<ProbeAttempt>,
}

impl EmailCandidate {
    pub fn new(email: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            pattern: pattern.into(),
            heuristic_score: 0.0,
            external_score: None,
            blended_score: 0.0,
            verification_status: VerificationStatus::Unverified,
            source_signals: SourceSignals::default(),
            accepted: false,
            final_status: None,
            probe_attempts: Vec::new(),
        }
    }
}

/// Outcome of a full probe across MX hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    Valid,
    Invalid,
    Unknown,
}

/// How a single RCPT attempt was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptClass {
    /// 2xx reply to RCPT.
    Accepted,
    /// 4xx reply to RCPT.
    Temporary,
    /// 5xx reply to RCPT.
    Permanent,
    /// The MX host did not resolve to an address.
    Unreachable,
    /// Timeout, refused connection or a session-level rejection before RCPT.
    ConnectionFailed,
}

/// One RCPT attempt against one MX host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeAttempt {
    pub email: String,
    pub mx_host: String,
    pub attempt_number: u32,
    pub smtp_code: Option<u16>,
    pub classification: AttemptClass,
}

/// Result of probing one address against a domain's MX hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub status: ProbeStatus,
    pub details: String,
    pub code: Option<u16>,
    /// Host that produced the deciding reply, if any.
    pub mx_host: Option<String>,
    pub attempts: Vec<ProbeAttempt>,
}

impl ProbeResult {
    pub fn unknown(details: impl Into<String>, attempts: Vec<ProbeAttempt>) -> Self {
        Self {
            status: ProbeStatus::Unknown,
            details: details.into(),
            code: None,
            mx_host: None,
            attempts,
        }
    }
}

/// Identifier of a verification subject, used as the entity lock key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for EntityId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl From<u64> for EntityId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Caller input for one verification subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyRequest {
    pub first_name: String,
    pub last_name: String,
    /// Domain, website URL, email address or bare company name.
    pub domain: String,
    #[serde(default)]
    pub entity_id: Option<EntityId>,
}

impl VerifyRequest {
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            domain: domain.into(),
            entity_id: None,
        }
    }

    pub fn with_entity_id(mut self, entity_id: impl Into<EntityId>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }
}

/// Outcome of verifying one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityResult {
    pub request: VerifyRequest,
    /// Normalized hostname derived from the request.
    pub domain: String,
    pub footprint: DnsFootprint,
    pub is_catch_all: bool,
    /// Candidates in descending score order.
    pub candidates: Vec<EmailCandidate>,
    /// Set when another worker held the entity lock.
    pub skipped: bool,
    pub skip_reason: Option<String>,
}

impl EntityResult {
    /// A result with no candidates, for input that was not processed.
    pub(crate) fn skipped(request: VerifyRequest, domain: String, reason: String) -> Self {
        Self {
            request,
            footprint: DnsFootprint::empty(domain.as_str()),
            domain,
            is_catch_all: false,
            candidates: Vec::new(),
            skipped: true,
            skip_reason: Some(reason),
        }
    }

    pub fn accepted(&self) -> impl Iterator<Item = &EmailCandidate> {
        self.candidates.iter().filter(|c| c.accepted)
    }

    pub fn best(&self) -> Option<&EmailCandidate> {
        self.accepted().next()
    }
}
