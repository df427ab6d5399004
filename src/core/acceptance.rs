//! Terminal acceptance rules for scored, possibly probed candidates.

use crate::core::models::{EmailCandidate, FinalStatus, VerificationStatus};

/// Thresholds for [`apply_acceptance`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcceptanceThresholds {
    pub mx_high_conf: f64,
    pub purge_no_mx_below: f64,
}

/// Decides `(accepted, final_status)` for one candidate.
///
/// Rules, first match wins:
/// 1. SMTP-validated: accepted, `validated`.
/// 2. MX present, domain not catch-all, not rejected over SMTP, score at or above
///    `mx_high_conf`: accepted, `high_confidence`.
/// 3. No MX and score below `purge_no_mx_below`: `purged`.
/// 4. Otherwise `unaccepted`.
pub fn decide(
    status: VerificationStatus,
    score: f64,
    has_mx: bool,
    is_catch_all: bool,
    thresholds: &AcceptanceThresholds,
) -> (bool, FinalStatus) {
    if status == VerificationStatus::ValidatedSmtp {
        return (true, FinalStatus::Validated);
    }
    if has_mx
        && !is_catch_all
        && status != VerificationStatus::InvalidSmtp
        && score >= thresholds.mx_high_conf
    {
        return (true, FinalStatus::HighConfidence);
    }
    if !has_mx && score < thresholds.purge_no_mx_below {
        return (false, FinalStatus::Purged);
    }
    (false, FinalStatus::Unaccepted)
}

/// Applies [`decide`] to a candidate in place, using its blended score.
pub fn apply_acceptance(
    candidate: &mut EmailCandidate,
    has_mx: bool,
    is_catch_all: bool,
    thresholds: &AcceptanceThresholds,
) {
    let (accepted, final_status) = decide(
        candidate.verification_status,
        candidate.blended_score,
        has_mx,
        is_catch_all,
        thresholds,
    );
    tracing::trace!(target: "engine_task",
        "{} [{} / {:.3}] -> {}", candidate.email, candidate.verification_status, candidate.blended_score, final_status);
    candidate.accepted = accepted;
    candidate.final_status = Some(final_status);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{DEFAULT_MX_HIGH_CONF, DEFAULT_PURGE_NO_MX_BELOW};
    use VerificationStatus::*;

    const T: AcceptanceThresholds = AcceptanceThresholds {
        mx_high_conf: DEFAULT_MX_HIGH_CONF,
        purge_no_mx_below: DEFAULT_PURGE_NO_MX_BELOW,
    };

    #[test]
    fn test_validated_is_always_accepted() {
        for (has_mx, catch_all, score) in [(true, false, 0.0), (true, true, 0.1), (false, false, 0.0)] {
            assert_eq!(
                decide(ValidatedSmtp, score, has_mx, catch_all, &T),
                (true, FinalStatus::Validated)
            );
        }
    }

    #[test]
    fn test_high_confidence_requires_mx_and_no_catch_all() {
        assert_eq!(
            decide(MxPresentUnverified, 0.8, true, false, &T),
            (true, FinalStatus::HighConfidence)
        );
        assert_eq!(decide(UnknownSmtp, 0.75, true, false, &T), (true, FinalStatus::HighConfidence));
        assert_eq!(decide(CatchAll, 0.8, true, true, &T), (false, FinalStatus::Unaccepted));
        assert_eq!(decide(MxPresentUnverified, 0.74, true, false, &T), (false, FinalStatus::Unaccepted));
    }

    #[test]
    fn test_smtp_rejection_is_never_high_confidence() {
        assert_eq!(decide(InvalidSmtp, 0.8, true, false, &T), (false, FinalStatus::Unaccepted));
    }

    #[test]
    fn test_no_mx_purges_low_scores() {
        assert_eq!(decide(NoMx, 0.52, false, false, &T), (false, FinalStatus::Purged));
        assert_eq!(decide(NoMx, 0.8, false, false, &T), (false, FinalStatus::Unaccepted));
        assert_eq!(decide(NoMx, 0.6, false, false, &T), (false, FinalStatus::Unaccepted));
    }

    #[test]
    fn test_apply_acceptance_uses_blended_score() {
        let mut candidate = EmailCandidate::new("alice.smith@example.com", "first.last");
        candidate.heuristic_score = 0.8;
        candidate.blended_score = 0.5;
        candidate.verification_status = MxPresentUnverified;
        apply_acceptance(&mut candidate, true, false, &T);
        assert!(!candidate.accepted);
        assert_eq!(candidate.final_status, Some(FinalStatus::Unaccepted));
    }
}
