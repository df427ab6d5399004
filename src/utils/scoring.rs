//! Network-independent confidence scoring for candidate addresses.

use crate::utils::provider::is_large_provider_family;

const PERSON_DOTTED_BOOST: f64 = 0.8;
const LETTERS_ONLY_BOOST: f64 = 0.5;
const ROLE_ACCOUNT_BOOST: f64 = 0.02;
const LARGE_PROVIDER_BOOST: f64 = 0.05;
const USERNAME_HIT_BOOST: f64 = 0.35;
const SPF_INCLUDE_BOOST: f64 = 0.02;

fn is_letters(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_lowercase())
}

/// `^[a-z]+\.[a-z]+$`
fn is_person_dotted(local: &str) -> bool {
    local
        .split_once('.')
        .is_some_and(|(a, b)| is_letters(a) && is_letters(b))
}

/// Signals that feed the heuristic score.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreSignals<'a> {
    /// Inferred provider label or other provider hint.
    pub provider: Option<&'a str>,
    pub spf_includes: &'a [String],
    pub username_hits: &'a [String],
    pub role_accounts: &'a [String],
}

fn strip_separators(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, '.' | '_' | '-'))
        .collect::<String>()
        .to_lowercase()
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Additive heuristic score for `email`, clamped to [0, 1] and rounded to 3 decimals.
/// Deterministic for identical inputs.
pub fn heuristic_score(email: &str, signals: &ScoreSignals<'_>) -> f64 {
    let local = email.split('@').next().unwrap_or("").to_lowercase();
    let mut score = 0.0;

    if is_person_dotted(&local) {
        score += PERSON_DOTTED_BOOST;
    } else if is_letters(&local) {
        score += LETTERS_ONLY_BOOST;
    }
    if signals.role_accounts.iter().any(|r| r.eq_ignore_ascii_case(&local)) {
        score += ROLE_ACCOUNT_BOOST;
    }
    if signals.provider.is_some_and(is_large_provider_family) {
        score += LARGE_PROVIDER_BOOST;
    }

    let bare_local = strip_separators(&local);
    let hits = signals
        .username_hits
        .iter()
        .filter(|u| !u.is_empty() && strip_separators(u) == bare_local)
        .count();
    score += USERNAME_HIT_BOOST * hits as f64;
    score += SPF_INCLUDE_BOOST * signals.spf_includes.len() as f64;

    round3(score.clamp(0.0, 1.0))
}

/// Blends a heuristic score with an external one: `(1 - w) * heuristic + w * external`.
///
/// Returns the heuristic unchanged when no external score is given or the weight is
/// outside `(0, 1]`.
pub fn blend(heuristic: f64, external: Option<f64>, weight: f64) -> f64 {
    match external {
        Some(ext) if weight > 0.0 && weight <= 1.0 && ext.is_finite() => {
            round3(((1.0 - weight) * heuristic + weight * ext).clamp(0.0, 1.0))
        }
        _ => heuristic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::DEFAULT_ROLE_ACCOUNTS;

    fn roles() -> Vec<String> {
        DEFAULT_ROLE_ACCOUNTS.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_heuristic_rules() {
        let roles = roles();
        let signals = ScoreSignals {
            role_accounts: &roles,
            ..Default::default()
        };
        assert_eq!(heuristic_score("alice.smith@example.com", &signals), 0.8);
        assert_eq!(heuristic_score("alicesmith@example.com", &signals), 0.5);
        assert_eq!(heuristic_score("info@example.com", &signals), 0.52);
        assert_eq!(heuristic_score("a.smith1@example.com", &signals), 0.0);
        assert_eq!(heuristic_score("alice_smith@example.com", &signals), 0.0);
    }

    #[test]
    fn test_signal_boosts_and_clamp() {
        let roles = roles();
        let spf = vec!["_spf.google.com".to_string(), "sendgrid.net".to_string()];
        let hits = vec!["alice-smith".to_string()];
        let signals = ScoreSignals {
            provider: Some("Google Workspace"),
            spf_includes: &spf,
            username_hits: &hits,
            role_accounts: &roles,
        };
        // 0.5 + 0.05 + 0.35 + 0.04
        assert_eq!(heuristic_score("alicesmith@example.com", &signals), 0.94);
        // 0.8 + 0.05 + 0.35 + 0.04 clamps
        assert_eq!(heuristic_score("alice.smith@example.com", &signals), 1.0);
    }

    #[test]
    fn test_score_is_deterministic_and_bounded() {
        let roles = roles();
        let signals = ScoreSignals {
            role_accounts: &roles,
            ..Default::default()
        };
        for email in ["x@y.com", "first.last@y.com", "123@y.com", "support@y.com"] {
            let a = heuristic_score(email, &signals);
            assert_eq!(a, heuristic_score(email, &signals));
            assert!((0.0..=1.0).contains(&a));
        }
    }

    #[test]
    fn test_blend() {
        assert_eq!(blend(0.8, Some(0.2), 0.5), 0.5);
        assert_eq!(blend(0.8, None, 0.5), 0.8);
        assert_eq!(blend(0.8, Some(0.2), 0.0), 0.8);
        assert_eq!(blend(0.8, Some(0.2), 1.5), 0.8);
        assert_eq!(blend(0.8, Some(3.0), 1.0), 1.0);
        assert_eq!(blend(0.6, Some(0.9), 0.25), 0.675);
    }
}
