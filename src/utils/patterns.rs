//! Generates candidate email addresses from names, discovered usernames and role accounts.

use crate::core::config::Config;
use crate::core::models::EmailCandidate;
use std::collections::HashSet;

pub const ROLE_PATTERN: &str = "role";
pub const USERNAME_PATTERN: &str = "username";
pub const USERNAME_SPLIT_PATTERN: &str = "username_split";

/// Hypotheses produced per discovered username.
const MAX_HYPOTHESES_PER_USERNAME: usize = 3;

/// Lowercases a name and keeps only ASCII letters and digits.
pub(crate) fn sanitize_name_part(part: &str) -> String {
    part.trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

/// Restricts a local part to `[a-z0-9._-]`, collapses repeated dots and trims
/// dots from both ends.
pub(crate) fn normalize_local_part(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.trim().to_lowercase().chars() {
        if !(c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-')) {
            continue;
        }
        if c == '.' && out.ends_with('.') {
            continue;
        }
        out.push(c);
    }
    out.trim_matches('.').to_string()
}

/// Local parts for a person, in template order, labelled by template name.
/// Templates that need a missing name part are skipped.
fn name_templates(first: &str, last: &str) -> Vec<(String, &'static str)> {
    let f = first.chars().next().map(String::from).unwrap_or_default();
    let l = last.chars().next().map(String::from).unwrap_or_default();

    if first.is_empty() || last.is_empty() {
        let mut bare = Vec::new();
        if !first.is_empty() {
            bare.push((first.to_string(), "first"));
        }
        if !last.is_empty() {
            bare.push((last.to_string(), "last"));
        }
        return bare;
    }

    vec![
        (format!("{first}.{last}"), "first.last"),
        (format!("{first}{last}"), "firstlast"),
        (format!("{f}.{last}"), "f.last"),
        (format!("{first}.{l}"), "first.l"),
        (format!("{f}{last}"), "flast"),
        (format!("{first}{l}"), "firstl"),
        (format!("{last}.{first}"), "last.first"),
        (format!("{l}.{first}"), "l.first"),
        (first.to_string(), "first"),
        (last.to_string(), "last"),
        (format!("{first}_{last}"), "first_last"),
        (format!("{first}-{last}"), "first-last"),
        (format!("{f}_{last}"), "f_last"),
        (format!("{f}-{last}"), "f-last"),
        (format!("{last}{first}"), "lastfirst"),
        (format!("{last}_{first}"), "last_first"),
    ]
}

/// Local parts derived from discovered usernames: the username itself, and when it
/// splits on `.`, `_` or `-`, the dotted and concatenated first/last forms.
pub(crate) fn hypothesize_from_usernames(usernames: &[String]) -> Vec<(String, &'static str)> {
    let mut out = Vec::new();
    for username in usernames {
        let base = normalize_local_part(username);
        if base.is_empty() {
            continue;
        }
        let mut hypotheses = vec![(base.clone(), USERNAME_PATTERN)];
        let parts: Vec<&str> = base
            .split(['.', '_', '-'])
            .filter(|p| !p.is_empty())
            .collect();
        if parts.len() >= 2 {
            let (head, tail) = (parts[0], parts[parts.len() - 1]);
            hypotheses.push((format!("{head}.{tail}"), USERNAME_SPLIT_PATTERN));
            hypotheses.push((format!("{head}{tail}"), USERNAME_SPLIT_PATTERN));
        }
        hypotheses.truncate(MAX_HYPOTHESES_PER_USERNAME);
        out.extend(hypotheses);
    }
    out
}

/// Generates the ordered, deduplicated candidate list for one person.
///
/// Order: name templates, username-derived hypotheses, then the configured role
/// accounts. Addresses failing `config.email_regex` are dropped, so an unusable
/// domain yields an empty list.
pub(crate) fn generate_candidates(
    config: &Config,
    first_name: &str,
    last_name: &str,
    domain: &str,
    usernames: &[String],
) -> Vec<EmailCandidate> {
    tracing::debug!(
        "Generating candidates for '{} {}' @ '{}' ({} usernames)",
        first_name,
        last_name,
        domain,
        usernames.len()
    );

    let first = sanitize_name_part(first_name);
    let last = sanitize_name_part(last_name);
    if first.is_empty() && last.is_empty() {
        tracing::warn!(
            "Sanitized name parts are empty (original: '{} {}'); only role accounts will be generated",
            first_name,
            last_name
        );
    }

    let roles = config
        .role_accounts
        .iter()
        .map(|r| (r.clone(), ROLE_PATTERN));

    let mut seen = HashSet::new();
    let candidates: Vec<EmailCandidate> = name_templates(&first, &last)
        .into_iter()
        .chain(hypothesize_from_usernames(usernames))
        .chain(roles)
        .filter_map(|(raw, pattern)| {
            let local = normalize_local_part(&raw);
            if local.is_empty() {
                return None;
            }
            let email = format!("{}@{}", local, domain);
            if !config.email_regex.is_match(&email) {
                tracing::trace!("Generated candidate failed regex validation: {}", email);
                return None;
            }
            seen.insert(email.clone())
                .then(|| EmailCandidate::new(email, pattern))
        })
        .collect();

    tracing::debug!(
        "Generated {} unique candidates for '{} {}' @ '{}'",
        candidates.len(),
        first_name,
        last_name,
        domain
    );
    candidates
}
