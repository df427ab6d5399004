//! Utility functions for turning raw input into hostnames and validating them.

use url::Url;

const MAX_HOSTNAME_LEN: usize = 255;
const MAX_LABEL_LEN: usize = 63;

/// Turns a raw string (URL, bare domain, email address or company-name fragment)
/// into a canonical lowercase hostname.
///
/// - An email address yields its right-hand side.
/// - Scheme, path, query and port are stripped.
/// - A leading `www.` is removed.
/// - Spaces become hyphens.
/// - A string without a dot gets `.com` appended.
///
/// Never fails. The result may still be an invalid hostname; run
/// [`is_valid_hostname`] before using it for network calls.
pub fn normalize_domain(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let lowered = trimmed.to_lowercase();
    let without_mailbox = match lowered.rsplit_once('@') {
        Some((_, rhs)) if !lowered.starts_with("http") => rhs.to_string(),
        _ => lowered,
    };

    let host = if without_mailbox.contains("://") {
        match Url::parse(&without_mailbox) {
            Ok(url) => url.host_str().unwrap_or("").to_string(),
            Err(e) => {
                tracing::debug!(
                    "Failed to parse '{}' as URL ({}), falling back to manual split.",
                    without_mailbox,
                    e
                );
                let after_scheme = without_mailbox
                    .split_once("://")
                    .map(|(_, rest)| rest)
                    .unwrap_or(&without_mailbox);
                strip_path(after_scheme).to_string()
            }
        }
    } else {
        strip_path(&without_mailbox).to_string()
    };

    let host = host.split(':').next().unwrap_or("").trim();
    let host = host.strip_prefix("www.").unwrap_or(host);
    let mut host = host.replace(' ', "-");

    if host.is_empty() {
        return host;
    }
    if !host.contains('.') {
        host.push_str(".com");
    }
    tracing::trace!("Normalized '{}' to '{}'", raw, host);
    host
}

fn strip_path(s: &str) -> &str {
    s.split(['/', '?', '#']).next().unwrap_or("")
}

/// Checks hostname syntax before any network call is made.
///
/// Rules: overall length 1..=255 (ignoring one trailing dot), at least one dot,
/// characters limited to `[A-Za-z0-9.-]`, every label 1..=63 characters and not
/// starting or ending with a hyphen.
pub fn is_valid_hostname(hostname: &str) -> bool {
    let hn = hostname.trim();
    let hn = hn.strip_suffix('.').unwrap_or(hn);
    if hn.is_empty() || hn.len() > MAX_HOSTNAME_LEN || !hn.contains('.') {
        return false;
    }
    if !hn
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    {
        return false;
    }
    hn.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_domain_urls() {
        assert_eq!(normalize_domain("https://www.Example.com/about?x=1"), "example.com");
        assert_eq!(normalize_domain("http://example.com:8080"), "example.com");
        assert_eq!(normalize_domain("example.com/contact"), "example.com");
        assert_eq!(normalize_domain(" sub.domain.example.co.uk "), "sub.domain.example.co.uk");
        assert_eq!(normalize_domain("example.com:25"), "example.com");
    }

    #[test]
    fn test_normalize_domain_email_and_names() {
        assert_eq!(normalize_domain("Alice.Smith@Example.COM"), "example.com");
        assert_eq!(normalize_domain("Acme Plumbing"), "acme-plumbing.com");
        assert_eq!(normalize_domain("acme"), "acme.com");
        assert_eq!(normalize_domain(""), "");
        assert_eq!(normalize_domain("   "), "");
    }

    #[test]
    fn test_normalize_domain_never_panics_on_garbage() {
        for raw in ["http://", "@", "://", "a b c/d:e", "www.", "???"] {
            let _ = normalize_domain(raw);
        }
    }

    #[test]
    fn test_is_valid_hostname() {
        assert!(is_valid_hostname("example.com"));
        assert!(is_valid_hostname("aspmx.l.google.com."));
        assert!(is_valid_hostname("mx-1.mail.example.org"));

        assert!(!is_valid_hostname(""));
        assert!(!is_valid_hostname("localhost"));
        assert!(!is_valid_hostname("-bad.example.com"));
        assert!(!is_valid_hostname("bad-.example.com"));
        assert!(!is_valid_hostname("a..b.com"));
        assert!(!is_valid_hostname("under_score.example.com"));
        assert!(!is_valid_hostname("spa ce.example.com"));
        assert!(!is_valid_hostname(&format!("{}.com", "a".repeat(64))));
        assert!(!is_valid_hostname(&format!("{}.com", "a.".repeat(130))));
    }
}
