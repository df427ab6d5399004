//! Infers the mailbox provider behind a domain from its MX hostnames.

/// Labels for well-known providers. Unknown hosts fall back to their last two labels.
pub const GOOGLE_WORKSPACE: &str = "Google Workspace";
pub const MICROSOFT_365: &str = "Microsoft 365";
pub const ZOHO: &str = "Zoho";
pub const FASTMAIL: &str = "FastMail";
pub const MIMECAST: &str = "Mimecast";
pub const YAHOO: &str = "Yahoo";
pub const ICLOUD: &str = "iCloud";
pub const PROOFPOINT: &str = "Proofpoint";
pub const SENDGRID: &str = "SendGrid";
pub const AMAZON_SES: &str = "Amazon SES";
pub const MAILGUN: &str = "Mailgun";
pub const GODADDY: &str = "GoDaddy";

/// Provider families whose presence is a (weak) positive scoring signal.
const LARGE_PROVIDER_FAMILIES: &[&str] = &["google", "microsoft", "yahoo", "zoho", "icloud", "fastmail"];

/// Returns a provider label for an MX hostname, or an empty string for empty input.
pub fn provider_from_mx_host(hostname: &str) -> String {
    let h = hostname.trim().trim_end_matches('.').to_lowercase();
    if h.is_empty() {
        return String::new();
    }

    let label = if h.contains("google.com") || h.contains("googlemail.com") || h.contains("googlehosted") {
        GOOGLE_WORKSPACE
    } else if h.contains("protection.outlook") || h.contains("outlook.com") || h.contains("office365") {
        MICROSOFT_365
    } else if h.contains("zoho") {
        ZOHO
    } else if h.contains("messagingengine") || h.contains("fastmail") {
        FASTMAIL
    } else if h.ends_with("mimecast.com") {
        MIMECAST
    } else if h.ends_with("yahoodns.net") || h.contains("mx.aol.com") || h.contains("yahoo.com") {
        YAHOO
    } else if h.ends_with("mail.icloud.com") {
        ICLOUD
    } else if h.ends_with("pphosted.com") || h.ends_with("ppe-hosted.com") {
        PROOFPOINT
    } else if h.contains("sendgrid") {
        SENDGRID
    } else if h.contains("amazonses") || h.ends_with("amazonaws.com") {
        AMAZON_SES
    } else if h.contains("mailgun") {
        MAILGUN
    } else if h.contains("godaddy") || h.contains("secureserver") {
        GODADDY
    } else {
        let parts: Vec<&str> = h.split('.').collect();
        return if parts.len() >= 2 {
            parts[parts.len() - 2..].join(".")
        } else {
            h.clone()
        };
    };
    label.to_string()
}

/// Whether `provider` appears in the configured definitive table (case-insensitive).
pub fn is_definitive(provider: &str, definitive_providers: &[String]) -> bool {
    let p = provider.to_lowercase();
    !p.is_empty()
        && definitive_providers
            .iter()
            .any(|d| !d.is_empty() && p.contains(&d.to_lowercase()))
}

/// Whether a provider label or signal names one of the large mailbox provider families.
pub fn is_large_provider_family(signal: &str) -> bool {
    let s = signal.to_lowercase();
    LARGE_PROVIDER_FAMILIES.iter().any(|f| s.contains(f))
}
