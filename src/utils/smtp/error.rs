//! Turns `lettre` SMTP errors into [`RcptReply`] values.

use super::result::RcptReply;
use lettre::transport::smtp::response::Code;
use lettre::transport::smtp::Error as SmtpError;

/// Numeric form of a reply code, e.g. `550`.
pub(crate) fn code_number(code: Code) -> Option<u16> {
    code.to_string().parse().ok()
}

/// Interprets an error raised before `RCPT TO` (connect, greeting, `EHLO`,
/// `MAIL FROM`). Any of these abandons the host.
pub(crate) fn session_failure(error: &SmtpError, server: &str) -> RcptReply {
    let err_string = error.to_string().to_lowercase();

    if err_string.contains("timed out")
        || err_string.contains("connection refused")
        || err_string.contains("network is unreachable")
    {
        tracing::warn!(target: "smtp_task",
            "SMTP connection failed for {}: {}. Port 25 may be blocked.", server, error);
        return RcptReply::ConnectionFailed(format!("{} (port 25 blocked?)", error));
    }

    if err_string.contains("starttls")
        || (err_string.contains("530")
            && err_string.contains("5.7.0")
            && !err_string.contains("authentication required"))
    {
        tracing::warn!(target: "smtp_task", "SMTP session on {} requires STARTTLS: {}", server, error);
        return RcptReply::ConnectionFailed(format!("STARTTLS required: {}", error));
    }

    if let Some(code) = error.status().and_then(code_number) {
        tracing::warn!(target: "smtp_task", "SMTP session rejected by {} with {}: {}", server, code, error);
        return RcptReply::ConnectionFailed(format!("session rejected ({}): {}", code, error));
    }

    tracing::warn!(target: "smtp_task", "SMTP session error for {}: {}", server, error);
    RcptReply::ConnectionFailed(error.to_string())
}

/// Interprets an error returned for the `RCPT TO` command itself.
///
/// `lettre` reports negative replies as errors; those carry a status code and become
/// [`RcptReply::Replied`]. Errors without a code mean the session broke.
pub(crate) fn rcpt_reply_from_error(error: &SmtpError, server: &str) -> RcptReply {
    match error.status().and_then(code_number) {
        Some(code) => {
            tracing::debug!(target: "smtp_task", "RCPT TO rejected by {} with {}: {}", server, code, error);
            RcptReply::replied(code, error.to_string())
        }
        None => session_failure(error, server),
    }
}
