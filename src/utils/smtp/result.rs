//! The outcome of one RCPT attempt against one MX host.

use crate::core::models::AttemptClass;
use serde::{Deserialize, Serialize};

/// What a single RCPT exchange produced.
///
/// Exchangers never return errors: every failure mode is one of these variants,
/// and the verifier decides what to do next by inspecting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RcptReply {
    /// The server answered `RCPT TO` with a reply code.
    Replied { code: u16, message: String },
    /// The MX hostname did not resolve to any address.
    Unresolvable,
    /// Connect, greeting, `EHLO` or `MAIL FROM` failed before `RCPT TO` could be sent.
    ConnectionFailed(String),
}

impl RcptReply {
    pub fn replied(code: u16, message: impl Into<String>) -> Self {
        Self::Replied {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> Option<u16> {
        match self {
            Self::Replied { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Maps the reply onto its attempt class by reply-code band.
    ///
    /// Codes outside 2xx/5xx (including a stray 3xx) are treated as temporary.
    pub fn classify(&self) -> AttemptClass {
        match self {
            Self::Replied { code, .. } => match code / 100 {
                2 => AttemptClass::Accepted,
                5 => AttemptClass::Permanent,
                _ => AttemptClass::Temporary,
            },
            Self::Unresolvable => AttemptClass::Unreachable,
            Self::ConnectionFailed(_) => AttemptClass::ConnectionFailed,
        }
    }

    /// Human-readable summary used in probe details.
    pub fn describe(&self) -> String {
        match self {
            Self::Replied { code, message } if message.is_empty() => code.to_string(),
            Self::Replied { code, message } => format!("{} {}", code, message),
            Self::Unresolvable => "MX host did not resolve".to_string(),
            Self::ConnectionFailed(reason) => format!("connection failed: {}", reason),
        }
    }
}
