//! SMTP verification: RCPT probing, retry policy and catch-all detection.

mod client;
mod error;
mod result;

pub use client::{LettreExchanger, MailExchanger, SmtpVerifier};
pub use result::RcptReply;
