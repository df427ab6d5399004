//! Provides the SmtpVerifier for validating addresses with RCPT probes.

use super::error::{code_number, rcpt_reply_from_error, session_failure};
use super::result::RcptReply;
use crate::core::config::Config;
use crate::core::models::{AttemptClass, ProbeAttempt, ProbeResult, ProbeStatus};
use crate::utils::provider::{is_definitive, provider_from_mx_host};

use async_trait::async_trait;
use lettre::transport::smtp::client::SmtpConnection;
use lettre::transport::smtp::commands::{Mail, Rcpt};
use lettre::transport::smtp::extension::ClientId;
use lettre::Address;
use rand::Rng;
use regex::Regex;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

const SMTP_PORT: u16 = 25;

/// Performs one `RCPT TO` exchange against one MX host.
///
/// Every call opens and tears down its own connection.
#[async_trait]
pub trait MailExchanger: Send + Sync {
    async fn rcpt_probe(&self, mx_host: &str, recipient: &str, timeout: Duration) -> RcptReply;
}

/// [`MailExchanger`] speaking plain SMTP through `lettre`, on port 25 unless told otherwise.
#[derive(Debug, Clone)]
pub struct LettreExchanger {
    helo_name: String,
    port: u16,
}

impl LettreExchanger {
    pub fn new(helo_name: impl Into<String>) -> Self {
        Self {
            helo_name: helo_name.into(),
            port: SMTP_PORT,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

#[async_trait]
impl MailExchanger for LettreExchanger {
    async fn rcpt_probe(&self, mx_host: &str, recipient: &str, timeout: Duration) -> RcptReply {
        // Resolution counts against the same budget as the session.
        let lookup = tokio::time::timeout(timeout, tokio::net::lookup_host((mx_host, self.port))).await;
        let socket_addrs: Vec<SocketAddr> = match lookup {
            Ok(Ok(addrs)) => addrs.collect(),
            Ok(Err(e)) => {
                tracing::debug!(target: "smtp_task", "Could not resolve mail server address {}: {}", mx_host, e);
                return RcptReply::Unresolvable;
            }
            Err(_) => {
                tracing::debug!(target: "smtp_task", "Resolving {} timed out after {:?}", mx_host, timeout);
                return RcptReply::Unresolvable;
            }
        };
        if socket_addrs.is_empty() {
            return RcptReply::Unresolvable;
        }

        let helo_name = self.helo_name.clone();
        let mx_host_owned = mx_host.to_string();
        let recipient_owned = recipient.to_string();
        let handle = tokio::task::spawn_blocking(move || {
            blocking_rcpt(&socket_addrs, &mx_host_owned, &helo_name, &recipient_owned, timeout)
        });

        match handle.await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(target: "smtp_task", "SMTP probe task for {} failed: {}", mx_host, e);
                RcptReply::ConnectionFailed(format!("probe task failed: {}", e))
            }
        }
    }
}

/// `EHLO` (sent by `connect`), `MAIL FROM:<>`, `RCPT TO`, `QUIT`.
///
/// `connect` tries each resolved address in turn until one answers.
fn blocking_rcpt(
    socket_addrs: &[SocketAddr],
    mx_host: &str,
    helo_name: &str,
    recipient: &str,
    timeout: Duration,
) -> RcptReply {
    let recipient_address = match Address::from_str(recipient) {
        Ok(addr) => addr,
        Err(e) => {
            return RcptReply::ConnectionFailed(format!("recipient not usable by SMTP client: {}", e));
        }
    };

    tracing::debug!(target: "smtp_task", "Connecting to {} at {:?}", mx_host, socket_addrs);
    let client_id = ClientId::Domain(helo_name.to_string());
    let mut conn = match SmtpConnection::connect(socket_addrs, Some(timeout), &client_id, None, None) {
        Ok(conn) => conn,
        Err(e) => return session_failure(&e, mx_host),
    };

    if let Err(e) = conn.command(Mail::new(None, vec![])) {
        tracing::debug!(target: "smtp_task",
            "Null sender refused by {} ({}); retrying with postmaster@{}", mx_host, e, helo_name);
        let fallback = format!("postmaster@{}", helo_name);
        let retried = match Address::from_str(&fallback) {
            Ok(sender) => conn.command(Mail::new(Some(sender), vec![])).map(|_| ()),
            Err(_) => Err(e),
        };
        if let Err(e) = retried {
            conn.quit().ok();
            return session_failure(&e, mx_host);
        }
    }

    tracing::debug!(target: "smtp_task", "Sending RCPT TO:<{}> to {}", recipient, mx_host);
    let reply = match conn.command(Rcpt::new(recipient_address, vec![])) {
        Ok(response) => {
            let message = response.message().collect::<Vec<&str>>().join(" ");
            match code_number(response.code()) {
                Some(code) => RcptReply::Replied { code, message },
                None => RcptReply::ConnectionFailed(format!("unparseable reply code: {}", message)),
            }
        }
        Err(e) => rcpt_reply_from_error(&e, mx_host),
    };

    if let Err(e) = conn.quit() {
        tracing::debug!(target: "smtp_task", "Error during SMTP QUIT on {}: {}", mx_host, e);
    }
    reply
}

/// Verifies addresses against a domain's MX hosts with bounded retries.
#[derive(Clone)]
pub struct SmtpVerifier {
    exchanger: Arc<dyn MailExchanger>,
    email_regex: Regex,
    definitive_providers: Vec<String>,
    max_mx_hosts: usize,
    backoff: Duration,
}

impl SmtpVerifier {
    pub fn new(config: &Config, exchanger: Arc<dyn MailExchanger>) -> Self {
        Self {
            exchanger,
            email_regex: config.email_regex.clone(),
            definitive_providers: config.definitive_providers.clone(),
            max_mx_hosts: config.max_mx_hosts.max(1),
            backoff: config.smtp_backoff,
        }
    }

    /// Probes `email` against `mx_hosts` (already in preference order).
    ///
    /// Per host, for each attempt:
    /// - 2xx: valid, stop.
    /// - 4xx: back off and retry; once attempts run out, move to the next host.
    /// - 5xx from a definitive provider: invalid, stop.
    /// - 5xx otherwise: back off and retry; once attempts run out, invalid.
    /// - unresolvable host or connection failure: move to the next host.
    ///
    /// Running out of hosts gives `unknown`. Never returns an error.
    pub async fn probe(
        &self,
        email: &str,
        mx_hosts: &[String],
        timeout: Duration,
        max_attempts_per_host: u32,
    ) -> ProbeResult {
        let mut attempts: Vec<ProbeAttempt> = Vec::new();

        if !self.email_regex.is_match(email) {
            tracing::debug!(target: "smtp_task", "Refusing to probe malformed address <{}>", email);
            return ProbeResult {
                status: ProbeStatus::Invalid,
                details: "malformed address".to_string(),
                code: None,
                mx_host: None,
                attempts,
            };
        }
        if mx_hosts.is_empty() {
            return ProbeResult::unknown("no MX hosts to probe", attempts);
        }

        let max_attempts = max_attempts_per_host.max(1);
        let mut last_details = String::from("no MX host gave a definitive answer");

        for mx_host in mx_hosts.iter().take(self.max_mx_hosts) {
            let provider = provider_from_mx_host(mx_host);
            let definitive = is_definitive(&provider, &self.definitive_providers);

            for attempt in 1..=max_attempts {
                tracing::debug!(target: "smtp_task",
                    "Attempt {}/{} to verify <{}> via {} ({})",
                    attempt, max_attempts, email, mx_host, provider
                );
                let reply = self.exchanger.rcpt_probe(mx_host, email, timeout).await;
                let classification = reply.classify();
                attempts.push(ProbeAttempt {
                    email: email.to_string(),
                    mx_host: mx_host.clone(),
                    attempt_number: attempt,
                    smtp_code: reply.code(),
                    classification,
                });
                let details = reply.describe();
                let has_retry = attempt < max_attempts;

                match classification {
                    AttemptClass::Accepted => {
                        tracing::info!(target: "smtp_task", "<{}> accepted by {}: {}", email, mx_host, details);
                        return decided(ProbeStatus::Valid, details, &reply, mx_host, attempts);
                    }
                    AttemptClass::Permanent if definitive => {
                        tracing::info!(target: "smtp_task",
                            "<{}> rejected by definitive provider {} ({}): {}", email, provider, mx_host, details);
                        return decided(ProbeStatus::Invalid, details, &reply, mx_host, attempts);
                    }
                    AttemptClass::Permanent if !has_retry => {
                        tracing::info!(target: "smtp_task",
                            "<{}> still rejected by {} after {} attempts: {}", email, mx_host, attempt, details);
                        return decided(ProbeStatus::Invalid, details, &reply, mx_host, attempts);
                    }
                    AttemptClass::Temporary if !has_retry => {
                        tracing::warn!(target: "smtp_task",
                            "<{}> temporarily deferred by {} on every attempt: {}", email, mx_host, details);
                        last_details = details;
                        break;
                    }
                    AttemptClass::Permanent | AttemptClass::Temporary => {
                        let sleep_duration = self.backoff * attempt;
                        tracing::debug!(target: "smtp_task",
                            "Inconclusive reply from {} for <{}> ({}). Sleeping {:?} before retry.",
                            mx_host, email, details, sleep_duration
                        );
                        tokio::time::sleep(sleep_duration).await;
                    }
                    AttemptClass::Unreachable | AttemptClass::ConnectionFailed => {
                        tracing::warn!(target: "smtp_task", "Abandoning {} for <{}>: {}", mx_host, email, details);
                        last_details = details;
                        break;
                    }
                }
            }
        }

        tracing::info!(target: "smtp_task", "No definitive SMTP answer for <{}>: {}", email, last_details);
        ProbeResult::unknown(last_details, attempts)
    }

    /// Probes a random, certainly nonexistent local part on `domain`.
    /// Returns true when that address is accepted.
    pub async fn detect_catch_all(
        &self,
        mx_hosts: &[String],
        domain: &str,
        timeout: Duration,
        max_attempts_per_host: u32,
    ) -> bool {
        let probe_address = format!("noexist-{:016x}@{}", rand::thread_rng().gen::<u64>(), domain);
        tracing::debug!(target: "smtp_task", "Catch-all check for {} using <{}>", domain, probe_address);

        let result = self
            .probe(&probe_address, mx_hosts, timeout, max_attempts_per_host)
            .await;
        let is_catch_all = result.status == ProbeStatus::Valid;
        if is_catch_all {
            tracing::warn!(target: "smtp_task",
                "Domain {} appears to be a catch-all (accepted <{}>: {})", domain, probe_address, result.details);
        }
        is_catch_all
    }
}

fn decided(
    status: ProbeStatus,
    details: String,
    reply: &RcptReply,
    mx_host: &str,
    attempts: Vec<ProbeAttempt>,
) -> ProbeResult {
    ProbeResult {
        status,
        details,
        code: reply.code(),
        mx_host: Some(mx_host.to_string()),
        attempts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::{HashMap, VecDeque};

    /// Replays scripted replies per MX host and records every call.
    #[derive(Default)]
    struct ScriptedExchanger {
        replies: Mutex<HashMap<String, VecDeque<RcptReply>>>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedExchanger {
        fn script(self, host: &str, replies: Vec<RcptReply>) -> Self {
            self.replies.lock().insert(host.to_string(), replies.into());
            self
        }

        fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl MailExchanger for ScriptedExchanger {
        async fn rcpt_probe(&self, mx_host: &str, recipient: &str, _timeout: Duration) -> RcptReply {
            self.calls.lock().push((mx_host.to_string(), recipient.to_string()));
            self.replies
                .lock()
                .get_mut(mx_host)
                .and_then(|q| q.pop_front())
                .unwrap_or_else(|| RcptReply::ConnectionFailed("no scripted reply".into()))
        }
    }

    /// Accepts every recipient on every host.
    struct AcceptAll;

    #[async_trait]
    impl MailExchanger for AcceptAll {
        async fn rcpt_probe(&self, _mx_host: &str, _recipient: &str, _timeout: Duration) -> RcptReply {
            RcptReply::replied(250, "2.1.5 OK")
        }
    }

    fn verifier(exchanger: Arc<dyn MailExchanger>) -> SmtpVerifier {
        let config = Config {
            smtp_backoff: Duration::ZERO,
            ..Config::default()
        };
        SmtpVerifier::new(&config, exchanger)
    }

    fn hosts(list: &[&str]) -> Vec<String> {
        list.iter().map(|h| h.to_string()).collect()
    }

    const TIMEOUT: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn test_accept_stops_immediately() {
        let exchanger = Arc::new(
            ScriptedExchanger::default().script("mx1.smallhost.net", vec![RcptReply::replied(250, "OK")]),
        );
        let result = verifier(exchanger.clone())
            .probe("alice@example.com", &hosts(&["mx1.smallhost.net", "mx2.smallhost.net"]), TIMEOUT, 2)
            .await;

        assert_eq!(result.status, ProbeStatus::Valid);
        assert_eq!(result.code, Some(250));
        assert_eq!(result.mx_host.as_deref(), Some("mx1.smallhost.net"));
        assert_eq!(exchanger.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_non_definitive_5xx_retried_then_invalid() {
        let exchanger = Arc::new(ScriptedExchanger::default().script(
            "mx1.smallhost.net",
            vec![
                RcptReply::replied(550, "no such user"),
                RcptReply::replied(550, "no such user"),
            ],
        ));
        let result = verifier(exchanger.clone())
            .probe("bob@example.com", &hosts(&["mx1.smallhost.net", "mx2.smallhost.net"]), TIMEOUT, 2)
            .await;

        assert_eq!(result.status, ProbeStatus::Invalid);
        assert_eq!(result.code, Some(550));
        assert_eq!(result.attempts.len(), 2);
        assert!(result
            .attempts
            .iter()
            .all(|a| a.classification == AttemptClass::Permanent));
        assert!(exchanger.calls().iter().all(|(h, _)| h == "mx1.smallhost.net"));
    }

    #[tokio::test]
    async fn test_definitive_5xx_is_final() {
        let exchanger = Arc::new(ScriptedExchanger::default().script(
            "aspmx.l.google.com",
            vec![RcptReply::replied(550, "5.1.1 The email account does not exist")],
        ));
        let result = verifier(exchanger.clone())
            .probe("bob@example.com", &hosts(&["aspmx.l.google.com"]), TIMEOUT, 3)
            .await;

        assert_eq!(result.status, ProbeStatus::Invalid);
        assert_eq!(result.attempts.len(), 1);
    }

    #[tokio::test]
    async fn test_4xx_exhausted_moves_to_next_host() {
        let exchanger = Arc::new(
            ScriptedExchanger::default()
                .script(
                    "mx1.smallhost.net",
                    vec![
                        RcptReply::replied(451, "greylisted"),
                        RcptReply::replied(451, "greylisted"),
                    ],
                )
                .script("mx2.smallhost.net", vec![RcptReply::replied(250, "OK")]),
        );
        let result = verifier(exchanger.clone())
            .probe("carol@example.com", &hosts(&["mx1.smallhost.net", "mx2.smallhost.net"]), TIMEOUT, 2)
            .await;

        assert_eq!(result.status, ProbeStatus::Valid);
        assert_eq!(result.mx_host.as_deref(), Some("mx2.smallhost.net"));
        let attempt_hosts: Vec<(&str, u32)> = result
            .attempts
            .iter()
            .map(|a| (a.mx_host.as_str(), a.attempt_number))
            .collect();
        assert_eq!(
            attempt_hosts,
            vec![("mx1.smallhost.net", 1), ("mx1.smallhost.net", 2), ("mx2.smallhost.net", 1)]
        );
    }

    #[tokio::test]
    async fn test_connection_failures_give_unknown() {
        let exchanger = Arc::new(
            ScriptedExchanger::default()
                .script("mx1.smallhost.net", vec![RcptReply::ConnectionFailed("timed out".into())])
                .script("mx2.smallhost.net", vec![RcptReply::Unresolvable]),
        );
        let result = verifier(exchanger.clone())
            .probe("dave@example.com", &hosts(&["mx1.smallhost.net", "mx2.smallhost.net"]), TIMEOUT, 2)
            .await;

        assert_eq!(result.status, ProbeStatus::Unknown);
        assert_eq!(result.code, None);
        // one attempt per host; connection failures are not retried on the same host
        assert_eq!(exchanger.calls().len(), 2);
        assert_eq!(result.attempts[1].classification, AttemptClass::Unreachable);
    }

    #[tokio::test]
    async fn test_mx_host_cap() {
        let exchanger = Arc::new(ScriptedExchanger::default());
        let many = hosts(&["mx1.a.net", "mx2.a.net", "mx3.a.net", "mx4.a.net", "mx5.a.net"]);
        let result = verifier(exchanger.clone())
            .probe("erin@example.com", &many, TIMEOUT, 1)
            .await;

        assert_eq!(result.status, ProbeStatus::Unknown);
        assert_eq!(exchanger.calls().len(), Config::default().max_mx_hosts);
    }

    #[tokio::test]
    async fn test_malformed_address_skips_network() {
        let exchanger = Arc::new(ScriptedExchanger::default());
        let result = verifier(exchanger.clone())
            .probe("not an address", &hosts(&["mx1.smallhost.net"]), TIMEOUT, 2)
            .await;

        assert_eq!(result.status, ProbeStatus::Invalid);
        assert!(exchanger.calls().is_empty());
    }

    #[tokio::test]
    async fn test_detect_catch_all() {
        let accepting = verifier(Arc::new(AcceptAll));
        assert!(
            accepting
                .detect_catch_all(&hosts(&["mx1.smallhost.net"]), "example.com", TIMEOUT, 1)
                .await
        );

        let exchanger = Arc::new(ScriptedExchanger::default().script(
            "mx1.smallhost.net",
            vec![RcptReply::replied(550, "no such user")],
        ));
        let strict = verifier(exchanger.clone());
        assert!(
            !strict
                .detect_catch_all(&hosts(&["mx1.smallhost.net"]), "example.com", TIMEOUT, 1)
                .await
        );
        let calls = exchanger.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].1.starts_with("noexist-"));
        assert!(calls[0].1.ends_with("@example.com"));
    }

    #[tokio::test]
    async fn test_retries_back_off_linearly() {
        let config = Config {
            smtp_backoff: Duration::from_millis(20),
            ..Config::default()
        };
        let deferred = || RcptReply::replied(451, "try again later");
        let exchanger = Arc::new(
            ScriptedExchanger::default().script("mx1.smallhost.net", vec![deferred(), deferred(), deferred()]),
        );
        let verifier = SmtpVerifier::new(&config, exchanger.clone());

        let start = std::time::Instant::now();
        let result = verifier
            .probe("bob@example.com", &hosts(&["mx1.smallhost.net"]), TIMEOUT, 3)
            .await;
        let elapsed = start.elapsed();

        assert_eq!(result.status, ProbeStatus::Unknown);
        assert_eq!(result.attempts.len(), 3);
        assert_eq!(exchanger.calls().len(), 3);
        // 20ms after the first attempt, 40ms after the second, none after the last.
        assert!(elapsed >= Duration::from_millis(60), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(2), "elapsed {:?}", elapsed);
    }

    /// Serves one SMTP session on a local port, replying by command and
    /// returning every command line it received.
    fn scripted_smtp_server() -> (u16, std::thread::JoinHandle<Vec<String>>) {
        use std::io::{BufRead, BufReader, Write};

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut received = Vec::new();
            stream.write_all(b"220 test.local ESMTP\r\n").unwrap();
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap() == 0 {
                    break;
                }
                let line = line.trim_end().to_string();
                let reply: &[u8] = if line.starts_with("EHLO") {
                    b"250 test.local\r\n"
                } else if line == "MAIL FROM:<>" {
                    b"550 5.7.1 null sender not accepted\r\n"
                } else if line.starts_with("MAIL FROM:") {
                    b"250 2.1.0 OK\r\n"
                } else if line.starts_with("RCPT TO:") {
                    b"550 5.1.1 no such user\r\n"
                } else if line == "QUIT" {
                    b"221 2.0.0 bye\r\n"
                } else {
                    b"500 5.5.1 unrecognized command\r\n"
                };
                received.push(line.clone());
                stream.write_all(reply).unwrap();
                if line == "QUIT" {
                    break;
                }
            }
            received
        });
        (port, handle)
    }

    #[tokio::test]
    async fn test_lettre_session_falls_back_to_postmaster_sender() {
        let (port, server) = scripted_smtp_server();
        let exchanger = LettreExchanger::new("mail.test.local").with_port(port);

        let reply = exchanger
            // `localhost` may resolve to ::1 first; the listener is only on IPv4.
            .rcpt_probe("localhost", "bob@example.com", Duration::from_secs(5))
            .await;

        assert_eq!(reply.code(), Some(550));
        assert_eq!(reply.classify(), AttemptClass::Permanent);
        let received = server.join().unwrap();
        assert_eq!(
            received,
            vec![
                "EHLO mail.test.local",
                "MAIL FROM:<>",
                "MAIL FROM:<postmaster@mail.test.local>",
                "RCPT TO:<bob@example.com>",
                "QUIT",
            ]
        );
    }
}
