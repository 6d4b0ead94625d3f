//! The raw-socket SMTP probe client.
//!
//! Executes the minimal handshake prefix (greeting, EHLO, MAIL FROM,
//! RCPT TO, QUIT) needed to observe a RCPT response, then aborts the
//! transaction. Never delivers mail, never lets a socket error escape: every
//! code path collapses into a [`ProbeOutcome`].

use std::sync::Arc;
use std::time::Duration;

use rand::distributions::Alphanumeric;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::core::config::{get_command_jitter, Config, RelayIdentity};
use crate::core::error::Result;

use super::classify::classify_rcpt_response;
use super::outcome::ProbeOutcome;
use super::session::{ProbeSession, SmtpReply, Stage};

/// Stateless probe executor; all knobs come from the shared [`Config`].
#[derive(Clone)]
pub struct ProbeClient {
    config: Arc<Config>,
}

impl ProbeClient {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Runs one full probe of `target` against `exchange_host:port` using the
    /// given sending identity. Always resolves to an outcome.
    pub async fn probe(
        &self,
        exchange_host: &str,
        port: u16,
        identity: &RelayIdentity,
        target: &str,
    ) -> ProbeOutcome {
        match self.rcpt_exchange(exchange_host, port, identity.source_ip, target).await {
            Ok(reply) => {
                let outcome = classify_rcpt_response(&reply.raw);
                tracing::debug!(
                    exchange = exchange_host,
                    identity = %identity.key(),
                    target,
                    code = reply.code,
                    outcome = %outcome,
                    "probe completed"
                );
                outcome
            }
            Err(err) => {
                tracing::warn!(
                    exchange = exchange_host,
                    identity = %identity.key(),
                    target,
                    error = %err,
                    "probe failed before RCPT classification"
                );
                ProbeOutcome::Error(err.to_string())
            }
        }
    }

    /// Lighter-weight variant for catch-all sampling: only "accepted vs
    /// rejected" at RCPT is observed, for several recipients over one
    /// connection with RSET between the envelopes. A session-level failure is
    /// charged to its own sample and forces a fresh connection for the next
    /// one. `pause` spreads the samples out so the burst itself does not trip
    /// blocking.
    pub async fn probe_acceptance_batch(
        &self,
        exchange_host: &str,
        port: u16,
        targets: &[String],
        pause: Duration,
    ) -> Vec<Result<bool>> {
        let mut results = Vec::with_capacity(targets.len());
        let mut slot: Option<(ProbeSession, String)> = None;
        for (index, target) in targets.iter().enumerate() {
            if index > 0 && !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
            let sample = self
                .acceptance_sample(&mut slot, exchange_host, port, target)
                .await;
            if sample.is_err() {
                if let Some((dead, _)) = slot.take() {
                    dead.abort().await;
                }
            }
            results.push(sample);
        }
        if let Some((session, _)) = slot {
            session.close().await;
        }
        results
    }

    async fn acceptance_sample(
        &self,
        slot: &mut Option<(ProbeSession, String)>,
        exchange_host: &str,
        port: u16,
        target: &str,
    ) -> Result<bool> {
        let (session, sender_domain) = match slot {
            Some((session, sender_domain)) => {
                session.send_expect("RSET", 250, "RSET").await?;
                session.reset_envelope()?;
                (session, sender_domain.clone())
            }
            None => {
                let domain = self.pick_sender_domain();
                let mut fresh =
                    ProbeSession::connect(exchange_host, port, None, self.config.smtp_timeout)
                        .await?;
                self.open_dialogue(&mut fresh, &domain).await?;
                let (session, sender_domain) = slot.insert((fresh, domain));
                (session, sender_domain.clone())
            }
        };
        let mail_from = format!("{}@{}", random_local_part(), sender_domain);
        let reply = self.submit_envelope(session, &mail_from, target).await?;
        Ok(reply.is_positive_completion())
    }

    /// Drives the handshake up to and including the RCPT reply, then closes
    /// the socket. The socket is destroyed on every exit path.
    async fn rcpt_exchange(
        &self,
        exchange_host: &str,
        port: u16,
        source_ip: Option<std::net::IpAddr>,
        target: &str,
    ) -> Result<SmtpReply> {
        let sender_domain = self.pick_sender_domain();
        let mail_from = format!("{}@{}", random_local_part(), sender_domain);

        let mut session =
            ProbeSession::connect(exchange_host, port, source_ip, self.config.smtp_timeout).await?;

        match self.handshake(&mut session, &sender_domain, &mail_from, target).await {
            Ok(reply) => {
                if matches!(classify_rcpt_response(&reply.raw), ProbeOutcome::Blocked(_)) {
                    // No QUIT courtesy for a server that is policing us.
                    session.abort().await;
                } else {
                    session.close().await;
                }
                Ok(reply)
            }
            Err(err) => {
                session.abort().await;
                Err(err)
            }
        }
    }

    async fn handshake(
        &self,
        session: &mut ProbeSession,
        sender_domain: &str,
        mail_from: &str,
        target: &str,
    ) -> Result<SmtpReply> {
        self.open_dialogue(session, sender_domain).await?;
        self.submit_envelope(session, mail_from, target).await
    }

    /// Greeting plus EHLO: the part of the dialogue shared by every envelope
    /// on a connection.
    async fn open_dialogue(&self, session: &mut ProbeSession, sender_domain: &str) -> Result<()> {
        let greeting = session.read_reply().await?;
        expect_code(session, &greeting, 220, "greeting")?;
        session.advance(Stage::Helo)?;
        session
            .send_expect(&format!("EHLO {sender_domain}"), 250, "EHLO")
            .await?;
        Ok(())
    }

    /// MAIL FROM through the RCPT reply. Requires the session to be in the
    /// post-HELO state.
    async fn submit_envelope(
        &self,
        session: &mut ProbeSession,
        mail_from: &str,
        target: &str,
    ) -> Result<SmtpReply> {
        self.pause_between_commands().await;
        session
            .send_expect(&format!("MAIL FROM:<{mail_from}>"), 250, "MAIL FROM")
            .await?;
        session.advance(Stage::Mail)?;
        self.pause_between_commands().await;

        session.send_command(&format!("RCPT TO:<{target}>")).await?;
        let reply = session.read_reply().await?;
        session.advance(Stage::Rcpt)?;
        Ok(reply)
    }

    fn pick_sender_domain(&self) -> String {
        self.config
            .sender_domains
            .choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_else(|| "example.com".to_string())
    }

    async fn pause_between_commands(&self) {
        let jitter = get_command_jitter(&self.config);
        if !jitter.is_zero() {
            tokio::time::sleep(jitter).await;
        }
    }
}

/// Random envelope-sender local part, lowered to stay inoffensive to strict
/// parsers.
fn random_local_part() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect();
    format!("verify-{}", suffix.to_lowercase())
}

fn expect_code(
    session: &ProbeSession,
    reply: &SmtpReply,
    expected: u16,
    step: &str,
) -> Result<()> {
    if reply.code != expected {
        return Err(crate::core::error::AppError::SmtpProtocol(format!(
            "{} answered {} with {} (expected {expected})",
            session.peer(),
            step,
            reply.code
        )));
    }
    Ok(())
}
