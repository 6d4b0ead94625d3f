//! The validation orchestrator: composes syntax, reputation, DNS, role,
//! typo, catch-all, and SMTP signals into a weighted score and verdict.

pub mod reputation;
pub mod syntax;
pub mod typo;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::catchall::{CatchAllDetector, CatchAllVerdict};
use crate::core::config::Config;
use crate::core::error::{AppError, Result};
use crate::dns::{DnsValidation, MailExchange, Resolver};
use crate::health::HealthMonitor;
use crate::rotation::RelayRotator;
use crate::smtp::{ProbeClient, ProbeOutcome};
use crate::utils::email::{domain_of, local_part_of};

use reputation::{classify_domain, detect_role, DomainQuality, DomainReputation, RoleCheck};
use syntax::{validate_syntax, SyntaxCheck};
use typo::{check_typos, TypoCheck};

/// Per-call switches: each signal can be traded off independently.
#[derive(Debug, Clone)]
pub struct ValidationOptions {
    pub check_smtp: bool,
    /// Overall budget for the network-facing part of one validation; the
    /// configured SMTP timeout applies when unset.
    pub timeout: Option<Duration>,
    pub validate_dns: bool,
    pub detect_roles: bool,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            check_smtp: true,
            timeout: None,
            validate_dns: true,
            detect_roles: true,
        }
    }
}

/// The SMTP leg of the verdict. `valid: None` means "could not determine",
/// which is different from `Some(false)`.
#[derive(Debug, Clone, Serialize)]
pub struct SmtpCheck {
    pub valid: Option<bool>,
    pub message: String,
    /// True when the answer is a heuristic substitute after SMTP-layer
    /// failure, not an observed server response.
    pub degraded: bool,
}

/// Per-signal breakdown. Sub-results stay `None` when a stage was disabled
/// or never reached, so callers can always distinguish "false" from
/// "unknown".
#[derive(Debug, Clone, Serialize, Default)]
pub struct ValidationDetails {
    pub syntax: Option<SyntaxCheck>,
    pub dns: Option<DnsValidation>,
    pub domain: Option<DomainReputation>,
    pub role: Option<RoleCheck>,
    pub typo: Option<TypoCheck>,
    pub catch_all: Option<CatchAllVerdict>,
    pub smtp: Option<SmtpCheck>,
}

/// The orchestrator's output. Immutable once constructed.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub score: u8,
    pub details: ValidationDetails,
    pub suggestions: Vec<String>,
}

impl ValidationResult {
    fn syntax_failure(check: SyntaxCheck) -> Self {
        Self {
            valid: false,
            score: 0,
            details: ValidationDetails {
                syntax: Some(check),
                ..ValidationDetails::default()
            },
            suggestions: Vec::new(),
        }
    }
}

/// Composes every signal source. One instance per process; cheap to share.
pub struct Orchestrator {
    config: Arc<Config>,
    resolver: Arc<Resolver>,
    rotator: Arc<RelayRotator>,
    health: Arc<HealthMonitor>,
    detector: CatchAllDetector,
    client: ProbeClient,
    /// Target port for outbound probes. 25 in production; tests point it at
    /// an in-process server.
    smtp_port: u16,
    /// When set, probes go to this exchanger instead of the MX lookup
    /// result. For callers that already know the route, and for tests.
    exchange_override: Option<String>,
}

impl Orchestrator {
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let resolver = Arc::new(Resolver::new(&config)?);
        let rotator = Arc::new(RelayRotator::new(Arc::clone(&config)));
        let health = Arc::new(HealthMonitor::new(Arc::clone(&config)));
        Ok(Self::from_parts(config, resolver, rotator, health))
    }

    pub fn from_parts(
        config: Arc<Config>,
        resolver: Arc<Resolver>,
        rotator: Arc<RelayRotator>,
        health: Arc<HealthMonitor>,
    ) -> Self {
        let detector = CatchAllDetector::new(Arc::clone(&config), Arc::clone(&resolver));
        let client = ProbeClient::new(Arc::clone(&config));
        Self {
            config,
            resolver,
            rotator,
            health,
            detector,
            client,
            smtp_port: 25,
            exchange_override: None,
        }
    }

    /// Overrides the outbound SMTP port, for tests against a local server.
    pub fn with_smtp_port(mut self, port: u16) -> Self {
        self.smtp_port = port;
        self
    }

    /// Pins the exchanger host, skipping MX discovery for the probe leg.
    pub fn with_exchange_override(mut self, host: impl Into<String>) -> Self {
        self.exchange_override = Some(host.into());
        self
    }

    /// Runs the full pipeline. Never fails: SMTP-layer trouble degrades the
    /// verdict instead of erroring, and only the per-signal breakdown shows
    /// the difference.
    pub async fn validate(&self, email: &str, options: &ValidationOptions) -> ValidationResult {
        let email = email.trim();

        let syntax_check = validate_syntax(email);
        if !syntax_check.valid {
            tracing::debug!(email, reason = %syntax_check.message, "rejected at syntax stage");
            return ValidationResult::syntax_failure(syntax_check);
        }

        let domain = domain_of(email);
        let local = local_part_of(email);

        let domain_reputation = classify_domain(&domain);
        let role_check = options.detect_roles.then(|| detect_role(local));
        let typo_check = check_typos(email);

        // DNS and catch-all have no ordering dependency; the probe does.
        let dns_validation = if options.validate_dns {
            Some(self.resolver.validate_domain(&domain).await)
        } else {
            None
        };

        let dns_valid = dns_validation.as_ref().map(|d| d.valid).unwrap_or(false);
        // A pinned exchanger means the route is already known, so DNS gating
        // only applies when the route has to be discovered.
        let smtp_eligible =
            options.check_smtp && (dns_valid || self.exchange_override.is_some());
        let (catch_all, smtp_check) = if smtp_eligible {
            let budget = options.timeout.unwrap_or_else(|| {
                // Worst case walks every retry with backoff.
                self.config.smtp_timeout * (self.config.max_retries + 2)
                    + self.config.retry_delay * (self.config.max_retries + 1) * 4
            });
            let network = async {
                let catch_all = match self.exchange_override.as_deref() {
                    Some(host) => self.detector.detect_against(&domain, host, self.smtp_port).await,
                    None => self.detector.detect(&domain).await,
                };
                let smtp = self
                    .check_existence(email, &domain, &domain_reputation, catch_all.is_catch_all)
                    .await;
                (catch_all, smtp)
            };
            match tokio::time::timeout(budget, network).await {
                Ok((catch_all, smtp)) => (Some(catch_all), Some(smtp)),
                Err(_) => (
                    None,
                    Some(SmtpCheck {
                        valid: None,
                        message: "SMTP verification timed out".to_string(),
                        degraded: true,
                    }),
                ),
            }
        } else {
            (None, None)
        };

        let policy = &self.config.score_policy;
        let mut score: u8 = 0;
        score = score.saturating_add(policy.syntax_points);
        if dns_valid {
            score = score.saturating_add(policy.dns_points);
        }
        if domain_reputation.valid {
            score = score.saturating_add(policy.reputation_points);
        }
        if smtp_check.as_ref().and_then(|s| s.valid) == Some(true) {
            score = score.saturating_add(policy.smtp_points);
        }
        if domain_reputation.quality == DomainQuality::Low {
            score = score.min(policy.disposable_cap);
        }
        if role_check.as_ref().map(|r| r.is_role).unwrap_or(false) {
            score = score.min(policy.role_cap);
        }
        if typo_check.has_typos {
            score = score.saturating_sub(policy.typo_penalty);
        }
        let valid = score >= policy.valid_threshold;

        let mut suggestions = Vec::new();
        if domain_reputation.quality == DomainQuality::Low {
            suggestions.push("Consider using a corporate email address".to_string());
        } else if role_check.as_ref().map(|r| r.is_role).unwrap_or(false) {
            suggestions.push("Consider using a personal email address".to_string());
        }
        if let Some(corrected) = typo_check.suggestion.as_deref() {
            suggestions.push(format!("Did you mean {corrected}?"));
        }

        ValidationResult {
            valid,
            score,
            details: ValidationDetails {
                syntax: Some(syntax_check),
                dns: dns_validation,
                domain: Some(domain_reputation),
                role: role_check,
                typo: Some(typo_check),
                catch_all,
                smtp: smtp_check,
            },
            suggestions,
        }
    }

    /// The SMTP existence check with retry-with-rotation. Retries walk the
    /// exchanger list in priority order while rotation independently swaps
    /// the sending identity; both are bounded by `max_retries`.
    async fn check_existence(
        &self,
        email: &str,
        domain: &str,
        reputation: &DomainReputation,
        is_catch_all: Option<bool>,
    ) -> SmtpCheck {
        let exchanges = if let Some(host) = self.exchange_override.as_deref() {
            Ok(vec![MailExchange {
                host: host.to_string(),
                priority: 0,
            }])
        } else {
            self.resolver.resolve_mail_exchanges(domain).await
        };
        let exchanges = match exchanges {
            Ok(exchanges) if !exchanges.is_empty() => exchanges,
            Ok(_) | Err(AppError::NoDnsRecords(_)) | Err(AppError::NxDomain(_)) => {
                return SmtpCheck {
                    valid: Some(false),
                    message: "No MX records found".to_string(),
                    degraded: false,
                };
            }
            Err(err) => {
                return SmtpCheck {
                    valid: None,
                    message: format!("MX resolution failed: {err}"),
                    degraded: true,
                };
            }
        };

        if is_catch_all == Some(true) {
            // A positive RCPT from a catch-all server says nothing.
            return SmtpCheck {
                valid: None,
                message: "Domain accepts any recipient; existence unverifiable".to_string(),
                degraded: false,
            };
        }

        let mut last_message = String::new();
        for attempt in 0..=self.config.max_retries {
            let identity = match self
                .rotator
                .select_identity_with(|relay| self.health.is_usable(relay))
            {
                Ok(identity) => identity,
                Err(err) => {
                    // Resource exhaustion is "can't check right now", never
                    // "does not exist".
                    return SmtpCheck {
                        valid: None,
                        message: err.to_string(),
                        degraded: true,
                    };
                }
            };
            let exchange: &MailExchange = &exchanges[attempt as usize % exchanges.len()];
            let outcome = self
                .client
                .probe(&exchange.host, self.smtp_port, &identity, email)
                .await;
            match outcome {
                ProbeOutcome::Exists => {
                    self.rotator.record_success(&identity);
                    return SmtpCheck {
                        valid: Some(true),
                        message: "Recipient accepted by server".to_string(),
                        degraded: false,
                    };
                }
                ProbeOutcome::DoesNotExist => {
                    self.rotator.record_success(&identity);
                    return SmtpCheck {
                        valid: Some(false),
                        message: "Recipient rejected by server".to_string(),
                        degraded: false,
                    };
                }
                ProbeOutcome::Unknown(reason) => {
                    // The dialogue completed; the identity did its job.
                    self.rotator.record_success(&identity);
                    return SmtpCheck {
                        valid: None,
                        message: reason,
                        degraded: false,
                    };
                }
                ProbeOutcome::Blocked(reason) => {
                    self.rotator.record_failure(&identity, &reason);
                    last_message = reason;
                }
                ProbeOutcome::Error(cause) => {
                    self.rotator.record_failure(&identity, &cause);
                    last_message = cause;
                }
            }
            if attempt < self.config.max_retries {
                tokio::time::sleep(self.config.retry_delay * (attempt + 1)).await;
            }
        }

        // Retries exhausted at the client level: fall back to the reputation
        // heuristic rather than failing the validation.
        tracing::warn!(
            email,
            last_error = %last_message,
            "SMTP retries exhausted, degrading to reputation heuristic"
        );
        SmtpCheck {
            valid: Some(reputation.quality != DomainQuality::Low),
            message: "SMTP validation limited".to_string(),
            degraded: true,
        }
    }
}
